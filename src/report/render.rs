use crate::config::ReportConfig;
use crate::report::kibana::KibanaLinks;
use crate::search::Filter;
use crate::stats::assembler::dimension_queries;
use crate::types::{ComparativeRecord, Dimension, Report};
use std::fmt::Write;

/// Renders reports as Slack mrkdwn.
pub struct SlackRenderer<'a> {
    settings: &'a ReportConfig,
    kibana: Option<KibanaLinks>,
}

impl<'a> SlackRenderer<'a> {
    pub fn new(settings: &'a ReportConfig, kibana: Option<KibanaLinks>) -> Self {
        Self { settings, kibana }
    }

    /// Full digest: errors report, plus the warnings section when given.
    pub fn render(&self, errors: &Report, warnings: Option<&Report>) -> String {
        let mut out = String::new();

        let _ = writeln!(
            out,
            "Logged on *{}*: *{}* events in total",
            errors.date, errors.total_docs
        );
        let _ = writeln!(
            out,
            "*{}* errors *({:.2}%)*",
            errors.total_errors, errors.errors_percent
        );

        self.section(&mut out, "Events by level", errors, Dimension::Level, None);
        self.section(&mut out, "Errors by region", errors, Dimension::Region, None);
        self.section(&mut out, "Top apps", errors, Dimension::App, Some(self.settings.display_limit));
        if let Some(warnings) = warnings {
            self.section(
                &mut out,
                "Top warnings",
                warnings,
                Dimension::Message,
                Some(self.settings.display_limit),
            );
        }
        self.section(
            &mut out,
            "Top errors",
            errors,
            Dimension::Message,
            Some(self.settings.display_limit),
        );

        out
    }

    fn section(
        &self,
        out: &mut String,
        title: &str,
        report: &Report,
        dimension: Dimension,
        limit: Option<usize>,
    ) {
        let records = report.records(dimension);
        if records.is_empty() {
            return;
        }
        let shown = limit.map_or(records.len(), |l| l.min(records.len()));
        let query = dimension_queries(self.settings, report.mode)
            .into_iter()
            .find(|q| q.dimension == dimension);

        let _ = writeln!(out);
        if limit.is_some() {
            let _ = writeln!(out, "{title} ({shown}):");
        } else {
            let _ = writeln!(out, "{title}:");
        }

        for record in &records[..shown] {
            let link = match (&self.kibana, &query) {
                (Some(kibana), Some(q)) => {
                    let kuery = kuery(&q.field, &record.term, &q.filter);
                    Some(kibana.discover_url(report.date, &kuery))
                }
                _ => None,
            };
            let _ = writeln!(out, "{}", line(record, link.as_deref()));
        }
    }
}

/// `*term* <link|*count*> (+x.xx% d/d, -y.yy% w/w)`
fn line(record: &ComparativeRecord, link: Option<&str>) -> String {
    let count = match link {
        Some(url) => format!("<{}|*{}*>", url, record.current),
        None => format!("*{}*", record.current),
    };
    let mut text = format!("*{}* {}", escape_mrkdwn(&record.term), count);

    let deltas: Vec<String> = [
        (record.day_before_delta_pct, "d/d"),
        (record.week_ago_delta_pct, "w/w"),
    ]
    .into_iter()
    .filter_map(|(pct, label)| pct.map(|p| format!("{p:+.2}% {label}")))
    .collect();
    if !deltas.is_empty() {
        let _ = write!(text, " *({})*", deltas.join(", "));
    }
    text
}

/// Kibana query language expression selecting `term` under `filter`.
/// Aggregation fields are matched on their analyzed parent (`app.keyword` -> `app`).
pub fn kuery(field: &str, term: &str, filter: &Filter) -> String {
    let field = field.strip_suffix(".keyword").unwrap_or(field);
    let mut q = format!("{}:\"{}\"", field, escape_kuery(term));
    for m in &filter.must {
        let _ = write!(q, " AND {}:\"{}\"", m.field, escape_kuery(&m.value));
    }
    for m in &filter.must_not {
        let _ = write!(q, " AND NOT {}:\"{}\"", m.field, escape_kuery(&m.value));
    }
    q
}

fn escape_kuery(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Slack treats `&`, `<` and `>` as control characters.
fn escape_mrkdwn(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ReportMode;
    use chrono::NaiveDate;

    fn record(term: &str, current: i64, dd: Option<f64>, wa: Option<f64>) -> ComparativeRecord {
        ComparativeRecord {
            term: term.to_string(),
            current,
            day_before: 0,
            week_ago: 0,
            day_before_delta_pct: dd,
            week_ago_delta_pct: wa,
        }
    }

    fn report() -> Report {
        Report {
            date: NaiveDate::from_ymd_opt(2024, 3, 7).unwrap(),
            mode: ReportMode::Errors,
            total_docs: 1000,
            total_errors: 40,
            errors_percent: 4.0,
            by_message: vec![record("timeout <db>", 30, Some(100.0), None)],
            by_app: (0..12).map(|i| record(&format!("app{i}"), 12 - i, None, None)).collect(),
            by_region: vec![record("eu", 40, Some(25.0), Some(-3.333))],
            by_level: vec![record("info", 900, None, Some(12.5))],
        }
    }

    #[test]
    fn test_render_without_links() {
        let settings = ReportConfig::default();
        let text = SlackRenderer::new(&settings, None).render(&report(), None);

        assert!(text.starts_with("Logged on *2024-03-07*: *1000* events in total\n*40* errors *(4.00%)*\n"));
        assert!(text.contains("Events by level:\n*info* *900* *(+12.50% w/w)*\n"));
        assert!(text.contains("*eu* *40* *(+25.00% d/d, -3.33% w/w)*"));
        assert!(text.contains("Top apps (10):"));
        assert!(text.contains("*app9* *3*"));
        assert!(!text.contains("app10"));
        assert!(text.contains("*timeout &lt;db&gt;* *30* *(+100.00% d/d)*"));
        assert!(!text.contains("Top warnings"));
    }

    #[test]
    fn test_render_section_order_with_warnings() {
        let settings = ReportConfig::default();
        let mut warnings = report();
        warnings.mode = ReportMode::Warnings;
        warnings.by_message = vec![record("deprecated call", 7, None, None)];

        let text = SlackRenderer::new(&settings, None).render(&report(), Some(&warnings));
        let levels = text.find("Events by level").unwrap();
        let regions = text.find("Errors by region").unwrap();
        let apps = text.find("Top apps").unwrap();
        let warn = text.find("Top warnings (1):\n*deprecated call* *7*").unwrap();
        let errors = text.find("Top errors").unwrap();
        assert!(levels < regions && regions < apps && apps < warn && warn < errors);
    }

    #[test]
    fn test_empty_sections_are_skipped() {
        let settings = ReportConfig::default();
        let mut r = report();
        r.by_region.clear();
        let text = SlackRenderer::new(&settings, None).render(&r, None);
        assert!(!text.contains("Errors by region"));
    }

    #[test]
    fn test_render_with_kibana_links() {
        let settings = ReportConfig::default();
        let kibana = KibanaLinks::new("https://kibana.example.com", "abc-123");
        let text = SlackRenderer::new(&settings, Some(kibana)).render(&report(), None);
        assert!(text.contains("*eu* <https://kibana.example.com/app/kibana#/discover?"));
        assert!(text.contains("|*40*>"));
    }

    #[test]
    fn test_kuery_for_error_filter() {
        let filter = Filter::new()
            .must("level", "error")
            .excluding("region", ["dev", "testing"]);
        assert_eq!(
            kuery("app.keyword", "billing", &filter),
            r#"app:"billing" AND level:"error" AND NOT region:"dev" AND NOT region:"testing""#
        );
    }

    #[test]
    fn test_kuery_escapes_quotes() {
        assert_eq!(
            kuery("message", r#"bad "input" \ here"#, &Filter::new()),
            r#"message:"bad \"input\" \\ here""#
        );
    }
}

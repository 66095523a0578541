use crate::config::ReportConfig;
use crate::error::{ReportError, ReportResult, SearchError};
use crate::search::{Filter, SearchBackend};
use crate::stats::merge::merge;
use crate::types::{BucketSet, ComparativeRecord, DateKeys, Dimension, Report, ReportMode, Window};
use chrono::{DateTime, NaiveDate, Utc};
use std::future::Future;
use std::time::Duration;

/// One breakdown to compute: which field to bucket, under which filter, how many terms.
#[derive(Debug, Clone, PartialEq)]
pub struct DimensionQuery {
    pub dimension: Dimension,
    pub field: String,
    pub filter: Filter,
    pub top_n: usize,
}

/// `level = <mode level> AND region NOT IN excluded`.
pub fn active_filter(settings: &ReportConfig, mode: ReportMode) -> Filter {
    Filter::new()
        .must(&settings.fields.level_filter, mode.level())
        .excluding(
            &settings.fields.region_filter,
            settings.excluded_regions.iter().map(String::as_str),
        )
}

/// `region NOT IN excluded`, no level restriction.
pub fn level_breakdown_filter(settings: &ReportConfig) -> Filter {
    Filter::new().excluding(
        &settings.fields.region_filter,
        settings.excluded_regions.iter().map(String::as_str),
    )
}

/// Breakdowns for a mode, in report order. Warnings mode only covers messages and apps.
pub fn dimension_queries(settings: &ReportConfig, mode: ReportMode) -> Vec<DimensionQuery> {
    let active = active_filter(settings, mode);
    let fields = &settings.fields;

    let mut queries = vec![
        DimensionQuery {
            dimension: Dimension::Message,
            field: fields.message.clone(),
            filter: active.clone(),
            top_n: settings.top_messages,
        },
        DimensionQuery {
            dimension: Dimension::App,
            field: fields.app.clone(),
            filter: active.clone(),
            top_n: settings.top_dimension,
        },
    ];

    if mode == ReportMode::Errors {
        queries.push(DimensionQuery {
            dimension: Dimension::Region,
            field: fields.region.clone(),
            filter: active,
            top_n: settings.top_dimension,
        });
        queries.push(DimensionQuery {
            dimension: Dimension::Level,
            field: fields.level.clone(),
            filter: level_breakdown_filter(settings),
            top_n: settings.top_dimension,
        });
    }

    queries
}

/// Share of matching documents in percent; 0 when there are no documents at all.
pub fn errors_percent(total_errors: i64, total_docs: i64) -> f64 {
    if total_docs == 0 {
        return 0.0;
    }
    total_errors as f64 / total_docs as f64 * 100.0
}

/// Build the comparative report for the day before `reference`.
///
/// Current-window and count failures abort with [`ReportError::Fetch`];
/// baseline failures only remove that window's comparison.
pub async fn assemble_report<B: SearchBackend>(
    backend: &B,
    settings: &ReportConfig,
    mode: ReportMode,
    reference: DateTime<Utc>,
) -> ReportResult<Report> {
    let dates = DateKeys::from_reference(reference)
        .ok_or_else(|| ReportError::DateOutOfRange(reference.to_rfc3339()))?;
    let active = active_filter(settings, mode);

    tracing::info!(mode = %mode, date = %dates.current, "assembling report");

    let (total_docs, total_errors) = tokio::try_join!(
        fetch_count(backend, None, dates.current, "total document count"),
        fetch_count(backend, Some(&active), dates.current, "matching document count"),
    )?;

    let queries = dimension_queries(settings, mode);
    let breakdowns =
        futures::future::try_join_all(queries.iter().map(|q| compare_dimension(backend, q, &dates)))
            .await?;

    let mut report = Report {
        date: dates.current,
        mode,
        total_docs,
        total_errors,
        errors_percent: errors_percent(total_errors, total_docs),
        by_message: Vec::new(),
        by_app: Vec::new(),
        by_region: Vec::new(),
        by_level: Vec::new(),
    };
    for (query, records) in queries.iter().zip(breakdowns) {
        match query.dimension {
            Dimension::Message => report.by_message = records,
            Dimension::App => report.by_app = records,
            Dimension::Region => report.by_region = records,
            Dimension::Level => report.by_level = records,
        }
    }

    tracing::info!(
        mode = %mode,
        date = %report.date,
        total_docs = report.total_docs,
        total_errors = report.total_errors,
        "report assembled"
    );
    Ok(report)
}

/// Run `work` under a deadline, giving up early when `shutdown` resolves.
/// Dropping `work` aborts every fetch still in flight.
pub async fn run_bounded<T>(
    work: impl Future<Output = ReportResult<T>>,
    deadline: Duration,
    shutdown: impl Future<Output = ()>,
) -> ReportResult<T> {
    tokio::select! {
        res = tokio::time::timeout(deadline, work) => {
            res.unwrap_or_else(|_| Err(ReportError::Timeout(deadline)))
        }
        _ = shutdown => {
            tracing::warn!("shutdown requested, aborting report assembly");
            Err(ReportError::Cancelled)
        }
    }
}

async fn fetch_count<B: SearchBackend>(
    backend: &B,
    filter: Option<&Filter>,
    date: NaiveDate,
    what: &str,
) -> ReportResult<i64> {
    backend
        .count(filter, date)
        .await
        .map_err(|source| fatal(what.to_string(), date, source))
}

async fn compare_dimension<B: SearchBackend>(
    backend: &B,
    query: &DimensionQuery,
    dates: &DateKeys,
) -> ReportResult<Vec<ComparativeRecord>> {
    let (current, day_before, week_ago) = tokio::try_join!(
        fetch_current(backend, query, dates.current),
        fetch_baseline(backend, query, Window::DayBefore, dates.day_before),
        fetch_baseline(backend, query, Window::WeekAgo, dates.week_ago),
    )?;

    Ok(merge(&current, day_before.as_deref(), week_ago.as_deref()))
}

async fn fetch_current<B: SearchBackend>(
    backend: &B,
    query: &DimensionQuery,
    date: NaiveDate,
) -> ReportResult<BucketSet> {
    let mut buckets = backend
        .terms(&query.field, &query.filter, date, query.top_n)
        .await
        .map_err(|source| fatal(format!("{} breakdown", query.dimension), date, source))?;
    buckets.truncate(query.top_n);
    Ok(buckets)
}

/// Never fails: a baseline that cannot be fetched is reported as absent.
async fn fetch_baseline<B: SearchBackend>(
    backend: &B,
    query: &DimensionQuery,
    window: Window,
    date: NaiveDate,
) -> ReportResult<Option<BucketSet>> {
    match backend
        .terms(&query.field, &query.filter, date, query.top_n)
        .await
    {
        Ok(mut buckets) => {
            buckets.truncate(query.top_n);
            Ok(Some(buckets))
        }
        Err(e) => {
            tracing::warn!(
                dimension = %query.dimension,
                window = window.as_str(),
                date = %date,
                error = %e,
                "baseline window unavailable, comparison skipped"
            );
            Ok(None)
        }
    }
}

fn fatal(what: String, date: NaiveDate, source: SearchError) -> ReportError {
    tracing::error!(what = %what, date = %date, error = %source, "fetch failed");
    ReportError::Fetch {
        what,
        date: date.to_string(),
        source,
    }
}

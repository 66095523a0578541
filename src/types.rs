use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::Serialize;

/// One (term, count) pair from a terms aggregation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Bucket {
    pub term: String,
    pub count: i64,
}

impl Bucket {
    pub fn new(term: impl Into<String>, count: i64) -> Self {
        Self {
            term: term.into(),
            count,
        }
    }
}

/// Buckets in backend order (descending count), already truncated to top-N.
pub type BucketSet = Vec<Bucket>;

/// A current-day term joined against its two baseline windows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparativeRecord {
    pub term: String,
    pub current: i64,
    pub day_before: i64,
    pub week_ago: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub day_before_delta_pct: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub week_ago_delta_pct: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportMode {
    Errors,
    Warnings,
}

impl ReportMode {
    /// Value of the level field the message/app dimensions are restricted to.
    pub fn level(&self) -> &'static str {
        match self {
            ReportMode::Errors => "error",
            ReportMode::Warnings => "warning",
        }
    }
}

impl std::fmt::Display for ReportMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ReportMode::Errors => "errors",
            ReportMode::Warnings => "warnings",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    Message,
    App,
    Region,
    Level,
}

impl Dimension {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::Message => "message",
            Dimension::App => "app",
            Dimension::Region => "region",
            Dimension::Level => "level",
        }
    }
}

impl std::fmt::Display for Dimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A baseline window compared against the current day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Window {
    DayBefore,
    WeekAgo,
}

impl Window {
    pub fn as_str(&self) -> &'static str {
        match self {
            Window::DayBefore => "day_before",
            Window::WeekAgo => "week_ago",
        }
    }
}

/// The three day-partitions a report compares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateKeys {
    pub current: NaiveDate,
    pub day_before: NaiveDate,
    pub week_ago: NaiveDate,
}

impl DateKeys {
    /// Yesterday, the day before and seven days back, relative to `reference` (UTC).
    pub fn from_reference(reference: DateTime<Utc>) -> Option<Self> {
        let today = reference.date_naive();
        Some(Self {
            current: today.checked_sub_days(Days::new(1))?,
            day_before: today.checked_sub_days(Days::new(2))?,
            week_ago: today.checked_sub_days(Days::new(7))?,
        })
    }
}

/// Daily index name, e.g. `logstash-2024.03.07`.
pub fn index_name(base: &str, date: NaiveDate) -> String {
    format!("{}-{}", base, date.format("%Y.%m.%d"))
}

/// Comparative statistics for one reported day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub date: NaiveDate,
    pub mode: ReportMode,
    pub total_docs: i64,
    pub total_errors: i64,
    pub errors_percent: f64,
    pub by_message: Vec<ComparativeRecord>,
    pub by_app: Vec<ComparativeRecord>,
    pub by_region: Vec<ComparativeRecord>,
    pub by_level: Vec<ComparativeRecord>,
}

impl Report {
    pub fn records(&self, dimension: Dimension) -> &[ComparativeRecord] {
        match dimension {
            Dimension::Message => &self.by_message,
            Dimension::App => &self.by_app,
            Dimension::Region => &self.by_region,
            Dimension::Level => &self.by_level,
        }
    }
}

pub mod client;
pub mod query;

use crate::error::SearchError;
use crate::types::BucketSet;
use chrono::NaiveDate;
use std::future::Future;

/// A single `field = value` term match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermMatch {
    pub field: String,
    pub value: String,
}

/// Conjunction of required and excluded term matches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    pub must: Vec<TermMatch>,
    pub must_not: Vec<TermMatch>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn must(mut self, field: &str, value: &str) -> Self {
        self.must.push(TermMatch {
            field: field.to_string(),
            value: value.to_string(),
        });
        self
    }

    pub fn must_not(mut self, field: &str, value: &str) -> Self {
        self.must_not.push(TermMatch {
            field: field.to_string(),
            value: value.to_string(),
        });
        self
    }

    /// `field NOT IN values`, one exclusion per value.
    pub fn excluding<'a>(mut self, field: &str, values: impl IntoIterator<Item = &'a str>) -> Self {
        for value in values {
            self = self.must_not(field, value);
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.must.is_empty() && self.must_not.is_empty()
    }
}

/// Capability the stats engine needs from a date-partitioned log store.
///
/// Implementations own their retry policy; a returned error is final.
pub trait SearchBackend: Send + Sync {
    /// Top `top_n` values of `field` among documents matching `filter` on `date`,
    /// by descending document count.
    fn terms(
        &self,
        field: &str,
        filter: &Filter,
        date: NaiveDate,
        top_n: usize,
    ) -> impl Future<Output = Result<BucketSet, SearchError>> + Send;

    /// Number of documents on `date`, optionally restricted by `filter`.
    fn count(
        &self,
        filter: Option<&Filter>,
        date: NaiveDate,
    ) -> impl Future<Output = Result<i64, SearchError>> + Send;
}

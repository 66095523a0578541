use crate::stats::delta::percent_change;
use crate::types::{Bucket, ComparativeRecord};
use std::collections::{HashMap, HashSet};

/// Term -> count lookup over one baseline window. The first occurrence of a
/// term wins; later duplicates are reported and ignored.
struct BaselineIndex<'a> {
    counts: HashMap<&'a str, i64>,
}

impl<'a> BaselineIndex<'a> {
    fn build(label: &str, buckets: &'a [Bucket]) -> Self {
        let mut counts = HashMap::with_capacity(buckets.len());
        for bucket in buckets {
            if counts.contains_key(bucket.term.as_str()) {
                tracing::warn!(
                    window = label,
                    term = %bucket.term,
                    count = bucket.count,
                    "duplicate term in bucket set, keeping first occurrence"
                );
                continue;
            }
            counts.insert(bucket.term.as_str(), bucket.count);
        }
        Self { counts }
    }

    fn count(&self, term: &str) -> i64 {
        self.counts.get(term).copied().unwrap_or(0)
    }
}

/// Join the current window against the two baseline windows.
///
/// Output follows `current` order and only ever contains its terms. A `None`
/// baseline (its fetch failed) contributes zero counts and no delta.
pub fn merge(
    current: &[Bucket],
    day_before: Option<&[Bucket]>,
    week_ago: Option<&[Bucket]>,
) -> Vec<ComparativeRecord> {
    let day_before = day_before.map(|b| BaselineIndex::build("day_before", b));
    let week_ago = week_ago.map(|b| BaselineIndex::build("week_ago", b));

    let mut seen: HashSet<&str> = HashSet::with_capacity(current.len());
    let mut records = Vec::with_capacity(current.len());

    for bucket in current {
        if !seen.insert(bucket.term.as_str()) {
            tracing::warn!(
                window = "current",
                term = %bucket.term,
                "duplicate term in bucket set, keeping first occurrence"
            );
            continue;
        }

        let day_before_count = day_before.as_ref().map_or(0, |idx| idx.count(&bucket.term));
        let week_ago_count = week_ago.as_ref().map_or(0, |idx| idx.count(&bucket.term));

        records.push(ComparativeRecord {
            term: bucket.term.clone(),
            current: bucket.count,
            day_before: day_before_count,
            week_ago: week_ago_count,
            day_before_delta_pct: percent_change(bucket.count, day_before_count),
            week_ago_delta_pct: percent_change(bucket.count, week_ago_count),
        });
    }

    records
}

//! Elasticsearch query DSL bodies and response decoding.

use crate::error::SearchError;
use crate::search::Filter;
use crate::types::{Bucket, BucketSet};
use serde_json::{json, Value};

pub fn bool_query(filter: &Filter) -> Value {
    if filter.is_empty() {
        return json!({ "match_all": {} });
    }
    let must: Vec<Value> = filter
        .must
        .iter()
        .map(|m| json!({ "term": { m.field.as_str(): m.value } }))
        .collect();
    let must_not: Vec<Value> = filter
        .must_not
        .iter()
        .map(|m| json!({ "term": { m.field.as_str(): m.value } }))
        .collect();
    json!({ "bool": { "must": must, "must_not": must_not } })
}

/// Size-0 search with a single terms aggregation named after the field.
pub fn terms_body(field: &str, filter: &Filter, top_n: usize) -> Value {
    json!({
        "size": 0,
        "query": bool_query(filter),
        "aggs": {
            field: {
                "terms": { "field": field, "size": top_n }
            }
        }
    })
}

pub fn count_body(filter: Option<&Filter>) -> Option<Value> {
    filter.map(|f| json!({ "query": bool_query(f) }))
}

/// Newest Kibana index-pattern saved object whose title matches `<index>-*`.
pub fn index_pattern_body(index: &str) -> Value {
    json!({
        "size": 10,
        "query": {
            "bool": {
                "must": [
                    { "query_string": { "query": format!("index-pattern.title:\"{index}-*\"") } }
                ]
            }
        },
        "sort": [
            { "updated_at": { "order": "desc", "unmapped_type": "date" } }
        ]
    })
}

/// Read `aggregations.<name>.buckets`. A missing aggregation is an empty set;
/// non-string keys are stringified.
pub fn parse_terms(name: &str, body: &Value) -> Result<BucketSet, SearchError> {
    let Some(agg) = body.get("aggregations").and_then(|a| a.get(name)) else {
        return Ok(Vec::new());
    };
    let buckets = agg
        .get("buckets")
        .and_then(Value::as_array)
        .ok_or_else(|| SearchError::Decode(format!("aggregation {name} has no buckets array")))?;

    buckets
        .iter()
        .map(|b| {
            let term = match b.get("key") {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Number(n)) => n.to_string(),
                Some(Value::Bool(v)) => v.to_string(),
                other => {
                    return Err(SearchError::Decode(format!(
                        "unsupported bucket key in {name}: {other:?}"
                    )))
                }
            };
            let count = b
                .get("doc_count")
                .and_then(Value::as_i64)
                .ok_or_else(|| SearchError::Decode(format!("bucket {term} has no doc_count")))?;
            Ok(Bucket { term, count })
        })
        .collect()
}

pub fn parse_count(body: &Value) -> Result<i64, SearchError> {
    body.get("count")
        .and_then(Value::as_i64)
        .ok_or_else(|| SearchError::Decode("count response has no count field".to_string()))
}

/// First concrete index name from a `GET /_alias/<alias>` response.
pub fn parse_alias_target(body: &Value) -> Result<String, SearchError> {
    body.as_object()
        .and_then(|indices| indices.keys().next().cloned())
        .ok_or_else(|| SearchError::Decode("alias resolves to no index".to_string()))
}

/// Saved-object ids look like `index-pattern:<uuid>`; returns the uuid.
pub fn parse_index_pattern_id(body: &Value) -> Result<String, SearchError> {
    let id = body
        .pointer("/hits/hits/0/_id")
        .and_then(Value::as_str)
        .ok_or_else(|| SearchError::Decode("index pattern not found".to_string()))?;
    id.split(':')
        .nth(1)
        .map(str::to_string)
        .ok_or_else(|| SearchError::Decode(format!("unexpected saved object id: {id}")))
}

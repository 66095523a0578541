use crate::config::ElasticsearchConfig;
use crate::error::{ReportError, SearchError};
use crate::search::{query, Filter, SearchBackend};
use crate::types::{index_name, BucketSet};
use chrono::NaiveDate;
use reqwest::{Method, StatusCode};
use serde_json::Value;
use std::time::Duration;

const BACKOFF_INITIAL: Duration = Duration::from_millis(10);
const BACKOFF_MAX: Duration = Duration::from_secs(8);
const MAX_ERROR_BODY: usize = 512;

/// Elasticsearch REST client over one or more equivalent cluster endpoints.
pub struct ElasticClient {
    client: reqwest::Client,
    hosts: Vec<String>,
    index: String,
    max_retries: u32,
}

impl ElasticClient {
    pub fn new(config: &ElasticsearchConfig) -> Result<Self, ReportError> {
        let hosts: Vec<String> = config
            .urls
            .iter()
            .map(|u| u.trim().trim_end_matches('/').to_string())
            .filter(|u| !u.is_empty())
            .collect();
        if hosts.is_empty() {
            return Err(ReportError::InvalidConfig(
                "no elasticsearch URL configured".to_string(),
            ));
        }
        for host in &hosts {
            url::Url::parse(host).map_err(|e| {
                ReportError::InvalidConfig(format!("invalid elasticsearch URL {host}: {e}"))
            })?;
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ReportError::InvalidConfig(format!("http client: {e}")))?;

        Ok(Self {
            client,
            hosts,
            index: config.index.clone(),
            max_retries: config.max_retries,
        })
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    /// Id of the newest Kibana index pattern covering `<index>-*`.
    pub async fn kibana_index_pattern(&self) -> Result<String, SearchError> {
        let alias = self
            .request(Method::GET, "_alias/.kibana", None, ".kibana")
            .await?;
        let kibana_index = query::parse_alias_target(&alias)?;
        tracing::debug!(kibana_index = %kibana_index, "resolved kibana alias");

        let body = query::index_pattern_body(&self.index);
        let hits = self
            .request(
                Method::POST,
                &format!("{kibana_index}/_search"),
                Some(&body),
                &kibana_index,
            )
            .await?;
        query::parse_index_pattern_id(&hits)
    }

    /// Send one request, retrying transient failures with exponential backoff
    /// and rotating through the configured hosts.
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        index: &str,
    ) -> Result<Value, SearchError> {
        let mut attempt: u32 = 0;
        let mut refused_streak = 0usize;

        loop {
            let host = &self.hosts[attempt as usize % self.hosts.len()];
            let url = format!("{host}/{path}");
            let mut req = self.client.request(method.clone(), &url);
            if let Some(body) = body {
                req = req.json(body);
            }

            let err = match req.send().await {
                Ok(resp) if resp.status().is_success() => {
                    return resp
                        .json::<Value>()
                        .await
                        .map_err(|e| SearchError::Decode(e.to_string()));
                }
                Ok(resp) => {
                    refused_streak = 0;
                    let status = resp.status();
                    let mut text = resp.text().await.unwrap_or_default();
                    truncate(&mut text, MAX_ERROR_BODY);
                    let err = SearchError::Backend {
                        index: index.to_string(),
                        status: status.as_u16(),
                        body: text,
                    };
                    if !is_retryable_status(status) {
                        return Err(err);
                    }
                    err
                }
                Err(e) if is_connection_refused(&e) => {
                    refused_streak += 1;
                    if refused_streak >= self.hosts.len() {
                        return Err(SearchError::Unreachable(e.to_string()));
                    }
                    SearchError::Http(e)
                }
                Err(e) => {
                    refused_streak = 0;
                    SearchError::Http(e)
                }
            };

            if attempt >= self.max_retries {
                return Err(err);
            }
            let wait = backoff(attempt);
            tracing::warn!(
                host = %host,
                index = index,
                attempt = attempt + 1,
                wait_ms = wait.as_millis() as u64,
                error = %err,
                "search request failed, retrying"
            );
            tokio::time::sleep(wait).await;
            attempt += 1;
        }
    }
}

impl SearchBackend for ElasticClient {
    async fn terms(
        &self,
        field: &str,
        filter: &Filter,
        date: NaiveDate,
        top_n: usize,
    ) -> Result<BucketSet, SearchError> {
        let index = index_name(&self.index, date);
        let body = query::terms_body(field, filter, top_n);
        let resp = self
            .request(Method::POST, &format!("{index}/_search"), Some(&body), &index)
            .await?;
        let buckets = query::parse_terms(field, &resp)?;
        tracing::debug!(index = %index, field = field, buckets = buckets.len(), "terms fetched");
        Ok(buckets)
    }

    async fn count(&self, filter: Option<&Filter>, date: NaiveDate) -> Result<i64, SearchError> {
        let index = index_name(&self.index, date);
        let body = query::count_body(filter);
        let resp = self
            .request(Method::POST, &format!("{index}/_count"), body.as_ref(), &index)
            .await?;
        let count = query::parse_count(&resp)?;
        tracing::debug!(index = %index, filtered = filter.is_some(), count, "count fetched");
        Ok(count)
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn is_connection_refused(err: &reqwest::Error) -> bool {
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        if let Some(io) = cause.downcast_ref::<std::io::Error>() {
            if io.kind() == std::io::ErrorKind::ConnectionRefused {
                return true;
            }
        }
        source = cause.source();
    }
    false
}

/// 10ms, 20ms, 40ms, ... capped at 8s.
fn backoff(attempt: u32) -> Duration {
    let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
    BACKOFF_INITIAL.saturating_mul(factor).min(BACKOFF_MAX)
}

fn truncate(text: &mut String, max: usize) {
    if text.len() <= max {
        return;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text.truncate(end);
}

use chrono::NaiveDate;

/// Builds Kibana discover links scoped to one day and one index pattern.
#[derive(Debug, Clone)]
pub struct KibanaLinks {
    base_url: String,
    index_pattern: String,
}

impl KibanaLinks {
    pub fn new(base_url: &str, index_pattern: impl Into<String>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            index_pattern: index_pattern.into(),
        }
    }

    pub fn discover_url(&self, date: NaiveDate, kuery: &str) -> String {
        format!(
            "{base}/app/kibana#/discover?_g=(refreshInterval:(pause:!t,value:0),\
             time:(from:'{date}T00:00:00.000Z',to:'{date}T23:59:59.000Z'))\
             &_a=(columns:!(app,message,error,region),index:'{pattern}',interval:auto,\
             query:(language:kuery,query:'{query}'),sort:!(!('@timestamp',desc)))",
            base = self.base_url,
            date = date,
            pattern = rison_escape(&self.index_pattern),
            query = encode(&rison_escape(kuery)),
        )
    }
}

/// Escape for a single-quoted rison string.
fn rison_escape(value: &str) -> String {
    value.replace('!', "!!").replace('\'', "!'")
}

/// Percent-encode for the URL fragment; spaces become `%20` rather than `+`.
fn encode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

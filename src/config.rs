use crate::error::ReportResult;
use config::{Config, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub elasticsearch: ElasticsearchConfig,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ElasticsearchConfig {
    #[serde(default)]
    pub urls: Vec<String>,
    /// Base name of the daily indices, `<index>-YYYY.MM.DD`.
    pub index: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default)]
    pub kibana_url: Option<String>,
}

fn default_timeout_secs() -> u64 {
    300
}
fn default_max_retries() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReportConfig {
    #[serde(default)]
    pub warning_mode: bool,
    #[serde(default = "default_top_messages")]
    pub top_messages: usize,
    #[serde(default = "default_top_dimension")]
    pub top_dimension: usize,
    #[serde(default = "default_display_limit")]
    pub display_limit: usize,
    #[serde(default = "default_excluded_regions")]
    pub excluded_regions: Vec<String>,
    #[serde(default)]
    pub fields: FieldConfig,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            warning_mode: false,
            top_messages: default_top_messages(),
            top_dimension: default_top_dimension(),
            display_limit: default_display_limit(),
            excluded_regions: default_excluded_regions(),
            fields: FieldConfig::default(),
        }
    }
}

fn default_top_messages() -> usize {
    20
}
fn default_top_dimension() -> usize {
    10
}
fn default_display_limit() -> usize {
    10
}
fn default_excluded_regions() -> Vec<String> {
    vec!["dev".to_string(), "testing".to_string()]
}

/// Document fields. Aggregations run on keyword sub-fields, filters on the
/// analyzed ones.
#[derive(Debug, Deserialize, Clone)]
pub struct FieldConfig {
    #[serde(default = "default_message_field")]
    pub message: String,
    #[serde(default = "default_app_field")]
    pub app: String,
    #[serde(default = "default_region_field")]
    pub region: String,
    #[serde(default = "default_level_field")]
    pub level: String,
    #[serde(default = "default_level_filter_field")]
    pub level_filter: String,
    #[serde(default = "default_region_filter_field")]
    pub region_filter: String,
}

impl Default for FieldConfig {
    fn default() -> Self {
        Self {
            message: default_message_field(),
            app: default_app_field(),
            region: default_region_field(),
            level: default_level_field(),
            level_filter: default_level_filter_field(),
            region_filter: default_region_filter_field(),
        }
    }
}

fn default_message_field() -> String {
    "message.keyword".to_string()
}
fn default_app_field() -> String {
    "app.keyword".to_string()
}
fn default_region_field() -> String {
    "region.keyword".to_string()
}
fn default_level_field() -> String {
    "level.keyword".to_string()
}
fn default_level_filter_field() -> String {
    "level".to_string()
}
fn default_region_filter_field() -> String {
    "region".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct DeliveryConfig {
    #[serde(default)]
    pub slack_webhook_url: Option<String>,
    #[serde(default)]
    pub slack_channel: Option<String>,
    #[serde(default = "default_slack_username")]
    pub slack_username: String,
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default)]
    pub email_to: Vec<String>,
    #[serde(default)]
    pub smtp: SmtpConfig,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            slack_webhook_url: None,
            slack_channel: None,
            slack_username: default_slack_username(),
            webhook_url: None,
            email_to: Vec::new(),
            smtp: SmtpConfig::default(),
        }
    }
}

fn default_slack_username() -> String {
    "error-digest".to_string()
}

impl DeliveryConfig {
    pub fn has_channel(&self) -> bool {
        self.slack_webhook_url.is_some()
            || self.webhook_url.is_some()
            || (self.smtp.enabled && !self.email_to.is_empty())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SmtpConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_smtp_host")]
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_smtp_from")]
    pub from: String,
    #[serde(default = "default_smtp_starttls")]
    pub starttls: bool,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: default_smtp_host(),
            port: default_smtp_port(),
            username: String::new(),
            password: String::new(),
            from: default_smtp_from(),
            starttls: default_smtp_starttls(),
        }
    }
}

fn default_smtp_host() -> String {
    "smtp.example.com".to_string()
}
fn default_smtp_port() -> u16 {
    587
}
fn default_smtp_from() -> String {
    "error-digest@example.com".to_string()
}
fn default_smtp_starttls() -> bool {
    true
}

/// Plain variables understood by the cron deployments that predate the
/// `DIGEST__*` scheme. They win over both the file and `DIGEST__*`.
const LEGACY_ENV: &[(&str, &str)] = &[
    ("INDEX", "elasticsearch.index"),
    ("KIBANA", "elasticsearch.kibana_url"),
    ("SLACK", "delivery.slack_webhook_url"),
    ("CHANNEL", "delivery.slack_channel"),
];

impl AppConfig {
    pub fn validate(&self, dry_run: bool) -> Result<(), String> {
        if self.elasticsearch.urls.iter().all(|u| u.trim().is_empty()) {
            return Err("elasticsearch.urls must contain at least one URL. \
                 Set it in config.toml, via DIGEST__ELASTICSEARCH__URLS or ELASTICSEARCH."
                .to_string());
        }
        if self.elasticsearch.index.trim().is_empty() {
            return Err("elasticsearch.index must not be empty".to_string());
        }
        if self.elasticsearch.timeout_secs == 0 {
            return Err("elasticsearch.timeout_secs must be greater than 0".to_string());
        }
        if self.report.top_messages == 0 || self.report.top_dimension == 0 {
            return Err("report.top_messages and report.top_dimension must be greater than 0"
                .to_string());
        }
        if !dry_run && !self.delivery.has_channel() {
            return Err("no delivery channel configured: set delivery.slack_webhook_url, \
                 delivery.webhook_url or delivery.smtp with delivery.email_to (or use --dry-run)"
                .to_string());
        }
        Ok(())
    }

    pub fn load(config_path: Option<&str>) -> ReportResult<Self> {
        let mut builder = Config::builder();

        let path = config_path.unwrap_or("config.toml");
        builder = builder.add_source(File::with_name(path).required(false));

        // DIGEST__ELASTICSEARCH__INDEX=logstash, DIGEST__ELASTICSEARCH__URLS=http://a,http://b
        builder = builder.add_source(
            Environment::with_prefix("DIGEST")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("elasticsearch.urls")
                .with_list_parse_key("report.excluded_regions")
                .with_list_parse_key("delivery.email_to")
                .try_parsing(true),
        );

        for (var, key) in LEGACY_ENV {
            builder = builder.set_override_option(*key, non_empty_env(var))?;
        }
        let legacy_urls = non_empty_env("ELASTICSEARCH").map(|v| {
            v.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
        });
        builder = builder.set_override_option("elasticsearch.urls", legacy_urls)?;
        let legacy_warning_mode = non_empty_env("WARNING_MODE").map(|v| v == "true");
        builder = builder.set_override_option("report.warning_mode", legacy_warning_mode)?;

        Ok(builder.build()?.try_deserialize()?)
    }
}

fn non_empty_env(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.is_empty())
}

use crate::config::DeliveryConfig;
use crate::error::{ReportError, ReportResult};
use crate::types::Report;
use lettre::message::Mailbox;
use serde_json::json;

/// Delivers rendered digests to Slack, a generic webhook, and email.
pub struct ReportDispatcher {
    client: reqwest::Client,
    slack_webhook_url: Option<String>,
    slack_channel: Option<String>,
    slack_username: String,
    generic_webhook_url: Option<String>,
    smtp_transport: Option<lettre::AsyncSmtpTransport<lettre::Tokio1Executor>>,
    smtp_from: Option<String>,
    email_to: Vec<String>,
}

/// Check a delivery endpoint: https expected, private and loopback hosts rejected.
pub fn validate_webhook_url(channel: &str, url: &str) -> Result<(), String> {
    let parsed = url::Url::parse(url).map_err(|e| format!("{channel}: invalid URL: {e}"))?;
    match parsed.scheme() {
        "https" => {}
        "http" => tracing::warn!(channel, url, "delivery endpoint uses plain http"),
        scheme => return Err(format!("{channel}: unsupported scheme {scheme}")),
    }
    match parsed.host() {
        Some(url::Host::Domain(host)) if host == "localhost" => {
            Err(format!("{channel}: endpoint points to localhost"))
        }
        Some(url::Host::Ipv4(ip)) if ip.is_private() || ip.is_loopback() || ip.is_link_local() => {
            Err(format!("{channel}: endpoint points to private address {ip}"))
        }
        Some(url::Host::Ipv6(ip)) if ip.is_loopback() => {
            Err(format!("{channel}: endpoint points to loopback address {ip}"))
        }
        _ => Ok(()),
    }
}

impl ReportDispatcher {
    pub fn new(config: &DeliveryConfig) -> ReportResult<Self> {
        let endpoints = [
            ("slack", config.slack_webhook_url.as_deref()),
            ("webhook", config.webhook_url.as_deref()),
        ];
        for (channel, url) in endpoints {
            if let Some(Err(e)) = url.map(|u| validate_webhook_url(channel, u)) {
                tracing::warn!(channel, error = %e, "suspicious delivery endpoint");
            }
        }

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| ReportError::InvalidConfig(format!("http client: {e}")))?;

        let (smtp_transport, smtp_from) = if config.smtp.enabled {
            let cfg = &config.smtp;
            let builder = if cfg.starttls {
                lettre::AsyncSmtpTransport::<lettre::Tokio1Executor>::starttls_relay(&cfg.host)
            } else {
                lettre::AsyncSmtpTransport::<lettre::Tokio1Executor>::relay(&cfg.host)
            };
            let transport = builder
                .map_err(|e| ReportError::InvalidConfig(format!("smtp transport: {e}")))?
                .port(cfg.port)
                .credentials(lettre::transport::smtp::authentication::Credentials::new(
                    cfg.username.clone(),
                    cfg.password.clone(),
                ))
                .build();
            tracing::info!(host = %cfg.host, port = cfg.port, "SMTP transport initialized");
            (Some(transport), Some(cfg.from.clone()))
        } else {
            (None, None)
        };

        Ok(Self {
            client,
            slack_webhook_url: config.slack_webhook_url.clone(),
            slack_channel: config.slack_channel.clone(),
            slack_username: config.slack_username.clone(),
            generic_webhook_url: config.webhook_url.clone(),
            smtp_transport,
            smtp_from,
            email_to: config.email_to.clone(),
        })
    }

    /// Send `text` to every configured channel. All channels are attempted;
    /// the error names the ones that failed.
    pub async fn deliver(&self, text: &str, reports: &[&Report]) -> ReportResult<()> {
        let mut failed: Vec<String> = Vec::new();

        if let Some(ref url) = self.slack_webhook_url {
            if let Err(e) = self.send_slack(url, text).await {
                failed.push(format!("slack: {e}"));
            }
        }
        if let Some(ref url) = self.generic_webhook_url {
            if let Err(e) = self.send_generic(url, text, reports).await {
                failed.push(format!("webhook: {e}"));
            }
        }
        if self.smtp_transport.is_some() && !self.email_to.is_empty() {
            let subject = match reports.first() {
                Some(report) => format!("[error-digest] {}", report.date),
                None => "[error-digest]".to_string(),
            };
            if let Err(e) = self.send_email(&subject, text).await {
                failed.push(format!("email: {e}"));
            }
        }

        if failed.is_empty() {
            Ok(())
        } else {
            Err(ReportError::Delivery(failed.join("; ")))
        }
    }

    async fn send_slack(&self, url: &str, text: &str) -> Result<(), String> {
        let mut payload = json!({
            "text": text,
            "username": self.slack_username,
            "mrkdwn": true,
        });
        if let Some(ref channel) = self.slack_channel {
            payload["channel"] = json!(channel);
        }

        match self.client.post(url).json(&payload).send().await {
            Ok(resp) if resp.status().is_success() => {
                tracing::info!(channel = ?self.slack_channel, "slack digest sent");
                Ok(())
            }
            Ok(resp) => {
                tracing::warn!(status = %resp.status(), "slack digest failed");
                Err(format!("status {}", resp.status()))
            }
            Err(e) => {
                tracing::error!(error = %e, "slack digest error");
                Err(e.to_string())
            }
        }
    }

    async fn send_generic(&self, url: &str, text: &str, reports: &[&Report]) -> Result<(), String> {
        let payload = json!({
            "source": "error-digest",
            "date": reports.first().map(|r| r.date),
            "text": text,
            "reports": reports,
        });

        match self.client.post(url).json(&payload).send().await {
            Ok(resp) if resp.status().is_success() => {
                tracing::info!("webhook digest sent");
                Ok(())
            }
            Ok(resp) => {
                tracing::warn!(status = %resp.status(), "webhook digest failed");
                Err(format!("status {}", resp.status()))
            }
            Err(e) => {
                tracing::error!(error = %e, "webhook digest error");
                Err(e.to_string())
            }
        }
    }

    async fn send_email(&self, subject: &str, text: &str) -> Result<(), String> {
        let (Some(transport), Some(from)) = (&self.smtp_transport, &self.smtp_from) else {
            return Err("SMTP not configured".to_string());
        };

        let mut builder = lettre::Message::builder()
            .from(from.parse::<Mailbox>().map_err(|e| format!("invalid sender {from}: {e}"))?)
            .subject(subject);
        for to in &self.email_to {
            builder = builder.to(to.parse::<Mailbox>().map_err(|e| format!("invalid recipient {to}: {e}"))?);
        }
        let email = builder
            .body(text.to_string())
            .map_err(|e| format!("failed to build email: {e}"))?;

        use lettre::AsyncTransport;
        match transport.send(email).await {
            Ok(_) => {
                tracing::info!(recipients = self.email_to.len(), "email digest sent");
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "email digest failed");
                Err(e.to_string())
            }
        }
    }
}

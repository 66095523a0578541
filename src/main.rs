use chrono::{NaiveDate, NaiveTime, Utc};
use clap::Parser;
use error_digest::config::AppConfig;
use error_digest::delivery::dispatch::ReportDispatcher;
use error_digest::error::ReportError;
use error_digest::report::kibana::KibanaLinks;
use error_digest::report::render::SlackRenderer;
use error_digest::search::client::ElasticClient;
use error_digest::stats::assembler::{assemble_report, run_bounded};
use error_digest::types::ReportMode;
use std::time::Duration;
use tokio::signal;

#[derive(Parser)]
#[command(
    name = "error-digest",
    about = "Daily error trend digest for Elasticsearch log indices"
)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Report on the day before this date (YYYY-MM-DD) instead of yesterday
    #[arg(long)]
    date: Option<NaiveDate>,

    /// Print the digest to stdout instead of delivering it
    #[arg(long)]
    dry_run: bool,

    /// Add the warnings section regardless of report.warning_mode
    #[arg(long)]
    warnings: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "error_digest=info".into()),
        )
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = Cli::parse();
    let mut config = AppConfig::load(Some(&cli.config))?;
    if cli.warnings {
        config.report.warning_mode = true;
    }

    if let Err(msg) = config.validate(cli.dry_run) {
        eprintln!("Configuration error: {msg}");
        return Err(msg.into());
    }

    let reference = match cli.date {
        Some(date) => date.and_time(NaiveTime::MIN).and_utc(),
        None => Utc::now(),
    };

    tracing::info!(
        urls = ?config.elasticsearch.urls,
        index = %config.elasticsearch.index,
        warning_mode = config.report.warning_mode,
        reference = %reference,
        "starting error-digest"
    );

    let client = ElasticClient::new(&config.elasticsearch)?;
    let dispatcher = if cli.dry_run {
        None
    } else {
        Some(ReportDispatcher::new(&config.delivery)?)
    };
    let deadline = Duration::from_secs(config.elasticsearch.timeout_secs);

    let work = async {
        let errors = assemble_report(&client, &config.report, ReportMode::Errors, reference).await?;

        let warnings = if config.report.warning_mode {
            match assemble_report(&client, &config.report, ReportMode::Warnings, reference).await {
                Ok(report) => Some(report),
                Err(e) => {
                    tracing::error!(error = %e, "warnings report failed, sending errors only");
                    None
                }
            }
        } else {
            None
        };

        let kibana = match &config.elasticsearch.kibana_url {
            Some(url) => match client.kibana_index_pattern().await {
                Ok(pattern) => {
                    tracing::info!(index_pattern = %pattern, "kibana index pattern resolved");
                    Some(KibanaLinks::new(url, pattern))
                }
                Err(e) => {
                    tracing::warn!(error = %e, "kibana index pattern lookup failed, links disabled");
                    None
                }
            },
            None => None,
        };

        Ok::<_, ReportError>((errors, warnings, kibana))
    };

    let (errors, warnings, kibana) = match run_bounded(work, deadline, shutdown_signal()).await {
        Ok(result) => result,
        Err(e) => {
            tracing::error!(error = %e, "report assembly failed");
            return Err(e.into());
        }
    };

    let text = SlackRenderer::new(&config.report, kibana).render(&errors, warnings.as_ref());

    match dispatcher {
        None => println!("{text}"),
        Some(dispatcher) => {
            let mut reports = vec![&errors];
            reports.extend(warnings.as_ref());
            if let Err(e) = dispatcher.deliver(&text, &reports).await {
                tracing::error!(error = %e, "digest delivery failed");
                return Err(e.into());
            }
        }
    }

    tracing::info!(date = %errors.date, "digest complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C"),
        _ = terminate => tracing::info!("received SIGTERM"),
    }
}

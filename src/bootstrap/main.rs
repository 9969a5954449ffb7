//! Index bootstrap.
//!
//! Loads the configured schemas and reconciles the cluster's aliases and
//! indices with them, creating, updating or reindexing as needed.

mod config;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use larch::elasticsearch::EsClient;
use larch::lifecycle::{IndexLifecycle, ReconcileReport};
use larch::notify::Webhook;
use larch::scripts::DirScriptRepository;

use crate::config::Config;

#[derive(Parser, Debug)]
#[command(name = "bootstrap")]
#[command(about = "Reconcile Elasticsearch indices with their schemas")]
struct Args {
    /// Config file
    #[arg(short, long, default_value = "larch.toml")]
    config: PathBuf,

    /// Elasticsearch URL, overrides the config file
    #[arg(long)]
    es_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = Config::load_from_file(&args.config)?;
    if let Some(es_url) = args.es_url {
        config.cluster.url = es_url;
    }

    info!("Larch index bootstrap");
    info!("Cluster: {}", config.cluster.url);

    let schemas = config.load_schemas()?;
    if schemas.is_empty() {
        warn!("No resources configured in {}", args.config.display());
    }

    let es_client = EsClient::new(&config.cluster).context("Failed to connect to Elasticsearch")?;
    let scripts = DirScriptRepository::new(&config.migrations.dir);
    let webhook = config.notify.webhook_url.clone().map(Webhook::new);

    let result = match IndexLifecycle::connect(es_client, scripts).await {
        Ok(lifecycle) => {
            let lifecycle = lifecycle.with_timeouts(config.timeouts.operation_timeouts());
            let result = lifecycle.bootstrap(&schemas).await;
            if let Ok(reports) = &result {
                log_reports(lifecycle.gateway(), reports).await;
            }
            result
        }
        Err(e) => Err(e),
    };

    if let Some(ref webhook) = webhook {
        webhook.report(&result).await;
    }

    result.context("Index bootstrap failed")?;
    info!("Index bootstrap complete");
    Ok(())
}

async fn log_reports(client: &EsClient, reports: &[ReconcileReport]) {
    for report in reports {
        match client.doc_count(&report.alias).await {
            Ok(count) => info!(
                "{} -> {}: {} ({} documents)",
                report.alias, report.index, report.outcome, count
            ),
            Err(e) => warn!(
                "{} -> {}: {} (document count unavailable: {})",
                report.alias, report.index, report.outcome, e
            ),
        }
    }
}

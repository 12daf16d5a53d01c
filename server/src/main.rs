//! The alerting daemon: loads config, wires the SQLite-backed stores into
//! the `alertcenter-core` engine, and serves the §6 admin HTTP API.
//! Grounded on the teacher's CLI-crate convention of a small derived args
//! struct plus a single `#[tokio::main]` entry point.

mod error;
mod gateway;
mod logging;
mod routes;
mod state;

use std::path::PathBuf;
use std::sync::Arc;

use alertcenter_core::active::ActiveAlertManager;
use alertcenter_core::analyzer::{Analyzer, ForwardingAnalyzer};
use alertcenter_core::caller::VoiceCaller;
use alertcenter_core::notifier::NotifierRegistry;
use alertcenter_core::profile::ProfileCache;
use alertcenter_core::webhook::{CardWebhookSink, PlainTextWebhookSink};
use alertcenter_core::Config;
use alertcenter_store::{SqliteAnalyzerResultStore, SqliteDutyStore, SqliteHistoryStore, SqliteProfileStore};
use anyhow::Context;
use clap::Parser;
use tokio::sync::mpsc;

use crate::gateway::HttpVoiceGateway;
use crate::state::AppState;

#[derive(Parser, Debug)]
#[command(name = "alertcenter-server")]
#[command(about = "Alert routing and escalation center")]
struct Args {
    /// Path to the JSON config file.
    #[arg(long)]
    config: PathBuf,
}

async fn load_config(path: &PathBuf) -> anyhow::Result<Config> {
    let raw = tokio::fs::read_to_string(path).await.context("reading config file")?;
    serde_json::from_str(&raw).context("parsing config file")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = load_config(&args.config).await?;
    logging::init(&config.debug_level);

    let database_url = if config.history.database_url.is_empty() {
        "sqlite://run/alertcenter.db".to_string()
    } else {
        config.history.database_url.clone()
    };
    let pool = alertcenter_store::pool::connect(&database_url).await.context("connecting to sqlite store")?;

    let history = Arc::new(SqliteHistoryStore::new(pool.clone()));
    let profile_store = Arc::new(SqliteProfileStore::new(pool.clone()));
    let duty_store = Arc::new(SqliteDutyStore::new(pool.clone()));
    let analyzer_store = Arc::new(SqliteAnalyzerResultStore::new(pool));

    let profiles = ProfileCache::new(profile_store);
    profiles.advance().await.context("loading initial profile cache")?;
    profiles.spawn_reloader(std::time::Duration::from_millis(config.alerts_profile.auto_reload_ms.max(1_000) as u64));

    let (ingest_tx, mut ingest_rx) = mpsc::channel(config.msg_backlog);

    let active = ActiveAlertManager::load(
        config.alert_active.clone(),
        history.clone(),
        ingest_tx.clone(),
        PathBuf::from(&config.alert_active.backup_file),
    )
    .await
    .context("restoring active-alert snapshot")?;
    active.spawn_backup_task();

    let gateway = Arc::new(
        HttpVoiceGateway::new(config.caller.gateway_url.clone(), config.caller.gateway_timeout_secs)
            .context("building voice gateway client")?,
    );
    let caller = VoiceCaller::load(
        config.caller.clone(),
        duty_store.clone(),
        gateway,
        ingest_tx.clone(),
        PathBuf::from(&config.caller.state_file),
    )
    .await
    .context("restoring voice caller state")?;

    let mut notifiers = NotifierRegistry::new(profiles.clone(), config.notifiers.default_sinks.clone());
    for card_cfg in &config.notifiers.card_webhooks {
        let sink: Arc<dyn alertcenter_core::notifier::NotificationSink> =
            Arc::new(CardWebhookSink::new(card_cfg.clone()).context("building card webhook sink")?);
        if config.notifiers.must_sinks.iter().any(|m| m == card_cfg.name.as_str()) {
            notifiers.register_must(sink.clone());
        }
        notifiers.register(sink);
    }
    for text_cfg in &config.notifiers.plain_text_webhooks {
        let sink: Arc<dyn alertcenter_core::notifier::NotificationSink> =
            Arc::new(PlainTextWebhookSink::new(text_cfg.clone()).context("building plain-text webhook sink")?);
        if config.notifiers.must_sinks.iter().any(|m| m == text_cfg.name.as_str()) {
            notifiers.register_must(sink.clone());
        }
        notifiers.register(sink);
    }
    notifiers.register(caller.clone());
    let notifiers = Arc::new(notifiers);

    let mut analyzers: Vec<Arc<dyn Analyzer>> = Vec::new();
    if let Some(forward_cfg) = config.analyzers.sg_forward.clone() {
        analyzers.push(Arc::new(ForwardingAnalyzer::new(forward_cfg, analyzer_store)));
    }
    let analyzers = Arc::new(analyzers);

    {
        let notifiers = notifiers.clone();
        tokio::spawn(async move {
            while let Some(message) = ingest_rx.recv().await {
                notifiers.notify(message).await;
            }
        });
    }

    let app_state = AppState {
        active,
        profiles,
        history,
        duty: duty_store,
        caller,
        notifiers,
        analyzers,
        ingest_sender: ingest_tx,
    };

    let router = routes::router(app_state);
    let listener = tokio::net::TcpListener::bind(&config.bind_host).await.context("binding HTTP listener")?;
    tracing::info!(bind_host = %config.bind_host, "alertcenter-server listening");
    axum::serve(listener, router).await.context("serving HTTP API")?;

    Ok(())
}

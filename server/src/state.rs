//! Shared app state handed to every route handler via axum's `State`
//! extractor, grounded on the `State`-holding-shared-state shape used
//! throughout `other_examples`' axum handlers (mechanics only, not prose).

use std::sync::Arc;

use alertcenter_core::active::ActiveAlertManager;
use alertcenter_core::analyzer::Analyzer;
use alertcenter_core::caller::VoiceCaller;
use alertcenter_core::duty::DutyStore;
use alertcenter_core::history::HistoryStore;
use alertcenter_core::notifier::NotifierRegistry;
use alertcenter_core::profile::ProfileCache;
use alertcenter_core::Message;
use tokio::sync::mpsc;

#[derive(Clone)]
pub struct AppState {
    pub active: Arc<ActiveAlertManager>,
    pub profiles: Arc<ProfileCache>,
    pub history: Arc<dyn HistoryStore>,
    pub duty: Arc<dyn DutyStore>,
    pub caller: Arc<VoiceCaller>,
    pub notifiers: Arc<NotifierRegistry>,
    pub analyzers: Arc<Vec<Arc<dyn Analyzer>>>,
    pub ingest_sender: mpsc::Sender<Message>,
}

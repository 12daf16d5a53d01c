//! Tracing setup, grounded on the pack's `tracing_subscriber::registry()` +
//! `EnvFilter` + `fmt::layer()` init pattern: `RUST_LOG` wins if set, else we
//! fall back to `alertcenter_server=<debug_level>`.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

pub fn init(debug_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("alertcenter_server={debug_level},alertcenter_core={debug_level}")));

    tracing_subscriber::registry().with(filter).with(tracing_subscriber::fmt::layer()).init();
}

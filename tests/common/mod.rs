// Shared helpers for integration tests
#![allow(dead_code)]

use ironbeam_files::storage::ObjectReader;
use ironbeam_files::{ConnectorResult, Fetcher, ReaderConfig, Record, Slicer};
use std::sync::Once;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

static TRACING: Once = Once::new();

/// Install a test-writer subscriber filtered by `RUST_LOG` (default `warn`).
pub fn init_tracing() {
    TRACING.call_once(|| {
        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let fmt_layer = tracing_subscriber::fmt::layer().with_test_writer();
        let _ = tracing_subscriber::registry()
            .with(fmt_layer)
            .with(env_filter)
            .try_init();
    });
}

/// Slice everything under `config.path` and read every slice, in order.
pub fn read_all<S: ObjectReader + Clone>(storage: &S, config: &ReaderConfig) -> ConnectorResult<Vec<Record>> {
    let mut slicer = Slicer::new(storage.clone(), config.clone())?;
    let fetcher = Fetcher::new(storage.clone(), config)?;
    let mut records = Vec::new();
    while let Some(slices) = slicer.slice()? {
        for slice in &slices {
            records.extend(fetcher.read(slice)?);
        }
    }
    Ok(records)
}

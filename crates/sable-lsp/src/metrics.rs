//! In-process counters.
//!
//! Counters are grouped into categories (`lsp.messages.processed`,
//! `lsp.slow_path_reason`, ...) and flushed through `tracing` once per
//! telemetry interval by the main loop.

use std::collections::BTreeMap;
use std::time::Duration;

use once_cell::sync::Lazy;
use parking_lot::Mutex;

/// How often the main loop flushes counters.
pub const FLUSH_INTERVAL: Duration = Duration::from_secs(5 * 60);

static GLOBAL: Lazy<MetricsRegistry> = Lazy::new(MetricsRegistry::default);

#[derive(Default)]
pub struct MetricsRegistry {
    counters: Mutex<BTreeMap<String, u64>>,
}

pub fn global() -> &'static MetricsRegistry {
    &GLOBAL
}

impl MetricsRegistry {
    pub fn increment(&self, category: &str, name: &str) {
        self.add(category, name, 1);
    }

    pub fn add(&self, category: &str, name: &str, value: u64) {
        let mut counters = self.counters.lock();
        *counters.entry(format!("{category}.{name}")).or_insert(0) += value;
    }

    pub fn snapshot(&self) -> BTreeMap<String, u64> {
        self.counters.lock().clone()
    }

    /// Logs and clears every counter.
    pub fn flush_to_log(&self) {
        let counters = std::mem::take(&mut *self.counters.lock());
        for (name, value) in counters {
            tracing::info!(target = "sable.metrics", counter = %name, value, "flush");
        }
    }
}

use tracing::info;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Registry, fmt, reload};

/// Owns the global tracing subscriber. The reload handle lets the
/// debugger change the filter while the emulator is running.
pub struct Logger {
    reload_handle: reload::Handle<EnvFilter, Registry>,
}

impl Logger {
    pub fn new(initial_level: &str) -> Self {
        let filter = EnvFilter::new(initial_level);
        let (filter_layer, reload_handle) = reload::Layer::new(filter);

        tracing_subscriber::registry()
            .with(filter_layer)
            .with(fmt::layer())
            .init();

        Self { reload_handle }
    }

    pub fn set_log_level(&self, level: &str) {
        match self.reload_handle.modify(|f| *f = EnvFilter::new(level)) {
            Ok(()) => info!("Log level set to {level}"),
            Err(e) => info!("Unable to change log level: {e}"),
        }
    }
}

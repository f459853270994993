use std::collections::VecDeque;
use std::sync::Once;

use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Tags every message with a fixed chain of prefixes, e.g. the source name.
#[derive(Debug, Clone, Default)]
pub struct Logger {
    prefixes: VecDeque<String>,
}

impl Logger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefix(mut self, prefix: String) -> Self {
        self.prefixes.push_back(prefix);
        self
    }

    fn prefix(&self) -> String {
        self.prefixes.iter().map(|p| format!("{} ", p)).collect()
    }

    pub fn info(&self, message: &str) {
        tracing::info!("{}{}", self.prefix(), message);
    }

    pub fn error(&self, message: &str) {
        tracing::error!("{}{}", self.prefix(), message);
    }

    pub fn warn(&self, message: &str) {
        tracing::warn!("{}{}", self.prefix(), message);
    }

    pub fn debug(&self, message: &str) {
        tracing::debug!("{}{}", self.prefix(), message);
    }
}

/// Installs the global subscriber once. `RUST_LOG` wins over `verbose`.
pub fn init_logging(verbose: bool, json: bool) -> Logger {
    if !tracing::dispatcher::has_been_set() {
        INIT.call_once(|| {
            let default_level = if verbose { "debug" } else { "info" };
            let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
            let builder = tracing_subscriber::fmt().with_env_filter(filter);
            let _ = if json {
                builder.json().try_init()
            } else {
                builder.try_init()
            };
        });
    }
    Logger::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_chain() {
        let logger = Logger::new().with_prefix("[TechCrunch]".into()).with_prefix("fetch".into());
        assert_eq!(logger.prefix(), "[TechCrunch] fetch ");
    }

    #[test]
    fn test_init_logging_twice() {
        init_logging(false, false);
        init_logging(true, true).info("second init is a no-op");
    }
}

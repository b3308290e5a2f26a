//! # Logging
//!
//! Every component is handed a [`Logger`] when it is built and emits its
//! diagnostics inside that logger's scope. `main` installs the process-wide
//! sink once; tests hand components a recording logger instead.

use std::fmt;

use tracing::Dispatch;
use tracing_subscriber::EnvFilter;

#[derive(Clone)]
pub struct Logger {
    dispatch: Dispatch,
}

impl Logger {
    pub fn new(dispatch: Dispatch) -> Self {
        Logger { dispatch }
    }

    /// Whatever subscriber is the default on this thread right now.
    pub fn current() -> Self {
        Logger::new(tracing::dispatcher::get_default(|dispatch| dispatch.clone()))
    }

    /// Drops everything.
    pub fn silent() -> Self {
        Logger::new(Dispatch::none())
    }

    /// Run `f` with this logger as the active subscriber.
    pub fn scope<R>(&self, f: impl FnOnce() -> R) -> R {
        tracing::dispatcher::with_default(&self.dispatch, f)
    }
}

impl Default for Logger {
    fn default() -> Self {
        Logger::current()
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger").finish_non_exhaustive()
    }
}

/// Install the global fmt subscriber. `RUST_LOG` wins over `verbose`.
pub fn init(verbose: bool) {
    let fallback = if verbose { "debug" } else { "info" };
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::new(fallback),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}


#[cfg(test)]
mod tests {
    use super::testing::Recorded;
    use super::*;

    #[test]
    fn scoped_logger_only_sees_its_own_events() {
        let recorded = Recorded::default();
        let logger = recorded.logger();

        tracing::info!("outside");
        logger.scope(|| tracing::warn!(device = "D1", "inside"));

        let records = recorded.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].level, tracing::Level::WARN);
        assert!(records[0].message.starts_with("inside"));
        assert!(records[0].message.contains("device=\"D1\""));
    }

    #[test]
    fn silent_logger_drops_events() {
        Logger::silent().scope(|| tracing::error!("nobody hears this"));
    }
}

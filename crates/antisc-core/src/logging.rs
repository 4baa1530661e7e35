use crate::Result;

/// Initialize the process-wide tracing subscriber.
///
/// Core components never log through this directly; they receive a
/// [`Logger`] handle in their constructors.
pub fn init(service_name: &str) -> Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    // Default: info for our crates, warn for everything else.
    // Can be overridden with `RUST_LOG`.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,antisc=info,antisc_core=info,antisc_telegram=info,{service_name}=info"
        ))
    });

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(true)
        .try_init()
        .map_err(|e| crate::Error::Config(format!("logging init failed: {e}")))?;

    Ok(())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

/// Leveled logging collaborator threaded through the core.
///
/// `component` is a short tag such as `"pipeline"` or `"deleter"`.
pub trait Logger: Send + Sync {
    fn log(&self, level: Level, component: &str, message: &str);

    fn debug(&self, component: &str, message: &str) {
        self.log(Level::Debug, component, message);
    }

    fn info(&self, component: &str, message: &str) {
        self.log(Level::Info, component, message);
    }

    fn warn(&self, component: &str, message: &str) {
        self.log(Level::Warn, component, message);
    }

    fn error(&self, component: &str, message: &str) {
        self.log(Level::Error, component, message);
    }
}

/// Forwards to the `tracing` subscriber installed by [`init`].
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, level: Level, component: &str, message: &str) {
        match level {
            Level::Debug => tracing::debug!(component, "{message}"),
            Level::Info => tracing::info!(component, "{message}"),
            Level::Warn => tracing::warn!(component, "{message}"),
            Level::Error => tracing::error!(component, "{message}"),
        }
    }
}

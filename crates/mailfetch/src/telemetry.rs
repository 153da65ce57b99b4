//! Logging setup for the host binary.

use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

use crate::error::MailfetchError;

/// Installs the global subscriber and routes `log` records into it.
///
/// `RUST_LOG` wins over `default_level` when set.
pub fn init_logging(default_level: &str) -> Result<(), MailfetchError> {
    tracing_log::LogTracer::init().map_err(|e| MailfetchError::Logging(e.to_string()))?;

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| MailfetchError::Logging(e.to_string()))?;
    let fmt_layer = fmt::layer().with_target(false);

    let subscriber = Registry::default().with(env_filter).with(fmt_layer);
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| MailfetchError::Logging(e.to_string()))?;

    tracing::debug!("Logging initialised at '{}'", default_level);
    Ok(())
}

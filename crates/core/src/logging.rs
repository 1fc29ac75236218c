//! Logging initialization.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Default filter when `RUST_LOG` is unset.
const DEFAULT_FILTER: &str = "info,vkframe=debug,vkframe_rhi=debug,vkframe_renderer=debug";

/// Installs the global tracing subscriber.
///
/// Filtering comes from `RUST_LOG` when set, otherwise [`DEFAULT_FILTER`].
/// Calling this twice is harmless: the second install attempt is ignored.
///
/// # Example
/// ```
/// vkframe_core::init_logging();
/// tracing::info!("renderer starting");
/// ```
pub fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_parses() {
        assert!(EnvFilter::try_new(DEFAULT_FILTER).is_ok());
    }

    #[test]
    fn test_init_twice_does_not_panic() {
        init_logging();
        init_logging();
    }
}

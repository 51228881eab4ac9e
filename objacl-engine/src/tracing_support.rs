//! Subscriber setup for applications embedding the engine.
//!
//! The engine itself only emits `tracing` events. Applications that do not
//! install their own subscriber can call one of the initializers here.

#[cfg(feature = "subscriber")]
use serde::{Deserialize, Serialize};
#[cfg(feature = "subscriber")]
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when neither the config nor `RUST_LOG` names one.
#[cfg(feature = "subscriber")]
pub const DEFAULT_FILTER: &str = "objacl_engine=info";

/// Log output format.
#[cfg(feature = "subscriber")]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TracingFormat {
    /// Human-readable multi-line output.
    Pretty,

    /// Single-line output.
    Compact,

    /// One JSON object per event (for log shipping).
    Json,
}

/// Subscriber configuration.
#[cfg(feature = "subscriber")]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TracingConfig {
    /// `EnvFilter` directives, e.g. `"objacl_engine=debug"`.
    ///
    /// If None, uses RUST_LOG or falls back to [`DEFAULT_FILTER`].
    pub filter: Option<String>,

    pub format: TracingFormat,

    /// Include timestamps in output.
    pub timestamps: bool,

    /// Include target module names in output.
    pub target: bool,

    pub thread_ids: bool,
}

#[cfg(feature = "subscriber")]
impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            filter: None,
            format: TracingFormat::Compact,
            timestamps: true,
            target: true,
            thread_ids: false,
        }
    }
}

#[cfg(feature = "subscriber")]
impl TracingConfig {
    fn env_filter(&self) -> EnvFilter {
        match &self.filter {
            Some(directives) => EnvFilter::new(directives),
            None => EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
        }
    }
}

/// Install a compact subscriber filtered by `RUST_LOG`.
///
/// Returns false if a global subscriber was already set.
///
/// # Environment Variables
///
/// - `RUST_LOG=objacl_engine=debug` - ACL decisions and pruning
/// - `RUST_LOG=objacl_engine=trace` - every association visited
#[cfg(feature = "subscriber")]
pub fn init_subscriber() -> bool {
    init_subscriber_with_config(TracingConfig::default())
}

/// Install a subscriber built from `config`.
///
/// Returns false if a global subscriber was already set.
#[cfg(feature = "subscriber")]
pub fn init_subscriber_with_config(config: TracingConfig) -> bool {
    let filter = config.env_filter();
    let registry = tracing_subscriber::registry().with(filter);

    let result = match (config.format, config.timestamps) {
        (TracingFormat::Pretty, true) => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .pretty()
                    .with_target(config.target)
                    .with_thread_ids(config.thread_ids),
            )
            .try_init(),
        (TracingFormat::Pretty, false) => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .pretty()
                    .without_time()
                    .with_target(config.target)
                    .with_thread_ids(config.thread_ids),
            )
            .try_init(),
        (TracingFormat::Compact, true) => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_target(config.target)
                    .with_thread_ids(config.thread_ids),
            )
            .try_init(),
        (TracingFormat::Compact, false) => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .without_time()
                    .with_target(config.target)
                    .with_thread_ids(config.thread_ids),
            )
            .try_init(),
        (TracingFormat::Json, true) => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(config.target)
                    .with_thread_ids(config.thread_ids),
            )
            .try_init(),
        (TracingFormat::Json, false) => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .without_time()
                    .with_target(config.target)
                    .with_thread_ids(config.thread_ids),
            )
            .try_init(),
    };
    result.is_ok()
}

// Fallback when the subscriber feature is disabled
#[cfg(not(feature = "subscriber"))]
pub fn init_subscriber() -> bool {
    false
}

use std::path::PathBuf;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Core configuration.
#[derive(Debug)]
pub struct Config {
    /// a path to a sqlite database, if not set then an
    ///  in-memory database will be used
    pub sqlite_path: Option<PathBuf>,

    // misc
    pub log_level: tracing::Level,

    /// retention policy for the grant cleanup sweeps
    pub retention: RetentionConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sqlite_path: None,
            log_level: tracing::Level::INFO,
            retention: RetentionConfig::default(),
        }
    }
}

/// Policy knobs for the external retention sweep.
///
/// Revoked and expired grants are deactivated rather than deleted to
/// keep the audit trail; these settings bound how long inactive rows
/// linger and how large each sweep transaction may get.
#[derive(Debug, Clone, Copy)]
pub struct RetentionConfig {
    /// days to keep inactive grants before the purge deletes them
    pub inactive_retention_days: i64,
    /// days to keep expired-but-active grants before deactivation is
    /// considered overdue (informational; the sweep deactivates on
    /// every run regardless)
    pub expired_retention_days: i64,
    /// rows per sweep transaction
    pub page_size: i64,
    /// upper bound on rows processed in a single sweep run
    pub max_per_run: i64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            inactive_retention_days: 90,
            expired_retention_days: 30,
            page_size: 1000,
            max_per_run: 10_000,
        }
    }
}

/// Install a compact stdout tracing subscriber honoring `RUST_LOG`.
pub fn register_tracing(log_level: tracing::Level) {
    let env_filter = EnvFilter::builder()
        .with_default_directive(log_level.into())
        .from_env_lossy();

    let stdout_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_filter(env_filter);

    tracing_subscriber::registry().with(stdout_layer).init();
}

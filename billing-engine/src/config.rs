//! Engine configuration, layered the way `config` crate consumers
//! usually are: built-in defaults, overridden by an optional config
//! file, overridden by `BILLING_` prefixed environment variables.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Snowflake-shaped id minter node id, must be unique per running
    /// process in a deployment.
    pub node_id: i64,

    /// Postgres connection string for the append-only aggregates
    /// (invoices, ledger entries, payment webhook events, job runs). If
    /// absent, the engine runs entirely against in-memory stores — fine
    /// for local development and the test-clock simulation harness, not
    /// for a real deployment.
    pub database_url: Option<String>,

    pub scheduler: SchedulerConfig,

    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// How often the cycle-close / rate / invoice / auto-charge-retry /
    /// dunning pipeline ticks, in seconds.
    pub pipeline_interval_secs: u64,
    /// How often `evaluate_slas` ticks, in seconds.
    pub sla_interval_secs: u64,
    /// How often `aggregate_performance` ticks, in seconds.
    pub performance_interval_secs: u64,
    /// How often `cleanup_webhook_logs` ticks, in seconds.
    pub cleanup_interval_secs: u64,
    /// Rows older than this are purged by `cleanup_webhook_logs`.
    pub webhook_retention_days: i64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            pipeline_interval_secs: 60,
            sla_interval_secs: 3600,
            performance_interval_secs: 3600,
            cleanup_interval_secs: 86_400,
            webhook_retention_days: 90,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive, e.g. "billing=info".
    pub filter: String,
    /// Emit JSON-formatted log lines instead of the human-readable
    /// default; production deployments want this for log aggregation.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { filter: "billing=info".to_string(), json: true }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            node_id: 1,
            database_url: None,
            scheduler: SchedulerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Loads configuration from (in increasing precedence) built-in
    /// defaults, `./billing-engine.toml` if present, and `BILLING_*`
    /// environment variables (e.g. `BILLING_NODE_ID=2`,
    /// `BILLING_DATABASE_URL=postgres://...`,
    /// `BILLING_SCHEDULER__PIPELINE_INTERVAL_SECS=30`).
    pub fn load() -> Result<Self, config::ConfigError> {
        let defaults = Self::default();
        let built = config::Config::builder()
            .add_source(config::Config::try_from(&defaults)?)
            .add_source(config::File::with_name("billing-engine").required(false))
            .add_source(config::Environment::with_prefix("BILLING").separator("__"))
            .build()?;
        built.try_deserialize()
    }
}

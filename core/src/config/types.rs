use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub pool: PoolConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_enabled")]
    pub enabled: bool,

    /// If true, log to stderr.
    #[serde(default = "default_logging_console")]
    pub console: bool,

    /// If true, log to a file under `directory` (or OS temp dir if unset).
    #[serde(default)]
    pub file: bool,

    /// EnvFilter string, e.g. "info" or "procpool_core=debug".
    #[serde(default = "default_logging_level")]
    pub level: String,

    /// Optional directory for log files. If empty or unset, uses OS temp dir.
    #[serde(default)]
    pub directory: Option<String>,
}

fn default_logging_enabled() -> bool {
    true
}

fn default_logging_console() -> bool {
    true
}

fn default_logging_level() -> String {
    "warn".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: default_logging_enabled(),
            console: default_logging_console(),
            file: false,
            level: default_logging_level(),
            directory: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Concurrent workers. Unset means one per host processor.
    #[serde(default)]
    pub workers: Option<usize>,

    /// Upper bound on how long a blocked worker sleeps before re-polling.
    #[serde(default = "default_idle_delay_ms")]
    pub idle_delay_ms: u64,

    /// Capacity of the finished-job channel behind `start_workers`.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Capacity of the per-process output chunk channel.
    #[serde(default = "default_tap_capacity")]
    pub tap_capacity: usize,

    /// Label understood by `encoding_rs`, used to decode captured output.
    #[serde(default = "default_encoding")]
    pub encoding: String,
}

fn default_idle_delay_ms() -> u64 {
    10
}

fn default_channel_capacity() -> usize {
    64
}

fn default_tap_capacity() -> usize {
    64
}

fn default_encoding() -> String {
    "utf-8".to_string()
}

impl PoolConfig {
    pub fn effective_workers(&self) -> usize {
        self.workers.unwrap_or_else(num_cpus::get).max(1)
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: None,
            idle_delay_ms: default_idle_delay_ms(),
            channel_capacity: default_channel_capacity(),
            tap_capacity: default_tap_capacity(),
            encoding: default_encoding(),
        }
    }
}

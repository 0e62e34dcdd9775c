//! Relayer configuration with TOML file support.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::NodeError;

/// Configuration for one relayer node.
///
/// Can be loaded from a TOML file via [`NodeConfig::from_toml_file`] or
/// built programmatically (e.g. for tests).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Explicit node id. When absent, one is derived from the host address.
    #[serde(default)]
    pub node_id: Option<String>,

    /// Data directory for the shared LMDB store.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// LMDB map size in bytes.
    #[serde(default = "default_map_size")]
    pub map_size: usize,

    /// Log format: "human" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub schedule: ScheduleConfig,

    #[serde(default)]
    pub executors: ExecutorConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Plugin servers bridging to each chain type.
    #[serde(default)]
    pub plugin_servers: Vec<PluginServerConfig>,

    #[serde(default = "default_plugin_heartbeat_interval_ms")]
    pub plugin_heartbeat_interval_ms: u64,

    /// Consecutive failed heartbeats before a plugin server is considered lost.
    #[serde(default = "default_plugin_heartbeat_max_misses")]
    pub plugin_heartbeat_max_misses: u32,
}

/// Timer periods and lease lengths, all in milliseconds.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_activate_interval_ms")]
    pub activate_interval_ms: u64,
    #[serde(default = "default_dispatch_interval_ms")]
    pub dispatch_interval_ms: u64,
    #[serde(default = "default_duty_interval_ms")]
    pub duty_interval_ms: u64,
    #[serde(default = "default_biz_duty_interval_ms")]
    pub biz_duty_interval_ms: u64,
    #[serde(default = "default_cleaner_interval_ms")]
    pub cleaner_interval_ms: u64,
    /// A node is online while its heartbeat is younger than this.
    #[serde(default = "default_node_ttl_ms")]
    pub node_ttl_ms: u64,
    /// Length of one lease.
    #[serde(default = "default_time_slice_ms")]
    pub time_slice_ms: u64,
    /// A dispatch lock older than this may be taken over.
    #[serde(default = "default_dispatch_lock_ttl_ms")]
    pub dispatch_lock_ttl_ms: u64,
}

/// Worker-pool size per task kind.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecutorConfig {
    #[serde(default = "default_pool_size")]
    pub anchor: usize,
    #[serde(default = "default_pool_size")]
    pub commit: usize,
    #[serde(default = "default_pool_size")]
    pub process: usize,
    #[serde(default = "default_pool_size")]
    pub confirm: usize,
    #[serde(default = "default_small_pool_size")]
    pub archive: usize,
    #[serde(default = "default_small_pool_size")]
    pub deploy: usize,
}

/// Batch sizes and knobs of the message pipeline.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_batch_size")]
    pub ucp_batch_size: usize,
    #[serde(default = "default_batch_size")]
    pub process_batch_size: usize,
    #[serde(default = "default_batch_size")]
    pub commit_batch_size: usize,
    #[serde(default = "default_batch_size")]
    pub confirm_batch_size: usize,
    /// Receipt queries in flight per confirm batch.
    #[serde(default = "default_confirm_concurrency")]
    pub confirm_concurrency: usize,
    #[serde(default = "default_archive_batch_size")]
    pub archive_batch_size: usize,
    #[serde(default = "default_anchor_max_blocks_per_round")]
    pub anchor_max_blocks_per_round: u64,
    /// Service id passed to `relay`.
    #[serde(default = "default_service_id")]
    pub service_id: String,
    /// Domains trusted as message sources besides the locally managed ones.
    #[serde(default)]
    pub trusted_remote_domains: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginServerConfig {
    pub id: String,
    pub url: String,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_data_dir() -> PathBuf {
    PathBuf::from("./xrelay_data")
}

fn default_map_size() -> usize {
    1 << 30
}

fn default_log_format() -> String {
    "human".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_plugin_heartbeat_interval_ms() -> u64 {
    5_000
}

fn default_plugin_heartbeat_max_misses() -> u32 {
    3
}

fn default_activate_interval_ms() -> u64 {
    3_000
}

fn default_dispatch_interval_ms() -> u64 {
    5_000
}

fn default_duty_interval_ms() -> u64 {
    1_000
}

fn default_biz_duty_interval_ms() -> u64 {
    3_000
}

fn default_cleaner_interval_ms() -> u64 {
    10_000
}

fn default_node_ttl_ms() -> u64 {
    30_000
}

fn default_time_slice_ms() -> u64 {
    60_000
}

fn default_dispatch_lock_ttl_ms() -> u64 {
    30_000
}

fn default_pool_size() -> usize {
    8
}

fn default_small_pool_size() -> usize {
    2
}

fn default_batch_size() -> usize {
    64
}

fn default_confirm_concurrency() -> usize {
    16
}

fn default_archive_batch_size() -> usize {
    256
}

fn default_anchor_max_blocks_per_round() -> u64 {
    16
}

fn default_service_id() -> String {
    "xrelay".to_string()
}

// ── Impl ───────────────────────────────────────────────────────────────

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: &str) -> Result<Self, NodeError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| NodeError::Config(e.to_string()))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, NodeError> {
        let config: Self = toml::from_str(s).map_err(|e| NodeError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> Result<String, NodeError> {
        toml::to_string_pretty(self).map_err(|e| NodeError::Config(e.to_string()))
    }

    /// Reject values the scheduler cannot run with.
    pub fn validate(&self) -> Result<(), NodeError> {
        let s = &self.schedule;
        let periods = [
            ("schedule.activate_interval_ms", s.activate_interval_ms),
            ("schedule.dispatch_interval_ms", s.dispatch_interval_ms),
            ("schedule.duty_interval_ms", s.duty_interval_ms),
            ("schedule.biz_duty_interval_ms", s.biz_duty_interval_ms),
            ("schedule.cleaner_interval_ms", s.cleaner_interval_ms),
            ("schedule.node_ttl_ms", s.node_ttl_ms),
            ("schedule.time_slice_ms", s.time_slice_ms),
            ("plugin_heartbeat_interval_ms", self.plugin_heartbeat_interval_ms),
        ];
        if let Some((name, _)) = periods.iter().find(|(_, v)| *v == 0) {
            return Err(NodeError::Config(format!("{name} must be positive")));
        }
        if self.pipeline.confirm_concurrency == 0 {
            return Err(NodeError::Config(
                "pipeline.confirm_concurrency must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: None,
            data_dir: default_data_dir(),
            map_size: default_map_size(),
            log_format: default_log_format(),
            log_level: default_log_level(),
            schedule: ScheduleConfig::default(),
            executors: ExecutorConfig::default(),
            pipeline: PipelineConfig::default(),
            plugin_servers: Vec::new(),
            plugin_heartbeat_interval_ms: default_plugin_heartbeat_interval_ms(),
            plugin_heartbeat_max_misses: default_plugin_heartbeat_max_misses(),
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            activate_interval_ms: default_activate_interval_ms(),
            dispatch_interval_ms: default_dispatch_interval_ms(),
            duty_interval_ms: default_duty_interval_ms(),
            biz_duty_interval_ms: default_biz_duty_interval_ms(),
            cleaner_interval_ms: default_cleaner_interval_ms(),
            node_ttl_ms: default_node_ttl_ms(),
            time_slice_ms: default_time_slice_ms(),
            dispatch_lock_ttl_ms: default_dispatch_lock_ttl_ms(),
        }
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            anchor: default_pool_size(),
            commit: default_pool_size(),
            process: default_pool_size(),
            confirm: default_pool_size(),
            archive: default_small_pool_size(),
            deploy: default_small_pool_size(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            ucp_batch_size: default_batch_size(),
            process_batch_size: default_batch_size(),
            commit_batch_size: default_batch_size(),
            confirm_batch_size: default_batch_size(),
            confirm_concurrency: default_confirm_concurrency(),
            archive_batch_size: default_archive_batch_size(),
            anchor_max_blocks_per_round: default_anchor_max_blocks_per_round(),
            service_id: default_service_id(),
            trusted_remote_domains: Vec::new(),
        }
    }
}

//! Engine configuration.
//!
//! A plain struct with the `sql.*` keys the engine honors; callers mutate the
//! fields directly or feed textual `key=value` pairs through
//! [`Config::apply`].

use crate::error::{ExecError, Result};

/// Engine configuration knobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Worker pool size (`sql.thread_pool_size`).
    pub thread_pool_size: usize,
    /// Default partition count per exchange (`sql.default_partitions`).
    pub default_partitions: usize,
    /// Enable work stealing (`sql.stealing_enabled`).
    pub stealing_enabled: bool,
    /// Local-queue checks before stealing (`sql.stealing_wait`).
    pub stealing_wait: usize,
    /// Worker busy-loop wait in iterations (`sql.task_polling_wait`).
    pub task_polling_wait: usize,
    /// Serialize very short jobs on the calling thread
    /// (`sql.enable_hybrid_scheduler`).
    pub enable_hybrid_scheduler: bool,
    /// Jobs below this level run inline (`sql.lightweight_job_level`).
    pub lightweight_job_level: u32,
    /// Workers never suspend when true (`sql.busy_worker`).
    pub busy_worker: bool,
    /// Queue checks before a worker suspends (`sql.worker_try_count`).
    pub worker_try_count: usize,
    /// Microseconds before a suspended worker wakes up
    /// (`sql.worker_suspend_timeout`).
    pub worker_suspend_timeout_us: u64,
    /// Microseconds between watcher polls (`sql.watcher_interval`).
    pub watcher_interval_us: u64,
    /// Records per scan cooperative yield (`sql.scan_block_size`).
    pub scan_block_size: u64,
    /// Milliseconds per scan cooperative yield (`sql.scan_yield_interval`).
    pub scan_yield_interval_ms: u64,
    /// Maximum scan task parallelism (`sql.scan_default_parallel`).
    pub scan_default_parallel: usize,
    /// Pin workers to cores (`sql.core_affinity`).
    pub core_affinity: bool,
    /// Spread workers across NUMA nodes
    /// (`sql.assign_numa_nodes_uniformly`).
    pub assign_numa_nodes_uniformly: bool,
    /// First core used when affinity is on (`sql.initial_core`).
    pub initial_core: usize,
    /// Enable int1/int2 casts (`sql.support_smallint`).
    pub support_smallint: bool,
    /// Enable boolean casts (`sql.support_boolean`).
    pub support_boolean: bool,
    /// Enable blob/clob casts (`sql.enable_blob_cast`).
    pub enable_blob_cast: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            thread_pool_size: std::thread::available_parallelism().map_or(4, |n| n.get()),
            default_partitions: 5,
            stealing_enabled: true,
            stealing_wait: 1,
            task_polling_wait: 0,
            enable_hybrid_scheduler: true,
            lightweight_job_level: 0,
            busy_worker: false,
            worker_try_count: 1000,
            worker_suspend_timeout_us: 1_000_000,
            watcher_interval_us: 1000,
            scan_block_size: 100,
            scan_yield_interval_ms: 1,
            scan_default_parallel: 1,
            core_affinity: false,
            assign_numa_nodes_uniformly: false,
            initial_core: 0,
            support_smallint: false,
            support_boolean: false,
            enable_blob_cast: true,
        }
    }
}

impl Config {
    /// Applies a textual `sql.*` key/value pair.
    pub fn apply(&mut self, key: &str, value: &str) -> Result<()> {
        fn parse<T: core::str::FromStr>(key: &str, value: &str) -> Result<T> {
            value.parse().map_err(|_| {
                ExecError::invalid_argument(format!("invalid value `{value}` for {key}"))
            })
        }

        match key {
            "sql.thread_pool_size" => self.thread_pool_size = parse(key, value)?,
            "sql.default_partitions" => self.default_partitions = parse(key, value)?,
            "sql.stealing_enabled" => self.stealing_enabled = parse(key, value)?,
            "sql.stealing_wait" => self.stealing_wait = parse(key, value)?,
            "sql.task_polling_wait" => self.task_polling_wait = parse(key, value)?,
            "sql.enable_hybrid_scheduler" => self.enable_hybrid_scheduler = parse(key, value)?,
            "sql.lightweight_job_level" => self.lightweight_job_level = parse(key, value)?,
            "sql.busy_worker" => self.busy_worker = parse(key, value)?,
            "sql.worker_try_count" => self.worker_try_count = parse(key, value)?,
            "sql.worker_suspend_timeout" => self.worker_suspend_timeout_us = parse(key, value)?,
            "sql.watcher_interval" => self.watcher_interval_us = parse(key, value)?,
            "sql.scan_block_size" => self.scan_block_size = parse(key, value)?,
            "sql.scan_yield_interval" => self.scan_yield_interval_ms = parse(key, value)?,
            "sql.scan_default_parallel" => self.scan_default_parallel = parse(key, value)?,
            "sql.core_affinity" => self.core_affinity = parse(key, value)?,
            "sql.assign_numa_nodes_uniformly" => {
                self.assign_numa_nodes_uniformly = parse(key, value)?
            }
            "sql.initial_core" => self.initial_core = parse(key, value)?,
            "sql.support_smallint" => self.support_smallint = parse(key, value)?,
            "sql.support_boolean" => self.support_boolean = parse(key, value)?,
            "sql.enable_blob_cast" => self.enable_blob_cast = parse(key, value)?,
            other => {
                return Err(ExecError::invalid_argument(format!(
                    "unknown configuration key: {other}"
                )))
            }
        }
        Ok(())
    }
}

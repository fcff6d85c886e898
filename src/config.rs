use crate::error::BridgeResult;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::{OnceLock, RwLock};

static CONFIG: OnceLock<RwLock<BridgeConfig>> = OnceLock::new();

/// Process-wide settings, read as a JSON document by `v8glue_configure`.
///
/// Every field is optional; missing fields keep their defaults.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct BridgeConfig {
    /// Maximum log level (`off`, `error`, `warn`, `info`, `debug`, `trace`).
    pub log_level: String,
    /// File to append logs to. Logs go to stderr when unset.
    pub log_file: Option<PathBuf>,
    /// Flags handed to the engine before it initializes, e.g. `--expose-gc`.
    pub v8_flags: Option<String>,
    /// Worker threads for the default platform. `0` picks the number of CPUs.
    pub thread_pool_size: u32,
    /// Whether the default platform runs idle tasks.
    pub idle_task_support: bool,
    /// Frames captured for uncaught exceptions on new isolates. `0` disables capture.
    pub capture_stack_trace_frames: i32,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        BridgeConfig {
            log_level: "info".to_owned(),
            log_file: None,
            v8_flags: None,
            thread_pool_size: 0,
            idle_task_support: false,
            capture_stack_trace_frames: 1024,
        }
    }
}

impl BridgeConfig {
    pub fn from_json(json: &str) -> BridgeResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn level_filter(&self) -> log::LevelFilter {
        self.log_level.parse().unwrap_or(log::LevelFilter::Info)
    }

    /// Background threads the engine platform should be sized for.
    pub fn background_threads(&self) -> u32 {
        if self.thread_pool_size > 0 {
            return self.thread_pool_size;
        }
        std::thread::available_parallelism()
            .map(|n| n.get() as u32)
            .unwrap_or(1)
    }
}

fn cell() -> &'static RwLock<BridgeConfig> {
    CONFIG.get_or_init(|| RwLock::new(BridgeConfig::default()))
}

/// Returns a snapshot of the active configuration.
pub fn current() -> BridgeConfig {
    match cell().read() {
        Ok(config) => config.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}

pub fn replace(config: BridgeConfig) {
    match cell().write() {
        Ok(mut guard) => *guard = config,
        Err(poisoned) => *poisoned.into_inner() = config,
    }
}

use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Wildcard watch synchronization parameters
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FuzzyWatchConfig {
    /// Maximum number of matched keys carried by one sync batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Debounce window of a sync notify task (ms)
    #[serde(default = "default_notify_delay_ms")]
    pub notify_delay_ms: u64,

    /// Delay before a failed sync notify is re-sent (ms)
    #[serde(default = "default_notify_retry_delay_ms")]
    pub notify_retry_delay_ms: u64,

    /// How long a client may take to acknowledge a sync request (ms)
    #[serde(default = "default_notify_timeout_ms")]
    pub notify_timeout_ms: u64,

    /// Scan interval of the sync delay-task engine loop (ms)
    #[serde(default = "default_task_process_interval_ms")]
    pub task_process_interval_ms: u64,

    /// Re-sends allowed for one sync task; 0 means unlimited
    #[serde(default = "default_max_retry_times")]
    pub max_retry_times: u32,
}

impl Default for FuzzyWatchConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            notify_delay_ms: default_notify_delay_ms(),
            notify_retry_delay_ms: default_notify_retry_delay_ms(),
            notify_timeout_ms: default_notify_timeout_ms(),
            task_process_interval_ms: default_task_process_interval_ms(),
            max_retry_times: default_max_retry_times(),
        }
    }
}

impl FuzzyWatchConfig {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::Config(ConfigError::Message(
                "fuzzy_watch.batch_size must be greater than 0".into(),
            )));
        }

        if self.task_process_interval_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "fuzzy_watch.task_process_interval_ms must be greater than 0".into(),
            )));
        }

        if self.notify_timeout_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "fuzzy_watch.notify_timeout_ms must be greater than 0".into(),
            )));
        }

        Ok(())
    }

    pub fn retries_exhausted(
        &self,
        retry_count: u32,
    ) -> bool {
        self.max_retry_times > 0 && retry_count >= self.max_retry_times
    }

    pub fn notify_delay(&self) -> Duration {
        Duration::from_millis(self.notify_delay_ms)
    }

    pub fn notify_retry_delay(&self) -> Duration {
        Duration::from_millis(self.notify_retry_delay_ms)
    }

    pub fn notify_timeout(&self) -> Duration {
        Duration::from_millis(self.notify_timeout_ms)
    }

    pub fn task_process_interval(&self) -> Duration {
        Duration::from_millis(self.task_process_interval_ms)
    }
}

fn default_batch_size() -> usize {
    10
}
fn default_notify_delay_ms() -> u64 {
    100
}
fn default_notify_retry_delay_ms() -> u64 {
    1000
}
fn default_notify_timeout_ms() -> u64 {
    3000
}
fn default_task_process_interval_ms() -> u64 {
    100
}
fn default_max_retry_times() -> u32 {
    50
}

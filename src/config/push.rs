use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Debounce and retry parameters of the service push path
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PushConfig {
    /// Master switch; when disabled, executed push tasks are dropped
    #[serde(default = "default_push_enabled")]
    pub push_enabled: bool,

    /// Debounce window applied to a freshly submitted push task (ms)
    #[serde(default = "default_push_task_delay_ms")]
    pub push_task_delay_ms: u64,

    /// Delay before a failed push is attempted again (ms)
    #[serde(default = "default_push_task_retry_delay_ms")]
    pub push_task_retry_delay_ms: u64,

    /// How long a client may take to acknowledge a push (ms)
    #[serde(default = "default_push_task_timeout_ms")]
    pub push_task_timeout_ms: u64,

    /// Scan interval of the delay-task engine loop (ms)
    #[serde(default = "default_task_process_interval_ms")]
    pub task_process_interval_ms: u64,

    /// Re-pushes allowed per client after a failed delivery; 0 means unlimited
    #[serde(default = "default_max_retry_times")]
    pub max_retry_times: u32,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            push_enabled: default_push_enabled(),
            push_task_delay_ms: default_push_task_delay_ms(),
            push_task_retry_delay_ms: default_push_task_retry_delay_ms(),
            push_task_timeout_ms: default_push_task_timeout_ms(),
            task_process_interval_ms: default_task_process_interval_ms(),
            max_retry_times: default_max_retry_times(),
        }
    }
}

impl PushConfig {
    pub fn validate(&self) -> Result<()> {
        if self.task_process_interval_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "push.task_process_interval_ms must be greater than 0".into(),
            )));
        }

        if self.push_task_timeout_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "push.push_task_timeout_ms must be greater than 0".into(),
            )));
        }

        if self.push_task_retry_delay_ms < self.task_process_interval_ms {
            return Err(Error::Config(ConfigError::Message(format!(
                "push.push_task_retry_delay_ms ({}) must not be shorter than task_process_interval_ms ({})",
                self.push_task_retry_delay_ms, self.task_process_interval_ms
            ))));
        }

        Ok(())
    }

    /// True once a task that already failed `retry_count` times may not be
    /// pushed again.
    pub fn retries_exhausted(
        &self,
        retry_count: u32,
    ) -> bool {
        self.max_retry_times > 0 && retry_count >= self.max_retry_times
    }

    pub fn push_task_delay(&self) -> Duration {
        Duration::from_millis(self.push_task_delay_ms)
    }

    pub fn push_task_retry_delay(&self) -> Duration {
        Duration::from_millis(self.push_task_retry_delay_ms)
    }

    pub fn push_task_timeout(&self) -> Duration {
        Duration::from_millis(self.push_task_timeout_ms)
    }

    pub fn task_process_interval(&self) -> Duration {
        Duration::from_millis(self.task_process_interval_ms)
    }
}

fn default_push_enabled() -> bool {
    true
}
fn default_push_task_delay_ms() -> u64 {
    500
}
fn default_push_task_retry_delay_ms() -> u64 {
    1000
}
fn default_push_task_timeout_ms() -> u64 {
    5000
}
fn default_task_process_interval_ms() -> u64 {
    100
}
fn default_max_retry_times() -> u32 {
    3
}

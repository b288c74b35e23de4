use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RequestConfig {
    /// Deadline used by a blocking `get_timeout` called with a non-positive value (ms)
    #[serde(default = "default_request_timeout_ms")]
    pub default_timeout_ms: u64,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl RequestConfig {
    pub fn validate(&self) -> Result<()> {
        if self.default_timeout_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "request.default_timeout_ms must be greater than 0".into(),
            )));
        }
        Ok(())
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }
}

fn default_request_timeout_ms() -> u64 {
    3000
}

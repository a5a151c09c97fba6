use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Retention of the in-memory offset window
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WindowConfig {
    /// Maximum number of recent log entries kept for incremental catch-up
    #[serde(default = "default_window_max_size")]
    pub max_size: usize,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            max_size: default_window_max_size(),
        }
    }
}

impl WindowConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_size == 0 {
            return Err(Error::Config(ConfigError::Message(
                "window.max_size must be greater than 0".into(),
            )));
        }
        Ok(())
    }
}

/// Catch-up streaming protocol parameters
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StreamConfig {
    /// Poll interval of the push loop (milliseconds)
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Maximum number of items per streamed message
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    /// Heartbeat interval used when the subscriber does not ask for one (milliseconds)
    #[serde(default = "default_idle_timeout_ms")]
    pub default_idle_timeout_ms: u64,

    /// Buffered messages per subscriber before the push loop waits
    #[serde(default = "default_channel_buffer")]
    pub channel_buffer: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            max_batch_size: default_max_batch_size(),
            default_idle_timeout_ms: default_idle_timeout_ms(),
            channel_buffer: default_channel_buffer(),
        }
    }
}

impl StreamConfig {
    pub fn validate(
        &self,
        window: &WindowConfig,
    ) -> Result<()> {
        if self.tick_interval_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "stream.tick_interval_ms cannot be 0".into(),
            )));
        }
        if self.max_batch_size == 0 || self.max_batch_size > window.max_size {
            return Err(Error::Config(ConfigError::Message(format!(
                "stream.max_batch_size must be within 1..={}",
                window.max_size
            ))));
        }
        if self.default_idle_timeout_ms < self.tick_interval_ms {
            return Err(Error::Config(ConfigError::Message(
                "stream.default_idle_timeout_ms must not be shorter than the tick interval".into(),
            )));
        }
        if self.channel_buffer == 0 {
            return Err(Error::Config(ConfigError::Message(
                "stream.channel_buffer cannot be 0".into(),
            )));
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn default_idle_timeout(&self) -> Duration {
        Duration::from_millis(self.default_idle_timeout_ms)
    }
}

/// Background tail of the document log
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RefreshConfig {
    /// Interval between background refreshes (milliseconds, 0 disables)
    #[serde(default = "default_refresh_interval_ms")]
    pub interval_ms: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_refresh_interval_ms(),
        }
    }
}

impl RefreshConfig {
    pub fn validate(&self) -> Result<()> {
        Ok(())
    }

    pub fn interval(&self) -> Option<Duration> {
        (self.interval_ms > 0).then(|| Duration::from_millis(self.interval_ms))
    }
}

fn default_window_max_size() -> usize {
    1024
}
fn default_tick_interval_ms() -> u64 {
    250
}
fn default_max_batch_size() -> usize {
    128
}
fn default_idle_timeout_ms() -> u64 {
    30_000
}
fn default_channel_buffer() -> usize {
    32
}
fn default_refresh_interval_ms() -> u64 {
    1000
}

//! Session configuration

use crate::VeerError;
use serde::{Deserialize, Deserializer};
use std::time::Duration;

/// Session configuration options
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Page snapshots kept for back/forward and previews
    pub cache_size: usize,

    /// How long a prefetched response stays usable
    #[serde(rename = "prefetch_ttl_ms", deserialize_with = "millis")]
    pub prefetch_ttl: Duration,

    /// Quiet period before a stream-triggered refresh runs
    #[serde(rename = "refresh_debounce_ms", deserialize_with = "millis")]
    pub refresh_debounce: Duration,

    /// Delay before the progress bar becomes visible
    #[serde(rename = "progress_bar_delay_ms", deserialize_with = "millis")]
    pub progress_bar_delay: Duration,

    /// Request timeout handed to the HTTP transport
    #[serde(rename = "request_timeout_ms", deserialize_with = "millis")]
    pub request_timeout: Duration,

    /// Maximum depth when following `recurse` frames
    pub frame_recursion_limit: usize,

    /// Request ids remembered to suppress self-triggered refreshes
    pub recent_request_limit: usize,

    /// Path under which locations are visitable
    pub root: String,

    /// User agent string
    pub user_agent: String,

    /// When false, links and forms fall through to native navigation
    pub drive_enabled: bool,
}

fn millis<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    u64::deserialize(deserializer).map(Duration::from_millis)
}

impl Config {
    /// Parse a JSON object; missing keys keep their defaults
    pub fn from_json(json: &str) -> Result<Self, VeerError> {
        let config: Self = serde_json::from_str(json).map_err(|e| VeerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), VeerError> {
        if self.cache_size == 0 {
            return Err(VeerError::Config("cache_size must be at least 1".into()));
        }
        if !self.root.starts_with('/') {
            return Err(VeerError::Config(format!("root must be an absolute path, got {:?}", self.root)));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_size: 10,
            prefetch_ttl: Duration::from_secs(10),
            refresh_debounce: Duration::from_millis(150),
            progress_bar_delay: Duration::from_millis(500),
            request_timeout: Duration::from_secs(30),
            frame_recursion_limit: 8,
            recent_request_limit: 20,
            root: "/".to_string(),
            user_agent: veer_net::DEFAULT_USER_AGENT.to_string(),
            drive_enabled: true,
        }
    }
}

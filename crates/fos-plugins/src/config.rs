//! Plugin Host Configuration

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// User agent handed to modules quirked to expect a Mozilla browser.
pub const MOZILLA_USER_AGENT: &str =
    "Mozilla/5.0 (X11; U; Linux i686; en-US; rv:1.8.1) Gecko/20061010 Firefox/2.0";

/// Plugin host configuration options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginSettings {
    /// Load native plugins at all
    pub enabled: bool,

    /// User agent string
    pub user_agent: String,

    /// User agent for modules that only recognise Mozilla
    pub mozilla_user_agent: String,

    /// Directories to scan; empty means the platform defaults
    pub plugin_directories: Vec<PathBuf>,

    /// Install directory whose modules win ties
    pub preferred_directory: Option<PathBuf>,

    /// Tick of the native message throttle (ms)
    pub message_throttle_interval_ms: u64,

    /// Minimum gap before a throttled message is delivered directly (ms)
    pub direct_message_interval_ms: u64,

    /// Coalescing delay for throttled invalidations (ms)
    pub invalidate_throttle_interval_ms: u64,

    /// Report private mode to plugins
    pub private_browsing: bool,

    /// Allow `javascript:` requests from plugins
    pub scripting_enabled: bool,
}

impl Default for PluginSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            user_agent: format!("fOS-Engine/{}", crate::VERSION),
            mozilla_user_agent: MOZILLA_USER_AGENT.to_string(),
            plugin_directories: Vec::new(),
            preferred_directory: None,
            message_throttle_interval_ms: 1,
            direct_message_interval_ms: 19,
            invalidate_throttle_interval_ms: 1,
            private_browsing: false,
            scripting_enabled: true,
        }
    }
}

impl PluginSettings {
    /// Parse settings from JSON; missing keys keep their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn message_throttle_interval(&self) -> Duration {
        Duration::from_millis(self.message_throttle_interval_ms)
    }

    pub fn direct_message_interval(&self) -> Duration {
        Duration::from_millis(self.direct_message_interval_ms)
    }

    pub fn invalidate_throttle_interval(&self) -> Duration {
        Duration::from_millis(self.invalidate_throttle_interval_ms)
    }
}

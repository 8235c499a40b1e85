//! Sync engine configuration
//!
//! All timing windows in one place, serde-compatible so the vault's
//! config.toml can override any of them. The defaults are the production
//! values; tests construct shortened variants.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::ignore::IgnoreConfig;

/// Tunable windows and switches for the write/watch engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Quiet period before a queued write is flushed (0 flushes immediately)
    #[serde(default = "default_write_debounce_ms")]
    pub write_debounce_ms: u64,

    /// Quiet period collapsing a burst of raw notifications per path
    #[serde(default = "default_watch_debounce_ms")]
    pub watch_debounce_ms: u64,

    /// Poll interval while waiting for a file to stop changing
    #[serde(default = "default_settle_poll_ms")]
    pub settle_poll_ms: u64,

    /// How long size+mtime must hold still before a file counts as settled
    #[serde(default = "default_settle_window_ms")]
    pub settle_window_ms: u64,

    /// Safety-net expiry for published content expectations
    #[serde(default = "default_expectation_ttl_ms")]
    pub expectation_ttl_ms: u64,

    /// How long a completed write's flag keeps absorbing late notifications
    #[serde(default = "default_write_flag_linger_ms")]
    pub write_flag_linger_ms: u64,

    /// How long a classified deletion waits for a matching add (rename window)
    #[serde(default = "default_rename_window_ms")]
    pub rename_window_ms: u64,

    /// Surface edits to open notes as conflicts instead of plain changes
    #[serde(default)]
    pub detect_conflicts: bool,

    /// Ignore pattern sources
    #[serde(default)]
    pub ignore: IgnoreConfig,
}

impl SyncConfig {
    pub fn write_debounce(&self) -> Duration {
        Duration::from_millis(self.write_debounce_ms)
    }

    pub fn watch_debounce(&self) -> Duration {
        Duration::from_millis(self.watch_debounce_ms)
    }

    pub fn settle_poll(&self) -> Duration {
        Duration::from_millis(self.settle_poll_ms)
    }

    pub fn settle_window(&self) -> Duration {
        Duration::from_millis(self.settle_window_ms)
    }

    pub fn expectation_ttl(&self) -> Duration {
        Duration::from_millis(self.expectation_ttl_ms)
    }

    pub fn write_flag_linger(&self) -> Duration {
        Duration::from_millis(self.write_flag_linger_ms)
    }

    pub fn rename_window(&self) -> Duration {
        Duration::from_millis(self.rename_window_ms)
    }

    /// Reject values that would make the engine thrash or go deaf
    pub fn validate(&self) -> Result<()> {
        if self.write_debounce_ms > 60_000 {
            bail!("write_debounce_ms must be at most 60000 (got {})", self.write_debounce_ms);
        }
        if !(10..=10_000).contains(&self.watch_debounce_ms) {
            bail!("watch_debounce_ms must be 10-10000 (got {})", self.watch_debounce_ms);
        }
        if !(10..=5_000).contains(&self.settle_poll_ms) {
            bail!("settle_poll_ms must be 10-5000 (got {})", self.settle_poll_ms);
        }
        if self.settle_window_ms > 10_000 {
            bail!("settle_window_ms must be at most 10000 (got {})", self.settle_window_ms);
        }
        if !(1_000..=600_000).contains(&self.expectation_ttl_ms) {
            bail!("expectation_ttl_ms must be 1000-600000 (got {})", self.expectation_ttl_ms);
        }
        if !(100..=60_000).contains(&self.write_flag_linger_ms) {
            bail!("write_flag_linger_ms must be 100-60000 (got {})", self.write_flag_linger_ms);
        }
        if !(100..=10_000).contains(&self.rename_window_ms) {
            bail!("rename_window_ms must be 100-10000 (got {})", self.rename_window_ms);
        }
        Ok(())
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            write_debounce_ms: default_write_debounce_ms(),
            watch_debounce_ms: default_watch_debounce_ms(),
            settle_poll_ms: default_settle_poll_ms(),
            settle_window_ms: default_settle_window_ms(),
            expectation_ttl_ms: default_expectation_ttl_ms(),
            write_flag_linger_ms: default_write_flag_linger_ms(),
            rename_window_ms: default_rename_window_ms(),
            detect_conflicts: false,
            ignore: IgnoreConfig::default(),
        }
    }
}

fn default_write_debounce_ms() -> u64 {
    1000
}

fn default_watch_debounce_ms() -> u64 {
    100
}

fn default_settle_poll_ms() -> u64 {
    100
}

fn default_settle_window_ms() -> u64 {
    200
}

fn default_expectation_ttl_ms() -> u64 {
    5000
}

fn default_write_flag_linger_ms() -> u64 {
    1000
}

fn default_rename_window_ms() -> u64 {
    1000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.write_debounce(), Duration::from_millis(1000));
        assert_eq!(config.watch_debounce(), Duration::from_millis(100));
        assert_eq!(config.settle_window(), Duration::from_millis(200));
        assert_eq!(config.expectation_ttl(), Duration::from_millis(5000));
        assert_eq!(config.rename_window(), Duration::from_millis(1000));
        assert!(!config.detect_conflicts);
        assert!(config.ignore.use_gitignore);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: SyncConfig = toml::from_str(
            r#"
            write_debounce_ms = 250
            detect_conflicts = true
            "#,
        )
        .unwrap();
        assert_eq!(config.write_debounce_ms, 250);
        assert!(config.detect_conflicts);
        // Unspecified fields fall back to defaults
        assert_eq!(config.watch_debounce_ms, 100);
        assert_eq!(config.rename_window_ms, 1000);
    }

    #[test]
    fn test_validate_ranges() {
        assert!(SyncConfig::default().validate().is_ok());

        let mut config = SyncConfig::default();
        config.watch_debounce_ms = 0;
        assert!(config.validate().is_err());

        let mut config = SyncConfig::default();
        config.expectation_ttl_ms = 100;
        assert!(config.validate().is_err());

        let mut config = SyncConfig::default();
        config.write_debounce_ms = 0;
        // Immediate flush is a legal setting
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_roundtrip() {
        let mut config = SyncConfig::default();
        config.write_debounce_ms = 42;
        config.ignore.additional_patterns = vec!["*.bak".to_string()];

        let text = toml::to_string(&config).unwrap();
        let back: SyncConfig = toml::from_str(&text).unwrap();
        assert_eq!(back.write_debounce_ms, 42);
        assert_eq!(back.ignore.additional_patterns, vec!["*.bak".to_string()]);
    }
}

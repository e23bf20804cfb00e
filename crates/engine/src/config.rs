//! Engine configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum concurrent browser instances; also the worker count.
    pub max_workers: usize,

    /// Directory screenshots are written to.
    pub screenshot_dir: PathBuf,

    /// Browser launch configuration
    pub browser: BrowserConfig,

    /// Replay timing configuration
    pub timing: TimingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_workers: 3,
            screenshot_dir: PathBuf::from("./screenshots"),
            browser: BrowserConfig::default(),
            timing: TimingConfig::default(),
        }
    }
}

/// Browser-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// Path to the Chrome/Chromium binary
    pub binary_path: Option<PathBuf>,

    /// Extra command-line flags appended at launch
    #[serde(default)]
    pub extra_flags: Vec<String>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            binary_path: None, // Will auto-detect
            extra_flags: Vec::new(),
        }
    }
}

/// Replay and recording timing knobs. Defaults match the pacing the
/// recorded sequences were captured against; loosening them changes
/// replay determinism.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Hard per-job deadline in seconds.
    pub job_deadline_secs: u64,

    /// Fixed settle after navigation before the readiness check.
    pub readiness_settle_ms: u64,

    /// Bound on waiting for document readiness; exceeding it is a
    /// warning, not a failure.
    pub readiness_timeout_ms: u64,

    /// Bound on waiting for a step's selector to become visible.
    pub element_wait_ms: u64,

    /// Pacing delay between steps.
    pub step_settle_ms: u64,

    /// Settle after most primitive actions.
    pub action_settle_ms: u64,

    /// Settle after form submission.
    pub submit_settle_ms: u64,

    /// Recording session drain interval.
    pub poll_interval_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            job_deadline_secs: 600,
            readiness_settle_ms: 3000,
            readiness_timeout_ms: 10_000,
            element_wait_ms: 30_000,
            step_settle_ms: 500,
            action_settle_ms: 200,
            submit_settle_ms: 1000,
            poll_interval_ms: 100,
        }
    }
}

impl TimingConfig {
    pub fn job_deadline(&self) -> Duration {
        Duration::from_secs(self.job_deadline_secs)
    }

    pub fn readiness_settle(&self) -> Duration {
        Duration::from_millis(self.readiness_settle_ms)
    }

    pub fn readiness_timeout(&self) -> Duration {
        Duration::from_millis(self.readiness_timeout_ms)
    }

    pub fn element_wait(&self) -> Duration {
        Duration::from_millis(self.element_wait_ms)
    }

    pub fn step_settle(&self) -> Duration {
        Duration::from_millis(self.step_settle_ms)
    }

    pub fn action_settle(&self) -> Duration {
        Duration::from_millis(self.action_settle_ms)
    }

    pub fn submit_settle(&self) -> Duration {
        Duration::from_millis(self.submit_settle_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl EngineConfig {
    /// Load configuration from file, falling back to defaults when the
    /// file does not exist.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &std::path::Path) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.max_workers == 0 {
            anyhow::bail!("max_workers must be at least 1");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_recorded_pacing() {
        let config = EngineConfig::default();
        assert_eq!(config.max_workers, 3);
        assert_eq!(config.timing.step_settle_ms, 500);
        assert_eq!(config.timing.action_settle_ms, 200);
        assert_eq!(config.timing.submit_settle_ms, 1000);
        assert_eq!(config.timing.poll_interval_ms, 100);
        assert_eq!(config.timing.job_deadline_secs, 600);
    }

    #[test]
    fn test_toml_round_trip() {
        let config = EngineConfig::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: EngineConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.max_workers, config.max_workers);
        assert_eq!(parsed.timing.element_wait_ms, config.timing.element_wait_ms);
    }

    #[test]
    fn test_zero_workers_rejected() {
        let config = EngineConfig {
            max_workers: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}

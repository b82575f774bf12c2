use crate::detect::{AudioDetectorConfig, VideoDetectorConfig};
use crate::global;
use crate::policy::PolicyConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub monitor: MonitorConfig,
    pub audio: AudioDetectorConfig,
    pub video: VideoDetectorConfig,
    pub policy: PolicyConfig,
    pub security: SecurityConfig,
    pub evidence: EvidenceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self { port: 4117 }
    }
}

/// Polling periods for the two sampling loops.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub audio_period_ms: u64,
    pub video_period_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            audio_period_ms: 100,
            video_period_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Backend frame-verdict endpoint. Unset disables the remote check.
    pub check_endpoint: Option<String>,
    /// Audit store endpoint for evidence uploads. Unset keeps evidence
    /// local only.
    pub audit_endpoint: Option<String>,
    pub request_timeout_secs: u64,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            check_endpoint: None,
            audit_endpoint: None,
            request_timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvidenceConfig {
    /// Evidence clip length in milliseconds.
    pub clip_ms: u64,
    /// Bundle directory; defaults to the platform data dir.
    pub dir: Option<PathBuf>,
}

impl Default for EvidenceConfig {
    fn default() -> Self {
        Self {
            clip_ms: 2000,
            dir: None,
        }
    }
}

impl EvidenceConfig {
    pub fn resolved_dir(&self) -> Result<PathBuf> {
        match &self.dir {
            Some(dir) => Ok(dir.clone()),
            None => global::evidence_dir(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = global::config_file()?;
        if !config_path.exists() {
            info!(
                "Config file not found, creating default at {:?}",
                config_path
            );
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let content =
            std::fs::read_to_string(&config_path).context("Failed to read config file")?;

        let config: Self = toml::from_str(&content).context("Failed to parse config file")?;

        info!("Loaded config from {:?}", config_path);
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = global::config_file()?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(&config_path, content).context("Failed to write config file")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_carry_documented_thresholds() {
        let config = Config::default();
        assert_eq!(config.monitor.audio_period_ms, 100);
        assert_eq!(config.monitor.video_period_ms, 2000);
        assert_eq!(config.audio.window_size, 20);
        assert_eq!(config.audio.variance_threshold, 300.0);
        assert_eq!(config.video.window_size, 30);
        assert_eq!(config.policy.multiple_persistence_ms, 2000);
        assert_eq!(config.policy.liveness_threshold, 0.6);
        assert_eq!(config.policy.max_liveness_fails, 3);
    }

    #[test]
    fn test_empty_toml_yields_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.api.port, 4117);
        assert!(config.security.check_endpoint.is_none());
    }

    #[test]
    fn test_partial_section_overrides() {
        let config: Config = toml::from_str(
            r#"
            [policy]
            multiple_persistence_ms = 500

            [security]
            check_endpoint = "http://localhost:9000/security/voting-session-check"
            "#,
        )
        .unwrap();
        assert_eq!(config.policy.multiple_persistence_ms, 500);
        // Untouched fields keep their defaults.
        assert_eq!(config.policy.liveness_persistence_ms, 1500);
        assert!(config.security.check_endpoint.is_some());
    }

    #[test]
    fn test_round_trip() {
        let config = Config::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&toml).unwrap();
        assert_eq!(parsed.api.port, config.api.port);
        assert_eq!(parsed.evidence.clip_ms, config.evidence.clip_ms);
    }
}

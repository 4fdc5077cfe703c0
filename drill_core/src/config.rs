//! Configuration file support for Drill.
//!
//! Configuration is loaded from `$XDG_CONFIG_HOME/drill/config.toml`.
//! Every field is defaulted, so a partial file only overrides what it names.

use crate::{Error, Result, SessionMode};
use once_cell::sync::Lazy;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};

/// Built-in configuration, shared by every policy lookup that has no file
static DEFAULT_CONFIG: Lazy<Config> = Lazy::new(Config::default);

/// Application configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub policy: PolicyTable,

    #[serde(default)]
    pub feedback: FeedbackConfig,

    #[serde(default)]
    pub timing: TimingConfig,
}

/// Per-mode policy rows
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PolicyTable {
    #[serde(default = "ModeConfig::detection", deserialize_with = "detection_row")]
    pub detection: ModeConfig,

    #[serde(default = "ModeConfig::practice", deserialize_with = "practice_row")]
    pub practice: ModeConfig,
}

impl Default for PolicyTable {
    fn default() -> Self {
        Self {
            detection: ModeConfig::detection(),
            practice: ModeConfig::practice(),
        }
    }
}

impl PolicyTable {
    pub fn row(&self, mode: SessionMode) -> &ModeConfig {
        match mode {
            SessionMode::Detection => &self.detection,
            SessionMode::Practice => &self.practice,
        }
    }
}

/// Mode-dependent constants
///
/// A row read from a file starts from its own mode's built-in values.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct ModeConfig {
    pub max_attempts: u32,

    /// Attempts each deferred exercise gets during the review pass
    pub review_attempts: u32,

    pub new_word_protection_days: u32,

    pub min_exercises_before_degradation: u32,

    /// Delay before auto-advancing off an exhausted exercise
    pub exhausted_delay_ms: u64,

    /// Drop retry and exhaustion commentary entirely
    pub suppress_incorrect_feedback: bool,
}

/// Fields present in a `[policy.<mode>]` table
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ModeOverrides {
    max_attempts: Option<u32>,
    review_attempts: Option<u32>,
    new_word_protection_days: Option<u32>,
    min_exercises_before_degradation: Option<u32>,
    exhausted_delay_ms: Option<u64>,
    suppress_incorrect_feedback: Option<bool>,
}

impl ModeOverrides {
    fn apply(self, base: ModeConfig) -> ModeConfig {
        ModeConfig {
            max_attempts: self.max_attempts.unwrap_or(base.max_attempts),
            review_attempts: self.review_attempts.unwrap_or(base.review_attempts),
            new_word_protection_days: self
                .new_word_protection_days
                .unwrap_or(base.new_word_protection_days),
            min_exercises_before_degradation: self
                .min_exercises_before_degradation
                .unwrap_or(base.min_exercises_before_degradation),
            exhausted_delay_ms: self.exhausted_delay_ms.unwrap_or(base.exhausted_delay_ms),
            suppress_incorrect_feedback: self
                .suppress_incorrect_feedback
                .unwrap_or(base.suppress_incorrect_feedback),
        }
    }
}

fn detection_row<'de, D>(deserializer: D) -> std::result::Result<ModeConfig, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(ModeOverrides::deserialize(deserializer)?.apply(ModeConfig::detection()))
}

fn practice_row<'de, D>(deserializer: D) -> std::result::Result<ModeConfig, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(ModeOverrides::deserialize(deserializer)?.apply(ModeConfig::practice()))
}

impl ModeConfig {
    pub fn detection() -> Self {
        Self {
            max_attempts: 3,
            review_attempts: default_review_attempts(),
            new_word_protection_days: 3,
            min_exercises_before_degradation: default_min_exercises(),
            exhausted_delay_ms: 2000,
            suppress_incorrect_feedback: true,
        }
    }

    pub fn practice() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            review_attempts: default_review_attempts(),
            new_word_protection_days: default_protection_days(),
            min_exercises_before_degradation: default_min_exercises(),
            exhausted_delay_ms: default_exhausted_delay_ms(),
            suppress_incorrect_feedback: false,
        }
    }
}

/// Feedback filtering rules
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FeedbackConfig {
    /// Case-insensitive substrings that let a message through when the
    /// mode filters feedback. Anything else is dropped.
    #[serde(default = "default_allow_markers")]
    pub allow_markers: Vec<String>,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            allow_markers: default_allow_markers(),
        }
    }
}

/// Delays shared by both modes
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TimingConfig {
    #[serde(default = "default_correct_delay_ms")]
    pub correct_delay_ms: u64,

    /// Delay after the backend reports a mastery degradation
    #[serde(default = "default_degraded_delay_ms")]
    pub degraded_delay_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            correct_delay_ms: default_correct_delay_ms(),
            degraded_delay_ms: default_degraded_delay_ms(),
        }
    }
}

// Default value functions
fn default_max_attempts() -> u32 {
    2
}

fn default_review_attempts() -> u32 {
    1
}

fn default_protection_days() -> u32 {
    1
}

fn default_min_exercises() -> u32 {
    5
}

fn default_exhausted_delay_ms() -> u64 {
    1000
}

fn default_allow_markers() -> Vec<String> {
    vec!["!".into(), "review".into()]
}

fn default_correct_delay_ms() -> u64 {
    1500
}

fn default_degraded_delay_ms() -> u64 {
    1500
}

impl Config {
    /// Shared built-in configuration
    pub fn defaults() -> &'static Config {
        &DEFAULT_CONFIG
    }

    /// Load configuration from the standard config path
    pub fn load() -> Result<Self> {
        match Self::default_config_path() {
            Some(config_path) if config_path.exists() => Self::load_from(&config_path),
            path => {
                tracing::info!("No config file found at {:?}, using defaults", path);
                Ok(Self::default())
            }
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Get the default config file path
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|base| base.join("drill").join("config.toml"))
    }

    /// Save the current configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }

    /// Reject ceilings that would make a session unable to progress
    pub fn validate(&self) -> Result<()> {
        for mode in [SessionMode::Detection, SessionMode::Practice] {
            let row = self.policy.row(mode);
            if row.max_attempts == 0 {
                return Err(Error::Config(format!("{} max_attempts must be at least 1", mode)));
            }
            if row.review_attempts == 0 {
                return Err(Error::Config(format!(
                    "{} review_attempts must be at least 1",
                    mode
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.policy.detection.max_attempts, 3);
        assert_eq!(config.policy.practice.max_attempts, 2);
        assert_eq!(config.timing.correct_delay_ms, 1500);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_roundtrip() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_partial_config() {
        let toml_str = r#"
[policy.practice]
max_attempts = 4

[feedback]
allow_markers = ["¡"]
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.policy.practice.max_attempts, 4);
        assert_eq!(config.policy.practice.exhausted_delay_ms, 1000); // default
        assert_eq!(config.policy.detection, ModeConfig::detection());
        assert_eq!(config.feedback.allow_markers, vec!["¡".to_string()]);
        assert_eq!(config.timing.degraded_delay_ms, 1500);
    }

    #[test]
    fn test_partial_detection_row_keeps_detection_values() {
        let config: Config =
            toml::from_str("[policy.detection]\nexhausted_delay_ms = 500\n").unwrap();

        let detection = &config.policy.detection;
        assert_eq!(detection.exhausted_delay_ms, 500);
        assert_eq!(detection.max_attempts, 3);
        assert_eq!(detection.new_word_protection_days, 3);
        assert!(detection.suppress_incorrect_feedback);
        assert_eq!(config.policy.practice, ModeConfig::practice());

        let policy = crate::ModePolicy::from_config(SessionMode::Detection, &config);
        assert_eq!(policy.max_attempts, 3);
        assert!(policy.suppress_incorrect_feedback);
    }

    #[test]
    fn test_partial_practice_row_keeps_practice_values() {
        let config: Config =
            toml::from_str("[policy.practice]\nreview_attempts = 2\n").unwrap();
        assert_eq!(config.policy.practice.review_attempts, 2);
        assert_eq!(config.policy.practice.max_attempts, 2);
        assert!(!config.policy.practice.suppress_incorrect_feedback);
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let mut config = Config::default();
        config.policy.detection.max_attempts = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.timing.correct_delay_ms = 250;
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.timing.correct_delay_ms, 250);
    }
}

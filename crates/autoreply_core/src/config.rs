use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::chunk::{ChunkConfig, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use crate::error::ConfigError;

pub const DEFAULT_THRESHOLD: f32 = 0.7;

/// File-level matcher settings, e.g.
///
/// ```toml
/// threshold = 0.7
/// chunk_size = 10
/// chunk_overlap = 8
/// embed_timeout = "2s"
/// cache_question_embeddings = true
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MatcherConfig {
    pub threshold: f32,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    #[serde(deserialize_with = "deserialize_duration")]
    pub embed_timeout: Option<Duration>,
    pub cache_question_embeddings: bool,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            embed_timeout: None,
            cache_question_embeddings: false,
        }
    }
}

/// Validated form of [`MatcherConfig`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatcherSettings {
    pub threshold: f32,
    pub chunking: ChunkConfig,
    pub embed_timeout: Option<Duration>,
    pub cache_question_embeddings: bool,
}

impl MatcherConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    pub fn validate(&self) -> Result<MatcherSettings, ConfigError> {
        check_threshold(self.threshold)?;
        if self.embed_timeout.is_some_and(|t| t.is_zero()) {
            return Err(ConfigError::Duration {
                value: "0s".to_string(),
                reason: "embed_timeout must be > 0".to_string(),
            });
        }
        Ok(MatcherSettings {
            threshold: self.threshold,
            chunking: ChunkConfig::new(self.chunk_size, self.chunk_overlap)?,
            embed_timeout: self.embed_timeout,
            cache_question_embeddings: self.cache_question_embeddings,
        })
    }
}

impl MatcherSettings {
    /// Replace the threshold, applying the same range check as the file.
    pub fn with_threshold(self, threshold: f32) -> Result<Self, ConfigError> {
        check_threshold(threshold)?;
        Ok(Self { threshold, ..self })
    }
}

/// Cosine scores live in `[-1, 1]`; anything else is a configuration error.
fn check_threshold(threshold: f32) -> Result<(), ConfigError> {
    if threshold.is_finite() && (-1.0..=1.0).contains(&threshold) {
        Ok(())
    } else {
        Err(ConfigError::Threshold(threshold))
    }
}

pub fn parse_duration(value: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(value).map_err(|e| ConfigError::Duration {
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    raw.map(|v| parse_duration(&v).map_err(serde::de::Error::custom))
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_override_is_range_checked() {
        let settings = MatcherConfig::default().validate().unwrap();
        assert_eq!(settings.with_threshold(0.4).unwrap().threshold, 0.4);
        assert!(matches!(
            settings.with_threshold(-5.0),
            Err(ConfigError::Threshold(_))
        ));
        assert!(settings.with_threshold(f32::NAN).is_err());
        assert!(settings.with_threshold(f32::INFINITY).is_err());
    }

    #[test]
    fn empty_file_uses_defaults() {
        let cfg = MatcherConfig::from_toml("").unwrap();
        assert_eq!(cfg, MatcherConfig::default());
        let settings = cfg.validate().unwrap();
        assert_eq!(settings.chunking, ChunkConfig::default());
        assert_eq!(settings.threshold, DEFAULT_THRESHOLD);
    }

    #[test]
    fn parses_all_fields() {
        let cfg = MatcherConfig::from_toml(
            r#"
threshold = 0.55
chunk_size = 6
chunk_overlap = 3
embed_timeout = "1500ms"
cache_question_embeddings = true
"#,
        )
        .unwrap();
        let settings = cfg.validate().unwrap();
        assert_eq!(settings.chunking.step(), 3);
        assert_eq!(settings.embed_timeout, Some(Duration::from_millis(1500)));
        assert!(settings.cache_question_embeddings);
    }

    #[test]
    fn invalid_chunking_is_a_config_error() {
        let cfg = MatcherConfig::from_toml("chunk_size = 4\nchunk_overlap = 4").unwrap();
        assert!(matches!(cfg.validate(), Err(ConfigError::Overlap { .. })));
    }

    #[test]
    fn rejects_bad_threshold_and_duration() {
        let cfg = MatcherConfig {
            threshold: f32::NAN,
            ..MatcherConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::Threshold(_))));
        assert!(MatcherConfig::from_toml("embed_timeout = \"soon\"").is_err());
        assert!(MatcherConfig::from_toml("unknown = 1").is_err());
    }
}

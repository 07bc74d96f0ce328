// AI-assisted parameter recommendation
//
// - Ollama: HTTP-backed Recommender
// - Fallback: deterministic table used when the recommender is unavailable

pub mod fallback;
pub mod ollama;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use fallback::*;
pub use ollama::*;

use crate::error::{NormalizerError, Result};
use crate::media::MediaDescriptor;
use crate::resolve::TargetFormat;

/// Where the applied recommendation came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendationSource {
    Recommender,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BitrateStrategy {
    /// `CRF`, `CBR` or `VBR`; anything else is ignored when merging
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub value: Value,
}

/// Encoding suggestions returned by a recommender.
///
/// Parsed strictly: unknown fields, non-scalar option values, odd option
/// names and multi-line flags all reject the whole payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecommendationPayload {
    #[serde(default)]
    pub codec_parameters: Map<String, Value>,
    #[serde(default)]
    pub bitrate_strategy: Option<BitrateStrategy>,
    #[serde(default)]
    pub ffmpeg_options: Vec<String>,
    #[serde(default)]
    pub audio_parameters: Map<String, Value>,
    #[serde(default)]
    pub optimizations: Vec<String>,
}

impl RecommendationPayload {
    pub fn parse(text: &str) -> Result<Self> {
        let payload: RecommendationPayload = serde_json::from_str(text.trim())
            .map_err(|e| NormalizerError::Recommender(format!("Malformed recommendation: {}", e)))?;
        payload.validate()?;
        Ok(payload)
    }

    pub fn validate(&self) -> Result<()> {
        validate_parameters("codec_parameters", &self.codec_parameters)?;
        validate_parameters("audio_parameters", &self.audio_parameters)?;

        if let Some(strategy) = &self.bitrate_strategy {
            if strategy.value.is_array() || strategy.value.is_object() {
                return Err(NormalizerError::Recommender(format!(
                    "bitrate_strategy value must be a scalar, got {}",
                    strategy.value
                )));
            }
        }

        if let Some(flag) = self
            .ffmpeg_options
            .iter()
            .find(|flag| flag.contains(['\0', '\n', '\r']))
        {
            return Err(NormalizerError::Recommender(format!(
                "ffmpeg option contains control characters: {:?}",
                flag
            )));
        }

        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.codec_parameters.is_empty()
            && self.bitrate_strategy.is_none()
            && self.ffmpeg_options.is_empty()
            && self.audio_parameters.is_empty()
    }
}

fn validate_parameters(field: &str, parameters: &Map<String, Value>) -> Result<()> {
    for (key, value) in parameters {
        if !is_valid_option_key(key) {
            return Err(NormalizerError::Recommender(format!("{} has invalid option name {:?}", field, key)));
        }
        if value.is_array() || value.is_object() {
            return Err(NormalizerError::Recommender(format!("{}.{} must be a scalar, got {}", field, key, value)));
        }
    }
    Ok(())
}

/// Encoder option names: ASCII letters, digits, `_`, `:` and `-`.
pub fn is_valid_option_key(key: &str) -> bool {
    !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | ':' | '-'))
}

/// Suggests encoding parameters for a source and target.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Recommender: Send + Sync {
    async fn recommend(&self, source: &MediaDescriptor, target: &TargetFormat) -> Result<RecommendationPayload>;
}

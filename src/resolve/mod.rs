// Parameter resolution
//
// Builds the EncodeSpec for one job from layered sources, later layers
// winning field by field:
// - container defaults (codec, codec defaults)
// - preset table
// - caller overrides, deep-merged
// - recommender output (or the deterministic fallback table)

pub mod merge;
pub mod presets;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

pub use merge::*;
pub use presets::*;

use crate::codec::{canonical_audio_codec, canonical_video_codec, container_or_generic, ContainerProfile};
use crate::encode_spec::{AudioSpec, EncodeSpec, ExtraParams, RateControl, RateControlMode, Setting, VideoSpec};
use crate::error::{NormalizerError, Result};
use crate::media::MediaDescriptor;
use crate::recommend::{fallback_recommendations, is_valid_option_key, RecommendationPayload, RecommendationSource};

/// Requested output format plus caller overrides
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetFormat {
    /// Container name, e.g. `mp4`. Empty keeps the source container.
    pub format: String,
    #[serde(default)]
    pub codec: Option<String>,
    #[serde(default)]
    pub audio_codec: Option<String>,
    /// `{"video": {...}, "audio": {...}}`, deep-merged over the preset
    #[serde(default)]
    pub parameters: Map<String, Value>,
    #[serde(default)]
    pub preserve_metadata: Option<bool>,
    #[serde(default)]
    pub extra_flags: Vec<String>,
}

impl TargetFormat {
    pub fn new<S: Into<String>>(format: S) -> Self {
        Self {
            format: format.into(),
            ..Self::default()
        }
    }

    /// Parse a full target document. Malformed JSON is a request error.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| NormalizerError::InvalidRequest(format!("Invalid target format: {}", e)))
    }

    /// Attach override parameters given as a JSON object.
    pub fn with_parameters_json(mut self, json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json)
            .map_err(|e| NormalizerError::InvalidRequest(format!("Invalid parameters JSON: {}", e)))?;
        match value {
            Value::Object(parameters) => {
                self.parameters = parameters;
                Ok(self)
            }
            other => Err(NormalizerError::InvalidRequest(format!(
                "Parameters must be a JSON object, got {}",
                other
            ))),
        }
    }
}

/// Recommender outcome as seen by the resolver
#[derive(Debug, Clone, PartialEq)]
pub enum AiInput {
    Disabled,
    Recommended(RecommendationPayload),
    /// The call failed or the payload was rejected
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub spec: EncodeSpec,
    /// Recovered problems (unknown preset, skipped fields, recommender fallback)
    pub warnings: Vec<String>,
    pub recommendation_source: Option<RecommendationSource>,
}

const VIDEO_RESERVED: &[&str] = &["codec", "crf", "bitrate", "rate_control"];
const AUDIO_FIELDS: &[&str] = &["codec", "bitrate", "sample_rate", "channels"];

/// Resolve the encode target for one job. Never fails: per-field problems
/// are recorded in `warnings` and skipped.
pub fn resolve(preset_name: &str, target: &TargetFormat, ai: &AiInput, source: &MediaDescriptor) -> Resolved {
    let mut warnings = Vec::new();

    let preset = Preset::parse(preset_name).unwrap_or_else(|| {
        let message = format!("Unknown preset '{}', falling back to standard", preset_name);
        warn!("{}", message);
        warnings.push(message);
        Preset::Standard
    });

    let format = if target.format.trim().is_empty() {
        source.primary_container().to_lowercase()
    } else {
        target.format.trim().to_lowercase()
    };
    let profile = container_or_generic(&format);

    let (video_codec, audio_codec) = effective_codecs(&profile, target);
    debug!(
        "Resolving {} with preset {} (video={:?}, audio={:?})",
        format, preset, video_codec, audio_codec
    );

    let mut doc = Map::new();
    if let Some(codec) = &video_codec {
        let mut video = Map::new();
        video.insert("codec".to_string(), json!(codec));
        deep_merge(&mut video, &codec_defaults(codec));
        deep_merge(&mut video, &preset.video_layer(codec));
        doc.insert("video".to_string(), Value::Object(video));
    }
    if let Some(codec) = &audio_codec {
        let mut audio = Map::new();
        audio.insert("codec".to_string(), json!(codec));
        deep_merge(&mut audio, &preset.audio_layer(&profile, codec));
        doc.insert("audio".to_string(), Value::Object(audio));
    }

    apply_overrides(&mut doc, target, &format, &mut warnings);

    let mut extra_flags = target.extra_flags.clone();
    let recommendation = match ai {
        AiInput::Disabled => None,
        AiInput::Recommended(payload) => Some((payload.clone(), RecommendationSource::Recommender)),
        AiInput::Unavailable(reason) => {
            let message = format!("Recommender unavailable ({}); using fallback parameters", reason);
            warn!("{}", message);
            warnings.push(message);
            let codec = video_codec.as_deref().or(audio_codec.as_deref()).unwrap_or("");
            Some((fallback_recommendations(&format, codec), RecommendationSource::Fallback))
        }
    };

    let recommendation_source = recommendation.map(|(payload, origin)| {
        apply_recommendation(&mut doc, &payload, &mut extra_flags, &mut warnings);
        origin
    });

    let video = match doc.get("video") {
        Some(Value::Object(section)) => Some(video_spec(section, &mut warnings)),
        _ => None,
    };
    let audio = match doc.get("audio") {
        Some(Value::Object(section)) => Some(audio_spec(section, &mut warnings)),
        _ => None,
    };

    let spec = EncodeSpec {
        container_format: (!format.is_empty()).then_some(format),
        video,
        audio,
        preserve_metadata: target.preserve_metadata.unwrap_or(true),
        extra_encoder_flags: extra_flags,
    };

    Resolved {
        spec,
        warnings,
        recommendation_source,
    }
}

/// Codecs the preset tables are keyed on. The explicit `codec` field wins
/// over a codec named in the override parameters, which wins over the
/// container default.
fn effective_codecs(profile: &ContainerProfile, target: &TargetFormat) -> (Option<String>, Option<String>) {
    let override_codec = |section: &str| {
        target
            .parameters
            .get(section)
            .and_then(|section| section.get("codec"))
            .and_then(Value::as_str)
            .map(str::to_string)
    };

    let video = profile.video_codec.map(|default| {
        target
            .codec
            .clone()
            .or_else(|| override_codec("video"))
            .map(|codec| canonical_video_codec(&codec))
            .unwrap_or_else(|| default.to_string())
    });

    let audio_only_codec = if profile.is_audio_only() { target.codec.clone() } else { None };
    let audio = profile.audio_codec.map(|default| {
        target
            .audio_codec
            .clone()
            .or(audio_only_codec)
            .or_else(|| override_codec("audio"))
            .map(|codec| canonical_audio_codec(&codec))
            .unwrap_or_else(|| default.to_string())
    });

    (video, audio)
}

fn apply_overrides(doc: &mut Map<String, Value>, target: &TargetFormat, format: &str, warnings: &mut Vec<String>) {
    for (key, value) in &target.parameters {
        match (key.as_str(), value) {
            (section @ ("video" | "audio"), Value::Object(overrides)) => {
                let overrides = scalar_fields(section, overrides, warnings);
                match doc.get_mut(section) {
                    Some(Value::Object(existing)) => deep_merge(existing, &overrides),
                    _ => warnings.push(format!(
                        "Ignoring {} overrides: {} output has no {} stream",
                        section, format, section
                    )),
                }
            }
            (section @ ("video" | "audio"), other) => {
                warnings.push(format!("Ignoring {} overrides: expected an object, got {}", section, other));
            }
            (other, _) => {
                warnings.push(format!("Ignoring unknown override section '{}'", other));
            }
        }
    }

    // Explicit codec fields are re-applied after the merge.
    if let (Some(codec), Some(Value::Object(video))) = (&target.codec, doc.get_mut("video")) {
        video.insert("codec".to_string(), json!(canonical_video_codec(codec)));
    }
    if let (Some(codec), Some(Value::Object(audio))) = (&target.audio_codec, doc.get_mut("audio")) {
        audio.insert("codec".to_string(), json!(canonical_audio_codec(codec)));
    }
}

/// Drop non-scalar override values so they cannot replace a usable layer value.
fn scalar_fields(section: &str, overrides: &Map<String, Value>, warnings: &mut Vec<String>) -> Map<String, Value> {
    let mut fields = Map::new();
    for (key, value) in overrides {
        if value.is_array() || value.is_object() {
            warnings.push(format!("Ignoring {}.{}: expected a scalar, got {}", section, key, value));
            continue;
        }
        fields.insert(key.clone(), value.clone());
    }
    fields
}

/// Read one field into a `Setting`, warning on non-scalar values.
fn setting(section: &str, key: &str, value: Option<&Value>, warnings: &mut Vec<String>) -> Setting<String> {
    match value.map(scalar_to_string) {
        None => Setting::Unset,
        Some(Ok(value)) => Setting::from(value),
        Some(Err(e)) => {
            warnings.push(format!("Ignoring {}.{}: {}", section, key, e));
            Setting::Unset
        }
    }
}

fn video_spec(section: &Map<String, Value>, warnings: &mut Vec<String>) -> VideoSpec {
    let codec = match setting("video", "codec", section.get("codec"), warnings) {
        Setting::Value(codec) => Setting::Value(canonical_video_codec(&codec)),
        other => other,
    };

    let rate_control = rate_control(section, warnings);

    let mut extra_params = ExtraParams::new();
    for (key, value) in section {
        if VIDEO_RESERVED.contains(&key.as_str()) {
            continue;
        }
        if !is_valid_option_key(key) {
            warnings.push(format!("Ignoring video parameter with invalid name '{}'", key));
            continue;
        }
        match scalar_to_string(value) {
            Ok(value) => extra_params.set(key.clone(), value),
            Err(e) => warnings.push(format!("Ignoring video.{}: {}", key, e)),
        }
    }

    VideoSpec {
        codec,
        rate_control,
        extra_params,
    }
}

/// An explicit `rate_control` mode wins. Otherwise `crf` implies CRF and
/// `bitrate` alone implies VBR.
fn rate_control(section: &Map<String, Value>, warnings: &mut Vec<String>) -> Setting<RateControl> {
    let crf = setting("video", "crf", section.get("crf"), warnings);
    let bitrate = setting("video", "bitrate", section.get("bitrate"), warnings);

    let with_mode = |mode: RateControlMode, value: &Setting<String>| match value {
        Setting::Value(value) => Setting::Value(RateControl {
            mode,
            value: value.clone(),
        }),
        Setting::Disabled => Setting::Disabled,
        Setting::Unset => Setting::Unset,
    };

    match section.get("rate_control") {
        Some(Value::Null) => return Setting::Disabled,
        Some(value) => match value.as_str().and_then(RateControlMode::parse) {
            Some(mode) => {
                let source = if mode == RateControlMode::Crf { &crf } else { &bitrate };
                if source.is_unset() {
                    warnings.push(format!("Rate control {} has no value; leaving it to the encoder", mode));
                }
                return with_mode(mode, source);
            }
            None => warnings.push(format!("Ignoring unrecognized rate control {}", value)),
        },
        None => {}
    }

    match (&crf, &bitrate) {
        (Setting::Value(_), Setting::Value(_)) => {
            warnings.push("Both crf and bitrate set; using crf".to_string());
            with_mode(RateControlMode::Crf, &crf)
        }
        (Setting::Value(_), _) => with_mode(RateControlMode::Crf, &crf),
        (_, Setting::Value(_)) => with_mode(RateControlMode::Vbr, &bitrate),
        (Setting::Disabled, _) | (_, Setting::Disabled) => Setting::Disabled,
        _ => Setting::Unset,
    }
}

fn audio_spec(section: &Map<String, Value>, warnings: &mut Vec<String>) -> AudioSpec {
    for key in section.keys() {
        if !AUDIO_FIELDS.contains(&key.as_str()) {
            warnings.push(format!("Ignoring unsupported audio parameter '{}'", key));
        }
    }

    let codec = match setting("audio", "codec", section.get("codec"), warnings) {
        Setting::Value(codec) => Setting::Value(canonical_audio_codec(&codec)),
        other => other,
    };

    AudioSpec {
        codec,
        bitrate: setting("audio", "bitrate", section.get("bitrate"), warnings),
        sample_rate: setting("audio", "sample_rate", section.get("sample_rate"), warnings),
        channels: setting("audio", "channels", section.get("channels"), warnings),
    }
}

use serde::{Deserialize, Serialize};
use std::fmt;

/// A field of the resolved spec that can be left to the encoder, explicitly
/// switched off, or forced to a value.
///
/// `Unset` and `Disabled` both emit nothing, but only `Unset` may be filled
/// in by a later default.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Setting<T> {
    #[default]
    Unset,
    Disabled,
    Value(T),
}

impl<T> Setting<T> {
    pub fn value(&self) -> Option<&T> {
        match self {
            Setting::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_unset(&self) -> bool {
        matches!(self, Setting::Unset)
    }

    pub fn is_disabled(&self) -> bool {
        matches!(self, Setting::Disabled)
    }
}

impl<T> From<Option<T>> for Setting<T> {
    /// `None` reads as an explicit disable, matching a JSON `null`.
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => Setting::Value(value),
            None => Setting::Disabled,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RateControlMode {
    Crf,
    Cbr,
    Vbr,
}

impl RateControlMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_uppercase().as_str() {
            "CRF" => Some(Self::Crf),
            "CBR" => Some(Self::Cbr),
            "VBR" => Some(Self::Vbr),
            _ => None,
        }
    }
}

impl fmt::Display for RateControlMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Crf => "CRF",
            Self::Cbr => "CBR",
            Self::Vbr => "VBR",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateControl {
    pub mode: RateControlMode,
    /// CRF value for `Crf`, bitrate string (e.g. `4500k`) otherwise
    pub value: String,
}

/// Ordered option name -> value mapping. `None` marks an option the caller
/// explicitly disabled; absent keys are simply unset.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExtraParams(Vec<(String, Option<String>)>);

impl ExtraParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace, keeping the original position of an existing key.
    pub fn set<K: Into<String>>(&mut self, key: K, value: Option<String>) {
        let key = key.into();
        match self.0.iter_mut().find(|(existing, _)| *existing == key) {
            Some(entry) => entry.1 = value,
            None => self.0.push((key, value)),
        }
    }

    /// Value of an enabled option.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(existing, _)| existing == key)
            .and_then(|(_, value)| value.as_deref())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.iter().any(|(existing, _)| existing == key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value.as_deref()))
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VideoSpec {
    /// Canonical codec name
    pub codec: Setting<String>,
    pub rate_control: Setting<RateControl>,
    pub extra_params: ExtraParams,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AudioSpec {
    /// Canonical codec name
    pub codec: Setting<String>,
    pub bitrate: Setting<String>,
    pub sample_rate: Setting<String>,
    pub channels: Setting<String>,
}

/// The canonical, fully resolved encode target for one job.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EncodeSpec {
    pub container_format: Option<String>,
    pub video: Option<VideoSpec>,
    pub audio: Option<AudioSpec>,
    pub preserve_metadata: bool,
    /// Raw flags appended verbatim, last, in caller order
    pub extra_encoder_flags: Vec<String>,
}

impl EncodeSpec {
    pub fn video_codec(&self) -> Option<&str> {
        self.video.as_ref().and_then(|video| video.codec.value()).map(String::as_str)
    }

    pub fn audio_codec(&self) -> Option<&str> {
        self.audio.as_ref().and_then(|audio| audio.codec.value()).map(String::as_str)
    }
}

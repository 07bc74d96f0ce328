use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::codec::ContainerProfile;

/// Built-in quality presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Preset {
    Web,
    Social,
    Broadcast,
    Archive,
    Mobile,
    Hq,
    Standard,
}

impl Preset {
    pub const ALL: [Preset; 7] = [
        Preset::Web,
        Preset::Social,
        Preset::Broadcast,
        Preset::Archive,
        Preset::Mobile,
        Preset::Hq,
        Preset::Standard,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Preset::Web => "web",
            Preset::Social => "social",
            Preset::Broadcast => "broadcast",
            Preset::Archive => "archive",
            Preset::Mobile => "mobile",
            Preset::Hq => "hq",
            Preset::Standard => "standard",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim().to_lowercase();
        Self::ALL.into_iter().find(|preset| preset.name() == name)
    }

    /// One-line summary for preset listings
    pub fn summary(&self) -> &'static str {
        match self {
            Preset::Web => "CRF 23, preset medium, faststart; AAC 128k",
            Preset::Social => "CRF 20, preset medium, faststart, maxrate 4M; AAC 192k",
            Preset::Broadcast => "CRF 18, high profile, level 5.1, preset slow; PCM 24-bit/AAC 48 kHz",
            Preset::Archive => "CRF 14, high/4444 profile; PCM 24-bit 48 kHz",
            Preset::Mobile => "CRF 26, preset medium, faststart, maxrate 2M; AAC 96k",
            Preset::Hq => "CRF 18, preset slow; AAC 256k",
            Preset::Standard => "CRF 23, preset medium; AAC 192k",
        }
    }

    /// CRF for this preset: the first value is for h264, the second for
    /// every other CRF-capable codec.
    fn crf(&self, codec: &str) -> u32 {
        let (h264, other) = match self {
            Preset::Web => (23, 28),
            Preset::Social => (20, 25),
            Preset::Broadcast => (18, 22),
            Preset::Archive => (14, 18),
            Preset::Mobile => (26, 30),
            Preset::Hq => (18, 22),
            Preset::Standard => (23, 28),
        };
        if codec == "h264" { h264 } else { other }
    }

    /// Video parameters this preset contributes for `codec` (canonical).
    pub fn video_layer(&self, codec: &str) -> Map<String, Value> {
        let mut layer = Map::new();
        let rate_controlled = supports_crf(codec);
        let x26x = matches!(codec, "h264" | "h265");

        if rate_controlled {
            layer.insert("crf".to_string(), json!(self.crf(codec)));
        }

        match self {
            Preset::Web | Preset::Social | Preset::Mobile | Preset::Standard | Preset::Hq => {
                if x26x {
                    let speed = if *self == Preset::Hq { "slow" } else { "medium" };
                    layer.insert("preset".to_string(), json!(speed));
                }
                if rate_controlled {
                    if matches!(self, Preset::Web | Preset::Social | Preset::Mobile) {
                        layer.insert("movflags".to_string(), json!("+faststart"));
                    }
                    let caps = match self {
                        Preset::Social => Some(("4M", "8M")),
                        Preset::Mobile => Some(("2M", "4M")),
                        _ => None,
                    };
                    if let Some((maxrate, bufsize)) = caps {
                        layer.insert("maxrate".to_string(), json!(maxrate));
                        layer.insert("bufsize".to_string(), json!(bufsize));
                    }
                }
            }
            Preset::Broadcast => {
                let profile = match codec {
                    "h264" => Some("high"),
                    "h265" => Some("main"),
                    "prores" => Some("hq"),
                    _ => None,
                };
                if let Some(profile) = profile {
                    layer.insert("profile".to_string(), json!(profile));
                }
                if codec == "h264" {
                    layer.insert("level".to_string(), json!("5.1"));
                }
                if x26x {
                    layer.insert("preset".to_string(), json!("slow"));
                }
                if rate_controlled || codec == "prores" {
                    let pix_fmt = if codec == "prores" { "yuv422p10le" } else { "yuv420p" };
                    layer.insert("pix_fmt".to_string(), json!(pix_fmt));
                }
            }
            Preset::Archive => {
                let profile = match codec {
                    "h264" => Some("high"),
                    "prores" => Some("4444"),
                    _ => None,
                };
                if let Some(profile) = profile {
                    layer.insert("profile".to_string(), json!(profile));
                }
                if rate_controlled || codec == "prores" {
                    let pix_fmt = if codec == "prores" { "yuv444p10le" } else { "yuv420p" };
                    layer.insert("pix_fmt".to_string(), json!(pix_fmt));
                }
                if codec == "mjpeg" {
                    layer.insert("qscale".to_string(), json!(1));
                }
            }
        }

        layer
    }

    /// Audio parameters this preset contributes for a container whose
    /// current audio codec is `codec` (canonical).
    pub fn audio_layer(&self, container: &ContainerProfile, codec: &str) -> Map<String, Value> {
        let mut layer = Map::new();

        let (preferred, bitrate, sample_rate) = match self {
            Preset::Web => ("aac", Some("128k"), None),
            Preset::Social => ("aac", Some("192k"), None),
            Preset::Broadcast => {
                let codec = if matches!(container.name, "mov" | "mxf") { "pcm_s24le" } else { "aac" };
                (codec, None, Some(48000))
            }
            Preset::Archive => ("pcm_s24le", None, Some(48000)),
            Preset::Mobile => ("aac", Some("96k"), None),
            Preset::Hq => ("aac", Some("256k"), None),
            Preset::Standard => ("aac", Some("192k"), None),
        };

        let effective = if !container.is_audio_only() && container.accepts_audio(preferred) {
            layer.insert("codec".to_string(), json!(preferred));
            preferred
        } else {
            codec
        };

        if let Some(bitrate) = bitrate {
            if is_lossy_audio(effective) {
                layer.insert("bitrate".to_string(), json!(bitrate));
            }
        }
        if let Some(sample_rate) = sample_rate {
            layer.insert("sample_rate".to_string(), json!(sample_rate));
        }

        layer
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Preset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("unknown preset '{}'", s))
    }
}

/// Defaults tied to the codec rather than to a preset.
pub fn codec_defaults(codec: &str) -> Map<String, Value> {
    let mut layer = Map::new();
    match codec {
        "h265" => {
            layer.insert("profile".to_string(), json!("main"));
        }
        "prores" => {
            layer.insert("profile".to_string(), json!("standard"));
        }
        _ => {}
    }
    layer
}

pub fn supports_crf(codec: &str) -> bool {
    matches!(codec, "h264" | "h265" | "vp9" | "av1")
}

fn is_lossy_audio(codec: &str) -> bool {
    matches!(codec, "aac" | "mp3" | "opus" | "vorbis" | "ac3" | "eac3")
}

use serde_json::{json, Map, Value};

use super::{BitrateStrategy, RecommendationPayload};
use crate::codec::{canonical_audio_codec, canonical_video_codec};

const VIDEO_FORMATS: &[&str] = &["mp4", "mov", "mkv"];
const AUDIO_FORMATS: &[&str] = &["wav", "mp3", "aac", "flac"];

/// Deterministic recommendation keyed by (format, codec), used whenever the
/// recommender fails or returns something unusable.
pub fn fallback_recommendations(format: &str, codec: &str) -> RecommendationPayload {
    let format = format.trim().to_lowercase();
    let mut payload = RecommendationPayload::default();

    if VIDEO_FORMATS.contains(&format.as_str()) {
        match canonical_video_codec(codec).as_str() {
            "h264" => {
                payload.codec_parameters = params(&[("preset", "medium"), ("profile", "high")]);
                payload.bitrate_strategy = Some(strategy("CRF", json!(23)));
                payload.ffmpeg_options = vec!["-movflags".to_string(), "+faststart".to_string()];
            }
            "h265" => {
                payload.codec_parameters = params(&[("preset", "medium"), ("profile", "main")]);
                payload.bitrate_strategy = Some(strategy("CRF", json!(28)));
            }
            "prores" => {
                payload.codec_parameters = params(&[("profile", "standard")]);
                payload.bitrate_strategy = Some(strategy("CBR", json!("45000k")));
            }
            "av1" => {
                payload.codec_parameters = params(&[("preset", "medium"), ("tile-columns", "2"), ("row-mt", "1")]);
                payload.bitrate_strategy = Some(strategy("CRF", json!(30)));
            }
            _ => {}
        }
    } else if AUDIO_FORMATS.contains(&format.as_str()) {
        match canonical_audio_codec(codec).as_str() {
            "aac" => payload.bitrate_strategy = Some(strategy("CBR", json!("192k"))),
            "mp3" => payload.bitrate_strategy = Some(strategy("CBR", json!("320k"))),
            _ => {}
        }
    }

    payload
}

fn params(entries: &[(&str, &str)]) -> Map<String, Value> {
    entries
        .iter()
        .map(|(key, value)| (key.to_string(), json!(value)))
        .collect()
}

fn strategy(kind: &str, value: Value) -> BitrateStrategy {
    BitrateStrategy {
        kind: kind.to_string(),
        value,
    }
}

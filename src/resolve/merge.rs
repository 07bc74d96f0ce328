use serde_json::{json, Map, Value};
use tracing::{debug, info};

use crate::encode_spec::RateControlMode;
use crate::recommend::{BitrateStrategy, RecommendationPayload};

/// Merge `layer` into `target`, key by key. Nested objects merge
/// recursively; anything else (including `null`) replaces.
pub fn deep_merge(target: &mut Map<String, Value>, layer: &Map<String, Value>) {
    for (key, value) in layer {
        match (target.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                deep_merge(existing, incoming);
            }
            _ => {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}

/// Render a scalar JSON value as an encoder option value.
///
/// `Ok(None)` is an explicit disable (`null`); arrays and objects are errors.
pub fn scalar_to_string(value: &Value) -> Result<Option<String>, String> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s.clone())),
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::Bool(b) => Ok(Some(if *b { "1" } else { "0" }.to_string())),
        Value::Array(_) | Value::Object(_) => Err(format!("expected a scalar, got {}", value)),
    }
}

/// Double a bitrate string, keeping its unit suffix (`45000k` -> `90000k`).
pub fn double_bitrate(bitrate: &str) -> Option<String> {
    let bitrate = bitrate.trim();
    let split = bitrate
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(bitrate.len());
    let (number, unit) = bitrate.split_at(split);

    if !matches!(unit, "" | "k" | "K" | "m" | "M") {
        return None;
    }

    let value: f64 = number.parse().ok()?;
    if !value.is_finite() || value <= 0.0 {
        return None;
    }

    let doubled = value * 2.0;
    let rendered = if doubled.fract() == 0.0 {
        format!("{}", doubled as u64)
    } else {
        format!("{}", doubled)
    };
    Some(format!("{}{}", rendered, unit))
}

/// Apply a validated recommendation to the working document.
///
/// Only sections already present are touched. Per-field problems are pushed
/// to `warnings` and skipped.
pub fn apply_recommendation(
    doc: &mut Map<String, Value>,
    payload: &RecommendationPayload,
    extra_flags: &mut Vec<String>,
    warnings: &mut Vec<String>,
) {
    if let Some(Value::Object(video)) = doc.get_mut("video") {
        for (key, value) in &payload.codec_parameters {
            if key == "codec" {
                warnings.push("Ignoring recommended codec change; codec is fixed by the target".to_string());
                continue;
            }
            video.insert(key.clone(), value.clone());
        }
    } else if !payload.codec_parameters.is_empty() {
        debug!("No video section; dropping recommended codec parameters");
    }

    if let Some(strategy) = &payload.bitrate_strategy {
        apply_bitrate_strategy(doc, strategy, warnings);
    }

    if let Some(Value::Object(audio)) = doc.get_mut("audio") {
        for (key, value) in &payload.audio_parameters {
            audio.insert(key.clone(), value.clone());
        }
    } else if !payload.audio_parameters.is_empty() {
        debug!("No audio section; dropping recommended audio parameters");
    }

    extra_flags.extend(payload.ffmpeg_options.iter().cloned());

    for note in &payload.optimizations {
        info!("Recommended optimization: {}", note);
    }
}

fn apply_bitrate_strategy(doc: &mut Map<String, Value>, strategy: &BitrateStrategy, warnings: &mut Vec<String>) {
    let Some(mode) = RateControlMode::parse(&strategy.kind) else {
        warnings.push(format!(
            "Ignoring unrecognized bitrate strategy '{}'",
            strategy.kind
        ));
        return;
    };

    let value = match scalar_to_string(&strategy.value) {
        Ok(Some(value)) => value,
        Ok(None) | Err(_) => {
            warnings.push(format!("Ignoring {} strategy without a usable value", mode));
            return;
        }
    };

    if let Some(Value::Object(video)) = doc.get_mut("video") {
        match mode {
            RateControlMode::Crf => {
                video.insert("crf".to_string(), strategy.value.clone());
                video.shift_remove("bitrate");
            }
            RateControlMode::Cbr => {
                let Some(bufsize) = double_bitrate(&value) else {
                    warnings.push(format!("Ignoring CBR strategy with unparseable bitrate '{}'", value));
                    return;
                };
                video.insert("bitrate".to_string(), json!(value));
                video.insert("minrate".to_string(), json!(value));
                video.insert("maxrate".to_string(), json!(value));
                video.insert("bufsize".to_string(), json!(bufsize));
                video.shift_remove("crf");
            }
            RateControlMode::Vbr => {
                video.insert("bitrate".to_string(), json!(value));
                video.shift_remove("crf");
            }
        }
        video.insert("rate_control".to_string(), json!(mode.to_string()));
        return;
    }

    match (mode, doc.get_mut("audio")) {
        (RateControlMode::Cbr | RateControlMode::Vbr, Some(Value::Object(audio))) => {
            audio.insert("bitrate".to_string(), json!(value));
        }
        (RateControlMode::Crf, _) => {
            debug!("CRF strategy has no effect without a video section");
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    fn payload(value: Value) -> RecommendationPayload {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_deep_merge_recurses_and_replaces_scalars() {
        let mut doc = object(json!({"video": {"crf": 23, "preset": "medium"}, "audio": {"codec": "aac"}}));
        deep_merge(&mut doc, &object(json!({"video": {"crf": 18, "level": null}})));

        assert_eq!(doc["video"], json!({"crf": 18, "preset": "medium", "level": null}));
        assert_eq!(doc["audio"], json!({"codec": "aac"}));
    }

    #[test]
    fn test_deep_merge_replaces_scalar_with_object() {
        let mut doc = object(json!({"video": "copy"}));
        deep_merge(&mut doc, &object(json!({"video": {"crf": 20}})));
        assert_eq!(doc["video"], json!({"crf": 20}));
    }

    #[test]
    fn test_double_bitrate_keeps_unit() {
        assert_eq!(double_bitrate("45000k").as_deref(), Some("90000k"));
        assert_eq!(double_bitrate("4M").as_deref(), Some("8M"));
        assert_eq!(double_bitrate("2.5M").as_deref(), Some("5M"));
        assert_eq!(double_bitrate("1.25M").as_deref(), Some("2.5M"));
        assert_eq!(double_bitrate("800000").as_deref(), Some("1600000"));
        assert_eq!(double_bitrate("fast"), None);
        assert_eq!(double_bitrate("10kbps"), None);
    }

    #[test]
    fn test_scalar_to_string() {
        assert_eq!(scalar_to_string(&json!(23)), Ok(Some("23".to_string())));
        assert_eq!(scalar_to_string(&json!("slow")), Ok(Some("slow".to_string())));
        assert_eq!(scalar_to_string(&json!(true)), Ok(Some("1".to_string())));
        assert_eq!(scalar_to_string(&Value::Null), Ok(None));
        assert!(scalar_to_string(&json!([1, 2])).is_err());
    }

    #[test]
    fn test_cbr_derives_rate_bounds() {
        let mut doc = object(json!({"video": {"codec": "prores", "crf": 22}}));
        let mut flags = Vec::new();
        let mut warnings = Vec::new();
        let rec = payload(json!({"bitrate_strategy": {"type": "CBR", "value": "45000k"}}));

        apply_recommendation(&mut doc, &rec, &mut flags, &mut warnings);

        assert_eq!(
            doc["video"],
            json!({
                "codec": "prores",
                "bitrate": "45000k",
                "minrate": "45000k",
                "maxrate": "45000k",
                "bufsize": "90000k",
                "rate_control": "CBR"
            })
        );
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_vbr_sets_bitrate_and_keeps_other_fields() {
        let mut doc = object(json!({"video": {"codec": "h264", "crf": 23, "preset": "medium", "movflags": "+faststart"}}));
        let mut warnings = Vec::new();
        let rec = payload(json!({"bitrate_strategy": {"type": "VBR", "value": "5M"}}));

        apply_recommendation(&mut doc, &rec, &mut Vec::new(), &mut warnings);

        assert_eq!(
            doc["video"],
            json!({
                "codec": "h264",
                "preset": "medium",
                "movflags": "+faststart",
                "bitrate": "5M",
                "rate_control": "VBR"
            })
        );
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_unknown_strategy_keeps_previous_value() {
        let mut doc = object(json!({"video": {"crf": 18}}));
        let mut warnings = Vec::new();
        let rec = payload(json!({"bitrate_strategy": {"type": "ABR", "value": "3M"}}));

        apply_recommendation(&mut doc, &rec, &mut Vec::new(), &mut warnings);

        assert_eq!(doc["video"], json!({"crf": 18}));
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn test_recommendation_never_adds_sections() {
        let mut doc = object(json!({"audio": {"codec": "mp3"}}));
        let rec = payload(json!({
            "codec_parameters": {"preset": "slow"},
            "bitrate_strategy": {"type": "CBR", "value": "320k"},
            "ffmpeg_options": ["-write_xing", "0"]
        }));
        let mut flags = vec!["-shortest".to_string()];

        apply_recommendation(&mut doc, &rec, &mut flags, &mut Vec::new());

        assert!(!doc.contains_key("video"));
        assert_eq!(doc["audio"], json!({"codec": "mp3", "bitrate": "320k"}));
        assert_eq!(flags, vec!["-shortest", "-write_xing", "0"]);
    }

    #[test]
    fn test_recommended_codec_change_is_ignored() {
        let mut doc = object(json!({"video": {"codec": "h264"}}));
        let mut warnings = Vec::new();
        let rec = payload(json!({"codec_parameters": {"codec": "vp9", "profile": "high"}}));

        apply_recommendation(&mut doc, &rec, &mut Vec::new(), &mut warnings);

        assert_eq!(doc["video"], json!({"codec": "h264", "profile": "high"}));
        assert_eq!(warnings.len(), 1);
    }
}

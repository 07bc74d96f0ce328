use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::codec::{audio_codecs_match, containers_match, video_codecs_match};
use crate::encode_spec::EncodeSpec;
use crate::media::MediaDescriptor;

/// Pixel-count reduction above which a resolution issue is recorded (percent)
const MAX_RESOLUTION_LOSS: f64 = 10.0;
/// Output below this share of the source size is suspicious (percent)
const MIN_SIZE_SHARE: f64 = 1.0;
/// Duration drift must exceed both of these to be recorded
const MAX_DURATION_DRIFT_SECS: f64 = 1.0;
const MAX_DURATION_DRIFT_SHARE: f64 = 1.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub passed: bool,
    pub issues: Vec<String>,
}

impl ValidationResult {
    pub fn passed() -> Self {
        Self {
            passed: true,
            issues: Vec::new(),
        }
    }

    fn fail(&mut self, issue: String) {
        self.passed = false;
        self.issues.push(issue);
    }

    fn note(&mut self, issue: String) {
        self.issues.push(issue);
    }
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::passed()
    }
}

/// One dimension that differs between source and output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transformation {
    pub dimension: String,
    pub from: String,
    pub to: String,
}

/// Metadata-derived quality estimates; each is present only when its inputs are.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution_preservation: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bitrate_ratio: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_visual_quality: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_bitrate_ratio: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_audio_quality: Option<f64>,
}

/// Checks an encoded output against the EncodeSpec it was built from
#[derive(Debug, Clone, Default)]
pub struct OutputValidator;

impl OutputValidator {
    pub fn new() -> Self {
        Self
    }

    pub fn validate(&self, source: &MediaDescriptor, output: &MediaDescriptor, spec: &EncodeSpec) -> ValidationResult {
        let mut result = ValidationResult::passed();

        if output.size == 0 {
            result.fail("Output file has zero size".to_string());
            warn!("Validation failed for {}: zero size", output.path.display());
            return result;
        }

        if let Some(format) = &spec.container_format {
            if !containers_match(format, &output.container) {
                result.fail(format!("Expected format {}, got {}", format, output.container));
            }
        }

        if let (Some(expected), Some(video)) = (spec.video_codec(), output.primary_video()) {
            if !video_codecs_match(expected, &video.codec) {
                result.fail(format!("Expected video codec {}, got {}", expected, video.codec));
            }
        }

        if let (Some(expected), Some(audio)) = (spec.audio_codec(), output.primary_audio()) {
            if !audio_codecs_match(expected, &audio.codec) {
                result.fail(format!("Expected audio codec {}, got {}", expected, audio.codec));
            }
        }

        if let (Some(src), Some(out)) = (source.primary_video(), output.primary_video()) {
            let src_pixels = src.pixel_count();
            if src_pixels > 0 {
                let reduction = (src_pixels as f64 - out.pixel_count() as f64) / src_pixels as f64 * 100.0;
                if reduction > MAX_RESOLUTION_LOSS {
                    result.note(format!(
                        "Resolution reduced by {:.1}% ({}x{} -> {}x{})",
                        reduction, src.width, src.height, out.width, out.height
                    ));
                }
            }
        }

        if source.size > 0 {
            let share = output.size as f64 / source.size as f64 * 100.0;
            if share < MIN_SIZE_SHARE {
                result.note(format!(
                    "Output file is suspiciously small ({} bytes, {:.2}% of source)",
                    output.size, share
                ));
            }
        }

        if source.duration > 0.0 {
            let drift = (output.duration - source.duration).abs();
            let drift_share = drift / source.duration * 100.0;
            if drift > MAX_DURATION_DRIFT_SECS && drift_share > MAX_DURATION_DRIFT_SHARE {
                result.note(format!(
                    "Duration changed by {:.1}% ({:.2} s -> {:.2} s)",
                    drift_share, source.duration, output.duration
                ));
            }
        }

        debug!(
            "Validation of {}: passed={} issues={}",
            output.path.display(),
            result.passed,
            result.issues.len()
        );
        result
    }
}

pub fn quality_metrics(source: &MediaDescriptor, output: &MediaDescriptor) -> QualityMetrics {
    let mut metrics = QualityMetrics::default();

    if let (Some(src), Some(out)) = (source.primary_video(), output.primary_video()) {
        let src_pixels = src.pixel_count();
        if src_pixels > 0 {
            let ratio = out.pixel_count() as f64 / src_pixels as f64;
            metrics.resolution_preservation = Some(ratio.min(1.0) * 100.0);
        }

        if let (Some(src_rate), Some(out_rate)) = (src.bit_rate, out.bit_rate) {
            if src_rate > 0 && out_rate > 0 {
                metrics.bitrate_ratio = Some(out_rate as f64 / src_rate as f64);
            }
        }

        if let (Some(resolution), Some(bitrate)) = (metrics.resolution_preservation, metrics.bitrate_ratio) {
            let estimate = 0.6 * resolution + 0.4 * (bitrate * 100.0).min(100.0);
            metrics.estimated_visual_quality = Some(estimate.min(100.0));
        }
    }

    if let (Some(src), Some(out)) = (source.primary_audio(), output.primary_audio()) {
        if let (Some(src_rate), Some(out_rate)) = (src.bit_rate, out.bit_rate) {
            if src_rate > 0 && out_rate > 0 {
                let ratio = out_rate as f64 / src_rate as f64;
                metrics.audio_bitrate_ratio = Some(ratio);
                metrics.estimated_audio_quality = Some((ratio * 100.0).min(100.0));
            }
        }
    }

    metrics
}

/// Source bytes over output bytes; 0 for an empty output.
pub fn compression_ratio(source_size: u64, output_size: u64) -> f64 {
    if output_size == 0 {
        0.0
    } else {
        source_size as f64 / output_size as f64
    }
}

/// Diff the descriptors dimension by dimension.
pub fn transformations(source: &MediaDescriptor, output: &MediaDescriptor) -> Vec<Transformation> {
    let mut changes = Vec::new();
    let mut record = |dimension: &str, from: Option<String>, to: Option<String>| {
        if from != to {
            changes.push(Transformation {
                dimension: dimension.to_string(),
                from: from.unwrap_or_else(|| "none".to_string()),
                to: to.unwrap_or_else(|| "none".to_string()),
            });
        }
    };

    let container = |d: &MediaDescriptor| Some(d.primary_container().to_string()).filter(|c| !c.is_empty());
    record("container", container(source), container(output));

    let (src_video, out_video) = (source.primary_video(), output.primary_video());
    record(
        "video_codec",
        src_video.map(|v| v.codec.clone()),
        out_video.map(|v| v.codec.clone()),
    );
    record(
        "resolution",
        src_video.map(|v| format!("{}x{}", v.width, v.height)),
        out_video.map(|v| format!("{}x{}", v.width, v.height)),
    );
    record(
        "frame_rate",
        src_video.map(|v| format!("{:.2}", v.frame_rate)),
        out_video.map(|v| format!("{:.2}", v.frame_rate)),
    );

    let (src_audio, out_audio) = (source.primary_audio(), output.primary_audio());
    record(
        "audio_codec",
        src_audio.map(|a| a.codec.clone()),
        out_audio.map(|a| a.codec.clone()),
    );
    record(
        "sample_rate",
        src_audio.and_then(|a| a.sample_rate).map(|r| r.to_string()),
        out_audio.and_then(|a| a.sample_rate).map(|r| r.to_string()),
    );
    record(
        "channels",
        src_audio.and_then(|a| a.channels).map(|c| c.to_string()),
        out_audio.and_then(|a| a.channels).map(|c| c.to_string()),
    );

    changes
}

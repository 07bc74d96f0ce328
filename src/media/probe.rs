//! ffprobe-backed [`Prober`].
//!
//! Shells out to `ffprobe -v quiet -print_format json -show_format -show_streams`
//! and maps the JSON output into a [`MediaDescriptor`].

use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, error};

use crate::config::ProberConfig;
use crate::error::{exit_status, Result, NormalizerError};
use super::encoder::run_captured;
use super::{AudioStream, MediaDescriptor, Prober, Stream, VideoStream};

pub struct FfprobeProber {
    config: ProberConfig,
}

impl FfprobeProber {
    pub fn new(config: ProberConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Prober for FfprobeProber {
    async fn probe(&self, path: &Path) -> Result<MediaDescriptor> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|_| NormalizerError::Probe(format!("Media file not found: {}", path.display())))?;

        let args = vec![
            "-v".to_string(),
            "quiet".to_string(),
            "-print_format".to_string(),
            "json".to_string(),
            "-show_format".to_string(),
            "-show_streams".to_string(),
            path.to_string_lossy().to_string(),
        ];

        let run = run_captured(&self.config.binary_path, &args, self.config.timeout())
            .await
            .map_err(|e| NormalizerError::Probe(e.to_string()))?;

        if run.exit_code != Some(0) {
            error!("ffprobe error for {}: {}", path.display(), run.stderr.trim());
            return Err(NormalizerError::Probe(format!(
                "ffprobe failed with {}: {}",
                exit_status(&run.exit_code),
                run.stderr.trim()
            )));
        }

        let mut descriptor = parse_probe_output(path, &run.stdout)?;
        if descriptor.size == 0 {
            descriptor.size = metadata.len();
        }

        debug!(
            "Probed {}: container={} streams={} duration={:.2}s",
            path.display(),
            descriptor.container,
            descriptor.streams.len(),
            descriptor.duration
        );
        Ok(descriptor)
    }
}

// ---------------------------------------------------------------------------
// JSON structures
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    format_name: Option<String>,
    duration: Option<String>,
    size: Option<String>,
    bit_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    pix_fmt: Option<String>,
    bit_rate: Option<String>,
    sample_rate: Option<String>,
    channels: Option<u32>,
}

/// Map ffprobe's JSON document into a descriptor.
pub fn parse_probe_output(path: &Path, json: &str) -> Result<MediaDescriptor> {
    let output: FfprobeOutput = serde_json::from_str(json)
        .map_err(|e| NormalizerError::Probe(format!("Invalid ffprobe output: {}", e)))?;

    let mut descriptor = MediaDescriptor::empty(path);

    if let Some(format) = output.format {
        descriptor.container = format.format_name.unwrap_or_default();
        descriptor.duration = parse_non_negative(format.duration.as_deref());
        descriptor.size = parse_u64(format.size.as_deref()).unwrap_or(0);
        descriptor.bit_rate = parse_u64(format.bit_rate.as_deref()).unwrap_or(0);
    }

    for stream in output.streams {
        let codec = stream.codec_name.clone().unwrap_or_default();
        match stream.codec_type.as_deref() {
            Some("video") => {
                let frame_rate = stream
                    .r_frame_rate
                    .as_deref()
                    .map(parse_frame_rate)
                    .filter(|rate| *rate > 0.0)
                    .or_else(|| stream.avg_frame_rate.as_deref().map(parse_frame_rate))
                    .unwrap_or(0.0);

                descriptor.streams.push(Stream::Video(VideoStream {
                    codec,
                    width: stream.width.unwrap_or(0),
                    height: stream.height.unwrap_or(0),
                    frame_rate,
                    pixel_format: stream.pix_fmt,
                    bit_rate: parse_u64(stream.bit_rate.as_deref()),
                }));
            }
            Some("audio") => {
                descriptor.streams.push(Stream::Audio(AudioStream {
                    codec,
                    sample_rate: stream.sample_rate.as_deref().and_then(|s| s.trim().parse().ok()),
                    channels: stream.channels,
                    bit_rate: parse_u64(stream.bit_rate.as_deref()),
                }));
            }
            _ => {}
        }
    }

    Ok(descriptor)
}

/// Strict rational parse for ffprobe frame rates (`30000/1001`, `25/1`, `29.97`).
///
/// Anything malformed, negative, non-finite or with a zero denominator is 0.
pub fn parse_frame_rate(value: &str) -> f64 {
    let value = value.trim();
    let rate = match value.split_once('/') {
        Some((num, den)) => match (num.trim().parse::<u64>(), den.trim().parse::<u64>()) {
            (Ok(num), Ok(den)) if den > 0 => num as f64 / den as f64,
            _ => 0.0,
        },
        None => value.parse::<f64>().unwrap_or(0.0),
    };

    if rate.is_finite() && rate > 0.0 { rate } else { 0.0 }
}

fn parse_u64(value: Option<&str>) -> Option<u64> {
    value.and_then(|v| v.trim().parse().ok())
}

fn parse_non_negative(value: Option<&str>) -> f64 {
    value
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite() && *v >= 0.0)
        .unwrap_or(0.0)
}

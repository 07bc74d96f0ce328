// Media collaborators and the descriptor model
//
// This module owns everything that touches external media tools:
// - Probe: ffprobe-backed Prober producing MediaDescriptors
// - Commands: translation of an EncodeSpec into encoder arguments
// - Encoder: ffmpeg-backed Encoder running those arguments

pub mod commands;
pub mod encoder;
pub mod probe;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub use commands::*;
pub use encoder::*;
pub use probe::*;

use crate::error::Result;

/// Immutable snapshot of a probed media file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaDescriptor {
    pub path: PathBuf,
    /// Container name as reported by the prober, e.g. `mov,mp4,m4a,3gp,3g2,mj2`
    pub container: String,
    /// Streams in probe order
    pub streams: Vec<Stream>,
    /// Seconds
    pub duration: f64,
    /// Bytes
    pub size: u64,
    /// Bits per second
    pub bit_rate: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Stream {
    Video(VideoStream),
    Audio(AudioStream),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoStream {
    pub codec: String,
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
    pub pixel_format: Option<String>,
    pub bit_rate: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioStream {
    pub codec: String,
    pub sample_rate: Option<u32>,
    pub channels: Option<u32>,
    pub bit_rate: Option<u64>,
}

impl VideoStream {
    pub fn pixel_count(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

impl MediaDescriptor {
    /// Descriptor with no streams; valid, but yields no codec validation.
    pub fn empty<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            container: String::new(),
            streams: Vec::new(),
            duration: 0.0,
            size: 0,
            bit_rate: 0,
        }
    }

    /// First video stream in probe order.
    pub fn primary_video(&self) -> Option<&VideoStream> {
        self.streams.iter().find_map(|stream| match stream {
            Stream::Video(video) => Some(video),
            Stream::Audio(_) => None,
        })
    }

    /// First audio stream in probe order.
    pub fn primary_audio(&self) -> Option<&AudioStream> {
        self.streams.iter().find_map(|stream| match stream {
            Stream::Audio(audio) => Some(audio),
            Stream::Video(_) => None,
        })
    }

    /// First entry of the prober's container list (`mov,mp4,...` -> `mov`).
    pub fn primary_container(&self) -> &str {
        self.container.split(',').next().unwrap_or("").trim()
    }

    pub fn resolution(&self) -> Option<(u32, u32)> {
        self.primary_video().map(|video| (video.width, video.height))
    }
}

/// Captured outcome of one encoder invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct EncoderOutput {
    /// `None` when the process was terminated by a signal
    pub exit_code: Option<i32>,
    /// stdout and stderr, combined
    pub diagnostics: String,
}

impl EncoderOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Extracts technical metadata from a media file.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Prober: Send + Sync {
    /// Fails with `NormalizerError::Probe` on a missing
    /// file, a non-zero tool exit, or malformed metadata output.
    async fn probe(&self, path: &Path) -> Result<MediaDescriptor>;
}

/// Runs the external encoder with a prepared argument sequence.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Encoder: Send + Sync {
    /// Only the zero/non-zero distinction of the exit code is meaningful.
    async fn run(&self, args: &[String]) -> Result<EncoderOutput>;

    /// Check that the encoder binary can be executed at all
    async fn check_availability(&self) -> Result<()>;
}

use std::path::Path;
use tracing::debug;

use crate::codec::{container_profile, prores_profile_index, video_encoder_arg};
use crate::encode_spec::{AudioSpec, EncodeSpec, RateControlMode, Setting, VideoSpec};
use super::MediaDescriptor;

/// Encoder argument sequence under construction
#[derive(Debug, Clone, PartialEq)]
pub struct MediaCommand {
    pub args: Vec<String>,
    pub description: String,
}

impl MediaCommand {
    /// Create a new, empty argument sequence
    pub fn new<S: Into<String>>(description: S) -> Self {
        Self {
            args: Vec::new(),
            description: description.into(),
        }
    }

    /// Add an argument
    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(|s| s.into()));
        self
    }

    /// Add a flag followed by its value
    pub fn option<F: Into<String>, V: Into<String>>(self, flag: F, value: V) -> Self {
        self.arg(flag).arg(value)
    }

    /// Add input file
    pub fn input<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg("-i").arg(path.as_ref().to_string_lossy().to_string())
    }

    /// Add output file
    pub fn output<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg(path.as_ref().to_string_lossy().to_string())
    }

    /// Force overwrite output
    pub fn overwrite(self) -> Self {
        self.arg("-y")
    }

    /// Force the output container
    pub fn format<S: Into<String>>(self, muxer: S) -> Self {
        self.option("-f", muxer)
    }

    /// Set video codec
    pub fn video_codec<S: Into<String>>(self, codec: S) -> Self {
        self.option("-c:v", codec)
    }

    /// Set audio codec
    pub fn audio_codec<S: Into<String>>(self, codec: S) -> Self {
        self.option("-c:a", codec)
    }

    /// Set audio bitrate
    pub fn audio_bitrate<S: Into<String>>(self, bitrate: S) -> Self {
        self.option("-b:a", bitrate)
    }

    /// Set audio sample rate
    pub fn audio_sample_rate<S: Into<String>>(self, rate: S) -> Self {
        self.option("-ar", rate)
    }

    /// Set audio channels
    pub fn audio_channels<S: Into<String>>(self, channels: S) -> Self {
        self.option("-ac", channels)
    }

    /// Copy container metadata from the first input to the output
    pub fn copy_metadata(self) -> Self {
        self.option("-map_metadata", "0")
    }

    pub fn into_args(self) -> Vec<String> {
        self.args
    }
}

/// Translates an [`EncodeSpec`] into a concrete encoder invocation.
///
/// Argument order is fixed: global options, video branch, audio branch,
/// metadata, custom flags, output path.
#[derive(Debug, Clone)]
pub struct EncodeCommandBuilder {
    overwrite: bool,
}

impl EncodeCommandBuilder {
    pub fn new(overwrite: bool) -> Self {
        Self { overwrite }
    }

    /// Build the full argument sequence for converting `source` to `output`.
    pub fn build(&self, spec: &EncodeSpec, source: &MediaDescriptor, output: &Path) -> Vec<String> {
        let description = format!(
            "Normalize {} -> {}",
            source.path.display(),
            spec.container_format.as_deref().unwrap_or("source container")
        );

        let mut cmd = MediaCommand::new(description);
        if self.overwrite {
            cmd = cmd.overwrite();
        }
        cmd = cmd.input(&source.path);

        if let Some(muxer) = forced_muxer(spec, output) {
            cmd = cmd.format(muxer);
        }

        if let (Some(video), Some(_)) = (&spec.video, source.primary_video()) {
            cmd = video_branch(cmd, video, spec.container_format.as_deref());
        }

        if let (Some(audio), Some(_)) = (&spec.audio, source.primary_audio()) {
            cmd = audio_branch(cmd, audio);
        }

        if spec.preserve_metadata {
            cmd = cmd.copy_metadata();
        }

        cmd = cmd.args(spec.extra_encoder_flags.iter().cloned());

        let cmd = cmd.output(output);
        debug!("{}: {:?}", cmd.description, cmd.args);
        cmd.into_args()
    }
}

/// `-f` is forced only when the output extension does not already name the
/// requested container.
fn forced_muxer(spec: &EncodeSpec, output: &Path) -> Option<String> {
    let format = spec.container_format.as_deref()?;
    let extension = output
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    if extension == format.to_lowercase() {
        return None;
    }

    Some(
        container_profile(format)
            .map(|profile| profile.muxer.to_string())
            .unwrap_or_else(|| format.to_lowercase()),
    )
}

fn video_branch(mut cmd: MediaCommand, video: &VideoSpec, container: Option<&str>) -> MediaCommand {
    let codec = video.codec.value().map(String::as_str);

    if let Some(codec) = codec {
        cmd = cmd.video_codec(video_encoder_arg(codec));
    }

    // Keys the codec-specific section below has already emitted.
    let mut consumed: Vec<&str> = Vec::new();

    match codec {
        Some("h264") | Some("h265") => {
            cmd = rate_control(cmd, video);
            if let Some(preset) = video.extra_params.get("preset") {
                cmd = cmd.option("-preset", preset);
            }
            consumed.push("preset");
        }
        Some("prores") => {
            let profile = match video.extra_params.get("profile") {
                Some(profile) => Some(profile),
                None if video.extra_params.contains_key("profile") => None,
                None => Some("standard"),
            };
            if let Some(profile) = profile {
                cmd = cmd.option("-profile:v", prores_profile_index(profile));
            }
            let vendor = video.extra_params.get("vendor").unwrap_or("apl0");
            cmd = cmd.option("-vendor", vendor);
            consumed.extend(["profile", "vendor"]);
        }
        Some("vp9") | Some("av1") => {
            if let Setting::Value(rc) = &video.rate_control {
                match rc.mode {
                    RateControlMode::Crf => {
                        cmd = cmd.option("-crf", rc.value.as_str()).option("-b:v", "0");
                    }
                    RateControlMode::Cbr | RateControlMode::Vbr => {
                        cmd = cmd.option("-b:v", rc.value.as_str());
                    }
                }
            }
        }
        _ => {
            cmd = rate_control(cmd, video);
        }
    }

    for (key, value) in video.extra_params.iter() {
        if consumed.contains(&key) {
            continue;
        }
        let Some(value) = value else {
            continue;
        };
        if let Some(flag) = video_param_flag(key, codec, container) {
            cmd = cmd.option(flag, value);
        }
    }

    cmd
}

fn rate_control(cmd: MediaCommand, video: &VideoSpec) -> MediaCommand {
    match &video.rate_control {
        Setting::Value(rc) => match rc.mode {
            RateControlMode::Crf => cmd.option("-crf", rc.value.as_str()),
            RateControlMode::Cbr | RateControlMode::Vbr => cmd.option("-b:v", rc.value.as_str()),
        },
        Setting::Unset | Setting::Disabled => cmd,
    }
}

/// Flag for a video extra parameter, or `None` when the parameter does not
/// apply to this codec/container. Unknown keys pass through as `-<key>`.
fn video_param_flag(key: &str, codec: Option<&str>, container: Option<&str>) -> Option<String> {
    let flag = match key {
        "profile" => "-profile:v",
        "pix_fmt" | "pixel_format" => "-pix_fmt",
        "maxrate" => "-maxrate",
        "minrate" => "-minrate",
        "bufsize" => "-bufsize",
        "qscale" => "-qscale:v",
        "level" => {
            if !matches!(codec, Some("h264") | Some("h265")) {
                debug!("Skipping level for codec {:?}", codec);
                return None;
            }
            "-level"
        }
        "movflags" => {
            if !matches!(container, Some("mp4") | Some("mov")) {
                debug!("Skipping movflags for container {:?}", container);
                return None;
            }
            "-movflags"
        }
        other => {
            let name = other.trim_start_matches('-');
            if name.is_empty() {
                return None;
            }
            return Some(format!("-{}", name));
        }
    };
    Some(flag.to_string())
}

fn audio_branch(mut cmd: MediaCommand, audio: &AudioSpec) -> MediaCommand {
    if let Some(codec) = audio.codec.value() {
        cmd = cmd.audio_codec(codec.as_str());
    }
    if let Some(bitrate) = audio.bitrate.value() {
        cmd = cmd.audio_bitrate(bitrate.as_str());
    }
    if let Some(rate) = audio.sample_rate.value() {
        cmd = cmd.audio_sample_rate(rate.as_str());
    }
    if let Some(channels) = audio.channels.value() {
        cmd = cmd.audio_channels(channels.as_str());
    }
    cmd
}

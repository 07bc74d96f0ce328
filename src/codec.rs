//! Codec name normalization and container profiles.
//!
//! Every component downstream of the resolver compares codecs by their
//! canonical names only. Aliases cover both ffprobe's codec names and the
//! ffmpeg encoder library names a caller is likely to pass.

/// Alias groups for video codecs; the first entry is the canonical name.
const VIDEO_ALIASES: &[&[&str]] = &[
    &["h264", "libx264", "x264", "avc", "avc1", "h264_nvenc", "h264_videotoolbox"],
    &["h265", "hevc", "libx265", "x265", "hvc1", "hev1", "hevc_nvenc", "hevc_videotoolbox"],
    &["prores", "prores_ks", "prores_aw", "prores_videotoolbox"],
    &["vp9", "libvpx-vp9", "vp09"],
    &["vp8", "libvpx"],
    &["av1", "libaom-av1", "libsvtav1", "librav1e", "av01"],
    &["dnxhd", "dnxhr"],
    &["mjpeg", "jpeg"],
    &["mpeg4", "libxvid"],
];

const AUDIO_ALIASES: &[&[&str]] = &[
    &["aac", "aac_lc", "libfdk_aac", "mp4a"],
    &["mp3", "libmp3lame", "mp3float"],
    &["opus", "libopus"],
    &["vorbis", "libvorbis"],
    &["ac3", "ac-3"],
    &["eac3", "e-ac-3"],
];

fn canonical_in(groups: &[&[&str]], name: &str) -> String {
    let lowered = name.trim().to_lowercase();
    groups
        .iter()
        .find(|group| group.contains(&lowered.as_str()))
        .map(|group| group[0].to_string())
        .unwrap_or(lowered)
}

/// Canonical name for a video codec (`hevc` -> `h265`, `libx264` -> `h264`).
pub fn canonical_video_codec(name: &str) -> String {
    canonical_in(VIDEO_ALIASES, name)
}

/// Canonical name for an audio codec (`aac_lc` -> `aac`).
pub fn canonical_audio_codec(name: &str) -> String {
    canonical_in(AUDIO_ALIASES, name)
}

pub fn video_codecs_match(expected: &str, actual: &str) -> bool {
    canonical_video_codec(expected) == canonical_video_codec(actual)
}

pub fn audio_codecs_match(expected: &str, actual: &str) -> bool {
    canonical_audio_codec(expected) == canonical_audio_codec(actual)
}

/// Name handed to `-c:v` for a canonical video codec.
///
/// ffmpeg resolves codec descriptor names (`h264`, `hevc`, `vp9`, `av1`) to
/// whichever encoder it was built with. ProRes is pinned to `prores_ks`
/// because the profile and vendor options rely on it.
pub fn video_encoder_arg(canonical: &str) -> &str {
    match canonical {
        "h265" => "hevc",
        "prores" => "prores_ks",
        other => other,
    }
}

/// Numeric `-profile:v` index for a ProRes profile name.
///
/// Unknown names fall back to `standard`; numeric indices pass through.
pub fn prores_profile_index(profile: &str) -> &'static str {
    match profile.trim().to_lowercase().as_str() {
        "proxy" | "0" => "0",
        "lt" | "1" => "1",
        "standard" | "2" => "2",
        "hq" | "3" => "3",
        "4444" | "4" => "4",
        "4444xq" | "5" => "5",
        _ => "2",
    }
}

/// What a container implies before any preset or override is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerProfile {
    pub name: &'static str,
    /// Muxer name for `-f`
    pub muxer: &'static str,
    pub video_codec: Option<&'static str>,
    pub audio_codec: Option<&'static str>,
    /// Audio codecs a preset may substitute for the default
    pub accepted_audio: &'static [&'static str],
    /// Names the prober may report for this container
    pub probe_names: &'static [&'static str],
}

impl ContainerProfile {
    pub fn has_video(&self) -> bool {
        self.video_codec.is_some()
    }

    pub fn has_audio(&self) -> bool {
        self.audio_codec.is_some()
    }

    pub fn is_audio_only(&self) -> bool {
        !self.has_video() && self.has_audio()
    }

    pub fn accepts_audio(&self, codec: &str) -> bool {
        let canonical = canonical_audio_codec(codec);
        self.accepted_audio.iter().any(|accepted| *accepted == canonical)
    }

    /// Whether the prober's container name (possibly a comma separated list)
    /// identifies this container.
    pub fn matches_probe_name(&self, detected: &str) -> bool {
        detected
            .split(',')
            .map(|part| part.trim().to_lowercase())
            .any(|part| part == self.name || self.probe_names.contains(&part.as_str()))
    }
}

const MOV_FAMILY_AUDIO: &[&str] = &["aac", "mp3", "ac3", "eac3", "alac", "pcm_s16le", "pcm_s24le"];
const MKV_AUDIO: &[&str] = &["aac", "mp3", "opus", "vorbis", "flac", "ac3", "eac3", "pcm_s16le", "pcm_s24le"];

const CONTAINERS: &[ContainerProfile] = &[
    ContainerProfile {
        name: "mp4",
        muxer: "mp4",
        video_codec: Some("h264"),
        audio_codec: Some("aac"),
        accepted_audio: &["aac", "mp3", "ac3", "eac3", "opus", "alac"],
        probe_names: &["mp4", "mov", "m4a", "3gp", "3g2", "mj2"],
    },
    ContainerProfile {
        name: "mov",
        muxer: "mov",
        video_codec: Some("prores"),
        audio_codec: Some("aac"),
        accepted_audio: MOV_FAMILY_AUDIO,
        probe_names: &["mov", "mp4", "m4a", "3gp", "3g2", "mj2"],
    },
    ContainerProfile {
        name: "mkv",
        muxer: "matroska",
        video_codec: Some("h265"),
        audio_codec: Some("aac"),
        accepted_audio: MKV_AUDIO,
        probe_names: &["matroska"],
    },
    ContainerProfile {
        name: "webm",
        muxer: "webm",
        video_codec: Some("vp9"),
        audio_codec: Some("opus"),
        accepted_audio: &["opus", "vorbis"],
        probe_names: &["webm"],
    },
    ContainerProfile {
        name: "avi",
        muxer: "avi",
        video_codec: Some("h264"),
        audio_codec: Some("mp3"),
        accepted_audio: &["mp3", "aac", "ac3", "pcm_s16le"],
        probe_names: &["avi"],
    },
    ContainerProfile {
        name: "mxf",
        muxer: "mxf",
        video_codec: Some("dnxhd"),
        audio_codec: Some("pcm_s24le"),
        accepted_audio: &["pcm_s16le", "pcm_s24le"],
        probe_names: &["mxf"],
    },
    ContainerProfile {
        name: "mp3",
        muxer: "mp3",
        video_codec: None,
        audio_codec: Some("mp3"),
        accepted_audio: &["mp3"],
        probe_names: &["mp3"],
    },
    ContainerProfile {
        name: "wav",
        muxer: "wav",
        video_codec: None,
        audio_codec: Some("pcm_s16le"),
        accepted_audio: &["pcm_s16le", "pcm_s24le"],
        probe_names: &["wav"],
    },
    ContainerProfile {
        name: "aac",
        muxer: "adts",
        video_codec: None,
        audio_codec: Some("aac"),
        accepted_audio: &["aac"],
        probe_names: &["aac", "adts"],
    },
    ContainerProfile {
        name: "flac",
        muxer: "flac",
        video_codec: None,
        audio_codec: Some("flac"),
        accepted_audio: &["flac"],
        probe_names: &["flac"],
    },
    ContainerProfile {
        name: "ogg",
        muxer: "ogg",
        video_codec: None,
        audio_codec: Some("vorbis"),
        accepted_audio: &["vorbis", "opus", "flac"],
        probe_names: &["ogg"],
    },
    ContainerProfile {
        name: "m4a",
        muxer: "ipod",
        video_codec: None,
        audio_codec: Some("aac"),
        accepted_audio: &["aac", "alac"],
        probe_names: &["mov", "mp4", "m4a", "ipod"],
    },
    ContainerProfile {
        name: "jpg",
        muxer: "image2",
        video_codec: Some("mjpeg"),
        audio_codec: None,
        accepted_audio: &[],
        probe_names: &["image2", "jpeg_pipe", "mjpeg"],
    },
    ContainerProfile {
        name: "png",
        muxer: "image2",
        video_codec: Some("png"),
        audio_codec: None,
        accepted_audio: &[],
        probe_names: &["image2", "png_pipe"],
    },
    ContainerProfile {
        name: "tiff",
        muxer: "image2",
        video_codec: Some("tiff"),
        audio_codec: None,
        accepted_audio: &[],
        probe_names: &["image2", "tiff_pipe"],
    },
    ContainerProfile {
        name: "webp",
        muxer: "webp",
        video_codec: Some("webp"),
        audio_codec: None,
        accepted_audio: &[],
        probe_names: &["image2", "webp_pipe", "webp"],
    },
    ContainerProfile {
        name: "avif",
        muxer: "avif",
        video_codec: Some("av1"),
        audio_codec: None,
        accepted_audio: &[],
        probe_names: &["avif", "mov", "mp4"],
    },
];

/// Profile used for containers missing from the table: treat as a generic
/// video container that defaults to h264/aac.
const GENERIC: ContainerProfile = ContainerProfile {
    name: "",
    muxer: "",
    video_codec: Some("h264"),
    audio_codec: Some("aac"),
    accepted_audio: MKV_AUDIO,
    probe_names: &[],
};

/// Look up a container by name; `None` for containers outside the table.
pub fn container_profile(format: &str) -> Option<&'static ContainerProfile> {
    let lowered = format.trim().to_lowercase();
    let lowered = match lowered.as_str() {
        "matroska" => "mkv",
        "jpeg" => "jpg",
        "tif" => "tiff",
        other => other,
    };
    CONTAINERS.iter().find(|profile| profile.name == lowered)
}

/// Container profile with the generic fallback for unknown formats.
pub fn container_or_generic(format: &str) -> ContainerProfile {
    container_profile(format).copied().unwrap_or(GENERIC)
}

/// Whether a detected container satisfies the requested one.
pub fn containers_match(requested: &str, detected: &str) -> bool {
    match container_profile(requested) {
        Some(profile) => profile.matches_probe_name(detected),
        None => {
            let requested = requested.trim().to_lowercase();
            detected
                .split(',')
                .any(|part| part.trim().eq_ignore_ascii_case(&requested))
        }
    }
}

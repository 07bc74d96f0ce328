use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

use crate::error::Result;
use crate::resolve::TargetFormat;
use crate::workflow::NormalizeRequest;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Normalize a single media file
    Normalize {
        /// Input media file
        #[arg(short, long)]
        input: PathBuf,

        /// Output file (defaults to <output_dir>/<stem>.<format>)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        job: JobArgs,
    },

    /// Normalize every media file in a directory
    Batch {
        /// Input directory containing media files
        #[arg(short, long)]
        input_dir: PathBuf,

        /// Output directory for normalized files
        #[arg(short, long)]
        output_dir: PathBuf,

        #[command(flatten)]
        job: JobArgs,
    },

    /// List available presets
    Presets,

    /// Write the default configuration file
    InitConfig {
        /// Destination path
        #[arg(short, long, default_value = "config.toml")]
        output: PathBuf,
    },
}

/// Options shared by `normalize` and `batch`
#[derive(ClapArgs, Debug, Clone)]
pub struct JobArgs {
    /// Target container format (mp4, mov, mkv, webm, wav, mp3, ...)
    #[arg(short, long)]
    pub format: String,

    /// Video codec (audio codec for audio-only formats)
    #[arg(short, long)]
    pub codec: Option<String>,

    /// Audio codec
    #[arg(long)]
    pub audio_codec: Option<String>,

    /// Preset name (defaults to the configured preset)
    #[arg(short, long)]
    pub preset: Option<String>,

    /// Override parameters as JSON, e.g. '{"video": {"crf": 18}}'
    #[arg(long)]
    pub parameters: Option<String>,

    /// Ask the recommender for encoding parameters
    #[arg(long)]
    pub ai: bool,

    /// Skip output validation
    #[arg(long)]
    pub no_validate: bool,

    /// Do not copy source metadata
    #[arg(long)]
    pub no_metadata: bool,

    /// Write the job result(s) as JSON to this path
    #[arg(long)]
    pub output_json: Option<PathBuf>,
}

impl JobArgs {
    /// Build the target format; malformed `--parameters` JSON is rejected here.
    pub fn target(&self) -> Result<TargetFormat> {
        let mut target = TargetFormat::new(self.format.clone());
        target.codec = self.codec.clone();
        target.audio_codec = self.audio_codec.clone();
        if self.no_metadata {
            target.preserve_metadata = Some(false);
        }

        match &self.parameters {
            Some(json) => target.with_parameters_json(json),
            None => Ok(target),
        }
    }

    pub fn request(&self, source: PathBuf, output: Option<PathBuf>) -> Result<NormalizeRequest> {
        let mut request = NormalizeRequest::new(source, self.target()?);
        request.output = output;
        request.preset = self.preset.clone();
        request.ai_enabled = self.ai;
        if self.no_validate {
            request.validate = Some(false);
        }
        Ok(request)
    }
}

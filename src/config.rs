use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use crate::error::{Result, NormalizerError};

fn default_max_concurrent_jobs() -> usize {
    4
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub prober: ProberConfig,
    pub encoder: EncoderConfig,
    pub recommender: RecommenderConfig,
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProberConfig {
    /// Path to ffprobe binary
    pub binary_path: String,
    /// Upper bound for a single probe
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncoderConfig {
    /// Path to ffmpeg binary
    pub binary_path: String,
    /// Upper bound for a single conversion
    pub timeout_secs: u64,
    /// Emit `-y` so an existing staged output never blocks on a prompt
    #[serde(default = "default_true")]
    pub overwrite: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommenderConfig {
    /// Whether the HTTP recommender is wired in at all
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Ollama endpoint URL
    pub endpoint: String,
    /// Model asked for encoding recommendations
    pub model: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Directory that receives outputs when a request names no output path
    pub output_dir: PathBuf,
    /// Base directory for per-job working areas (system temp dir when unset)
    #[serde(default)]
    pub work_dir: Option<PathBuf>,
    /// Upper bound on concurrently running jobs in a batch
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,
    /// Preset used when the caller names none
    pub default_preset: String,
    #[serde(default = "default_true")]
    pub validate_output: bool,
    #[serde(default = "default_true")]
    pub preserve_metadata: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            prober: ProberConfig {
                binary_path: "ffprobe".to_string(),
                timeout_secs: 60,
            },
            encoder: EncoderConfig {
                binary_path: "ffmpeg".to_string(),
                timeout_secs: 3600,
                overwrite: true,
            },
            recommender: RecommenderConfig {
                enabled: true,
                endpoint: "http://localhost:11434".to_string(),
                model: "llama3.2:3b".to_string(),
                timeout_secs: 60,
            },
            pipeline: PipelineConfig {
                output_dir: PathBuf::from("output"),
                work_dir: None,
                max_concurrent_jobs: default_max_concurrent_jobs(),
                default_preset: "standard".to_string(),
                validate_output: true,
                preserve_metadata: true,
            },
        }
    }
}

impl ProberConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl EncoderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl RecommenderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(NormalizerError::FileNotFound(path.display().to_string()));
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| NormalizerError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)?;

        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| NormalizerError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| NormalizerError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.pipeline.max_concurrent_jobs == 0 {
            return Err(NormalizerError::Config(
                "pipeline.max_concurrent_jobs must be at least 1".to_string(),
            ));
        }
        if self.encoder.binary_path.trim().is_empty() || self.prober.binary_path.trim().is_empty() {
            return Err(NormalizerError::Config("tool binary paths must not be empty".to_string()));
        }
        Ok(())
    }
}

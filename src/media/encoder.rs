use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::EncoderConfig;
use crate::error::{Result, NormalizerError};
use super::{Encoder, EncoderOutput};

/// Raw result of a captured child process.
#[derive(Debug)]
pub(crate) struct CapturedRun {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Spawn `binary args...` off the calling task, capture both output streams,
/// and bound the run by `timeout`.
///
/// The child is spawned with `kill_on_drop`, so dropping the returned future
/// (job cancellation) or hitting the timeout terminates the process.
pub(crate) async fn run_captured(binary: &str, args: &[String], timeout: Duration) -> Result<CapturedRun> {
    debug!("Executing {} {:?}", binary, args);

    let child = Command::new(binary)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| NormalizerError::Io(std::io::Error::new(
            e.kind(),
            format!("Failed to execute {}: {}", binary, e),
        )))?;

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => Ok(CapturedRun {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        }),
        Ok(Err(e)) => Err(NormalizerError::Io(e)),
        Err(_elapsed) => Err(NormalizerError::Timeout {
            tool: binary.to_string(),
            seconds: timeout.as_secs(),
        }),
    }
}

/// ffmpeg-backed encoder
pub struct FfmpegEncoder {
    config: EncoderConfig,
}

impl FfmpegEncoder {
    pub fn new(config: EncoderConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Encoder for FfmpegEncoder {
    async fn run(&self, args: &[String]) -> Result<EncoderOutput> {
        let run = run_captured(&self.config.binary_path, args, self.config.timeout()).await?;

        // ffmpeg reports on stderr; stdout is normally empty
        let diagnostics = if run.stdout.is_empty() {
            run.stderr
        } else {
            format!("{}{}", run.stdout, run.stderr)
        };

        Ok(EncoderOutput {
            exit_code: run.exit_code,
            diagnostics,
        })
    }

    async fn check_availability(&self) -> Result<()> {
        let run = run_captured(
            &self.config.binary_path,
            &["-version".to_string()],
            Duration::from_secs(10),
        )
        .await?;

        if run.exit_code == Some(0) {
            info!("Encoder is available: {}", run.stdout.lines().next().unwrap_or("unknown version"));
            Ok(())
        } else {
            Err(NormalizerError::Config(format!(
                "Encoder version check failed: {}",
                run.stderr.trim()
            )))
        }
    }
}

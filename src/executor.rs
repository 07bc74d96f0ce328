use std::sync::Arc;
use tracing::{debug, error};

use crate::error::{NormalizerError, Result};
use crate::media::Encoder;

/// Result of a successful encoder run
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionOutcome {
    pub diagnostics: String,
    /// Stream mapping and encoder lines picked out of the diagnostics
    pub notes: Vec<String>,
}

/// Runs the encoder and turns a non-zero exit into an error.
pub struct ConversionExecutor {
    encoder: Arc<dyn Encoder>,
}

impl ConversionExecutor {
    pub fn new(encoder: Arc<dyn Encoder>) -> Self {
        Self { encoder }
    }

    pub async fn execute(&self, args: &[String]) -> Result<ConversionOutcome> {
        let output = self.encoder.run(args).await?;

        if !output.success() {
            error!("Encoder exited with {:?}", output.exit_code);
            return Err(NormalizerError::Encode {
                exit_code: output.exit_code,
                diagnostics: output.diagnostics,
            });
        }

        let notes = scan_diagnostics(&output.diagnostics);
        debug!("Encoder finished, {} notable diagnostic lines", notes.len());

        Ok(ConversionOutcome {
            diagnostics: output.diagnostics,
            notes,
        })
    }
}

/// Best-effort pick of the lines that describe what the encoder did.
pub fn scan_diagnostics(diagnostics: &str) -> Vec<String> {
    let mut notes: Vec<String> = Vec::new();

    for line in diagnostics.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let notable = line.starts_with("Output")
            || line.contains("Stream mapping:")
            || line.contains("->")
            || line.contains("encoder")
            || line.contains("bitrate");

        if notable && !notes.iter().any(|note| note == line) {
            notes.push(line.to_string());
        }
    }

    notes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{EncoderOutput, MockEncoder};
    use tokio_test::assert_ok;

    const DIAGNOSTICS: &str = "\
Input #0, mov,mp4,m4a,3gp,3g2,mj2, from 'in.mov':
  Duration: 00:00:10.00, start: 0.000000, bitrate: 4604 kb/s
Stream mapping:
  Stream #0:0 -> #0:0 (h264 (native) -> h264 (libx264))
  Stream #0:1 -> #0:1 (aac (native) -> aac (native))
Output #0, mp4, to 'out.mp4':
      encoder         : Lavc60.3.100 libx264
      encoder         : Lavc60.3.100 libx264
frame=  300 fps=120 q=-1.0 Lsize=    2048kB time=00:00:10.00
";

    fn executor(exit_code: Option<i32>, diagnostics: &'static str) -> ConversionExecutor {
        let mut encoder = MockEncoder::new();
        encoder.expect_run().times(1).returning(move |_| {
            Ok(EncoderOutput {
                exit_code,
                diagnostics: diagnostics.to_string(),
            })
        });
        ConversionExecutor::new(Arc::new(encoder))
    }

    #[tokio::test]
    async fn test_success_collects_notes_in_order() {
        let outcome = assert_ok!(executor(Some(0), DIAGNOSTICS).execute(&[]).await);

        assert_eq!(
            outcome.notes,
            vec![
                "Duration: 00:00:10.00, start: 0.000000, bitrate: 4604 kb/s",
                "Stream mapping:",
                "Stream #0:0 -> #0:0 (h264 (native) -> h264 (libx264))",
                "Stream #0:1 -> #0:1 (aac (native) -> aac (native))",
                "Output #0, mp4, to 'out.mp4':",
                "encoder         : Lavc60.3.100 libx264",
            ]
        );
        assert_eq!(outcome.diagnostics, DIAGNOSTICS);
    }

    #[tokio::test]
    async fn test_no_matches_is_not_an_error() {
        let outcome = assert_ok!(executor(Some(0), "done\n").execute(&[]).await);
        assert!(outcome.notes.is_empty());
    }

    #[tokio::test]
    async fn test_non_zero_exit_keeps_diagnostics_verbatim() {
        let diagnostics = "Unknown encoder 'libfoo'\nError while opening encoder\n";
        let result = executor(Some(1), diagnostics).execute(&[]).await;

        match result {
            Err(NormalizerError::Encode { exit_code, diagnostics: text }) => {
                assert_eq!(exit_code, Some(1));
                assert_eq!(text, diagnostics);
            }
            other => panic!("expected encode error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_killed_encoder_is_a_failure() {
        let result = executor(None, "").execute(&[]).await;
        assert!(matches!(result, Err(NormalizerError::Encode { exit_code: None, .. })));
    }
}

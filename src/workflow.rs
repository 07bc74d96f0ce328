use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::fs;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::config::Config;
use crate::encode_spec::EncodeSpec;
use crate::error::{NormalizerError, Result};
use crate::executor::ConversionExecutor;
use crate::media::{EncodeCommandBuilder, Encoder, FfmpegEncoder, FfprobeProber, MediaDescriptor, Prober};
use crate::quality::{
    compression_ratio, quality_metrics, transformations, OutputValidator, QualityMetrics, Transformation,
    ValidationResult,
};
use crate::recommend::{OllamaRecommender, RecommendationSource, Recommender};
use crate::resolve::{resolve, AiInput, TargetFormat};

/// Extensions picked up when normalizing a whole directory
const MEDIA_EXTENSIONS: &[&str] = &[
    "mp4", "mov", "avi", "mkv", "wav", "mp3", "jpg", "png", "webm", "flac", "m4a", "mxf",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    Pending,
    Analyzing,
    AiAnalyzing,
    Converting,
    Validating,
    Completed,
    Failed,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobState::Pending => "pending",
            JobState::Analyzing => "analyzing",
            JobState::AiAnalyzing => "ai-analyzing",
            JobState::Converting => "converting",
            JobState::Validating => "validating",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// One normalization job as submitted by a caller
#[derive(Debug, Clone)]
pub struct NormalizeRequest {
    pub source: PathBuf,
    /// Defaults to `<output_dir>/<source stem>.<format>`
    pub output: Option<PathBuf>,
    pub target: TargetFormat,
    /// Defaults to the configured preset
    pub preset: Option<String>,
    pub ai_enabled: bool,
    /// Defaults to the configured setting
    pub validate: Option<bool>,
}

impl NormalizeRequest {
    pub fn new<P: Into<PathBuf>>(source: P, target: TargetFormat) -> Self {
        Self {
            source: source.into(),
            output: None,
            target,
            preset: None,
            ai_enabled: false,
            validate: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Performance {
    /// Wall time of the encoder run
    pub processing_time_seconds: f64,
    pub compression_ratio: f64,
    pub quality: QualityMetrics,
}

/// Everything known about a finished job, successful or not
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    pub job_id: Uuid,
    pub status: JobState,
    /// Verbatim error text when the job failed
    pub error: Option<String>,
    pub source_path: PathBuf,
    pub output_path: Option<PathBuf>,
    pub source: Option<MediaDescriptor>,
    pub output: Option<MediaDescriptor>,
    pub spec: Option<EncodeSpec>,
    pub validation: Option<ValidationResult>,
    pub performance: Option<Performance>,
    pub transformations: Vec<Transformation>,
    pub encoder_notes: Vec<String>,
    pub warnings: Vec<String>,
    pub recommendation_source: Option<RecommendationSource>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl JobResult {
    fn pending(source_path: PathBuf) -> Self {
        Self {
            job_id: Uuid::new_v4(),
            status: JobState::Pending,
            error: None,
            source_path,
            output_path: None,
            source: None,
            output: None,
            spec: None,
            validation: None,
            performance: None,
            transformations: Vec::new(),
            encoder_notes: Vec::new(),
            warnings: Vec::new(),
            recommendation_source: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == JobState::Completed
    }

    fn transition(&mut self, state: JobState) {
        info!("Job {} ({}): {} -> {}", self.job_id, self.source_path.display(), self.status, state);
        self.status = state;
    }
}

/// Drives probe, resolve, encode and validate for each job.
pub struct Normalizer {
    config: Config,
    prober: Arc<dyn Prober>,
    encoder: Arc<dyn Encoder>,
    recommender: Option<Arc<dyn Recommender>>,
    validator: OutputValidator,
}

impl Normalizer {
    pub fn new(config: Config) -> Result<Self> {
        let prober: Arc<dyn Prober> = Arc::new(FfprobeProber::new(config.prober.clone()));
        let encoder: Arc<dyn Encoder> = Arc::new(FfmpegEncoder::new(config.encoder.clone()));
        let recommender: Option<Arc<dyn Recommender>> = if config.recommender.enabled {
            Some(Arc::new(OllamaRecommender::new(config.recommender.clone())?))
        } else {
            None
        };

        Ok(Self::with_components(config, prober, encoder, recommender))
    }

    pub fn with_components(
        config: Config,
        prober: Arc<dyn Prober>,
        encoder: Arc<dyn Encoder>,
        recommender: Option<Arc<dyn Recommender>>,
    ) -> Self {
        Self {
            config,
            prober,
            encoder,
            recommender,
            validator: OutputValidator::new(),
        }
    }

    /// Check that the encoder can be executed at all
    pub async fn check_dependencies(&self) -> Result<()> {
        self.encoder.check_availability().await
    }

    /// Run one job to completion. Never fails: errors end up in the result.
    pub async fn normalize(&self, request: NormalizeRequest) -> JobResult {
        let mut result = JobResult::pending(request.source.clone());

        match self.run(&request, &mut result).await {
            Ok(()) => result.transition(JobState::Completed),
            Err(e) => {
                error!("Job {} failed: {}", result.job_id, e);
                result.error = Some(e.to_string());
                result.transition(JobState::Failed);
            }
        }

        result.finished_at = Some(Utc::now());
        result
    }

    async fn run(&self, request: &NormalizeRequest, result: &mut JobResult) -> Result<()> {
        result.transition(JobState::Analyzing);
        let source = self.prober.probe(&request.source).await?;
        result.source = Some(source.clone());

        let ai = if request.ai_enabled {
            self.recommend(&source, &request.target, result).await
        } else {
            AiInput::Disabled
        };

        let mut target = request.target.clone();
        target.preserve_metadata = target.preserve_metadata.or(Some(self.config.pipeline.preserve_metadata));
        let preset = request
            .preset
            .as_deref()
            .unwrap_or(&self.config.pipeline.default_preset);

        let resolved = resolve(preset, &target, &ai, &source);
        result.warnings.extend(resolved.warnings);
        result.recommendation_source = resolved.recommendation_source;
        let spec = resolved.spec;
        result.spec = Some(spec.clone());

        let output_path = match &request.output {
            Some(path) => path.clone(),
            None => self.default_output_path(&source.path, spec.container_format.as_deref()),
        };
        if !self.config.encoder.overwrite && fs::metadata(&output_path).await.is_ok() {
            return Err(NormalizerError::InvalidRequest(format!(
                "Output file already exists: {}",
                output_path.display()
            )));
        }

        // Removed on every exit path, including cancellation.
        let work_area = self.create_work_area().await?;
        let file_name = output_path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_else(|| "output".into());
        let staged = work_area.path().join(file_name);

        result.transition(JobState::Converting);
        let args = EncodeCommandBuilder::new(self.config.encoder.overwrite).build(&spec, &source, &staged);
        let started = Instant::now();
        let outcome = ConversionExecutor::new(self.encoder.clone()).execute(&args).await?;
        let processing_time = started.elapsed().as_secs_f64();
        result.encoder_notes = outcome.notes;

        let staged_size = match fs::metadata(&staged).await {
            Ok(metadata) => metadata.len(),
            Err(_) => return Err(NormalizerError::OutputMissing(staged.display().to_string())),
        };

        // ffprobe rejects empty or truncated files; validate what is there
        let mut output = match self.prober.probe(&staged).await {
            Ok(output) => output,
            Err(e) => {
                warn!("Job {}: could not analyze output: {}", result.job_id, e);
                result.warnings.push(format!("Output analysis failed: {}", e));
                let mut output = MediaDescriptor::empty(&staged);
                output.size = staged_size;
                output
            }
        };

        let validate = request.validate.unwrap_or(self.config.pipeline.validate_output);
        if validate {
            result.transition(JobState::Validating);
            let validation = self.validator.validate(&source, &output, &spec);
            for issue in &validation.issues {
                warn!("Job {}: {}", result.job_id, issue);
            }
            result.validation = Some(validation);
        }

        result.performance = Some(Performance {
            processing_time_seconds: processing_time,
            compression_ratio: compression_ratio(source.size, output.size),
            quality: quality_metrics(&source, &output),
        });
        result.transformations = transformations(&source, &output);

        move_file(&staged, &output_path).await?;
        output.path = output_path.clone();
        result.output = Some(output);
        result.output_path = Some(output_path);

        Ok(())
    }

    async fn recommend(&self, source: &MediaDescriptor, target: &TargetFormat, result: &mut JobResult) -> AiInput {
        let Some(recommender) = &self.recommender else {
            return AiInput::Unavailable("recommender is disabled in the configuration".to_string());
        };

        result.transition(JobState::AiAnalyzing);
        match recommender.recommend(source, target).await {
            Ok(payload) => AiInput::Recommended(payload),
            Err(e) => {
                warn!("Recommendation failed: {}", e);
                AiInput::Unavailable(e.to_string())
            }
        }
    }

    fn default_output_path(&self, source: &Path, format: Option<&str>) -> PathBuf {
        let stem = source
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_else(|| "output".to_string());

        let extension = format
            .map(str::to_string)
            .or_else(|| source.extension().map(|ext| ext.to_string_lossy().to_string()));

        let file_name = match extension {
            Some(extension) => format!("{}.{}", stem, extension),
            None => stem,
        };
        self.config.pipeline.output_dir.join(file_name)
    }

    async fn create_work_area(&self) -> Result<tempfile::TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("normalize_");

        let work_area = match &self.config.pipeline.work_dir {
            Some(dir) => {
                fs::create_dir_all(dir).await?;
                builder.tempdir_in(dir)?
            }
            None => builder.tempdir()?,
        };
        debug!("Created work area {}", work_area.path().display());
        Ok(work_area)
    }

    /// Run one job per request, at most `max_concurrent_jobs` at a time.
    /// Results come back in request order; a failed job never affects the others.
    pub async fn normalize_batch(&self, requests: Vec<NormalizeRequest>) -> Vec<JobResult> {
        let semaphore = Semaphore::new(self.config.pipeline.max_concurrent_jobs.max(1));
        let semaphore = &semaphore;

        info!("Starting batch of {} jobs", requests.len());
        let results = join_all(requests.into_iter().map(|request| async move {
            let _permit = semaphore.acquire().await.ok();
            self.normalize(request).await
        }))
        .await;

        let completed = results.iter().filter(|result| result.is_completed()).count();
        info!("Batch finished: {} completed, {} failed", completed, results.len() - completed);
        results
    }

    /// Normalize every media file under `input_dir` into `output_dir`.
    pub async fn process_directory<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        input_dir: P,
        output_dir: Q,
        template: &NormalizeRequest,
    ) -> Result<Vec<JobResult>> {
        let input_dir = input_dir.as_ref();
        let output_dir = output_dir.as_ref();
        let files = collect_media_files(input_dir)?;
        fs::create_dir_all(output_dir).await?;

        let format = template.target.format.trim().to_lowercase();
        let requests = files
            .into_iter()
            .map(|source| {
                // Output keeps the input-relative directory
                let relative = source
                    .strip_prefix(input_dir)
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|_| PathBuf::from(source.file_name().unwrap_or_default()));
                let relative = if format.is_empty() {
                    relative
                } else {
                    relative.with_extension(&format)
                };
                let mut request = template.clone();
                request.output = Some(output_dir.join(relative));
                request.source = source;
                request
            })
            .collect();

        Ok(self.normalize_batch(requests).await)
    }
}

/// Media files under `dir`, recursively, sorted by path.
pub fn collect_media_files<P: AsRef<Path>>(dir: P) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        return Err(NormalizerError::InvalidRequest(format!(
            "Input path is not a directory: {}",
            dir.display()
        )));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        if let Some(extension) = entry.path().extension().and_then(|ext| ext.to_str()) {
            if MEDIA_EXTENSIONS.contains(&extension.to_lowercase().as_str()) {
                files.push(entry.path().to_path_buf());
            }
        }
    }
    files.sort();

    info!("Found {} media files in {}", files.len(), dir.display());
    Ok(files)
}

/// Move a staged file into place; falls back to copying across devices.
async fn move_file(from: &Path, to: &Path) -> Result<()> {
    if let Some(parent) = to.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }

    if let Err(e) = fs::rename(from, to).await {
        debug!("Rename to {} failed ({}), copying instead", to.display(), e);
        fs::copy(from, to).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{AudioStream, EncoderOutput, MockEncoder, MockProber, Stream, VideoStream};
    use crate::recommend::MockRecommender;
    use assert_fs::prelude::*;
    use std::sync::Mutex;

    const MP4: &str = "mov,mp4,m4a,3gp,3g2,mj2";

    type Calls = Arc<Mutex<Vec<Vec<String>>>>;

    fn descriptor(path: &Path, video_codec: &str, size: u64) -> MediaDescriptor {
        MediaDescriptor {
            path: path.to_path_buf(),
            container: MP4.to_string(),
            streams: vec![
                Stream::Video(VideoStream {
                    codec: video_codec.to_string(),
                    width: 1920,
                    height: 1080,
                    frame_rate: 30.0,
                    pixel_format: Some("yuv420p".to_string()),
                    bit_rate: Some(8_000_000),
                }),
                Stream::Audio(AudioStream {
                    codec: "aac".to_string(),
                    sample_rate: Some(48000),
                    channels: Some(2),
                    bit_rate: Some(128_000),
                }),
            ],
            duration: 10.0,
            size,
            bit_rate: 8_128_000,
        }
    }

    /// Answers for `source` and for any existing non-empty file; fails for
    /// empty or missing files like ffprobe does.
    fn prober(source: MediaDescriptor, output_codec: &'static str) -> MockProber {
        let mut prober = MockProber::new();
        prober.expect_probe().returning(move |path: &Path| {
            if path == source.path.as_path() {
                Ok(source.clone())
            } else if std::fs::metadata(path).map(|m| m.len() == 0).unwrap_or(false) {
                Err(NormalizerError::Probe(
                    "ffprobe failed with exit code 1: Invalid data found when processing input".to_string(),
                ))
            } else if path.exists() {
                Ok(descriptor(path, output_codec, 10_000_000))
            } else {
                Err(NormalizerError::Probe(format!("Media file not found: {}", path.display())))
            }
        });
        prober
    }

    fn encoder(calls: Calls, write_output: bool, exit_code: i32) -> MockEncoder {
        let mut encoder = MockEncoder::new();
        encoder.expect_run().returning(move |args: &[String]| -> Result<EncoderOutput> {
            calls.lock().unwrap().push(args.to_vec());
            if write_output {
                std::fs::write(args.last().unwrap(), b"encoded")?;
            }
            Ok(EncoderOutput {
                exit_code: Some(exit_code),
                diagnostics: "Stream mapping:\n  Stream #0:0 -> #0:0 (h264 (native) -> h264 (libx264))\n".to_string(),
            })
        });
        encoder
    }

    fn config(root: &Path) -> Config {
        let mut config = Config::default();
        config.pipeline.output_dir = root.join("out");
        config.pipeline.work_dir = Some(root.join("work"));
        config
    }

    fn normalizer(root: &Path, prober: MockProber, encoder: MockEncoder) -> Normalizer {
        Normalizer::with_components(config(root), Arc::new(prober), Arc::new(encoder), None)
    }

    fn work_area_is_empty(root: &Path) -> bool {
        std::fs::read_dir(root.join("work")).map(|mut dir| dir.next().is_none()).unwrap_or(true)
    }

    fn web_mp4(source: &Path) -> NormalizeRequest {
        let mut request = NormalizeRequest::new(source, TargetFormat::new("mp4"));
        request.preset = Some("web".to_string());
        request
    }

    #[tokio::test]
    async fn test_web_mp4_end_to_end() {
        let temp = assert_fs::TempDir::new().unwrap();
        let source_path = temp.child("clip.mov");
        source_path.write_binary(b"source").unwrap();

        let calls: Calls = Arc::default();
        let normalizer = normalizer(
            temp.path(),
            prober(descriptor(source_path.path(), "h264", 50_000_000), "h264"),
            encoder(calls.clone(), true, 0),
        );

        let result = normalizer.normalize(web_mp4(source_path.path())).await;

        assert_eq!(result.status, JobState::Completed, "error: {:?}", result.error);
        let validation = result.validation.as_ref().unwrap();
        assert!(validation.passed);
        assert!(validation.issues.is_empty());

        let args = calls.lock().unwrap()[0].clone();
        let source_arg = source_path.path().to_string_lossy().to_string();
        assert_eq!(args[..3], ["-y".to_string(), "-i".to_string(), source_arg][..]);
        let joined = args.join(" ");
        assert!(joined.contains("-c:v h264 -crf 23 -preset medium"));
        assert!(joined.contains("-c:a aac -b:a 128k"));
        assert!(joined.contains("-map_metadata 0"));

        let output_path = temp.path().join("out").join("clip.mp4");
        assert_eq!(result.output_path.as_deref(), Some(output_path.as_path()));
        assert!(output_path.exists());
        assert_eq!(result.output.as_ref().unwrap().path, output_path);
        assert_eq!(result.performance.as_ref().unwrap().compression_ratio, 5.0);
        assert_eq!(result.encoder_notes.len(), 2);
        assert!(result.finished_at.is_some());
        assert!(work_area_is_empty(temp.path()));
    }

    #[tokio::test]
    async fn test_batch_isolates_missing_source() {
        let temp = assert_fs::TempDir::new().unwrap();
        let source_path = temp.child("good.mov");
        source_path.write_binary(b"source").unwrap();
        let missing = temp.path().join("missing.mov");

        let calls: Calls = Arc::default();
        let normalizer = normalizer(
            temp.path(),
            prober(descriptor(source_path.path(), "h264", 50_000_000), "h264"),
            encoder(calls.clone(), true, 0),
        );

        let results = normalizer
            .normalize_batch(vec![web_mp4(&missing), web_mp4(source_path.path())])
            .await;

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].status, JobState::Failed);
        assert_eq!(results[0].source_path, missing);
        assert!(results[0].error.as_deref().unwrap().contains("not found"));
        assert_eq!(results[1].status, JobState::Completed);
        assert!(temp.path().join("out").join("good.mp4").exists());
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_encoder_failure_fails_the_job_with_diagnostics() {
        let temp = assert_fs::TempDir::new().unwrap();
        let source_path = temp.child("clip.mov");
        source_path.write_binary(b"source").unwrap();

        let normalizer = normalizer(
            temp.path(),
            prober(descriptor(source_path.path(), "h264", 50_000_000), "h264"),
            encoder(Arc::default(), true, 1),
        );

        let result = normalizer.normalize(web_mp4(source_path.path())).await;

        assert_eq!(result.status, JobState::Failed);
        assert!(result.error.as_deref().unwrap().contains("Stream mapping:"));
        assert!(!temp.path().join("out").join("clip.mp4").exists());
        assert!(work_area_is_empty(temp.path()));
    }

    #[tokio::test]
    async fn test_missing_output_file_fails_the_job() {
        let temp = assert_fs::TempDir::new().unwrap();
        let source_path = temp.child("clip.mov");
        source_path.write_binary(b"source").unwrap();

        let normalizer = normalizer(
            temp.path(),
            prober(descriptor(source_path.path(), "h264", 50_000_000), "h264"),
            encoder(Arc::default(), false, 0),
        );

        let result = normalizer.normalize(web_mp4(source_path.path())).await;

        assert_eq!(result.status, JobState::Failed);
        assert!(result.error.as_deref().unwrap().contains("output file not found"));
    }

    #[tokio::test]
    async fn test_empty_output_is_validated_not_failed() {
        let temp = assert_fs::TempDir::new().unwrap();
        let source_path = temp.child("clip.mov");
        source_path.write_binary(b"source").unwrap();

        let mut encoder = MockEncoder::new();
        encoder.expect_run().returning(|args: &[String]| -> Result<EncoderOutput> {
            std::fs::write(args.last().unwrap(), b"")?;
            Ok(EncoderOutput {
                exit_code: Some(0),
                diagnostics: String::new(),
            })
        });
        let normalizer = normalizer(
            temp.path(),
            prober(descriptor(source_path.path(), "h264", 50_000_000), "h264"),
            encoder,
        );

        let result = normalizer.normalize(web_mp4(source_path.path())).await;

        assert_eq!(result.status, JobState::Completed, "error: {:?}", result.error);
        let validation = result.validation.as_ref().unwrap();
        assert!(!validation.passed);
        assert_eq!(validation.issues, vec!["Output file has zero size"]);
        assert!(result.warnings.iter().any(|w| w.contains("Invalid data")));
        assert_eq!(result.output.as_ref().unwrap().size, 0);
        assert_eq!(result.performance.as_ref().unwrap().compression_ratio, 0.0);
        assert!(temp.path().join("out").join("clip.mp4").exists());
    }

    #[tokio::test]
    async fn test_directory_batch_keeps_same_named_files_apart() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("in/a/x.mov").write_binary(b"source a").unwrap();
        temp.child("in/b/x.mov").write_binary(b"source b").unwrap();

        // Each output records which input produced it
        let mut encoder = MockEncoder::new();
        encoder.expect_run().returning(|args: &[String]| -> Result<EncoderOutput> {
            let input = args.iter().position(|arg| arg == "-i").map(|i| args[i + 1].clone()).unwrap();
            std::fs::write(args.last().unwrap(), input)?;
            Ok(EncoderOutput {
                exit_code: Some(0),
                diagnostics: String::new(),
            })
        });
        let normalizer = normalizer(
            temp.path(),
            prober(descriptor(&temp.path().join("unused.mov"), "h264", 1), "h264"),
            encoder,
        );

        let out = temp.path().join("out");
        let results = normalizer
            .process_directory(temp.path().join("in"), &out, &web_mp4(Path::new("template.mov")))
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|result| result.is_completed()));
        assert_eq!(results[0].output_path.as_deref(), Some(out.join("a/x.mp4").as_path()));
        assert_eq!(results[1].output_path.as_deref(), Some(out.join("b/x.mp4").as_path()));

        let written_a = std::fs::read_to_string(out.join("a/x.mp4")).unwrap();
        let written_b = std::fs::read_to_string(out.join("b/x.mp4")).unwrap();
        assert!(written_a.ends_with("a/x.mov"));
        assert!(written_b.ends_with("b/x.mov"));
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_dropping_a_job_kills_the_encoder_and_removes_the_work_area() {
        use crate::config::EncoderConfig;
        use crate::media::FfmpegEncoder;
        use std::os::unix::fs::PermissionsExt;
        use std::time::Duration;

        fn exited(pid: u32) -> bool {
            // A zombie has already been killed, it just has not been reaped yet
            match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
                Ok(stat) => stat
                    .rsplit_once(')')
                    .map(|(_, rest)| rest.trim_start().starts_with('Z'))
                    .unwrap_or(true),
                Err(_) => true,
            }
        }

        let temp = assert_fs::TempDir::new().unwrap();
        let source_path = temp.child("clip.mov");
        source_path.write_binary(b"source").unwrap();
        let pid_file = temp.path().join("encoder.pid");
        let script = temp.path().join("slow-ffmpeg.sh");
        std::fs::write(&script, format!("#!/bin/sh\necho $$ > '{}'\nexec sleep 30\n", pid_file.display())).unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let encoder = FfmpegEncoder::new(EncoderConfig {
            binary_path: script.to_string_lossy().to_string(),
            timeout_secs: 60,
            overwrite: true,
        });
        let normalizer = Normalizer::with_components(
            config(temp.path()),
            Arc::new(prober(descriptor(source_path.path(), "h264", 50_000_000), "h264")),
            Arc::new(encoder),
            None,
        );

        let mut job = Box::pin(normalizer.normalize(web_mp4(source_path.path())));
        let mut pid = None;
        for _ in 0..100 {
            if tokio::time::timeout(Duration::from_millis(50), job.as_mut()).await.is_ok() {
                panic!("job finished while the encoder should still be running");
            }
            pid = std::fs::read_to_string(&pid_file)
                .ok()
                .and_then(|text| text.trim().parse::<u32>().ok());
            if pid.is_some() {
                break;
            }
        }
        let pid = pid.expect("encoder never started");
        assert!(!work_area_is_empty(temp.path()));

        drop(job);

        assert!(work_area_is_empty(temp.path()));
        assert!(!temp.path().join("out").join("clip.mp4").exists());

        let mut gone = exited(pid);
        for _ in 0..100 {
            if gone {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
            gone = exited(pid);
        }
        assert!(gone, "encoder process {} is still running", pid);
    }

    #[tokio::test]
    async fn test_validation_failure_still_completes() {
        let temp = assert_fs::TempDir::new().unwrap();
        let source_path = temp.child("clip.mov");
        source_path.write_binary(b"source").unwrap();

        let normalizer = normalizer(
            temp.path(),
            prober(descriptor(source_path.path(), "h264", 50_000_000), "vp8"),
            encoder(Arc::default(), true, 0),
        );

        let result = normalizer.normalize(web_mp4(source_path.path())).await;

        assert_eq!(result.status, JobState::Completed);
        let validation = result.validation.unwrap();
        assert!(!validation.passed);
        assert_eq!(validation.issues, vec!["Expected video codec h264, got vp8"]);
    }

    #[tokio::test]
    async fn test_validation_can_be_skipped() {
        let temp = assert_fs::TempDir::new().unwrap();
        let source_path = temp.child("clip.mov");
        source_path.write_binary(b"source").unwrap();

        let normalizer = normalizer(
            temp.path(),
            prober(descriptor(source_path.path(), "h264", 50_000_000), "vp8"),
            encoder(Arc::default(), true, 0),
        );

        let mut request = web_mp4(source_path.path());
        request.validate = Some(false);
        let result = normalizer.normalize(request).await;

        assert_eq!(result.status, JobState::Completed);
        assert!(result.validation.is_none());
    }

    #[tokio::test]
    async fn test_recommender_failure_falls_back() {
        let temp = assert_fs::TempDir::new().unwrap();
        let source_path = temp.child("clip.mov");
        source_path.write_binary(b"source").unwrap();

        let mut recommender = MockRecommender::new();
        recommender
            .expect_recommend()
            .times(1)
            .returning(|_: &MediaDescriptor, _: &TargetFormat| {
                Err(NormalizerError::Recommender("connection refused".to_string()))
            });

        let calls: Calls = Arc::default();
        let normalizer = Normalizer::with_components(
            config(temp.path()),
            Arc::new(prober(descriptor(source_path.path(), "h264", 50_000_000), "h264")),
            Arc::new(encoder(calls.clone(), true, 0)),
            Some(Arc::new(recommender)),
        );

        let mut request = web_mp4(source_path.path());
        request.ai_enabled = true;
        let result = normalizer.normalize(request).await;

        assert_eq!(result.status, JobState::Completed);
        assert_eq!(result.recommendation_source, Some(RecommendationSource::Fallback));
        assert!(result.warnings.iter().any(|w| w.contains("connection refused")));
        let joined = calls.lock().unwrap()[0].join(" ");
        assert!(joined.contains("-profile:v high"));
    }

    #[tokio::test]
    async fn test_existing_output_is_kept_without_overwrite() {
        let temp = assert_fs::TempDir::new().unwrap();
        let source_path = temp.child("clip.mov");
        source_path.write_binary(b"source").unwrap();
        let existing = temp.child("out/clip.mp4");
        existing.write_binary(b"keep me").unwrap();

        let mut config = config(temp.path());
        config.encoder.overwrite = false;
        let normalizer = Normalizer::with_components(
            config,
            Arc::new(prober(descriptor(source_path.path(), "h264", 50_000_000), "h264")),
            Arc::new(encoder(Arc::default(), true, 0)),
            None,
        );

        let result = normalizer.normalize(web_mp4(source_path.path())).await;

        assert_eq!(result.status, JobState::Failed);
        existing.assert("keep me");
    }

    #[test]
    fn test_collect_media_files() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("b.MOV").touch().unwrap();
        temp.child("a.mp4").touch().unwrap();
        temp.child("nested/c.wav").touch().unwrap();
        temp.child("notes.txt").touch().unwrap();

        let files = collect_media_files(temp.path()).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|path| path.strip_prefix(temp.path()).unwrap().to_string_lossy().to_string())
            .collect();

        assert_eq!(names, vec!["a.mp4", "b.MOV", "nested/c.wav"]);
        assert!(collect_media_files(temp.path().join("a.mp4")).is_err());
    }
}

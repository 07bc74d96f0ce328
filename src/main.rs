//! media-normalizer - convert media files to a requested format with
//! preset, override and recommender driven encoding parameters.

use anyhow::Result;
use clap::Parser;
use serde::Serialize;
use std::path::Path;
use tracing::{info, warn, Level};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use media_normalizer::cli::{Args, Commands};
use media_normalizer::config::Config;
use media_normalizer::resolve::Preset;
use media_normalizer::workflow::{JobResult, Normalizer};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    setup_logging(args.verbose)?;

    let config = match &args.config {
        Some(config_path) => Config::from_file(config_path)?,
        None => {
            if Path::new("config.toml").exists() {
                info!("Found config.toml in current directory, loading...");
                Config::from_file("config.toml")?
            } else {
                Config::default()
            }
        }
    };

    match args.command {
        Commands::Presets => {
            println!("\nAvailable Presets:");
            println!("{:<12} {}", "Name", "Settings");
            println!("{}", "-".repeat(72));
            for preset in Preset::ALL {
                println!("{:<12} {}", preset.name(), preset.summary());
            }
        }
        Commands::InitConfig { output } => {
            Config::default().save_to_file(&output)?;
            println!("Wrote default configuration to {}", output.display());
        }
        Commands::Normalize { input, output, job } => {
            // Request validation happens before anything is spawned
            let request = job.request(input, output)?;

            let normalizer = Normalizer::new(config)?;
            normalizer.check_dependencies().await?;

            info!("Normalizing {} to {}", request.source.display(), request.target.format);
            let result = normalizer.normalize(request).await;
            report(&result);

            if let Some(path) = &job.output_json {
                write_json(path, &result)?;
            }
            if !result.is_completed() {
                anyhow::bail!(
                    "Normalization failed: {}",
                    result.error.as_deref().unwrap_or("unknown error")
                );
            }
        }
        Commands::Batch { input_dir, output_dir, job } => {
            let template = job.request(input_dir.clone(), None)?;

            let normalizer = Normalizer::new(config)?;
            normalizer.check_dependencies().await?;

            info!("Processing directory: {}", input_dir.display());
            let results = normalizer.process_directory(&input_dir, &output_dir, &template).await?;
            for result in &results {
                report(result);
            }

            if let Some(path) = &job.output_json {
                write_json(path, &results)?;
            }

            let failed = results.iter().filter(|result| !result.is_completed()).count();
            println!("\n{} of {} files normalized", results.len() - failed, results.len());
            if failed > 0 {
                anyhow::bail!("{} of {} jobs failed", failed, results.len());
            }
        }
    }

    Ok(())
}

fn report(result: &JobResult) {
    for warning in &result.warnings {
        warn!("{}: {}", result.source_path.display(), warning);
    }

    match (&result.output_path, &result.error) {
        (Some(output), None) => {
            println!("{} -> {}", result.source_path.display(), output.display());
            if let Some(validation) = &result.validation {
                for issue in &validation.issues {
                    println!("  validation: {}", issue);
                }
            }
            if let Some(performance) = &result.performance {
                println!(
                    "  {:.1}s, compression ratio {:.2}",
                    performance.processing_time_seconds, performance.compression_ratio
                );
            }
        }
        (_, Some(error)) => println!("{} failed: {}", result.source_path.display(), error),
        (None, None) => println!("{}: {}", result.source_path.display(), result.status),
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json)?;
    info!("Wrote job result to {}", path.display());
    Ok(())
}

/// Setup logging to both console and file
fn setup_logging(verbose: bool) -> Result<()> {
    let log_dir = std::env::current_dir()?.join(".media-normalizer").join("log");
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = rolling::daily(&log_dir, "media-normalizer.log");
    let (non_blocking_file, guard) = non_blocking(file_appender);
    // Keep the guard alive for the duration of the program
    std::mem::forget(guard);

    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    let console_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!(
        "Logging initialized - console: {}, file: {}",
        log_level,
        log_dir.join("media-normalizer.log").display()
    );

    Ok(())
}

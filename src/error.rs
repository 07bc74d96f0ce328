use thiserror::Error;

#[derive(Error, Debug)]
pub enum NormalizerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Media analysis failed: {0}")]
    Probe(String),

    /// Non-zero encoder exit. `diagnostics` is the encoder output, untouched.
    #[error("Encoder failed with {}: {diagnostics}", exit_status(.exit_code))]
    Encode {
        exit_code: Option<i32>,
        diagnostics: String,
    },

    #[error("Recommender error: {0}")]
    Recommender(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Conversion failed: output file not found at {0}")]
    OutputMissing(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("{tool} timed out after {seconds}s")]
    Timeout { tool: String, seconds: u64 },
}

pub type Result<T> = std::result::Result<T, NormalizerError>;

/// `exit code N`, or `signal` when the process was killed before exiting.
pub fn exit_status(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "signal".to_string(),
    }
}

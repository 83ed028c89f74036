use konnekt_call_p2p::CallError;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Input file not found: {path}")]
    InputNotFound { path: PathBuf },

    #[error(transparent)]
    Call(#[from] CallError),

    #[error("Simulation failed: {0}")]
    Simulation(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to initialize tracing: {0}")]
    Logging(String),
}

impl CliError {
    pub fn input_not_found(path: PathBuf) -> Self {
        CliError::InputNotFound { path }
    }
}

pub type Result<T> = std::result::Result<T, CliError>;

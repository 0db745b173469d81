use engine_config::settings::error::SettingsError;
use engine_core::error::{DeadLetterError, SourceError};
use engine_runtime::error::PipelineError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Invalid settings: {0}")]
    Settings(#[from] SettingsError),

    #[error("Invalid rate table: {0}")]
    Rates(String),

    #[error("Failed to open the input: {0}")]
    Source(#[from] SourceError),

    #[error("Dead-letter store error: {0}")]
    DeadLetter(#[from] DeadLetterError),

    #[error("Pipeline failed: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Failed to serialize data to JSON: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

use thiserror::Error;

/// Errors raised while loading or validating pipeline settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// A variable could not be parsed into the expected type.
    #[error("Invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    /// One or more settings violated a constraint.
    #[error("Settings validation failed: {}", .0.join("; "))]
    ValidationFailed(Vec<String>),

    /// The env file could not be read or parsed.
    #[error("Env file error: {0}")]
    EnvFile(String),
}

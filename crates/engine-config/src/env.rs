use crate::settings::error::SettingsError;
use std::{collections::HashMap, fs, path::Path};

/// Prefix shared by every pipeline setting.
pub const ENV_PREFIX: &str = "CLICKSTREAM_";

/// Environment variable manager that loads from the process environment and
/// optional `.env` files. Later sources override earlier ones.
#[derive(Debug, Clone, Default)]
pub struct EnvManager {
    vars: HashMap<String, String>,
}

impl EnvManager {
    /// Snapshot of the process environment, restricted to pipeline settings.
    pub fn from_process() -> Self {
        let vars = std::env::vars()
            .filter(|(k, _)| k.starts_with(ENV_PREFIX))
            .collect();
        Self { vars }
    }

    /// Empty manager, useful when settings come only from files or overrides.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load variables from a .env file
    pub fn load_from_file<P: AsRef<Path>>(&mut self, path: P) -> Result<(), SettingsError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            SettingsError::EnvFile(format!("failed to read {}: {}", path.display(), e))
        })?;

        self.parse_env_content(&content)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    fn parse_env_content(&mut self, content: &str) -> Result<(), SettingsError> {
        for (line_num, line) in content.lines().enumerate() {
            let line = line.trim();

            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let line = line.strip_prefix("export ").unwrap_or(line);
            let Some((key, value)) = line.split_once('=') else {
                return Err(SettingsError::EnvFile(format!(
                    "malformed line {} (expected KEY=VALUE)",
                    line_num + 1
                )));
            };

            let key = key.trim();
            if key.is_empty() {
                return Err(SettingsError::EnvFile(format!(
                    "empty key at line {}",
                    line_num + 1
                )));
            }

            self.vars.insert(key.to_string(), Self::unquote_value(value));
        }

        Ok(())
    }

    fn unquote_value(value: &str) -> String {
        let value = value.trim();

        for quote in ['"', '\''] {
            if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
                return value[1..value.len() - 1].to_string();
            }
        }

        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_comments_quotes_and_exports() {
        let mut env = EnvManager::empty();
        let content = r#"
# batch limits
CLICKSTREAM_BATCH_MAX_RECORDS=100
export CLICKSTREAM_PARTITION_RULE="hourly"
CLICKSTREAM_REDACT_FIELDS='email, phone'
        "#;

        env.parse_env_content(content).unwrap();
        assert_eq!(env.get("CLICKSTREAM_BATCH_MAX_RECORDS"), Some("100"));
        assert_eq!(env.get("CLICKSTREAM_PARTITION_RULE"), Some("hourly"));
        assert_eq!(env.get("CLICKSTREAM_REDACT_FIELDS"), Some("email, phone"));
    }

    #[test]
    fn rejects_lines_without_equals() {
        let mut env = EnvManager::empty();
        assert!(env.parse_env_content("INVALID LINE").is_err());
        assert!(env.parse_env_content("=value").is_err());
    }

    #[test]
    fn file_values_override_earlier_ones() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "CLICKSTREAM_WORKERS=8\n").unwrap();

        let mut env = EnvManager::empty();
        env.set("CLICKSTREAM_WORKERS", "2");
        env.load_from_file(&path).unwrap();
        assert_eq!(env.get("CLICKSTREAM_WORKERS"), Some("8"));
    }
}

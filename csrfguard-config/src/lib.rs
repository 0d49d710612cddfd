// Settings loading for csrfguard
//
// Sources, lowest priority first: built-in defaults, an optional JSON or
// TOML file, an optional `.env` file, then `CSRFGUARD_*` variables.

pub mod env;
pub mod error;
pub mod loader;
pub mod settings;
pub mod validation;

pub use env::{ENV_PREFIX, EnvLoader};
pub use error::{ConfigError, Result};
pub use loader::{ConfigLoader, FileFormat};
pub use settings::*;
pub use validation::{ConfigValidator, Validate};

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Builder that merges every settings source and validates the result.
///
/// ```rust,no_run
/// use csrfguard_config::SettingsLoader;
///
/// let settings = SettingsLoader::new()
///     .file("/etc/csrfguard.toml")
///     .dotenv(".env")
///     .load()
///     .unwrap();
/// assert!(settings.token_length >= 12);
/// ```
#[derive(Debug, Default)]
pub struct SettingsLoader {
    file: Option<PathBuf>,
    dotenv: Option<PathBuf>,
    prefix: Option<String>,
    vars: Option<HashMap<String, String>>,
}

impl SettingsLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file(mut self, path: impl AsRef<Path>) -> Self {
        self.file = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn dotenv(mut self, path: impl AsRef<Path>) -> Self {
        self.dotenv = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Use these raw variables instead of the process environment.
    pub fn vars<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.vars = Some(vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect());
        self
    }

    pub fn load(self) -> Result<Settings> {
        let mut settings = match &self.file {
            Some(path) => {
                let format = FileFormat::detect(path)?;
                let value = ConfigLoader::new(format).load_file(path)?;
                debug!(path = %path.display(), ?format, "loaded settings file");
                serde_json::from_value(value)
                    .map_err(|e| ConfigError::ParseError(format!("{}: {}", path.display(), e)))?
            }
            None => Settings::default(),
        };

        let env_loader = EnvLoader::new(self.prefix.as_deref().unwrap_or(ENV_PREFIX));

        if let Some(path) = &self.dotenv {
            let vars = env_loader.load_dotenv(path)?;
            debug!(path = %path.display(), count = vars.len(), "applying .env overrides");
            settings.apply_overrides(&vars)?;
        }

        let vars = match self.vars {
            Some(raw) => env_loader.collect(raw),
            None => env_loader.load(),
        };
        settings.apply_overrides(&vars)?;

        settings.validate()?;
        Ok(settings)
    }
}

/// Parse a settings document held in memory and validate it.
pub fn from_str(content: &str, format: FileFormat) -> Result<Settings> {
    let value = ConfigLoader::new(format).parse(content)?;
    let settings: Settings =
        serde_json::from_value(value).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    settings.validate()?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_str_toml() {
        let settings = from_str(
            r#"
            action = "message"
            error_custom_message = "<p>nope</p>"
            verify_get_for = ["^https?://[^/]+/account/delete"]
            "#,
            FileFormat::Toml,
        )
        .unwrap();
        assert_eq!(settings.action, "message");
        assert_eq!(settings.error_custom_message, "<p>nope</p>");
        assert_eq!(settings.verify_get_for.len(), 1);
    }

    #[test]
    fn test_from_str_rejects_invalid() {
        assert!(from_str(r#"{"token_length": 4}"#, FileFormat::Json).is_err());
        assert!(from_str(r#"{"token_length": "x"}"#, FileFormat::Json).is_err());
    }

    #[test]
    fn test_loader_with_injected_vars() {
        let settings = SettingsLoader::new()
            .vars([("CSRFGUARD_TOKEN_NAME", "xsrf"), ("HOME", "/root")])
            .load()
            .unwrap();
        assert_eq!(settings.token_name, "xsrf");
    }
}

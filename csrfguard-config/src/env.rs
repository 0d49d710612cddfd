// Environment variable loading

use crate::{ConfigError, Result};
use std::collections::HashMap;
use std::env;
use std::path::Path;

/// Default prefix for settings variables.
pub const ENV_PREFIX: &str = "CSRFGUARD_";

/// Collects prefixed variables as lowercased, prefix-free keys:
/// `CSRFGUARD_TOKEN_LENGTH=20` becomes `token_length => "20"`.
pub struct EnvLoader {
    prefix: String,
}

impl EnvLoader {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Prefixed variables from the process environment.
    pub fn load(&self) -> HashMap<String, String> {
        self.collect(env::vars())
    }

    /// Prefixed variables from a `.env` file, without touching the
    /// process environment.
    pub fn load_dotenv(&self, path: &Path) -> Result<HashMap<String, String>> {
        let iter = dotenvy::from_path_iter(path)
            .map_err(|e| ConfigError::LoadError(format!("failed to read {}: {}", path.display(), e)))?;

        let mut pairs = Vec::new();
        for item in iter {
            let pair = item.map_err(|e| ConfigError::ParseError(format!("{}: {}", path.display(), e)))?;
            pairs.push(pair);
        }
        Ok(self.collect(pairs))
    }

    /// Filter and normalise arbitrary `(name, value)` pairs.
    pub fn collect<I>(&self, vars: I) -> HashMap<String, String>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        vars.into_iter()
            .filter_map(|(key, value)| {
                key.strip_prefix(&self.prefix)
                    .map(|rest| (rest.trim_start_matches('_').to_ascii_lowercase(), value))
            })
            .collect()
    }
}

impl Default for EnvLoader {
    fn default() -> Self {
        Self::new(ENV_PREFIX)
    }
}

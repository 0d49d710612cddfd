use csrfguard_config::ConfigError;
use csrfguard_store::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CsrfError {
    #[error("Token length {requested} is below the minimum of {minimum}")]
    TokenTooShort { requested: usize, minimum: usize },

    #[error("Invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Entropy source failed: {0}")]
    Entropy(String),
}

impl CsrfError {
    pub(crate) fn pattern(pattern: &str, source: regex::Error) -> Self {
        Self::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, CsrfError>;

//! Protocol and configuration error types.

use skyrelay_env::EnvError;
use thiserror::Error;

/// Errors raised while encoding, decoding or validating protocol traffic.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Packet bytes are not a valid protocol message
    #[error("Failed to decode message: {0}")]
    Decode(#[source] serde_json::Error),

    /// Message could not be serialized
    #[error("Failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),

    /// A DELIVER entry lacks its id or label
    #[error("Malformed DELIVER entry: missing {missing}")]
    MalformedEntry { missing: &'static str },

    /// Assignment policy name not recognised
    #[error("Unknown assignment policy: {0}")]
    UnknownPolicy(String),

    /// Patrol route cannot be used for prediction
    #[error("Invalid patrol route: {0}")]
    InvalidRoute(String),

    /// Failure reported by the environment (radio, context)
    #[error(transparent)]
    Env(#[from] EnvError),
}

/// Errors raised while building or loading a mission configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A parameter is outside its valid range
    #[error("Invalid mission parameter `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },

    /// Configuration file could not be read
    #[error("Cannot read config file: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file is not valid JSON for a mission
    #[error("Cannot parse config file: {0}")]
    Parse(#[from] serde_json::Error),
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

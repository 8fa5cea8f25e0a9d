//! Error taxonomy shared by the engine and the host.

use thiserror::Error;

/// The station list could not be produced.  Blocking for the host.
#[derive(Debug, Error)]
pub enum CatalogLoadError {
    #[error("station catalog unreachable: {0}")]
    Unreachable(String),
    #[error("station catalog is malformed: {0}")]
    Malformed(String),
    #[error("No stations available")]
    Empty,
}

impl From<reqwest::Error> for CatalogLoadError {
    fn from(e: reqwest::Error) -> Self {
        CatalogLoadError::Unreachable(e.to_string())
    }
}

impl From<std::io::Error> for CatalogLoadError {
    fn from(e: std::io::Error) -> Self {
        CatalogLoadError::Unreachable(e.to_string())
    }
}

impl From<toml::de::Error> for CatalogLoadError {
    fn from(e: toml::de::Error) -> Self {
        CatalogLoadError::Malformed(e.to_string())
    }
}

impl From<serde_json::Error> for CatalogLoadError {
    fn from(e: serde_json::Error) -> Self {
        CatalogLoadError::Malformed(e.to_string())
    }
}

/// Failure reported by a single audio channel backend.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ChannelError(pub String);

impl ChannelError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

impl From<anyhow::Error> for ChannelError {
    fn from(e: anyhow::Error) -> Self {
        ChannelError(e.to_string())
    }
}

#[derive(Debug, Error)]
pub enum AudioError {
    /// Stream rejected, blocked or failed to start.
    #[error("playback failed: {0}")]
    Playback(String),
    /// The standby channel could not take over.
    #[error("station switch failed: {0}")]
    Crossfade(String),
    /// The two-channel graph could not be constructed.
    #[error("audio output unavailable: {0}")]
    Graph(String),
    #[error("audio engine has been destroyed")]
    Destroyed,
}

impl AudioError {
    pub fn is_playback(&self) -> bool {
        matches!(self, AudioError::Playback(_))
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NavigationError {
    #[error("station index {index} out of range (playlist has {len})")]
    OutOfRange { index: usize, len: usize },
}

use thiserror::Error;

use crate::publish::MimeType;

/// Rejected publish specifier
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SpecifierError {
    #[error("unsupported mime type: {0}")]
    InvalidMimeType(String),

    #[error("address cannot be empty. input was: {0}")]
    InvalidAddress(String),
}

/// Failure reported by the room session collaborator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("not connected to a room")]
    NotConnected,

    #[error("a track named {0} is already published")]
    DuplicateTrackName(String),

    #[error("track not found: {0}")]
    UnknownTrack(String),

    #[error("simulcast publish needs at least one layer")]
    NoSimulcastLayers,

    #[error("transport error: {0}")]
    Transport(String),
}

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("invalid publish specifier: {0}")]
    InvalidSpecifier(#[from] SpecifierError),

    #[error("unsupported file type: {0}")]
    UnsupportedFileType(String),

    #[error("source unavailable: {target}: {source}")]
    SourceUnavailable {
        target: String,
        #[source]
        source: std::io::Error,
    },

    #[error("publish rejected: {0}")]
    PublishRejected(#[source] SessionError),

    #[error("failed to send data: {0}")]
    SendFailed(#[source] SessionError),

    #[error("mime type {0} cannot be published as a media track")]
    UnsupportedTrackMime(MimeType),

    #[error("track writer already started")]
    TrackAlreadyStarted,

    #[error("publish task failed: {0}")]
    TaskFailed(String),
}

impl PublishError {
    pub(crate) fn unavailable(target: impl Into<String>, source: std::io::Error) -> Self {
        Self::SourceUnavailable {
            target: target.into(),
            source,
        }
    }
}

/// Configuration loading and validation errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),

    #[error("missing credentials: provide --token, or --api-key, --api-secret, --room and --identity")]
    MissingCredentials,
}

pub type Result<T> = std::result::Result<T, PublishError>;

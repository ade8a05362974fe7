//! Mime keys accepted in publish specifiers and the mime types they resolve to

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::error::SpecifierError;

/// Short codec token used on the left of `://` in a socket specifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MimeKey {
    Data,
    H264,
    Vp8,
    Opus,
}

impl MimeKey {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Data => "data",
            Self::H264 => "h264",
            Self::Vp8 => "vp8",
            Self::Opus => "opus",
        }
    }

    #[must_use]
    pub const fn mime_type(&self) -> MimeType {
        match self {
            Self::Data => MimeType::DataByte,
            Self::H264 => MimeType::H264,
            Self::Vp8 => MimeType::Vp8,
            Self::Opus => MimeType::Opus,
        }
    }
}

impl FromStr for MimeKey {
    type Err = SpecifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "data" => Ok(Self::Data),
            "h264" => Ok(Self::H264),
            "vp8" => Ok(Self::Vp8),
            "opus" => Ok(Self::Opus),
            other => Err(SpecifierError::InvalidMimeType(other.to_string())),
        }
    }
}

impl fmt::Display for MimeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mime type a track (or the raw data pseudo-track) is published with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MimeType {
    H264,
    Vp8,
    Opus,
    DataByte,
}

impl MimeType {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::H264 => "video/H264",
            Self::Vp8 => "video/VP8",
            Self::Opus => "audio/opus",
            Self::DataByte => "data/byte",
        }
    }

    /// Resolve the mime type of a media file from its extension.
    ///
    /// Only `.h264`, `.ivf` and `.ogg` are publishable.
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "h264" => Some(Self::H264),
            "ivf" => Some(Self::Vp8),
            "ogg" => Some(Self::Opus),
            _ => None,
        }
    }

    /// Video codecs whose samples are paced by frame duration
    #[must_use]
    pub const fn is_frame_oriented(&self) -> bool {
        matches!(self, Self::H264 | Self::Vp8)
    }
}

impl fmt::Display for MimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

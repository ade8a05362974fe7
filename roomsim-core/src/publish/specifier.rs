//! Publish specifier parsing
//!
//! A specifier is either a bare file path or `<mime key>://<address>`:
//!
//! ```text
//! video.h264                 file
//! h264://192.168.0.1:1234    tcp socket
//! opus:///tmp/my.socket      unix domain socket
//! ```

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::SpecifierError;

use super::mime::MimeKey;

const MIME_DELIMITER: &str = "://";

/// Socket family selected by the shape of the address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Unix,
    Tcp,
}

impl TransportKind {
    /// `host:port` selects tcp, anything else is a unix socket path
    #[must_use]
    pub fn from_address(address: &str) -> Self {
        if address.contains(':') {
            Self::Tcp
        } else {
            Self::Unix
        }
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Unix => "unix",
            Self::Tcp => "tcp",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the bytes of one publication come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishTarget {
    Demo,
    File {
        path: PathBuf,
    },
    Socket {
        mime_key: MimeKey,
        transport: TransportKind,
        address: String,
    },
}

impl PublishTarget {
    /// Parse a specifier string. `Demo` is never produced here.
    pub fn parse(spec: &str) -> Result<Self, SpecifierError> {
        let Some(offset) = spec.find(MIME_DELIMITER) else {
            return Ok(Self::File {
                path: PathBuf::from(spec),
            });
        };

        let mime_key = spec[..offset].parse::<MimeKey>()?;
        let address = &spec[offset + MIME_DELIMITER.len()..];
        if address.is_empty() {
            return Err(SpecifierError::InvalidAddress(spec.to_string()));
        }

        Ok(Self::Socket {
            mime_key,
            transport: TransportKind::from_address(address),
            address: address.to_string(),
        })
    }
}

impl FromStr for PublishTarget {
    type Err = SpecifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for PublishTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Demo => f.write_str("demo"),
            Self::File { path } => write!(f, "{}", path.display()),
            Self::Socket {
                mime_key, address, ..
            } => write!(f, "{mime_key}{MIME_DELIMITER}{address}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_path_is_file() {
        assert_eq!(
            PublishTarget::parse("media/clip.ivf").unwrap(),
            PublishTarget::File {
                path: PathBuf::from("media/clip.ivf")
            }
        );
    }

    #[test]
    fn test_tcp_socket() {
        let target = PublishTarget::parse("h264://127.0.0.1:1234").unwrap();
        assert_eq!(
            target,
            PublishTarget::Socket {
                mime_key: MimeKey::H264,
                transport: TransportKind::Tcp,
                address: "127.0.0.1:1234".to_string(),
            }
        );
    }

    #[test]
    fn test_unix_socket() {
        let target = PublishTarget::parse("opus:///tmp/x.sock").unwrap();
        assert_eq!(
            target,
            PublishTarget::Socket {
                mime_key: MimeKey::Opus,
                transport: TransportKind::Unix,
                address: "/tmp/x.sock".to_string(),
            }
        );
    }

    #[test]
    fn test_unknown_mime_key() {
        for key in ["mp3", "H264", "", "video"] {
            let spec = format!("{key}://127.0.0.1:9");
            assert_eq!(
                PublishTarget::parse(&spec),
                Err(SpecifierError::InvalidMimeType(key.to_string()))
            );
        }
    }

    #[test]
    fn test_empty_address() {
        for key in ["data", "h264", "vp8", "opus"] {
            let spec = format!("{key}://");
            assert_eq!(
                PublishTarget::parse(&spec),
                Err(SpecifierError::InvalidAddress(spec.clone()))
            );
        }
    }

    #[test]
    fn test_splits_at_first_delimiter() {
        let target = PublishTarget::parse("data://host:1/a://b").unwrap();
        match target {
            PublishTarget::Socket {
                mime_key, address, transport,
            } => {
                assert_eq!(mime_key, MimeKey::Data);
                assert_eq!(address, "host:1/a://b");
                assert_eq!(transport, TransportKind::Tcp);
            }
            other => panic!("unexpected target {other:?}"),
        }
    }

    #[test]
    fn test_transport_from_address() {
        assert_eq!(TransportKind::from_address("127.0.0.1:1234"), TransportKind::Tcp);
        assert_eq!(TransportKind::from_address("/tmp/x.sock"), TransportKind::Unix);
    }

    #[test]
    fn test_display_round_trip() {
        let spec = "vp8://localhost:5004";
        assert_eq!(PublishTarget::parse(spec).unwrap().to_string(), spec);
    }
}

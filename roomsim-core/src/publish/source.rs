//! Byte sources behind a publication
//!
//! Files, tcp and unix sockets and the synthetic demo looper are all exposed
//! through [`MediaSource`], a plain [`AsyncRead`] with an explicit close.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, ReadBuf};
use tokio::net::TcpStream;
#[cfg(unix)]
use tokio::net::UnixStream;
use tracing::{debug, info};

use crate::error::{PublishError, Result};
use crate::track::QualityLayer;

use super::demo::DemoLooper;
use super::specifier::{PublishTarget, TransportKind};

/// Default limit for establishing a socket connection
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(10);

enum SourceStream {
    File(tokio::fs::File),
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
    Demo(DemoLooper),
    Reader(Box<dyn AsyncRead + Send + Unpin>),
    Closed,
}

/// Readable byte stream feeding one publication
pub struct MediaSource {
    label: String,
    stream: SourceStream,
}

impl MediaSource {
    /// Wrap an arbitrary reader, e.g. an in-memory buffer or a pipe
    pub fn from_reader(label: impl Into<String>, reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        Self {
            label: label.into(),
            stream: SourceStream::Reader(Box::new(reader)),
        }
    }

    /// Synthetic looping source for one simulcast layer
    #[must_use]
    pub fn demo(layer: QualityLayer) -> Self {
        Self {
            label: format!("demo-{}", layer.rid()),
            stream: SourceStream::Demo(DemoLooper::new(layer)),
        }
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(self.stream, SourceStream::Closed)
    }

    /// Release the underlying handle. Later reads report end of stream.
    pub fn close(&mut self) {
        if !self.is_closed() {
            debug!(source = %self.label, "Closing media source");
            self.stream = SourceStream::Closed;
        }
    }
}

impl std::fmt::Debug for MediaSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaSource")
            .field("label", &self.label)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl AsyncRead for MediaSource {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match &mut self.stream {
            SourceStream::File(file) => Pin::new(file).poll_read(cx, buf),
            SourceStream::Tcp(stream) => Pin::new(stream).poll_read(cx, buf),
            #[cfg(unix)]
            SourceStream::Unix(stream) => Pin::new(stream).poll_read(cx, buf),
            SourceStream::Demo(looper) => Pin::new(looper).poll_read(cx, buf),
            SourceStream::Reader(reader) => Pin::new(reader).poll_read(cx, buf),
            SourceStream::Closed => Poll::Ready(Ok(())),
        }
    }
}

/// Opens the byte source named by a [`PublishTarget`]
#[derive(Debug, Clone)]
pub struct SourceResolver {
    dial_timeout: Duration,
}

impl Default for SourceResolver {
    fn default() -> Self {
        Self::new(DEFAULT_DIAL_TIMEOUT)
    }
}

impl SourceResolver {
    #[must_use]
    pub const fn new(dial_timeout: Duration) -> Self {
        Self { dial_timeout }
    }

    /// Open the source for `target`.
    ///
    /// `Demo` has no single source and fails here; [`publish_demo`] builds
    /// one looper per layer.
    ///
    /// [`publish_demo`]: super::publish_demo
    pub async fn resolve(&self, target: &PublishTarget) -> Result<MediaSource> {
        match target {
            PublishTarget::Demo => Err(PublishError::unavailable(
                target.to_string(),
                io::Error::new(
                    io::ErrorKind::Unsupported,
                    "the demo is published per layer, not from one source",
                ),
            )),
            PublishTarget::File { path } => {
                let file = tokio::fs::File::open(path)
                    .await
                    .map_err(|e| PublishError::unavailable(target.to_string(), e))?;
                debug!(path = %path.display(), "Opened media file");
                Ok(MediaSource {
                    label: path.display().to_string(),
                    stream: SourceStream::File(file),
                })
            }
            PublishTarget::Socket {
                transport, address, ..
            } => {
                let stream = self.dial(*transport, address).await.map_err(|e| {
                    PublishError::unavailable(target.to_string(), e)
                })?;
                info!(transport = %transport, address = %address, "Connected to socket source");
                Ok(MediaSource {
                    label: target.to_string(),
                    stream,
                })
            }
        }
    }

    async fn dial(&self, transport: TransportKind, address: &str) -> io::Result<SourceStream> {
        let connect = async {
            match transport {
                TransportKind::Tcp => TcpStream::connect(address).await.map(SourceStream::Tcp),
                #[cfg(unix)]
                TransportKind::Unix => UnixStream::connect(address).await.map(SourceStream::Unix),
                #[cfg(not(unix))]
                TransportKind::Unix => Err(io::Error::new(
                    io::ErrorKind::Unsupported,
                    "unix sockets are not supported on this platform",
                )),
            }
        };

        tokio::time::timeout(self.dial_timeout, connect)
            .await
            .map_err(|_| {
                io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!(
                        "connection to {address} timed out after {}s",
                        self.dial_timeout.as_secs_f64()
                    ),
                )
            })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_resolve_file() {
        let mut file = tempfile::Builder::new().suffix(".h264").tempfile().unwrap();
        file.write_all(b"\x00\x00\x00\x01\x67").unwrap();

        let target = PublishTarget::File {
            path: file.path().to_path_buf(),
        };
        let mut source = SourceResolver::default().resolve(&target).await.unwrap();
        let mut content = Vec::new();
        source.read_to_end(&mut content).await.unwrap();
        assert_eq!(content, b"\x00\x00\x00\x01\x67");
    }

    #[tokio::test]
    async fn test_demo_has_no_single_source() {
        let err = SourceResolver::default().resolve(&PublishTarget::Demo).await.unwrap_err();
        match err {
            PublishError::SourceUnavailable { target, source } => {
                assert_eq!(target, "demo");
                assert_eq!(source.kind(), io::ErrorKind::Unsupported);
            }
            other => panic!("expected SourceUnavailable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_file_is_unavailable() {
        let target = PublishTarget::parse("/nonexistent/dir/clip.ivf").unwrap();
        let err = SourceResolver::default().resolve(&target).await.unwrap_err();
        assert!(matches!(err, PublishError::SourceUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_resolve_tcp() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut conn, _) = listener.accept().await.unwrap();
            conn.write_all(b"payload").await.unwrap();
        });

        let target = PublishTarget::parse(&format!("data://{addr}")).unwrap();
        let mut source = SourceResolver::default().resolve(&target).await.unwrap();
        let mut content = Vec::new();
        source.read_to_end(&mut content).await.unwrap();
        assert_eq!(content, b"payload");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_resolve_unix() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("src.sock");
        let listener = tokio::net::UnixListener::bind(&path).unwrap();
        tokio::spawn(async move {
            let (mut conn, _) = listener.accept().await.unwrap();
            conn.write_all(b"over unix").await.unwrap();
        });

        let target = PublishTarget::parse(&format!("opus://{}", path.display())).unwrap();
        let mut source = SourceResolver::default().resolve(&target).await.unwrap();
        let mut content = Vec::new();
        source.read_to_end(&mut content).await.unwrap();
        assert_eq!(content, b"over unix");
    }

    #[tokio::test]
    async fn test_refused_dial_is_unavailable() {
        // Bind then drop to get a port nothing listens on
        let addr = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap()
        };
        let target = PublishTarget::parse(&format!("h264://{addr}")).unwrap();
        let err = SourceResolver::default().resolve(&target).await.unwrap_err();
        assert!(matches!(err, PublishError::SourceUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_closed_source_reads_eof() {
        let mut source = MediaSource::from_reader("mem", &b"abc"[..]);
        source.close();
        assert!(source.is_closed());
        let mut buf = [0u8; 8];
        assert_eq!(source.read(&mut buf).await.unwrap(), 0);
    }
}

//! Raw data streaming over the reliable data channel
//!
//! Sources published with the `data` mime key are not tracks. Every read
//! from the source becomes one reliable message, until the source ends or
//! sends the sentinel `EXIT` as a chunk of its own.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::AsyncReadExt;
use tracing::{debug, info};

use crate::error::{PublishError, Result};
use crate::room::{DataPacketOptions, RoomSession};

use super::source::MediaSource;

/// Chunk content that stops the stream without being forwarded
pub const SENTINEL: &[u8] = b"EXIT";
/// Pause after every iteration, independent of chunk size
pub const DEFAULT_PACING: Duration = Duration::from_millis(10);
/// Read buffer size, which is also the largest message sent
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Why a data stream stopped without error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The source sent the sentinel
    Sentinel,
    /// End of stream or read error
    StreamEnded,
}

/// Forwards chunks from a source as reliable data messages
#[derive(Clone)]
pub struct DataStreamLoop {
    room: Arc<dyn RoomSession>,
    chunk_size: usize,
    pacing: Duration,
    options: DataPacketOptions,
}

impl DataStreamLoop {
    pub fn new(room: Arc<dyn RoomSession>) -> Self {
        Self {
            room,
            chunk_size: DEFAULT_CHUNK_SIZE,
            pacing: DEFAULT_PACING,
            options: DataPacketOptions::default(),
        }
    }

    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    #[must_use]
    pub const fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    #[must_use]
    pub fn with_options(mut self, options: DataPacketOptions) -> Self {
        self.options = options;
        self
    }

    /// Stream `source` until it ends, sends the sentinel, or a send fails.
    ///
    /// A failed send is returned as [`PublishError::SendFailed`] and is not retried.
    pub async fn run(&self, mut source: MediaSource) -> Result<StopReason> {
        let label = source.label().to_string();
        let mut buf = vec![0u8; self.chunk_size];
        let mut forwarded = 0u64;

        let result = loop {
            let n = match source.read(&mut buf).await {
                Ok(0) => break Ok(StopReason::StreamEnded),
                Ok(n) => n,
                Err(e) => {
                    debug!(source = %label, error = %e, "Data source read failed");
                    break Ok(StopReason::StreamEnded);
                }
            };

            let chunk = &buf[..n];
            if chunk == SENTINEL {
                break Ok(StopReason::Sentinel);
            }

            debug!(source = %label, bytes = n, data = %String::from_utf8_lossy(chunk), "Forwarding data");
            if let Err(e) = self
                .room
                .send_reliable_data(Bytes::copy_from_slice(chunk), self.options.clone())
                .await
            {
                break Err(PublishError::SendFailed(e));
            }
            forwarded += 1;

            tokio::time::sleep(self.pacing).await;
        };

        source.close();
        if let Ok(reason) = &result {
            info!(source = %label, messages = forwarded, reason = ?reason, "finished writing data stream");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::room::{LocalRoom, RoomCallback};
    use std::collections::VecDeque;
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::{AsyncRead, ReadBuf};

    enum Step {
        Chunk(&'static str),
        Fail,
    }

    /// Returns exactly one scripted chunk per read
    struct ScriptedReader(VecDeque<Step>);

    impl AsyncRead for ScriptedReader {
        fn poll_read(mut self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
            match self.0.pop_front() {
                Some(Step::Chunk(chunk)) => {
                    buf.put_slice(chunk.as_bytes());
                    Poll::Ready(Ok(()))
                }
                Some(Step::Fail) => Poll::Ready(Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))),
                None => Poll::Ready(Ok(())),
            }
        }
    }

    fn scripted(steps: Vec<Step>) -> MediaSource {
        MediaSource::from_reader("scripted", ScriptedReader(steps.into()))
    }

    fn chunks(items: &[&'static str]) -> MediaSource {
        scripted(items.iter().copied().map(Step::Chunk).collect())
    }

    #[tokio::test(start_paused = true)]
    async fn test_sentinel_stops_before_later_chunks() {
        let room = LocalRoom::connect("room", "bot", RoomCallback::default());
        let data_loop = DataStreamLoop::new(room.clone());

        let reason = data_loop
            .run(chunks(&["hello", "EXIT", "world"]))
            .await
            .unwrap();

        assert_eq!(reason, StopReason::Sentinel);
        assert_eq!(room.data_stats().messages_received, 1);
        assert_eq!(room.data_stats().bytes_received, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_eof_and_read_error_end_the_stream() {
        let room = LocalRoom::connect("room", "bot", RoomCallback::default());
        let data_loop = DataStreamLoop::new(room.clone());

        let reason = data_loop.run(chunks(&["a", "b"])).await.unwrap();
        assert_eq!(reason, StopReason::StreamEnded);

        let reason = data_loop
            .run(scripted(vec![Step::Chunk("c"), Step::Fail]))
            .await
            .unwrap();
        assert_eq!(reason, StopReason::StreamEnded);
        assert_eq!(room.data_stats().messages_received, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sentinel_must_be_exact() {
        let room = LocalRoom::connect("room", "bot", RoomCallback::default());
        let reason = DataStreamLoop::new(room.clone())
            .run(chunks(&["EXIT\n", "exit"]))
            .await
            .unwrap();
        assert_eq!(reason, StopReason::StreamEnded);
        assert_eq!(room.data_stats().messages_received, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_failure_is_surfaced() {
        let room = LocalRoom::connect("room", "bot", RoomCallback::default());
        room.disconnect().await;
        let err = DataStreamLoop::new(room)
            .run(chunks(&["payload"]))
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::SendFailed(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pacing_between_iterations() {
        let room = LocalRoom::connect("room", "bot", RoomCallback::default());
        let started = tokio::time::Instant::now();
        DataStreamLoop::new(room)
            .with_pacing(Duration::from_millis(25))
            .run(chunks(&["1", "2", "3"]))
            .await
            .unwrap();
        assert!(started.elapsed() >= Duration::from_millis(75));
    }

    #[tokio::test(start_paused = true)]
    async fn test_chunk_size_caps_message_size() {
        let room = LocalRoom::connect("room", "bot", RoomCallback::default());
        let source = MediaSource::from_reader("mem", std::io::Cursor::new(vec![7u8; 10]));
        DataStreamLoop::new(room.clone())
            .with_chunk_size(4)
            .run(source)
            .await
            .unwrap();
        assert_eq!(room.data_stats().messages_received, 3);
        assert_eq!(room.data_stats().bytes_received, 10);
    }
}

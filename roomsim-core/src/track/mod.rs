//! Local media tracks fed from a byte source
//!
//! This module handles:
//! - Simulcast quality layers
//! - Splitting a [`MediaSource`] into samples ([`sample`])
//! - The writer task that pushes samples into the room at playback pace
//! - Write-complete notification when the source runs out

pub mod sample;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;
use tracing::{debug, info, warn};

use crate::error::{PublishError, Result};
use crate::publish::{MediaSource, MimeType};
use crate::room::TrackSink;

pub use sample::{Sample, SampleDecoder};

/// Simulcast quality layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityLayer {
    High,
    Medium,
    Low,
}

impl QualityLayer {
    /// Layers in ascending spatial order, the order simulcast publishing expects
    pub const ASCENDING: [Self; 3] = [Self::Low, Self::Medium, Self::High];

    /// Get the RID (restriction identifier) for this layer
    #[must_use]
    pub const fn rid(&self) -> &'static str {
        match self {
            Self::High => "h",
            Self::Medium => "m",
            Self::Low => "l",
        }
    }

    /// Get expected bitrate for this layer (kbps)
    #[must_use]
    pub const fn expected_bitrate(&self) -> u32 {
        match self {
            Self::High => 2500,   // 2.5 Mbps
            Self::Medium => 1200, // 1.2 Mbps
            Self::Low => 500,     // 500 kbps
        }
    }

    /// Frame dimensions advertised for this layer
    #[must_use]
    pub const fn dimensions(&self) -> (u16, u16) {
        match self {
            Self::High => (1280, 720),
            Self::Medium => (640, 360),
            Self::Low => (320, 180),
        }
    }

    /// Get spatial layer index (for SVC/Simulcast)
    #[must_use]
    pub const fn spatial_layer(&self) -> u8 {
        match self {
            Self::High => 2,
            Self::Medium => 1,
            Self::Low => 0,
        }
    }
}

/// Invoked once when the writer stops on its own
pub type WriteCompleteHook = Box<dyn FnOnce() + Send + 'static>;

/// Options applied when building a [`LocalTrack`]
#[derive(Default)]
pub struct TrackOptions {
    /// Fixed spacing between frames, overriding container timing
    pub frame_duration: Option<Duration>,
    pub on_write_complete: Option<WriteCompleteHook>,
}

impl TrackOptions {
    #[must_use]
    pub fn with_frame_duration(mut self, frame_duration: Option<Duration>) -> Self {
        self.frame_duration = frame_duration;
        self
    }

    #[must_use]
    pub fn on_write_complete(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.on_write_complete = Some(Box::new(hook));
        self
    }
}

/// Why a track writer stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteEnd {
    /// Source reached end of stream
    EndOfStream,
    /// Reading or framing the source failed
    ReadFailed(String),
    /// The room refused a sample
    SinkFailed(String),
}

#[derive(Default)]
struct TrackStatsInner {
    samples_written: AtomicU64,
    bytes_written: AtomicU64,
}

/// Snapshot of a track's write counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackStats {
    pub samples_written: u64,
    pub bytes_written: u64,
}

/// Media track backed by a readable source
pub struct LocalTrack {
    id: String,
    mime: MimeType,
    layer: Option<QualityLayer>,
    frame_duration: Option<Duration>,
    source: Mutex<Option<MediaSource>>,
    on_write_complete: Mutex<Option<WriteCompleteHook>>,
    stats: TrackStatsInner,
}

impl LocalTrack {
    /// Build a track for `mime` reading from `source`.
    ///
    /// Fails for mime types with no sample framing (raw data).
    pub fn new(source: MediaSource, mime: MimeType, options: TrackOptions) -> Result<Self> {
        if SampleDecoder::for_mime(mime).is_none() {
            return Err(PublishError::UnsupportedTrackMime(mime));
        }

        Ok(Self {
            id: format!("TR_local_{}", nanoid::nanoid!(8)),
            mime,
            layer: None,
            frame_duration: options.frame_duration,
            source: Mutex::new(Some(source)),
            on_write_complete: Mutex::new(options.on_write_complete),
            stats: TrackStatsInner::default(),
        })
    }

    /// Tag the track as one layer of a simulcast publication
    #[must_use]
    pub fn with_simulcast(mut self, layer: QualityLayer) -> Self {
        self.layer = Some(layer);
        self
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub const fn mime(&self) -> MimeType {
        self.mime
    }

    #[must_use]
    pub const fn layer(&self) -> Option<QualityLayer> {
        self.layer
    }

    #[must_use]
    pub const fn frame_duration(&self) -> Option<Duration> {
        self.frame_duration
    }

    #[must_use]
    pub fn stats(&self) -> TrackStats {
        TrackStats {
            samples_written: self.stats.samples_written.load(Ordering::Relaxed),
            bytes_written: self.stats.bytes_written.load(Ordering::Relaxed),
        }
    }

    /// Start pushing samples into `sink`. Allowed once per track.
    ///
    /// The writer closes the source and fires the write-complete hook when
    /// it stops on its own.
    pub fn start_write(self: &Arc<Self>, sink: Arc<dyn TrackSink>) -> Result<JoinHandle<WriteEnd>> {
        let source = self.source.lock().take().ok_or(PublishError::TrackAlreadyStarted)?;
        let decoder = SampleDecoder::for_mime(self.mime).ok_or(PublishError::UnsupportedTrackMime(self.mime))?;

        let track = Arc::clone(self);
        Ok(tokio::spawn(async move {
            let end = track.write_loop(source, decoder, sink).await;
            track.finish(&end);
            end
        }))
    }

    async fn write_loop(&self, source: MediaSource, decoder: SampleDecoder, sink: Arc<dyn TrackSink>) -> WriteEnd {
        let mut frames = FramedRead::new(source, decoder);
        debug!(track_id = %self.id, mime = %self.mime, "Track writer started");

        let end = loop {
            let sample = match frames.next().await {
                Some(Ok(sample)) => sample,
                Some(Err(e)) => break WriteEnd::ReadFailed(e.to_string()),
                None => break WriteEnd::EndOfStream,
            };

            let pause = match self.frame_duration {
                Some(d) if !sample.duration.is_zero() => d,
                _ => sample.duration,
            };

            if let Err(e) = sink.write_sample(&sample).await {
                break WriteEnd::SinkFailed(e.to_string());
            }
            self.stats.samples_written.fetch_add(1, Ordering::Relaxed);
            self.stats.bytes_written.fetch_add(sample.data.len() as u64, Ordering::Relaxed);

            if !pause.is_zero() {
                tokio::time::sleep(pause).await;
            }
        };

        frames.into_inner().close();
        end
    }

    fn finish(&self, end: &WriteEnd) {
        let stats = self.stats();
        match end {
            WriteEnd::EndOfStream => info!(
                track_id = %self.id,
                samples = stats.samples_written,
                bytes = stats.bytes_written,
                "Finished writing track"
            ),
            WriteEnd::ReadFailed(e) | WriteEnd::SinkFailed(e) => warn!(
                track_id = %self.id,
                samples = stats.samples_written,
                error = %e,
                "Track writer stopped"
            ),
        }

        // Released before the hook runs; the hook may call back into the track
        let hook = self.on_write_complete.lock().take();
        if let Some(hook) = hook {
            hook();
        }
    }
}

impl std::fmt::Debug for LocalTrack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalTrack")
            .field("id", &self.id)
            .field("mime", &self.mime)
            .field("layer", &self.layer)
            .field("frame_duration", &self.frame_duration)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::sample::fixtures::{ivf_frame, ivf_header};
    use super::*;
    use crate::error::SessionError;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct CollectingSink {
        samples: Mutex<Vec<Sample>>,
        fail: bool,
    }

    #[async_trait]
    impl TrackSink for CollectingSink {
        async fn write_sample(&self, sample: &Sample) -> std::result::Result<(), SessionError> {
            if self.fail {
                return Err(SessionError::Transport("sink closed".to_string()));
            }
            self.samples.lock().push(sample.clone());
            Ok(())
        }
    }

    fn ivf_source(frames: &[&[u8]]) -> MediaSource {
        let mut bytes = ivf_header(30);
        for (i, frame) in frames.iter().enumerate() {
            bytes.extend(ivf_frame(i as u64, frame));
        }
        MediaSource::from_reader("ivf", std::io::Cursor::new(bytes))
    }

    #[test]
    fn test_quality_layer_properties() {
        assert_eq!(QualityLayer::High.rid(), "h");
        assert_eq!(QualityLayer::Low.spatial_layer(), 0);
        assert!(QualityLayer::High.expected_bitrate() > QualityLayer::Medium.expected_bitrate());
        assert_eq!(QualityLayer::ASCENDING[0], QualityLayer::Low);
    }

    #[test]
    fn test_data_mime_is_not_a_track() {
        let source = MediaSource::from_reader("data", std::io::Cursor::new(Vec::new()));
        let err = LocalTrack::new(source, MimeType::DataByte, TrackOptions::default()).unwrap_err();
        assert!(matches!(err, PublishError::UnsupportedTrackMime(MimeType::DataByte)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_writes_all_samples_then_completes_once() {
        let completions = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&completions);
        let options = TrackOptions::default()
            .with_frame_duration(Some(Duration::from_millis(40)))
            .on_write_complete(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });

        let track = Arc::new(LocalTrack::new(ivf_source(&[b"a", b"bb", b"ccc"]), MimeType::Vp8, options).unwrap());
        let sink = Arc::new(CollectingSink::default());

        let started = tokio::time::Instant::now();
        let end = track.start_write(sink.clone()).unwrap().await.unwrap();

        assert_eq!(end, WriteEnd::EndOfStream);
        assert_eq!(sink.samples.lock().len(), 3);
        assert_eq!(track.stats(), TrackStats { samples_written: 3, bytes_written: 6 });
        assert_eq!(completions.load(Ordering::SeqCst), 1);
        assert!(started.elapsed() >= Duration::from_millis(120));
    }

    #[tokio::test]
    async fn test_hook_runs_without_holding_track_locks() {
        let slot: Arc<Mutex<Option<Arc<LocalTrack>>>> = Arc::new(Mutex::new(None));
        let hook_lock_free = Arc::new(AtomicUsize::new(0));
        let (track_slot, lock_free) = (Arc::clone(&slot), Arc::clone(&hook_lock_free));
        let options = TrackOptions::default().on_write_complete(move || {
            if let Some(track) = track_slot.lock().take() {
                if track.on_write_complete.try_lock().is_some() {
                    lock_free.fetch_add(1, Ordering::SeqCst);
                }
            }
        });

        let track = Arc::new(LocalTrack::new(ivf_source(&[b"a"]), MimeType::Vp8, options).unwrap());
        *slot.lock() = Some(Arc::clone(&track));

        let end = track.start_write(Arc::new(CollectingSink::default())).unwrap().await.unwrap();
        assert_eq!(end, WriteEnd::EndOfStream);
        assert_eq!(hook_lock_free.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_start_write_twice_fails() {
        let track = Arc::new(LocalTrack::new(ivf_source(&[]), MimeType::Vp8, TrackOptions::default()).unwrap());
        let sink: Arc<dyn TrackSink> = Arc::new(CollectingSink::default());
        let handle = track.start_write(Arc::clone(&sink)).unwrap();
        assert!(matches!(track.start_write(sink), Err(PublishError::TrackAlreadyStarted)));
        assert_eq!(handle.await.unwrap(), WriteEnd::EndOfStream);
    }

    #[tokio::test]
    async fn test_sink_failure_still_completes() {
        let completions = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&completions);
        let options = TrackOptions::default().on_write_complete(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let track = Arc::new(LocalTrack::new(ivf_source(&[b"x"]), MimeType::Vp8, options).unwrap());
        let sink = Arc::new(CollectingSink {
            fail: true,
            ..Default::default()
        });

        let end = track.start_write(sink).unwrap().await.unwrap();
        assert!(matches!(end, WriteEnd::SinkFailed(_)));
        assert_eq!(completions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_malformed_container_ends_track() {
        let source = MediaSource::from_reader("bad", std::io::Cursor::new(b"not an ivf file at all, just some text".to_vec()));
        let track = Arc::new(LocalTrack::new(source, MimeType::Vp8, TrackOptions::default()).unwrap());
        let end = track.start_write(Arc::new(CollectingSink::default())).unwrap().await.unwrap();
        assert!(matches!(end, WriteEnd::ReadFailed(_)));
    }
}

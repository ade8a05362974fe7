//! In-process loopback room
//!
//! `LocalRoom` implements [`RoomSession`] without a server: publications are
//! kept in memory, a loopback observer subscribes to every track and receives
//! every data message, and per-publication statistics are recorded. The
//! binary uses it for dry runs; tests use it as a working collaborator.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::SessionError;
use crate::track::{LocalTrack, Sample, WriteEnd};
use crate::types::{ParticipantIdentity, TrackSid};

use super::callback::{ConnectionQuality, RoomCallback, TrackEvent, TrackKind};
use super::session::{DataPacketOptions, PublicationInfo, RoomSession, TrackPublicationOptions, TrackSink};

const LOOPBACK_IDENTITY: &str = "loopback";

/// Counters for one publication, summed over its layers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicationStats {
    pub samples_received: u64,
    pub bytes_received: u64,
}

/// Counters for the data channel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataStats {
    pub messages_received: u64,
    pub bytes_received: u64,
}

#[derive(Default)]
struct PublicationSink {
    samples_received: AtomicU64,
    bytes_received: AtomicU64,
}

#[async_trait]
impl TrackSink for PublicationSink {
    async fn write_sample(&self, sample: &Sample) -> Result<(), SessionError> {
        self.samples_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received
            .fetch_add(sample.data.len() as u64, Ordering::Relaxed);
        Ok(())
    }
}

struct LocalPublication {
    info: PublicationInfo,
    sink: Arc<PublicationSink>,
    writers: Mutex<Vec<JoinHandle<WriteEnd>>>,
}

impl LocalPublication {
    fn stop_writers(&self) {
        for writer in self.writers.lock().drain(..) {
            writer.abort();
        }
    }
}

/// Loopback implementation of a connected room
pub struct LocalRoom {
    name: String,
    identity: ParticipantIdentity,
    observer: ParticipantIdentity,
    callback: RoomCallback,
    connected: AtomicBool,
    publications: DashMap<TrackSid, Arc<LocalPublication>>,
    track_names: Mutex<HashSet<String>>,
    data_messages: AtomicU64,
    data_bytes: AtomicU64,
}

impl LocalRoom {
    /// Join `room` as `identity`
    pub fn connect(room: impl Into<String>, identity: impl Into<ParticipantIdentity>, callback: RoomCallback) -> Arc<Self> {
        let room = Arc::new(Self {
            name: room.into(),
            identity: identity.into(),
            observer: ParticipantIdentity::from(LOOPBACK_IDENTITY),
            callback,
            connected: AtomicBool::new(true),
            publications: DashMap::new(),
            track_names: Mutex::new(HashSet::new()),
            data_messages: AtomicU64::new(0),
            data_bytes: AtomicU64::new(0),
        });

        info!(room = %room.name, identity = %room.identity, "Joined loopback room");
        room.callback
            .connection_quality_changed(ConnectionQuality::Excellent, &room.identity);
        room
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn publication_count(&self) -> usize {
        self.publications.len()
    }

    #[must_use]
    pub fn publication(&self, sid: &TrackSid) -> Option<PublicationInfo> {
        self.publications.get(sid).map(|p| p.info.clone())
    }

    #[must_use]
    pub fn publication_stats(&self, sid: &TrackSid) -> Option<PublicationStats> {
        self.publications.get(sid).map(|p| PublicationStats {
            samples_received: p.sink.samples_received.load(Ordering::Relaxed),
            bytes_received: p.sink.bytes_received.load(Ordering::Relaxed),
        })
    }

    #[must_use]
    pub fn data_stats(&self) -> DataStats {
        DataStats {
            messages_received: self.data_messages.load(Ordering::Relaxed),
            bytes_received: self.data_bytes.load(Ordering::Relaxed),
        }
    }

    /// Update room metadata and notify listeners
    pub fn set_metadata(&self, metadata: &str) {
        self.callback.room_metadata_changed(metadata);
    }

    /// Mute or unmute one of our publications
    pub fn set_track_muted(&self, sid: &TrackSid, muted: bool) -> Result<(), SessionError> {
        let publication = self
            .publications
            .get(sid)
            .map(|p| Arc::clone(p.value()))
            .ok_or_else(|| SessionError::UnknownTrack(sid.to_string()))?;
        self.callback.track_muted(&self.event(&publication.info), muted);
        Ok(())
    }

    /// Run the reconnect notification sequence
    pub fn simulate_reconnect(&self) {
        self.callback.reconnecting();
        self.callback
            .connection_quality_changed(ConnectionQuality::Poor, &self.identity);
        self.callback.reconnected();
        self.callback
            .connection_quality_changed(ConnectionQuality::Good, &self.identity);
    }

    fn ensure_connected(&self) -> Result<(), SessionError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(SessionError::NotConnected)
        }
    }

    fn event(&self, info: &PublicationInfo) -> TrackEvent {
        TrackEvent {
            sid: info.sid.clone(),
            name: info.name.clone(),
            kind: TrackKind::from(info.mime),
            layers: info.layers.clone(),
            participant: self.identity.clone(),
        }
    }

    fn reserve_name(&self, name: &str) -> Result<(), SessionError> {
        if name.is_empty() {
            return Ok(());
        }
        if self.track_names.lock().insert(name.to_string()) {
            Ok(())
        } else {
            Err(SessionError::DuplicateTrackName(name.to_string()))
        }
    }

    fn release_name(&self, name: &str) {
        self.track_names.lock().remove(name);
    }

    fn add_publication(
        &self,
        tracks: Vec<Arc<LocalTrack>>,
        options: TrackPublicationOptions,
    ) -> Result<PublicationInfo, SessionError> {
        self.ensure_connected()?;
        let first = tracks.first().ok_or(SessionError::NoSimulcastLayers)?;
        let mime = first.mime();
        let layers = tracks.iter().filter_map(|t| t.layer()).collect::<Vec<_>>();

        self.reserve_name(&options.name)?;
        let info = PublicationInfo {
            sid: TrackSid::generate(),
            name: options.name,
            mime,
            layers,
        };

        let publication = Arc::new(LocalPublication {
            info: info.clone(),
            sink: Arc::new(PublicationSink::default()),
            writers: Mutex::new(Vec::with_capacity(tracks.len())),
        });
        self.publications
            .insert(info.sid.clone(), Arc::clone(&publication));

        for track in &tracks {
            let sink: Arc<dyn TrackSink> = publication.sink.clone();
            match track.start_write(sink) {
                Ok(writer) => publication.writers.lock().push(writer),
                Err(e) => {
                    publication.stop_writers();
                    self.publications.remove(&info.sid);
                    self.release_name(&info.name);
                    return Err(SessionError::Transport(e.to_string()));
                }
            }
        }

        info!(
            room = %self.name,
            track_id = %info.sid,
            name = %info.name,
            mime = %info.mime,
            layers = info.layers.len(),
            "Published track"
        );

        let mut event = self.event(&info);
        event.participant = self.observer.clone();
        self.callback.track_subscribed(&event);

        Ok(info)
    }
}

#[async_trait]
impl RoomSession for LocalRoom {
    fn name(&self) -> &str {
        &self.name
    }

    fn identity(&self) -> &ParticipantIdentity {
        &self.identity
    }

    async fn publish_track(
        &self,
        track: Arc<LocalTrack>,
        options: TrackPublicationOptions,
    ) -> Result<PublicationInfo, SessionError> {
        self.add_publication(vec![track], options)
    }

    async fn publish_simulcast_track(
        &self,
        tracks: Vec<Arc<LocalTrack>>,
        options: TrackPublicationOptions,
    ) -> Result<PublicationInfo, SessionError> {
        self.add_publication(tracks, options)
    }

    async fn unpublish_track(&self, sid: &TrackSid) -> Result<(), SessionError> {
        self.ensure_connected()?;
        let (_, publication) = self
            .publications
            .remove(sid)
            .ok_or_else(|| SessionError::UnknownTrack(sid.to_string()))?;

        publication.stop_writers();
        self.release_name(&publication.info.name);

        debug!(room = %self.name, track_id = %sid, "Unpublished track");

        let event = self.event(&publication.info);
        let mut observed = event.clone();
        observed.participant = self.observer.clone();
        self.callback.track_unsubscribed(&observed);
        self.callback.track_unpublished(&event);
        Ok(())
    }

    async fn send_reliable_data(&self, payload: Bytes, options: DataPacketOptions) -> Result<(), SessionError> {
        self.ensure_connected()?;
        self.data_messages.fetch_add(1, Ordering::Relaxed);
        self.data_bytes
            .fetch_add(payload.len() as u64, Ordering::Relaxed);

        let observer_addressed = options.destination_identities.is_empty()
            || options.destination_identities.contains(&self.observer);
        if observer_addressed {
            self.callback.data_received(&payload, Some(&self.identity));
        }
        Ok(())
    }

    async fn disconnect(&self) {
        if !self.connected.swap(false, Ordering::AcqRel) {
            return;
        }

        for entry in self.publications.iter() {
            entry.value().stop_writers();
        }
        self.publications.clear();
        self.track_names.lock().clear();

        info!(room = %self.name, "Left loopback room");
        self.callback
            .connection_quality_changed(ConnectionQuality::Lost, &self.identity);
        self.callback.disconnected();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publish::{MediaSource, MimeType};
    use crate::track::sample::fixtures::{ivf_frame, ivf_header};
    use crate::track::{QualityLayer, TrackOptions};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn ivf_local_track(frames: usize) -> LocalTrack {
        let mut bytes = ivf_header(1000);
        for i in 0..frames {
            bytes.extend(ivf_frame(i as u64, b"frame"));
        }
        let source = MediaSource::from_reader("ivf", std::io::Cursor::new(bytes));
        LocalTrack::new(source, MimeType::Vp8, TrackOptions::default()).unwrap()
    }

    fn ivf_track(frames: usize) -> Arc<LocalTrack> {
        Arc::new(ivf_local_track(frames))
    }

    #[tokio::test]
    async fn test_publish_records_samples() {
        let room = LocalRoom::connect("test-room", "bot", RoomCallback::default());
        let track = ivf_track(4);
        let info = room
            .publish_track(Arc::clone(&track), TrackPublicationOptions::named("cam"))
            .await
            .unwrap();

        assert_eq!(info.mime, MimeType::Vp8);
        assert!(info.layers.is_empty());

        for _ in 0..100 {
            if track.stats().samples_written == 4 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(
            room.publication_stats(&info.sid),
            Some(PublicationStats {
                samples_received: 4,
                bytes_received: 20
            })
        );
    }

    #[tokio::test]
    async fn test_duplicate_name_rejected() {
        let room = LocalRoom::connect("test-room", "bot", RoomCallback::default());
        room.publish_track(ivf_track(1), TrackPublicationOptions::named("cam"))
            .await
            .unwrap();
        let err = room
            .publish_track(ivf_track(1), TrackPublicationOptions::named("cam"))
            .await
            .unwrap_err();
        assert_eq!(err, SessionError::DuplicateTrackName("cam".to_string()));

        // Unnamed tracks never collide
        room.publish_track(ivf_track(1), TrackPublicationOptions::default())
            .await
            .unwrap();
        room.publish_track(ivf_track(1), TrackPublicationOptions::default())
            .await
            .unwrap();
        assert_eq!(room.publication_count(), 3);
    }

    #[tokio::test]
    async fn test_unpublish_unknown_track() {
        let room = LocalRoom::connect("test-room", "bot", RoomCallback::default());
        let err = room.unpublish_track(&TrackSid::from("TR_missing")).await.unwrap_err();
        assert!(matches!(err, SessionError::UnknownTrack(_)));
    }

    #[tokio::test]
    async fn test_unpublish_fires_callbacks_and_frees_name() {
        let unpublished = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&unpublished);
        let callback = RoomCallback {
            on_track_unpublished: Some(Box::new(move |_: &TrackEvent| {
                counter.fetch_add(1, Ordering::SeqCst);
            })),
            ..Default::default()
        };
        let room = LocalRoom::connect("test-room", "bot", callback);
        let info = room
            .publish_track(ivf_track(1), TrackPublicationOptions::named("cam"))
            .await
            .unwrap();

        room.unpublish_track(&info.sid).await.unwrap();
        assert_eq!(unpublished.load(Ordering::SeqCst), 1);
        assert_eq!(room.publication_count(), 0);
        room.publish_track(ivf_track(1), TrackPublicationOptions::named("cam"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_simulcast_layers() {
        let room = LocalRoom::connect("test-room", "bot", RoomCallback::default());
        let tracks = QualityLayer::ASCENDING
            .iter()
            .map(|layer| Arc::new(ivf_local_track(1).with_simulcast(*layer)))
            .collect();
        let info = room
            .publish_simulcast_track(tracks, TrackPublicationOptions::named("demo"))
            .await
            .unwrap();
        assert_eq!(info.layers, QualityLayer::ASCENDING.to_vec());

        let err = room
            .publish_simulcast_track(Vec::new(), TrackPublicationOptions::named("empty"))
            .await
            .unwrap_err();
        assert_eq!(err, SessionError::NoSimulcastLayers);
    }

    #[tokio::test]
    async fn test_data_is_counted_and_echoed() {
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        let callback = RoomCallback {
            on_data_received: Some(Box::new(move |data: &Bytes, _: Option<&ParticipantIdentity>| {
                sink.lock().push(data.clone());
            })),
            ..Default::default()
        };
        let room = LocalRoom::connect("test-room", "bot", callback);

        room.send_reliable_data(Bytes::from_static(b"hello"), DataPacketOptions::default())
            .await
            .unwrap();
        room.send_reliable_data(
            Bytes::from_static(b"private"),
            DataPacketOptions {
                destination_identities: vec![ParticipantIdentity::from("someone-else")],
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(
            room.data_stats(),
            DataStats {
                messages_received: 2,
                bytes_received: 12
            }
        );
        assert_eq!(received.lock().as_slice(), &[Bytes::from_static(b"hello")]);
    }

    #[tokio::test]
    async fn test_disconnect_rejects_further_calls() {
        let disconnects = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&disconnects);
        let qualities = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&qualities);
        let callback = RoomCallback {
            on_disconnected: Some(Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })),
            on_connection_quality_changed: Some(Box::new(
                move |quality: ConnectionQuality, _: &ParticipantIdentity| {
                    seen.lock().push(quality);
                },
            )),
            ..Default::default()
        };
        let room = LocalRoom::connect("test-room", "bot", callback);
        room.publish_track(ivf_track(1), TrackPublicationOptions::default())
            .await
            .unwrap();

        room.disconnect().await;
        room.disconnect().await;

        assert!(!room.is_connected());
        assert_eq!(room.publication_count(), 0);
        assert_eq!(disconnects.load(Ordering::SeqCst), 1);
        assert_eq!(
            qualities.lock().as_slice(),
            &[ConnectionQuality::Excellent, ConnectionQuality::Lost]
        );
        assert_eq!(
            room.send_reliable_data(Bytes::from_static(b"x"), DataPacketOptions::default())
                .await,
            Err(SessionError::NotConnected)
        );
    }
}

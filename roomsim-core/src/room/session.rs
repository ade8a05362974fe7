//! Capabilities consumed from a connected room session

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::SessionError;
use crate::publish::MimeType;
use crate::track::{LocalTrack, QualityLayer, Sample};
use crate::types::{ParticipantIdentity, TrackSid};

/// Receives the samples a published track writes
#[async_trait]
pub trait TrackSink: Send + Sync {
    async fn write_sample(&self, sample: &Sample) -> Result<(), SessionError>;
}

/// Options for publishing a track
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackPublicationOptions {
    /// Display name; empty names are never considered duplicates
    pub name: String,
}

impl TrackPublicationOptions {
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Options for sending a data message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataPacketOptions {
    /// Restrict delivery to these participants; empty means everyone
    pub destination_identities: Vec<ParticipantIdentity>,
}

/// What the room reports back for a successful publish
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicationInfo {
    pub sid: TrackSid,
    pub name: String,
    pub mime: MimeType,
    /// Simulcast layers, empty for single-layer tracks
    pub layers: Vec<QualityLayer>,
}

/// The already-connected room session.
///
/// Implementations must tolerate concurrent calls from many publish tasks.
/// On publish, the session starts the track writer with
/// [`LocalTrack::start_write`].
#[async_trait]
pub trait RoomSession: Send + Sync {
    fn name(&self) -> &str;

    fn identity(&self) -> &ParticipantIdentity;

    async fn publish_track(
        &self,
        track: Arc<LocalTrack>,
        options: TrackPublicationOptions,
    ) -> Result<PublicationInfo, SessionError>;

    /// Publish several encodings of the same content as one track
    async fn publish_simulcast_track(
        &self,
        tracks: Vec<Arc<LocalTrack>>,
        options: TrackPublicationOptions,
    ) -> Result<PublicationInfo, SessionError>;

    async fn unpublish_track(&self, sid: &TrackSid) -> Result<(), SessionError>;

    /// Deliver `payload` as one message over the reliable data channel
    async fn send_reliable_data(&self, payload: Bytes, options: DataPacketOptions) -> Result<(), SessionError>;

    async fn disconnect(&self);
}

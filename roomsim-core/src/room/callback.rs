//! Room event notification table
//!
//! Every slot is independent and optional. Handlers only get read-only event
//! context, so none of them share mutable state.

use bytes::Bytes;
use tracing::{debug, info};

use crate::publish::MimeType;
use crate::track::QualityLayer;
use crate::types::{ParticipantIdentity, TrackSid};

/// Track kind as seen by other participants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
    Data,
}

impl From<MimeType> for TrackKind {
    fn from(mime: MimeType) -> Self {
        match mime {
            MimeType::H264 | MimeType::Vp8 => Self::Video,
            MimeType::Opus => Self::Audio,
            MimeType::DataByte => Self::Data,
        }
    }
}

/// Description of a publication carried by track events
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackEvent {
    pub sid: TrackSid,
    pub name: String,
    pub kind: TrackKind,
    pub layers: Vec<QualityLayer>,
    pub participant: ParticipantIdentity,
}

/// Connection quality reported for a participant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionQuality {
    Excellent,
    Good,
    Poor,
    Lost,
}

type TrackHandler = Box<dyn Fn(&TrackEvent) + Send + Sync>;
type DataHandler = Box<dyn Fn(&Bytes, Option<&ParticipantIdentity>) + Send + Sync>;
type QualityHandler = Box<dyn Fn(ConnectionQuality, &ParticipantIdentity) + Send + Sync>;
type MetadataHandler = Box<dyn Fn(&str) + Send + Sync>;
type StateHandler = Box<dyn Fn() + Send + Sync>;

/// Handlers a session invokes as room events arrive
#[derive(Default)]
pub struct RoomCallback {
    pub on_track_subscribed: Option<TrackHandler>,
    pub on_track_unsubscribed: Option<TrackHandler>,
    pub on_track_unpublished: Option<TrackHandler>,
    pub on_track_muted: Option<TrackHandler>,
    pub on_track_unmuted: Option<TrackHandler>,
    pub on_data_received: Option<DataHandler>,
    pub on_connection_quality_changed: Option<QualityHandler>,
    pub on_room_metadata_changed: Option<MetadataHandler>,
    pub on_reconnecting: Option<StateHandler>,
    pub on_reconnected: Option<StateHandler>,
    pub on_disconnected: Option<StateHandler>,
}

fn log_track(message: &'static str) -> TrackHandler {
    Box::new(move |event: &TrackEvent| {
        info!(
            kind = ?event.kind,
            track_id = %event.sid,
            name = %event.name,
            participant = %event.participant,
            "{}", message
        );
    })
}

impl RoomCallback {
    /// Table that logs every event
    #[must_use]
    pub fn logging() -> Self {
        Self {
            on_track_subscribed: Some(log_track("track subscribed")),
            on_track_unsubscribed: Some(log_track("track unsubscribed")),
            on_track_unpublished: Some(log_track("track unpublished")),
            on_track_muted: Some(log_track("track muted")),
            on_track_unmuted: Some(log_track("track unmuted")),
            on_data_received: Some(Box::new(|data: &Bytes, participant: Option<&ParticipantIdentity>| {
                info!(
                    bytes = data.len(),
                    data = %String::from_utf8_lossy(data),
                    participant = participant.map_or("", ParticipantIdentity::as_str),
                    "received data"
                );
            })),
            on_connection_quality_changed: Some(Box::new(|quality: ConnectionQuality, participant: &ParticipantIdentity| {
                debug!(participant = %participant, quality = ?quality, "connection quality changed");
            })),
            on_room_metadata_changed: Some(Box::new(|metadata: &str| {
                info!(metadata = %metadata, "room metadata changed");
            })),
            on_reconnecting: Some(Box::new(|| info!("reconnecting to room"))),
            on_reconnected: Some(Box::new(|| info!("reconnected to room"))),
            on_disconnected: Some(Box::new(|| info!("disconnected from room"))),
        }
    }

    pub(crate) fn track_subscribed(&self, event: &TrackEvent) {
        if let Some(handler) = &self.on_track_subscribed {
            handler(event);
        }
    }

    pub(crate) fn track_unsubscribed(&self, event: &TrackEvent) {
        if let Some(handler) = &self.on_track_unsubscribed {
            handler(event);
        }
    }

    pub(crate) fn track_unpublished(&self, event: &TrackEvent) {
        if let Some(handler) = &self.on_track_unpublished {
            handler(event);
        }
    }

    pub(crate) fn track_muted(&self, event: &TrackEvent, muted: bool) {
        let slot = if muted {
            &self.on_track_muted
        } else {
            &self.on_track_unmuted
        };
        if let Some(handler) = slot {
            handler(event);
        }
    }

    pub(crate) fn data_received(&self, data: &Bytes, participant: Option<&ParticipantIdentity>) {
        if let Some(handler) = &self.on_data_received {
            handler(data, participant);
        }
    }

    pub(crate) fn connection_quality_changed(&self, quality: ConnectionQuality, participant: &ParticipantIdentity) {
        if let Some(handler) = &self.on_connection_quality_changed {
            handler(quality, participant);
        }
    }

    pub(crate) fn room_metadata_changed(&self, metadata: &str) {
        if let Some(handler) = &self.on_room_metadata_changed {
            handler(metadata);
        }
    }

    pub(crate) fn reconnecting(&self) {
        if let Some(handler) = &self.on_reconnecting {
            handler();
        }
    }

    pub(crate) fn reconnected(&self) {
        if let Some(handler) = &self.on_reconnected {
            handler();
        }
    }

    pub(crate) fn disconnected(&self) {
        if let Some(handler) = &self.on_disconnected {
            handler();
        }
    }
}

impl std::fmt::Debug for RoomCallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomCallback")
            .field("on_track_subscribed", &self.on_track_subscribed.is_some())
            .field("on_data_received", &self.on_data_received.is_some())
            .field("on_disconnected", &self.on_disconnected.is_some())
            .finish_non_exhaustive()
    }
}

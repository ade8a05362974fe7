//! Publishing a source as a media track with automatic teardown
//!
//! The write-complete hook must only unpublish once the room has returned a
//! publication handle. The hook therefore waits on a oneshot that is filled
//! after `publish_track` returns; if publishing fails the sender is dropped
//! and the hook does nothing.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, watch};
use tracing::{debug, info, warn};

use crate::error::{PublishError, Result};
use crate::room::{PublicationInfo, RoomSession, TrackPublicationOptions};
use crate::track::{LocalTrack, TrackOptions};
use crate::types::TrackSid;

use super::mime::MimeType;
use super::source::MediaSource;

/// How a finished publication was torn down
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainOutcome {
    Unpublished,
    /// The room refused the unpublish; logged, never escalated
    UnpublishFailed(String),
}

/// Lifecycle of one track publication
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishState {
    Created,
    SourceOpen,
    Published,
    Draining,
    Drained(DrainOutcome),
    PublishFailed,
}

/// Handle to a published track
#[derive(Debug)]
pub struct TrackPublication {
    info: PublicationInfo,
    state: watch::Receiver<PublishState>,
}

impl TrackPublication {
    #[must_use]
    pub const fn info(&self) -> &PublicationInfo {
        &self.info
    }

    #[must_use]
    pub const fn sid(&self) -> &TrackSid {
        &self.info.sid
    }

    #[must_use]
    pub fn state(&self) -> PublishState {
        self.state.borrow().clone()
    }

    /// Wait until the source is exhausted and the track torn down.
    ///
    /// Returns `None` if the track is dropped without finishing, e.g. when
    /// the room unpublishes it first.
    pub async fn drained(&mut self) -> Option<DrainOutcome> {
        let state = self
            .state
            .wait_for(|s| matches!(s, PublishState::Drained(_)))
            .await
            .ok()?;
        match &*state {
            PublishState::Drained(outcome) => Some(outcome.clone()),
            _ => None,
        }
    }
}

/// Binds media sources to the room's track publishing capability
#[derive(Clone)]
pub struct TrackPublisher {
    room: Arc<dyn RoomSession>,
}

impl TrackPublisher {
    pub fn new(room: Arc<dyn RoomSession>) -> Self {
        Self { room }
    }

    /// Publish `source` as a `mime` track named `name`.
    ///
    /// When the source runs out the track is unpublished exactly once.
    pub async fn publish(
        &self,
        source: MediaSource,
        mime: MimeType,
        frame_duration: Option<Duration>,
        name: &str,
    ) -> Result<TrackPublication> {
        let (state_tx, state_rx) = watch::channel(PublishState::Created);
        let state_tx = Arc::new(state_tx);
        state_tx.send_replace(PublishState::SourceOpen);

        let (sid_tx, sid_rx) = oneshot::channel::<TrackSid>();
        let hook = unpublish_on_complete(Arc::clone(&self.room), Arc::clone(&state_tx), sid_rx, name.to_string());

        let options = TrackOptions::default()
            .with_frame_duration(frame_duration)
            .on_write_complete(hook);
        let track = match LocalTrack::new(source, mime, options) {
            Ok(track) => Arc::new(track),
            Err(e) => {
                state_tx.send_replace(PublishState::PublishFailed);
                return Err(e);
            }
        };

        debug!(
            name = %name,
            mime = %mime,
            frame_duration_ms = frame_duration.map(|d| d.as_secs_f64() * 1000.0),
            "Publishing track"
        );

        let info = match self
            .room
            .publish_track(track, TrackPublicationOptions::named(name))
            .await
        {
            Ok(info) => info,
            Err(e) => {
                state_tx.send_replace(PublishState::PublishFailed);
                return Err(PublishError::PublishRejected(e));
            }
        };

        state_tx.send_replace(PublishState::Published);
        // The hook may already be waiting; release it now that the sid exists
        let _ = sid_tx.send(info.sid.clone());

        info!(track_id = %info.sid, name = %name, mime = %mime, "Published track");
        Ok(TrackPublication {
            info,
            state: state_rx,
        })
    }
}

fn unpublish_on_complete(
    room: Arc<dyn RoomSession>,
    state: Arc<watch::Sender<PublishState>>,
    sid_rx: oneshot::Receiver<TrackSid>,
    name: String,
) -> impl FnOnce() + Send + 'static {
    move || {
        // Runs on the writer task; the unpublish goes to its own task so the
        // writer never waits on the session.
        tokio::spawn(async move {
            let Ok(sid) = sid_rx.await else {
                debug!(name = %name, "Track finished without a publication");
                return;
            };

            state.send_replace(PublishState::Draining);
            info!(track_id = %sid, name = %name, "finished writing track");

            let outcome = match room.unpublish_track(&sid).await {
                Ok(()) => DrainOutcome::Unpublished,
                Err(e) => {
                    warn!(track_id = %sid, error = %e, "Failed to unpublish finished track");
                    DrainOutcome::UnpublishFailed(e.to_string())
                }
            };
            state.send_replace(PublishState::Drained(outcome));
        });
    }
}

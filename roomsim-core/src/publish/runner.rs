//! Dispatch of publish specifiers
//!
//! Every specifier runs as its own task against the shared room. Failures
//! stay inside the owning task and are reported as that target's outcome.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::error::{PublishError, Result};
use crate::room::{PublicationInfo, RoomSession};

use super::data_loop::{DataStreamLoop, StopReason, DEFAULT_CHUNK_SIZE, DEFAULT_PACING};
use super::demo::{publish_demo, DEMO_TRACK_NAME};
use super::mime::MimeType;
use super::pacer::frame_duration_for;
use super::publisher::{TrackPublication, TrackPublisher};
use super::source::{SourceResolver, DEFAULT_DIAL_TIMEOUT};
use super::specifier::PublishTarget;

/// Tunables shared by all publish tasks
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PublishOptions {
    pub dial_timeout: Duration,
    pub data_chunk_size: usize,
    pub data_pacing: Duration,
}

impl Default for PublishOptions {
    fn default() -> Self {
        Self {
            dial_timeout: DEFAULT_DIAL_TIMEOUT,
            data_chunk_size: DEFAULT_CHUNK_SIZE,
            data_pacing: DEFAULT_PACING,
        }
    }
}

/// Everything a run needs from its caller
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PublishPlan {
    pub targets: Vec<String>,
    /// Requested video frame rate, 0 to let sources pace themselves
    pub fps: f64,
    pub demo: bool,
    pub options: PublishOptions,
}

/// How a target's bytes reach the room
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishKind {
    Track {
        mime: MimeType,
        frame_duration: Option<Duration>,
    },
    DataLoop,
}

impl PublishKind {
    /// Decide the publish path for `target` at `fps`
    pub fn for_target(target: &PublishTarget, fps: f64) -> Result<Self> {
        let mime = match target {
            // The demo carries its own 30 fps timing
            PublishTarget::Demo => {
                return Ok(Self::Track {
                    mime: MimeType::Vp8,
                    frame_duration: None,
                })
            }
            PublishTarget::File { path } => MimeType::from_path(path)
                .ok_or_else(|| PublishError::UnsupportedFileType(path.display().to_string()))?,
            PublishTarget::Socket { mime_key, .. } => mime_key.mime_type(),
        };

        Ok(match mime {
            MimeType::DataByte => Self::DataLoop,
            mime => Self::Track {
                mime,
                frame_duration: frame_duration_for(mime, fps),
            },
        })
    }
}

/// Result of publishing one target
#[derive(Debug)]
pub enum PublishOutcome {
    /// A single track is live; it unpublishes itself when the source ends
    Track(TrackPublication),
    /// The simulcast demo is live
    Demo(PublicationInfo),
    /// A data stream ran to completion
    Data(StopReason),
}

/// Outcome of one specifier
#[derive(Debug)]
pub struct TargetOutcome {
    pub spec: String,
    pub result: Result<PublishOutcome>,
}

/// Runs publish specifiers against one shared room
#[derive(Clone)]
pub struct PublishRunner {
    room: Arc<dyn RoomSession>,
    resolver: SourceResolver,
    publisher: TrackPublisher,
    data_loop: DataStreamLoop,
    fps: f64,
}

impl PublishRunner {
    pub fn new(room: Arc<dyn RoomSession>, fps: f64, options: PublishOptions) -> Self {
        Self {
            resolver: SourceResolver::new(options.dial_timeout),
            publisher: TrackPublisher::new(Arc::clone(&room)),
            data_loop: DataStreamLoop::new(Arc::clone(&room))
                .with_chunk_size(options.data_chunk_size)
                .with_pacing(options.data_pacing),
            room,
            fps,
        }
    }

    /// Publish everything in `plan` concurrently.
    ///
    /// Returns one outcome per target in plan order, the demo first when
    /// requested. Track outcomes are returned once the track is live; data
    /// outcomes once the stream has stopped.
    pub async fn run(room: Arc<dyn RoomSession>, plan: PublishPlan) -> Vec<TargetOutcome> {
        let runner = Arc::new(Self::new(room, plan.fps, plan.options));

        let mut specs = Vec::with_capacity(plan.targets.len() + 1);
        if plan.demo {
            specs.push(None);
        }
        specs.extend(plan.targets.into_iter().map(Some));

        let mut tasks = JoinSet::new();
        for (index, spec) in specs.iter().cloned().enumerate() {
            let runner = Arc::clone(&runner);
            tasks.spawn(async move {
                let result = match &spec {
                    Some(spec) => runner.publish_spec(spec).await,
                    None => runner.publish_demo().await,
                };
                (index, result)
            });
        }

        let mut results: Vec<Option<Result<PublishOutcome>>> = specs.iter().map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => results[index] = Some(result),
                Err(e) => error!(error = %e, "Publish task panicked"),
            }
        }

        specs
            .into_iter()
            .zip(results)
            .map(|(spec, result)| TargetOutcome {
                spec: spec.unwrap_or_else(|| DEMO_TRACK_NAME.to_string()),
                result: result.unwrap_or_else(|| Err(PublishError::TaskFailed("task did not complete".to_string()))),
            })
            .collect()
    }

    /// Parse and publish a single specifier
    pub async fn publish_spec(&self, spec: &str) -> Result<PublishOutcome> {
        let result = match PublishTarget::parse(spec) {
            Ok(target) => self.publish_target(target, spec).await,
            Err(e) => Err(e.into()),
        };
        log_outcome(spec, &result);
        result
    }

    /// Publish the simulcast test pattern
    pub async fn publish_demo(&self) -> Result<PublishOutcome> {
        let result = self.publish_target(PublishTarget::Demo, DEMO_TRACK_NAME).await;
        log_outcome(DEMO_TRACK_NAME, &result);
        result
    }

    async fn publish_target(&self, target: PublishTarget, name: &str) -> Result<PublishOutcome> {
        let kind = PublishKind::for_target(&target, self.fps)?;

        if target == PublishTarget::Demo {
            return publish_demo(&self.room).await.map(PublishOutcome::Demo);
        }

        let source = self.resolver.resolve(&target).await?;
        match kind {
            PublishKind::Track {
                mime,
                frame_duration,
            } => {
                let name = match &target {
                    PublishTarget::File { path } => path.display().to_string(),
                    _ => name.to_string(),
                };
                self.publisher
                    .publish(source, mime, frame_duration, &name)
                    .await
                    .map(PublishOutcome::Track)
            }
            PublishKind::DataLoop => self.data_loop.run(source).await.map(PublishOutcome::Data),
        }
    }
}

fn log_outcome(spec: &str, result: &Result<PublishOutcome>) {
    match result {
        Ok(PublishOutcome::Track(publication)) => {
            info!(target_spec = %spec, track_id = %publication.sid(), "Publishing");
        }
        Ok(PublishOutcome::Demo(info)) => {
            info!(target_spec = %spec, track_id = %info.sid, "Publishing demo");
        }
        Ok(PublishOutcome::Data(reason)) => {
            info!(target_spec = %spec, reason = ?reason, "Data stream finished");
        }
        Err(e) => warn!(target_spec = %spec, error = %e, "Failed to publish"),
    }
}

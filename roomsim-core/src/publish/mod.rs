//! Publish-target resolution and streaming ingestion
//!
//! ```text
//! specifier ──parse──► PublishTarget ──resolve──► MediaSource
//!                                                    │
//!                        ┌───────────────────────────┴─────────────┐
//!                 h264 / vp8 / opus / demo                        data
//!                        │                                         │
//!              FramePacer + TrackPublisher                  DataStreamLoop
//!                        │                                         │
//!                 room.publish_track                  room.send_reliable_data
//! ```

mod data_loop;
mod demo;
mod mime;
mod pacer;
mod publisher;
mod runner;
mod source;
mod specifier;

pub use data_loop::{DataStreamLoop, StopReason, DEFAULT_CHUNK_SIZE, DEFAULT_PACING, SENTINEL};
pub use demo::{publish_demo, DemoLooper, DEMO_TRACK_NAME};
pub use mime::{MimeKey, MimeType};
pub use pacer::{frame_duration, frame_duration_for};
pub use publisher::{DrainOutcome, PublishState, TrackPublication, TrackPublisher};
pub use runner::{PublishKind, PublishOptions, PublishOutcome, PublishPlan, PublishRunner, TargetOutcome};
pub use source::{MediaSource, SourceResolver, DEFAULT_DIAL_TIMEOUT};
pub use specifier::{PublishTarget, TransportKind};

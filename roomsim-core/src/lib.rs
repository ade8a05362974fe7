//! Synthetic room participant
//!
//! Joins a media room and publishes tracks or reliable data from local files,
//! tcp or unix sockets, or a built-in simulcast test pattern.

pub mod config;
pub mod error;
pub mod logging;
pub mod publish;
pub mod room;
pub mod track;
pub mod types;

pub use config::{Config, Credentials};
pub use error::{ConfigError, PublishError, Result, SessionError, SpecifierError};
pub use publish::{PublishPlan, PublishRunner, PublishTarget};
pub use room::{LocalRoom, RoomCallback, RoomSession};
pub use track::{LocalTrack, QualityLayer};
pub use types::{ParticipantIdentity, TrackSid};

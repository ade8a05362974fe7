//! Room session collaborator
//!
//! - **`RoomSession`**: publish, unpublish and data capabilities of a joined room
//! - **`RoomCallback`**: event notification table with independent slots
//! - **`LocalRoom`**: in-process loopback session

mod callback;
mod local;
mod session;

pub use callback::{ConnectionQuality, RoomCallback, TrackEvent, TrackKind};
pub use local::{DataStats, LocalRoom, PublicationStats};
pub use session::{DataPacketOptions, PublicationInfo, RoomSession, TrackPublicationOptions, TrackSink};

//! Frame pacing derived from a requested frame rate

use std::time::Duration;

use super::mime::MimeType;

/// Frame duration for a requested rate.
///
/// Returns `None` for a zero, negative or non-finite rate; the source then
/// paces itself from its container timing.
#[must_use]
pub fn frame_duration(rate: f64) -> Option<Duration> {
    if !rate.is_finite() || rate <= 0.0 {
        return None;
    }
    Some(Duration::from_secs_f64(1.0 / rate))
}

/// Frame duration to apply to a track of `mime`, if any
#[must_use]
pub fn frame_duration_for(mime: MimeType, rate: f64) -> Option<Duration> {
    if mime.is_frame_oriented() {
        frame_duration(rate)
    } else {
        None
    }
}

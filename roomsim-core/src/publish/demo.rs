//! Built-in looping demo publication
//!
//! Each simulcast layer is an endless synthetic IVF stream. Frame sizes
//! follow the layer bitrate and a keyframe opens every group of pictures.
//! Payloads are a fixed byte pattern, not decodable video.

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::{Buf, BufMut, BytesMut};
use tokio::io::{AsyncRead, ReadBuf};
use tracing::info;

use crate::error::{PublishError, Result};
use crate::room::{PublicationInfo, RoomSession, TrackPublicationOptions};
use crate::track::{LocalTrack, QualityLayer, TrackOptions};

use super::mime::MimeType;
use super::source::MediaSource;

pub const DEMO_TRACK_NAME: &str = "demo";
pub const DEMO_FRAME_RATE: u32 = 30;
/// Frames between keyframes
pub const DEMO_GOP_LENGTH: u64 = 30;
/// Frames after which the payload pattern repeats
pub const DEMO_LOOP_FRAMES: u64 = 300;

const KEYFRAME_SIZE_FACTOR: usize = 3;
const VP8_KEYFRAME_START_CODE: [u8; 3] = [0x9d, 0x01, 0x2a];

/// Synthetic IVF source for one quality layer
#[derive(Debug)]
pub struct DemoLooper {
    layer: QualityLayer,
    pending: BytesMut,
    header_sent: bool,
    frame_index: u64,
}

impl DemoLooper {
    #[must_use]
    pub fn new(layer: QualityLayer) -> Self {
        Self {
            layer,
            pending: BytesMut::new(),
            header_sent: false,
            frame_index: 0,
        }
    }

    #[must_use]
    pub const fn layer(&self) -> QualityLayer {
        self.layer
    }

    fn frame_size(&self, keyframe: bool) -> usize {
        let average = self.layer.expected_bitrate() as usize * 1000 / 8 / DEMO_FRAME_RATE as usize;
        if keyframe {
            average * KEYFRAME_SIZE_FACTOR
        } else {
            average
        }
    }

    fn push_header(&mut self) {
        let (width, height) = self.layer.dimensions();
        self.pending.put_slice(b"DKIF");
        self.pending.put_u16_le(0);
        self.pending.put_u16_le(32);
        self.pending.put_slice(b"VP80");
        self.pending.put_u16_le(width);
        self.pending.put_u16_le(height);
        self.pending.put_u32_le(DEMO_FRAME_RATE);
        self.pending.put_u32_le(1);
        self.pending.put_u32_le(0);
        self.pending.put_u32_le(0);
    }

    fn push_frame(&mut self) {
        let position = self.frame_index % DEMO_LOOP_FRAMES;
        let keyframe = position % DEMO_GOP_LENGTH == 0;
        let size = self.frame_size(keyframe);

        self.pending.put_u32_le(size as u32);
        self.pending.put_u64_le(self.frame_index);

        let mut payload = Vec::with_capacity(size);
        // VP8 frame tag: bit 0 clear marks a keyframe
        payload.push(if keyframe { 0x10 } else { 0x11 });
        payload.extend_from_slice(&[0x00, 0x00]);
        if keyframe {
            let (width, height) = self.layer.dimensions();
            payload.extend_from_slice(&VP8_KEYFRAME_START_CODE);
            payload.extend_from_slice(&width.to_le_bytes());
            payload.extend_from_slice(&height.to_le_bytes());
        }
        let seed = position as usize;
        payload.extend((payload.len()..size).map(|i| (seed + i) as u8));

        self.pending.put_slice(&payload);
        self.frame_index += 1;
    }
}

impl AsyncRead for DemoLooper {
    fn poll_read(mut self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        if self.pending.is_empty() {
            if self.header_sent {
                self.push_frame();
            } else {
                self.push_header();
                self.header_sent = true;
            }
        }

        let n = self.pending.len().min(buf.remaining());
        buf.put_slice(&self.pending[..n]);
        self.pending.advance(n);
        Poll::Ready(Ok(()))
    }
}

/// Publish the three-layer looping demo as one simulcast track
pub async fn publish_demo(room: &Arc<dyn RoomSession>) -> Result<PublicationInfo> {
    let mut tracks = Vec::with_capacity(QualityLayer::ASCENDING.len());
    for layer in QualityLayer::ASCENDING {
        let track = LocalTrack::new(MediaSource::demo(layer), MimeType::Vp8, TrackOptions::default())?
            .with_simulcast(layer);
        tracks.push(Arc::new(track));
    }

    let info = room
        .publish_simulcast_track(tracks, TrackPublicationOptions::named(DEMO_TRACK_NAME))
        .await
        .map_err(PublishError::PublishRejected)?;

    info!(track_id = %info.sid, layers = info.layers.len(), "Published demo");
    Ok(info)
}

//! Container framing for reader tracks
//!
//! Splits a byte stream into the samples a track writes to the room:
//! - **H264**: Annex B NAL units (`00 00 01` / `00 00 00 01` start codes)
//! - **VP8**: IVF frames
//! - **Opus**: Ogg pages
//!
//! Only container boundaries are parsed. Payloads are passed through untouched.

use std::io;
use std::time::Duration;

use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::Decoder;

use crate::publish::MimeType;

/// Frame duration used for H264 when neither the caller nor the stream sets one
pub const DEFAULT_H264_FRAME_DURATION: Duration = Duration::from_nanos(1_000_000_000 / 30);
/// Page duration used for Opus when the granule position gives nothing usable
pub const DEFAULT_OPUS_PAGE_DURATION: Duration = Duration::from_millis(20);

/// Upper bound for one buffered sample, guards against streams with no framing
const MAX_SAMPLE_SIZE: usize = 8 * 1024 * 1024;

const IVF_SIGNATURE: &[u8; 4] = b"DKIF";
const IVF_FILE_HEADER_SIZE: usize = 32;
const IVF_FRAME_HEADER_SIZE: usize = 12;

const OGG_CAPTURE_PATTERN: &[u8; 4] = b"OggS";
const OGG_PAGE_HEADER_SIZE: usize = 27;
const OPUS_SAMPLE_RATE: f64 = 48_000.0;

/// One unit of media handed to the room
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub data: Bytes,
    /// How long the sample plays; the writer waits this long before the next one
    pub duration: Duration,
}

fn invalid(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.into())
}

/// Framing decoder selected by mime type
#[derive(Debug)]
pub enum SampleDecoder {
    AnnexB(AnnexBDecoder),
    Ivf(IvfDecoder),
    Ogg(OggDecoder),
}

impl SampleDecoder {
    /// `None` for mime types that are not carried on a media track
    #[must_use]
    pub fn for_mime(mime: MimeType) -> Option<Self> {
        match mime {
            MimeType::H264 => Some(Self::AnnexB(AnnexBDecoder::default())),
            MimeType::Vp8 => Some(Self::Ivf(IvfDecoder::default())),
            MimeType::Opus => Some(Self::Ogg(OggDecoder::default())),
            MimeType::DataByte => None,
        }
    }
}

impl Decoder for SampleDecoder {
    type Item = Sample;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> io::Result<Option<Sample>> {
        match self {
            Self::AnnexB(d) => d.decode(src),
            Self::Ivf(d) => d.decode(src),
            Self::Ogg(d) => d.decode(src),
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> io::Result<Option<Sample>> {
        match self {
            Self::AnnexB(d) => d.decode_eof(src),
            Self::Ivf(d) => d.decode_eof(src),
            Self::Ogg(d) => d.decode_eof(src),
        }
    }
}

/// Locate the next start code at or after `from`.
///
/// Returns the offset of its first byte and its length (3 or 4).
fn find_start_code(data: &[u8], from: usize) -> Option<(usize, usize)> {
    let mut i = from;
    while i + 3 <= data.len() {
        if data[i] == 0 && data[i + 1] == 0 && data[i + 2] == 1 {
            if i > from && data[i - 1] == 0 {
                return Some((i - 1, 4));
            }
            return Some((i, 3));
        }
        i += 1;
    }
    None
}

/// Annex B byte stream to NAL units
#[derive(Debug, Default)]
pub struct AnnexBDecoder {
    _private: (),
}

impl AnnexBDecoder {
    fn sample(nal: Bytes) -> Sample {
        // SEI, SPS, PPS and AUD travel with the next picture
        let duration = match nal.first().map(|b| b & 0x1f) {
            Some(6..=9) => Duration::ZERO,
            _ => DEFAULT_H264_FRAME_DURATION,
        };
        Sample {
            data: nal,
            duration,
        }
    }
}

impl Decoder for AnnexBDecoder {
    type Item = Sample;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> io::Result<Option<Sample>> {
        loop {
            let Some((start, len)) = find_start_code(src, 0) else {
                if src.len() > MAX_SAMPLE_SIZE {
                    return Err(invalid("no H264 start code found"));
                }
                return Ok(None);
            };
            // Drop anything before the first start code
            src.advance(start);

            let Some((next, _)) = find_start_code(src, len) else {
                if src.len() > MAX_SAMPLE_SIZE {
                    return Err(invalid("H264 NAL unit exceeds maximum size"));
                }
                return Ok(None);
            };

            let mut unit = src.split_to(next);
            unit.advance(len);
            if !unit.is_empty() {
                return Ok(Some(Self::sample(unit.freeze())));
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> io::Result<Option<Sample>> {
        if let Some(sample) = self.decode(src)? {
            return Ok(Some(sample));
        }
        let tail = match find_start_code(src, 0) {
            Some((start, len)) => {
                let mut rest = src.split_off(start);
                rest.advance(len);
                rest
            }
            None => BytesMut::new(),
        };
        src.clear();
        if tail.is_empty() {
            Ok(None)
        } else {
            Ok(Some(Self::sample(tail.freeze())))
        }
    }
}

/// IVF container to VP8 frames
#[derive(Debug, Default)]
pub struct IvfDecoder {
    frame_duration: Option<Duration>,
}

impl IvfDecoder {
    /// Frame duration from the file header, once it has been read
    #[must_use]
    pub const fn frame_duration(&self) -> Option<Duration> {
        self.frame_duration
    }

    fn read_header(&mut self, src: &mut BytesMut) -> io::Result<bool> {
        if src.len() < IVF_FILE_HEADER_SIZE {
            return Ok(false);
        }
        if &src[..4] != IVF_SIGNATURE {
            return Err(invalid("missing IVF signature"));
        }
        let denominator = u32::from_le_bytes([src[16], src[17], src[18], src[19]]);
        let numerator = u32::from_le_bytes([src[20], src[21], src[22], src[23]]);
        if denominator == 0 || numerator == 0 {
            return Err(invalid("IVF header has a zero timebase"));
        }
        self.frame_duration = Some(Duration::from_secs_f64(
            f64::from(numerator) / f64::from(denominator),
        ));
        src.advance(IVF_FILE_HEADER_SIZE);
        Ok(true)
    }
}

impl Decoder for IvfDecoder {
    type Item = Sample;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> io::Result<Option<Sample>> {
        let duration = match self.frame_duration {
            Some(d) => d,
            None => {
                if !self.read_header(src)? {
                    return Ok(None);
                }
                self.frame_duration.unwrap_or_default()
            }
        };

        if src.len() < IVF_FRAME_HEADER_SIZE {
            return Ok(None);
        }
        let size = u32::from_le_bytes([src[0], src[1], src[2], src[3]]) as usize;
        if size > MAX_SAMPLE_SIZE {
            return Err(invalid(format!("IVF frame of {size} bytes exceeds maximum size")));
        }
        if src.len() < IVF_FRAME_HEADER_SIZE + size {
            src.reserve(IVF_FRAME_HEADER_SIZE + size - src.len());
            return Ok(None);
        }

        src.advance(IVF_FRAME_HEADER_SIZE);
        Ok(Some(Sample {
            data: src.split_to(size).freeze(),
            duration,
        }))
    }
}

/// Ogg pages carrying Opus
#[derive(Debug, Default)]
pub struct OggDecoder {
    last_granule: u64,
}

impl OggDecoder {
    fn page_duration(&mut self, granule: u64) -> Duration {
        // u64::MAX marks a page on which no packet ends
        if granule == u64::MAX || granule <= self.last_granule {
            return DEFAULT_OPUS_PAGE_DURATION;
        }
        let samples = granule - self.last_granule;
        self.last_granule = granule;
        Duration::from_secs_f64(samples as f64 / OPUS_SAMPLE_RATE)
    }
}

impl Decoder for OggDecoder {
    type Item = Sample;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> io::Result<Option<Sample>> {
        loop {
            if src.len() < OGG_PAGE_HEADER_SIZE {
                return Ok(None);
            }
            if &src[..4] != OGG_CAPTURE_PATTERN {
                return Err(invalid("missing Ogg capture pattern"));
            }

            let segments = src[26] as usize;
            let header_len = OGG_PAGE_HEADER_SIZE + segments;
            if src.len() < header_len {
                return Ok(None);
            }
            let payload_len: usize = src[OGG_PAGE_HEADER_SIZE..header_len]
                .iter()
                .map(|&b| b as usize)
                .sum();
            if src.len() < header_len + payload_len {
                src.reserve(header_len + payload_len - src.len());
                return Ok(None);
            }

            let mut granule = [0u8; 8];
            granule.copy_from_slice(&src[6..14]);
            let granule = u64::from_le_bytes(granule);

            src.advance(header_len);
            let payload = src.split_to(payload_len).freeze();

            // Identification and comment headers carry no audio
            if payload.starts_with(b"OpusHead") || payload.starts_with(b"OpusTags") {
                continue;
            }

            let duration = self.page_duration(granule);
            return Ok(Some(Sample {
                data: payload,
                duration,
            }));
        }
    }
}

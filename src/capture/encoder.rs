//! Segment encoders
//!
//! The built-in container (`video/x-srec`) is a flat sequence of
//! timestamped records behind a 5-byte header:
//!
//! ```text
//! header  := "SREC" version:u8
//! record  := kind:u8 timestamp_ms:u64le payload_len:u32le payload
//! video   := width:u32le height:u32le png_bytes      (kind = 1)
//! audio   := sample_rate:u32le channels:u16le i16le* (kind = 2)
//! ```
//!
//! The header is written together with the first record, so a recording
//! that never produced a frame is zero bytes long.

use anyhow::{bail, Context, Result};

use crate::error::{RecordingError, RecordingResult};
use crate::media::{AudioFrame, VideoFrame};

pub const SREC_MIME: &str = "video/x-srec";
pub const SREC_MAGIC: &[u8; 4] = b"SREC";
pub const SREC_VERSION: u8 = 1;

const KIND_VIDEO: u8 = 1;
const KIND_AUDIO: u8 = 2;
const RECORD_HEADER_LEN: usize = 1 + 8 + 4;

/// Encodes composite frames and mixed audio into timeslice segments
pub trait SegmentEncoder: Send {
    fn mime_type(&self) -> &str;

    fn encode_video(&mut self, frame: &VideoFrame) -> Result<()>;

    fn encode_audio(&mut self, frame: &AudioFrame) -> Result<()>;

    /// Drain everything encoded since the last call. Empty when nothing was encoded.
    fn take_segment(&mut self) -> Vec<u8>;
}

/// Build the encoder for `mime_type`; parameters after `;` are ignored
pub fn encoder_for(mime_type: &str) -> RecordingResult<Box<dyn SegmentEncoder>> {
    let essence = mime_type.split(';').next().unwrap_or("").trim();
    if essence.eq_ignore_ascii_case(SREC_MIME) {
        return Ok(Box::new(FrameContainerEncoder::new()));
    }
    Err(RecordingError::Encoding(format!(
        "unsupported container format: {}",
        mime_type
    )))
}

/// PNG video + PCM audio in the SREC record container
pub struct FrameContainerEncoder {
    pending: Vec<u8>,
    header_written: bool,
    compression: png::Compression,
}

impl Default for FrameContainerEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameContainerEncoder {
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
            header_written: false,
            compression: png::Compression::Fast,
        }
    }

    fn push_record(&mut self, kind: u8, timestamp_ms: u64, payload: &[u8]) -> Result<()> {
        let len = u32::try_from(payload.len()).context("record payload exceeds 4 GiB")?;

        if !self.header_written {
            self.pending.extend_from_slice(SREC_MAGIC);
            self.pending.push(SREC_VERSION);
            self.header_written = true;
        }

        self.pending.reserve(RECORD_HEADER_LEN + payload.len());
        self.pending.push(kind);
        self.pending.extend_from_slice(&timestamp_ms.to_le_bytes());
        self.pending.extend_from_slice(&len.to_le_bytes());
        self.pending.extend_from_slice(payload);
        Ok(())
    }

    fn encode_png(&self, frame: &VideoFrame) -> Result<Vec<u8>> {
        let mut png_bytes = Vec::new();
        let mut encoder = png::Encoder::new(&mut png_bytes, frame.width, frame.height);
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        encoder.set_compression(self.compression);

        let mut writer = encoder.write_header().context("PNG header")?;
        writer.write_image_data(&frame.data).context("PNG image data")?;
        writer.finish().context("PNG finish")?;
        Ok(png_bytes)
    }
}

impl SegmentEncoder for FrameContainerEncoder {
    fn mime_type(&self) -> &str {
        SREC_MIME
    }

    fn encode_video(&mut self, frame: &VideoFrame) -> Result<()> {
        if !frame.is_well_formed() {
            bail!(
                "malformed {}x{} frame with {} bytes",
                frame.width,
                frame.height,
                frame.data.len()
            );
        }

        let png_bytes = self.encode_png(frame)?;
        let mut payload = Vec::with_capacity(8 + png_bytes.len());
        payload.extend_from_slice(&frame.width.to_le_bytes());
        payload.extend_from_slice(&frame.height.to_le_bytes());
        payload.extend_from_slice(&png_bytes);

        self.push_record(KIND_VIDEO, frame.timestamp_ms, &payload)
    }

    fn encode_audio(&mut self, frame: &AudioFrame) -> Result<()> {
        if frame.samples.is_empty() {
            return Ok(());
        }

        let mut payload = Vec::with_capacity(6 + frame.samples.len() * 2);
        payload.extend_from_slice(&frame.sample_rate.to_le_bytes());
        payload.extend_from_slice(&frame.channels.to_le_bytes());
        for sample in &frame.samples {
            payload.extend_from_slice(&sample.to_le_bytes());
        }

        self.push_record(KIND_AUDIO, frame.timestamp_ms, &payload)
    }

    fn take_segment(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.pending)
    }
}

/// A decoded container record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerRecord {
    Video(VideoFrame),
    Audio(AudioFrame),
}

impl ContainerRecord {
    pub fn timestamp_ms(&self) -> u64 {
        match self {
            Self::Video(frame) => frame.timestamp_ms,
            Self::Audio(frame) => frame.timestamp_ms,
        }
    }
}

/// Parse a complete SREC artifact back into records
pub fn decode_records(bytes: &[u8]) -> Result<Vec<ContainerRecord>> {
    if bytes.is_empty() {
        return Ok(Vec::new());
    }
    if bytes.len() < 5 || &bytes[..4] != SREC_MAGIC {
        bail!("missing SREC header");
    }
    if bytes[4] != SREC_VERSION {
        bail!("unsupported SREC version {}", bytes[4]);
    }

    let mut records = Vec::new();
    let mut cursor = 5;

    while cursor < bytes.len() {
        if bytes.len() - cursor < RECORD_HEADER_LEN {
            bail!("truncated record header at offset {}", cursor);
        }
        let kind = bytes[cursor];
        let timestamp_ms = u64::from_le_bytes(read_array(bytes, cursor + 1)?);
        let len = u32::from_le_bytes(read_array(bytes, cursor + 9)?) as usize;
        cursor += RECORD_HEADER_LEN;

        let payload = bytes
            .get(cursor..cursor + len)
            .with_context(|| format!("truncated record payload at offset {}", cursor))?;
        cursor += len;

        let record = match kind {
            KIND_VIDEO => ContainerRecord::Video(decode_video(payload, timestamp_ms)?),
            KIND_AUDIO => ContainerRecord::Audio(decode_audio(payload, timestamp_ms)?),
            other => bail!("unknown record kind {}", other),
        };
        records.push(record);
    }

    Ok(records)
}

fn read_array<const N: usize>(bytes: &[u8], at: usize) -> Result<[u8; N]> {
    let slice = bytes.get(at..at + N).context("unexpected end of data")?;
    let mut out = [0u8; N];
    out.copy_from_slice(slice);
    Ok(out)
}

fn decode_video(payload: &[u8], timestamp_ms: u64) -> Result<VideoFrame> {
    let width = u32::from_le_bytes(read_array(payload, 0)?);
    let height = u32::from_le_bytes(read_array(payload, 4)?);

    let decoder = png::Decoder::new(&payload[8..]);
    let mut reader = decoder.read_info().context("PNG decode error")?;
    let mut buf = vec![0; reader.output_buffer_size()];
    let info = reader.next_frame(&mut buf).context("PNG frame error")?;

    if info.color_type != png::ColorType::Rgba || info.width != width || info.height != height {
        bail!(
            "video record does not match its header ({}x{} {:?})",
            info.width,
            info.height,
            info.color_type
        );
    }
    buf.truncate(info.buffer_size());

    Ok(VideoFrame {
        width,
        height,
        data: buf,
        timestamp_ms,
    })
}

fn decode_audio(payload: &[u8], timestamp_ms: u64) -> Result<AudioFrame> {
    let sample_rate = u32::from_le_bytes(read_array(payload, 0)?);
    let channels = u16::from_le_bytes(read_array(payload, 4)?);
    let body = &payload[6..];
    if body.len() % 2 != 0 {
        bail!("odd-length PCM payload");
    }

    let samples = body
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect();

    Ok(AudioFrame {
        samples,
        sample_rate,
        channels,
        timestamp_ms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nothing_encoded_yields_empty_segment() {
        let mut encoder = FrameContainerEncoder::new();
        assert!(encoder.take_segment().is_empty());
        encoder
            .encode_audio(&AudioFrame::silence(0, 48000, 1, 0))
            .unwrap();
        assert!(encoder.take_segment().is_empty());
    }

    #[test]
    fn test_header_only_in_first_segment() {
        let mut encoder = FrameContainerEncoder::new();
        encoder
            .encode_audio(&AudioFrame::silence(4, 48000, 1, 0))
            .unwrap();
        let first = encoder.take_segment();
        encoder
            .encode_audio(&AudioFrame::silence(4, 48000, 1, 20))
            .unwrap();
        let second = encoder.take_segment();

        assert_eq!(&first[..4], SREC_MAGIC);
        assert_ne!(&second[..4], SREC_MAGIC);

        let mut artifact = first;
        artifact.extend(second);
        let records = decode_records(&artifact).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].timestamp_ms(), 20);
    }

    #[test]
    fn test_video_and_audio_records_decode() {
        let mut encoder = FrameContainerEncoder::new();
        let frame = VideoFrame::solid(3, 2, [1, 2, 3, 255], 33);
        let audio = AudioFrame {
            samples: vec![-5, 0, 7, i16::MAX],
            sample_rate: 48000,
            channels: 2,
            timestamp_ms: 40,
        };
        encoder.encode_video(&frame).unwrap();
        encoder.encode_audio(&audio).unwrap();

        let records = decode_records(&encoder.take_segment()).unwrap();
        assert_eq!(records, vec![ContainerRecord::Video(frame), ContainerRecord::Audio(audio)]);
    }

    #[test]
    fn test_malformed_frame_is_rejected() {
        let mut encoder = FrameContainerEncoder::new();
        let mut frame = VideoFrame::solid(2, 2, [0, 0, 0, 255], 0);
        frame.data.pop();
        assert!(encoder.encode_video(&frame).is_err());
        assert!(encoder.take_segment().is_empty());
    }

    #[test]
    fn test_encoder_for_accepts_parameters_and_rejects_unknown() {
        assert!(encoder_for("video/x-srec; codecs=png,pcm").is_ok());
        assert!(matches!(
            encoder_for("video/webm;codecs=vp8,opus"),
            Err(RecordingError::Encoding(_))
        ));
    }

    #[test]
    fn test_decode_rejects_truncated_data() {
        let mut encoder = FrameContainerEncoder::new();
        encoder
            .encode_audio(&AudioFrame::silence(8, 48000, 1, 0))
            .unwrap();
        let bytes = encoder.take_segment();
        assert!(decode_records(&bytes[..bytes.len() - 3]).is_err());
        assert!(decode_records(b"WEBM").is_err());
    }
}

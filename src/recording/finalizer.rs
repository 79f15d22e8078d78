//! Turn a sealed segment buffer into one persistable artifact

use chrono::Utc;
use std::sync::Arc;
use tracing::info;

use super::state::SessionContext;
use crate::capture::{SegmentBuffer, SREC_MIME};
use crate::error::{RecordingError, RecordingResult};
use crate::storage::ArtifactMetadata;

/// The finished recording: segment bytes in capture order plus metadata.
///
/// Cloning is cheap; the bytes are shared.
#[derive(Debug, Clone)]
pub struct Artifact {
    bytes: Arc<[u8]>,
    metadata: ArtifactMetadata,
}

impl Artifact {
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn metadata(&self) -> &ArtifactMetadata {
        &self.metadata
    }

    pub fn byte_size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

pub struct ArtifactFinalizer;

impl ArtifactFinalizer {
    /// Concatenate every segment in arrival order.
    ///
    /// The buffer must be sealed so nothing can be appended behind the
    /// artifact's back, and must hold at least one segment.
    pub fn finalize(
        buffer: &SegmentBuffer,
        duration_seconds: u64,
        mime_type: &str,
        context: &SessionContext,
    ) -> RecordingResult<Artifact> {
        if !buffer.is_sealed() {
            return Err(RecordingError::state("segment buffer is still accepting data"));
        }
        if buffer.is_empty() {
            return Err(RecordingError::EmptyRecording);
        }

        let bytes: Arc<[u8]> = buffer.concat().into();
        let created_at = Utc::now();
        let filename = format!(
            "session-{}.{}",
            created_at.timestamp_millis(),
            extension_for(mime_type)
        );

        let metadata = ArtifactMetadata {
            duration_seconds,
            byte_size: bytes.len() as u64,
            created_at,
            owner_id: context.owner_id.clone(),
            label: context.label.clone(),
            filename,
            mime_type: mime_type.to_string(),
        };

        info!(
            "Finalized {}: {} segments, {}, {}",
            metadata.filename,
            buffer.len(),
            format_size(metadata.byte_size),
            format_duration(duration_seconds)
        );

        Ok(Artifact { bytes, metadata })
    }
}

/// File extension for a container MIME type
pub fn extension_for(mime_type: &str) -> &'static str {
    let essence = mime_type.split(';').next().unwrap_or("").trim();
    match essence {
        SREC_MIME => "srec",
        "video/webm" | "audio/webm" => "webm",
        "video/mp4" => "mp4",
        _ => "bin",
    }
}

/// `MM:SS`, minutes keep counting past the hour
pub fn format_duration(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

/// Megabytes with one decimal, e.g. `"1.5 MB"`
pub fn format_size(bytes: u64) -> String {
    format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sealed(segments: &[&[u8]]) -> SegmentBuffer {
        let mut buffer = SegmentBuffer::new();
        for segment in segments {
            buffer.append(segment.to_vec());
        }
        buffer.seal();
        buffer
    }

    #[test]
    fn test_artifact_is_ordered_concatenation() {
        let context = SessionContext::new("owner", "intake");
        let buffer = sealed(&[b"one", b"", b"two", b"three"]);

        let artifact = ArtifactFinalizer::finalize(&buffer, 7, SREC_MIME, &context).unwrap();

        assert_eq!(artifact.bytes(), b"onetwothree");
        assert_eq!(artifact.byte_size(), 11);
        assert_eq!(artifact.metadata().byte_size, buffer.total_bytes() as u64);
        assert_eq!(artifact.metadata().duration_seconds, 7);
        assert_eq!(artifact.metadata().owner_id, "owner");
        assert!(artifact.metadata().filename.starts_with("session-"));
        assert!(artifact.metadata().filename.ends_with(".srec"));
    }

    #[test]
    fn test_empty_buffer_is_empty_recording() {
        let context = SessionContext::new("owner", "intake");
        let buffer = sealed(&[b""]);
        assert!(matches!(
            ArtifactFinalizer::finalize(&buffer, 0, SREC_MIME, &context),
            Err(RecordingError::EmptyRecording)
        ));
    }

    #[test]
    fn test_unsealed_buffer_is_refused() {
        let context = SessionContext::new("owner", "intake");
        let mut buffer = SegmentBuffer::new();
        buffer.append(vec![1]);
        assert!(matches!(
            ArtifactFinalizer::finalize(&buffer, 1, SREC_MIME, &context),
            Err(RecordingError::State(_))
        ));
    }

    #[test]
    fn test_display_formats() {
        assert_eq!(format_duration(0), "00:00");
        assert_eq!(format_duration(754), "12:34");
        assert_eq!(format_duration(3600), "60:00");
        assert_eq!(format_size(0), "0.0 MB");
        assert_eq!(format_size(2 * 1024 * 1024 + 300 * 1024), "2.3 MB");
        assert_eq!(extension_for("video/webm;codecs=vp8,opus"), "webm");
    }
}

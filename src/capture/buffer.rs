//! Ordered, append-only store of captured segments

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, warn};

/// One timeslice worth of encoded output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    sequence: u64,
    data: Vec<u8>,
}

impl Segment {
    /// Position in capture order, starting at 0
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }
}

/// Segments in the order the encoder emitted them.
///
/// Zero-length data is never stored. Once sealed, appends are refused so a
/// late flush cannot extend a finished recording.
#[derive(Debug, Default)]
pub struct SegmentBuffer {
    segments: Vec<Segment>,
    total_bytes: usize,
    dropped_empty: u64,
    sealed: bool,
}

/// Buffer shared between the capture task (writer) and the controller
pub type SharedSegmentBuffer = Arc<Mutex<SegmentBuffer>>;

impl SegmentBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedSegmentBuffer {
        Arc::new(Mutex::new(Self::new()))
    }

    /// Append a segment, returning its sequence number if it was kept
    pub fn append(&mut self, data: Vec<u8>) -> Option<u64> {
        if self.sealed {
            warn!("Dropping {} byte segment: buffer is sealed", data.len());
            return None;
        }
        if data.is_empty() {
            self.dropped_empty += 1;
            return None;
        }

        let sequence = self.segments.len() as u64;
        self.total_bytes += data.len();
        debug!("Segment {} appended ({} bytes)", sequence, data.len());
        self.segments.push(Segment { sequence, data });
        Some(sequence)
    }

    pub fn seal(&mut self) {
        self.sealed = true;
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    /// Empty timeslices that were discarded
    pub fn dropped_empty(&self) -> u64 {
        self.dropped_empty
    }

    pub fn iter(&self) -> impl Iterator<Item = &Segment> {
        self.segments.iter()
    }

    /// All segment bytes joined in capture order
    pub fn concat(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.total_bytes);
        for segment in &self.segments {
            out.extend_from_slice(&segment.data);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_data_is_not_stored() {
        let mut buffer = SegmentBuffer::new();
        assert_eq!(buffer.append(vec![]), None);
        assert_eq!(buffer.append(vec![1, 2]), Some(0));
        assert_eq!(buffer.append(vec![]), None);
        assert_eq!(buffer.append(vec![3]), Some(1));

        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.dropped_empty(), 2);
        assert!(buffer.iter().all(|s| !s.is_empty()));
    }

    #[test]
    fn test_concat_preserves_capture_order() {
        let mut buffer = SegmentBuffer::new();
        buffer.append(b"ab".to_vec());
        buffer.append(b"cde".to_vec());
        buffer.append(b"f".to_vec());

        assert_eq!(buffer.concat(), b"abcdef");
        assert_eq!(buffer.total_bytes(), 6);
        let sequences: Vec<u64> = buffer.iter().map(|s| s.sequence()).collect();
        assert_eq!(sequences, vec![0, 1, 2]);
    }

    #[test]
    fn test_sealed_buffer_refuses_appends() {
        let mut buffer = SegmentBuffer::new();
        buffer.append(vec![1]);
        buffer.seal();

        assert_eq!(buffer.append(vec![2]), None);
        assert_eq!(buffer.len(), 1);
        assert!(buffer.is_sealed());
    }
}

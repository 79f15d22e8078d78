//! Segment capture: encode the composite stream into ordered timeslices

pub mod buffer;
pub mod encoder;
pub mod engine;

pub use buffer::{Segment, SegmentBuffer, SharedSegmentBuffer};
pub use encoder::{decode_records, encoder_for, ContainerRecord, FrameContainerEncoder, SegmentEncoder, SREC_MIME};
pub use engine::{CaptureConfig, CaptureStats, SegmentCaptureEngine};

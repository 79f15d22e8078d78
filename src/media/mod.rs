//! Participant media: tracks, streams, local device acquisition

pub mod acquirer;
pub mod synthetic;
pub mod track;

pub use acquirer::{LocalMediaAcquirer, MediaConstraints, MediaDevices};
pub use synthetic::{SyntheticDevices, SyntheticPattern};
pub use track::{AudioFrame, AudioTrack, MediaStreamHandle, VideoFrame, VideoTrack};

pub mod audio;
pub mod capture;
pub mod config;
pub mod error;
pub mod events;
pub mod http;
pub mod media;
pub mod nats;
pub mod recording;
pub mod resources;
pub mod storage;
pub mod transport;
pub mod video;

pub use audio::{AudioMixGraph, MixReport, MixerConfig};
pub use capture::{CaptureConfig, SegmentBuffer, SegmentCaptureEngine};
pub use config::Config;
pub use error::{RecordingError, RecordingResult};
pub use events::SessionEvent;
pub use http::{create_router, AppState};
pub use media::{LocalMediaAcquirer, MediaStreamHandle, SyntheticDevices, SyntheticPattern};
pub use nats::{NatsClient, SessionEventMessage};
pub use recording::{
    Artifact, ArtifactFinalizer, ControllerConfig, RecordingController, RecordingState,
    SessionContext, StopOutcome, StopTrigger,
};
pub use resources::{ResourceLedger, ResourceSnapshot};
pub use storage::{ArtifactMetadata, PersistenceBackend, StoredRecording};
pub use transport::{LoopbackTransport, RealtimeMediaTransport};
pub use video::{CompositorConfig, FrameCompositor};


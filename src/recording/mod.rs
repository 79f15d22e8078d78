pub mod controller;
pub mod finalizer;
pub mod state;
pub mod timer;

pub use controller::{ControllerConfig, RecordingController, SessionStatus};
pub use finalizer::{Artifact, ArtifactFinalizer};
pub use state::{RecordingState, SessionContext, StopOutcome, StopTrigger};
pub use timer::DurationTimer;

//! Recording: capture session, endpoint keys and the engine that turns
//! forwarded traffic into stubs

mod engine;
mod key;
mod session;

pub use engine::{captured_stub_id, RecordingEngine, StopOutcome, CAPTURE_ID_PREFIX};
pub use key::{endpoint_key, UNKNOWN_KEY};
pub use session::{
    CaptureSession, CaptureStatus, CaptureSummary, CaptureTarget, RecordingOptions, Transition,
};

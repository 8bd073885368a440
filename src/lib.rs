pub mod camera;
pub mod config;
pub mod detector;
pub mod error;
pub mod frame;
pub mod pipeline;
pub mod policy;
pub mod ui;
pub mod watch;

pub use camera::{CameraStream, HttpCamera, StreamSettings};
pub use config::HelmwatchConfig;
pub use detector::{Detection, DetectionClient, DetectionResult, Detector};
pub use error::{CameraError, HelmwatchError, Result};
pub use frame::{CaptureSize, FramePayload, RawFrame};
pub use policy::{evaluate, AlertDecision, Severity};
pub use ui::{AlertOptions, ConsoleUi, DismissTimer, UiSink};
pub use watch::CaptureLoop;

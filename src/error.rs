use thiserror::Error;

#[derive(Error, Debug)]
pub enum HelmwatchError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

impl HelmwatchError {
    pub fn component<C: Into<String>, M: Into<String>>(component: C, message: M) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }
}

/// Camera acquisition and streaming failures. Acquisition errors leave the
/// capture loop idle; stream errors are recovered per tick.
#[derive(Error, Debug)]
pub enum CameraError {
    #[error("Camera acquisition failed: {details}")]
    Acquisition { details: String },

    #[error("Camera stream error: {details}")]
    Stream { details: String },

    #[error("Camera stream ended")]
    Disconnected,
}

pub type Result<T> = std::result::Result<T, HelmwatchError>;

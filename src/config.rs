use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HelmwatchConfig {
    pub detector: DetectorConfig,
    pub camera: CameraConfig,
    pub capture: CaptureConfig,
    pub alert: AlertConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DetectorConfig {
    /// Detection service endpoint receiving multipart frame uploads
    #[serde(default = "default_detector_endpoint")]
    pub endpoint: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CameraConfig {
    /// Camera URL (multipart MJPEG stream or single-JPEG snapshot endpoint)
    #[serde(default = "default_camera_url")]
    pub url: String,

    /// Capture period in milliseconds while watching
    #[serde(default = "default_camera_interval_ms")]
    pub interval_ms: u64,

    /// Resolution assumed when the stream does not report one (width, height)
    #[serde(default = "default_camera_fallback_resolution")]
    pub fallback_resolution: (u32, u32),
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CaptureConfig {
    /// Target width for re-encoded video frames
    #[serde(default = "default_capture_target_width")]
    pub target_width: u32,

    /// Height used when source dimensions are unavailable
    #[serde(default = "default_capture_fallback_height")]
    pub fallback_height: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AlertConfig {
    /// How long a raised alert stays up before auto-dismissal, in milliseconds
    #[serde(default = "default_alert_duration_ms")]
    pub duration_ms: u64,

    /// Render alerts in compact form
    #[serde(default = "default_alert_compact")]
    pub compact: bool,

    /// Ring the terminal bell when an alert fires
    #[serde(default = "default_alert_play_sound")]
    pub play_sound: bool,
}

impl HelmwatchConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("helmwatch.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            // Start with default values
            .set_default("detector.endpoint", default_detector_endpoint())?
            .set_default("camera.url", default_camera_url())?
            .set_default("camera.interval_ms", default_camera_interval_ms())?
            .set_default(
                "camera.fallback_resolution",
                vec![
                    default_camera_fallback_resolution().0,
                    default_camera_fallback_resolution().1,
                ],
            )?
            .set_default("capture.target_width", default_capture_target_width())?
            .set_default("capture.fallback_height", default_capture_fallback_height())?
            .set_default("alert.duration_ms", default_alert_duration_ms())?
            .set_default("alert.compact", default_alert_compact())?
            .set_default("alert.play_sound", default_alert_play_sound())?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // Add environment variables with HELMWATCH_ prefix
            .add_source(Environment::with_prefix("HELMWATCH").separator("_"))
            .build()?;

        let config: HelmwatchConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.detector.endpoint.is_empty() {
            return Err(ConfigError::Message(
                "Detector endpoint must not be empty".to_string(),
            ));
        }

        if reqwest::Url::parse(&self.detector.endpoint).is_err() {
            return Err(ConfigError::Message(format!(
                "Detector endpoint is not a valid URL: {}",
                self.detector.endpoint
            )));
        }

        if self.camera.interval_ms == 0 {
            return Err(ConfigError::Message(
                "Camera interval_ms must be greater than 0".to_string(),
            ));
        }

        if self.camera.fallback_resolution.0 == 0 || self.camera.fallback_resolution.1 == 0 {
            return Err(ConfigError::Message(
                "Camera fallback resolution must be greater than 0".to_string(),
            ));
        }

        if self.capture.target_width == 0 {
            return Err(ConfigError::Message(
                "Capture target_width must be greater than 0".to_string(),
            ));
        }

        if self.capture.fallback_height == 0 {
            return Err(ConfigError::Message(
                "Capture fallback_height must be greater than 0".to_string(),
            ));
        }

        if self.alert.duration_ms == 0 {
            return Err(ConfigError::Message(
                "Alert duration_ms must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for HelmwatchConfig {
    fn default() -> Self {
        Self {
            detector: DetectorConfig {
                endpoint: default_detector_endpoint(),
            },
            camera: CameraConfig {
                url: default_camera_url(),
                interval_ms: default_camera_interval_ms(),
                fallback_resolution: default_camera_fallback_resolution(),
            },
            capture: CaptureConfig {
                target_width: default_capture_target_width(),
                fallback_height: default_capture_fallback_height(),
            },
            alert: AlertConfig {
                duration_ms: default_alert_duration_ms(),
                compact: default_alert_compact(),
                play_sound: default_alert_play_sound(),
            },
        }
    }
}

fn default_detector_endpoint() -> String {
    "http://127.0.0.1:8000/detect".to_string()
}

fn default_camera_url() -> String {
    "http://127.0.0.1:8080/stream".to_string()
}

fn default_camera_interval_ms() -> u64 {
    800
}

fn default_camera_fallback_resolution() -> (u32, u32) {
    (640, 480)
}

fn default_capture_target_width() -> u32 {
    640
}

fn default_capture_fallback_height() -> u32 {
    480
}

fn default_alert_duration_ms() -> u64 {
    4000
}

fn default_alert_compact() -> bool {
    false
}

fn default_alert_play_sound() -> bool {
    true
}

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::DetectorConfig;
use crate::error::{HelmwatchError, Result};
use crate::frame::FramePayload;

/// Generic message for transport and parse failures
pub const DETECTION_FAILED: &str = "Detection failed";

/// Multipart field and filename expected by the detection service
const UPLOAD_FIELD: &str = "file";
const UPLOAD_FILENAME: &str = "frame.png";

/// A single object reported by the detection service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Free-form model label; matched case-insensitively downstream
    pub label: String,
    #[serde(default)]
    pub confidence: Option<f32>,
    /// Bounding box as [x1, y1, x2, y2]
    #[serde(default)]
    pub bbox: Option<[f32; 4]>,
}

/// Normalized detection service response.
///
/// The union is exhaustive over the known wire formats; supporting a new
/// format means adding a variant here and an arm to `interpret_response`.
#[derive(Debug, Clone, PartialEq)]
pub enum DetectionResult {
    /// Modern JSON shape: optional annotated image plus structured detections
    Annotated {
        image: Option<Vec<u8>>,
        detections: Vec<Detection>,
    },
    /// Legacy shape: the body is the annotated image, helmet presence comes
    /// from a response header when the server supplies it
    LegacyFlag {
        image: Vec<u8>,
        helmet_present: Option<bool>,
    },
    /// Transport, status, or parse failure
    Failure { message: String },
}

impl DetectionResult {
    fn failure<S: Into<String>>(message: S) -> Self {
        Self::Failure {
            message: message.into(),
        }
    }
}

/// Wire shape of the JSON response body
#[derive(Debug, Deserialize)]
struct DetectBody {
    image: Option<String>,
    #[serde(default)]
    detections: Vec<Detection>,
}

/// Detection submission seam. The HTTP client implements this; tests and
/// alternative backends provide their own.
#[async_trait]
pub trait Detector: Send + Sync {
    /// Submit one frame payload.
    ///
    /// Never fails from the caller's perspective: every transport or parse
    /// error folds into `DetectionResult::Failure`.
    async fn submit(&self, payload: FramePayload) -> DetectionResult;
}

/// HTTP client for the remote detection service
#[derive(Debug, Clone)]
pub struct DetectionClient {
    http: reqwest::Client,
    endpoint: reqwest::Url,
}

impl DetectionClient {
    pub fn new(endpoint: reqwest::Url) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint,
        }
    }

    pub fn from_config(config: &DetectorConfig) -> Result<Self> {
        let endpoint = reqwest::Url::parse(&config.endpoint).map_err(|e| {
            HelmwatchError::component(
                "detector",
                format!("invalid endpoint {}: {}", config.endpoint, e),
            )
        })?;
        Ok(Self::new(endpoint))
    }

    pub fn endpoint(&self) -> &reqwest::Url {
        &self.endpoint
    }
}

#[async_trait]
impl Detector for DetectionClient {
    async fn submit(&self, payload: FramePayload) -> DetectionResult {
        let part = match Part::bytes(payload.bytes)
            .file_name(UPLOAD_FILENAME)
            .mime_str("image/png")
        {
            Ok(part) => part,
            Err(e) => {
                warn!("Failed to build upload part: {}", e);
                return DetectionResult::failure(DETECTION_FAILED);
            }
        };
        let form = Form::new().part(UPLOAD_FIELD, part);

        let response = match self
            .http
            .post(self.endpoint.clone())
            .multipart(form)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!("Detection request failed: {}", e);
                return DetectionResult::failure(DETECTION_FAILED);
            }
        };

        let status = response.status();
        let content_type = header_str(&response, reqwest::header::CONTENT_TYPE.as_str());
        let helmet_header = header_str(&response, "helmet");

        let body = match response.bytes().await {
            Ok(body) => body,
            Err(e) => {
                warn!("Failed to read detection response body: {}", e);
                return DetectionResult::failure(DETECTION_FAILED);
            }
        };

        interpret_response(
            status,
            content_type.as_deref(),
            helmet_header.as_deref(),
            &body,
        )
    }
}

fn header_str(response: &reqwest::Response, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
}

/// Decode a detection service response into the result union.
///
/// Dispatch keys on the declared content type, case-insensitively:
/// `application/json` is the modern shape, any image type is the legacy
/// annotated-image shape, anything else is a failure. Non-2xx responses
/// capture the body text as error detail.
pub fn interpret_response(
    status: StatusCode,
    content_type: Option<&str>,
    helmet_header: Option<&str>,
    body: &[u8],
) -> DetectionResult {
    if !status.is_success() {
        let detail = String::from_utf8_lossy(body);
        let detail = detail.trim();
        let message = if detail.is_empty() {
            format!("Detection service returned {}", status)
        } else {
            format!("Detection service returned {}: {}", status, detail)
        };
        return DetectionResult::Failure { message };
    }

    let declared = content_type.unwrap_or("").to_lowercase();

    if declared.starts_with("application/json") {
        let parsed: DetectBody = match serde_json::from_slice(body) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("Malformed JSON detection response: {}", e);
                return DetectionResult::failure(DETECTION_FAILED);
            }
        };

        let image = match parsed.image {
            Some(encoded) => match BASE64.decode(encoded.as_bytes()) {
                Ok(bytes) => Some(bytes),
                Err(e) => {
                    warn!("Annotated image field is not valid base64: {}", e);
                    return DetectionResult::failure(DETECTION_FAILED);
                }
            },
            None => None,
        };

        debug!("Parsed {} detection(s)", parsed.detections.len());
        return DetectionResult::Annotated {
            image,
            detections: parsed.detections,
        };
    }

    if declared.starts_with("image/") || declared.contains("png") || declared.contains("jpeg") {
        return DetectionResult::LegacyFlag {
            image: body.to_vec(),
            helmet_present: helmet_header.and_then(parse_helmet_flag),
        };
    }

    DetectionResult::Failure {
        message: format!(
            "Unrecognized response content type: {}",
            if declared.is_empty() {
                "(none)"
            } else {
                declared.as_str()
            }
        ),
    }
}

/// Parse the legacy `helmet` header. Unrecognized values yield no decision.
fn parse_helmet_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn json_body(image: Option<&[u8]>, labels: &[&str]) -> Vec<u8> {
        let detections: Vec<serde_json::Value> = labels
            .iter()
            .map(|label| serde_json::json!({ "label": label }))
            .collect();
        let mut body = serde_json::json!({ "detections": detections });
        if let Some(bytes) = image {
            body["image"] = serde_json::Value::String(BASE64.encode(bytes));
        }
        serde_json::to_vec(&body).unwrap()
    }

    #[test]
    fn test_json_response_round_trips_image_and_detections() {
        let annotated = vec![9u8, 8, 7, 6, 5];
        let body = json_body(Some(&annotated), &["no_helmet", "person"]);

        let result = interpret_response(
            StatusCode::OK,
            Some("application/json"),
            None,
            &body,
        );

        match result {
            DetectionResult::Annotated { image, detections } => {
                assert_eq!(image.as_deref(), Some(annotated.as_slice()));
                let labels: Vec<&str> =
                    detections.iter().map(|d| d.label.as_str()).collect();
                assert_eq!(labels, vec!["no_helmet", "person"]);
            }
            other => panic!("expected Annotated, got {:?}", other),
        }
    }

    #[test]
    fn test_json_content_type_match_is_case_insensitive() {
        let body = json_body(None, &[]);
        let result = interpret_response(
            StatusCode::OK,
            Some("Application/JSON; charset=utf-8"),
            None,
            &body,
        );
        assert!(matches!(result, DetectionResult::Annotated { .. }));
    }

    #[test]
    fn test_json_response_defaults_missing_fields() {
        let result = interpret_response(
            StatusCode::OK,
            Some("application/json"),
            None,
            b"{}",
        );
        match result {
            DetectionResult::Annotated { image, detections } => {
                assert!(image.is_none());
                assert!(detections.is_empty());
            }
            other => panic!("expected Annotated, got {:?}", other),
        }
    }

    #[test]
    fn test_detection_extra_fields_are_ignored() {
        let body = br#"{"detections": [{"label": "person", "confidence": 0.93, "bbox": [1.0, 2.0, 3.0, 4.0], "track_id": 7}]}"#;
        let result =
            interpret_response(StatusCode::OK, Some("application/json"), None, body);
        match result {
            DetectionResult::Annotated { detections, .. } => {
                assert_eq!(detections.len(), 1);
                assert_eq!(detections[0].confidence, Some(0.93));
                assert_eq!(detections[0].bbox, Some([1.0, 2.0, 3.0, 4.0]));
            }
            other => panic!("expected Annotated, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_json_is_a_failure() {
        let result = interpret_response(
            StatusCode::OK,
            Some("application/json"),
            None,
            b"{not json",
        );
        assert_eq!(result, DetectionResult::failure(DETECTION_FAILED));
    }

    #[test]
    fn test_invalid_base64_image_is_a_failure() {
        let result = interpret_response(
            StatusCode::OK,
            Some("application/json"),
            None,
            br#"{"image": "!!! not base64 !!!"}"#,
        );
        assert_eq!(result, DetectionResult::failure(DETECTION_FAILED));
    }

    #[test]
    fn test_legacy_response_with_helmet_header() {
        let body = vec![1u8, 2, 3];

        for (value, expected) in [
            ("true", Some(true)),
            ("TRUE", Some(true)),
            ("1", Some(true)),
            ("false", Some(false)),
            ("0", Some(false)),
            ("maybe", None),
        ] {
            let result = interpret_response(
                StatusCode::OK,
                Some("image/png"),
                Some(value),
                &body,
            );
            match result {
                DetectionResult::LegacyFlag {
                    image,
                    helmet_present,
                } => {
                    assert_eq!(image, body);
                    assert_eq!(helmet_present, expected, "header value {:?}", value);
                }
                other => panic!("expected LegacyFlag, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_legacy_response_without_header_has_no_decision() {
        let result =
            interpret_response(StatusCode::OK, Some("image/jpeg"), None, b"jpegbytes");
        assert_eq!(
            result,
            DetectionResult::LegacyFlag {
                image: b"jpegbytes".to_vec(),
                helmet_present: None,
            }
        );
    }

    #[test]
    fn test_legacy_content_type_variants() {
        for content_type in ["image/png", "IMAGE/JPEG", "application/png"] {
            let result =
                interpret_response(StatusCode::OK, Some(content_type), None, b"x");
            assert!(
                matches!(result, DetectionResult::LegacyFlag { .. }),
                "content type {:?} should be legacy",
                content_type
            );
        }
    }

    #[test]
    fn test_unrecognized_content_type_is_a_failure() {
        let result =
            interpret_response(StatusCode::OK, Some("text/html"), None, b"<html>");
        match result {
            DetectionResult::Failure { message } => {
                assert!(message.contains("text/html"));
            }
            other => panic!("expected Failure, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_content_type_is_a_failure() {
        let result = interpret_response(StatusCode::OK, None, None, b"");
        assert!(matches!(result, DetectionResult::Failure { .. }));
    }

    #[test]
    fn test_non_success_status_captures_body_text() {
        let result = interpret_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            Some("application/json"),
            None,
            b"model not loaded",
        );
        match result {
            DetectionResult::Failure { message } => {
                assert!(message.contains("model not loaded"));
                assert!(message.contains("500"));
            }
            other => panic!("expected Failure, got {:?}", other),
        }
    }

    #[test]
    fn test_non_success_status_with_empty_body() {
        let result =
            interpret_response(StatusCode::BAD_GATEWAY, Some("text/plain"), None, b"");
        match result {
            DetectionResult::Failure { message } => {
                assert!(message.contains("502"));
            }
            other => panic!("expected Failure, got {:?}", other),
        }
    }

    #[test]
    fn test_client_rejects_invalid_endpoint() {
        let config = crate::config::DetectorConfig {
            endpoint: "not a url".to_string(),
        };
        assert!(DetectionClient::from_config(&config).is_err());
    }
}

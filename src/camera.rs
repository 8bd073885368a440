use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::config::CameraConfig;
use crate::error::CameraError;
use crate::frame::RawFrame;

/// Upper bound on a single buffered JPEG frame
const MAX_JPEG_BYTES: usize = 5 * 1024 * 1024;

/// Negotiated stream properties
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSettings {
    pub width: u32,
    pub height: u32,
}

/// A live camera feed. Exclusively owned by the active capture session;
/// no other component may read or mutate it.
#[async_trait]
pub trait CameraStream: Send {
    /// Negotiated stream settings, when the source reports them
    fn settings(&self) -> Option<StreamSettings>;

    /// Pull the next decoded frame
    async fn next_frame(&mut self) -> Result<RawFrame, CameraError>;

    /// Release the underlying source. Further frames will fail.
    async fn stop(&mut self);
}

enum HttpMode {
    /// Multipart MJPEG: the response stays open and frames are scanned out
    /// of the byte stream
    Mjpeg {
        response: reqwest::Response,
        buffer: Vec<u8>,
    },
    /// Snapshot endpoint: refetch per frame
    Snapshot,
}

/// HTTP camera source speaking either multipart MJPEG or single-JPEG
/// snapshot, depending on what the endpoint serves.
pub struct HttpCamera {
    http: reqwest::Client,
    url: reqwest::Url,
    mode: Option<HttpMode>,
    settings: Option<StreamSettings>,
    pending: Option<RawFrame>,
}

impl HttpCamera {
    /// Connect to the camera endpoint and negotiate stream settings from
    /// the first decoded frame.
    pub async fn acquire(config: &CameraConfig) -> Result<Self, CameraError> {
        let url = reqwest::Url::parse(&config.url).map_err(|e| CameraError::Acquisition {
            details: format!("invalid camera url {}: {}", config.url, e),
        })?;

        let http = reqwest::Client::new();
        let response = http
            .get(url.clone())
            .send()
            .await
            .map_err(|e| CameraError::Acquisition {
                details: format!("connect to {}: {}", url, e),
            })?;

        if !response.status().is_success() {
            return Err(CameraError::Acquisition {
                details: format!("camera endpoint returned {}", response.status()),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("")
            .to_lowercase();

        let mut camera = if content_type.contains("multipart") {
            debug!("Camera endpoint serves multipart MJPEG");
            Self {
                http,
                url,
                mode: Some(HttpMode::Mjpeg {
                    response,
                    buffer: Vec::with_capacity(64 * 1024),
                }),
                settings: None,
                pending: None,
            }
        } else {
            debug!("Camera endpoint serves single-JPEG snapshots");
            let body = response.bytes().await.map_err(|e| CameraError::Acquisition {
                details: format!("read camera snapshot: {}", e),
            })?;
            let frame = decode_frame(&body).map_err(|e| CameraError::Acquisition {
                details: format!("decode camera snapshot: {}", e),
            })?;
            Self {
                http,
                url,
                mode: Some(HttpMode::Snapshot),
                settings: None,
                pending: Some(frame),
            }
        };

        if camera.pending.is_none() {
            let frame = camera.read_frame().await.map_err(|e| CameraError::Acquisition {
                details: format!("read first frame: {}", e),
            })?;
            camera.pending = Some(frame);
        }

        if let Some(frame) = &camera.pending {
            camera.settings = Some(StreamSettings {
                width: frame.width,
                height: frame.height,
            });
        }

        info!(
            "Camera acquired: {} ({}x{})",
            camera.url,
            camera.settings.map(|s| s.width).unwrap_or(0),
            camera.settings.map(|s| s.height).unwrap_or(0)
        );

        Ok(camera)
    }

    async fn read_frame(&mut self) -> Result<RawFrame, CameraError> {
        match self.mode.as_mut() {
            Some(HttpMode::Mjpeg { response, buffer }) => {
                let jpeg = next_mjpeg_frame(response, buffer).await?;
                decode_frame(&jpeg)
            }
            Some(HttpMode::Snapshot) => {
                let response = self
                    .http
                    .get(self.url.clone())
                    .send()
                    .await
                    .map_err(|e| CameraError::Stream {
                        details: format!("fetch snapshot: {}", e),
                    })?;
                if !response.status().is_success() {
                    return Err(CameraError::Stream {
                        details: format!("snapshot endpoint returned {}", response.status()),
                    });
                }
                let body = response.bytes().await.map_err(|e| CameraError::Stream {
                    details: format!("read snapshot body: {}", e),
                })?;
                decode_frame(&body)
            }
            None => Err(CameraError::Disconnected),
        }
    }
}

#[async_trait]
impl CameraStream for HttpCamera {
    fn settings(&self) -> Option<StreamSettings> {
        self.settings
    }

    async fn next_frame(&mut self) -> Result<RawFrame, CameraError> {
        if let Some(frame) = self.pending.take() {
            return Ok(frame);
        }
        self.read_frame().await
    }

    async fn stop(&mut self) {
        // Dropping the open response closes the connection
        if self.mode.take().is_some() {
            debug!("Camera stream released: {}", self.url);
        }
        self.pending = None;
    }
}

/// Pull bytes off the open MJPEG response until a complete JPEG is buffered.
async fn next_mjpeg_frame(
    response: &mut reqwest::Response,
    buffer: &mut Vec<u8>,
) -> Result<Vec<u8>, CameraError> {
    loop {
        if let Some((start, end)) = jpeg_bounds(buffer) {
            let frame = buffer[start..end].to_vec();
            buffer.drain(..end);
            return Ok(frame);
        }

        let chunk = response.chunk().await.map_err(|e| CameraError::Stream {
            details: format!("read mjpeg chunk: {}", e),
        })?;
        match chunk {
            Some(chunk) => buffer.extend_from_slice(&chunk),
            None => return Err(CameraError::Disconnected),
        }

        if buffer.len() > MAX_JPEG_BYTES {
            warn!("MJPEG buffer exceeded {} bytes without a frame", MAX_JPEG_BYTES);
            buffer.clear();
            return Err(CameraError::Stream {
                details: "mjpeg frame exceeded maximum size".to_string(),
            });
        }
    }
}

/// Locate a complete JPEG (SOI..EOI inclusive) in the buffer.
fn jpeg_bounds(buffer: &[u8]) -> Option<(usize, usize)> {
    let start = buffer.windows(2).position(|w| w == [0xFF, 0xD8])?;
    let end = buffer[start + 2..]
        .windows(2)
        .position(|w| w == [0xFF, 0xD9])?;
    Some((start, start + 2 + end + 2))
}

fn decode_frame(bytes: &[u8]) -> Result<RawFrame, CameraError> {
    let image = image::load_from_memory(bytes).map_err(|e| CameraError::Stream {
        details: format!("decode frame: {}", e),
    })?;
    let rgb = image.to_rgb8();
    let (width, height) = rgb.dimensions();
    Ok(RawFrame::new(rgb.into_raw(), width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jpeg_bounds_finds_complete_frame() {
        let buffer = [0x00, 0xFF, 0xD8, 0xAA, 0xBB, 0xFF, 0xD9, 0x01];
        let (start, end) = jpeg_bounds(&buffer).expect("frame present");
        assert_eq!(start, 1);
        assert_eq!(end, 7);
        assert_eq!(&buffer[start..end], &[0xFF, 0xD8, 0xAA, 0xBB, 0xFF, 0xD9]);
    }

    #[test]
    fn test_jpeg_bounds_requires_both_markers() {
        assert!(jpeg_bounds(&[0xFF, 0xD8, 0xAA, 0xBB]).is_none());
        assert!(jpeg_bounds(&[0xAA, 0xBB, 0xFF, 0xD9]).is_none());
        assert!(jpeg_bounds(&[]).is_none());
    }

    #[test]
    fn test_jpeg_bounds_ignores_leading_garbage() {
        let mut buffer = vec![0x12u8; 32];
        buffer.extend_from_slice(&[0xFF, 0xD8, 0x00, 0xFF, 0xD9]);
        let (start, end) = jpeg_bounds(&buffer).expect("frame present");
        assert_eq!(start, 32);
        assert_eq!(end, buffer.len());
    }

    #[test]
    fn test_decode_frame_rejects_garbage() {
        assert!(decode_frame(b"not a jpeg").is_err());
    }

    #[test]
    fn test_decode_frame_reads_png() {
        // PNG decodes through the same path as JPEG
        let raw = RawFrame::new(vec![10u8; 6 * 2 * 3], 6, 2);
        let png = crate::frame::encode_png(
            &raw,
            crate::frame::CaptureSize { width: 6, height: 2 },
        )
        .unwrap();

        let frame = decode_frame(&png).expect("png decodes");
        assert_eq!((frame.width, frame.height), (6, 2));
    }
}

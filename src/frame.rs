use std::sync::Arc;

use image::codecs::png::PngEncoder;
use image::{ColorType, ImageBuffer, ImageEncoder, RgbImage};
use tracing::{debug, warn};

/// Width used for re-encoded video frames unless configured otherwise
pub const DEFAULT_TARGET_WIDTH: u32 = 640;

/// Raster size assumed when a source reports no usable dimensions
pub const FALLBACK_WIDTH: u32 = 640;
pub const FALLBACK_HEIGHT: u32 = 480;

/// A decoded RGB24 frame from a camera or video source
#[derive(Debug, Clone)]
pub struct RawFrame {
    /// Raw pixel data, 3 bytes per pixel (shared ownership for efficiency)
    pub data: Arc<Vec<u8>>,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
}

impl RawFrame {
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            data: Arc::new(data),
            width,
            height,
        }
    }

    /// Expected byte length for the frame's dimensions
    pub fn expected_size(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }

    /// Validate pixel data length against the declared dimensions
    pub fn validate_size(&self) -> bool {
        self.data.len() == self.expected_size()
    }
}

/// Outbound image payload, consumed exactly once by the detection client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramePayload {
    pub bytes: Vec<u8>,
}

/// Raster surface dimensions for a capture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureSize {
    pub width: u32,
    pub height: u32,
}

impl CaptureSize {
    /// Derive the surface size for a target width, preserving the source
    /// aspect ratio. Falls back to the default height when the source
    /// dimensions are unavailable or the computation comes out to zero.
    pub fn derive(target_width: u32, source_width: u32, source_height: u32) -> Self {
        let height = if source_width == 0 {
            0
        } else {
            ((target_width as f64) * (source_height as f64) / (source_width as f64)).round()
                as u32
        };

        Self {
            width: target_width,
            height: if height == 0 { FALLBACK_HEIGHT } else { height },
        }
    }

    /// Surface size for a live stream, taken from its negotiated settings
    /// when present and usable
    pub fn from_negotiated(negotiated: Option<(u32, u32)>) -> Self {
        match negotiated {
            Some((width, height)) if width > 0 && height > 0 => Self { width, height },
            _ => Self {
                width: FALLBACK_WIDTH,
                height: FALLBACK_HEIGHT,
            },
        }
    }
}

/// Payload from a selected still image file: the bytes pass through untouched.
pub fn still_payload(bytes: Vec<u8>) -> FramePayload {
    FramePayload { bytes }
}

/// Capture the current frame of a video source, scaled to the target width
/// with aspect-preserving height, encoded as PNG.
///
/// Returns `None` when the frame cannot be drawn or encoded; the caller
/// decides whether to skip or fall back to the original file bytes.
pub fn capture_video_frame(frame: &RawFrame, target_width: u32) -> Option<FramePayload> {
    let size = CaptureSize::derive(target_width, frame.width, frame.height);
    encode_png(frame, size).map(|bytes| FramePayload { bytes })
}

/// Capture a live camera frame at the stream's negotiated size.
pub fn capture_stream_frame(
    frame: &RawFrame,
    negotiated: Option<(u32, u32)>,
) -> Option<FramePayload> {
    let size = CaptureSize::from_negotiated(negotiated);
    encode_png(frame, size).map(|bytes| FramePayload { bytes })
}

/// Decode an encoded still image into a raw frame. Returns `None` when the
/// bytes are not a decodable image.
pub fn decode_to_raw(bytes: &[u8]) -> Option<RawFrame> {
    match image::load_from_memory(bytes) {
        Ok(img) => {
            let rgb = img.to_rgb8();
            let (width, height) = rgb.dimensions();
            Some(RawFrame::new(rgb.into_raw(), width, height))
        }
        Err(e) => {
            debug!("Image decode failed: {}", e);
            None
        }
    }
}

/// Render a frame onto a raster surface of the given size and encode it as
/// PNG. Returns `None` on any draw or encode failure.
pub fn encode_png(frame: &RawFrame, size: CaptureSize) -> Option<Vec<u8>> {
    if !frame.validate_size() {
        warn!(
            "Frame data length {} does not match {}x{}; skipping capture",
            frame.data.len(),
            frame.width,
            frame.height
        );
        return None;
    }

    let img: RgbImage =
        ImageBuffer::from_raw(frame.width, frame.height, frame.data.as_ref().clone())?;

    let surface = if (frame.width, frame.height) == (size.width, size.height) {
        img
    } else {
        image::imageops::resize(
            &img,
            size.width,
            size.height,
            image::imageops::FilterType::Triangle,
        )
    };

    let mut buf = Vec::new();
    let encoder = PngEncoder::new(&mut buf);
    match encoder.write_image(surface.as_raw(), size.width, size.height, ColorType::Rgb8) {
        Ok(()) => Some(buf),
        Err(e) => {
            warn!("PNG encoding failed: {}", e);
            None
        }
    }
}

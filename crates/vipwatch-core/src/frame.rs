//! Frame type and wire decoding for the realtime channel.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use image::ImageFormat;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("empty frame")]
    Empty,
    #[error("frame is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// One still image submitted for detection.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Encoded image bytes, passed to the matcher as-is.
    pub data: Vec<u8>,
    /// Container detected from the leading bytes, if recognised. Frames the
    /// matcher cannot read still go through the pipeline and end up as strangers.
    pub format: Option<ImageFormat>,
}

impl Frame {
    /// Decode a text frame: either raw base64 or a `data:<mime>;base64,<payload>` URL.
    pub fn from_wire(text: &str) -> Result<Self, FrameError> {
        let text = text.trim();
        let payload = match text.strip_prefix("data:") {
            Some(url) => url.split_once(',').map(|(_, p)| p).unwrap_or(""),
            None => text,
        };
        if payload.is_empty() {
            return Err(FrameError::Empty);
        }
        Self::from_bytes(STANDARD.decode(payload)?)
    }

    /// Wrap already-decoded image bytes.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self, FrameError> {
        if data.is_empty() {
            return Err(FrameError::Empty);
        }
        let format = image::guess_format(&data).ok();
        if !matches!(format, Some(ImageFormat::Jpeg | ImageFormat::Png)) {
            tracing::debug!(format = ?format, len = data.len(), "frame is not jpeg or png");
        }
        Ok(Self { data, format })
    }
}

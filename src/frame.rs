use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::errors::InferenceError;

const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8, 0xFF];
const PNG_MAGIC: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum FrameEncoding {
    Jpeg,
    Png,
    /// Packed 8-bit RGB, row-major, no padding
    Rgb8,
}

impl FrameEncoding {
    pub fn mime_type(&self) -> &'static str {
        match self {
            FrameEncoding::Jpeg => "image/jpeg",
            FrameEncoding::Png => "image/png",
            FrameEncoding::Rgb8 => "application/octet-stream",
        }
    }
}

/// A frame as it arrives on the wire, before any validation
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct FrameMessage {
    pub width: u32,
    pub height: u32,
    pub encoding: FrameEncoding,
    pub data: Vec<u8>,
}

/// An opaque image buffer plus its capture timestamp.
///
/// Frames are owned by the capture side until they are handed to the
/// inference gateway, which consumes them.
#[derive(Debug, Clone)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    encoding: FrameEncoding,
    captured_at: Instant,
}

impl Frame {
    pub fn new(
        data: Vec<u8>,
        width: u32,
        height: u32,
        encoding: FrameEncoding,
        captured_at: Instant,
    ) -> Self {
        Frame {
            data,
            width,
            height,
            encoding,
            captured_at,
        }
    }

    /// Build a frame from a wire message, rejecting anything that is
    /// obviously not what it claims to be
    pub fn from_message(message: FrameMessage, captured_at: Instant) -> Result<Self, InferenceError> {
        let FrameMessage {
            width,
            height,
            encoding,
            data,
        } = message;
        let frame = Frame::new(data, width, height, encoding, captured_at);
        frame.validate()?;
        Ok(frame)
    }

    pub fn validate(&self) -> Result<(), InferenceError> {
        if self.width == 0 || self.height == 0 {
            return Err(InferenceError::InvalidFrameEncoding(format!(
                "frame has zero dimension {}x{}",
                self.width, self.height
            )));
        }
        if self.data.is_empty() {
            return Err(InferenceError::InvalidFrameEncoding(String::from(
                "frame has no data",
            )));
        }
        match self.encoding {
            FrameEncoding::Jpeg if !self.data.starts_with(JPEG_MAGIC) => Err(
                InferenceError::InvalidFrameEncoding(String::from("missing JPEG start-of-image")),
            ),
            FrameEncoding::Png if !self.data.starts_with(PNG_MAGIC) => Err(
                InferenceError::InvalidFrameEncoding(String::from("missing PNG signature")),
            ),
            FrameEncoding::Rgb8 => {
                let expected = self.width as usize * self.height as usize * 3;
                if self.data.len() == expected {
                    Ok(())
                } else {
                    Err(InferenceError::InvalidFrameEncoding(format!(
                        "expected {} bytes for {}x{} RGB, got {}",
                        expected,
                        self.width,
                        self.height,
                        self.data.len()
                    )))
                }
            }
            _ => Ok(()),
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn encoding(&self) -> FrameEncoding {
        self.encoding
    }

    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(encoding: FrameEncoding, data: Vec<u8>) -> FrameMessage {
        FrameMessage {
            width: 2,
            height: 2,
            encoding,
            data,
        }
    }

    #[test]
    fn jpeg_needs_start_of_image() {
        let now = Instant::now();
        let ok = message(FrameEncoding::Jpeg, vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00]);
        assert!(Frame::from_message(ok, now).is_ok());

        let bad = message(FrameEncoding::Jpeg, vec![0x00, 0x01, 0x02]);
        assert!(matches!(
            Frame::from_message(bad, now),
            Err(InferenceError::InvalidFrameEncoding(_))
        ));
    }

    #[test]
    fn raw_frames_must_match_dimensions() {
        let now = Instant::now();
        assert!(Frame::from_message(message(FrameEncoding::Rgb8, vec![0; 12]), now).is_ok());
        assert!(Frame::from_message(message(FrameEncoding::Rgb8, vec![0; 11]), now).is_err());
    }

    #[test]
    fn empty_or_zero_sized_frames_are_rejected() {
        let now = Instant::now();
        assert!(Frame::from_message(message(FrameEncoding::Png, vec![]), now).is_err());
        let zero = FrameMessage {
            width: 0,
            height: 10,
            encoding: FrameEncoding::Png,
            data: PNG_MAGIC.to_vec(),
        };
        assert!(Frame::from_message(zero, now).is_err());
    }
}

//! Encoded camera frames as received from the ingestion connection

use bytes::Bytes;
use std::time::Instant;

/// Image container recognized by its magic bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFormat {
    Jpeg,
    Png,
}

impl FrameFormat {
    const JPEG_MAGIC: [u8; 3] = [0xFF, 0xD8, 0xFF];
    const PNG_MAGIC: [u8; 4] = [0x89, b'P', b'N', b'G'];

    /// Detect the container from the leading bytes; `None` for anything else
    pub fn sniff(data: &[u8]) -> Option<Self> {
        if data.starts_with(&Self::JPEG_MAGIC) {
            Some(FrameFormat::Jpeg)
        } else if data.starts_with(&Self::PNG_MAGIC) {
            Some(FrameFormat::Png)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FrameFormat::Jpeg => "jpeg",
            FrameFormat::Png => "png",
        }
    }
}

/// One encoded frame
#[derive(Debug, Clone)]
pub struct Frame {
    /// Position within the ingestion session, starting at 1
    pub seq: u64,
    pub format: FrameFormat,
    pub data: Bytes,
    pub received_at: Instant,
}

impl Frame {
    pub fn new(seq: u64, format: FrameFormat, data: Bytes) -> Self {
        Self { seq, format, data, received_at: Instant::now() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sniff_formats() {
        assert_eq!(FrameFormat::sniff(&[0xFF, 0xD8, 0xFF, 0xE0, 0x00]), Some(FrameFormat::Jpeg));
        assert_eq!(
            FrameFormat::sniff(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]),
            Some(FrameFormat::Png)
        );
        assert_eq!(FrameFormat::sniff(b"GIF89a"), None);
        assert_eq!(FrameFormat::sniff(&[0xFF, 0xD8]), None);
        assert_eq!(FrameFormat::sniff(&[]), None);
    }

    #[test]
    fn test_frame_from_sniffed_bytes() {
        let data = Bytes::from_static(&[0xFF, 0xD8, 0xFF]);
        let format = FrameFormat::sniff(&data).unwrap();
        let frame = Frame::new(1, format, data);
        assert_eq!(frame.format.as_str(), "jpeg");
        assert_eq!(frame.data.len(), 3);
    }
}

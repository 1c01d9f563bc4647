pub mod compositor;
pub mod detect;
pub mod gif_frames;
pub mod rgb_conversion;
pub mod zpl_label;

use std::fmt;
use std::time::Duration;

use image::DynamicImage;

use crate::error::DecodeError;
use crate::zpl::DrawerOptions;

/// One frame as produced by a format adapter, before compositing.
#[derive(Debug)]
pub struct DecodedFrame {
    pub image: DynamicImage,
    pub left: u32,
    pub top: u32,
    /// Delay in centiseconds, the GIF native unit.
    pub delay_cs: u16,
}

/// Fully composited result: every frame shares one canvas size.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageResult {
    pub width: u32,
    pub height: u32,
    /// RGBA8, row-major, `width * height * 4` bytes each.
    pub frames: Vec<Vec<u8>>,
    pub frame_delays: Vec<Duration>,
}

impl ImageResult {
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }
}

/// The two input formats this crate knows how to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Gif,
    Zpl,
}

impl Format {
    /// Run the matching adapter over the raw file content.
    pub fn decode(
        self,
        content: &[u8],
        zpl_options: &DrawerOptions,
    ) -> Result<Vec<DecodedFrame>, DecodeError> {
        match self {
            Format::Gif => gif_frames::decode(content),
            Format::Zpl => zpl_label::decode(content, zpl_options),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Format::Gif => f.write_str("GIF"),
            Format::Zpl => f.write_str("ZPL"),
        }
    }
}

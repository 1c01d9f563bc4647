use gif::{ColorOutput, DecodeOptions};
use image::{DynamicImage, RgbaImage};

use super::DecodedFrame;
use crate::error::DecodeError;

/// Decode every frame of a GIF stream, in stream order.
///
/// Frames are returned as the raw sub-images the bitstream carries, placed at
/// their own `left`/`top`; putting them together is the compositor's job.
pub fn decode(content: &[u8]) -> Result<Vec<DecodedFrame>, DecodeError> {
    let mut options = DecodeOptions::new();
    options.set_color_output(ColorOutput::RGBA);

    let mut decoder = options.read_info(content)?;
    log::debug!(
        "GIF logical screen {}x{}",
        decoder.width(),
        decoder.height()
    );

    let mut frames = Vec::new();
    while let Some(frame) = decoder.read_next_frame()? {
        let index = frames.len();
        let image = RgbaImage::from_raw(
            u32::from(frame.width),
            u32::from(frame.height),
            frame.buffer.to_vec(),
        )
        .ok_or(DecodeError::MalformedFrame { index })?;

        log::debug!(
            "GIF frame {}: {}x{} at ({}, {}), delay {}cs",
            index,
            frame.width,
            frame.height,
            frame.left,
            frame.top,
            frame.delay
        );

        frames.push(DecodedFrame {
            image: DynamicImage::ImageRgba8(image),
            left: u32::from(frame.left),
            top: u32::from(frame.top),
            delay_cs: frame.delay,
        });
    }

    if frames.is_empty() {
        return Err(DecodeError::NoFrames);
    }

    Ok(frames)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::borrow::Cow;

    /// Palette: 0 = transparent black, 1 = red, 2 = green, 3 = blue.
    pub(crate) const PALETTE: [u8; 12] = [0, 0, 0, 255, 0, 0, 0, 255, 0, 0, 0, 255];

    pub(crate) struct TestFrame {
        pub left: u16,
        pub top: u16,
        pub width: u16,
        pub height: u16,
        pub delay: u16,
        pub indices: Vec<u8>,
    }

    impl TestFrame {
        pub(crate) fn filled(width: u16, height: u16, index: u8, delay: u16) -> Self {
            Self {
                left: 0,
                top: 0,
                width,
                height,
                delay,
                indices: vec![index; usize::from(width) * usize::from(height)],
            }
        }
    }

    pub(crate) fn encode_gif(width: u16, height: u16, frames: &[TestFrame]) -> Vec<u8> {
        let mut out = Vec::new();
        {
            let mut encoder = gif::Encoder::new(&mut out, width, height, &PALETTE).unwrap();
            for f in frames {
                let frame = gif::Frame {
                    left: f.left,
                    top: f.top,
                    width: f.width,
                    height: f.height,
                    delay: f.delay,
                    transparent: Some(0),
                    buffer: Cow::Borrowed(&f.indices[..]),
                    ..gif::Frame::default()
                };
                encoder.write_frame(&frame).unwrap();
            }
        }
        out
    }

    #[test]
    fn test_frames_in_stream_order() {
        let gif = encode_gif(
            4,
            4,
            &[
                TestFrame::filled(4, 4, 1, 0),
                TestFrame::filled(4, 4, 2, 7),
                TestFrame::filled(4, 4, 3, 120),
            ],
        );

        let frames = decode(&gif).unwrap();
        assert_eq!(frames.len(), 3);
        assert_eq!(
            frames.iter().map(|f| f.delay_cs).collect::<Vec<_>>(),
            vec![0, 7, 120]
        );

        let first = frames[0].image.as_rgba8().unwrap();
        assert_eq!(first.get_pixel(0, 0).0, [255, 0, 0, 255]);
        let third = frames[2].image.as_rgba8().unwrap();
        assert_eq!(third.get_pixel(3, 3).0, [0, 0, 255, 255]);
    }

    #[test]
    fn test_sub_frame_keeps_its_origin() {
        let mut patch = TestFrame::filled(2, 2, 2, 5);
        patch.left = 1;
        patch.top = 2;
        let gif = encode_gif(4, 4, &[TestFrame::filled(4, 4, 1, 0), patch]);

        let frames = decode(&gif).unwrap();
        assert_eq!((frames[1].left, frames[1].top), (1, 2));
        assert_eq!(frames[1].image.width(), 2);
        assert_eq!(frames[1].image.height(), 2);
    }

    #[test]
    fn test_transparent_index_has_zero_alpha() {
        let gif = encode_gif(2, 1, &[TestFrame::filled(2, 1, 0, 0)]);
        let frames = decode(&gif).unwrap();
        assert_eq!(frames[0].image.as_rgba8().unwrap().get_pixel(1, 0).0[3], 0);
    }

    #[test]
    fn test_no_frames_is_empty_result() {
        let gif = encode_gif(4, 4, &[]);
        assert!(matches!(decode(&gif), Err(DecodeError::NoFrames)));
    }

    #[test]
    fn test_truncated_stream_fails() {
        assert!(matches!(decode(b"GIF89a\x0a"), Err(DecodeError::Gif(_))));
    }
}

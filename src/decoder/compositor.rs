use std::time::Duration;

use image::RgbaImage;

use super::rgb_conversion::{blend_over, to_rgba8};
use super::{DecodedFrame, ImageResult};
use crate::error::DecodeError;

/// One GIF delay unit.
const CENTISECOND: Duration = Duration::from_millis(10);

/// Shared drawing surface, sized by the first frame and reused for every
/// frame after it.
struct Canvas {
    pixels: RgbaImage,
}

impl Canvas {
    fn new(width: u32, height: u32) -> Self {
        Self {
            pixels: RgbaImage::new(width, height),
        }
    }

    /// Draw `frame` over the current content at its own origin, clipped to
    /// the canvas bounds.
    fn paint_over(&mut self, frame: &DecodedFrame) {
        let src = to_rgba8(&frame.image);
        let (cw, ch) = self.pixels.dimensions();

        let x_end = frame.left.saturating_add(src.width()).min(cw);
        let y_end = frame.top.saturating_add(src.height()).min(ch);

        for y in frame.top..y_end {
            for x in frame.left..x_end {
                let s = src.get_pixel(x - frame.left, y - frame.top).0;
                blend_over(&mut self.pixels.get_pixel_mut(x, y).0, s);
            }
        }
    }

    /// Standalone copy of the current content.
    fn snapshot(&self) -> Vec<u8> {
        self.pixels.as_raw().clone()
    }
}

/// Composite adapter frames into one RGBA8 buffer per frame.
///
/// Frames are drawn in order onto a single canvas, so anything frame *i*
/// leaves transparent still shows frame *i - 1* underneath. The order is
/// significant; this must stay a sequential fold.
pub fn composite(frames: Vec<DecodedFrame>) -> Result<ImageResult, DecodeError> {
    let first = frames.first().ok_or(DecodeError::NoFrames)?;
    let (width, height) = (first.image.width(), first.image.height());
    if width == 0 || height == 0 {
        return Err(DecodeError::EmptyCanvas);
    }

    let frame_count = frames.len();
    let init = (
        Canvas::new(width, height),
        Vec::with_capacity(frame_count),
        Vec::with_capacity(frame_count),
    );

    let (_, buffers, delays) = frames.iter().enumerate().fold(
        init,
        |(mut canvas, mut buffers, mut delays), (index, frame)| {
            canvas.paint_over(frame);
            buffers.push(canvas.snapshot());
            delays.push(CENTISECOND * u32::from(frame.delay_cs));
            log::debug!("Composited frame {}/{}", index + 1, frame_count);
            (canvas, buffers, delays)
        },
    );

    Ok(ImageResult {
        width,
        height,
        frames: buffers,
        frame_delays: delays,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, GrayImage, Luma, Rgba};

    fn rgba_frame(w: u32, h: u32, px: [u8; 4], left: u32, top: u32, delay_cs: u16) -> DecodedFrame {
        DecodedFrame {
            image: DynamicImage::ImageRgba8(RgbaImage::from_pixel(w, h, Rgba(px))),
            left,
            top,
            delay_cs,
        }
    }

    fn pixel(result: &ImageResult, frame: usize, x: u32, y: u32) -> [u8; 4] {
        let idx = ((y * result.width + x) * 4) as usize;
        let buf = &result.frames[frame];
        [buf[idx], buf[idx + 1], buf[idx + 2], buf[idx + 3]]
    }

    #[test]
    fn test_empty_input() {
        assert!(matches!(composite(Vec::new()), Err(DecodeError::NoFrames)));
    }

    #[test]
    fn test_zero_area_first_frame() {
        let frames = vec![rgba_frame(0, 3, [0; 4], 0, 0, 0)];
        assert!(matches!(composite(frames), Err(DecodeError::EmptyCanvas)));
    }

    #[test]
    fn test_delays_convert_to_nanoseconds() {
        let frames = vec![
            rgba_frame(2, 2, [255, 0, 0, 255], 0, 0, 0),
            rgba_frame(2, 2, [255, 0, 0, 255], 0, 0, 10),
            rgba_frame(2, 2, [255, 0, 0, 255], 0, 0, 50),
        ];
        let result = composite(frames).unwrap();

        let nanos: Vec<u128> = result.frame_delays.iter().map(Duration::as_nanos).collect();
        assert_eq!(nanos, vec![0, 100_000_000, 500_000_000]);
        assert_eq!(result.frame_count(), 3);
        assert!(result.frames.iter().all(|f| f.len() == 2 * 2 * 4));
    }

    #[test]
    fn test_transparent_pixels_show_previous_frame() {
        let red = [255, 0, 0, 255];
        let frames = vec![
            rgba_frame(3, 3, red, 0, 0, 0),
            rgba_frame(3, 3, [0, 0, 0, 0], 0, 0, 0),
        ];
        let result = composite(frames).unwrap();

        assert_eq!(pixel(&result, 1, 1, 1), red);
    }

    #[test]
    fn test_sub_frame_drawn_at_origin_and_clipped() {
        let frames = vec![
            rgba_frame(4, 4, [255, 0, 0, 255], 0, 0, 0),
            rgba_frame(3, 3, [0, 255, 0, 255], 2, 2, 0),
        ];
        let result = composite(frames).unwrap();

        assert_eq!((result.width, result.height), (4, 4));
        assert_eq!(pixel(&result, 1, 1, 1), [255, 0, 0, 255]);
        assert_eq!(pixel(&result, 1, 2, 2), [0, 255, 0, 255]);
        assert_eq!(pixel(&result, 1, 3, 3), [0, 255, 0, 255]);
        assert_eq!(result.frames[1].len(), 4 * 4 * 4);
    }

    #[test]
    fn test_frame_outside_canvas_is_ignored() {
        let frames = vec![
            rgba_frame(2, 2, [9, 9, 9, 255], 0, 0, 0),
            rgba_frame(2, 2, [0, 255, 0, 255], 5, 5, 0),
        ];
        let result = composite(frames).unwrap();
        assert_eq!(result.frames[0], result.frames[1]);
    }

    #[test]
    fn test_frames_do_not_alias_canvas() {
        let frames = vec![
            rgba_frame(1, 1, [1, 1, 1, 255], 0, 0, 0),
            rgba_frame(1, 1, [2, 2, 2, 255], 0, 0, 0),
        ];
        let result = composite(frames).unwrap();

        assert_eq!(result.frames[0], vec![1, 1, 1, 255]);
        assert_eq!(result.frames[1], vec![2, 2, 2, 255]);
    }

    #[test]
    fn test_gray_frame_fills_canvas_opaque() {
        let frames = vec![DecodedFrame {
            image: DynamicImage::ImageLuma8(GrayImage::from_pixel(2, 1, Luma([0]))),
            left: 0,
            top: 0,
            delay_cs: 0,
        }];
        let result = composite(frames).unwrap();
        assert_eq!(result.frames[0], vec![0, 0, 0, 255, 0, 0, 0, 255]);
        assert_eq!(result.frame_delays, vec![Duration::ZERO]);
    }
}

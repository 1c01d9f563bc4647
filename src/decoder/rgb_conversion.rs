use std::borrow::Cow;

use image::{DynamicImage, RgbaImage};

/// Convert an adapter's native image into interleaved RGBA8
///
/// GIF frames already arrive as RGBA8 and are borrowed as-is. The ZPL raster
/// comes back from PNG as 8-bit grayscale, which is expanded here. Anything
/// else goes through `image`'s generic conversion.
///
/// # Arguments
/// * `image` - The decoded frame in whatever layout the adapter produced
///
/// # Returns
/// RGBA8 pixels with straight (non-premultiplied) alpha
pub fn to_rgba8(image: &DynamicImage) -> Cow<'_, RgbaImage> {
    match image {
        DynamicImage::ImageRgba8(rgba) => Cow::Borrowed(rgba),
        DynamicImage::ImageLuma8(gray) => {
            let mut rgba = RgbaImage::new(gray.width(), gray.height());
            for (dst, src) in rgba.pixels_mut().zip(gray.pixels()) {
                let g = src.0[0];
                dst.0 = [g, g, g, 255];
            }
            Cow::Owned(rgba)
        }
        other => {
            log::debug!("Converting {:?} frame to RGBA8", other.color());
            Cow::Owned(other.to_rgba8())
        }
    }
}

/// Blend one straight-alpha RGBA pixel over another, in place
///
/// Porter-Duff "over". Opaque sources replace the destination and fully
/// transparent sources leave it untouched, both exactly.
#[inline]
pub fn blend_over(dst: &mut [u8; 4], src: [u8; 4]) {
    let sa = u32::from(src[3]);
    if sa == 255 {
        *dst = src;
        return;
    }
    if sa == 0 {
        return;
    }

    let da = u32::from(dst[3]);
    // Alpha scaled by 255: out_a = sa + da * (1 - sa)
    let out_a255 = sa * 255 + da * (255 - sa);
    if out_a255 == 0 {
        *dst = [0, 0, 0, 0];
        return;
    }

    for c in 0..3 {
        let sc = u32::from(src[c]);
        let dc = u32::from(dst[c]);
        let num = sc * sa * 255 + dc * da * (255 - sa);
        dst[c] = ((num + out_a255 / 2) / out_a255) as u8;
    }
    dst[3] = ((out_a255 + 127) / 255) as u8;
}

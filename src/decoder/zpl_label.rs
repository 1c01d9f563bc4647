use image::ImageFormat;

use super::DecodedFrame;
use crate::error::DecodeError;
use crate::zpl::{self, DrawerOptions};

/// Render a ZPL payload into a single still frame.
///
/// Only the first label is drawn; any further labels in the payload are
/// skipped.
pub fn decode(content: &[u8], options: &DrawerOptions) -> Result<Vec<DecodedFrame>, DecodeError> {
    let labels = zpl::parse(content)?;

    let Some(label) = labels.first() else {
        return Err(DecodeError::NoLabels);
    };
    if labels.len() > 1 {
        log::debug!("ZPL payload has {} labels, drawing the first", labels.len());
    }

    let png = zpl::draw_label_as_png(label, options)?;
    let image = image::load_from_memory_with_format(&png, ImageFormat::Png)?;

    Ok(vec![DecodedFrame {
        image,
        left: 0,
        top: 0,
        delay_cs: 0,
    }])
}

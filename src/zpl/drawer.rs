use std::io::Cursor;

use barcoders::sym::code128::Code128;
use image::{GrayImage, ImageFormat, Luma};
use qrcode::{Color, EcLevel, QrCode};
use thiserror::Error;

use super::font::{self, CELL_HEIGHT, CELL_WIDTH};
use super::{Element, ElementKind, FontSpec, Label, LineColor, Symbology};

/// Largest label side, in dots.
const MAX_DOTS: u32 = 16384;

const INK: u8 = 0;
const PAPER: u8 = 255;

/// Media settings used when a label does not set `^PW`/`^LL` itself.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawerOptions {
    pub label_width_mm: f64,
    pub label_height_mm: f64,
    /// Printer resolution in dots per millimetre (8 = 203 dpi).
    pub dpmm: u32,
}

impl Default for DrawerOptions {
    fn default() -> Self {
        Self {
            label_width_mm: 101.6,
            label_height_mm: 203.2,
            dpmm: 8,
        }
    }
}

impl DrawerOptions {
    fn dots(&self, mm: f64) -> u32 {
        (mm * f64::from(self.dpmm)).round() as u32
    }
}

#[derive(Debug, Error)]
pub enum DrawError {
    #[error("label size {width}x{height} dots must be between 1 and 16384 per side")]
    InvalidSize { width: u32, height: u32 },
    #[error("failed to encode label raster: {0}")]
    Encode(#[from] image::ImageError),
    #[error("cannot encode {data:?} as {symbology}: {reason}")]
    Barcode {
        symbology: &'static str,
        data: String,
        reason: String,
    },
}

struct Raster {
    image: GrayImage,
}

impl Raster {
    fn new(width: u32, height: u32) -> Self {
        Self {
            image: GrayImage::from_pixel(width, height, Luma([PAPER])),
        }
    }

    fn mark(&mut self, x: u32, y: u32, color: LineColor, reverse: bool) {
        if x >= self.image.width() || y >= self.image.height() {
            return;
        }
        let px = self.image.get_pixel_mut(x, y);
        px.0[0] = if reverse {
            PAPER - px.0[0]
        } else {
            match color {
                LineColor::Black => INK,
                LineColor::White => PAPER,
            }
        };
    }

    /// Visible span of `len` dots starting at `start`.
    fn span(start: u32, len: u32, limit: u32) -> u32 {
        len.min(limit.saturating_sub(start))
    }

    fn fill_rect(&mut self, x: u32, y: u32, width: u32, height: u32, reverse: bool) {
        for dy in 0..Self::span(y, height, self.image.height()) {
            for dx in 0..Self::span(x, width, self.image.width()) {
                self.mark(x + dx, y + dy, LineColor::Black, reverse);
            }
        }
    }

    fn draw(&mut self, el: &Element) -> Result<(), DrawError> {
        match &el.kind {
            ElementKind::Box {
                width,
                height,
                thickness,
                color,
                rounding,
            } => self.draw_box(el, *width, *height, *thickness, *color, *rounding),
            ElementKind::Circle {
                diameter,
                thickness,
                color,
            } => self.draw_circle(el, *diameter, *thickness, *color),
            ElementKind::Graphic {
                bytes_per_row,
                data,
            } => self.draw_graphic(el, *bytes_per_row, data),
            ElementKind::Text { font, text } => self.draw_text(el.x, el.y, *font, text, el.reverse),
            ElementKind::Barcode {
                symbology: Symbology::Code128 {
                    height,
                    interpretation,
                },
                module_width,
                data,
            } => return self.draw_code128(el, *module_width, *height, *interpretation, data),
            ElementKind::Barcode {
                symbology:
                    Symbology::Qr {
                        magnification,
                        level,
                    },
                data,
                ..
            } => return self.draw_qr(el, *magnification, *level, data),
        }
        Ok(())
    }

    fn draw_box(
        &mut self,
        el: &Element,
        width: u32,
        height: u32,
        thickness: u32,
        color: LineColor,
        rounding: u32,
    ) {
        let (w, h, t) = (width as f32, height as f32, thickness as f32);
        let radius = rounding as f32 / 8.0 * (w.min(h) / 2.0);

        for dy in 0..Self::span(el.y, height, self.image.height()) {
            for dx in 0..Self::span(el.x, width, self.image.width()) {
                let (px, py) = (dx as f32 + 0.5, dy as f32 + 0.5);
                let outer = inside_rounded_rect(px, py, w, h, radius);
                let inner = inside_rounded_rect(
                    px - t,
                    py - t,
                    w - 2.0 * t,
                    h - 2.0 * t,
                    (radius - t).max(0.0),
                );
                if outer && !inner {
                    self.mark(el.x + dx, el.y + dy, color, el.reverse);
                }
            }
        }
    }

    fn draw_circle(&mut self, el: &Element, diameter: u32, thickness: u32, color: LineColor) {
        let r = diameter as f32 / 2.0;
        let inner = r - thickness as f32;

        for dy in 0..Self::span(el.y, diameter, self.image.height()) {
            for dx in 0..Self::span(el.x, diameter, self.image.width()) {
                let (px, py) = (dx as f32 + 0.5 - r, dy as f32 + 0.5 - r);
                let dist = (px * px + py * py).sqrt();
                if dist <= r && dist > inner {
                    self.mark(el.x + dx, el.y + dy, color, el.reverse);
                }
            }
        }
    }

    fn draw_graphic(&mut self, el: &Element, bytes_per_row: usize, data: &[u8]) {
        for (row, bytes) in data.chunks(bytes_per_row).enumerate() {
            let y = el.y.saturating_add(row as u32);
            for (col, byte) in bytes.iter().enumerate() {
                for bit in 0..8u32 {
                    if byte & (0x80 >> bit) != 0 {
                        let x = el.x.saturating_add(col as u32 * 8 + bit);
                        self.mark(x, y, LineColor::Black, el.reverse);
                    }
                }
            }
        }
    }

    fn draw_text(&mut self, x: u32, y: u32, font: FontSpec, text: &str, reverse: bool) {
        let sx = (font.width / CELL_WIDTH).max(1);
        let sy = (font.height / CELL_HEIGHT).max(1);
        let advance = CELL_WIDTH.saturating_mul(sx);

        for (i, c) in text.chars().enumerate() {
            let origin_x = x.saturating_add((i as u32).saturating_mul(advance));
            if origin_x >= self.image.width() {
                break;
            }
            for (col, bits) in font::glyph(c).iter().enumerate() {
                let x0 = origin_x.saturating_add((col as u32).saturating_mul(sx));
                for row in 0..7u32 {
                    if bits & (1 << row) != 0 {
                        let y0 = y.saturating_add(row.saturating_mul(sy));
                        self.fill_rect(x0, y0, sx, sy, reverse);
                    }
                }
            }
        }
    }

    fn draw_code128(
        &mut self,
        el: &Element,
        module_width: u32,
        height: u32,
        interpretation: bool,
        data: &str,
    ) -> Result<(), DrawError> {
        let (input, readable) = code128_input(data);
        let bars = Code128::new(input.as_str())
            .map_err(|e| DrawError::Barcode {
                symbology: "Code 128",
                data: data.to_string(),
                reason: format!("{e:?}"),
            })?
            .encode();

        for (i, bar) in bars.iter().enumerate() {
            if *bar == 1 {
                let x = el.x.saturating_add((i as u32).saturating_mul(module_width));
                self.fill_rect(x, el.y, module_width, height, el.reverse);
            }
        }

        if interpretation {
            // Printed centred under the bars, in a font scaled to the module.
            let font = FontSpec {
                height: module_width * 9,
                width: module_width * 5,
            };
            let glyph_width = CELL_WIDTH * (font.width / CELL_WIDTH).max(1);
            let text_width = (readable.chars().count() as u32).saturating_mul(glyph_width);
            let bars_width = (bars.len() as u32).saturating_mul(module_width);
            let x = el.x.saturating_add(bars_width.saturating_sub(text_width) / 2);
            let y = el.y.saturating_add(height).saturating_add(module_width);
            self.draw_text(x, y, font, &readable, el.reverse);
        }
        Ok(())
    }

    fn draw_qr(
        &mut self,
        el: &Element,
        magnification: u32,
        level: EcLevel,
        data: &str,
    ) -> Result<(), DrawError> {
        let code = QrCode::with_error_correction_level(data.as_bytes(), level).map_err(|e| {
            DrawError::Barcode {
                symbology: "QR code",
                data: data.to_string(),
                reason: e.to_string(),
            }
        })?;

        let modules = code.width();
        for (i, color) in code.to_colors().into_iter().enumerate() {
            if color == Color::Dark {
                let col = (i % modules) as u32;
                let row = (i / modules) as u32;
                self.fill_rect(
                    el.x.saturating_add(col * magnification),
                    el.y.saturating_add(row * magnification),
                    magnification,
                    magnification,
                    el.reverse,
                );
            }
        }
        Ok(())
    }
}

/// Translate `^BC` field data into the notation `barcoders` expects, where
/// `À`, `Ɓ` and `Ć` select code sets A, B and C. ZPL start and shift codes
/// (`>9`, `>:`, `>;`, `>7`, `>6`, `>5`) map onto those, `>0` is a literal
/// `>`, and data without a start code begins in set B.
///
/// Returns the encoder input and the human readable text.
fn code128_input(data: &str) -> (String, String) {
    let mut input = String::with_capacity(data.len() + 1);
    let mut readable = String::with_capacity(data.len());
    let mut chars = data.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '>' {
            let set = match chars.peek() {
                Some('9') | Some('7') => Some('À'),
                Some(':') | Some('6') => Some('Ɓ'),
                Some(';') | Some('5') => Some('Ć'),
                Some('0') => Some('>'),
                _ => None,
            };
            if let Some(set) = set {
                chars.next();
                input.push(set);
                if set == '>' {
                    readable.push('>');
                }
                continue;
            }
        }
        input.push(c);
        readable.push(c);
    }

    if !input.starts_with(['À', 'Ɓ', 'Ć']) {
        input.insert(0, 'Ɓ');
    }
    (input, readable)
}

/// Whether point (`px`, `py`) lies in a `w` x `h` rectangle at the origin with
/// corners rounded to `r`.
fn inside_rounded_rect(px: f32, py: f32, w: f32, h: f32, r: f32) -> bool {
    if w <= 0.0 || h <= 0.0 || px < 0.0 || py < 0.0 || px > w || py > h {
        return false;
    }
    let cx = px.max(r).min(w - r);
    let cy = py.max(r).min(h - r);
    (px - cx).powi(2) + (py - cy).powi(2) <= r * r
}

/// Rasterize one label into a grayscale PNG.
pub fn draw_label_as_png(label: &Label, options: &DrawerOptions) -> Result<Vec<u8>, DrawError> {
    let width = label
        .print_width
        .unwrap_or_else(|| options.dots(options.label_width_mm));
    let height = label
        .label_length
        .unwrap_or_else(|| options.dots(options.label_height_mm));

    if !(1..=MAX_DOTS).contains(&width) || !(1..=MAX_DOTS).contains(&height) {
        return Err(DrawError::InvalidSize { width, height });
    }

    log::debug!(
        "Drawing ZPL label {}x{} dots with {} elements",
        width,
        height,
        label.elements.len()
    );

    let mut raster = Raster::new(width, height);
    for element in &label.elements {
        raster.draw(element)?;
    }
    if label.reverse {
        for px in raster.image.pixels_mut() {
            px.0[0] = PAPER - px.0[0];
        }
    }

    let mut png = Vec::new();
    raster
        .image
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
    Ok(png)
}

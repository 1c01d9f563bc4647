//! A small ZPL II interpreter: enough of the command set to lay out boxes,
//! circles, bitmaps, text and Code 128 / QR barcodes, rasterized to a
//! grayscale PNG.

mod drawer;
mod font;
mod parser;

pub use drawer::{draw_label_as_png, DrawError, DrawerOptions};
pub use parser::{parse, ParseError};

pub use qrcode::EcLevel;

/// Ink colour of a graphic element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineColor {
    Black,
    White,
}

/// Font selected by `^A` or `^CF`, in dots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FontSpec {
    pub height: u32,
    pub width: u32,
}

impl Default for FontSpec {
    fn default() -> Self {
        Self {
            height: 30,
            width: 30,
        }
    }
}

/// Barcode symbology selected by a field's `^B` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Symbology {
    /// `^BC`. `interpretation` prints the data under the bars.
    Code128 { height: u32, interpretation: bool },
    /// `^BQ` model 2, `magnification` dots per module.
    Qr { magnification: u32, level: EcLevel },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementKind {
    Box {
        width: u32,
        height: u32,
        thickness: u32,
        color: LineColor,
        rounding: u32,
    },
    Circle {
        diameter: u32,
        thickness: u32,
        color: LineColor,
    },
    /// 1-bit bitmap, most significant bit first, `1` is ink.
    Graphic {
        bytes_per_row: usize,
        data: Vec<u8>,
    },
    Text {
        font: FontSpec,
        text: String,
    },
    /// `data` is the field data as written in the label, minus any QR
    /// mode prefix.
    Barcode {
        symbology: Symbology,
        /// `^BY` narrow bar width, in dots.
        module_width: u32,
        data: String,
    },
}

/// One field of a label, positioned in dots from the top-left corner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub x: u32,
    pub y: u32,
    /// `^FR`: invert whatever the element covers instead of painting.
    pub reverse: bool,
    pub kind: ElementKind,
}

/// Everything between one `^XA` and its `^XZ`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Label {
    /// `^PW`, in dots.
    pub print_width: Option<u32>,
    /// `^LL`, in dots.
    pub label_length: Option<u32>,
    /// `^LR`: invert the whole label.
    pub reverse: bool,
    pub elements: Vec<Element>,
}

use smallvec::SmallVec;
use thiserror::Error;

use super::{EcLevel, Element, ElementKind, FontSpec, Label, LineColor, Symbology};

/// Upper bound for a single `^GF` bitmap.
const MAX_GRAPHIC_BYTES: usize = 16 * 1024 * 1024;

/// `^BY` defaults at power-up.
const DEFAULT_MODULE_WIDTH: u32 = 2;
const DEFAULT_BAR_HEIGHT: u32 = 10;
/// `^BQ` magnification used by 203 dpi printers.
const DEFAULT_QR_MAGNIFICATION: u32 = 2;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("^{command} takes no parameters, found {data:?}")]
    UnexpectedData { command: String, data: String },
    #[error("invalid value {value:?} for ^{command}")]
    InvalidNumber { command: &'static str, value: String },
    #[error("unsupported ^GF compression type {0:?}")]
    UnsupportedGraphicType(String),
    #[error("invalid character {0:?} in ^GF data")]
    InvalidGraphicData(char),
    #[error("^GF field of {0} bytes is too large")]
    GraphicTooLarge(usize),
}

/// One `^XX...` or `~XX...` token.
struct Command<'a> {
    tilde: bool,
    code: String,
    params: &'a str,
}

fn split_commands(text: &str) -> Vec<Command<'_>> {
    let starts: Vec<usize> = text
        .match_indices(|c: char| c == '^' || c == '~')
        .map(|(i, _)| i)
        .collect();

    let mut commands = Vec::with_capacity(starts.len());
    for (n, &start) in starts.iter().enumerate() {
        let end = starts.get(n + 1).copied().unwrap_or(text.len());
        let tilde = text[start..].starts_with('~');
        let body = &text[start + 1..end];

        let mut chars = body.char_indices();
        let Some((_, first)) = chars.next() else {
            continue;
        };
        let first = first.to_ascii_uppercase();

        // ^A is the only one-letter command; the font name follows directly.
        if first == 'A' {
            commands.push(Command {
                tilde,
                code: "A".to_string(),
                params: &body[1..],
            });
            continue;
        }

        let (code, params) = match chars.next() {
            Some((i, second)) => {
                let rest = i + second.len_utf8();
                (
                    format!("{first}{}", second.to_ascii_uppercase()),
                    &body[rest..],
                )
            }
            None => (first.to_string(), ""),
        };
        commands.push(Command {
            tilde,
            code,
            params,
        });
    }
    commands
}

fn split_params(params: &str) -> SmallVec<[&str; 8]> {
    params.trim().split(',').map(str::trim).collect()
}

fn number(
    command: &'static str,
    params: &[&str],
    index: usize,
    default: u32,
) -> Result<u32, ParseError> {
    match params.get(index).copied() {
        None | Some("") => Ok(default),
        Some(value) => value.parse().map_err(|_| ParseError::InvalidNumber {
            command,
            value: value.to_string(),
        }),
    }
}

fn line_color(params: &[&str], index: usize) -> LineColor {
    match params.get(index).copied() {
        Some("W") | Some("w") => LineColor::White,
        _ => LineColor::Black,
    }
}

enum FieldBarcode {
    Supported(Symbology),
    /// A `^B` command this interpreter cannot draw; the field is dropped.
    Unsupported(String),
}

/// Field state accumulated between `^FO`/`^FT` and `^FS`.
#[derive(Default)]
struct PendingField {
    origin: Option<(u32, u32)>,
    typeset: bool,
    font: Option<FontSpec>,
    reverse: bool,
    data: Option<String>,
    graphic: Option<ElementKind>,
    barcode: Option<FieldBarcode>,
}

struct LabelBuilder {
    label: Label,
    home: (u32, u32),
    default_font: FontSpec,
    module_width: u32,
    bar_height: u32,
    field: PendingField,
}

impl LabelBuilder {
    fn new() -> Self {
        Self {
            label: Label::default(),
            home: (0, 0),
            default_font: FontSpec::default(),
            module_width: DEFAULT_MODULE_WIDTH,
            bar_height: DEFAULT_BAR_HEIGHT,
            field: PendingField::default(),
        }
    }

    fn finish_field(&mut self) {
        let field = std::mem::take(&mut self.field);
        let (x, y) = field.origin.unwrap_or((0, 0));
        let (x, y) = (x.saturating_add(self.home.0), y.saturating_add(self.home.1));
        let font = field.font.unwrap_or(self.default_font);

        if let Some(kind) = field.graphic {
            self.label.elements.push(Element {
                x,
                y,
                reverse: field.reverse,
                kind,
            });
        }

        let Some(data) = field.data else {
            return;
        };

        // ^FT positions the baseline rather than the top edge.
        let baseline = |height: u32| {
            if field.typeset {
                y.saturating_sub(height)
            } else {
                y
            }
        };

        let (y, kind) = match field.barcode {
            None => (baseline(font.height), ElementKind::Text { font, text: data }),
            Some(FieldBarcode::Unsupported(code)) => {
                log::warn!("Dropping ^{} barcode field {:?}", code, data);
                return;
            }
            Some(FieldBarcode::Supported(Symbology::Code128 {
                height,
                interpretation,
            })) => (
                baseline(height),
                ElementKind::Barcode {
                    symbology: Symbology::Code128 {
                        height,
                        interpretation,
                    },
                    module_width: self.module_width,
                    data,
                },
            ),
            Some(FieldBarcode::Supported(Symbology::Qr { magnification, .. })) => {
                let (level, payload) = split_qr_data(&data);
                (
                    y,
                    ElementKind::Barcode {
                        symbology: Symbology::Qr {
                            magnification,
                            level,
                        },
                        module_width: self.module_width,
                        data: payload.to_string(),
                    },
                )
            }
        };

        self.label.elements.push(Element {
            x,
            y,
            reverse: field.reverse,
            kind,
        });
    }

    fn apply(&mut self, cmd: &Command<'_>) -> Result<(), ParseError> {
        let p = split_params(cmd.params);
        match cmd.code.as_str() {
            "PW" => self.label.print_width = Some(number("PW", &p, 0, 0)?),
            "LL" => self.label.label_length = Some(number("LL", &p, 0, 0)?),
            "LH" => self.home = (number("LH", &p, 0, 0)?, number("LH", &p, 1, 0)?),
            "LR" => self.label.reverse = matches!(p.first().copied(), Some("Y") | Some("y")),
            "FO" | "FT" => {
                let name = if cmd.code == "FT" { "FT" } else { "FO" };
                self.field.origin = Some((number(name, &p, 0, 0)?, number(name, &p, 1, 0)?));
                self.field.typeset = name == "FT";
            }
            "A" => self.field.font = Some(parse_font(cmd.params, self.default_font)?),
            "CF" => {
                let height = number("CF", &p, 1, self.default_font.height)?;
                let width = number("CF", &p, 2, height)?;
                self.default_font = FontSpec { height, width };
            }
            "FD" | "FV" => {
                let data = cmd.params.trim_end_matches(['\r', '\n']);
                self.field.data = Some(data.to_string());
            }
            "FR" => self.field.reverse = true,
            "FS" => self.finish_field(),
            "GB" => {
                let thickness = number("GB", &p, 2, 1)?.max(1);
                self.field.graphic = Some(ElementKind::Box {
                    width: number("GB", &p, 0, thickness)?.max(thickness),
                    height: number("GB", &p, 1, thickness)?.max(thickness),
                    thickness,
                    color: line_color(&p, 3),
                    rounding: number("GB", &p, 4, 0)?.min(8),
                });
            }
            "GC" => {
                self.field.graphic = Some(ElementKind::Circle {
                    diameter: number("GC", &p, 0, 3)?,
                    thickness: number("GC", &p, 1, 1)?.max(1),
                    color: line_color(&p, 2),
                });
            }
            "GF" => self.field.graphic = Some(parse_graphic_field(cmd.params)?),
            "BY" => {
                self.module_width = number("BY", &p, 0, self.module_width)?.clamp(1, 10);
                self.bar_height = number("BY", &p, 2, self.bar_height)?.max(1);
            }
            "BC" => {
                let height = number("BC", &p, 1, self.bar_height)?.max(1);
                let interpretation = !matches!(p.get(2).copied(), Some("N") | Some("n"));
                self.field.barcode = Some(FieldBarcode::Supported(Symbology::Code128 {
                    height,
                    interpretation,
                }));
            }
            "BQ" => {
                let magnification = number("BQ", &p, 2, DEFAULT_QR_MAGNIFICATION)?.clamp(1, 10);
                self.field.barcode = Some(FieldBarcode::Supported(Symbology::Qr {
                    magnification,
                    level: EcLevel::M,
                }));
            }
            code if code.starts_with('B') => {
                self.field.barcode = Some(FieldBarcode::Unsupported(code.to_string()));
            }
            "FX" => {}
            other => log::debug!("Skipping unsupported ZPL command ^{}", other),
        }
        Ok(())
    }
}

fn parse_font(params: &str, fallback: FontSpec) -> Result<FontSpec, ParseError> {
    // "0N,30,20": font name, optional orientation, height, width.
    let p = split_params(params);
    let height = number("A", &p, 1, fallback.height)?;
    let width = number("A", &p, 2, height)?;
    Ok(FontSpec { height, width })
}

/// Split `^BQ` field data such as `QA,payload` into the error correction
/// level and the payload. Data without that prefix is encoded whole at
/// level M.
fn split_qr_data(data: &str) -> (EcLevel, &str) {
    let level = match data.chars().next().map(|c| c.to_ascii_uppercase()) {
        Some('H') => EcLevel::H,
        Some('Q') => EcLevel::Q,
        Some('M') => EcLevel::M,
        Some('L') => EcLevel::L,
        _ => return (EcLevel::M, data),
    };

    match data[1..].split_once(',') {
        Some((mode, payload)) if mode.eq_ignore_ascii_case("M") => {
            (level, strip_manual_mode(payload))
        }
        Some((mode, payload)) if mode.len() <= 1 => (level, payload),
        _ => (EcLevel::M, data),
    }
}

/// Manual input mode prefixes the payload with its character mode:
/// `N`/`A` take one letter, `B` is followed by a four digit byte count.
fn strip_manual_mode(payload: &str) -> &str {
    match payload.as_bytes().first() {
        Some(b'N' | b'n' | b'A' | b'a') => &payload[1..],
        Some(b'B' | b'b') if payload.is_char_boundary(5) => &payload[5..],
        _ => payload,
    }
}

fn parse_graphic_field(params: &str) -> Result<ElementKind, ParseError> {
    let mut parts = params.trim().splitn(5, ',');
    let format = parts.next().unwrap_or("").trim();
    if !format.eq_ignore_ascii_case("A") {
        return Err(ParseError::UnsupportedGraphicType(format.to_string()));
    }

    let header: SmallVec<[&str; 3]> = parts.by_ref().take(3).map(str::trim).collect();
    let total = number("GF", &header, 0, 0)? as usize;
    let bytes_per_row = number("GF", &header, 2, 0)? as usize;
    if total > MAX_GRAPHIC_BYTES {
        return Err(ParseError::GraphicTooLarge(total));
    }
    // A row can never be wider than the whole bitmap.
    if bytes_per_row == 0 || bytes_per_row > total {
        return Err(ParseError::InvalidNumber {
            command: "GF",
            value: bytes_per_row.to_string(),
        });
    }

    let data = decode_graphic_hex(parts.next().unwrap_or(""), bytes_per_row, total)?;
    Ok(ElementKind::Graphic {
        bytes_per_row,
        data,
    })
}

/// Row assembler for `^GF` data, working in nibbles.
struct GraphicRows {
    row_nibbles: usize,
    total_nibbles: usize,
    nibbles: Vec<u8>,
    row: Vec<u8>,
    prev_row: Vec<u8>,
}

impl GraphicRows {
    fn new(bytes_per_row: usize, total: usize) -> Self {
        Self {
            row_nibbles: bytes_per_row * 2,
            total_nibbles: total * 2,
            nibbles: Vec::with_capacity(total * 2),
            row: Vec::with_capacity(bytes_per_row * 2),
            prev_row: vec![0; bytes_per_row * 2],
        }
    }

    fn is_full(&self) -> bool {
        self.nibbles.len() >= self.total_nibbles
    }

    fn push(&mut self, nibble: u8) {
        self.row.push(nibble);
        if self.row.len() == self.row_nibbles {
            self.finish_row();
        }
    }

    /// Pad the current row with `nibble` and close it.
    fn fill(&mut self, nibble: u8) {
        self.row.resize(self.row_nibbles, nibble);
        self.finish_row();
    }

    fn repeat_previous(&mut self) {
        self.row.clone_from(&self.prev_row);
        self.finish_row();
    }

    fn finish_row(&mut self) {
        self.nibbles.extend_from_slice(&self.row);
        std::mem::swap(&mut self.prev_row, &mut self.row);
        self.row.clear();
    }

    fn into_bytes(mut self) -> Vec<u8> {
        if !self.row.is_empty() {
            self.fill(0);
        }
        self.nibbles.resize(self.total_nibbles, 0);
        self.nibbles
            .chunks(2)
            .map(|pair| (pair[0] << 4) | pair[1])
            .collect()
    }
}

/// Expand ZPL ASCII hex, including its run-length shorthand: `G`-`Y` and
/// `g`-`z` repeat the next nibble, `,` zero-fills the row, `!` one-fills it
/// and `:` repeats the previous row.
fn decode_graphic_hex(data: &str, bytes_per_row: usize, total: usize) -> Result<Vec<u8>, ParseError> {
    let mut rows = GraphicRows::new(bytes_per_row, total);
    let mut repeat = 0usize;

    for c in data.chars() {
        if rows.is_full() {
            break;
        }
        match c {
            'G'..='Y' => repeat += (c as usize) - ('G' as usize) + 1,
            'g'..='z' => repeat += ((c as usize) - ('g' as usize) + 1) * 20,
            ',' => rows.fill(0),
            '!' => rows.fill(0xF),
            ':' => rows.repeat_previous(),
            c if c.is_ascii_hexdigit() => {
                let value = c.to_digit(16).unwrap_or(0) as u8;
                for _ in 0..repeat.max(1) {
                    rows.push(value);
                    if rows.is_full() {
                        break;
                    }
                }
                repeat = 0;
            }
            c if c.is_whitespace() => {}
            other => return Err(ParseError::InvalidGraphicData(other)),
        }
    }

    Ok(rows.into_bytes())
}

/// Parse ZPL source into labels, in order of appearance.
///
/// Content outside `^XA`...`^XZ` is ignored and a label missing its `^XZ`
/// is dropped.
pub fn parse(content: &[u8]) -> Result<Vec<Label>, ParseError> {
    let text = String::from_utf8_lossy(content);
    let mut labels = Vec::new();
    let mut current: Option<LabelBuilder> = None;

    for cmd in split_commands(&text) {
        if cmd.tilde {
            log::debug!("Skipping ZPL control command ~{}", cmd.code);
            continue;
        }

        if matches!(cmd.code.as_str(), "XA" | "FS" | "FR") {
            let data = cmd.params.trim();
            if !data.is_empty() {
                return Err(ParseError::UnexpectedData {
                    command: cmd.code.clone(),
                    data: data.to_string(),
                });
            }
        }

        match cmd.code.as_str() {
            "XA" if current.is_some() => log::warn!("Nested ^XA ignored"),
            "XA" => current = Some(LabelBuilder::new()),
            "XZ" => {
                if let Some(builder) = current.take() {
                    labels.push(builder.label);
                }
            }
            code => match current.as_mut() {
                Some(builder) => builder.apply(&cmd)?,
                None => log::debug!("Ignoring ^{} outside of a label", code),
            },
        }
    }

    if current.is_some() {
        log::warn!("Dropping unterminated ZPL label");
    }

    Ok(labels)
}

const ZPL_START: &[u8] = b"^XA";
const ZPL_END: &[u8] = b"^XZ";

/// Number of leading bytes inspected when sniffing.
const SNIFF_LEN: usize = 512;

/// Tags that mark a document as HTML when followed by a space or `>`,
/// matched case-insensitively after leading whitespace.
const HTML_TAGS: &[&[u8]] = &[
    b"<!DOCTYPE HTML",
    b"<HTML",
    b"<HEAD",
    b"<SCRIPT",
    b"<IFRAME",
    b"<H1",
    b"<DIV",
    b"<FONT",
    b"<TABLE",
    b"<A",
    b"<STYLE",
    b"<TITLE",
    b"<B",
    b"<BODY",
    b"<BR",
    b"<P",
    b"<!--",
];

/// Non-image formats recognised by a fixed prefix.
const SIGNATURES: &[(&[u8], &str)] = &[
    (b"%PDF-", "application/pdf"),
    (b"%!PS-Adobe-", "application/postscript"),
    (b"\xFE\xFF", "text/plain; charset=utf-16be"),
    (b"\xFF\xFE", "text/plain; charset=utf-16le"),
    (b"\xEF\xBB\xBF", "text/plain; charset=utf-8"),
    (b"PK\x03\x04", "application/zip"),
    (b"\x1F\x8B\x08", "application/x-gzip"),
    (b"Rar!\x1A\x07\x00", "application/x-rar-compressed"),
    (b"OggS\x00", "application/ogg"),
    (b"\x00asm", "application/wasm"),
];

/// Outcome of format detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detected {
    Gif,
    Zpl,
    /// Carries the sniffed content type for diagnostics.
    Unsupported(&'static str),
}

/// Classify raw file content. GIF sniffing wins over ZPL markers.
pub fn detect(content: &[u8]) -> Detected {
    let content_type = sniff_content_type(content);
    if content_type == "image/gif" {
        return Detected::Gif;
    }

    if contains(content, ZPL_START) && contains(content, ZPL_END) {
        return Detected::Zpl;
    }

    Detected::Unsupported(content_type)
}

/// Best-effort MIME label for `content`.
pub fn sniff_content_type(content: &[u8]) -> &'static str {
    if let Ok(format) = image::guess_format(content) {
        return format.to_mime_type();
    }

    let head = &content[..content.len().min(SNIFF_LEN)];
    if let Some(markup) = sniff_markup(head) {
        return markup;
    }
    if let Some((_, content_type)) = SIGNATURES.iter().find(|(magic, _)| head.starts_with(magic)) {
        return *content_type;
    }

    if head.iter().copied().any(is_binary_byte) {
        "application/octet-stream"
    } else {
        "text/plain; charset=utf-8"
    }
}

fn sniff_markup(head: &[u8]) -> Option<&'static str> {
    let start = head
        .iter()
        .position(|&b| !matches!(b, b'\t' | b'\n' | b'\x0c' | b'\r' | b' '))?;
    let text = &head[start..];

    if text.starts_with(b"<?xml") {
        return Some("text/xml; charset=utf-8");
    }

    HTML_TAGS
        .iter()
        .any(|tag| {
            text.len() > tag.len()
                && text[..tag.len()].eq_ignore_ascii_case(tag)
                && matches!(text[tag.len()], b' ' | b'>')
        })
        .then_some("text/html; charset=utf-8")
}

fn is_binary_byte(b: u8) -> bool {
    matches!(b, 0x00..=0x08 | 0x0B | 0x0E..=0x1A | 0x1C..=0x1F)
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

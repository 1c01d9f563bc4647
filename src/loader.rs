use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Instant;

use crate::decoder::compositor::composite;
use crate::decoder::detect::{detect, Detected};
use crate::decoder::{Format, ImageResult};
use crate::error::LoadError;
use crate::zpl::DrawerOptions;

/// Knobs for a load. The C entry point always uses the defaults.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub zpl: DrawerOptions,
}

/// Load a GIF or ZPL file into composited RGBA frames.
pub fn load<P: AsRef<Path>>(path: P) -> Result<ImageResult, LoadError> {
    load_with_options(path, &LoadOptions::default())
}

pub fn load_with_options<P: AsRef<Path>>(
    path: P,
    options: &LoadOptions,
) -> Result<ImageResult, LoadError> {
    log::info!("Opening image file: {:?}", path.as_ref());

    let mut file = File::open(path.as_ref()).map_err(LoadError::Open)?;
    let mut content = Vec::new();
    file.read_to_end(&mut content).map_err(LoadError::Read)?;

    load_bytes(&content, options)
}

/// Same as [`load_with_options`] for content already in memory.
pub fn load_bytes(content: &[u8], options: &LoadOptions) -> Result<ImageResult, LoadError> {
    let start = Instant::now();

    let format = match detect(content) {
        Detected::Gif => Format::Gif,
        Detected::Zpl => Format::Zpl,
        Detected::Unsupported(content_type) => {
            log::info!("Rejecting {} bytes of {}", content.len(), content_type);
            return Err(LoadError::UnsupportedFormat { content_type });
        }
    };

    log::info!("Detected {} ({} bytes), decoding...", format, content.len());

    let result = format
        .decode(content, &options.zpl)
        .and_then(composite)
        .map_err(|source| LoadError::Decode { format, source })?;

    log::info!(
        "Decoded {} {}x{} frame(s) in {:?}",
        result.frame_count(),
        result.width,
        result.height,
        start.elapsed()
    );

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::gif_frames::tests::{encode_gif, TestFrame};
    use crate::error::ErrorKind;
    use std::fs;
    use std::time::Duration;

    #[test]
    fn test_three_frame_gif_end_to_end() {
        // The last frame is transparent except for its top row.
        let mut last = TestFrame::filled(10, 10, 0, 50);
        last.indices[..10].fill(2);

        let gif = encode_gif(
            10,
            10,
            &[
                TestFrame::filled(10, 10, 1, 0),
                TestFrame::filled(10, 10, 3, 10),
                last,
            ],
        );

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("anim.gif");
        fs::write(&path, gif).unwrap();

        let result = load(&path).unwrap();
        assert_eq!(result.frame_count(), 3);
        assert_eq!((result.width, result.height), (10, 10));
        assert_eq!(
            result.frame_delays,
            vec![
                Duration::ZERO,
                Duration::from_nanos(100_000_000),
                Duration::from_nanos(500_000_000),
            ]
        );
        assert!(result.frames.iter().all(|f| f.len() == 400));

        let third = &result.frames[2];
        // Green top row, the middle frame's blue everywhere else.
        assert_eq!(&third[..4], &[0, 255, 0, 255]);
        assert_eq!(&third[396..], &[0, 0, 255, 255]);
    }

    #[test]
    fn test_zpl_end_to_end() {
        let options = LoadOptions::default();
        let src = b"^XA^PW50^LL25^FO0,0^GB50,25,1^FS^XZ\n^XA^FDsecond^FS^XZ\n";
        let result = load_bytes(src, &options).unwrap();

        assert_eq!(result.frame_count(), 1);
        assert_eq!(result.frame_delays, vec![Duration::ZERO]);
        assert_eq!(result.frames[0].len(), 50 * 25 * 4);
        assert_eq!(&result.frames[0][..4], &[0, 0, 0, 255]);
    }

    #[test]
    fn test_zpl_without_commands_is_parse_error() {
        let err = load_bytes(b"^XA hello ^XZ", &LoadOptions::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parse);
        assert!(!err.is_unsupported());
        assert!(err.to_string().starts_with("failed to read ZPL: "));
    }

    #[test]
    fn test_png_is_unsupported() {
        let mut png = Vec::new();
        image::RgbaImage::new(2, 2)
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();

        let err = load_bytes(&png, &LoadOptions::default()).unwrap_err();
        assert!(err.is_unsupported());
        assert!(err.to_string().contains("image/png"));
    }

    #[test]
    fn test_empty_file_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty");
        fs::write(&path, b"").unwrap();

        let err = load(&path).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedFormat);
    }

    #[test]
    fn test_missing_file_is_io() {
        let dir = tempfile::tempdir().unwrap();
        let err = load(dir.path().join("nope.gif")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(err.to_string().starts_with("failed to open file: "));
    }

    #[test]
    fn test_corrupt_gif_is_decode_error() {
        let err = load_bytes(b"GIF89a\x0a\x00", &LoadOptions::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Decode);
        assert!(err.to_string().starts_with("failed to read GIF: "));
    }

    #[test]
    fn test_oversized_graphic_row_is_parse_error() {
        let err = load_bytes(
            b"^XA^PW10^LL10^FO0,0^GFA,1,1,4000000000,0^FS^XZ",
            &LoadOptions::default(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parse);
    }
}

//! C ABI for foreign callers.
//!
//! Ownership contract, in two tiers:
//!
//! 1. Every frame buffer returned by [`LoadImage`] belongs to the caller and
//!    must be released with [`FreeImageFrame`], one call per frame.
//! 2. The envelope itself (error string, frame-pointer array, delay array) is
//!    released with exactly one [`FreeResult`] call. It never touches the frame
//!    buffers, so the two tiers may be released in either order, as long as
//!    the frame pointers are copied out before `FreeResult` frees the array
//!    holding them.
//!
//! Releasing anything twice is undefined behaviour.

use std::ffi::{c_char, c_int, c_uchar, c_ulong, CStr};
use std::mem::ManuallyDrop;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::ptr::{self, NonNull};
use std::sync::Once;
use std::time::Duration;

use thiserror::Error;

use crate::decoder::ImageResult;
use crate::error::LoadError;
use crate::loader;

static INIT_LOGGING: Once = Once::new();

/// Decoded frames as seen from C.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ImageData {
    pub width: c_int,
    pub height: c_int,
    pub frame_count: c_int,
    pub frames: *mut *mut c_uchar,
    /// Nanoseconds per frame.
    pub frame_delays: *mut c_ulong,
}

impl ImageData {
    const EMPTY: Self = Self {
        width: 0,
        height: 0,
        frame_count: 0,
        frames: ptr::null_mut(),
        frame_delays: ptr::null_mut(),
    };
}

/// Envelope returned by [`LoadImage`]: image data on success, `err` on
/// failure, never both.
#[repr(C)]
#[derive(Debug)]
pub struct LoadResult {
    pub data: ImageData,
    pub err: *mut c_char,
    pub is_unsupported_type: c_int,
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to allocate {bytes} bytes for the result")]
    Alloc { bytes: usize },
    #[error("{what} of {value} does not fit the C result")]
    TooLarge { what: &'static str, value: usize },
}

/// A `malloc`ed array this side still owns. Freed on drop unless handed
/// over with [`ForeignArray::into_raw`].
struct ForeignArray<T> {
    ptr: NonNull<T>,
    len: usize,
}

impl<T: Copy> ForeignArray<T> {
    fn from_slice(items: &[T]) -> Result<Self, ExportError> {
        // malloc(0) may legally return null, so always ask for one element.
        let bytes = std::mem::size_of::<T>()
            .checked_mul(items.len().max(1))
            .ok_or(ExportError::TooLarge {
                what: "allocation",
                value: items.len(),
            })?;

        let raw = unsafe { libc::malloc(bytes) }.cast::<T>();
        let ptr = NonNull::new(raw).ok_or(ExportError::Alloc { bytes })?;
        unsafe { ptr::copy_nonoverlapping(items.as_ptr(), ptr.as_ptr(), items.len()) };

        Ok(Self {
            ptr,
            len: items.len(),
        })
    }

    fn as_ptr(&self) -> *mut T {
        self.ptr.as_ptr()
    }

    /// Give up ownership; the caller now has to `free` the pointer.
    fn into_raw(self) -> *mut T {
        ManuallyDrop::new(self).ptr.as_ptr()
    }
}

impl<T> Drop for ForeignArray<T> {
    fn drop(&mut self) {
        log::trace!("Freeing unreleased array of {} elements", self.len);
        unsafe { libc::free(self.ptr.as_ptr().cast()) };
    }
}

/// The full result graph in C memory, still owned by Rust until
/// [`ExportedImage::into_raw`]. Dropping it frees everything.
struct ExportedImage {
    width: c_int,
    height: c_int,
    frames: Vec<ForeignArray<c_uchar>>,
    table: ForeignArray<*mut c_uchar>,
    delays: ForeignArray<c_ulong>,
}

fn to_c_int(what: &'static str, value: usize) -> Result<c_int, ExportError> {
    c_int::try_from(value).map_err(|_| ExportError::TooLarge { what, value })
}

fn delay_to_c(delay: Duration) -> c_ulong {
    c_ulong::try_from(delay.as_nanos()).unwrap_or(c_ulong::MAX)
}

impl ExportedImage {
    fn new(result: &ImageResult) -> Result<Self, ExportError> {
        let width = to_c_int("width", result.width as usize)?;
        let height = to_c_int("height", result.height as usize)?;
        to_c_int("frame count", result.frame_count())?;

        let frames = result
            .frames
            .iter()
            .map(|frame| ForeignArray::from_slice(frame))
            .collect::<Result<Vec<_>, _>>()?;

        let pointers: Vec<*mut c_uchar> = frames.iter().map(ForeignArray::as_ptr).collect();
        let table = ForeignArray::from_slice(&pointers)?;

        let delays: Vec<c_ulong> = result.frame_delays.iter().copied().map(delay_to_c).collect();
        let delays = ForeignArray::from_slice(&delays)?;

        Ok(Self {
            width,
            height,
            frames,
            table,
            delays,
        })
    }

    /// Hand every allocation over to the caller at once.
    fn into_raw(self) -> ImageData {
        let frame_count = self.frames.len() as c_int;
        for frame in self.frames {
            // Already recorded in `table`.
            let _ = frame.into_raw();
        }

        ImageData {
            width: self.width,
            height: self.height,
            frame_count,
            frames: self.table.into_raw(),
            frame_delays: self.delays.into_raw(),
        }
    }
}

impl LoadResult {
    fn success(image: ExportedImage) -> Self {
        Self {
            data: image.into_raw(),
            err: ptr::null_mut(),
            is_unsupported_type: 0,
        }
    }

    fn failure(message: &str, unsupported: bool) -> Self {
        let text: Vec<c_char> = message
            .bytes()
            .filter(|&b| b != 0)
            .chain(std::iter::once(0))
            .map(|b| b as c_char)
            .collect();

        let err = match ForeignArray::from_slice(&text) {
            Ok(text) => text.into_raw(),
            Err(e) => {
                log::error!("Dropping error message \"{}\": {}", message, e);
                ptr::null_mut()
            }
        };

        Self {
            data: ImageData::EMPTY,
            err,
            is_unsupported_type: c_int::from(unsupported),
        }
    }
}

fn init_logging() {
    INIT_LOGGING.call_once(|| {
        // The host may already have installed a logger.
        let _ = env_logger::try_init();
    });
}

/// Unix paths are arbitrary bytes; elsewhere the string must be UTF-8.
///
/// # Safety
/// `path` must be null or point to a NUL-terminated string that stays valid
/// for the duration of the call.
unsafe fn path_arg<'a>(path: *const c_char) -> Option<&'a Path> {
    if path.is_null() {
        return None;
    }
    let path = unsafe { CStr::from_ptr(path) };

    #[cfg(unix)]
    {
        use std::os::unix::ffi::OsStrExt;
        Some(Path::new(std::ffi::OsStr::from_bytes(path.to_bytes())))
    }
    #[cfg(not(unix))]
    {
        path.to_str().ok().map(Path::new)
    }
}

fn export(path: Option<&Path>) -> LoadResult {
    let loaded = path.ok_or(LoadError::InvalidPath).and_then(loader::load);

    match loaded {
        Ok(image) => match ExportedImage::new(&image) {
            Ok(exported) => LoadResult::success(exported),
            Err(e) => {
                log::error!("Failed to export image: {}", e);
                LoadResult::failure(&e.to_string(), false)
            }
        },
        Err(e) => {
            log::warn!("Failed to load image ({:?}): {}", e.kind(), e);
            LoadResult::failure(&e.to_string(), e.is_unsupported())
        }
    }
}

/// Release one frame buffer from a successful [`LoadImage`].
///
/// # Safety
/// `frame` must be null or a frame pointer from a [`LoadImage`] result that
/// has not been released yet.
pub unsafe fn release_frame(frame: *mut c_uchar) {
    if !frame.is_null() {
        unsafe { libc::free(frame.cast()) };
    }
}

/// Release an envelope: error string, frame-pointer array and delay array.
/// Frame buffers are not touched; see [`release_frame`].
///
/// # Safety
/// `result` must come from [`LoadImage`] and must not have been released.
pub unsafe fn release_envelope(result: LoadResult) {
    let LoadResult { data, err, .. } = result;
    unsafe {
        if !err.is_null() {
            libc::free(err.cast());
        }
        if !data.frames.is_null() {
            libc::free(data.frames.cast());
        }
        if !data.frame_delays.is_null() {
            libc::free(data.frame_delays.cast());
        }
    }
}

/// Decode the GIF or ZPL file at `path`.
///
/// # Safety
/// `path` must be null or a valid NUL-terminated string.
#[no_mangle]
#[allow(non_snake_case)]
pub unsafe extern "C" fn LoadImage(path: *const c_char) -> LoadResult {
    init_logging();

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        let path = unsafe { path_arg(path) };
        export(path)
    }));

    outcome.unwrap_or_else(|_| {
        log::error!("Panic while loading image");
        LoadResult::failure("internal error while loading image", false)
    })
}

/// Free a single frame buffer.
///
/// # Safety
/// See [`release_frame`].
#[no_mangle]
#[allow(non_snake_case)]
pub unsafe extern "C" fn FreeImageFrame(frame: *mut c_uchar) {
    unsafe { release_frame(frame) }
}

/// Free the envelope, but not the frame buffers.
///
/// # Safety
/// See [`release_envelope`].
#[no_mangle]
#[allow(non_snake_case)]
pub unsafe extern "C" fn FreeResult(result: LoadResult) {
    unsafe { release_envelope(result) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::gif_frames::tests::{encode_gif, TestFrame};
    use std::ffi::CString;
    use std::fs;
    use std::path::Path;
    use std::slice;

    fn c_path(path: &Path) -> CString {
        CString::new(path.to_str().unwrap()).unwrap()
    }

    fn load_file(name: &str, content: &[u8]) -> LoadResult {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        unsafe { LoadImage(c_path(&path).as_ptr()) }
    }

    fn error_message(result: &LoadResult) -> String {
        assert!(!result.err.is_null());
        unsafe { CStr::from_ptr(result.err) }
            .to_str()
            .unwrap()
            .to_string()
    }

    #[test]
    fn test_gif_round_trip_through_c_memory() {
        let gif = encode_gif(
            3,
            2,
            &[TestFrame::filled(3, 2, 1, 4), TestFrame::filled(3, 2, 2, 0)],
        );
        let result = load_file("a.gif", &gif);

        assert!(result.err.is_null());
        assert_eq!(result.is_unsupported_type, 0);
        assert_eq!(
            (result.data.width, result.data.height, result.data.frame_count),
            (3, 2, 2)
        );

        let count = result.data.frame_count as usize;
        let frames = unsafe { slice::from_raw_parts(result.data.frames, count) }.to_vec();
        let delays = unsafe { slice::from_raw_parts(result.data.frame_delays, count) }.to_vec();
        assert_eq!(delays, vec![40_000_000, 0]);

        let first = unsafe { slice::from_raw_parts(frames[0], 3 * 2 * 4) };
        assert_eq!(&first[..4], &[255, 0, 0, 255]);
        let second = unsafe { slice::from_raw_parts(frames[1], 3 * 2 * 4) };
        assert_eq!(&second[20..], &[0, 255, 0, 255]);

        // Envelope first, frames afterwards: the frames must survive FreeResult.
        unsafe { FreeResult(result) };
        assert_eq!(unsafe { *frames[1].add(1) }, 255);
        for frame in frames {
            unsafe { FreeImageFrame(frame) };
        }
    }

    #[test]
    fn test_frames_released_before_envelope() {
        let gif = encode_gif(1, 1, &[TestFrame::filled(1, 1, 3, 0)]);
        let result = load_file("b.gif", &gif);

        let frame = unsafe { *result.data.frames };
        unsafe {
            FreeImageFrame(frame);
            FreeResult(result);
        }
    }

    #[test]
    fn test_png_sets_unsupported_flag() {
        let mut png = Vec::new();
        image::RgbaImage::new(1, 1)
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        let result = load_file("c.png", &png);

        assert_eq!(result.is_unsupported_type, 1);
        assert_eq!(
            error_message(&result),
            "unsupported content type: image/png"
        );
        assert!(result.data.frames.is_null());
        assert!(result.data.frame_delays.is_null());
        assert_eq!(result.data.frame_count, 0);
        unsafe { FreeResult(result) };
    }

    #[test]
    fn test_parse_error_leaves_flag_unset() {
        let result = load_file("d.zpl", b"^XA hello ^XZ");

        assert_eq!(result.is_unsupported_type, 0);
        assert!(error_message(&result).starts_with("failed to read ZPL: failed to parse ZPL label: "));
        unsafe { FreeResult(result) };
    }

    #[test]
    fn test_zpl_single_frame() {
        let result = load_file("e.zpl", b"^XA^PW8^LL4^XZ^XA^PW16^LL16^XZ");

        assert!(result.err.is_null());
        assert_eq!(result.data.frame_count, 1);
        assert_eq!((result.data.width, result.data.height), (8, 4));
        let frame = unsafe { *result.data.frames };
        assert_eq!(unsafe { *result.data.frame_delays }, 0);
        unsafe {
            FreeImageFrame(frame);
            FreeResult(result);
        }
    }

    #[test]
    fn test_missing_file_and_null_path() {
        let dir = tempfile::tempdir().unwrap();
        let result = unsafe { LoadImage(c_path(&dir.path().join("missing.gif")).as_ptr()) };
        assert_eq!(result.is_unsupported_type, 0);
        assert!(error_message(&result).starts_with("failed to open file: "));
        unsafe { FreeResult(result) };

        let result = unsafe { LoadImage(ptr::null()) };
        assert_eq!(result.is_unsupported_type, 0);
        assert!(!result.err.is_null());
        unsafe { FreeResult(result) };
    }

    #[test]
    fn test_empty_file_fails_cleanly() {
        let result = load_file("empty", b"");
        assert_eq!(result.is_unsupported_type, 1);
        assert!(result.data.frames.is_null());
        unsafe { FreeResult(result) };
    }

    #[test]
    fn test_null_releases_are_noops() {
        unsafe {
            FreeImageFrame(ptr::null_mut());
            FreeResult(LoadResult {
                data: ImageData::EMPTY,
                err: ptr::null_mut(),
                is_unsupported_type: 0,
            });
        }
    }

    #[test]
    fn test_unexported_image_frees_itself() {
        let result = ImageResult {
            width: 2,
            height: 1,
            frames: vec![vec![7; 8], vec![9; 8]],
            frame_delays: vec![Duration::ZERO, Duration::from_millis(30)],
        };
        let exported = ExportedImage::new(&result).unwrap();
        assert_eq!(exported.frames.len(), 2);
        drop(exported);
    }

    #[test]
    fn test_error_message_drops_interior_nul() {
        let result = LoadResult::failure("bad\0name", false);
        assert_eq!(error_message(&result), "badname");
        unsafe { FreeResult(result) };
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_non_utf8_path() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(OsStr::from_bytes(b"lab\xffel.zpl"));
        fs::write(&path, b"^XA^PW4^LL4^XZ").unwrap();

        let raw = CString::new(path.as_os_str().as_bytes()).unwrap();
        let result = unsafe { LoadImage(raw.as_ptr()) };
        assert!(result.err.is_null());
        assert_eq!(result.data.frame_count, 1);

        let frame = unsafe { *result.data.frames };
        unsafe {
            FreeImageFrame(frame);
            FreeResult(result);
        }
    }
}

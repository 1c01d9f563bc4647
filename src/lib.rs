//! Decode GIF animations and ZPL labels into raw RGBA frames.
//!
//! Rust callers use [`load`] and get an [`ImageResult`] back. Foreign callers
//! go through the C ABI in [`ffi`] (`LoadImage`, `FreeImageFrame`,
//! `FreeResult`).

pub mod decoder;
pub mod error;
pub mod ffi;
pub mod loader;
pub mod zpl;

pub use decoder::detect::{detect, sniff_content_type, Detected};
pub use decoder::{Format, ImageResult};
pub use error::{DecodeError, ErrorKind, LoadError};
pub use loader::{load, load_bytes, load_with_options, LoadOptions};
pub use zpl::DrawerOptions;

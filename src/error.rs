use std::io;

use thiserror::Error;

use crate::decoder::Format;
use crate::zpl::{DrawError, ParseError};

/// Coarse classification of a failed load, inspected by matching rather than
/// by comparing error values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The file could not be opened or read.
    Io,
    /// Neither a GIF nor a ZPL label.
    UnsupportedFormat,
    /// GIF bitstream, label drawing or raster decode failed.
    Decode,
    /// ZPL command parsing failed.
    Parse,
    /// Decoding succeeded but produced nothing to return.
    EmptyResult,
}

/// Failure inside one of the format adapters or the compositor.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("{0}")]
    Gif(#[from] gif::DecodingError),
    #[error("frame {index} has a pixel buffer that does not match its size")]
    MalformedFrame { index: usize },
    #[error("failed to parse ZPL label: {0}")]
    Parse(#[from] ParseError),
    #[error("no ZPL labels to draw")]
    NoLabels,
    #[error("failed to draw ZPL label: {0}")]
    Draw(#[from] DrawError),
    #[error("failed to decode label raster: {0}")]
    Raster(#[from] image::ImageError),
    #[error("no frames to return")]
    NoFrames,
    #[error("first frame has no pixels")]
    EmptyCanvas,
}

impl DecodeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Parse(_) => ErrorKind::Parse,
            Self::NoLabels | Self::NoFrames => ErrorKind::EmptyResult,
            Self::Gif(_)
            | Self::MalformedFrame { .. }
            | Self::Draw(_)
            | Self::Raster(_)
            | Self::EmptyCanvas => ErrorKind::Decode,
        }
    }
}

/// Error returned by [`crate::load`] and friends.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to open file: {0}")]
    Open(#[source] io::Error),
    #[error("failed to read file content: {0}")]
    Read(#[source] io::Error),
    #[error("failed to open file: path is null or not representable on this platform")]
    InvalidPath,
    #[error("unsupported content type: {content_type}")]
    UnsupportedFormat { content_type: &'static str },
    #[error("failed to read {format}: {source}")]
    Decode {
        format: Format,
        #[source]
        source: DecodeError,
    },
}

impl LoadError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Open(_) | Self::Read(_) | Self::InvalidPath => ErrorKind::Io,
            Self::UnsupportedFormat { .. } => ErrorKind::UnsupportedFormat,
            Self::Decode { source, .. } => source.kind(),
        }
    }

    /// True only when the detector rejected the content outright.
    pub fn is_unsupported(&self) -> bool {
        self.kind() == ErrorKind::UnsupportedFormat
    }
}

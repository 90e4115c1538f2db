//! Crate-wide error and result types.

use std::path::PathBuf;
use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while decoding a SER file.
///
/// Header- and range-level variants abort a reconstruction before any slice
/// work begins. Per-slice failures are wrapped in [`Error::Slice`] with the
/// offending 1-based index. Geometry mismatches against the reference slice
/// are never errors; they surface as skip counts on the assembled stack.
#[derive(Debug, Error)]
pub enum Error {
    /// Byte-order mark was not the little-endian marker 0x4949.
    #[error("wrong byte order mark 0x{0:04x} (expected little-endian 0x4949)")]
    InvalidByteOrder(u16),

    /// Series signature word was not 0x0197.
    #[error("not an ES Vision series file (signature 0x{0:04x})")]
    InvalidFormatSignature(u16),

    /// Data kind other than the 2D image array constant.
    #[error("unsupported data kind 0x{0:04x} (only 2D image arrays are supported)")]
    UnsupportedDataKind(u32),

    /// More than one dimension declared; only flat image stacks are supported.
    #[error("unsupported dimension count {0} (only single images and image stacks are supported)")]
    UnsupportedDimensionCount(u32),

    /// The single dimension's declared size must equal the element count.
    #[error("dimension size {dimension_size} does not match total element count {total_elements}")]
    DimensionMismatch {
        dimension_size: u32,
        total_elements: u32,
    },

    /// Header's declared offset-table position does not match the parse
    /// position after the dimension descriptor. Signals a corrupt file or an
    /// unknown format variant.
    #[error("offset table declared at byte {declared} but header ends at byte {actual}")]
    StructuralCorruption { declared: u64, actual: u64 },

    /// Slice range invalid after negative-index normalization.
    #[error("invalid slice range: start {start}, end {end} ({valid} valid elements)")]
    InvalidRange { start: i64, end: i64, valid: u32 },

    /// Negative slice increment.
    #[error("negative slice increment {0} is not allowed")]
    InvalidIncrement(i64),

    /// Pixel element type code outside the documented 1..=8 map.
    #[error("unsupported pixel type code {0}")]
    UnsupportedPixelType(u16),

    /// width x height x element size overflowed usize.
    #[error("pixel payload size overflows: {width} x {height} x {elem_size} bytes")]
    PayloadTooLarge {
        width: u32,
        height: u32,
        elem_size: usize,
    },

    /// Hard per-slice failure; aborts the whole reconstruction.
    #[error("error decoding slice {index}: {source}")]
    Slice {
        index: u32,
        #[source]
        source: Box<Error>,
    },

    /// Reconstruction aborted through a [`CancelToken`](crate::ser::CancelToken).
    #[error("stack reconstruction cancelled")]
    Cancelled,

    /// Input file does not exist.
    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// Underlying read or seek failure, including short reads at EOF.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Wrap a per-slice decode failure with its 1-based element index.
    pub(crate) fn for_slice(index: u32) -> impl FnOnce(Error) -> Error {
        move |source| Error::Slice {
            index,
            source: Box::new(source),
        }
    }
}

//! SER file I/O entry points.
//!
//! Files are memory-mapped and decoded through cursors over the mapped
//! view, which keeps random access cheap and gives parallel workers
//! independent seek positions. The file handle and mapping are released on
//! every exit path, including header-parse failure, by ordinary drop order.

use std::fs::File;
use std::io::Cursor;
use std::path::Path;

use memmap2::Mmap;

use crate::error::{Error, Result};
use crate::ser::header::{FileHeader, OffsetTables};
use crate::ser::select::SliceSelection;
use crate::ser::stack::{assemble_parallel, assemble_sequential, CancelToken, SerStack};

/// Options for a stack reconstruction.
///
/// Start/end/increment are raw 1-based values; negative start/end count
/// from the end of the stack. Unset fields fall back to the full range
/// with increment 1.
#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    start: Option<i64>,
    end: Option<i64>,
    increment: Option<i64>,
    parallel: bool,
    cancel: Option<CancelToken>,
}

impl ReadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// First slice to read, 1-based; negative counts from the end.
    pub fn start(mut self, start: i64) -> Self {
        self.start = Some(start);
        self
    }

    /// Last slice to read, inclusive; negative counts from the end.
    pub fn end(mut self, end: i64) -> Self {
        self.end = Some(end);
        self
    }

    /// Step between slices. Zero reads the start slice only.
    pub fn increment(mut self, increment: i64) -> Self {
        self.increment = Some(increment);
        self
    }

    /// Decode slices on the rayon pool instead of sequentially.
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Attach a cancellation token, checked between slices.
    pub fn cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

fn open(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::NotFound(path.to_path_buf())
        } else {
            Error::Io(e)
        }
    })
}

/// Reconstruct the full image stack from a SER file.
///
/// # Example
/// ```ignore
/// let stack = serrs::ser::read_stack("series.ser")?;
/// assert_eq!(stack.skipped.len(), 0);
/// ```
pub fn read_stack<P: AsRef<Path>>(path: P) -> Result<SerStack> {
    read_stack_with(path, ReadOptions::default())
}

/// Reconstruct an image stack from a selected sub-range of a SER file.
///
/// # Example
/// ```ignore
/// use serrs::ser::ReadOptions;
///
/// // Last two slices of the series.
/// let stack = serrs::ser::read_stack_with(
///     "series.ser",
///     ReadOptions::new().start(-2).end(-1),
/// )?;
/// ```
#[allow(unsafe_code)]
pub fn read_stack_with<P: AsRef<Path>>(path: P, options: ReadOptions) -> Result<SerStack> {
    let path = path.as_ref();
    let file = open(path)?;
    // SAFETY: the file was just opened and the mapping is read-only.
    // External modification could make the data inconsistent but not
    // unsound; decode errors surface through normal validation.
    let mmap = unsafe { Mmap::map(&file)? };
    let bytes: &[u8] = &mmap;

    let mut cursor = Cursor::new(bytes);
    let header = FileHeader::parse(&mut cursor)?;
    let tables = OffsetTables::read(&mut cursor, header.total_elements)?;

    let valid = i64::from(header.valid_elements);
    let selection = SliceSelection::resolve(
        options.start.unwrap_or(1),
        options.end.unwrap_or(valid),
        options.increment.unwrap_or(1),
        header.valid_elements,
    )?;

    let cancel = options.cancel.as_ref();
    if options.parallel {
        assemble_parallel(bytes, &tables, &selection, cancel)
    } else {
        assemble_sequential(&mut cursor, &tables, &selection, cancel)
    }
}

/// Parse only the header of a SER file (fast metadata inspection).
#[allow(unsafe_code)]
pub fn read_header<P: AsRef<Path>>(path: P) -> Result<FileHeader> {
    let path = path.as_ref();
    let file = open(path)?;
    // SAFETY: mapping is read-only over a freshly opened file.
    let mmap = unsafe { Mmap::map(&file)? };
    FileHeader::parse(&mut Cursor::new(&mmap[..]))
}

//! SER (TIA / ES Vision) file format support.
//!
//! The format is described by Dr Chris Boothroyd's TIA file format notes:
//! a fixed little-endian prologue, a single dimension descriptor, two
//! parallel arrays of absolute byte offsets (data records, tag records),
//! and per-element records scattered at those offsets.

pub(crate) mod header;
pub mod io;
pub(crate) mod reader;
pub(crate) mod select;
pub(crate) mod slice;
pub(crate) mod stack;

pub use header::{DimensionDescriptor, FileHeader, OffsetTables};
pub use io::{read_header, read_stack, read_stack_with, ReadOptions};
pub use reader::SerRead;
pub use select::SliceSelection;
pub use slice::{PixelType, ResolvedSlice, SliceDataRecord, SliceTagRecord, UnitScale};
pub use stack::{CancelToken, SerStack, StackCalibration, StackSlice};

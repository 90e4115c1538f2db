//! Reader for `.ser` series files recorded by FEI's TIA (ES Vision)
//! electron-microscopy acquisition software.
//!
//! A SER file is a little-endian container holding a flat sequence of 2D
//! images ("elements"), each with its own calibration and acquisition-tag
//! record, located through two parallel offset tables. This crate decodes
//! the container and reconstructs an ordered image stack from a selected
//! sub-range of the sequence:
//!
//! ```ignore
//! let stack = serrs::ser::read_stack("dwell_series.ser")?;
//! for slice in &stack.slices {
//!     println!("{} {}x{} {}", slice.timestamp, slice.width, slice.height, slice.pixel_type);
//! }
//! ```
//!
//! Only 2D data is supported (no spectra), and the crate is decode-only.

pub mod error;
pub mod ser;

pub use error::{Error, Result};

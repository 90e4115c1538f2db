//! Stack assembly: drive the slice decoder over a selection, enforce
//! geometric consistency against the first decoded slice, and emit the
//! ordered result.
//!
//! Two-track failure model: a decode error on any slice is a hard failure
//! of the whole reconstruction, while a geometry/type mismatch against the
//! reference slice is a soft skip recorded on the output.

use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rayon::prelude::*;
use tracing::warn;

use crate::error::{Error, Result};
use crate::ser::header::OffsetTables;
use crate::ser::reader::SerRead;
use crate::ser::select::SliceSelection;
use crate::ser::slice::{decode_slice, PixelType, ResolvedSlice};

/// Cooperative cancellation handle, checked between slices.
///
/// Cloning is cheap; hand one clone to the reconstruction and keep the
/// other to abort it from elsewhere.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; the reconstruction stops at the next slice
    /// boundary with [`Error::Cancelled`].
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// One assembled slice, in display orientation.
#[derive(Debug, Clone)]
pub struct StackSlice {
    /// 1-based element index in the file.
    pub index: u32,
    pub width: u32,
    pub height: u32,
    pub pixel_type: PixelType,
    /// Raw little-endian pixel payload, rows already flipped to
    /// top-to-bottom display order.
    pub pixels: Vec<u8>,
    /// Calibrated pixel width in `unit_label` units.
    pub pixel_width: f64,
    /// Calibrated pixel height in `unit_label` units.
    pub pixel_height: f64,
    pub unit_label: &'static str,
    /// Local-time acquisition timestamp, `YYYY-MM-DD HH:mm:ss`.
    pub timestamp: String,
    /// Stage position at acquisition, meaningful when the header declares
    /// position tags.
    pub position_x: f64,
    pub position_y: f64,
}

/// Reference geometry and calibration, taken from the first decoded slice.
#[derive(Debug, Clone)]
pub struct StackCalibration {
    pub width: u32,
    pub height: u32,
    pub pixel_type: PixelType,
    pub pixel_width: f64,
    pub pixel_height: f64,
    pub unit_label: &'static str,
}

/// Result of a stack reconstruction.
#[derive(Debug, Clone)]
pub struct SerStack {
    /// Kept slices, ascending element index.
    pub slices: Vec<StackSlice>,
    /// 1-based indices soft-skipped for geometry/type mismatch.
    pub skipped: Vec<u32>,
    /// Reference calibration from the first slice; `None` only when the
    /// selection produced no slices at all.
    pub calibration: Option<StackCalibration>,
}

impl SerStack {
    /// Number of kept slices.
    pub fn len(&self) -> usize {
        self.slices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }
}

/// Per-slice outcome of the consistency check, consumed uniformly by the
/// assembly loop.
enum SliceOutcome {
    Keep(StackSlice),
    Skip { index: u32, reason: SkipReason },
}

#[derive(Debug)]
enum SkipReason {
    Geometry { width: u32, height: u32 },
    PixelFormat(PixelType),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Geometry { width, height } => write!(f, "wrong dimensions {width}x{height}"),
            Self::PixelFormat(t) => write!(f, "wrong pixel type {t}"),
        }
    }
}

/// Read one slice's pixel payload and flip it into display orientation.
///
/// SER stores rows bottom-to-top relative to conventional display order.
fn read_payload<R: SerRead + ?Sized>(r: &mut R, slice: &ResolvedSlice) -> Result<Vec<u8>> {
    let len = slice.data.payload_len()?;
    r.seek_to(slice.data.pixel_data_start)?;
    let mut pixels = r.read_exact_bytes(len)?;
    flip_rows(&mut pixels, slice.data.row_bytes());
    Ok(pixels)
}

/// Reverse the row order of a raw pixel buffer in place.
fn flip_rows(pixels: &mut [u8], row_bytes: usize) {
    if row_bytes == 0 {
        return;
    }
    let rows = pixels.len() / row_bytes;
    for y in 0..rows / 2 {
        let (head, tail) = pixels.split_at_mut((rows - 1 - y) * row_bytes);
        head[y * row_bytes..(y + 1) * row_bytes].swap_with_slice(&mut tail[..row_bytes]);
    }
}

/// Incremental reducer shared by the sequential and parallel drivers.
struct Assembler {
    reference: Option<StackCalibration>,
    slices: Vec<StackSlice>,
    skipped: Vec<u32>,
}

impl Assembler {
    fn new(capacity: usize) -> Self {
        Self {
            reference: None,
            slices: Vec::with_capacity(capacity),
            skipped: Vec::new(),
        }
    }

    /// Check a decoded slice against the reference geometry and fold it in.
    fn push(&mut self, resolved: ResolvedSlice, pixels: Vec<u8>) {
        let outcome = match &self.reference {
            Some(cal) if resolved.data.pixel_type != cal.pixel_type => SliceOutcome::Skip {
                index: resolved.index,
                reason: SkipReason::PixelFormat(resolved.data.pixel_type),
            },
            Some(cal) if resolved.data.width != cal.width || resolved.data.height != cal.height => {
                SliceOutcome::Skip {
                    index: resolved.index,
                    reason: SkipReason::Geometry {
                        width: resolved.data.width,
                        height: resolved.data.height,
                    },
                }
            }
            _ => SliceOutcome::Keep(StackSlice {
                index: resolved.index,
                width: resolved.data.width,
                height: resolved.data.height,
                pixel_type: resolved.data.pixel_type,
                pixels,
                pixel_width: resolved.pixel_width,
                pixel_height: resolved.pixel_height,
                unit_label: resolved.unit.label,
                timestamp: resolved.timestamp,
                position_x: resolved.tag.position_x,
                position_y: resolved.tag.position_y,
            }),
        };

        match outcome {
            SliceOutcome::Keep(slice) => {
                if self.reference.is_none() {
                    self.reference = Some(StackCalibration {
                        width: slice.width,
                        height: slice.height,
                        pixel_type: slice.pixel_type,
                        pixel_width: slice.pixel_width,
                        pixel_height: slice.pixel_height,
                        unit_label: slice.unit_label,
                    });
                }
                self.slices.push(slice);
            }
            SliceOutcome::Skip { index, reason } => {
                warn!(index, %reason, "slice skipped");
                self.skipped.push(index);
            }
        }
    }

    fn finish(self) -> SerStack {
        SerStack {
            slices: self.slices,
            skipped: self.skipped,
            calibration: self.reference,
        }
    }
}

/// Decode the selected slices one by one on a single reader handle.
pub(crate) fn assemble_sequential<R: SerRead + ?Sized>(
    r: &mut R,
    tables: &OffsetTables,
    selection: &SliceSelection,
    cancel: Option<&CancelToken>,
) -> Result<SerStack> {
    let mut assembler = Assembler::new(selection.len());
    for index in selection.indices() {
        if cancel.is_some_and(CancelToken::is_cancelled) {
            return Err(Error::Cancelled);
        }
        let resolved = decode_slice(r, tables, index).map_err(Error::for_slice(index))?;
        let pixels = read_payload(r, &resolved).map_err(Error::for_slice(index))?;
        assembler.push(resolved, pixels);
    }
    Ok(assembler.finish())
}

/// Decode the selected slices in parallel, each worker on its own cursor
/// over the shared byte view, then reduce back into ascending index order.
///
/// The first hard failure wins and aborts the remaining in-flight work.
pub(crate) fn assemble_parallel(
    bytes: &[u8],
    tables: &OffsetTables,
    selection: &SliceSelection,
    cancel: Option<&CancelToken>,
) -> Result<SerStack> {
    let abort = AtomicBool::new(false);
    let indices: Vec<u32> = selection.indices().collect();

    let decoded: Vec<Result<(ResolvedSlice, Vec<u8>)>> = indices
        .par_iter()
        .map(|&index| {
            if abort.load(Ordering::Relaxed) || cancel.is_some_and(CancelToken::is_cancelled) {
                return Err(Error::Cancelled);
            }
            let mut cursor = Cursor::new(bytes);
            let result = decode_slice(&mut cursor, tables, index)
                .and_then(|resolved| {
                    let pixels = read_payload(&mut cursor, &resolved)?;
                    Ok((resolved, pixels))
                })
                .map_err(Error::for_slice(index));
            if result.is_err() {
                abort.store(true, Ordering::Relaxed);
            }
            result
        })
        .collect();

    // Collect preserves submission order, so the reduction below sees
    // ascending indices. A worker that observed the abort flag reports
    // Cancelled; the underlying hard failure takes precedence over it.
    let mut hard: Option<Error> = None;
    let mut cancelled = false;
    let mut results = Vec::with_capacity(decoded.len());
    for item in decoded {
        match item {
            Ok(pair) => results.push(pair),
            Err(Error::Cancelled) => cancelled = true,
            Err(e) => {
                if hard.is_none() {
                    hard = Some(e);
                }
            }
        }
    }
    if let Some(e) = hard {
        return Err(e);
    }
    if cancelled {
        return Err(Error::Cancelled);
    }

    let mut assembler = Assembler::new(results.len());
    for (resolved, pixels) in results {
        assembler.push(resolved, pixels);
    }
    Ok(assembler.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flip_rows_reverses_row_order() {
        // 3 rows of 4 bytes each.
        let mut pixels = vec![
            1, 1, 1, 1, //
            2, 2, 2, 2, //
            3, 3, 3, 3,
        ];
        flip_rows(&mut pixels, 4);
        assert_eq!(pixels, vec![3, 3, 3, 3, 2, 2, 2, 2, 1, 1, 1, 1]);
    }

    #[test]
    fn test_flip_rows_even_count() {
        let mut pixels = vec![1, 2, 3, 4];
        flip_rows(&mut pixels, 2);
        assert_eq!(pixels, vec![3, 4, 1, 2]);
    }

    #[test]
    fn test_flip_rows_single_row_unchanged() {
        let mut pixels = vec![9, 8, 7];
        flip_rows(&mut pixels, 3);
        assert_eq!(pixels, vec![9, 8, 7]);
    }

    #[test]
    fn test_cancel_token() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }
}

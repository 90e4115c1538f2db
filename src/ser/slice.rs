//! Per-element decoding: calibration + pixel-layout records, acquisition
//! tags, unit-scale derivation and timestamp labels.

use chrono::{Local, TimeZone};

use crate::error::{Error, Result};
use crate::ser::header::OffsetTables;
use crate::ser::reader::SerRead;

/// Pixel element type of a 2D data record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelType {
    /// 8-bit unsigned integer
    UInt8,
    /// 16-bit unsigned integer
    UInt16,
    /// 32-bit unsigned integer
    UInt32,
    /// 16-bit signed integer
    Int16,
    /// 32-bit signed integer
    Int32,
    /// 32-bit floating point
    Float32,
    /// 64-bit floating point
    Float64,
}

impl PixelType {
    /// Parse from the on-disk pixel element type code.
    ///
    /// Codes 4 and 5 both denote 16-bit signed data (the format defines 5 as
    /// a distinct signed variant that decodes identically).
    pub fn from_code(code: u16) -> Result<Self> {
        match code {
            1 => Ok(Self::UInt8),
            2 => Ok(Self::UInt16),
            3 => Ok(Self::UInt32),
            4 | 5 => Ok(Self::Int16),
            6 => Ok(Self::Int32),
            7 => Ok(Self::Float32),
            8 => Ok(Self::Float64),
            _ => Err(Error::UnsupportedPixelType(code)),
        }
    }

    /// Size of each pixel element in bytes.
    pub const fn byte_size(self) -> usize {
        match self {
            Self::UInt8 => 1,
            Self::UInt16 | Self::Int16 => 2,
            Self::UInt32 | Self::Int32 | Self::Float32 => 4,
            Self::Float64 => 8,
        }
    }

    /// Get the Rust type name for documentation.
    pub const fn type_name(self) -> &'static str {
        match self {
            Self::UInt8 => "u8",
            Self::UInt16 => "u16",
            Self::UInt32 => "u32",
            Self::Int16 => "i16",
            Self::Int32 => "i32",
            Self::Float32 => "f32",
            Self::Float64 => "f64",
        }
    }
}

impl std::fmt::Display for PixelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.type_name())
    }
}

/// Human-scaled unit for calibrated pixel sizes.
///
/// The format stores calibration deltas in meters. For measurements and
/// scale bars the reported values should not be far below 1.0, so the image
/// width is repeatedly scaled by 1000 until it reaches 10. The level count
/// selects the unit label and the factor applied to both deltas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnitScale {
    /// Number of 1000x steps below a meter (1 is mm, 2 is um, ...).
    pub level: u32,
    /// Unit label for the scaled deltas.
    pub label: &'static str,
    /// `1000^level`, the factor applied to the calibration deltas.
    pub factor: f64,
}

/// Past this level the width is below anything physical; stop scaling so a
/// zero or denormal delta cannot spin the loop forever.
const MAX_UNIT_LEVEL: u32 = 6;

impl UnitScale {
    /// Derive the unit scale from the physical image width in meters
    /// (`calibration delta x * array width`).
    pub fn from_width_meters(width_m: f64) -> Self {
        let mut level = 0;
        let mut width = width_m;
        while width < 10.0 && level < MAX_UNIT_LEVEL {
            level += 1;
            width *= 1000.0;
        }
        let label = match level {
            0 => "m",
            1 => "mm",
            2 => "µm",
            3 => "nm",
            4 => "pm",
            5 => "fm",
            _ => "arb. u.",
        };
        Self {
            level,
            label,
            factor: 1000f64.powi(level as i32),
        }
    }
}

/// Per-element calibration and pixel-layout record.
///
/// The raw pixel payload is not read here; only its location and shape are
/// resolved. Bulk transfer happens during stack assembly.
#[derive(Debug, Clone)]
pub struct SliceDataRecord {
    pub cal_offset_x: f64,
    pub cal_delta_x: f64,
    pub cal_element_x: u32,
    pub cal_offset_y: f64,
    pub cal_delta_y: f64,
    pub cal_element_y: u32,
    pub pixel_type: PixelType,
    /// Pixel columns.
    pub width: u32,
    /// Pixel rows.
    pub height: u32,
    /// Absolute byte offset where the raw pixel payload begins.
    pub pixel_data_start: u64,
}

impl SliceDataRecord {
    fn read<R: SerRead + ?Sized>(r: &mut R, offset: u64) -> Result<Self> {
        r.seek_to(offset)?;
        let cal_offset_x = r.read_f64()?;
        let cal_delta_x = r.read_f64()?;
        let cal_element_x = r.read_u32()?;
        let cal_offset_y = r.read_f64()?;
        let cal_delta_y = r.read_f64()?;
        let cal_element_y = r.read_u32()?;
        let type_code = r.read_u16()?;
        let pixel_type = PixelType::from_code(type_code)?;
        let width = r.read_u32()?;
        let height = r.read_u32()?;
        let pixel_data_start = r.position()?;
        Ok(Self {
            cal_offset_x,
            cal_delta_x,
            cal_element_x,
            cal_offset_y,
            cal_delta_y,
            cal_element_y,
            pixel_type,
            width,
            height,
            pixel_data_start,
        })
    }

    /// Raw payload size in bytes, width x height x element size.
    pub fn payload_len(&self) -> Result<usize> {
        let elem_size = self.pixel_type.byte_size();
        (self.width as usize)
            .checked_mul(self.height as usize)
            .and_then(|n| n.checked_mul(elem_size))
            .ok_or(Error::PayloadTooLarge {
                width: self.width,
                height: self.height,
                elem_size,
            })
    }

    /// Bytes per pixel row.
    pub fn row_bytes(&self) -> usize {
        self.width as usize * self.pixel_type.byte_size()
    }
}

/// Per-element acquisition tag record.
///
/// The record layout is fixed-size relative to the declared tag kind: the
/// position fields are read even for time-only tag kinds, since files
/// observed in the wild carry the bytes regardless (zero-filled when the
/// stage position was not recorded).
#[derive(Debug, Clone)]
pub struct SliceTagRecord {
    /// Tag kind word, expected to echo the header's tag kind.
    pub tag_kind: u16,
    /// Acquisition time, seconds since the Unix epoch. Stored as a 32-bit
    /// value on disk, widened for millisecond conversion.
    pub epoch_seconds: i64,
    pub position_x: f64,
    pub position_y: f64,
}

impl SliceTagRecord {
    fn read<R: SerRead + ?Sized>(r: &mut R, offset: u64) -> Result<Self> {
        r.seek_to(offset)?;
        let tag_kind = r.read_u16()?;
        // 2 undocumented bytes, vendor padding per Boothroyd's format notes.
        let _reserved = r.read_u16()?;
        let epoch_seconds = i64::from(r.read_i32()?);
        let position_x = r.read_f64()?;
        let position_y = r.read_f64()?;
        Ok(Self {
            tag_kind,
            epoch_seconds,
            position_x,
            position_y,
        })
    }

    /// Acquisition time as a local-zone `YYYY-MM-DD HH:mm:ss` label.
    pub fn timestamp_label(&self) -> String {
        Local
            .timestamp_opt(self.epoch_seconds, 0)
            .single()
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| format!("{} s since epoch", self.epoch_seconds))
    }
}

/// Fully decoded element: both records plus the derived presentation data.
#[derive(Debug, Clone)]
pub struct ResolvedSlice {
    /// 1-based logical element index.
    pub index: u32,
    pub data: SliceDataRecord,
    pub tag: SliceTagRecord,
    /// Unit scale derived from the physical image width.
    pub unit: UnitScale,
    /// Calibrated pixel width, `cal_delta_x * unit.factor`.
    pub pixel_width: f64,
    /// Calibrated pixel height, `cal_delta_y * unit.factor`.
    pub pixel_height: f64,
    /// Local-time acquisition timestamp label.
    pub timestamp: String,
}

/// Decode one element's data and tag records.
///
/// Seeks to the element's table offsets; no state is cached across calls,
/// so decodes of different indices on independent reader handles are safe.
pub fn decode_slice<R: SerRead + ?Sized>(
    r: &mut R,
    tables: &OffsetTables,
    index: u32,
) -> Result<ResolvedSlice> {
    let (data_offset, tag_offset) = tables.offsets(index).ok_or(Error::InvalidRange {
        start: i64::from(index),
        end: i64::from(index),
        valid: tables.len() as u32,
    })?;

    let data = SliceDataRecord::read(r, data_offset)?;
    let tag = SliceTagRecord::read(r, tag_offset)?;

    let unit = UnitScale::from_width_meters(data.cal_delta_x * f64::from(data.width));
    let pixel_width = data.cal_delta_x * unit.factor;
    let pixel_height = data.cal_delta_y * unit.factor;
    let timestamp = tag.timestamp_label();

    Ok(ResolvedSlice {
        index,
        data,
        tag,
        unit,
        pixel_width,
        pixel_height,
        timestamp,
    })
}

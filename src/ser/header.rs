//! SER header parsing and offset table reading.
//!
//! The prologue is a fixed sequence of little-endian words followed by a
//! single dimension descriptor. The file version decides whether the
//! offset-table-start field is 32-bit (pre-TIA 4.7) or 64-bit.

use tracing::debug;

use crate::error::{Error, Result};
use crate::ser::reader::SerRead;

/// Byte-order mark, ASCII "II" (little-endian, Intel ordering).
pub const BYTE_ORDER_MARK: u16 = 0x4949;

/// Series identification word of an ES Vision data file.
pub const SERIES_SIGNATURE: u16 = 0x0197;

/// Versions at or above this store the offset-table-start field as 64-bit.
pub const VERSION_WIDE_OFFSETS: u16 = 0x0220;

/// Data kind constant for a sequence of 2D image arrays.
pub const DATA_KIND_2D: u32 = 0x4122;

/// Tag kind constant for tags that carry time plus stage position.
pub const TAG_KIND_TIME_POSITION: u32 = 0x4142;

/// Descriptor of the single declared dimension.
///
/// Read once during header parsing; its calibration describes the slice
/// axis (time, energy, ...) and is diagnostic only, it plays no part in
/// pixel decoding.
#[derive(Debug, Clone)]
pub struct DimensionDescriptor {
    /// Number of elements along this dimension (the stack depth).
    pub size: u32,
    /// Calibration offset along the slice axis.
    pub calibration_offset: f64,
    /// Calibration delta (step size) along the slice axis.
    pub calibration_delta: f64,
    /// Index of the element the calibration offset refers to.
    pub calibrated_element: u32,
    /// Free-text axis description, decoded one byte per character.
    pub description: String,
    /// Unit string, decoded one byte per character.
    pub unit: String,
}

impl DimensionDescriptor {
    fn parse<R: SerRead + ?Sized>(r: &mut R) -> Result<Self> {
        let size = r.read_u32()?;
        let calibration_offset = r.read_f64()?;
        let calibration_delta = r.read_f64()?;
        let calibrated_element = r.read_u32()?;
        let description = read_prefixed_string(r)?;
        let unit = read_prefixed_string(r)?;
        Ok(Self {
            size,
            calibration_offset,
            calibration_delta,
            calibrated_element,
            description,
            unit,
        })
    }
}

/// Length-prefixed text field. The format predates any charset convention;
/// bytes map straight to chars without validation.
fn read_prefixed_string<R: SerRead + ?Sized>(r: &mut R) -> Result<String> {
    let len = r.read_u32()? as usize;
    let bytes = r.read_exact_bytes(len)?;
    Ok(bytes.iter().map(|&b| b as char).collect())
}

/// Validated, immutable SER file header.
///
/// Produced once by [`FileHeader::parse`] and threaded by value through the
/// decoding session; no parse step mutates shared state.
#[derive(Debug, Clone)]
pub struct FileHeader {
    /// Format version word; decides the offset-table-start field width.
    pub version: u16,
    /// Data kind; always [`DATA_KIND_2D`] after validation.
    pub data_kind: u32,
    /// Tag kind; see [`FileHeader::pos_tags`].
    pub tag_kind: u32,
    /// Capacity of both offset tables (elements initialized by TIA).
    pub total_elements: u32,
    /// Number of elements actually recorded, <= `total_elements`.
    pub valid_elements: u32,
    /// Absolute byte position of the data offset table.
    pub offset_table_start: u64,
    /// Declared dimension count; always 1 after validation.
    pub dimension_count: u32,
    /// The single dimension descriptor.
    pub dimension: DimensionDescriptor,
}

impl FileHeader {
    /// Parse and validate the header from a reader positioned at offset 0.
    ///
    /// On success the reader is left at [`FileHeader::offset_table_start`],
    /// ready for [`OffsetTables::read`].
    pub fn parse<R: SerRead + ?Sized>(r: &mut R) -> Result<Self> {
        let byte_order = r.read_u16()?;
        if byte_order != BYTE_ORDER_MARK {
            return Err(Error::InvalidByteOrder(byte_order));
        }

        let signature = r.read_u16()?;
        if signature != SERIES_SIGNATURE {
            return Err(Error::InvalidFormatSignature(signature));
        }

        let version = r.read_u16()?;

        let data_kind = r.read_u32()?;
        if data_kind != DATA_KIND_2D {
            return Err(Error::UnsupportedDataKind(data_kind));
        }

        // Any tag kind is accepted; tag records are read with a fixed-size
        // layout either way (position fields are present on disk even for
        // time-only files, see SliceTagRecord).
        let tag_kind = r.read_u32()?;

        let total_elements = r.read_u32()?;
        let valid_elements = r.read_u32()?;

        let offset_table_start = if version < VERSION_WIDE_OFFSETS {
            u64::from(r.read_u32()?)
        } else {
            r.read_u64()?
        };

        let dimension_count = r.read_u32()?;
        if dimension_count != 1 {
            return Err(Error::UnsupportedDimensionCount(dimension_count));
        }

        let dimension = DimensionDescriptor::parse(r)?;
        if dimension.size != total_elements {
            return Err(Error::DimensionMismatch {
                dimension_size: dimension.size,
                total_elements,
            });
        }

        // The descriptor must end exactly where the file says the offset
        // table begins; anything else means a parser/format mismatch.
        let actual = r.position()?;
        if actual != offset_table_start {
            return Err(Error::StructuralCorruption {
                declared: offset_table_start,
                actual,
            });
        }

        debug!(
            version,
            total_elements, valid_elements, offset_table_start, "parsed SER header"
        );

        Ok(Self {
            version,
            data_kind,
            tag_kind,
            total_elements,
            valid_elements,
            offset_table_start,
            dimension_count,
            dimension,
        })
    }

    /// Whether tag records carry meaningful stage-position values.
    pub fn pos_tags(&self) -> bool {
        self.tag_kind == TAG_KIND_TIME_POSITION
    }

    /// Whether the header stored its offset-table-start field as 64-bit.
    pub fn wide_offsets(&self) -> bool {
        self.version >= VERSION_WIDE_OFFSETS
    }
}

/// The two parallel offset tables, one entry per logical element.
///
/// Built once after the header parse, immutable afterward. Entries are
/// always stored as 64-bit values on disk regardless of the header's
/// offset-field width. Offset values themselves are not validated here;
/// bad offsets surface as read failures at slice-decode time.
#[derive(Debug, Clone)]
pub struct OffsetTables {
    data: Vec<u64>,
    tags: Vec<u64>,
}

impl OffsetTables {
    /// Read both tables from a reader positioned at the table start:
    /// `total_elements` data offsets, then `total_elements` tag offsets.
    pub fn read<R: SerRead + ?Sized>(r: &mut R, total_elements: u32) -> Result<Self> {
        let n = total_elements as usize;
        let mut data = Vec::with_capacity(n);
        for _ in 0..n {
            data.push(r.read_u64()?);
        }
        let mut tags = Vec::with_capacity(n);
        for _ in 0..n {
            tags.push(r.read_u64()?);
        }
        debug!(elements = n, "read offset tables");
        Ok(Self { data, tags })
    }

    /// Number of elements covered by both tables.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Data and tag record offsets for a 1-based element index.
    pub fn offsets(&self, index: u32) -> Option<(u64, u64)> {
        let i = (index as usize).checked_sub(1)?;
        Some((*self.data.get(i)?, *self.tags.get(i)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::{LittleEndian, WriteBytesExt};
    use std::io::Cursor;

    /// Serialize a minimal valid header (no elements) for the given version.
    fn header_bytes(version: u16, dimension_size: u32, total_elements: u32) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.write_u16::<LittleEndian>(BYTE_ORDER_MARK).unwrap();
        buf.write_u16::<LittleEndian>(SERIES_SIGNATURE).unwrap();
        buf.write_u16::<LittleEndian>(version).unwrap();
        buf.write_u32::<LittleEndian>(DATA_KIND_2D).unwrap();
        buf.write_u32::<LittleEndian>(TAG_KIND_TIME_POSITION).unwrap();
        buf.write_u32::<LittleEndian>(total_elements).unwrap();
        buf.write_u32::<LittleEndian>(total_elements).unwrap();

        // Fixed prologue + offset field + dimension count + descriptor with
        // a 2-char description and 1-char unit.
        let descr = b"ab";
        let unit = b"s";
        let offset_field_len = if version < VERSION_WIDE_OFFSETS { 4 } else { 8 };
        let table_start =
            buf.len() as u64 + offset_field_len + 4 + 4 + 8 + 8 + 4 + 4 + descr.len() as u64 + 4 + unit.len() as u64;

        if version < VERSION_WIDE_OFFSETS {
            buf.write_u32::<LittleEndian>(table_start as u32).unwrap();
        } else {
            buf.write_u64::<LittleEndian>(table_start).unwrap();
        }
        buf.write_u32::<LittleEndian>(1).unwrap(); // dimension count
        buf.write_u32::<LittleEndian>(dimension_size).unwrap();
        buf.write_f64::<LittleEndian>(0.0).unwrap(); // calibration offset
        buf.write_f64::<LittleEndian>(1.0).unwrap(); // calibration delta
        buf.write_u32::<LittleEndian>(0).unwrap(); // calibrated element
        buf.write_u32::<LittleEndian>(descr.len() as u32).unwrap();
        buf.extend_from_slice(descr);
        buf.write_u32::<LittleEndian>(unit.len() as u32).unwrap();
        buf.extend_from_slice(unit);
        buf
    }

    #[test]
    fn test_parse_legacy_version_narrow_offset_field() {
        let bytes = header_bytes(0x0210, 0, 0);
        let header = FileHeader::parse(&mut Cursor::new(&bytes)).unwrap();
        assert!(!header.wide_offsets());
        assert_eq!(header.offset_table_start, bytes.len() as u64);
    }

    #[test]
    fn test_parse_current_version_wide_offset_field() {
        let bytes = header_bytes(0x0220, 0, 0);
        let header = FileHeader::parse(&mut Cursor::new(&bytes)).unwrap();
        assert!(header.wide_offsets());
        assert_eq!(header.offset_table_start, bytes.len() as u64);
        assert_eq!(header.dimension.description, "ab");
        assert_eq!(header.dimension.unit, "s");
    }

    #[test]
    fn test_wrong_byte_order_mark() {
        let mut bytes = header_bytes(0x0220, 0, 0);
        bytes[0] = 0x4d; // "MM", big-endian mark
        bytes[1] = 0x4d;
        let err = FileHeader::parse(&mut Cursor::new(&bytes)).unwrap_err();
        assert!(matches!(err, Error::InvalidByteOrder(0x4d4d)));
    }

    #[test]
    fn test_wrong_signature() {
        let mut bytes = header_bytes(0x0220, 0, 0);
        bytes[2] = 0x00;
        bytes[3] = 0x00;
        let err = FileHeader::parse(&mut Cursor::new(&bytes)).unwrap_err();
        assert!(matches!(err, Error::InvalidFormatSignature(0)));
    }

    #[test]
    fn test_one_dimensional_data_rejected() {
        let mut bytes = header_bytes(0x0220, 0, 0);
        // Data kind sits right after the three u16 words.
        bytes[6..10].copy_from_slice(&0x4120u32.to_le_bytes());
        let err = FileHeader::parse(&mut Cursor::new(&bytes)).unwrap_err();
        assert!(matches!(err, Error::UnsupportedDataKind(0x4120)));
    }

    #[test]
    fn test_dimension_size_mismatch() {
        let bytes = header_bytes(0x0220, 3, 5);
        let err = FileHeader::parse(&mut Cursor::new(&bytes)).unwrap_err();
        assert!(matches!(
            err,
            Error::DimensionMismatch {
                dimension_size: 3,
                total_elements: 5
            }
        ));
    }

    #[test]
    fn test_declared_table_start_mismatch_is_structural_corruption() {
        let mut bytes = header_bytes(0x0220, 0, 0);
        // Nudge the declared offset-table start (bytes 22..30 for v2).
        let declared = u64::from_le_bytes(bytes[22..30].try_into().unwrap());
        bytes[22..30].copy_from_slice(&(declared + 1).to_le_bytes());
        let err = FileHeader::parse(&mut Cursor::new(&bytes)).unwrap_err();
        assert!(matches!(err, Error::StructuralCorruption { .. }));
    }

    #[test]
    fn test_offset_tables_one_based_lookup() {
        let mut buf = Vec::new();
        for v in [100u64, 200, 300] {
            buf.write_u64::<LittleEndian>(v).unwrap();
        }
        for v in [1000u64, 2000, 3000] {
            buf.write_u64::<LittleEndian>(v).unwrap();
        }
        let tables = OffsetTables::read(&mut Cursor::new(&buf), 3).unwrap();
        assert_eq!(tables.len(), 3);
        assert_eq!(tables.offsets(1), Some((100, 1000)));
        assert_eq!(tables.offsets(3), Some((300, 3000)));
        assert_eq!(tables.offsets(0), None);
        assert_eq!(tables.offsets(4), None);
    }
}

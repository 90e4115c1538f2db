//! Little-endian byte reader capability.
//!
//! All fixed-width field decoding goes through this trait so the record
//! parsers stay free of bit-shift arithmetic. Short reads surface as
//! `Error::Io` with `UnexpectedEof`.

use std::io::{Read, Seek, SeekFrom};

use byteorder::{LittleEndian, ReadBytesExt};

use crate::error::Result;

/// Random-access source of little-endian fixed-width values.
///
/// Blanket-implemented for anything `Read + Seek`, which covers both a
/// `File` and a `Cursor` over a memory-mapped view. Every decode call
/// reseeks independently, so concurrent decoding is safe as long as each
/// worker holds its own handle.
pub trait SerRead {
    /// Seek to an absolute byte offset.
    fn seek_to(&mut self, offset: u64) -> Result<()>;

    /// Current absolute byte offset.
    fn position(&mut self) -> Result<u64>;

    fn read_u16(&mut self) -> Result<u16>;
    fn read_u32(&mut self) -> Result<u32>;
    fn read_i32(&mut self) -> Result<i32>;
    fn read_u64(&mut self) -> Result<u64>;
    fn read_f64(&mut self) -> Result<f64>;

    /// Read exactly `len` raw bytes.
    fn read_exact_bytes(&mut self, len: usize) -> Result<Vec<u8>>;
}

impl<R: Read + Seek> SerRead for R {
    fn seek_to(&mut self, offset: u64) -> Result<()> {
        self.seek(SeekFrom::Start(offset))?;
        Ok(())
    }

    fn position(&mut self) -> Result<u64> {
        Ok(self.stream_position()?)
    }

    fn read_u16(&mut self) -> Result<u16> {
        Ok(ReadBytesExt::read_u16::<LittleEndian>(self)?)
    }

    fn read_u32(&mut self) -> Result<u32> {
        Ok(ReadBytesExt::read_u32::<LittleEndian>(self)?)
    }

    fn read_i32(&mut self) -> Result<i32> {
        Ok(ReadBytesExt::read_i32::<LittleEndian>(self)?)
    }

    fn read_u64(&mut self) -> Result<u64> {
        Ok(ReadBytesExt::read_u64::<LittleEndian>(self)?)
    }

    fn read_f64(&mut self) -> Result<f64> {
        Ok(ReadBytesExt::read_f64::<LittleEndian>(self)?)
    }

    fn read_exact_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::io::Cursor;

    #[test]
    fn test_little_endian_reads() {
        let bytes = [
            0x49, 0x49, // u16 0x4949
            0x78, 0x56, 0x34, 0x12, // u32 0x12345678
            0xff, 0xff, 0xff, 0xff, // i32 -1
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x40, // f64 2.0
        ];
        let mut cursor = Cursor::new(&bytes[..]);
        assert_eq!(SerRead::read_u16(&mut cursor).unwrap(), 0x4949);
        assert_eq!(SerRead::read_u32(&mut cursor).unwrap(), 0x1234_5678);
        assert_eq!(SerRead::read_i32(&mut cursor).unwrap(), -1);
        assert_eq!(SerRead::read_f64(&mut cursor).unwrap(), 2.0);
        assert_eq!(SerRead::position(&mut cursor).unwrap(), bytes.len() as u64);
    }

    #[test]
    fn test_seek_and_reread() {
        let bytes = [0x01, 0x00, 0x02, 0x00];
        let mut cursor = Cursor::new(&bytes[..]);
        cursor.seek_to(2).unwrap();
        assert_eq!(SerRead::read_u16(&mut cursor).unwrap(), 2);
        cursor.seek_to(0).unwrap();
        assert_eq!(SerRead::read_u16(&mut cursor).unwrap(), 1);
    }

    #[test]
    fn test_short_read_is_io_error() {
        let mut cursor = Cursor::new(&[0x01u8][..]);
        let err = SerRead::read_u32(&mut cursor).unwrap_err();
        match err {
            Error::Io(e) => assert_eq!(e.kind(), std::io::ErrorKind::UnexpectedEof),
            other => panic!("expected Io error, got {other:?}"),
        }
    }
}

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Cursor, Read, Seek, SeekFrom};

use crate::error::{PeError, Result};

/// A little-endian byte cursor over the whole image, seekable to absolute
/// file offsets. PE headers are a graph of offset -> offset references
/// (directories pointing at tables pointing at strings), so random access
/// reads are the natural shape here, unlike a purely sequential container
/// format.
pub struct ByteReader<'a> {
    cursor: Cursor<&'a [u8]>,
    len: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> ByteReader<'a> {
        ByteReader {
            cursor: Cursor::new(data),
            len: data.len(),
        }
    }

    pub fn seek_to(&mut self, offset: usize) -> Result<()> {
        self.cursor
            .seek(SeekFrom::Start(offset as u64))
            .map_err(|_| PeError::Truncated {
                offset,
                needed: 0,
                available: self.len,
            })?;
        Ok(())
    }

    pub fn position(&self) -> usize {
        self.cursor.position() as usize
    }

    fn need(&self, n: usize) -> Result<()> {
        let pos = self.position();
        if pos + n > self.len {
            return Err(PeError::Truncated {
                offset: pos,
                needed: n,
                available: self.len.saturating_sub(pos),
            });
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        self.need(1)?;
        self.cursor.read_u8().map_err(|_| PeError::Truncated {
            offset: self.position(),
            needed: 1,
            available: 0,
        })
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        self.need(2)?;
        Ok(self.cursor.read_u16::<LittleEndian>().unwrap())
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        self.need(4)?;
        Ok(self.cursor.read_u32::<LittleEndian>().unwrap())
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        self.need(8)?;
        Ok(self.cursor.read_u64::<LittleEndian>().unwrap())
    }

    pub fn read_exact_at(&mut self, offset: usize, len: usize) -> Result<Vec<u8>> {
        self.seek_to(offset)?;
        self.need(len)?;
        let mut buf = vec![0u8; len];
        self.cursor
            .read_exact(&mut buf)
            .map_err(|_| PeError::Truncated {
                offset,
                needed: len,
                available: self.len.saturating_sub(offset),
            })?;
        Ok(buf)
    }

    /// Reads a NUL-terminated ASCII string starting at `offset`, without
    /// disturbing the reader's current position.
    pub fn read_cstr_at(&mut self, offset: usize) -> Result<String> {
        if offset >= self.len {
            return Err(PeError::Truncated {
                offset,
                needed: 1,
                available: 0,
            });
        }
        let saved = self.position();
        let bytes = self.cursor.get_ref();
        let end = bytes[offset..]
            .iter()
            .position(|&b| b == 0)
            .map(|i| offset + i)
            .unwrap_or(self.len);
        let s = String::from_utf8_lossy(&bytes[offset..end]).into_owned();
        self.seek_to(saved)?;
        Ok(s)
    }
}

//! Container format constants and header codecs
//!
//! Layout of a serialized sequence (all integers little-endian):
//! ```text
//! [40-byte sequence header]
//! [n_blocks x u64 block_last]
//! [n_blocks x u64 block_offset]
//! [payload: per block, 40-byte header + low words + high words]
//! ```
//! Every region is a multiple of 8 bytes, so block offsets are always
//! 8-byte aligned. Headers are written field by field; nothing relies on
//! native struct layout.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fmt;
use std::io::{Read, Write};

use crate::error::{Error, Result};

/// Magic number at offset 0 of every container ("PEF1")
pub const MAGIC: [u8; 4] = *b"PEF1";

/// Current container format version
pub const VERSION: u32 = 1;

/// Size of the fixed sequence header in bytes
pub const SEQ_HEADER_SIZE: u64 = 40;

/// Size of a per-block header in bytes
pub const BLOCK_HEADER_SIZE: u64 = 40;

/// Default number of elements per block
pub const DEFAULT_BLOCK_SIZE: u32 = 256;

/// Fixed header of a serialized sequence.
///
/// `payload_offset` is always `40 + 16 * n_blocks`: the fixed header plus
/// the two skip arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceMeta {
    pub magic: [u8; 4],
    pub version: u32,
    pub n_elem: u64,
    pub block_size: u32,
    pub reserved: u32,
    pub n_blocks: u64,
    pub payload_offset: u64,
}

impl SequenceMeta {
    pub(crate) fn for_sequence(n_elem: u64, block_size: u32, n_blocks: u64) -> Self {
        Self {
            magic: MAGIC,
            version: VERSION,
            n_elem,
            block_size,
            reserved: 0,
            n_blocks,
            payload_offset: SEQ_HEADER_SIZE + 16 * n_blocks,
        }
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(&self.magic)?;
        writer.write_u32::<LittleEndian>(self.version)?;
        writer.write_u64::<LittleEndian>(self.n_elem)?;
        writer.write_u32::<LittleEndian>(self.block_size)?;
        writer.write_u32::<LittleEndian>(self.reserved)?;
        writer.write_u64::<LittleEndian>(self.n_blocks)?;
        writer.write_u64::<LittleEndian>(self.payload_offset)?;
        Ok(())
    }

    /// Parse and validate a sequence header.
    ///
    /// Rejects unknown magic numbers and versions, then checks internal
    /// consistency: the block count must match the element count, and the
    /// payload offset must match the skip-index size.
    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic).map_err(Error::from_read)?;
        if magic != MAGIC {
            return Err(Error::BadMagic(u32::from_le_bytes(magic)));
        }
        let version = reader.read_u32::<LittleEndian>().map_err(Error::from_read)?;
        if version != VERSION {
            return Err(Error::BadVersion(version));
        }
        let meta = Self {
            magic,
            version,
            n_elem: reader.read_u64::<LittleEndian>().map_err(Error::from_read)?,
            block_size: reader.read_u32::<LittleEndian>().map_err(Error::from_read)?,
            reserved: reader.read_u32::<LittleEndian>().map_err(Error::from_read)?,
            n_blocks: reader.read_u64::<LittleEndian>().map_err(Error::from_read)?,
            payload_offset: reader.read_u64::<LittleEndian>().map_err(Error::from_read)?,
        };
        meta.validate()?;
        Ok(meta)
    }

    fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            return Err(Error::BadHeader("zero block size".to_string()));
        }
        let expected_blocks = self.n_elem.div_ceil(self.block_size as u64);
        if self.n_blocks != expected_blocks {
            return Err(Error::BadHeader(format!(
                "block count {} does not cover {} elements at block size {}",
                self.n_blocks, self.n_elem, self.block_size
            )));
        }
        let expected_offset = SEQ_HEADER_SIZE + 16 * self.n_blocks;
        if self.payload_offset != expected_offset {
            return Err(Error::BadHeader(format!(
                "payload offset {} (expected {})",
                self.payload_offset, expected_offset
            )));
        }
        Ok(())
    }
}

impl fmt::Display for SequenceMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "magic:          {}", String::from_utf8_lossy(&self.magic))?;
        writeln!(f, "version:        {}", self.version)?;
        writeln!(f, "n_elem:         {}", self.n_elem)?;
        writeln!(f, "block_size:     {}", self.block_size)?;
        writeln!(f, "n_blocks:       {}", self.n_blocks)?;
        write!(f, "payload_offset: {}", self.payload_offset)
    }
}

/// Fixed header of one encoded block (40 bytes on disk).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EFBlockMeta {
    /// Number of elements in the block (never zero)
    pub n_elem: u32,
    /// Low-bit width per element
    pub l: u8,
    /// Value of the first (smallest) element
    pub floor: u64,
    /// Word length of the low-bits buffer
    pub low_words: u64,
    /// Word length of the high-bits buffer
    pub high_words: u64,
    /// Exact bit length of the high-bits buffer
    pub high_bits_len: u64,
}

impl EFBlockMeta {
    pub fn write<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_u32::<LittleEndian>(self.n_elem)?;
        writer.write_u8(self.l)?;
        writer.write_all(&[0u8; 3])?;
        writer.write_u64::<LittleEndian>(self.floor)?;
        writer.write_u64::<LittleEndian>(self.low_words)?;
        writer.write_u64::<LittleEndian>(self.high_words)?;
        writer.write_u64::<LittleEndian>(self.high_bits_len)?;
        Ok(())
    }

    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let n_elem = reader.read_u32::<LittleEndian>().map_err(Error::from_read)?;
        let l = reader.read_u8().map_err(Error::from_read)?;
        let mut reserved = [0u8; 3];
        reader.read_exact(&mut reserved).map_err(Error::from_read)?;
        let meta = Self {
            n_elem,
            l,
            floor: reader.read_u64::<LittleEndian>().map_err(Error::from_read)?,
            low_words: reader.read_u64::<LittleEndian>().map_err(Error::from_read)?,
            high_words: reader.read_u64::<LittleEndian>().map_err(Error::from_read)?,
            high_bits_len: reader.read_u64::<LittleEndian>().map_err(Error::from_read)?,
        };
        meta.validate()?;
        Ok(meta)
    }

    fn validate(&self) -> Result<()> {
        if self.n_elem == 0 {
            return Err(Error::BadHeader("block with zero elements".to_string()));
        }
        if self.l >= 64 {
            return Err(Error::BadHeader(format!("low-bit width {}", self.l)));
        }
        let low_bits = self.n_elem as u64 * self.l as u64;
        if self.low_words != low_bits.div_ceil(64) {
            return Err(Error::BadHeader(format!(
                "low buffer of {} words cannot hold {} bits",
                self.low_words, low_bits
            )));
        }
        if self.high_words != self.high_bits_len.div_ceil(64) {
            return Err(Error::BadHeader(format!(
                "high buffer of {} words for a bit length of {}",
                self.high_words, self.high_bits_len
            )));
        }
        if self.high_bits_len <= self.n_elem as u64 {
            return Err(Error::BadHeader(format!(
                "high bit length {} too small for {} elements",
                self.high_bits_len, self.n_elem
            )));
        }
        Ok(())
    }

    /// Serialized size of the block this header describes, in bytes.
    pub fn serialized_size(&self) -> u64 {
        BLOCK_HEADER_SIZE + 8 * (self.low_words + self.high_words)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_meta_roundtrip() {
        let meta = SequenceMeta::for_sequence(1333, 256, 6);
        let mut buf = Vec::new();
        meta.write(&mut buf).unwrap();
        assert_eq!(buf.len() as u64, SEQ_HEADER_SIZE);

        let restored = SequenceMeta::read(&mut &buf[..]).unwrap();
        assert_eq!(restored, meta);
        assert_eq!(restored.payload_offset, 40 + 16 * 6);
    }

    #[test]
    fn test_bad_magic() {
        let meta = SequenceMeta::for_sequence(10, 4, 3);
        let mut buf = Vec::new();
        meta.write(&mut buf).unwrap();
        buf[0] = b'X';
        match SequenceMeta::read(&mut &buf[..]) {
            Err(Error::BadMagic(_)) => {}
            other => panic!("expected BadMagic, got {:?}", other),
        }
    }

    #[test]
    fn test_bad_version() {
        let meta = SequenceMeta {
            version: 2,
            ..SequenceMeta::for_sequence(10, 4, 3)
        };
        let mut buf = Vec::new();
        meta.write(&mut buf).unwrap();
        match SequenceMeta::read(&mut &buf[..]) {
            Err(Error::BadVersion(2)) => {}
            other => panic!("expected BadVersion, got {:?}", other),
        }
    }

    #[test]
    fn test_truncated_header() {
        let meta = SequenceMeta::for_sequence(10, 4, 3);
        let mut buf = Vec::new();
        meta.write(&mut buf).unwrap();
        buf.truncate(17);
        match SequenceMeta::read(&mut &buf[..]) {
            Err(Error::Truncated) => {}
            other => panic!("expected Truncated, got {:?}", other),
        }
    }

    #[test]
    fn test_inconsistent_block_count() {
        let meta = SequenceMeta {
            n_blocks: 2,
            ..SequenceMeta::for_sequence(1024, 256, 2)
        };
        let mut buf = Vec::new();
        meta.write(&mut buf).unwrap();
        match SequenceMeta::read(&mut &buf[..]) {
            Err(Error::BadHeader(_)) => {}
            other => panic!("expected BadHeader, got {:?}", other),
        }
    }

    #[test]
    fn test_block_meta_roundtrip() {
        let meta = EFBlockMeta {
            n_elem: 256,
            l: 4,
            floor: 12345,
            low_words: 16,
            high_words: 9,
            high_bits_len: 513,
        };
        let mut buf = Vec::new();
        meta.write(&mut buf).unwrap();
        assert_eq!(buf.len() as u64, BLOCK_HEADER_SIZE);

        let restored = EFBlockMeta::read(&mut &buf[..]).unwrap();
        assert_eq!(restored, meta);
        assert_eq!(restored.serialized_size(), 40 + 8 * (16 + 9));
    }

    #[test]
    fn test_block_meta_rejects_empty() {
        let meta = EFBlockMeta {
            n_elem: 0,
            l: 0,
            floor: 0,
            low_words: 0,
            high_words: 1,
            high_bits_len: 1,
        };
        let mut buf = Vec::new();
        meta.write(&mut buf).unwrap();
        assert!(matches!(
            EFBlockMeta::read(&mut &buf[..]),
            Err(Error::BadHeader(_))
        ));
    }
}

//! Partitioned layer: fixed-size blocks plus a skip index
//!
//! A `Sequence` cuts a sorted input into runs of at most `block_size`
//! elements, encodes each run as an [`EFBlock`], and keeps two parallel
//! arrays per block: the largest element (`block_last`) and the byte
//! offset of the block inside the payload (`block_offset`). Point lookup
//! is block arithmetic plus an in-block stream; membership and seeks
//! binary-search `block_last` first and only then touch one block.

use std::io::{Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::block::{BlockDecoder, EFBlock};
use crate::error::{Error, Result};
use crate::format::{SequenceMeta, DEFAULT_BLOCK_SIZE};

/// An immutable, compressed, randomly addressable sorted sequence.
///
/// Built once from sorted values (or parsed from a container); every
/// query runs against the compressed form. All set-style operations
/// produce fresh sequences.
#[derive(Debug, Clone)]
pub struct Sequence {
    meta: SequenceMeta,
    /// Maximum element of each block, non-decreasing
    block_last: Vec<u64>,
    /// Byte offset of each block's header within the payload
    block_offset: Vec<u64>,
    blocks: Vec<EFBlock>,
}

impl Sequence {
    /// Compress sorted values with the default block size (256).
    pub fn new(values: &[u64]) -> Result<Self> {
        Self::with_block_size(values, DEFAULT_BLOCK_SIZE)
    }

    /// Compress sorted values, cutting blocks of at most `block_size`
    /// elements. A zero block size is clamped to 1.
    ///
    /// The input must be non-decreasing; the first offending position is
    /// reported otherwise.
    pub fn with_block_size(values: &[u64], block_size: u32) -> Result<Self> {
        if let Some(p) = values.windows(2).position(|w| w[0] > w[1]) {
            return Err(Error::NotSorted(p + 1));
        }
        let mut builder = SequenceBuilder::new(block_size);
        for &v in values {
            builder.push(v)?;
        }
        builder.finish()
    }

    /// Total number of elements.
    #[inline]
    pub fn n_elem(&self) -> u64 {
        self.meta.n_elem
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.meta.n_elem == 0
    }

    /// Number of blocks.
    #[inline]
    pub fn n_blocks(&self) -> u64 {
        self.meta.n_blocks
    }

    /// Maximum number of elements per block.
    #[inline]
    pub fn block_size(&self) -> u32 {
        self.meta.block_size
    }

    /// Container header for this sequence.
    pub fn meta(&self) -> &SequenceMeta {
        &self.meta
    }

    pub(crate) fn block(&self, i: usize) -> &EFBlock {
        &self.blocks[i]
    }

    pub(crate) fn block_last(&self) -> &[u64] {
        &self.block_last
    }

    /// Materialize block `i`.
    pub fn decode_block(&self, i: u64) -> Result<Vec<u64>> {
        if i >= self.meta.n_blocks {
            return Err(Error::IndexOutOfRange {
                index: i,
                len: self.meta.n_blocks,
            });
        }
        self.blocks[i as usize].decode()
    }

    /// Materialize the whole sequence.
    pub fn decode(&self) -> Result<Vec<u64>> {
        let mut out = Vec::with_capacity(self.meta.n_elem as usize);
        for block in &self.blocks {
            out.append(&mut block.decode()?);
        }
        Ok(out)
    }

    /// Element at global index `i`.
    ///
    /// Streams through at most one block: index arithmetic picks the
    /// block, the in-block decoder stops at the local position.
    pub fn get(&self, i: u64) -> Result<u64> {
        if i >= self.meta.n_elem {
            return Err(Error::IndexOutOfRange {
                index: i,
                len: self.meta.n_elem,
            });
        }
        let b = (i / self.meta.block_size as u64) as usize;
        let k = (i % self.meta.block_size as u64) as u32;
        self.blocks[b].get(k)
    }

    /// Set membership test.
    pub fn contains(&self, q: u64) -> bool {
        let b = self.block_last.partition_point(|&last| last < q);
        if b >= self.blocks.len() {
            return false;
        }
        let block = &self.blocks[b];
        if block.first() > q {
            return false;
        }
        for v in block.decoder() {
            if v >= q {
                return v == q;
            }
        }
        false
    }

    /// First element `>= target`, with its global index.
    pub fn next_geq(&self, target: u64) -> Option<(u64, u64)> {
        let b = self.block_last.partition_point(|&last| last < target);
        if b >= self.blocks.len() {
            return None;
        }
        let base = b as u64 * self.meta.block_size as u64;
        self.blocks[b]
            .decoder()
            .enumerate()
            .find(|&(_, v)| v >= target)
            .map(|(k, v)| (base + k as u64, v))
    }

    /// Iterate over every element without materializing blocks.
    pub fn iter(&self) -> SequenceIter<'_> {
        SequenceIter {
            blocks: &self.blocks,
            block: 0,
            dec: None,
        }
    }

    /// Serialized size in bytes.
    pub fn size_bytes(&self) -> u64 {
        self.meta.payload_offset
            + self.blocks.iter().map(EFBlock::serialized_size).sum::<u64>()
    }

    pub fn serialize<W: Write>(&self, writer: &mut W) -> Result<()> {
        self.meta.write(writer)?;
        for &last in &self.block_last {
            writer.write_u64::<LittleEndian>(last)?;
        }
        for &offset in &self.block_offset {
            writer.write_u64::<LittleEndian>(offset)?;
        }
        for block in &self.blocks {
            block.serialize(writer)?;
        }
        Ok(())
    }

    pub fn deserialize<R: Read>(reader: &mut R) -> Result<Self> {
        let meta = SequenceMeta::read(reader)?;
        let n_blocks = meta.n_blocks as usize;

        let mut block_last = Vec::with_capacity(n_blocks);
        for _ in 0..n_blocks {
            block_last.push(reader.read_u64::<LittleEndian>().map_err(Error::from_read)?);
        }
        if block_last.windows(2).any(|w| w[0] > w[1]) {
            return Err(Error::BadHeader("skip index is not sorted".to_string()));
        }
        let mut block_offset = Vec::with_capacity(n_blocks);
        for _ in 0..n_blocks {
            block_offset.push(reader.read_u64::<LittleEndian>().map_err(Error::from_read)?);
        }

        let mut blocks = Vec::with_capacity(n_blocks);
        let mut offset = 0u64;
        for i in 0..n_blocks {
            if block_offset[i] != offset {
                return Err(Error::BadHeader(format!(
                    "block {} at offset {} (expected {})",
                    i, block_offset[i], offset
                )));
            }
            let block = EFBlock::deserialize(reader)?;
            let expected =
                (meta.n_elem - i as u64 * meta.block_size as u64).min(meta.block_size as u64);
            if block.len() as u64 != expected {
                return Err(Error::BadHeader(format!(
                    "block {} holds {} elements (expected {})",
                    i,
                    block.len(),
                    expected
                )));
            }
            if block.first() > block_last[i] {
                return Err(Error::BadHeader(format!(
                    "block {} floor exceeds its skip entry",
                    i
                )));
            }
            offset += block.serialized_size();
            blocks.push(block);
        }

        Ok(Self {
            meta,
            block_last,
            block_offset,
            blocks,
        })
    }

    /// Serialize to an in-memory container.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.size_bytes() as usize);
        self.serialize(&mut buf)?;
        Ok(buf)
    }

    /// Parse a container from a byte slice.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::deserialize(&mut &bytes[..])
    }

    /// Write the container to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let mut writer = std::io::BufWriter::new(file);
        self.serialize(&mut writer)?;
        writer.flush()?;
        log::debug!(
            "saved sequence: {} elements in {} blocks, {} bytes",
            self.n_elem(),
            self.n_blocks(),
            self.size_bytes()
        );
        Ok(())
    }

    /// Read a container back from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let mut reader = std::io::BufReader::new(file);
        let seq = Self::deserialize(&mut reader)?;
        log::debug!(
            "loaded sequence: {} elements in {} blocks",
            seq.n_elem(),
            seq.n_blocks()
        );
        Ok(seq)
    }
}

/// Accumulates sorted values into blocks. Used by construction and by
/// the set-algebra operations, which emit their merged output here.
#[derive(Debug)]
pub(crate) struct SequenceBuilder {
    block_size: u32,
    buf: Vec<u64>,
    blocks: Vec<EFBlock>,
    block_last: Vec<u64>,
    n_elem: u64,
}

impl SequenceBuilder {
    pub(crate) fn new(block_size: u32) -> Self {
        let block_size = block_size.max(1);
        Self {
            block_size,
            buf: Vec::with_capacity(block_size as usize),
            blocks: Vec::new(),
            block_last: Vec::new(),
            n_elem: 0,
        }
    }

    /// Append the next value. Values must arrive in non-decreasing order.
    pub(crate) fn push(&mut self, v: u64) -> Result<()> {
        debug_assert!(self.buf.last().is_none_or(|&prev| prev <= v));
        self.buf.push(v);
        self.n_elem += 1;
        if self.buf.len() == self.block_size as usize {
            self.cut_block()?;
        }
        Ok(())
    }

    fn cut_block(&mut self) -> Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let block = EFBlock::encode(&self.buf)?;
        self.block_last.push(*self.buf.last().unwrap());
        self.blocks.push(block);
        self.buf.clear();
        Ok(())
    }

    pub(crate) fn finish(mut self) -> Result<Sequence> {
        self.cut_block()?;
        let mut block_offset = Vec::with_capacity(self.blocks.len());
        let mut offset = 0u64;
        for block in &self.blocks {
            block_offset.push(offset);
            offset += block.serialized_size();
        }
        let meta =
            SequenceMeta::for_sequence(self.n_elem, self.block_size, self.blocks.len() as u64);
        Ok(Sequence {
            meta,
            block_last: self.block_last,
            block_offset,
            blocks: self.blocks,
        })
    }
}

/// Iterator over all elements of a sequence, one block decoder at a time.
pub struct SequenceIter<'a> {
    blocks: &'a [EFBlock],
    block: usize,
    dec: Option<BlockDecoder<'a>>,
}

impl<'a> Iterator for SequenceIter<'a> {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        loop {
            if let Some(dec) = self.dec.as_mut() {
                if let Some(v) = dec.next() {
                    return Some(v);
                }
                self.dec = None;
                self.block += 1;
            }
            if self.block >= self.blocks.len() {
                return None;
            }
            self.dec = Some(self.blocks[self.block].decoder());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::prelude::*;

    fn random_sorted(rng: &mut StdRng, n: usize, max_value: u64) -> Vec<u64> {
        let mut values: Vec<u64> = (0..n).map(|_| rng.random_range(0..max_value)).collect();
        values.sort_unstable();
        values
    }

    #[test]
    fn test_small_sequence() {
        let values = vec![1, 3, 4, 6, 10, 11, 12, 13];
        let seq = Sequence::with_block_size(&values, 2).unwrap();

        assert_eq!(seq.n_elem(), 8);
        assert_eq!(seq.n_blocks(), 4);
        assert_eq!(seq.decode_block(0).unwrap(), vec![1, 3]);
        assert_eq!(seq.decode().unwrap(), values);
        assert!(seq.contains(10));
        assert!(!seq.contains(9));
    }

    #[test]
    fn test_roundtrip_various_block_sizes() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(42);
        let values = random_sorted(&mut rng, 1 << 12, 1 << 16);

        for block_size in [1u32, 2, 16, 256, 1024] {
            let seq = Sequence::with_block_size(&values, block_size).unwrap();
            assert_eq!(seq.decode().unwrap(), values, "block size {}", block_size);
        }
    }

    #[test]
    fn test_get() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(5);
        let values = random_sorted(&mut rng, 1 << 10, 1 << 12);
        let seq = Sequence::with_block_size(&values, 256).unwrap();

        for (i, &expected) in values.iter().enumerate() {
            assert_eq!(seq.get(i as u64).unwrap(), expected, "Mismatch at {}", i);
        }
        assert!(matches!(
            seq.get(1 << 10),
            Err(Error::IndexOutOfRange { .. })
        ));
    }

    #[test]
    fn test_contains_random() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(13);
        let values = random_sorted(&mut rng, 2000, 1 << 14);
        let seq = Sequence::with_block_size(&values, 64).unwrap();

        let set: std::collections::BTreeSet<u64> = values.iter().copied().collect();
        for q in 0..(1u64 << 14) {
            assert_eq!(seq.contains(q), set.contains(&q), "query {}", q);
        }
        assert!(!seq.contains(u64::MAX));
    }

    #[test]
    fn test_next_geq() {
        let values = vec![10, 20, 30, 100, 200, 300];
        let seq = Sequence::with_block_size(&values, 2).unwrap();

        assert_eq!(seq.next_geq(5), Some((0, 10)));
        assert_eq!(seq.next_geq(10), Some((0, 10)));
        assert_eq!(seq.next_geq(15), Some((1, 20)));
        assert_eq!(seq.next_geq(100), Some((3, 100)));
        assert_eq!(seq.next_geq(250), Some((5, 300)));
        assert_eq!(seq.next_geq(301), None);
    }

    #[test]
    fn test_ragged_last_block() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(9);
        let values = random_sorted(&mut rng, 1333, 1 << 12);
        let seq = Sequence::with_block_size(&values, 256).unwrap();

        assert_eq!(seq.n_blocks(), 6);
        assert_eq!(seq.decode_block(5).unwrap().len(), 53);
        assert_eq!(seq.decode().unwrap(), values);
    }

    #[test]
    fn test_empty_sequence() {
        let seq = Sequence::new(&[]).unwrap();
        assert_eq!(seq.n_elem(), 0);
        assert_eq!(seq.n_blocks(), 0);
        assert!(seq.is_empty());
        assert!(seq.decode().unwrap().is_empty());
        assert!(!seq.contains(0));
        assert_eq!(seq.next_geq(0), None);
        assert_eq!(seq.iter().count(), 0);
    }

    #[test]
    fn test_not_sorted_rejected() {
        match Sequence::new(&[1, 2, 5, 4, 8]) {
            Err(Error::NotSorted(3)) => {}
            other => panic!("expected NotSorted(3), got {:?}", other),
        }
    }

    #[test]
    fn test_duplicates_survive() {
        let values = vec![3, 3, 3, 7, 7, 9, 9, 9, 9];
        let seq = Sequence::with_block_size(&values, 4).unwrap();
        assert_eq!(seq.decode().unwrap(), values);
        assert!(seq.contains(7));
        assert!(!seq.contains(8));
    }

    #[test]
    fn test_iter_matches_decode() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(21);
        let values = random_sorted(&mut rng, 999, 1 << 16);
        let seq = Sequence::with_block_size(&values, 128).unwrap();

        let collected: Vec<u64> = seq.iter().collect();
        assert_eq!(collected, seq.decode().unwrap());
    }

    #[test]
    fn test_zero_block_size_clamped() {
        let seq = Sequence::with_block_size(&[1, 2, 3], 0).unwrap();
        assert_eq!(seq.block_size(), 1);
        assert_eq!(seq.n_blocks(), 3);
        assert_eq!(seq.decode().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_bytes_roundtrip() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(31);
        let values = random_sorted(&mut rng, 1333, 1 << 12);
        let seq = Sequence::with_block_size(&values, 256).unwrap();

        let bytes = seq.to_bytes().unwrap();
        assert_eq!(bytes.len() as u64, seq.size_bytes());

        let restored = Sequence::from_bytes(&bytes).unwrap();
        assert_eq!(restored.meta(), seq.meta());
        assert_eq!(restored.decode().unwrap(), values);

        // Headers are byte-exact across a second round trip
        let bytes2 = restored.to_bytes().unwrap();
        assert_eq!(bytes2, bytes);
    }

    #[test]
    fn test_file_roundtrip() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(63);
        let values = random_sorted(&mut rng, 1333, 1 << 12);
        let seq = Sequence::with_block_size(&values, 256).unwrap();

        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("test.pef");
        seq.save(&path).unwrap();

        let restored = Sequence::load(&path).unwrap();
        assert_eq!(restored.meta(), seq.meta());
        assert_eq!(restored.decode().unwrap(), values);
    }

    #[test]
    fn test_empty_file_roundtrip() {
        let seq = Sequence::new(&[]).unwrap();
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("empty.pef");
        seq.save(&path).unwrap();

        let restored = Sequence::load(&path).unwrap();
        assert_eq!(restored.meta(), seq.meta());
        assert_eq!(restored.n_elem(), 0);
        assert!(restored.decode().unwrap().is_empty());
    }

    #[test]
    fn test_truncated_container() {
        let values = vec![1, 2, 3, 4, 5];
        let seq = Sequence::with_block_size(&values, 2).unwrap();
        let bytes = seq.to_bytes().unwrap();

        for cut in [3, 20, 41, 60, bytes.len() - 1] {
            assert!(
                matches!(Sequence::from_bytes(&bytes[..cut]), Err(Error::Truncated)),
                "cut at {}",
                cut
            );
        }
    }

    #[test]
    fn test_meta_display() {
        let seq = Sequence::with_block_size(&[1, 2, 3], 2).unwrap();
        let shown = seq.meta().to_string();
        assert!(shown.contains("PEF1"));
        assert!(shown.contains("n_elem:         3"));
    }
}

//! Elias-Fano encoding of a single non-decreasing run
//!
//! Each value is stored relative to the block floor (the first element)
//! and split into `l` low bits, packed densely, and a high part encoded
//! as a positional unary bitmap: element `i` with high part `hi` sets bit
//! `hi + i`. Exactly `i` ones and `hi` zeros precede that bit, so decoding
//! walks the bitmap with a select-forward scan while streaming the low
//! bits alongside.
//!
//! Space is `n * (2 + l)` bits plus the header, with
//! `l = floor(log2(range / n))`, the classical Elias-Fano trade-off.

use std::io::{Read, Write};

use crate::bits::{next_one_at_or_after, BitReader, BitWriter};
use crate::error::{Error, Result};
use crate::format::EFBlockMeta;

/// One compressed run of up to `block_size` values.
#[derive(Debug, Clone)]
pub struct EFBlock {
    pub meta: EFBlockMeta,
    /// Low-bits buffer: `n_elem * l` packed bits
    low: Vec<u64>,
    /// High-bits buffer: positional unary, `n_elem` set bits
    high: Vec<u64>,
}

/// Low-bit width balancing packed and unary storage: for `n` values
/// spread over `range`, the expected gap is `range / n`.
fn choose_l(range: u128, n: u64) -> u32 {
    if n == 0 {
        return 0;
    }
    let ratio = range / n as u128;
    if ratio <= 1 {
        0
    } else {
        127 - ratio.leading_zeros()
    }
}

impl EFBlock {
    /// Encode a non-decreasing run of values.
    ///
    /// The input must be sorted; the partitioning layer validates order
    /// before blocks are cut. An empty run is an error.
    pub fn encode(values: &[u64]) -> Result<Self> {
        let n = values.len();
        if n == 0 {
            return Err(Error::EmptyBlock);
        }
        debug_assert!(values.windows(2).all(|w| w[0] <= w[1]));

        let floor = values[0];
        let last = values[n - 1];
        // The span can cover all of u64, so widen before the +1
        let range = (last - floor) as u128 + 1;
        let l = choose_l(range, n as u64);
        debug_assert!(l < 64);

        // Low bits: l LSBs of each value, relative to the floor
        let mut low_writer = BitWriter::new();
        for &v in values {
            low_writer.put(v - floor, l);
        }
        low_writer.flush();
        let low = low_writer.into_words();

        // High bits: one set bit per element at position hi + i
        let range_hi = if l == 0 {
            range
        } else {
            (range + (1u128 << l) - 1) >> l
        };
        let high_bits_len = (n as u128 + range_hi) as u64;
        let high_words = high_bits_len.div_ceil(64);
        let mut high = vec![0u64; high_words as usize];
        for (i, &v) in values.iter().enumerate() {
            let hi = (v - floor) >> l;
            let pos = hi + i as u64;
            high[(pos / 64) as usize] |= 1u64 << (pos % 64);
        }

        let meta = EFBlockMeta {
            n_elem: n as u32,
            l: l as u8,
            floor,
            low_words: low.len() as u64,
            high_words,
            high_bits_len,
        };
        Ok(Self { meta, low, high })
    }

    /// Number of elements in the block.
    #[inline]
    pub fn len(&self) -> u32 {
        self.meta.n_elem
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.meta.n_elem == 0
    }

    /// Smallest element in the block.
    #[inline]
    pub fn first(&self) -> u64 {
        self.meta.floor
    }

    /// Streaming decoder over the block's values.
    pub fn decoder(&self) -> BlockDecoder<'_> {
        BlockDecoder {
            n_elem: self.meta.n_elem,
            l: self.meta.l as u32,
            floor: self.meta.floor,
            low: BitReader::new(&self.low),
            high: &self.high,
            i: 0,
            prev_pos: None,
        }
    }

    /// Materialize the whole block.
    ///
    /// Fails with a corruption error if the high bitmap runs out of set
    /// bits before `n_elem` values are produced.
    pub fn decode(&self) -> Result<Vec<u64>> {
        let mut out = Vec::with_capacity(self.meta.n_elem as usize);
        out.extend(self.decoder());
        if out.len() != self.meta.n_elem as usize {
            return Err(Error::Corruption(format!(
                "block yielded {} of {} elements",
                out.len(),
                self.meta.n_elem
            )));
        }
        Ok(out)
    }

    /// Element at local position `k`, by streaming up to it.
    pub fn get(&self, k: u32) -> Result<u64> {
        if k >= self.meta.n_elem {
            return Err(Error::IndexOutOfRange {
                index: k as u64,
                len: self.meta.n_elem as u64,
            });
        }
        self.decoder().nth(k as usize).ok_or_else(|| {
            Error::Corruption(format!("missing high bit for element {}", k))
        })
    }

    /// Serialized size in bytes: header plus both word buffers.
    pub fn serialized_size(&self) -> u64 {
        self.meta.serialized_size()
    }

    pub fn serialize<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        use byteorder::{LittleEndian, WriteBytesExt};
        self.meta.write(writer)?;
        for &word in &self.low {
            writer.write_u64::<LittleEndian>(word)?;
        }
        for &word in &self.high {
            writer.write_u64::<LittleEndian>(word)?;
        }
        Ok(())
    }

    pub fn deserialize<R: Read>(reader: &mut R) -> Result<Self> {
        use byteorder::{LittleEndian, ReadBytesExt};
        let meta = EFBlockMeta::read(reader)?;
        let mut low = Vec::with_capacity(meta.low_words as usize);
        for _ in 0..meta.low_words {
            low.push(reader.read_u64::<LittleEndian>().map_err(Error::from_read)?);
        }
        let mut high = Vec::with_capacity(meta.high_words as usize);
        for _ in 0..meta.high_words {
            high.push(reader.read_u64::<LittleEndian>().map_err(Error::from_read)?);
        }
        // Padding bits past high_bits_len must be clear; a set bit there
        // would otherwise decode as a phantom element
        let tail_bits = meta.high_bits_len % 64;
        if tail_bits != 0 {
            let last = high[meta.high_words as usize - 1];
            if last & (!0u64 << tail_bits) != 0 {
                return Err(Error::BadHeader(
                    "set bits past the declared high bit length".to_string(),
                ));
            }
        }
        Ok(Self { meta, low, high })
    }
}

/// Lazy, restartable producer of a block's values.
///
/// Ends early (before `n_elem` items) only on corrupted high bits;
/// [`EFBlock::decode`] turns that into an explicit error.
pub struct BlockDecoder<'a> {
    n_elem: u32,
    l: u32,
    floor: u64,
    low: BitReader<'a>,
    high: &'a [u64],
    i: u32,
    prev_pos: Option<u64>,
}

impl<'a> Iterator for BlockDecoder<'a> {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        if self.i >= self.n_elem {
            return None;
        }
        let start = self.prev_pos.map_or(0, |p| p + 1);
        let pos = next_one_at_or_after(self.high, start)?;
        // i ones precede the i-th set bit, so pos >= i always holds
        let hi = pos - self.i as u64;
        let lo = if self.l > 0 { self.low.get(self.l) } else { 0 };
        self.prev_pos = Some(pos);
        self.i += 1;
        // floor + rel <= the last element for well-formed blocks; only
        // corrupt high bits can wrap here
        Some(self.floor.wrapping_add((hi << self.l) | lo))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.n_elem - self.i) as usize;
        (0, Some(remaining))
    }
}

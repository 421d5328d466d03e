//! Intersection and union over compressed sequences
//!
//! Both operations merge streaming block decoders instead of
//! materializing either operand. The cursor rides the skip index: a seek
//! drops whole blocks whose `block_last` is below the target without
//! ever decoding them, so disjoint regions of the operands cost one
//! comparison per block.

use std::cmp::Ordering;

use crate::block::BlockDecoder;
use crate::error::Result;
use crate::sequence::{Sequence, SequenceBuilder};

/// Streaming cursor over a sequence with block-skipping seek support.
struct SeqCursor<'a> {
    seq: &'a Sequence,
    /// Index of the block the decoder (if any) is drawn from
    block: usize,
    dec: Option<BlockDecoder<'a>>,
    head: Option<u64>,
}

impl<'a> SeqCursor<'a> {
    fn new(seq: &'a Sequence) -> Self {
        let mut cursor = Self {
            seq,
            block: 0,
            dec: None,
            head: None,
        };
        cursor.advance();
        cursor
    }

    /// Current value, if the cursor is not exhausted.
    fn peek(&self) -> Option<u64> {
        self.head
    }

    /// Step to the next value.
    fn advance(&mut self) {
        loop {
            if let Some(dec) = self.dec.as_mut() {
                if let Some(v) = dec.next() {
                    self.head = Some(v);
                    return;
                }
                self.dec = None;
                self.block += 1;
            }
            if self.block >= self.seq.n_blocks() as usize {
                self.head = None;
                return;
            }
            self.dec = Some(self.seq.block(self.block).decoder());
        }
    }

    /// Position the cursor at the first value `>= target`.
    ///
    /// Blocks whose maximum is below the target are skipped via the skip
    /// index without being decoded; only the first candidate block is
    /// scanned.
    fn seek(&mut self, target: u64) {
        if matches!(self.head, Some(v) if v >= target) {
            return;
        }
        if self.head.is_none() {
            return;
        }
        let block_last = self.seq.block_last();
        if self.block < block_last.len() && block_last[self.block] < target {
            // The rest of the current block cannot contain the target
            self.dec = None;
            let skipped = block_last[self.block..].partition_point(|&last| last < target);
            self.block += skipped;
            if self.block >= block_last.len() {
                self.head = None;
                return;
            }
            self.dec = Some(self.seq.block(self.block).decoder());
            self.advance();
        }
        while let Some(v) = self.head {
            if v >= target {
                return;
            }
            self.advance();
        }
    }

    /// Consume every occurrence of `v` at the cursor head.
    fn skip_value(&mut self, v: u64) {
        while self.head == Some(v) {
            self.advance();
        }
    }
}

impl Sequence {
    /// Intersect two sequences, producing a new sequence holding the
    /// values present in both. The result uses this operand's block size.
    ///
    /// Duplicates in either operand are collapsed, so the result is a
    /// strictly increasing set.
    pub fn intersect(&self, other: &Sequence) -> Result<Sequence> {
        let mut out = SequenceBuilder::new(self.block_size());
        let mut a = SeqCursor::new(self);
        let mut b = SeqCursor::new(other);

        while let (Some(x), Some(y)) = (a.peek(), b.peek()) {
            match x.cmp(&y) {
                Ordering::Less => a.seek(y),
                Ordering::Greater => b.seek(x),
                Ordering::Equal => {
                    out.push(x)?;
                    a.skip_value(x);
                    b.skip_value(x);
                }
            }
        }
        out.finish()
    }

    /// Merge two sequences into their sorted union. The result uses this
    /// (left) operand's block size, an intentional asymmetry.
    ///
    /// Equal values from either operand appear once in the result.
    pub fn union_with(&self, other: &Sequence) -> Result<Sequence> {
        let mut out = SequenceBuilder::new(self.block_size());
        let mut a = SeqCursor::new(self);
        let mut b = SeqCursor::new(other);

        loop {
            let v = match (a.peek(), b.peek()) {
                (Some(x), Some(y)) => x.min(y),
                (Some(x), None) => x,
                (None, Some(y)) => y,
                (None, None) => break,
            };
            out.push(v)?;
            a.skip_value(v);
            b.skip_value(v);
        }
        out.finish()
    }
}

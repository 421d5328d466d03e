//! Dense bit-packed I/O over buffers of 64-bit words
//!
//! Values are packed LSB-first within each word: the first bit written
//! lands in bit 0 of word 0. Appending is a shift-and-OR, reading is a
//! shift-and-mask, and neither ever has to reverse bit order.

/// Reads integers out of a densely packed bit buffer.
///
/// Reading past the end of the buffer yields zero bits rather than an
/// error; callers that care about exhaustion track bit counts themselves.
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    /// Words to read
    words: &'a [u64],
    /// Current word index
    idx: usize,
    /// Bits already consumed from the current word
    consumed: u32,
    /// Cached current word (first `consumed` bits are already read)
    cur: u64,
}

impl<'a> BitReader<'a> {
    pub fn new(words: &'a [u64]) -> Self {
        Self {
            words,
            idx: 0,
            consumed: 0,
            cur: words.first().copied().unwrap_or(0),
        }
    }

    /// Read the next `w` bits, packed LSB-first into the result.
    ///
    /// `w` must be at most 64. `w == 0` returns 0 without touching the
    /// cursor. Bits past the end of the buffer read as zero.
    pub fn get(&mut self, w: u32) -> u64 {
        debug_assert!(w <= 64);
        if w == 0 {
            return 0;
        }
        let mut res = 0u64;
        let mut produced = 0u32;
        let mut remain = w;
        while remain > 0 {
            if self.consumed == 64 {
                self.idx += 1;
                self.cur = self.words.get(self.idx).copied().unwrap_or(0);
                self.consumed = 0;
            }
            // take at most what is left in the current word
            let space = 64 - self.consumed;
            let take = remain.min(space);
            let mut chunk = self.cur >> self.consumed;
            if take < 64 {
                chunk &= (1u64 << take) - 1;
            }
            res |= chunk << produced;
            self.consumed += take;
            produced += take;
            remain -= take;
        }
        res
    }

    /// Reposition the cursor to an absolute bit position.
    ///
    /// Positions past the end are allowed; subsequent reads yield zeros.
    pub fn scan(&mut self, bit_pos: u64) {
        self.idx = (bit_pos / 64) as usize;
        self.consumed = (bit_pos % 64) as u32;
        self.cur = self.words.get(self.idx).copied().unwrap_or(0);
    }
}

/// Packs integers densely into a growable buffer of 64-bit words.
#[derive(Debug, Clone, Default)]
pub struct BitWriter {
    /// Finished words
    words: Vec<u64>,
    /// Current word being filled
    cur: u64,
    /// Bits already used in `cur`
    filled: u32,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the `w` least-significant bits of `val`, bit 0 first.
    pub fn put(&mut self, val: u64, w: u32) {
        debug_assert!(w <= 64);
        if w == 0 {
            return;
        }
        let mut val = if w < 64 { val & ((1u64 << w) - 1) } else { val };
        let mut remain = w;
        while remain > 0 {
            let space = 64 - self.filled;
            let take = remain.min(space);
            let chunk = if take < 64 {
                val & ((1u64 << take) - 1)
            } else {
                val
            };
            self.cur |= chunk << self.filled;
            self.filled += take;
            val = if take < 64 { val >> take } else { 0 };
            remain -= take;
            if self.filled == 64 {
                self.words.push(self.cur);
                self.cur = 0;
                self.filled = 0;
            }
        }
    }

    /// Emit the current partial word, zero-padded in the high bits.
    ///
    /// A no-op when the partial word is empty. Subsequent `put` calls
    /// begin a fresh word.
    pub fn flush(&mut self) {
        if self.filled > 0 {
            self.words.push(self.cur);
            self.cur = 0;
            self.filled = 0;
        }
    }

    /// Total number of bits written so far.
    pub fn bit_len(&self) -> u64 {
        self.words.len() as u64 * 64 + self.filled as u64
    }

    /// Finished words. Callers flush first; unflushed bits are not visible.
    pub fn words(&self) -> &[u64] {
        &self.words
    }

    /// Consume the writer, returning the finished words.
    pub fn into_words(self) -> Vec<u64> {
        self.words
    }
}

/// Position of the least set bit at or after `pos` in `words`.
///
/// Returns `None` when no set bit remains. This is the hot path of block
/// decoding: mask off the low bits of the starting word, then ride
/// `trailing_zeros` word by word.
pub fn next_one_at_or_after(words: &[u64], pos: u64) -> Option<u64> {
    let mut idx = (pos / 64) as usize;
    if idx >= words.len() {
        return None;
    }
    let mut word = words[idx] & (!0u64 << (pos % 64));
    loop {
        if word != 0 {
            return Some(idx as u64 * 64 + word.trailing_zeros() as u64);
        }
        idx += 1;
        if idx >= words.len() {
            return None;
        }
        word = words[idx];
    }
}

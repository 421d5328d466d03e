//! pefseq - Partitioned Elias-Fano compression for sorted u64 sequences
//!
//! Compresses a non-decreasing sequence of unsigned 64-bit integers into
//! a compact, randomly addressable form and answers set-style queries
//! directly over the compressed representation:
//! - Block-wise Elias-Fano coding with a per-block skip index
//! - O(log n_blocks) point lookup and membership, streaming decode
//! - Intersection and union by merging compressed block streams
//! - A stable little-endian container format for files and byte buffers
//!
//! Typical uses: posting lists in inverted indices, integer-keyed
//! identifier sets, timestamp streams with skewed distributions.
//!
//! # Example
//!
//! ```
//! use pefseq::Sequence;
//!
//! let seq = Sequence::with_block_size(&[1, 3, 4, 6, 10, 11, 12, 13], 2)?;
//! assert_eq!(seq.n_blocks(), 4);
//! assert!(seq.contains(10));
//! assert_eq!(seq.get(4)?, 10);
//!
//! let other = Sequence::with_block_size(&[2, 4, 5, 9, 11, 15], 3)?;
//! let both = seq.intersect(&other)?;
//! assert_eq!(both.decode()?, vec![4, 11]);
//! # Ok::<(), pefseq::Error>(())
//! ```
//!
//! A built [`Sequence`] is immutable: queries are freely reentrant and
//! the value is safe to share by reference across threads. Set-algebra
//! operations produce fresh sequences.

pub mod bits;
pub mod block;
pub mod error;
pub mod format;
pub mod sequence;
mod set_ops;

pub use bits::{next_one_at_or_after, BitReader, BitWriter};
pub use block::{BlockDecoder, EFBlock};
pub use error::{Error, Result};
pub use format::{EFBlockMeta, SequenceMeta, DEFAULT_BLOCK_SIZE, MAGIC, VERSION};
pub use sequence::{Sequence, SequenceIter};

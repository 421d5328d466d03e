//! Error types for pefseq

use std::io;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Cannot encode a block with zero elements")]
    EmptyBlock,

    #[error("Index out of range: {index} (length {len})")]
    IndexOutOfRange { index: u64, len: u64 },

    #[error("Input is not sorted: value at position {0} is smaller than its predecessor")]
    NotSorted(usize),

    #[error("Bad magic number: 0x{0:08X}")]
    BadMagic(u32),

    #[error("Unsupported format version: {0}")]
    BadVersion(u32),

    #[error("Truncated stream")]
    Truncated,

    #[error("Bad header: {0}")]
    BadHeader(String),

    #[error("Corruption: {0}")]
    Corruption(String),
}

impl Error {
    /// Map IO errors raised while parsing a container: a short read means
    /// the stream ended inside a structure we expected to be whole.
    pub(crate) fn from_read(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            Error::Truncated
        } else {
            Error::Io(e)
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

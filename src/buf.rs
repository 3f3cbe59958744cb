//! A growable byte buffer with separate write end and read head.
//!
//! Aggregation messages are built by packing values one after another into a [`ByteBuf`] and
//! closing the message with a single terminator byte. The receiver unpacks the same number of
//! values and then checks the terminator.

/// The byte that closes every aggregation message.
pub(crate) const TERMINATOR: u8 = 0;

/// Errors raised while reading from a [`ByteBuf`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Fewer bytes are left in the buffer than a read asked for.
    #[error("buffer too short: needed {needed} bytes, {available} available")]
    Truncated {
        /// The number of bytes the read required.
        needed: usize,
        /// The number of unread bytes left in the buffer.
        available: usize,
    },
    /// The message did not end with the terminator byte.
    #[error("message is not properly terminated")]
    MissingTerminator,
    /// Bytes are left over after the terminator.
    #[error("{0} trailing bytes after the end of the message")]
    TrailingBytes(usize),
    /// The bytes do not encode a canonical element of the value type.
    #[error("bytes do not encode a canonical value")]
    NonCanonical,
    /// A declared length exceeds the serialized size of the value type.
    #[error("declared length {declared} exceeds the value size {size}")]
    LengthTooLarge {
        /// The declared length in bytes.
        declared: usize,
        /// The full serialized size of the value type.
        size: usize,
    },
}

/// Which size [`ByteBuf::report_size`] should return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportType {
    /// The allocated capacity of the buffer.
    Capacity,
    /// The number of bytes currently written.
    Length,
}

/// A byte buffer that is written at the end and read from a moving head.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ByteBuf {
    data: Vec<u8>,
    head: usize,
}

impl ByteBuf {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty buffer able to hold `capacity` bytes without reallocating.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            head: 0,
        }
    }

    /// Discards all content but keeps the allocation.
    pub fn reset_write_head(&mut self) {
        self.data.clear();
        self.head = 0;
    }

    /// Moves the read head back to the start of the buffer.
    pub fn reset_read_head(&mut self) {
        self.head = 0;
    }

    /// Appends raw bytes.
    pub fn append(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Closes a message with the terminator byte.
    pub fn append_terminator(&mut self) {
        self.data.push(TERMINATOR);
    }

    /// Reads the next `n` bytes and advances the read head.
    pub fn consume(&mut self, n: usize) -> Result<&[u8], Error> {
        let available = self.remaining();
        if n > available {
            return Err(Error::Truncated {
                needed: n,
                available,
            });
        }
        let start = self.head;
        self.head += n;
        Ok(&self.data[start..self.head])
    }

    /// Reads the terminator byte, failing if it is absent or has the wrong value.
    pub fn expect_terminator(&mut self) -> Result<(), Error> {
        match self.consume(1) {
            Ok([TERMINATOR]) => Ok(()),
            _ => Err(Error::MissingTerminator),
        }
    }

    /// Fails if any bytes are left unread.
    pub fn expect_end(&self) -> Result<(), Error> {
        match self.remaining() {
            0 => Ok(()),
            trailing => Err(Error::TrailingBytes(trailing)),
        }
    }

    /// The number of bytes not yet read.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.head
    }

    /// The number of bytes written.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// The number of bytes the buffer can hold without reallocating.
    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    /// Returns `true` if nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// All written bytes, regardless of the read head.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Reports either the capacity or the used length of the buffer.
    pub fn report_size(&self, report: ReportType) -> usize {
        match report {
            ReportType::Capacity => self.capacity(),
            ReportType::Length => self.data.len(),
        }
    }
}

impl From<Vec<u8>> for ByteBuf {
    fn from(data: Vec<u8>) -> Self {
        Self { data, head: 0 }
    }
}

impl From<ByteBuf> for Vec<u8> {
    fn from(buf: ByteBuf) -> Self {
        buf.data
    }
}

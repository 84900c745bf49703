use std::sync::Arc;

/// A shared window into a byte buffer. Several [`Message`](super::Message)s
/// may hold chunks of the same buffer, e.g. a queued segment and its
/// retransmission.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub(super) start: usize,
    pub(super) end: usize,
    pub(super) bytes: Arc<[u8]>,
}

impl Chunk {
    /// Returns a new chunk containing the given bytes.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            start: 0,
            end: bytes.len(),
            bytes: bytes.into(),
        }
    }

    /// Returns the visible bytes as a slice.
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[self.start..self.end]
    }

    /// The number of visible bytes.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PartialEq for Chunk {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice().eq(other.as_slice())
    }
}

impl From<Vec<u8>> for Chunk {
    fn from(vector: Vec<u8>) -> Self {
        Self::new(vector)
    }
}

impl From<&[u8]> for Chunk {
    fn from(slice: &[u8]) -> Self {
        slice.to_vec().into()
    }
}

impl<const N: usize> From<&[u8; N]> for Chunk {
    fn from(array: &[u8; N]) -> Self {
        array.as_slice().into()
    }
}

impl<const N: usize> From<[u8; N]> for Chunk {
    fn from(array: [u8; N]) -> Self {
        array.as_slice().into()
    }
}

impl From<&str> for Chunk {
    fn from(string: &str) -> Self {
        string.as_bytes().into()
    }
}

//! Byte collections for segment payloads and the receive queue.
//!
//! This module primarily implements the [`Message`] collection.

use std::{
    collections::VecDeque,
    fmt::Display,
    ops::{Bound, RangeBounds},
};

mod chunk;
pub use chunk::Chunk;

mod message_bytes;
pub use message_bytes::MessageBytes;

/// A byte collection with cheap splitting and joining.
///
/// The engine trims duplicate prefixes off retransmitted segments, cuts queued
/// text into MSS-sized segments and appends in-order payloads to the receive
/// queue. None of these should copy bytes. A message is a list of shared
/// [`Chunk`]s, so those operations only move chunk boundaries around.
#[derive(Debug, Clone, Default)]
pub struct Message {
    chunks: VecDeque<Chunk>,
    len: usize,
}

impl Message {
    /// Creates a new message with the given body content.
    ///
    /// # Examples
    ///
    /// ```
    /// # use sluice_core::message::Message;
    /// let message = Message::new(b"Body");
    /// assert_eq!(message.len(), 4);
    /// ```
    pub fn new(body: impl Into<Chunk>) -> Self {
        let body = body.into();
        let len = body.len();
        let mut chunks = VecDeque::new();
        if len > 0 {
            chunks.push_back(body);
        }
        Self { chunks, len }
    }

    /// Adds the given message to the end of this one.
    pub fn concatenate(&mut self, other: Message) {
        self.len += other.len;
        self.chunks.extend(other.chunks);
    }

    /// Narrows the message to the given byte range. All Rust range types are
    /// supported.
    ///
    /// # Examples
    ///
    /// ```
    /// # use sluice_core::message::Message;
    /// let mut message = Message::new(b"HeaderBody");
    /// message.slice(3..8);
    /// assert!(message.iter().eq(b"derBo".iter().cloned()));
    /// ```
    pub fn slice(&mut self, range: impl RangeBounds<usize>) {
        let start = match range.start_bound() {
            Bound::Included(&start) => start,
            Bound::Excluded(&start) => start + 1,
            Bound::Unbounded => 0,
        };
        let end = match range.end_bound() {
            Bound::Included(&end) => end + 1,
            Bound::Excluded(&end) => end,
            Bound::Unbounded => self.len,
        };
        assert!(start <= end && end <= self.len);
        self.truncate(end);
        self.remove_front(start);
    }

    /// Shortens the message to `len` bytes, dropping the rest.
    pub fn truncate(&mut self, len: usize) {
        if len >= self.len {
            return;
        }
        let mut keep = len;
        let mut kept_chunks = 0;
        for chunk in self.chunks.iter_mut() {
            if keep == 0 {
                break;
            }
            kept_chunks += 1;
            if chunk.len() > keep {
                chunk.end = chunk.start + keep;
                keep = 0;
            } else {
                keep -= chunk.len();
            }
        }
        self.chunks.truncate(kept_chunks);
        self.len = len;
    }

    /// Removes the first `len` bytes from the message and returns them as a new
    /// message.
    pub fn cut(&mut self, len: usize) -> Self {
        assert!(len <= self.len);
        let mut front = self.clone();
        front.truncate(len);
        self.remove_front(len);
        front
    }

    /// Drops the first `len` bytes of the message.
    pub fn remove_front(&mut self, len: usize) {
        assert!(len <= self.len);
        self.len -= len;

        let mut to_remove = len;
        while let Some(head) = self.chunks.front_mut() {
            let head_len = head.len();
            if head_len <= to_remove {
                to_remove -= head_len;
                self.chunks.pop_front();
            } else {
                head.start += to_remove;
                break;
            }
        }
    }

    /// The length of the message.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the message contains no bytes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns an iterator over the bytes of the entire message.
    pub fn iter(&self) -> MessageBytes {
        MessageBytes::new(&self.chunks)
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.iter().collect()
    }
}

impl Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for byte in self.iter() {
            write!(f, "{byte:x} ")?;
        }
        Ok(())
    }
}

impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len && self.iter().eq(other.iter())
    }
}

impl Eq for Message {}

impl From<Vec<u8>> for Message {
    fn from(val: Vec<u8>) -> Self {
        Message::new(val)
    }
}

impl From<&[u8]> for Message {
    fn from(val: &[u8]) -> Self {
        Message::new(val)
    }
}

impl<const L: usize> From<[u8; L]> for Message {
    fn from(val: [u8; L]) -> Self {
        Message::new(val)
    }
}

use super::Chunk;
use std::{
    collections::{vec_deque, VecDeque},
    iter::Copied,
    slice,
};

/// An iterator over the bytes of a message
#[derive(Debug, Clone)]
pub struct MessageBytes<'a> {
    chunks: vec_deque::Iter<'a, Chunk>,
    current: Copied<slice::Iter<'a, u8>>,
}

impl<'a> MessageBytes<'a> {
    pub(super) fn new(chunks: &'a VecDeque<Chunk>) -> Self {
        Self {
            chunks: chunks.iter(),
            current: [].iter().copied(),
        }
    }
}

impl<'a> Iterator for MessageBytes<'a> {
    type Item = u8;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(byte) = self.current.next() {
                return Some(byte);
            }
            self.current = self.chunks.next()?.as_slice().iter().copied();
        }
    }
}

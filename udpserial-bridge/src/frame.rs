//! Serial→network framing
//!
//! The serial side is an unbounded byte stream; the network side carries datagrams.
//! [`FrameAccumulator`] collects bytes until a boundary is reached and hands out the
//! completed [`Frame`].

use bytes::{Bytes, BytesMut};
use std::ops::Deref;

/// Default accumulation capacity, the largest frame ever emitted
pub const DEFAULT_FRAME_CAPACITY: usize = 4096;

/// One completed unit of serial→network payload
///
/// Frames are immutable once built and are consumed exactly once by the sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame(Bytes);

impl Frame {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Deref for Frame {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

/// Accumulation buffer with size and separator boundaries
///
/// Idle boundaries depend on time and are driven by the caller through
/// [`FrameAccumulator::flush`].
#[derive(Debug)]
pub struct FrameAccumulator {
    buffer: BytesMut,
    capacity: usize,
    separator: Option<u8>,
}

impl FrameAccumulator {
    /// # Panics
    /// Panics if `capacity` is zero
    pub fn new(capacity: usize, separator: Option<u8>) -> Self {
        assert!(capacity > 0, "frame capacity must be positive");
        Self {
            buffer: BytesMut::with_capacity(capacity),
            capacity,
            separator,
        }
    }

    /// Append one byte, returning the frame it completes
    ///
    /// A frame completes when the buffer is full or when the byte is the separator;
    /// the separator stays part of the frame.
    pub fn push(&mut self, byte: u8) -> Option<Frame> {
        self.buffer.extend_from_slice(&[byte]);
        if self.buffer.len() >= self.capacity || self.separator == Some(byte) {
            self.flush()
        } else {
            None
        }
    }

    /// Take whatever has accumulated; an empty buffer yields no frame
    pub fn flush(&mut self) -> Option<Frame> {
        if self.buffer.is_empty() {
            return None;
        }
        let frame = Frame(self.buffer.split().freeze());
        self.buffer.reserve(self.capacity);
        Some(frame)
    }

    /// Bytes waiting for a boundary
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(acc: &mut FrameAccumulator, bytes: &[u8]) -> Vec<Frame> {
        bytes.iter().filter_map(|&b| acc.push(b)).collect()
    }

    #[test]
    fn test_separator_closes_frame_and_is_kept() {
        let mut acc = FrameAccumulator::new(DEFAULT_FRAME_CAPACITY, Some(b'\n'));
        let frames = feed(&mut acc, b"AAA\nBBB");
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][..], b"AAA\n");
        assert_eq!(acc.pending(), 3);
        assert_eq!(&acc.flush().unwrap()[..], b"BBB");
    }

    #[test]
    fn test_capacity_forces_flush() {
        let mut acc = FrameAccumulator::new(DEFAULT_FRAME_CAPACITY, None);
        let frames = feed(&mut acc, &[0x55; 5000]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].len(), 4096);
        assert_eq!(acc.flush().unwrap().len(), 904);
    }

    #[test]
    fn test_empty_buffer_yields_nothing() {
        let mut acc = FrameAccumulator::new(8, None);
        assert!(acc.flush().is_none());
        acc.push(1);
        assert!(acc.flush().is_some());
        assert!(acc.flush().is_none());
    }

    #[test]
    fn test_separator_alone_is_a_frame() {
        let mut acc = FrameAccumulator::new(8, Some(0));
        assert_eq!(&acc.push(0).unwrap()[..], &[0]);
    }

    #[test]
    fn test_frames_are_independent_of_later_input() {
        let mut acc = FrameAccumulator::new(4, None);
        let first = feed(&mut acc, b"abcd").remove(0);
        feed(&mut acc, b"wxyz");
        assert_eq!(&first[..], b"abcd");
    }
}

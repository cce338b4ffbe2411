//! Bulk-path byte rings
//!
//! One ring per direction. The DMA engine and the application each own
//! one end: the receive ring's head advances on bulk-OUT completion and
//! its tail advances as the application consumes bytes; the transmit
//! ring's head advances as the application produces bytes and its tail
//! advances as bulk-IN transfers are primed. `head == tail` means empty,
//! and one byte is always left unused so a full ring never wraps the
//! head onto the tail.

use core::ptr;

pub struct Ring {
    buffer: &'static mut [u8],
    head: usize,
    tail: usize,
}

impl Ring {
    pub fn new(buffer: &'static mut [u8]) -> Self {
        Ring {
            buffer,
            head: 0,
            tail: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Base address of the ring memory, for DMA priming
    pub fn as_ptr(&self) -> *const u8 {
        self.buffer.as_ptr()
    }

    pub fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    /// Unconsumed bytes between tail and head, accounting for wraparound
    pub fn len(&self) -> usize {
        if self.head >= self.tail {
            self.head - self.tail
        } else {
            self.buffer.len() - self.tail + self.head
        }
    }

    /// Append one byte at the head
    ///
    /// Returns `false` without writing when only the reserved byte is
    /// left; the caller's backpressure is to try again later.
    pub fn push(&mut self, byte: u8) -> bool {
        let next = (self.head + 1) % self.buffer.len();
        if next == self.tail {
            return false;
        }
        // The DMA engine reads this memory, so the store is volatile.
        unsafe { ptr::write_volatile(self.buffer.as_mut_ptr().add(self.head), byte) };
        self.head = next;
        true
    }

    /// Pop one byte from the tail
    pub fn pop(&mut self) -> Option<u8> {
        let byte = self.peek(0)?;
        self.tail = (self.tail + 1) % self.buffer.len();
        Some(byte)
    }

    /// Inspect the byte `offset` positions past the tail without consuming
    pub fn peek(&self, offset: usize) -> Option<u8> {
        if offset >= self.len() {
            return None;
        }
        let index = (self.tail + offset) % self.buffer.len();
        Some(unsafe { ptr::read_volatile(self.buffer.as_ptr().add(index)) })
    }

    /// Account for `count` bytes the DMA engine produced at the head
    pub fn advance_head(&mut self, count: usize) {
        self.head = (self.head + count) % self.buffer.len();
    }

    /// Account for `count` bytes the DMA engine consumed at the tail
    pub fn advance_tail(&mut self, count: usize) {
        self.tail = (self.tail + count) % self.buffer.len();
    }

    /// Largest contiguous span a receive DMA may fill, starting at head
    ///
    /// Never reaches the tail, and leaves the reserved byte when the
    /// tail sits at offset zero, so a completed transfer cannot make the
    /// ring ambiguously empty.
    pub fn write_span(&self) -> (usize, usize) {
        let len = if self.tail > self.head {
            self.tail - self.head - 1
        } else if self.tail == 0 {
            self.buffer.len() - self.head - 1
        } else {
            self.buffer.len() - self.head
        };
        (self.head, len)
    }

    /// Contiguous unsent span a transmit DMA may drain, starting at tail
    pub fn read_span(&self) -> (usize, usize) {
        let len = if self.tail > self.head {
            self.buffer.len() - self.tail
        } else {
            self.head - self.tail
        };
        (self.tail, len)
    }

    /// Simulate a DMA store into the ring memory.
    #[cfg(test)]
    pub(crate) fn poke(&mut self, index: usize, byte: u8) {
        self.buffer[index] = byte;
    }

    pub fn clear(&mut self) {
        self.head = 0;
        self.tail = 0;
    }
}

//! Endpoint Transfer Descriptors (TD)
//!
//! One TD describes one DMA transaction: a next pointer (or terminate),
//! a token with status and remaining byte count, and five 4 KiB page
//! pointers. The driver keeps a single TD per endpoint direction and
//! rewrites it on every prime.

#![allow(non_snake_case, non_upper_case_globals)]

use crate::ral;
use crate::vcell::VCell;

bitflags::bitflags! {
    /// Transfer status byte, written back by the hardware.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct Status: u8 {
        const ACTIVE = 1 << 7;
        const HALTED = 1 << 6;
        const DATA_BUFFER_ERROR = 1 << 5;
        const TRANSACTION_ERROR = 1 << 3;
    }
}

// No alignment on the record itself: the QH embeds one as its transfer
// overlay at byte offset 8. Standalone descriptors get their 32-byte
// alignment from the list that holds them.
#[repr(C)]
pub struct Td {
    NEXT: VCell<u32>,
    TOKEN: VCell<u32>,
    BUFFERS: [VCell<u32>; 5],
    _reserved: [u32; 1],
}

impl Td {
    pub const fn new() -> Self {
        Td {
            NEXT: VCell::new(0),
            TOKEN: VCell::new(0),
            BUFFERS: [
                VCell::new(0),
                VCell::new(0),
                VCell::new(0),
                VCell::new(0),
                VCell::new(0),
            ],
            _reserved: [0; 1],
        }
    }

    /// Mark the next-TD pointer invalid
    pub fn set_terminate(&self) {
        ral::write_reg!(crate::td, self, NEXT, TERMINATE: 1);
    }

    /// Link `td` as the next descriptor to execute
    ///
    /// The pointer must be 32-byte aligned; descriptors allocated in
    /// [`TdList`](crate::state::TdList) are.
    pub fn set_next(&self, td: *const Td) {
        self.NEXT.write(td as u32);
    }

    /// Arm the descriptor for a transfer of `len` bytes
    pub fn set_active(&self, len: usize) {
        ral::write_reg!(crate::td, self, TOKEN,
            TOTAL_BYTES: len as u32,
            STATUS: Status::ACTIVE.bits() as u32);
    }

    /// Read the hardware-written status byte
    pub fn status(&self) -> Status {
        Status::from_bits_truncate(ral::read_reg!(crate::td, self, TOKEN, STATUS) as u8)
    }

    /// Clear the active and halted bits, leaving the rest of the token
    ///
    /// The token is shared with the DMA engine, so this is a
    /// read-modify-write with an explicit mask.
    pub fn clear_status(&self) {
        let cleared = (Status::ACTIVE | Status::HALTED).bits() as u32;
        let token = self.TOKEN.read();
        self.TOKEN.write(token & !cleared);
    }

    /// Bytes the hardware has not yet transferred
    pub fn bytes_remaining(&self) -> usize {
        ral::read_reg!(crate::td, self, TOKEN, TOTAL_BYTES) as usize
    }

    /// Simulate a hardware writeback: transfer retired with `remaining`
    /// bytes unfilled.
    #[cfg(test)]
    pub(crate) fn complete(&self, remaining: usize) {
        self.TOKEN.write((remaining as u32) << 16);
    }

    /// Return the descriptor to the terminated, idle state
    pub fn reset(&self) {
        self.set_terminate();
        self.TOKEN.write(0);
        for pointer in self.BUFFERS.iter() {
            pointer.write(0);
        }
    }

    /// Write the five page pointers for a transfer starting `offset`
    /// bytes into `buffer`
    ///
    /// Pointers advance in 4 KiB pages and wrap back to the start of the
    /// buffer at its end, so a transfer may run off the end of a ring and
    /// continue at offset zero. A null `buffer` (zero-length handshake)
    /// leaves every pointer zero.
    pub fn set_buffer_pages(&self, buffer: *const u8, buffer_len: usize, offset: usize) {
        let base = buffer as usize;
        let end = base + buffer_len;
        self.BUFFERS[0].write((base + offset) as u32);

        let mut next = (base + offset) & !0xFFF;
        for pointer in self.BUFFERS[1..].iter() {
            next += 0x1000;
            if next > end {
                next = base;
            }
            pointer.write(next as u32);
        }
    }
}

pub mod NEXT {
    pub mod TERMINATE {
        pub const offset: u32 = 0;
        pub const mask: u32 = 1 << offset;
        pub mod RW {}
        pub mod R {}
        pub mod W {}
    }
}

pub mod TOKEN {
    pub mod STATUS {
        pub const offset: u32 = 0;
        pub const mask: u32 = 0xFF << offset;
        pub mod RW {}
        pub mod R {}
        pub mod W {}
    }
    pub mod TOTAL_BYTES {
        pub const offset: u32 = 16;
        pub const mask: u32 = 0x7FFF << offset;
        pub mod RW {}
        pub mod R {}
        pub mod W {}
    }
}

const _: [(); 1] = [(); (core::mem::size_of::<Td>() == 32) as usize];

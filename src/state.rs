//! Statically-allocated, DMA-visible driver memory
//!
//! The controller reads queue heads, transfer descriptors, and data
//! buffers by physical address, so all of it lives in `static`s that
//! never move. [`UsbState::take`] hands the memory out exactly once;
//! the returned references are `'static` and are threaded through the
//! driver for its whole life.

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicBool, Ordering};

use crate::qh::Qh;
use crate::td::Td;
use crate::QH_COUNT;

/// Bytes per bulk ring, each direction.
pub const RING_SIZE: usize = 16 * 1024;

/// The endpoint list: one QH per endpoint direction, 2048-byte aligned
/// as ENDPOINTLISTADDR requires.
#[repr(C, align(2048))]
pub struct QhList {
    list: [Qh; QH_COUNT],
}

impl QhList {
    pub fn get(&self, index: usize) -> &Qh {
        &self.list[index]
    }

    /// Base address, programmed into ENDPOINTLISTADDR.
    pub fn as_ptr(&self) -> *const Qh {
        self.list.as_ptr()
    }
}

#[repr(C, align(32))]
pub struct TdList {
    list: [Td; QH_COUNT],
}

impl TdList {
    pub fn get(&self, index: usize) -> &Td {
        &self.list[index]
    }
}

const QH_INIT: Qh = Qh::new();
const TD_INIT: Td = Td::new();

// The descriptor records use interior mutability, and the driver is the
// only software context that touches them after take().
unsafe impl Sync for QhList {}
unsafe impl Sync for TdList {}

static QH_LIST: QhList = QhList {
    list: [QH_INIT; QH_COUNT],
};
static TD_LIST: TdList = TdList {
    list: [TD_INIT; QH_COUNT],
};

struct Buffers(UnsafeCell<BuffersInner>);
unsafe impl Sync for Buffers {}

struct BuffersInner {
    rx: [u8; RING_SIZE],
    tx: [u8; RING_SIZE],
    line_coding: [u8; 7],
    scratch: [u8; 2],
}

static BUFFERS: Buffers = Buffers(UnsafeCell::new(BuffersInner {
    rx: [0; RING_SIZE],
    tx: [0; RING_SIZE],
    line_coding: [0; 7],
    scratch: [0; 2],
}));

static TAKEN: AtomicBool = AtomicBool::new(false);

/// Exclusive handles to the driver's static memory.
pub struct UsbState {
    pub(crate) qh_list: &'static QhList,
    pub(crate) td_list: &'static TdList,
    pub(crate) rx_buffer: &'static mut [u8],
    pub(crate) tx_buffer: &'static mut [u8],
    pub(crate) line_coding: &'static mut [u8; 7],
    pub(crate) scratch: &'static mut [u8; 2],
}

impl UsbState {
    /// Take the memory singleton.
    ///
    /// Returns `None` on every call after the first.
    pub fn take() -> Option<UsbState> {
        if TAKEN.swap(true, Ordering::SeqCst) {
            return None;
        }
        // TAKEN guarantees this mutable access is unique.
        let buffers = unsafe { &mut *BUFFERS.0.get() };
        Some(UsbState {
            qh_list: &QH_LIST,
            td_list: &TD_LIST,
            rx_buffer: &mut buffers.rx,
            tx_buffer: &mut buffers.tx,
            line_coding: &mut buffers.line_coding,
            scratch: &mut buffers.scratch,
        })
    }
}

impl UsbState {
    /// Fresh, leaked memory so each host test gets its own instance.
    #[cfg(test)]
    pub(crate) fn leaked() -> UsbState {
        use std::boxed::Box;
        UsbState {
            qh_list: Box::leak(Box::new(QhList {
                list: [QH_INIT; QH_COUNT],
            })),
            td_list: Box::leak(Box::new(TdList {
                list: [TD_INIT; QH_COUNT],
            })),
            rx_buffer: Box::leak(std::vec![0u8; RING_SIZE].into_boxed_slice()),
            tx_buffer: Box::leak(std::vec![0u8; RING_SIZE].into_boxed_slice()),
            line_coding: Box::leak(Box::new([0u8; 7])),
            scratch: Box::leak(Box::new([0u8; 2])),
        }
    }
}

const _: [(); 1] = [(); (core::mem::size_of::<QhList>() == 64 * QH_COUNT) as usize];

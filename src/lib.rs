//! A USB CDC-ACM device driver for ChipIdea-style controllers
//!
//! `myriad-usbd` drives the dual-role USB controller found on Myriad
//! SoCs in device mode, exposing a full-speed virtual serial port. The
//! driver owns the queue heads, transfer descriptors, and bulk data
//! rings; the application provides register access through [`UsbCore`]
//! and calls [`UsbCdcAcm::poll`] from its superloop.
//!
//! ```no_run
//! use myriad_usbd::{UsbCdcAcm, UsbState};
//! # struct Core; unsafe impl myriad_usbd::UsbCore for Core {
//! #   fn read_register(&mut self, _: myriad_usbd::Register) -> u32 { 0 }
//! #   fn write_register(&mut self, _: myriad_usbd::Register, _: u32) {}
//! #   fn flush_dcache(&mut self) {}
//! #   fn clear_interrupt(&mut self) {}
//! # }
//! # fn core() -> Core { Core }
//!
//! let mut serial = UsbCdcAcm::new(core(), UsbState::take().unwrap());
//! serial.initialize().unwrap();
//! loop {
//!     serial.poll().unwrap();
//!     while let Some(byte) = serial.read_byte() {
//!         serial.write_byte(byte);
//!     }
//! }
//! ```

#![no_std]

#[cfg(test)]
extern crate std;

#[macro_use]
mod log;

mod descriptors;
mod device;
mod driver;
mod endpoint;
#[cfg(test)]
mod mock;
mod qh;
mod ral;
mod ring;
mod setup;
mod state;
mod td;
mod vcell;

pub use driver::UsbCdcAcm;
pub use ral::Register;
pub use state::UsbState;

/// Sixteen endpoints, two directions
const QH_COUNT: usize = 16 * 2;

/// A bounded hardware handshake did not complete.
///
/// Surfaces from [`UsbCdcAcm::initialize`] when the controller never
/// comes out of reset, and from [`UsbCdcAcm::poll`] when renegotiation
/// after a wedged handshake also fails.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HardwareTimeout;

impl core::fmt::Display for HardwareTimeout {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("USB controller handshake timed out")
    }
}

/// A type that accesses the USB controller's registers
///
/// The driver performs every register access through this trait, and
/// never holds a raw pointer to the register block itself.
///
/// # Safety
///
/// An implementation must read and write the device-controller register
/// at `register`'s offset from the core base, and nothing else. On
/// cores with a data cache in front of the DMA engine,
/// [`flush_dcache`](UsbCore::flush_dcache) must make all prior stores
/// visible to the controller; on coherent systems it may do nothing.
///
/// # Example
///
/// A memory-mapped implementation over the controller's register block:
///
/// ```
/// use myriad_usbd::{Register, UsbCore};
///
/// # static mut BLOCK: [u32; 0x80] = [0; 0x80];
/// # fn register_base() -> *mut u32 { unsafe { core::ptr::addr_of_mut!(BLOCK) as *mut u32 } }
/// struct Core {
///     base: *mut u32,
/// }
///
/// unsafe impl UsbCore for Core {
///     fn read_register(&mut self, register: Register) -> u32 {
///         unsafe { self.base.add(register.offset() / 4).read_volatile() }
///     }
///     fn write_register(&mut self, register: Register, value: u32) {
///         unsafe { self.base.add(register.offset() / 4).write_volatile(value) }
///     }
///     fn flush_dcache(&mut self) {
///         // This core's DMA engine snoops the cache.
///     }
///     fn clear_interrupt(&mut self) {}
/// }
///
/// let mut core = Core { base: register_base() };
/// core.write_register(Register::BURSTSIZE, 0x1010);
/// assert_eq!(core.read_register(Register::BURSTSIZE), 0x1010);
/// ```
pub unsafe trait UsbCore {
    /// Read the device-controller register.
    fn read_register(&mut self, register: Register) -> u32;
    /// Write the device-controller register.
    fn write_register(&mut self, register: Register, value: u32);
    /// Make all prior stores visible to the controller's DMA engine.
    fn flush_dcache(&mut self);
    /// Acknowledge the USB interrupt at the interrupt controller.
    fn clear_interrupt(&mut self);
}

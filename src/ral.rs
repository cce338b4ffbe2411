//! Register map for the Myriad USB device controller
//!
//! The controller is a ChipIdea-style dual-role core operated in device
//! mode. Only the device-mode registers the driver touches are modeled
//! here. Access goes through the [`UsbCore`](crate::UsbCore) trait so the
//! protocol logic stays free of raw MMIO and runs on the host in tests.

#![allow(non_snake_case, non_upper_case_globals)]

pub use ral_registers::{modify_reg, read_reg, write_reg};

/// One controller register, identified by its offset from the core base.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Register {
    SBUSCFG,
    USBCMD,
    USBSTS,
    USBINTR,
    DEVICEADDR,
    ENDPOINTLISTADDR,
    BURSTSIZE,
    PORTSC1,
    OTGSC,
    USBMODE,
    ENDPTSETUPSTAT,
    ENDPTPRIME,
    ENDPTFLUSH,
    ENDPTSTAT,
    ENDPTCOMPLETE,
    /// Per-endpoint control; `ENDPTCTRL(0)` covers both halves of EP0.
    ENDPTCTRL(u8),
}

impl Register {
    /// Byte offset from the controller's register base.
    pub const fn offset(self) -> usize {
        match self {
            Register::SBUSCFG => 0x090,
            Register::USBCMD => 0x140,
            Register::USBSTS => 0x144,
            Register::USBINTR => 0x148,
            Register::DEVICEADDR => 0x154,
            Register::ENDPOINTLISTADDR => 0x158,
            Register::BURSTSIZE => 0x160,
            Register::PORTSC1 => 0x184,
            Register::OTGSC => 0x1A4,
            Register::USBMODE => 0x1A8,
            Register::ENDPTSETUPSTAT => 0x1AC,
            Register::ENDPTPRIME => 0x1B0,
            Register::ENDPTFLUSH => 0x1B4,
            Register::ENDPTSTAT => 0x1B8,
            Register::ENDPTCOMPLETE => 0x1BC,
            Register::ENDPTCTRL(n) => 0x1C0 + 4 * n as usize,
        }
    }
}

pub mod USBCMD {
    /// Run / stop
    pub const RS: u32 = 1 << 0;
    /// Controller reset
    pub const RST: u32 = 1 << 1;
    /// Setup tripwire
    pub const SUTW: u32 = 1 << 13;
}

pub mod USBSTS {
    /// USB interrupt
    pub const UI: u32 = 1 << 0;
    /// Port change detect
    pub const PCI: u32 = 1 << 2;
    /// USB reset received
    pub const URI: u32 = 1 << 6;
    /// Start-of-frame received
    pub const SRI: u32 = 1 << 7;
    /// Device-controller suspend
    pub const SLI: u32 = 1 << 8;
}

pub mod USBMODE {
    /// Controller mode: device
    pub const CM_DEVICE: u32 = 0x2;
    /// Setup lockout mode off (we use the tripwire instead)
    pub const SLOM: u32 = 1 << 3;
}

pub mod PORTSC1 {
    /// Port enable
    pub const PE: u32 = 1 << 2;
}

pub mod OTGSC {
    /// OTG termination
    pub const OT: u32 = 1 << 3;
    /// VBUS charge
    pub const VC: u32 = 1 << 1;
}

pub mod DEVICEADDR {
    /// Device address field position
    pub const USBADR_SHIFT: u32 = 25;
    /// Address advance: hardware latches the new address after the
    /// status phase of the current control transfer completes.
    pub const USBADRA: u32 = 1 << 24;
}

pub mod ENDPTCTRL {
    /// TX (IN) endpoint enable
    pub const TXE: u32 = 1 << 23;
    /// TX data-toggle reset
    pub const TXR: u32 = 1 << 22;
    /// TX endpoint type position
    pub const TXT_SHIFT: u32 = 18;
    /// TX endpoint stall
    pub const TXS: u32 = 1 << 16;
    /// RX (OUT) endpoint enable
    pub const RXE: u32 = 1 << 7;
    /// RX data-toggle reset
    pub const RXR: u32 = 1 << 6;
    /// RX endpoint type position
    pub const RXT_SHIFT: u32 = 2;
    /// RX endpoint stall
    pub const RXS: u32 = 1 << 0;
}

/// Value programmed into BURSTSIZE at bring-up (TX/RX burst, in words).
pub const BURST_SIZE: u32 = 0x1010;

/// Iteration bound for every hardware handshake wait.
///
/// The handshakes this driver performs (prime accept, tripwire latch,
/// flush, controller reset) complete within a few bus cycles on working
/// hardware. A bound this large only trips when the controller is wedged.
const SPIN_LIMIT: u32 = 100_000;

/// Spin on `ready` until it reports true, or until the retry bound is hit.
///
/// Replaces the unbounded busy-waits of a typical bare-metal bring-up:
/// a wedged controller surfaces as [`HardwareTimeout`] so the caller can
/// renegotiate with a bus reset instead of hanging the superloop.
pub(crate) fn spin_until(mut ready: impl FnMut() -> bool) -> Result<(), crate::HardwareTimeout> {
    for _ in 0..SPIN_LIMIT {
        if ready() {
            return Ok(());
        }
    }
    Err(crate::HardwareTimeout)
}

#[cfg(test)]
mod test {
    use super::{spin_until, Register};

    #[test]
    fn endpoint_control_offsets() {
        assert_eq!(Register::ENDPTCTRL(0).offset(), 0x1C0);
        assert_eq!(Register::ENDPTCTRL(3).offset(), 0x1CC);
    }

    #[test]
    fn spin_until_ready() {
        let mut polls = 0;
        assert!(spin_until(|| {
            polls += 1;
            polls == 3
        })
        .is_ok());
        assert_eq!(polls, 3);
    }

    #[test]
    fn spin_until_timeout() {
        assert!(spin_until(|| false).is_err());
    }
}

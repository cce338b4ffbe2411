//! Endpoint management
//!
//! An [`Endpoint`] ties one queue head and one transfer descriptor to a
//! hardware endpoint direction. The endpoint list is indexed by
//! `(endpoint number << 1) | direction`, with IN as direction 1, so the
//! five endpoints this device exposes sit at fixed indices.

use usb_device::endpoint::EndpointAddress;
use usb_device::UsbDirection;

use crate::qh::Qh;
use crate::ral::{self, Register, ENDPTCTRL, USBCMD};
use crate::setup::SetupPacket;
use crate::td::{Status, Td};
use crate::{HardwareTimeout, UsbCore};

/// Position of `address` in the endpoint list.
pub fn qh_index(address: EndpointAddress) -> usize {
    (address.index() << 1) | (address.direction() == UsbDirection::In) as usize
}

/// Endpoint transfer type, as encoded in ENDPTCTRL.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EndpointKind {
    Control = 0,
    Isochronous = 1,
    Bulk = 2,
    Interrupt = 3,
}

pub struct Endpoint {
    address: EndpointAddress,
    kind: EndpointKind,
    max_packet: usize,
    qh: &'static Qh,
    td: &'static Td,
}

impl Endpoint {
    pub fn new(
        address: EndpointAddress,
        kind: EndpointKind,
        max_packet: usize,
        qh: &'static Qh,
        td: &'static Td,
    ) -> Self {
        Endpoint {
            address,
            kind,
            max_packet,
            qh,
            td,
        }
    }

    pub fn number(&self) -> u8 {
        self.address.index() as u8
    }

    pub fn is_in(&self) -> bool {
        self.address.direction() == UsbDirection::In
    }

    /// Configure the queue head and enable the endpoint's half of its
    /// ENDPTCTRL register, resetting the data toggle.
    pub fn start<B: UsbCore>(&self, bus: &mut B) {
        self.qh.set_max_packet_len(self.max_packet);
        self.qh.overlay().reset();
        self.td.reset();

        let ctrl = Register::ENDPTCTRL(self.number());
        let mut value = bus.read_register(ctrl);
        if self.is_in() {
            value &= !((0x3 << ENDPTCTRL::TXT_SHIFT) | ENDPTCTRL::TXS);
            value |= ((self.kind as u32) << ENDPTCTRL::TXT_SHIFT)
                | ENDPTCTRL::TXR
                | ENDPTCTRL::TXE;
        } else {
            value &= !((0x3 << ENDPTCTRL::RXT_SHIFT) | ENDPTCTRL::RXS);
            value |= ((self.kind as u32) << ENDPTCTRL::RXT_SHIFT)
                | ENDPTCTRL::RXR
                | ENDPTCTRL::RXE;
        }
        bus.write_register(ctrl, value);
    }

    /// Schedule a transfer of `transfer_len` bytes starting `offset`
    /// bytes into `buffer`, and hand it to the controller.
    ///
    /// `buffer` may be null for a zero-length handshake. The wait for
    /// the controller to accept the prime is bounded; a timeout means
    /// the controller is wedged and the caller should renegotiate.
    pub fn prime<B: UsbCore>(
        &self,
        bus: &mut B,
        buffer: *const u8,
        buffer_len: usize,
        offset: usize,
        transfer_len: usize,
    ) -> Result<(), HardwareTimeout> {
        self.td.set_terminate();
        self.td.set_active(transfer_len);
        self.td.set_buffer_pages(buffer, buffer_len, offset);

        self.qh.overlay().set_next(self.td);
        bus.flush_dcache();
        self.qh.overlay().clear_status();

        let mut mask = 1u32 << self.number();
        if self.is_in() {
            mask <<= 16;
        }

        // A prime issued while a setup packet is pending would be
        // dropped by the controller.
        ral::spin_until(|| bus.read_register(Register::ENDPTSETUPSTAT) == 0)?;

        bus.write_register(Register::ENDPTPRIME, mask);
        ral::spin_until(|| bus.read_register(Register::ENDPTPRIME) & mask == 0)?;
        // A short transfer can retire before this poll observes the
        // status bit, so a completion also counts as accepted.
        ral::spin_until(|| {
            bus.read_register(Register::ENDPTSTAT) & mask != 0
                || bus.read_register(Register::ENDPTCOMPLETE) & mask != 0
        })
    }

    /// Consume the pending setup packet from the queue head.
    ///
    /// Acknowledges the setup semaphore, then reads the captured words
    /// under the setup tripwire so both loads observe the same packet.
    pub fn read_setup<B: UsbCore>(&self, bus: &mut B) -> Result<SetupPacket, HardwareTimeout> {
        bus.write_register(Register::ENDPTSETUPSTAT, 1 << self.number());

        ral::spin_until(|| {
            let cmd = bus.read_register(Register::USBCMD);
            bus.write_register(Register::USBCMD, cmd | USBCMD::SUTW);
            bus.read_register(Register::USBCMD) & USBCMD::SUTW != 0
        })?;

        bus.flush_dcache();
        let (word0, word1) = self.qh.setup();

        let cmd = bus.read_register(Register::USBCMD);
        bus.write_register(Register::USBCMD, cmd & !USBCMD::SUTW);

        Ok(SetupPacket::from_words(word0, word1))
    }

    /// Stall this endpoint's half of ENDPTCTRL.
    pub fn stall<B: UsbCore>(&self, bus: &mut B) {
        let ctrl = Register::ENDPTCTRL(self.number());
        let stall_bit = if self.is_in() {
            ENDPTCTRL::TXS
        } else {
            ENDPTCTRL::RXS
        };
        let value = bus.read_register(ctrl);
        bus.write_register(ctrl, value | stall_bit);
    }

    #[cfg(test)]
    pub(crate) fn td(&self) -> &Td {
        self.td
    }

    /// True while the controller still owns the current transfer.
    pub fn transfer_active(&self) -> bool {
        self.td.status().contains(Status::ACTIVE)
    }

    /// Bytes of the current transfer the controller did not fill.
    pub fn bytes_remaining(&self) -> usize {
        self.td.bytes_remaining()
    }
}

#[cfg(test)]
mod test {
    use super::{qh_index, Endpoint, EndpointKind};
    use crate::mock::MockBus;
    use crate::qh::Qh;
    use crate::ral::{Register, ENDPTCTRL};
    use crate::td::Td;
    use std::boxed::Box;
    use usb_device::endpoint::EndpointAddress;

    fn endpoint(address: u8, kind: EndpointKind, max_packet: usize) -> Endpoint {
        Endpoint::new(
            EndpointAddress::from(address),
            kind,
            max_packet,
            Box::leak(Box::new(Qh::new())),
            Box::leak(Box::new(Td::new())),
        )
    }

    #[test]
    fn list_index_by_address() {
        assert_eq!(qh_index(EndpointAddress::from(0x00)), 0);
        assert_eq!(qh_index(EndpointAddress::from(0x80)), 1);
        assert_eq!(qh_index(EndpointAddress::from(0x01)), 2);
        assert_eq!(qh_index(EndpointAddress::from(0x82)), 5);
        assert_eq!(qh_index(EndpointAddress::from(0x83)), 7);
    }

    #[test]
    fn start_enables_rx_half() {
        let mut bus = MockBus::new();
        let ep = endpoint(0x01, EndpointKind::Bulk, 64);
        ep.start(&mut bus);
        let ctrl = bus.register(Register::ENDPTCTRL(1));
        assert_eq!(
            ctrl,
            (2 << ENDPTCTRL::RXT_SHIFT) | ENDPTCTRL::RXR | ENDPTCTRL::RXE
        );
    }

    #[test]
    fn start_preserves_other_half() {
        let mut bus = MockBus::new();
        let out = endpoint(0x01, EndpointKind::Bulk, 64);
        let ep_in = endpoint(0x81, EndpointKind::Bulk, 64);
        out.start(&mut bus);
        ep_in.start(&mut bus);
        let ctrl = bus.register(Register::ENDPTCTRL(1));
        assert_ne!(ctrl & ENDPTCTRL::RXE, 0);
        assert_ne!(ctrl & ENDPTCTRL::TXE, 0);
    }

    #[test]
    fn prime_masks_by_direction() {
        let mut bus = MockBus::new();
        let out = endpoint(0x01, EndpointKind::Bulk, 64);
        let ep_in = endpoint(0x82, EndpointKind::Bulk, 64);
        out.prime(&mut bus, core::ptr::null(), 0, 0, 0).unwrap();
        ep_in.prime(&mut bus, core::ptr::null(), 0, 0, 0).unwrap();
        assert_eq!(bus.primes(), &[1 << 1, 1 << (2 + 16)]);
    }

    #[test]
    fn prime_arms_descriptor() {
        let mut bus = MockBus::new();
        let buffer = [0u8; 128];
        let ep = endpoint(0x82, EndpointKind::Bulk, 64);
        ep.prime(&mut bus, buffer.as_ptr(), buffer.len(), 16, 32)
            .unwrap();
        assert!(ep.transfer_active());
        assert_eq!(ep.bytes_remaining(), 32);
    }

    #[test]
    fn read_setup_clears_semaphore_and_tripwire() {
        let mut bus = MockBus::new();
        let qh: &'static Qh = Box::leak(Box::new(Qh::new()));
        qh.set_setup(0x0100_0680, 0x0040_0000);
        let ep = Endpoint::new(
            EndpointAddress::from(0x00),
            EndpointKind::Control,
            64,
            qh,
            Box::leak(Box::new(Td::new())),
        );
        bus.set_register(Register::ENDPTSETUPSTAT, 1);

        let setup = ep.read_setup(&mut bus).unwrap();
        assert_eq!(setup.request, 0x06);
        assert_eq!(setup.length, 64);
        assert_eq!(bus.register(Register::ENDPTSETUPSTAT), 0);
        assert_eq!(
            bus.register(Register::USBCMD) & crate::ral::USBCMD::SUTW,
            0
        );
    }

    #[test]
    fn stall_sets_direction_bit() {
        let mut bus = MockBus::new();
        let out = endpoint(0x00, EndpointKind::Control, 64);
        let ep_in = endpoint(0x80, EndpointKind::Control, 64);
        out.stall(&mut bus);
        ep_in.stall(&mut bus);
        let ctrl = bus.register(Register::ENDPTCTRL(0));
        assert_eq!(ctrl, ENDPTCTRL::RXS | ENDPTCTRL::TXS);
    }
}

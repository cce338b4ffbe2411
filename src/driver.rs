//! CDC-ACM device driver
//!
//! [`UsbCdcAcm`] owns the register access, the endpoint list, the
//! control dispatcher, and the two bulk rings. The application calls
//! [`initialize`](UsbCdcAcm::initialize) once, then
//! [`poll`](UsbCdcAcm::poll) from its superloop; bytes move through the
//! [`read_byte`](UsbCdcAcm::read_byte) / [`write`](UsbCdcAcm::write)
//! ends of the rings.

use core::ptr;

use usb_device::endpoint::EndpointAddress;

use crate::descriptors;
use crate::device::{Device, Reply};
use crate::endpoint::{qh_index, Endpoint, EndpointKind};
use crate::ral::{
    self, Register, BURST_SIZE, DEVICEADDR, OTGSC, PORTSC1, USBCMD, USBMODE, USBSTS,
};
use crate::ring::Ring;
use crate::state::{QhList, UsbState};
use crate::{HardwareTimeout, UsbCore};

struct Endpoints {
    ctrl_out: Endpoint,
    ctrl_in: Endpoint,
    bulk_out: Endpoint,
    bulk_in: Endpoint,
    interrupt_in: Endpoint,
}

pub struct UsbCdcAcm<B> {
    bus: B,
    device: Device,
    endpoints: Endpoints,
    rx: Ring,
    tx: Ring,
    /// Length of the outstanding bulk OUT transfer.
    rx_primed: usize,
    /// Set once SET_CONFIGURATION has brought the data endpoints up.
    primed: bool,
    qh_list: &'static QhList,
}

impl<B: UsbCore> UsbCdcAcm<B> {
    pub fn new(bus: B, state: UsbState) -> Self {
        let UsbState {
            qh_list,
            td_list,
            rx_buffer,
            tx_buffer,
            line_coding,
            scratch,
        } = state;

        let endpoint = |address: u8, kind, max_packet| {
            let address = EndpointAddress::from(address);
            let index = qh_index(address);
            Endpoint::new(
                address,
                kind,
                max_packet,
                qh_list.get(index),
                td_list.get(index),
            )
        };

        UsbCdcAcm {
            bus,
            device: Device::new(line_coding, scratch),
            endpoints: Endpoints {
                ctrl_out: endpoint(0x00, EndpointKind::Control, descriptors::MAX_PACKET_EP0),
                ctrl_in: endpoint(0x80, EndpointKind::Control, descriptors::MAX_PACKET_EP0),
                bulk_out: endpoint(0x01, EndpointKind::Bulk, descriptors::MAX_PACKET_SIZE),
                bulk_in: endpoint(0x82, EndpointKind::Bulk, descriptors::MAX_PACKET_SIZE),
                interrupt_in: endpoint(
                    0x83,
                    EndpointKind::Interrupt,
                    descriptors::INTERRUPT_MAX_PACKET,
                ),
            },
            rx: Ring::new(rx_buffer),
            tx: Ring::new(tx_buffer),
            rx_primed: 0,
            primed: false,
            qh_list,
        }
    }

    /// Bring the controller out of reset, configure device mode, and
    /// start the control endpoints.
    ///
    /// The bus stays at address zero until the host enumerates us.
    pub fn initialize(&mut self) -> Result<(), HardwareTimeout> {
        let bus = &mut self.bus;

        let otgsc = bus.read_register(Register::OTGSC);
        bus.write_register(Register::OTGSC, otgsc | OTGSC::OT | OTGSC::VC);

        // Stop, then reset the controller.
        bus.write_register(Register::USBCMD, 0);
        ral::spin_until(|| bus.read_register(Register::USBCMD) & USBCMD::RS == 0)?;
        let cmd = bus.read_register(Register::USBCMD);
        bus.write_register(Register::USBCMD, cmd | USBCMD::RST);
        ral::spin_until(|| bus.read_register(Register::USBCMD) & USBCMD::RST == 0)?;

        bus.write_register(Register::PORTSC1, PORTSC1::PE);
        bus.write_register(Register::DEVICEADDR, 0);
        bus.write_register(Register::BURSTSIZE, BURST_SIZE);
        bus.write_register(Register::SBUSCFG, 0);
        bus.write_register(Register::USBMODE, USBMODE::CM_DEVICE | USBMODE::SLOM);
        bus.write_register(
            Register::ENDPOINTLISTADDR,
            self.qh_list.as_ptr() as u32,
        );

        self.endpoints.ctrl_out.start(bus);
        self.endpoints.ctrl_in.start(bus);

        // Run, then sync with the host's frame clock.
        bus.write_register(Register::USBCMD, USBCMD::RS);
        ral::spin_until(|| bus.read_register(Register::USBSTS) & USBSTS::SRI != 0)?;
        bus.write_register(Register::USBSTS, USBSTS::SRI);
        bus.clear_interrupt();

        debug!("usb: controller running");
        self.bus_reset()
    }

    /// Service the controller: bus events, setup packets, and bulk
    /// transfer completions.
    ///
    /// A handshake timeout renegotiates with the host before it
    /// surfaces: the bus returns to its post-reset state, then the
    /// error propagates so the caller knows traffic was dropped.
    pub fn poll(&mut self) -> Result<(), HardwareTimeout> {
        if let Err(timeout) = self.service() {
            warn!("usb: handshake timed out, renegotiating");
            self.bus_reset()?;
            return Err(timeout);
        }
        Ok(())
    }

    fn service(&mut self) -> Result<(), HardwareTimeout> {
        let status = self.bus.read_register(Register::USBSTS);
        if status & USBSTS::URI != 0 {
            self.bus.write_register(Register::USBSTS, USBSTS::URI);
            debug!("usb: bus reset");
            self.bus_reset()?;
        }
        if status & USBSTS::PCI != 0 {
            self.bus.write_register(Register::USBSTS, USBSTS::PCI);
            debug!("usb: port change");
        }
        if status & USBSTS::SLI != 0 {
            debug!("usb: suspended");
        }
        if status & USBSTS::SRI != 0 {
            self.bus.write_register(Register::USBSTS, USBSTS::SRI);
        }
        if status & USBSTS::UI != 0 {
            self.bus.write_register(Register::USBSTS, USBSTS::UI);
        }

        self.handle_setup()?;
        self.handle_transfers()
    }

    /// Return every endpoint and the device state machine to the
    /// post-reset state.
    fn bus_reset(&mut self) -> Result<(), HardwareTimeout> {
        let bus = &mut self.bus;

        let setup_status = bus.read_register(Register::ENDPTSETUPSTAT);
        bus.write_register(Register::ENDPTSETUPSTAT, setup_status);
        let complete = bus.read_register(Register::ENDPTCOMPLETE);
        bus.write_register(Register::ENDPTCOMPLETE, complete);
        ral::spin_until(|| bus.read_register(Register::ENDPTPRIME) == 0)?;
        bus.write_register(Register::ENDPTFLUSH, 0xFFFF_FFFF);
        bus.write_register(Register::DEVICEADDR, 0);

        self.device.reset();
        self.rx.clear();
        self.tx.clear();
        self.rx_primed = 0;
        self.primed = false;
        Ok(())
    }

    /// Consume a pending setup packet on endpoint zero and run the
    /// control transfer it starts.
    fn handle_setup(&mut self) -> Result<(), HardwareTimeout> {
        if self.bus.read_register(Register::ENDPTSETUPSTAT) & 1 == 0 {
            return Ok(());
        }

        let Self {
            bus,
            device,
            endpoints,
            rx,
            rx_primed,
            primed,
            ..
        } = self;

        let setup = endpoints.ctrl_out.read_setup(bus)?;
        debug!(
            "usb: setup {:02X} {:02X} {:04X} {:04X} {:04X}",
            setup.request_type, setup.request, setup.value, setup.index, setup.length
        );

        match device.handle(&setup) {
            Reply::In(data) => {
                endpoints
                    .ctrl_in
                    .prime(bus, data.as_ptr(), data.len(), 0, data.len())?;
                endpoints.ctrl_out.prime(bus, ptr::null(), 0, 0, 0)?;
            }
            Reply::ReadLineCoding => {
                let block = device.line_coding_ptr();
                let len = (setup.length as usize).min(7);
                endpoints.ctrl_out.prime(bus, block, 7, 0, len)?;
                endpoints.ctrl_in.prime(bus, ptr::null(), 0, 0, 0)?;
            }
            Reply::Ack => {
                endpoints.ctrl_in.prime(bus, ptr::null(), 0, 0, 0)?;
            }
            Reply::SetAddress(address) => {
                bus.write_register(
                    Register::DEVICEADDR,
                    ((address as u32) << DEVICEADDR::USBADR_SHIFT) | DEVICEADDR::USBADRA,
                );
                endpoints.ctrl_in.prime(bus, ptr::null(), 0, 0, 0)?;
                endpoints.ctrl_out.prime(bus, ptr::null(), 0, 0, 0)?;
            }
            Reply::Configure(configuration) => {
                let bring_up = configuration == 1 && !device.configured();
                device.set_configuration(configuration);
                if bring_up {
                    Self::init_endpoints(bus, endpoints, rx, rx_primed, primed)?;
                }
                endpoints.ctrl_in.prime(bus, ptr::null(), 0, 0, 0)?;
            }
            Reply::Stall => {
                debug!("usb: stalling request {:02X}", setup.request);
                endpoints.ctrl_out.stall(bus);
                endpoints.ctrl_in.stall(bus);
            }
        }
        Ok(())
    }

    /// Bring up the data endpoints after SET_CONFIGURATION.
    fn init_endpoints(
        bus: &mut B,
        endpoints: &Endpoints,
        rx: &mut Ring,
        rx_primed: &mut usize,
        primed: &mut bool,
    ) -> Result<(), HardwareTimeout> {
        endpoints.bulk_out.start(bus);
        endpoints.bulk_in.start(bus);
        endpoints.interrupt_in.start(bus);

        // Receive the first packet at the start of the (empty) ring.
        endpoints.bulk_out.prime(
            bus,
            rx.as_ptr(),
            rx.capacity(),
            0,
            descriptors::MAX_PACKET_SIZE,
        )?;
        *rx_primed = descriptors::MAX_PACKET_SIZE;

        endpoints.bulk_in.prime(bus, ptr::null(), 0, 0, 0)?;
        endpoints.interrupt_in.prime(bus, ptr::null(), 0, 0, 0)?;

        *primed = true;
        Ok(())
    }

    /// Retire completed bulk transfers and keep both directions primed.
    fn handle_transfers(&mut self) -> Result<(), HardwareTimeout> {
        if !self.primed {
            return Ok(());
        }

        let Self {
            bus,
            endpoints,
            rx,
            tx,
            rx_primed,
            ..
        } = self;

        bus.flush_dcache();

        if !endpoints.bulk_out.transfer_active() {
            let remaining = endpoints.bulk_out.bytes_remaining();
            let received = rx_primed.saturating_sub(remaining);
            rx.advance_head(received);

            // Reprime up to the tail so the host cannot overwrite
            // unread bytes.
            let (offset, len) = rx.write_span();
            *rx_primed = len;
            if len > 0 {
                endpoints
                    .bulk_out
                    .prime(bus, rx.as_ptr(), rx.capacity(), offset, len)?;
            }
        }

        if !endpoints.bulk_in.transfer_active() {
            let (offset, len) = tx.read_span();
            if len > 0 {
                endpoints
                    .bulk_in
                    .prime(bus, tx.as_ptr(), tx.capacity(), offset, len)?;
                tx.advance_tail(len);
            }
        }
        Ok(())
    }

    /// True once the host has selected our configuration.
    pub fn configured(&self) -> bool {
        self.device.configured()
    }

    /// True while the host's terminal asserts DTR.
    pub fn dtr(&self) -> bool {
        self.device.dtr()
    }

    /// The line coding most recently negotiated by the host.
    pub fn line_coding(&self) -> &[u8; 7] {
        self.device.line_coding()
    }

    /// Bytes received from the host and not yet read.
    pub fn available(&self) -> usize {
        self.rx.len()
    }

    pub fn read_byte(&mut self) -> Option<u8> {
        self.rx.pop()
    }

    /// Inspect a received byte `offset` positions ahead without
    /// consuming it.
    pub fn peek_byte(&self, offset: usize) -> Option<u8> {
        self.rx.peek(offset)
    }

    /// Queue one byte for transmission. Returns `false` when the
    /// transmit ring is full.
    pub fn write_byte(&mut self, byte: u8) -> bool {
        self.tx.push(byte)
    }

    /// Queue as much of `bytes` as fits, returning the count queued.
    pub fn write(&mut self, bytes: &[u8]) -> usize {
        let mut queued = 0;
        for &byte in bytes {
            if !self.tx.push(byte) {
                break;
            }
            queued += 1;
        }
        queued
    }
}

#[cfg(test)]
mod test {
    use super::UsbCdcAcm;
    use crate::mock::MockBus;
    use crate::ral::{Register, DEVICEADDR, ENDPTCTRL, USBMODE};
    use crate::state::UsbState;

    const CTRL_OUT_PRIME: u32 = 1;
    const CTRL_IN_PRIME: u32 = 1 << 16;
    const BULK_OUT_PRIME: u32 = 1 << 1;
    const BULK_IN_PRIME: u32 = 1 << (2 + 16);
    const INTERRUPT_IN_PRIME: u32 = 1 << (3 + 16);

    fn driver() -> UsbCdcAcm<MockBus> {
        let mut acm = UsbCdcAcm::new(MockBus::new(), UsbState::leaked());
        acm.initialize().unwrap();
        acm
    }

    fn inject_setup(acm: &mut UsbCdcAcm<MockBus>, bytes: [u8; 8]) {
        let word0 = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let word1 = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        acm.qh_list.get(0).set_setup(word0, word1);
        acm.bus.set_register(Register::ENDPTSETUPSTAT, 1);
    }

    fn configure(acm: &mut UsbCdcAcm<MockBus>) {
        inject_setup(acm, [0x00, 0x09, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00]);
        acm.poll().unwrap();
        assert!(acm.configured());
    }

    #[test]
    fn initialize_programs_controller() {
        let acm = driver();
        assert_eq!(
            acm.bus.register(Register::USBMODE),
            USBMODE::CM_DEVICE | USBMODE::SLOM
        );
        assert_eq!(acm.bus.register(Register::BURSTSIZE), 0x1010);
        assert_eq!(
            acm.bus.register(Register::ENDPOINTLISTADDR),
            acm.qh_list.as_ptr() as u32
        );
        // Both halves of EP0 enabled as control endpoints.
        let ctrl0 = acm.bus.register(Register::ENDPTCTRL(0));
        assert_ne!(ctrl0 & ENDPTCTRL::RXE, 0);
        assert_ne!(ctrl0 & ENDPTCTRL::TXE, 0);
        assert_eq!(acm.bus.register(Register::DEVICEADDR), 0);
    }

    #[test]
    fn get_descriptor_primes_data_and_status() {
        let mut acm = driver();
        // GET_DESCRIPTOR(Device), wLength 18.
        inject_setup(&mut acm, [0x80, 0x06, 0x00, 0x01, 0x00, 0x00, 0x12, 0x00]);
        acm.poll().unwrap();
        assert_eq!(acm.bus.primes(), &[CTRL_IN_PRIME, CTRL_OUT_PRIME]);
        assert!(acm.endpoints.ctrl_in.transfer_active());
        assert_eq!(acm.endpoints.ctrl_in.bytes_remaining(), 18);
    }

    #[test]
    fn set_address_latches_with_advance_bit() {
        let mut acm = driver();
        inject_setup(&mut acm, [0x00, 0x05, 0x35, 0x00, 0x00, 0x00, 0x00, 0x00]);
        acm.poll().unwrap();
        assert_eq!(
            acm.bus.register(Register::DEVICEADDR),
            (0x35 << DEVICEADDR::USBADR_SHIFT) | DEVICEADDR::USBADRA
        );
        // Still unconfigured after addressing.
        assert!(!acm.configured());
    }

    #[test]
    fn set_configuration_brings_up_data_endpoints() {
        let mut acm = driver();
        configure(&mut acm);
        assert_eq!(
            acm.bus.primes(),
            &[
                BULK_OUT_PRIME,
                BULK_IN_PRIME,
                INTERRUPT_IN_PRIME,
                CTRL_IN_PRIME
            ]
        );
        // The OUT ring is primed for one full packet.
        assert!(acm.endpoints.bulk_out.transfer_active());
        assert_eq!(acm.endpoints.bulk_out.bytes_remaining(), 64);
    }

    #[test]
    fn set_configuration_twice_does_not_reprime() {
        let mut acm = driver();
        configure(&mut acm);
        let primes = acm.bus.primes().len();
        inject_setup(&mut acm, [0x00, 0x09, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00]);
        acm.poll().unwrap();
        // Only the status-stage acknowledgment was primed.
        assert_eq!(acm.bus.primes().len(), primes + 1);
        assert_eq!(*acm.bus.primes().last().unwrap(), CTRL_IN_PRIME);
    }

    #[test]
    fn unknown_configuration_stalls_endpoint_zero() {
        let mut acm = driver();
        inject_setup(&mut acm, [0x00, 0x09, 0x02, 0x00, 0x00, 0x00, 0x00, 0x00]);
        acm.poll().unwrap();
        let ctrl0 = acm.bus.register(Register::ENDPTCTRL(0));
        assert_ne!(ctrl0 & ENDPTCTRL::RXS, 0);
        assert_ne!(ctrl0 & ENDPTCTRL::TXS, 0);
        assert!(acm.bus.primes().is_empty());
    }

    #[test]
    fn set_line_coding_receives_seven_bytes() {
        let mut acm = driver();
        inject_setup(&mut acm, [0x21, 0x20, 0x00, 0x00, 0x00, 0x00, 0x07, 0x00]);
        acm.poll().unwrap();
        assert_eq!(acm.bus.primes(), &[CTRL_OUT_PRIME, CTRL_IN_PRIME]);
        assert_eq!(acm.endpoints.ctrl_out.bytes_remaining(), 7);
    }

    #[test]
    fn line_coding_round_trip() {
        let mut acm = driver();
        configure(&mut acm);

        // SET_LINE_CODING points the OUT data stage at the coding block.
        inject_setup(&mut acm, [0x21, 0x20, 0x00, 0x00, 0x00, 0x00, 0x07, 0x00]);
        acm.poll().unwrap();

        // 115200 baud, one stop bit, no parity, eight data bits lands in
        // the block and the transfer retires.
        let coding = [0x00, 0xC2, 0x01, 0x00, 0x00, 0x00, 0x08];
        unsafe {
            core::ptr::copy_nonoverlapping(coding.as_ptr(), acm.device.line_coding_ptr(), 7);
        }
        acm.endpoints.ctrl_out.td().complete(0);
        acm.poll().unwrap();

        // GET_LINE_CODING serves back exactly those bytes.
        inject_setup(&mut acm, [0xA1, 0x21, 0x00, 0x00, 0x00, 0x00, 0x07, 0x00]);
        acm.poll().unwrap();
        assert_eq!(acm.line_coding(), &coding);
        assert!(acm.endpoints.ctrl_in.transfer_active());
        assert_eq!(acm.endpoints.ctrl_in.bytes_remaining(), 7);
        assert_eq!(*acm.bus.primes().last().unwrap(), CTRL_OUT_PRIME);
    }

    #[test]
    fn transmit_drains_ring_on_completion() {
        let mut acm = driver();
        configure(&mut acm);
        assert_eq!(acm.write(b"Hi\n"), 3);

        // The zero-length prime from bring-up retires.
        acm.endpoints.bulk_in.td().complete(0);
        acm.poll().unwrap();

        assert_eq!(*acm.bus.primes().last().unwrap(), BULK_IN_PRIME);
        assert!(acm.endpoints.bulk_in.transfer_active());
        assert_eq!(acm.endpoints.bulk_in.bytes_remaining(), 3);
        // Every queued byte was handed to the DMA engine.
        assert_eq!(acm.tx.read_span().1, 0);
    }

    #[test]
    fn receive_advances_head_and_reprimes() {
        let mut acm = driver();
        configure(&mut acm);

        // The host wrote two bytes of the 64-byte transfer.
        acm.rx.poke(0, b'o');
        acm.rx.poke(1, b'k');
        acm.endpoints.bulk_out.td().complete(62);
        acm.poll().unwrap();

        assert_eq!(acm.available(), 2);
        assert_eq!(acm.peek_byte(1), Some(b'k'));
        assert_eq!(acm.read_byte(), Some(b'o'));
        assert_eq!(acm.read_byte(), Some(b'k'));

        // Reprimed from the new head, stopping short of the tail.
        assert!(acm.endpoints.bulk_out.transfer_active());
        assert_eq!(acm.rx_primed, acm.rx.capacity() - 2 - 1);
    }

    #[test]
    fn bus_reset_returns_to_default_state() {
        let mut acm = driver();
        configure(&mut acm);
        acm.write(b"pending");

        acm.bus
            .set_register(Register::USBSTS, crate::ral::USBSTS::URI);
        acm.poll().unwrap();

        assert!(!acm.configured());
        assert_eq!(acm.bus.register(Register::DEVICEADDR), 0);
        assert_eq!(acm.tx.len(), 0);
        // Data endpoints stay down until the host reconfigures.
        let primes = acm.bus.primes().len();
        acm.poll().unwrap();
        assert_eq!(acm.bus.primes().len(), primes);
    }

    #[test]
    fn write_backpressure_reports_queued_count() {
        let mut acm = driver();
        configure(&mut acm);
        let capacity = acm.tx.capacity();
        let data = std::vec![0x55u8; capacity];
        // One byte stays reserved.
        assert_eq!(acm.write(&data), capacity - 1);
        assert!(!acm.write_byte(0xAA));
    }
}

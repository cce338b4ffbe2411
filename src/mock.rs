//! Register-level controller double for host tests
//!
//! Models just enough ChipIdea behavior for the driver's handshakes to
//! complete: write-one-to-clear status registers, a self-clearing prime
//! register that raises the matching ENDPTSTAT bits, and a controller
//! reset that finishes immediately.

use crate::ral::{Register, USBCMD, USBSTS};
use crate::UsbCore;
use std::vec::Vec;

pub struct MockBus {
    registers: [u32; 0x80],
    primes: Vec<u32>,
}

impl MockBus {
    pub fn new() -> Self {
        let mut bus = MockBus {
            registers: [0; 0x80],
            primes: Vec::new(),
        };
        // A frame is always in flight, so bring-up's SOF sync passes.
        bus.set_register(Register::USBSTS, USBSTS::SRI);
        bus
    }

    pub fn register(&self, register: Register) -> u32 {
        self.registers[register.offset() / 4]
    }

    pub fn set_register(&mut self, register: Register, value: u32) {
        self.registers[register.offset() / 4] = value;
    }

    /// Every mask written to ENDPTPRIME, in order.
    pub fn primes(&self) -> &[u32] {
        &self.primes
    }
}

unsafe impl UsbCore for MockBus {
    fn read_register(&mut self, register: Register) -> u32 {
        self.register(register)
    }

    fn write_register(&mut self, register: Register, value: u32) {
        let index = register.offset() / 4;
        match register {
            Register::ENDPTPRIME => {
                self.primes.push(value);
                // Accepted instantly: the prime bit self-clears and the
                // endpoint shows up in ENDPTSTAT.
                self.registers[Register::ENDPTSTAT.offset() / 4] |= value;
            }
            Register::USBSTS | Register::ENDPTSETUPSTAT | Register::ENDPTCOMPLETE => {
                self.registers[index] &= !value;
            }
            Register::ENDPTFLUSH => {
                self.registers[Register::ENDPTSTAT.offset() / 4] &= !value;
            }
            Register::USBCMD => {
                // Controller reset completes immediately.
                self.registers[index] = value & !USBCMD::RST;
            }
            _ => self.registers[index] = value,
        }
    }

    fn flush_dcache(&mut self) {}

    fn clear_interrupt(&mut self) {}
}

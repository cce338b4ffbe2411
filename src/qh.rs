//! Endpoint Queue Head (QH)

#![allow(non_snake_case, non_upper_case_globals)]

use crate::ral;
use crate::{td::Td, vcell::VCell};

/// One queue head per endpoint direction.
///
/// The hardware reads the capability word and the transfer overlay, and
/// captures control setup packets into the two setup words. The record
/// must not move after ENDPOINTLISTADDR is programmed.
#[repr(C, align(64))]
pub struct Qh {
    CAPABILITIES: VCell<u32>,
    // Hardware-maintained; firmware never writes it.
    _current_td_pointer: u32,
    overlay: Td,
    SETUP: [VCell<u32>; 2],
}

impl Qh {
    /// Create a new QH, setting all bits to zero
    pub const fn new() -> Self {
        Qh {
            CAPABILITIES: VCell::new(0),
            _current_td_pointer: 0,
            overlay: Td::new(),
            SETUP: [VCell::new(0), VCell::new(0)],
        }
    }

    /// Read the two words captured in the setup buffer
    ///
    /// Caller is responsible for managing the setup tripwire so that the
    /// two loads observe a consistent packet.
    #[inline(always)]
    pub fn setup(&self) -> (u32, u32) {
        (self.SETUP[0].read(), self.SETUP[1].read())
    }

    #[cfg(test)]
    pub(crate) fn set_setup(&self, word0: u32, word1: u32) {
        self.SETUP[0].write(word0);
        self.SETUP[1].write(word1);
    }

    /// Returns the transfer overlay the hardware executes from
    pub fn overlay(&self) -> &Td {
        &self.overlay
    }

    /// Sets the maximum packet length
    ///
    /// Clamps `max_packet_len` to 1024.
    pub fn set_max_packet_len(&self, max_packet_len: usize) {
        ral::modify_reg!(crate::qh, self, CAPABILITIES, MAXIMUM_PACKET_LENGTH: max_packet_len.min(1024) as u32);
    }

    /// Returns the maximum packet length
    pub fn max_packet_len(&self) -> usize {
        ral::read_reg!(crate::qh, self, CAPABILITIES, MAXIMUM_PACKET_LENGTH) as usize
    }
}

mod CAPABILITIES {
    pub mod MAXIMUM_PACKET_LENGTH {
        pub const offset: u32 = 16;
        pub const mask: u32 = 0x7FF << offset;
        pub mod RW {}
        pub mod R {}
        pub mod W {}
    }
}

const _: [(); 1] = [(); (core::mem::size_of::<Qh>() == 64) as usize];

#[cfg(test)]
mod test {
    use super::Qh;

    #[test]
    fn max_packet_len() {
        let qh = Qh::new();
        qh.set_max_packet_len(0x333);
        assert_eq!(qh.max_packet_len(), 0x333);
        assert_eq!(qh.CAPABILITIES.read(), 0x333 << 16);
    }

    #[test]
    fn max_packet_len_clamped() {
        let qh = Qh::new();
        qh.set_max_packet_len(0x800);
        assert_eq!(qh.max_packet_len(), 1024);
    }

    #[test]
    fn overlay_follows_capability_words() {
        // The hardware expects the transfer overlay right after the
        // capability word and the current-dTD pointer.
        let qh = Qh::new();
        let base = &qh as *const Qh as usize;
        let overlay = qh.overlay() as *const _ as usize;
        assert_eq!(overlay - base, 8);
    }

    #[test]
    fn setup_words() {
        let qh = Qh::new();
        qh.set_setup(0xDEAD_BEEF, 0x5555_AAAA);
        assert_eq!(qh.setup(), (0xDEAD_BEEF, 0x5555_AAAA));
    }
}

//! Control request dispatch
//!
//! [`Device`] holds the device-level state machine: the selected
//! configuration and the CDC line state. [`Device::handle`] maps a
//! decoded SETUP packet to a [`Reply`] without touching hardware; the
//! driver turns the reply into endpoint primes. Keeping the dispatch
//! pure lets every request/response pair run as a host test.

use crate::descriptors::{self, descriptor_type};
use crate::setup::{class_request, descriptor_request, standard_request, RequestKind, SetupPacket};

/// What the control endpoint should do in response to a SETUP packet.
#[derive(Debug, PartialEq, Eq)]
pub enum Reply<'a> {
    /// Send `.0` on the IN half, then expect a zero-length status OUT.
    In(&'a [u8]),
    /// Receive a line coding block on the OUT half, then send a
    /// zero-length status IN.
    ReadLineCoding,
    /// No data stage; send a zero-length status IN.
    Ack,
    /// Latch the new device address, then acknowledge.
    SetAddress(u8),
    /// Select configuration `.0` (zero deconfigures), then acknowledge.
    Configure(u8),
    /// Protocol stall on both halves of the control endpoint.
    Stall,
}

pub struct Device {
    configuration: u8,
    /// Last interface index the host selected; echoed, never validated.
    interface: u8,
    control_line_state: u16,
    /// CDC line coding block, DMA target for SET_LINE_CODING.
    line_coding: &'static mut [u8; 7],
    /// Staging for one- and two-byte standard replies.
    scratch: &'static mut [u8; 2],
}

impl Device {
    pub fn new(line_coding: &'static mut [u8; 7], scratch: &'static mut [u8; 2]) -> Self {
        *line_coding = descriptors::LINE_CODING_DEFAULT;
        Device {
            configuration: 0,
            interface: 0,
            control_line_state: 0,
            line_coding,
            scratch,
        }
    }

    /// Return to the default (unconfigured, unaddressed) state.
    ///
    /// The line coding survives a bus reset; hosts re-negotiate it when
    /// they care.
    pub fn reset(&mut self) {
        self.configuration = 0;
        self.interface = 0;
        self.control_line_state = 0;
    }

    pub fn configuration(&self) -> u8 {
        self.configuration
    }

    pub fn set_configuration(&mut self, configuration: u8) {
        self.configuration = configuration;
    }

    pub fn configured(&self) -> bool {
        self.configuration != 0
    }

    /// DTR asserted by the host's most recent SET_CONTROL_LINE_STATE.
    pub fn dtr(&self) -> bool {
        self.control_line_state & 0x1 != 0
    }

    pub fn line_coding(&self) -> &[u8; 7] {
        self.line_coding
    }

    /// Address of the line coding block, for priming the data stage of
    /// SET_LINE_CODING.
    pub fn line_coding_ptr(&mut self) -> *mut u8 {
        self.line_coding.as_mut_ptr()
    }

    pub fn handle(&mut self, setup: &SetupPacket) -> Reply<'_> {
        match setup.kind() {
            RequestKind::Standard => self.handle_standard(setup),
            RequestKind::Class => self.handle_class(setup),
            // No vendor requests are defined for this device.
            RequestKind::Vendor | RequestKind::Reserved => Reply::Stall,
        }
    }

    fn handle_standard(&mut self, setup: &SetupPacket) -> Reply<'_> {
        match setup.request {
            standard_request::GET_STATUS => {
                Reply::In(clamp(&descriptors::DEVICE_STATUS, setup.length))
            }
            // No features (remote wakeup, test mode, endpoint halt) are
            // implemented, so CLEAR_FEATURE and SET_FEATURE fall through
            // to the stall arm.
            standard_request::SET_ADDRESS => Reply::SetAddress((setup.value & 0x7F) as u8),
            standard_request::GET_DESCRIPTOR => self.descriptor(setup),
            standard_request::GET_CONFIGURATION => {
                self.scratch[0] = self.configuration;
                Reply::In(clamp(&self.scratch[..1], setup.length))
            }
            standard_request::SET_CONFIGURATION => match setup.value {
                0 | 1 => Reply::Configure(setup.value as u8),
                _ => Reply::Stall,
            },
            standard_request::GET_INTERFACE => {
                self.scratch[0] = self.interface;
                Reply::In(clamp(&self.scratch[..1], setup.length))
            }
            standard_request::SET_INTERFACE => {
                // Neither interface has alternate settings; just remember
                // the index and echo it back on GET_INTERFACE.
                self.interface = setup.index as u8;
                Reply::Ack
            }
            _ => Reply::Stall,
        }
    }

    fn descriptor(&self, setup: &SetupPacket) -> Reply<'_> {
        let (kind, index) = descriptor_request(setup.value);
        let table: &[u8] = match kind {
            descriptor_type::DEVICE => &descriptors::DEVICE,
            descriptor_type::CONFIGURATION => &descriptors::CONFIGURATION,
            descriptor_type::DEVICE_QUALIFIER => &descriptors::DEVICE_QUALIFIER,
            descriptor_type::STRING => match descriptors::STRINGS.get(index as usize) {
                Some(string) => string,
                None => return Reply::Stall,
            },
            _ => return Reply::Stall,
        };
        Reply::In(clamp(table, setup.length))
    }

    fn handle_class(&mut self, setup: &SetupPacket) -> Reply<'_> {
        match setup.request {
            class_request::SET_LINE_CODING => {
                if setup.is_device_to_host() {
                    return Reply::Stall;
                }
                Reply::ReadLineCoding
            }
            class_request::GET_LINE_CODING => {
                Reply::In(clamp(&self.line_coding[..], setup.length))
            }
            class_request::SET_CONTROL_LINE_STATE => {
                self.control_line_state = setup.value;
                Reply::Ack
            }
            class_request::SEND_BREAK => Reply::Ack,
            _ => Reply::Stall,
        }
    }
}

/// Trim a reply's data stage to the host's wLength.
fn clamp(data: &[u8], length: u16) -> &[u8] {
    &data[..data.len().min(length as usize)]
}

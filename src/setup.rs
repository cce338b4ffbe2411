//! Control setup packet decoding

/// Standard request codes, USB 2.0 table 9-4.
pub mod standard_request {
    pub const GET_STATUS: u8 = 0x00;
    pub const SET_ADDRESS: u8 = 0x05;
    pub const GET_DESCRIPTOR: u8 = 0x06;
    pub const GET_CONFIGURATION: u8 = 0x08;
    pub const SET_CONFIGURATION: u8 = 0x09;
    pub const GET_INTERFACE: u8 = 0x0A;
    pub const SET_INTERFACE: u8 = 0x0B;
}

/// CDC PSTN request codes, CDC 1.1 table 46.
pub mod class_request {
    pub const SET_LINE_CODING: u8 = 0x20;
    pub const GET_LINE_CODING: u8 = 0x21;
    pub const SET_CONTROL_LINE_STATE: u8 = 0x22;
    pub const SEND_BREAK: u8 = 0x23;
}

/// Split a GET_DESCRIPTOR wValue into (descriptor type, index).
pub fn descriptor_request(value: u16) -> (u8, u8) {
    ((value >> 8) as u8, value as u8)
}

/// The request's type field, bmRequestType bits 6..5.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestKind {
    Standard,
    Class,
    Vendor,
    Reserved,
}

/// An eight-byte SETUP packet, decoded from the two words the controller
/// captures in the control queue head.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SetupPacket {
    pub request_type: u8,
    pub request: u8,
    pub value: u16,
    pub index: u16,
    pub length: u16,
}

impl SetupPacket {
    /// Decode the setup buffer words, which hold the packet in bus order.
    pub fn from_words(word0: u32, word1: u32) -> Self {
        SetupPacket {
            request_type: word0 as u8,
            request: (word0 >> 8) as u8,
            value: (word0 >> 16) as u16,
            index: word1 as u16,
            length: (word1 >> 16) as u16,
        }
    }

    pub fn kind(&self) -> RequestKind {
        match (self.request_type >> 5) & 0x3 {
            0 => RequestKind::Standard,
            1 => RequestKind::Class,
            2 => RequestKind::Vendor,
            _ => RequestKind::Reserved,
        }
    }

    /// True when the data stage (if any) moves device-to-host.
    pub fn is_device_to_host(&self) -> bool {
        self.request_type & 0x80 != 0
    }
}

#[cfg(test)]
mod test {
    use super::{RequestKind, SetupPacket};

    #[test]
    fn get_descriptor_device() {
        // 80 06 00 01 00 00 40 00: GET_DESCRIPTOR(Device), wLength 64.
        let setup = SetupPacket::from_words(0x0100_0680, 0x0040_0000);
        assert_eq!(setup.request_type, 0x80);
        assert_eq!(setup.request, 0x06);
        assert_eq!(setup.value, 0x0100);
        assert_eq!(setup.index, 0x0000);
        assert_eq!(setup.length, 64);
        assert_eq!(setup.kind(), RequestKind::Standard);
        assert!(setup.is_device_to_host());
    }

    #[test]
    fn set_line_coding() {
        // 21 20 00 00 00 00 07 00
        let setup = SetupPacket::from_words(0x0000_2021, 0x0007_0000);
        assert_eq!(setup.kind(), RequestKind::Class);
        assert!(!setup.is_device_to_host());
        assert_eq!(setup.request, super::class_request::SET_LINE_CODING);
        assert_eq!(setup.length, 7);
    }

    #[test]
    fn vendor_kind() {
        let setup = SetupPacket::from_words(0x0000_01C0, 0);
        assert_eq!(setup.kind(), RequestKind::Vendor);
    }
}

//! Static USB descriptor tables
//!
//! Byte tables served verbatim during enumeration, per USB 2.0 and
//! CDC 1.1. The tables live in `static`s so the control endpoint can DMA
//! straight out of them; the dispatcher clamps every response to
//! `min(wLength, table.len())`.

/// Descriptor types, USB 2.0 table 9-5.
pub mod descriptor_type {
    pub const DEVICE: u8 = 0x01;
    pub const CONFIGURATION: u8 = 0x02;
    pub const STRING: u8 = 0x03;
    pub const INTERFACE: u8 = 0x04;
    pub const ENDPOINT: u8 = 0x05;
    pub const DEVICE_QUALIFIER: u8 = 0x06;
    /// Class-specific interface (CDC functional descriptors)
    pub const CS_INTERFACE: u8 = 0x24;
}

pub const MAX_PACKET_SIZE: usize = 64;
pub const MAX_PACKET_EP0: usize = 64;
pub const INTERRUPT_MAX_PACKET: usize = 8;

/// GET_STATUS response: self-powered, no remote wakeup.
pub static DEVICE_STATUS: [u8; 2] = [0x01, 0x00];

/// Line coding at reset: 9600 baud, one stop bit, no parity, 8 data bits.
pub const LINE_CODING_DEFAULT: [u8; 7] = [0x80, 0x25, 0x00, 0x00, 0x00, 0x00, 0x08];

pub static DEVICE: [u8; 18] = [
    0x12,        // bLength
    descriptor_type::DEVICE, // bDescriptorType
    0x00, 0x02,  // bcdUSB == 2.00
    0x02,        // bDeviceClass == Communication Device Class
    0x00,        // bDeviceSubClass
    0x00,        // bDeviceProtocol
    0x40,        // bMaxPacketSize0
    0x08, 0x21,  // idVendor == 0x2108
    0x0B, 0x78,  // idProduct == 0x780B
    0x00, 0x01,  // bcdDevice == 1.00
    0x01,        // iManufacturer
    0x02,        // iProduct
    0x03,        // iSerialNumber
    0x01,        // bNumConfigurations
];

/// One configuration: a Communication-Class control interface with the
/// CDC ACM functional descriptors and an interrupt-IN notification
/// endpoint, plus a Data-Class interface with the bulk pair.
pub static CONFIGURATION: [u8; 67] = [
    // Configuration
    0x09,        // bLength
    descriptor_type::CONFIGURATION, // bDescriptorType
    0x43, 0x00,  // wTotalLength == 67
    0x02,        // bNumInterfaces
    0x01,        // bConfigurationValue
    0x00,        // iConfiguration
    0xC0,        // bmAttributes == self-powered
    0x00,        // bMaxPower == 0 mA
    // Communication Class interface
    0x09,        // bLength
    descriptor_type::INTERFACE, // bDescriptorType
    0x00,        // bInterfaceNumber
    0x00,        // bAlternateSetting
    0x01,        // bNumEndpoints
    0x02,        // bInterfaceClass == Communication Interface Class
    0x02,        // bInterfaceSubClass == Abstract Control Model
    0x00,        // bInterfaceProtocol
    0x00,        // iInterface
    // Header functional descriptor
    0x05,        // bLength
    descriptor_type::CS_INTERFACE, // bDescriptorType
    0x00,        // bDescriptorSubType == Header
    0x10, 0x01,  // bcdCDC == 1.10
    // Call management functional descriptor
    0x05,        // bLength
    descriptor_type::CS_INTERFACE, // bDescriptorType
    0x01,        // bDescriptorSubType == Call Management
    0x00,        // bmCapabilities
    0x01,        // bDataInterface
    // Abstract control management functional descriptor
    0x04,        // bLength
    descriptor_type::CS_INTERFACE, // bDescriptorType
    0x02,        // bDescriptorSubType == ACM
    0x00,        // bmCapabilities
    // Union functional descriptor
    0x05,        // bLength
    descriptor_type::CS_INTERFACE, // bDescriptorType
    0x06,        // bDescriptorSubType == Union
    0x00,        // bMasterInterface
    0x01,        // bSlaveInterface0
    // Notification endpoint, interrupt IN
    0x07,        // bLength
    descriptor_type::ENDPOINT, // bDescriptorType
    0x83,        // bEndpointAddress == IN 3
    0x03,        // bmAttributes == Interrupt
    0x08, 0x00,  // wMaxPacketSize == 8
    0x01,        // bInterval
    // Data Class interface
    0x09,        // bLength
    descriptor_type::INTERFACE, // bDescriptorType
    0x01,        // bInterfaceNumber
    0x00,        // bAlternateSetting
    0x02,        // bNumEndpoints
    0x0A,        // bInterfaceClass == CDC Data
    0x00,        // bInterfaceSubClass
    0x00,        // bInterfaceProtocol
    0x00,        // iInterface
    // Bulk OUT
    0x07,        // bLength
    descriptor_type::ENDPOINT, // bDescriptorType
    0x01,        // bEndpointAddress == OUT 1
    0x02,        // bmAttributes == Bulk
    0x40, 0x00,  // wMaxPacketSize == 64
    0x01,        // bInterval, ignored for bulk
    // Bulk IN
    0x07,        // bLength
    descriptor_type::ENDPOINT, // bDescriptorType
    0x82,        // bEndpointAddress == IN 2
    0x02,        // bmAttributes == Bulk
    0x40, 0x00,  // wMaxPacketSize == 64
    0x01,        // bInterval, ignored for bulk
];

pub static DEVICE_QUALIFIER: [u8; 10] = [
    0x0A,        // bLength
    descriptor_type::DEVICE_QUALIFIER, // bDescriptorType
    0x00, 0x02,  // bcdUSB
    0x00,        // bDeviceClass
    0x00,        // bDeviceSubClass
    0x00,        // bDeviceProtocol
    0x40,        // bMaxPacketSize0
    0x01,        // bNumConfigurations
    0x00,        // bReserved
];

static STRING_LANGUAGE_ID: [u8; 4] = [
    0x04,        // bLength
    descriptor_type::STRING, // bDescriptorType
    0x09, 0x04,  // wLANGID0 == English (United States)
];

static STRING_MANUFACTURER: [u8; 10] = [
    0x0A, descriptor_type::STRING,
    b'A', 0x00, b'n', 0x00, b'k', 0x00, b'i', 0x00,
];

static STRING_PRODUCT: [u8; 12] = [
    0x0C, descriptor_type::STRING,
    b'C', 0x00, b'o', 0x00, b'z', 0x00, b'm', 0x00, b'o', 0x00,
];

static STRING_SERIAL_NUMBER: [u8; 16] = [
    0x10, descriptor_type::STRING,
    b'A', 0x00, b'B', 0x00, b'C', 0x00, b'D', 0x00, b'E', 0x00, b'F', 0x00, b'0', 0x00,
];

pub static STRINGS: [&[u8]; 4] = [
    &STRING_LANGUAGE_ID,
    &STRING_MANUFACTURER,
    &STRING_PRODUCT,
    &STRING_SERIAL_NUMBER,
];

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn declared_lengths_match() {
        assert_eq!(DEVICE[0] as usize, DEVICE.len());
        assert_eq!(DEVICE_QUALIFIER[0] as usize, DEVICE_QUALIFIER.len());
        for string in STRINGS.iter() {
            assert_eq!(string[0] as usize, string.len());
        }
    }

    #[test]
    fn configuration_total_length_matches() {
        let total = u16::from_le_bytes([CONFIGURATION[2], CONFIGURATION[3]]);
        assert_eq!(total as usize, CONFIGURATION.len());
    }

    #[test]
    fn configuration_sub_descriptor_lengths_sum() {
        let mut offset = 0;
        while offset < CONFIGURATION.len() {
            offset += CONFIGURATION[offset] as usize;
        }
        assert_eq!(offset, CONFIGURATION.len());
    }

    #[test]
    fn endpoint_addresses() {
        // Interrupt IN 0x83, bulk OUT 0x01, bulk IN 0x82.
        let mut addresses = std::vec::Vec::new();
        let mut offset = 0;
        while offset < CONFIGURATION.len() {
            if CONFIGURATION[offset + 1] == descriptor_type::ENDPOINT {
                addresses.push(CONFIGURATION[offset + 2]);
            }
            offset += CONFIGURATION[offset] as usize;
        }
        assert_eq!(addresses, [0x83, 0x01, 0x82]);
    }
}

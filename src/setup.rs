//! Control transfer setup packets

use usb_device::UsbDirection;

/// Size of a setup packet, in bytes
pub const SETUP_PACKET_SIZE: usize = 8;

/// A setup packet, as received on the control OUT endpoint
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct SetupPacket {
    pub request_type: u8,
    pub request: u8,
    pub value: u16,
    pub index: u16,
    pub length: u16,
}

impl SetupPacket {
    /// Parse the little-endian wire format
    pub const fn from_bytes(raw: [u8; SETUP_PACKET_SIZE]) -> Self {
        SetupPacket {
            request_type: raw[0],
            request: raw[1],
            value: u16::from_le_bytes([raw[2], raw[3]]),
            index: u16::from_le_bytes([raw[4], raw[5]]),
            length: u16::from_le_bytes([raw[6], raw[7]]),
        }
    }

    pub const fn to_bytes(&self) -> [u8; SETUP_PACKET_SIZE] {
        let value = self.value.to_le_bytes();
        let index = self.index.to_le_bytes();
        let length = self.length.to_le_bytes();
        [
            self.request_type,
            self.request,
            value[0],
            value[1],
            index[0],
            index[1],
            length[0],
            length[1],
        ]
    }

    /// Direction of the data stage, taken from bit 7 of `bmRequestType`
    pub fn direction(&self) -> UsbDirection {
        if self.request_type & 0x80 != 0 {
            UsbDirection::In
        } else {
            UsbDirection::Out
        }
    }

    /// Number of bytes in the data stage
    pub fn data_length(&self) -> usize {
        self.length as usize
    }
}

impl From<[u8; SETUP_PACKET_SIZE]> for SetupPacket {
    fn from(raw: [u8; SETUP_PACKET_SIZE]) -> Self {
        Self::from_bytes(raw)
    }
}

#[cfg(test)]
mod test {
    use super::SetupPacket;
    use usb_device::UsbDirection;

    #[test]
    fn get_descriptor() {
        let setup = SetupPacket::from_bytes([0x80, 0x06, 0x00, 0x01, 0x00, 0x00, 0x12, 0x00]);
        assert_eq!(setup.direction(), UsbDirection::In);
        assert_eq!(setup.request, 6);
        assert_eq!(setup.value, 0x0100);
        assert_eq!(setup.data_length(), 18);
    }

    #[test]
    fn set_address() {
        let raw = [0x00, 0x05, 0x2A, 0x00, 0x00, 0x00, 0x00, 0x00];
        let setup = SetupPacket::from(raw);
        assert_eq!(setup.direction(), UsbDirection::Out);
        assert_eq!(setup.value, 42);
        assert_eq!(setup.data_length(), 0);
        assert_eq!(setup.to_bytes(), raw);
    }
}

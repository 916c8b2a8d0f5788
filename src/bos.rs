//! Binary Object Store descriptors.
//!
//! A BOS descriptor is a header followed by `bNumDeviceCaps` device capability descriptors. Each
//! capability starts with `bLength`, `bDescriptorType` (0x10) and `bDevCapabilityType`.

use crate::{
    constants::{bos_type, descriptor_type, supported_speed, BM_LPM_SUPPORT, BM_LTM_SUPPORT},
    fields::Speed,
    Error, ErrorKind, Result,
};

const BOS_HEADER_SIZE: usize = 5;
const CAPABILITY_HEADER_SIZE: usize = 3;
const USB_2_0_EXTENSION_SIZE: usize = 7;
const SS_USB_DEVICE_CAPABILITY_SIZE: usize = 10;
const CONTAINER_ID_SIZE: usize = 20;

/// A device's Binary Object Store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bos {
    length: u8,
    descriptor_type: u8,
    total_length: u16,
    capabilities: Vec<DeviceCapability>,
}

impl Bos {
    /// Parses a BOS descriptor from its wire format.
    ///
    /// Trailing capabilities that don't fit into `bytes` are an error, not silently dropped.
    pub fn parse(bytes: &[u8]) -> Result<Bos> {
        if bytes.len() < BOS_HEADER_SIZE || bytes[1] != descriptor_type::BOS {
            return Err(Error::new(ErrorKind::Io).with_detail("malformed BOS descriptor"));
        }

        let length = bytes[0];
        let total_length = u16::from_le_bytes([bytes[2], bytes[3]]);
        let count = bytes[4];

        let mut capabilities = Vec::with_capacity(count as usize);
        let mut offset = usize::from(length).max(BOS_HEADER_SIZE);
        for _ in 0..count {
            let cap_length = *bytes.get(offset).ok_or_else(truncated)? as usize;
            if cap_length < CAPABILITY_HEADER_SIZE {
                return Err(truncated());
            }
            let raw = bytes.get(offset..offset + cap_length).ok_or_else(truncated)?;
            capabilities.push(DeviceCapability::parse(raw));
            offset += cap_length;
        }

        Ok(Bos {
            length,
            descriptor_type: bytes[1],
            total_length,
            capabilities,
        })
    }

    pub fn length(&self) -> u8 {
        self.length
    }

    pub fn descriptor_type(&self) -> u8 {
        self.descriptor_type
    }

    /// Length of the header and all capabilities in bytes.
    pub fn total_length(&self) -> u16 {
        self.total_length
    }

    pub fn num_device_caps(&self) -> u8 {
        self.capabilities.len() as u8
    }

    pub fn capabilities(&self) -> &[DeviceCapability] {
        &self.capabilities
    }

    pub fn capability_types(&self) -> Vec<CapabilityType> {
        self.capabilities.iter().map(DeviceCapability::capability_type).collect()
    }
}

fn truncated() -> Error {
    Error::new(ErrorKind::Io).with_detail("truncated BOS device capability")
}

/// Kinds of device capabilities.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum CapabilityType {
    WirelessUsbDevice,
    Usb20Extension,
    SsUsbDevice,
    ContainerId,
    Unknown(u8),
}

impl From<u8> for CapabilityType {
    fn from(raw: u8) -> Self {
        match raw {
            bos_type::WIRELESS_USB_DEVICE_CAPABILITY => CapabilityType::WirelessUsbDevice,
            bos_type::USB_2_0_EXTENSION => CapabilityType::Usb20Extension,
            bos_type::SS_USB_DEVICE_CAPABILITY => CapabilityType::SsUsbDevice,
            bos_type::CONTAINER_ID => CapabilityType::ContainerId,
            other => CapabilityType::Unknown(other),
        }
    }
}

/// A device capability of a BOS descriptor.
///
/// Capabilities without a dedicated layout, or too short for theirs, are kept as [`Generic`].
///
/// [`Generic`]: DeviceCapability::Generic
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeviceCapability {
    Usb20Extension(Usb20Extension),
    SsUsbDevice(SsUsbDeviceCapability),
    ContainerId(ContainerId),
    Generic(GenericCapability),
}

impl DeviceCapability {
    fn parse(raw: &[u8]) -> DeviceCapability {
        match (raw[2], raw.len()) {
            (bos_type::USB_2_0_EXTENSION, n) if n >= USB_2_0_EXTENSION_SIZE => {
                DeviceCapability::Usb20Extension(Usb20Extension {
                    attributes: u32::from_le_bytes([raw[3], raw[4], raw[5], raw[6]]),
                })
            }
            (bos_type::SS_USB_DEVICE_CAPABILITY, n) if n >= SS_USB_DEVICE_CAPABILITY_SIZE => {
                DeviceCapability::SsUsbDevice(SsUsbDeviceCapability {
                    attributes: raw[3],
                    speed_supported: u16::from_le_bytes([raw[4], raw[5]]),
                    functionality_support: raw[6],
                    u1_dev_exit_lat: raw[7],
                    u2_dev_exit_lat: u16::from_le_bytes([raw[8], raw[9]]),
                })
            }
            (bos_type::CONTAINER_ID, n) if n >= CONTAINER_ID_SIZE => {
                let mut container_id = [0; 16];
                container_id.copy_from_slice(&raw[4..20]);
                DeviceCapability::ContainerId(ContainerId {
                    reserved: raw[3],
                    container_id,
                })
            }
            _ => DeviceCapability::Generic(GenericCapability {
                capability_type: raw[2],
                data: raw[CAPABILITY_HEADER_SIZE..].to_vec(),
            }),
        }
    }

    pub fn capability_type(&self) -> CapabilityType {
        match self {
            DeviceCapability::Usb20Extension(_) => CapabilityType::Usb20Extension,
            DeviceCapability::SsUsbDevice(_) => CapabilityType::SsUsbDevice,
            DeviceCapability::ContainerId(_) => CapabilityType::ContainerId,
            DeviceCapability::Generic(cap) => CapabilityType::from(cap.capability_type),
        }
    }
}

/// USB 2.0 extension capability.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Usb20Extension {
    attributes: u32,
}

impl Usb20Extension {
    pub fn attributes(&self) -> u32 {
        self.attributes
    }

    /// Indicates support for the Link Power Management protocol.
    pub fn lpm_support(&self) -> bool {
        self.attributes & BM_LPM_SUPPORT != 0
    }
}

/// SuperSpeed USB device capability.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SsUsbDeviceCapability {
    attributes: u8,
    speed_supported: u16,
    functionality_support: u8,
    u1_dev_exit_lat: u8,
    u2_dev_exit_lat: u16,
}

impl SsUsbDeviceCapability {
    pub fn attributes(&self) -> u8 {
        self.attributes
    }

    /// Indicates that the device generates Latency Tolerance Messages.
    pub fn ltm_support(&self) -> bool {
        self.attributes & BM_LTM_SUPPORT != 0
    }

    /// Returns the raw `wSpeedSupported` bitmap.
    pub fn speed_supported(&self) -> u16 {
        self.speed_supported
    }

    /// Speeds at which the device operates when in SuperSpeed mode.
    pub fn supported_speeds(&self) -> Vec<Speed> {
        [
            (supported_speed::LOW_SPEED_OPERATION, Speed::Low),
            (supported_speed::FULL_SPEED_OPERATION, Speed::Full),
            (supported_speed::HIGH_SPEED_OPERATION, Speed::High),
            (supported_speed::SUPER_SPEED_OPERATION, Speed::Super),
        ]
        .into_iter()
        .filter(|(bit, _)| self.speed_supported & bit != 0)
        .map(|(_, speed)| speed)
        .collect()
    }

    /// Lowest speed at which all functionality is available: 0 low, 1 full, 2 high, 3 super.
    pub fn functionality_support(&self) -> u8 {
        self.functionality_support
    }

    /// U1 device exit latency in microseconds.
    pub fn u1_dev_exit_lat(&self) -> u8 {
        self.u1_dev_exit_lat
    }

    /// U2 device exit latency in microseconds.
    pub fn u2_dev_exit_lat(&self) -> u16 {
        self.u2_dev_exit_lat
    }
}

/// Container ID capability, a UUID shared by all functions of one physical device.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ContainerId {
    reserved: u8,
    container_id: [u8; 16],
}

impl ContainerId {
    pub fn reserved(&self) -> u8 {
        self.reserved
    }

    pub fn container_id(&self) -> [u8; 16] {
        self.container_id
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GenericCapability {
    capability_type: u8,
    data: Vec<u8>,
}

impl GenericCapability {
    pub fn capability_type(&self) -> u8 {
        self.capability_type
    }

    /// Capability-specific bytes following the three header bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn bos(caps: &[&[u8]]) -> Vec<u8> {
        let total: usize = BOS_HEADER_SIZE + caps.iter().map(|c| c.len()).sum::<usize>();
        let mut bytes = vec![5, 0x0F];
        bytes.extend_from_slice(&(total as u16).to_le_bytes());
        bytes.push(caps.len() as u8);
        for cap in caps {
            bytes.extend_from_slice(cap);
        }
        bytes
    }

    const USB2_EXT: &[u8] = &[7, 0x10, 0x02, 0x06, 0x00, 0x00, 0x00];
    const SS_CAP: &[u8] = &[10, 0x10, 0x03, 0x02, 0x0E, 0x00, 0x01, 0x0A, 0xFF, 0x07];

    #[test]
    fn it_has_header_fields() {
        let b = Bos::parse(&bos(&[USB2_EXT, SS_CAP])).unwrap();
        assert_eq!(5, b.length());
        assert_eq!(0x0F, b.descriptor_type());
        assert_eq!(22, b.total_length());
        assert_eq!(2, b.num_device_caps());
    }

    #[test]
    fn it_decodes_usb_2_0_extension() {
        let b = Bos::parse(&bos(&[USB2_EXT])).unwrap();
        match &b.capabilities()[0] {
            DeviceCapability::Usb20Extension(ext) => {
                assert_eq!(6, ext.attributes());
                assert!(ext.lpm_support());
            }
            other => panic!("unexpected capability {:?}", other),
        }
    }

    #[test]
    fn it_interprets_lpm_bit() {
        let b = Bos::parse(&bos(&[&[7, 0x10, 0x02, 0x04, 0, 0, 0]])).unwrap();
        match &b.capabilities()[0] {
            DeviceCapability::Usb20Extension(ext) => assert!(!ext.lpm_support()),
            other => panic!("unexpected capability {:?}", other),
        }
    }

    #[test]
    fn it_decodes_superspeed_capability() {
        let b = Bos::parse(&bos(&[SS_CAP])).unwrap();
        match &b.capabilities()[0] {
            DeviceCapability::SsUsbDevice(ss) => {
                assert!(ss.ltm_support());
                assert_eq!(vec![Speed::Full, Speed::High, Speed::Super], ss.supported_speeds());
                assert_eq!(1, ss.functionality_support());
                assert_eq!(10, ss.u1_dev_exit_lat());
                assert_eq!(0x07FF, ss.u2_dev_exit_lat());
            }
            other => panic!("unexpected capability {:?}", other),
        }
    }

    #[test]
    fn it_decodes_container_id() {
        let mut raw = vec![20, 0x10, 0x04, 0x00];
        raw.extend(1..=16u8);
        let b = Bos::parse(&bos(&[&raw])).unwrap();
        match &b.capabilities()[0] {
            DeviceCapability::ContainerId(id) => {
                assert_eq!(0, id.reserved());
                assert_eq!(1, id.container_id()[0]);
                assert_eq!(16, id.container_id()[15]);
            }
            other => panic!("unexpected capability {:?}", other),
        }
    }

    #[test]
    fn it_keeps_unknown_capabilities_generic() {
        let b = Bos::parse(&bos(&[&[5, 0x10, 0x0A, 0xAB, 0xCD], USB2_EXT])).unwrap();
        assert_eq!(
            vec![CapabilityType::Unknown(0x0A), CapabilityType::Usb20Extension],
            b.capability_types()
        );
        match &b.capabilities()[0] {
            DeviceCapability::Generic(cap) => assert_eq!(&[0xAB, 0xCD], cap.data()),
            other => panic!("unexpected capability {:?}", other),
        }
    }

    #[test]
    fn it_keeps_short_capabilities_generic() {
        let b = Bos::parse(&bos(&[&[4, 0x10, 0x02, 0x02]])).unwrap();
        assert_eq!(
            CapabilityType::Usb20Extension,
            b.capabilities()[0].capability_type()
        );
        assert!(matches!(b.capabilities()[0], DeviceCapability::Generic(_)));
    }

    #[test]
    fn it_rejects_truncated_descriptors() {
        let mut bytes = bos(&[SS_CAP]);
        bytes.truncate(bytes.len() - 1);
        assert_eq!(ErrorKind::Io, Bos::parse(&bytes).unwrap_err().kind());
        assert_eq!(ErrorKind::Io, Bos::parse(&[5, 0x02, 5, 0, 0]).unwrap_err().kind());
    }
}

use std::slice;

use libusb1_sys::libusb_endpoint_descriptor;

use crate::{
    constants::{descriptor_type, ENDPOINT_ADDRESS_MASK},
    fields::{Direction, SyncType, TransferType, UsageType},
};

/// Describes an endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EndpointDescriptor {
    length: u8,
    address: u8,
    attributes: u8,
    max_packet_size: u16,
    interval: u8,
    refresh: u8,
    synch_address: u8,
    extra: Vec<u8>,
    pub(crate) setting: usize,
}

impl EndpointDescriptor {
    /// Builds an endpoint descriptor from its raw fields.
    pub fn new(address: u8, attributes: u8, max_packet_size: u16, interval: u8) -> Self {
        EndpointDescriptor {
            length: crate::constants::DT_ENDPOINT_SIZE as u8,
            address,
            attributes,
            max_packet_size,
            interval,
            refresh: 0,
            synch_address: 0,
            extra: Vec::new(),
            setting: 0,
        }
    }

    /// Adds the class or vendor specific descriptors following the endpoint descriptor.
    pub fn with_extra(mut self, extra: Vec<u8>) -> Self {
        self.extra = extra;
        self
    }

    /// Returns the size of the descriptor in bytes, 7 or 9 for audio endpoints.
    pub fn length(&self) -> u8 {
        self.length
    }

    /// Returns the endpoint's address.
    pub fn address(&self) -> u8 {
        self.address
    }

    /// Returns the endpoint number.
    pub fn number(&self) -> u8 {
        self.address & ENDPOINT_ADDRESS_MASK
    }

    /// Returns the endpoint's direction.
    pub fn direction(&self) -> Direction {
        Direction::from_address(self.address)
    }

    /// Returns the raw `bmAttributes` field.
    pub fn attributes(&self) -> u8 {
        self.attributes
    }

    /// Returns the endpoint's transfer type.
    pub fn transfer_type(&self) -> TransferType {
        TransferType::from_attributes(self.attributes)
    }

    /// Returns the endpoint's synchronisation mode, for isochronous endpoints only.
    pub fn sync_type(&self) -> Option<SyncType> {
        match self.transfer_type() {
            TransferType::Isochronous => Some(SyncType::from_attributes(self.attributes)),
            _ => None,
        }
    }

    /// Returns the endpoint's usage type, for isochronous endpoints only.
    pub fn usage_type(&self) -> Option<UsageType> {
        match self.transfer_type() {
            TransferType::Isochronous => Some(UsageType::from_attributes(self.attributes)),
            _ => None,
        }
    }

    /// Returns the endpoint's maximum packet size.
    pub fn max_packet_size(&self) -> u16 {
        self.max_packet_size
    }

    /// Returns the endpoint's polling interval.
    pub fn interval(&self) -> u8 {
        self.interval
    }

    /// For audio devices only: return the rate at which synchronization feedback is provided.
    pub fn refresh(&self) -> u8 {
        self.refresh
    }

    /// For audio devices only: return the address if the synch endpoint.
    pub fn synch_address(&self) -> u8 {
        self.synch_address
    }

    /// Returns the unknown 'extra' bytes that libusb does not understand.
    pub fn extra(&self) -> &[u8] {
        &self.extra
    }

    /// Returns the SuperSpeed endpoint companion found among the extra bytes, if any.
    pub fn ss_companion(&self) -> Option<SsCompanion> {
        let mut rest = &self.extra[..];

        while rest.len() >= 2 {
            let len = rest[0] as usize;
            if len < 2 || len > rest.len() {
                return None;
            }
            if rest[1] == descriptor_type::SS_ENDPOINT_COMPANION && len >= 6 {
                return Some(SsCompanion {
                    max_burst: rest[2],
                    attributes: rest[3],
                    bytes_per_interval: u16::from_le_bytes([rest[4], rest[5]]),
                });
            }
            rest = &rest[len..];
        }

        None
    }
}

/// The SuperSpeed endpoint companion descriptor of a USB 3.0 endpoint.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SsCompanion {
    max_burst: u8,
    attributes: u8,
    bytes_per_interval: u16,
}

impl SsCompanion {
    /// The maximum number of packets the endpoint can send or receive as part of a burst.
    pub fn max_burst(&self) -> u8 {
        self.max_burst
    }

    /// Maximum number of streams for bulk endpoints, `Mult` for isochronous endpoints.
    pub fn attributes(&self) -> u8 {
        self.attributes
    }

    /// Total number of bytes transferred every service interval, for periodic endpoints.
    pub fn bytes_per_interval(&self) -> u16 {
        self.bytes_per_interval
    }
}

pub(crate) fn extra_bytes(extra: *const u8, len: libc::c_int) -> Vec<u8> {
    if extra.is_null() || len <= 0 {
        return Vec::new();
    }
    unsafe { slice::from_raw_parts(extra, len as usize) }.to_vec()
}

#[doc(hidden)]
pub(crate) fn from_libusb(endpoint: &libusb_endpoint_descriptor, setting: usize) -> EndpointDescriptor {
    EndpointDescriptor {
        length: endpoint.bLength,
        address: endpoint.bEndpointAddress,
        attributes: endpoint.bmAttributes,
        max_packet_size: endpoint.wMaxPacketSize,
        interval: endpoint.bInterval,
        refresh: endpoint.bRefresh,
        synch_address: endpoint.bSynchAddress,
        extra: extra_bytes(endpoint.extra, endpoint.extra_length),
        setting,
    }
}

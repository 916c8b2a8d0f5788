//! Numeric constants of the USB specification.
//!
//! The values must match the bytes devices put on the wire, so they are spelled out here and
//! checked against the native library's definitions in the tests below.

/// Device and interface class codes.
pub mod class {
    pub const PER_INTERFACE: u8 = 0x00;
    pub const AUDIO: u8 = 0x01;
    pub const COMM: u8 = 0x02;
    pub const HID: u8 = 0x03;
    pub const PHYSICAL: u8 = 0x05;
    pub const PTP: u8 = 0x06;
    pub const IMAGE: u8 = PTP;
    pub const PRINTER: u8 = 0x07;
    pub const MASS_STORAGE: u8 = 0x08;
    pub const HUB: u8 = 0x09;
    pub const DATA: u8 = 0x0A;
    pub const SMART_CARD: u8 = 0x0B;
    pub const CONTENT_SECURITY: u8 = 0x0D;
    pub const VIDEO: u8 = 0x0E;
    pub const PERSONAL_HEALTHCARE: u8 = 0x0F;
    pub const DIAGNOSTIC_DEVICE: u8 = 0xDC;
    pub const WIRELESS: u8 = 0xE0;
    pub const MISCELLANEOUS: u8 = 0xEF;
    pub const APPLICATION: u8 = 0xFE;
    pub const VENDOR_SPEC: u8 = 0xFF;
}

/// Descriptor types (`bDescriptorType`).
pub mod descriptor_type {
    pub const DEVICE: u8 = 0x01;
    pub const CONFIG: u8 = 0x02;
    pub const STRING: u8 = 0x03;
    pub const INTERFACE: u8 = 0x04;
    pub const ENDPOINT: u8 = 0x05;
    pub const BOS: u8 = 0x0F;
    pub const DEVICE_CAPABILITY: u8 = 0x10;
    pub const HID: u8 = 0x21;
    pub const REPORT: u8 = 0x22;
    pub const PHYSICAL: u8 = 0x23;
    pub const HUB: u8 = 0x29;
    pub const SUPERSPEED_HUB: u8 = 0x2A;
    pub const SS_ENDPOINT_COMPANION: u8 = 0x30;
}

/// Standard request codes (`bRequest`).
pub mod request {
    pub const GET_STATUS: u8 = 0x00;
    pub const CLEAR_FEATURE: u8 = 0x01;
    pub const SET_FEATURE: u8 = 0x03;
    pub const SET_ADDRESS: u8 = 0x05;
    pub const GET_DESCRIPTOR: u8 = 0x06;
    pub const SET_DESCRIPTOR: u8 = 0x07;
    pub const GET_CONFIGURATION: u8 = 0x08;
    pub const SET_CONFIGURATION: u8 = 0x09;
    pub const GET_INTERFACE: u8 = 0x0A;
    pub const SET_INTERFACE: u8 = 0x0B;
    pub const SYNCH_FRAME: u8 = 0x0C;
}

/// BOS device capability types (`bDevCapabilityType`).
pub mod bos_type {
    pub const WIRELESS_USB_DEVICE_CAPABILITY: u8 = 0x01;
    pub const USB_2_0_EXTENSION: u8 = 0x02;
    pub const SS_USB_DEVICE_CAPABILITY: u8 = 0x03;
    pub const CONTAINER_ID: u8 = 0x04;
}

/// Bits of `wSpeedSupported` in a SuperSpeed device capability.
pub mod supported_speed {
    pub const LOW_SPEED_OPERATION: u16 = 1;
    pub const FULL_SPEED_OPERATION: u16 = 2;
    pub const HIGH_SPEED_OPERATION: u16 = 4;
    pub const SUPER_SPEED_OPERATION: u16 = 8;
}

/// Link power management support in a USB 2.0 extension's `bmAttributes`.
pub const BM_LPM_SUPPORT: u32 = 2;

/// Latency tolerance messages support in a SuperSpeed capability's `bmAttributes`.
pub const BM_LTM_SUPPORT: u8 = 2;

pub const ENDPOINT_IN: u8 = 0x80;
pub const ENDPOINT_OUT: u8 = 0x00;

pub const CONTROL_SETUP_SIZE: usize = 8;
pub const DT_DEVICE_SIZE: usize = 18;
pub const DT_CONFIG_SIZE: usize = 9;
pub const DT_INTERFACE_SIZE: usize = 9;
pub const DT_ENDPOINT_SIZE: usize = 7;
/// Endpoint descriptor size with the audio extension.
pub const DT_ENDPOINT_AUDIO_SIZE: usize = 9;
pub const DT_HUB_NONVAR_SIZE: usize = 7;

/// In `bEndpointAddress`.
pub const ENDPOINT_ADDRESS_MASK: u8 = 0x0F;
pub const ENDPOINT_DIR_MASK: u8 = 0x80;
/// In `bmAttributes`.
pub const TRANSFER_TYPE_MASK: u8 = 0x03;
pub const ISO_SYNC_TYPE_MASK: u8 = 0x0C;
pub const ISO_USAGE_TYPE_MASK: u8 = 0x30;

/// Event bits of a [`Pollfd`](crate::Pollfd).
pub const POLLIN: i16 = 1;
pub const POLLOUT: i16 = 4;

/// Wildcard matching for hotplug filters.
pub const HOTPLUG_MATCH_ANY: i32 = -1;

use std::ops::Range;

use libusb1_sys::libusb_interface_descriptor;

use crate::endpoint_descriptor::extra_bytes;

/// Describes an alternate setting of an interface.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct InterfaceDescriptor {
    interface_number: u8,
    setting_number: u8,
    num_endpoints: u8,
    class_code: u8,
    sub_class_code: u8,
    protocol_code: u8,
    description_index: u8,
    extra: Vec<u8>,
    pub(crate) interface: usize,
    pub(crate) endpoints: Range<usize>,
}

impl InterfaceDescriptor {
    /// Builds a setting descriptor from its raw fields.
    pub fn new(
        interface_number: u8,
        setting_number: u8,
        class_code: u8,
        sub_class_code: u8,
        protocol_code: u8,
    ) -> Self {
        InterfaceDescriptor {
            interface_number,
            setting_number,
            num_endpoints: 0,
            class_code,
            sub_class_code,
            protocol_code,
            description_index: 0,
            extra: Vec::new(),
            interface: 0,
            endpoints: 0..0,
        }
    }

    /// Sets the index of the string descriptor describing the setting.
    pub fn with_description_index(mut self, index: u8) -> Self {
        self.description_index = index;
        self
    }

    /// Returns the interface's number.
    pub fn interface_number(&self) -> u8 {
        self.interface_number
    }

    /// Returns the alternate setting number.
    pub fn setting_number(&self) -> u8 {
        self.setting_number
    }

    /// Returns the interface's class code.
    pub fn class_code(&self) -> u8 {
        self.class_code
    }

    /// Returns the interface's sub class code.
    pub fn sub_class_code(&self) -> u8 {
        self.sub_class_code
    }

    /// Returns the interface's protocol code.
    pub fn protocol_code(&self) -> u8 {
        self.protocol_code
    }

    /// Returns the index of the string descriptor that describes the interface.
    pub fn description_string_index(&self) -> Option<u8> {
        match self.description_index {
            0 => None,
            n => Some(n),
        }
    }

    /// Returns the number of endpoints belonging to this interface.
    pub fn num_endpoints(&self) -> u8 {
        self.num_endpoints
    }

    /// Returns the unknown 'extra' bytes that libusb does not understand.
    pub fn extra(&self) -> &[u8] {
        &self.extra
    }

    pub(crate) fn set_num_endpoints(&mut self, n: u8) {
        self.num_endpoints = n;
    }
}

#[doc(hidden)]
pub(crate) fn from_libusb(
    setting: &libusb_interface_descriptor,
    interface: usize,
    endpoints: Range<usize>,
) -> InterfaceDescriptor {
    InterfaceDescriptor {
        interface_number: setting.bInterfaceNumber,
        setting_number: setting.bAlternateSetting,
        num_endpoints: setting.bNumEndpoints,
        class_code: setting.bInterfaceClass,
        sub_class_code: setting.bInterfaceSubClass,
        protocol_code: setting.bInterfaceProtocol,
        description_index: setting.iInterface,
        extra: extra_bytes(setting.extra, setting.extra_length),
        interface,
        endpoints,
    }
}

use std::{ops::Range, slice};

use libusb1_sys::libusb_config_descriptor;

use crate::{
    endpoint_descriptor::{self, extra_bytes, EndpointDescriptor},
    interface_descriptor::{self, InterfaceDescriptor},
};

/// Describes a configuration together with all of its interfaces, settings and endpoints.
///
/// The whole tree is owned by the descriptor. Settings and endpoints are stored in flat lists in
/// descriptor order; interfaces and settings refer to their children by index ranges.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfigDescriptor {
    length: u8,
    total_length: u16,
    num_interfaces: u8,
    number: u8,
    description_index: u8,
    attributes: u8,
    max_power: u8,
    extra: Vec<u8>,
    pub(crate) interfaces: Vec<Range<usize>>,
    pub(crate) settings: Vec<InterfaceDescriptor>,
    pub(crate) endpoints: Vec<EndpointDescriptor>,
}

impl ConfigDescriptor {
    /// Builds an empty configuration from its raw header fields.
    ///
    /// `max_power` is the raw `bMaxPower` value in units of 2 mA.
    pub fn new(number: u8, attributes: u8, max_power: u8) -> Self {
        ConfigDescriptor {
            length: crate::constants::DT_CONFIG_SIZE as u8,
            total_length: crate::constants::DT_CONFIG_SIZE as u16,
            num_interfaces: 0,
            number,
            description_index: 0,
            attributes,
            max_power,
            extra: Vec::new(),
            interfaces: Vec::new(),
            settings: Vec::new(),
            endpoints: Vec::new(),
        }
    }

    /// Sets the index of the string descriptor describing the configuration.
    pub fn with_description_index(mut self, index: u8) -> Self {
        self.description_index = index;
        self
    }

    /// Appends an interface with its alternate settings and their endpoints.
    pub fn with_interface<I>(mut self, settings: I) -> Self
    where
        I: IntoIterator<Item = (InterfaceDescriptor, Vec<EndpointDescriptor>)>,
    {
        let interface = self.interfaces.len();
        let first = self.settings.len();

        for (mut setting, endpoints) in settings {
            let setting_index = self.settings.len();
            let start = self.endpoints.len();

            for mut endpoint in endpoints {
                endpoint.setting = setting_index;
                self.endpoints.push(endpoint);
            }

            setting.interface = interface;
            setting.endpoints = start..self.endpoints.len();
            setting.set_num_endpoints(setting.endpoints.len() as u8);
            self.settings.push(setting);
        }

        self.interfaces.push(first..self.settings.len());
        self.num_interfaces = self.interfaces.len() as u8;
        self.total_length = self.computed_length();
        self
    }

    fn computed_length(&self) -> u16 {
        let settings: usize = self
            .settings
            .iter()
            .map(|s| crate::constants::DT_INTERFACE_SIZE + s.extra().len())
            .sum();
        let endpoints: usize = self
            .endpoints
            .iter()
            .map(|e| e.length() as usize + e.extra().len())
            .sum();
        (self.length as usize + self.extra.len() + settings + endpoints) as u16
    }

    /// Returns the size of the configuration header in bytes.
    pub fn length(&self) -> u8 {
        self.length
    }

    /// Returns the size of the configuration including all interface and endpoint descriptors.
    pub fn total_length(&self) -> u16 {
        self.total_length
    }

    /// Returns the configuration number.
    pub fn number(&self) -> u8 {
        self.number
    }

    /// Returns the raw `bmAttributes` field.
    pub fn attributes(&self) -> u8 {
        self.attributes
    }

    /// Returns the device's maximum power consumption (in milliamps) in this configuration.
    pub fn max_power(&self) -> u16 {
        u16::from(self.max_power) * 2
    }

    /// Indicates if the device is self-powered in this configuration.
    pub fn self_powered(&self) -> bool {
        self.attributes & 0x40 != 0
    }

    /// Indicates if the device has remote wakeup capability in this configuration.
    pub fn remote_wakeup(&self) -> bool {
        self.attributes & 0x20 != 0
    }

    /// Returns the index of the string descriptor that describes the configuration.
    pub fn description_string_index(&self) -> Option<u8> {
        match self.description_index {
            0 => None,
            n => Some(n),
        }
    }

    /// Returns the number of interfaces for this configuration.
    pub fn num_interfaces(&self) -> u8 {
        self.num_interfaces
    }

    /// Returns every alternate setting of every interface, in descriptor order.
    pub fn settings(&self) -> &[InterfaceDescriptor] {
        &self.settings
    }

    /// Returns every endpoint of every setting, in descriptor order.
    pub fn endpoints(&self) -> &[EndpointDescriptor] {
        &self.endpoints
    }

    /// Returns the unknown 'extra' bytes that libusb does not understand.
    pub fn extra(&self) -> &[u8] {
        &self.extra
    }
}

/// Copies a native configuration tree.
///
/// # Safety
///
/// `config` must point to a valid descriptor as returned by `libusb_get_config_descriptor`.
#[doc(hidden)]
pub(crate) unsafe fn from_libusb(config: *const libusb_config_descriptor) -> ConfigDescriptor {
    let config = &*config;

    let mut descriptor = ConfigDescriptor {
        length: config.bLength,
        total_length: config.wTotalLength,
        num_interfaces: config.bNumInterfaces,
        number: config.bConfigurationValue,
        description_index: config.iConfiguration,
        attributes: config.bmAttributes,
        max_power: config.bMaxPower,
        extra: extra_bytes(config.extra, config.extra_length),
        interfaces: Vec::new(),
        settings: Vec::new(),
        endpoints: Vec::new(),
    };

    let interfaces = match config.interface.is_null() {
        true => &[][..],
        false => slice::from_raw_parts(config.interface, config.bNumInterfaces as usize),
    };

    for (index, interface) in interfaces.iter().enumerate() {
        let altsettings = match interface.altsetting.is_null() || interface.num_altsetting <= 0 {
            true => &[][..],
            false => slice::from_raw_parts(interface.altsetting, interface.num_altsetting as usize),
        };
        let first = descriptor.settings.len();

        for setting in altsettings {
            let setting_index = descriptor.settings.len();
            let endpoints = match setting.endpoint.is_null() {
                true => &[][..],
                false => slice::from_raw_parts(setting.endpoint, setting.bNumEndpoints as usize),
            };
            let start = descriptor.endpoints.len();

            descriptor.endpoints.extend(
                endpoints
                    .iter()
                    .map(|endpoint| endpoint_descriptor::from_libusb(endpoint, setting_index)),
            );

            let range = start..descriptor.endpoints.len();
            descriptor
                .settings
                .push(interface_descriptor::from_libusb(setting, index, range));
        }

        descriptor.interfaces.push(first..descriptor.settings.len());
    }

    descriptor
}

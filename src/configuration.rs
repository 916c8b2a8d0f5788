use std::{
    cmp::Ordering,
    fmt,
    hash::{Hash, Hasher},
    sync::{Arc, OnceLock},
};

use crate::{
    config_descriptor::ConfigDescriptor, device::Device, endpoint::Endpoint, interface::Interface,
    libusb::Libusb, setting::Setting, transport::Transport,
};

/// A configuration of a device, together with the tree of its interfaces.
///
/// Interfaces, settings and endpoints obtained from a configuration share its descriptor tree
/// and keep the device alive.
pub struct Configuration<T: Transport = Libusb> {
    device: Device<T>,
    pub(crate) tree: Arc<ConfigTree>,
}

pub(crate) struct ConfigTree {
    pub(crate) descriptor: ConfigDescriptor,
    description: OnceLock<String>,
    pub(crate) setting_descriptions: Vec<OnceLock<String>>,
}

impl<T: Transport> Clone for Configuration<T> {
    fn clone(&self) -> Self {
        Configuration {
            device: self.device.clone(),
            tree: self.tree.clone(),
        }
    }
}

impl<T: Transport> Configuration<T> {
    pub(crate) fn new(device: Device<T>, descriptor: ConfigDescriptor) -> Self {
        let setting_descriptions = descriptor.settings().iter().map(|_| OnceLock::new()).collect();
        Configuration {
            device,
            tree: Arc::new(ConfigTree {
                descriptor,
                description: OnceLock::new(),
                setting_descriptions,
            }),
        }
    }

    /// Returns the device the configuration belongs to.
    pub fn device(&self) -> &Device<T> {
        &self.device
    }

    /// Returns the raw configuration descriptor.
    pub fn descriptor(&self) -> &ConfigDescriptor {
        &self.tree.descriptor
    }

    /// Returns the configuration value passed to `set_configuration`.
    pub fn number(&self) -> u8 {
        self.tree.descriptor.number()
    }

    /// Returns the maximum power consumption in milliamps.
    pub fn max_power(&self) -> u16 {
        self.tree.descriptor.max_power()
    }

    pub fn self_powered(&self) -> bool {
        self.tree.descriptor.self_powered()
    }

    pub fn remote_wakeup(&self) -> bool {
        self.tree.descriptor.remote_wakeup()
    }

    pub fn num_interfaces(&self) -> u8 {
        self.tree.descriptor.num_interfaces()
    }

    pub fn extra(&self) -> &[u8] {
        self.tree.descriptor.extra()
    }

    /// Returns the configuration's string descriptor, or `"?"` when there is none.
    pub fn description(&self) -> &str {
        self.device.cached_string(
            &self.tree.description,
            self.tree.descriptor.description_string_index(),
        )
    }

    pub fn interfaces(&self) -> Vec<Interface<T>> {
        (0..self.tree.descriptor.interfaces.len())
            .map(|index| Interface::new(self.clone(), index))
            .collect()
    }

    pub fn settings(&self) -> Vec<Setting<T>> {
        (0..self.tree.descriptor.settings.len())
            .map(|index| Setting::new(self.clone(), index))
            .collect()
    }

    pub fn endpoints(&self) -> Vec<Endpoint<T>> {
        (0..self.tree.descriptor.endpoints.len())
            .map(|index| Endpoint::new(self.clone(), index))
            .collect()
    }

    fn key(&self) -> (&Device<T>, u8) {
        (&self.device, self.number())
    }
}

impl<T: Transport> PartialEq for Configuration<T> {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl<T: Transport> Eq for Configuration<T> {}

impl<T: Transport> PartialOrd for Configuration<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: Transport> Ord for Configuration<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl<T: Transport> Hash for Configuration<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl<T: Transport> fmt::Debug for Configuration<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Configuration")
            .field("device", &self.device)
            .field("number", &self.number())
            .field("num_interfaces", &self.num_interfaces())
            .finish()
    }
}

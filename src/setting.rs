use std::{
    cmp::Ordering,
    fmt,
    hash::{Hash, Hasher},
    ops::Deref,
};

use crate::{
    configuration::Configuration, device::Device, endpoint::Endpoint,
    interface::Interface, interface_descriptor::InterfaceDescriptor, libusb::Libusb,
    transport::Transport,
};

/// An alternate setting of an interface.
///
/// Dereferences to its [`InterfaceDescriptor`].
pub struct Setting<T: Transport = Libusb> {
    config: Configuration<T>,
    index: usize,
}

impl<T: Transport> Clone for Setting<T> {
    fn clone(&self) -> Self {
        Setting {
            config: self.config.clone(),
            index: self.index,
        }
    }
}

impl<T: Transport> Setting<T> {
    pub(crate) fn new(config: Configuration<T>, index: usize) -> Self {
        Setting { config, index }
    }

    pub fn descriptor(&self) -> &InterfaceDescriptor {
        &self.config.tree.descriptor.settings[self.index]
    }

    pub fn interface(&self) -> Interface<T> {
        Interface::new(self.config.clone(), self.descriptor().interface)
    }

    pub fn configuration(&self) -> &Configuration<T> {
        &self.config
    }

    pub fn device(&self) -> &Device<T> {
        self.config.device()
    }

    pub fn endpoints(&self) -> Vec<Endpoint<T>> {
        self.descriptor()
            .endpoints
            .clone()
            .map(|index| Endpoint::new(self.config.clone(), index))
            .collect()
    }

    /// Returns the setting's string descriptor, or `"?"` when there is none.
    pub fn description(&self) -> &str {
        self.config.device().cached_string(
            &self.config.tree.setting_descriptions[self.index],
            self.descriptor().description_string_index(),
        )
    }

    fn key(&self) -> (&Configuration<T>, u8, u8) {
        let d = self.descriptor();
        (&self.config, d.interface_number(), d.setting_number())
    }
}

impl<T: Transport> Deref for Setting<T> {
    type Target = InterfaceDescriptor;

    fn deref(&self) -> &InterfaceDescriptor {
        self.descriptor()
    }
}

impl<T: Transport> PartialEq for Setting<T> {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl<T: Transport> Eq for Setting<T> {}

impl<T: Transport> PartialOrd for Setting<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: Transport> Ord for Setting<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl<T: Transport> Hash for Setting<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl<T: Transport> fmt::Debug for Setting<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Setting")
            .field("configuration", &self.config.number())
            .field("descriptor", self.descriptor())
            .finish()
    }
}

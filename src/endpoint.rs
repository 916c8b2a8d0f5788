use std::{
    cmp::Ordering,
    fmt,
    hash::{Hash, Hasher},
    ops::Deref,
};

use crate::{
    configuration::Configuration, device::Device, endpoint_descriptor::EndpointDescriptor,
    libusb::Libusb, setting::Setting, transport::Transport, Result,
};

/// An endpoint of an alternate setting.
///
/// Dereferences to its [`EndpointDescriptor`].
pub struct Endpoint<T: Transport = Libusb> {
    config: Configuration<T>,
    index: usize,
}

impl<T: Transport> Clone for Endpoint<T> {
    fn clone(&self) -> Self {
        Endpoint {
            config: self.config.clone(),
            index: self.index,
        }
    }
}

impl<T: Transport> Endpoint<T> {
    pub(crate) fn new(config: Configuration<T>, index: usize) -> Self {
        Endpoint { config, index }
    }

    pub fn descriptor(&self) -> &EndpointDescriptor {
        &self.config.tree.descriptor.endpoints[self.index]
    }

    pub fn setting(&self) -> Setting<T> {
        Setting::new(self.config.clone(), self.descriptor().setting)
    }

    pub fn configuration(&self) -> &Configuration<T> {
        &self.config
    }

    pub fn device(&self) -> &Device<T> {
        self.config.device()
    }

    /// Asks the platform for the endpoint's packet size in the active configuration.
    pub fn max_packet_size_active(&self) -> Result<usize> {
        self.device().max_packet_size(self.address())
    }

    fn key(&self) -> (Setting<T>, u8) {
        (self.setting(), self.address())
    }
}

impl<T: Transport> Deref for Endpoint<T> {
    type Target = EndpointDescriptor;

    fn deref(&self) -> &EndpointDescriptor {
        self.descriptor()
    }
}

impl<T: Transport> PartialEq for Endpoint<T> {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl<T: Transport> Eq for Endpoint<T> {}

impl<T: Transport> PartialOrd for Endpoint<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: Transport> Ord for Endpoint<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl<T: Transport> Hash for Endpoint<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl<T: Transport> fmt::Debug for Endpoint<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("configuration", &self.config.number())
            .field("descriptor", self.descriptor())
            .finish()
    }
}

use std::{
    cmp::Ordering,
    fmt,
    hash::{Hash, Hasher},
    ops::Range,
};

use crate::{
    configuration::Configuration, device::Device, endpoint::Endpoint, libusb::Libusb,
    setting::Setting, transport::Transport,
};

/// An interface of a configuration, i.e. the group of its alternate settings.
pub struct Interface<T: Transport = Libusb> {
    config: Configuration<T>,
    index: usize,
}

impl<T: Transport> Clone for Interface<T> {
    fn clone(&self) -> Self {
        Interface {
            config: self.config.clone(),
            index: self.index,
        }
    }
}

impl<T: Transport> Interface<T> {
    pub(crate) fn new(config: Configuration<T>, index: usize) -> Self {
        Interface { config, index }
    }

    pub fn configuration(&self) -> &Configuration<T> {
        &self.config
    }

    pub fn device(&self) -> &Device<T> {
        self.config.device()
    }

    fn range(&self) -> Range<usize> {
        self.config.tree.descriptor.interfaces[self.index].clone()
    }

    /// Returns the interface number, taken from its first alternate setting.
    ///
    /// An interface without settings reports its position in the configuration.
    pub fn number(&self) -> u8 {
        let range = self.range();
        self.config
            .tree
            .descriptor
            .settings
            .get(range.start)
            .filter(|_| !range.is_empty())
            .map_or(self.index as u8, |s| s.interface_number())
    }

    /// Returns the alternate settings of the interface.
    pub fn settings(&self) -> Vec<Setting<T>> {
        self.range()
            .map(|index| Setting::new(self.config.clone(), index))
            .collect()
    }

    /// Returns the endpoints of all alternate settings.
    pub fn endpoints(&self) -> Vec<Endpoint<T>> {
        self.settings().iter().flat_map(Setting::endpoints).collect()
    }

    fn key(&self) -> (&Configuration<T>, u8) {
        (&self.config, self.number())
    }
}

impl<T: Transport> PartialEq for Interface<T> {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl<T: Transport> Eq for Interface<T> {}

impl<T: Transport> PartialOrd for Interface<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: Transport> Ord for Interface<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl<T: Transport> Hash for Interface<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl<T: Transport> fmt::Debug for Interface<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interface")
            .field("configuration", &self.config.number())
            .field("number", &self.number())
            .field("num_settings", &self.range().len())
            .finish()
    }
}

#[cfg(test)]
mod test {
    use crate::{
        test_helpers::{MockDevice, MockTransport},
        ConfigDescriptor, Context, EndpointDescriptor, InterfaceDescriptor,
    };

    fn context() -> Context<MockTransport> {
        let transport = MockTransport::new();
        transport.attach(
            MockDevice::new(1, 3, device_descriptor!(bNumConfigurations: 1)).with_config(
                ConfigDescriptor::new(1, 0x80, 50)
                    .with_interface([
                        (InterfaceDescriptor::new(0, 0, 1, 1, 0), vec![]),
                    ])
                    .with_interface([
                        (InterfaceDescriptor::new(1, 0, 1, 2, 0), vec![]),
                        (InterfaceDescriptor::new(1, 1, 1, 2, 0), vec![
                            EndpointDescriptor::new(0x01, 0x05, 192, 1),
                        ]),
                    ]),
            ),
        );
        Context::with_transport(transport)
    }

    #[test]
    fn it_has_number_of_first_setting() {
        let device = context().devices().unwrap().remove(0);
        let numbers: Vec<_> = device.interfaces().iter().map(|i| i.number()).collect();
        assert_eq!(vec![0, 1], numbers);
    }

    #[test]
    fn it_has_settings_sharing_the_interface_number() {
        let device = context().devices().unwrap().remove(0);
        let interface = device.interfaces().remove(1);

        let settings = interface.settings();
        assert_eq!(2, settings.len());
        assert!(settings.iter().all(|s| s.interface_number() == 1));
        assert_eq!(vec![0, 1], settings.iter().map(|s| s.setting_number()).collect::<Vec<_>>());
        assert_eq!(1, interface.endpoints().len());
    }

    #[test]
    fn it_keeps_distinct_interfaces_apart() {
        let device = context().devices().unwrap().remove(0);
        let interfaces = device.interfaces();

        assert_ne!(interfaces[0], interfaces[1]);
        assert!(interfaces[0] < interfaces[1]);
        assert!(device.interfaces().contains(&interfaces[1]));
    }
}

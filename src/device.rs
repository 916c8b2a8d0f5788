use std::{
    cmp::Ordering,
    fmt,
    hash::{Hash, Hasher},
    sync::{Arc, OnceLock},
};

use tracing::debug;

use crate::{
    class_codes::dev_string,
    configuration::Configuration,
    constants::class,
    context::Context,
    device_descriptor::DeviceDescriptor,
    device_handle::{AsEndpointAddress, AsInterfaceNumber, DeviceHandle},
    endpoint::Endpoint,
    fields::Speed,
    interface::Interface,
    libusb::Libusb,
    setting::Setting,
    transport::Transport,
    Result,
};

/// A device attached to the system, as seen when it was enumerated.
///
/// Devices compare by bus number and address, so devices from two separate enumerations are
/// equal when they refer to the same attachment.
pub struct Device<T: Transport = Libusb> {
    inner: Arc<DeviceInner<T>>,
}

struct DeviceInner<T: Transport> {
    context: Context<T>,
    native: T::Device,
    descriptor: DeviceDescriptor,
    bus_number: u8,
    address: u8,
    port_number: u8,
    speed: Speed,
    manufacturer: OnceLock<String>,
    product: OnceLock<String>,
    serial_number: OnceLock<String>,
}

impl<T: Transport> Clone for Device<T> {
    fn clone(&self) -> Self {
        Device {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Transport> Device<T> {
    pub(crate) fn new(context: Context<T>, native: T::Device) -> Result<Self> {
        let transport = context.transport();
        let descriptor = transport.device_descriptor(&native)?;
        let bus_number = transport.bus_number(&native);
        let address = transport.address(&native);
        let port_number = transport.port_number(&native);
        let speed = transport.speed(&native);

        Ok(Device {
            inner: Arc::new(DeviceInner {
                context,
                native,
                descriptor,
                bus_number,
                address,
                port_number,
                speed,
                manufacturer: OnceLock::new(),
                product: OnceLock::new(),
                serial_number: OnceLock::new(),
            }),
        })
    }

    pub fn context(&self) -> &Context<T> {
        &self.inner.context
    }

    pub(crate) fn native(&self) -> &T::Device {
        &self.inner.native
    }

    /// Returns the device descriptor read at enumeration.
    pub fn device_descriptor(&self) -> &DeviceDescriptor {
        &self.inner.descriptor
    }

    /// Returns the number of the bus that the device is connected to.
    pub fn bus_number(&self) -> u8 {
        self.inner.bus_number
    }

    /// Returns the device's address on the bus that it's connected to.
    pub fn address(&self) -> u8 {
        self.inner.address
    }

    /// Returns the number of the port that the device is connected to.
    pub fn port_number(&self) -> u8 {
        self.inner.port_number
    }

    /// Returns the device's connection speed.
    pub fn speed(&self) -> Speed {
        self.inner.speed
    }

    /// Returns the manufacturer name, or `"?"` when it can't be read.
    pub fn manufacturer(&self) -> &str {
        let index = self.inner.descriptor.manufacturer_string_index();
        self.cached_string(&self.inner.manufacturer, index)
    }

    /// Returns the product name, or `"?"` when it can't be read.
    pub fn product(&self) -> &str {
        let index = self.inner.descriptor.product_string_index();
        self.cached_string(&self.inner.product, index)
    }

    /// Returns the serial number, or `"?"` when it can't be read.
    pub fn serial_number(&self) -> &str {
        let index = self.inner.descriptor.serial_number_string_index();
        self.cached_string(&self.inner.serial_number, index)
    }

    /// Reads a string descriptor once and remembers the outcome, failures included.
    pub(crate) fn cached_string<'a>(&self, cell: &'a OnceLock<String>, index: Option<u8>) -> &'a str {
        cell.get_or_init(|| match index {
            None => "?".to_owned(),
            Some(index) => self.read_string(index).unwrap_or_else(|err| {
                debug!(bus = self.bus_number(), address = self.address(), index, %err, "string descriptor unavailable");
                "?".to_owned()
            }),
        })
    }

    fn read_string(&self, index: u8) -> Result<String> {
        let transport = self.inner.context.transport();
        let handle = transport.open(&self.inner.native)?;
        let string = transport.string_descriptor_ascii(&handle, index)?;
        Ok(string.trim().to_owned())
    }

    /// Reads the configuration with the given index (not its configuration value).
    pub fn config_descriptor(&self, index: u8) -> Result<Configuration<T>> {
        let descriptor = self
            .inner
            .context
            .transport()
            .config_descriptor(&self.inner.native, index)?;
        Ok(Configuration::new(self.clone(), descriptor))
    }

    /// Returns all configurations of the device.
    ///
    /// Configurations are read again on every call. A configuration that can't be read is left
    /// out instead of failing the whole list, since some platforms can't report descriptors of
    /// every device.
    pub fn configurations(&self) -> Vec<Configuration<T>> {
        (0..self.inner.descriptor.num_configurations())
            .filter_map(|index| match self.config_descriptor(index) {
                Ok(config) => Some(config),
                Err(err) => {
                    debug!(
                        bus = self.bus_number(),
                        address = self.address(),
                        index,
                        %err,
                        "skipping unreadable configuration"
                    );
                    None
                }
            })
            .collect()
    }

    /// Returns the interfaces of all configurations.
    pub fn interfaces(&self) -> Vec<Interface<T>> {
        self.configurations()
            .iter()
            .flat_map(Configuration::interfaces)
            .collect()
    }

    /// Returns the alternate settings of all interfaces.
    pub fn settings(&self) -> Vec<Setting<T>> {
        self.interfaces()
            .iter()
            .flat_map(Interface::settings)
            .collect()
    }

    /// Returns the endpoints of all settings.
    pub fn endpoints(&self) -> Vec<Endpoint<T>> {
        self.settings().iter().flat_map(Setting::endpoints).collect()
    }

    /// Opens the device.
    pub fn open(&self) -> Result<DeviceHandle<T>> {
        let native = self.inner.context.transport().open(&self.inner.native)?;
        Ok(DeviceHandle::new(self.clone(), native))
    }

    /// Opens the device, claims `interface`, runs `f` and releases the interface again, also
    /// when `f` fails.
    pub fn open_interface<I, R, F>(&self, interface: I, f: F) -> Result<R>
    where
        I: AsInterfaceNumber,
        F: FnOnce(&DeviceHandle<T>) -> Result<R>,
    {
        let handle = self.open()?;
        handle.with_claimed_interface(interface, f)
    }

    /// Returns the `wMaxPacketSize` of an endpoint in the active configuration.
    pub fn max_packet_size(&self, endpoint: impl AsEndpointAddress) -> Result<usize> {
        self.inner
            .context
            .transport()
            .max_packet_size(&self.inner.native, endpoint.as_endpoint_address())
    }

    /// Returns the number of bytes an isochronous endpoint moves per service interval.
    pub fn max_iso_packet_size(&self, endpoint: impl AsEndpointAddress) -> Result<usize> {
        self.inner
            .context
            .transport()
            .max_iso_packet_size(&self.inner.native, endpoint.as_endpoint_address())
    }

    /// Describes the device in one line, e.g.
    /// `1/4 0781:5567 SanDisk Cruzer Blade 4C530 (MassStorage SCSI Bulk-Only)`.
    ///
    /// Reads the string descriptors if that didn't happen yet.
    pub fn describe(&self) -> String {
        let d = &self.inner.descriptor;
        let class = if d.class_code() == class::PER_INTERFACE {
            self.settings()
                .iter()
                .map(|s| dev_string(s.class_code(), s.sub_class_code(), s.protocol_code()))
                .collect::<Vec<_>>()
                .join(", ")
        } else {
            dev_string(d.class_code(), d.sub_class_code(), d.protocol_code())
        };

        format!(
            "{}/{} {:04x}:{:04x} {} {} {} ({})",
            self.bus_number(),
            self.address(),
            d.vendor_id(),
            d.product_id(),
            self.manufacturer(),
            self.product(),
            self.serial_number(),
            class
        )
    }

    fn key(&self) -> (u8, u8) {
        (self.inner.bus_number, self.inner.address)
    }
}

impl<T: Transport> PartialEq for Device<T> {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl<T: Transport> Eq for Device<T> {}

impl<T: Transport> PartialOrd for Device<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: Transport> Ord for Device<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl<T: Transport> Hash for Device<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl<T: Transport> fmt::Debug for Device<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("bus_number", &self.bus_number())
            .field("address", &self.address())
            .field("vendor_id", &format_args!("{:04x}", self.inner.descriptor.vendor_id()))
            .field("product_id", &format_args!("{:04x}", self.inner.descriptor.product_id()))
            .finish()
    }
}

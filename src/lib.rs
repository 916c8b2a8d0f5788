//! This crate provides safe access to USB devices through the native `libusb` library.
//!
//! A [`Context`] enumerates [`Device`]s and hands out their descriptor graph
//! ([`Configuration`], [`Interface`], [`Setting`], [`Endpoint`]). An open [`DeviceHandle`] claims
//! interfaces and runs transfers, either synchronously or as reusable [`Transfer`]s completed by
//! the context's event loop.

pub use crate::bos::{
    Bos, CapabilityType, ContainerId, DeviceCapability, GenericCapability,
    SsUsbDeviceCapability, Usb20Extension,
};
pub use crate::class_codes::dev_string;
pub use crate::config_descriptor::ConfigDescriptor;
pub use crate::configuration::Configuration;
pub use crate::context::{Context, Criterion, DeviceFilter, Pollfd};
pub use crate::device::Device;
pub use crate::device_descriptor::DeviceDescriptor;
pub use crate::device_handle::{
    AsAltSetting, AsConfigurationValue, AsEndpointAddress, AsInterfaceNumber, ControlRequest,
    DeviceHandle, EndpointRequest,
};
pub use crate::endpoint::Endpoint;
pub use crate::endpoint_descriptor::{EndpointDescriptor, SsCompanion};
pub use crate::error::{Error, ErrorKind, Result, Transferred};
pub use crate::fields::{
    request_type, Direction, Recipient, RequestType, Speed, SyncType, TransferType, UsageType,
    Version,
};
pub use crate::hotplug::{
    HotplugAction, HotplugBuilder, HotplugEvent, HotplugFilter, HotplugHandle,
};
pub use crate::interface::Interface;
pub use crate::interface_descriptor::InterfaceDescriptor;
pub use crate::libusb::{Libusb, LibusbDevice, LibusbHandle, LibusbTransfer};
pub use crate::options::{LogLevel, UsbOption};
pub use crate::setting::Setting;
pub use crate::transfer::{
    setup_packet, Bulk, BulkStream, BulkStreamTransfer, BulkTransfer, Completion, Control,
    ControlTransfer, Interrupt, InterruptTransfer, Isochronous, IsochronousTransfer, Transfer,
    TransferKind, TransferState, TransferStatus, DEFAULT_TIMEOUT,
};
pub use crate::transport::{Capability, IsoPacket};
pub use crate::version::{version, LibraryVersion};

#[cfg(test)]
#[macro_use]
mod test_helpers;

#[macro_use]
mod error;
mod version;

mod bos;
mod class_codes;
mod config_descriptor;
mod configuration;
mod context;
mod device;
mod device_descriptor;
mod device_handle;
mod endpoint;
mod endpoint_descriptor;
mod fields;
mod hotplug;
mod interface;
mod interface_descriptor;
mod libusb;
mod options;
mod setting;
mod transfer;

pub mod constants;
pub mod transport;

use std::sync::{Mutex, MutexGuard};

/// Locks `mutex`, carrying on with the data of a thread that panicked while holding it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

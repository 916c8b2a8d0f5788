//! The [`Transport`] backed by the system `libusb` library.

use std::{
    collections::HashMap,
    ffi::c_int,
    fmt,
    mem::MaybeUninit,
    ptr::{self, NonNull},
    slice,
    sync::{Arc, Mutex},
    time::Duration,
};

use libc::timeval;
use libusb1_sys::{constants::*, *};
use tracing::{debug, warn};

use crate::{
    config_descriptor::{self, ConfigDescriptor},
    context::Pollfd,
    device_descriptor::{self, DeviceDescriptor},
    error::{self, Error, ErrorKind},
    fields::Speed,
    hotplug::HotplugFilter,
    lock,
    options::{OptionInner, UsbOption},
    transport::{
        Capability, CompletionFlag, CompletionSink, HotplugSink, PollfdSink, SubmitRequest,
        Transport,
    },
    Result,
};

mod hotplug;
mod log;
mod pollfd;
mod transfer;

pub use self::transfer::LibusbTransfer;

/// A `libusb` session.
///
/// Owns the native context and everything registered on it. Dropping the session clears the
/// event source notifiers, deregisters the remaining hotplug callbacks and exits the library.
pub struct Libusb {
    context: NonNull<libusb_context>,
    pollfd: Mutex<Option<Box<Arc<dyn PollfdSink>>>>,
    hotplug: Mutex<HashMap<c_int, Box<Arc<dyn HotplugSink<Libusb>>>>>,
}

// The native context is thread safe; the registrations are guarded by the mutexes.
unsafe impl Send for Libusb {}
unsafe impl Sync for Libusb {}

impl Libusb {
    /// Opens a new native context and routes its log output to `tracing`.
    pub(crate) fn init() -> Result<Self> {
        let mut context = MaybeUninit::<*mut libusb_context>::uninit();

        try_unsafe!(libusb_init(context.as_mut_ptr()));

        let context = NonNull::new(unsafe { context.assume_init() })
            .ok_or_else(|| Error::new(ErrorKind::Other).with_detail("libusb_init returned no context"))?;

        log::install(context.as_ptr());
        debug!("opened libusb context {:p}", context);

        Ok(Libusb {
            context,
            pollfd: Mutex::new(None),
            hotplug: Mutex::new(HashMap::new()),
        })
    }

    fn as_raw(&self) -> *mut libusb_context {
        self.context.as_ptr()
    }
}

impl Drop for Libusb {
    fn drop(&mut self) {
        if lock(&self.pollfd).take().is_some() {
            unsafe { libusb_set_pollfd_notifiers(self.as_raw(), None, None, ptr::null_mut()) };
        }

        let registrations: Vec<_> = lock(&self.hotplug).drain().collect();
        for (handle, sink) in registrations {
            unsafe { libusb_hotplug_deregister_callback(self.as_raw(), handle) };
            drop(sink);
        }

        unsafe { libusb_exit(self.as_raw()) };
        debug!("closed libusb context {:p}", self.context);
    }
}

impl fmt::Debug for Libusb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Libusb")
            .field("context", &self.context)
            .finish()
    }
}

/// A counted reference to a native device.
pub struct LibusbDevice(NonNull<libusb_device>);

unsafe impl Send for LibusbDevice {}
unsafe impl Sync for LibusbDevice {}

impl LibusbDevice {
    /// Takes a new reference on a device owned by someone else.
    ///
    /// # Safety
    ///
    /// `device` must point to a live native device.
    pub(crate) unsafe fn from_borrowed(device: NonNull<libusb_device>) -> Self {
        libusb_ref_device(device.as_ptr());
        LibusbDevice(device)
    }

    fn as_raw(&self) -> *mut libusb_device {
        self.0.as_ptr()
    }
}

impl Clone for LibusbDevice {
    fn clone(&self) -> Self {
        unsafe { Self::from_borrowed(self.0) }
    }
}

impl Drop for LibusbDevice {
    fn drop(&mut self) {
        unsafe { libusb_unref_device(self.as_raw()) };
    }
}

impl fmt::Debug for LibusbDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("LibusbDevice").field(&self.0).finish()
    }
}

/// An open native device. Dropping it closes the device.
pub struct LibusbHandle(NonNull<libusb_device_handle>);

unsafe impl Send for LibusbHandle {}
unsafe impl Sync for LibusbHandle {}

impl LibusbHandle {
    fn as_raw(&self) -> *mut libusb_device_handle {
        self.0.as_ptr()
    }
}

impl Drop for LibusbHandle {
    fn drop(&mut self) {
        unsafe { libusb_close(self.as_raw()) };
    }
}

impl fmt::Debug for LibusbHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("LibusbHandle").field(&self.0).finish()
    }
}

fn check(code: c_int) -> Result<c_int> {
    if code < 0 {
        Err(error::from_libusb(code))
    } else {
        Ok(code)
    }
}

fn to_timeval(timeout: Duration) -> timeval {
    timeval {
        tv_sec: timeout.as_secs().try_into().unwrap_or(libc::time_t::MAX),
        tv_usec: timeout.subsec_micros() as libc::suseconds_t,
    }
}

fn endpoint_list(endpoints: &[u8]) -> Result<(Vec<u8>, c_int)> {
    let count = c_int::try_from(endpoints.len())
        .map_err(|_| Error::invalid_argument("too many endpoints"))?;
    Ok((endpoints.to_vec(), count))
}

impl Transport for Libusb {
    type Device = LibusbDevice;
    type Handle = LibusbHandle;
    type Transfer = LibusbTransfer;
    type Registration = c_int;

    fn set_option(&self, option: &UsbOption) -> Result<()> {
        let inner = option.inner();
        let code = match inner {
            OptionInner::LogLevel(level) => unsafe {
                libusb_set_option(self.as_raw(), inner.code(), level.as_c_int())
            },
            OptionInner::UseUsbdk | OptionInner::NoDeviceDiscovery => unsafe {
                libusb_set_option(self.as_raw(), inner.code())
            },
        };

        match (inner, code) {
            (_, LIBUSB_SUCCESS) => Ok(()),
            (OptionInner::LogLevel(level), LIBUSB_ERROR_NOT_SUPPORTED) => {
                // Libraries older than 1.0.22 only know the debug level.
                unsafe { libusb_set_debug(self.as_raw(), level.as_c_int()) };
                Ok(())
            }
            (_, code) => Err(error::from_libusb(code)),
        }
    }

    fn has_capability(&self, capability: Capability) -> bool {
        let capability = match capability {
            Capability::HasCapability => LIBUSB_CAP_HAS_CAPABILITY,
            Capability::HasHotplug => LIBUSB_CAP_HAS_HOTPLUG,
            Capability::HasHidAccess => LIBUSB_CAP_HAS_HID_ACCESS,
            Capability::SupportsDetachKernelDriver => LIBUSB_CAP_SUPPORTS_DETACH_KERNEL_DRIVER,
        };
        unsafe { libusb_has_capability(capability) != 0 }
    }

    fn handle_events(
        &self,
        timeout: Option<Duration>,
        completed: Option<&CompletionFlag>,
    ) -> Result<()> {
        let completed = completed.map_or(ptr::null_mut(), CompletionFlag::as_ptr);

        match timeout {
            Some(timeout) => {
                let tv = to_timeval(timeout);
                try_unsafe!(libusb_handle_events_timeout_completed(
                    self.as_raw(),
                    &tv,
                    completed
                ));
            }
            None => try_unsafe!(libusb_handle_events_completed(self.as_raw(), completed)),
        }

        Ok(())
    }

    fn pollfds(&self) -> Option<Vec<Pollfd>> {
        pollfd::current(self.as_raw())
    }

    fn next_timeout(&self) -> Result<Option<Duration>> {
        let mut tv = timeval {
            tv_sec: 0,
            tv_usec: 0,
        };

        match check(unsafe { libusb_get_next_timeout(self.as_raw(), &mut tv) })? {
            0 => Ok(None),
            _ => Ok(Some(
                Duration::from_secs(tv.tv_sec.max(0) as u64)
                    + Duration::from_micros(tv.tv_usec.max(0) as u64),
            )),
        }
    }

    fn set_pollfd_notifiers(&self, sink: Option<Arc<dyn PollfdSink>>) {
        let mut slot = lock(&self.pollfd);
        let previous = slot.take();

        match sink {
            Some(sink) => {
                let sink = Box::new(sink);
                unsafe { pollfd::install(self.as_raw(), &sink) };
                *slot = Some(sink);
            }
            None => unsafe { pollfd::clear(self.as_raw()) },
        }

        // The native side no longer points at the old sink.
        drop(previous);
    }

    fn devices(&self) -> Result<Vec<LibusbDevice>> {
        let mut list = MaybeUninit::uninit();

        let count = unsafe { libusb_get_device_list(self.as_raw(), list.as_mut_ptr()) };
        if count < 0 {
            return Err(error::from_libusb(count as c_int));
        }

        let list = unsafe { list.assume_init() };
        let devices = unsafe { slice::from_raw_parts(list, count as usize) }
            .iter()
            .filter_map(|&device| NonNull::new(device))
            .map(|device| unsafe { LibusbDevice::from_borrowed(device) })
            .collect();

        unsafe { libusb_free_device_list(list, 1) };

        Ok(devices)
    }

    fn device_descriptor(&self, device: &LibusbDevice) -> Result<DeviceDescriptor> {
        let mut descriptor = MaybeUninit::<libusb_device_descriptor>::uninit();

        try_unsafe!(libusb_get_device_descriptor(
            device.as_raw(),
            descriptor.as_mut_ptr()
        ));

        Ok(device_descriptor::from_libusb(unsafe {
            &descriptor.assume_init()
        }))
    }

    fn config_descriptor(&self, device: &LibusbDevice, index: u8) -> Result<ConfigDescriptor> {
        let mut config = MaybeUninit::uninit();

        try_unsafe!(libusb_get_config_descriptor(
            device.as_raw(),
            index,
            config.as_mut_ptr()
        ));

        unsafe {
            let config = config.assume_init();
            let descriptor = config_descriptor::from_libusb(config);
            libusb_free_config_descriptor(config);
            Ok(descriptor)
        }
    }

    fn bus_number(&self, device: &LibusbDevice) -> u8 {
        unsafe { libusb_get_bus_number(device.as_raw()) }
    }

    fn address(&self, device: &LibusbDevice) -> u8 {
        unsafe { libusb_get_device_address(device.as_raw()) }
    }

    fn port_number(&self, device: &LibusbDevice) -> u8 {
        unsafe { libusb_get_port_number(device.as_raw()) }
    }

    fn speed(&self, device: &LibusbDevice) -> Speed {
        Speed::from_libusb(unsafe { libusb_get_device_speed(device.as_raw()) })
    }

    fn max_packet_size(&self, device: &LibusbDevice, endpoint: u8) -> Result<usize> {
        check(unsafe { libusb_get_max_packet_size(device.as_raw(), endpoint) })
            .map(|size| size as usize)
    }

    fn max_iso_packet_size(&self, device: &LibusbDevice, endpoint: u8) -> Result<usize> {
        check(unsafe { libusb_get_max_iso_packet_size(device.as_raw(), endpoint) })
            .map(|size| size as usize)
    }

    fn open(&self, device: &LibusbDevice) -> Result<LibusbHandle> {
        let mut handle = MaybeUninit::<*mut libusb_device_handle>::uninit();

        try_unsafe!(libusb_open(device.as_raw(), handle.as_mut_ptr()));

        NonNull::new(unsafe { handle.assume_init() })
            .map(LibusbHandle)
            .ok_or_else(|| Error::new(ErrorKind::Other).with_detail("libusb_open returned no handle"))
    }

    fn claim_interface(&self, handle: &LibusbHandle, interface: u8) -> Result<()> {
        try_unsafe!(libusb_claim_interface(handle.as_raw(), c_int::from(interface)));
        Ok(())
    }

    fn release_interface(&self, handle: &LibusbHandle, interface: u8) -> Result<()> {
        try_unsafe!(libusb_release_interface(
            handle.as_raw(),
            c_int::from(interface)
        ));
        Ok(())
    }

    fn set_configuration(&self, handle: &LibusbHandle, configuration: Option<u8>) -> Result<()> {
        let value = configuration.map_or(-1, c_int::from);
        try_unsafe!(libusb_set_configuration(handle.as_raw(), value));
        Ok(())
    }

    fn set_interface_alt_setting(
        &self,
        handle: &LibusbHandle,
        interface: u8,
        setting: u8,
    ) -> Result<()> {
        try_unsafe!(libusb_set_interface_alt_setting(
            handle.as_raw(),
            c_int::from(interface),
            c_int::from(setting)
        ));
        Ok(())
    }

    fn clear_halt(&self, handle: &LibusbHandle, endpoint: u8) -> Result<()> {
        try_unsafe!(libusb_clear_halt(handle.as_raw(), endpoint));
        Ok(())
    }

    fn reset_device(&self, handle: &LibusbHandle) -> Result<()> {
        try_unsafe!(libusb_reset_device(handle.as_raw()));
        Ok(())
    }

    fn kernel_driver_active(&self, handle: &LibusbHandle, interface: u8) -> Result<bool> {
        match check(unsafe {
            libusb_kernel_driver_active(handle.as_raw(), c_int::from(interface))
        })? {
            0 => Ok(false),
            _ => Ok(true),
        }
    }

    fn detach_kernel_driver(&self, handle: &LibusbHandle, interface: u8) -> Result<()> {
        try_unsafe!(libusb_detach_kernel_driver(
            handle.as_raw(),
            c_int::from(interface)
        ));
        Ok(())
    }

    fn attach_kernel_driver(&self, handle: &LibusbHandle, interface: u8) -> Result<()> {
        try_unsafe!(libusb_attach_kernel_driver(
            handle.as_raw(),
            c_int::from(interface)
        ));
        Ok(())
    }

    fn set_auto_detach_kernel_driver(&self, handle: &LibusbHandle, enable: bool) -> Result<()> {
        try_unsafe!(libusb_set_auto_detach_kernel_driver(
            handle.as_raw(),
            c_int::from(enable)
        ));
        Ok(())
    }

    fn string_descriptor_ascii(&self, handle: &LibusbHandle, index: u8) -> Result<String> {
        let mut buf = [0u8; 256];

        let len = check(unsafe {
            libusb_get_string_descriptor_ascii(
                handle.as_raw(),
                index,
                buf.as_mut_ptr(),
                buf.len() as c_int,
            )
        })?;

        Ok(String::from_utf8_lossy(&buf[..len as usize]).into_owned())
    }

    fn bos_descriptor(&self, handle: &LibusbHandle) -> Result<Vec<u8>> {
        let mut bos = MaybeUninit::uninit();

        try_unsafe!(libusb_get_bos_descriptor(handle.as_raw(), bos.as_mut_ptr()));

        unsafe {
            let bos = bos.assume_init();
            let bytes = flatten_bos(bos);
            libusb_free_bos_descriptor(bos as _);
            Ok(bytes)
        }
    }

    fn alloc_streams(
        &self,
        handle: &LibusbHandle,
        num_streams: u32,
        endpoints: &[u8],
    ) -> Result<u32> {
        let (mut endpoints, count) = endpoint_list(endpoints)?;

        check(unsafe {
            libusb_alloc_streams(handle.as_raw(), num_streams, endpoints.as_mut_ptr(), count)
        })
        .map(|allocated| allocated as u32)
    }

    fn free_streams(&self, handle: &LibusbHandle, endpoints: &[u8]) -> Result<()> {
        let (mut endpoints, count) = endpoint_list(endpoints)?;

        try_unsafe!(libusb_free_streams(
            handle.as_raw(),
            endpoints.as_mut_ptr(),
            count
        ));
        Ok(())
    }

    fn alloc_transfer(&self, iso_packets: usize) -> Result<LibusbTransfer> {
        LibusbTransfer::alloc(iso_packets)
    }

    unsafe fn submit_transfer(
        &self,
        handle: &LibusbHandle,
        transfer: &mut LibusbTransfer,
        request: &SubmitRequest<'_>,
        sink: Arc<dyn CompletionSink>,
    ) -> Result<()> {
        transfer.submit(handle.as_raw(), request, sink)
    }

    fn cancel_transfer(&self, transfer: &LibusbTransfer) -> Result<()> {
        transfer.cancel()
    }

    fn register_hotplug(
        &self,
        filter: &HotplugFilter,
        sink: Arc<dyn HotplugSink<Self>>,
    ) -> Result<c_int> {
        let sink = Box::new(sink);
        let registration = unsafe { hotplug::register(self.as_raw(), filter, &sink)? };

        if lock(&self.hotplug).insert(registration, sink).is_some() {
            warn!("hotplug registration {} was reused", registration);
        }

        Ok(registration)
    }

    fn deregister_hotplug(&self, registration: c_int) {
        unsafe { libusb_hotplug_deregister_callback(self.as_raw(), registration) };

        let sink = lock(&self.hotplug).remove(&registration);
        drop(sink);
    }
}

// `libusb_bos_descriptor` as C lays it out: the capabilities are a trailing array of pointers,
// aligned for a pointer.
#[allow(non_snake_case)]
#[repr(C)]
struct NativeBos {
    bLength: u8,
    bDescriptorType: u8,
    wTotalLength: u16,
    bNumDeviceCaps: u8,
    dev_capability: [*mut libusb_bos_dev_capability_descriptor; 0],
}

/// Lays the parsed BOS descriptor back out as it travels on the wire.
///
/// # Safety
///
/// `bos` must point at a descriptor returned by `libusb_get_bos_descriptor`, or one laid out the
/// same way.
unsafe fn flatten_bos(bos: *const libusb_bos_descriptor) -> Vec<u8> {
    let bos = bos.cast::<NativeBos>();
    let length = (*bos).bLength;
    let num_caps = (*bos).bNumDeviceCaps;

    let mut bytes = vec![length, (*bos).bDescriptorType];
    bytes.extend_from_slice(&(*bos).wTotalLength.to_le_bytes());
    bytes.push(num_caps);
    bytes.resize(usize::from(length).max(bytes.len()), 0);

    let capabilities = slice::from_raw_parts(
        ptr::addr_of!((*bos).dev_capability).cast::<*mut libusb_bos_dev_capability_descriptor>(),
        usize::from(num_caps),
    );

    for &capability in capabilities {
        let Some(capability) = NonNull::new(capability) else {
            continue;
        };
        let capability = capability.as_ptr();

        let length = usize::from((*capability).bLength);
        bytes.extend_from_slice(&[
            (*capability).bLength,
            (*capability).bDescriptorType,
            (*capability).bDevCapabilityType,
        ]);

        let data = ptr::addr_of!((*capability).dev_capability_data).cast::<u8>();
        bytes.extend_from_slice(slice::from_raw_parts(data, length.saturating_sub(3)));
    }

    bytes
}

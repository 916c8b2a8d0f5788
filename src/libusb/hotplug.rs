use std::{
    ffi::{c_int, c_void},
    panic::{self, AssertUnwindSafe},
    ptr::NonNull,
    sync::Arc,
};

use libusb1_sys::{constants::*, *};
use tracing::error;

use super::{Libusb, LibusbDevice};
use crate::{
    error,
    hotplug::{HotplugEvent, HotplugFilter},
    transport::HotplugSink,
    Result,
};

/// Registers `sink` for the devices matching `filter`.
///
/// With enumeration on, the already attached devices are reported before this returns.
///
/// # Safety
///
/// `sink` must stay at its address until the registration is deregistered.
pub(super) unsafe fn register(
    context: *mut libusb_context,
    filter: &HotplugFilter,
    sink: &Arc<dyn HotplugSink<Libusb>>,
) -> Result<c_int> {
    let mut events = 0;
    if filter.arrived {
        events |= LIBUSB_HOTPLUG_EVENT_DEVICE_ARRIVED;
    }
    if filter.left {
        events |= LIBUSB_HOTPLUG_EVENT_DEVICE_LEFT;
    }

    let flags = if filter.enumerate {
        LIBUSB_HOTPLUG_ENUMERATE
    } else {
        LIBUSB_HOTPLUG_NO_FLAGS
    };

    let user_data = sink as *const Arc<dyn HotplugSink<Libusb>> as *mut c_void;
    let mut handle: libusb_hotplug_callback_handle = 0;

    let code = libusb_hotplug_register_callback(
        context,
        events,
        flags,
        filter
            .vendor_id
            .map(c_int::from)
            .unwrap_or(LIBUSB_HOTPLUG_MATCH_ANY),
        filter
            .product_id
            .map(c_int::from)
            .unwrap_or(LIBUSB_HOTPLUG_MATCH_ANY),
        filter
            .class
            .map(c_int::from)
            .unwrap_or(LIBUSB_HOTPLUG_MATCH_ANY),
        hotplug_callback,
        user_data,
        &mut handle,
    );

    if code < 0 {
        Err(error::from_libusb(code))
    } else {
        Ok(handle)
    }
}

extern "system" fn hotplug_callback(
    _context: *mut libusb_context,
    device: *mut libusb_device,
    event: libusb_hotplug_event,
    user_data: *mut c_void,
) -> c_int {
    let event = match event {
        LIBUSB_HOTPLUG_EVENT_DEVICE_ARRIVED => HotplugEvent::Arrived,
        LIBUSB_HOTPLUG_EVENT_DEVICE_LEFT => HotplugEvent::Left,
        _ => return 0,
    };
    let Some(device) = NonNull::new(device) else {
        return 0;
    };

    let result = panic::catch_unwind(AssertUnwindSafe(|| unsafe {
        // Deregistering from inside the sink frees the box `user_data` points at.
        let sink = Arc::clone(&*user_data.cast::<Arc<dyn HotplugSink<Libusb>>>());
        sink.notify(LibusbDevice::from_borrowed(device), event);
    }));

    if result.is_err() {
        error!("hotplug handler panicked");
    }

    // Deregistration is driven by the registration handle, never by the return value.
    0
}

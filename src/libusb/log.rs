use std::ffi::{c_char, c_int, c_void, CStr};

use libusb1_sys::{constants::*, *};
use tracing::{debug, error, info, warn};

use crate::options::LogLevel;

/// Forwards the messages of `context` to `tracing`.
pub(super) fn install(context: *mut libusb_context) {
    unsafe { libusb_set_log_cb(context, Some(log_callback), LIBUSB_LOG_CB_CONTEXT) };
}

extern "system" fn log_callback(_context: *mut libusb_context, level: c_int, text: *mut c_void) {
    if text.is_null() {
        return;
    }

    let message = unsafe { CStr::from_ptr(text.cast::<c_char>()) }.to_string_lossy();
    let message = message.trim_end();

    match LogLevel::from_c_int(level) {
        LogLevel::Error => error!(target: "usbkit::libusb", "{}", message),
        LogLevel::Warning => warn!(target: "usbkit::libusb", "{}", message),
        LogLevel::Info => info!(target: "usbkit::libusb", "{}", message),
        LogLevel::Debug => debug!(target: "usbkit::libusb", "{}", message),
        LogLevel::None => {}
    }
}

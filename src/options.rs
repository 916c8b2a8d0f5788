use libc::c_int;
use libusb1_sys::constants::*;

// Named `LIBUSB_OPTION_WEAK_AUTHORITY` in older headers.
const OPTION_NO_DEVICE_DISCOVERY: u32 = 0x02;

/// Verbosity of the native library's own log output.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LogLevel {
    /// No messages are ever emitted by the library.
    None,

    /// Error messages are emitted.
    Error,

    /// Warning and error messages are emitted.
    Warning,

    /// Informational, warning, and error messages are emitted.
    Info,

    /// All messages are emitted.
    Debug,
}

impl LogLevel {
    pub(crate) fn as_c_int(self) -> c_int {
        match self {
            LogLevel::None => LIBUSB_LOG_LEVEL_NONE,
            LogLevel::Error => LIBUSB_LOG_LEVEL_ERROR,
            LogLevel::Warning => LIBUSB_LOG_LEVEL_WARNING,
            LogLevel::Info => LIBUSB_LOG_LEVEL_INFO,
            LogLevel::Debug => LIBUSB_LOG_LEVEL_DEBUG,
        }
    }

    pub(crate) fn from_c_int(value: c_int) -> LogLevel {
        match value {
            LIBUSB_LOG_LEVEL_ERROR => LogLevel::Error,
            LIBUSB_LOG_LEVEL_WARNING => LogLevel::Warning,
            LIBUSB_LOG_LEVEL_INFO => LogLevel::Info,
            LIBUSB_LOG_LEVEL_DEBUG => LogLevel::Debug,
            LIBUSB_LOG_LEVEL_NONE | _ => LogLevel::None,
        }
    }
}

/// A `libusb` runtime option that can be set on a context.
///
/// Each option carries exactly the arguments it needs, so an option can't be given the wrong
/// number of arguments. Options the running library doesn't know fail with
/// [`ErrorKind::NotSupported`](crate::ErrorKind::NotSupported).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct UsbOption {
    inner: OptionInner,
}

impl UsbOption {
    /// Sets the verbosity of the native library.
    ///
    /// Native messages are forwarded to `tracing` under the `usbkit::libusb` target.
    pub fn log_level(level: LogLevel) -> Self {
        Self {
            inner: OptionInner::LogLevel(level),
        }
    }

    /// Use the [UsbDk] backend if available.
    ///
    /// **Note**: This method is available on **Windows** only!
    ///
    /// [UsbDk]: https://github.com/daynix/UsbDk
    #[cfg(windows)]
    pub fn use_usbdk() -> Self {
        Self {
            inner: OptionInner::UseUsbdk,
        }
    }

    /// Skips device scanning during initialisation.
    ///
    /// Only useful on platforms where devices are wrapped from file descriptors; the device list
    /// of such a context stays empty.
    pub fn no_device_discovery() -> Self {
        Self {
            inner: OptionInner::NoDeviceDiscovery,
        }
    }

    pub(crate) fn inner(&self) -> OptionInner {
        self.inner
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum OptionInner {
    LogLevel(LogLevel),
    #[cfg_attr(not(windows), allow(dead_code))] // only constructed on Windows
    UseUsbdk,
    NoDeviceDiscovery,
}

impl OptionInner {
    pub(crate) fn code(self) -> u32 {
        match self {
            OptionInner::LogLevel(_) => LIBUSB_OPTION_LOG_LEVEL,
            OptionInner::UseUsbdk => LIBUSB_OPTION_USE_USBDK,
            OptionInner::NoDeviceDiscovery => OPTION_NO_DEVICE_DISCOVERY,
        }
    }
}

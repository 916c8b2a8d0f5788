use std::fmt;

use libc::c_int;
use libusb1_sys::constants::*;

/// A result of a function that may return an [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Kinds of errors reported by the native library and by this crate.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, thiserror::Error)]
pub enum ErrorKind {
    /// Input/output error.
    #[error("Input/Output Error")]
    Io,

    /// Invalid parameter.
    #[error("Invalid parameter")]
    InvalidParam,

    /// Access denied (insufficient permissions).
    #[error("Access denied (insufficient permissions)")]
    Access,

    /// No such device (it may have been disconnected).
    #[error("No such device (it may have been disconnected)")]
    NoDevice,

    /// Entity not found.
    #[error("Entity not found")]
    NotFound,

    /// Resource busy.
    #[error("Resource busy")]
    Busy,

    /// Operation timed out.
    #[error("Operation timed out")]
    Timeout,

    /// Overflow.
    #[error("Overflow")]
    Overflow,

    /// Pipe error (the endpoint stalled).
    #[error("Pipe error")]
    Pipe,

    /// System call interrupted (perhaps due to signal).
    #[error("System call interrupted (perhaps due to signal)")]
    Interrupted,

    /// Insufficient memory.
    #[error("Insufficient memory")]
    NoMem,

    /// Operation not supported or unimplemented on this platform.
    #[error("Operation not supported or unimplemented on this platform")]
    NotSupported,

    /// Other error.
    #[error("Other error")]
    Other,

    /// A request was built from an invalid combination of arguments.
    #[error("Invalid argument")]
    InvalidArgument,

    /// The context was torn down while devices, handles or transfers still referenced it.
    #[error("Context still referenced")]
    RemainingReferences,
}

impl ErrorKind {
    /// Returns the native `libusb` error code for this kind, if it has one.
    pub fn code(self) -> Option<c_int> {
        let code = match self {
            ErrorKind::Io => LIBUSB_ERROR_IO,
            ErrorKind::InvalidParam => LIBUSB_ERROR_INVALID_PARAM,
            ErrorKind::Access => LIBUSB_ERROR_ACCESS,
            ErrorKind::NoDevice => LIBUSB_ERROR_NO_DEVICE,
            ErrorKind::NotFound => LIBUSB_ERROR_NOT_FOUND,
            ErrorKind::Busy => LIBUSB_ERROR_BUSY,
            ErrorKind::Timeout => LIBUSB_ERROR_TIMEOUT,
            ErrorKind::Overflow => LIBUSB_ERROR_OVERFLOW,
            ErrorKind::Pipe => LIBUSB_ERROR_PIPE,
            ErrorKind::Interrupted => LIBUSB_ERROR_INTERRUPTED,
            ErrorKind::NoMem => LIBUSB_ERROR_NO_MEM,
            ErrorKind::NotSupported => LIBUSB_ERROR_NOT_SUPPORTED,
            ErrorKind::Other => LIBUSB_ERROR_OTHER,
            ErrorKind::InvalidArgument | ErrorKind::RemainingReferences => return None,
        };
        Some(code)
    }
}

/// Data moved over the bus before a transfer finished.
///
/// Outgoing transfers report how many bytes were sent, incoming transfers hand back the bytes
/// that were received.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Transferred {
    Sent(usize),
    Received(Vec<u8>),
}

impl Transferred {
    /// Number of bytes moved in either direction.
    pub fn len(&self) -> usize {
        match self {
            Transferred::Sent(n) => *n,
            Transferred::Received(data) => data.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Error returned by every fallible operation of this crate.
///
/// Transfer failures carry whatever had already been transferred when the transfer ended, so a
/// timeout on a partially completed write is not silent data loss.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{kind}{}", Detail(.detail))]
pub struct Error {
    kind: ErrorKind,
    detail: Option<String>,
    transferred: Option<Transferred>,
}

struct Detail<'a>(&'a Option<String>);

impl fmt::Display for Detail<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(detail) => write!(f, ": {}", detail),
            None => Ok(()),
        }
    }
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Error {
            kind,
            detail: None,
            transferred: None,
        }
    }

    /// An error for a request built from an invalid combination of arguments.
    pub fn invalid_argument(detail: impl Into<String>) -> Self {
        Error::new(ErrorKind::InvalidArgument).with_detail(detail)
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_transferred(mut self, transferred: Transferred) -> Self {
        self.transferred = Some(transferred);
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }

    /// Returns what had been transferred before the failure, when the error came from a transfer.
    pub fn transferred(&self) -> Option<&Transferred> {
        self.transferred.as_ref()
    }

    pub fn into_transferred(self) -> Option<Transferred> {
        self.transferred
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error::new(kind)
    }
}

#[doc(hidden)]
pub(crate) fn from_libusb(err: c_int) -> Error {
    let kind = match err {
        LIBUSB_ERROR_IO => ErrorKind::Io,
        LIBUSB_ERROR_INVALID_PARAM => ErrorKind::InvalidParam,
        LIBUSB_ERROR_ACCESS => ErrorKind::Access,
        LIBUSB_ERROR_NO_DEVICE => ErrorKind::NoDevice,
        LIBUSB_ERROR_NOT_FOUND => ErrorKind::NotFound,
        LIBUSB_ERROR_BUSY => ErrorKind::Busy,
        LIBUSB_ERROR_TIMEOUT => ErrorKind::Timeout,
        LIBUSB_ERROR_OVERFLOW => ErrorKind::Overflow,
        LIBUSB_ERROR_PIPE => ErrorKind::Pipe,
        LIBUSB_ERROR_INTERRUPTED => ErrorKind::Interrupted,
        LIBUSB_ERROR_NO_MEM => ErrorKind::NoMem,
        LIBUSB_ERROR_NOT_SUPPORTED => ErrorKind::NotSupported,
        LIBUSB_ERROR_OTHER | _ => ErrorKind::Other,
    };
    Error::new(kind)
}

#[doc(hidden)]
macro_rules! try_unsafe {
    ($x:expr) => {
        match unsafe { $x } {
            0 => (),
            err => return Err($crate::error::from_libusb(err)),
        }
    };
}

use libc::c_int;
use libusb1_sys::constants::*;

/// Device speeds. Indicates the speed at which a device is operating.
/// - [libusb_supported_speed](http://libusb.sourceforge.net/api-1.0/group__libusb__dev.html#ga1454797ecc0de4d084c1619c420014f6)
/// - [USB release versions](https://en.wikipedia.org/wiki/USB#Release_versions)
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Speed {
    /// The operating system doesn't know the device speed.
    Unknown,

    /// The device is operating at low speed (1.5 Mbps).
    Low,

    /// The device is operating at full speed (12 Mbps).
    Full,

    /// The device is operating at high speed (480 Mbps).
    High,

    /// The device is operating at super speed (5 Gbps).
    Super,

    /// The device is operating at super speed (10 Gbps).
    SuperPlus,
}

impl Speed {
    pub(crate) fn from_libusb(n: c_int) -> Speed {
        match n {
            LIBUSB_SPEED_SUPER_PLUS => Speed::SuperPlus,
            LIBUSB_SPEED_SUPER => Speed::Super,
            LIBUSB_SPEED_HIGH => Speed::High,
            LIBUSB_SPEED_FULL => Speed::Full,
            LIBUSB_SPEED_LOW => Speed::Low,
            LIBUSB_SPEED_UNKNOWN | _ => Speed::Unknown,
        }
    }
}

/// Transfer and endpoint directions.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Direction for read (device to host) transfers.
    In,

    /// Direction for write (host to device) transfers.
    Out,
}

impl Direction {
    /// Direction encoded in bit 7 of an endpoint address or a `bmRequestType` value.
    pub fn from_address(address: u8) -> Direction {
        match address & LIBUSB_ENDPOINT_DIR_MASK {
            LIBUSB_ENDPOINT_OUT => Direction::Out,
            LIBUSB_ENDPOINT_IN | _ => Direction::In,
        }
    }
}

/// An endpoint's transfer type.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TransferType {
    /// Control endpoint.
    Control,

    /// Isochronous endpoint.
    Isochronous,

    /// Bulk endpoint.
    Bulk,

    /// Interrupt endpoint.
    Interrupt,

    /// Bulk endpoint addressed through a stream id (USB 3.0).
    BulkStream,
}

impl TransferType {
    /// Decodes bits 0..1 of an endpoint's `bmAttributes`.
    ///
    /// Endpoint descriptors cannot describe bulk streams, so this never returns
    /// [`TransferType::BulkStream`].
    pub fn from_attributes(attributes: u8) -> TransferType {
        match attributes & LIBUSB_TRANSFER_TYPE_MASK {
            LIBUSB_TRANSFER_TYPE_CONTROL => TransferType::Control,
            LIBUSB_TRANSFER_TYPE_ISOCHRONOUS => TransferType::Isochronous,
            LIBUSB_TRANSFER_TYPE_BULK => TransferType::Bulk,
            LIBUSB_TRANSFER_TYPE_INTERRUPT | _ => TransferType::Interrupt,
        }
    }

    pub(crate) fn as_libusb(self) -> u8 {
        match self {
            TransferType::Control => LIBUSB_TRANSFER_TYPE_CONTROL,
            TransferType::Isochronous => LIBUSB_TRANSFER_TYPE_ISOCHRONOUS,
            TransferType::Bulk => LIBUSB_TRANSFER_TYPE_BULK,
            TransferType::Interrupt => LIBUSB_TRANSFER_TYPE_INTERRUPT,
            TransferType::BulkStream => LIBUSB_TRANSFER_TYPE_BULK_STREAM,
        }
    }
}

/// Isochronous synchronization mode.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum SyncType {
    /// No synchronisation.
    NoSync,

    /// Asynchronous.
    Asynchronous,

    /// Adaptive.
    Adaptive,

    /// Synchronous.
    Synchronous,
}

impl SyncType {
    pub(crate) fn from_attributes(attributes: u8) -> SyncType {
        match (attributes & LIBUSB_ISO_SYNC_TYPE_MASK) >> 2 {
            LIBUSB_ISO_SYNC_TYPE_NONE => SyncType::NoSync,
            LIBUSB_ISO_SYNC_TYPE_ASYNC => SyncType::Asynchronous,
            LIBUSB_ISO_SYNC_TYPE_ADAPTIVE => SyncType::Adaptive,
            LIBUSB_ISO_SYNC_TYPE_SYNC | _ => SyncType::Synchronous,
        }
    }
}

/// Isochronous usage type.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum UsageType {
    /// Data endpoint.
    Data,

    /// Feedback endpoint.
    Feedback,

    /// Explicit feedback data endpoint.
    FeedbackData,

    /// Reserved.
    Reserved,
}

impl UsageType {
    pub(crate) fn from_attributes(attributes: u8) -> UsageType {
        match (attributes & LIBUSB_ISO_USAGE_TYPE_MASK) >> 4 {
            LIBUSB_ISO_USAGE_TYPE_DATA => UsageType::Data,
            LIBUSB_ISO_USAGE_TYPE_FEEDBACK => UsageType::Feedback,
            LIBUSB_ISO_USAGE_TYPE_IMPLICIT => UsageType::FeedbackData,
            _ => UsageType::Reserved,
        }
    }
}

/// Types of control transfers.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum RequestType {
    /// Requests that are defined by the USB standard.
    Standard,

    /// Requests that are defined by a device class, e.g., HID.
    Class,

    /// Vendor-specific requests.
    Vendor,

    /// Reserved for future use.
    Reserved,
}

/// Recipients of control transfers.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Recipient {
    /// The recipient is a device.
    Device,

    /// The recipient is an interface.
    Interface,

    /// The recipient is an endpoint.
    Endpoint,

    /// Other.
    Other,
}

/// A three-part version consisting of major, minor, and sub minor components.
///
/// This can be used to represent versions of the format `J.M.N`, where `J` is the major version,
/// `M` is the minor version, and `N` is the sub minor version. A version is constructed by
/// providing the fields in the same order to the tuple. For example:
///
/// ```
/// usbkit::Version(0, 2, 1);
/// ```
///
/// represents the version 0.2.1.
///
/// The intended use case of `Version` is to extract meaning from the version fields in USB
/// descriptors, such as `bcdUSB` and `bcdDevice` in device descriptors.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Version(pub u8, pub u8, pub u8);

impl Version {
    /// Extracts a version from a binary coded decimal (BCD) field. BCD fields exist in USB
    /// descriptors as 16-bit integers encoding a version as `0xJJMN`, where `JJ` is the major
    /// version, `M` is the minor version, and `N` is the sub minor version. For example, 2.0 is
    /// encoded as `0x0200` and 1.1 is encoded as `0x0110`.
    pub fn from_bcd(mut raw: u16) -> Self {
        let sub_minor: u8 = (raw & 0x000F) as u8;
        raw >>= 4;

        let minor: u8 = (raw & 0x000F) as u8;
        raw >>= 4;

        let mut major: u8 = (raw & 0x000F) as u8;
        raw >>= 4;

        major += (10 * raw) as u8;

        Version(major, minor, sub_minor)
    }

    /// Returns the major version.
    pub fn major(self) -> u8 {
        let Version(major, _, _) = self;
        major
    }

    /// Returns the minor version.
    pub fn minor(self) -> u8 {
        let Version(_, minor, _) = self;
        minor
    }

    /// Returns the sub minor version.
    pub fn sub_minor(self) -> u8 {
        let Version(_, _, sub_minor) = self;
        sub_minor
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major(), self.minor(), self.sub_minor())
    }
}

/// Builds a value for the `bmRequestType` field of a control transfer setup packet.
///
/// The `bmRequestType` field of a USB control transfer setup packet is a bit field specifying
/// three parameters, which are given to this function by corresponding enum values.
///
/// ## Examples
///
/// The following example returns a `bmRequestType` value for a standard inbound transfer from the
/// device, which could be used for reading a device's descriptors:
///
/// ```
/// use usbkit::{Direction, RequestType, Recipient};
///
/// assert_eq!(0x80, usbkit::request_type(Direction::In, RequestType::Standard, Recipient::Device));
/// ```
pub const fn request_type(
    direction: Direction,
    request_type: RequestType,
    recipient: Recipient,
) -> u8 {
    let mut value: u8 = match direction {
        Direction::Out => LIBUSB_ENDPOINT_OUT,
        Direction::In => LIBUSB_ENDPOINT_IN,
    };

    value |= match request_type {
        RequestType::Standard => LIBUSB_REQUEST_TYPE_STANDARD,
        RequestType::Class => LIBUSB_REQUEST_TYPE_CLASS,
        RequestType::Vendor => LIBUSB_REQUEST_TYPE_VENDOR,
        RequestType::Reserved => LIBUSB_REQUEST_TYPE_RESERVED,
    };

    value |= match recipient {
        Recipient::Device => LIBUSB_RECIPIENT_DEVICE,
        Recipient::Interface => LIBUSB_RECIPIENT_INTERFACE,
        Recipient::Endpoint => LIBUSB_RECIPIENT_ENDPOINT,
        Recipient::Other => LIBUSB_RECIPIENT_OTHER,
    };

    value
}

use super::{Transfer, TransferKind};
use crate::{
    constants::{CONTROL_SETUP_SIZE, ENDPOINT_DIR_MASK},
    device_handle::DeviceHandle,
    fields::TransferType,
    libusb::Libusb,
    transport::Transport,
    Error, Result,
};

/// Marker for control transfers.
pub enum Control {}

impl TransferKind for Control {
    const TRANSFER_TYPE: TransferType = TransferType::Control;
}

/// A control transfer on the default endpoint.
///
/// The buffer holds the 8 byte setup packet followed by the data stage, so
/// [`actual_buffer`](Transfer::actual_buffer) skips the first 8 bytes.
pub type ControlTransfer<T = Libusb> = Transfer<Control, T>;

/// Encodes a setup packet: `bmRequestType`, `bRequest`, then `wValue`, `wIndex` and `wLength`
/// in little endian.
///
/// ```
/// assert_eq!(
///     [0x80, 0x06, 0x00, 0x01, 0x00, 0x00, 0x12, 0x00],
///     usbkit::setup_packet(0x80, 0x06, 0x0100, 0, 18),
/// );
/// ```
pub fn setup_packet(request_type: u8, request: u8, value: u16, index: u16, length: u16) -> [u8; 8] {
    let value = value.to_le_bytes();
    let index = index.to_le_bytes();
    let length = length.to_le_bytes();
    [
        request_type,
        request,
        value[0],
        value[1],
        index[0],
        index[1],
        length[0],
        length[1],
    ]
}

fn data_length(len: usize) -> Result<u16> {
    u16::try_from(len).map_err(|_| {
        Error::invalid_argument(format!("{} bytes exceed the control data stage", len))
    })
}

impl<T: Transport> Transfer<Control, T> {
    pub fn new(handle: &DeviceHandle<T>) -> Result<Self> {
        Self::with_packets(handle, 0)
    }

    /// Prepares a host-to-device request sending `data`.
    pub fn set_out_request(
        &mut self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        data: &[u8],
    ) -> Result<()> {
        if request_type & ENDPOINT_DIR_MASK != 0 {
            return Err(Error::invalid_argument("OUT request with the IN direction bit"));
        }

        let setup = setup_packet(request_type, request, value, index, data_length(data.len())?);
        let mut buffer = Vec::with_capacity(CONTROL_SETUP_SIZE + data.len());
        buffer.extend_from_slice(&setup);
        buffer.extend_from_slice(data);
        self.set_buffer(&buffer)
    }

    /// Prepares a device-to-host request receiving up to `length` bytes.
    pub fn set_in_request(
        &mut self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        length: u16,
    ) -> Result<()> {
        if request_type & ENDPOINT_DIR_MASK == 0 {
            return Err(Error::invalid_argument("IN request without the IN direction bit"));
        }

        let setup = setup_packet(request_type, request, value, index, length);
        self.alloc_buffer(CONTROL_SETUP_SIZE + usize::from(length), Some(&setup))
    }

    /// The setup packet at the start of the buffer.
    pub fn setup(&self) -> Option<[u8; 8]> {
        self.buffer().get(..CONTROL_SETUP_SIZE)?.try_into().ok()
    }
}

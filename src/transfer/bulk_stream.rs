use super::{Transfer, TransferKind};
use crate::{device_handle::DeviceHandle, fields::TransferType, libusb::Libusb, transport::Transport, Result};

/// Marker for bulk transfers on a USB 3.0 stream.
pub enum BulkStream {}

impl TransferKind for BulkStream {
    const TRANSFER_TYPE: TransferType = TransferType::BulkStream;
}

/// A bulk transfer on one of the streams set up with
/// [`DeviceHandle::alloc_streams`](crate::DeviceHandle::alloc_streams).
pub type BulkStreamTransfer<T = Libusb> = Transfer<BulkStream, T>;

impl<T: Transport> Transfer<BulkStream, T> {
    pub fn new(handle: &DeviceHandle<T>, stream_id: u32) -> Result<Self> {
        let mut transfer = Self::with_packets(handle, 0)?;
        transfer.raw.set_stream_id(stream_id);
        Ok(transfer)
    }

    pub fn stream_id(&self) -> u32 {
        self.raw.stream_id()
    }

    pub fn set_stream_id(&mut self, stream_id: u32) -> &mut Self {
        self.raw.set_stream_id(stream_id);
        self
    }
}

use super::{Transfer, TransferKind};
use crate::{device_handle::DeviceHandle, fields::TransferType, libusb::Libusb, transport::Transport, Result};

/// Marker for bulk transfers.
pub enum Bulk {}

impl TransferKind for Bulk {
    const TRANSFER_TYPE: TransferType = TransferType::Bulk;
}

pub type BulkTransfer<T = Libusb> = Transfer<Bulk, T>;

impl<T: Transport> Transfer<Bulk, T> {
    pub fn new(handle: &DeviceHandle<T>) -> Result<Self> {
        Self::with_packets(handle, 0)
    }
}

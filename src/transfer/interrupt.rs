use super::{Transfer, TransferKind};
use crate::{device_handle::DeviceHandle, fields::TransferType, libusb::Libusb, transport::Transport, Result};

/// Marker for interrupt transfers.
pub enum Interrupt {}

impl TransferKind for Interrupt {
    const TRANSFER_TYPE: TransferType = TransferType::Interrupt;
}

pub type InterruptTransfer<T = Libusb> = Transfer<Interrupt, T>;

impl<T: Transport> Transfer<Interrupt, T> {
    pub fn new(handle: &DeviceHandle<T>) -> Result<Self> {
        Self::with_packets(handle, 0)
    }
}

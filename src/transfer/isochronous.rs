use super::{Transfer, TransferKind};
use crate::{
    device_handle::DeviceHandle, fields::TransferType, libusb::Libusb, transport::IsoPacket,
    transport::Transport, Result,
};

/// Marker for isochronous transfers.
pub enum Isochronous {}

impl TransferKind for Isochronous {
    const TRANSFER_TYPE: TransferType = TransferType::Isochronous;
}

/// An isochronous transfer.
///
/// The buffer is split into packets laid out back to back by their lengths. Each packet
/// completes on its own, so [`actual_length`](Transfer::actual_length) of the whole transfer
/// means nothing; look at [`packets`](Transfer::packets) instead.
pub type IsochronousTransfer<T = Libusb> = Transfer<Isochronous, T>;

impl<T: Transport> Transfer<Isochronous, T> {
    /// Allocates a transfer for up to `num_packets` packets.
    pub fn new(handle: &DeviceHandle<T>, num_packets: usize) -> Result<Self> {
        Self::with_packets(handle, num_packets)
    }

    pub fn num_packets(&self) -> usize {
        self.raw.num_packets()
    }

    /// Uses fewer packets than allocated. Growing beyond the allocation fails with
    /// [`InvalidArgument`](crate::ErrorKind::InvalidArgument).
    pub fn set_num_packets(&mut self, num_packets: usize) -> Result<()> {
        self.raw.set_num_packets(num_packets)
    }

    pub fn set_packet_length(&mut self, index: usize, length: u32) -> Result<()> {
        self.raw.set_packet_length(index, length)
    }

    /// Gives every packet the same length.
    pub fn set_packet_lengths(&mut self, length: u32) -> Result<()> {
        self.raw.set_packet_lengths(length)
    }

    pub fn packets(&self) -> Vec<IsoPacket> {
        self.raw.packets()
    }

    pub fn packet(&self, index: usize) -> Option<IsoPacket> {
        self.raw.packets().get(index).copied()
    }

    /// The received bytes of packet `index`.
    pub fn packet_data(&self, index: usize) -> Option<&[u8]> {
        self.raw.packet_data(index)
    }
}

use std::{
    ffi::{c_int, c_uint, c_void},
    fmt,
    panic::{self, AssertUnwindSafe},
    ptr::{self, NonNull},
    slice,
    sync::Arc,
};

use libusb1_sys::{constants::*, *};
use tracing::error;

use crate::{
    error::{self, Error, ErrorKind},
    fields::TransferType,
    transfer::TransferStatus,
    transport::{CompletionReport, CompletionSink, IsoPacket, SubmitRequest},
    Result,
};

/// A native transfer slot. Dropping it frees the slot.
///
/// The sink of the last submission lives in the slot until the next submission replaces it,
/// because the native side hands it back to [`transfer_callback`] through `user_data`.
pub struct LibusbTransfer {
    raw: NonNull<libusb_transfer>,
    iso_packets: usize,
    sink: Option<Box<Arc<dyn CompletionSink>>>,
}

// Only touched by its owner, and by the event loop while submitted.
unsafe impl Send for LibusbTransfer {}

impl LibusbTransfer {
    pub(super) fn alloc(iso_packets: usize) -> Result<Self> {
        let count = c_int::try_from(iso_packets)
            .map_err(|_| Error::invalid_argument("too many isochronous packets"))?;

        let raw = NonNull::new(unsafe { libusb_alloc_transfer(count) })
            .ok_or_else(|| Error::new(ErrorKind::NoMem))?;

        Ok(LibusbTransfer {
            raw,
            iso_packets,
            sink: None,
        })
    }

    fn as_raw(&self) -> *mut libusb_transfer {
        self.raw.as_ptr()
    }

    pub(super) unsafe fn submit(
        &mut self,
        handle: *mut libusb_device_handle,
        request: &SubmitRequest<'_>,
        sink: Arc<dyn CompletionSink>,
    ) -> Result<()> {
        if request.packet_lengths.len() > self.iso_packets {
            return Err(Error::invalid_argument(format!(
                "{} packets do not fit a transfer allocated for {}",
                request.packet_lengths.len(),
                self.iso_packets
            )));
        }

        let length = c_int::try_from(request.length)
            .map_err(|_| Error::invalid_argument("buffer too large for a single transfer"))?;

        let sink = Box::new(sink);
        let user_data = ptr::addr_of!(*sink).cast_mut().cast::<c_void>();

        let transfer = &mut *self.as_raw();
        transfer.dev_handle = handle;
        transfer.flags = 0;
        if request.short_not_ok {
            transfer.flags |= LIBUSB_TRANSFER_SHORT_NOT_OK;
        }
        if request.add_zero_packet {
            transfer.flags |= LIBUSB_TRANSFER_ADD_ZERO_PACKET;
        }
        transfer.endpoint = request.endpoint;
        transfer.transfer_type = request.transfer_type.as_libusb();
        transfer.timeout = c_uint::try_from(request.timeout.as_millis()).unwrap_or(c_uint::MAX);
        transfer.buffer = request.buffer;
        transfer.length = length;
        transfer.actual_length = 0;
        transfer.callback = transfer_callback;
        transfer.user_data = user_data;
        transfer.num_iso_packets = request.packet_lengths.len() as c_int;

        let descriptors = self.descriptors_mut();
        for (descriptor, &length) in descriptors.iter_mut().zip(request.packet_lengths) {
            descriptor.length = length;
            descriptor.actual_length = 0;
            descriptor.status = LIBUSB_TRANSFER_COMPLETED;
        }

        if request.transfer_type == TransferType::BulkStream {
            libusb_transfer_set_stream_id(self.as_raw(), request.stream_id);
        }

        // The previous sink is not referenced by the native side any more.
        self.sink = Some(sink);

        match libusb_submit_transfer(self.as_raw()) {
            0 => Ok(()),
            code => {
                self.sink = None;
                Err(error::from_libusb(code))
            }
        }
    }

    pub(super) fn cancel(&self) -> Result<()> {
        try_unsafe!(libusb_cancel_transfer(self.as_raw()));
        Ok(())
    }

    unsafe fn descriptors_mut(&mut self) -> &mut [libusb_iso_packet_descriptor] {
        let transfer = self.as_raw();
        let count = (*transfer).num_iso_packets.max(0) as usize;
        let first = ptr::addr_of_mut!((*transfer).iso_packet_desc).cast::<libusb_iso_packet_descriptor>();
        slice::from_raw_parts_mut(first, count)
    }
}

impl Drop for LibusbTransfer {
    fn drop(&mut self) {
        unsafe { libusb_free_transfer(self.as_raw()) };
    }
}

impl fmt::Debug for LibusbTransfer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LibusbTransfer")
            .field("raw", &self.raw)
            .field("iso_packets", &self.iso_packets)
            .finish()
    }
}

unsafe fn report(transfer: *const libusb_transfer) -> CompletionReport {
    let count = (*transfer).num_iso_packets.max(0) as usize;
    let first = ptr::addr_of!((*transfer).iso_packet_desc).cast::<libusb_iso_packet_descriptor>();

    let packets = slice::from_raw_parts(first, count)
        .iter()
        .map(|descriptor| IsoPacket {
            length: descriptor.length,
            actual_length: descriptor.actual_length,
            status: Some(TransferStatus::from_libusb(descriptor.status)),
        })
        .collect();

    CompletionReport {
        status: TransferStatus::from_libusb((*transfer).status),
        actual_length: (*transfer).actual_length.max(0) as usize,
        packets,
    }
}

extern "system" fn transfer_callback(transfer: *mut libusb_transfer) {
    let result = panic::catch_unwind(AssertUnwindSafe(|| unsafe {
        // The sink may resubmit, which replaces the boxed sink `user_data` points at.
        let sink = Arc::clone(&*(*transfer).user_data.cast::<Arc<dyn CompletionSink>>());
        let report = report(transfer);
        sink.complete(report);
    }));

    if result.is_err() {
        error!("transfer completion handler panicked");
    }
}

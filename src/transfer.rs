//! Asynchronous transfers and the blocking adapter built on them.
//!
//! A transfer moves through `Idle -> Submitted -> Finished(status)` and may be changed and
//! submitted again once it finished. The buffer belongs to the transfer and is never handed out
//! or reallocated while the native layer may write into it.

mod bulk;
mod bulk_stream;
mod control;
mod interrupt;
mod isochronous;

use std::{
    fmt,
    marker::PhantomData,
    mem::{self, ManuallyDrop},
    slice,
    sync::{Arc, Mutex},
    time::Duration,
};

use libc::c_int;
use libusb1_sys::constants::*;
use tracing::{debug, trace, warn};

use crate::{
    constants::{CONTROL_SETUP_SIZE, ENDPOINT_DIR_MASK},
    context::Context,
    device_handle::DeviceHandle,
    error::{Error, ErrorKind, Result, Transferred},
    fields::TransferType,
    libusb::Libusb,
    lock,
    transport::{CompletionFlag, CompletionReport, CompletionSink, IsoPacket, SubmitRequest, Transport},
};

pub use self::{
    bulk::{Bulk, BulkTransfer},
    bulk_stream::{BulkStream, BulkStreamTransfer},
    control::{setup_packet, Control, ControlTransfer},
    interrupt::{Interrupt, InterruptTransfer},
    isochronous::{Isochronous, IsochronousTransfer},
};

/// Timeout of new transfers.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1000);

/// How a transfer ended.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TransferStatus {
    Completed,
    Error,
    Timeout,
    Cancelled,
    Stall,
    NoDevice,
    Overflow,
    Unknown,
}

impl TransferStatus {
    pub(crate) fn from_libusb(code: c_int) -> Self {
        match code {
            LIBUSB_TRANSFER_COMPLETED => TransferStatus::Completed,
            LIBUSB_TRANSFER_ERROR => TransferStatus::Error,
            LIBUSB_TRANSFER_TIMED_OUT => TransferStatus::Timeout,
            LIBUSB_TRANSFER_CANCELLED => TransferStatus::Cancelled,
            LIBUSB_TRANSFER_STALL => TransferStatus::Stall,
            LIBUSB_TRANSFER_NO_DEVICE => TransferStatus::NoDevice,
            LIBUSB_TRANSFER_OVERFLOW => TransferStatus::Overflow,
            _ => TransferStatus::Unknown,
        }
    }

    /// Returns the error kind a transfer that ended this way fails with, `None` when it
    /// completed.
    pub fn error_kind(self) -> Option<ErrorKind> {
        let kind = match self {
            TransferStatus::Completed => return None,
            TransferStatus::Error => ErrorKind::Io,
            TransferStatus::Timeout => ErrorKind::Timeout,
            TransferStatus::Cancelled => ErrorKind::Interrupted,
            TransferStatus::Stall => ErrorKind::Pipe,
            TransferStatus::NoDevice => ErrorKind::NoDevice,
            TransferStatus::Overflow => ErrorKind::Overflow,
            TransferStatus::Unknown => ErrorKind::Other,
        };
        Some(kind)
    }

    pub fn into_result(self) -> Result<()> {
        match self.error_kind() {
            None => Ok(()),
            Some(kind) => Err(Error::new(kind)),
        }
    }
}

/// Where a transfer is in its life cycle.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TransferState {
    /// Never submitted.
    Idle,
    /// Queued with the native layer; the completion has not been handled yet.
    Submitted,
    Finished(TransferStatus),
}

/// The outcome of a transfer, as seen by a completion callback.
pub struct Completion<'a> {
    status: TransferStatus,
    actual_length: usize,
    buffer: &'a [u8],
    offset: usize,
    packets: &'a [IsoPacket],
}

impl<'a> Completion<'a> {
    pub fn status(&self) -> TransferStatus {
        self.status
    }

    /// Bytes transferred, not counting a control transfer's setup packet.
    ///
    /// Meaningless for isochronous transfers; see [`packets`](Completion::packets).
    pub fn actual_length(&self) -> usize {
        self.actual_length
    }

    /// The whole buffer of the transfer.
    pub fn buffer(&self) -> &'a [u8] {
        self.buffer
    }

    /// The bytes that were transferred.
    pub fn actual_buffer(&self) -> &'a [u8] {
        clamp(self.buffer, self.offset, self.actual_length)
    }

    pub fn packets(&self) -> &'a [IsoPacket] {
        self.packets
    }

    /// The received bytes of isochronous packet `index`.
    pub fn packet_data(&self, index: usize) -> Option<&'a [u8]> {
        packet_data(self.buffer, self.packets, index)
    }
}

fn clamp(buffer: &[u8], offset: usize, length: usize) -> &[u8] {
    let start = offset.min(buffer.len());
    let end = offset.saturating_add(length).min(buffer.len());
    &buffer[start..end]
}

fn packet_data<'a>(buffer: &'a [u8], packets: &[IsoPacket], index: usize) -> Option<&'a [u8]> {
    let packet = packets.get(index)?;
    let offset: usize = packets[..index].iter().map(|p| p.length as usize).sum();
    Some(clamp(buffer, offset, packet.actual_length as usize))
}

type Callback = Box<dyn FnMut(&Completion<'_>) + Send>;

/// The buffer region the native layer writes into while a transfer is in flight.
#[derive(Copy, Clone)]
struct BufferView {
    ptr: *const u8,
    len: usize,
}

// The view is only dereferenced by the completion, which runs while the owning transfer is
// `Submitted` and therefore neither reads nor writes its buffer.
unsafe impl Send for BufferView {}

struct Progress {
    state: TransferState,
    actual_length: usize,
    packets: Vec<IsoPacket>,
    view: BufferView,
    offset: usize,
}

/// State shared between a transfer and the native completion callback.
struct Shared {
    flag: CompletionFlag,
    progress: Mutex<Progress>,
    callback: Mutex<Option<Callback>>,
}

impl CompletionSink for Shared {
    fn complete(&self, report: CompletionReport) {
        let (view, offset) = {
            let mut progress = lock(&self.progress);
            progress.actual_length = report.actual_length;
            if !report.packets.is_empty() {
                progress.packets = report.packets.clone();
            }
            (progress.view, progress.offset)
        };
        trace!(status = ?report.status, actual_length = report.actual_length, "transfer completed");

        let callback = lock(&self.callback).take();
        if let Some(mut callback) = callback {
            let buffer = unsafe { slice::from_raw_parts(view.ptr, view.len) };
            let packets = lock(&self.progress).packets.clone();
            callback(&Completion {
                status: report.status,
                actual_length: report.actual_length,
                buffer,
                offset,
                packets: &packets,
            });
            lock(&self.callback).get_or_insert(callback);
        }

        lock(&self.progress).state = TransferState::Finished(report.status);
        self.flag.set_completed();
    }
}

/// The untyped transfer behind every typed transfer and the per-handle convenience calls.
pub(crate) struct RawTransfer<T: Transport> {
    context: Context<T>,
    native: ManuallyDrop<T::Transfer>,
    shared: Arc<Shared>,
    transfer_type: TransferType,
    endpoint: u8,
    timeout: Duration,
    short_not_ok: bool,
    add_zero_packet: bool,
    buffer: Vec<u8>,
    length: usize,
    packet_lengths: Vec<u32>,
    num_packets: usize,
    stream_id: u32,
}

impl<T: Transport> RawTransfer<T> {
    pub(crate) fn new(context: Context<T>, transfer_type: TransferType, iso_packets: usize) -> Result<Self> {
        let native = context.transport().alloc_transfer(iso_packets)?;
        let offset = match transfer_type {
            TransferType::Control => CONTROL_SETUP_SIZE,
            _ => 0,
        };

        Ok(RawTransfer {
            context,
            native: ManuallyDrop::new(native),
            shared: Arc::new(Shared {
                flag: CompletionFlag::new(),
                progress: Mutex::new(Progress {
                    state: TransferState::Idle,
                    actual_length: 0,
                    packets: Vec::new(),
                    view: BufferView {
                        ptr: std::ptr::null(),
                        len: 0,
                    },
                    offset,
                }),
                callback: Mutex::new(None),
            }),
            transfer_type,
            endpoint: 0,
            timeout: DEFAULT_TIMEOUT,
            short_not_ok: false,
            add_zero_packet: false,
            buffer: Vec::new(),
            length: 0,
            packet_lengths: vec![0; iso_packets],
            num_packets: iso_packets,
            stream_id: 0,
        })
    }

    pub(crate) fn transfer_type(&self) -> TransferType {
        self.transfer_type
    }

    pub(crate) fn endpoint(&self) -> u8 {
        self.endpoint
    }

    pub(crate) fn set_endpoint(&mut self, endpoint: u8) {
        self.endpoint = endpoint;
    }

    pub(crate) fn timeout(&self) -> Duration {
        self.timeout
    }

    pub(crate) fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub(crate) fn set_short_not_ok(&mut self, enable: bool) {
        self.short_not_ok = enable;
    }

    pub(crate) fn set_add_zero_packet(&mut self, enable: bool) {
        self.add_zero_packet = enable;
    }

    pub(crate) fn stream_id(&self) -> u32 {
        self.stream_id
    }

    pub(crate) fn set_stream_id(&mut self, stream_id: u32) {
        self.stream_id = stream_id;
    }

    pub(crate) fn state(&self) -> TransferState {
        lock(&self.shared.progress).state
    }

    pub(crate) fn is_submitted(&self) -> bool {
        self.state() == TransferState::Submitted
    }

    pub(crate) fn status(&self) -> Option<TransferStatus> {
        match self.state() {
            TransferState::Finished(status) => Some(status),
            _ => None,
        }
    }

    fn ensure_idle(&self) -> Result<()> {
        match self.is_submitted() {
            true => Err(Error::new(ErrorKind::Busy).with_detail("transfer is in flight")),
            false => Ok(()),
        }
    }

    /// Grows the buffer to `len` bytes. A larger buffer is kept as is.
    fn reserve(&mut self, len: usize) {
        if self.buffer.len() < len {
            self.buffer = vec![0; len];
        }
    }

    /// Copies `data` into the buffer and makes it the transfer's payload.
    pub(crate) fn set_buffer(&mut self, data: &[u8]) -> Result<()> {
        self.ensure_idle()?;
        self.reserve(data.len());
        self.buffer[..data.len()].copy_from_slice(data);
        self.length = data.len();
        Ok(())
    }

    /// Prepares a buffer of `len` bytes for receiving, starting with `initial`.
    pub(crate) fn alloc_buffer(&mut self, len: usize, initial: Option<&[u8]>) -> Result<()> {
        self.ensure_idle()?;
        let initial = initial.unwrap_or(&[]);
        if initial.len() > len {
            return Err(Error::invalid_argument(format!(
                "{} initial bytes don't fit into a buffer of {} bytes",
                initial.len(),
                len
            )));
        }

        self.reserve(len);
        self.buffer[..initial.len()].copy_from_slice(initial);
        self.buffer[initial.len()..len].fill(0);
        self.length = len;
        Ok(())
    }

    pub(crate) fn free_buffer(&mut self) -> Result<()> {
        self.ensure_idle()?;
        self.buffer = Vec::new();
        self.length = 0;
        Ok(())
    }

    /// The payload; empty while the transfer is in flight.
    pub(crate) fn buffer(&self) -> &[u8] {
        match self.is_submitted() {
            true => &[],
            false => &self.buffer[..self.length],
        }
    }

    pub(crate) fn length(&self) -> usize {
        self.length
    }

    pub(crate) fn capacity(&self) -> usize {
        self.buffer.len()
    }

    pub(crate) fn actual_length(&self) -> usize {
        lock(&self.shared.progress).actual_length
    }

    /// `actual_length` bytes of the payload, starting at `offset`.
    pub(crate) fn actual_buffer_at(&self, offset: usize) -> &[u8] {
        clamp(self.buffer(), offset, self.actual_length())
    }

    /// The transferred bytes, skipping the setup packet of control transfers.
    pub(crate) fn actual_buffer(&self) -> &[u8] {
        let offset = lock(&self.shared.progress).offset;
        self.actual_buffer_at(offset)
    }

    fn is_in(&self) -> bool {
        let direction = match self.transfer_type {
            TransferType::Control => self.buffer().first().copied().unwrap_or(0),
            _ => self.endpoint,
        };
        direction & ENDPOINT_DIR_MASK != 0
    }

    /// What moved over the bus in the last run.
    pub(crate) fn transferred(&self) -> Transferred {
        match self.is_in() {
            true => Transferred::Received(self.actual_buffer().to_vec()),
            false => Transferred::Sent(self.actual_length()),
        }
    }

    pub(crate) fn num_packets(&self) -> usize {
        self.num_packets
    }

    pub(crate) fn set_num_packets(&mut self, num_packets: usize) -> Result<()> {
        self.ensure_idle()?;
        if num_packets > self.packet_lengths.len() {
            return Err(Error::invalid_argument(format!(
                "transfer was allocated for {} packets, {} requested",
                self.packet_lengths.len(),
                num_packets
            )));
        }
        self.num_packets = num_packets;
        Ok(())
    }

    pub(crate) fn set_packet_length(&mut self, index: usize, length: u32) -> Result<()> {
        self.ensure_idle()?;
        match self.packet_lengths[..self.num_packets].get_mut(index) {
            Some(slot) => {
                *slot = length;
                Ok(())
            }
            None => Err(Error::invalid_argument(format!("no packet {}", index))),
        }
    }

    pub(crate) fn set_packet_lengths(&mut self, length: u32) -> Result<()> {
        self.ensure_idle()?;
        self.packet_lengths[..self.num_packets].fill(length);
        Ok(())
    }

    pub(crate) fn packets(&self) -> Vec<IsoPacket> {
        lock(&self.shared.progress).packets.clone()
    }

    pub(crate) fn packet_data(&self, index: usize) -> Option<&[u8]> {
        let packets = self.packets();
        packet_data(self.buffer(), &packets, index)
    }

    pub(crate) fn set_callback(&mut self, callback: Option<Callback>) {
        *lock(&self.shared.callback) = callback;
    }

    /// Queues the transfer. Fails with [`ErrorKind::Busy`] while it is still in flight.
    pub(crate) fn submit(&mut self, handle: &T::Handle) -> Result<()> {
        let previous = {
            let mut progress = lock(&self.shared.progress);
            if progress.state == TransferState::Submitted {
                return Err(Error::new(ErrorKind::Busy).with_detail("transfer is in flight"));
            }

            let packet_lengths = &self.packet_lengths[..self.num_packets];
            let iso_length: usize = packet_lengths.iter().map(|&l| l as usize).sum();
            if iso_length > self.length {
                return Err(Error::invalid_argument(format!(
                    "packets need {} bytes, the buffer holds {}",
                    iso_length, self.length
                )));
            }

            let previous = progress.state;
            progress.state = TransferState::Submitted;
            progress.actual_length = 0;
            progress.packets = packet_lengths
                .iter()
                .map(|&length| IsoPacket {
                    length,
                    ..IsoPacket::default()
                })
                .collect();
            progress.view = BufferView {
                ptr: self.buffer.as_ptr(),
                len: self.length,
            };
            previous
        };
        self.shared.flag.reset();

        let request = SubmitRequest {
            transfer_type: self.transfer_type,
            endpoint: self.endpoint,
            timeout: self.timeout,
            short_not_ok: self.short_not_ok,
            add_zero_packet: self.add_zero_packet,
            buffer: self.buffer.as_mut_ptr(),
            length: self.length,
            packet_lengths: &self.packet_lengths[..self.num_packets],
            stream_id: self.stream_id,
        };
        let sink: Arc<dyn CompletionSink> = self.shared.clone();
        trace!(endpoint = self.endpoint, length = self.length, transfer_type = ?self.transfer_type, "submitting transfer");

        // The buffer is neither read nor reallocated until the completion arrives, because every
        // accessor checks for the `Submitted` state first.
        let result = unsafe {
            self.context
                .transport()
                .submit_transfer(handle, &mut self.native, &request, sink)
        };

        if result.is_err() {
            lock(&self.shared.progress).state = previous;
        }
        result
    }

    /// Asks the native layer to cancel. The transfer finishes later with
    /// [`TransferStatus::Cancelled`], unless it completed in the meantime.
    pub(crate) fn cancel(&self) -> Result<()> {
        if !self.is_submitted() {
            return Err(Error::new(ErrorKind::NotFound).with_detail("transfer is not in flight"));
        }
        self.context.transport().cancel_transfer(&self.native)
    }

    /// Handles events until the transfer finished. Returns at once unless it is in flight.
    ///
    /// Interrupted event handling is retried. Any other failure cancels the transfer and keeps
    /// handling events until the cancellation arrived, then reports that first failure. Later
    /// failures during the drain are not reported.
    pub(crate) fn wait(&self) -> Result<()> {
        if !self.is_submitted() {
            return Ok(());
        }

        let mut failure: Option<Error> = None;

        while !self.shared.flag.is_completed() {
            let err = match self.context.handle_events(None, Some(&self.shared.flag)) {
                Ok(()) => continue,
                Err(err) => err,
            };

            if failure.is_some() || err.kind() == ErrorKind::Interrupted {
                continue;
            }

            warn!(%err, endpoint = self.endpoint, "event handling failed, cancelling transfer");
            if let Err(cancel_err) = self.cancel() {
                debug!(err = %cancel_err, "cancellation after failed event handling");
            }
            failure = Some(err);
        }

        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Submits and blocks until the transfer finished, without running the user callback.
    pub(crate) fn submit_and_wait(&mut self, handle: &T::Handle) -> Result<TransferStatus> {
        let callback = lock(&self.shared.callback).take();
        let result = self.submit(handle).and_then(|()| self.wait());
        *lock(&self.shared.callback) = callback;

        result?;
        Ok(self.status().unwrap_or(TransferStatus::Unknown))
    }

    /// Like [`submit_and_wait`](Self::submit_and_wait), but fails unless the transfer completed.
    /// The error carries what was transferred before the failure.
    pub(crate) fn submit_and_wait_checked(&mut self, handle: &T::Handle) -> Result<Transferred> {
        let status = self.submit_and_wait(handle)?;
        match status.error_kind() {
            None => Ok(self.transferred()),
            Some(kind) => Err(Error::new(kind).with_transferred(self.transferred())),
        }
    }

    /// Cancels an in-flight transfer and waits for the cancellation. Returns `false` if the event
    /// loop failed before the completion arrived.
    fn drain(&self) -> bool {
        if let Err(err) = self.cancel() {
            debug!(%err, "cancelling dropped transfer");
        }

        while !self.shared.flag.is_completed() {
            match self.context.handle_events(None, Some(&self.shared.flag)) {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::Interrupted => {}
                Err(err) => {
                    warn!(%err, "event handling failed while draining a dropped transfer");
                    return false;
                }
            }
        }
        true
    }
}

impl<T: Transport> Drop for RawTransfer<T> {
    fn drop(&mut self) {
        if self.is_submitted() {
            warn!(endpoint = self.endpoint, "dropping a transfer in flight, cancelling it");
            if !self.drain() {
                // The native layer may still write into the buffer, so neither may be freed.
                warn!(endpoint = self.endpoint, "leaking the transfer and its buffer");
                mem::forget(mem::take(&mut self.buffer));
                return;
            }
        }
        unsafe { ManuallyDrop::drop(&mut self.native) };
    }
}

/// Transfer kinds.
pub trait TransferKind: Send + 'static {
    const TRANSFER_TYPE: TransferType;
}

/// A reusable transfer on an open device.
///
/// The kind parameter selects the transfer type, see the aliases [`BulkTransfer`],
/// [`InterruptTransfer`], [`ControlTransfer`], [`IsochronousTransfer`] and
/// [`BulkStreamTransfer`]. The transfer keeps its device handle open.
pub struct Transfer<K: TransferKind, T: Transport = Libusb> {
    // Drains before the handle it was submitted on can close.
    raw: RawTransfer<T>,
    handle: DeviceHandle<T>,
    kind: PhantomData<K>,
}

impl<K: TransferKind, T: Transport> Transfer<K, T> {
    pub(crate) fn with_packets(handle: &DeviceHandle<T>, iso_packets: usize) -> Result<Self> {
        let raw = RawTransfer::new(handle.context().clone(), K::TRANSFER_TYPE, iso_packets)?;
        Ok(Transfer {
            raw,
            handle: handle.clone(),
            kind: PhantomData,
        })
    }

    pub fn handle(&self) -> &DeviceHandle<T> {
        &self.handle
    }

    pub fn transfer_type(&self) -> TransferType {
        self.raw.transfer_type()
    }

    pub fn endpoint(&self) -> u8 {
        self.raw.endpoint()
    }

    pub fn set_endpoint(&mut self, endpoint: impl crate::AsEndpointAddress) -> &mut Self {
        self.raw.set_endpoint(endpoint.as_endpoint_address());
        self
    }

    pub fn timeout(&self) -> Duration {
        self.raw.timeout()
    }

    /// Sets the timeout; zero waits forever.
    pub fn set_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.raw.set_timeout(timeout);
        self
    }

    /// Reports a short read as [`TransferStatus::Error`].
    pub fn set_short_not_ok(&mut self, enable: bool) -> &mut Self {
        self.raw.set_short_not_ok(enable);
        self
    }

    /// Terminates an OUT transfer that is a multiple of the packet size with a zero length packet.
    pub fn set_add_zero_packet(&mut self, enable: bool) -> &mut Self {
        self.raw.set_add_zero_packet(enable);
        self
    }

    /// Copies `data` into the transfer's buffer.
    ///
    /// The buffer is only reallocated when it is smaller than `data`.
    pub fn set_buffer(&mut self, data: &[u8]) -> Result<()> {
        self.raw.set_buffer(data)
    }

    /// Prepares a buffer of `len` bytes to receive into, starting with `initial`.
    pub fn alloc_buffer(&mut self, len: usize, initial: Option<&[u8]>) -> Result<()> {
        self.raw.alloc_buffer(len, initial)
    }

    pub fn free_buffer(&mut self) -> Result<()> {
        self.raw.free_buffer()
    }

    /// The payload, or nothing while the transfer is in flight.
    pub fn buffer(&self) -> &[u8] {
        self.raw.buffer()
    }

    pub fn length(&self) -> usize {
        self.raw.length()
    }

    /// Size of the allocated buffer, which may exceed [`length`](Self::length).
    pub fn capacity(&self) -> usize {
        self.raw.capacity()
    }

    pub fn actual_length(&self) -> usize {
        self.raw.actual_length()
    }

    /// The bytes moved by the last run.
    pub fn actual_buffer(&self) -> &[u8] {
        self.raw.actual_buffer()
    }

    /// [`actual_length`](Self::actual_length) bytes of the buffer, starting at `offset`.
    pub fn actual_buffer_at(&self, offset: usize) -> &[u8] {
        self.raw.actual_buffer_at(offset)
    }

    pub fn transferred(&self) -> Transferred {
        self.raw.transferred()
    }

    pub fn state(&self) -> TransferState {
        self.raw.state()
    }

    /// How the last run ended; `None` before the first completion and while in flight.
    pub fn status(&self) -> Option<TransferStatus> {
        self.raw.status()
    }

    /// Runs `callback` on every completion, from the thread handling events.
    ///
    /// The blocking [`submit_and_wait`](Self::submit_and_wait) doesn't run it.
    pub fn set_callback<F>(&mut self, callback: F)
    where
        F: FnMut(&Completion<'_>) + Send + 'static,
    {
        self.raw.set_callback(Some(Box::new(callback)));
    }

    pub fn clear_callback(&mut self) {
        self.raw.set_callback(None);
    }

    /// Queues the transfer and returns immediately.
    pub fn submit(&mut self) -> Result<()> {
        self.raw.submit(self.handle.native())
    }

    /// Requests cancellation; the transfer finishes with [`TransferStatus::Cancelled`] once the
    /// event loop reaped it.
    pub fn cancel(&self) -> Result<()> {
        self.raw.cancel()
    }

    /// Handles events until the submitted transfer finished. An idle or finished transfer
    /// returns immediately.
    pub fn wait(&self) -> Result<()> {
        self.raw.wait()
    }

    /// Submits and waits for the transfer to finish, whatever its status.
    pub fn submit_and_wait(&mut self) -> Result<TransferStatus> {
        self.raw.submit_and_wait(self.handle.native())
    }

    /// Submits and waits, failing unless the transfer completed.
    ///
    /// A timed out or stalled transfer fails with [`ErrorKind::Timeout`] or [`ErrorKind::Pipe`];
    /// the error carries whatever had been transferred.
    pub fn submit_and_wait_checked(&mut self) -> Result<Transferred> {
        self.raw.submit_and_wait_checked(self.handle.native())
    }
}

impl<K: TransferKind, T: Transport> fmt::Debug for Transfer<K, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transfer")
            .field("transfer_type", &self.transfer_type())
            .field("endpoint", &format_args!("{:#04x}", self.endpoint()))
            .field("length", &self.length())
            .field("state", &self.state())
            .finish()
    }
}

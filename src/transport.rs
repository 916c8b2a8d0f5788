//! The native layer underneath a [`Context`](crate::Context).
//!
//! Everything that actually talks to the operating system goes through [`Transport`]. The rest of
//! the crate builds the descriptor graph, the transfer state machine and the event dispatch on
//! top of it. [`Libusb`](crate::Libusb) is the implementation used in practice.

use std::{
    fmt,
    sync::{
        atomic::{AtomicI32, Ordering},
        Arc,
    },
    time::Duration,
};

use libc::c_int;

use crate::{
    config_descriptor::ConfigDescriptor, context::Pollfd, device_descriptor::DeviceDescriptor,
    fields::Speed, fields::TransferType, hotplug::HotplugEvent, hotplug::HotplugFilter,
    options::UsbOption, transfer::TransferStatus, Result,
};

/// Optional features of the native layer.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Capability {
    /// The capability query itself is available.
    HasCapability,
    /// Hotplug notifications are supported on this platform.
    HasHotplug,
    /// HID devices can be accessed without detaching the kernel driver.
    HasHidAccess,
    /// Kernel drivers can be detached from interfaces.
    SupportsDetachKernelDriver,
}

/// A shared flag a blocking waiter polls while the event loop completes a transfer.
///
/// The native event loop reads the flag through [`as_ptr`](CompletionFlag::as_ptr) so that a
/// completion reaped by another thread wakes the waiter instead of leaving it blocked.
#[derive(Default)]
pub struct CompletionFlag(AtomicI32);

impl CompletionFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_completed(&self) -> bool {
        self.0.load(Ordering::SeqCst) != 0
    }

    pub fn set_completed(&self) {
        self.0.store(1, Ordering::SeqCst);
    }

    pub fn reset(&self) {
        self.0.store(0, Ordering::SeqCst);
    }

    pub fn as_ptr(&self) -> *mut c_int {
        self.0.as_ptr()
    }
}

impl fmt::Debug for CompletionFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CompletionFlag")
            .field(&self.is_completed())
            .finish()
    }
}

/// Length and outcome of one packet of an isochronous transfer.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct IsoPacket {
    pub length: u32,
    pub actual_length: u32,
    pub status: Option<TransferStatus>,
}

/// Everything the native layer needs to queue one transfer.
pub struct SubmitRequest<'a> {
    pub transfer_type: TransferType,
    pub endpoint: u8,
    pub timeout: Duration,
    pub short_not_ok: bool,
    pub add_zero_packet: bool,
    pub buffer: *mut u8,
    pub length: usize,
    pub packet_lengths: &'a [u32],
    pub stream_id: u32,
}

/// What the native layer reports once a transfer left its queue.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompletionReport {
    pub status: TransferStatus,
    pub actual_length: usize,
    pub packets: Vec<IsoPacket>,
}

/// Receives the completion of one submitted transfer.
pub trait CompletionSink: Send + Sync {
    fn complete(&self, report: CompletionReport);
}

/// Receives changes of the native event sources.
pub trait PollfdSink: Send + Sync {
    fn added(&self, pollfd: Pollfd);
    fn removed(&self, fd: c_int);
}

/// Receives hotplug notifications for one registration.
pub trait HotplugSink<T: Transport>: Send + Sync {
    fn notify(&self, device: T::Device, event: HotplugEvent);
}

/// The native session underneath a context.
///
/// Completions and hotplug notifications are delivered only from inside
/// [`handle_events`](Transport::handle_events) on the calling thread, plus the hotplug
/// enumeration pass that runs inside [`register_hotplug`](Transport::register_hotplug).
/// Implementations must allow several threads to handle events concurrently.
pub trait Transport: Send + Sync + Sized + 'static {
    /// A counted reference to an enumerated device.
    type Device: Clone + Send + Sync + 'static;
    /// An open device; dropping it closes the device.
    type Handle: Send + Sync + 'static;
    /// A native transfer slot; dropping it frees the slot.
    type Transfer: Send + 'static;
    /// Identifies one hotplug registration.
    type Registration: Copy + Send + Sync + fmt::Debug + 'static;

    fn set_option(&self, option: &UsbOption) -> Result<()>;
    fn has_capability(&self, capability: Capability) -> bool;

    /// Handles pending events. `None` blocks until something happens; the call returns early
    /// once `completed` is set.
    fn handle_events(
        &self,
        timeout: Option<Duration>,
        completed: Option<&CompletionFlag>,
    ) -> Result<()>;

    fn pollfds(&self) -> Option<Vec<Pollfd>>;
    fn next_timeout(&self) -> Result<Option<Duration>>;
    fn set_pollfd_notifiers(&self, sink: Option<Arc<dyn PollfdSink>>);

    fn devices(&self) -> Result<Vec<Self::Device>>;
    fn device_descriptor(&self, device: &Self::Device) -> Result<DeviceDescriptor>;
    fn config_descriptor(&self, device: &Self::Device, index: u8) -> Result<ConfigDescriptor>;
    fn bus_number(&self, device: &Self::Device) -> u8;
    fn address(&self, device: &Self::Device) -> u8;
    fn port_number(&self, device: &Self::Device) -> u8;
    fn speed(&self, device: &Self::Device) -> Speed;
    fn max_packet_size(&self, device: &Self::Device, endpoint: u8) -> Result<usize>;
    fn max_iso_packet_size(&self, device: &Self::Device, endpoint: u8) -> Result<usize>;

    fn open(&self, device: &Self::Device) -> Result<Self::Handle>;
    fn claim_interface(&self, handle: &Self::Handle, interface: u8) -> Result<()>;
    fn release_interface(&self, handle: &Self::Handle, interface: u8) -> Result<()>;
    /// `None` puts the device into the unconfigured state.
    fn set_configuration(&self, handle: &Self::Handle, configuration: Option<u8>) -> Result<()>;
    fn set_interface_alt_setting(
        &self,
        handle: &Self::Handle,
        interface: u8,
        setting: u8,
    ) -> Result<()>;
    fn clear_halt(&self, handle: &Self::Handle, endpoint: u8) -> Result<()>;
    fn reset_device(&self, handle: &Self::Handle) -> Result<()>;
    fn kernel_driver_active(&self, handle: &Self::Handle, interface: u8) -> Result<bool>;
    fn detach_kernel_driver(&self, handle: &Self::Handle, interface: u8) -> Result<()>;
    fn attach_kernel_driver(&self, handle: &Self::Handle, interface: u8) -> Result<()>;
    fn set_auto_detach_kernel_driver(&self, handle: &Self::Handle, enable: bool) -> Result<()>;
    fn string_descriptor_ascii(&self, handle: &Self::Handle, index: u8) -> Result<String>;
    /// The raw BOS descriptor followed by its capability descriptors.
    fn bos_descriptor(&self, handle: &Self::Handle) -> Result<Vec<u8>>;
    fn alloc_streams(&self, handle: &Self::Handle, num_streams: u32, endpoints: &[u8])
        -> Result<u32>;
    fn free_streams(&self, handle: &Self::Handle, endpoints: &[u8]) -> Result<()>;

    fn alloc_transfer(&self, iso_packets: usize) -> Result<Self::Transfer>;

    /// Queues a transfer.
    ///
    /// # Safety
    ///
    /// `request.buffer` must stay valid for `request.length` bytes and must not be accessed
    /// until `sink` has been called.
    unsafe fn submit_transfer(
        &self,
        handle: &Self::Handle,
        transfer: &mut Self::Transfer,
        request: &SubmitRequest<'_>,
        sink: Arc<dyn CompletionSink>,
    ) -> Result<()>;

    /// Asks for cancellation. The transfer completes later with
    /// [`TransferStatus::Cancelled`].
    fn cancel_transfer(&self, transfer: &Self::Transfer) -> Result<()>;

    fn register_hotplug(
        &self,
        filter: &HotplugFilter,
        sink: Arc<dyn HotplugSink<Self>>,
    ) -> Result<Self::Registration>;
    fn deregister_hotplug(&self, registration: Self::Registration);
}

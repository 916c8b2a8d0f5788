//! An in-memory [`Transport`] for unit tests.
//!
//! Transfers complete from inside `handle_events` according to scripted [`Outcome`]s, hotplug
//! events are queued by [`MockTransport::plug`] and [`MockTransport::unplug`]. Callbacks are
//! always run outside the mock's own lock, so they may call back into the transport.

use std::{
    collections::{HashMap, VecDeque},
    slice,
    sync::{Arc, Mutex},
    time::Duration,
};

use libc::c_int;

use crate::{
    config_descriptor::ConfigDescriptor,
    context::Pollfd,
    device_descriptor::{self, DeviceDescriptor},
    endpoint_descriptor::EndpointDescriptor,
    error::{Error, ErrorKind, Result},
    fields::{Speed, TransferType},
    hotplug::{HotplugEvent, HotplugFilter},
    interface_descriptor::InterfaceDescriptor,
    lock,
    options::UsbOption,
    transfer::TransferStatus,
    transport::{
        Capability, CompletionFlag, CompletionReport, CompletionSink, HotplugSink, IsoPacket,
        PollfdSink, SubmitRequest, Transport,
    },
};

pub use std::ptr;

macro_rules! merge {
    ($default:expr => $($field:ident : $value:expr),*) => {
        {
            #[allow(unused_mut)]
            let mut x = $default;
            $( x.$field = $value; )*

            x
        }
    }
}

#[macro_export]
macro_rules! endpoint_descriptor {
    ($($key:ident : $value:expr),*) => {
        merge!(
            ::libusb1_sys::libusb_endpoint_descriptor {
                bLength:          7,
                bDescriptorType:  0x05,
                bEndpointAddress: 0x00,
                bmAttributes:     0x00,
                wMaxPacketSize:   16,
                bInterval:        1,
                bRefresh:         1,
                bSynchAddress:    0,
                extra:            $crate::test_helpers::ptr::null(),
                extra_length:     0
            } => $($key: $value),*
        )
    }
}

#[macro_export]
macro_rules! interface_descriptor {
    ($($key:ident : $value:expr),*) => {
        merge!(
            ::libusb1_sys::libusb_interface_descriptor {
                bLength:            9,
                bDescriptorType:    0x04,
                bInterfaceNumber:   0,
                bAlternateSetting:  0,
                bNumEndpoints:      0,
                bInterfaceClass:    0,
                bInterfaceSubClass: 0,
                bInterfaceProtocol: 0,
                iInterface:         0,
                endpoint:           $crate::test_helpers::ptr::null(),
                extra:              $crate::test_helpers::ptr::null(),
                extra_length:       0
            } => $($key: $value),*
        )
    };
    ($($endpoint:expr),+) => {
        {
            let endpoints = vec![$($endpoint),+];

            let r = ::libusb1_sys::libusb_interface_descriptor {
                bLength:            9,
                bDescriptorType:    0x04,
                bInterfaceNumber:   0,
                bAlternateSetting:  0,
                bNumEndpoints:      endpoints.len() as u8,
                bInterfaceClass:    0,
                bInterfaceSubClass: 0,
                bInterfaceProtocol: 0,
                iInterface:         0,
                endpoint:           (&endpoints[..]).as_ptr(),
                extra:              $crate::test_helpers::ptr::null(),
                extra_length:       0
            };

            // leak the Vec so the returned pointer remains valid
            ::std::mem::forget(endpoints);
            r
        }
    }
}

#[macro_export]
macro_rules! interface {
    ($($descriptor:expr),*) => {
        {
            let descriptors = vec![$($descriptor),*];

            let r = ::libusb1_sys::libusb_interface {
                altsetting:     descriptors.as_ptr(),
                num_altsetting: descriptors.len() as ::libc::c_int
            };

            // leak the Vec so the returned pointer remains valid
            ::std::mem::forget(descriptors);
            r
        }
    }
}

#[macro_export]
macro_rules! config_descriptor {
    ($($key:ident : $value:expr),*) => {
        merge!(
            ::libusb1_sys::libusb_config_descriptor {
                bLength:             9,
                bDescriptorType:     0x02,
                wTotalLength:        9,
                bNumInterfaces:      0,
                bConfigurationValue: 0,
                iConfiguration:      0,
                bmAttributes:        0x00,
                bMaxPower:           10,
                interface:           $crate::test_helpers::ptr::null(),
                extra:               $crate::test_helpers::ptr::null(),
                extra_length:        0
            } => $($key: $value),*
        )
    };
    ($($interface:expr),+) => {
        {
            let interfaces = vec![$($interface),+];

            let r = ::libusb1_sys::libusb_config_descriptor {
                bLength:             9,
                bDescriptorType:     0x02,
                wTotalLength:        9,
                bNumInterfaces:      interfaces.len() as u8,
                bConfigurationValue: 0,
                iConfiguration:      0,
                bmAttributes:        0x00,
                bMaxPower:           10,
                interface:           (&interfaces[..]).as_ptr(),
                extra:               $crate::test_helpers::ptr::null(),
                extra_length:        0
            };

            // leak the Vec so the returned pointer remains valid
            ::std::mem::forget(interfaces);
            r
        }
    }
}

#[macro_export]
macro_rules! device_descriptor {
    ($($key:ident : $value:expr),*) => {
        merge!(
            ::libusb1_sys::libusb_device_descriptor {
                bLength:            18,
                bDescriptorType:    0x01,
                bcdUSB:             0x0110,
                bDeviceClass:       0,
                bDeviceSubClass:    0,
                bDeviceProtocol:    0,
                bMaxPacketSize0:    16,
                idVendor:           0x1234,
                idProduct:          0x5678,
                bcdDevice:          0x0123,
                iManufacturer:      0,
                iProduct:           0,
                iSerialNumber:      0,
                bNumConfigurations: 1
            } => $($key: $value),*
        )
    }
}

/// Configuration 1 of a USB stick: one SCSI bulk-only interface with bulk endpoints `0x81` and
/// `0x02`.
pub fn mass_storage_config() -> ConfigDescriptor {
    ConfigDescriptor::new(1, 0x80, 50).with_interface([(
        InterfaceDescriptor::new(0, 0, 0x08, 0x06, 0x50),
        vec![
            EndpointDescriptor::new(0x81, 0x02, 512, 0),
            EndpointDescriptor::new(0x02, 0x02, 512, 0),
        ],
    )])
}

/// A device attached to a [`MockTransport`].
#[derive(Debug)]
pub struct MockDevice {
    bus_number: u8,
    address: u8,
    port_number: u8,
    speed: Speed,
    descriptor: DeviceDescriptor,
    configs: Vec<ConfigDescriptor>,
    strings: HashMap<u8, String>,
    bos: Option<Vec<u8>>,
}

impl MockDevice {
    pub fn new(
        bus_number: u8,
        address: u8,
        descriptor: libusb1_sys::libusb_device_descriptor,
    ) -> Self {
        MockDevice {
            bus_number,
            address,
            port_number: address,
            speed: Speed::High,
            descriptor: device_descriptor::from_libusb(&descriptor),
            configs: Vec::new(),
            strings: HashMap::new(),
            bos: None,
        }
    }

    pub fn with_config(mut self, config: ConfigDescriptor) -> Self {
        self.configs.push(config);
        self
    }

    pub fn with_string(mut self, index: u8, value: &str) -> Self {
        self.strings.insert(index, value.to_owned());
        self
    }

    pub fn with_speed(mut self, speed: Speed) -> Self {
        self.speed = speed;
        self
    }

    pub fn with_bos(mut self, bos: Vec<u8>) -> Self {
        self.bos = Some(bos);
        self
    }

    fn endpoint(&self, address: u8) -> Option<&EndpointDescriptor> {
        self.configs
            .first()?
            .endpoints()
            .iter()
            .find(|e| e.address() == address)
    }
}

/// How the next submitted transfer ends.
#[derive(Clone, Debug)]
pub struct Outcome {
    status: TransferStatus,
    data: Vec<u8>,
    sent: Option<usize>,
    packets: Vec<(Vec<u8>, TransferStatus)>,
    delay: usize,
    pending: bool,
}

impl Outcome {
    /// Completes, delivering `data` to an incoming transfer.
    pub fn completed(data: &[u8]) -> Self {
        Outcome {
            status: TransferStatus::Completed,
            data: data.to_vec(),
            sent: None,
            packets: Vec::new(),
            delay: 0,
            pending: false,
        }
    }

    /// Completes after sending `n` bytes.
    pub fn sent(n: usize) -> Self {
        Outcome {
            sent: Some(n),
            ..Outcome::completed(&[])
        }
    }

    pub fn status(status: TransferStatus) -> Self {
        Outcome::completed(&[]).with_status(status)
    }

    /// Completes an isochronous transfer with one entry per packet.
    pub fn packets(packets: &[(&[u8], TransferStatus)]) -> Self {
        Outcome {
            packets: packets.iter().map(|(d, s)| (d.to_vec(), *s)).collect(),
            ..Outcome::completed(&[])
        }
    }

    /// Never completes unless cancelled.
    pub fn pending() -> Self {
        Outcome {
            pending: true,
            ..Outcome::completed(&[])
        }
    }

    pub fn with_status(mut self, status: TransferStatus) -> Self {
        self.status = status;
        self
    }

    /// Lets `n` successful event handling calls pass before completing.
    pub fn deferred(mut self, n: usize) -> Self {
        self.delay = n;
        self
    }

    fn cancelled() -> Self {
        Outcome::status(TransferStatus::Cancelled)
    }
}

/// An open [`MockDevice`].
#[derive(Debug)]
pub struct MockHandle {
    id: u64,
    device: Arc<MockDevice>,
    lifecycle: Arc<Mutex<Vec<String>>>,
}

impl Drop for MockHandle {
    fn drop(&mut self) {
        lock(&self.lifecycle).push("close".to_owned());
    }
}

/// A transfer slot of the mock.
#[derive(Debug)]
pub struct MockTransfer {
    id: u64,
}

struct Buffer(*mut u8);

// The pointer is only written from `handle_events` while the owning transfer is submitted.
unsafe impl Send for Buffer {}

struct InFlight {
    id: u64,
    outcome: Outcome,
    sink: Arc<dyn CompletionSink>,
    buffer: Buffer,
    length: usize,
    offset: usize,
    packet_lengths: Vec<u32>,
}

impl InFlight {
    fn finish(self) {
        let outcome = &self.outcome;
        let mut report = CompletionReport {
            status: outcome.status,
            actual_length: 0,
            packets: Vec::new(),
        };

        if self.packet_lengths.is_empty() {
            let room = self.length.saturating_sub(self.offset);
            let n = outcome.data.len().min(room);
            self.write(self.offset, &outcome.data[..n]);
            report.actual_length = outcome.sent.unwrap_or(n);
        } else {
            let mut at = 0;
            for (i, &length) in self.packet_lengths.iter().enumerate() {
                let (data, status) = match outcome.packets.get(i) {
                    Some((data, status)) => (&data[..], *status),
                    None => (&[][..], outcome.status),
                };
                let n = data.len().min(length as usize);
                self.write(at, &data[..n]);
                report.packets.push(IsoPacket {
                    length,
                    actual_length: n as u32,
                    status: Some(status),
                });
                at += length as usize;
            }
        }

        self.sink.complete(report);
    }

    fn write(&self, at: usize, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        unsafe { ptr::copy_nonoverlapping(data.as_ptr(), self.buffer.0.add(at), data.len()) };
    }
}

struct Registration {
    id: u64,
    filter: HotplugFilter,
    sink: Arc<dyn HotplugSink<MockTransport>>,
}

struct State {
    next_id: u64,
    devices: Vec<Arc<MockDevice>>,
    hotplug_events: VecDeque<(Arc<MockDevice>, HotplugEvent)>,
    registrations: Vec<Registration>,
    pollfd_sink: Option<Arc<dyn PollfdSink>>,
    pollfds: Option<Vec<Pollfd>>,
    next_timeout: Option<Duration>,
    event_failures: VecDeque<ErrorKind>,
    submit_failures: VecDeque<ErrorKind>,
    open_failure: Option<ErrorKind>,
    config_failure: Option<ErrorKind>,
    outcomes: VecDeque<Outcome>,
    in_flight: Vec<InFlight>,
    claimed: HashMap<u64, Vec<u8>>,
    calls: Vec<String>,
    submitted: Vec<(u8, Vec<u8>)>,
    written: Vec<(u8, Vec<u8>)>,
    last_submitted_type: Option<TransferType>,
    last_stream_id: Option<u32>,
    opens: usize,
    handle_events_calls: usize,
    cancellations: usize,
    allocated_transfers: usize,
}

/// A scripted native layer.
pub struct MockTransport {
    state: Mutex<State>,
    lifecycle: Arc<Mutex<Vec<String>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        MockTransport {
            state: Mutex::new(State {
                next_id: 1,
                devices: Vec::new(),
                hotplug_events: VecDeque::new(),
                registrations: Vec::new(),
                pollfd_sink: None,
                pollfds: None,
                next_timeout: None,
                event_failures: VecDeque::new(),
                submit_failures: VecDeque::new(),
                open_failure: None,
                config_failure: None,
                outcomes: VecDeque::new(),
                in_flight: Vec::new(),
                claimed: HashMap::new(),
                calls: Vec::new(),
                submitted: Vec::new(),
                written: Vec::new(),
                last_submitted_type: None,
                last_stream_id: None,
                opens: 0,
                handle_events_calls: 0,
                cancellations: 0,
                allocated_transfers: 0,
            }),
            lifecycle: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn next_id(state: &mut State) -> u64 {
        let id = state.next_id;
        state.next_id += 1;
        id
    }

    /// Attaches a device without a hotplug event.
    pub fn attach(&self, device: MockDevice) {
        lock(&self.state).devices.push(Arc::new(device));
    }

    /// Attaches a device and queues its arrival.
    pub fn plug(&self, device: MockDevice) {
        let device = Arc::new(device);
        let mut state = lock(&self.state);
        state.devices.push(device.clone());
        state.hotplug_events.push_back((device, HotplugEvent::Arrived));
    }

    /// Detaches a device and queues its departure.
    pub fn unplug(&self, bus_number: u8, address: u8) {
        let mut state = lock(&self.state);
        let position = state
            .devices
            .iter()
            .position(|d| d.bus_number == bus_number && d.address == address);
        if let Some(position) = position {
            let device = state.devices.remove(position);
            state.hotplug_events.push_back((device, HotplugEvent::Left));
        }
    }

    pub fn push_outcome(&self, outcome: Outcome) {
        lock(&self.state).outcomes.push_back(outcome);
    }

    /// Makes the next `handle_events` call fail before handling anything.
    pub fn fail_next_event(&self, kind: ErrorKind) {
        lock(&self.state).event_failures.push_back(kind);
    }

    pub fn fail_next_submit(&self, kind: ErrorKind) {
        lock(&self.state).submit_failures.push_back(kind);
    }

    /// Makes every following open fail.
    pub fn fail_opens(&self, kind: ErrorKind) {
        lock(&self.state).open_failure = Some(kind);
    }

    /// Makes every following configuration read fail.
    pub fn fail_config_descriptors(&self, kind: ErrorKind) {
        lock(&self.state).config_failure = Some(kind);
    }

    pub fn set_pollfds(&self, pollfds: Option<Vec<Pollfd>>) {
        lock(&self.state).pollfds = pollfds;
    }

    pub fn set_next_timeout(&self, timeout: Option<Duration>) {
        lock(&self.state).next_timeout = timeout;
    }

    pub fn emit_pollfd_added(&self, pollfd: Pollfd) {
        let sink = lock(&self.state).pollfd_sink.clone();
        if let Some(sink) = sink {
            sink.added(pollfd);
        }
    }

    pub fn emit_pollfd_removed(&self, fd: c_int) {
        let sink = lock(&self.state).pollfd_sink.clone();
        if let Some(sink) = sink {
            sink.removed(fd);
        }
    }

    pub fn opens(&self) -> usize {
        lock(&self.state).opens
    }

    pub fn handle_events_calls(&self) -> usize {
        lock(&self.state).handle_events_calls
    }

    pub fn cancellations(&self) -> usize {
        lock(&self.state).cancellations
    }

    pub fn in_flight(&self) -> usize {
        lock(&self.state).in_flight.len()
    }

    pub fn allocated_transfers(&self) -> usize {
        lock(&self.state).allocated_transfers
    }

    pub fn hotplug_registrations(&self) -> usize {
        lock(&self.state).registrations.len()
    }

    /// Handle closes and transfer cancellations in the order they happened.
    pub fn lifecycle(&self) -> Vec<String> {
        lock(&self.lifecycle).clone()
    }

    /// Handle operations in the order they were requested.
    pub fn calls(&self) -> Vec<String> {
        lock(&self.state).calls.clone()
    }

    pub fn claimed(&self, handle: &MockHandle) -> Vec<u8> {
        lock(&self.state)
            .claimed
            .get(&handle.id)
            .cloned()
            .unwrap_or_default()
    }

    /// Buffers of every transfer submitted to `endpoint`, as they were at submission.
    pub fn submitted_buffers(&self, endpoint: u8) -> Vec<Vec<u8>> {
        Self::for_endpoint(&lock(&self.state).submitted, endpoint)
    }

    /// Buffers of the outgoing transfers submitted to `endpoint`.
    pub fn written(&self, endpoint: u8) -> Vec<Vec<u8>> {
        Self::for_endpoint(&lock(&self.state).written, endpoint)
    }

    fn for_endpoint(buffers: &[(u8, Vec<u8>)], endpoint: u8) -> Vec<Vec<u8>> {
        buffers
            .iter()
            .filter(|(e, _)| *e == endpoint)
            .map(|(_, b)| b.clone())
            .collect()
    }

    pub fn last_submitted_type(&self) -> Option<TransferType> {
        lock(&self.state).last_submitted_type
    }

    pub fn last_stream_id(&self) -> Option<u32> {
        lock(&self.state).last_stream_id
    }

    fn record(&self, call: String) {
        lock(&self.state).calls.push(call);
    }
}

impl Transport for MockTransport {
    type Device = Arc<MockDevice>;
    type Handle = MockHandle;
    type Transfer = MockTransfer;
    type Registration = u64;

    fn set_option(&self, _option: &UsbOption) -> Result<()> {
        Ok(())
    }

    fn has_capability(&self, _capability: Capability) -> bool {
        true
    }

    fn handle_events(
        &self,
        _timeout: Option<Duration>,
        _completed: Option<&CompletionFlag>,
    ) -> Result<()> {
        let (hotplug, finished) = {
            let mut state = lock(&self.state);
            state.handle_events_calls += 1;
            if let Some(kind) = state.event_failures.pop_front() {
                return Err(Error::new(kind));
            }

            let mut hotplug = Vec::new();
            while let Some((device, event)) = state.hotplug_events.pop_front() {
                for registration in &state.registrations {
                    let d = &device.descriptor;
                    if registration.filter.accepts(
                        d.vendor_id(),
                        d.product_id(),
                        d.class_code(),
                        event,
                    ) {
                        hotplug.push((registration.sink.clone(), device.clone(), event));
                    }
                }
            }

            let mut finished = Vec::new();
            let mut waiting = Vec::new();
            for mut flight in state.in_flight.drain(..) {
                if flight.outcome.pending {
                    waiting.push(flight);
                } else if flight.outcome.delay == 0 {
                    finished.push(flight);
                } else {
                    flight.outcome.delay -= 1;
                    waiting.push(flight);
                }
            }
            state.in_flight = waiting;

            (hotplug, finished)
        };

        for (sink, device, event) in hotplug {
            sink.notify(device, event);
        }
        for flight in finished {
            flight.finish();
        }
        Ok(())
    }

    fn pollfds(&self) -> Option<Vec<Pollfd>> {
        lock(&self.state).pollfds.clone()
    }

    fn next_timeout(&self) -> Result<Option<Duration>> {
        Ok(lock(&self.state).next_timeout)
    }

    fn set_pollfd_notifiers(&self, sink: Option<Arc<dyn PollfdSink>>) {
        lock(&self.state).pollfd_sink = sink;
    }

    fn devices(&self) -> Result<Vec<Arc<MockDevice>>> {
        Ok(lock(&self.state).devices.clone())
    }

    fn device_descriptor(&self, device: &Arc<MockDevice>) -> Result<DeviceDescriptor> {
        Ok(device.descriptor.clone())
    }

    fn config_descriptor(&self, device: &Arc<MockDevice>, index: u8) -> Result<ConfigDescriptor> {
        if let Some(kind) = lock(&self.state).config_failure {
            return Err(Error::new(kind));
        }
        device
            .configs
            .get(usize::from(index))
            .cloned()
            .ok_or_else(|| Error::new(ErrorKind::NotFound))
    }

    fn bus_number(&self, device: &Arc<MockDevice>) -> u8 {
        device.bus_number
    }

    fn address(&self, device: &Arc<MockDevice>) -> u8 {
        device.address
    }

    fn port_number(&self, device: &Arc<MockDevice>) -> u8 {
        device.port_number
    }

    fn speed(&self, device: &Arc<MockDevice>) -> Speed {
        device.speed
    }

    fn max_packet_size(&self, device: &Arc<MockDevice>, endpoint: u8) -> Result<usize> {
        device
            .endpoint(endpoint)
            .map(|e| usize::from(e.max_packet_size()))
            .ok_or_else(|| Error::new(ErrorKind::NotFound))
    }

    fn max_iso_packet_size(&self, device: &Arc<MockDevice>, endpoint: u8) -> Result<usize> {
        self.max_packet_size(device, endpoint)
    }

    fn open(&self, device: &Arc<MockDevice>) -> Result<MockHandle> {
        let mut state = lock(&self.state);
        state.opens += 1;
        if let Some(kind) = state.open_failure {
            return Err(Error::new(kind));
        }
        Ok(MockHandle {
            id: Self::next_id(&mut state),
            device: device.clone(),
            lifecycle: self.lifecycle.clone(),
        })
    }

    fn claim_interface(&self, handle: &MockHandle, interface: u8) -> Result<()> {
        let mut state = lock(&self.state);
        state.calls.push(format!("claim_interface {}", interface));
        let claimed = state.claimed.entry(handle.id).or_default();
        if claimed.contains(&interface) {
            return Err(Error::new(ErrorKind::Busy));
        }
        claimed.push(interface);
        Ok(())
    }

    fn release_interface(&self, handle: &MockHandle, interface: u8) -> Result<()> {
        let mut state = lock(&self.state);
        state.calls.push(format!("release_interface {}", interface));
        let claimed = state.claimed.entry(handle.id).or_default();
        match claimed.iter().position(|&i| i == interface) {
            Some(position) => {
                claimed.remove(position);
                Ok(())
            }
            None => Err(Error::new(ErrorKind::NotFound)),
        }
    }

    fn set_configuration(&self, _handle: &MockHandle, configuration: Option<u8>) -> Result<()> {
        self.record(format!("set_configuration {:?}", configuration));
        Ok(())
    }

    fn set_interface_alt_setting(&self, _handle: &MockHandle, interface: u8, setting: u8) -> Result<()> {
        self.record(format!("set_interface_alt_setting {} {}", interface, setting));
        Ok(())
    }

    fn clear_halt(&self, _handle: &MockHandle, endpoint: u8) -> Result<()> {
        self.record(format!("clear_halt {:#04x}", endpoint));
        Ok(())
    }

    fn reset_device(&self, _handle: &MockHandle) -> Result<()> {
        self.record("reset_device".to_owned());
        Ok(())
    }

    fn kernel_driver_active(&self, _handle: &MockHandle, interface: u8) -> Result<bool> {
        self.record(format!("kernel_driver_active {}", interface));
        Ok(false)
    }

    fn detach_kernel_driver(&self, _handle: &MockHandle, interface: u8) -> Result<()> {
        self.record(format!("detach_kernel_driver {}", interface));
        Ok(())
    }

    fn attach_kernel_driver(&self, _handle: &MockHandle, interface: u8) -> Result<()> {
        self.record(format!("attach_kernel_driver {}", interface));
        Ok(())
    }

    fn set_auto_detach_kernel_driver(&self, _handle: &MockHandle, enable: bool) -> Result<()> {
        self.record(format!("set_auto_detach_kernel_driver {}", enable));
        Ok(())
    }

    fn string_descriptor_ascii(&self, handle: &MockHandle, index: u8) -> Result<String> {
        handle
            .device
            .strings
            .get(&index)
            .cloned()
            .ok_or_else(|| Error::new(ErrorKind::Pipe))
    }

    fn bos_descriptor(&self, handle: &MockHandle) -> Result<Vec<u8>> {
        self.record("bos_descriptor".to_owned());
        handle
            .device
            .bos
            .clone()
            .ok_or_else(|| Error::new(ErrorKind::Pipe))
    }

    fn alloc_streams(&self, _handle: &MockHandle, num_streams: u32, endpoints: &[u8]) -> Result<u32> {
        self.record(format!("alloc_streams {} {:?}", num_streams, endpoints));
        Ok(num_streams)
    }

    fn free_streams(&self, _handle: &MockHandle, endpoints: &[u8]) -> Result<()> {
        self.record(format!("free_streams {:?}", endpoints));
        Ok(())
    }

    fn alloc_transfer(&self, _iso_packets: usize) -> Result<MockTransfer> {
        let mut state = lock(&self.state);
        state.allocated_transfers += 1;
        Ok(MockTransfer {
            id: Self::next_id(&mut state),
        })
    }

    unsafe fn submit_transfer(
        &self,
        _handle: &MockHandle,
        transfer: &mut MockTransfer,
        request: &SubmitRequest<'_>,
        sink: Arc<dyn CompletionSink>,
    ) -> Result<()> {
        let mut state = lock(&self.state);
        if let Some(kind) = state.submit_failures.pop_front() {
            return Err(Error::new(kind));
        }

        let data = match request.length {
            0 => Vec::new(),
            n => slice::from_raw_parts(request.buffer, n).to_vec(),
        };
        let (offset, outgoing) = match request.transfer_type {
            TransferType::Control => (8, data.first().map_or(true, |t| t & 0x80 == 0)),
            _ => (0, request.endpoint & 0x80 == 0),
        };

        state.last_submitted_type = Some(request.transfer_type);
        state.last_stream_id = match request.transfer_type {
            TransferType::BulkStream => Some(request.stream_id),
            _ => None,
        };
        state.submitted.push((request.endpoint, data.clone()));
        if outgoing {
            state.written.push((request.endpoint, data));
        }

        let outcome = match state.outcomes.pop_front() {
            Some(outcome) => outcome,
            None if outgoing => Outcome::sent(request.length.saturating_sub(offset)),
            None => Outcome::completed(&[]),
        };
        state.in_flight.push(InFlight {
            id: transfer.id,
            outcome,
            sink,
            buffer: Buffer(request.buffer),
            length: request.length,
            offset,
            packet_lengths: request.packet_lengths.to_vec(),
        });
        Ok(())
    }

    fn cancel_transfer(&self, transfer: &MockTransfer) -> Result<()> {
        let mut guard = lock(&self.state);
        let state = &mut *guard;
        let flight = state.in_flight.iter_mut().find(|f| f.id == transfer.id);
        match flight {
            Some(flight) => {
                flight.outcome = Outcome::cancelled();
                state.cancellations += 1;
                lock(&self.lifecycle).push("cancel".to_owned());
                Ok(())
            }
            None => Err(Error::new(ErrorKind::NotFound)),
        }
    }

    fn register_hotplug(
        &self,
        filter: &HotplugFilter,
        sink: Arc<dyn HotplugSink<Self>>,
    ) -> Result<u64> {
        let (id, attached) = {
            let mut state = lock(&self.state);
            let id = Self::next_id(&mut state);
            state.registrations.push(Registration {
                id,
                filter: *filter,
                sink: sink.clone(),
            });
            let attached = match filter.enumerate {
                true => state.devices.clone(),
                false => Vec::new(),
            };
            (id, attached)
        };

        for device in attached {
            let d = &device.descriptor;
            if filter.accepts(d.vendor_id(), d.product_id(), d.class_code(), HotplugEvent::Arrived) {
                sink.notify(device.clone(), HotplugEvent::Arrived);
            }
        }
        Ok(id)
    }

    fn deregister_hotplug(&self, registration: u64) {
        lock(&self.state)
            .registrations
            .retain(|r| r.id != registration);
    }
}

use std::{
    fmt,
    sync::{Arc, Mutex, MutexGuard, TryLockError},
    time::Duration,
};

use tracing::debug;

use crate::{
    bos::Bos,
    config_descriptor::ConfigDescriptor,
    configuration::Configuration,
    constants::{CONTROL_SETUP_SIZE, ENDPOINT_DIR_MASK},
    context::Context,
    device::Device,
    endpoint::Endpoint,
    endpoint_descriptor::EndpointDescriptor,
    error::{Error, ErrorKind, Result, Transferred},
    fields::TransferType,
    interface::Interface,
    interface_descriptor::InterfaceDescriptor,
    libusb::Libusb,
    lock,
    setting::Setting,
    transfer::{setup_packet, Completion, RawTransfer, DEFAULT_TIMEOUT},
    transport::Transport,
};

/// Types that name an interface, either by number or by descriptor.
pub trait AsInterfaceNumber {
    fn as_interface_number(&self) -> u8;
}

/// Types that name an endpoint, either by address or by descriptor.
pub trait AsEndpointAddress {
    fn as_endpoint_address(&self) -> u8;
}

/// Types that name a configuration. `None` stands for the unconfigured state.
pub trait AsConfigurationValue {
    fn as_configuration_value(&self) -> Option<u8>;
}

/// Types that name an alternate setting.
pub trait AsAltSetting {
    fn as_alt_setting(&self) -> u8;
}

impl AsInterfaceNumber for u8 {
    fn as_interface_number(&self) -> u8 {
        *self
    }
}

impl AsInterfaceNumber for InterfaceDescriptor {
    fn as_interface_number(&self) -> u8 {
        self.interface_number()
    }
}

impl<T: Transport> AsInterfaceNumber for Interface<T> {
    fn as_interface_number(&self) -> u8 {
        self.number()
    }
}

impl<T: Transport> AsInterfaceNumber for Setting<T> {
    fn as_interface_number(&self) -> u8 {
        self.descriptor().interface_number()
    }
}

impl AsEndpointAddress for u8 {
    fn as_endpoint_address(&self) -> u8 {
        *self
    }
}

impl AsEndpointAddress for EndpointDescriptor {
    fn as_endpoint_address(&self) -> u8 {
        self.address()
    }
}

impl<T: Transport> AsEndpointAddress for Endpoint<T> {
    fn as_endpoint_address(&self) -> u8 {
        self.descriptor().address()
    }
}

impl AsConfigurationValue for u8 {
    fn as_configuration_value(&self) -> Option<u8> {
        Some(*self)
    }
}

impl AsConfigurationValue for Option<u8> {
    fn as_configuration_value(&self) -> Option<u8> {
        *self
    }
}

impl AsConfigurationValue for ConfigDescriptor {
    fn as_configuration_value(&self) -> Option<u8> {
        Some(self.number())
    }
}

impl<T: Transport> AsConfigurationValue for Configuration<T> {
    fn as_configuration_value(&self) -> Option<u8> {
        Some(self.number())
    }
}

impl AsAltSetting for u8 {
    fn as_alt_setting(&self) -> u8 {
        *self
    }
}

impl AsAltSetting for InterfaceDescriptor {
    fn as_alt_setting(&self) -> u8 {
        self.setting_number()
    }
}

impl<T: Transport> AsAltSetting for Setting<T> {
    fn as_alt_setting(&self) -> u8 {
        self.descriptor().setting_number()
    }
}

macro_rules! forward_refs {
    ($($tr:ident :: $method:ident -> $ret:ty),*) => {
        $(
            impl<A: $tr + ?Sized> $tr for &A {
                fn $method(&self) -> $ret {
                    (**self).$method()
                }
            }
        )*
    };
}

forward_refs!(
    AsInterfaceNumber::as_interface_number -> u8,
    AsEndpointAddress::as_endpoint_address -> u8,
    AsConfigurationValue::as_configuration_value -> Option<u8>,
    AsAltSetting::as_alt_setting -> u8
);

enum Payload<'a> {
    In(usize),
    Out(&'a [u8]),
}

impl Payload<'_> {
    fn is_in(&self) -> bool {
        matches!(self, Payload::In(_))
    }
}

/// A bulk or interrupt transfer for the convenience calls of [`DeviceHandle`].
///
/// The direction follows the endpoint address: IN endpoints need [`data_in`], OUT endpoints
/// need [`data_out`].
///
/// [`data_in`]: EndpointRequest::data_in
/// [`data_out`]: EndpointRequest::data_out
#[derive(Clone, Debug)]
pub struct EndpointRequest<'a> {
    endpoint: u8,
    data_in: Option<usize>,
    data_out: Option<&'a [u8]>,
    timeout: Duration,
}

impl<'a> EndpointRequest<'a> {
    pub fn new(endpoint: impl AsEndpointAddress) -> Self {
        EndpointRequest {
            endpoint: endpoint.as_endpoint_address(),
            data_in: None,
            data_out: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Receives up to `len` bytes.
    pub fn data_in(mut self, len: usize) -> Self {
        self.data_in = Some(len);
        self
    }

    /// Sends `data`.
    pub fn data_out(mut self, data: &'a [u8]) -> Self {
        self.data_out = Some(data);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn payload(&self, kind: &str) -> Result<Payload<'a>> {
        let incoming = self.endpoint & ENDPOINT_DIR_MASK != 0;
        match (incoming, self.data_in, self.data_out) {
            (_, Some(_), Some(_)) => Err(Error::invalid_argument(format!(
                "either data_in or data_out may be given for {} transfers",
                kind
            ))),
            (true, Some(len), None) => Ok(Payload::In(len)),
            (true, None, _) => Err(Error::invalid_argument(format!(
                "no data_in given for {} read from endpoint {:#04x}",
                kind, self.endpoint
            ))),
            (false, None, Some(data)) => Ok(Payload::Out(data)),
            (false, _, None) => Err(Error::invalid_argument(format!(
                "no data_out given for {} write to endpoint {:#04x}",
                kind, self.endpoint
            ))),
        }
    }
}

/// A control transfer for [`DeviceHandle::control_transfer`].
///
/// The direction follows bit 7 of `bmRequestType`. An IN request without [`data_in`] reads
/// nothing, an OUT request without [`data_out`] sends an empty data stage.
///
/// [`data_in`]: ControlRequest::data_in
/// [`data_out`]: ControlRequest::data_out
#[derive(Clone, Debug)]
pub struct ControlRequest<'a> {
    request_type: u8,
    request: u8,
    value: u16,
    index: u16,
    data_in: Option<u16>,
    data_out: Option<&'a [u8]>,
    timeout: Duration,
}

impl<'a> ControlRequest<'a> {
    /// Starts a request; see [`request_type`](crate::request_type) for building
    /// `bmRequestType`.
    pub fn new(request_type: u8, request: u8) -> Self {
        ControlRequest {
            request_type,
            request,
            value: 0,
            index: 0,
            data_in: None,
            data_out: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn value(mut self, value: u16) -> Self {
        self.value = value;
        self
    }

    pub fn index(mut self, index: u16) -> Self {
        self.index = index;
        self
    }

    pub fn data_in(mut self, len: u16) -> Self {
        self.data_in = Some(len);
        self
    }

    pub fn data_out(mut self, data: &'a [u8]) -> Self {
        self.data_out = Some(data);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn payload(&self) -> Result<Payload<'a>> {
        let incoming = self.request_type & ENDPOINT_DIR_MASK != 0;
        match (incoming, self.data_in, self.data_out) {
            (_, Some(_), Some(_)) => Err(Error::invalid_argument(
                "either data_in or data_out may be given for control transfers",
            )),
            (true, len, None) => Ok(Payload::In(usize::from(len.unwrap_or(0)))),
            (true, None, Some(_)) => Err(Error::invalid_argument(
                "data_out given for a device-to-host control transfer",
            )),
            (false, None, data) => Ok(Payload::Out(data.unwrap_or(&[]))),
            (false, Some(_), None) => Err(Error::invalid_argument(
                "data_in given for a host-to-device control transfer",
            )),
        }
    }

    fn setup(&self, length: usize) -> Result<[u8; 8]> {
        let length = u16::try_from(length).map_err(|_| {
            Error::invalid_argument(format!("{} bytes exceed the control data stage", length))
        })?;
        Ok(setup_packet(self.request_type, self.request, self.value, self.index, length))
    }
}

/// An open device.
///
/// Clones share the same native handle, which is closed once the last clone and the last
/// transfer created from it are dropped.
///
/// The convenience calls [`bulk_transfer`](Self::bulk_transfer),
/// [`interrupt_transfer`](Self::interrupt_transfer) and
/// [`control_transfer`](Self::control_transfer) reuse one transfer per type and handle. They
/// fail with [`ErrorKind::Busy`] while another call of the same type is running on the handle;
/// use separate [`Transfer`](crate::Transfer)s for concurrent I/O.
pub struct DeviceHandle<T: Transport = Libusb> {
    inner: Arc<HandleInner<T>>,
}

// Transfers drop before the native handle, the native handle before the device.
struct HandleInner<T: Transport> {
    bulk: Mutex<Option<RawTransfer<T>>>,
    interrupt: Mutex<Option<RawTransfer<T>>>,
    control: Mutex<Option<RawTransfer<T>>>,
    native: T::Handle,
    device: Device<T>,
}

impl<T: Transport> Clone for DeviceHandle<T> {
    fn clone(&self) -> Self {
        DeviceHandle {
            inner: self.inner.clone(),
        }
    }
}

fn try_lock<V>(mutex: &Mutex<V>) -> Result<MutexGuard<'_, V>> {
    match mutex.try_lock() {
        Ok(guard) => Ok(guard),
        Err(TryLockError::Poisoned(poisoned)) => Ok(poisoned.into_inner()),
        Err(TryLockError::WouldBlock) => Err(Error::new(ErrorKind::Busy)
            .with_detail("another transfer of this type is running on the handle")),
    }
}

impl<T: Transport> DeviceHandle<T> {
    pub(crate) fn new(device: Device<T>, native: T::Handle) -> Self {
        DeviceHandle {
            inner: Arc::new(HandleInner {
                bulk: Mutex::new(None),
                interrupt: Mutex::new(None),
                control: Mutex::new(None),
                native,
                device,
            }),
        }
    }

    pub fn device(&self) -> &Device<T> {
        &self.inner.device
    }

    pub fn context(&self) -> &Context<T> {
        self.inner.device.context()
    }

    pub fn transport(&self) -> &T {
        self.context().transport()
    }

    pub(crate) fn native(&self) -> &T::Handle {
        &self.inner.native
    }

    /// Claims an interface. An interface must be claimed before doing I/O on its endpoints.
    pub fn claim_interface(&self, interface: impl AsInterfaceNumber) -> Result<()> {
        self.transport()
            .claim_interface(&self.inner.native, interface.as_interface_number())
    }

    pub fn release_interface(&self, interface: impl AsInterfaceNumber) -> Result<()> {
        self.transport()
            .release_interface(&self.inner.native, interface.as_interface_number())
    }

    /// Claims `interface` for the duration of `f`.
    ///
    /// The interface is released when `f` returns, whether it succeeded or not, and when it
    /// panics. A failure of `f` takes precedence over a failure to release.
    pub fn with_claimed_interface<I, R, F>(&self, interface: I, f: F) -> Result<R>
    where
        I: AsInterfaceNumber,
        F: FnOnce(&Self) -> Result<R>,
    {
        let number = interface.as_interface_number();
        self.claim_interface(number)?;
        let claim = ClaimedInterface {
            handle: self,
            number,
            released: false,
        };

        let result = f(self);
        let released = claim.release();
        if let Err(err) = &released {
            debug!(interface = number, %err, "releasing claimed interface");
        }

        let value = result?;
        released?;
        Ok(value)
    }

    /// Activates a configuration; `None` unconfigures the device.
    pub fn set_configuration(&self, configuration: impl AsConfigurationValue) -> Result<()> {
        self.transport()
            .set_configuration(&self.inner.native, configuration.as_configuration_value())
    }

    pub fn set_interface_alt_setting(
        &self,
        interface: impl AsInterfaceNumber,
        setting: impl AsAltSetting,
    ) -> Result<()> {
        self.transport().set_interface_alt_setting(
            &self.inner.native,
            interface.as_interface_number(),
            setting.as_alt_setting(),
        )
    }

    /// Clears the halt condition of an endpoint.
    pub fn clear_halt(&self, endpoint: impl AsEndpointAddress) -> Result<()> {
        self.transport()
            .clear_halt(&self.inner.native, endpoint.as_endpoint_address())
    }

    /// Resets the device. Fails with [`ErrorKind::NotFound`] if the device re-enumerated and has
    /// to be opened again.
    pub fn reset(&self) -> Result<()> {
        self.transport().reset_device(&self.inner.native)
    }

    /// Indicates whether a kernel driver is bound to the interface.
    ///
    /// This method is not supported on all platforms.
    pub fn kernel_driver_active(&self, interface: impl AsInterfaceNumber) -> Result<bool> {
        self.transport()
            .kernel_driver_active(&self.inner.native, interface.as_interface_number())
    }

    pub fn detach_kernel_driver(&self, interface: impl AsInterfaceNumber) -> Result<()> {
        self.transport()
            .detach_kernel_driver(&self.inner.native, interface.as_interface_number())
    }

    pub fn attach_kernel_driver(&self, interface: impl AsInterfaceNumber) -> Result<()> {
        self.transport()
            .attach_kernel_driver(&self.inner.native, interface.as_interface_number())
    }

    /// Detaches kernel drivers when claiming interfaces and reattaches them on release.
    pub fn set_auto_detach_kernel_driver(&self, enable: bool) -> Result<()> {
        self.transport()
            .set_auto_detach_kernel_driver(&self.inner.native, enable)
    }

    /// Reads a string descriptor in the first language the device supports.
    pub fn string_descriptor_ascii(&self, index: u8) -> Result<String> {
        self.transport()
            .string_descriptor_ascii(&self.inner.native, index)
    }

    /// Reads the Binary Object Store.
    ///
    /// Devices older than USB 2.0.1 have none; for them this fails with
    /// [`ErrorKind::NotSupported`] without asking the device.
    pub fn bos(&self) -> Result<Bos> {
        let bcd_usb = self.device().device_descriptor().bcd_usb();
        if bcd_usb < 0x0201 {
            return Err(Error::new(ErrorKind::NotSupported)
                .with_detail(format!("no BOS before USB 2.0.1, device reports {:#06x}", bcd_usb)));
        }

        let bytes = self.transport().bos_descriptor(&self.inner.native)?;
        Bos::parse(&bytes)
    }

    /// Allocates up to `num_streams` USB 3.0 bulk streams on each endpoint and returns how many
    /// were allocated.
    pub fn alloc_streams<E: AsEndpointAddress>(&self, num_streams: u32, endpoints: &[E]) -> Result<u32> {
        let endpoints: Vec<u8> = endpoints.iter().map(AsEndpointAddress::as_endpoint_address).collect();
        self.transport()
            .alloc_streams(&self.inner.native, num_streams, &endpoints)
    }

    pub fn free_streams<E: AsEndpointAddress>(&self, endpoints: &[E]) -> Result<()> {
        let endpoints: Vec<u8> = endpoints.iter().map(AsEndpointAddress::as_endpoint_address).collect();
        self.transport()
            .free_streams(&self.inner.native, &endpoints)
    }

    /// Performs a bulk transfer and waits for it.
    ///
    /// Returns the received bytes for IN endpoints and the number of bytes sent for OUT
    /// endpoints. A failed transfer's error carries what had been transferred.
    pub fn bulk_transfer(&self, request: &EndpointRequest<'_>) -> Result<Transferred> {
        let payload = request.payload("bulk")?;
        self.run(&self.inner.bulk, TransferType::Bulk, |raw| {
            prepare_endpoint(raw, request, payload)
        })
    }

    /// Performs an interrupt transfer and waits for it.
    pub fn interrupt_transfer(&self, request: &EndpointRequest<'_>) -> Result<Transferred> {
        let payload = request.payload("interrupt")?;
        self.run(&self.inner.interrupt, TransferType::Interrupt, |raw| {
            prepare_endpoint(raw, request, payload)
        })
    }

    /// Performs a control transfer on the default endpoint and waits for it.
    ///
    /// Received bytes don't include the setup packet.
    pub fn control_transfer(&self, request: &ControlRequest<'_>) -> Result<Transferred> {
        let payload = request.payload()?;
        self.run(&self.inner.control, TransferType::Control, |raw| {
            prepare_control(raw, request, payload)
        })
    }

    /// Starts a bulk transfer; `callback` gets the result from the thread handling events.
    pub fn bulk_transfer_async<F>(&self, request: &EndpointRequest<'_>, callback: F) -> Result<()>
    where
        F: FnOnce(Result<Transferred>) + Send + 'static,
    {
        let payload = request.payload("bulk")?;
        let incoming = payload.is_in();
        self.start(
            &self.inner.bulk,
            TransferType::Bulk,
            |raw| prepare_endpoint(raw, request, payload),
            incoming,
            callback,
        )
    }

    pub fn interrupt_transfer_async<F>(&self, request: &EndpointRequest<'_>, callback: F) -> Result<()>
    where
        F: FnOnce(Result<Transferred>) + Send + 'static,
    {
        let payload = request.payload("interrupt")?;
        let incoming = payload.is_in();
        self.start(
            &self.inner.interrupt,
            TransferType::Interrupt,
            |raw| prepare_endpoint(raw, request, payload),
            incoming,
            callback,
        )
    }

    pub fn control_transfer_async<F>(&self, request: &ControlRequest<'_>, callback: F) -> Result<()>
    where
        F: FnOnce(Result<Transferred>) + Send + 'static,
    {
        let payload = request.payload()?;
        let incoming = payload.is_in();
        self.start(
            &self.inner.control,
            TransferType::Control,
            |raw| prepare_control(raw, request, payload),
            incoming,
            callback,
        )
    }

    fn reusable<'g>(
        &self,
        slot: &'g mut Option<RawTransfer<T>>,
        transfer_type: TransferType,
    ) -> Result<&'g mut RawTransfer<T>> {
        let raw = match slot.take() {
            Some(raw) => raw,
            None => RawTransfer::new(self.context().clone(), transfer_type, 0)?,
        };
        let raw = slot.insert(raw);
        if raw.is_submitted() {
            return Err(Error::new(ErrorKind::Busy).with_detail("a transfer of this type is in flight"));
        }
        Ok(raw)
    }

    fn run<P>(&self, slot: &Mutex<Option<RawTransfer<T>>>, transfer_type: TransferType, prepare: P) -> Result<Transferred>
    where
        P: FnOnce(&mut RawTransfer<T>) -> Result<()>,
    {
        let mut guard = try_lock(slot)?;
        let raw = self.reusable(&mut guard, transfer_type)?;
        raw.set_callback(None);
        prepare(raw)?;
        raw.submit_and_wait_checked(&self.inner.native)
    }

    fn start<P, F>(
        &self,
        slot: &Mutex<Option<RawTransfer<T>>>,
        transfer_type: TransferType,
        prepare: P,
        incoming: bool,
        callback: F,
    ) -> Result<()>
    where
        P: FnOnce(&mut RawTransfer<T>) -> Result<()>,
        F: FnOnce(Result<Transferred>) + Send + 'static,
    {
        let mut guard = try_lock(slot)?;
        let raw = self.reusable(&mut guard, transfer_type)?;
        prepare(raw)?;

        let mut callback = Some(callback);
        raw.set_callback(Some(Box::new(move |completion: &Completion<'_>| {
            if let Some(callback) = callback.take() {
                callback(completion_result(completion, incoming));
            }
        })));

        let submitted = raw.submit(&self.inner.native);
        if submitted.is_err() {
            raw.set_callback(None);
        }
        submitted
    }

    /// Releases the buffers of the convenience transfers, cancelling any still in flight.
    ///
    /// The native handle is closed once no clone of this handle and no transfer using it is
    /// left.
    pub fn close(self) {
        for slot in [&self.inner.bulk, &self.inner.interrupt, &self.inner.control] {
            let raw = lock(slot).take();
            drop(raw);
        }
    }
}

/// Releases a claimed interface when dropped.
struct ClaimedInterface<'a, T: Transport> {
    handle: &'a DeviceHandle<T>,
    number: u8,
    released: bool,
}

impl<T: Transport> ClaimedInterface<'_, T> {
    fn release(mut self) -> Result<()> {
        self.released = true;
        self.handle.release_interface(self.number)
    }
}

impl<T: Transport> Drop for ClaimedInterface<'_, T> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(err) = self.handle.release_interface(self.number) {
            debug!(interface = self.number, %err, "releasing claimed interface while unwinding");
        }
    }
}

fn prepare_endpoint<T: Transport>(
    raw: &mut RawTransfer<T>,
    request: &EndpointRequest<'_>,
    payload: Payload<'_>,
) -> Result<()> {
    raw.set_endpoint(request.endpoint);
    raw.set_timeout(request.timeout);
    match payload {
        Payload::In(len) => raw.alloc_buffer(len, None),
        Payload::Out(data) => raw.set_buffer(data),
    }
}

fn prepare_control<T: Transport>(
    raw: &mut RawTransfer<T>,
    request: &ControlRequest<'_>,
    payload: Payload<'_>,
) -> Result<()> {
    raw.set_endpoint(0);
    raw.set_timeout(request.timeout);
    match payload {
        Payload::In(len) => {
            let setup = request.setup(len)?;
            raw.alloc_buffer(CONTROL_SETUP_SIZE + len, Some(&setup))
        }
        Payload::Out(data) => {
            let setup = request.setup(data.len())?;
            let mut buffer = Vec::with_capacity(CONTROL_SETUP_SIZE + data.len());
            buffer.extend_from_slice(&setup);
            buffer.extend_from_slice(data);
            raw.set_buffer(&buffer)
        }
    }
}

fn completion_result(completion: &Completion<'_>, incoming: bool) -> Result<Transferred> {
    let transferred = match incoming {
        true => Transferred::Received(completion.actual_buffer().to_vec()),
        false => Transferred::Sent(completion.actual_length()),
    };
    match completion.status().error_kind() {
        None => Ok(transferred),
        Some(kind) => Err(Error::new(kind).with_transferred(transferred)),
    }
}

impl<T: Transport> fmt::Debug for DeviceHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceHandle")
            .field("device", &self.inner.device)
            .finish()
    }
}

#[cfg(test)]
mod test {
    use std::{
        panic::{self, AssertUnwindSafe},
        sync::{Arc, Mutex},
    };

    use super::*;
    use crate::{
        test_helpers::{mass_storage_config, MockDevice, MockTransport, Outcome},
        TransferStatus,
    };

    fn context_with(bcd_usb: u16) -> Context<MockTransport> {
        let transport = MockTransport::new();
        transport.attach(
            MockDevice::new(1, 1, device_descriptor!(bcdUSB: bcd_usb, bNumConfigurations: 1))
                .with_config(mass_storage_config())
                .with_bos(vec![5, 0x0F, 12, 0, 1, 7, 0x10, 0x02, 0x02, 0, 0, 0]),
        );
        Context::with_transport(transport)
    }

    fn handle() -> DeviceHandle<MockTransport> {
        context_with(0x0200).devices().unwrap()[0].open().unwrap()
    }

    #[test]
    fn it_releases_the_interface_when_the_scope_fails() {
        let handle = handle();
        let result: Result<()> = handle.with_claimed_interface(0, |h| {
            assert_eq!(vec![0], h.transport().claimed(h.native()));
            Err(Error::new(ErrorKind::Pipe))
        });

        assert_eq!(ErrorKind::Pipe, result.unwrap_err().kind());
        assert!(handle.transport().claimed(handle.native()).is_empty());
        assert_eq!(
            vec!["claim_interface 0", "release_interface 0"],
            handle.transport().calls()
        );
    }

    #[test]
    fn it_releases_the_interface_when_the_scope_panics() {
        let handle = handle();
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            handle.with_claimed_interface(0, |_| -> Result<()> { panic!("scope panicked") })
        }));

        assert!(result.is_err());
        assert!(handle.transport().claimed(handle.native()).is_empty());
        assert_eq!(
            vec!["claim_interface 0", "release_interface 0"],
            handle.transport().calls()
        );
    }

    #[test]
    fn it_releases_the_interface_after_the_scope() {
        let handle = handle();
        let n = handle.with_claimed_interface(0, |_| Ok(42)).unwrap();

        assert_eq!(42, n);
        assert!(handle.transport().claimed(handle.native()).is_empty());
    }

    #[test]
    fn it_accepts_descriptors_in_place_of_numbers() {
        let handle = handle();
        let config = handle.device().configurations().remove(0);
        let setting = config.settings().remove(0);
        let endpoint = setting.endpoints().remove(0);

        handle.set_configuration(&config).unwrap();
        handle.claim_interface(&setting.interface()).unwrap();
        handle.set_interface_alt_setting(&setting, &setting).unwrap();
        handle.clear_halt(&endpoint).unwrap();
        handle.set_configuration(None::<u8>).unwrap();

        assert_eq!(
            vec![
                "set_configuration Some(1)",
                "claim_interface 0",
                "set_interface_alt_setting 0 0",
                "clear_halt 0x81",
                "set_configuration None",
            ],
            handle.transport().calls()
        );
    }

    #[test]
    fn it_reads_from_bulk_endpoints() {
        let handle = handle();
        handle.transport().push_outcome(Outcome::completed(b"USBS"));

        let received = handle
            .bulk_transfer(&EndpointRequest::new(0x81).data_in(13))
            .unwrap();
        assert_eq!(Transferred::Received(b"USBS".to_vec()), received);
    }

    #[test]
    fn it_writes_to_bulk_endpoints() {
        let handle = handle();
        handle.transport().push_outcome(Outcome::sent(3));

        let sent = handle
            .bulk_transfer(&EndpointRequest::new(0x02).data_out(b"abc"))
            .unwrap();
        assert_eq!(Transferred::Sent(3), sent);
        assert_eq!(vec![b"abc".to_vec()], handle.transport().written(0x02));
    }

    #[test]
    fn it_runs_a_bulk_only_inquiry() {
        let handle = handle();

        // INQUIRY of LUN 0, 36 bytes in.
        let mut cbw = Vec::with_capacity(31);
        cbw.extend_from_slice(b"USBC");
        cbw.extend_from_slice(&0x1234_5678u32.to_le_bytes());
        cbw.extend_from_slice(&36u32.to_le_bytes());
        cbw.extend_from_slice(&[0x80, 0, 6, 0x12, 0, 0, 0, 36, 0]);
        cbw.resize(31, 0);

        let mut csw = Vec::with_capacity(13);
        csw.extend_from_slice(b"USBS");
        csw.extend_from_slice(&0x1234_5678u32.to_le_bytes());
        csw.extend_from_slice(&0u32.to_le_bytes());
        csw.push(0);

        let inquiry = [0x55u8; 36];
        handle.transport().push_outcome(Outcome::sent(31));
        handle.transport().push_outcome(Outcome::completed(&inquiry));
        handle.transport().push_outcome(Outcome::completed(&csw));

        handle
            .with_claimed_interface(0, |h| {
                let sent = h.bulk_transfer(&EndpointRequest::new(0x02).data_out(&cbw))?;
                assert_eq!(Transferred::Sent(31), sent);

                let data = h.bulk_transfer(&EndpointRequest::new(0x81).data_in(36))?;
                assert_eq!(Transferred::Received(inquiry.to_vec()), data);

                let status = h.bulk_transfer(&EndpointRequest::new(0x81).data_in(13))?;
                let Transferred::Received(status) = status else {
                    panic!("expected received bytes");
                };
                assert_eq!(13, status.len());
                assert_eq!(b"USBS", &status[..4]);
                assert_eq!(&cbw[4..8], &status[4..8]);
                assert_eq!(0, status[12]);
                Ok(())
            })
            .unwrap();

        assert_eq!(vec![cbw], handle.transport().written(0x02));
    }

    #[test]
    fn it_validates_endpoint_requests() {
        let handle = handle();

        let missing_in = handle.bulk_transfer(&EndpointRequest::new(0x81)).unwrap_err();
        assert_eq!(ErrorKind::InvalidArgument, missing_in.kind());
        assert!(missing_in.detail().unwrap().contains("no data_in given for bulk read"));

        let missing_out = handle
            .interrupt_transfer(&EndpointRequest::new(0x02).data_in(4))
            .unwrap_err();
        assert_eq!(ErrorKind::InvalidArgument, missing_out.kind());

        let both = handle
            .bulk_transfer(&EndpointRequest::new(0x02).data_in(4).data_out(b"x"))
            .unwrap_err();
        assert_eq!(ErrorKind::InvalidArgument, both.kind());
    }

    #[test]
    fn it_skips_the_setup_packet_in_control_results() {
        let handle = handle();
        handle.transport().push_outcome(Outcome::completed(&[0x12, 0x01, 0x00, 0x02]));

        let received = handle
            .control_transfer(&ControlRequest::new(0x80, 0x06).value(0x0100).data_in(4))
            .unwrap();

        assert_eq!(Transferred::Received(vec![0x12, 0x01, 0x00, 0x02]), received);
        assert_eq!(
            vec![0x80, 0x06, 0x00, 0x01, 0x00, 0x00, 0x04, 0x00],
            handle.transport().submitted_buffers(0)[0][..8].to_vec()
        );
        assert_eq!(12, handle.transport().submitted_buffers(0)[0].len());
    }

    #[test]
    fn it_defaults_control_payloads() {
        let handle = handle();
        handle.transport().push_outcome(Outcome::sent(0));
        handle.transport().push_outcome(Outcome::completed(&[]));

        let sent = handle.control_transfer(&ControlRequest::new(0x00, 0x09).value(1)).unwrap();
        assert_eq!(Transferred::Sent(0), sent);

        let received = handle.control_transfer(&ControlRequest::new(0x80, 0x08)).unwrap();
        assert_eq!(Transferred::Received(vec![]), received);

        assert_eq!(
            ErrorKind::InvalidArgument,
            handle
                .control_transfer(&ControlRequest::new(0x00, 0x09).data_in(1))
                .unwrap_err()
                .kind()
        );
    }

    #[test]
    fn it_carries_the_partial_transfer_in_errors() {
        let handle = handle();
        handle
            .transport()
            .push_outcome(Outcome::sent(512).with_status(TransferStatus::Timeout));

        let data = vec![0; 1024];
        let err = handle
            .bulk_transfer(&EndpointRequest::new(0x02).data_out(&data))
            .unwrap_err();

        assert_eq!(ErrorKind::Timeout, err.kind());
        assert_eq!(Some(&Transferred::Sent(512)), err.transferred());
    }

    #[test]
    fn it_reuses_one_transfer_per_type() {
        let handle = handle();
        handle.transport().push_outcome(Outcome::sent(1));
        handle.transport().push_outcome(Outcome::sent(1));

        handle.bulk_transfer(&EndpointRequest::new(0x02).data_out(b"a")).unwrap();
        handle.bulk_transfer(&EndpointRequest::new(0x02).data_out(b"b")).unwrap();

        assert_eq!(1, handle.transport().allocated_transfers());
    }

    #[test]
    fn it_hands_async_results_to_the_callback() {
        let handle = handle();
        handle.transport().push_outcome(Outcome::completed(b"irq"));
        let result = Arc::new(Mutex::new(None));

        let r = result.clone();
        handle
            .interrupt_transfer_async(&EndpointRequest::new(0x83).data_in(8), move |res| {
                *r.lock().unwrap() = Some(res);
            })
            .unwrap();
        assert!(result.lock().unwrap().is_none());

        handle.context().handle_events(Some(Duration::ZERO), None).unwrap();
        assert_eq!(
            Some(Ok(Transferred::Received(b"irq".to_vec()))),
            *result.lock().unwrap()
        );
    }

    #[test]
    fn it_is_busy_while_an_async_transfer_is_in_flight() {
        let handle = handle();
        handle.transport().push_outcome(Outcome::pending());

        handle
            .bulk_transfer_async(&EndpointRequest::new(0x81).data_in(8), |_| {})
            .unwrap();
        let err = handle
            .bulk_transfer(&EndpointRequest::new(0x81).data_in(8))
            .unwrap_err();
        assert_eq!(ErrorKind::Busy, err.kind());

        handle.transport().push_outcome(Outcome::sent(1));
        handle
            .control_transfer(&ControlRequest::new(0x40, 1).data_out(b"x"))
            .unwrap();

        handle.close();
    }

    #[test]
    fn it_refuses_bos_before_usb_2_0_1() {
        let handle = handle();
        assert_eq!(ErrorKind::NotSupported, handle.bos().unwrap_err().kind());
        assert!(handle.transport().calls().is_empty());
    }

    #[test]
    fn it_reads_bos_from_newer_devices() {
        let handle = context_with(0x0210).devices().unwrap()[0].open().unwrap();
        let bos = handle.bos().unwrap();

        match &bos.capabilities()[0] {
            crate::DeviceCapability::Usb20Extension(ext) => assert!(ext.lpm_support()),
            other => panic!("unexpected capability {:?}", other),
        }
    }

    #[test]
    fn it_allocates_streams_on_endpoints() {
        let handle = handle();
        let endpoints = handle.device().endpoints();

        assert_eq!(4, handle.alloc_streams(4, &endpoints).unwrap());
        handle.free_streams(&[0x81u8, 0x02]).unwrap();
        assert_eq!(
            vec!["alloc_streams 4 [129, 2]", "free_streams [129, 2]"],
            handle.transport().calls()
        );
    }

    #[test]
    fn it_manages_kernel_drivers() {
        let handle = handle();

        assert!(!handle.kernel_driver_active(0).unwrap());
        handle.detach_kernel_driver(0).unwrap();
        handle.attach_kernel_driver(0).unwrap();
        handle.set_auto_detach_kernel_driver(true).unwrap();
        assert_eq!(
            vec![
                "kernel_driver_active 0",
                "detach_kernel_driver 0",
                "attach_kernel_driver 0",
                "set_auto_detach_kernel_driver true",
            ],
            handle.transport().calls()
        );
    }
}

use std::{
    collections::HashMap,
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use libc::c_int;
use tracing::debug;

use crate::{
    constants::{class, POLLIN, POLLOUT},
    device::Device,
    error::{Error, ErrorKind, Result},
    hotplug::HotplugSlot,
    libusb::Libusb,
    lock,
    options::UsbOption,
    transport::{Capability, CompletionFlag, PollfdSink, Transport},
};

/// A session with the native USB layer.
///
/// Devices, handles and transfers each keep the context alive through a counted reference, so
/// the native session is released only after the last of them is gone.
pub struct Context<T: Transport = Libusb> {
    inner: Arc<ContextInner<T>>,
}

impl<T: Transport> Clone for Context<T> {
    fn clone(&self) -> Self {
        Context {
            inner: self.inner.clone(),
        }
    }
}

pub(crate) struct ContextInner<T: Transport> {
    pub(crate) hotplug: Mutex<HashMap<u64, Arc<HotplugSlot<T>>>>,
    pub(crate) next_hotplug_id: AtomicU64,
    pollfd: Arc<PollfdSlots>,
    pollfd_installed: AtomicBool,
    pub(crate) transport: T,
}

impl Context<Libusb> {
    /// Opens a new `libusb` session.
    pub fn new() -> Result<Self> {
        Self::with_options(&[])
    }

    /// Opens a new `libusb` session and applies `opts` before anything else uses it.
    pub fn with_options(opts: &[UsbOption]) -> Result<Self> {
        let context = Context::with_transport(Libusb::init()?);

        for opt in opts {
            context.set_option(opt)?;
        }

        Ok(context)
    }
}

impl<T: Transport> Context<T> {
    /// Wraps an already initialised native session.
    pub fn with_transport(transport: T) -> Self {
        Context {
            inner: Arc::new(ContextInner {
                hotplug: Mutex::new(HashMap::new()),
                next_hotplug_id: AtomicU64::new(1),
                pollfd: Arc::new(PollfdSlots::default()),
                pollfd_installed: AtomicBool::new(false),
                transport,
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<ContextInner<T>>) -> Self {
        Context { inner }
    }

    pub(crate) fn inner(&self) -> &Arc<ContextInner<T>> {
        &self.inner
    }

    /// Returns the native layer underneath this context.
    pub fn transport(&self) -> &T {
        &self.inner.transport
    }

    /// Applies a runtime option.
    pub fn set_option(&self, option: &UsbOption) -> Result<()> {
        self.inner.transport.set_option(option)
    }

    pub fn has_capability(&self, capability: Capability) -> bool {
        self.inner.transport.has_capability(capability)
    }

    /// Tests whether the running library supports hotplug notifications.
    pub fn has_hotplug(&self) -> bool {
        self.has_capability(Capability::HasHotplug)
    }

    /// Tests whether the running library has HID access.
    pub fn has_hid_access(&self) -> bool {
        self.has_capability(Capability::HasHidAccess)
    }

    /// Tests whether the running library supports detaching the kernel driver.
    pub fn supports_detach_kernel_driver(&self) -> bool {
        self.has_capability(Capability::SupportsDetachKernelDriver)
    }

    /// Returns every device currently attached to the system.
    pub fn devices(&self) -> Result<Vec<Device<T>>> {
        let natives = self.inner.transport.devices()?;
        debug!(count = natives.len(), "enumerated devices");

        natives
            .into_iter()
            .map(|native| Device::new(self.clone(), native))
            .collect()
    }

    /// Returns the attached devices that match `filter`.
    pub fn device_list(&self, filter: &DeviceFilter) -> Result<Vec<Device<T>>> {
        Ok(self
            .devices()?
            .into_iter()
            .filter(|device| filter.matches(device))
            .collect())
    }

    /// Handles pending events.
    ///
    /// `None` blocks until any event was handled, `Some(Duration::ZERO)` only handles what is
    /// already pending and any other timeout bounds how long the call blocks. When `completed`
    /// is given and already set the call returns without blocking.
    pub fn handle_events(
        &self,
        timeout: Option<Duration>,
        completed: Option<&CompletionFlag>,
    ) -> Result<()> {
        if completed.map_or(false, CompletionFlag::is_completed) {
            return Ok(());
        }

        self.inner.transport.handle_events(timeout, completed)
    }

    /// Returns the file descriptors an external event loop has to watch, or `None` on platforms
    /// without pollable event sources.
    pub fn pollfds(&self) -> Option<Vec<Pollfd>> {
        self.inner.transport.pollfds()
    }

    /// Returns how long an external event loop may sleep before it has to call
    /// [`handle_events`](Context::handle_events), or `None` when no timeout is pending.
    ///
    /// A zero duration means events have to be handled right away.
    pub fn next_timeout(&self) -> Result<Option<Duration>> {
        self.inner.transport.next_timeout()
    }

    /// Sets the callback invoked whenever a file descriptor is added to the event sources.
    ///
    /// Replaces the previous callback.
    pub fn on_pollfd_added<F>(&self, callback: F)
    where
        F: FnMut(Pollfd) + Send + 'static,
    {
        *lock(&self.inner.pollfd.added) = Some(Box::new(callback));
        self.install_pollfd_notifiers();
    }

    /// Sets the callback invoked whenever a file descriptor is removed from the event sources.
    ///
    /// Replaces the previous callback.
    pub fn on_pollfd_removed<F>(&self, callback: F)
    where
        F: FnMut(c_int) + Send + 'static,
    {
        *lock(&self.inner.pollfd.removed) = Some(Box::new(callback));
        self.install_pollfd_notifiers();
    }

    /// Removes both pollfd callbacks.
    pub fn clear_pollfd_notifiers(&self) {
        *lock(&self.inner.pollfd.added) = None;
        *lock(&self.inner.pollfd.removed) = None;

        if self.inner.pollfd_installed.swap(false, Ordering::SeqCst) {
            self.inner.transport.set_pollfd_notifiers(None);
        }
    }

    fn install_pollfd_notifiers(&self) {
        if !self.inner.pollfd_installed.swap(true, Ordering::SeqCst) {
            let sink: Arc<dyn PollfdSink> = self.inner.pollfd.clone();
            self.inner.transport.set_pollfd_notifiers(Some(sink));
        }
    }

    /// Tears down the session.
    ///
    /// Fails with [`ErrorKind::RemainingReferences`] while devices, handles or transfers still
    /// use the context. The session is then released once the last of them is dropped.
    pub fn exit(self) -> Result<()> {
        match Arc::try_unwrap(self.inner) {
            Ok(inner) => {
                drop(inner);
                Ok(())
            }
            Err(inner) => Err(Error::new(ErrorKind::RemainingReferences).with_detail(format!(
                "{} references left",
                Arc::strong_count(&inner) - 1
            ))),
        }
    }
}

impl<T: Transport> fmt::Debug for Context<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("references", &Arc::strong_count(&self.inner))
            .finish()
    }
}

/// A file descriptor the native layer wants to be polled.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Pollfd {
    fd: c_int,
    events: i16,
}

impl Pollfd {
    pub fn new(fd: c_int, events: i16) -> Self {
        Pollfd { fd, events }
    }

    pub fn fd(&self) -> c_int {
        self.fd
    }

    /// The `poll(2)` event bits to watch for.
    pub fn events(&self) -> i16 {
        self.events
    }

    pub fn is_readable(&self) -> bool {
        self.events & POLLIN != 0
    }

    pub fn is_writable(&self) -> bool {
        self.events & POLLOUT != 0
    }
}

type PollfdAdded = Box<dyn FnMut(Pollfd) + Send>;
type PollfdRemoved = Box<dyn FnMut(c_int) + Send>;

#[derive(Default)]
struct PollfdSlots {
    added: Mutex<Option<PollfdAdded>>,
    removed: Mutex<Option<PollfdRemoved>>,
}

// The callback is taken out of its slot while it runs so it may replace itself. It is put back
// only if nothing else was registered meanwhile.
impl PollfdSink for PollfdSlots {
    fn added(&self, pollfd: Pollfd) {
        let taken = lock(&self.added).take();

        if let Some(mut callback) = taken {
            callback(pollfd);
            lock(&self.added).get_or_insert(callback);
        }
    }

    fn removed(&self, fd: c_int) {
        let taken = lock(&self.removed).take();

        if let Some(mut callback) = taken {
            callback(fd);
            lock(&self.removed).get_or_insert(callback);
        }
    }
}

/// A set of accepted values for one filter field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Criterion<V>(Vec<V>);

impl<V: PartialEq> Criterion<V> {
    pub fn contains(&self, value: &V) -> bool {
        self.0.contains(value)
    }

    fn any_of<I: IntoIterator<Item = V>>(&self, values: I) -> bool {
        values.into_iter().any(|v| self.contains(&v))
    }
}

impl<V> From<V> for Criterion<V> {
    fn from(value: V) -> Self {
        Criterion(vec![value])
    }
}

impl<V> From<Vec<V>> for Criterion<V> {
    fn from(values: Vec<V>) -> Self {
        Criterion(values)
    }
}

impl<V, const N: usize> From<[V; N]> for Criterion<V> {
    fn from(values: [V; N]) -> Self {
        Criterion(values.into())
    }
}

impl<V: Clone> From<&[V]> for Criterion<V> {
    fn from(values: &[V]) -> Self {
        Criterion(values.to_vec())
    }
}

/// Selects devices by their descriptor fields.
///
/// Every field that is set has to match; a field matches when the device's value is one of the
/// field's alternatives. Class, sub class and protocol of a device whose class is defined per
/// interface are matched against all of its alternate settings instead.
///
/// ```no_run
/// # fn main() -> usbkit::Result<()> {
/// let context = usbkit::Context::new()?;
/// let sticks = context.device_list(
///     &usbkit::DeviceFilter::new()
///         .class(usbkit::constants::class::MASS_STORAGE)
///         .product_id([0x5567, 0x5575]),
/// )?;
/// # Ok(()) }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeviceFilter {
    class: Option<Criterion<u8>>,
    sub_class: Option<Criterion<u8>>,
    protocol: Option<Criterion<u8>>,
    max_packet_size0: Option<Criterion<u8>>,
    vendor_id: Option<Criterion<u16>>,
    product_id: Option<Criterion<u16>>,
    bcd_usb: Option<Criterion<u16>>,
    bcd_device: Option<Criterion<u16>>,
}

impl DeviceFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn class(mut self, class: impl Into<Criterion<u8>>) -> Self {
        self.class = Some(class.into());
        self
    }

    pub fn sub_class(mut self, sub_class: impl Into<Criterion<u8>>) -> Self {
        self.sub_class = Some(sub_class.into());
        self
    }

    pub fn protocol(mut self, protocol: impl Into<Criterion<u8>>) -> Self {
        self.protocol = Some(protocol.into());
        self
    }

    pub fn max_packet_size0(mut self, size: impl Into<Criterion<u8>>) -> Self {
        self.max_packet_size0 = Some(size.into());
        self
    }

    pub fn vendor_id(mut self, vendor_id: impl Into<Criterion<u16>>) -> Self {
        self.vendor_id = Some(vendor_id.into());
        self
    }

    pub fn product_id(mut self, product_id: impl Into<Criterion<u16>>) -> Self {
        self.product_id = Some(product_id.into());
        self
    }

    pub fn bcd_usb(mut self, bcd_usb: impl Into<Criterion<u16>>) -> Self {
        self.bcd_usb = Some(bcd_usb.into());
        self
    }

    pub fn bcd_device(mut self, bcd_device: impl Into<Criterion<u16>>) -> Self {
        self.bcd_device = Some(bcd_device.into());
        self
    }

    /// Tests a single device against the filter.
    pub fn matches<T: Transport>(&self, device: &Device<T>) -> bool {
        let d = device.device_descriptor();
        let composite = d.class_code() == class::PER_INTERFACE;
        let needs_settings = composite
            && (self.class.is_some() || self.sub_class.is_some() || self.protocol.is_some());
        let settings = if needs_settings {
            device.settings()
        } else {
            Vec::new()
        };

        let interface_field = |criterion: &Option<Criterion<u8>>,
                               own: u8,
                               field: fn(&crate::InterfaceDescriptor) -> u8| {
            match criterion {
                None => true,
                Some(c) if composite => c.any_of(settings.iter().map(|s| field(s))),
                Some(c) => c.contains(&own),
            }
        };

        fn plain<V: PartialEq>(criterion: &Option<Criterion<V>>, value: V) -> bool {
            criterion.as_ref().map_or(true, |c| c.contains(&value))
        }

        interface_field(&self.class, d.class_code(), |s| s.class_code())
            && interface_field(&self.sub_class, d.sub_class_code(), |s| s.sub_class_code())
            && interface_field(&self.protocol, d.protocol_code(), |s| s.protocol_code())
            && plain(&self.max_packet_size0, d.max_packet_size())
            && plain(&self.vendor_id, d.vendor_id())
            && plain(&self.product_id, d.product_id())
            && plain(&self.bcd_usb, d.bcd_usb())
            && plain(&self.bcd_device, d.bcd_device())
    }
}

#[cfg(test)]
mod test {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::test_helpers::{mass_storage_config, MockDevice, MockTransport};

    fn context() -> Context<MockTransport> {
        let transport = MockTransport::new();
        transport.attach(MockDevice::new(1, 2, device_descriptor!(idVendor: 0x1234, idProduct: 3)));
        transport.attach(MockDevice::new(1, 5, device_descriptor!(idVendor: 0x1234, idProduct: 4)));
        transport.attach(
            MockDevice::new(2, 1, device_descriptor!(idVendor: 0x0781, idProduct: 0x5567))
                .with_config(mass_storage_config()),
        );
        Context::with_transport(transport)
    }

    fn addresses(devices: &[Device<MockTransport>]) -> Vec<(u8, u8)> {
        let mut a: Vec<_> = devices.iter().map(|d| (d.bus_number(), d.address())).collect();
        a.sort();
        a
    }

    #[test]
    fn it_lists_all_devices_without_criteria() {
        let ctx = context();
        assert_eq!(3, ctx.device_list(&DeviceFilter::new()).unwrap().len());
    }

    #[test]
    fn it_unions_set_valued_criteria() {
        let ctx = context();
        let both = ctx
            .device_list(&DeviceFilter::new().product_id([3, 4]))
            .unwrap();
        let mut union = ctx.device_list(&DeviceFilter::new().product_id(3)).unwrap();
        union.extend(ctx.device_list(&DeviceFilter::new().product_id(4)).unwrap());

        assert_eq!(addresses(&union), addresses(&both));
        assert_eq!(2, both.len());
    }

    #[test]
    fn it_requires_every_criterion() {
        let ctx = context();
        let none = ctx
            .device_list(&DeviceFilter::new().vendor_id(0x0781).product_id(3))
            .unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn it_matches_composite_devices_by_their_settings() {
        let ctx = context();
        let storage = ctx
            .device_list(&DeviceFilter::new().class(class::MASS_STORAGE).protocol(0x50))
            .unwrap();
        assert_eq!(vec![(2, 1)], addresses(&storage));

        let hid = ctx.device_list(&DeviceFilter::new().class(class::HID)).unwrap();
        assert!(hid.is_empty());
    }

    #[test]
    fn it_returns_early_when_the_flag_is_set() {
        let ctx = context();
        let flag = CompletionFlag::new();
        flag.set_completed();

        ctx.handle_events(None, Some(&flag)).unwrap();
        assert_eq!(0, ctx.transport().handle_events_calls());
    }

    #[test]
    fn it_propagates_event_errors() {
        let ctx = context();
        ctx.transport().fail_next_event(ErrorKind::Io);

        assert_eq!(
            ErrorKind::Io,
            ctx.handle_events(Some(Duration::ZERO), None).unwrap_err().kind()
        );
    }

    #[test]
    fn it_reports_pollfds_and_timeouts() {
        let ctx = context();
        ctx.transport().set_pollfds(Some(vec![Pollfd::new(7, POLLIN)]));
        ctx.transport().set_next_timeout(Some(Duration::from_millis(250)));

        let fds = ctx.pollfds().unwrap();
        assert_eq!(7, fds[0].fd());
        assert!(fds[0].is_readable());
        assert!(!fds[0].is_writable());
        assert_eq!(Some(Duration::from_millis(250)), ctx.next_timeout().unwrap());
    }

    #[test]
    fn it_replaces_pollfd_callbacks() {
        let ctx = context();
        let seen = Arc::new(Mutex::new(Vec::new()));

        ctx.on_pollfd_added(|_| panic!("replaced callback called"));
        let s = seen.clone();
        ctx.on_pollfd_added(move |pollfd| s.lock().unwrap().push(("added", pollfd.fd())));
        let s = seen.clone();
        ctx.on_pollfd_removed(move |fd| s.lock().unwrap().push(("removed", fd)));

        ctx.transport().emit_pollfd_added(Pollfd::new(9, POLLIN | POLLOUT));
        ctx.transport().emit_pollfd_removed(9);

        assert_eq!(vec![("added", 9), ("removed", 9)], *seen.lock().unwrap());
    }

    #[test]
    fn it_allows_pollfd_callbacks_to_replace_themselves() {
        let ctx = context();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let inner_ctx = ctx.clone();
        let s = seen.clone();

        ctx.on_pollfd_added(move |_| {
            let s = s.clone();
            inner_ctx.on_pollfd_added(move |pollfd| s.lock().unwrap().push(pollfd.fd()));
        });

        ctx.transport().emit_pollfd_added(Pollfd::new(1, POLLIN));
        ctx.transport().emit_pollfd_added(Pollfd::new(2, POLLIN));

        assert_eq!(vec![2], *seen.lock().unwrap());
    }

    #[test]
    fn it_refuses_to_exit_with_live_devices() {
        let ctx = context();
        let devices = ctx.devices().unwrap();

        let err = ctx.exit().unwrap_err();
        assert_eq!(ErrorKind::RemainingReferences, err.kind());
        drop(devices);
    }

    #[test]
    fn it_exits_once_unreferenced() {
        let ctx = context();
        drop(ctx.devices().unwrap());
        ctx.exit().unwrap();
    }
}

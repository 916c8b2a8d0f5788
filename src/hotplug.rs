use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, TryLockError, Weak,
    },
};

use tracing::{debug, warn};

use crate::{
    context::{Context, ContextInner},
    device::Device,
    error::{Error, Result},
    lock,
    transport::{HotplugSink, Transport},
};

/// The kind of change a hotplug callback is told about.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum HotplugEvent {
    /// A device has been plugged in and is ready to use.
    Arrived,
    /// A device has left and is no longer available.
    Left,
}

/// What happens to a registration after its callback returned.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum HotplugAction {
    /// Keep the callback armed.
    Repeat,
    /// Deregister the callback.
    Finish,
}

/// Which devices and events a hotplug registration is interested in.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct HotplugFilter {
    pub vendor_id: Option<u16>,
    pub product_id: Option<u16>,
    pub class: Option<u8>,
    pub arrived: bool,
    pub left: bool,
    pub enumerate: bool,
}

impl Default for HotplugFilter {
    fn default() -> Self {
        HotplugFilter {
            vendor_id: None,
            product_id: None,
            class: None,
            arrived: true,
            left: true,
            enumerate: false,
        }
    }
}

impl HotplugFilter {
    /// Tests whether a device with the given ids and class passes the filter.
    pub fn accepts(&self, vendor_id: u16, product_id: u16, class: u8, event: HotplugEvent) -> bool {
        let wanted = match event {
            HotplugEvent::Arrived => self.arrived,
            HotplugEvent::Left => self.left,
        };

        wanted
            && self.vendor_id.map_or(true, |v| v == vendor_id)
            && self.product_id.map_or(true, |p| p == product_id)
            && self.class.map_or(true, |c| c == class)
    }
}

/// Builds a hotplug registration.
///
/// ```no_run
/// use usbkit::{Context, HotplugAction, HotplugBuilder};
///
/// # fn main() -> usbkit::Result<()> {
/// let context = Context::new()?;
/// let registration = HotplugBuilder::new()
///     .vendor_id(0x0781)
///     .enumerate(true)
///     .register(&context, |device, event| {
///         println!("{:?} {}", event, device.describe());
///         HotplugAction::Repeat
///     })?;
///
/// loop {
///     context.handle_events(None, None)?;
/// }
/// # }
/// ```
#[derive(Copy, Clone, Debug, Default)]
pub struct HotplugBuilder {
    filter: HotplugFilter,
}

impl HotplugBuilder {
    /// Returns a builder matching every device and both events.
    pub fn new() -> Self {
        HotplugBuilder::default()
    }

    /// Devices can optionally be filtered by vendor
    pub fn vendor_id(&mut self, vendor_id: u16) -> &mut Self {
        self.filter.vendor_id = Some(vendor_id);
        self
    }

    /// Devices can optionally be filtered by product id
    pub fn product_id(&mut self, product_id: u16) -> &mut Self {
        self.filter.product_id = Some(product_id);
        self
    }

    /// Devices can optionally be filtered by class
    pub fn class(&mut self, class: u8) -> &mut Self {
        self.filter.class = Some(class);
        self
    }

    /// Selects whether arrivals are reported.
    pub fn arrived(&mut self, arrived: bool) -> &mut Self {
        self.filter.arrived = arrived;
        self
    }

    /// Selects whether departures are reported.
    pub fn left(&mut self, left: bool) -> &mut Self {
        self.filter.left = left;
        self
    }

    /// If `enumerate` is `true`, the callback is called with [`HotplugEvent::Arrived`] for every
    /// matching device that is already attached, before `register` returns.
    ///
    /// This pass races with regular notifications: the same device may be reported as arrived
    /// twice, and a device may be reported as left without a prior arrival.
    pub fn enumerate(&mut self, enumerate: bool) -> &mut Self {
        self.filter.enumerate = enumerate;
        self
    }

    /// Registers `callback` for the selected events.
    ///
    /// The callback runs inside [`Context::handle_events`] (and inside this call when
    /// enumerating). It stays armed until it returns [`HotplugAction::Finish`], the registration
    /// is deregistered or the context is dropped. Dropping the returned handle does not
    /// deregister the callback.
    ///
    /// The context owns the callback, so a callback that captures a clone of `context` keeps the
    /// session alive: it is only released once the callback returns
    /// [`HotplugAction::Finish`] or is deregistered through the returned handle.
    pub fn register<T, F>(self, context: &Context<T>, callback: F) -> Result<HotplugHandle<T>>
    where
        T: Transport,
        F: FnMut(Device<T>, HotplugEvent) -> HotplugAction + Send + 'static,
    {
        if !self.filter.arrived && !self.filter.left {
            return Err(Error::invalid_argument("no hotplug event selected"));
        }

        let inner = context.inner();
        let id = inner.next_hotplug_id.fetch_add(1, Ordering::Relaxed);
        let slot = Arc::new(HotplugSlot {
            context: Arc::downgrade(inner),
            id,
            callback: Mutex::new(Box::new(callback)),
            registration: Mutex::new(None),
            finished: AtomicBool::new(false),
        });

        lock(&inner.hotplug).insert(id, slot.clone());

        let sink: Arc<dyn HotplugSink<T>> = slot.clone();
        let registration = match inner.transport.register_hotplug(&self.filter, sink) {
            Ok(registration) => registration,
            Err(err) => {
                lock(&inner.hotplug).remove(&id);
                return Err(err);
            }
        };
        debug!(id, ?registration, filter = ?self.filter, "registered hotplug callback");

        // The enumeration pass may already have finished the callback.
        let mut stored = lock(&slot.registration);
        if slot.finished.load(Ordering::SeqCst) {
            drop(stored);
            lock(&inner.hotplug).remove(&id);
            inner.transport.deregister_hotplug(registration);
            debug!(id, "hotplug callback finished during enumeration");
        } else {
            *stored = Some(registration);
        }

        Ok(HotplugHandle {
            context: Arc::downgrade(inner),
            id,
        })
    }
}

/// Identifies an armed hotplug callback.
pub struct HotplugHandle<T: Transport> {
    context: Weak<ContextInner<T>>,
    id: u64,
}

impl<T: Transport> HotplugHandle<T> {
    /// Disarms the callback. Does nothing if it already finished.
    pub fn deregister(self) {
        if let Some(inner) = self.context.upgrade() {
            let slot = lock(&inner.hotplug).remove(&self.id);

            if let Some(slot) = slot {
                slot.finished.store(true, Ordering::SeqCst);
                if let Some(registration) = lock(&slot.registration).take() {
                    inner.transport.deregister_hotplug(registration);
                    debug!(id = self.id, "deregistered hotplug callback");
                }
            }
        }
    }

    /// Tests whether the callback is still armed.
    pub fn is_registered(&self) -> bool {
        self.context
            .upgrade()
            .map_or(false, |inner| lock(&inner.hotplug).contains_key(&self.id))
    }
}

impl<T: Transport> fmt::Debug for HotplugHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HotplugHandle").field("id", &self.id).finish()
    }
}

type HotplugCallback<T> = Box<dyn FnMut(Device<T>, HotplugEvent) -> HotplugAction + Send>;

/// The context's side of one registration. It owns the user's closure for as long as the
/// registration is armed.
pub(crate) struct HotplugSlot<T: Transport> {
    context: Weak<ContextInner<T>>,
    id: u64,
    callback: Mutex<HotplugCallback<T>>,
    registration: Mutex<Option<T::Registration>>,
    finished: AtomicBool,
}

impl<T: Transport> HotplugSlot<T> {
    fn finish(&self, inner: &ContextInner<T>) {
        self.finished.store(true, Ordering::SeqCst);
        lock(&inner.hotplug).remove(&self.id);

        if let Some(registration) = lock(&self.registration).take() {
            inner.transport.deregister_hotplug(registration);
            debug!(id = self.id, "hotplug callback finished");
        }
    }
}

impl<T: Transport> HotplugSink<T> for HotplugSlot<T> {
    fn notify(&self, native: T::Device, event: HotplugEvent) {
        if self.finished.load(Ordering::SeqCst) {
            return;
        }
        let inner = match self.context.upgrade() {
            Some(inner) => inner,
            None => return,
        };
        let device = match Device::new(Context::from_inner(inner.clone()), native) {
            Ok(device) => device,
            Err(err) => {
                debug!(id = self.id, %err, "dropping hotplug event for unreadable device");
                return;
            }
        };

        let action = match self.callback.try_lock() {
            Ok(mut callback) => callback(device, event),
            Err(TryLockError::Poisoned(poisoned)) => (poisoned.into_inner())(device, event),
            Err(TryLockError::WouldBlock) => {
                warn!(id = self.id, ?event, "hotplug callback re-entered; event dropped");
                return;
            }
        };

        if action == HotplugAction::Finish {
            self.finish(&inner);
        }
    }
}

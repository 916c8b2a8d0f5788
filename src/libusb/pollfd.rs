use std::{
    ffi::{c_int, c_short, c_void},
    panic::{self, AssertUnwindSafe},
    ptr::{self, NonNull},
    sync::Arc,
};

use libusb1_sys::*;
use tracing::error;

use crate::{context::Pollfd, transport::PollfdSink};

/// The event sources the context currently waits on, or `None` where the platform can't
/// expose them.
pub(super) fn current(context: *mut libusb_context) -> Option<Vec<Pollfd>> {
    unsafe {
        let list = libusb_get_pollfds(context);
        let mut cursor = NonNull::new(list.cast_mut())?;

        let mut pollfds = Vec::new();
        while let Some(pollfd) = NonNull::new(*cursor.as_ptr()) {
            pollfds.push(Pollfd::new(pollfd.as_ref().fd, pollfd.as_ref().events));
            cursor = cursor.add(1);
        }

        libusb_free_pollfds(list);
        Some(pollfds)
    }
}

/// # Safety
///
/// `sink` must stay at its address until the notifiers are cleared or replaced.
pub(super) unsafe fn install(context: *mut libusb_context, sink: &Arc<dyn PollfdSink>) {
    let user_data = sink as *const Arc<dyn PollfdSink> as *mut c_void;
    libusb_set_pollfd_notifiers(context, Some(added), Some(removed), user_data);
}

pub(super) unsafe fn clear(context: *mut libusb_context) {
    libusb_set_pollfd_notifiers(context, None, None, ptr::null_mut());
}

extern "system" fn added(fd: c_int, events: c_short, user_data: *mut c_void) {
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        let sink = unsafe { &*user_data.cast::<Arc<dyn PollfdSink>>() };
        sink.added(Pollfd::new(fd, events));
    }));

    if result.is_err() {
        error!(fd, "pollfd handler panicked");
    }
}

extern "system" fn removed(fd: c_int, user_data: *mut c_void) {
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        let sink = unsafe { &*user_data.cast::<Arc<dyn PollfdSink>>() };
        sink.removed(fd);
    }));

    if result.is_err() {
        error!(fd, "pollfd handler panicked");
    }
}

use std::{
    cell::Cell,
    task::{RawWaker, RawWakerVTable, Waker},
};

static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, wake, wake, drop_waker);

unsafe fn clone(_: *const ()) -> RawWaker {
    raw_waker()
}

unsafe fn wake(_: *const ()) {
    set_poll()
}

unsafe fn drop_waker(_: *const ()) {}

fn raw_waker() -> RawWaker {
    // the pointer is never dereferenced so null is ok
    RawWaker::new(std::ptr::null::<()>(), &VTABLE)
}

/// Waker for the root future. Waking only raises the thread's poll flag.
pub(crate) fn flag_waker() -> Waker {
    unsafe { Waker::from_raw(raw_waker()) }
}

thread_local! {pub(crate) static SHOULD_POLL: Cell<bool> = Cell::new(true)}

/// Takes the poll flag.
#[inline]
pub(crate) fn should_poll() -> bool {
    SHOULD_POLL.with(|b| b.replace(false))
}

/// Reads the poll flag without clearing it.
#[inline]
pub(crate) fn poll_requested() -> bool {
    SHOULD_POLL.with(|b| b.get())
}

pub(crate) fn set_poll() {
    SHOULD_POLL.with(|b| b.set(true))
}

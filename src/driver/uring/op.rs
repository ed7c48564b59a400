use std::{
    any::Any,
    future::Future,
    io,
    pin::Pin,
    task::{Context, Poll},
};

use io_uring::squeue;
use slotmap::{new_key_type, SlotMap};

use super::{lifecycle::Lifecycle, InnerHandle};

// In-flight operation
pub(crate) struct Op<T: 'static> {
    // Driver running the operation
    pub(super) driver: InnerHandle,

    // Operation key in the slab
    pub(super) key: OpsKey,

    // Per-operation data, kept alive until the kernel is done with it
    pub(super) data: Option<T>,
}

new_key_type! {
    /// Key for ops
    pub(crate) struct OpsKey;
}

pub(super) struct Ops {
    slot: SlotMap<OpsKey, Lifecycle>,
}

#[derive(Debug)]
pub(crate) struct Completion<T> {
    pub(crate) data: T,
    pub(crate) result: io::Result<u32>,
}

impl<T: 'static> Op<T> {
    pub(super) fn new(driver: InnerHandle, key: OpsKey, data: T) -> Op<T> {
        Op {
            driver,
            key,
            data: Some(data),
        }
    }

    /// Submit an operation to uring on the current thread's driver.
    ///
    /// `f` builds the submission entry from the operation data, optionally followed by a linked
    /// entry (a `LinkTimeout`, say) carrying its own reserved user data. Any memory the entries
    /// point into must live on the heap inside `data`.
    ///
    /// Panics if no driver is running on this thread.
    pub(crate) fn submit_with<F>(data: T, f: F) -> io::Result<Op<T>>
    where
        F: FnOnce(&mut T) -> (squeue::Entry, Option<squeue::Entry>),
    {
        super::CURRENT.with(|inner_rc| {
            let inner_ref = unsafe { &mut *inner_rc.get() };
            inner_ref.submit_with(inner_rc, data, f)
        })
    }
}

impl<T> Future for Op<T>
where
    T: Unpin + 'static,
{
    type Output = Completion<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        use std::mem;

        let me = &mut *self;
        let inner = unsafe { &mut *me.driver.get() };
        let lifecycle = inner
            .ops
            .slot
            .get_mut(me.key)
            .expect("invalid internal state");
        match mem::replace(lifecycle, Lifecycle::Submitted) {
            Lifecycle::Submitted => {
                *lifecycle = Lifecycle::Waiting(cx.waker().clone());
                Poll::Pending
            }
            Lifecycle::Waiting(waker) if !waker.will_wake(cx.waker()) => {
                *lifecycle = Lifecycle::Waiting(cx.waker().clone());
                Poll::Pending
            }
            Lifecycle::Waiting(waker) => {
                *lifecycle = Lifecycle::Waiting(waker);
                Poll::Pending
            }
            Lifecycle::Ignored(..) => unreachable!(),
            Lifecycle::Completed(result, _flags) => {
                inner.ops.remove(me.key);
                Poll::Ready(Completion {
                    data: me.data.take().expect("unexpected operation state"),
                    result,
                })
            }
        }
    }
}

impl<T: 'static> Drop for Op<T> {
    fn drop(&mut self) {
        let inner = unsafe { &mut *self.driver.get() };
        let Some(lifecycle) = inner.ops.slot.get_mut(self.key) else {
            // Already reaped by `poll`
            return;
        };

        match lifecycle {
            Lifecycle::Submitted | Lifecycle::Waiting(_) => {
                let data: Box<dyn Any> = match self.data.take() {
                    Some(data) => Box::new(data),
                    None => Box::new(()),
                };
                *lifecycle = Lifecycle::Ignored(data);
                inner.cancel(self.key);
            }
            Lifecycle::Completed(..) => inner.ops.remove(self.key),
            Lifecycle::Ignored(..) => unreachable!(),
        }
    }
}

impl Ops {
    pub(super) fn new() -> Self {
        Ops {
            slot: SlotMap::with_capacity_and_key(64),
        }
    }

    pub(super) fn insert(&mut self) -> OpsKey {
        self.slot.insert(Lifecycle::Submitted)
    }

    pub(super) fn remove(&mut self, key: OpsKey) {
        self.slot.remove(key);
    }

    pub(super) fn len(&self) -> usize {
        self.slot.len()
    }

    pub(super) fn complete(&mut self, key: OpsKey, result: io::Result<u32>, flags: u32) {
        let Some(lifecycle) = self.slot.get_mut(key) else {
            log::debug!("completion for unknown operation {:?}", key);
            return;
        };
        if lifecycle.complete(result, flags) {
            self.slot.remove(key);
        }
    }
}

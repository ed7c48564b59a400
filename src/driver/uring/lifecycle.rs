use std::{io, task::Waker};

pub(crate) enum Lifecycle {
    /// The operation has been submitted to uring and is currently in-flight
    Submitted,

    /// The submitter is waiting for the completion of the operation
    Waiting(Waker),

    /// The submitter no longer has interest in the operation result. The state must be passed to
    /// the driver and held until the operation completes. The box is never read, it only keeps
    /// memory the kernel may still write to alive
    Ignored(#[allow(dead_code)] Box<dyn std::any::Any>),

    /// The operation has completed
    Completed(io::Result<u32>, u32),
}

impl Lifecycle {
    /// Records the completion. Returns `true` if nobody is left to observe it and the slot can be
    /// freed right away.
    pub(super) fn complete(&mut self, result: io::Result<u32>, flags: u32) -> bool {
        match std::mem::replace(self, Lifecycle::Submitted) {
            Lifecycle::Submitted => {
                *self = Lifecycle::Completed(result, flags);
                false
            }
            Lifecycle::Waiting(waker) => {
                *self = Lifecycle::Completed(result, flags);
                waker.wake();
                false
            }
            Lifecycle::Ignored(..) => true,
            Lifecycle::Completed(..) => {
                log::warn!("operation completed twice, keeping the first result");
                false
            }
        }
    }
}

use std::{cell::UnsafeCell, io, rc::Rc};

use io_uring::{cqueue, opcode, squeue, IoUring};
use slotmap::{Key, KeyData};

use self::op::{Ops, OpsKey};
use crate::executor::Config;

pub(crate) use self::op::Op;

mod lifecycle;
mod op;

scoped_tls::scoped_thread_local!(pub(super) static CURRENT: InnerHandle);

pub(crate) const CANCEL_USERDATA: u64 = u64::MAX;
pub(crate) const TIMEOUT_USERDATA: u64 = u64::MAX - 1;
pub(crate) const MIN_REVERSED_USERDATA: u64 = u64::MAX - 2;

pub(crate) struct UringInner {
    ops: Ops,
    uring: IoUring,
}

impl UringInner {
    fn tick(&mut self) {
        let mut cq = self.uring.completion();
        cq.sync();

        for cqe in cq {
            if cqe.user_data() >= MIN_REVERSED_USERDATA {
                // Result of a cancellation or a linked timeout. The operation they target
                // reports through its own CQE.
                continue;
            }

            let key = OpsKey::from(KeyData::from_ffi(cqe.user_data()));
            self.ops.complete(key, resultify(&cqe), cqe.flags())
        }
    }

    fn submit(&mut self) -> io::Result<()> {
        loop {
            match self.uring.submit() {
                Ok(_) => {
                    self.uring.submission().sync();
                    return Ok(());
                }
                Err(ref e) if e.raw_os_error() == Some(libc::EBUSY) => {
                    self.tick();
                }
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
    }

    /// Flushes the submission queue to the kernel if fewer than `need` slots are free.
    fn flush_space(&mut self, need: usize) -> io::Result<()> {
        let sq = self.uring.submission();
        debug_assert!(sq.capacity() >= need);
        if sq.len() + need > sq.capacity() {
            drop(sq);
            self.submit()?;
        }
        Ok(())
    }

    pub(super) fn submit_with<T, F>(
        &mut self,
        this: &InnerHandle,
        mut data: T,
        f: F,
    ) -> io::Result<Op<T>>
    where
        F: FnOnce(&mut T) -> (squeue::Entry, Option<squeue::Entry>),
    {
        self.flush_space(2)?;

        let (entry, linked) = f(&mut data);
        let key = self.ops.insert();
        let entry = entry.user_data(key.data().as_ffi());

        let pushed = {
            let mut sq = self.uring.submission();
            unsafe {
                match linked {
                    Some(linked) => sq
                        .push(&entry.flags(squeue::Flags::IO_LINK))
                        .and_then(|_| sq.push(&linked)),
                    None => sq.push(&entry),
                }
            }
        };
        if pushed.is_err() {
            self.ops.remove(key);
            return Err(io::Error::new(
                io::ErrorKind::Other,
                "io_uring submission queue is full",
            ));
        }

        Ok(Op::new(this.clone(), key, data))
    }

    /// Asks the kernel to cancel an in-flight operation. Its slot stays until the kernel reports
    /// the operation as finished.
    pub(super) fn cancel(&mut self, key: OpsKey) {
        if let Err(err) = self.flush_space(1) {
            log::debug!("could not make room to cancel {:?}: {}", key, err);
            return;
        }

        let entry = opcode::AsyncCancel::new(key.data().as_ffi())
            .build()
            .user_data(CANCEL_USERDATA);
        let mut sq = self.uring.submission();
        if unsafe { sq.push(&entry) }.is_err() {
            log::debug!("submission queue full, cannot cancel {:?}", key);
        }
    }
}

pub(crate) struct IoUringDriver {
    inner: InnerHandle,
}

pub(super) type InnerHandle = Rc<UnsafeCell<UringInner>>;

impl IoUringDriver {
    pub(crate) fn new(config: &Config) -> io::Result<Self> {
        let mut builder = IoUring::builder();
        if let Some(idle) = config.sqpoll_idle {
            builder.setup_sqpoll(idle);
        }
        let uring = builder.build(config.entries)?;
        log::debug!("io_uring driver ready with {} entries", config.entries);

        let inner = Rc::new(UnsafeCell::new(UringInner {
            ops: Ops::new(),
            uring,
        }));

        Ok(Self { inner })
    }

    /// Flushes queued submissions and reaps whatever has completed.
    pub(crate) fn submit(&self) -> io::Result<()> {
        let inner = unsafe { &mut *self.inner.get() };
        inner.submit()?;
        inner.tick();
        Ok(())
    }

    /// Blocks until at least one in-flight operation completes. Returns right away when nothing
    /// is in flight.
    pub(crate) fn park(&self) -> io::Result<()> {
        let inner = unsafe { &mut *self.inner.get() };

        if inner.ops.len() > 0 {
            match inner.uring.submit_and_wait(1) {
                Ok(_) => {}
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }

        // Process CQ
        inner.tick();
        Ok(())
    }

    /// Makes this driver the one [`Op`]s on this thread submit to while `f` runs.
    pub(crate) fn with<R>(&self, f: impl FnOnce() -> R) -> R {
        CURRENT.set(&self.inner, f)
    }

    pub(crate) fn num_operations(&self) -> usize {
        let inner = self.inner.get();
        unsafe { (*inner).ops.len() }
    }
}

/// Whether a driver is running on the current thread.
pub(crate) fn is_running() -> bool {
    CURRENT.is_set()
}

/// Operations the current thread's driver still tracks, cancelled ones included.
#[cfg(test)]
pub(crate) fn in_flight() -> usize {
    CURRENT.with(|inner| unsafe { (*inner.get()).ops.len() })
}

fn resultify(cqe: &cqueue::Entry) -> io::Result<u32> {
    let res = cqe.result();

    if res >= 0 {
        Ok(res as u32)
    } else {
        Err(io::Error::from_raw_os_error(-res))
    }
}

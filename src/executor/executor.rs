use std::{
    future::Future,
    pin::pin,
    task::{Context, Poll},
};

use super::{
    waker_fn::{flag_waker, poll_requested, set_poll, should_poll},
    Config,
};
use crate::{driver::IoUringDriver, error::Result};

scoped_tls::scoped_thread_local!(static LOCAL_EX: LocalExecutor);

/// Runs a future on the current thread, parking on io_uring while it waits for sockets.
///
/// Operations driven through [`UringScheduler`](crate::driver::UringScheduler) must run inside
/// [`LocalExecutor::run`]. Concurrent operations are expressed by joining their futures.
pub struct LocalExecutor {
    driver: IoUringDriver,
}

impl LocalExecutor {
    pub fn new() -> Result<Self> {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Result<Self> {
        let driver = IoUringDriver::new(&config)?;
        Ok(Self { driver })
    }

    pub fn run<T>(&mut self, future: impl Future<Output = T>) -> T {
        let run = |this: &Self| {
            let waker = flag_waker();
            let cx = &mut Context::from_waker(&waker);

            let mut root = pin!(future);
            set_poll();
            this.driver.with(|| loop {
                if should_poll() {
                    if let Poll::Ready(t) = root.as_mut().poll(cx) {
                        return t;
                    }
                }

                if let Err(err) = this.driver.submit() {
                    log::warn!("io_uring submit failed: {}", err);
                }
                if poll_requested() {
                    continue;
                }

                if this.driver.num_operations() == 0 {
                    // Nothing in flight could wake the root future, so poll it again
                    set_poll();
                    continue;
                }

                if let Err(err) = this.driver.park() {
                    log::warn!("io_uring park failed: {}", err);
                }
            })
        };

        assert!(
            !LOCAL_EX.is_set(),
            "There is already a LocalExecutor running on this thread."
        );

        let this: &Self = self;
        LOCAL_EX.set(this, || run(this))
    }
}

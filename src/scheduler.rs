//! The cooperative scheduler seen from the driver loop.
//!
//! A scheduler offers two suspension points, [`Scheduler::wait_read`] and
//! [`Scheduler::wait_write`], and signals an expired deadline with [`WaitError::TimedOut`].
//! Every other failure is reported through [`Scheduler::report`].
//!
//! Operations started with [`drive`](crate::drive::drive) use the process-wide scheduler. It is
//! registered once with [`install`]; if nothing was installed before the first operation runs,
//! the bundled [`UringScheduler`] is registered instead.
use std::{
    future::Future,
    io,
    os::unix::io::RawFd,
    pin::Pin,
    time::Duration,
};

use once_cell::sync::OnceCell;

use crate::{
    driver::UringScheduler,
    error::{Error, Result},
    status::Status,
};

/// Pending socket wait handed out by a [`Scheduler`].
pub type WaitFuture<'a> = Pin<Box<dyn Future<Output = Result<(), WaitError>> + 'a>>;

#[derive(Debug, thiserror::Error)]
pub enum WaitError {
    /// The scheduler's own timeout signal
    #[error("timed out waiting for socket readiness")]
    TimedOut,

    #[error("no scheduler is running on this thread")]
    NotRunning,

    /// A non-terminal readiness code that requests neither read nor write
    #[error("readiness code {0:?} requests neither read nor write")]
    NoInterest(Status),

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub trait Scheduler {
    /// Suspends the calling task until `fd` is readable or `timeout` expires.
    fn wait_read(&self, fd: RawFd, timeout: Option<Duration>) -> WaitFuture<'_>;

    /// Suspends the calling task until `fd` is writable or `timeout` expires.
    fn wait_write(&self, fd: RawFd, timeout: Option<Duration>) -> WaitFuture<'_>;

    /// Diagnostic channel for wait failures that are not timeouts.
    fn report(&self, err: &WaitError) {
        log::error!("socket wait failed, resuming operation as timed out: {}", err);
    }
}

static GLOBAL: OnceCell<Box<dyn Scheduler + Send + Sync>> = OnceCell::new();

/// Registers the process-wide scheduler.
///
/// Must run before the first operation is driven through [`global`]. Fails with
/// [`Error::SchedulerInstalled`] once a scheduler is registered, the lazily registered default
/// included.
pub fn install<S>(scheduler: S) -> Result<()>
where
    S: Scheduler + Send + Sync + 'static,
{
    GLOBAL
        .set(Box::new(scheduler))
        .map_err(|_| Error::SchedulerInstalled)
}

/// Whether a process-wide scheduler is registered.
pub fn is_installed() -> bool {
    GLOBAL.get().is_some()
}

/// The process-wide scheduler, registering [`UringScheduler`] on first use if needed.
pub fn global() -> &'static (dyn Scheduler + Send + Sync) {
    GLOBAL
        .get_or_init(|| {
            log::debug!("no scheduler installed, falling back to io_uring");
            Box::new(UringScheduler)
        })
        .as_ref()
}

#[cfg(test)]
mod test {
    use super::{global, install, is_installed, WaitError};
    use crate::{driver::UringScheduler, error::Error, status::Status};

    #[test]
    fn test_install_after_first_use() {
        let _ = global();
        assert!(is_installed());

        match install(UringScheduler) {
            Err(Error::SchedulerInstalled) => {}
            other => panic!("unexpected install result: {:?}", other),
        }
    }

    #[test]
    fn test_wait_error_display() {
        let err = WaitError::NoInterest(Status::TIMEOUT);
        assert_eq!(
            err.to_string(),
            "readiness code TIMEOUT requests neither read nor write"
        );

        let err = WaitError::from(std::io::Error::from_raw_os_error(libc::EPIPE));
        assert!(matches!(err, WaitError::Io(_)));
    }
}

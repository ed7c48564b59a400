//! Suspending a foreign operation on its socket.
//!
//! The foreign state machine only understands readiness codes, so nothing raised while waiting
//! may escape: every failure is folded into [`Status::TIMEOUT`] and the next `continue` step
//! decides whether the operation failed.
use crate::{
    drive::Connection,
    scheduler::{Scheduler, WaitError},
    status::{Interest, Status},
    timeout::resolve_timeout,
};

/// How a failed wait is surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    /// The scheduler's timeout signal. Dropped silently.
    Suppressed,
    /// Anything else. Reported through [`Scheduler::report`].
    Escalated,
}

/// Only the scheduler's timeout signal is suppressed. A code that requests neither read nor
/// write ([`WaitError::NoInterest`]) counts as a fault of the foreign library and is escalated
/// like scheduler and socket errors.
pub fn classify_wait_failure(err: &WaitError) -> Failure {
    match err {
        WaitError::TimedOut => Failure::Suppressed,
        WaitError::NotRunning | WaitError::NoInterest(_) | WaitError::Io(_) => Failure::Escalated,
    }
}

/// Picks the socket condition to wait for. Read wins when both bits are set.
pub fn wait_intent(status: Status) -> Option<Interest> {
    if status.contains(Status::READ) {
        Some(Interest::Read)
    } else if status.contains(Status::WRITE) {
        Some(Interest::Write)
    } else {
        None
    }
}

/// Waits on `conn` for what `status` asks and returns the code to resume the operation with.
///
/// That is the chosen intent on success ([`Status::READ`] or [`Status::WRITE`], without the
/// timeout bit) and [`Status::TIMEOUT`] on any failure.
pub async fn wait<D, C>(scheduler: &D, status: Status, conn: &C) -> Status
where
    D: Scheduler + ?Sized,
    C: Connection + ?Sized,
{
    match try_wait(scheduler, status, conn).await {
        Ok(interest) => interest.into(),
        Err(err) => escalate(scheduler, &err),
    }
}

async fn try_wait<D, C>(scheduler: &D, status: Status, conn: &C) -> Result<Interest, WaitError>
where
    D: Scheduler + ?Sized,
    C: Connection + ?Sized,
{
    let timeout = resolve_timeout(status, conn);
    let fd = conn.socket()?;
    let interest = wait_intent(status).ok_or(WaitError::NoInterest(status))?;

    log::trace!("fd {} waiting for {:?}, timeout {:?}", fd, interest, timeout);
    match interest {
        Interest::Read => scheduler.wait_read(fd, timeout).await?,
        Interest::Write => scheduler.wait_write(fd, timeout).await?,
    }
    Ok(interest)
}

fn escalate<D>(scheduler: &D, err: &WaitError) -> Status
where
    D: Scheduler + ?Sized,
{
    match classify_wait_failure(err) {
        Failure::Suppressed => log::trace!("socket wait timed out"),
        Failure::Escalated => scheduler.report(err),
    }
    Status::TIMEOUT
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::{classify_wait_failure, wait, wait_intent, Failure};
    use crate::{
        scheduler::WaitError,
        status::{Interest, Status},
        testing::{block_on, init, FakeConn, RecordingScheduler},
    };

    #[test]
    fn test_intent() {
        let timeout = Status::TIMEOUT;

        assert_eq!(wait_intent(Status::READ), Some(Interest::Read));
        assert_eq!(wait_intent(Status::READ | timeout), Some(Interest::Read));
        assert_eq!(wait_intent(Status::WRITE), Some(Interest::Write));
        assert_eq!(wait_intent(Status::WRITE | timeout), Some(Interest::Write));
        assert_eq!(wait_intent(Status::READ | Status::WRITE), Some(Interest::Read));
        assert_eq!(
            wait_intent(Status::READ | Status::WRITE | timeout),
            Some(Interest::Read)
        );
        assert_eq!(wait_intent(timeout), None);
        assert_eq!(wait_intent(Status::EXCEPT), None);
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify_wait_failure(&WaitError::TimedOut), Failure::Suppressed);
        assert_eq!(classify_wait_failure(&WaitError::NotRunning), Failure::Escalated);
        assert_eq!(
            classify_wait_failure(&WaitError::NoInterest(Status::TIMEOUT)),
            Failure::Escalated
        );
        let io = std::io::Error::from_raw_os_error(libc::ECONNRESET);
        assert_eq!(classify_wait_failure(&WaitError::Io(io)), Failure::Escalated);
    }

    #[test]
    fn test_success_returns_intent_only() {
        init();
        let scheduler = RecordingScheduler::new();
        let conn = FakeConn::new().fd(7).timeout_ms(500);

        let status = block_on(wait(&scheduler, Status::READ | Status::TIMEOUT, &conn));
        assert_eq!(status, Status::READ);
        assert_eq!(
            scheduler.calls(),
            vec![(Interest::Read, 7, Some(Duration::from_millis(500)))]
        );

        let status = block_on(wait(&scheduler, Status::READ | Status::WRITE, &conn));
        assert_eq!(status, Status::READ);

        let status = block_on(wait(&scheduler, Status::WRITE, &conn));
        assert_eq!(status, Status::WRITE);
        assert_eq!(scheduler.calls()[2], (Interest::Write, 7, None));
        assert_eq!(scheduler.reports(), 0);
    }

    #[test]
    fn test_timeout_signal_is_suppressed() {
        init();
        let scheduler = RecordingScheduler::new();
        scheduler.fail_next(WaitError::TimedOut);
        let conn = FakeConn::new();

        let status = block_on(wait(&scheduler, Status::READ | Status::TIMEOUT, &conn));
        assert_eq!(status, Status::TIMEOUT);
        assert_eq!(scheduler.reports(), 0);
    }

    #[test]
    fn test_fault_is_reported_once() {
        init();
        let scheduler = RecordingScheduler::new();
        scheduler.fail_next(std::io::Error::from_raw_os_error(libc::EBADF).into());
        let conn = FakeConn::new();

        let status = block_on(wait(&scheduler, Status::READ, &conn));
        assert_eq!(status, Status::TIMEOUT);
        assert_eq!(scheduler.reports(), 1);
    }

    #[test]
    fn test_socket_fault_skips_scheduler() {
        init();
        let scheduler = RecordingScheduler::new();
        let conn = FakeConn::new().broken_socket();

        let status = block_on(wait(&scheduler, Status::WRITE, &conn));
        assert_eq!(status, Status::TIMEOUT);
        assert!(scheduler.calls().is_empty());
        assert_eq!(scheduler.reports(), 1);
    }

    #[test]
    fn test_missing_intent_is_escalated() {
        init();
        let scheduler = RecordingScheduler::new();
        let conn = FakeConn::new().timeout_ms(10);

        let status = block_on(wait(&scheduler, Status::TIMEOUT, &conn));
        assert_eq!(status, Status::TIMEOUT);
        assert!(scheduler.calls().is_empty());
        assert_eq!(scheduler.reports(), 1);
    }
}

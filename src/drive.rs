//! The completion loop shared by every non-blocking operation.
//!
//! A non-blocking foreign operation is a pair of steps. `start` begins it and `continue`
//! resumes it after a wait, and both write the operation's result into an out-parameter and
//! return a [`Status`]. [`complete`] alternates those steps with socket waits until the status
//! is terminal:
//!
//! ```text
//! status = start(slot, handle, args)
//! while status != 0:
//!     status = wait(status, handle.connection())
//!     status = continue(slot, handle, status)
//! return slot
//! ```
//!
//! The handle is borrowed mutably for the whole loop, so a handle can never be driven by two
//! loops at once.
use std::{io, os::unix::io::RawFd};

use tracing::Instrument;

use crate::{
    scheduler::{self, Scheduler},
    status::Status,
    wait::wait,
};

/// The foreign connection a wait is performed on.
pub trait Connection {
    /// Socket descriptor to wait on.
    fn socket(&self) -> io::Result<RawFd>;

    /// Current timeout hint in milliseconds, [`NO_TIMEOUT`](crate::timeout::NO_TIMEOUT) for none.
    fn timeout_ms(&self) -> i64;
}

/// Anything an operation runs against: a connection, or an object such as a result set that
/// resolves to the connection owning it.
pub trait Handle {
    type Connection: Connection + ?Sized;

    fn connection(&self) -> &Self::Connection;
}

/// Compile-time description of one non-blocking operation.
///
/// Usually generated with [`nonblocking!`](crate::nonblocking).
pub trait Operation {
    type Handle: Handle + ?Sized;

    /// The operation's natural arguments, handed to `start` verbatim.
    type Args<'a>;

    /// Result slot. Starts out as `Default::default()` and is filled in by the steps; `()` for
    /// operations that only have a side effect.
    type Output: Default;

    fn start(out: &mut Self::Output, handle: &mut Self::Handle, args: Self::Args<'_>) -> Status;

    fn resume(out: &mut Self::Output, handle: &mut Self::Handle, status: Status) -> Status;
}

/// Runs `O` to completion on the process-wide scheduler.
pub async fn drive<O>(handle: &mut O::Handle, args: O::Args<'_>) -> O::Output
where
    O: Operation,
{
    drive_with::<O, _>(scheduler::global(), handle, args).await
}

/// Runs `O` to completion, suspending on `scheduler`.
pub async fn drive_with<O, D>(scheduler: &D, handle: &mut O::Handle, args: O::Args<'_>) -> O::Output
where
    O: Operation,
    D: Scheduler + ?Sized,
{
    let span = tracing::trace_span!("drive", op = std::any::type_name::<O>());
    complete(
        scheduler,
        handle,
        |out, handle| O::start(out, handle, args),
        O::resume,
    )
    .instrument(span)
    .await
}

/// Drives a `start`/`resume` pair until it reports [`Status::NONE`] and returns the result slot.
///
/// There is no bound on the number of rounds. A socket that never becomes ready and has no
/// timeout keeps the operation suspended until the scheduler drops it.
pub async fn complete<R, H, D, S, C>(scheduler: &D, handle: &mut H, start: S, mut resume: C) -> R
where
    R: Default,
    H: Handle + ?Sized,
    D: Scheduler + ?Sized,
    S: FnOnce(&mut R, &mut H) -> Status,
    C: FnMut(&mut R, &mut H, Status) -> Status,
{
    let mut slot = R::default();
    let mut status = start(&mut slot, handle);
    let mut rounds = 0usize;

    while !status.is_done() {
        tracing::trace!(?status, rounds, "suspending");
        status = wait(scheduler, status, handle.connection()).await;
        status = resume(&mut slot, handle, status);
        rounds += 1;
    }

    tracing::trace!(rounds, "operation complete");
    slot
}

#[cfg(test)]
mod test {
    use std::{os::unix::io::RawFd, time::Duration};

    use super::{complete, drive_with, Handle, Operation};
    use crate::{
        scheduler::WaitError,
        status::{Interest, Status},
        testing::{block_on, block_on_counted, init, FakeConn, RecordingScheduler, Scripted},
    };

    #[test]
    fn test_immediate_completion() {
        init();
        let scheduler = RecordingScheduler::new();
        let mut conn = FakeConn::new().value(11);

        let out = block_on(drive_with::<Scripted, _>(&scheduler, &mut conn, Status::NONE));
        assert_eq!(out, Some(11));
        assert!(scheduler.calls().is_empty());
        assert!(conn.seen.is_empty());
    }

    #[test]
    fn test_loop_waits_between_steps() {
        init();
        let scheduler = RecordingScheduler::new();
        let mut conn = FakeConn::new()
            .timeout_ms(100)
            .script([Status::READ | Status::TIMEOUT, Status::NONE])
            .value(3);

        let out = block_on(drive_with::<Scripted, _>(&scheduler, &mut conn, Status::READ));
        assert_eq!(out, Some(3));
        assert_eq!(
            scheduler.calls(),
            vec![
                (Interest::Read, conn.fd, None),
                (Interest::Read, conn.fd, Some(Duration::from_millis(100))),
            ]
        );
        assert_eq!(conn.seen, vec![Status::READ, Status::READ]);
    }

    #[test]
    fn test_single_suspension_with_timeout() {
        init();
        let scheduler = RecordingScheduler::new();
        let mut conn = FakeConn::new().timeout_ms(250).script([Status::NONE]).value(42);

        let (out, suspensions) = block_on_counted(drive_with::<Scripted, _>(
            &scheduler,
            &mut conn,
            Status::READ | Status::TIMEOUT,
        ));
        assert_eq!(out, Some(42));
        assert_eq!(suspensions, 1);

        let calls = scheduler.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].2.map(|d| d.as_secs_f64()), Some(0.25));
        assert_eq!(conn.seen, vec![Status::READ]);
    }

    #[test]
    fn test_fault_resumes_as_timeout() {
        init();
        let scheduler = RecordingScheduler::new();
        scheduler.fail_next(std::io::Error::from_raw_os_error(libc::EPIPE).into());
        let mut conn = FakeConn::new().script([Status::NONE]).value(5);

        let out = block_on(drive_with::<Scripted, _>(&scheduler, &mut conn, Status::WRITE));
        assert_eq!(out, Some(5));
        assert_eq!(scheduler.reports(), 1);
        assert_eq!(conn.seen, vec![Status::TIMEOUT]);
    }

    #[test]
    fn test_timeout_then_retry() {
        init();
        let scheduler = RecordingScheduler::new();
        scheduler.fail_next(WaitError::TimedOut);
        let mut conn = FakeConn::new()
            .timeout_ms(20)
            .script([Status::WRITE | Status::TIMEOUT, Status::NONE])
            .value(8);

        let out = block_on(drive_with::<Scripted, _>(
            &scheduler,
            &mut conn,
            Status::WRITE | Status::TIMEOUT,
        ));
        assert_eq!(out, Some(8));
        assert_eq!(conn.seen, vec![Status::TIMEOUT, Status::WRITE]);
        assert_eq!(scheduler.reports(), 0);
    }

    /// A handle that waits on the connection it was produced from.
    struct Rows<'c> {
        conn: &'c mut FakeConn,
        remaining: Vec<&'static str>,
    }

    impl Handle for Rows<'_> {
        type Connection = FakeConn;

        fn connection(&self) -> &FakeConn {
            &*self.conn
        }
    }

    #[test]
    fn test_handle_resolves_to_connection() {
        init();
        let scheduler = RecordingScheduler::new();
        let mut conn = FakeConn::new().fd(31);
        let mut rows = Rows {
            conn: &mut conn,
            remaining: vec!["b", "a"],
        };

        let fetch = |out: &mut Option<&'static str>, rows: &mut Rows<'_>| match rows.remaining.pop() {
            Some(row) if rows.remaining.is_empty() => {
                *out = Some(row);
                Status::NONE
            }
            _ => Status::READ,
        };

        let out = block_on(complete(
            &scheduler,
            &mut rows,
            |out, rows| fetch(out, rows),
            |out, rows, _| fetch(out, rows),
        ));
        assert_eq!(out, Some("b"));
        assert_eq!(scheduler.calls(), vec![(Interest::Read, 31 as RawFd, None)]);
    }

    /// Releases the handle; there is no result.
    struct Release;

    impl Operation for Release {
        type Handle = FakeConn;
        type Args<'a> = ();
        type Output = ();

        fn start(_: &mut (), conn: &mut FakeConn, _: ()) -> Status {
            conn.script.pop_front().unwrap_or(Status::NONE)
        }

        fn resume(_: &mut (), conn: &mut FakeConn, status: Status) -> Status {
            conn.seen.push(status);
            conn.script.pop_front().unwrap_or(Status::NONE)
        }
    }

    #[test]
    fn test_operation_without_result() {
        init();
        let scheduler = RecordingScheduler::new();
        let mut conn = FakeConn::new().script([Status::WRITE, Status::READ]);

        block_on(drive_with::<Release, _>(&scheduler, &mut conn, ()));
        assert_eq!(conn.seen, vec![Status::WRITE, Status::READ]);
        assert!(conn.script.is_empty());
    }
}

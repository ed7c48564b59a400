//! Fakes shared by the unit tests: a scripted foreign operation and a scheduler that records
//! every wait.
use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
    future::Future,
    io,
    os::unix::io::RawFd,
    pin::{pin, Pin},
    task::{Context, Poll},
    time::Duration,
};

use crate::{
    drive::{Connection, Handle, Operation},
    executor::waker_fn::{flag_waker, set_poll, should_poll},
    scheduler::{Scheduler, WaitError, WaitFuture},
    status::{Interest, Status},
};

pub(crate) fn init() {
    let _ = env_logger::builder()
        .format_timestamp(None)
        .filter_level(log::LevelFilter::Debug)
        .is_test(true)
        .try_init();
}

/// Polls `future` until it completes.
pub(crate) fn block_on<F: Future>(future: F) -> F::Output {
    block_on_counted(future).0
}

/// Polls `future` until it completes, also returning how often it suspended.
pub(crate) fn block_on_counted<F: Future>(future: F) -> (F::Output, usize) {
    let waker = flag_waker();
    let cx = &mut Context::from_waker(&waker);
    let mut future = pin!(future);
    let mut suspensions = 0;

    set_poll();
    loop {
        assert!(should_poll(), "future suspended without being woken");
        match future.as_mut().poll(cx) {
            Poll::Ready(output) => return (output, suspensions),
            Poll::Pending => suspensions += 1,
        }
    }
}

/// Resolves on the second poll, waking itself in between.
struct YieldOnce(bool);

impl Future for YieldOnce {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.0 {
            return Poll::Ready(());
        }
        self.0 = true;
        cx.waker().wake_by_ref();
        Poll::Pending
    }
}

/// Gives the other futures of a join one chance to run.
pub(crate) fn yield_now() -> impl Future<Output = ()> {
    YieldOnce(false)
}

/// Scheduler whose waits suspend exactly once and then succeed, unless a failure was queued.
#[derive(Default)]
pub(crate) struct RecordingScheduler {
    calls: RefCell<Vec<(Interest, RawFd, Option<Duration>)>>,
    failures: RefCell<VecDeque<WaitError>>,
    reports: Cell<usize>,
}

impl RecordingScheduler {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Makes the next wait fail with `err`.
    pub(crate) fn fail_next(&self, err: WaitError) {
        self.failures.borrow_mut().push_back(err);
    }

    pub(crate) fn calls(&self) -> Vec<(Interest, RawFd, Option<Duration>)> {
        self.calls.borrow().clone()
    }

    pub(crate) fn reports(&self) -> usize {
        self.reports.get()
    }

    fn record(&self, interest: Interest, fd: RawFd, timeout: Option<Duration>) -> WaitFuture<'_> {
        self.calls.borrow_mut().push((interest, fd, timeout));
        let outcome = self.failures.borrow_mut().pop_front();
        Box::pin(async move {
            YieldOnce(false).await;
            match outcome {
                Some(err) => Err(err),
                None => Ok(()),
            }
        })
    }
}

impl Scheduler for RecordingScheduler {
    fn wait_read(&self, fd: RawFd, timeout: Option<Duration>) -> WaitFuture<'_> {
        self.record(Interest::Read, fd, timeout)
    }

    fn wait_write(&self, fd: RawFd, timeout: Option<Duration>) -> WaitFuture<'_> {
        self.record(Interest::Write, fd, timeout)
    }

    fn report(&self, err: &WaitError) {
        log::debug!("reported: {}", err);
        self.reports.set(self.reports.get() + 1);
    }
}

/// Connection of a fake foreign library whose steps replay a script of readiness codes.
#[derive(Debug)]
pub(crate) struct FakeConn {
    pub(crate) fd: RawFd,
    pub(crate) broken_socket: bool,
    pub(crate) timeout_ms: i64,
    /// Codes returned by successive `continue` steps
    pub(crate) script: VecDeque<Status>,
    /// Codes the `continue` steps were called with
    pub(crate) seen: Vec<Status>,
    pub(crate) value: u32,
}

impl FakeConn {
    pub(crate) fn new() -> Self {
        Self {
            fd: 5,
            broken_socket: false,
            timeout_ms: crate::timeout::NO_TIMEOUT,
            script: VecDeque::new(),
            seen: Vec::new(),
            value: 0,
        }
    }

    pub(crate) fn fd(mut self, fd: RawFd) -> Self {
        self.fd = fd;
        self
    }

    pub(crate) fn broken_socket(mut self) -> Self {
        self.broken_socket = true;
        self
    }

    pub(crate) fn timeout_ms(mut self, ms: i64) -> Self {
        self.timeout_ms = ms;
        self
    }

    pub(crate) fn script(mut self, script: impl IntoIterator<Item = Status>) -> Self {
        self.script = script.into_iter().collect();
        self
    }

    pub(crate) fn value(mut self, value: u32) -> Self {
        self.value = value;
        self
    }
}

impl Connection for FakeConn {
    fn socket(&self) -> io::Result<RawFd> {
        if self.broken_socket {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "socket closed"));
        }
        Ok(self.fd)
    }

    fn timeout_ms(&self) -> i64 {
        self.timeout_ms
    }
}

impl Handle for FakeConn {
    type Connection = Self;

    fn connection(&self) -> &Self {
        self
    }
}

/// Operation whose `start` returns its argument and whose `continue` steps follow the
/// connection's script. The result is the connection's value.
pub(crate) struct Scripted;

impl Scripted {
    fn finish(out: &mut Option<u32>, conn: &FakeConn, status: Status) -> Status {
        if status.is_done() {
            *out = Some(conn.value);
        }
        status
    }
}

impl Operation for Scripted {
    type Handle = FakeConn;
    type Args<'a> = Status;
    type Output = Option<u32>;

    fn start(out: &mut Option<u32>, conn: &mut FakeConn, first: Status) -> Status {
        Self::finish(out, conn, first)
    }

    fn resume(out: &mut Option<u32>, conn: &mut FakeConn, status: Status) -> Status {
        conn.seen.push(status);
        let next = conn.script.pop_front().unwrap_or(Status::NONE);
        Self::finish(out, conn, next)
    }
}

use std::{os::unix::io::RawFd, time::Duration};

use io_uring::{opcode, types};

use super::{
    uring::{self, Op, TIMEOUT_USERDATA},
    util::timespec,
};
use crate::{
    scheduler::{Scheduler, WaitError, WaitFuture},
    status::Interest,
};

/// [`Scheduler`] backed by the io_uring driver of the [`LocalExecutor`](crate::executor::LocalExecutor)
/// running on the current thread.
///
/// A wait is a `PollAdd` on the descriptor, linked to a `LinkTimeout` when a deadline is given.
/// Waiting outside an executor fails with [`WaitError::NotRunning`].
#[derive(Debug, Default, Clone, Copy)]
pub struct UringScheduler;

impl Scheduler for UringScheduler {
    fn wait_read(&self, fd: RawFd, timeout: Option<Duration>) -> WaitFuture<'_> {
        Box::pin(poll_ready(fd, Interest::Read, timeout))
    }

    fn wait_write(&self, fd: RawFd, timeout: Option<Duration>) -> WaitFuture<'_> {
        Box::pin(poll_ready(fd, Interest::Write, timeout))
    }
}

struct PollData {
    timespec: Option<Box<types::Timespec>>,
}

async fn poll_ready(fd: RawFd, interest: Interest, timeout: Option<Duration>) -> Result<(), WaitError> {
    if !uring::is_running() {
        return Err(WaitError::NotRunning);
    }

    let data = PollData {
        timespec: timeout.map(|duration| Box::new(timespec(duration))),
    };
    let op = Op::submit_with(data, |data| {
        let mask = match interest {
            Interest::Read => libc::POLLIN,
            Interest::Write => libc::POLLOUT,
        };
        let poll = opcode::PollAdd::new(types::Fd(fd), mask as u32).build();
        let deadline = data.timespec.as_deref().map(|ts| {
            opcode::LinkTimeout::new(ts as *const types::Timespec)
                .build()
                .user_data(TIMEOUT_USERDATA)
        });
        (poll, deadline)
    })?;

    let completion = op.await;
    match completion.result {
        // POLLERR and POLLHUP count as ready, the next step finds out what happened
        Ok(_) => Ok(()),
        Err(err)
            if err.raw_os_error() == Some(libc::ECANCELED)
                && completion.data.timespec.is_some() =>
        {
            Err(WaitError::TimedOut)
        }
        Err(err) => Err(WaitError::Io(err)),
    }
}

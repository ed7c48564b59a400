//! Drives non-blocking foreign operations to completion on a cooperative scheduler.
//!
//! Libraries such as the MariaDB client expose their network calls as a `start` step and a
//! `continue` step, both returning a [`Status`] that says what the socket must become ready for
//! before the operation can make progress. [`drive`] runs such a pair to completion, suspending
//! the calling task on a [`Scheduler`] between the steps, so a single thread can keep many
//! operations in flight.

mod macros;

pub mod drive;
pub mod driver;
pub mod executor;
pub mod scheduler;
pub mod status;
pub mod timeout;
pub mod wait;

mod error;

#[cfg(feature = "mariadb")]
pub mod mariadb;

#[cfg(test)]
mod testing;

pub use drive::{complete, drive, drive_with, Connection, Handle, Operation};
pub use error::{Error, Result};
pub use scheduler::{Scheduler, WaitError, WaitFuture};
pub use status::{Interest, Status};

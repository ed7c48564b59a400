//! The bundled scheduler backend: socket readiness waits on io_uring.
mod poll;
mod uring;
mod util;

pub use poll::UringScheduler;
pub(crate) use uring::IoUringDriver;
#[cfg(test)]
pub(crate) use uring::in_flight;

//! Single-threaded executor hosting the io_uring driver.
mod config;
mod executor;
pub(crate) mod waker_fn;

pub use config::Config;
pub use executor::LocalExecutor;

use std::io;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("a scheduler has already been installed")]
    SchedulerInstalled,

    #[error("failed to set up the io_uring driver: {0}")]
    Driver(#[from] io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

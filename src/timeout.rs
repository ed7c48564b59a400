use std::time::Duration;

use crate::{drive::Connection, status::Status};

/// Timeout hint meaning "wait without a deadline".
pub const NO_TIMEOUT: i64 = -1;

/// Builds the deadline for the next socket wait.
///
/// Only a [`Status::TIMEOUT`] request consults the connection, and the hint is read fresh on
/// every call since the foreign library may change it between retries.
pub fn resolve_timeout<C>(status: Status, conn: &C) -> Option<Duration>
where
    C: Connection + ?Sized,
{
    if !status.contains(Status::TIMEOUT) {
        return None;
    }
    from_hint(conn.timeout_ms())
}

/// Converts a millisecond hint. Negative hints, [`NO_TIMEOUT`] among them, never become a
/// duration.
pub fn from_hint(ms: i64) -> Option<Duration> {
    u64::try_from(ms).ok().map(Duration::from_millis)
}

use std::time::Duration;

use io_uring::types::Timespec;

pub(super) fn timespec(duration: Duration) -> Timespec {
    Timespec::new()
        .sec(duration.as_secs())
        .nsec(duration.subsec_nanos())
}

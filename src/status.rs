use std::{
    fmt,
    ops::{BitAnd, BitOr, BitOrAssign},
    os::raw::c_int,
};

/// Readiness code returned by the `start` and `continue` steps of a non-blocking operation.
///
/// The bits follow the MariaDB non-blocking client API. A value of zero is terminal: the
/// operation has finished and its result slot holds the output.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Status(u32);

impl Status {
    /// Terminal code
    pub const NONE: Status = Status(0);
    /// Wait until the socket is readable
    pub const READ: Status = Status(1);
    /// Wait until the socket is writable
    pub const WRITE: Status = Status(2);
    /// Exceptional condition. Never requested by libmariadb and never acted upon.
    pub const EXCEPT: Status = Status(4);
    /// The wait is bounded by the connection's current timeout hint
    pub const TIMEOUT: Status = Status(8);

    pub const fn from_bits(bits: u32) -> Self {
        Status(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Whether the operation has completed.
    pub const fn is_done(self) -> bool {
        self.0 == 0
    }

    /// Whether every bit of `other` is set in `self`.
    pub const fn contains(self, other: Status) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for Status {
    type Output = Status;

    fn bitor(self, rhs: Self) -> Self::Output {
        Status(self.0 | rhs.0)
    }
}

impl BitOrAssign for Status {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for Status {
    type Output = Status;

    fn bitand(self, rhs: Self) -> Self::Output {
        Status(self.0 & rhs.0)
    }
}

impl From<c_int> for Status {
    fn from(raw: c_int) -> Self {
        Status(raw as u32)
    }
}

impl From<Status> for c_int {
    fn from(status: Status) -> Self {
        status.0 as c_int
    }
}

impl fmt::Debug for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_done() {
            return f.write_str("NONE");
        }

        let names = [
            (Status::READ, "READ"),
            (Status::WRITE, "WRITE"),
            (Status::EXCEPT, "EXCEPT"),
            (Status::TIMEOUT, "TIMEOUT"),
        ];
        let mut rest = self.0;
        let mut first = true;
        for (flag, name) in names {
            if self.contains(flag) {
                if !first {
                    f.write_str(" | ")?;
                }
                f.write_str(name)?;
                rest &= !flag.0;
                first = false;
            }
        }
        if rest != 0 {
            if !first {
                f.write_str(" | ")?;
            }
            write!(f, "{:#x}", rest)?;
        }
        Ok(())
    }
}

/// What a suspended operation waits for on its socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interest {
    Read,
    Write,
}

impl From<Interest> for Status {
    fn from(interest: Interest) -> Self {
        match interest {
            Interest::Read => Status::READ,
            Interest::Write => Status::WRITE,
        }
    }
}

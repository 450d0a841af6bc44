//! RPC status codes as a typed enum.
//!
//! Every call that leaves the pipeline ends in exactly one [`Code`]. Successful
//! calls end in [`Code::Ok`]; failures carry one of the other sixteen together
//! with a human-readable message, bundled as a [`Status`].
//!
//! ```rust
//! use gatehouse::{Code, Status};
//!
//! let st = Status::new(Code::InvalidArgument, "value is too short");
//! assert_eq!(st.code(), Code::InvalidArgument);
//! assert_eq!(i32::from(st.code()), 3);
//! ```

use std::fmt;

/// The canonical RPC status codes.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Code {
    Ok,                 // 0
    Cancelled,          // 1
    Unknown,            // 2
    InvalidArgument,    // 3
    DeadlineExceeded,   // 4
    NotFound,           // 5
    AlreadyExists,      // 6
    PermissionDenied,   // 7
    ResourceExhausted,  // 8
    FailedPrecondition, // 9
    Aborted,            // 10
    OutOfRange,         // 11
    Unimplemented,      // 12
    Internal,           // 13
    Unavailable,        // 14
    DataLoss,           // 15
    Unauthenticated,    // 16
}

impl Code {
    /// Returns the canonical upper-snake name (e.g. `"INVALID_ARGUMENT"`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok                 => "OK",
            Self::Cancelled          => "CANCELLED",
            Self::Unknown            => "UNKNOWN",
            Self::InvalidArgument    => "INVALID_ARGUMENT",
            Self::DeadlineExceeded   => "DEADLINE_EXCEEDED",
            Self::NotFound           => "NOT_FOUND",
            Self::AlreadyExists      => "ALREADY_EXISTS",
            Self::PermissionDenied   => "PERMISSION_DENIED",
            Self::ResourceExhausted  => "RESOURCE_EXHAUSTED",
            Self::FailedPrecondition => "FAILED_PRECONDITION",
            Self::Aborted            => "ABORTED",
            Self::OutOfRange         => "OUT_OF_RANGE",
            Self::Unimplemented      => "UNIMPLEMENTED",
            Self::Internal           => "INTERNAL",
            Self::Unavailable        => "UNAVAILABLE",
            Self::DataLoss           => "DATA_LOSS",
            Self::Unauthenticated    => "UNAUTHENTICATED",
        }
    }

    /// Maps a wire value back to a code. Out-of-range values become
    /// [`Code::Unknown`], which is what peers are expected to do too.
    pub fn from_i32(value: i32) -> Self {
        match value {
            0  => Self::Ok,
            1  => Self::Cancelled,
            2  => Self::Unknown,
            3  => Self::InvalidArgument,
            4  => Self::DeadlineExceeded,
            5  => Self::NotFound,
            6  => Self::AlreadyExists,
            7  => Self::PermissionDenied,
            8  => Self::ResourceExhausted,
            9  => Self::FailedPrecondition,
            10 => Self::Aborted,
            11 => Self::OutOfRange,
            12 => Self::Unimplemented,
            13 => Self::Internal,
            14 => Self::Unavailable,
            15 => Self::DataLoss,
            16 => Self::Unauthenticated,
            _  => Self::Unknown,
        }
    }
}

impl From<Code> for i32 {
    fn from(c: Code) -> i32 {
        match c {
            Code::Ok                 => 0,
            Code::Cancelled          => 1,
            Code::Unknown            => 2,
            Code::InvalidArgument    => 3,
            Code::DeadlineExceeded   => 4,
            Code::NotFound           => 5,
            Code::AlreadyExists      => 6,
            Code::PermissionDenied   => 7,
            Code::ResourceExhausted  => 8,
            Code::FailedPrecondition => 9,
            Code::Aborted            => 10,
            Code::OutOfRange         => 11,
            Code::Unimplemented      => 12,
            Code::Internal           => 13,
            Code::Unavailable        => 14,
            Code::DataLoss           => 15,
            Code::Unauthenticated    => 16,
        }
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Status ────────────────────────────────────────────────────────────────────

/// A status code plus message: what the client finally observes.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Status {
    code: Code,
    message: String,
}

impl Status {
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }

    pub fn code(&self) -> Code { self.code }
    pub fn message(&self) -> &str { &self.message }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(Code::InvalidArgument, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(Code::Internal, message)
    }

    pub fn unimplemented(message: impl Into<String>) -> Self {
        Self::new(Code::Unimplemented, message)
    }

    pub fn deadline_exceeded(message: impl Into<String>) -> Self {
        Self::new(Code::DeadlineExceeded, message)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "status: {}", self.code)
        } else {
            write!(f, "status: {}, message: {:?}", self.code, self.message)
        }
    }
}

impl std::error::Error for Status {}

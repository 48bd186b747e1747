//! Lifecycle enums stored as TEXT columns.
//!
//! Each enum variant maps to exactly one lowercase/uppercase code in the
//! database. Unknown codes are rejected on parse rather than defaulted.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Error returned when a stored code does not match any variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} code: {code:?}")]
pub struct UnknownCode {
    pub kind: &'static str,
    pub code: String,
}

macro_rules! define_text_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $code:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $( $(#[$vmeta])* #[serde(rename = $code)] $variant ),+
        }

        impl $name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Return the database code.
            pub fn as_str(self) -> &'static str {
                match self {
                    $( $name::$variant => $code ),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownCode;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $( $code => Ok($name::$variant), )+
                    other => Err(UnknownCode {
                        kind: stringify!($name),
                        code: other.to_string(),
                    }),
                }
            }
        }
    };
}

define_text_enum! {
    /// Task state of one RemotePC row.
    ///
    /// At most one RemotePC per server may be `Working` at a time.
    PcState {
        None = "none",
        Idle = "idle",
        Working = "working",
        Waiting = "waiting",
        Stopped = "stopped",
    }
}

define_text_enum! {
    /// Lifecycle of a TimerRecord (a job that reached the hold point).
    TimerState {
        Ready = "READY",
        Waiting = "WAITING",
        Working = "WORKING",
        Terminated = "TERMINATED",
        Timeout = "TIMEOUT",
    }
}

define_text_enum! {
    /// Which controller entry point a job request targets.
    RequestKind {
        /// Plain connect: no OTP gate.
        Connect = "connect",
        /// OTP gate first, then connect.
        OtpCheck = "otp_check",
    }
}

impl TimerState {
    /// States that still need a teardown.
    pub const PENDING_TEARDOWN: [TimerState; 2] = [TimerState::Waiting, TimerState::Timeout];
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

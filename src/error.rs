//! Error taxonomy shared by every ledger component.

use crate::identity::{Address, Balance};
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SuretyError>;

/// Typed rejection surfaced to callers.  A returned error always means the
/// attempted mutation left no trace in the ledger.
#[derive(Debug, Error)]
pub enum SuretyError {
    #[error("access denied for {caller}: requires {required}")]
    /// Caller lacks the role or lifecycle stage the operation requires.
    AccessDenied {
        /// Identity that attempted the call.
        caller: Address,
        /// Human-readable requirement that was not met.
        required: &'static str,
    },
    #[error("contract is not operational")]
    /// The operating switch is off.
    NotOperational,
    #[error("invalid state: {0}")]
    /// Object is in the wrong lifecycle stage or the input is malformed.
    InvalidState(String),
    #[error("airline {0} is already registered")]
    /// Target airline has already advanced past `Applied`.
    AlreadyRegistered(Address),
    #[error("already exists: {0}")]
    /// A record with the same identity already exists.
    AlreadyExists(String),
    #[error("insufficient funds (required {required}, provided {provided})")]
    /// Payment below the required minimum, or the pool cannot cover a payout.
    InsufficientFunds {
        /// Amount that was required.
        required: Balance,
        /// Amount that was available.
        provided: Balance,
    },
    #[error("index {index} does not match the caller or the request")]
    /// Oracle responded on an index it does not hold or the request was not assigned.
    IndexMismatch {
        /// Index submitted with the response.
        index: u8,
    },
    #[error("status request is closed")]
    /// The request already reached quorum.
    RequestClosed,
    #[error("no status request is open for this flight")]
    /// No request was ever opened for the flight.
    RequestNotFound,
    #[error("flight not found")]
    /// Unknown flight key or option id.
    FlightNotFound,
    #[error("flight status already finalized")]
    /// Flight status has been written and is immutable.
    FlightAlreadyFinalized,
    #[error("purchase cap exceeded (cap {cap}, requested {requested})")]
    /// Insurance purchase would exceed the per-passenger cap.
    CapExceeded {
        /// Per-passenger cap on a single flight.
        cap: Balance,
        /// Total the passenger would hold after the purchase.
        requested: Balance,
    },
    #[error("invalid timestamp {year:04}-{month:02}-{day:02} {hour:02}:{minute:02}")]
    /// Calendar components do not form a valid UTC date-time.
    InvalidTimestamp {
        /// Calendar year.
        year: i32,
        /// Month (1-12).
        month: u32,
        /// Day of month.
        day: u32,
        /// Hour (0-23).
        hour: u32,
        /// Minute (0-59).
        minute: u32,
    },
    #[error("invalid address: {0}")]
    /// Address text could not be decoded.
    InvalidAddress(String),
    #[error("configuration error: {0}")]
    /// Configuration file is malformed or inconsistent.
    Config(String),
    #[error("io error: {0}")]
    /// Underlying filesystem failure.
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    /// JSON encode/decode failure.
    Json(#[from] serde_json::Error),
}

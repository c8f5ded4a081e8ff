//! crates/mentorhub_core/src/error.rs
//!
//! Error taxonomy for the real-time coordinators. Validation and invariant
//! violations are surfaced to the originating connection only; port failures
//! abort the operation before anything is broadcast.

use crate::ports::PortError;

/// The primary error type for coordinator operations.
#[derive(Debug, thiserror::Error)]
pub enum RealtimeError {
    /// Missing or malformed input rejected at the handler boundary.
    #[error("Invalid request: {0}")]
    Validation(String),

    /// An offer arrived for a conversation that already has an active call.
    #[error("A call is already in progress for this conversation")]
    CallInProgress,

    /// A group-call join named a call id other than the active one.
    #[error("Call id does not match the active group call")]
    CallIdMismatch,

    /// There is no active call where one was required.
    #[error("No active call for this conversation")]
    NoActiveCall,

    /// A call control request came from a user who is neither the caller
    /// nor the recipient.
    #[error("User is not a party to this call")]
    NotCallParty,

    /// A failure propagated up from one of the persistence ports.
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),
}

/// A convenience type alias for coordinator results.
pub type RealtimeResult<T> = Result<T, RealtimeError>;

//! Error taxonomy for the protocol stack.
//!
//! Every fatal condition maps onto one of these variants; public entry points
//! return [anyhow::Result] and wrap a [ProtocolError] so callers can still
//! match on the category.

use thiserror::Error;

/// Fatal protocol-level errors. None of these are recoverable within an
/// evaluation; a party that hits one aborts its session.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Parameter mismatch detected at construction or key generation.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Buffer size mismatch or empty buffer in serialize/deserialize.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Beaver triple store or PRF buffer ran dry.
    #[error("resource exhaustion: {0}")]
    ResourceExhaustion(String),

    /// Short read, connection loss, or handshake id mismatch.
    #[error("transport failure: {0}")]
    Transport(String),

    /// An internal invariant did not hold.
    #[error("protocol assertion: {0}")]
    Assertion(String),
}

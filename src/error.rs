//! # Error Handling
//!
//! Error types for Phantom Core.
//!
//! ## Error Hierarchy
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           ERROR HIERARCHY                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Error (top-level)                                                     │
//! │  │                                                                      │
//! │  ├── Protocol Errors                                                   │
//! │  │   ├── DecodeError           - Payload could not be decoded          │
//! │  │   └── InvalidEnvelope       - Envelope missing required fields      │
//! │  │                                                                      │
//! │  ├── Storage Errors                                                    │
//! │  │   └── DatabaseError         - SQLite call rejected                  │
//! │  │                                                                      │
//! │  ├── Transport Errors                                                  │
//! │  │   ├── TransportError        - Send rejected by the transport        │
//! │  │   ├── HandshakePending      - Secure session not yet established    │
//! │  │   ├── Timeout               - Operation timed out                   │
//! │  │   ├── ConnectionFailed      - Dial failed                           │
//! │  │   └── NotConnected          - Transport task is gone                │
//! │  │                                                                      │
//! │  ├── Device Errors                                                     │
//! │  │   ├── PermissionDenied      - Microphone / file access denied       │
//! │  │   ├── AttachmentTooLarge    - Attachment over the size limit        │
//! │  │   └── InvalidInvite         - Invite code could not be parsed       │
//! │  │                                                                      │
//! │  └── Message Errors                                                    │
//! │      ├── MessageNotFound       - Target uuid unknown                   │
//! │      ├── InvalidMessageContent - Empty or malformed content            │
//! │      └── DeliveryFailed        - Local send did not complete           │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Nothing here is fatal. Handlers catch their own failures and turn them
//! into log lines, system notices or alerts; the codes exist so a host can
//! map an error to a UI affordance without string matching.

use thiserror::Error;

/// Result type alias for Phantom Core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Marker text the transport uses when a send triggered a handshake
/// instead of delivering the payload.
const HANDSHAKE_MARKER: &str = "Handshake sent";

/// Main error type for Phantom Core
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // ========================================================================
    // Protocol Errors (100-199)
    // ========================================================================

    /// Payload could not be decoded
    #[error("Failed to decode payload: {0}")]
    DecodeError(String),

    /// Envelope is structurally valid JSON but missing a required field
    #[error("Invalid envelope: {0}")]
    InvalidEnvelope(String),

    // ========================================================================
    // Storage Errors (400-499)
    // ========================================================================

    /// Database error
    #[error("Database error: {0}")]
    DatabaseError(String),

    // ========================================================================
    // Transport Errors (500-599)
    // ========================================================================

    /// Transport rejected the send
    #[error("Transport error: {0}")]
    TransportError(String),

    /// The transport started a handshake instead of delivering
    #[error("Secure connection is being established: {0}")]
    HandshakePending(String),

    /// Operation timed out
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Failed to connect to peer
    #[error("Failed to connect to peer: {0}")]
    ConnectionFailed(String),

    /// The transport task is no longer running
    #[error("Not connected to the network.")]
    NotConnected,

    // ========================================================================
    // Device Errors (600-699)
    // ========================================================================

    /// Local capability (microphone, file access) denied
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Attachment exceeds the configured size limit
    #[error("Attachment is too large: {size} bytes (max {max})")]
    AttachmentTooLarge {
        /// Size of the rejected attachment
        size: usize,
        /// Configured maximum
        max: usize,
    },

    /// Invite code could not be parsed
    #[error("Invalid invite: {0}")]
    InvalidInvite(String),

    // ========================================================================
    // Message Errors (700-799)
    // ========================================================================

    /// Message not found
    #[error("Message not found: {0}")]
    MessageNotFound(String),

    /// Invalid message content
    #[error("Invalid message content: {0}")]
    InvalidMessageContent(String),

    /// Message delivery failed
    #[error("Failed to deliver message: {0}")]
    DeliveryFailed(String),

    // ========================================================================
    // Internal Errors (900-999)
    // ========================================================================

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Deserialization error
    #[error("Deserialization error: {0}")]
    DeserializationError(String),
}

impl Error {
    /// Build a transport error from the transport's own message.
    ///
    /// Messages carrying the handshake marker become [`Error::HandshakePending`]
    /// so the caller can show the "retry after handshake" notice.
    pub fn transport(message: impl Into<String>) -> Self {
        let message = message.into();
        if message.contains(HANDSHAKE_MARKER) {
            Error::HandshakePending(message)
        } else {
            Error::TransportError(message)
        }
    }

    /// Get the numeric error code
    ///
    /// Error codes are organized by category:
    /// - 100-199: Protocol
    /// - 400-499: Storage
    /// - 500-599: Transport
    /// - 600-699: Device
    /// - 700-799: Messages
    /// - 900-999: Internal
    pub fn code(&self) -> i32 {
        match self {
            // Protocol (100-199)
            Error::DecodeError(_) => 100,
            Error::InvalidEnvelope(_) => 101,

            // Storage (400-499)
            Error::DatabaseError(_) => 400,

            // Transport (500-599)
            Error::TransportError(_) => 500,
            Error::HandshakePending(_) => 501,
            Error::Timeout(_) => 502,
            Error::ConnectionFailed(_) => 503,
            Error::NotConnected => 504,

            // Device (600-699)
            Error::PermissionDenied(_) => 600,
            Error::AttachmentTooLarge { .. } => 601,
            Error::InvalidInvite(_) => 602,

            // Messages (700-799)
            Error::MessageNotFound(_) => 700,
            Error::InvalidMessageContent(_) => 701,
            Error::DeliveryFailed(_) => 702,

            // Internal (900-999)
            Error::Internal(_) => 900,
            Error::SerializationError(_) => 901,
            Error::DeserializationError(_) => 902,
        }
    }

    /// Check if this error is recoverable
    ///
    /// A local send that failed with a recoverable error is offered for retry.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Timeout(_)
                | Error::TransportError(_)
                | Error::HandshakePending(_)
                | Error::ConnectionFailed(_)
                | Error::NotConnected
                | Error::DeliveryFailed(_)
                | Error::DatabaseError(_)
        )
    }
}

// ============================================================================
// ERROR CONVERSIONS
// ============================================================================

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for Error {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        Error::Timeout(err.to_string())
    }
}

// ============================================================================
// TESTS
// ============================================================================

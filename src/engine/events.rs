//! # Chat Events
//!
//! Events the engine emits for the UI layer.

use crate::messaging::MessageStatus;

/// Events broadcast to UI subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// The projection of a channel changed; re-read rows
    ViewUpdated {
        /// Local channel key
        channel: String,
    },

    /// A new message from someone else arrived (play a sound)
    Notification {
        /// Local channel key
        channel: String,
        /// Resolved sender label
        sender: String,
    },

    /// An inline, view-only notice was added to a channel
    SystemNotice {
        /// Local channel key
        channel: String,
        /// Notice text
        text: String,
    },

    /// A blocking, user-visible alert
    Alert {
        /// Alert text
        message: String,
    },

    /// A remote peer started or stopped typing
    TypingChanged {
        /// The peer
        peer_id: String,
        /// Current state
        is_typing: bool,
    },

    /// A peer became visible
    PeerDiscovered {
        /// The peer
        peer_id: String,
    },

    /// A peer is no longer visible
    PeerExpired {
        /// The peer
        peer_id: String,
    },

    /// We are listening on a new address
    ListenAddress {
        /// The multiaddr
        address: String,
    },

    /// Our own peer id is known
    LocalPeerId {
        /// Our peer id
        peer_id: String,
    },

    /// A local message changed delivery status
    MessageStatusChanged {
        /// Message uuid
        uuid: String,
        /// New status
        status: MessageStatus,
    },

    /// A local send failed
    DeliveryFailed {
        /// Message uuid
        uuid: String,
        /// Local channel key
        channel: String,
        /// Failure description
        error: String,
        /// Whether retrying can help
        retryable: bool,
    },
}

impl ChatEvent {
    /// Local channel the event concerns, if any
    pub fn channel(&self) -> Option<&str> {
        match self {
            Self::ViewUpdated { channel }
            | Self::Notification { channel, .. }
            | Self::SystemNotice { channel, .. }
            | Self::DeliveryFailed { channel, .. } => Some(channel),
            _ => None,
        }
    }

    /// Check if this event should trigger a user-facing sound or popup
    pub fn is_attention_event(&self) -> bool {
        matches!(self, Self::Notification { .. } | Self::Alert { .. })
    }
}

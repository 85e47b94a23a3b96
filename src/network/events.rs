//! # Transport Events
//!
//! Events delivered by the transport for the engine to handle.

/// Inbound events from the peer transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A payload arrived on a channel
    NewMessage {
        /// Wire channel name
        channel: String,
        /// Peer id of the sender
        sender: String,
        /// Opaque serialized envelope
        payload: String,
    },

    /// A peer was discovered (local network or DHT)
    PeerDiscovered {
        /// The discovered peer
        peer_id: String,
    },

    /// A discovered peer is no longer reachable
    PeerExpired {
        /// The expired peer
        peer_id: String,
    },

    /// We started listening on an address
    ListenAddress {
        /// Multiaddr we're listening on
        address: String,
    },

    /// Secure session with a peer is ready
    HandshakeComplete {
        /// The peer
        peer_id: String,
    },

    /// A peer started or stopped typing to us
    TypingSignal {
        /// The typing peer
        peer_id: String,
        /// `true` on start, `false` on stop
        is_typing: bool,
    },

    /// The transport assigned our own peer id
    LocalPeerIdAssigned {
        /// Our peer id
        peer_id: String,
    },
}

impl TransportEvent {
    /// Get the remote peer associated with this event, if any
    pub fn peer_id(&self) -> Option<&str> {
        match self {
            Self::NewMessage { sender, .. } => Some(sender),
            Self::PeerDiscovered { peer_id }
            | Self::PeerExpired { peer_id }
            | Self::HandshakeComplete { peer_id }
            | Self::TypingSignal { peer_id, .. } => Some(peer_id),
            Self::ListenAddress { .. } | Self::LocalPeerIdAssigned { .. } => None,
        }
    }

    /// Check if this event carries a chat payload
    pub fn is_message_event(&self) -> bool {
        matches!(self, Self::NewMessage { .. })
    }

    /// Check if this event changes the known-peer set or our own addressing
    pub fn is_discovery_event(&self) -> bool {
        matches!(
            self,
            Self::PeerDiscovered { .. }
                | Self::PeerExpired { .. }
                | Self::ListenAddress { .. }
                | Self::LocalPeerIdAssigned { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_id_extraction() {
        let event = TransportEvent::NewMessage {
            channel: "phantom-global".into(),
            sender: "p1".into(),
            payload: "hi".into(),
        };
        assert_eq!(event.peer_id(), Some("p1"));

        let event = TransportEvent::TypingSignal { peer_id: "p2".into(), is_typing: true };
        assert_eq!(event.peer_id(), Some("p2"));

        let event = TransportEvent::ListenAddress { address: "/ip4/127.0.0.1/tcp/4001".into() };
        assert_eq!(event.peer_id(), None);

        let event = TransportEvent::LocalPeerIdAssigned { peer_id: "me".into() };
        assert_eq!(event.peer_id(), None);
    }

    #[test]
    fn test_event_classification() {
        let message = TransportEvent::NewMessage {
            channel: "c".into(),
            sender: "p".into(),
            payload: String::new(),
        };
        assert!(message.is_message_event());
        assert!(!message.is_discovery_event());

        let discovered = TransportEvent::PeerDiscovered { peer_id: "p".into() };
        assert!(discovered.is_discovery_event());
        assert!(!discovered.is_message_event());

        let handshake = TransportEvent::HandshakeComplete { peer_id: "p".into() };
        assert!(!handshake.is_discovery_event());
        assert!(!handshake.is_message_event());
    }
}

//! # Channel Namespace Mapper
//!
//! The shared public channel travels under a different name on the wire
//! than the key the local view uses for it. Direct channels are keyed by the
//! peer id and pass through unchanged.

use std::collections::HashSet;

/// Wire name of the shared public channel
pub const PUBLIC_WIRE_CHANNEL: &str = "phantom-global";
/// Local view key of the shared public channel
pub const PUBLIC_LOCAL_CHANNEL: &str = "global-gossip";
/// Broadcast channel reserved for encrypted handshakes
pub const ENCRYPTED_CHANNEL: &str = "encrypted-chat";

/// Maps wire channel names to local view keys and back
#[derive(Debug, Clone)]
pub struct ChannelMap {
    /// `(wire, local)` alias pairs
    aliases: Vec<(String, String)>,
    /// Channels that never carry typing signals (both namespaces)
    public: HashSet<String>,
}

impl Default for ChannelMap {
    fn default() -> Self {
        Self::new(&[
            PUBLIC_LOCAL_CHANNEL.to_string(),
            PUBLIC_WIRE_CHANNEL.to_string(),
            ENCRYPTED_CHANNEL.to_string(),
        ])
    }
}

impl ChannelMap {
    /// Create a mapper with the reserved public alias and the given public channels
    pub fn new(public_channels: &[String]) -> Self {
        Self {
            aliases: vec![(PUBLIC_WIRE_CHANNEL.to_string(), PUBLIC_LOCAL_CHANNEL.to_string())],
            public: public_channels.iter().cloned().collect(),
        }
    }

    /// Wire channel → local view key
    pub fn to_local(&self, wire_channel: &str) -> String {
        self.aliases
            .iter()
            .find(|(wire, _)| wire == wire_channel)
            .map(|(_, local)| local.clone())
            .unwrap_or_else(|| wire_channel.to_string())
    }

    /// Local view key → wire channel
    pub fn to_wire(&self, local_channel: &str) -> String {
        self.aliases
            .iter()
            .find(|(_, local)| local == local_channel)
            .map(|(wire, _)| wire.clone())
            .unwrap_or_else(|| local_channel.to_string())
    }

    /// Whether the channel is a shared public scope (either namespace)
    pub fn is_public(&self, channel: &str) -> bool {
        self.public.contains(channel)
    }

    /// Whether the channel is a direct peer-to-peer scope
    pub fn is_direct(&self, channel: &str) -> bool {
        !channel.is_empty() && !self.is_public(channel)
    }
}

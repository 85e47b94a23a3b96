//! # Discovery Module
//!
//! Who we are and who we can see: the local peer id, our listen addresses,
//! discovered peers, and the invite codes used to connect directly.
//!
//! ## Invite Codes
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          INVITE CODE FLOW                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Alice                                         Bob                      │
//! │  ─────                                         ───                      │
//! │  local peer id + best listen address                                   │
//! │        │                                                               │
//! │        ▼                                                               │
//! │  base64( {"id": "...", "addr": "/ip4/.../tcp/..."} )  ──(copy/paste)──►│
//! │                                                        │               │
//! │                                                        ▼               │
//! │                                         dial  <addr>/p2p/<id>          │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Loopback addresses are only used when nothing else is available. Input
//! that is not an invite but looks like a multiaddr (leading `/`) is dialled
//! as-is.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Shareable connection info
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InviteCode {
    /// Peer id of the inviter
    pub id: String,
    /// One reachable multiaddr
    pub addr: String,
}

impl InviteCode {
    /// Encode to JSON string
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::SerializationError(e.to_string()))
    }

    /// Encode to base64 (the string users copy)
    pub fn to_base64(&self) -> Result<String> {
        let json = self.to_json()?;
        Ok(BASE64.encode(json.as_bytes()))
    }

    /// Decode from base64
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let decoded = BASE64
            .decode(encoded.trim())
            .map_err(|e| Error::InvalidInvite(format!("Invalid base64: {}", e)))?;

        let json = String::from_utf8(decoded)
            .map_err(|e| Error::InvalidInvite(format!("Invalid UTF-8: {}", e)))?;

        let invite: Self =
            serde_json::from_str(&json).map_err(|e| Error::InvalidInvite(e.to_string()))?;
        invite.validate()?;
        Ok(invite)
    }

    /// Validate the invite fields
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(Error::InvalidInvite("missing peer id".into()));
        }
        if !self.addr.starts_with('/') {
            return Err(Error::InvalidInvite(format!("not a multiaddr: {}", self.addr)));
        }
        Ok(())
    }

    /// Address to dial: `<addr>/p2p/<id>`
    pub fn dial_address(&self) -> String {
        format!("{}/p2p/{}", self.addr.trim_end_matches('/'), self.id)
    }
}

/// Turn user input (invite code or raw multiaddr) into a dial address
pub fn resolve_dial_address(input: &str) -> Result<String> {
    let input = input.trim();
    match InviteCode::from_base64(input) {
        Ok(invite) => Ok(invite.dial_address()),
        Err(_) if input.starts_with('/') => Ok(input.to_string()),
        Err(e) => Err(e),
    }
}

fn is_loopback(address: &str) -> bool {
    address.contains("127.0.0.1") || address.contains("::1")
}

// ============================================================================
// PEER DIRECTORY
// ============================================================================

/// Local view of the network: our identity and the peers we have seen
#[derive(Default)]
pub struct PeerDirectory {
    local_peer_id: RwLock<Option<String>>,
    listen_addrs: RwLock<Vec<String>>,
    discovered: RwLock<Vec<String>>,
}

impl PeerDirectory {
    /// Empty directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Our peer id, once the transport assigned it
    pub fn local_peer_id(&self) -> Option<String> {
        self.local_peer_id.read().clone()
    }

    /// Record our peer id
    pub fn set_local_peer_id(&self, peer_id: &str) {
        *self.local_peer_id.write() = Some(peer_id.to_string());
    }

    /// Whether `peer_id` is us
    pub fn is_local(&self, peer_id: &str) -> bool {
        self.local_peer_id.read().as_deref() == Some(peer_id)
    }

    /// Record a listen address; returns `false` if already known
    pub fn add_listen_address(&self, address: &str) -> bool {
        let mut addrs = self.listen_addrs.write();
        if addrs.iter().any(|a| a == address) {
            return false;
        }
        addrs.push(address.to_string());
        true
    }

    /// Our listen addresses, in the order they were reported
    pub fn listen_addresses(&self) -> Vec<String> {
        self.listen_addrs.read().clone()
    }

    /// Record a discovered peer; returns `false` if already known or us
    pub fn add_peer(&self, peer_id: &str) -> bool {
        if self.is_local(peer_id) {
            return false;
        }
        let mut peers = self.discovered.write();
        if peers.iter().any(|p| p == peer_id) {
            return false;
        }
        peers.push(peer_id.to_string());
        true
    }

    /// Forget an expired peer; returns whether it was known
    pub fn remove_peer(&self, peer_id: &str) -> bool {
        let mut peers = self.discovered.write();
        let before = peers.len();
        peers.retain(|p| p != peer_id);
        peers.len() != before
    }

    /// Discovered peers, in discovery order
    pub fn peers(&self) -> Vec<String> {
        self.discovered.read().clone()
    }

    /// Build an invite for this node.
    ///
    /// Returns `None` until both a peer id and a listen address are known.
    pub fn invite_code(&self) -> Option<InviteCode> {
        let id = self.local_peer_id()?;
        let addrs = self.listen_addrs.read();
        let addr = addrs
            .iter()
            .find(|a| !is_loopback(a))
            .or_else(|| addrs.first())?
            .clone();
        Some(InviteCode { id, addr })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invite_base64_roundtrip() {
        let invite = InviteCode { id: "12D3KooWPeer".into(), addr: "/ip4/10.0.0.2/tcp/4001".into() };
        let encoded = invite.to_base64().unwrap();
        assert_eq!(InviteCode::from_base64(&encoded).unwrap(), invite);
        assert_eq!(invite.dial_address(), "/ip4/10.0.0.2/tcp/4001/p2p/12D3KooWPeer");
    }

    #[test]
    fn test_resolve_dial_address() {
        let invite = InviteCode { id: "p".into(), addr: "/ip4/10.0.0.2/tcp/1".into() };
        let code = invite.to_base64().unwrap();
        assert_eq!(resolve_dial_address(&format!("  {}\n", code)).unwrap(), "/ip4/10.0.0.2/tcp/1/p2p/p");

        // Raw multiaddr fallback
        assert_eq!(
            resolve_dial_address("/ip4/1.2.3.4/tcp/9/p2p/x").unwrap(),
            "/ip4/1.2.3.4/tcp/9/p2p/x"
        );

        assert!(matches!(resolve_dial_address("hello"), Err(Error::InvalidInvite(_))));
    }

    #[test]
    fn test_invite_validation() {
        let bad = BASE64.encode(r#"{"id":"","addr":"/ip4/1.1.1.1/tcp/1"}"#);
        assert!(InviteCode::from_base64(&bad).is_err());
        let bad = BASE64.encode(r#"{"id":"p","addr":"localhost"}"#);
        assert!(InviteCode::from_base64(&bad).is_err());
    }

    #[test]
    fn test_invite_prefers_non_loopback() {
        let dir = PeerDirectory::new();
        assert!(dir.invite_code().is_none());

        dir.set_local_peer_id("me");
        assert!(dir.invite_code().is_none());

        dir.add_listen_address("/ip4/127.0.0.1/tcp/4001");
        assert_eq!(dir.invite_code().unwrap().addr, "/ip4/127.0.0.1/tcp/4001");

        dir.add_listen_address("/ip6/::1/tcp/4001");
        dir.add_listen_address("/ip4/192.168.1.5/tcp/4001");
        assert_eq!(dir.invite_code().unwrap().addr, "/ip4/192.168.1.5/tcp/4001");
    }

    #[test]
    fn test_directory_dedupes() {
        let dir = PeerDirectory::new();
        dir.set_local_peer_id("me");

        assert!(dir.add_listen_address("/ip4/1.1.1.1/tcp/1"));
        assert!(!dir.add_listen_address("/ip4/1.1.1.1/tcp/1"));
        assert_eq!(dir.listen_addresses().len(), 1);

        assert!(dir.add_peer("p1"));
        assert!(!dir.add_peer("p1"));
        assert!(!dir.add_peer("me"));
        assert_eq!(dir.peers(), vec!["p1"]);

        assert!(dir.remove_peer("p1"));
        assert!(!dir.remove_peer("p1"));
        assert!(dir.peers().is_empty());
    }
}

//! # Phantom Core
//!
//! Client-side message protocol interpreter and local reconciliation engine
//! for the Phantom P2P chat client. The transport and the durable store are
//! injected; this crate decides what every inbound payload means, keeps the
//! store and the on-screen view consistent, and drives the optimistic send
//! lifecycle.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        PHANTOM CORE MODULES                             │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────┐  ┌──────────────┐   │
//! │  │  Protocol   │  │  Messaging  │  │   Typing    │  │     View     │   │
//! │  │             │  │             │  │             │  │              │   │
//! │  │ - Envelope  │  │ - Dispatch  │  │ - Outbound  │  │ - Projection │   │
//! │  │ - Channels  │  │ - Outbox    │  │ - Inbound   │  │ - Day rows   │   │
//! │  │             │  │ - Reactions │  │   expiry    │  │ - Search     │   │
//! │  └──────┬──────┘  └──────┬──────┘  └──────┬──────┘  └──────┬───────┘   │
//! │         │                │                │                │           │
//! │         └────────────────┴───────┬────────┴────────────────┘           │
//! │                                  │                                      │
//! │                          ┌───────▼───────┐                              │
//! │                          │    Engine     │──► broadcast<ChatEvent>      │
//! │                          └───┬───────┬───┘                              │
//! │                              │       │                                  │
//! │  ┌─────────────┐  ┌──────────▼──┐  ┌─▼─────────────┐  ┌─────────────┐  │
//! │  │  Contacts   │  │   Storage   │  │   Network     │  │  Discovery  │  │
//! │  │ - Labels    │  │ - SQLite    │  │ - Transport   │  │ - Invites   │  │
//! │  │ - Profile   │  │ - Tombstone │  │   contract    │  │ - Peers     │  │
//! │  └─────────────┘  └─────────────┘  └───────────────┘  └─────────────┘  │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Hierarchy
//!
//! - [`error`] - Error types for the entire library
//! - [`protocol`] - Wire envelope codec and channel namespace mapping
//! - [`messaging`] - Operation dispatch, outbox and the stored message model
//! - [`typing`] - Typing indicator state machines
//! - [`view`] - Projection of the active conversation
//! - [`storage`] - Durable store contract and its SQLite implementation
//! - [`network`] - Transport contract and transport events
//! - [`discovery`] - Invite codes and the peer directory
//! - [`contacts`] - Address book and display labels
//! - [`engine`] - The facade tying everything together
//!
//! ## Usage
//!
//! ```ignore
//! use phantom_core::{ChatEngine, CoreConfig};
//!
//! let engine = Arc::new(ChatEngine::open(CoreConfig::default(), transport).await?);
//! let mut events = engine.subscribe();
//! tokio::spawn({
//!     let engine = Arc::clone(&engine);
//!     async move { engine.run(transport_events, shutdown).await }
//! });
//! engine.select_channel("global-gossip").await?;
//! engine.send_text("hello", None)?;
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// ============================================================================
// MODULE DECLARATIONS
// ============================================================================

pub mod contacts;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod messaging;
pub mod network;
pub mod protocol;
pub mod storage;
/// Clock and calendar helpers.
pub mod time;
pub mod typing;
pub mod view;

#[cfg(test)]
mod testing;

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub use engine::{ChatEngine, ChatEvent};
pub use error::{Error, Result};
pub use messaging::{DeliveryOutcome, MessageStatus, StoredMessage};
pub use network::{Transport, TransportEvent};
pub use protocol::{Envelope, Post};
pub use storage::MessageStore;
pub use view::{ViewMessage, ViewRow};

// ============================================================================
// CORE CONFIGURATION
// ============================================================================

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for a [`ChatEngine`]
///
/// Every field has a default, so a host can deserialize a partial JSON
/// object and only override what it needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Sender label for locally authored messages
    pub local_label: String,
    /// Database file (None for in-memory)
    pub database_path: Option<String>,
    /// Quiet period after the last keystroke before "stopped typing" is sent
    pub typing_idle_ms: u64,
    /// Delay before an inbound typing indicator is re-checked
    pub typing_check_ms: u64,
    /// Age after which an inbound typing indicator is considered stale
    pub typing_stale_ms: u64,
    /// Deadline for each store call
    pub store_timeout_ms: u64,
    /// Deadline for transport calls
    pub send_timeout_ms: u64,
    /// Largest attachment accepted, in bytes
    pub max_attachment_bytes: usize,
    /// Offset of the local calendar from UTC, in seconds
    pub utc_offset_secs: i32,
    /// Buffer size of the event broadcast channel
    pub event_capacity: usize,
    /// Channels shared by everyone (no typing signals)
    pub public_channels: Vec<String>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            local_label: "Я".to_string(),
            database_path: None,
            typing_idle_ms: 1000,
            typing_check_ms: 3000,
            typing_stale_ms: 2500,
            store_timeout_ms: 5000,
            send_timeout_ms: 10_000,
            max_attachment_bytes: 2 * 1024 * 1024,
            utc_offset_secs: 0,
            event_capacity: 256,
            public_channels: vec![
                protocol::PUBLIC_LOCAL_CHANNEL.to_string(),
                protocol::PUBLIC_WIRE_CHANNEL.to_string(),
                protocol::ENCRYPTED_CHANNEL.to_string(),
            ],
        }
    }
}

impl CoreConfig {
    /// Parse a (possibly partial) JSON configuration
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::DeserializationError(e.to_string()))
    }

    /// Typing idle period
    pub fn typing_idle(&self) -> Duration {
        Duration::from_millis(self.typing_idle_ms)
    }

    /// Inbound typing check delay
    pub fn typing_check(&self) -> Duration {
        Duration::from_millis(self.typing_check_ms)
    }

    /// Inbound typing staleness threshold
    pub fn typing_stale(&self) -> Duration {
        Duration::from_millis(self.typing_stale_ms)
    }

    /// Store call deadline
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    /// Transport call deadline
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

// ============================================================================
// VERSION INFO
// ============================================================================

/// Returns the version of Phantom Core
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Returns build information for debugging
pub fn build_info() -> BuildInfo {
    BuildInfo {
        version: env!("CARGO_PKG_VERSION"),
        #[cfg(target_os = "ios")]
        target: "ios",
        #[cfg(target_os = "android")]
        target: "android",
        #[cfg(target_os = "macos")]
        target: "macos",
        #[cfg(target_os = "linux")]
        target: "linux",
        #[cfg(target_os = "windows")]
        target: "windows",
        #[cfg(not(any(
            target_os = "ios",
            target_os = "android",
            target_os = "macos",
            target_os = "linux",
            target_os = "windows"
        )))]
        target: "unknown",
        profile: if cfg!(debug_assertions) {
            "debug"
        } else {
            "release"
        },
    }
}

/// Build information for debugging
#[derive(Debug, Clone)]
pub struct BuildInfo {
    /// Crate version
    pub version: &'static str,
    /// Target operating system
    pub target: &'static str,
    /// Build profile (debug/release)
    pub profile: &'static str,
}

// ============================================================================
// TESTS
// ============================================================================

//! # Messaging Module
//!
//! Operation dispatch, the optimistic send lifecycle and the persisted
//! message model.
//!
//! ## Inbound Flow
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           INBOUND DISPATCH                              │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  NewMessage(wire channel, sender, payload)                             │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  Envelope::decode ──► ChannelMap::to_local                             │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  ┌─────────┬──────────┬──────────┬──────────┐                          │
//! │  │  Post   │  Edit    │  Delete  │  React   │   lock(uuid)             │
//! │  └────┬────┴────┬─────┴────┬─────┴────┬─────┘                          │
//! │       │         │ target must exist   │                                │
//! │       ▼         ▼          ▼          ▼                                 │
//! │   store upsert / update / delete  ──►  view append / patch / remove    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Local Send Lifecycle
//!
//! ```text
//!   send_text ──► view (Sending) ──┬── store write ──┐
//!                                  └── transport ────┴─► both ok?  Sent
//!                                                        otherwise Failed ──► retry
//! ```

mod attachments;
mod context;
mod dispatcher;
mod locks;
mod outbox;
mod reactions;

pub use attachments::{format_file_size, Attachment};
pub use context::{send_failure_notice, with_timeout, MessagingContext, HANDSHAKE_PENDING_NOTICE};
pub use dispatcher::{DispatchOutcome, Dispatcher, IgnoreReason};
pub use locks::KeyedLocks;
pub use outbox::{DeliveryHandle, DeliveryOutcome, Outbox, PendingSend};
pub use reactions::Reactions;

pub use crate::protocol::{MessageKind, ReplyReference};

use serde::{Deserialize, Serialize};

use crate::protocol::Post;

// ============================================================================
// MESSAGE STATUS
// ============================================================================

/// Delivery status of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    /// Local send in flight
    Sending,
    /// Local send confirmed by both store and transport
    Sent,
    /// Received from a peer
    Delivered,
    /// Seen by the recipient
    Read,
    /// Local send failed; can be retried
    Failed,
}

impl MessageStatus {
    /// Storage name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sending => "sending",
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Read => "read",
            Self::Failed => "failed",
        }
    }

    /// Parse a stored status
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sending" => Some(Self::Sending),
            "sent" => Some(Self::Sent),
            "delivered" => Some(Self::Delivered),
            "read" => Some(Self::Read),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Local send not yet confirmed
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Sending)
    }
}

// ============================================================================
// STORED MESSAGE
// ============================================================================

/// A message row as persisted by the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMessage {
    /// Identity key; `None` only for rows written before uuids existed
    pub uuid: Option<String>,
    /// Display label resolved when the message arrived
    pub sender: String,
    /// Peer id of the sender
    pub sender_id: String,
    /// Text, or a data URL for attachments
    pub content: String,
    /// Local channel key
    pub channel: String,
    /// Unix millis; `None` only for legacy rows
    pub timestamp: Option<i64>,
    /// Quoted message
    pub reply_to: Option<ReplyReference>,
    /// Message kind
    pub kind: MessageKind,
    /// Delivery status
    pub status: MessageStatus,
    /// Reaction map
    pub reactions: Reactions,
    /// Time of the last applied edit, Unix millis
    pub last_edited: Option<i64>,
    /// Attachment file name
    pub file_name: Option<String>,
    /// Human-readable attachment size
    pub file_size: Option<String>,
}

impl StoredMessage {
    /// Build a row from a decoded post
    pub fn from_post(
        post: Post,
        channel: impl Into<String>,
        sender: impl Into<String>,
        sender_id: impl Into<String>,
        status: MessageStatus,
        timestamp: i64,
    ) -> Self {
        Self {
            uuid: post.uuid,
            sender: sender.into(),
            sender_id: sender_id.into(),
            content: post.content,
            channel: channel.into(),
            timestamp: Some(timestamp),
            reply_to: post.reply_to,
            kind: post.kind,
            status,
            reactions: Reactions::new(),
            last_edited: None,
            file_name: post.file_name,
            file_size: post.file_size,
        }
    }

    /// The post this row was created from, for re-sending
    pub fn to_post(&self) -> Post {
        Post {
            uuid: self.uuid.clone(),
            kind: self.kind,
            content: self.content.clone(),
            reply_to: self.reply_to.clone(),
            file_name: self.file_name.clone(),
            file_size: self.file_size.clone(),
            timestamp: self.timestamp,
        }
    }

    /// Whether an edit has been applied
    pub fn is_edited(&self) -> bool {
        self.last_edited.is_some()
    }
}

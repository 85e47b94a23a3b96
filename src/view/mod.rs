//! # View Module
//!
//! The ordered projection of the active channel that the UI renders.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                            VIEW PROJECTION                              │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  select_channel(C)                                                      │
//! │     1. active = C, list cleared                                         │
//! │     2. history = store.get_messages(C)   (async, under a deadline)      │
//! │     3. list = history ∪ pending sends ∪ live appends during 2           │
//! │                                                                         │
//! │  append(m)      only if m.channel == active and m.uuid not listed       │
//! │  apply_edit / remove / set_reactions / set_status   patch by uuid       │
//! │  push_system_notice  view-only row, never persisted                     │
//! │                                                                         │
//! │  rows()  ──►  [DateSeparator(day)] Message{top, bottom} ...             │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Uuids are unique within the list. Rows without a uuid (legacy history and
//! system notices) are never deduplicated.

mod rows;

pub use rows::{build_rows, ViewRow};

use std::sync::Arc;
use std::time::Duration;

use chrono::FixedOffset;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::messaging::{with_timeout, MessageKind, MessageStatus, Reactions, ReplyReference, StoredMessage};
use crate::storage::MessageStore;
use crate::time::{format_clock, now_timestamp_millis};

/// Sender label of view-only notices
pub const SYSTEM_SENDER: &str = "Система";

/// A message as shown in the active channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewMessage {
    /// Identity key; `None` for notices and legacy rows
    pub uuid: Option<String>,
    /// Display label
    pub sender: String,
    /// Peer id of the author
    pub sender_id: String,
    /// Text, or a data URL for attachments
    pub content: String,
    /// Local channel key
    pub channel: String,
    /// Unix millis
    pub timestamp: Option<i64>,
    /// Local wall-clock time, `HH:MM:SS`
    pub time: String,
    /// Quoted message
    pub reply_to: Option<ReplyReference>,
    /// Message kind
    pub kind: MessageKind,
    /// Delivery status
    pub status: MessageStatus,
    /// Reaction map
    pub reactions: Reactions,
    /// Whether an edit was applied
    pub is_edited: bool,
    /// Attachment file name
    pub file_name: Option<String>,
    /// Human-readable attachment size
    pub file_size: Option<String>,
    /// View-only notice
    pub is_system: bool,
}

impl ViewMessage {
    /// Project a stored row
    pub fn from_stored(message: &StoredMessage, offset: FixedOffset) -> Self {
        Self {
            uuid: message.uuid.clone(),
            sender: message.sender.clone(),
            sender_id: message.sender_id.clone(),
            content: message.content.clone(),
            channel: message.channel.clone(),
            timestamp: message.timestamp,
            time: message
                .timestamp
                .map(|ts| format_clock(ts, offset))
                .unwrap_or_default(),
            reply_to: message.reply_to.clone(),
            kind: message.kind,
            status: message.status,
            reactions: message.reactions.clone(),
            is_edited: message.is_edited(),
            file_name: message.file_name.clone(),
            file_size: message.file_size.clone(),
            is_system: false,
        }
    }

    /// Key used to group consecutive messages.
    ///
    /// Rows migrated from before sender ids were stored fall back to the label.
    pub(crate) fn author_key(&self) -> &str {
        if self.sender_id.is_empty() {
            &self.sender
        } else {
            &self.sender_id
        }
    }
}

/// A reply quote ready for display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyPreview {
    /// Quoted sender label
    pub sender: String,
    /// Quoted content
    pub content: String,
    /// Uuid to scroll to, only if the quoted message is in the view
    pub jump_to: Option<String>,
}

#[derive(Default)]
struct ViewState {
    channel: Option<String>,
    messages: Vec<ViewMessage>,
    /// Bumped on every channel switch so a slow load can tell it lost
    generation: u64,
}

impl ViewState {
    fn contains(&self, uuid: &str) -> bool {
        self.messages.iter().any(|m| m.uuid.as_deref() == Some(uuid))
    }

    fn find_mut(&mut self, uuid: &str) -> Option<&mut ViewMessage> {
        self.messages.iter_mut().find(|m| m.uuid.as_deref() == Some(uuid))
    }

    fn push_unique(&mut self, message: ViewMessage) -> bool {
        if let Some(uuid) = message.uuid.as_deref() {
            if self.contains(uuid) {
                return false;
            }
        }
        self.messages.push(message);
        true
    }
}

/// Projection of the active channel
pub struct ViewProjector {
    store: Arc<dyn MessageStore>,
    offset: FixedOffset,
    read_timeout: Duration,
    state: Mutex<ViewState>,
}

impl ViewProjector {
    /// Create a projector with no active channel
    pub fn new(store: Arc<dyn MessageStore>, offset: FixedOffset, read_timeout: Duration) -> Self {
        Self {
            store,
            offset,
            read_timeout,
            state: Mutex::new(ViewState::default()),
        }
    }

    /// Make `channel` active and load its history.
    ///
    /// `pending` holds local sends that may not have reached the store yet.
    /// Messages appended while the history loads are kept. If another channel
    /// is selected before the load finishes, this load is discarded.
    ///
    /// A failed or timed out history read still shows pending and live
    /// messages; the error is returned for logging.
    pub async fn select_channel(&self, channel: &str, pending: &[StoredMessage]) -> Result<()> {
        let generation = {
            let mut state = self.state.lock();
            state.channel = Some(channel.to_string());
            state.messages.clear();
            state.generation += 1;
            state.generation
        };

        let loaded = with_timeout(self.read_timeout, self.store.get_messages(channel)).await;

        let mut state = self.state.lock();
        if state.generation != generation {
            tracing::debug!("Discarding superseded history load for {}", channel);
            return Ok(());
        }

        let live = std::mem::take(&mut state.messages);
        let (history, result) = match loaded {
            Ok(history) => (history, Ok(())),
            Err(e) => (Vec::new(), Err(e)),
        };

        for message in history.iter().chain(pending.iter().filter(|m| m.channel == channel)) {
            state.push_unique(ViewMessage::from_stored(message, self.offset));
        }
        for message in live {
            state.push_unique(message);
        }

        tracing::debug!("Channel {} shows {} messages", channel, state.messages.len());
        result
    }

    /// The active channel
    pub fn active_channel(&self) -> Option<String> {
        self.state.lock().channel.clone()
    }

    /// Whether `channel` is active
    pub fn is_active(&self, channel: &str) -> bool {
        self.state.lock().channel.as_deref() == Some(channel)
    }

    /// Append a message if it belongs to the active channel and is not listed
    pub fn append(&self, message: &StoredMessage) -> bool {
        let mut state = self.state.lock();
        if state.channel.as_deref() != Some(message.channel.as_str()) {
            return false;
        }
        state.push_unique(ViewMessage::from_stored(message, self.offset))
    }

    /// Replace content and mark edited
    pub fn apply_edit(&self, uuid: &str, content: &str) -> bool {
        match self.state.lock().find_mut(uuid) {
            Some(message) => {
                message.content = content.to_string();
                message.is_edited = true;
                true
            }
            None => false,
        }
    }

    /// Remove a message
    pub fn remove(&self, uuid: &str) -> bool {
        let mut state = self.state.lock();
        let before = state.messages.len();
        state.messages.retain(|m| m.uuid.as_deref() != Some(uuid));
        state.messages.len() != before
    }

    /// Replace a message's reactions
    pub fn set_reactions(&self, uuid: &str, reactions: &Reactions) -> bool {
        match self.state.lock().find_mut(uuid) {
            Some(message) => {
                message.reactions = reactions.clone();
                true
            }
            None => false,
        }
    }

    /// Change a message's delivery status
    pub fn set_status(&self, uuid: &str, status: MessageStatus) -> bool {
        match self.state.lock().find_mut(uuid) {
            Some(message) => {
                message.status = status;
                true
            }
            None => false,
        }
    }

    /// Show an inline notice if `channel` is active
    pub fn push_system_notice(&self, channel: &str, text: &str) -> bool {
        let mut state = self.state.lock();
        if state.channel.as_deref() != Some(channel) {
            return false;
        }
        state.messages.push(ViewMessage {
            uuid: None,
            sender: SYSTEM_SENDER.to_string(),
            sender_id: String::new(),
            content: text.to_string(),
            channel: channel.to_string(),
            timestamp: None,
            time: format_clock(now_timestamp_millis(), self.offset),
            reply_to: None,
            kind: MessageKind::Text,
            status: MessageStatus::Delivered,
            reactions: Reactions::new(),
            is_edited: false,
            file_name: None,
            file_size: None,
            is_system: true,
        });
        true
    }

    /// A listed message by uuid
    pub fn get(&self, uuid: &str) -> Option<ViewMessage> {
        self.state
            .lock()
            .messages
            .iter()
            .find(|m| m.uuid.as_deref() == Some(uuid))
            .cloned()
    }

    /// Whether a uuid is listed
    pub fn contains(&self, uuid: &str) -> bool {
        self.state.lock().contains(uuid)
    }

    /// Snapshot of the list
    pub fn messages(&self) -> Vec<ViewMessage> {
        self.state.lock().messages.clone()
    }

    /// Number of messages shown, notices included
    pub fn len(&self) -> usize {
        self.state.lock().messages.len()
    }

    /// Whether nothing is shown
    pub fn is_empty(&self) -> bool {
        self.state.lock().messages.is_empty()
    }

    /// Rows with date separators and grouping flags
    pub fn rows(&self) -> Vec<ViewRow> {
        build_rows(&self.state.lock().messages, self.offset)
    }

    /// Case-insensitive search over content and sender.
    ///
    /// Attachment payloads are matched by file name only. A blank query
    /// returns the whole list.
    pub fn search(&self, query: &str) -> Vec<ViewMessage> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return self.messages();
        }
        self.state
            .lock()
            .messages
            .iter()
            .filter(|m| !m.is_system)
            .filter(|m| {
                let body = match m.kind {
                    MessageKind::Text => m.content.as_str(),
                    _ => m.file_name.as_deref().unwrap_or_default(),
                };
                body.to_lowercase().contains(&needle) || m.sender.to_lowercase().contains(&needle)
            })
            .cloned()
            .collect()
    }

    /// Resolve a reply quote against the list
    pub fn reply_preview(&self, reply: &ReplyReference) -> ReplyPreview {
        let jump_to = reply.uuid.clone().filter(|uuid| self.contains(uuid));
        ReplyPreview {
            sender: reply.sender.clone(),
            content: reply.content.clone(),
            jump_to,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryStore;

    fn stored(uuid: &str, channel: &str, timestamp: i64) -> StoredMessage {
        StoredMessage {
            uuid: Some(uuid.into()),
            sender: "Alice".into(),
            sender_id: "alice".into(),
            content: format!("content {}", uuid),
            channel: channel.into(),
            timestamp: Some(timestamp),
            reply_to: None,
            kind: MessageKind::Text,
            status: MessageStatus::Delivered,
            reactions: Reactions::new(),
            last_edited: None,
            file_name: None,
            file_size: None,
        }
    }

    fn projector() -> (ViewProjector, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (
            ViewProjector::new(
                store.clone(),
                crate::time::offset_from_secs(0),
                Duration::from_secs(5),
            ),
            store,
        )
    }

    fn uuids(view: &ViewProjector) -> Vec<String> {
        view.messages().into_iter().filter_map(|m| m.uuid).collect()
    }

    #[tokio::test]
    async fn test_select_loads_history_in_order() {
        let (view, store) = projector();
        store.upsert_message(&stored("b", "c1", 2)).await.unwrap();
        store.upsert_message(&stored("a", "c1", 1)).await.unwrap();
        store.upsert_message(&stored("x", "c2", 1)).await.unwrap();

        view.select_channel("c1", &[]).await.unwrap();
        assert_eq!(uuids(&view), vec!["a", "b"]);
        assert_eq!(view.active_channel().as_deref(), Some("c1"));
        assert!(view.is_active("c1"));
    }

    #[tokio::test]
    async fn test_select_merges_pending_without_duplicates() {
        let (view, store) = projector();
        store.upsert_message(&stored("a", "c1", 1)).await.unwrap();

        let pending = vec![stored("a", "c1", 1), stored("p", "c1", 5), stored("q", "c2", 6)];
        view.select_channel("c1", &pending).await.unwrap();
        assert_eq!(uuids(&view), vec!["a", "p"]);
    }

    #[tokio::test]
    async fn test_append_filters_channel_and_duplicates() {
        let (view, _store) = projector();
        view.select_channel("c1", &[]).await.unwrap();

        assert!(view.append(&stored("m", "c1", 1)));
        assert!(!view.append(&stored("m", "c1", 1)));
        assert!(!view.append(&stored("n", "c2", 1)));
        assert_eq!(view.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_history_read_keeps_pending() {
        let (view, store) = projector();
        store.fail_reads(true);
        let result = view.select_channel("c1", &[stored("p", "c1", 1)]).await;
        assert!(result.is_err());
        assert_eq!(uuids(&view), vec!["p"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_history_read_times_out() {
        let (view, store) = projector();
        store.hang_reads(true);

        let binding = [stored("p", "c1", 1)];
        let load = view.select_channel("c1", &binding);
        let result = tokio::time::timeout(Duration::from_secs(600), load).await;
        assert!(matches!(result, Ok(Err(crate::Error::Timeout(_)))));
        assert_eq!(uuids(&view), vec!["p"]);
        assert!(view.is_active("c1"));

        // Live messages still land once the load gave up
        assert!(view.append(&stored("live", "c1", 2)));
        assert_eq!(uuids(&view), vec!["p", "live"]);
    }

    #[tokio::test]
    async fn test_patches_by_uuid() {
        let (view, _store) = projector();
        view.select_channel("c1", &[stored("m", "c1", 1)]).await.unwrap();

        assert!(view.apply_edit("m", "new"));
        let message = view.get("m").unwrap();
        assert_eq!(message.content, "new");
        assert!(message.is_edited);

        let mut reactions = Reactions::new();
        reactions.toggle("👍", "bob");
        assert!(view.set_reactions("m", &reactions));
        assert!(view.set_status("m", MessageStatus::Read));
        assert_eq!(view.get("m").unwrap().status, MessageStatus::Read);
        assert!(view.get("m").unwrap().reactions.contains("👍", "bob"));

        assert!(!view.apply_edit("missing", "x"));
        assert!(view.remove("m"));
        assert!(!view.remove("m"));
        assert!(view.is_empty());
    }

    #[tokio::test]
    async fn test_system_notice_only_in_active_channel() {
        let (view, _store) = projector();
        view.select_channel("p1", &[]).await.unwrap();

        assert!(!view.push_system_notice("p2", "hidden"));
        assert!(view.push_system_notice("p1", "shown"));
        assert!(view.push_system_notice("p1", "shown"));

        let messages = view.messages();
        assert_eq!(messages.len(), 2);
        assert!(messages[0].is_system);
        assert_eq!(messages[0].sender, SYSTEM_SENDER);
        assert_eq!(messages[0].timestamp, None);
    }

    #[tokio::test]
    async fn test_switching_clears_list() {
        let (view, store) = projector();
        store.upsert_message(&stored("a", "c1", 1)).await.unwrap();
        view.select_channel("c1", &[]).await.unwrap();
        view.push_system_notice("c1", "notice");

        view.select_channel("c2", &[]).await.unwrap();
        assert!(view.is_empty());
    }

    #[tokio::test]
    async fn test_search() {
        let (view, _store) = projector();
        let mut file = stored("f", "c1", 3);
        file.kind = MessageKind::File;
        file.content = "data:application/pdf;base64,UkVQT1JU".into();
        file.file_name = Some("Report.pdf".into());
        let mut hello = stored("h", "c1", 1);
        hello.content = "Hello World".into();

        view.select_channel("c1", &[hello, stored("o", "c1", 2), file]).await.unwrap();
        view.push_system_notice("c1", "hello from the system");

        let hits: Vec<_> = view.search("hello").into_iter().filter_map(|m| m.uuid).collect();
        assert_eq!(hits, vec!["h"]);
        let hits: Vec<_> = view.search("report").into_iter().filter_map(|m| m.uuid).collect();
        assert_eq!(hits, vec!["f"]);
        assert_eq!(view.search("alice").len(), 3);
        assert_eq!(view.search("  ").len(), 4);
    }

    #[tokio::test]
    async fn test_reply_preview() {
        let (view, _store) = projector();
        view.select_channel("c1", &[stored("m", "c1", 1)]).await.unwrap();

        let reply = ReplyReference {
            sender: "Alice".into(),
            content: "quoted".into(),
            uuid: Some("m".into()),
        };
        assert_eq!(view.reply_preview(&reply).jump_to.as_deref(), Some("m"));

        let unknown = ReplyReference { uuid: Some("gone".into()), ..reply.clone() };
        let preview = view.reply_preview(&unknown);
        assert_eq!(preview.jump_to, None);
        assert_eq!(preview.content, "quoted");
    }

    #[tokio::test]
    async fn test_time_is_formatted() {
        let (view, _store) = projector();
        // 2024-03-10 13:14:15 UTC
        view.select_channel("c1", &[stored("m", "c1", 1_710_076_455_000)])
            .await
            .unwrap();
        assert_eq!(view.get("m").unwrap().time, "13:14:15");
    }
}

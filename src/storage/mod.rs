//! # Storage Module
//!
//! Durable per-device history: messages, contacts and settings.
//!
//! ## Storage Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         STORAGE SYSTEM                                  │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Dispatcher / Outbox / ContactBook / ViewProjector                     │
//! │         │                                                               │
//! │         │  Arc<dyn MessageStore>   (async, individually fallible)      │
//! │         ▼                                                               │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  Database                                                       │   │
//! │  │  ────────                                                       │   │
//! │  │  rusqlite connection behind a mutex; every call runs on the     │   │
//! │  │  blocking pool so the event loop never waits on disk.           │   │
//! │  │                                                                 │   │
//! │  │  Tables: messages, deleted_messages, contacts, settings         │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

mod database;
mod schema;

pub use database::Database;

use async_trait::async_trait;

use crate::contacts::Contact;
use crate::error::Result;
use crate::messaging::{MessageStatus, Reactions, StoredMessage};

/// Storage configuration
#[derive(Debug, Clone, Default)]
pub struct StorageConfig {
    /// Path to the database file (None for in-memory)
    pub database_path: Option<String>,
}

/// Initialize the storage system
pub async fn init(config: &StorageConfig) -> Result<Database> {
    Database::open(config.database_path.as_deref()).await
}

/// Async CRUD contract for the durable store
///
/// Update and delete calls return whether a row matched. A `false` is not an
/// error: callers treat a missing row as a no-op.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Insert a message unless its uuid is already stored or was deleted.
    ///
    /// Returns `true` if a row was inserted.
    async fn upsert_message(&self, message: &StoredMessage) -> Result<bool>;

    /// Fetch a message by uuid
    async fn get_message(&self, uuid: &str) -> Result<Option<StoredMessage>>;

    /// Replace a message's content and record the edit time
    async fn update_message_content(&self, uuid: &str, content: &str, last_edited: i64)
        -> Result<bool>;

    /// Replace a message's reaction map
    async fn update_message_reactions(&self, uuid: &str, reactions: &Reactions) -> Result<bool>;

    /// Change a message's delivery status
    async fn update_message_status(&self, uuid: &str, status: MessageStatus) -> Result<bool>;

    /// Delete a message; later inserts of the same uuid are ignored.
    ///
    /// The uuid is tombstoned even when no row matched. Returns `true` if a
    /// row was removed.
    async fn delete_message(&self, uuid: &str) -> Result<bool>;

    /// All messages in a channel, oldest first
    async fn get_messages(&self, channel: &str) -> Result<Vec<StoredMessage>>;

    /// Insert or rename a contact
    async fn upsert_contact(&self, contact: &Contact) -> Result<()>;

    /// Fetch a contact by peer id
    async fn get_contact(&self, peer_id: &str) -> Result<Option<Contact>>;

    /// All contacts ordered by name
    async fn list_contacts(&self) -> Result<Vec<Contact>>;

    /// Delete a contact
    async fn delete_contact(&self, peer_id: &str) -> Result<bool>;

    /// Read a setting
    async fn get_setting(&self, key: &str) -> Result<Option<String>>;

    /// Write a setting
    async fn set_setting(&self, key: &str, value: &str) -> Result<()>;
}

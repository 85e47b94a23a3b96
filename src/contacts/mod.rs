//! # Contacts Module
//!
//! Address book and display-name resolution.
//!
//! Contacts are independent of message flow: they are only consulted to turn
//! a peer id into something a person can read. The book keeps an in-memory
//! cache of the store's `contacts` table so resolution never waits on I/O.
//!
//! ## Name Resolution
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  sender == local peer id   ──►  local label ("Я")                       │
//! │  contact exists            ──►  contact name                           │
//! │  otherwise                 ──►  first 8 chars of the peer id + "..."   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::storage::MessageStore;

/// Settings key holding the local profile's display name
pub const DISPLAY_NAME_SETTING: &str = "displayName";

/// Prefix of the peer list label for unnamed peers
const UNNAMED_PEER_PREFIX: &str = "Участник";

/// An address book entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    /// Peer id (unique)
    pub peer_id: String,
    /// Name chosen by the local user
    pub name: String,
    /// When the contact was added, Unix millis
    pub added_at: i64,
}

/// First eight characters of a peer id
pub fn short_peer_id(peer_id: &str) -> String {
    peer_id.chars().take(8).collect()
}

/// Cached address book backed by the store
pub struct ContactBook {
    store: Arc<dyn MessageStore>,
    cache: RwLock<Vec<Contact>>,
    local_label: String,
}

impl ContactBook {
    /// Create an empty book; call [`ContactBook::load`] to fill the cache.
    pub fn new(store: Arc<dyn MessageStore>, local_label: impl Into<String>) -> Self {
        Self {
            store,
            cache: RwLock::new(Vec::new()),
            local_label: local_label.into(),
        }
    }

    /// Reload the cache from the store
    pub async fn load(&self) -> Result<()> {
        let contacts = self.store.list_contacts().await?;
        tracing::debug!("Loaded {} contacts", contacts.len());
        *self.cache.write() = contacts;
        Ok(())
    }

    /// Add or rename a contact
    pub async fn add(&self, peer_id: &str, name: &str) -> Result<Contact> {
        let name = name.trim();
        if peer_id.is_empty() || name.is_empty() {
            return Err(Error::InvalidMessageContent(
                "contact needs a peer id and a name".into(),
            ));
        }

        let contact = Contact {
            peer_id: peer_id.to_string(),
            name: name.to_string(),
            added_at: crate::time::now_timestamp_millis(),
        };
        self.store.upsert_contact(&contact).await?;

        let mut cache = self.cache.write();
        cache.retain(|c| c.peer_id != peer_id);
        cache.push(contact.clone());
        cache.sort_by(|a, b| a.name.cmp(&b.name));

        tracing::info!("Contact saved: {}", short_peer_id(peer_id));
        Ok(contact)
    }

    /// Remove a contact; returns whether one existed
    pub async fn remove(&self, peer_id: &str) -> Result<bool> {
        let removed = self.store.delete_contact(peer_id).await?;
        self.cache.write().retain(|c| c.peer_id != peer_id);
        Ok(removed)
    }

    /// Look up a contact
    pub fn get(&self, peer_id: &str) -> Option<Contact> {
        self.cache.read().iter().find(|c| c.peer_id == peer_id).cloned()
    }

    /// All contacts, ordered by name
    pub fn list(&self) -> Vec<Contact> {
        self.cache.read().clone()
    }

    /// Label for a peer in the peer list
    pub fn display_name(&self, peer_id: &str) -> String {
        match self.get(peer_id) {
            Some(contact) => contact.name,
            None => format!("{} {}...", UNNAMED_PEER_PREFIX, short_peer_id(peer_id)),
        }
    }

    /// Label for the sender of a message
    pub fn sender_label(&self, sender_id: &str, local_peer_id: Option<&str>) -> String {
        if local_peer_id == Some(sender_id) {
            return self.local_label.clone();
        }
        match self.get(sender_id) {
            Some(contact) => contact.name,
            None => format!("{}...", short_peer_id(sender_id)),
        }
    }

    /// Label used for locally sent messages
    pub fn local_label(&self) -> &str {
        &self.local_label
    }

    // ========================================================================
    // PROFILE
    // ========================================================================

    /// The local profile's display name, if set
    pub async fn profile_name(&self) -> Result<Option<String>> {
        self.store.get_setting(DISPLAY_NAME_SETTING).await
    }

    /// Persist the local profile's display name
    pub async fn set_profile_name(&self, name: &str) -> Result<()> {
        self.store.set_setting(DISPLAY_NAME_SETTING, name.trim()).await
    }
}

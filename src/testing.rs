//! Test doubles for the store and transport contracts.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::contacts::{Contact, ContactBook};
use crate::discovery::PeerDirectory;
use crate::engine::ChatEvent;
use crate::error::{Error, Result};
use crate::messaging::{KeyedLocks, MessageStatus, MessagingContext, Reactions, StoredMessage};
use crate::network::Transport;
use crate::protocol::ChannelMap;
use crate::storage::MessageStore;
use crate::view::ViewProjector;

/// Peer id the harness assigns to the local node
pub const LOCAL_PEER: &str = "12D3KooWLocalPeer";

/// Route `tracing` output to the test writer; `RUST_LOG` picks the level
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "phantom_core=warn".into()),
        )
        .with_test_writer()
        .try_init();
}

// ============================================================================
// MEMORY STORE
// ============================================================================

#[derive(Default)]
struct Tables {
    messages: Vec<StoredMessage>,
    deleted: HashSet<String>,
    contacts: HashMap<String, Contact>,
    settings: HashMap<String, String>,
}

/// In-memory [`MessageStore`] with the same semantics as the database
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
    hang_writes: AtomicBool,
    hang_reads: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every message write return a database error
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make channel history reads return a database error
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make inserts never complete
    pub fn hang_writes(&self, hang: bool) {
        self.hang_writes.store(hang, Ordering::SeqCst);
    }

    /// Make message reads never complete
    pub fn hang_reads(&self, hang: bool) {
        self.hang_reads.store(hang, Ordering::SeqCst);
    }

    /// Number of stored message rows
    pub fn message_count(&self) -> usize {
        self.tables.lock().messages.len()
    }

    async fn check_read(&self) -> Result<()> {
        if self.hang_reads.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    fn check_write(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::DatabaseError("injected write failure".into()));
        }
        Ok(())
    }

    fn update<F>(&self, uuid: &str, apply: F) -> Result<bool>
    where
        F: FnOnce(&mut StoredMessage),
    {
        self.check_write()?;
        let mut tables = self.tables.lock();
        match tables
            .messages
            .iter_mut()
            .find(|m| m.uuid.as_deref() == Some(uuid))
        {
            Some(message) => {
                apply(message);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn upsert_message(&self, message: &StoredMessage) -> Result<bool> {
        if self.hang_writes.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.check_write()?;

        let mut tables = self.tables.lock();
        if let Some(uuid) = message.uuid.as_deref() {
            let known = tables.deleted.contains(uuid)
                || tables.messages.iter().any(|m| m.uuid.as_deref() == Some(uuid));
            if known {
                return Ok(false);
            }
        }
        tables.messages.push(message.clone());
        Ok(true)
    }

    async fn get_message(&self, uuid: &str) -> Result<Option<StoredMessage>> {
        self.check_read().await?;
        Ok(self
            .tables
            .lock()
            .messages
            .iter()
            .find(|m| m.uuid.as_deref() == Some(uuid))
            .cloned())
    }

    async fn update_message_content(
        &self,
        uuid: &str,
        content: &str,
        last_edited: i64,
    ) -> Result<bool> {
        self.update(uuid, |m| {
            m.content = content.to_string();
            m.last_edited = Some(last_edited);
        })
    }

    async fn update_message_reactions(&self, uuid: &str, reactions: &Reactions) -> Result<bool> {
        self.update(uuid, |m| m.reactions = reactions.clone())
    }

    async fn update_message_status(&self, uuid: &str, status: MessageStatus) -> Result<bool> {
        self.update(uuid, |m| m.status = status)
    }

    async fn delete_message(&self, uuid: &str) -> Result<bool> {
        self.check_write()?;
        let mut tables = self.tables.lock();
        let before = tables.messages.len();
        tables.messages.retain(|m| m.uuid.as_deref() != Some(uuid));
        tables.deleted.insert(uuid.to_string());
        Ok(tables.messages.len() != before)
    }

    async fn get_messages(&self, channel: &str) -> Result<Vec<StoredMessage>> {
        self.check_read().await?;
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Error::DatabaseError("injected read failure".into()));
        }
        let mut messages: Vec<StoredMessage> = self
            .tables
            .lock()
            .messages
            .iter()
            .filter(|m| m.channel == channel)
            .cloned()
            .collect();
        // Stable sort keeps insertion order for equal timestamps; NULLs first
        messages.sort_by_key(|m| m.timestamp);
        Ok(messages)
    }

    async fn upsert_contact(&self, contact: &Contact) -> Result<()> {
        let mut tables = self.tables.lock();
        let added_at = tables
            .contacts
            .get(&contact.peer_id)
            .map_or(contact.added_at, |existing| existing.added_at);
        tables.contacts.insert(
            contact.peer_id.clone(),
            Contact {
                added_at,
                ..contact.clone()
            },
        );
        Ok(())
    }

    async fn get_contact(&self, peer_id: &str) -> Result<Option<Contact>> {
        Ok(self.tables.lock().contacts.get(peer_id).cloned())
    }

    async fn list_contacts(&self) -> Result<Vec<Contact>> {
        let mut contacts: Vec<Contact> = self.tables.lock().contacts.values().cloned().collect();
        contacts.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(contacts)
    }

    async fn delete_contact(&self, peer_id: &str) -> Result<bool> {
        Ok(self.tables.lock().contacts.remove(peer_id).is_some())
    }

    async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        Ok(self.tables.lock().settings.get(key).cloned())
    }

    async fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        self.tables
            .lock()
            .settings
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

// ============================================================================
// RECORDING TRANSPORT
// ============================================================================

/// [`Transport`] that records every call
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<(String, String)>>,
    typing: Mutex<Vec<(String, bool)>>,
    connects: Mutex<Vec<String>>,
    failure: Mutex<Option<Error>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with a generic transport error
    pub fn fail_sends(&self, fail: bool) {
        *self.failure.lock() = fail.then(|| Error::TransportError("injected send failure".into()));
    }

    /// Make every call fail with `error`
    pub fn fail_with(&self, error: Error) {
        *self.failure.lock() = Some(error);
    }

    /// Published `(wire channel, payload)` pairs
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().clone()
    }

    /// Typing signals as `(peer, is_typing)`
    pub fn typing_signals(&self) -> Vec<(String, bool)> {
        self.typing.lock().clone()
    }

    /// Dialed addresses
    pub fn connects(&self) -> Vec<String> {
        self.connects.lock().clone()
    }

    fn check(&self) -> Result<()> {
        match self.failure.lock().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, channel: &str, payload: &str) -> Result<()> {
        self.check()?;
        self.sent
            .lock()
            .push((channel.to_string(), payload.to_string()));
        Ok(())
    }

    async fn send_typing(&self, peer_id: &str, is_typing: bool) -> Result<()> {
        self.check()?;
        self.typing.lock().push((peer_id.to_string(), is_typing));
        Ok(())
    }

    async fn connect(&self, address: &str) -> Result<()> {
        self.check()?;
        self.connects.lock().push(address.to_string());
        Ok(())
    }
}

// ============================================================================
// HARNESS
// ============================================================================

/// A messaging context over the test doubles
pub struct Harness {
    pub ctx: MessagingContext,
    pub store: Arc<MemoryStore>,
    pub transport: Arc<RecordingTransport>,
    pub events: broadcast::Receiver<ChatEvent>,
}

impl Harness {
    pub fn new() -> Self {
        init_tracing();
        let store = Arc::new(MemoryStore::new());
        let transport = Arc::new(RecordingTransport::new());
        let (events_tx, events) = broadcast::channel(256);
        let peers = Arc::new(PeerDirectory::new());
        peers.set_local_peer_id(LOCAL_PEER);

        let ctx = MessagingContext {
            store: store.clone(),
            transport: transport.clone(),
            view: Arc::new(ViewProjector::new(
                store.clone(),
                crate::time::offset_from_secs(0),
                Duration::from_secs(5),
            )),
            contacts: Arc::new(ContactBook::new(store.clone(), "Я")),
            peers,
            channels: Arc::new(ChannelMap::default()),
            locks: Arc::new(KeyedLocks::new()),
            events: events_tx,
        };
        Self { ctx, store, transport, events }
    }

    /// Everything emitted since the last drain
    pub fn drain_events(&mut self) -> Vec<ChatEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}

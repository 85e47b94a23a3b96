//! # Database
//!
//! SQLite implementation of [`MessageStore`].
//!
//! ## Database Operations
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      DATABASE OPERATIONS                                │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────┐                                                   │
//! │  │  MessageStore   │  async trait                                      │
//! │  └────────┬────────┘                                                   │
//! │           │ spawn_blocking                                              │
//! │           ▼                                                             │
//! │  ┌─────────────────┐                                                   │
//! │  │    Database     │  Row mapping                                      │
//! │  │   (this file)   │  - JSON columns degrade on corruption             │
//! │  │                 │  - Delete tombstones                              │
//! │  └────────┬────────┘                                                   │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  ┌─────────────────┐                                                   │
//! │  │   SQLite DB     │  Storage                                          │
//! │  │   (file or      │  - In-memory for tests                            │
//! │  │    memory)      │  - File for production                            │
//! │  └─────────────────┘                                                   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{schema, MessageStore};
use crate::contacts::Contact;
use crate::error::{Error, Result};
use crate::messaging::{MessageKind, MessageStatus, Reactions, ReplyReference, StoredMessage};

const MESSAGE_COLUMNS: &str = "uuid, sender, sender_id, content, channel, timestamp, reply_to, \
     kind, status, reactions, last_edited, file_name, file_size";

/// The main database handle
///
/// Cloning is cheap; clones share the connection.
#[derive(Clone)]
pub struct Database {
    /// The underlying SQLite connection
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create a database
    ///
    /// If path is None, creates an in-memory database (useful for testing).
    pub async fn open(path: Option<&str>) -> Result<Self> {
        let conn = match path {
            Some(p) => Connection::open(p)
                .map_err(|e| Error::DatabaseError(format!("Failed to open database: {}", e)))?,
            None => Connection::open_in_memory().map_err(|e| {
                Error::DatabaseError(format!("Failed to create in-memory database: {}", e))
            })?,
        };

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        // Initialize schema
        db.init_schema()?;

        Ok(db)
    }

    /// Initialize the database schema
    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock();

        // Check current schema version
        let version: Option<i32> = conn
            .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| row.get(0))
            .ok();

        match version {
            None => {
                // Fresh database, create all tables
                conn.execute_batch(schema::CREATE_TABLES)
                    .map_err(|e| Error::DatabaseError(format!("Failed to create tables: {}", e)))?;

                // Set schema version
                conn.execute(
                    "INSERT INTO schema_version (version) VALUES (?)",
                    params![schema::SCHEMA_VERSION],
                )
                .map_err(|e| Error::DatabaseError(format!("Failed to set schema version: {}", e)))?;

                tracing::info!("Database schema created (version {})", schema::SCHEMA_VERSION);
            }
            Some(v) if v < schema::SCHEMA_VERSION => {
                tracing::info!(
                    "Database schema version {} is older than current {}, running migrations",
                    v,
                    schema::SCHEMA_VERSION
                );

                if v < 2 {
                    tracing::info!("Running migration v1 → v2 (kinds, status, reactions, edits)");
                    conn.execute_batch(schema::MIGRATE_V1_TO_V2)
                        .map_err(|e| Error::DatabaseError(format!("Migration v1→v2 failed: {}", e)))?;
                }

                tracing::info!("All migrations complete (now at version {})", schema::SCHEMA_VERSION);
            }
            Some(v) => {
                tracing::debug!("Database schema version: {}", v);
            }
        }

        Ok(())
    }

    /// Run a closure against the connection on the blocking pool
    async fn blocking<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock();
            op(&conn)
        })
        .await
        .map_err(|e| Error::Internal(format!("Database task failed: {}", e)))?
    }
}

// ============================================================================
// MESSAGE OPERATIONS
// ============================================================================

fn insert_message(conn: &Connection, msg: &StoredMessage) -> Result<bool> {
    if let Some(uuid) = &msg.uuid {
        let deleted: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM deleted_messages WHERE uuid = ?",
                params![uuid],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| Error::DatabaseError(format!("Failed to check tombstone: {}", e)))?;
        if deleted.is_some() {
            tracing::debug!("Ignoring insert of deleted message {}", uuid);
            return Ok(false);
        }
    }

    let reply_to = msg.reply_to.as_ref().map(serde_json::to_string).transpose()?;
    let changed = conn
        .execute(
            &format!(
                "INSERT INTO messages ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(uuid) DO NOTHING",
                MESSAGE_COLUMNS
            ),
            params![
                msg.uuid,
                msg.sender,
                msg.sender_id,
                msg.content,
                msg.channel,
                msg.timestamp,
                reply_to,
                msg.kind.as_str(),
                msg.status.as_str(),
                msg.reactions.to_json()?,
                msg.last_edited,
                msg.file_name,
                msg.file_size,
            ],
        )
        .map_err(|e| Error::DatabaseError(format!("Failed to store message: {}", e)))?;

    Ok(changed > 0)
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<StoredMessage> {
    let reply_to: Option<String> = row.get(6)?;
    let kind: String = row.get(7)?;
    let status: String = row.get(8)?;
    let reactions: Option<String> = row.get(9)?;

    Ok(StoredMessage {
        uuid: row.get(0)?,
        sender: row.get(1)?,
        sender_id: row.get(2)?,
        content: row.get(3)?,
        channel: row.get(4)?,
        timestamp: row.get(5)?,
        reply_to: reply_to.and_then(|json| parse_reply(&json)),
        kind: MessageKind::parse(&kind).unwrap_or_default(),
        status: MessageStatus::parse(&status).unwrap_or(MessageStatus::Sent),
        reactions: reactions
            .map(|json| Reactions::from_json_lossy(&json))
            .unwrap_or_default(),
        last_edited: row.get(10)?,
        file_name: row.get(11)?,
        file_size: row.get(12)?,
    })
}

fn parse_reply(json: &str) -> Option<ReplyReference> {
    match serde_json::from_str(json) {
        Ok(reply) => Some(reply),
        Err(e) => {
            tracing::warn!("Discarding unreadable reply reference: {}", e);
            None
        }
    }
}

fn select_message(conn: &Connection, uuid: &str) -> Result<Option<StoredMessage>> {
    let result = conn.query_row(
        &format!("SELECT {} FROM messages WHERE uuid = ?", MESSAGE_COLUMNS),
        params![uuid],
        message_from_row,
    );

    match result {
        Ok(record) => Ok(Some(record)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::DatabaseError(format!("Failed to get message: {}", e))),
    }
}

fn select_channel(conn: &Connection, channel: &str) -> Result<Vec<StoredMessage>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {} FROM messages WHERE channel = ? ORDER BY timestamp ASC, id ASC",
            MESSAGE_COLUMNS
        ))
        .map_err(|e| Error::DatabaseError(format!("Failed to prepare query: {}", e)))?;

    let rows = stmt
        .query_map(params![channel], message_from_row)
        .map_err(|e| Error::DatabaseError(format!("Failed to query messages: {}", e)))?;

    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::DatabaseError(format!("Failed to read message row: {}", e)))
}

fn remove_message(conn: &Connection, uuid: &str) -> Result<bool> {
    let removed = conn
        .execute("DELETE FROM messages WHERE uuid = ?", params![uuid])
        .map_err(|e| Error::DatabaseError(format!("Failed to delete message: {}", e)))?;

    // Tombstone even without a row: a send still in flight must not land later
    conn.execute(
        "INSERT OR IGNORE INTO deleted_messages (uuid, deleted_at) VALUES (?, ?)",
        params![uuid, crate::time::now_timestamp_millis()],
    )
    .map_err(|e| Error::DatabaseError(format!("Failed to record deletion: {}", e)))?;

    Ok(removed > 0)
}

// ============================================================================
// CONTACT OPERATIONS
// ============================================================================

fn contact_from_row(row: &Row<'_>) -> rusqlite::Result<Contact> {
    Ok(Contact {
        peer_id: row.get(0)?,
        name: row.get(1)?,
        added_at: row.get(2)?,
    })
}

fn select_contacts(conn: &Connection) -> Result<Vec<Contact>> {
    let mut stmt = conn
        .prepare("SELECT peer_id, name, added_at FROM contacts ORDER BY name")
        .map_err(|e| Error::DatabaseError(format!("Failed to prepare query: {}", e)))?;

    let rows = stmt
        .query_map([], contact_from_row)
        .map_err(|e| Error::DatabaseError(format!("Failed to query contacts: {}", e)))?;

    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::DatabaseError(format!("Failed to read contact row: {}", e)))
}

// ============================================================================
// STORE CONTRACT
// ============================================================================

#[async_trait]
impl MessageStore for Database {
    async fn upsert_message(&self, message: &StoredMessage) -> Result<bool> {
        let message = message.clone();
        self.blocking(move |conn| insert_message(conn, &message)).await
    }

    async fn get_message(&self, uuid: &str) -> Result<Option<StoredMessage>> {
        let uuid = uuid.to_string();
        self.blocking(move |conn| select_message(conn, &uuid)).await
    }

    async fn update_message_content(
        &self,
        uuid: &str,
        content: &str,
        last_edited: i64,
    ) -> Result<bool> {
        let (uuid, content) = (uuid.to_string(), content.to_string());
        self.blocking(move |conn| {
            let changed = conn
                .execute(
                    "UPDATE messages SET content = ?, last_edited = ? WHERE uuid = ?",
                    params![content, last_edited, uuid],
                )
                .map_err(|e| Error::DatabaseError(format!("Failed to update content: {}", e)))?;
            Ok(changed > 0)
        })
        .await
    }

    async fn update_message_reactions(&self, uuid: &str, reactions: &Reactions) -> Result<bool> {
        let (uuid, json) = (uuid.to_string(), reactions.to_json()?);
        self.blocking(move |conn| {
            let changed = conn
                .execute(
                    "UPDATE messages SET reactions = ? WHERE uuid = ?",
                    params![json, uuid],
                )
                .map_err(|e| Error::DatabaseError(format!("Failed to update reactions: {}", e)))?;
            Ok(changed > 0)
        })
        .await
    }

    async fn update_message_status(&self, uuid: &str, status: MessageStatus) -> Result<bool> {
        let uuid = uuid.to_string();
        self.blocking(move |conn| {
            let changed = conn
                .execute(
                    "UPDATE messages SET status = ? WHERE uuid = ?",
                    params![status.as_str(), uuid],
                )
                .map_err(|e| Error::DatabaseError(format!("Failed to update status: {}", e)))?;
            Ok(changed > 0)
        })
        .await
    }

    async fn delete_message(&self, uuid: &str) -> Result<bool> {
        let uuid = uuid.to_string();
        self.blocking(move |conn| remove_message(conn, &uuid)).await
    }

    async fn get_messages(&self, channel: &str) -> Result<Vec<StoredMessage>> {
        let channel = channel.to_string();
        self.blocking(move |conn| select_channel(conn, &channel)).await
    }

    async fn upsert_contact(&self, contact: &Contact) -> Result<()> {
        let contact = contact.clone();
        self.blocking(move |conn| {
            conn.execute(
                "INSERT INTO contacts (peer_id, name, added_at) VALUES (?, ?, ?)
                 ON CONFLICT(peer_id) DO UPDATE SET name = excluded.name",
                params![contact.peer_id, contact.name, contact.added_at],
            )
            .map_err(|e| Error::DatabaseError(format!("Failed to save contact: {}", e)))?;
            Ok(())
        })
        .await
    }

    async fn get_contact(&self, peer_id: &str) -> Result<Option<Contact>> {
        let peer_id = peer_id.to_string();
        self.blocking(move |conn| {
            let result = conn.query_row(
                "SELECT peer_id, name, added_at FROM contacts WHERE peer_id = ?",
                params![peer_id],
                contact_from_row,
            );
            match result {
                Ok(contact) => Ok(Some(contact)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(Error::DatabaseError(format!("Failed to get contact: {}", e))),
            }
        })
        .await
    }

    async fn list_contacts(&self) -> Result<Vec<Contact>> {
        self.blocking(select_contacts).await
    }

    async fn delete_contact(&self, peer_id: &str) -> Result<bool> {
        let peer_id = peer_id.to_string();
        self.blocking(move |conn| {
            let removed = conn
                .execute("DELETE FROM contacts WHERE peer_id = ?", params![peer_id])
                .map_err(|e| Error::DatabaseError(format!("Failed to delete contact: {}", e)))?;
            Ok(removed > 0)
        })
        .await
    }

    async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let key = key.to_string();
        self.blocking(move |conn| {
            let result = conn.query_row(
                "SELECT value FROM settings WHERE key = ?",
                params![key],
                |row| row.get(0),
            );
            match result {
                Ok(value) => Ok(Some(value)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(Error::DatabaseError(format!("Failed to get setting: {}", e))),
            }
        })
        .await
    }

    async fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let (key, value) = (key.to_string(), value.to_string());
        self.blocking(move |conn| {
            conn.execute(
                "INSERT INTO settings (key, value) VALUES (?, ?)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key, value],
            )
            .map_err(|e| Error::DatabaseError(format!("Failed to set setting: {}", e)))?;
            Ok(())
        })
        .await
    }
}

// ============================================================================
// TESTS
// ============================================================================

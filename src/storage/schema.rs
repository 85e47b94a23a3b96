//! # Database Schema
//!
//! SQL schema definitions for the Phantom message store.
//!
//! ## Schema Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         DATABASE SCHEMA                                 │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────┐    ┌─────────────────┐      ┌─────────────────┐    │
//! │  │    messages     │    │    contacts     │      │    settings     │    │
//! │  ├─────────────────┤    ├─────────────────┤      ├─────────────────┤    │
//! │  │ id              │    │ peer_id         │      │ key             │    │
//! │  │ uuid (unique)   │    │ name            │      │ value           │    │
//! │  │ sender          │    │ added_at        │      └─────────────────┘    │
//! │  │ sender_id       │    └─────────────────┘                             │
//! │  │ content         │                             ┌─────────────────┐    │
//! │  │ channel         │                             │deleted_messages │    │
//! │  │ timestamp       │                             ├─────────────────┤    │
//! │  │ reply_to (json) │                             │ uuid            │    │
//! │  │ kind            │                             │ deleted_at      │    │
//! │  │ status          │                             └─────────────────┘    │
//! │  │ reactions (json)│                                                    │
//! │  │ last_edited     │                                                    │
//! │  │ file_name       │                                                    │
//! │  │ file_size       │                                                    │
//! │  └─────────────────┘                                                    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

/// Current schema version
pub const SCHEMA_VERSION: i32 = 2;

/// SQL to create all tables
pub const CREATE_TABLES: &str = r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY
);

-- Messages table
-- One row per displayable message, in every channel
CREATE TABLE IF NOT EXISTS messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    -- Sender-generated identity (NULL only for rows that predate uuids)
    uuid TEXT UNIQUE,
    -- Display label resolved on arrival
    sender TEXT NOT NULL,
    -- Peer id of the sender
    sender_id TEXT NOT NULL DEFAULT '',
    content TEXT NOT NULL,
    -- Local channel key ('global-gossip' or a peer id)
    channel TEXT NOT NULL,
    -- Unix millis
    timestamp INTEGER,
    -- Quoted message as JSON
    reply_to TEXT,
    -- 'text', 'image', 'file' or 'audio'
    kind TEXT NOT NULL DEFAULT 'text',
    -- 'sending', 'sent', 'delivered', 'read' or 'failed'
    status TEXT NOT NULL DEFAULT 'sent',
    -- Reaction map as JSON: emoji -> [peer id]
    reactions TEXT NOT NULL DEFAULT '{}',
    last_edited INTEGER,
    file_name TEXT,
    file_size TEXT
);
CREATE INDEX IF NOT EXISTS idx_messages_channel ON messages(channel, timestamp);

-- Uuids removed by a delete; a late duplicate of the post stays deleted
CREATE TABLE IF NOT EXISTS deleted_messages (
    uuid TEXT PRIMARY KEY,
    deleted_at INTEGER NOT NULL
);

-- Contacts table
CREATE TABLE IF NOT EXISTS contacts (
    peer_id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    added_at INTEGER NOT NULL
);

-- Settings table
-- Key-value store for preferences (display name, ...)
CREATE TABLE IF NOT EXISTS settings (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Migration from schema v1 to v2.
///
/// v1 stored only text messages with uuid, sender, content, channel,
/// timestamp and reply_to; v2 adds kinds, status, reactions, edits,
/// attachment metadata, sender ids and delete tombstones.
pub const MIGRATE_V1_TO_V2: &str = r#"
ALTER TABLE messages ADD COLUMN sender_id TEXT NOT NULL DEFAULT '';
ALTER TABLE messages ADD COLUMN kind TEXT NOT NULL DEFAULT 'text';
ALTER TABLE messages ADD COLUMN status TEXT NOT NULL DEFAULT 'sent';
ALTER TABLE messages ADD COLUMN reactions TEXT NOT NULL DEFAULT '{}';
ALTER TABLE messages ADD COLUMN last_edited INTEGER;
ALTER TABLE messages ADD COLUMN file_name TEXT;
ALTER TABLE messages ADD COLUMN file_size TEXT;

CREATE INDEX IF NOT EXISTS idx_messages_channel ON messages(channel, timestamp);

CREATE TABLE IF NOT EXISTS deleted_messages (
    uuid TEXT PRIMARY KEY,
    deleted_at INTEGER NOT NULL
);

UPDATE schema_version SET version = 2;
"#;

/// SQL to drop all tables (for testing/reset)
#[allow(dead_code)]
pub const DROP_TABLES: &str = r#"
DROP TABLE IF EXISTS settings;
DROP TABLE IF EXISTS contacts;
DROP TABLE IF EXISTS deleted_messages;
DROP TABLE IF EXISTS messages;
DROP TABLE IF EXISTS schema_version;
"#;

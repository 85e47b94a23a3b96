//! # Payload Codec
//!
//! Decodes opaque wire strings into typed [`Envelope`]s and back.
//!
//! ## Decoding Stages
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        STRICT-THEN-LENIENT DECODE                       │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  raw ──► JSON parse ──► object? ──► has "type"? ──► known type with    │
//! │            │               │            │            required fields?   │
//! │            │ fail          │ no         │ no               │            │
//! │            ▼               ▼            ▼                  │ yes        │
//! │        Unparsed(raw)   Unparsed(raw)  has "text"? ──► Post (legacy,     │
//! │                                         │ no           no uuid)         │
//! │                                         ▼                  ▼            │
//! │                                     Unparsed(raw)   Post/Edit/Delete/   │
//! │                                                     React               │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Decoding never fails. Anything the strict stage rejects is displayed as
//! plain text carrying the raw payload, and is not addressable by later
//! edits, deletes or reactions.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

// ============================================================================
// WIRE TYPES
// ============================================================================

/// Wire-level `type` tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeType {
    /// Plain text post
    Text,
    /// Edit of an earlier post
    Edit,
    /// Delete of an earlier post
    Delete,
    /// Reaction toggle on an earlier post
    Reaction,
    /// Image attachment post
    Image,
    /// File attachment post
    File,
    /// Voice message post
    Audio,
}

impl EnvelopeType {
    /// Wire name of the tag
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Edit => "edit",
            Self::Delete => "delete",
            Self::Reaction => "reaction",
            Self::Image => "image",
            Self::File => "file",
            Self::Audio => "audio",
        }
    }

    /// Parse a wire tag; unknown tags yield `None`
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(Self::Text),
            "edit" => Some(Self::Edit),
            "delete" => Some(Self::Delete),
            "reaction" => Some(Self::Reaction),
            "image" => Some(Self::Image),
            "file" => Some(Self::File),
            "audio" => Some(Self::Audio),
            _ => None,
        }
    }
}

/// Kind of a displayable message
///
/// Edit, delete and reaction are operations on messages, never message kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// Plain text
    #[default]
    Text,
    /// Image (content is a data URL)
    Image,
    /// Generic file (content is a data URL)
    File,
    /// Voice message (content is a data URL)
    Audio,
}

impl MessageKind {
    /// Storage / wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::File => "file",
            Self::Audio => "audio",
        }
    }

    /// Parse a stored kind
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(Self::Text),
            "image" => Some(Self::Image),
            "file" => Some(Self::File),
            "audio" => Some(Self::Audio),
            _ => None,
        }
    }

    fn from_envelope_type(ty: EnvelopeType) -> Option<Self> {
        match ty {
            EnvelopeType::Text => Some(Self::Text),
            EnvelopeType::Image => Some(Self::Image),
            EnvelopeType::File => Some(Self::File),
            EnvelopeType::Audio => Some(Self::Audio),
            EnvelopeType::Edit | EnvelopeType::Delete | EnvelopeType::Reaction => None,
        }
    }

    fn envelope_type(&self) -> EnvelopeType {
        match self {
            Self::Text => EnvelopeType::Text,
            Self::Image => EnvelopeType::Image,
            Self::File => EnvelopeType::File,
            Self::Audio => EnvelopeType::Audio,
        }
    }
}

/// Quoted message embedded by value in a reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyReference {
    /// Display name of the quoted sender
    pub sender: String,
    /// Quoted content
    pub content: String,
    /// Uuid of the quoted message, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
}

/// The JSON object as it appears on the wire.
///
/// Every field is optional here; required-field checks happen when the
/// object is lifted into an [`Envelope`].
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    uuid: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reply_to: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    target_uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    file_size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timestamp: Option<serde_json::Number>,
}

// ============================================================================
// ENVELOPE
// ============================================================================

/// A displayable post (text or attachment)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    /// Sender-generated identity; `None` for legacy payloads
    pub uuid: Option<String>,
    /// Message kind
    pub kind: MessageKind,
    /// Text, or a data URL for attachments
    pub content: String,
    /// Quoted message
    pub reply_to: Option<ReplyReference>,
    /// Attachment file name
    pub file_name: Option<String>,
    /// Human-readable attachment size
    pub file_size: Option<String>,
    /// Sender clock, Unix millis
    pub timestamp: Option<i64>,
}

impl Post {
    /// A text post with a fresh uuid stamped now
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            uuid: Some(uuid::Uuid::new_v4().to_string()),
            kind: MessageKind::Text,
            content: content.into(),
            reply_to: None,
            file_name: None,
            file_size: None,
            timestamp: Some(crate::time::now_timestamp_millis()),
        }
    }
}

/// A decoded wire operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope {
    /// New message
    Post(Post),
    /// Replace the content of `target_uuid`
    Edit {
        /// Operation id
        uuid: Option<String>,
        /// Message being edited
        target_uuid: String,
        /// New content
        content: String,
        /// Sender clock, Unix millis
        timestamp: Option<i64>,
    },
    /// Remove `target_uuid`
    Delete {
        /// Operation id
        uuid: Option<String>,
        /// Message being deleted
        target_uuid: String,
        /// Sender clock, Unix millis
        timestamp: Option<i64>,
    },
    /// Toggle the sender's `emoji` reaction on `target_uuid`
    React {
        /// Operation id
        uuid: Option<String>,
        /// Message being reacted to
        target_uuid: String,
        /// Reaction emoji
        emoji: String,
        /// Sender clock, Unix millis
        timestamp: Option<i64>,
    },
    /// Payload the strict stage rejected, shown verbatim as text
    Unparsed {
        /// The original wire string
        raw: String,
    },
}

impl Envelope {
    /// Decode a wire payload. Never fails.
    pub fn decode(raw: &str) -> Self {
        match Self::decode_strict(raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::debug!("Payload degraded to plain text: {}", e);
                Envelope::Unparsed { raw: raw.to_string() }
            }
        }
    }

    /// Strict stage: the payload must be a recognised envelope object.
    fn decode_strict(raw: &str) -> Result<Self> {
        let value: Value =
            serde_json::from_str(raw).map_err(|e| Error::DecodeError(e.to_string()))?;
        if !value.is_object() {
            return Err(Error::DecodeError("payload is not a JSON object".into()));
        }
        let wire: WireEnvelope =
            serde_json::from_value(value).map_err(|e| Error::DecodeError(e.to_string()))?;

        let reply_to = wire
            .reply_to
            .and_then(|v| serde_json::from_value::<ReplyReference>(v).ok());
        let timestamp = wire
            .timestamp
            .as_ref()
            .and_then(|n| n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)));

        let Some(tag) = wire.kind else {
            // Legacy shape: `{ text, replyTo? }` with no type and no uuid.
            let content = wire
                .text
                .ok_or_else(|| Error::InvalidEnvelope("neither `type` nor `text`".into()))?;
            return Ok(Envelope::Post(Post {
                uuid: None,
                kind: MessageKind::Text,
                content,
                reply_to,
                file_name: None,
                file_size: None,
                timestamp,
            }));
        };

        let ty = EnvelopeType::parse(&tag)
            .ok_or_else(|| Error::InvalidEnvelope(format!("unknown type `{}`", tag)))?;
        let content = wire.content.or(wire.text);
        let target = || {
            wire.target_uuid
                .clone()
                .ok_or_else(|| Error::InvalidEnvelope(format!("`{}` without targetUuid", tag)))
        };
        let required = |field: Option<String>| {
            field.ok_or_else(|| Error::InvalidEnvelope(format!("`{}` without content", tag)))
        };

        let envelope = match ty {
            EnvelopeType::Edit => Envelope::Edit {
                uuid: wire.uuid,
                target_uuid: target()?,
                content: required(content)?,
                timestamp,
            },
            EnvelopeType::Delete => Envelope::Delete {
                uuid: wire.uuid,
                target_uuid: target()?,
                timestamp,
            },
            EnvelopeType::Reaction => Envelope::React {
                uuid: wire.uuid,
                target_uuid: target()?,
                emoji: required(content)?,
                timestamp,
            },
            EnvelopeType::Text | EnvelopeType::Image | EnvelopeType::File | EnvelopeType::Audio => {
                let kind = MessageKind::from_envelope_type(ty).unwrap_or_default();
                Envelope::Post(Post {
                    uuid: wire.uuid,
                    kind,
                    content: required(content)?,
                    reply_to,
                    file_name: wire.file_name,
                    file_size: wire.file_size,
                    timestamp,
                })
            }
        };

        Ok(envelope)
    }

    /// Encode for the wire.
    ///
    /// Text posts use the `text` field, everything else uses `content`.
    /// An [`Envelope::Unparsed`] encodes back to its raw string.
    pub fn encode(&self) -> Result<String> {
        let wire = match self {
            Envelope::Post(post) => {
                let (content, text) = match post.kind {
                    MessageKind::Text => (None, Some(post.content.clone())),
                    _ => (Some(post.content.clone()), None),
                };
                WireEnvelope {
                    uuid: post.uuid.clone(),
                    kind: Some(post.kind.envelope_type().as_str().to_string()),
                    content,
                    text,
                    reply_to: post
                        .reply_to
                        .as_ref()
                        .map(serde_json::to_value)
                        .transpose()?,
                    file_name: post.file_name.clone(),
                    file_size: post.file_size.clone(),
                    timestamp: post.timestamp.map(Into::into),
                    ..Default::default()
                }
            }
            Envelope::Edit { uuid, target_uuid, content, timestamp } => WireEnvelope {
                uuid: uuid.clone(),
                kind: Some(EnvelopeType::Edit.as_str().to_string()),
                content: Some(content.clone()),
                target_uuid: Some(target_uuid.clone()),
                timestamp: timestamp.map(Into::into),
                ..Default::default()
            },
            Envelope::Delete { uuid, target_uuid, timestamp } => WireEnvelope {
                uuid: uuid.clone(),
                kind: Some(EnvelopeType::Delete.as_str().to_string()),
                target_uuid: Some(target_uuid.clone()),
                timestamp: timestamp.map(Into::into),
                ..Default::default()
            },
            Envelope::React { uuid, target_uuid, emoji, timestamp } => WireEnvelope {
                uuid: uuid.clone(),
                kind: Some(EnvelopeType::Reaction.as_str().to_string()),
                content: Some(emoji.clone()),
                target_uuid: Some(target_uuid.clone()),
                timestamp: timestamp.map(Into::into),
                ..Default::default()
            },
            Envelope::Unparsed { raw } => return Ok(raw.clone()),
        };

        Ok(serde_json::to_string(&wire)?)
    }

    /// Operation id, if the envelope carries one
    pub fn uuid(&self) -> Option<&str> {
        match self {
            Envelope::Post(post) => post.uuid.as_deref(),
            Envelope::Edit { uuid, .. }
            | Envelope::Delete { uuid, .. }
            | Envelope::React { uuid, .. } => uuid.as_deref(),
            Envelope::Unparsed { .. } => None,
        }
    }

    /// Message an Edit/Delete/React operates on
    pub fn target_uuid(&self) -> Option<&str> {
        match self {
            Envelope::Edit { target_uuid, .. }
            | Envelope::Delete { target_uuid, .. }
            | Envelope::React { target_uuid, .. } => Some(target_uuid),
            Envelope::Post(_) | Envelope::Unparsed { .. } => None,
        }
    }

    /// Sender clock, if present
    pub fn timestamp(&self) -> Option<i64> {
        match self {
            Envelope::Post(post) => post.timestamp,
            Envelope::Edit { timestamp, .. }
            | Envelope::Delete { timestamp, .. }
            | Envelope::React { timestamp, .. } => *timestamp,
            Envelope::Unparsed { .. } => None,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

//! # Protocol Module
//!
//! Wire format of the chat protocol: the JSON envelope codec and the
//! channel namespace mapping.
//!
//! ## Wire Envelope
//!
//! ```text
//! {
//!   "uuid":       "…",                      sender-generated identity
//!   "type":       "text" | "edit" | "delete" | "reaction"
//!                 | "image" | "file" | "audio",
//!   "content":    "…",                      current protocol
//!   "text":       "…",                      legacy alias for content
//!   "replyTo":    { "sender", "content", "uuid"? },
//!   "targetUuid": "…",                      edit / delete / reaction
//!   "fileName":   "…",
//!   "fileSize":   "…",
//!   "timestamp":  1700000000000             sender clock, millis
//! }
//! ```

mod channel;
mod envelope;

pub use channel::{
    ChannelMap, ENCRYPTED_CHANNEL, PUBLIC_LOCAL_CHANNEL, PUBLIC_WIRE_CHANNEL,
};
pub use envelope::{Envelope, EnvelopeType, MessageKind, Post, ReplyReference};

//! Attachment framing.
//!
//! Attachments travel inline as data URLs in the envelope `content`, with a
//! human-readable size next to them.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

use crate::error::{Error, Result};
use crate::protocol::MessageKind;

/// An attachment ready to be posted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// Image, file or audio
    pub kind: MessageKind,
    /// `data:<mime>;base64,<payload>`
    pub content: String,
    /// Original file name (absent for voice messages)
    pub file_name: Option<String>,
    /// Human-readable size, e.g. `"12.5 KB"`
    pub file_size: Option<String>,
}

impl Attachment {
    /// Frame a picked file.
    ///
    /// Images are recognised by an `image/` mime type; everything else is a
    /// generic file.
    pub fn file(name: &str, mime: &str, bytes: &[u8], max_bytes: usize) -> Result<Self> {
        check_size(bytes.len(), max_bytes)?;
        let kind = if mime.starts_with("image/") {
            MessageKind::Image
        } else {
            MessageKind::File
        };
        Ok(Self {
            kind,
            content: data_url(mime, bytes),
            file_name: Some(name.to_string()),
            file_size: Some(format_file_size(bytes.len())),
        })
    }

    /// Frame a recorded voice message
    pub fn audio(mime: &str, bytes: &[u8], max_bytes: usize) -> Result<Self> {
        check_size(bytes.len(), max_bytes)?;
        if bytes.is_empty() {
            return Err(Error::InvalidMessageContent("empty recording".into()));
        }
        Ok(Self {
            kind: MessageKind::Audio,
            content: data_url(mime, bytes),
            file_name: None,
            file_size: Some(format_file_size(bytes.len())),
        })
    }
}

fn check_size(size: usize, max: usize) -> Result<()> {
    if size > max {
        return Err(Error::AttachmentTooLarge { size, max });
    }
    Ok(())
}

fn data_url(mime: &str, bytes: &[u8]) -> String {
    let mime = if mime.is_empty() { "application/octet-stream" } else { mime };
    format!("data:{};base64,{}", mime, BASE64.encode(bytes))
}

/// Size in kilobytes with one decimal, e.g. `"1.5 KB"`
pub fn format_file_size(bytes: usize) -> String {
    format!("{:.1} KB", bytes as f64 / 1024.0)
}

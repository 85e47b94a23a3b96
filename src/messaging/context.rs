//! Collaborators shared by the dispatcher and the outbox.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use super::KeyedLocks;
use crate::contacts::ContactBook;
use crate::discovery::PeerDirectory;
use crate::engine::ChatEvent;
use crate::error::{Error, Result};
use crate::network::Transport;
use crate::protocol::ChannelMap;
use crate::storage::MessageStore;
use crate::view::ViewProjector;

/// Notice shown while the transport is still establishing a session
pub const HANDSHAKE_PENDING_NOTICE: &str =
    "⏳ Установка защищенного соединения... Повторите отправку после подтверждения.";

/// Prefix of the notice shown when a send is rejected
const SEND_FAILED_PREFIX: &str = "⚠️ Не удалось отправить";

/// Inline notice text for a rejected send
pub fn send_failure_notice(error: &Error) -> String {
    match error {
        Error::HandshakePending(_) => HANDSHAKE_PENDING_NOTICE.to_string(),
        other => format!("{}: {}", SEND_FAILED_PREFIX, other),
    }
}

/// Run a fallible store or transport call with a deadline
pub async fn with_timeout<T, F>(limit: Duration, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(elapsed) => Err(elapsed.into()),
    }
}

/// Handles to everything a message operation touches
///
/// Cloning is cheap; every field is shared.
#[derive(Clone)]
pub struct MessagingContext {
    /// Durable store
    pub store: Arc<dyn MessageStore>,
    /// Outbound transport
    pub transport: Arc<dyn Transport>,
    /// Projection of the active channel
    pub view: Arc<ViewProjector>,
    /// Address book, for sender labels
    pub contacts: Arc<ContactBook>,
    /// Our peer id and the peers we know
    pub peers: Arc<PeerDirectory>,
    /// Wire/local channel names
    pub channels: Arc<ChannelMap>,
    /// Serializes mutations per message uuid
    pub locks: Arc<KeyedLocks>,
    /// UI event sink
    pub events: broadcast::Sender<ChatEvent>,
}

impl MessagingContext {
    /// Identity used as sender id and reactor for local actions.
    ///
    /// Falls back to the local label until the transport assigns a peer id.
    pub fn local_sender_id(&self) -> String {
        self.peers
            .local_peer_id()
            .unwrap_or_else(|| self.contacts.local_label().to_string())
    }

    /// Broadcast an event; having no subscribers is fine
    pub fn emit(&self, event: ChatEvent) {
        let _ = self.events.send(event);
    }

    /// Emit `ViewUpdated` if `changed`
    pub fn view_changed(&self, changed: bool, channel: &str) {
        if changed {
            self.emit(ChatEvent::ViewUpdated {
                channel: channel.to_string(),
            });
        }
    }

    /// Show an inline notice in `channel` (only visible if it is active)
    pub fn system_notice(&self, channel: &str, text: &str) {
        let shown = self.view.push_system_notice(channel, text);
        self.emit(ChatEvent::SystemNotice {
            channel: channel.to_string(),
            text: text.to_string(),
        });
        self.view_changed(shown, channel);
    }
}

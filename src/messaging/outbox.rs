//! Optimistic local sends: `Sending → Sent | Failed → (retry) Sending`.
//!
//! A send is visible before any I/O. The delivery task then takes the
//! message's uuid lock; if the message was deleted in the meantime it stops
//! there. Otherwise the store write and the transport send run concurrently,
//! each under its own deadline, and the message is confirmed only if both
//! succeed.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use super::context::{send_failure_notice, with_timeout};
use super::{MessageStatus, MessagingContext, StoredMessage};
use crate::engine::ChatEvent;
use crate::error::{Error, Result};
use crate::protocol::{Envelope, Post};
use crate::time::now_timestamp_millis;

/// Final state of one delivery attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Stored and sent
    Confirmed,
    /// The store write or the send failed
    Failed(Error),
    /// Deleted before delivery started; nothing was stored or sent
    Cancelled,
}

/// A local send not yet confirmed
#[derive(Debug, Clone)]
pub struct PendingSend {
    /// The row as shown and persisted
    pub message: StoredMessage,
    /// Delivery attempts so far
    pub attempts: u32,
    payload: String,
}

/// Handle to an in-flight delivery
pub struct DeliveryHandle {
    /// Uuid of the message being delivered
    pub uuid: String,
    task: JoinHandle<DeliveryOutcome>,
}

impl DeliveryHandle {
    /// Wait for the attempt to finish
    pub async fn outcome(self) -> DeliveryOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => DeliveryOutcome::Failed(Error::Internal(format!("delivery task: {}", e))),
        }
    }
}

type PendingMap = Arc<Mutex<HashMap<String, PendingSend>>>;

/// Tracks local sends until they are confirmed
pub struct Outbox {
    ctx: MessagingContext,
    store_timeout: Duration,
    send_timeout: Duration,
    pending: PendingMap,
}

impl Outbox {
    /// Create an empty outbox
    pub fn new(ctx: MessagingContext, store_timeout: Duration, send_timeout: Duration) -> Self {
        Self {
            ctx,
            store_timeout,
            send_timeout,
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Show `post` in `channel` immediately and start delivering it.
    ///
    /// A post without a uuid is given one. Fails only if the post cannot be
    /// encoded, in which case nothing is shown.
    pub fn submit(&self, mut post: Post, channel: &str) -> Result<DeliveryHandle> {
        let uuid = post
            .uuid
            .get_or_insert_with(|| uuid::Uuid::new_v4().to_string())
            .clone();
        let timestamp = *post.timestamp.get_or_insert_with(now_timestamp_millis);
        let payload = Envelope::Post(post.clone()).encode()?;

        let message = StoredMessage::from_post(
            post,
            channel,
            self.ctx.contacts.local_label(),
            self.ctx.local_sender_id(),
            MessageStatus::Sending,
            timestamp,
        );

        let shown = self.ctx.view.append(&message);
        self.ctx.view_changed(shown, channel);

        let entry = PendingSend {
            message,
            attempts: 1,
            payload,
        };
        self.pending.lock().insert(uuid.clone(), entry.clone());

        tracing::debug!("Submitted {} to {}", uuid, channel);
        Ok(self.spawn_delivery(entry))
    }

    /// Deliver a failed message again under the same uuid.
    ///
    /// Messages that failed before a restart are recovered from the store.
    pub async fn retry(&self, uuid: &str) -> Result<DeliveryHandle> {
        let known = {
            let mut pending = self.pending.lock();
            match pending.get_mut(uuid) {
                Some(entry) if entry.message.status == MessageStatus::Failed => {
                    entry.message.status = MessageStatus::Sending;
                    entry.attempts += 1;
                    Some(entry.clone())
                }
                Some(_) => {
                    return Err(Error::DeliveryFailed(format!("{} is already being delivered", uuid)));
                }
                None => None,
            }
        };

        let entry = match known {
            Some(entry) => entry,
            None => self.recover(uuid).await?,
        };

        tracing::info!("Retrying {} (attempt {})", uuid, entry.attempts);
        let shown = self.ctx.view.set_status(uuid, MessageStatus::Sending);
        self.ctx.view_changed(shown, &entry.message.channel);
        self.ctx.emit(ChatEvent::MessageStatusChanged {
            uuid: uuid.to_string(),
            status: MessageStatus::Sending,
        });

        Ok(self.spawn_delivery(entry))
    }

    async fn recover(&self, uuid: &str) -> Result<PendingSend> {
        let message = self
            .ctx
            .store
            .get_message(uuid)
            .await?
            .filter(|m| m.status == MessageStatus::Failed && self.ctx.peers.is_local(&m.sender_id))
            .ok_or_else(|| Error::MessageNotFound(uuid.to_string()))?;

        let payload = Envelope::Post(message.to_post()).encode()?;
        let entry = PendingSend {
            message: StoredMessage {
                status: MessageStatus::Sending,
                ..message
            },
            attempts: 2,
            payload,
        };
        self.pending.lock().insert(uuid.to_string(), entry.clone());
        Ok(entry)
    }

    /// Stop tracking a message (it was deleted)
    pub fn forget(&self, uuid: &str) -> bool {
        self.pending.lock().remove(uuid).is_some()
    }

    /// Unconfirmed messages in `channel`, oldest first
    pub fn pending_for(&self, channel: &str) -> Vec<StoredMessage> {
        let mut messages: Vec<StoredMessage> = self
            .pending
            .lock()
            .values()
            .filter(|entry| entry.message.channel == channel)
            .map(|entry| entry.message.clone())
            .collect();
        messages.sort_by_key(|m| m.timestamp);
        messages
    }

    /// Whether `uuid` is unconfirmed
    pub fn is_pending(&self, uuid: &str) -> bool {
        self.pending.lock().contains_key(uuid)
    }

    fn spawn_delivery(&self, entry: PendingSend) -> DeliveryHandle {
        let uuid = entry.message.uuid.clone().unwrap_or_default();
        let delivery = Delivery {
            ctx: self.ctx.clone(),
            pending: Arc::clone(&self.pending),
            store_timeout: self.store_timeout,
            send_timeout: self.send_timeout,
        };
        DeliveryHandle {
            uuid,
            task: tokio::spawn(delivery.run(entry)),
        }
    }
}

/// Everything one delivery task owns
struct Delivery {
    ctx: MessagingContext,
    pending: PendingMap,
    store_timeout: Duration,
    send_timeout: Duration,
}

impl Delivery {
    async fn run(self, entry: PendingSend) -> DeliveryOutcome {
        let message = entry.message;
        let uuid = message.uuid.clone().unwrap_or_default();
        let channel = message.channel.clone();
        let wire = self.ctx.channels.to_wire(&channel);

        let guard = self.ctx.locks.lock(&uuid).await;
        if !self.pending.lock().contains_key(&uuid) {
            tracing::debug!("{} was deleted before delivery", uuid);
            return DeliveryOutcome::Cancelled;
        }

        let store_write = with_timeout(self.store_timeout, self.ctx.store.upsert_message(&message));
        let send = with_timeout(self.send_timeout, self.ctx.transport.send(&wire, &entry.payload));
        let (stored, sent) = tokio::join!(store_write, send);

        let (status, outcome) = match (&stored, &sent) {
            (Ok(_), Ok(())) => (MessageStatus::Sent, DeliveryOutcome::Confirmed),
            (_, Err(e)) | (Err(e), _) => (MessageStatus::Failed, DeliveryOutcome::Failed(e.clone())),
        };

        let tracked = {
            let mut pending = self.pending.lock();
            match status {
                MessageStatus::Sent => pending.remove(&uuid).is_some(),
                _ => match pending.get_mut(&uuid) {
                    Some(entry) => {
                        entry.message.status = MessageStatus::Failed;
                        true
                    }
                    None => false,
                },
            }
        };
        if !tracked {
            tracing::debug!("{} was deleted while in flight", uuid);
            return outcome;
        }

        let update = self.ctx.store.update_message_status(&uuid, status);
        if let Err(e) = with_timeout(self.store_timeout, update).await {
            tracing::warn!("Failed to record status of {}: {}", uuid, e);
        }
        drop(guard);

        let shown = self.ctx.view.set_status(&uuid, status);
        self.ctx.view_changed(shown, &channel);
        self.ctx.emit(ChatEvent::MessageStatusChanged {
            uuid: uuid.clone(),
            status,
        });

        if let DeliveryOutcome::Failed(e) = &outcome {
            if let Err(store_error) = &stored {
                tracing::error!("Failed to persist local message {}: {}", uuid, store_error);
            }
            if let Err(send_error) = &sent {
                tracing::warn!("Failed to send {} on {}: {}", uuid, wire, send_error);
                self.ctx.system_notice(&channel, &send_failure_notice(send_error));
            }
            self.ctx.emit(ChatEvent::DeliveryFailed {
                uuid: uuid.clone(),
                channel: channel.clone(),
                error: e.to_string(),
                retryable: e.is_recoverable(),
            });
        }

        outcome
    }
}

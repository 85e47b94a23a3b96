//! Operation dispatch for inbound envelopes and local edit/delete/react.
//!
//! Every operation on a message holds that message's uuid lock for its whole
//! read-modify-write, so the store and the view always receive the same
//! result. Operations on different uuids never wait on each other.
//!
//! Every store call runs under the configured store deadline, so a stalled
//! store fails one operation instead of holding up the event loop.

use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use parking_lot::Mutex;

use super::{MessageStatus, MessagingContext, Reactions, StoredMessage};
use crate::engine::ChatEvent;
use crate::error::{Error, Result};
use crate::protocol::{Envelope, MessageKind, Post};
use crate::time::now_timestamp_millis;

use super::context::{send_failure_notice, with_timeout};

/// How many locally sent operation ids are remembered for echo suppression
const SENT_OPS_CAPACITY: usize = 512;

/// Why an operation changed nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// The post's uuid is already stored, or was deleted
    Duplicate,
    /// The target uuid is not in the store
    UnknownTarget,
    /// An edit older than the last applied one
    Stale,
    /// Our own operation reflected back by the transport
    Echo,
}

/// Result of applying one operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A new message was stored
    Posted {
        /// The message
        uuid: String,
        /// Its local channel
        channel: String,
    },
    /// A message's content was replaced
    Edited {
        /// The message
        uuid: String,
        /// Its local channel
        channel: String,
    },
    /// A message was removed
    Deleted {
        /// The message
        uuid: String,
        /// Its local channel
        channel: String,
    },
    /// A message's reactions were toggled
    Reacted {
        /// The message
        uuid: String,
        /// Its local channel
        channel: String,
        /// Reactions after the toggle
        reactions: Reactions,
    },
    /// Nothing changed
    Ignored(IgnoreReason),
    /// The store rejected the operation; nothing was applied to the view
    Failed(Error),
}

impl DispatchOutcome {
    /// Whether the operation took effect
    pub fn is_applied(&self) -> bool {
        !matches!(self, Self::Ignored(_) | Self::Failed(_))
    }
}

/// Bounded FIFO of operation ids we published
#[derive(Default)]
struct SentOps {
    order: VecDeque<String>,
    ids: HashSet<String>,
}

impl SentOps {
    fn remember(&mut self, id: &str) {
        if !self.ids.insert(id.to_string()) {
            return;
        }
        self.order.push_back(id.to_string());
        if self.order.len() > SENT_OPS_CAPACITY {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
    }

    fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }
}

/// Routes envelopes to the Post / Edit / Delete / React handlers
pub struct Dispatcher {
    ctx: MessagingContext,
    store_timeout: Duration,
    send_timeout: Duration,
    sent_ops: Mutex<SentOps>,
}

impl Dispatcher {
    /// Create a dispatcher
    pub fn new(ctx: MessagingContext, store_timeout: Duration, send_timeout: Duration) -> Self {
        Self {
            ctx,
            store_timeout,
            send_timeout,
            sent_ops: Mutex::new(SentOps::default()),
        }
    }

    // ========================================================================
    // INBOUND
    // ========================================================================

    /// Apply a payload received from `sender_id` on `wire_channel`.
    ///
    /// Never fails: store errors are logged and reported as
    /// [`DispatchOutcome::Failed`].
    pub async fn handle_inbound(
        &self,
        wire_channel: &str,
        sender_id: &str,
        payload: &str,
    ) -> DispatchOutcome {
        let channel = self.ctx.channels.to_local(wire_channel);
        let envelope = Envelope::decode(payload);

        let is_echo = !matches!(envelope, Envelope::Post(_))
            && envelope
                .uuid()
                .is_some_and(|id| self.sent_ops.lock().contains(id));
        if is_echo {
            tracing::debug!("Ignoring echo of our own operation on {}", channel);
            return DispatchOutcome::Ignored(IgnoreReason::Echo);
        }

        let result = match envelope {
            Envelope::Post(post) => self.receive_post(post, &channel, sender_id).await,
            Envelope::Unparsed { raw } => {
                let post = Post {
                    uuid: None,
                    kind: MessageKind::Text,
                    content: raw,
                    reply_to: None,
                    file_name: None,
                    file_size: None,
                    timestamp: None,
                };
                self.receive_post(post, &channel, sender_id).await
            }
            Envelope::Edit {
                target_uuid,
                content,
                timestamp,
                ..
            } => {
                let edited_at = timestamp.unwrap_or_else(now_timestamp_millis);
                self.apply_edit(&target_uuid, &content, edited_at).await
            }
            Envelope::Delete { target_uuid, .. } => self.apply_delete(&target_uuid).await,
            Envelope::React {
                target_uuid, emoji, ..
            } => self.apply_react(&target_uuid, &emoji, sender_id).await,
        };

        match result {
            Ok(DispatchOutcome::Ignored(reason)) => {
                tracing::debug!("Inbound operation on {} ignored: {:?}", channel, reason);
                DispatchOutcome::Ignored(reason)
            }
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!("Inbound operation on {} failed: {}", channel, e);
                DispatchOutcome::Failed(e)
            }
        }
    }

    async fn receive_post(
        &self,
        post: Post,
        channel: &str,
        sender_id: &str,
    ) -> Result<DispatchOutcome> {
        // Payloads without a uuid stay unique locally; peers cannot address them
        let uuid = post
            .uuid
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let _guard = self.ctx.locks.lock(&uuid).await;

        let local_peer = self.ctx.peers.local_peer_id();
        let sender = self.ctx.contacts.sender_label(sender_id, local_peer.as_deref());
        let mut message = StoredMessage::from_post(
            post,
            channel,
            sender.clone(),
            sender_id,
            MessageStatus::Delivered,
            now_timestamp_millis(),
        );
        message.uuid = Some(uuid.clone());

        match with_timeout(self.store_timeout, self.ctx.store.upsert_message(&message)).await {
            Ok(true) => {}
            Ok(false) => return Ok(DispatchOutcome::Ignored(IgnoreReason::Duplicate)),
            Err(e) => tracing::error!("Failed to persist message {}: {}", uuid, e),
        }

        let shown = self.ctx.view.append(&message);
        self.ctx.view_changed(shown, channel);

        if !self.ctx.peers.is_local(sender_id) {
            self.ctx.emit(ChatEvent::Notification {
                channel: channel.to_string(),
                sender,
            });
        }

        Ok(DispatchOutcome::Posted {
            uuid,
            channel: channel.to_string(),
        })
    }

    /// Last-writer-wins by edit time; ties go to the later arrival
    async fn apply_edit(&self, target: &str, content: &str, edited_at: i64) -> Result<DispatchOutcome> {
        let _guard = self.ctx.locks.lock(target).await;

        let Some(row) = self.stored(target).await? else {
            return Ok(DispatchOutcome::Ignored(IgnoreReason::UnknownTarget));
        };
        if row.last_edited.is_some_and(|last| edited_at < last) {
            return Ok(DispatchOutcome::Ignored(IgnoreReason::Stale));
        }
        let update = self.ctx.store.update_message_content(target, content, edited_at);
        if !with_timeout(self.store_timeout, update).await? {
            return Ok(DispatchOutcome::Ignored(IgnoreReason::UnknownTarget));
        }

        let shown = self.ctx.view.apply_edit(target, content);
        self.ctx.view_changed(shown, &row.channel);
        Ok(DispatchOutcome::Edited {
            uuid: target.to_string(),
            channel: row.channel,
        })
    }

    async fn apply_delete(&self, target: &str) -> Result<DispatchOutcome> {
        let _guard = self.ctx.locks.lock(target).await;

        let Some(row) = self.stored(target).await? else {
            return Ok(DispatchOutcome::Ignored(IgnoreReason::UnknownTarget));
        };
        if !with_timeout(self.store_timeout, self.ctx.store.delete_message(target)).await? {
            return Ok(DispatchOutcome::Ignored(IgnoreReason::UnknownTarget));
        }

        let shown = self.ctx.view.remove(target);
        self.ctx.view_changed(shown, &row.channel);
        Ok(DispatchOutcome::Deleted {
            uuid: target.to_string(),
            channel: row.channel,
        })
    }

    async fn apply_react(&self, target: &str, emoji: &str, reactor: &str) -> Result<DispatchOutcome> {
        let _guard = self.ctx.locks.lock(target).await;

        let Some(row) = self.stored(target).await? else {
            return Ok(DispatchOutcome::Ignored(IgnoreReason::UnknownTarget));
        };
        let mut reactions = row.reactions;
        reactions.toggle(emoji, reactor);
        let update = self.ctx.store.update_message_reactions(target, &reactions);
        if !with_timeout(self.store_timeout, update).await? {
            return Ok(DispatchOutcome::Ignored(IgnoreReason::UnknownTarget));
        }

        let shown = self.ctx.view.set_reactions(target, &reactions);
        self.ctx.view_changed(shown, &row.channel);
        Ok(DispatchOutcome::Reacted {
            uuid: target.to_string(),
            channel: row.channel,
            reactions,
        })
    }

    async fn stored(&self, uuid: &str) -> Result<Option<StoredMessage>> {
        with_timeout(self.store_timeout, self.ctx.store.get_message(uuid)).await
    }

    // ========================================================================
    // LOCAL OPERATIONS
    // ========================================================================

    /// Edit one of our messages and broadcast the edit
    pub async fn edit(&self, uuid: &str, content: &str) -> Result<DispatchOutcome> {
        let content = content.trim();
        if content.is_empty() {
            return Err(Error::InvalidMessageContent("edit would leave the message empty".into()));
        }

        let edited_at = now_timestamp_millis();
        let outcome = self.apply_edit(uuid, content, edited_at).await?;
        self.check_not_sending(uuid, &outcome)?;
        if let DispatchOutcome::Edited { channel, .. } = &outcome {
            let envelope = Envelope::Edit {
                uuid: Some(new_op_id()),
                target_uuid: uuid.to_string(),
                content: content.to_string(),
                timestamp: Some(edited_at),
            };
            self.publish(channel, &envelope).await?;
        }
        Ok(outcome)
    }

    /// Drop a local send that never reached the store.
    ///
    /// The uuid is tombstoned, so a delivery attempt that is still writing
    /// cannot bring the row back.
    pub async fn discard_unsent(&self, uuid: &str) -> Result<()> {
        let _guard = self.ctx.locks.lock(uuid).await;

        if let Some(channel) = self.ctx.view.active_channel() {
            let shown = self.ctx.view.remove(uuid);
            self.ctx.view_changed(shown, &channel);
        }
        with_timeout(self.store_timeout, self.ctx.store.delete_message(uuid)).await?;
        tracing::debug!("Discarded unsent message {}", uuid);
        Ok(())
    }

    /// Delete a message and broadcast the deletion
    pub async fn delete(&self, uuid: &str) -> Result<DispatchOutcome> {
        let outcome = self.apply_delete(uuid).await?;
        if let DispatchOutcome::Deleted { channel, .. } = &outcome {
            let envelope = Envelope::Delete {
                uuid: Some(new_op_id()),
                target_uuid: uuid.to_string(),
                timestamp: Some(now_timestamp_millis()),
            };
            self.publish(channel, &envelope).await?;
        }
        Ok(outcome)
    }

    /// Toggle our reaction and broadcast the toggle
    pub async fn react(&self, uuid: &str, emoji: &str) -> Result<DispatchOutcome> {
        if emoji.is_empty() {
            return Err(Error::InvalidMessageContent("empty reaction".into()));
        }

        let reactor = self.ctx.local_sender_id();
        let outcome = self.apply_react(uuid, emoji, &reactor).await?;
        self.check_not_sending(uuid, &outcome)?;
        if let DispatchOutcome::Reacted { channel, .. } = &outcome {
            let envelope = Envelope::React {
                uuid: Some(new_op_id()),
                target_uuid: uuid.to_string(),
                emoji: emoji.to_string(),
                timestamp: Some(now_timestamp_millis()),
            };
            self.publish(channel, &envelope).await?;
        }
        Ok(outcome)
    }

    /// Reject a target that is in the view but not the store: one of our
    /// sends whose delivery has not written it yet.
    fn check_not_sending(&self, uuid: &str, outcome: &DispatchOutcome) -> Result<()> {
        let sending = *outcome == DispatchOutcome::Ignored(IgnoreReason::UnknownTarget)
            && self
                .ctx
                .view
                .get(uuid)
                .is_some_and(|m| m.status == MessageStatus::Sending);
        if sending {
            return Err(Error::MessageNotFound(format!("{} is still being sent", uuid)));
        }
        Ok(())
    }

    /// Send an operation on `channel`'s wire name.
    ///
    /// The local effect is already applied; a rejected send only adds a
    /// notice to the channel.
    async fn publish(&self, channel: &str, envelope: &Envelope) -> Result<()> {
        let payload = envelope.encode()?;
        if let Some(id) = envelope.uuid() {
            self.sent_ops.lock().remember(id);
        }

        let wire = self.ctx.channels.to_wire(channel);
        let result = with_timeout(self.send_timeout, self.ctx.transport.send(&wire, &payload)).await;

        if let Err(e) = &result {
            tracing::warn!("Failed to broadcast operation on {}: {}", channel, e);
            self.ctx.system_notice(channel, &send_failure_notice(e));
        }
        result
    }
}

fn new_op_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::PUBLIC_LOCAL_CHANNEL;
    use crate::storage::MessageStore;
    use crate::testing::{Harness, LOCAL_PEER};

    const PEER: &str = "12D3KooWRemotePeerAbc";

    fn dispatcher(h: &Harness) -> Dispatcher {
        Dispatcher::new(h.ctx.clone(), Duration::from_secs(5), Duration::from_secs(10))
    }

    async fn seed(h: &Harness, d: &Dispatcher) {
        h.ctx.view.select_channel(PUBLIC_LOCAL_CHANNEL, &[]).await.unwrap();
        let outcome = d
            .handle_inbound(
                "phantom-global",
                PEER,
                r#"{"uuid":"m1","type":"text","text":"hi","timestamp":1000}"#,
            )
            .await;
        assert!(outcome.is_applied());
    }

    async fn stored(h: &Harness) -> Vec<StoredMessage> {
        h.store.get_messages(PUBLIC_LOCAL_CHANNEL).await.unwrap()
    }

    #[tokio::test]
    async fn test_basic_relay() {
        let mut h = Harness::new();
        let d = dispatcher(&h);
        seed(&h, &d).await;

        let rows = stored(&h).await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].channel, "global-gossip");
        assert_eq!(rows[0].content, "hi");
        assert_eq!(rows[0].status, MessageStatus::Delivered);
        assert_eq!(rows[0].sender, "12D3KooW...");
        assert_eq!(h.ctx.view.len(), 1);

        let events = h.drain_events();
        assert!(events.contains(&ChatEvent::ViewUpdated { channel: "global-gossip".into() }));
        assert!(events.iter().any(|e| matches!(e, ChatEvent::Notification { .. })));
    }

    #[tokio::test]
    async fn test_post_is_idempotent() {
        let h = Harness::new();
        let d = dispatcher(&h);
        seed(&h, &d).await;

        let again = d
            .handle_inbound("phantom-global", PEER, r#"{"uuid":"m1","type":"text","text":"hi"}"#)
            .await;
        assert_eq!(again, DispatchOutcome::Ignored(IgnoreReason::Duplicate));
        assert_eq!(stored(&h).await.len(), 1);
        assert_eq!(h.ctx.view.len(), 1);
    }

    #[tokio::test]
    async fn test_edit() {
        let h = Harness::new();
        let d = dispatcher(&h);
        seed(&h, &d).await;

        let outcome = d
            .handle_inbound("phantom-global", PEER, r#"{"type":"edit","targetUuid":"m1","content":"hi!"}"#)
            .await;
        assert!(matches!(outcome, DispatchOutcome::Edited { ref uuid, .. } if uuid == "m1"));

        let row = h.store.get_message("m1").await.unwrap().unwrap();
        assert_eq!(row.content, "hi!");
        assert!(row.is_edited());
        let shown = h.ctx.view.get("m1").unwrap();
        assert_eq!(shown.content, "hi!");
        assert!(shown.is_edited);
    }

    #[tokio::test]
    async fn test_older_edit_loses() {
        let h = Harness::new();
        let d = dispatcher(&h);
        seed(&h, &d).await;

        d.handle_inbound(
            "phantom-global",
            PEER,
            r#"{"type":"edit","targetUuid":"m1","content":"newer","timestamp":2000}"#,
        )
        .await;
        let outcome = d
            .handle_inbound(
                "phantom-global",
                "other",
                r#"{"type":"edit","targetUuid":"m1","content":"older","timestamp":1500}"#,
            )
            .await;
        assert_eq!(outcome, DispatchOutcome::Ignored(IgnoreReason::Stale));
        assert_eq!(h.store.get_message("m1").await.unwrap().unwrap().content, "newer");
        assert_eq!(h.ctx.view.get("m1").unwrap().content, "newer");
    }

    #[tokio::test]
    async fn test_reaction_toggle() {
        let h = Harness::new();
        let d = dispatcher(&h);
        seed(&h, &d).await;
        let react = r#"{"type":"reaction","targetUuid":"m1","content":"👍"}"#;

        d.handle_inbound("phantom-global", "p1", react).await;
        let row = h.store.get_message("m1").await.unwrap().unwrap();
        assert_eq!(row.reactions.reactors("👍"), vec!["p1"]);
        assert_eq!(h.ctx.view.get("m1").unwrap().reactions, row.reactions);

        d.handle_inbound("phantom-global", "p1", react).await;
        let row = h.store.get_message("m1").await.unwrap().unwrap();
        assert!(row.reactions.is_empty());
        assert!(h.ctx.view.get("m1").unwrap().reactions.is_empty());
    }

    #[tokio::test]
    async fn test_delete_then_no_op() {
        let h = Harness::new();
        let d = dispatcher(&h);
        seed(&h, &d).await;

        let outcome = d
            .handle_inbound("phantom-global", PEER, r#"{"type":"delete","targetUuid":"m1"}"#)
            .await;
        assert!(matches!(outcome, DispatchOutcome::Deleted { .. }));
        assert!(stored(&h).await.is_empty());
        assert!(h.ctx.view.is_empty());

        for payload in [
            r#"{"type":"edit","targetUuid":"m1","content":"back?"}"#,
            r#"{"type":"reaction","targetUuid":"m1","content":"👍"}"#,
            r#"{"type":"delete","targetUuid":"m1"}"#,
        ] {
            let outcome = d.handle_inbound("phantom-global", PEER, payload).await;
            assert_eq!(outcome, DispatchOutcome::Ignored(IgnoreReason::UnknownTarget));
        }

        // A late duplicate of the original post stays deleted
        let outcome = d
            .handle_inbound("phantom-global", PEER, r#"{"uuid":"m1","type":"text","text":"hi"}"#)
            .await;
        assert_eq!(outcome, DispatchOutcome::Ignored(IgnoreReason::Duplicate));
        assert!(stored(&h).await.is_empty());
        assert!(h.ctx.view.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_target_changes_nothing() {
        let h = Harness::new();
        let d = dispatcher(&h);
        seed(&h, &d).await;

        let outcome = d
            .handle_inbound("phantom-global", PEER, r#"{"type":"edit","targetUuid":"nope","content":"x"}"#)
            .await;
        assert_eq!(outcome, DispatchOutcome::Ignored(IgnoreReason::UnknownTarget));
        assert_eq!(h.store.message_count(), 1);
        assert_eq!(h.ctx.view.len(), 1);
    }

    #[tokio::test]
    async fn test_plain_text_payload_gets_local_uuid() {
        let h = Harness::new();
        let d = dispatcher(&h);
        h.ctx.view.select_channel(PEER, &[]).await.unwrap();

        let outcome = d.handle_inbound(PEER, PEER, "just words").await;
        let DispatchOutcome::Posted { uuid, channel } = outcome else {
            panic!("expected a post, got {:?}", outcome);
        };
        assert_eq!(channel, PEER);
        let row = h.store.get_message(&uuid).await.unwrap().unwrap();
        assert_eq!(row.content, "just words");
        assert_eq!(row.kind, MessageKind::Text);

        // The same text again is a different message
        assert!(d.handle_inbound(PEER, PEER, "just words").await.is_applied());
        assert_eq!(h.ctx.view.len(), 2);
    }

    #[tokio::test]
    async fn test_own_post_does_not_notify() {
        let mut h = Harness::new();
        let d = dispatcher(&h);
        h.ctx.view.select_channel(PUBLIC_LOCAL_CHANNEL, &[]).await.unwrap();

        d.handle_inbound("phantom-global", LOCAL_PEER, r#"{"uuid":"own","type":"text","text":"me"}"#)
            .await;
        let row = h.store.get_message("own").await.unwrap().unwrap();
        assert_eq!(row.sender, "Я");
        assert!(!h
            .drain_events()
            .iter()
            .any(|e| matches!(e, ChatEvent::Notification { .. })));
    }

    #[tokio::test]
    async fn test_store_failure_still_shows_post() {
        let h = Harness::new();
        let d = dispatcher(&h);
        h.ctx.view.select_channel(PUBLIC_LOCAL_CHANNEL, &[]).await.unwrap();
        h.store.fail_writes(true);

        let outcome = d
            .handle_inbound("phantom-global", PEER, r#"{"uuid":"m9","type":"text","text":"x"}"#)
            .await;
        assert!(outcome.is_applied());
        assert!(h.ctx.view.contains("m9"));
        assert_eq!(h.store.message_count(), 0);
    }

    #[tokio::test]
    async fn test_local_react_broadcasts_and_ignores_echo() {
        let h = Harness::new();
        let d = dispatcher(&h);
        seed(&h, &d).await;

        let outcome = d.react("m1", "❤️").await.unwrap();
        assert!(matches!(outcome, DispatchOutcome::Reacted { .. }));
        let row = h.store.get_message("m1").await.unwrap().unwrap();
        assert!(row.reactions.contains("❤️", LOCAL_PEER));

        let sent = h.transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "phantom-global");

        // The transport reflects our own operation back
        let echo = d.handle_inbound(&sent[0].0, LOCAL_PEER, &sent[0].1).await;
        assert_eq!(echo, DispatchOutcome::Ignored(IgnoreReason::Echo));
        let row = h.store.get_message("m1").await.unwrap().unwrap();
        assert!(row.reactions.contains("❤️", LOCAL_PEER));
    }

    #[tokio::test]
    async fn test_local_edit_and_delete_are_sent() {
        let h = Harness::new();
        let d = dispatcher(&h);
        seed(&h, &d).await;

        d.edit("m1", "  fixed  ").await.unwrap();
        assert_eq!(h.store.get_message("m1").await.unwrap().unwrap().content, "fixed");
        d.delete("m1").await.unwrap();

        let sent = h.transport.sent();
        assert_eq!(sent.len(), 2);
        match Envelope::decode(&sent[0].1) {
            Envelope::Edit { target_uuid, content, timestamp, .. } => {
                assert_eq!(target_uuid, "m1");
                assert_eq!(content, "fixed");
                assert!(timestamp.is_some());
            }
            other => panic!("expected an edit, got {:?}", other),
        }
        assert!(matches!(Envelope::decode(&sent[1].1), Envelope::Delete { .. }));

        assert!(d.edit("m1", "   ").await.is_err());
        assert_eq!(
            d.delete("m1").await.unwrap(),
            DispatchOutcome::Ignored(IgnoreReason::UnknownTarget)
        );
    }

    #[tokio::test]
    async fn test_rejected_broadcast_adds_notice() {
        let mut h = Harness::new();
        let d = dispatcher(&h);
        seed(&h, &d).await;
        h.drain_events();
        h.transport.fail_sends(true);

        let result = d.edit("m1", "changed").await;
        assert!(matches!(result, Err(Error::TransportError(_))));

        // The local edit stands
        assert_eq!(h.ctx.view.get("m1").unwrap().content, "changed");
        let notices: Vec<_> = h.ctx.view.messages().into_iter().filter(|m| m.is_system).collect();
        assert_eq!(notices.len(), 1);
        assert!(h
            .drain_events()
            .iter()
            .any(|e| matches!(e, ChatEvent::SystemNotice { .. })));
    }

    #[tokio::test]
    async fn test_handshake_pending_notice() {
        let h = Harness::new();
        let d = dispatcher(&h);
        h.ctx.view.select_channel(PEER, &[]).await.unwrap();
        d.handle_inbound(PEER, PEER, r#"{"uuid":"d1","type":"text","text":"yo"}"#).await;
        h.transport.fail_with(Error::transport("Establishing secure connection (Handshake sent)."));

        assert!(d.react("d1", "👍").await.is_err());
        let notice = h.ctx.view.messages().into_iter().find(|m| m.is_system).unwrap();
        assert_eq!(notice.content, crate::messaging::HANDSHAKE_PENDING_NOTICE);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_store_fails_operation() {
        let h = Harness::new();
        let d = dispatcher(&h);
        seed(&h, &d).await;
        h.store.hang_reads(true);

        let outcome = d
            .handle_inbound("phantom-global", PEER, r#"{"type":"edit","targetUuid":"m1","content":"late"}"#)
            .await;
        assert!(matches!(outcome, DispatchOutcome::Failed(Error::Timeout(_))));
        assert_eq!(h.ctx.view.get("m1").unwrap().content, "hi");
        assert!(matches!(d.delete("m1").await, Err(Error::Timeout(_))));
        assert!(h.transport.sent().is_empty());

        // The uuid lock was released by the timed out calls
        h.store.hang_reads(false);
        assert!(matches!(d.delete("m1").await, Ok(DispatchOutcome::Deleted { .. })));
    }

    #[tokio::test]
    async fn test_local_ops_on_unstored_send() {
        let h = Harness::new();
        let d = dispatcher(&h);
        h.ctx.view.select_channel(PEER, &[]).await.unwrap();

        let mut draft = StoredMessage::from_post(
            Post::text("draft"),
            PEER,
            "Я".to_string(),
            LOCAL_PEER,
            MessageStatus::Sending,
            1000,
        );
        draft.uuid = Some("s1".into());
        h.ctx.view.append(&draft);

        assert!(matches!(d.edit("s1", "better").await, Err(Error::MessageNotFound(_))));
        assert!(matches!(d.react("s1", "👍").await, Err(Error::MessageNotFound(_))));
        assert_eq!(h.ctx.view.get("s1").unwrap().content, "draft");

        d.discard_unsent("s1").await.unwrap();
        assert!(!h.ctx.view.contains("s1"));
        assert!(!h.store.upsert_message(&draft).await.unwrap());
        assert!(h.transport.sent().is_empty());
    }

    #[test]
    fn test_sent_ops_are_bounded() {
        let mut ops = SentOps::default();
        for i in 0..SENT_OPS_CAPACITY + 10 {
            ops.remember(&format!("op{}", i));
        }
        assert!(!ops.contains("op0"));
        assert!(ops.contains(&format!("op{}", SENT_OPS_CAPACITY + 9)));
        assert_eq!(ops.ids.len(), SENT_OPS_CAPACITY);
    }
}

//! # Chat Engine
//!
//! The facade a host drives: UI actions come in as method calls, transport
//! events come in through [`ChatEngine::run`], and everything the UI needs to
//! know goes out as [`ChatEvent`]s on a broadcast channel.
//!
//! ## Wiring
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                            CHAT ENGINE                                  │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  mpsc<TransportEvent> ──► run() ──► handle_transport_event()           │
//! │                                        │                                │
//! │            ┌───────────────┬───────────┼──────────────┬─────────────┐   │
//! │            ▼               ▼           ▼              ▼             ▼   │
//! │       Dispatcher     TypingTracker  PeerDirectory  notices     LocalPeer│
//! │            │                                                            │
//! │  UI ──► send_* ──► Outbox ──► ViewProjector ◄── select_channel/peer    │
//! │            │          │                                                 │
//! │            ▼          ▼                                                 │
//! │     Arc<dyn MessageStore>   Arc<dyn Transport>                          │
//! │                                                                         │
//! │  broadcast<ChatEvent> ──► UI subscribers                               │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every collaborator is injected at construction; nothing is global.

mod events;

pub use events::ChatEvent;

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::contacts::{Contact, ContactBook};
use crate::discovery::{resolve_dial_address, PeerDirectory};
use crate::error::{Error, Result};
use crate::messaging::{
    Attachment, DeliveryHandle, DispatchOutcome, Dispatcher, KeyedLocks, MessagingContext, Outbox,
    ReplyReference,
};
use crate::network::{Transport, TransportEvent};
use crate::protocol::{ChannelMap, Post};
use crate::storage::{MessageStore, StorageConfig};
use crate::time::{now_timestamp_millis, offset_from_secs};
use crate::typing::{TypingNotifier, TypingTracker};
use crate::view::{ReplyPreview, ViewMessage, ViewProjector, ViewRow};
use crate::CoreConfig;

/// Notice shown in a direct channel once its secure session is up
pub const HANDSHAKE_COMPLETE_NOTICE: &str = "🔒 Защищенное соединение установлено";
/// Alert for an attachment over the size limit
pub const FILE_TOO_LARGE_ALERT: &str = "Файл слишком большой (макс. 2МБ)";
/// Alert for a successful dial
pub const CONNECT_REQUESTED_ALERT: &str = "Запрос на подключение отправлен";
/// Prefix of the alert for a failed dial
pub const CONNECT_FAILED_PREFIX: &str = "Ошибка подключения: ";
/// Alert for input that is neither an invite code nor an address
pub const INVALID_INVITE_ALERT: &str = "Ошибка чтения инвайт-кода";

/// Which conversation the UI shows
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActiveView {
    /// A public channel
    Channel(String),
    /// A direct conversation, keyed by peer id
    Peer(String),
}

impl ActiveView {
    /// Local channel key of the conversation
    pub fn channel(&self) -> &str {
        match self {
            Self::Channel(channel) => channel,
            Self::Peer(peer_id) => peer_id,
        }
    }

    /// The peer, for direct conversations
    pub fn peer(&self) -> Option<&str> {
        match self {
            Self::Peer(peer_id) => Some(peer_id),
            Self::Channel(_) => None,
        }
    }
}

/// A device capability the user refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Audio recording
    Microphone,
    /// File picker / file system
    Files,
}

impl Capability {
    fn alert(&self) -> &'static str {
        match self {
            Self::Microphone => "Нет доступа к микрофону",
            Self::Files => "Нет доступа к файлам",
        }
    }
}

/// The chat core
pub struct ChatEngine {
    config: CoreConfig,
    ctx: MessagingContext,
    dispatcher: Dispatcher,
    outbox: Outbox,
    typing_out: TypingNotifier,
    typing_in: TypingTracker,
    active: RwLock<Option<ActiveView>>,
}

impl ChatEngine {
    /// Wire an engine over an injected store and transport
    pub fn new(
        config: CoreConfig,
        store: Arc<dyn MessageStore>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let offset = offset_from_secs(config.utc_offset_secs);

        let ctx = MessagingContext {
            store: Arc::clone(&store),
            transport: Arc::clone(&transport),
            view: Arc::new(ViewProjector::new(Arc::clone(&store), offset, config.store_timeout())),
            contacts: Arc::new(ContactBook::new(store, config.local_label.clone())),
            peers: Arc::new(PeerDirectory::new()),
            channels: Arc::new(ChannelMap::new(&config.public_channels)),
            locks: Arc::new(KeyedLocks::new()),
            events: events.clone(),
        };

        Self {
            dispatcher: Dispatcher::new(ctx.clone(), config.store_timeout(), config.send_timeout()),
            outbox: Outbox::new(ctx.clone(), config.store_timeout(), config.send_timeout()),
            typing_out: TypingNotifier::new(transport, config.typing_idle()),
            typing_in: TypingTracker::new(config.typing_check(), config.typing_stale(), events),
            ctx,
            config,
            active: RwLock::new(None),
        }
    }

    /// Open the configured database and load contacts
    pub async fn open(config: CoreConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        tracing::info!("Opening chat engine v{}", crate::version());
        let storage = StorageConfig {
            database_path: config.database_path.clone(),
        };
        let database = crate::storage::init(&storage).await?;
        let engine = Self::new(config, Arc::new(database), transport);
        engine.ctx.contacts.load().await?;
        Ok(engine)
    }

    /// Subscribe to engine events
    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.ctx.events.subscribe()
    }

    /// The configuration this engine runs with
    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    // ========================================================================
    // EVENT LOOP
    // ========================================================================

    /// Drive inbound transport events until `shutdown` fires or the channel
    /// closes. Each event is handled to completion before the next.
    pub async fn run(
        &self,
        mut transport_rx: mpsc::Receiver<TransportEvent>,
        mut shutdown: oneshot::Receiver<()>,
    ) {
        tracing::info!("Chat event loop starting");

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Shutdown requested, exiting chat event loop");
                    break;
                }

                event = transport_rx.recv() => {
                    match event {
                        Some(event) => self.handle_transport_event(event).await,
                        None => {
                            tracing::info!("Transport event channel closed, exiting chat event loop");
                            break;
                        }
                    }
                }
            }
        }

        tracing::info!("Chat event loop stopped");
    }

    /// Apply one transport event
    pub async fn handle_transport_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::NewMessage {
                channel,
                sender,
                payload,
            } => {
                let outcome = self.dispatcher.handle_inbound(&channel, &sender, &payload).await;
                if let DispatchOutcome::Deleted { uuid, .. } = &outcome {
                    self.outbox.forget(uuid);
                }
            }

            TransportEvent::PeerDiscovered { peer_id } => {
                if self.ctx.peers.add_peer(&peer_id) {
                    tracing::debug!("Discovered peer {}", peer_id);
                    self.ctx.emit(ChatEvent::PeerDiscovered { peer_id });
                }
            }

            TransportEvent::PeerExpired { peer_id } => {
                if self.ctx.peers.remove_peer(&peer_id) {
                    tracing::debug!("Peer {} expired", peer_id);
                    self.ctx.emit(ChatEvent::PeerExpired { peer_id });
                }
            }

            TransportEvent::ListenAddress { address } => {
                if self.ctx.peers.add_listen_address(&address) {
                    tracing::info!("Listening on {}", address);
                    self.ctx.emit(ChatEvent::ListenAddress { address });
                }
            }

            TransportEvent::HandshakeComplete { peer_id } => {
                tracing::info!("Secure session with {} established", peer_id);
                let is_active = self
                    .active
                    .read()
                    .as_ref()
                    .and_then(ActiveView::peer)
                    .is_some_and(|peer| peer == peer_id);
                if is_active {
                    self.ctx.system_notice(&peer_id, HANDSHAKE_COMPLETE_NOTICE);
                }
            }

            TransportEvent::TypingSignal { peer_id, is_typing } => {
                self.typing_in.signal(&peer_id, is_typing);
            }

            TransportEvent::LocalPeerIdAssigned { peer_id } => {
                tracing::info!("Local peer id is {}", peer_id);
                self.ctx.peers.set_local_peer_id(&peer_id);
                self.ctx.emit(ChatEvent::LocalPeerId { peer_id });
            }
        }
    }

    // ========================================================================
    // CONVERSATION SELECTION
    // ========================================================================

    /// Show a public channel
    pub async fn select_channel(&self, channel: &str) -> Result<()> {
        self.activate(ActiveView::Channel(channel.to_string())).await
    }

    /// Show the direct conversation with `peer_id`
    pub async fn select_peer(&self, peer_id: &str) -> Result<()> {
        self.activate(ActiveView::Peer(peer_id.to_string())).await
    }

    async fn activate(&self, view: ActiveView) -> Result<()> {
        // Leaving a conversation ends any typing burst in it
        self.typing_out.input_changed(None, "");

        let channel = view.channel().to_string();
        *self.active.write() = Some(view);

        let pending = self.outbox.pending_for(&channel);
        let result = self.ctx.view.select_channel(&channel, &pending).await;
        if let Err(e) = &result {
            tracing::error!("Failed to load history for {}: {}", channel, e);
        }
        self.ctx.view_changed(true, &channel);
        result
    }

    /// The conversation being shown
    pub fn active_view(&self) -> Option<ActiveView> {
        self.active.read().clone()
    }

    fn active_channel(&self) -> Result<ActiveView> {
        self.active_view()
            .ok_or_else(|| Error::InvalidMessageContent("no conversation selected".into()))
    }

    /// Peer that should receive typing signals, if any
    fn typing_peer(&self) -> Option<String> {
        self.active_view()
            .and_then(|view| view.peer().map(str::to_string))
            .filter(|peer| self.ctx.channels.is_direct(peer))
    }

    // ========================================================================
    // COMPOSING AND SENDING
    // ========================================================================

    /// The input buffer changed
    pub fn input_changed(&self, buffer: &str) {
        let peer = self.typing_peer();
        self.typing_out.input_changed(peer.as_deref(), buffer);
    }

    /// Send a text message to the active conversation
    pub fn send_text(&self, text: &str, reply_to: Option<ReplyReference>) -> Result<DeliveryHandle> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::InvalidMessageContent("empty message".into()));
        }
        let view = self.active_channel()?;

        let mut post = Post::text(text);
        post.reply_to = reply_to;
        self.typing_out.message_sent(self.typing_peer().as_deref());
        self.outbox.submit(post, view.channel())
    }

    /// Send a file; images are detected from the mime type
    pub fn send_attachment(
        &self,
        file_name: &str,
        mime: &str,
        bytes: &[u8],
        reply_to: Option<ReplyReference>,
    ) -> Result<DeliveryHandle> {
        let view = self.active_channel()?;
        let attachment = Attachment::file(file_name, mime, bytes, self.config.max_attachment_bytes)
            .map_err(|e| self.alert_on_user_error(e))?;
        self.outbox.submit(attachment_post(attachment, reply_to), view.channel())
    }

    /// Send a voice recording
    pub fn send_audio(&self, mime: &str, bytes: &[u8]) -> Result<DeliveryHandle> {
        let view = self.active_channel()?;
        let attachment = Attachment::audio(mime, bytes, self.config.max_attachment_bytes)
            .map_err(|e| self.alert_on_user_error(e))?;
        self.outbox.submit(attachment_post(attachment, None), view.channel())
    }

    fn alert_on_user_error(&self, error: Error) -> Error {
        if let Error::AttachmentTooLarge { size, max } = &error {
            tracing::warn!("Rejected attachment of {} bytes (max {})", size, max);
            self.alert(FILE_TOO_LARGE_ALERT);
        }
        error
    }

    /// The user refused a capability; the originating action is dropped
    pub fn report_capability_denied(&self, capability: Capability) -> Error {
        tracing::warn!("Capability denied: {:?}", capability);
        self.alert(capability.alert());
        Error::PermissionDenied(format!("{:?}", capability))
    }

    /// Deliver a failed message again
    pub async fn retry(&self, uuid: &str) -> Result<DeliveryHandle> {
        self.outbox.retry(uuid).await
    }

    // ========================================================================
    // MESSAGE OPERATIONS
    // ========================================================================

    /// Edit a message and broadcast the edit
    pub async fn edit(&self, uuid: &str, content: &str) -> Result<DispatchOutcome> {
        self.dispatcher.edit(uuid, content).await
    }

    /// Delete a message and broadcast the deletion.
    ///
    /// A local send that is still pending leaves the outbox first, so a
    /// delivery that has not started yet never stores or sends it.
    pub async fn delete(&self, uuid: &str) -> Result<DispatchOutcome> {
        let was_pending = self.outbox.forget(uuid);
        let outcome = self.dispatcher.delete(uuid).await?;
        if was_pending && !outcome.is_applied() {
            self.dispatcher.discard_unsent(uuid).await?;
        }
        Ok(outcome)
    }

    /// Toggle our reaction on a message
    pub async fn react(&self, uuid: &str, emoji: &str) -> Result<DispatchOutcome> {
        self.dispatcher.react(uuid, emoji).await
    }

    // ========================================================================
    // PEERS AND CONNECTIONS
    // ========================================================================

    /// Dial an invite code or a raw multiaddr
    pub async fn connect(&self, invite_or_address: &str) -> Result<()> {
        let address = match resolve_dial_address(invite_or_address) {
            Ok(address) => address,
            Err(e) => {
                self.alert(INVALID_INVITE_ALERT);
                return Err(e);
            }
        };

        tracing::info!("Dialing {}", address);
        let dial = self.ctx.transport.connect(&address);
        match crate::messaging::with_timeout(self.config.send_timeout(), dial).await {
            Ok(()) => {
                self.alert(CONNECT_REQUESTED_ALERT);
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Dial {} failed: {}", address, e);
                self.alert(&format!("{}{}", CONNECT_FAILED_PREFIX, e));
                Err(e)
            }
        }
    }

    /// Our invite code, once a peer id and a listen address are known
    pub fn invite_code(&self) -> Result<Option<String>> {
        self.ctx
            .peers
            .invite_code()
            .map(|invite| invite.to_base64())
            .transpose()
    }

    /// Our peer id
    pub fn local_peer_id(&self) -> Option<String> {
        self.ctx.peers.local_peer_id()
    }

    /// Discovered peers
    pub fn peers(&self) -> Vec<String> {
        self.ctx.peers.peers()
    }

    /// Our listen addresses
    pub fn listen_addresses(&self) -> Vec<String> {
        self.ctx.peers.listen_addresses()
    }

    // ========================================================================
    // CONTACTS AND PROFILE
    // ========================================================================

    /// Save a contact
    pub async fn add_contact(&self, peer_id: &str, name: &str) -> Result<Contact> {
        self.ctx.contacts.add(peer_id, name).await
    }

    /// Delete a contact
    pub async fn remove_contact(&self, peer_id: &str) -> Result<bool> {
        self.ctx.contacts.remove(peer_id).await
    }

    /// All contacts, ordered by name
    pub fn contacts(&self) -> Vec<Contact> {
        self.ctx.contacts.list()
    }

    /// Peer list label for `peer_id`
    pub fn display_name(&self, peer_id: &str) -> String {
        self.ctx.contacts.display_name(peer_id)
    }

    /// The local profile's display name
    pub async fn profile_name(&self) -> Result<Option<String>> {
        self.ctx.contacts.profile_name().await
    }

    /// Change the local profile's display name
    pub async fn set_profile_name(&self, name: &str) -> Result<()> {
        self.ctx.contacts.set_profile_name(name).await
    }

    // ========================================================================
    // VIEW
    // ========================================================================

    /// Rows of the active conversation
    pub fn rows(&self) -> Vec<ViewRow> {
        self.ctx.view.rows()
    }

    /// Messages of the active conversation
    pub fn messages(&self) -> Vec<ViewMessage> {
        self.ctx.view.messages()
    }

    /// Filter the active conversation
    pub fn search(&self, query: &str) -> Vec<ViewMessage> {
        self.ctx.view.search(query)
    }

    /// Resolve a reply quote against the active conversation
    pub fn reply_preview(&self, reply: &ReplyReference) -> ReplyPreview {
        self.ctx.view.reply_preview(reply)
    }

    /// Peers currently shown as typing
    pub fn typing_peers(&self) -> Vec<String> {
        self.typing_in.typing_peers()
    }

    /// Whether `peer_id` is shown as typing
    pub fn is_peer_typing(&self, peer_id: &str) -> bool {
        self.typing_in.is_typing(peer_id)
    }

    fn alert(&self, message: &str) {
        self.ctx.emit(ChatEvent::Alert {
            message: message.to_string(),
        });
    }
}

fn attachment_post(attachment: Attachment, reply_to: Option<ReplyReference>) -> Post {
    Post {
        uuid: Some(uuid::Uuid::new_v4().to_string()),
        kind: attachment.kind,
        content: attachment.content,
        reply_to,
        file_name: attachment.file_name,
        file_size: attachment.file_size,
        timestamp: Some(now_timestamp_millis()),
    }
}

//! # Network Module
//!
//! The contract this core needs from the peer transport, and an adapter that
//! forwards it to a host-owned network task over a channel.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        TRANSPORT BOUNDARY                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │   ChatEngine                                   Host network task        │
//! │   ──────────                                   ─────────────────        │
//! │                                                                         │
//! │   Arc<dyn Transport>                                                    │
//! │     │  ChannelTransport                                                 │
//! │     └──── mpsc<TransportCommand> ─────────────► Publish / Typing / Dial │
//! │                  ▲ oneshot ack ◄───────────────┘                        │
//! │                                                                         │
//! │   run(mpsc<TransportEvent>) ◄─────────────────── NewMessage, Typing…    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Encryption, handshakes and gossip routing all live behind this boundary.

mod events;

pub use events::TransportEvent;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use crate::error::{Error, Result};

/// Outbound side of the peer transport
#[async_trait]
pub trait Transport: Send + Sync {
    /// Publish a serialized envelope on a wire channel
    async fn send(&self, channel: &str, payload: &str) -> Result<()>;

    /// Tell a peer we started or stopped typing
    async fn send_typing(&self, peer_id: &str, is_typing: bool) -> Result<()>;

    /// Dial a multiaddr
    async fn connect(&self, address: &str) -> Result<()>;
}

/// Commands sent to the host's network task
pub enum TransportCommand {
    /// Publish a payload on a wire channel
    Publish {
        /// Wire channel
        channel: String,
        /// Serialized envelope
        payload: String,
        /// Where to report the outcome
        reply: oneshot::Sender<std::result::Result<(), String>>,
    },
    /// Typing signal to a direct peer (no acknowledgement)
    Typing {
        /// Target peer
        peer_id: String,
        /// Start or stop
        is_typing: bool,
    },
    /// Dial an address
    Dial {
        /// Multiaddr to dial
        address: String,
        /// Where to report the outcome
        reply: oneshot::Sender<std::result::Result<(), String>>,
    },
}

impl std::fmt::Debug for TransportCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Publish { channel, payload, .. } => f
                .debug_struct("Publish")
                .field("channel", channel)
                .field("payload_len", &payload.len())
                .finish(),
            Self::Typing { peer_id, is_typing } => f
                .debug_struct("Typing")
                .field("peer_id", peer_id)
                .field("is_typing", is_typing)
                .finish(),
            Self::Dial { address, .. } => f.debug_tuple("Dial").field(address).finish(),
        }
    }
}

/// [`Transport`] that forwards to a network task over an mpsc channel
///
/// Error strings reported by the task go through [`Error::transport`], so a
/// task that answers "Handshake sent" yields [`Error::HandshakePending`].
#[derive(Clone)]
pub struct ChannelTransport {
    command_tx: mpsc::Sender<TransportCommand>,
}

impl ChannelTransport {
    /// Create the adapter and the receiver the network task should drain
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<TransportCommand>) {
        let (command_tx, command_rx) = mpsc::channel(capacity.max(1));
        (Self { command_tx }, command_rx)
    }

    async fn request(
        &self,
        build: impl FnOnce(oneshot::Sender<std::result::Result<(), String>>) -> TransportCommand,
    ) -> Result<std::result::Result<(), String>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command_tx
            .send(build(reply_tx))
            .await
            .map_err(|_| Error::NotConnected)?;
        reply_rx.await.map_err(|_| Error::NotConnected)
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send(&self, channel: &str, payload: &str) -> Result<()> {
        let outcome = self
            .request(|reply| TransportCommand::Publish {
                channel: channel.to_string(),
                payload: payload.to_string(),
                reply,
            })
            .await?;
        outcome.map_err(Error::transport)
    }

    async fn send_typing(&self, peer_id: &str, is_typing: bool) -> Result<()> {
        self.command_tx
            .send(TransportCommand::Typing {
                peer_id: peer_id.to_string(),
                is_typing,
            })
            .await
            .map_err(|_| Error::NotConnected)
    }

    async fn connect(&self, address: &str) -> Result<()> {
        let outcome = self
            .request(|reply| TransportCommand::Dial {
                address: address.to_string(),
                reply,
            })
            .await?;
        outcome.map_err(Error::ConnectionFailed)
    }
}

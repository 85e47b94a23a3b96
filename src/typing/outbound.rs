//! Local composing state: `Idle → Composing → Idle`.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::network::Transport;

#[derive(Default)]
struct ComposeState {
    /// Peer we told we are typing; `Some` means `Composing`
    target: Option<String>,
    /// Pending idle timer
    timer: Option<JoinHandle<()>>,
    /// Bumped on every transition; a timer only acts on its own generation
    generation: u64,
}

/// Debounced outbound typing signals
///
/// "Started" goes out on the first keystroke of a burst; "stopped" goes out
/// once the input has been idle for the configured delay, or when the
/// message is sent. Sends are fire-and-forget.
pub struct TypingNotifier {
    transport: Arc<dyn Transport>,
    idle: Duration,
    state: Arc<Mutex<ComposeState>>,
}

impl TypingNotifier {
    /// Create an idle notifier
    pub fn new(transport: Arc<dyn Transport>, idle: Duration) -> Self {
        Self {
            transport,
            idle,
            state: Arc::new(Mutex::new(ComposeState::default())),
        }
    }

    /// The input buffer changed.
    ///
    /// `peer` is the active direct peer, or `None` when a public channel is
    /// active (public channels carry no typing signals).
    pub fn input_changed(&self, peer: Option<&str>, buffer: &str) {
        let Some(peer) = peer else {
            self.cancel();
            return;
        };

        let mut state = self.state.lock();
        if let Some(previous) = state.target.clone().filter(|t| t != peer) {
            // Switched conversations mid-burst
            Self::stop_locked(&mut state, &self.transport, &previous);
        }

        if !buffer.is_empty() && state.timer.is_none() {
            state.target = Some(peer.to_string());
            spawn_signal(&self.transport, peer, true);
        }

        // Nothing outstanding, nothing to stop later
        let Some(target) = state.target.clone() else {
            return;
        };

        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        state.generation += 1;
        let generation = state.generation;

        let shared = Arc::clone(&self.state);
        let transport = Arc::clone(&self.transport);
        let idle = self.idle;
        state.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(idle).await;
            let mut state = shared.lock();
            if state.generation != generation {
                return;
            }
            state.timer = None;
            state.target = None;
            spawn_signal(&transport, &target, false);
        }));
    }

    /// A message was sent: stop immediately.
    pub fn message_sent(&self, peer: Option<&str>) {
        let mut state = self.state.lock();
        let target = state.target.clone().or_else(|| peer.map(str::to_string));
        match target {
            Some(target) => Self::stop_locked(&mut state, &self.transport, &target),
            None => Self::reset_locked(&mut state),
        }
    }

    /// Whether a "started" signal is outstanding
    pub fn is_composing(&self) -> bool {
        self.state.lock().target.is_some()
    }

    /// Leave `Composing` when the view moves to a public channel
    fn cancel(&self) {
        let mut state = self.state.lock();
        match state.target.clone() {
            Some(target) => Self::stop_locked(&mut state, &self.transport, &target),
            None => Self::reset_locked(&mut state),
        }
    }

    fn stop_locked(state: &mut ComposeState, transport: &Arc<dyn Transport>, peer: &str) {
        Self::reset_locked(state);
        spawn_signal(transport, peer, false);
    }

    fn reset_locked(state: &mut ComposeState) {
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        state.target = None;
        state.generation += 1;
    }
}

fn spawn_signal(transport: &Arc<dyn Transport>, peer: &str, is_typing: bool) {
    let transport = Arc::clone(transport);
    let peer = peer.to_string();
    tokio::spawn(async move {
        if let Err(e) = transport.send_typing(&peer, is_typing).await {
            tracing::warn!("Typing signal ({}) to {} failed: {}", is_typing, peer, e);
        }
    });
}

//! Remote typing display with staleness expiry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::engine::ChatEvent;

struct Entry {
    last_signal: Instant,
    check: JoinHandle<()>,
}

/// Which remote peers are currently typing
///
/// Each "started" signal records its arrival time and schedules one check.
/// The check clears the peer only if the recorded signal is older than the
/// staleness threshold, so a lost "stopped" signal still expires. A newer
/// signal aborts the pending check; the age comparison stays as a second
/// guard.
pub struct TypingTracker {
    check_after: Duration,
    stale_after: Duration,
    entries: Arc<Mutex<HashMap<String, Entry>>>,
    events: broadcast::Sender<ChatEvent>,
}

impl TypingTracker {
    /// Create a tracker emitting [`ChatEvent::TypingChanged`] on `events`
    pub fn new(
        check_after: Duration,
        stale_after: Duration,
        events: broadcast::Sender<ChatEvent>,
    ) -> Self {
        Self {
            check_after,
            stale_after,
            entries: Arc::new(Mutex::new(HashMap::new())),
            events,
        }
    }

    /// Apply an inbound typing signal
    pub fn signal(&self, peer_id: &str, is_typing: bool) {
        if is_typing {
            self.started(peer_id);
        } else {
            self.stopped(peer_id);
        }
    }

    fn started(&self, peer_id: &str) {
        let mut entries = self.entries.lock();
        let was_typing = match entries.remove(peer_id) {
            Some(previous) => {
                previous.check.abort();
                true
            }
            None => false,
        };

        let check = {
            let entries = Arc::clone(&self.entries);
            let events = self.events.clone();
            let peer = peer_id.to_string();
            let (check_after, stale_after) = (self.check_after, self.stale_after);
            tokio::spawn(async move {
                tokio::time::sleep(check_after).await;
                let cleared = {
                    let mut entries = entries.lock();
                    let stale = entries
                        .get(&peer)
                        .is_some_and(|entry| entry.last_signal.elapsed() > stale_after);
                    stale && entries.remove(&peer).is_some()
                };
                if cleared {
                    tracing::debug!("Typing indicator for {} expired", peer);
                    let _ = events.send(ChatEvent::TypingChanged { peer_id: peer, is_typing: false });
                }
            })
        };

        entries.insert(
            peer_id.to_string(),
            Entry {
                last_signal: Instant::now(),
                check,
            },
        );
        drop(entries);

        if !was_typing {
            let _ = self.events.send(ChatEvent::TypingChanged {
                peer_id: peer_id.to_string(),
                is_typing: true,
            });
        }
    }

    fn stopped(&self, peer_id: &str) {
        let removed = self.entries.lock().remove(peer_id);
        if let Some(entry) = removed {
            entry.check.abort();
            let _ = self.events.send(ChatEvent::TypingChanged {
                peer_id: peer_id.to_string(),
                is_typing: false,
            });
        }
    }

    /// Whether `peer_id` is shown as typing
    pub fn is_typing(&self, peer_id: &str) -> bool {
        self.entries.lock().contains_key(peer_id)
    }

    /// All typing peers, sorted
    pub fn typing_peers(&self) -> Vec<String> {
        let mut peers: Vec<String> = self.entries.lock().keys().cloned().collect();
        peers.sort();
        peers
    }
}

impl Drop for TypingTracker {
    fn drop(&mut self) {
        for (_, entry) in self.entries.lock().drain() {
            entry.check.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> (TypingTracker, broadcast::Receiver<ChatEvent>) {
        let (tx, rx) = broadcast::channel(16);
        (
            TypingTracker::new(Duration::from_millis(3000), Duration::from_millis(2500), tx),
            rx,
        )
    }

    fn changed(peer: &str, is_typing: bool) -> ChatEvent {
        ChatEvent::TypingChanged { peer_id: peer.into(), is_typing }
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_expires_after_check_delay() {
        let (typing, mut rx) = tracker();

        typing.signal("p1", true);
        assert!(typing.is_typing("p1"));
        assert_eq!(rx.recv().await.unwrap(), changed("p1", true));

        tokio::time::sleep(Duration::from_millis(2999)).await;
        assert!(typing.is_typing("p1"));

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert!(!typing.is_typing("p1"));
        assert_eq!(rx.recv().await.unwrap(), changed("p1", false));
    }

    #[tokio::test(start_paused = true)]
    async fn test_explicit_stop_clears_immediately() {
        let (typing, mut rx) = tracker();

        typing.signal("p1", true);
        typing.signal("p1", false);
        assert!(!typing.is_typing("p1"));
        assert_eq!(rx.recv().await.unwrap(), changed("p1", true));
        assert_eq!(rx.recv().await.unwrap(), changed("p1", false));

        // No second "stopped" when the old check would have fired
        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_newer_signal_extends_display() {
        let (typing, mut rx) = tracker();

        typing.signal("p1", true);
        tokio::time::sleep(Duration::from_millis(2000)).await;
        typing.signal("p1", true);

        tokio::time::sleep(Duration::from_millis(1500)).await;
        // 3500ms after the first signal, 1500ms after the second
        assert!(typing.is_typing("p1"));

        tokio::time::sleep(Duration::from_millis(1600)).await;
        assert!(!typing.is_typing("p1"));

        // Only one "started" for the burst
        assert_eq!(rx.recv().await.unwrap(), changed("p1", true));
        assert_eq!(rx.recv().await.unwrap(), changed("p1", false));
    }

    #[tokio::test(start_paused = true)]
    async fn test_peers_are_independent() {
        let (typing, _rx) = tracker();

        typing.signal("b", true);
        tokio::time::sleep(Duration::from_millis(1000)).await;
        typing.signal("a", true);
        assert_eq!(typing.typing_peers(), vec!["a", "b"]);

        tokio::time::sleep(Duration::from_millis(2100)).await;
        assert_eq!(typing.typing_peers(), vec!["a"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_for_unknown_peer_is_silent() {
        let (typing, mut rx) = tracker();
        typing.signal("ghost", false);
        assert!(rx.try_recv().is_err());
        assert!(typing.typing_peers().is_empty());
    }
}

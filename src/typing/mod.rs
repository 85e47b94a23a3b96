//! # Typing Module
//!
//! Typing indicators in both directions. The two halves share no state.
//!
//! ## State Machines
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          TYPING INDICATORS                              │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Outbound (TypingNotifier)                                             │
//! │  ─────────────────────────                                              │
//! │         keystroke, buffer non-empty                                     │
//! │   Idle ─────────────────────────────► Composing   send "started"        │
//! │    ▲                                      │  keystroke: reset idle timer│
//! │    └──── idle timer fired / message sent ─┘  send "stopped"             │
//! │                                                                         │
//! │  Inbound (TypingTracker)                                               │
//! │  ───────────────────────                                                │
//! │   "started" from P  ──► last[P] = now, check at now + 3000ms           │
//! │   check fires       ──► clear P if age(last[P]) > 2500ms               │
//! │   "stopped" from P  ──► clear P immediately                            │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Timers are owned task handles and are aborted by every transition that
//! supersedes them.

mod inbound;
mod outbound;

pub use inbound::TypingTracker;
pub use outbound::TypingNotifier;

//! Row derivation: date separators and same-sender grouping.

use chrono::{FixedOffset, NaiveDate};

use super::ViewMessage;
use crate::time::calendar_day;

/// One rendered row of a channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewRow {
    /// Start of a new calendar day
    DateSeparator(NaiveDate),
    /// A message with its grouping flags
    Message {
        /// The message
        message: ViewMessage,
        /// Continues a run from the previous row (hide avatar / name)
        sequence_top: bool,
        /// The run continues on the next row
        sequence_bottom: bool,
    },
}

/// Derive rows from messages in display order.
///
/// A separator precedes a message whose day differs from the last message
/// that had a timestamp (the first timestamped message always opens a day).
/// Messages without a timestamp never open a day. A separator breaks a
/// same-sender run.
pub fn build_rows(messages: &[ViewMessage], offset: FixedOffset) -> Vec<ViewRow> {
    let mut separator_before = Vec::with_capacity(messages.len());
    let mut days = Vec::with_capacity(messages.len());
    let mut last_day: Option<NaiveDate> = None;

    for message in messages {
        let day = message.timestamp.and_then(|ts| calendar_day(ts, offset));
        let opens_day = matches!(day, Some(d) if last_day != Some(d));
        if day.is_some() {
            last_day = day;
        }
        separator_before.push(opens_day);
        days.push(day);
    }

    let mut rows = Vec::with_capacity(messages.len() * 2);
    for (i, message) in messages.iter().enumerate() {
        if separator_before[i] {
            if let Some(day) = days[i] {
                rows.push(ViewRow::DateSeparator(day));
            }
        }

        let sequence_top = i > 0 && same_run(&messages[i - 1], message) && !separator_before[i];
        let sequence_bottom = i + 1 < messages.len()
            && same_run(message, &messages[i + 1])
            && !separator_before[i + 1];

        rows.push(ViewRow::Message {
            message: message.clone(),
            sequence_top,
            sequence_bottom,
        });
    }
    rows
}

fn same_run(a: &ViewMessage, b: &ViewMessage) -> bool {
    !a.is_system && !b.is_system && a.author_key() == b.author_key()
}

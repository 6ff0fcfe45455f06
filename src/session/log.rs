//! Ordered conversation log.

use crate::api::HistoryTurn;
use crate::session::message::{Message, Role};
use std::time::{SystemTime, UNIX_EPOCH};

/// Id of the canonical greeting message.
pub const GREETING_ID: u64 = 1;

/// Insertion-ordered message log with point deletion.
///
/// Deleting never renumbers the remaining messages. Duplicate ids are
/// tolerated; [`remove_by_id`](Self::remove_by_id) removes the first match.
#[derive(Debug, Clone)]
pub struct MessageLog {
    messages: Vec<Message>,
    greeting: String,
    last_id: u64,
}

impl MessageLog {
    /// A log holding only the greeting.
    pub fn new(greeting: impl Into<String>) -> Self {
        let mut log = Self {
            messages: Vec::new(),
            greeting: greeting.into(),
            last_id: GREETING_ID,
        };
        log.reset();
        log
    }

    /// Next message id: the wall clock in milliseconds, bumped past the last
    /// id handed out so ids stay strictly increasing.
    pub fn next_id(&mut self) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0);
        self.last_id = now.max(self.last_id.saturating_add(1));
        self.last_id
    }

    /// Stamp the local time on `message` and insert it at the tail.
    pub fn append(&mut self, mut message: Message) {
        message.time = Some(chrono::Local::now().format("%H:%M").to_string());
        self.last_id = self.last_id.max(message.id);
        self.messages.push(message);
    }

    /// Remove the first message with `id`.
    pub fn remove_by_id(&mut self, id: u64) -> Option<Message> {
        let pos = self.messages.iter().position(|m| m.id == id)?;
        Some(self.messages.remove(pos))
    }

    /// Remove the tail message.
    pub fn remove_last(&mut self) -> Option<Message> {
        self.messages.pop()
    }

    /// Replace the log with the greeting alone.
    pub fn reset(&mut self) {
        self.messages.clear();
        self.messages
            .push(Message::text(GREETING_ID, Role::System, self.greeting.clone()));
    }

    /// Prior user/assistant text turns, oldest first.
    pub fn history(&self) -> Vec<HistoryTurn> {
        self.messages
            .iter()
            .filter(|m| m.is_history_turn())
            .map(|m| HistoryTurn {
                role: m.role.as_str().to_owned(),
                content: m.content.clone(),
            })
            .collect()
    }

    /// All messages in insertion order.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// The tail message.
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Number of messages.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the log is empty (only after removing the greeting).
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Whether the log holds exactly the greeting.
    #[cfg(test)]
    pub(crate) fn is_pristine(&self) -> bool {
        matches!(self.messages.as_slice(), [only] if only.id == GREETING_ID && only.content == self.greeting)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use crate::session::message::MessageKind;

    fn log() -> MessageLog {
        MessageLog::new("Welcome!")
    }

    #[test]
    fn starts_with_greeting() {
        let log = log();
        assert_eq!(log.len(), 1);
        assert!(log.is_pristine());
        assert_eq!(log.messages()[0].role, Role::System);
        assert_eq!(log.messages()[0].content, "Welcome!");
    }

    #[test]
    fn append_stamps_time_and_keeps_order() {
        let mut log = log();
        let a = log.next_id();
        let b = log.next_id();
        assert!(b > a);
        log.append(Message::text(a, Role::User, "first"));
        log.append(Message::text(b, Role::Assistant, "second"));
        let contents: Vec<_> = log.messages().iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["Welcome!", "first", "second"]);
        let time = log.last().unwrap().time.clone().unwrap();
        assert_eq!(time.len(), 5);
        assert_eq!(&time[2..3], ":");
    }

    #[test]
    fn remove_by_id_removes_first_match_without_renumbering() {
        let mut log = log();
        log.append(Message::text(10, Role::User, "a"));
        log.append(Message::text(20, Role::User, "b"));
        log.append(Message::text(20, Role::User, "c"));
        log.append(Message::text(30, Role::User, "d"));

        let removed = log.remove_by_id(20).unwrap();
        assert_eq!(removed.content, "b");
        let ids: Vec<_> = log.messages().iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![GREETING_ID, 10, 20, 30]);
        assert!(log.remove_by_id(99).is_none());
    }

    #[test]
    fn remove_last_and_reset() {
        let mut log = log();
        log.append(Message::text(10, Role::User, "a"));
        assert_eq!(log.remove_last().unwrap().content, "a");
        log.append(Message::text(11, Role::User, "b"));
        log.reset();
        assert!(log.is_pristine());
    }

    #[test]
    fn ids_are_monotonic_after_explicit_append() {
        let mut log = log();
        log.append(Message::text(u64::MAX / 2, Role::User, "future"));
        assert!(log.next_id() > u64::MAX / 2);
    }

    #[test]
    fn history_keeps_only_text_turns() {
        let mut log = log();
        log.append(Message::text(10, Role::User, "hi"));
        log.append(Message::text(11, Role::Assistant, "hello"));
        log.append(Message::error(12, "oops"));
        log.append(Message::transaction(13, "0xhash"));
        let mut img = Message::text(14, Role::Assistant, "pic");
        img.kind = MessageKind::Image;
        log.append(img);

        let history = log.history();
        assert_eq!(
            history,
            vec![
                HistoryTurn {
                    role: "user".into(),
                    content: "hi".into()
                },
                HistoryTurn {
                    role: "assistant".into(),
                    content: "hello".into()
                },
            ]
        );
    }

    #[test]
    fn random_mutation_sequences_preserve_order_and_ids() {
        // Deterministic pseudo-random walk over append/remove operations.
        let mut log = log();
        let mut appended = vec![GREETING_ID];
        let mut seed: u64 = 0x2545_F491_4F6C_DD1D;
        for step in 0..500u64 {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            match seed % 3 {
                0 => {
                    let id = 100 + step;
                    appended.push(id);
                    log.append(Message::text(id, Role::User, format!("m{step}")));
                }
                1 => {
                    if let Some(victim) = log.messages().get((seed as usize) % (log.len().max(1))) {
                        let id = victim.id;
                        log.remove_by_id(id);
                    }
                }
                _ => {
                    log.remove_last();
                }
            }

            let ids: Vec<u64> = log.messages().iter().map(|m| m.id).collect();
            assert!(ids.iter().all(|id| appended.contains(id)));
            let positions: Vec<usize> = ids
                .iter()
                .map(|id| appended.iter().position(|a| a == id).unwrap())
                .collect();
            assert!(positions.windows(2).all(|w| w[0] < w[1]));
        }
    }
}

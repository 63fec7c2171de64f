//! # Coach Conversation
//!
//! Message history for the AI coach panel, with an explicit append-only
//! buffer for the single in-progress reply. Fragments accumulate in the
//! buffer and are swapped into the message list atomically on completion
//! or failure; the list itself never holds a partial message.

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opening message shown before the user says anything
pub const GREETING: &str =
    "I am the Apex AI Coach. Ready to build an elite physique? Ask me anything \
     about training, nutrition, or your stack.";

/// Canned reply committed when a streamed response fails mid-flight
pub const FAILURE_NOTICE: &str =
    "Error connecting to the coaching mainframe. Check your connection and try again.";

/// Who authored a message
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Coach,
}

/// A committed conversation message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    fn now(role: ChatRole, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}

/// The coach conversation for one session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
    /// Accumulator for the reply currently being streamed, if any
    pending: Option<String>,
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

impl Conversation {
    /// Start a fresh conversation with the coach greeting
    pub fn new() -> Self {
        Self {
            messages: vec![ChatMessage::now(ChatRole::Coach, GREETING)],
            pending: None,
        }
    }

    /// Committed messages, oldest first. Never includes the pending reply.
    pub fn history(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Whether a reply is currently being accumulated
    pub fn is_typing(&self) -> bool {
        self.pending.is_some()
    }

    /// Commit the user message and open the reply buffer. Rejected while a
    /// previous reply is still in progress; the caller's send control is
    /// expected to be disabled, this guard is the backstop.
    pub fn begin_reply(&mut self, user_text: &str) -> Result<()> {
        if self.pending.is_some() {
            bail!("A coach reply is already in progress");
        }
        self.messages.push(ChatMessage::now(ChatRole::User, user_text));
        self.pending = Some(String::new());
        Ok(())
    }

    /// Append a streamed fragment to the in-progress reply
    pub fn push_fragment(&mut self, fragment: &str) -> Result<()> {
        match self.pending.as_mut() {
            Some(buffer) => {
                buffer.push_str(fragment);
                Ok(())
            }
            None => bail!("No coach reply in progress"),
        }
    }

    /// Accumulated text of the in-progress reply, if any
    pub fn pending_text(&self) -> Option<&str> {
        self.pending.as_deref()
    }

    /// Swap the accumulated reply into the message list as one coach
    /// message. Returns the full reply text.
    pub fn finish_reply(&mut self) -> Result<String> {
        match self.pending.take() {
            Some(full) => {
                self.messages.push(ChatMessage::now(ChatRole::Coach, full.clone()));
                Ok(full)
            }
            None => bail!("No coach reply in progress"),
        }
    }

    /// Discard the partial reply and commit the failure notice in its
    /// place. History before the failed exchange is untouched.
    pub fn fail_reply(&mut self) -> Result<()> {
        if self.pending.take().is_none() {
            bail!("No coach reply in progress");
        }
        self.messages
            .push(ChatMessage::now(ChatRole::Coach, FAILURE_NOTICE));
        Ok(())
    }

    /// Back to the initial greeting-only state
    pub fn reset(&mut self) {
        *self = Conversation::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_with_greeting() {
        let conversation = Conversation::new();
        assert_eq!(conversation.history().len(), 1);
        assert_eq!(conversation.history()[0].role, ChatRole::Coach);
        assert_eq!(conversation.history()[0].text, GREETING);
        assert!(!conversation.is_typing());
    }

    #[test]
    fn test_fragments_accumulate_and_swap_on_finish() {
        let mut conversation = Conversation::new();
        conversation.begin_reply("How much protein?").unwrap();
        assert!(conversation.is_typing());
        assert_eq!(conversation.history().len(), 2, "user message committed");

        conversation.push_fragment("Aim for ").unwrap();
        conversation.push_fragment("2g per kg").unwrap();
        conversation.push_fragment(" of bodyweight.").unwrap();
        assert_eq!(
            conversation.pending_text(),
            Some("Aim for 2g per kg of bodyweight.")
        );
        // Still nothing committed for the coach side of this exchange.
        assert_eq!(conversation.history().len(), 2);

        let full = conversation.finish_reply().unwrap();
        assert_eq!(full, "Aim for 2g per kg of bodyweight.");
        assert!(!conversation.is_typing());
        assert_eq!(conversation.history().len(), 3);
        assert_eq!(conversation.history()[2].role, ChatRole::Coach);
        assert_eq!(conversation.history()[2].text, full);
    }

    #[test]
    fn test_second_request_rejected_while_typing() {
        let mut conversation = Conversation::new();
        conversation.begin_reply("first").unwrap();
        assert!(conversation.begin_reply("second").is_err());
        // The rejected message must not leak into history.
        assert_eq!(conversation.history().len(), 2);
    }

    #[test]
    fn test_failure_discards_partial_and_keeps_history() {
        let mut conversation = Conversation::new();
        conversation.begin_reply("one").unwrap();
        conversation.push_fragment("reply one").unwrap();
        conversation.finish_reply().unwrap();

        conversation.begin_reply("two").unwrap();
        conversation.push_fragment("partial ans").unwrap();
        conversation.fail_reply().unwrap();

        let history = conversation.history();
        assert!(!conversation.is_typing());
        // greeting, user one, reply one, user two, failure notice
        assert_eq!(history.len(), 5);
        assert_eq!(history[2].text, "reply one");
        assert_eq!(history[4].text, FAILURE_NOTICE);
        assert!(!history.iter().any(|m| m.text.contains("partial ans")));
    }

    #[test]
    fn test_fragment_and_finish_require_open_reply() {
        let mut conversation = Conversation::new();
        assert!(conversation.push_fragment("x").is_err());
        assert!(conversation.finish_reply().is_err());
        assert!(conversation.fail_reply().is_err());
    }

    #[test]
    fn test_reset_returns_to_greeting() {
        let mut conversation = Conversation::new();
        conversation.begin_reply("hello").unwrap();
        conversation.push_fragment("hi").unwrap();
        conversation.reset();

        assert_eq!(conversation.history().len(), 1);
        assert!(!conversation.is_typing());
    }
}

use serde::{Deserialize, Serialize};

use crate::walk::{infer_stage, Stage, StageTracker};

/// Who said it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One committed transcript entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Transcript state for one session: the committed log, the two pending
/// buffers and the visible stage.
///
/// Commit points are turn completion, interruption and teardown. A pending
/// buffer is only committed when it has non-whitespace content.
#[derive(Debug, Default)]
pub struct Conversation {
    messages: Vec<Message>,
    pending_user: String,
    pending_ai: String,
    stage: StageTracker,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_user_delta(&mut self, text: &str) {
        self.pending_user.push_str(text);
    }

    /// Append AI text; returns the new stage if the in-flight text advanced it
    pub fn push_ai_delta(&mut self, text: &str) -> Option<Stage> {
        self.pending_ai.push_str(text);
        self.refresh_stage()
    }

    fn take_pending(buffer: &mut String, role: Role) -> Option<Message> {
        let text = std::mem::take(buffer);
        let trimmed = text.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Message::new(role, trimmed))
        }
    }

    fn commit(&mut self, user: bool, ai: bool) -> Vec<Message> {
        let mut committed = Vec::with_capacity(2);
        if user {
            committed.extend(Self::take_pending(&mut self.pending_user, Role::User));
        }
        if ai {
            committed.extend(Self::take_pending(&mut self.pending_ai, Role::Assistant));
        }
        self.messages.extend(committed.iter().cloned());
        committed
    }

    /// Turn boundary: user text then AI text
    pub fn commit_turn(&mut self) -> Vec<Message> {
        self.commit(true, true)
    }

    /// Barge-in: keep the partial AI text, leave the user buffer alone
    pub fn commit_interrupted(&mut self) -> Vec<Message> {
        self.commit(false, true)
    }

    /// Teardown: nothing accumulated may be lost
    pub fn flush(&mut self) -> Vec<Message> {
        self.commit(true, true)
    }

    /// Re-run inference over the log plus in-flight AI text
    pub fn refresh_stage(&mut self) -> Option<Stage> {
        let in_flight = Some(self.pending_ai.as_str());
        let inferred = infer_stage(&self.messages, in_flight);
        self.stage.observe(inferred)
    }

    /// Conversation-complete signal overrides keyword inference
    pub fn complete(&mut self) -> Option<Stage> {
        self.stage.complete()
    }

    pub fn stage(&self) -> Stage {
        self.stage.current()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn pending_user(&self) -> &str {
        &self.pending_user
    }

    pub fn pending_ai(&self) -> &str {
        &self.pending_ai
    }

    /// Plain-text recap: `ROLE: content` blocks separated by blank lines
    pub fn summary(&self) -> String {
        self.messages
            .iter()
            .map(|m| format!("{}: {}", m.role.as_str().to_uppercase(), m.content))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

use serde::Serialize;
use thiserror::Error;

use super::persona::{OPENING_LINE, PERSONA_INSTRUCTIONS};

/// Who produced a turn. Serialized with the names the Gemini API expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

/// One role-tagged text unit of the conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    role: Role,
    text: String,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            text: text.into(),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("cannot append a {0:?} turn with empty text")]
    EmptyText(Role),
}

/// Append-only conversation history.
///
/// Always starts with the persona instructions followed by the opening line,
/// and only ever grows from there.
pub struct ConversationState {
    turns: Vec<Turn>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::with_seed(PERSONA_INSTRUCTIONS, OPENING_LINE)
    }

    pub fn with_seed(persona: &str, opening_line: &str) -> Self {
        Self {
            turns: vec![Turn::user(persona), Turn::model(opening_line)],
        }
    }

    pub fn append(&mut self, turn: Turn) -> Result<(), StoreError> {
        if turn.text.is_empty() {
            return Err(StoreError::EmptyText(turn.role));
        }
        self.turns.push(turn);
        Ok(())
    }

    pub fn add_user_message(&mut self, message: &str) -> Result<(), StoreError> {
        self.append(Turn::user(message))
    }

    pub fn add_model_message(&mut self, message: &str) -> Result<(), StoreError> {
        self.append(Turn::model(message))
    }

    /// The full history in chronological order.
    pub fn snapshot(&self) -> &[Turn] {
        &self.turns
    }

    /// Text of the seeded model turn, shown as the greeting.
    pub fn opening_line(&self) -> &str {
        &self.turns[1].text
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Always false: the seed turns are never removed.
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

impl Default for ConversationState {
    fn default() -> Self {
        Self::new()
    }
}

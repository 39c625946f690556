use crate::ai::ChatMessage;
use crate::db::QueryResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<QueryResult>,
    /// Why the SQL in this turn could not be run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Turn {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            results: None,
            error: None,
            created_at: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// The conversation of one session. The first turn is always the system
/// prompt, which is sent to the model but never displayed.
#[derive(Debug, Clone)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            turns: vec![Turn::new(Role::System, system_prompt)],
        }
    }

    /// Returns false and records nothing for blank input.
    pub fn push_user(&mut self, input: &str) -> bool {
        if input.trim().is_empty() {
            return false;
        }
        self.turns.push(Turn::new(Role::User, input));
        true
    }

    pub fn push_assistant(&mut self, mut turn: Turn) -> &Turn {
        turn.role = Role::Assistant;
        self.turns.push(turn);
        &self.turns[self.turns.len() - 1]
    }

    pub fn needs_reply(&self) -> bool {
        self.turns
            .last()
            .map_or(true, |turn| turn.role != Role::Assistant)
    }

    /// User and assistant turns, in order.
    pub fn visible(&self) -> &[Turn] {
        &self.turns[1..]
    }

    pub fn system_prompt(&self) -> &str {
        &self.turns[0].content
    }

    /// The whole transcript as role/content pairs for the model.
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.turns
            .iter()
            .map(|turn| ChatMessage {
                role: turn.role,
                content: turn.content.clone(),
            })
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.turns.len()
    }
}

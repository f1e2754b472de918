use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Ordered conversation turns of one study session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionTranscript {
    pub session_id: String,
    pub turns: Vec<Turn>,
}

impl SessionTranscript {
    pub fn new(session_id: impl Into<String>, turns: Vec<Turn>) -> Self {
        Self {
            session_id: session_id.into(),
            turns,
        }
    }

    /// User and assistant turns; system prompts are not counted.
    pub fn message_count(&self) -> u32 {
        self.turns.iter().filter(|t| t.role != Role::System).count() as u32
    }

    pub fn assistant_replies(&self) -> usize {
        self.turns.iter().filter(|t| t.role == Role::Assistant).count()
    }

    /// Renders the conversation as `role: content` lines, skipping blank turns.
    pub fn render(&self) -> String {
        self.turns
            .iter()
            .filter(|t| !t.content.trim().is_empty())
            .map(|t| format!("{}: {}", t.role.as_str(), t.content.trim()))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_count_skips_system_turns() {
        let transcript = SessionTranscript::new(
            "s-1",
            vec![
                Turn::new(Role::System, "You are a tutor."),
                Turn::new(Role::User, "What is a logarithm?"),
                Turn::new(Role::Assistant, "The inverse of exponentiation."),
            ],
        );
        assert_eq!(transcript.message_count(), 2);
        assert_eq!(transcript.assistant_replies(), 1);
    }

    #[test]
    fn test_render_skips_blank_turns() {
        let transcript = SessionTranscript::new(
            "s-2",
            vec![
                Turn::new(Role::User, "  hi  "),
                Turn::new(Role::Assistant, "   "),
            ],
        );
        assert_eq!(transcript.render(), "user: hi");
    }

    #[test]
    fn test_role_deserializes_snake_case() {
        let turn: Turn = serde_json::from_str(r#"{"role":"assistant","content":"ok"}"#).unwrap();
        assert_eq!(turn.role, Role::Assistant);
    }
}

//! Clarification questions and answers.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Sentinel option key meaning "decide for me at plan time".
pub const AUTO_ANSWER: &str = "_auto";

/// One selectable answer to a clarification question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClarificationOption {
    pub key: String,
    pub label: String,
    #[serde(default)]
    pub description: String,
}

/// A multiple-choice question the agent needs answered before planning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClarificationQuestion {
    pub id: Uuid,
    pub question: String,
    #[serde(default)]
    pub context: Option<String>,
    pub options: Vec<ClarificationOption>,
}

/// An answer: a selected option key, the auto sentinel, or a custom value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClarificationAnswer {
    pub question_id: Uuid,
    pub selected_option: String,
    #[serde(default)]
    pub custom_value: Option<String>,
}

impl ClarificationAnswer {
    pub fn selected(question_id: Uuid, key: impl Into<String>) -> Self {
        Self {
            question_id,
            selected_option: key.into(),
            custom_value: None,
        }
    }

    pub fn custom(question_id: Uuid, value: impl Into<String>) -> Self {
        Self {
            question_id,
            selected_option: "custom".into(),
            custom_value: Some(value.into()),
        }
    }

    pub fn auto(question_id: Uuid) -> Self {
        Self::selected(question_id, AUTO_ANSWER)
    }

    /// True when the agent should decide at plan time.
    pub fn is_auto(&self) -> bool {
        self.selected_option == AUTO_ANSWER
    }
}

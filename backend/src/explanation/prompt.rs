use serde::{Deserialize, Serialize};

use super::conditions::{ConditionInfo, NOT_AVAILABLE};

pub const INITIAL_USER_MESSAGE: &str = "Please explain my scan results to me.";

const INITIAL_INSTRUCTIONS: &str = "Provide a clear, compassionate explanation of these results to the patient, explaining the condition in simple terms, discussing potential next steps, and offering reassurance where appropriate. Be informative but not alarming.";

const CHAT_INSTRUCTIONS: &str = "Answer the patient's question clearly and compassionately. Provide accurate medical information in simple terms.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    InitialExplanation,
    FollowUp,
}

pub fn build_system_prompt(
    organ: &str,
    prediction: &str,
    info: Option<&ConditionInfo>,
    kind: PromptKind,
) -> String {
    let field = |value: Option<&String>| value.map(String::as_str).unwrap_or(NOT_AVAILABLE).to_string();
    let (description, symptoms, treatment, prognosis) = match info {
        Some(info) => (
            field(info.description.as_ref()),
            field(info.symptoms.as_ref()),
            field(info.treatment.as_ref()),
            field(info.prognosis.as_ref()),
        ),
        None => (
            NOT_AVAILABLE.to_string(),
            NOT_AVAILABLE.to_string(),
            NOT_AVAILABLE.to_string(),
            NOT_AVAILABLE.to_string(),
        ),
    };
    let instructions = match kind {
        PromptKind::InitialExplanation => INITIAL_INSTRUCTIONS,
        PromptKind::FollowUp => CHAT_INSTRUCTIONS,
    };

    format!(
        "You are MedAI Vision's medical consultant, a helpful and compassionate AI doctor explaining {organ} scan results to a patient.

The scan shows: {prediction}

Medical Information:
- Description: {description}
- Common Symptoms: {symptoms}
- Treatment Options: {treatment}
- Prognosis: {prognosis}

{instructions}
"
    )
}

pub fn build_messages(system_prompt: String, user_message: &str) -> Vec<ChatMessage> {
    vec![ChatMessage::system(system_prompt), ChatMessage::user(user_message)]
}

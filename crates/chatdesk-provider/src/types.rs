use chatdesk_schema::ChatMessage;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LlmMessage {
    pub role: String,
    pub content: String,
}

impl LlmMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: "assistant".into(),
            content: text.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmRequest {
    pub model: String,
    pub system: Option<String>,
    pub messages: Vec<LlmMessage>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

pub fn default_max_tokens() -> u32 {
    2048
}

impl LlmRequest {
    /// Build a completion request from a stored session log.
    ///
    /// Only "user" and "assistant" turns are forwarded; other roles (such as
    /// stored system notes) are display-only. The fixed instruction goes in
    /// `system`.
    pub fn from_history(
        model: impl Into<String>,
        system: Option<String>,
        history: &[ChatMessage],
        max_tokens: u32,
    ) -> Self {
        let messages = history
            .iter()
            .filter_map(|msg| match msg.role.as_str() {
                "user" => Some(LlmMessage::user(msg.content.clone())),
                "assistant" => Some(LlmMessage::assistant(msg.content.clone())),
                _ => None,
            })
            .collect();
        Self {
            model: model.into(),
            system,
            messages,
            max_tokens,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    pub text: String,
    pub input_tokens: Option<u32>,
    pub output_tokens: Option<u32>,
    pub stop_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChunk {
    pub delta: String,
    pub is_final: bool,
    pub input_tokens: Option<u32>,
    pub output_tokens: Option<u32>,
    pub stop_reason: Option<String>,
}

impl StreamChunk {
    pub fn delta(text: impl Into<String>) -> Self {
        Self {
            delta: text.into(),
            is_final: false,
            input_tokens: None,
            output_tokens: None,
            stop_reason: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_history_keeps_order_and_drops_other_roles() {
        let history = vec![
            ChatMessage::system("pinned note"),
            ChatMessage::user("hi"),
            ChatMessage::assistant("hello"),
            ChatMessage::new("tool", "ignored"),
            ChatMessage::user("how are you?"),
        ];
        let req = LlmRequest::from_history("gpt-4o", Some("be helpful".into()), &history, 512);

        assert_eq!(req.model, "gpt-4o");
        assert_eq!(req.system.as_deref(), Some("be helpful"));
        assert_eq!(req.max_tokens, 512);
        assert_eq!(
            req.messages,
            vec![
                LlmMessage::user("hi"),
                LlmMessage::assistant("hello"),
                LlmMessage::user("how are you?"),
            ]
        );
    }

    #[test]
    fn llm_request_max_tokens_defaults_when_missing() {
        let req: LlmRequest = serde_json::from_value(serde_json::json!({
            "model": "m",
            "system": null,
            "messages": []
        }))
        .unwrap();
        assert_eq!(req.max_tokens, 2048);
    }
}

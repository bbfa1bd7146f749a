use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One message of a chat-completion request. Unknown sibling fields
/// (`name`, tool fields, ...) ride along in `extra` so a passthrough call
/// can forward them untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<MessageContent>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Message content on the wire is either a plain string or a list of typed
/// parts (vision-style payloads).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentPart {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChatMessage {
    /// Flatten the content to a single string: text parts are joined with a
    /// single space, non-text parts are dropped. Some backends reject
    /// list-form content outright, so normalization always happens before a
    /// passthrough call.
    pub fn content_text(&self) -> String {
        match &self.content {
            None => String::new(),
            Some(MessageContent::Text(text)) => text.clone(),
            Some(MessageContent::Parts(parts)) => parts
                .iter()
                .filter(|part| part.kind == "text")
                .map(|part| part.text.clone().unwrap_or_default())
                .collect::<Vec<_>>()
                .join(" "),
        }
    }

    /// Copy of the message with its content flattened to a string.
    pub fn normalized(&self) -> ChatMessage {
        ChatMessage {
            role: self.role.clone(),
            content: Some(MessageContent::Text(self.content_text())),
            extra: self.extra.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionResponse {
    pub model: String,
    pub choices: Vec<Choice>,
    pub usage: Usage,
}

#[derive(Debug, Clone, Serialize)]
pub struct Choice {
    pub index: usize,
    pub message: AssistantMessage,
    pub finish_reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssistantMessage {
    pub role: String,
    pub content: String,
}

impl AssistantMessage {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Usage {
    pub completion_tokens: u64,
}

impl ChatCompletionResponse {
    /// Assemble the non-streaming completion body: one choice per content
    /// element, index equal to position, finish reason always "stop".
    pub fn from_contents(model: impl Into<String>, contents: Vec<String>, completion_tokens: u64) -> Self {
        let choices = contents
            .into_iter()
            .enumerate()
            .map(|(index, content)| Choice {
                index,
                message: AssistantMessage::new(content),
                finish_reason: "stop".to_string(),
            })
            .collect();
        Self {
            model: model.into(),
            choices,
            usage: Usage { completion_tokens },
        }
    }
}

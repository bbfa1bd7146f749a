//! Structured conversation model plus the legacy tagged-text codec.
//!
//! Strategy implementations are opaque collaborators that shuttle
//! intermediate state as a single string with `User:` / `Assistant:`
//! markers. Internally the gateway works on [`Turn`] values and only
//! encodes/decodes at the strategy boundary.

use crate::chat::ChatMessage;

pub const APPROACH_TAG_OPEN: &str = "<optigate_approach>";
pub const APPROACH_TAG_CLOSE: &str = "</optigate_approach>";

const USER_MARKER: &str = "User:";
const ASSISTANT_MARKER: &str = "Assistant:";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
        }
    }
}

/// Encode turns into the legacy tagged string fed to strategies.
pub fn encode_tagged(turns: &[Turn]) -> String {
    turns
        .iter()
        .map(|turn| match turn.role {
            Role::User => format!("{USER_MARKER} {}", turn.text),
            Role::Assistant => format!("{ASSISTANT_MARKER} {}", turn.text),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Decode a tagged string back into turns. Returns `None` when the text
/// carries no marker at all, so callers can pass untagged output through
/// byte-identical. Text before the first marker is discarded.
pub fn decode_tagged(text: &str) -> Option<Vec<Turn>> {
    if !text.contains(USER_MARKER) && !text.contains(ASSISTANT_MARKER) {
        return None;
    }

    let trimmed = text.trim();
    let mut marks: Vec<(usize, Role, usize)> = Vec::new();
    let mut at = 0;
    while at < trimmed.len() {
        let rest = &trimmed[at..];
        if rest.starts_with(USER_MARKER) {
            marks.push((at, Role::User, USER_MARKER.len()));
            at += USER_MARKER.len();
        } else if rest.starts_with(ASSISTANT_MARKER) {
            marks.push((at, Role::Assistant, ASSISTANT_MARKER.len()));
            at += ASSISTANT_MARKER.len();
        } else {
            let Some(step) = rest.chars().next() else {
                break;
            };
            at += step.len_utf8();
        }
    }

    let mut turns = Vec::with_capacity(marks.len());
    for (index, (start, role, marker_len)) in marks.iter().enumerate() {
        let end = marks.get(index + 1).map(|next| next.0).unwrap_or(trimmed.len());
        let content = trimmed[start + marker_len..end].trim();
        turns.push(Turn {
            role: *role,
            text: content.to_string(),
        });
    }
    Some(turns)
}

/// Reduce a strategy's final output to the user-facing answer: when the
/// text is a tagged transcript, keep only the last assistant turn (falling
/// back to the last turn when no assistant turn exists); untagged text is
/// returned unchanged.
pub fn final_answer(text: &str) -> String {
    let Some(turns) = decode_tagged(text) else {
        return text.to_string();
    };
    turns
        .iter()
        .rev()
        .find(|turn| turn.role == Role::Assistant)
        .or(turns.last())
        .map(|turn| turn.text.clone())
        .unwrap_or_else(|| text.to_string())
}

/// Pull an `<optigate_approach>slug</optigate_approach>` directive out of
/// prompt text. Every tag span is removed from the returned text; the first
/// non-empty slug wins.
pub fn extract_approach_tag(text: &str) -> (String, Option<String>) {
    let mut cleaned = text.to_string();
    let mut approach = None;
    loop {
        let Some(open) = cleaned.find(APPROACH_TAG_OPEN) else {
            break;
        };
        let value_start = open + APPROACH_TAG_OPEN.len();
        let Some(close) = cleaned[value_start..].find(APPROACH_TAG_CLOSE) else {
            break;
        };
        let value = cleaned[value_start..value_start + close].trim().to_string();
        if approach.is_none() && !value.is_empty() {
            approach = Some(value);
        }
        cleaned.replace_range(open..value_start + close + APPROACH_TAG_CLOSE.len(), "");
    }
    (cleaned.trim().to_string(), approach)
}

/// Split request messages into the system prompt, the structured
/// conversation, and any embedded approach directive. The directive is
/// looked for in the system message and, while none was found yet, in each
/// user message; assistant text is never inspected.
pub fn parse_conversation(messages: &[ChatMessage]) -> (String, Vec<Turn>, Option<String>) {
    let mut system_prompt = String::new();
    let mut turns = Vec::new();
    let mut approach: Option<String> = None;

    for message in messages {
        let text = message.content_text();
        match message.role.as_str() {
            "system" => {
                let (cleaned, found) = extract_approach_tag(&text);
                system_prompt = cleaned;
                approach = found;
            }
            "user" => {
                if approach.is_none() {
                    let (cleaned, found) = extract_approach_tag(&text);
                    approach = found;
                    turns.push(Turn::user(cleaned));
                } else {
                    turns.push(Turn::user(text));
                }
            }
            "assistant" => turns.push(Turn::assistant(text)),
            _ => {}
        }
    }

    (system_prompt, turns, approach)
}

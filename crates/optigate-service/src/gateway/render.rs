use optigate_core::chat::ChatCompletionResponse;
use optigate_core::conversation;
use optigate_core::GatewayError;
use serde_json::{json, Value};
use tiny_http::{Header, Request, Response};

use super::combinator::AggregateBody;

/// First-choice message contents of a backend response (or of a list of
/// responses), used when a raw passthrough result has to be re-rendered
/// as stream frames.
pub(crate) fn extract_contents(response: &Value) -> Vec<String> {
    let responses: Vec<&Value> = match response {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    };
    responses
        .into_iter()
        .filter_map(|item| {
            item.get("choices")
                .and_then(Value::as_array)
                .and_then(|choices| choices.first())
                .and_then(|choice| choice.get("message"))
                .and_then(|message| message.get("content"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .collect()
}

/// Boundary normalization of strategy output: tagged transcripts reduce to
/// their last assistant turn, untagged text passes through unchanged. Each
/// list element is treated independently.
pub(crate) fn normalize_aggregate(aggregate: AggregateBody) -> AggregateBody {
    match aggregate {
        AggregateBody::Single(text) => AggregateBody::Single(conversation::final_answer(&text)),
        AggregateBody::Many(items) => AggregateBody::Many(
            items
                .iter()
                .map(|item| conversation::final_answer(item))
                .collect(),
        ),
    }
}

pub(crate) fn aggregate_contents(aggregate: &AggregateBody) -> Vec<String> {
    match aggregate {
        AggregateBody::Single(text) => vec![text.clone()],
        AggregateBody::Many(items) => items.clone(),
    }
}

/// Non-streaming completion body.
pub(crate) fn completion_body(
    model: &str,
    aggregate: &AggregateBody,
    completion_tokens: u64,
) -> Value {
    let response =
        ChatCompletionResponse::from_contents(model, aggregate_contents(aggregate), completion_tokens);
    serde_json::to_value(response).unwrap_or_else(|_| json!({}))
}

/// Event-stream body: one frame per content element carrying the whole
/// element as a single delta, then exactly one `[DONE]` sentinel. Clients
/// built for token streaming see one big chunk per choice; that framing
/// is load-bearing for compatibility.
pub(crate) fn sse_body(model: &str, contents: &[String]) -> String {
    let mut out = String::new();
    for (index, content) in contents.iter().enumerate() {
        let frame = json!({
            "choices": [{"delta": {"content": content}, "index": index, "finish_reason": "stop"}],
            "model": model,
        });
        out.push_str("data: ");
        out.push_str(&frame.to_string());
        out.push_str("\n\n");
    }
    out.push_str("data: [DONE]\n\n");
    out
}

pub(crate) fn respond_json(request: Request, status: u16, body: &Value) -> Result<(), String> {
    let mut response = Response::from_string(body.to_string()).with_status_code(status);
    if let Ok(content_type) = Header::from_bytes(b"Content-Type".as_slice(), b"application/json".as_slice()) {
        response = response.with_header(content_type);
    }
    let _ = request.respond(response);
    Ok(())
}

pub(crate) fn respond_error(request: Request, err: &GatewayError) -> Result<(), String> {
    log::error!("gateway request failed: {err}");
    respond_json(request, err.status_code(), &json!({"error": err.to_string()}))
}

pub(crate) fn respond_sse(request: Request, body: String) -> Result<(), String> {
    let mut response = Response::from_string(body);
    if let Ok(content_type) = Header::from_bytes(b"Content-Type".as_slice(), b"text/event-stream".as_slice()) {
        response = response.with_header(content_type);
    }
    let _ = request.respond(response);
    Ok(())
}

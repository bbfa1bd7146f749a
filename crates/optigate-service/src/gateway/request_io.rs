use std::io::Read;

use optigate_core::chat::ChatMessage;
use optigate_core::conversation;
use optigate_core::{GatewayError, GatewayResult};
use serde_json::{json, Map, Value};
use tiny_http::Request;

use crate::config::GatewayConfig;

use super::dispatch::ProxyRequestParts;

/// Body fields the gateway core consumes itself; everything else becomes
/// the strategy tuning map.
const EXPLICIT_KEYS: &[&str] = &["stream", "messages", "model", "n", "response_format"];

/// Fields never forwarded on a `none` passthrough call.
const PASSTHROUGH_EXCLUDED: &[&str] = &["model", "messages", "stream", "optigate_approach"];

pub(crate) struct PreparedChatRequest {
    pub model: String,
    pub n: u32,
    pub stream: bool,
    pub system_prompt: String,
    /// Conversation encoded in the legacy tagged form strategies consume.
    pub query: String,
    pub request_config: Map<String, Value>,
    pub parts: ProxyRequestParts,
    pub caller_bearer: Option<String>,
    pub trace_id: String,
}

pub(crate) fn prepare_chat_request(
    request: &mut Request,
    config: &GatewayConfig,
) -> GatewayResult<PreparedChatRequest> {
    // 中文注释：先把请求体读完再做任何判断，避免客户端写流未结束时被提前断开。
    let mut body = Vec::new();
    let _ = request.as_reader().read_to_end(&mut body);
    let caller_bearer = super::auth::bearer_token(request);

    let data = serde_json::from_slice::<Value>(&body)
        .ok()
        .and_then(|value| value.as_object().cloned())
        .ok_or_else(|| GatewayError::InvalidRequest("body must be a JSON object".to_string()))?;

    prepare_from_fields(data, caller_bearer, config)
}

fn prepare_from_fields(
    data: Map<String, Value>,
    caller_bearer: Option<String>,
    config: &GatewayConfig,
) -> GatewayResult<PreparedChatRequest> {
    let messages: Vec<ChatMessage> = match data.get("messages") {
        Some(value) => serde_json::from_value(value.clone())
            .map_err(|err| GatewayError::InvalidRequest(format!("malformed messages: {err}")))?,
        None => Vec::new(),
    };
    let stream = data.get("stream").and_then(Value::as_bool).unwrap_or(false);
    let n = data
        .get("n")
        .and_then(Value::as_u64)
        .and_then(|value| u32::try_from(value).ok())
        .unwrap_or(config.defaults.n);
    let mut model = data
        .get("model")
        .and_then(Value::as_str)
        .unwrap_or(&config.default_model)
        .to_string();

    let (system_prompt, turns, message_approach) = conversation::parse_conversation(&messages);

    // selection precedence: message tag, then request field, then server default
    let field_approach = data
        .get("optigate_approach")
        .and_then(Value::as_str)
        .map(str::to_string);
    let approach = message_approach
        .or(field_approach)
        .unwrap_or_else(|| config.default_approach.clone());
    if approach != "auto" {
        model = format!("{approach}-{model}");
    }

    let query = conversation::encode_tagged(&turns);

    let mut request_config = Map::new();
    for (key, value) in &data {
        if !EXPLICIT_KEYS.contains(&key.as_str()) {
            request_config.insert(key.clone(), value.clone());
        }
    }
    request_config.insert("stream".to_string(), json!(stream));
    request_config.insert("n".to_string(), json!(n));
    request_config.insert(
        "response_format".to_string(),
        data.get("response_format").cloned().unwrap_or(Value::Null),
    );

    let mut passthrough = Map::new();
    for (key, value) in &data {
        if !PASSTHROUGH_EXCLUDED.contains(&key.as_str()) {
            passthrough.insert(key.clone(), value.clone());
        }
    }

    Ok(PreparedChatRequest {
        model,
        n,
        stream,
        system_prompt,
        query,
        request_config,
        parts: ProxyRequestParts {
            messages,
            passthrough,
        },
        caller_bearer,
        trace_id: format!("{:016x}", rand::random::<u64>()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prepare(body: Value) -> PreparedChatRequest {
        let data = body.as_object().cloned().expect("object");
        prepare_from_fields(data, None, &GatewayConfig::default()).expect("prepared")
    }

    #[test]
    fn conversation_is_flattened_into_the_tagged_query() {
        let prepared = prepare(json!({
            "model": "gpt-4o-mini",
            "messages": [
                {"role": "system", "content": "be helpful"},
                {"role": "user", "content": "hi"},
                {"role": "assistant", "content": "hello"},
                {"role": "user", "content": "how are you"}
            ]
        }));
        assert_eq!(prepared.system_prompt, "be helpful");
        assert_eq!(
            prepared.query,
            "User: hi\nAssistant: hello\nUser: how are you"
        );
        assert_eq!(prepared.model, "gpt-4o-mini");
    }

    #[test]
    fn message_tag_overrides_the_selection_field() {
        let prepared = prepare(json!({
            "model": "gpt-4o-mini",
            "optigate_approach": "bon",
            "messages": [
                {"role": "user", "content": "<optigate_approach>moa</optigate_approach>solve"}
            ]
        }));
        assert_eq!(prepared.model, "moa-gpt-4o-mini");
        assert_eq!(prepared.query, "User: solve");
    }

    #[test]
    fn selection_field_prefixes_the_model() {
        let prepared = prepare(json!({
            "model": "gpt-4o-mini",
            "optigate_approach": "leap",
            "messages": [{"role": "user", "content": "q"}]
        }));
        assert_eq!(prepared.model, "leap-gpt-4o-mini");
    }

    #[test]
    fn auto_selection_leaves_the_model_untouched() {
        let prepared = prepare(json!({
            "model": "moa-gpt-4o-mini",
            "optigate_approach": "auto",
            "messages": [{"role": "user", "content": "q"}]
        }));
        assert_eq!(prepared.model, "moa-gpt-4o-mini");
    }

    #[test]
    fn tuning_map_keeps_open_fields_and_reserved_set_is_split() {
        let prepared = prepare(json!({
            "model": "m",
            "messages": [{"role": "user", "content": "q"}],
            "stream": true,
            "n": 2,
            "temperature": 0.4,
            "response_format": {"type": "json_object"}
        }));
        assert!(prepared.stream);
        assert_eq!(prepared.n, 2);
        assert_eq!(prepared.request_config["temperature"], json!(0.4));
        assert_eq!(prepared.request_config["stream"], json!(true));
        assert_eq!(prepared.request_config["n"], json!(2));
        assert_eq!(
            prepared.request_config["response_format"]["type"],
            "json_object"
        );
        assert!(prepared.request_config.get("messages").is_none());
        assert!(prepared.request_config.get("model").is_none());

        // passthrough map for `none` keeps n/temperature, drops the rest
        assert!(prepared.parts.passthrough.get("model").is_none());
        assert!(prepared.parts.passthrough.get("stream").is_none());
        assert_eq!(prepared.parts.passthrough["n"], json!(2));
        assert_eq!(prepared.parts.passthrough["temperature"], json!(0.4));
    }

    #[test]
    fn defaults_fill_missing_model_and_n() {
        let prepared = prepare(json!({
            "messages": [{"role": "user", "content": "q"}]
        }));
        assert_eq!(prepared.model, "gpt-4o-mini");
        assert_eq!(prepared.n, 1);
        assert!(!prepared.stream);
    }
}

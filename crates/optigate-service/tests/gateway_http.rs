//! End-to-end pipeline tests: a real gateway instance on a loopback port
//! talking to a stub upstream that replays one canned completion.

use std::io::Read;
use std::thread;

use serde_json::{json, Value};

use optigate_service::config::GatewayConfig;
use optigate_service::{start_server, StrategyRegistry};

fn canned_completion() -> Value {
    json!({
        "id": "chatcmpl-stub",
        "object": "chat.completion",
        "model": "gpt-4o-mini",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": "stub answer"},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 2, "completion_tokens": 5, "total_tokens": 7}
    })
}

/// Upstream stub answering every request with the same JSON body.
fn start_stub_upstream(reply: Value) -> String {
    let server = tiny_http::Server::http("127.0.0.1:0").expect("bind stub");
    let addr = server
        .server_addr()
        .to_ip()
        .expect("stub addr")
        .to_string();
    thread::spawn(move || {
        for mut request in server.incoming_requests() {
            let mut body = Vec::new();
            let _ = request.as_reader().read_to_end(&mut body);
            let header = tiny_http::Header::from_bytes(
                b"Content-Type".as_slice(),
                b"application/json".as_slice(),
            )
            .expect("header");
            let response =
                tiny_http::Response::from_string(reply.to_string()).with_header(header);
            let _ = request.respond(response);
        }
    });
    addr
}

fn start_gateway(stub_addr: &str, operator_key: Option<&str>) -> String {
    let config = GatewayConfig {
        addr: "127.0.0.1:0".to_string(),
        base_url: format!("http://{stub_addr}/v1"),
        backend_api_key: Some("sk-test".to_string()),
        operator_key: operator_key.map(str::to_string),
        ..GatewayConfig::default()
    };
    let handle = start_server(config, StrategyRegistry::load()).expect("start gateway");
    handle.addr
}

#[test]
fn none_passthrough_returns_the_upstream_body_verbatim() {
    let stub = start_stub_upstream(canned_completion());
    let gateway = start_gateway(&stub, None);

    let response = reqwest::blocking::Client::new()
        .post(format!("http://{gateway}/v1/chat/completions"))
        .json(&json!({
            "model": "gpt-4o-mini",
            "messages": [{"role": "user", "content": "hi"}],
            "temperature": 0.1
        }))
        .send()
        .expect("send");
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().expect("json");
    assert_eq!(body, canned_completion());
}

#[test]
fn strategy_response_is_rendered_in_completion_shape() {
    let stub = start_stub_upstream(canned_completion());
    let gateway = start_gateway(&stub, None);

    let response = reqwest::blocking::Client::new()
        .post(format!("http://{gateway}/v1/chat/completions"))
        .json(&json!({
            "model": "re2-gpt-4o-mini",
            "messages": [{"role": "user", "content": "what is 2+2"}]
        }))
        .send()
        .expect("send");
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().expect("json");
    assert_eq!(body["model"], "gpt-4o-mini");
    assert_eq!(body["choices"][0]["message"]["content"], "stub answer");
    assert_eq!(body["choices"][0]["finish_reason"], "stop");
    assert_eq!(body["usage"]["completion_tokens"], 5);
}

#[test]
fn streaming_emits_whole_result_frames_and_a_sentinel() {
    let stub = start_stub_upstream(canned_completion());
    let gateway = start_gateway(&stub, None);

    let response = reqwest::blocking::Client::new()
        .post(format!("http://{gateway}/v1/chat/completions"))
        .json(&json!({
            "model": "re2-gpt-4o-mini",
            "stream": true,
            "messages": [{"role": "user", "content": "q"}]
        }))
        .send()
        .expect("send");
    assert_eq!(response.status().as_u16(), 200);
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.starts_with("text/event-stream"));

    let body = response.text().expect("body");
    let frames: Vec<&str> = body.split("\n\n").filter(|chunk| !chunk.is_empty()).collect();
    assert_eq!(frames.len(), 2);
    let first: Value =
        serde_json::from_str(frames[0].strip_prefix("data: ").expect("prefix")).expect("json");
    assert_eq!(first["choices"][0]["delta"]["content"], "stub answer");
    assert_eq!(first["choices"][0]["index"], 0);
    assert_eq!(first["choices"][0]["finish_reason"], "stop");
    assert_eq!(frames[1], "data: [DONE]");
}

#[test]
fn passthrough_streaming_renders_frames_from_choice_contents() {
    let stub = start_stub_upstream(canned_completion());
    let gateway = start_gateway(&stub, None);

    let response = reqwest::blocking::Client::new()
        .post(format!("http://{gateway}/v1/chat/completions"))
        .json(&json!({
            "model": "gpt-4o-mini",
            "stream": true,
            "messages": [{"role": "user", "content": "hi"}]
        }))
        .send()
        .expect("send");
    assert_eq!(response.status().as_u16(), 200);

    let body = response.text().expect("body");
    let frames: Vec<&str> = body.split("\n\n").filter(|chunk| !chunk.is_empty()).collect();
    assert_eq!(frames.len(), 2);
    let first: Value =
        serde_json::from_str(frames[0].strip_prefix("data: ").expect("prefix")).expect("json");
    assert_eq!(first["choices"][0]["delta"]["content"], "stub answer");
    assert_eq!(frames[1], "data: [DONE]");
}

#[test]
fn invalid_combination_surfaces_as_a_json_error() {
    let stub = start_stub_upstream(canned_completion());
    let gateway = start_gateway(&stub, None);

    let response = reqwest::blocking::Client::new()
        .post(format!("http://{gateway}/v1/chat/completions"))
        .json(&json!({
            "model": "none&moa-gpt-4o-mini",
            "messages": [{"role": "user", "content": "q"}]
        }))
        .send()
        .expect("send");
    assert_eq!(response.status().as_u16(), 500);
    let body: Value = response.json().expect("json");
    assert!(body["error"]
        .as_str()
        .expect("error message")
        .contains("cannot be combined"));
}

#[test]
fn unknown_approach_inside_a_fanout_surfaces_as_a_json_error() {
    let stub = start_stub_upstream(canned_completion());
    let gateway = start_gateway(&stub, None);

    let response = reqwest::blocking::Client::new()
        .post(format!("http://{gateway}/v1/chat/completions"))
        .json(&json!({
            "model": "re2|nope-gpt-4o-mini",
            "messages": [{"role": "user", "content": "q"}]
        }))
        .send()
        .expect("send");
    assert_eq!(response.status().as_u16(), 500);
    let body: Value = response.json().expect("json");
    assert!(body["error"]
        .as_str()
        .expect("error message")
        .contains("unknown approach"));
}

#[test]
fn operator_key_gates_every_endpoint_except_health() {
    let stub = start_stub_upstream(canned_completion());
    let gateway = start_gateway(&stub, Some("top-secret"));
    let client = reqwest::blocking::Client::new();
    let chat_body = json!({
        "model": "gpt-4o-mini",
        "messages": [{"role": "user", "content": "hi"}]
    });

    let missing = client
        .post(format!("http://{gateway}/v1/chat/completions"))
        .json(&chat_body)
        .send()
        .expect("send");
    assert_eq!(missing.status().as_u16(), 401);
    let body: Value = missing.json().expect("json");
    assert!(body["error"].as_str().expect("error").contains("Authorization"));

    let wrong = client
        .post(format!("http://{gateway}/v1/chat/completions"))
        .bearer_auth("wrong-key")
        .json(&chat_body)
        .send()
        .expect("send");
    assert_eq!(wrong.status().as_u16(), 401);

    let correct = client
        .post(format!("http://{gateway}/v1/chat/completions"))
        .bearer_auth("top-secret")
        .json(&chat_body)
        .send()
        .expect("send");
    assert_eq!(correct.status().as_u16(), 200);

    let health = client
        .get(format!("http://{gateway}/health"))
        .send()
        .expect("send");
    assert_eq!(health.status().as_u16(), 200);
    let body: Value = health.json().expect("json");
    assert_eq!(body["status"], "ok");
}

#[test]
fn models_listing_is_passed_through() {
    let stub = start_stub_upstream(json!({
        "object": "list",
        "data": [{"id": "gpt-4o-mini", "object": "model"}]
    }));
    let gateway = start_gateway(&stub, None);

    let response = reqwest::blocking::Client::new()
        .get(format!("http://{gateway}/v1/models"))
        .send()
        .expect("send");
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().expect("json");
    assert_eq!(body["data"][0]["id"], "gpt-4o-mini");
}

#[test]
fn repetition_count_produces_one_choice_per_run() {
    let stub = start_stub_upstream(canned_completion());
    let gateway = start_gateway(&stub, None);

    let response = reqwest::blocking::Client::new()
        .post(format!("http://{gateway}/v1/chat/completions"))
        .json(&json!({
            "model": "re2-gpt-4o-mini",
            "n": 3,
            "messages": [{"role": "user", "content": "q"}]
        }))
        .send()
        .expect("send");
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().expect("json");
    let choices = body["choices"].as_array().expect("choices");
    assert_eq!(choices.len(), 3);
    for (index, choice) in choices.iter().enumerate() {
        assert_eq!(choice["index"], index);
        assert_eq!(choice["message"]["content"], "stub answer");
    }
    assert_eq!(body["usage"]["completion_tokens"], 15);
}

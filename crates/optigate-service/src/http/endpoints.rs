use std::sync::Arc;

use serde_json::json;
use tiny_http::{Header, Request, Response};

use crate::gateway::{self, GatewayState};

pub(crate) fn route_request(request: Request, state: &Arc<GatewayState>) {
    let method = request.method().as_str().to_string();
    let path = request
        .url()
        .split('?')
        .next()
        .unwrap_or("/")
        .to_string();

    // 中文注释：健康检查必须绕过鉴权；探活方不持有 operator key。
    if method == "GET" && path == "/health" {
        let _ = gateway::respond_json(request, 200, &json!({"status": "ok"}));
        return;
    }
    if method == "OPTIONS" {
        let _ = request.respond(Response::empty(204));
        return;
    }

    let bearer = gateway::auth::bearer_token(&request);
    if let Err(err) = gateway::auth::check_operator_key(bearer.as_deref(), &state.config) {
        let _ = gateway::respond_error(request, &err);
        return;
    }

    let result = match (method.as_str(), path.as_str()) {
        ("POST", "/v1/chat/completions" | "/chat/completions") => {
            gateway::handle_chat_completions(request, state)
        }
        ("GET", "/v1/models" | "/models") => gateway::handle_models(request, state),
        ("GET", "/metrics") => handle_metrics(request),
        _ => gateway::respond_json(request, 404, &json!({"error": "not found"})),
    };
    if let Err(err) = result {
        log::error!("gateway request error: {err}");
    }
}

fn handle_metrics(request: Request) -> Result<(), String> {
    let body = gateway::metrics::gateway_metrics_prometheus();
    let mut response = Response::from_string(body);
    if let Ok(content_type) =
        Header::from_bytes(b"Content-Type".as_slice(), b"text/plain; version=0.0.4".as_slice())
    {
        response = response.with_header(content_type);
    }
    let _ = request.respond(response);
    Ok(())
}

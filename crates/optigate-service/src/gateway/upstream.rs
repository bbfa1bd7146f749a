use std::sync::Arc;
use std::sync::OnceLock;
use std::time::Duration;

use optigate_core::{GatewayError, GatewayResult};
use reqwest::blocking::Client;
use serde_json::Value;
use url::Url;

use crate::config::GatewayConfig;

const DEFAULT_UPSTREAM_CONNECT_TIMEOUT_SECS: u64 = 15;
const ENV_UPSTREAM_CONNECT_TIMEOUT_SECS: &str = "OPTIGATE_UPSTREAM_CONNECT_TIMEOUT_SECS";

static UPSTREAM_CLIENT: OnceLock<Client> = OnceLock::new();

/// Opaque handle to a chat-completion backend. Strategies and the gateway
/// only ever see this seam; tests script it.
pub trait ChatBackend: Send + Sync {
    fn chat_completion(&self, body: &Value) -> GatewayResult<Value>;
    fn list_models(&self) -> GatewayResult<Value>;
}

pub(crate) fn upstream_client() -> &'static Client {
    UPSTREAM_CLIENT.get_or_init(|| {
        Client::builder()
            // 中文注释：策略链路单次上游调用可能分钟级；显式关闭总超时，只保留连接超时。
            .timeout(None::<Duration>)
            .connect_timeout(upstream_connect_timeout())
            .pool_max_idle_per_host(32)
            .pool_idle_timeout(Some(Duration::from_secs(90)))
            .tcp_keepalive(Some(Duration::from_secs(30)))
            .build()
            .unwrap_or_else(|_| Client::new())
    })
}

fn upstream_connect_timeout() -> Duration {
    Duration::from_secs(env_u64_or(
        ENV_UPSTREAM_CONNECT_TIMEOUT_SECS,
        DEFAULT_UPSTREAM_CONNECT_TIMEOUT_SECS,
    ))
}

fn env_u64_or(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(default)
}

/// OpenAI-compatible backend over the shared blocking client.
pub struct OpenAiBackend {
    base_url: String,
    api_key: String,
}

impl OpenAiBackend {
    pub fn new(base_url: &str, api_key: &str) -> GatewayResult<Self> {
        Ok(Self {
            base_url: normalize_base_url(base_url)?,
            api_key: api_key.to_string(),
        })
    }

    fn request_json(
        &self,
        builder: reqwest::blocking::RequestBuilder,
    ) -> GatewayResult<Value> {
        let response = builder
            .bearer_auth(&self.api_key)
            .send()
            .map_err(|err| {
                super::metrics::record_upstream_failure();
                GatewayError::Upstream(err.to_string())
            })?;

        let status = response.status();
        let text = response.text().map_err(|err| {
            super::metrics::record_upstream_failure();
            GatewayError::Upstream(err.to_string())
        })?;
        if !status.is_success() {
            super::metrics::record_upstream_failure();
            return Err(GatewayError::Upstream(format!(
                "status {}: {}",
                status.as_u16(),
                text.trim()
            )));
        }
        serde_json::from_str(&text).map_err(|err| {
            super::metrics::record_upstream_failure();
            GatewayError::Upstream(format!("malformed upstream body: {err}"))
        })
    }
}

impl ChatBackend for OpenAiBackend {
    fn chat_completion(&self, body: &Value) -> GatewayResult<Value> {
        let url = format!("{}/chat/completions", self.base_url);
        self.request_json(upstream_client().post(url).json(body))
    }

    fn list_models(&self) -> GatewayResult<Value> {
        let url = format!("{}/models", self.base_url);
        self.request_json(upstream_client().get(url))
    }
}

/// Pick the backend for one request: a caller bearer that looks like a
/// provider key (`sk-...`) replaces the configured server credential, the
/// way a passthrough proxy lets callers bring their own key.
pub(crate) fn resolve_backend(
    config: &GatewayConfig,
    caller_bearer: Option<&str>,
) -> GatewayResult<Arc<dyn ChatBackend>> {
    if let Some(bearer) = caller_bearer {
        if bearer.starts_with("sk-") {
            return Ok(Arc::new(OpenAiBackend::new(&config.base_url, bearer)?));
        }
    }
    let Some(api_key) = config.backend_api_key.as_deref() else {
        return Err(GatewayError::Configuration(
            "set OPENAI_API_KEY or send a provider bearer key".to_string(),
        ));
    };
    Ok(Arc::new(OpenAiBackend::new(&config.base_url, api_key)?))
}

fn normalize_base_url(raw: &str) -> GatewayResult<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    let parsed = Url::parse(trimmed)
        .map_err(|err| GatewayError::Configuration(format!("invalid base url '{raw}': {err}")))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(GatewayError::Configuration(format!(
            "invalid base url '{raw}': unsupported scheme"
        )));
    }
    Ok(trimmed.to_string())
}

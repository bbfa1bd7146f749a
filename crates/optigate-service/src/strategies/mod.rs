//! Strategy calling surface: the context every strategy receives, the
//! reply shape every strategy produces, and the descriptor extensions
//! register themselves with.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use optigate_core::{GatewayError, GatewayResult};
use serde_json::{json, Map, Value};

use crate::gateway::upstream::ChatBackend;

pub(crate) mod bon;
pub(crate) mod cot_reflection;
pub(crate) mod leap;
pub(crate) mod mcts;
pub(crate) mod moa;
pub(crate) mod plansearch;
pub mod plugins;
pub(crate) mod re2;
pub(crate) mod rto;
pub(crate) mod self_consistency;

/// Open set of request fields forwarded verbatim as strategy tuning
/// overrides.
pub type RequestConfig = Map<String, Value>;

/// Per-invocation input. Immutable for the duration of one strategy call.
#[derive(Clone)]
pub struct StrategyContext {
    pub system_prompt: String,
    pub query: String,
    pub backend: Arc<dyn ChatBackend>,
    pub model: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyBody {
    Single(String),
    Many(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyReply {
    pub body: ReplyBody,
    pub completion_tokens: u64,
}

impl StrategyReply {
    pub fn single(text: impl Into<String>, completion_tokens: u64) -> Self {
        Self {
            body: ReplyBody::Single(text.into()),
            completion_tokens,
        }
    }

    pub fn many(items: Vec<String>, completion_tokens: u64) -> Self {
        Self {
            body: ReplyBody::Many(items),
            completion_tokens,
        }
    }
}

pub type BoxedStrategyFuture =
    Pin<Box<dyn Future<Output = GatewayResult<StrategyReply>> + Send + 'static>>;

/// Calling convention of a registered extension, declared once at
/// registration. Nothing is re-inspected per call.
#[derive(Clone)]
pub enum StrategyHandler {
    Sync(Arc<dyn Fn(&StrategyContext) -> GatewayResult<StrategyReply> + Send + Sync>),
    SyncWithConfig(
        Arc<dyn Fn(&StrategyContext, &RequestConfig) -> GatewayResult<StrategyReply> + Send + Sync>,
    ),
    Async(Arc<dyn Fn(StrategyContext, RequestConfig) -> BoxedStrategyFuture + Send + Sync>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginSource {
    Bundled,
    Local,
}

/// Link-time extension descriptor. Bundled descriptors ship with this
/// crate; an embedding binary submits `Local` descriptors, which override
/// bundled ones of the same slug on the next registry rebuild.
pub struct StrategyPlugin {
    pub slug: &'static str,
    pub source: PluginSource,
    pub entry: PluginEntry,
}

pub enum PluginEntry {
    Sync(fn(&StrategyContext) -> GatewayResult<StrategyReply>),
    SyncWithConfig(fn(&StrategyContext, &RequestConfig) -> GatewayResult<StrategyReply>),
    Async(fn(StrategyContext, RequestConfig) -> BoxedStrategyFuture),
}

inventory::collect!(StrategyPlugin);

impl PluginEntry {
    pub(crate) fn to_handler(&self) -> StrategyHandler {
        match self {
            PluginEntry::Sync(entry) => StrategyHandler::Sync(Arc::new(*entry)),
            PluginEntry::SyncWithConfig(entry) => StrategyHandler::SyncWithConfig(Arc::new(*entry)),
            PluginEntry::Async(entry) => StrategyHandler::Async(Arc::new(*entry)),
        }
    }
}

/// One backend call, first choice text. Fails when the backend answers
/// with no choices.
pub(crate) fn chat_once(
    ctx: &StrategyContext,
    system: &str,
    user: &str,
    params: Option<&Map<String, Value>>,
) -> GatewayResult<(String, u64)> {
    let (mut texts, tokens) = chat_request(ctx, system, user, params)?;
    if texts.is_empty() {
        return Err(GatewayError::Upstream(
            "upstream returned no choices".to_string(),
        ));
    }
    Ok((texts.remove(0), tokens))
}

/// One backend call sampling `n` choices at the given temperature.
pub(crate) fn chat_sample(
    ctx: &StrategyContext,
    system: &str,
    user: &str,
    n: u32,
    temperature: f64,
) -> GatewayResult<(Vec<String>, u64)> {
    let mut params = Map::new();
    params.insert("n".to_string(), json!(n));
    params.insert("temperature".to_string(), json!(temperature));
    let (texts, tokens) = chat_request(ctx, system, user, Some(&params))?;
    if texts.is_empty() {
        return Err(GatewayError::Upstream(
            "upstream returned no choices".to_string(),
        ));
    }
    Ok((texts, tokens))
}

fn chat_request(
    ctx: &StrategyContext,
    system: &str,
    user: &str,
    params: Option<&Map<String, Value>>,
) -> GatewayResult<(Vec<String>, u64)> {
    let mut body = json!({
        "model": ctx.model,
        "messages": [
            {"role": "system", "content": system},
            {"role": "user", "content": user}
        ]
    });
    if let (Some(extra), Some(object)) = (params, body.as_object_mut()) {
        for (key, value) in extra {
            object.insert(key.clone(), value.clone());
        }
    }

    let response = ctx.backend.chat_completion(&body)?;
    let texts = response
        .get("choices")
        .and_then(Value::as_array)
        .map(|choices| {
            choices
                .iter()
                .filter_map(|choice| {
                    choice
                        .get("message")
                        .and_then(|message| message.get("content"))
                        .and_then(Value::as_str)
                        .map(str::to_string)
                })
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    let tokens = response
        .get("usage")
        .and_then(|usage| usage.get("completion_tokens"))
        .and_then(Value::as_u64)
        .unwrap_or(0);
    Ok((texts, tokens))
}

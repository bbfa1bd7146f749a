use std::sync::OnceLock;

use optigate_core::chat::ChatMessage;
use optigate_core::{GatewayError, GatewayResult};
use serde_json::{json, Map, Value};
use tokio::runtime::Runtime;

use crate::config::StrategyDefaults;
use crate::strategies::{self, RequestConfig, StrategyContext, StrategyHandler, StrategyReply};

use super::registry::StrategyRegistry;

/// Built-in approach slugs, in the order they ship.
pub(crate) const KNOWN_APPROACHES: &[&str] = &[
    "none",
    "mcts",
    "bon",
    "moa",
    "rto",
    "self_consistency",
    "cot_reflection",
    "plansearch",
    "leap",
    "re2",
];

/// What one approach invocation produced: `Raw` is the untouched backend
/// response of the `none` passthrough, everything else is a strategy
/// reply.
pub(crate) enum DispatchOutput {
    Raw(Value),
    Reply(StrategyReply),
}

/// Original request material the `none` passthrough forwards: the caller's
/// message list and every body field that is not consumed by the gateway
/// itself (`model`, `messages`, `stream`, `optigate_approach`).
pub(crate) struct ProxyRequestParts {
    pub messages: Vec<ChatMessage>,
    pub passthrough: Map<String, Value>,
}

/// Invoke one approach under its calling convention and return its result
/// with the token count attributed at this layer. The passthrough slug
/// reports zero — the backend's own usage figure is embedded in the raw
/// response it returns.
pub(crate) fn execute_single_approach(
    approach: &str,
    ctx: &StrategyContext,
    defaults: &StrategyDefaults,
    request_config: &RequestConfig,
    registry: &StrategyRegistry,
    parts: &ProxyRequestParts,
) -> GatewayResult<(DispatchOutput, u64)> {
    super::metrics::record_strategy_execution();
    let result = dispatch(approach, ctx, defaults, request_config, registry, parts);
    if result.is_err() {
        super::metrics::record_strategy_failure();
    }
    result
}

fn dispatch(
    approach: &str,
    ctx: &StrategyContext,
    defaults: &StrategyDefaults,
    request_config: &RequestConfig,
    registry: &StrategyRegistry,
    parts: &ProxyRequestParts,
) -> GatewayResult<(DispatchOutput, u64)> {
    if KNOWN_APPROACHES.contains(&approach) {
        let knobs = defaults.with_request_overrides(request_config);
        let reply = match approach {
            "none" => {
                return proxy_through(ctx, parts).map(|value| (DispatchOutput::Raw(value), 0));
            }
            "mcts" => strategies::mcts::chat_with_mcts(
                ctx,
                knobs.mcts_simulations,
                knobs.mcts_exploration,
                knobs.mcts_depth,
            )?,
            "bon" => strategies::bon::best_of_n_sampling(ctx, knobs.best_of_n)?,
            "moa" => strategies::moa::mixture_of_agents(ctx)?,
            "rto" => strategies::rto::round_trip_optimization(ctx)?,
            "self_consistency" => strategies::self_consistency::advanced_self_consistency(ctx)?,
            "cot_reflection" => {
                strategies::cot_reflection::cot_reflection(ctx, knobs.return_full_response)?
            }
            "plansearch" => strategies::plansearch::plansearch(ctx, knobs.n)?,
            "leap" => strategies::leap::leap(ctx)?,
            "re2" => strategies::re2::re2_approach(ctx, knobs.n)?,
            _ => return Err(GatewayError::UnknownApproach(approach.to_string())),
        };
        let tokens = reply.completion_tokens;
        return Ok((DispatchOutput::Reply(reply), tokens));
    }

    if let Some(entry) = registry.resolve(approach) {
        let reply = match &entry.handler {
            StrategyHandler::Sync(run) => run(ctx)?,
            StrategyHandler::SyncWithConfig(run) => run(ctx, request_config)?,
            StrategyHandler::Async(run) => {
                strategy_runtime()?.block_on(run(ctx.clone(), request_config.clone()))?
            }
        };
        let tokens = reply.completion_tokens;
        return Ok((DispatchOutput::Reply(reply), tokens));
    }

    Err(GatewayError::UnknownApproach(approach.to_string()))
}

/// Direct proxy: forward the caller's conversation and parameters to the
/// backend untouched, with message content flattened to plain strings.
fn proxy_through(ctx: &StrategyContext, parts: &ProxyRequestParts) -> GatewayResult<Value> {
    let model = ctx.model.strip_prefix("none-").unwrap_or(&ctx.model);

    let mut messages = Vec::with_capacity(parts.messages.len());
    for message in &parts.messages {
        let value = serde_json::to_value(message.normalized())
            .map_err(|err| GatewayError::Upstream(format!("message encoding failed: {err}")))?;
        messages.push(value);
    }

    let mut body = Map::new();
    body.insert("model".to_string(), json!(model));
    body.insert("messages".to_string(), Value::Array(messages));
    for (key, value) in &parts.passthrough {
        body.insert(key.clone(), value.clone());
    }
    ctx.backend.chat_completion(&Value::Object(body))
}

/// Shared executor for async extensions. One runtime for the process;
/// every call still owns its context and future, nothing is reused across
/// calls.
fn strategy_runtime() -> GatewayResult<&'static Runtime> {
    static STRATEGY_RUNTIME: OnceLock<Option<Runtime>> = OnceLock::new();
    let runtime = STRATEGY_RUNTIME.get_or_init(|| {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("optigate-ext")
            .enable_all()
            .build()
            .map_err(|err| log::error!("async strategy runtime unavailable: {err}"))
            .ok()
    });
    runtime.as_ref().ok_or_else(|| {
        GatewayError::Configuration("async strategy runtime unavailable".to_string())
    })
}

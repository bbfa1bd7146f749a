use optigate_core::GatewayError;
use tiny_http::Request;

use crate::config::GatewayConfig;
use crate::strategies::StrategyContext;

pub(crate) mod auth;
mod combinator;
pub(crate) mod dispatch;
pub(crate) mod metrics;
mod model_spec;
pub mod registry;
mod render;
mod request_io;
pub mod upstream;

use dispatch::DispatchOutput;
use model_spec::CombineOperator;
use registry::StrategyRegistry;

pub(crate) use render::{respond_error, respond_json};

/// Everything a request worker needs, built once at startup and shared
/// read-only across workers.
pub struct GatewayState {
    pub config: GatewayConfig,
    pub registry: StrategyRegistry,
}

impl GatewayState {
    pub fn new(config: GatewayConfig, registry: StrategyRegistry) -> Self {
        if config.backend_api_key.is_none() {
            log::warn!("no backend credential configured; only caller-supplied provider keys will work");
        }
        Self { config, registry }
    }
}

pub(crate) fn handle_chat_completions(
    mut request: Request,
    state: &GatewayState,
) -> Result<(), String> {
    let _request_guard = metrics::begin_gateway_request();

    let prepared = match request_io::prepare_chat_request(&mut request, &state.config) {
        Ok(prepared) => prepared,
        Err(err) => return respond_error(request, &err),
    };
    let backend = match upstream::resolve_backend(&state.config, prepared.caller_bearer.as_deref())
    {
        Ok(backend) => backend,
        Err(err) => return respond_error(request, &err),
    };

    let spec = model_spec::parse_composite_model(&prepared.model, &state.registry);
    log::info!(
        "[{}] approaches {:?}, operation {:?}, model {}",
        prepared.trace_id,
        spec.approaches,
        spec.operator,
        spec.model
    );

    let ctx = StrategyContext {
        system_prompt: prepared.system_prompt.clone(),
        query: prepared.query.clone(),
        backend,
        model: spec.model.clone(),
    };

    // direct passthrough: the backend's own response shape goes out as-is
    if spec.operator == CombineOperator::Single
        && spec.approaches.first().map(String::as_str) == Some("none")
    {
        return match dispatch::execute_single_approach(
            "none",
            &ctx,
            &state.config.defaults,
            &prepared.request_config,
            &state.registry,
            &prepared.parts,
        ) {
            Ok((DispatchOutput::Raw(value), _)) => {
                if prepared.stream {
                    let contents = render::extract_contents(&value);
                    render::respond_sse(request, render::sse_body(&spec.model, &contents))
                } else {
                    respond_json(request, 200, &value)
                }
            }
            Ok((DispatchOutput::Reply(_), _)) => respond_error(
                request,
                &GatewayError::Upstream("passthrough produced no raw response".to_string()),
            ),
            Err(err) => respond_error(request, &err),
        };
    }

    let (aggregate, completion_tokens) = match combinator::execute_n_times(
        prepared.n,
        &spec,
        &ctx,
        &state.config.defaults,
        &prepared.request_config,
        &state.registry,
        &prepared.parts,
    ) {
        Ok(result) => result,
        Err(err) => return respond_error(request, &err),
    };

    let aggregate = render::normalize_aggregate(aggregate);
    if prepared.stream {
        let contents = render::aggregate_contents(&aggregate);
        render::respond_sse(request, render::sse_body(&spec.model, &contents))
    } else {
        respond_json(
            request,
            200,
            &render::completion_body(&spec.model, &aggregate, completion_tokens),
        )
    }
}

/// Passthrough listing from the configured backend.
pub(crate) fn handle_models(request: Request, state: &GatewayState) -> Result<(), String> {
    let backend = match upstream::resolve_backend(&state.config, None) {
        Ok(backend) => backend,
        Err(err) => return respond_error(request, &err),
    };
    match backend.list_models() {
        Ok(listing) => respond_json(request, 200, &listing),
        Err(err) => respond_error(request, &err),
    }
}

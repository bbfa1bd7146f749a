use optigate_core::{GatewayError, GatewayResult};

use crate::config::StrategyDefaults;
use crate::strategies::{ReplyBody, RequestConfig, StrategyContext};

use super::dispatch::{self, DispatchOutput, ProxyRequestParts};
use super::model_spec::{CombineOperator, CompositeModelSpec};
use super::registry::StrategyRegistry;

/// Aggregate produced by repeating one combinator unit. `Single` is the
/// collapsed N=1/one-result case; `Many` keeps the flattened order of
/// every produced content element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum AggregateBody {
    Single(String),
    Many(Vec<String>),
}

/// Execute the combinator unit (SINGLE / AND / OR) exactly `n` times with
/// identical inputs and aggregate the results. A unit result that is
/// itself a list is spliced flat into the aggregate, never nested. Token
/// counts accumulate across repetitions; the first error from any branch
/// or repetition aborts the whole request, nothing is retried.
pub(crate) fn execute_n_times(
    n: u32,
    spec: &CompositeModelSpec,
    ctx: &StrategyContext,
    defaults: &StrategyDefaults,
    request_config: &RequestConfig,
    registry: &StrategyRegistry,
    parts: &ProxyRequestParts,
) -> GatewayResult<(AggregateBody, u64)> {
    if spec.operator != CombineOperator::Single
        && spec.approaches.iter().any(|approach| approach == "none")
    {
        return Err(GatewayError::InvalidCombination);
    }
    if spec.approaches.is_empty() {
        return Err(GatewayError::InvalidCombination);
    }

    let runs = n.max(1);
    let mut responses: Vec<String> = Vec::new();
    let mut total_tokens = 0u64;

    for _ in 0..runs {
        let (body, tokens) = match spec.operator {
            CombineOperator::Single => run_single(spec, ctx, defaults, request_config, registry, parts)?,
            CombineOperator::And => run_sequential(spec, ctx, defaults, request_config, registry, parts)?,
            CombineOperator::Or => run_parallel(spec, ctx, defaults, request_config, registry, parts)?,
        };
        total_tokens += tokens;
        match body {
            ReplyBody::Single(text) => responses.push(text),
            ReplyBody::Many(items) => responses.extend(items),
        }
    }

    if runs == 1 && responses.len() == 1 {
        let Some(text) = responses.pop() else {
            return Err(GatewayError::InvalidCombination);
        };
        return Ok((AggregateBody::Single(text), total_tokens));
    }
    Ok((AggregateBody::Many(responses), total_tokens))
}

fn run_single(
    spec: &CompositeModelSpec,
    ctx: &StrategyContext,
    defaults: &StrategyDefaults,
    request_config: &RequestConfig,
    registry: &StrategyRegistry,
    parts: &ProxyRequestParts,
) -> GatewayResult<(ReplyBody, u64)> {
    let Some(approach) = spec.approaches.first() else {
        return Err(GatewayError::InvalidCombination);
    };
    let (output, tokens) =
        dispatch::execute_single_approach(approach, ctx, defaults, request_config, registry, parts)?;
    Ok((body_of(output), tokens))
}

/// Sequential pipeline: strategy i's output text becomes strategy i+1's
/// query; system prompt and model stay fixed for the whole chain.
fn run_sequential(
    spec: &CompositeModelSpec,
    ctx: &StrategyContext,
    defaults: &StrategyDefaults,
    request_config: &RequestConfig,
    registry: &StrategyRegistry,
    parts: &ProxyRequestParts,
) -> GatewayResult<(ReplyBody, u64)> {
    let mut query = ctx.query.clone();
    let mut total_tokens = 0u64;
    let mut last_body = None;

    for approach in &spec.approaches {
        let step_ctx = StrategyContext {
            query: query.clone(),
            ..ctx.clone()
        };
        let (output, tokens) = dispatch::execute_single_approach(
            approach,
            &step_ctx,
            defaults,
            request_config,
            registry,
            parts,
        )?;
        total_tokens += tokens;
        let body = body_of(output);
        query = pipe_text(&body);
        last_body = Some(body);
    }

    match last_body {
        Some(body) => Ok((body, total_tokens)),
        None => Err(GatewayError::InvalidCombination),
    }
}

/// Concurrent fan-out: every approach gets the original query, all
/// branches run to completion, results keep the input order. One failed
/// branch fails the whole unit and the other branches' results are
/// discarded.
fn run_parallel(
    spec: &CompositeModelSpec,
    ctx: &StrategyContext,
    defaults: &StrategyDefaults,
    request_config: &RequestConfig,
    registry: &StrategyRegistry,
    parts: &ProxyRequestParts,
) -> GatewayResult<(ReplyBody, u64)> {
    let branch_results: Vec<GatewayResult<(DispatchOutput, u64)>> = std::thread::scope(|scope| {
        let handles: Vec<_> = spec
            .approaches
            .iter()
            .map(|approach| {
                let step_ctx = ctx.clone();
                scope.spawn(move || {
                    dispatch::execute_single_approach(
                        approach,
                        &step_ctx,
                        defaults,
                        request_config,
                        registry,
                        parts,
                    )
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| {
                handle.join().unwrap_or_else(|_| {
                    Err(GatewayError::Upstream("strategy worker panicked".to_string()))
                })
            })
            .collect()
    });

    let mut items = Vec::with_capacity(branch_results.len());
    let mut total_tokens = 0u64;
    for result in branch_results {
        let (output, tokens) = result?;
        total_tokens += tokens;
        match body_of(output) {
            ReplyBody::Single(text) => items.push(text),
            ReplyBody::Many(more) => items.extend(more),
        }
    }
    Ok((ReplyBody::Many(items), total_tokens))
}

fn body_of(output: DispatchOutput) -> ReplyBody {
    match output {
        DispatchOutput::Reply(reply) => reply.body,
        // a raw passthrough response reaching the combinator is reduced to
        // its choice contents, mirroring the streaming extraction path
        DispatchOutput::Raw(value) => ReplyBody::Many(super::render::extract_contents(&value)),
    }
}

fn pipe_text(body: &ReplyBody) -> String {
    match body {
        ReplyBody::Single(text) => text.clone(),
        ReplyBody::Many(items) => items.join("\n"),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::Map;

    use crate::strategies::test_support::ScriptedBackend;
    use crate::strategies::{StrategyHandler, StrategyReply};

    use super::*;

    fn registry_with_stubs() -> StrategyRegistry {
        let registry = StrategyRegistry::load();
        registry.register_local(
            "tag_a",
            StrategyHandler::Sync(Arc::new(|ctx: &StrategyContext| {
                Ok(StrategyReply::single(format!("A({})", ctx.query), 7))
            })),
        );
        registry.register_local(
            "tag_b",
            StrategyHandler::Sync(Arc::new(|ctx: &StrategyContext| {
                Ok(StrategyReply::single(format!("B({})", ctx.query), 11))
            })),
        );
        registry.register_local(
            "slow_first",
            StrategyHandler::Sync(Arc::new(|_ctx: &StrategyContext| {
                std::thread::sleep(Duration::from_millis(120));
                Ok(StrategyReply::single("first", 1))
            })),
        );
        registry.register_local(
            "fast_second",
            StrategyHandler::Sync(Arc::new(|_ctx: &StrategyContext| {
                Ok(StrategyReply::single("second", 1))
            })),
        );
        registry.register_local(
            "mid_third",
            StrategyHandler::Sync(Arc::new(|_ctx: &StrategyContext| {
                std::thread::sleep(Duration::from_millis(40));
                Ok(StrategyReply::single("third", 1))
            })),
        );
        registry.register_local(
            "fails",
            StrategyHandler::Sync(Arc::new(|_ctx: &StrategyContext| {
                Err(GatewayError::Upstream("boom".to_string()))
            })),
        );
        registry.register_local(
            "pair",
            StrategyHandler::Sync(Arc::new(|_ctx: &StrategyContext| {
                Ok(StrategyReply::many(vec!["x".to_string(), "y".to_string()], 2))
            })),
        );
        registry
    }

    fn context() -> StrategyContext {
        StrategyContext {
            system_prompt: "sys".to_string(),
            query: "q".to_string(),
            backend: Arc::new(ScriptedBackend::new(Vec::new())),
            model: "m".to_string(),
        }
    }

    fn spec(operator: CombineOperator, approaches: &[&str]) -> CompositeModelSpec {
        CompositeModelSpec {
            operator,
            approaches: approaches.iter().map(|s| s.to_string()).collect(),
            model: "m".to_string(),
        }
    }

    fn empty_parts() -> ProxyRequestParts {
        ProxyRequestParts {
            messages: Vec::new(),
            passthrough: Map::new(),
        }
    }

    fn run(
        n: u32,
        spec: &CompositeModelSpec,
        registry: &StrategyRegistry,
    ) -> GatewayResult<(AggregateBody, u64)> {
        execute_n_times(
            n,
            spec,
            &context(),
            &StrategyDefaults::default(),
            &RequestConfig::new(),
            registry,
            &empty_parts(),
        )
    }

    #[test]
    fn and_pipes_each_output_into_the_next_query() {
        let registry = registry_with_stubs();
        let (body, tokens) = run(1, &spec(CombineOperator::And, &["tag_a", "tag_b"]), &registry)
            .expect("aggregate");
        assert_eq!(body, AggregateBody::Single("B(A(q))".to_string()));
        assert_eq!(tokens, 18);
    }

    #[test]
    fn or_preserves_input_order_despite_completion_timing() {
        let registry = registry_with_stubs();
        let (body, tokens) = run(
            1,
            &spec(
                CombineOperator::Or,
                &["slow_first", "fast_second", "mid_third"],
            ),
            &registry,
        )
        .expect("aggregate");
        assert_eq!(
            body,
            AggregateBody::Many(vec![
                "first".to_string(),
                "second".to_string(),
                "third".to_string(),
            ])
        );
        assert_eq!(tokens, 3);
    }

    #[test]
    fn or_branch_failure_fails_the_whole_unit() {
        let registry = registry_with_stubs();
        let err = run(
            1,
            &spec(CombineOperator::Or, &["fast_second", "fails"]),
            &registry,
        )
        .err()
        .expect("error");
        assert!(matches!(err, GatewayError::Upstream(message) if message.contains("boom")));
    }

    #[test]
    fn none_may_not_join_an_and_pipeline() {
        let registry = registry_with_stubs();
        let err = run(1, &spec(CombineOperator::And, &["tag_a", "none"]), &registry)
            .err()
            .expect("error");
        assert!(matches!(err, GatewayError::InvalidCombination));
    }

    #[test]
    fn none_may_not_join_an_or_fanout() {
        let registry = registry_with_stubs();
        let err = run(1, &spec(CombineOperator::Or, &["none", "tag_b"]), &registry)
            .err()
            .expect("error");
        assert!(matches!(err, GatewayError::InvalidCombination));
    }

    #[test]
    fn repetition_collects_one_result_per_run_and_sums_tokens() {
        let registry = registry_with_stubs();
        let (body, tokens) = run(3, &spec(CombineOperator::Single, &["tag_a"]), &registry)
            .expect("aggregate");
        assert_eq!(
            body,
            AggregateBody::Many(vec![
                "A(q)".to_string(),
                "A(q)".to_string(),
                "A(q)".to_string(),
            ])
        );
        assert_eq!(tokens, 21);
    }

    #[test]
    fn single_run_with_one_result_collapses_to_a_scalar() {
        let registry = registry_with_stubs();
        let (body, _) = run(1, &spec(CombineOperator::Single, &["tag_a"]), &registry)
            .expect("aggregate");
        assert_eq!(body, AggregateBody::Single("A(q)".to_string()));
    }

    #[test]
    fn list_valued_unit_results_splice_flat() {
        let registry = registry_with_stubs();
        // one OR run mixing a list-valued branch with a scalar branch
        let (body, _) = run(1, &spec(CombineOperator::Or, &["pair", "fast_second"]), &registry)
            .expect("aggregate");
        assert_eq!(
            body,
            AggregateBody::Many(vec![
                "x".to_string(),
                "y".to_string(),
                "second".to_string(),
            ])
        );

        // repeated, the splice happens per repetition
        let (body, _) = run(2, &spec(CombineOperator::Single, &["pair"]), &registry)
            .expect("aggregate");
        assert_eq!(
            body,
            AggregateBody::Many(vec![
                "x".to_string(),
                "y".to_string(),
                "x".to_string(),
                "y".to_string(),
            ])
        );
    }

    #[test]
    fn single_list_valued_run_does_not_collapse() {
        let registry = registry_with_stubs();
        let (body, _) = run(1, &spec(CombineOperator::Single, &["pair"]), &registry)
            .expect("aggregate");
        assert_eq!(
            body,
            AggregateBody::Many(vec!["x".to_string(), "y".to_string()])
        );
    }
}

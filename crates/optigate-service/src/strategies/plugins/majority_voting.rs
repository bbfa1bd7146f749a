use optigate_core::GatewayResult;
use serde_json::Value;

use super::super::self_consistency::majority_pick;
use super::super::{
    chat_sample, PluginEntry, PluginSource, RequestConfig, StrategyContext, StrategyPlugin,
    StrategyReply,
};

const DEFAULT_K: u32 = 6;

/// Sample `k` answers and return the most frequent one. `k` is overridable
/// per request through the tuning map.
fn majority_voting(ctx: &StrategyContext, config: &RequestConfig) -> GatewayResult<StrategyReply> {
    let k = config
        .get("k")
        .and_then(Value::as_u64)
        .and_then(|value| u32::try_from(value).ok())
        .filter(|value| *value > 0)
        .unwrap_or(DEFAULT_K);
    let (samples, tokens) = chat_sample(ctx, &ctx.system_prompt, &ctx.query, k, 1.0)?;
    Ok(StrategyReply::single(majority_pick(&samples), tokens))
}

inventory::submit! {
    StrategyPlugin {
        slug: "majority_voting",
        source: PluginSource::Bundled,
        entry: PluginEntry::SyncWithConfig(majority_voting),
    }
}

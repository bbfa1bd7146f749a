use optigate_core::GatewayResult;

use super::{chat_once, StrategyContext, StrategyReply};

/// Round-trip optimization: solve, re-derive the task from the solution,
/// solve the re-derived task, and reconcile when the two solutions differ.
pub(crate) fn round_trip_optimization(ctx: &StrategyContext) -> GatewayResult<StrategyReply> {
    let (first, mut total_tokens) = chat_once(ctx, &ctx.system_prompt, &ctx.query, None)?;

    let describe_prompt = format!(
        "Summarize the following solution as a standalone task description. \
State only the task, not the solution.\n\n{first}"
    );
    let (derived_task, describe_tokens) =
        chat_once(ctx, &ctx.system_prompt, &describe_prompt, None)?;
    total_tokens += describe_tokens;

    let (second, second_tokens) = chat_once(ctx, &ctx.system_prompt, &derived_task, None)?;
    total_tokens += second_tokens;

    if normalized(&first) == normalized(&second) {
        return Ok(StrategyReply::single(first, total_tokens));
    }

    let merge_prompt = format!(
        "Original task:\n{}\n\nFirst solution:\n{}\n\nSecond solution:\n{}\n\n\
Combine the strengths of both solutions into one final solution.",
        ctx.query, first, second
    );
    let (merged, merge_tokens) = chat_once(ctx, &ctx.system_prompt, &merge_prompt, None)?;
    total_tokens += merge_tokens;
    Ok(StrategyReply::single(merged, total_tokens))
}

fn normalized(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

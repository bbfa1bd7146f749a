use optigate_core::GatewayResult;

use super::{chat_once, StrategyContext, StrategyReply};

/// LEAP: derive task-specific principles first, then answer with those
/// principles in context.
pub(crate) fn leap(ctx: &StrategyContext) -> GatewayResult<StrategyReply> {
    let principles_prompt = format!(
        "Before answering, list the key principles, constraints and common \
pitfalls relevant to this task. Principles only, no answer yet.\n\nTask:\n{}",
        ctx.query
    );
    let (principles, mut total_tokens) =
        chat_once(ctx, &ctx.system_prompt, &principles_prompt, None)?;

    let answer_prompt = format!(
        "Principles to apply:\n{principles}\n\nTask:\n{}\n\nApply the principles and answer the task.",
        ctx.query
    );
    let (answer, answer_tokens) = chat_once(ctx, &ctx.system_prompt, &answer_prompt, None)?;
    total_tokens += answer_tokens;

    Ok(StrategyReply::single(answer, total_tokens))
}

use optigate_core::GatewayResult;

use super::{chat_once, chat_sample, StrategyContext, StrategyReply};

/// Re-reading: the question is presented twice in one prompt, which
/// measurably helps smaller models parse long questions.
pub(crate) fn re2_approach(ctx: &StrategyContext, n: u32) -> GatewayResult<StrategyReply> {
    let prompt = format!("{0}\nRead the question again: {0}", ctx.query);
    if n <= 1 {
        let (text, tokens) = chat_once(ctx, &ctx.system_prompt, &prompt, None)?;
        return Ok(StrategyReply::single(text, tokens));
    }
    let (texts, tokens) = chat_sample(ctx, &ctx.system_prompt, &prompt, n, 1.0)?;
    Ok(StrategyReply::many(texts, tokens))
}

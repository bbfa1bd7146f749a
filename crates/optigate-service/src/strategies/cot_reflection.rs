use optigate_core::GatewayResult;

use super::{chat_once, StrategyContext, StrategyReply};

const COT_INSTRUCTIONS: &str = "Answer using this exact structure:\n\
<thinking>step-by-step reasoning about the problem</thinking>\n\
<reflection>check the reasoning above for mistakes and correct them</reflection>\n\
<output>the final answer for the user</output>";

/// Chain-of-thought with a reflection pass, all inside one completion. By
/// default only the `<output>` section reaches the caller.
pub(crate) fn cot_reflection(
    ctx: &StrategyContext,
    return_full_response: bool,
) -> GatewayResult<StrategyReply> {
    let system = if ctx.system_prompt.is_empty() {
        COT_INSTRUCTIONS.to_string()
    } else {
        format!("{}\n\n{}", ctx.system_prompt, COT_INSTRUCTIONS)
    };
    let (full, tokens) = chat_once(ctx, &system, &ctx.query, None)?;
    if return_full_response {
        return Ok(StrategyReply::single(full, tokens));
    }
    let answer = output_section(&full).unwrap_or_else(|| full.clone());
    Ok(StrategyReply::single(answer, tokens))
}

/// Text between `<output>` and `</output>`; an unclosed tag runs to the end
/// of the completion, which truncated generations produce routinely.
fn output_section(text: &str) -> Option<String> {
    let start = text.find("<output>")? + "<output>".len();
    let rest = &text[start..];
    let content = match rest.find("</output>") {
        Some(end) => &rest[..end],
        None => rest,
    };
    Some(content.trim().to_string())
}

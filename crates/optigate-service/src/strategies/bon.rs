use optigate_core::GatewayResult;

use super::{chat_once, chat_sample, StrategyContext, StrategyReply};

/// Best-of-n: sample candidates at high temperature, then let the model
/// itself pick the strongest one.
pub(crate) fn best_of_n_sampling(ctx: &StrategyContext, n: u32) -> GatewayResult<StrategyReply> {
    let (candidates, mut total_tokens) =
        chat_sample(ctx, &ctx.system_prompt, &ctx.query, n.max(1), 1.0)?;
    if candidates.len() == 1 {
        let mut candidates = candidates;
        return Ok(StrategyReply::single(candidates.remove(0), total_tokens));
    }

    let mut listing = String::new();
    for (index, candidate) in candidates.iter().enumerate() {
        listing.push_str(&format!("Candidate {}:\n{}\n\n", index + 1, candidate));
    }
    let judge_prompt = format!(
        "Original query:\n{}\n\n{}Reply with the number of the single best candidate and nothing else.",
        ctx.query, listing
    );
    let (verdict, judge_tokens) = chat_once(ctx, &ctx.system_prompt, &judge_prompt, None)?;
    total_tokens += judge_tokens;

    let pick = first_number(&verdict)
        .filter(|index| (1..=candidates.len()).contains(index))
        .unwrap_or(1);
    Ok(StrategyReply::single(
        candidates[pick - 1].clone(),
        total_tokens,
    ))
}

fn first_number(text: &str) -> Option<usize> {
    let digits: String = text
        .chars()
        .skip_while(|ch| !ch.is_ascii_digit())
        .take_while(|ch| ch.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

use optigate_core::GatewayResult;

use super::{chat_once, StrategyContext, StrategyReply};

/// Plan search: derive several distinct high-level plans first, then
/// produce one solution per plan. The reply is list-valued — one element
/// per plan — so callers receive every candidate solution.
pub(crate) fn plansearch(ctx: &StrategyContext, n: u32) -> GatewayResult<StrategyReply> {
    let plan_count = n.max(1);
    let plan_prompt = format!(
        "Propose {plan_count} distinct high-level plans for solving the task below. \
Number them 1 to {plan_count}, one plan per line, no solutions yet.\n\nTask:\n{}",
        ctx.query
    );
    let (plan_text, mut total_tokens) = chat_once(ctx, &ctx.system_prompt, &plan_prompt, None)?;

    let mut plans = numbered_items(&plan_text);
    plans.truncate(plan_count as usize);
    if plans.is_empty() {
        plans.push(plan_text);
    }

    let mut solutions = Vec::with_capacity(plans.len());
    for plan in &plans {
        let solve_prompt = format!(
            "Task:\n{}\n\nFollow this plan:\n{plan}\n\nProvide the complete solution.",
            ctx.query
        );
        let (solution, tokens) = chat_once(ctx, &ctx.system_prompt, &solve_prompt, None)?;
        total_tokens += tokens;
        solutions.push(solution);
    }
    Ok(StrategyReply::many(solutions, total_tokens))
}

/// Lines shaped like `1. plan` / `2) plan`, with the numbering stripped.
fn numbered_items(text: &str) -> Vec<String> {
    text.lines()
        .filter_map(|line| {
            let trimmed = line.trim();
            let digits = trimmed.chars().take_while(|ch| ch.is_ascii_digit()).count();
            if digits == 0 {
                return None;
            }
            let rest = trimmed[digits..]
                .trim_start_matches(['.', ')', ':'])
                .trim();
            if rest.is_empty() {
                None
            } else {
                Some(rest.to_string())
            }
        })
        .collect()
}

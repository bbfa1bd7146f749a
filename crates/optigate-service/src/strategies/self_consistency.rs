use std::collections::HashMap;

use optigate_core::GatewayResult;

use super::{chat_sample, StrategyContext, StrategyReply};

const SAMPLE_COUNT: u32 = 5;
const SAMPLE_TEMPERATURE: f64 = 1.0;

/// Self-consistency: sample several reasoning paths and return the answer
/// the majority of them agree on.
pub(crate) fn advanced_self_consistency(ctx: &StrategyContext) -> GatewayResult<StrategyReply> {
    let (samples, tokens) = chat_sample(
        ctx,
        &ctx.system_prompt,
        &ctx.query,
        SAMPLE_COUNT,
        SAMPLE_TEMPERATURE,
    )?;
    Ok(StrategyReply::single(majority_pick(&samples), tokens))
}

/// Most frequent sample under whitespace/case normalization; ties resolve
/// to the earliest sample. The returned text is the first occurrence, not
/// the normalized form.
pub(crate) fn majority_pick(samples: &[String]) -> String {
    let mut tally: HashMap<String, (usize, usize)> = HashMap::new();
    for (index, sample) in samples.iter().enumerate() {
        let entry = tally.entry(normalized(sample)).or_insert((0, index));
        entry.0 += 1;
    }
    let mut best: Option<(usize, usize)> = None;
    for &(count, first_index) in tally.values() {
        let better = match best {
            None => true,
            Some((best_count, best_first)) => {
                count > best_count || (count == best_count && first_index < best_first)
            }
        };
        if better {
            best = Some((count, first_index));
        }
    }
    match best {
        Some((_, first_index)) => samples[first_index].clone(),
        None => String::new(),
    }
}

fn normalized(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

use optigate_core::GatewayResult;

use super::{chat_once, chat_sample, StrategyContext, StrategyReply};

const CANDIDATE_COUNT: u32 = 3;

/// Mixture of agents: independent candidates, one critique pass over all
/// of them, then a final response informed by the critiques.
pub(crate) fn mixture_of_agents(ctx: &StrategyContext) -> GatewayResult<StrategyReply> {
    let (candidates, mut total_tokens) =
        chat_sample(ctx, &ctx.system_prompt, &ctx.query, CANDIDATE_COUNT, 1.0)?;

    let mut listing = String::new();
    for (index, candidate) in candidates.iter().enumerate() {
        listing.push_str(&format!("Candidate {}:\n{}\n\n", index + 1, candidate));
    }

    let critique_prompt = format!(
        "Original query:\n{}\n\nI will present you with {} candidate responses. \
Please critique each candidate: point out strengths, weaknesses and factual errors.\n\n{}",
        ctx.query,
        candidates.len(),
        listing
    );
    let (critiques, critique_tokens) = chat_once(ctx, &ctx.system_prompt, &critique_prompt, None)?;
    total_tokens += critique_tokens;

    let final_prompt = format!(
        "Original query:\n{}\n\n{}Critiques of all candidates:\n{}\n\n\
Based on the candidates and critiques above, provide a single final, refined response to the original query.",
        ctx.query, listing, critiques
    );
    let (final_text, final_tokens) = chat_once(ctx, &ctx.system_prompt, &final_prompt, None)?;
    total_tokens += final_tokens;

    Ok(StrategyReply::single(final_text, total_tokens))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::super::test_support::{completion_of, ScriptedBackend};
    use super::super::ReplyBody;
    use super::*;

    #[test]
    fn runs_candidates_critique_then_fusion() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            completion_of(&["a1", "a2", "a3"], 12),
            completion_of(&["critique text"], 5),
            completion_of(&["fused answer"], 7),
        ]));
        let ctx = StrategyContext {
            system_prompt: "sys".to_string(),
            query: "question".to_string(),
            backend: backend.clone(),
            model: "m".to_string(),
        };
        let reply = mixture_of_agents(&ctx).expect("reply");
        assert_eq!(reply.body, ReplyBody::Single("fused answer".to_string()));
        assert_eq!(reply.completion_tokens, 24);

        let requests = backend.requests.lock().expect("requests");
        assert_eq!(requests.len(), 3);
        let fusion = requests[2]["messages"][1]["content"].as_str().expect("str");
        assert!(fusion.contains("critique text"));
        assert!(fusion.contains("Candidate 3:"));
    }
}

use optigate_core::GatewayResult;

use super::{chat_once, StrategyContext, StrategyReply};

const DEFAULT_SCORE: f64 = 5.0;

struct Node {
    answer: String,
    parent: Option<usize>,
    depth: u32,
    visits: u32,
    score_total: f64,
}

impl Node {
    fn mean(&self) -> f64 {
        if self.visits == 0 {
            DEFAULT_SCORE
        } else {
            self.score_total / f64::from(self.visits)
        }
    }
}

/// Monte-Carlo search over answer refinements. Each simulation picks the
/// most promising node under UCT, asks the model to rewrite its answer,
/// scores the rewrite with a rating call, and backpropagates the score.
/// `depth` bounds how many refinement generations may stack; `exploration`
/// is the UCT exploration weight.
pub(crate) fn chat_with_mcts(
    ctx: &StrategyContext,
    simulations: u32,
    exploration: f64,
    depth: u32,
) -> GatewayResult<StrategyReply> {
    let mut total_tokens = 0u64;

    let (root_answer, tokens) = chat_once(ctx, &ctx.system_prompt, &ctx.query, None)?;
    total_tokens += tokens;
    let (root_score, tokens) = rate_answer(ctx, &root_answer)?;
    total_tokens += tokens;

    let mut nodes = vec![Node {
        answer: root_answer,
        parent: None,
        depth: 0,
        visits: 1,
        score_total: root_score,
    }];

    for _ in 0..simulations {
        let Some(selected) = select_expandable(&nodes, exploration, depth) else {
            break;
        };

        let refine_prompt = format!(
            "Task:\n{}\n\nCurrent answer:\n{}\n\nRewrite the answer to fix any errors and improve clarity. \
Reply with the full improved answer only.",
            ctx.query, nodes[selected].answer
        );
        let (child_answer, tokens) = chat_once(ctx, &ctx.system_prompt, &refine_prompt, None)?;
        total_tokens += tokens;
        let (score, tokens) = rate_answer(ctx, &child_answer)?;
        total_tokens += tokens;

        let child_depth = nodes[selected].depth + 1;
        nodes.push(Node {
            answer: child_answer,
            parent: Some(selected),
            depth: child_depth,
            visits: 1,
            score_total: score,
        });

        // backpropagate up the refinement chain
        let mut cursor = Some(selected);
        while let Some(index) = cursor {
            nodes[index].visits += 1;
            nodes[index].score_total += score;
            cursor = nodes[index].parent;
        }
    }

    let mut best = 0;
    for index in 1..nodes.len() {
        if nodes[index].mean() > nodes[best].mean() {
            best = index;
        }
    }
    Ok(StrategyReply::single(
        nodes[best].answer.clone(),
        total_tokens,
    ))
}

/// UCT pick over every node that may still be refined (depth below the
/// limit). Returns `None` when the depth limit exhausts the whole tree.
fn select_expandable(nodes: &[Node], exploration: f64, depth: u32) -> Option<usize> {
    let total_visits: u32 = nodes.iter().map(|node| node.visits).sum();
    let ln_total = f64::from(total_visits.max(1)).ln();

    let mut best: Option<(usize, f64)> = None;
    for (index, node) in nodes.iter().enumerate() {
        if node.depth >= depth {
            continue;
        }
        let uct = node.mean() + exploration * (ln_total / f64::from(node.visits.max(1))).sqrt();
        let better = match best {
            None => true,
            Some((_, best_uct)) => uct > best_uct,
        };
        if better {
            best = Some((index, uct));
        }
    }
    best.map(|(index, _)| index)
}

fn rate_answer(ctx: &StrategyContext, answer: &str) -> GatewayResult<(f64, u64)> {
    let rating_prompt = format!(
        "Task:\n{}\n\nAnswer:\n{answer}\n\nRate the answer on a scale of 0 to 10. Reply with just the number.",
        ctx.query
    );
    let (verdict, tokens) = chat_once(ctx, &ctx.system_prompt, &rating_prompt, None)?;
    Ok((parse_score(&verdict), tokens))
}

fn parse_score(text: &str) -> f64 {
    let number: String = text
        .chars()
        .skip_while(|ch| !ch.is_ascii_digit())
        .take_while(|ch| ch.is_ascii_digit() || *ch == '.')
        .collect();
    number.parse::<f64>().map(|score| score.clamp(0.0, 10.0)).unwrap_or(DEFAULT_SCORE)
}

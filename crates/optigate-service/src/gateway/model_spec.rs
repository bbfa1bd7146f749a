use super::dispatch::KNOWN_APPROACHES;
use super::registry::StrategyRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CombineOperator {
    Single,
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CompositeModelSpec {
    pub operator: CombineOperator,
    pub approaches: Vec<String>,
    pub model: String,
}

/// Split a composite model identifier into approaches, combination
/// operator and the base model name.
///
/// Tokens are scanned left to right: a token matching a built-in or
/// registered extension slug selects that approach; a token containing `&`
/// (`|`) splits into several approaches and sets the AND (OR) operator.
/// The first token matching neither ends approach parsing — it and every
/// following token are rejoined with `-` as the base model name.
///
/// Mixing `&`- and `|`-tokens in one identifier is not validated; the last
/// operator-setting token wins. Known ambiguity, kept for compatibility.
pub(crate) fn parse_composite_model(model: &str, registry: &StrategyRegistry) -> CompositeModelSpec {
    if model == "auto" {
        return CompositeModelSpec {
            operator: CombineOperator::Single,
            approaches: vec!["none".to_string()],
            model: model.to_string(),
        };
    }

    let mut approaches: Vec<String> = Vec::new();
    let mut operator = CombineOperator::Single;
    let mut model_parts: Vec<&str> = Vec::new();
    let mut parsing_approaches = true;

    for part in model.split('-') {
        if parsing_approaches {
            if KNOWN_APPROACHES.contains(&part) || registry.contains(part) {
                approaches.push(part.to_string());
            } else if part.contains('&') {
                operator = CombineOperator::And;
                approaches.extend(part.split('&').map(str::to_string));
            } else if part.contains('|') {
                operator = CombineOperator::Or;
                approaches.extend(part.split('|').map(str::to_string));
            } else {
                parsing_approaches = false;
                model_parts.push(part);
            }
        } else {
            model_parts.push(part);
        }
    }

    if approaches.is_empty() {
        return CompositeModelSpec {
            operator: CombineOperator::Single,
            approaches: vec!["none".to_string()],
            model: model.to_string(),
        };
    }

    CompositeModelSpec {
        operator,
        approaches,
        model: model_parts.join("-"),
    }
}

use serde_json::{Map, Value};

pub const DEFAULT_ADDR: &str = "0.0.0.0:8000";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_APPROACH: &str = "auto";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

const DEFAULT_MCTS_SIMULATIONS: u32 = 2;
const DEFAULT_MCTS_EXPLORATION: f64 = 0.2;
const DEFAULT_MCTS_DEPTH: u32 = 1;
const DEFAULT_BEST_OF_N: u32 = 3;
const DEFAULT_N: u32 = 1;

/// Immutable gateway configuration, constructed once at startup from CLI
/// flags and environment and passed by reference into every component.
/// Nothing mutates it afterwards; per-request knob overrides produce a
/// derived [`StrategyDefaults`] instead.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Listen address, `host:port`.
    pub addr: String,
    /// Upstream OpenAI-compatible base url.
    pub base_url: String,
    /// Backend credential (`OPENAI_API_KEY`). `None` means no usable
    /// backend; requests needing one fail with a configuration error.
    pub backend_api_key: Option<String>,
    /// Operator key clients must present as a bearer credential. `None`
    /// disables the check.
    pub operator_key: Option<String>,
    /// Model used when a request omits one.
    pub default_model: String,
    /// Server-level approach; `auto` leaves the model identifier as-is.
    pub default_approach: String,
    pub defaults: StrategyDefaults,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            backend_api_key: None,
            operator_key: None,
            default_model: DEFAULT_MODEL.to_string(),
            default_approach: DEFAULT_APPROACH.to_string(),
            defaults: StrategyDefaults::default(),
        }
    }
}

/// Tuning knobs forwarded to built-in strategies.
#[derive(Debug, Clone)]
pub struct StrategyDefaults {
    pub mcts_simulations: u32,
    pub mcts_exploration: f64,
    pub mcts_depth: u32,
    pub best_of_n: u32,
    pub n: u32,
    pub return_full_response: bool,
}

impl Default for StrategyDefaults {
    fn default() -> Self {
        Self {
            mcts_simulations: DEFAULT_MCTS_SIMULATIONS,
            mcts_exploration: DEFAULT_MCTS_EXPLORATION,
            mcts_depth: DEFAULT_MCTS_DEPTH,
            best_of_n: DEFAULT_BEST_OF_N,
            n: DEFAULT_N,
            return_full_response: false,
        }
    }
}

impl StrategyDefaults {
    /// Overlay request-supplied knob values onto the server defaults. The
    /// request map is the open set of extra body fields; unknown keys are
    /// ignored here and forwarded verbatim elsewhere.
    pub fn with_request_overrides(&self, request_config: &Map<String, Value>) -> StrategyDefaults {
        StrategyDefaults {
            mcts_simulations: u32_override(request_config, "mcts_simulations", self.mcts_simulations),
            mcts_exploration: f64_override(request_config, "mcts_exploration", self.mcts_exploration),
            mcts_depth: u32_override(request_config, "mcts_depth", self.mcts_depth),
            best_of_n: u32_override(request_config, "best_of_n", self.best_of_n),
            n: self.n,
            return_full_response: bool_override(
                request_config,
                "return_full_response",
                self.return_full_response,
            ),
        }
    }
}

fn u32_override(map: &Map<String, Value>, key: &str, default: u32) -> u32 {
    map.get(key)
        .and_then(Value::as_u64)
        .and_then(|value| u32::try_from(value).ok())
        .unwrap_or(default)
}

fn f64_override(map: &Map<String, Value>, key: &str, default: f64) -> f64 {
    map.get(key).and_then(Value::as_f64).unwrap_or(default)
}

fn bool_override(map: &Map<String, Value>, key: &str, default: bool) -> bool {
    map.get(key).and_then(Value::as_bool).unwrap_or(default)
}

pub fn env_nonempty(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

use clap::Parser;

use optigate_service::config::{
    env_nonempty, GatewayConfig, StrategyDefaults, DEFAULT_ADDR, DEFAULT_APPROACH,
    DEFAULT_BASE_URL, DEFAULT_MODEL,
};
use optigate_service::StrategyRegistry;

/// Inference-optimizing gateway for OpenAI-compatible backends.
#[derive(Parser, Debug)]
#[command(name = "optigate", version, about)]
struct Args {
    /// Listen address
    #[arg(long, env = "OPTIGATE_ADDR", default_value = DEFAULT_ADDR)]
    addr: String,

    /// Upstream OpenAI-compatible base url
    #[arg(long, env = "OPTIGATE_BASE_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// Operator key clients must present as a bearer credential
    #[arg(long, env = "OPTIGATE_API_KEY")]
    optigate_api_key: Option<String>,

    /// Model used when a request omits one
    #[arg(long, env = "OPTIGATE_MODEL", default_value = DEFAULT_MODEL)]
    model: String,

    /// Server-level approach; `auto` keeps the model identifier as-is
    #[arg(long, env = "OPTIGATE_APPROACH", default_value = DEFAULT_APPROACH)]
    approach: String,

    /// Number of final responses per request
    #[arg(long, env = "OPTIGATE_N", default_value_t = 1)]
    n: u32,

    /// Number of MCTS simulations
    #[arg(long, env = "OPTIGATE_MCTS_SIMULATIONS", default_value_t = 2)]
    mcts_simulations: u32,

    /// Exploration weight for MCTS
    #[arg(long, env = "OPTIGATE_MCTS_EXPLORATION", default_value_t = 0.2)]
    mcts_exploration: f64,

    /// Simulation depth for MCTS
    #[arg(long, env = "OPTIGATE_MCTS_DEPTH", default_value_t = 1)]
    mcts_depth: u32,

    /// Number of samples for the best-of-n approach
    #[arg(long, env = "OPTIGATE_BEST_OF_N", default_value_t = 3)]
    best_of_n: u32,

    /// Return full strategy output including reasoning sections
    #[arg(long, env = "OPTIGATE_RETURN_FULL_RESPONSE", default_value_t = false)]
    return_full_response: bool,
}

fn main() -> std::io::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = GatewayConfig {
        addr: args.addr,
        base_url: args.base_url,
        backend_api_key: env_nonempty("OPENAI_API_KEY"),
        operator_key: args.optigate_api_key,
        default_model: args.model,
        default_approach: args.approach,
        defaults: StrategyDefaults {
            mcts_simulations: args.mcts_simulations,
            mcts_exploration: args.mcts_exploration,
            mcts_depth: args.mcts_depth,
            best_of_n: args.best_of_n,
            n: args.n,
            return_full_response: args.return_full_response,
        },
    };

    log::info!(
        "starting with approach {}, default model {}, upstream {}, operator key {}",
        config.default_approach,
        config.default_model,
        config.base_url,
        if config.operator_key.is_some() { "[REDACTED]" } else { "disabled" },
    );

    let registry = StrategyRegistry::load();
    let handle = optigate_service::start_server(config, registry)?;
    log::info!("optigate listening on {}", handle.addr);
    handle.join();
    Ok(())
}

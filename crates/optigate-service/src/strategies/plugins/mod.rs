//! Bundled extension strategies. Each submodule submits a
//! [`StrategyPlugin`](super::StrategyPlugin) descriptor through
//! `inventory`; the registry picks them up on every rebuild.

pub mod majority_voting;

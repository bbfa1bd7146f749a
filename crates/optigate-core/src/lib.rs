pub mod chat;
pub mod conversation;
pub mod error;

pub use error::{GatewayError, GatewayResult};

use constant_time_eq::constant_time_eq;
use optigate_core::{GatewayError, GatewayResult};
use tiny_http::Request;

use crate::config::GatewayConfig;

pub(crate) fn bearer_token(request: &Request) -> Option<String> {
    for header in request.headers() {
        if header.field.equiv("Authorization") {
            let value = header.value.as_str();
            if let Some(rest) = value.strip_prefix("Bearer ") {
                return Some(rest.trim().to_string());
            }
        }
    }
    None
}

/// Operator-key check. With no key configured every request passes; with a
/// key configured the caller must present it as a bearer credential. The
/// comparison is constant-time. The health endpoint never reaches this
/// check.
pub(crate) fn check_operator_key(
    bearer: Option<&str>,
    config: &GatewayConfig,
) -> GatewayResult<()> {
    let Some(expected) = config.operator_key.as_deref() else {
        return Ok(());
    };
    let Some(candidate) = bearer else {
        return Err(GatewayError::Authentication(
            "Invalid Authorization header. Expected format: 'Authorization: Bearer YOUR_API_KEY'"
                .to_string(),
        ));
    };
    if !constant_time_eq(candidate.as_bytes(), expected.as_bytes()) {
        return Err(GatewayError::Authentication("Invalid API key".to_string()));
    }
    Ok(())
}

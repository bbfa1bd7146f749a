use std::sync::atomic::{AtomicUsize, Ordering};

static GATEWAY_TOTAL_REQUESTS: AtomicUsize = AtomicUsize::new(0);
static GATEWAY_ACTIVE_REQUESTS: AtomicUsize = AtomicUsize::new(0);
static STRATEGY_EXECUTIONS: AtomicUsize = AtomicUsize::new(0);
static STRATEGY_FAILURES: AtomicUsize = AtomicUsize::new(0);
static UPSTREAM_FAILURES: AtomicUsize = AtomicUsize::new(0);
static REGISTRY_RELOADS: AtomicUsize = AtomicUsize::new(0);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct GatewayMetricsSnapshot {
    pub total_requests: usize,
    pub active_requests: usize,
    pub strategy_executions: usize,
    pub strategy_failures: usize,
    pub upstream_failures: usize,
    pub registry_reloads: usize,
}

pub(crate) struct GatewayRequestGuard;

impl Drop for GatewayRequestGuard {
    fn drop(&mut self) {
        GATEWAY_ACTIVE_REQUESTS.fetch_sub(1, Ordering::Relaxed);
    }
}

pub(crate) fn begin_gateway_request() -> GatewayRequestGuard {
    GATEWAY_TOTAL_REQUESTS.fetch_add(1, Ordering::Relaxed);
    GATEWAY_ACTIVE_REQUESTS.fetch_add(1, Ordering::Relaxed);
    GatewayRequestGuard
}

pub(crate) fn record_strategy_execution() {
    STRATEGY_EXECUTIONS.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn record_strategy_failure() {
    STRATEGY_FAILURES.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn record_upstream_failure() {
    UPSTREAM_FAILURES.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn record_registry_reload() {
    REGISTRY_RELOADS.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn gateway_metrics_snapshot() -> GatewayMetricsSnapshot {
    GatewayMetricsSnapshot {
        total_requests: GATEWAY_TOTAL_REQUESTS.load(Ordering::Relaxed),
        active_requests: GATEWAY_ACTIVE_REQUESTS.load(Ordering::Relaxed),
        strategy_executions: STRATEGY_EXECUTIONS.load(Ordering::Relaxed),
        strategy_failures: STRATEGY_FAILURES.load(Ordering::Relaxed),
        upstream_failures: UPSTREAM_FAILURES.load(Ordering::Relaxed),
        registry_reloads: REGISTRY_RELOADS.load(Ordering::Relaxed),
    }
}

pub(crate) fn gateway_metrics_prometheus() -> String {
    let m = gateway_metrics_snapshot();
    format!(
        "optigate_gateway_requests_total {}\n\
optigate_gateway_requests_active {}\n\
optigate_strategy_executions_total {}\n\
optigate_strategy_failures_total {}\n\
optigate_upstream_failures_total {}\n\
optigate_registry_reloads_total {}\n",
        m.total_requests,
        m.active_requests,
        m.strategy_executions,
        m.strategy_failures,
        m.upstream_failures,
        m.registry_reloads,
    )
}

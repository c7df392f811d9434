use tracing::trace;

// Trace-based counters; the Prometheus recorder is installed in main and
// scraped through /metrics.

pub fn inc_requests(route: &'static str) {
    trace!(
        target = "brandcast.metrics",
        route = route,
        "requests_total_inc"
    );
}

pub fn stage_elapsed(stage: &'static str, elapsed_ms: u128) {
    trace!(
        target = "brandcast.metrics",
        stage = stage,
        elapsed_ms = elapsed_ms as u64,
        "stage_elapsed"
    );
}

pub fn poll_observed(status: &'static str, attempt: u32) {
    trace!(
        target = "brandcast.metrics",
        status = status,
        attempt = attempt,
        "indexing_poll"
    );
}

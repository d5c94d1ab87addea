/// Metrics and telemetry for the waitlist service
///
/// Provides Prometheus-compatible metrics for monitoring:
/// - HTTP request counts and latencies
/// - Signup outcomes and referral credits
/// - Access code collisions
/// - Email verifications

use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, Encoder,
    HistogramVec, IntCounter, IntCounterVec, TextEncoder,
};

lazy_static! {
    // ========== HTTP Metrics ==========

    /// Total HTTP requests by method, path, and status
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "http_requests_total",
        "Total number of HTTP requests",
        &["method", "path", "status"]
    )
    .unwrap();

    /// HTTP request duration in seconds
    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "http_request_duration_seconds",
        "HTTP request latencies in seconds",
        &["method", "path"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .unwrap();

    // ========== Waitlist Metrics ==========

    /// Signup attempts by outcome (joined, duplicate, rejected, failed)
    pub static ref WAITLIST_SIGNUPS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "waitlist_signups_total",
        "Total number of waitlist signup attempts",
        &["outcome"]
    )
    .unwrap();

    /// Referral credits applied to an existing enrollment
    pub static ref WAITLIST_REFERRALS_CREDITED_TOTAL: IntCounter = register_int_counter!(
        "waitlist_referrals_credited_total",
        "Total number of referral credits applied"
    )
    .unwrap();

    /// Generated access codes that were already taken
    pub static ref WAITLIST_CODE_COLLISIONS_TOTAL: IntCounter = register_int_counter!(
        "waitlist_code_collisions_total",
        "Total number of access code collisions during generation"
    )
    .unwrap();

    /// Verification attempts by result
    pub static ref WAITLIST_VERIFICATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "waitlist_verifications_total",
        "Total number of email verification attempts",
        &["result"]
    )
    .unwrap();
}

/// Render all metrics in Prometheus text format
pub fn render_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!(error = %e, "metrics_encode_failed");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Record an HTTP request
pub fn record_http_request(method: &str, path: &str, status: u16, duration: f64) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status.to_string()])
        .inc();
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path])
        .observe(duration);
}

/// Record a signup attempt
pub fn record_signup(outcome: &str) {
    WAITLIST_SIGNUPS_TOTAL.with_label_values(&[outcome]).inc();
}

/// Record a referral credit
pub fn record_referral_credit() {
    WAITLIST_REFERRALS_CREDITED_TOTAL.inc();
}

/// Record an access code collision
pub fn record_code_collision() {
    WAITLIST_CODE_COLLISIONS_TOTAL.inc();
}

/// Record a verification attempt
pub fn record_verification(success: bool) {
    WAITLIST_VERIFICATIONS_TOTAL
        .with_label_values(&[if success { "success" } else { "failure" }])
        .inc();
}

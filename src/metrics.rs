use anyhow::Result;
use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, TextEncoder, opts, register_int_counter};

pub static RATE_LIMIT_DENIED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "warden_rate_limit_denied_total",
        "Total number of requests denied by rate limiting"
    ))
    .unwrap()
});

pub static SESSIONS_REVOKED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "warden_sessions_revoked_total",
        "Total number of session records destroyed by revocation"
    ))
    .unwrap()
});

pub static REVOCATION_FALLBACK_SCANS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "warden_revocation_fallback_scans_total",
        "Total number of legacy fallback scans run"
    ))
    .unwrap()
});

pub static REVOCATION_SCAN_BUDGET_EXHAUSTED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "warden_revocation_scan_budget_exhausted_total",
        "Fallback scans stopped early by the key inspection budget"
    ))
    .unwrap()
});

pub static SESSIONS_EXPIRED_ABSOLUTE_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "warden_sessions_expired_absolute_total",
        "Sessions destroyed by the absolute age check"
    ))
    .unwrap()
});

pub fn gather_metrics() -> Result<String> {
    let mut buffer = vec![];
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder.encode(&metric_families, &mut buffer)?;

    Ok(String::from_utf8(buffer)?)
}

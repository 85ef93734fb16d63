use std::net::SocketAddr;

use crate::engine::EngineError;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: admission attempts. Labels: outcome.
pub const ADMISSIONS_TOTAL: &str = "bookd_admissions_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: restaurants currently loaded.
pub const RESTAURANTS_ACTIVE: &str = "bookd_restaurants_active";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "bookd_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "bookd_wal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}

/// Map an admission result to a short outcome label for metrics.
pub fn admission_outcome(result: &Result<(), EngineError>) -> &'static str {
    match result {
        Ok(()) => "admitted",
        Err(EngineError::InvalidSlot(_)) => "invalid_slot",
        Err(EngineError::SlotClosed { .. }) => "slot_closed",
        Err(EngineError::PartySizeRejected { .. }) => "party_size_rejected",
        Err(EngineError::CapacityExceeded(_)) => "capacity_exceeded",
        Err(EngineError::NotFound(_)) | Err(EngineError::OccasionNotFound(_)) => "not_found",
        Err(EngineError::AlreadyExists(_)) => "already_exists",
        Err(EngineError::InvalidTemplate(_)) => "invalid_template",
        Err(EngineError::LimitExceeded(_)) => "limit_exceeded",
        Err(EngineError::WalError(_)) => "wal_error",
    }
}

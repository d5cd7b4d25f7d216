//! Logging and metrics hooks
//!
//! The library records through the `metrics` facade and never installs an
//! exporter; the hosting process decides where metrics go.

use std::time::Duration;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingConfig;

pub const CACHE_OPERATION_DURATION: &str = "anime_cache_operation_duration_seconds";
pub const CACHE_OPERATIONS_TOTAL: &str = "anime_cache_operations_total";
pub const CACHE_BACKGROUND_WRITES_TOTAL: &str = "anime_cache_background_writes_total";
pub const CACHE_PAYLOAD_ORIGINAL_BYTES: &str = "anime_cache_payload_original_bytes";
pub const CACHE_PAYLOAD_STORED_BYTES: &str = "anime_cache_payload_stored_bytes";
pub const CACHE_COMPRESSION_RATIO: &str = "anime_cache_compression_ratio";
pub const CACHE_PHASE_DURATION: &str = "anime_cache_phase_duration_seconds";
pub const CACHE_INVALIDATIONS_TOTAL: &str = "anime_cache_invalidations_total";
pub const DB_POOL_CONNECTIONS: &str = "anime_db_pool_connections";

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured level. Calling this twice is
/// harmless: the second registration is ignored.
pub fn init_tracing(config: &LoggingConfig) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = if config.json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };

    if result.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}

/// Register descriptions for every metric this crate emits.
pub fn describe_metrics() {
    metrics::describe_histogram!(
        CACHE_OPERATION_DURATION,
        metrics::Unit::Seconds,
        "Duration of cache operations by operation and outcome"
    );
    metrics::describe_counter!(CACHE_OPERATIONS_TOTAL, "Cache operations by operation and outcome");
    metrics::describe_counter!(
        CACHE_BACKGROUND_WRITES_TOTAL,
        "Fire-and-forget cache writes by outcome"
    );
    metrics::describe_histogram!(
        CACHE_PAYLOAD_ORIGINAL_BYTES,
        metrics::Unit::Bytes,
        "Serialized payload size before compression"
    );
    metrics::describe_histogram!(
        CACHE_PAYLOAD_STORED_BYTES,
        metrics::Unit::Bytes,
        "Payload size at rest"
    );
    metrics::describe_histogram!(CACHE_COMPRESSION_RATIO, "Stored size divided by original size");
    metrics::describe_histogram!(
        CACHE_PHASE_DURATION,
        metrics::Unit::Seconds,
        "Per-phase durations of compressed reads (storage, decompress, decode)"
    );
    metrics::describe_counter!(CACHE_INVALIDATIONS_TOTAL, "Processed invalidation events by kind");
    metrics::describe_gauge!(DB_POOL_CONNECTIONS, "Database pool connections by state");
}

/// Record one cache operation.
pub fn record_cache_op(operation: &'static str, outcome: &'static str, elapsed: Duration) {
    metrics::histogram!(CACHE_OPERATION_DURATION, "operation" => operation, "outcome" => outcome)
        .record(elapsed.as_secs_f64());
    metrics::counter!(CACHE_OPERATIONS_TOTAL, "operation" => operation, "outcome" => outcome)
        .increment(1);
}

pub fn record_background_write(outcome: &'static str) {
    metrics::counter!(CACHE_BACKGROUND_WRITES_TOTAL, "outcome" => outcome).increment(1);
}

/// Sizes of a payload as written.
#[allow(clippy::cast_precision_loss)]
pub fn record_payload_sizes(original: usize, stored: usize) {
    metrics::histogram!(CACHE_PAYLOAD_ORIGINAL_BYTES).record(original as f64);
    metrics::histogram!(CACHE_PAYLOAD_STORED_BYTES).record(stored as f64);
    if original > 0 {
        metrics::histogram!(CACHE_COMPRESSION_RATIO).record(stored as f64 / original as f64);
    }
}

pub fn record_phase(phase: &'static str, elapsed: Duration) {
    metrics::histogram!(CACHE_PHASE_DURATION, "phase" => phase).record(elapsed.as_secs_f64());
}

pub fn record_invalidation(event: &'static str) {
    metrics::counter!(CACHE_INVALIDATIONS_TOTAL, "event" => event).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_twice_is_harmless() {
        let config = LoggingConfig::default();
        init_tracing(&config);
        init_tracing(&LoggingConfig {
            json: true,
            ..config
        });
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        describe_metrics();
        record_cache_op("get", "hit", Duration::from_millis(3));
        record_background_write("success");
        record_payload_sizes(0, 0);
        record_payload_sizes(4096, 900);
        record_phase("decompress", Duration::from_micros(40));
        record_invalidation("anime_mutated");
    }
}

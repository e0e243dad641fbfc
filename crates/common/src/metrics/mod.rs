//! Metrics and observability utilities
//!
//! Metric names share the `drunkenbot_` prefix. Recording goes through the
//! `metrics` facade, so these helpers are no-ops until a recorder (the
//! gateway's Prometheus exporter) is installed.

use metrics::{counter, describe_counter, describe_histogram, gauge, histogram, Unit};

/// Metrics prefix for all Drunken Bot metrics
pub const METRICS_PREFIX: &str = "drunkenbot";

/// Histogram buckets for request latency (in seconds)
pub const LATENCY_BUCKETS: &[f64] = &[
    0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.00, 30.00,
];

/// Buckets for embedding latency
pub const EMBEDDING_BUCKETS: &[f64] = &[
    0.010, 0.050, 0.100, 0.250, 0.500, 1.000, 2.000, 5.000, 10.00, 30.00,
];

fn name(suffix: &str) -> String {
    format!("{}_{}", METRICS_PREFIX, suffix)
}

/// Register all metric descriptions
pub fn register_metrics() {
    describe_counter!(
        name("completion_requests_total"),
        Unit::Count,
        "Completion requests by outcome"
    );
    describe_histogram!(
        name("completion_duration_seconds"),
        Unit::Seconds,
        "Inference round-trip latency in seconds"
    );

    describe_counter!(
        name("retrieval_queries_total"),
        Unit::Count,
        "Total retrieval queries"
    );
    describe_histogram!(
        name("retrieval_duration_seconds"),
        Unit::Seconds,
        "Retrieval latency (embed + query) in seconds"
    );
    describe_histogram!(
        name("retrieval_results"),
        Unit::Count,
        "Chunks returned per retrieval"
    );

    describe_counter!(
        name("embedding_requests_total"),
        Unit::Count,
        "Embedding batches by model and outcome"
    );
    describe_histogram!(
        name("embedding_duration_seconds"),
        Unit::Seconds,
        "Embedding batch latency in seconds"
    );

    describe_counter!(name("songs_indexed_total"), Unit::Count, "Songs written to the index");
    describe_counter!(name("songs_skipped_total"), Unit::Count, "Songs skipped during indexing");
    describe_counter!(name("chunks_indexed_total"), Unit::Count, "Chunks written to the index");

    tracing::info!("Metrics registered");
}

/// Record one inference call
pub fn record_completion(duration_secs: f64, success: bool) {
    let status = if success { "success" } else { "error" };
    counter!(name("completion_requests_total"), "status" => status).increment(1);
    if success {
        histogram!(name("completion_duration_seconds")).record(duration_secs);
    }
}

/// Record one retrieval query
pub fn record_retrieval(duration_secs: f64, result_count: usize) {
    counter!(name("retrieval_queries_total")).increment(1);
    histogram!(name("retrieval_duration_seconds")).record(duration_secs);
    histogram!(name("retrieval_results")).record(result_count as f64);
}

/// Record one embedding batch
pub fn record_embedding(duration_secs: f64, model: &str, batch_size: usize, success: bool) {
    let status = if success { "success" } else { "error" };
    counter!(
        name("embedding_requests_total"),
        "model" => model.to_string(),
        "status" => status
    )
    .increment(1);

    if success {
        histogram!(name("embedding_duration_seconds"), "model" => model.to_string())
            .record(duration_secs);
        gauge!(name("embedding_last_batch_size")).set(batch_size as f64);
    }
}

/// Record one song written to the index
pub fn record_indexing(chunks: usize) {
    counter!(name("songs_indexed_total")).increment(1);
    counter!(name("chunks_indexed_total")).increment(chunks as u64);
}

/// Record one song skipped during indexing
pub fn record_song_skipped(reason: &'static str) {
    counter!(name("songs_skipped_total"), "reason" => reason).increment(1);
}

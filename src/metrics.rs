// Prometheus metrics definitions for the duel backend.

use std::sync::Once;

use lazy_static::lazy_static;
use prometheus::{
    Encoder, Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts,
    Registry, TextEncoder,
};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // ── Gauges ───────────────────────────────────────────────────────

    /// Duels currently in the active registry.
    pub static ref ACTIVE_DUELS: IntGauge =
        IntGauge::new("duel_active_duels", "Duels currently in progress").unwrap();

    /// Players waiting in the matchmaking queue.
    pub static ref MATCHMAKING_QUEUE_DEPTH: IntGauge =
        IntGauge::new("duel_matchmaking_queue_depth", "Players waiting for an opponent").unwrap();

    /// Live WebSocket connections.
    pub static ref CONNECTED_WEBSOCKETS: IntGauge =
        IntGauge::new("duel_connected_websockets", "Live WebSocket connections").unwrap();

    // ── Counters ─────────────────────────────────────────────────────

    /// Total duels started, by mode (ranked, casual).
    pub static ref DUELS_STARTED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("duel_duels_started_total", "Total duels started"),
        &["mode"],
    )
    .unwrap();

    /// Total duels finished, by reason (knockout, forfeit, timeout).
    pub static ref DUELS_FINISHED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("duel_duels_finished_total", "Total duels finished"),
        &["reason"],
    )
    .unwrap();

    /// Duels dropped without settlement because nobody played.
    pub static ref DUELS_ABANDONED_TOTAL: IntCounter = IntCounter::new(
        "duel_duels_abandoned_total",
        "Duels removed without settlement",
    )
    .unwrap();

    /// Total rounds resolved.
    pub static ref ROUNDS_RESOLVED_TOTAL: IntCounter = IntCounter::new(
        "duel_rounds_resolved_total",
        "Total rounds resolved",
    )
    .unwrap();

    /// Rejected engine calls, by error.
    pub static ref REJECTED_CHOICES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("duel_rejected_choices_total", "Rejected duel operations"),
        &["reason"],
    )
    .unwrap();

    /// Total API requests, by method/endpoint/status.
    pub static ref API_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("duel_api_requests_total", "Total API requests"),
        &["method", "endpoint", "status"],
    )
    .unwrap();

    /// Total WebSocket messages sent to clients.
    pub static ref WEBSOCKET_MESSAGES_SENT_TOTAL: IntCounter = IntCounter::new(
        "duel_websocket_messages_sent_total",
        "Total WebSocket messages sent",
    )
    .unwrap();

    // ── Histograms ───────────────────────────────────────────────────

    /// Time spent resolving one round (and settling, when it ends the duel).
    pub static ref ROUND_RESOLUTION_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new("duel_round_resolution_seconds", "Round resolution time in seconds")
            .buckets(vec![0.00001, 0.00005, 0.0001, 0.0005, 0.001, 0.005, 0.01]),
    )
    .unwrap();

    /// Rounds played per finished duel, by reason.
    pub static ref DUEL_ROUNDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new("duel_rounds_per_duel", "Rounds played per finished duel")
            .buckets(vec![1.0, 2.0, 3.0, 5.0, 8.0, 13.0, 21.0]),
        &["reason"],
    )
    .unwrap();

    /// API request duration in seconds, by endpoint.
    pub static ref API_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "duel_api_request_duration_seconds",
            "API request duration in seconds",
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0]),
        &["endpoint"],
    )
    .unwrap();
}

static REGISTER: Once = Once::new();

/// Register all metrics with the custom registry. Safe to call repeatedly.
pub fn register_metrics() {
    REGISTER.call_once(|| {
        let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(ACTIVE_DUELS.clone()),
            Box::new(MATCHMAKING_QUEUE_DEPTH.clone()),
            Box::new(CONNECTED_WEBSOCKETS.clone()),
            Box::new(DUELS_STARTED_TOTAL.clone()),
            Box::new(DUELS_FINISHED_TOTAL.clone()),
            Box::new(DUELS_ABANDONED_TOTAL.clone()),
            Box::new(ROUNDS_RESOLVED_TOTAL.clone()),
            Box::new(REJECTED_CHOICES_TOTAL.clone()),
            Box::new(API_REQUESTS_TOTAL.clone()),
            Box::new(WEBSOCKET_MESSAGES_SENT_TOTAL.clone()),
            Box::new(ROUND_RESOLUTION_SECONDS.clone()),
            Box::new(DUEL_ROUNDS.clone()),
            Box::new(API_REQUEST_DURATION_SECONDS.clone()),
        ];

        for c in collectors {
            if let Err(e) = REGISTRY.register(c) {
                tracing::error!("Failed to register metric: {e}");
            }
        }
    });
}

/// Serialize all registered metrics to the Prometheus text exposition format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {e}");
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Normalize a URL path for metric labels: numeric segments and duel ids
/// become `:id` to prevent cardinality explosion.
pub fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if segment.parse::<i64>().is_ok() || segment.starts_with("duel-") {
                ":id"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

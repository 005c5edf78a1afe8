//! Integration tests for telemetry initialization and span helpers.

use chrono::Utc;
use workq::model::{ItemId, QueueItem, Status, WorkerId};

fn sample_item() -> QueueItem {
    let now = Utc::now();
    QueueItem {
        id: ItemId::new(),
        item_type: "send_notification".to_string(),
        payload: serde_json::json!({"user": 1}),
        status: Status::Processing,
        retry_count: 1,
        max_retries: 3,
        visibility_timeout_secs: 30,
        visible_at: now,
        worker_id: Some(WorkerId::new("w1")),
        started_at: Some(now),
        completed_at: None,
        failed_at: None,
        error_message: None,
        created_at: now,
        updated_at: now,
    }
}

#[test]
fn telemetry_initializes_without_endpoint() {
    // Note: tracing subscriber can only be set once per process.
    // try_init() in the implementation avoids panics if another
    // test already initialized a subscriber.
    let config = workq::telemetry::TelemetryConfig {
        endpoint: None,
        service_name: "workq-test".to_string(),
        log_level: "debug".to_string(),
    };
    // This may return Err if a global subscriber was already set by
    // another test in this process; that is acceptable.
    let _guard = workq::telemetry::init_telemetry(config);
}

#[test]
fn item_span_creates_and_records_outcome() {
    let item = sample_item();
    let span = workq::telemetry::span::start_item_span("task", &item);
    workq::telemetry::span::record_outcome(&span, "completed");
}

#[test]
fn metric_instruments_build_without_provider() {
    use opentelemetry::KeyValue;
    workq::telemetry::metrics::items_enqueued().add(1, &[KeyValue::new("queue", "task")]);
    workq::telemetry::metrics::fencing_rejections().add(1, &[KeyValue::new("queue", "task")]);
    workq::telemetry::metrics::handler_duration_ms().record(1.5, &[]);
}

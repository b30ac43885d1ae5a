use tracing_subscriber::layer::SubscriberExt;

use crate::memory::{CapturedEvents, EventCaptureLayer};

#[test]
fn captures_message_level_and_fields() {
    let events = CapturedEvents::new();
    let subscriber = tracing_subscriber::registry().with(EventCaptureLayer::new(events.clone()));

    tracing::subscriber::with_default(subscriber, || {
        tracing::info!(collection = "medical_rag", inserted = 150u64, "ingestion finished");
        tracing::warn!(chunk_id = "medical_000003", "dropped item");
    });

    assert_eq!(events.len(), 2);

    let finished = events.with_message("ingestion finished");
    assert_eq!(finished.len(), 1);
    assert_eq!(finished[0].level, "INFO");
    assert_eq!(finished[0].field_str("collection"), Some("medical_rag"));
    assert_eq!(finished[0].field_u64("inserted"), Some(150));

    let warnings = events.at_level("WARN");
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].field_str("chunk_id"), Some("medical_000003"));
}

#[test]
fn records_enclosing_span_names_root_first() {
    let events = CapturedEvents::new();
    let subscriber = tracing_subscriber::registry().with(EventCaptureLayer::new(events.clone()));

    tracing::subscriber::with_default(subscriber, || {
        let outer = tracing::info_span!("ingest", collection = "docs");
        let _outer = outer.enter();
        let inner = tracing::info_span!("embed_batch", batch = 3u64);
        let _inner = inner.enter();
        tracing::info!("batch embedded");
    });

    let captured = events.snapshot();
    assert_eq!(captured.len(), 1);
    assert_eq!(captured[0].spans, vec!["ingest".to_string(), "embed_batch".to_string()]);
}

#[test]
fn clear_discards_history() {
    let events = CapturedEvents::new();
    let subscriber = tracing_subscriber::registry().with(EventCaptureLayer::new(events.clone()));

    tracing::subscriber::with_default(subscriber, || {
        tracing::debug!("first");
    });
    assert!(!events.is_empty());

    events.clear();
    assert!(events.is_empty());
}

#[tokio::test]
async fn capture_works_inside_async_context() {
    let events = CapturedEvents::new();
    let subscriber = tracing_subscriber::registry().with(EventCaptureLayer::new(events.clone()));
    let _guard = tracing::subscriber::set_default(subscriber);

    tokio::task::yield_now().await;
    tracing::info!(progress = 50.0f64, "embedding progress");

    let progress = events.with_message("embedding progress");
    assert_eq!(progress.len(), 1);
    assert_eq!(progress[0].fields.get("progress").and_then(|v| v.as_f64()), Some(50.0));
}

#[test]
fn global_capture_records_startup_event() {
    let events = CapturedEvents::new();
    crate::init_with_capture("docrag-test", events.clone()).unwrap();

    let started = events.with_message("telemetry initialized");
    assert_eq!(started.len(), 1);
    assert_eq!(started[0].field_str("service"), Some("docrag-test"));

    // A second global install is refused.
    assert!(crate::init_telemetry("docrag-test").is_err());
    assert!(crate::init_json_telemetry("docrag-test").is_err());
}

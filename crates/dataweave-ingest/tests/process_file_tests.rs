//! Integration tests for the file → queue pipeline
//!
//! Coverage includes:
//! - Record counts and publish order for valid files
//! - Files whose layout defeats a line-suffix heuristic
//! - Read failures (missing file, malformed, unterminated) and what was published before them
//! - Publish failures stopping the pipeline

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use dataweave_ingest::{
    process_file, IngestError, MemorySink, PublishError, RawRecord, ReaderError, RecordSink,
};
use serde_json::{json, Value};
use tempfile::NamedTempFile;

// ============================================================================
// Helpers
// ============================================================================

fn write_input(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("create temp file");
    file.write_all(contents.as_bytes()).expect("write temp file");
    file.flush().expect("flush temp file");
    file
}

async fn published(sink: &MemorySink) -> Vec<Value> {
    sink.records()
        .await
        .into_iter()
        .map(|(_, record)| Value::Object(record))
        .collect()
}

/// Sink that accepts a fixed number of records and then fails like a dropped connection
struct FlakySink {
    accept: usize,
    calls: AtomicUsize,
    inner: MemorySink,
}

impl FlakySink {
    fn new(accept: usize) -> Self {
        Self {
            accept,
            calls: AtomicUsize::new(0),
            inner: MemorySink::new(),
        }
    }
}

#[async_trait]
impl RecordSink for FlakySink {
    async fn publish(&self, queue: &str, record: &RawRecord) -> Result<(), PublishError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) >= self.accept {
            return Err(PublishError::Nacked {
                queue: queue.to_string(),
            });
        }
        self.inner.publish(queue, record).await
    }
}

// ============================================================================
// Valid Files
// ============================================================================

#[tokio::test]
async fn test_two_objects_on_one_line_publish_in_order() {
    let file = write_input(r#"{"a":1}{"b":2}"#);
    let sink = MemorySink::new();

    let count = process_file(file.path(), "products", &sink).await.unwrap();

    assert_eq!(count, 2);
    assert_eq!(published(&sink).await, vec![json!({"a": 1}), json!({"b": 2})]);
    assert!(sink.records().await.iter().all(|(queue, _)| queue == "products"));
}

#[tokio::test]
async fn test_pretty_printed_product_records() {
    let file = write_input(
        r#"{
    "available_price": "12.50",
    "stock": "In Stock",
    "source": "X",
    "meta_info": "{'reference_product_id': 'P1', 'fulfilment_modes': ['delivery']}"
}
{
    "available_price": "3.10",
    "stock": "Out of Stock",
    "source": "Y",
    "meta_info": "{'reference_product_id': 'P2'}"
}
"#,
    );
    let sink = MemorySink::new();

    let count = process_file(file.path(), "products", &sink).await.unwrap();

    assert_eq!(count, 2);
    let records = published(&sink).await;
    assert_eq!(records[0]["available_price"], "12.50");
    assert_eq!(records[1]["stock"], "Out of Stock");
}

#[tokio::test]
async fn test_nested_value_closing_at_end_of_line_is_not_a_record_boundary() {
    let file = write_input("{\"meta\": {\"id\": \"P1\"}\n, \"source\": \"X\"}\n{\"x\": \"}\"}\n");
    let sink = MemorySink::new();

    let count = process_file(file.path(), "products", &sink).await.unwrap();

    assert_eq!(count, 2);
    assert_eq!(
        published(&sink).await,
        vec![json!({"meta": {"id": "P1"}, "source": "X"}), json!({"x": "}"})]
    );
}

#[tokio::test]
async fn test_empty_file_is_zero_records_not_failure() {
    let file = write_input("\n\n");
    let sink = MemorySink::new();

    let count = process_file(file.path(), "products", &sink).await.unwrap();

    assert_eq!(count, 0);
    assert!(sink.is_empty().await);
}

// ============================================================================
// Read Failures
// ============================================================================

#[tokio::test]
async fn test_missing_file_fails_without_publishing() {
    let sink = MemorySink::new();

    let result = process_file(
        std::path::Path::new("/nonexistent/dataweave/input.json"),
        "products",
        &sink,
    )
    .await;

    assert!(matches!(result, Err(IngestError::Read(ReaderError::Open { .. }))));
    assert!(sink.is_empty().await);
}

#[tokio::test]
async fn test_invalid_json_stops_publishing_at_failure_point() {
    let file = write_input("{\"a\":1}\n{\"b\": tru}\n{\"c\":3}\n");
    let sink = MemorySink::new();

    let result = process_file(file.path(), "products", &sink).await;

    assert!(matches!(
        result,
        Err(IngestError::Read(ReaderError::Malformed { line: 2, .. }))
    ));
    assert_eq!(published(&sink).await, vec![json!({"a": 1})]);
}

#[tokio::test]
async fn test_unterminated_object_fails() {
    let file = write_input("{\"a\":1}\n{\"b\":2\n");
    let sink = MemorySink::new();

    let result = process_file(file.path(), "products", &sink).await;

    assert!(matches!(
        result,
        Err(IngestError::Read(ReaderError::Unterminated { line: 2 }))
    ));
    assert_eq!(sink.len().await, 1);
}

// ============================================================================
// Publish Failures
// ============================================================================

#[tokio::test]
async fn test_publish_failure_is_propagated_and_stops_the_file() {
    let file = write_input("{\"a\":1}\n{\"b\":2}\n{\"c\":3}\n");
    let sink = FlakySink::new(1);

    let result = process_file(file.path(), "products", &sink).await;

    match result {
        Err(IngestError::Publish { record, source }) => {
            assert_eq!(record, 2);
            assert!(matches!(source, PublishError::Nacked { .. }));
        },
        other => panic!("expected publish failure, got {:?}", other),
    }
    assert_eq!(sink.calls.load(Ordering::SeqCst), 2);
    assert_eq!(published(&sink.inner).await, vec![json!({"a": 1})]);
}

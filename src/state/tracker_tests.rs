//! Tests for ProgressTracker

use super::*;
use crate::store::{DuckDbStore, ProgressRecord, Store};
use std::sync::Arc;

fn store() -> Arc<dyn Store> {
    Arc::new(DuckDbStore::in_memory().unwrap())
}

// ============================================================================
// Loading
// ============================================================================

#[tokio::test]
async fn test_load_seeds_from_store() {
    let store = store();
    store
        .record_progress(&ProgressRecord::new("RDSP2401", "RD", "rd", 10))
        .unwrap();
    store
        .record_progress(&ProgressRecord::new("PASP2401", "PA", "pa", 10))
        .unwrap();

    let tracker = ProgressTracker::load(store, "RD", "rd").await.unwrap();
    assert!(tracker.is_committed("RDSP2401").await);
    assert!(!tracker.is_committed("PASP2401").await);
    assert_eq!(tracker.committed_count().await, 1);
}

// ============================================================================
// Recording
// ============================================================================

#[tokio::test]
async fn test_record_persists_and_updates_skip_set() {
    let store = store();
    let tracker = ProgressTracker::load(Arc::clone(&store), "RD", "rd")
        .await
        .unwrap();

    let record = tracker.record("RDSP2401", 42).await.unwrap();
    assert_eq!(record.rows_inserted, 42);
    assert_eq!(record.table_name, "rd");
    assert!(tracker.is_committed("RDSP2401").await);
    assert!(store.query_progress("rd").unwrap().contains("RDSP2401"));
}

#[tokio::test]
async fn test_record_twice_is_rejected() {
    let tracker = ProgressTracker::load(store(), "RD", "rd").await.unwrap();
    tracker.record("RDSP2401", 1).await.unwrap();

    let err = tracker.record("RDSP2401", 1).await.unwrap_err();
    assert!(matches!(err, crate::Error::Progress { .. }));
}

#[tokio::test]
async fn test_concurrent_records_are_serialized() {
    let tracker = Arc::new(ProgressTracker::load(store(), "RD", "rd").await.unwrap());

    let mut handles = Vec::new();
    for i in 0..8 {
        let tracker = Arc::clone(&tracker);
        handles.push(tokio::spawn(async move {
            tracker.record(&format!("RDSP24{i:02}"), i).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let snapshot = tracker.snapshot().await;
    assert_eq!(snapshot.committed_units.len(), 8);
    assert!(snapshot.contains("RDSP2403"));
    assert!(!snapshot.contains("RDSP2499"));
}

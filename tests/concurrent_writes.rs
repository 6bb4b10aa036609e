//! Concurrency tests for the row write paths
//!
//! Many writers referencing the same not-yet-existing codes, and many
//! upserts of the same code, must converge on exactly one row each without
//! surfacing uniqueness conflicts.

use minz::engine::traits::{DocumentStore, FindQuery};
use minz::{Classifier, Dimension, DimensionEngine, Row};
use std::sync::Arc;

async fn engine() -> Arc<DimensionEngine> {
    let engine = DimensionEngine::in_memory().await.unwrap();
    engine
        .define_dimension(Dimension::new("region", "Region"))
        .await
        .unwrap();
    engine
        .define_dimension(
            Dimension::new("comuna", "Comuna")
                .with_classifier(Classifier::new("region", "region", "00")),
        )
        .await
        .unwrap();
    Arc::new(engine)
}

async fn ids(engine: &DimensionEngine, collection: &str) -> Vec<String> {
    engine
        .store()
        .find(collection, FindQuery::all())
        .await
        .unwrap()
        .iter()
        .filter_map(|doc| doc.get("_id").and_then(|v| v.as_str()).map(String::from))
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_ensure_default_row_creates_one() {
    let engine = engine().await;

    let mut handles = Vec::new();
    for _ in 0..32 {
        let engine = Arc::clone(&engine);
        handles.push(tokio::spawn(async move {
            engine.ensure_default_row("region", "07").await
        }));
    }

    let results: Vec<bool> = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    assert_eq!(results.iter().filter(|created| **created).count(), 1);
    assert_eq!(ids(&engine, "region").await, vec!["07".to_string()]);
    assert_eq!(
        engine.get_row("region", "07").await.unwrap().unwrap().name,
        "Region 07"
    );
}

#[tokio::test]
async fn test_sequential_ensure_default_row_is_idempotent() {
    let engine = engine().await;
    assert!(engine.ensure_default_row("region", "07").await.unwrap());
    assert!(!engine.ensure_default_row("region", "07").await.unwrap());
    assert_eq!(engine.count("region", None, None).await.unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_batch_references_same_missing_codes() {
    let engine = engine().await;

    let mut handles = Vec::new();
    for i in 0..40 {
        let engine = Arc::clone(&engine);
        handles.push(tokio::spawn(async move {
            let region = format!("{:02}", i % 4 + 1);
            engine
                .upsert_row(
                    "comuna",
                    Row::new(format!("c{}", i), format!("Comuna {}", i)).with_field("region", region),
                )
                .await
        }));
    }
    for joined in futures::future::join_all(handles).await {
        joined.unwrap().unwrap();
    }

    assert_eq!(engine.count("comuna", None, None).await.unwrap(), 40);
    let mut regions = ids(&engine, "region").await;
    regions.sort();
    assert_eq!(regions, vec!["01", "02", "03", "04"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_upserts_of_same_code_leave_one_row() {
    let engine = engine().await;

    let mut handles = Vec::new();
    for i in 0..16 {
        let engine = Arc::clone(&engine);
        handles.push(tokio::spawn(async move {
            engine
                .upsert_row("region", Row::new("05", format!("Coquimbo v{}", i)))
                .await
        }));
    }
    let names: Vec<String> = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap().name)
        .collect();

    assert_eq!(ids(&engine, "region").await, vec!["05".to_string()]);
    let stored = engine.get_row("region", "05").await.unwrap().unwrap();
    assert!(names.contains(&stored.name));
}

#[tokio::test]
async fn test_upsert_keeps_latest_name_and_order() {
    let engine = engine().await;
    let first = engine
        .upsert_row("region", Row::new("05", "Coquimbo"))
        .await
        .unwrap();
    engine
        .upsert_row("region", Row::new("06", "O'Higgins"))
        .await
        .unwrap();
    engine
        .upsert_row("region", Row::new("05", "IV Región"))
        .await
        .unwrap();

    let stored = engine.get_row("region", "05").await.unwrap().unwrap();
    assert_eq!(stored.name, "IV Región");
    assert_eq!(stored.order, first.order);
    assert_eq!(engine.count("region", None, None).await.unwrap(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_adds_may_share_order() {
    let engine = engine().await;

    let mut handles = Vec::new();
    for i in 0..20 {
        let engine = Arc::clone(&engine);
        handles.push(tokio::spawn(async move {
            engine
                .add_row("region", Row::new(format!("r{}", i), "R"))
                .await
        }));
    }
    for joined in futures::future::join_all(handles).await {
        joined.unwrap().unwrap();
    }

    // Order is display-only: every row landed, orders are positive
    let rows = engine
        .rows("region", None, None, None, None)
        .await
        .unwrap();
    assert_eq!(rows.len(), 20);
    assert!(rows.iter().all(|r| r.order >= 1));
    assert!(rows.windows(2).all(|w| w[0].order <= w[1].order));
}

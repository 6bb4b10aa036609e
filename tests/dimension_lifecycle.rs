//! Dimension lifecycle tests
//!
//! Define, update, remove and classifier administration through the engine
//! facade, checked against what the backing store actually holds.

use minz::engine::traits::DocumentStore;
use minz::storage::InMemoryStore;
use minz::{Classifier, Dimension, DimensionEngine, ErrorKind, Row};
use std::sync::Arc;

fn comuna() -> Dimension {
    Dimension::new("comuna", "Comuna")
        .with_classifier(Classifier::new("provincia", "provincia", "000"))
        .with_classifier(Classifier::new("region", "region", "00"))
}

#[tokio::test]
async fn test_define_then_get_preserves_classifier_order() {
    let engine = DimensionEngine::in_memory().await.unwrap();
    let stored = engine.define_dimension(comuna()).await.unwrap();
    assert_eq!(stored, comuna());

    let fetched = engine.get_dimension("comuna").unwrap();
    assert_eq!(fetched.code, "comuna");
    assert_eq!(fetched.name, "Comuna");
    let fields: Vec<_> = fetched
        .classifiers
        .iter()
        .map(|c| c.field_name.as_str())
        .collect();
    assert_eq!(fields, vec!["provincia", "region"]);
}

#[tokio::test]
async fn test_define_provisions_row_collection() {
    let store = Arc::new(InMemoryStore::new());
    let engine = DimensionEngine::builder()
        .with_store_arc(store.clone())
        .build()
        .await
        .unwrap();
    engine
        .define_dimension(Dimension::new("region", "Region"))
        .await
        .unwrap();

    let collections = store.list_collections().await.unwrap();
    assert!(collections.contains(&"region".to_string()));
    assert!(collections.contains(&"z_dimensions".to_string()));
}

#[tokio::test]
async fn test_invalid_classifier_leaves_no_trace() {
    let store = Arc::new(InMemoryStore::new());
    let engine = DimensionEngine::builder()
        .with_store_arc(store.clone())
        .build()
        .await
        .unwrap();

    for broken in [
        Classifier::new("", "region", "00"),
        Classifier::new("region", "", "00"),
        Classifier::new("region", "region", ""),
    ] {
        let err = engine
            .define_dimension(Dimension::new("comuna", "Comuna").with_classifier(broken))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    assert!(engine.get_dimension("comuna").is_none());
    assert!(!store
        .list_collections()
        .await
        .unwrap()
        .contains(&"comuna".to_string()));
    assert!(engine.registry().store().find_one("z_dimensions", "comuna").await.unwrap().is_none());
}

#[tokio::test]
async fn test_define_existing_code_is_storage_error() {
    let engine = DimensionEngine::in_memory().await.unwrap();
    engine
        .define_dimension(Dimension::new("region", "Region"))
        .await
        .unwrap();
    let err = engine
        .define_dimension(Dimension::new("region", "Otra"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Storage);
    assert_eq!(engine.get_dimension("region").unwrap().name, "Region");
}

#[tokio::test]
async fn test_update_replaces_name_and_classifiers() {
    let engine = DimensionEngine::in_memory().await.unwrap();
    engine.define_dimension(comuna()).await.unwrap();

    let updated = Dimension::new("comuna", "Comunas de Chile")
        .with_classifier(Classifier::new("region", "region", "13"));
    engine.update_dimension(updated.clone()).await.unwrap();
    assert_eq!(engine.get_dimension("comuna").unwrap(), updated);

    let err = engine
        .update_dimension(Dimension::new("pais", "Pais"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_remove_drops_rows() {
    let engine = DimensionEngine::in_memory().await.unwrap();
    engine
        .define_dimension(Dimension::new("region", "Region"))
        .await
        .unwrap();
    engine
        .add_row("region", Row::new("05", "Coquimbo"))
        .await
        .unwrap();

    engine.remove_dimension("region").await.unwrap();
    assert!(engine.get_dimension("region").is_none());
    assert!(!engine
        .store()
        .list_collections()
        .await
        .unwrap()
        .contains(&"region".to_string()));
    assert_eq!(
        engine.get_row("region", "05").await.unwrap_err().kind(),
        ErrorKind::NotFound
    );
    assert_eq!(
        engine.remove_dimension("region").await.unwrap_err().kind(),
        ErrorKind::NotFound
    );

    // The code is free again
    engine
        .define_dimension(Dimension::new("region", "Region"))
        .await
        .unwrap();
    assert_eq!(engine.count("region", None, None).await.unwrap(), 0);
}

#[tokio::test]
async fn test_list_matches_code_or_name_ignoring_case() {
    let engine = DimensionEngine::in_memory().await.unwrap();
    engine.define_dimension(comuna()).await.unwrap();
    engine
        .define_dimension(Dimension::new("region", "Región"))
        .await
        .unwrap();
    engine
        .define_dimension(Dimension::new("prod", "Producto"))
        .await
        .unwrap();

    assert_eq!(engine.list_dimensions(None).len(), 3);

    let mut codes: Vec<_> = engine
        .list_dimensions(Some("O"))
        .into_iter()
        .map(|d| d.code)
        .collect();
    codes.sort();
    assert_eq!(codes, vec!["comuna", "prod", "region"]);

    let codes: Vec<_> = engine
        .list_dimensions(Some("DUCT"))
        .into_iter()
        .map(|d| d.code)
        .collect();
    assert_eq!(codes, vec!["prod"]);
    assert!(engine.list_dimensions(Some("xyz")).is_empty());
}

#[tokio::test]
async fn test_classifier_administration() {
    let engine = DimensionEngine::in_memory().await.unwrap();
    engine
        .define_dimension(Dimension::new("comuna", "Comuna"))
        .await
        .unwrap();

    engine
        .add_classifier("comuna", Classifier::new("region", "region", "00"))
        .await
        .unwrap();
    let err = engine
        .add_classifier("comuna", Classifier::new("region", "region", "01"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    engine
        .save_classifier("comuna", Classifier::new("region", "region", "13"))
        .await
        .unwrap();
    let dim = engine.get_dimension("comuna").unwrap();
    assert_eq!(dim.classifiers.len(), 1);
    assert_eq!(dim.classifiers[0].default_value, "13");

    let dim = engine.remove_classifier("comuna", "region").await.unwrap();
    assert!(dim.classifiers.is_empty());
    assert!(engine.get_dimension("comuna").unwrap().classifiers.is_empty());
}

#[tokio::test]
async fn test_export_import_between_engines() {
    let source = DimensionEngine::in_memory().await.unwrap();
    source
        .define_dimension(Dimension::new("region", "Region"))
        .await
        .unwrap();
    source.define_dimension(comuna()).await.unwrap();

    let exported = source.export_dimensions();
    let codes: Vec<_> = exported.iter().map(|d| d.code.as_str()).collect();
    assert_eq!(codes, vec!["comuna", "region"]);

    let json = serde_json::to_string(&exported).unwrap();
    let target = DimensionEngine::in_memory().await.unwrap();
    target
        .define_dimension(Dimension::new("region", "Old name"))
        .await
        .unwrap();
    let applied = target
        .import_dimensions(serde_json::from_str(&json).unwrap())
        .await
        .unwrap();
    assert_eq!(applied, 2);
    assert_eq!(target.export_dimensions(), exported);
}

#[tokio::test]
async fn test_definitions_survive_engine_restart() {
    let store: Arc<dyn DocumentStore> = Arc::new(InMemoryStore::new());
    {
        let engine = DimensionEngine::builder()
            .with_store_arc(Arc::clone(&store))
            .build()
            .await
            .unwrap();
        engine.define_dimension(comuna()).await.unwrap();
    }

    let engine = DimensionEngine::builder()
        .with_store_arc(store)
        .build()
        .await
        .unwrap();
    assert_eq!(engine.get_dimension("comuna").unwrap(), comuna());
}

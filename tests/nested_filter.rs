//! Nested filter tests over a three-level geography
//!
//! comuna → provincia → region, where filters on comuna can reach into the
//! attributes of the referenced provincia and, through it, the region.

use minz::{
    Classifier, Dimension, DimensionEngine, ErrorKind, FieldFilter, FilterExpr, Row,
};

async fn geography() -> DimensionEngine {
    let engine = DimensionEngine::in_memory().await.unwrap();
    engine
        .define_dimension(Dimension::new("region", "Region"))
        .await
        .unwrap();
    engine
        .define_dimension(
            Dimension::new("provincia", "Provincia")
                .with_classifier(Classifier::new("region", "region", "00")),
        )
        .await
        .unwrap();
    engine
        .define_dimension(
            Dimension::new("comuna", "Comuna")
                .with_classifier(Classifier::new("provincia", "provincia", "000")),
        )
        .await
        .unwrap();

    for (code, name) in [("04", "Coquimbo"), ("05", "Valparaíso"), ("13", "Metropolitana")] {
        engine.add_row("region", Row::new(code, name)).await.unwrap();
    }
    for (code, name, region) in [
        ("elqui", "Elqui", "04"),
        ("limari", "Limarí", "04"),
        ("quillota", "Quillota", "05"),
        ("sanantonio", "San Antonio", "05"),
        ("santiago", "Santiago", "13"),
        ("gone", "Eliminada", "05"),
    ] {
        engine
            .add_row("provincia", Row::new(code, name).with_field("region", region))
            .await
            .unwrap();
    }
    for (code, name, provincia) in [
        ("laserena", "La Serena", "elqui"),
        ("ovalle", "Ovalle", "limari"),
        ("quillota", "Quillota", "quillota"),
        ("limache", "Limache", "quillota"),
        ("cartagena", "Cartagena", "sanantonio"),
        ("nunoa", "Ñuñoa", "santiago"),
        ("huerfana", "Huérfana", "gone"),
    ] {
        engine
            .add_row("comuna", Row::new(code, name).with_field("provincia", provincia))
            .await
            .unwrap();
    }

    // Leaves "huerfana" pointing at a provincia that no longer exists
    engine.delete_row("provincia", "gone").await.unwrap();
    engine
}

fn codes(rows: &[Row]) -> Vec<&str> {
    rows.iter().map(|r| r.code.as_str()).collect()
}

#[tokio::test]
async fn test_filter_on_attribute_of_attribute() {
    let engine = geography().await;
    let filter = FilterExpr::parse(r#"{"provincia": {"region": "05"}}"#)
        .unwrap()
        .unwrap();

    let rows = engine
        .rows("comuna", None, Some(&filter), None, None)
        .await
        .unwrap();
    assert_eq!(codes(&rows), vec!["quillota", "limache", "cartagena"]);
    assert_eq!(engine.count("comuna", None, Some(&filter)).await.unwrap(), 3);
}

#[tokio::test]
async fn test_unresolved_reference_is_excluded_by_nested_filter() {
    let engine = geography().await;

    // Plain reads keep the dangling row
    assert_eq!(engine.count("comuna", None, None).await.unwrap(), 7);

    // Any nested condition requires the join to resolve
    let filter = FilterExpr::Fields(
        FieldFilter::new().nested("provincia", FieldFilter::new().one_of("region", ["04", "05", "13"])),
    );
    let rows = engine
        .rows("comuna", None, Some(&filter), None, None)
        .await
        .unwrap();
    assert_eq!(rows.len(), 6);
    assert!(!codes(&rows).contains(&"huerfana"));
}

#[tokio::test]
async fn test_local_and_nested_conditions_combine() {
    let engine = geography().await;
    let filter = FilterExpr::parse(
        r#"{"provincia": {"region": ["04", "05"], "name": "Quillota"}, "name": ["Limache", "Ovalle"]}"#,
    )
    .unwrap()
    .unwrap();

    let rows = engine
        .rows("comuna", None, Some(&filter), None, None)
        .await
        .unwrap();
    assert_eq!(codes(&rows), vec!["limache"]);
}

#[tokio::test]
async fn test_text_filter_with_nested_filter() {
    let engine = geography().await;
    let filter = FilterExpr::parse(r#"{"provincia": {"region": "04"}}"#)
        .unwrap()
        .unwrap();

    let rows = engine
        .rows("comuna", Some("SERENA"), Some(&filter), None, None)
        .await
        .unwrap();
    assert_eq!(codes(&rows), vec!["laserena"]);

    // Text also matches codes
    let rows = engine
        .rows("comuna", Some("ova"), Some(&filter), None, None)
        .await
        .unwrap();
    assert_eq!(codes(&rows), vec!["ovalle"]);
}

#[tokio::test]
async fn test_code_list_shortcut() {
    let engine = geography().await;
    let filter = FilterExpr::parse(r#"["nunoa", "ovalle", "nowhere"]"#)
        .unwrap()
        .unwrap();
    let rows = engine
        .rows("comuna", None, Some(&filter), None, None)
        .await
        .unwrap();
    assert_eq!(codes(&rows), vec!["ovalle", "nunoa"]);
}

#[tokio::test]
async fn test_unknown_nested_field_is_rejected() {
    let engine = geography().await;
    let filter = FilterExpr::parse(r#"{"provincia": {"pais": {"code": "cl"}}}"#)
        .unwrap()
        .unwrap();

    let err = engine
        .count("comuna", None, Some(&filter))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidFilterField);
    assert!(err.to_string().contains("pais"));
    assert!(err.to_string().contains("provincia"));
}

#[tokio::test]
async fn test_excessive_nesting_is_rejected() {
    let engine = DimensionEngine::in_memory().await.unwrap();
    engine
        .define_dimension(
            Dimension::new("nodo", "Nodo").with_classifier(Classifier::new("padre", "nodo", "raiz")),
        )
        .await
        .unwrap();

    let mut nested = FieldFilter::new().equals("code", "raiz");
    for _ in 0..engine.config().filter.max_depth {
        nested = FieldFilter::new().nested("padre", nested);
    }
    let err = engine
        .count("nodo", None, Some(&FilterExpr::Fields(nested)))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidFilterField);
    assert!(err.to_string().contains("padre.padre"));
}

#[tokio::test]
async fn test_names_use_outer_join() {
    let engine = geography().await;
    let rows = engine
        .rows_with_names("comuna", None, None, 0, 0)
        .await
        .unwrap();
    assert_eq!(rows.len(), 7);

    let ovalle = rows.iter().find(|r| r.code == "ovalle").unwrap();
    assert_eq!(ovalle.field("provincia_name"), Some("Limarí"));

    let orphan = rows.iter().find(|r| r.code == "huerfana").unwrap();
    assert_eq!(orphan.field("provincia"), Some("gone"));
    assert_eq!(orphan.field("provincia_name"), None);
}

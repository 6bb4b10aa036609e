use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use minz::{Classifier, Dimension, DimensionEngine, FilterExpr, Row};

async fn build_geography(comunas: usize) -> DimensionEngine {
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

    for p in 0..50 {
        engine
            .add_row(
                "provincia",
                Row::new(format!("p{}", p), format!("Provincia {}", p))
                    .with_field("region", format!("{:02}", p % 16)),
            )
            .await
            .unwrap();
    }
    for c in 0..comunas {
        engine
            .add_row(
                "comuna",
                Row::new(format!("c{}", c), format!("Comuna {}", c))
                    .with_field("provincia", format!("p{}", c % 50)),
            )
            .await
            .unwrap();
    }
    engine
}

fn bench_compile(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let engine = rt.block_on(build_geography(0));
    let filter = FilterExpr::parse(r#"{"provincia": {"region": ["05", "06"], "name": "x"}}"#)
        .unwrap()
        .unwrap();

    c.bench_function("compile_nested_filter", |b| {
        b.iter(|| {
            black_box(
                engine
                    .filter_pipeline("comuna", Some("ova"), Some(&filter))
                    .unwrap(),
            )
        })
    });
}

fn bench_nested_count(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let filter = FilterExpr::parse(r#"{"provincia": {"region": "05"}}"#)
        .unwrap()
        .unwrap();

    let mut group = c.benchmark_group("nested_count");
    for size in [100, 1000, 5000].iter() {
        let engine = rt.block_on(build_geography(*size));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                rt.block_on(async {
                    black_box(engine.count("comuna", None, Some(&filter)).await.unwrap())
                })
            });
        });
    }
    group.finish();
}

fn bench_rows_with_names(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    let mut group = c.benchmark_group("rows_with_names");
    for size in [100, 1000].iter() {
        let engine = rt.block_on(build_geography(*size));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                rt.block_on(async {
                    black_box(
                        engine
                            .rows_with_names("comuna", None, None, 0, 50)
                            .await
                            .unwrap(),
                    )
                })
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_compile, bench_nested_count, bench_rows_with_names);
criterion_main!(benches);

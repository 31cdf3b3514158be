//! Client -> worker -> engine -> snapshot, over both transports.

use std::time::Duration;

use pivotcast_client::{Engine, ViewEvent};
use pivotcast_core::config::{Transport, WorkerConfig};
use pivotcast_core::flat::FlatResult;
use pivotcast_core::row;
use pivotcast_core::schema::{LogicalType, Schema};
use pivotcast_core::types::Scalar;
use pivotcast_core::view_config::{AggregateConfig, ViewConfig};
use tokio::sync::mpsc;
use tokio::time::timeout;

fn config(transport: Transport) -> WorkerConfig {
    WorkerConfig {
        poll_interval_ms: 10,
        transport,
        ..WorkerConfig::default()
    }
}

fn schema() -> Schema {
    Schema::new()
        .with("x", LogicalType::Integer)
        .with("y", LogicalType::String)
}

fn seed(engine: &Engine) -> pivotcast_client::Table {
    let table = engine.table(schema());
    table.update(vec![
        row! { "x" => 1, "y" => "a" },
        row! { "x" => 2, "y" => "a" },
        row! { "x" => 3, "y" => "b" },
    ]);
    table
}

async fn zero_sided_snapshot(transport: Transport) -> FlatResult {
    let engine = Engine::new(config(transport)).unwrap();
    let view = seed(&engine).view(ViewConfig::default()).unwrap();
    let flat = view.to_flat().await.unwrap();
    engine.shutdown().await;
    flat
}

#[tokio::test]
async fn zero_sided_view_returns_raw_rows() {
    let flat = zero_sided_snapshot(Transport::Shared).await;
    assert_eq!(flat.header, vec!["x", "y"]);
    assert!(flat.row_spans.is_empty());
    assert_eq!(
        flat.data,
        vec![
            vec![Scalar::Int(1), Scalar::from("a")],
            vec![Scalar::Int(2), Scalar::from("a")],
            vec![Scalar::Int(3), Scalar::from("b")],
        ]
    );
}

#[tokio::test]
async fn serialized_transport_behaves_the_same() {
    let shared = zero_sided_snapshot(Transport::Shared).await;
    let serialized = zero_sided_snapshot(Transport::Serialized).await;
    assert_eq!(shared, serialized);
}

#[tokio::test]
async fn one_sided_view_compresses_row_headers() {
    let engine = Engine::new(config(Transport::Shared)).unwrap();
    let view = seed(&engine)
        .view(
            ViewConfig::default()
                .with_row_pivot(["y"])
                .with_aggregate(AggregateConfig::new("sum", "x")),
        )
        .unwrap();
    let flat = view.to_flat().await.unwrap();

    let top: Vec<(String, usize)> = flat.row_spans[0]
        .iter()
        .map(|s| (s.label.label(), s.run_length))
        .collect();
    assert_eq!(top, vec![("a".to_string(), 2), ("b".to_string(), 1)]);
    let covered: usize = flat.row_spans[0].iter().map(|s| s.run_length).sum();
    assert_eq!(covered, flat.data.len());
    engine.shutdown().await;
}

#[tokio::test]
async fn two_sided_view_has_column_spans() {
    let engine = Engine::new(config(Transport::Shared)).unwrap();
    let view = seed(&engine)
        .view(
            ViewConfig::default()
                .with_row_pivot(["y"])
                .with_column_pivot(["y"])
                .with_aggregate(AggregateConfig::new("sum", "x")),
        )
        .unwrap();
    let flat = view.to_flat().await.unwrap();
    assert!(!flat.col_spans.is_empty());
    let width: usize = flat.col_spans[0].iter().map(|s| s.run_length()).sum();
    assert_eq!(width, flat.header.len());
    engine.shutdown().await;
}

#[tokio::test]
async fn deltas_applied_to_the_snapshot_match_a_fresh_one() {
    let engine = Engine::new(config(Transport::Shared)).unwrap();
    let table = engine.table_named("keyed", schema(), Some("x"));
    table.update(vec![
        row! { "x" => 1, "y" => "a" },
        row! { "x" => 2, "y" => "b" },
    ]);
    let view = table.view(ViewConfig::default()).unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    view.subscribe(move |event| {
        let _ = tx.send(event.clone());
    });

    let mut state = match timeout(Duration::from_secs(5), rx.recv()).await {
        Ok(Some(ViewEvent::Snapshot(flat))) => flat,
        other => panic!("expected a snapshot first, got {other:?}"),
    };

    table.update(vec![row! { "x" => 2, "y" => "changed" }]);
    loop {
        match timeout(Duration::from_secs(5), rx.recv()).await {
            Ok(Some(ViewEvent::Snapshot(flat))) => state = flat,
            Ok(Some(ViewEvent::Update(deltas))) => {
                state.apply(&deltas);
                break;
            }
            other => panic!("no update arrived: {other:?}"),
        }
    }

    let fresh = view.to_flat().await.unwrap();
    assert_eq!(state.data, fresh.data);
    assert_eq!(fresh.data[1][1], Scalar::from("changed"));
    engine.shutdown().await;
}

#[tokio::test]
async fn set_depth_collapses_row_levels() {
    let engine = Engine::new(config(Transport::Shared)).unwrap();
    let table = engine.table(
        Schema::new()
            .with("region", LogicalType::String)
            .with("city", LogicalType::String)
            .with("units", LogicalType::Integer),
    );
    table.update(vec![
        row! { "region" => "east", "city" => "a", "units" => 1 },
        row! { "region" => "east", "city" => "b", "units" => 2 },
        row! { "region" => "west", "city" => "c", "units" => 3 },
    ]);
    let view = table
        .view(
            ViewConfig::default()
                .with_row_pivot(["region", "city"])
                .with_aggregate(AggregateConfig::new("sum", "units")),
        )
        .unwrap();
    let expanded = view.to_flat().await.unwrap();
    view.set_depth(0, false);
    let collapsed = view.to_flat().await.unwrap();
    assert!(collapsed.row_spans.len() < expanded.row_spans.len());
    engine.shutdown().await;
}

#[tokio::test]
async fn commands_after_delete_are_harmless() {
    let engine = Engine::new(config(Transport::Shared)).unwrap();
    let table = seed(&engine);
    let doomed = table.view(ViewConfig::default()).unwrap();
    doomed.delete();
    doomed.set_depth(1, false);
    table.delete();
    table.update(vec![row! { "x" => 9 }]);

    let survivor = seed(&engine).view(ViewConfig::default()).unwrap();
    let flat = survivor.to_flat().await.unwrap();
    assert_eq!(flat.data.len(), 3);
    engine.shutdown().await;
}

//! Subscriber delivery, deletion races and shutdown.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use pivotcast_client::{ClientError, Engine, ViewEvent};
use pivotcast_core::config::WorkerConfig;
use pivotcast_core::row;
use pivotcast_core::schema::{LogicalType, Schema};
use pivotcast_core::view_config::ViewConfig;

fn fast() -> WorkerConfig {
    WorkerConfig {
        poll_interval_ms: 5,
        ..WorkerConfig::default()
    }
}

fn schema() -> Schema {
    Schema::new()
        .with("x", LogicalType::Integer)
        .with("y", LogicalType::String)
}

#[tokio::test]
async fn delete_right_after_subscribe_stops_callbacks() {
    let engine = Engine::new(fast()).unwrap();
    let table = engine.table(schema());
    table.update(vec![row! { "x" => 1, "y" => "a" }]);

    for _ in 0..20 {
        let view = table.view(ViewConfig::default()).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        view.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        view.delete();
        let at_delete = calls.load(Ordering::SeqCst);

        table.update(vec![row! { "x" => 2, "y" => "b" }]);
        tokio::time::sleep(Duration::from_millis(15)).await;
        assert_eq!(calls.load(Ordering::SeqCst), at_delete);
    }

    // The worker is still healthy.
    let view = table.view(ViewConfig::default()).unwrap();
    assert_eq!(view.to_flat().await.unwrap().data.len(), 21);
    engine.shutdown().await;
}

#[tokio::test]
async fn callbacks_see_updates_from_the_poll() {
    let engine = Engine::new(fast()).unwrap();
    let table = engine.table(schema());
    let view = table.view(ViewConfig::default()).unwrap();

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    view.subscribe(move |event| {
        if let ViewEvent::Snapshot(flat) = event {
            let _ = tx.send(flat.data.len());
        }
    });
    table.update(vec![row! { "x" => 1, "y" => "a" }, row! { "x" => 2, "y" => "b" }]);

    let mut seen = Vec::new();
    while let Ok(Some(rows)) = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await {
        seen.push(rows);
        if rows == 2 {
            break;
        }
    }
    assert_eq!(seen.last(), Some(&2));
    engine.shutdown().await;
}

#[tokio::test]
async fn a_panicking_callback_does_not_stop_the_others() {
    let engine = Engine::new(fast()).unwrap();
    let table = engine.table(schema());
    table.update(vec![row! { "x" => 1, "y" => "a" }]);
    let view = table.view(ViewConfig::default()).unwrap();

    let good = Arc::new(AtomicUsize::new(0));
    view.subscribe(|_| panic!("subscriber bug"));
    let counter = Arc::clone(&good);
    view.subscribe(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    view.to_flat().await.unwrap();
    assert!(good.load(Ordering::SeqCst) >= 1);
    engine.shutdown().await;
}

#[tokio::test]
async fn pending_to_flat_fails_on_shutdown() {
    let engine = Engine::new(fast()).unwrap();
    let table = engine.table(schema());
    let view = table.view(ViewConfig::default()).unwrap();
    view.delete();
    // The worker no longer knows the view, so only shutdown can settle this.
    let pending = tokio::spawn({
        let view = view.clone();
        async move { view.to_flat().await }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    engine.shutdown().await;
    let res = pending.await.unwrap();
    assert!(matches!(res, Err(ClientError::Closed)));
}

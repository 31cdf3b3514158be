//! Arrow IPC buffers through the client, the worker and the engine.

use std::sync::Arc;

use arrow::array::{Array, ArrayRef, Int32Array, Int64Array, ListArray, StringArray};
use arrow::datatypes::{DataType, Field, Int32Type, Schema as ArrowSchema};
use arrow::ipc::writer::{FileWriter, StreamWriter};
use arrow::record_batch::RecordBatch;
use bytes::Bytes;

use pivotcast_client::Engine;
use pivotcast_core::config::{Transport, WorkerConfig};
use pivotcast_core::schema::{LogicalType, Schema};
use pivotcast_core::types::Scalar;
use pivotcast_core::view_config::ViewConfig;

fn batch() -> RecordBatch {
    let tags = ListArray::from_iter_primitive::<Int32Type, _, _>(vec![
        Some(vec![Some(1)]),
        None,
        Some(vec![Some(2), Some(3)]),
    ]);
    let schema = ArrowSchema::new(vec![
        Field::new("x", DataType::Int64, true),
        Field::new("y", DataType::Utf8, true),
        Field::new("tags", tags.data_type().clone(), true),
        Field::new("small", DataType::Int32, true),
    ]);
    RecordBatch::try_new(
        Arc::new(schema),
        vec![
            Arc::new(Int64Array::from(vec![1, 2, 3])) as ArrayRef,
            Arc::new(StringArray::from(vec![Some("a"), None, Some("b")])) as ArrayRef,
            Arc::new(tags) as ArrayRef,
            Arc::new(Int32Array::from(vec![7, 8, 9])) as ArrayRef,
        ],
    )
    .unwrap()
}

fn stream_bytes() -> Vec<u8> {
    let batch = batch();
    let mut buf = Vec::new();
    {
        let mut writer = StreamWriter::try_new(&mut buf, &batch.schema()).unwrap();
        writer.write(&batch).unwrap();
        writer.finish().unwrap();
    }
    buf
}

fn file_bytes() -> Vec<u8> {
    let batch = batch();
    let mut buf = Vec::new();
    {
        let mut writer = FileWriter::try_new(&mut buf, &batch.schema()).unwrap();
        writer.write(&batch).unwrap();
        writer.finish().unwrap();
    }
    buf
}

fn table_schema() -> Schema {
    Schema::new()
        .with("x", LogicalType::Integer)
        .with("y", LogicalType::String)
        .with("tags", LogicalType::String)
        .with("small", LogicalType::Integer)
}

async fn ingest(bytes: Vec<u8>, transport: Transport) -> Vec<Vec<Scalar>> {
    let engine = Engine::new(WorkerConfig {
        transport,
        ..WorkerConfig::default()
    })
    .unwrap();
    let table = engine.table(table_schema());
    table.update_buffer(Bytes::from(bytes));
    let view = table.view(ViewConfig::default()).unwrap();
    let flat = view.to_flat().await.unwrap();
    engine.shutdown().await;
    flat.data
}

#[tokio::test]
async fn unsupported_columns_are_skipped() {
    let data = ingest(stream_bytes(), Transport::Shared).await;
    assert_eq!(data.len(), 3);
    assert_eq!(
        data[0],
        vec![Scalar::Int(1), Scalar::from("a"), Scalar::Null, Scalar::Int(7)]
    );
    assert_eq!(data[1][1], Scalar::Null);
    // The list column never reached the table.
    assert!(data.iter().all(|row| row[2].is_null()));
}

#[tokio::test]
async fn file_framing_matches_stream_framing() {
    let stream = ingest(stream_bytes(), Transport::Shared).await;
    let file = ingest(file_bytes(), Transport::Serialized).await;
    assert_eq!(stream, file);
}

#[tokio::test]
async fn garbage_buffers_leave_the_table_empty() {
    let engine = Engine::new(WorkerConfig::default()).unwrap();
    let table = engine.table(table_schema());
    table.update_buffer(vec![0u8, 1, 2, 3]);
    table.update_buffer(Vec::new());
    let view = table.view(ViewConfig::default()).unwrap();
    assert!(view.to_flat().await.unwrap().data.is_empty());
    engine.shutdown().await;
}

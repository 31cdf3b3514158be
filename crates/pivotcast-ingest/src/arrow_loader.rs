//! Arrow IPC -> `(record_count, names, types, columns)`.

use std::io::Cursor;

use arrow::array::{Array, ArrayRef, AsArray};
use arrow::compute::cast;
use arrow::datatypes::{
    ArrowPrimitiveType, DataType, Date32Type, Date64Type, Float32Type, Float64Type, Int16Type,
    Int32Type, Int64Type, Int8Type, SchemaRef, TimeUnit, TimestampMicrosecondType,
    TimestampMillisecondType, TimestampNanosecondType, TimestampSecondType, UInt16Type,
    UInt32Type, UInt64Type, UInt8Type,
};
use arrow::ipc::reader::{FileReader, StreamReader};
use arrow::record_batch::RecordBatch;
use tracing::debug;

use pivotcast_core::mapper::Dtype;
use pivotcast_core::types::Scalar;

use crate::error::{IngestError, Result};

const FILE_MAGIC: &[u8] = b"ARROW1";
const MS_PER_DAY: i64 = 86_400_000;

/// Decoded buffer, positional: `names[i]`, `types[i]` and `columns[i]` describe
/// the same column.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestedBuffer {
    pub record_count: usize,
    pub names: Vec<String>,
    pub types: Vec<Dtype>,
    pub columns: Vec<Vec<Scalar>>,
}

/// Storage dtype for an Arrow type, or `None` when the column is skipped.
pub fn storage_type_for(data_type: &DataType) -> Option<Dtype> {
    let dtype = match data_type {
        DataType::Boolean => Dtype::Bool,
        DataType::Int8 | DataType::UInt8 => Dtype::Int8,
        DataType::Int16 | DataType::UInt16 => Dtype::Int16,
        DataType::Int32 | DataType::UInt32 => Dtype::Int32,
        DataType::Int64 | DataType::UInt64 => Dtype::Int64,
        DataType::Float32 => Dtype::Float32,
        DataType::Float64 => Dtype::Float64,
        DataType::Utf8 | DataType::LargeUtf8 | DataType::Binary | DataType::LargeBinary => {
            Dtype::Str
        }
        DataType::Date32 | DataType::Date64 => Dtype::Date,
        DataType::Timestamp(_, _) => Dtype::Time,
        DataType::Dictionary(_, value) => return storage_type_for(value),
        _ => return None,
    };
    Some(dtype)
}

pub fn load_arrow_buffer(data: &[u8]) -> Result<IngestedBuffer> {
    if data.is_empty() {
        return Err(IngestError::Empty);
    }
    let (schema, batches) = read_batches(data)?;
    let record_count = batches.iter().map(RecordBatch::num_rows).sum();

    let mut out = IngestedBuffer {
        record_count,
        names: Vec::new(),
        types: Vec::new(),
        columns: Vec::new(),
    };
    for (idx, field) in schema.fields().iter().enumerate() {
        let Some(dtype) = storage_type_for(field.data_type()) else {
            debug!(column = %field.name(), data_type = %field.data_type(), "skipping unsupported column");
            continue;
        };
        let mut values = Vec::with_capacity(record_count);
        for batch in &batches {
            append_values(batch.column(idx), &mut values)?;
        }
        out.names.push(field.name().clone());
        out.types.push(dtype);
        out.columns.push(values);
    }
    Ok(out)
}

fn read_batches(data: &[u8]) -> Result<(SchemaRef, Vec<RecordBatch>)> {
    if data.starts_with(FILE_MAGIC) {
        let reader = FileReader::try_new(Cursor::new(data), None)?;
        let schema = reader.schema();
        let batches = reader.collect::<std::result::Result<Vec<_>, _>>()?;
        Ok((schema, batches))
    } else {
        let reader = StreamReader::try_new(Cursor::new(data), None)?;
        let schema = reader.schema();
        let batches = reader.collect::<std::result::Result<Vec<_>, _>>()?;
        Ok((schema, batches))
    }
}

fn push_primitive<T, F>(array: &dyn Array, out: &mut Vec<Scalar>, f: F)
where
    T: ArrowPrimitiveType,
    F: Fn(T::Native) -> Scalar,
{
    let a = array.as_primitive::<T>();
    out.extend((0..a.len()).map(|i| if a.is_null(i) { Scalar::Null } else { f(a.value(i)) }));
}

fn append_values(column: &ArrayRef, out: &mut Vec<Scalar>) -> Result<()> {
    let decoded;
    let array: &dyn Array = match column.data_type() {
        DataType::Dictionary(_, value) => {
            decoded = cast(column, value)?;
            decoded.as_ref()
        }
        _ => column.as_ref(),
    };

    match array.data_type() {
        DataType::Boolean => {
            let a = array.as_boolean();
            out.extend((0..a.len()).map(|i| {
                if a.is_null(i) {
                    Scalar::Null
                } else {
                    Scalar::Bool(a.value(i))
                }
            }));
        }
        DataType::Int8 => push_primitive::<Int8Type, _>(array, out, |v| Scalar::Int(v as i64)),
        DataType::Int16 => push_primitive::<Int16Type, _>(array, out, |v| Scalar::Int(v as i64)),
        DataType::Int32 => push_primitive::<Int32Type, _>(array, out, |v| Scalar::Int(v as i64)),
        DataType::Int64 => push_primitive::<Int64Type, _>(array, out, Scalar::Int),
        DataType::UInt8 => push_primitive::<UInt8Type, _>(array, out, |v| Scalar::Int(v as i64)),
        DataType::UInt16 => push_primitive::<UInt16Type, _>(array, out, |v| Scalar::Int(v as i64)),
        DataType::UInt32 => push_primitive::<UInt32Type, _>(array, out, |v| Scalar::Int(v as i64)),
        DataType::UInt64 => push_primitive::<UInt64Type, _>(array, out, |v| {
            i64::try_from(v).map(Scalar::Int).unwrap_or(Scalar::Null)
        }),
        DataType::Float32 => {
            push_primitive::<Float32Type, _>(array, out, |v| Scalar::Float(v as f64))
        }
        DataType::Float64 => push_primitive::<Float64Type, _>(array, out, Scalar::Float),
        DataType::Utf8 => {
            let a = array.as_string::<i32>();
            out.extend(a.iter().map(|v| v.map(Scalar::from).unwrap_or(Scalar::Null)));
        }
        DataType::LargeUtf8 => {
            let a = array.as_string::<i64>();
            out.extend(a.iter().map(|v| v.map(Scalar::from).unwrap_or(Scalar::Null)));
        }
        DataType::Binary => {
            let a = array.as_binary::<i32>();
            out.extend(a.iter().map(binary_scalar));
        }
        DataType::LargeBinary => {
            let a = array.as_binary::<i64>();
            out.extend(a.iter().map(binary_scalar));
        }
        DataType::Date32 => push_primitive::<Date32Type, _>(array, out, Scalar::Date),
        DataType::Date64 => push_primitive::<Date64Type, _>(array, out, |v| {
            Scalar::Date(v.div_euclid(MS_PER_DAY) as i32)
        }),
        DataType::Timestamp(TimeUnit::Second, _) => {
            push_primitive::<TimestampSecondType, _>(array, out, |v| {
                Scalar::DateTime(v.saturating_mul(1000))
            })
        }
        DataType::Timestamp(TimeUnit::Millisecond, _) => {
            push_primitive::<TimestampMillisecondType, _>(array, out, Scalar::DateTime)
        }
        DataType::Timestamp(TimeUnit::Microsecond, _) => {
            push_primitive::<TimestampMicrosecondType, _>(array, out, |v| {
                Scalar::DateTime(v.div_euclid(1_000))
            })
        }
        DataType::Timestamp(TimeUnit::Nanosecond, _) => {
            push_primitive::<TimestampNanosecondType, _>(array, out, |v| {
                Scalar::DateTime(v.div_euclid(1_000_000))
            })
        }
        // Filtered out by `storage_type_for`; pad so the column stays aligned.
        _ => out.extend(std::iter::repeat(Scalar::Null).take(array.len())),
    }
    Ok(())
}

fn binary_scalar(v: Option<&[u8]>) -> Scalar {
    v.map(|b| Scalar::Str(String::from_utf8_lossy(b).into_owned()))
        .unwrap_or(Scalar::Null)
}

//! Parquet encoding of the full progress set.
//!
//! Column names match the tracker files written by earlier StreamHub
//! releases, so those snapshots still load.

use crate::{
    errors::{ServiceError, ServiceResult},
    models::progress::ProgressRecord,
};
use arrow::{
    array::{Array, ArrayRef, BooleanArray, Float64Array, StringArray, TimestampMicrosecondArray},
    compute::cast,
    datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit},
    record_batch::RecordBatch,
};
use bytes::Bytes;
use chrono::DateTime;
use parquet::{
    arrow::{ArrowWriter, arrow_reader::ParquetRecordBatchReaderBuilder},
    basic::Compression,
    file::properties::WriterProperties,
};
use std::sync::Arc;

const COL_SERIES: &str = "series_name";
const COL_SEASON: &str = "season";
const COL_EPISODE: &str = "episode_name";
const COL_POSITION: &str = "timestamp";
const COL_DURATION: &str = "duration";
const COL_LAST_UPDATED: &str = "last_updated";
const COL_COMPLETED: &str = "completed";

const CREATED_BY: &str = "streamhub";

fn utc() -> Option<Arc<str>> {
    Some("UTC".into())
}

fn snapshot_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new(COL_SERIES, DataType::Utf8, false),
        Field::new(COL_SEASON, DataType::Utf8, false),
        Field::new(COL_EPISODE, DataType::Utf8, false),
        Field::new(COL_POSITION, DataType::Float64, false),
        Field::new(COL_DURATION, DataType::Float64, false),
        Field::new(
            COL_LAST_UPDATED,
            DataType::Timestamp(TimeUnit::Microsecond, utc()),
            false,
        ),
        Field::new(COL_COMPLETED, DataType::Boolean, false),
    ]))
}

fn writer_properties() -> WriterProperties {
    WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .set_created_by(CREATED_BY.to_string())
        .build()
}

/// Serialize `records` into one Parquet file, preserving their order.
///
/// Equal inputs always produce equal bytes.
pub fn encode_snapshot(records: &[ProgressRecord]) -> ServiceResult<Bytes> {
    let schema = snapshot_schema();
    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from_iter_values(
            records.iter().map(|r| r.series_name.as_str()),
        )),
        Arc::new(StringArray::from_iter_values(
            records.iter().map(|r| r.season.as_str()),
        )),
        Arc::new(StringArray::from_iter_values(
            records.iter().map(|r| r.episode_name.as_str()),
        )),
        Arc::new(Float64Array::from_iter_values(
            records.iter().map(|r| r.position),
        )),
        Arc::new(Float64Array::from_iter_values(
            records.iter().map(|r| r.duration),
        )),
        Arc::new(
            TimestampMicrosecondArray::from_iter_values(
                records.iter().map(|r| r.last_updated.timestamp_micros()),
            )
            .with_timezone("UTC"),
        ),
        Arc::new(BooleanArray::from(
            records.iter().map(|r| r.completed).collect::<Vec<_>>(),
        )),
    ];
    let batch = RecordBatch::try_new(schema.clone(), columns)?;

    let mut buffer = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buffer, schema, Some(writer_properties()))?;
    if batch.num_rows() > 0 {
        writer.write(&batch)?;
    }
    writer.close()?;

    Ok(Bytes::from(buffer))
}

/// Parse a snapshot produced by `encode_snapshot` or a compatible writer.
///
/// Physical variations (large strings, float32, naive or millisecond
/// timestamps) are cast to the canonical types. `key` only labels errors.
pub fn decode_snapshot(key: &str, data: Bytes) -> ServiceResult<Vec<ProgressRecord>> {
    let malformed = |reason: String| ServiceError::MalformedSnapshot {
        key: key.to_string(),
        reason,
    };

    let reader = ParquetRecordBatchReaderBuilder::try_new(data)
        .map_err(|err| malformed(err.to_string()))?
        .build()
        .map_err(|err| malformed(err.to_string()))?;

    let mut records = Vec::new();
    for batch in reader {
        let batch = batch.map_err(|err| malformed(err.to_string()))?;
        decode_batch(&batch, &mut records).map_err(malformed)?;
    }
    Ok(records)
}

fn column(batch: &RecordBatch, name: &str, to: &DataType) -> Result<ArrayRef, String> {
    let raw = batch
        .column_by_name(name)
        .ok_or_else(|| format!("missing column `{name}`"))?;
    cast(raw, to).map_err(|err| format!("column `{name}`: {err}"))
}

fn downcast<'a, T: 'static>(array: &'a ArrayRef, name: &str) -> Result<&'a T, String> {
    array
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| format!("column `{name}` has an unexpected type"))
}

/// Null or non-finite values read as zero.
fn measurement(array: &Float64Array, row: usize) -> f64 {
    if array.is_null(row) {
        return 0.0;
    }
    let value = array.value(row);
    if value.is_finite() { value } else { 0.0 }
}

fn decode_batch(batch: &RecordBatch, out: &mut Vec<ProgressRecord>) -> Result<(), String> {
    let timestamp_type = DataType::Timestamp(TimeUnit::Microsecond, utc());

    let series = column(batch, COL_SERIES, &DataType::Utf8)?;
    let season = column(batch, COL_SEASON, &DataType::Utf8)?;
    let episode = column(batch, COL_EPISODE, &DataType::Utf8)?;
    let position = column(batch, COL_POSITION, &DataType::Float64)?;
    let duration = column(batch, COL_DURATION, &DataType::Float64)?;
    let last_updated = column(batch, COL_LAST_UPDATED, &timestamp_type)?;
    let completed = column(batch, COL_COMPLETED, &DataType::Boolean)?;

    let series = downcast::<StringArray>(&series, COL_SERIES)?;
    let season = downcast::<StringArray>(&season, COL_SEASON)?;
    let episode = downcast::<StringArray>(&episode, COL_EPISODE)?;
    let position = downcast::<Float64Array>(&position, COL_POSITION)?;
    let duration = downcast::<Float64Array>(&duration, COL_DURATION)?;
    let last_updated = downcast::<TimestampMicrosecondArray>(&last_updated, COL_LAST_UPDATED)?;
    let completed = downcast::<BooleanArray>(&completed, COL_COMPLETED)?;

    for row in 0..batch.num_rows() {
        if series.is_null(row) || season.is_null(row) || episode.is_null(row) {
            return Err(format!("row {row} has a null key column"));
        }

        let micros = if last_updated.is_null(row) {
            0
        } else {
            last_updated.value(row)
        };
        out.push(ProgressRecord {
            series_name: series.value(row).to_string(),
            season: season.value(row).to_string(),
            episode_name: episode.value(row).to_string(),
            position: measurement(position, row),
            duration: measurement(duration, row),
            last_updated: DateTime::from_timestamp_micros(micros)
                .ok_or_else(|| format!("row {row} has an out-of-range last_updated"))?,
            // A missing flag reads as unwatched.
            completed: !completed.is_null(row) && completed.value(row),
        });
    }
    Ok(())
}

//! Parquet event input and digest output, via the Arrow columnar API.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, StringArray, TimestampSecondArray, UInt32Array, UInt64Array,
};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, NaiveDateTime};
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::basic::{Compression as ParquetCompression, GzipLevel};
use parquet::file::properties::WriterProperties;

use crate::driver::{DigestTable, EventRow, EventTable};
use crate::util::parse_instant;

use super::{Compression, TableError};

/// Reads an event table from a parquet file.
///
/// `user`, `cell` and the prop columns must be castable to strings; `time`
/// may be a timestamp column of any unit or a string column in one of the
/// supported instant formats.
pub fn read_events_parquet(
    path: &Path,
    prop_names: &[String],
) -> Result<EventTable, TableError> {
    let file = File::open(path)?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;

    let mut table = EventTable {
        prop_names: prop_names.to_vec(),
        rows: Vec::new(),
    };
    let mut offset = 0usize;
    for batch in reader {
        let batch = batch?;
        append_batch(&mut table, &batch, prop_names, offset)?;
        offset += batch.num_rows();
    }
    Ok(table)
}

fn append_batch(
    table: &mut EventTable,
    batch: &RecordBatch,
    prop_names: &[String],
    offset: usize,
) -> Result<(), TableError> {
    let users = string_column(batch, "user")?;
    let cells = string_column(batch, "cell")?;
    let times = time_column(batch, offset)?;
    let props: Vec<StringArray> = prop_names
        .iter()
        .map(|name| string_column(batch, name))
        .collect::<Result<_, _>>()?;

    for i in 0..batch.num_rows() {
        table.rows.push(EventRow {
            user: users.value(i).to_string(),
            time: times[i],
            cell: cells.value(i).to_string(),
            props: props.iter().map(|p| p.value(i).to_string()).collect(),
        });
    }
    Ok(())
}

fn required_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a ArrayRef, TableError> {
    let column = batch
        .column_by_name(name)
        .ok_or_else(|| TableError::Schema(format!("required column '{}' is missing", name)))?;
    if column.null_count() > 0 {
        return Err(TableError::Schema(format!(
            "column '{}' contains null values",
            name
        )));
    }
    Ok(column)
}

fn string_column(batch: &RecordBatch, name: &str) -> Result<StringArray, TableError> {
    let column = required_column(batch, name)?;
    let array = cast(column, &DataType::Utf8).map_err(|_| {
        TableError::Schema(format!(
            "column '{}' has type {} and cannot be read as a string",
            name,
            column.data_type()
        ))
    })?;
    array
        .as_any()
        .downcast_ref::<StringArray>()
        .cloned()
        .ok_or_else(|| TableError::Schema(format!("column '{}' is not a string column", name)))
}

fn time_column(batch: &RecordBatch, offset: usize) -> Result<Vec<NaiveDateTime>, TableError> {
    let column = required_column(batch, "time")?;

    // String columns go through the instant parser; anything else must be
    // castable to a second-precision timestamp.
    if matches!(
        column.data_type(),
        DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View
    ) {
        let strings = string_column(batch, "time")?;
        return (0..strings.len())
            .map(|i| {
                parse_instant(strings.value(i)).map_err(|e| TableError::Parse {
                    row: offset + i + 1,
                    value: e.input,
                    message: e.message,
                })
            })
            .collect();
    }

    let array = cast(column, &DataType::Timestamp(TimeUnit::Second, None)).map_err(|_| {
        TableError::Schema(format!(
            "column 'time' has type {} and cannot be read as a timestamp",
            column.data_type()
        ))
    })?;
    let seconds = array
        .as_any()
        .downcast_ref::<TimestampSecondArray>()
        .ok_or_else(|| TableError::Schema("column 'time' is not a timestamp".to_string()))?;
    (0..seconds.len())
        .map(|i| {
            let secs = seconds.value(i);
            DateTime::from_timestamp(secs, 0)
                .map(|dt| dt.naive_utc())
                .ok_or_else(|| TableError::Parse {
                    row: offset + i + 1,
                    value: secs.to_string(),
                    message: "timestamp out of range".to_string(),
                })
        })
        .collect()
}

/// Writes a digest table as a parquet file.
pub fn write_digests_parquet(
    path: &Path,
    compression: Option<Compression>,
    table: &DigestTable,
) -> Result<(), TableError> {
    let mut fields = vec![Field::new("user", DataType::Utf8, false)];
    for name in &table.prop_names {
        fields.push(Field::new(name.as_str(), DataType::Utf8, false));
    }
    fields.extend([
        Field::new("digest_id", DataType::UInt64, false),
        Field::new(
            "start_time",
            DataType::Timestamp(TimeUnit::Second, None),
            false,
        ),
        Field::new(
            "end_time",
            DataType::Timestamp(TimeUnit::Second, None),
            false,
        ),
        Field::new("start_cell", DataType::Utf8, false),
        Field::new("end_cell", DataType::Utf8, false),
        Field::new("events_in_cell", DataType::Utf8, false),
        Field::new("num_cells", DataType::UInt32, false),
        Field::new("num_events", DataType::UInt32, false),
        Field::new("type", DataType::Utf8, false),
    ]);
    let schema = Arc::new(Schema::new(fields));

    let mut columns: Vec<ArrayRef> = Vec::with_capacity(schema.fields().len());
    columns.push(Arc::new(StringArray::from(
        table.rows.iter().map(|r| r.user.clone()).collect::<Vec<_>>(),
    )));
    for p in 0..table.prop_names.len() {
        columns.push(Arc::new(StringArray::from(
            table
                .rows
                .iter()
                .map(|r| r.props[p].clone())
                .collect::<Vec<_>>(),
        )));
    }
    columns.push(Arc::new(UInt64Array::from(
        table.rows.iter().map(|r| r.digest_id).collect::<Vec<_>>(),
    )));
    columns.push(Arc::new(TimestampSecondArray::from(
        table
            .rows
            .iter()
            .map(|r| r.digest.start_time.and_utc().timestamp())
            .collect::<Vec<_>>(),
    )));
    columns.push(Arc::new(TimestampSecondArray::from(
        table
            .rows
            .iter()
            .map(|r| r.digest.end_time.and_utc().timestamp())
            .collect::<Vec<_>>(),
    )));
    columns.push(Arc::new(StringArray::from(
        table
            .rows
            .iter()
            .map(|r| r.digest.start_cell.clone())
            .collect::<Vec<_>>(),
    )));
    columns.push(Arc::new(StringArray::from(
        table
            .rows
            .iter()
            .map(|r| r.digest.end_cell.clone())
            .collect::<Vec<_>>(),
    )));
    let events_in_cell: Vec<String> = table
        .rows
        .iter()
        .map(|r| serde_json::to_string(&r.digest.events_in_cell))
        .collect::<Result<_, _>>()
        .map_err(|e| TableError::Io(e.to_string()))?;
    columns.push(Arc::new(StringArray::from(events_in_cell)));
    columns.push(Arc::new(UInt32Array::from(
        table
            .rows
            .iter()
            .map(|r| r.digest.num_cells)
            .collect::<Vec<_>>(),
    )));
    columns.push(Arc::new(UInt32Array::from(
        table
            .rows
            .iter()
            .map(|r| r.digest.num_events)
            .collect::<Vec<_>>(),
    )));
    columns.push(Arc::new(StringArray::from(
        table
            .rows
            .iter()
            .map(|r| r.digest.kind.as_str().to_string())
            .collect::<Vec<_>>(),
    )));

    let batch = RecordBatch::try_new(schema.clone(), columns)?;

    let mut properties = WriterProperties::builder();
    if compression == Some(Compression::Gzip) {
        properties =
            properties.set_compression(ParquetCompression::GZIP(GzipLevel::default()));
    }
    let file = File::create(path)?;
    let mut writer = ArrowWriter::try_new(file, schema, Some(properties.build()))?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}

//! Parquet copy of the aggregate table.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{ArrayRef, Float64Builder, StringBuilder, UInt64Builder};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use plan_runtime::{AggregatePoint, SimulationResults};

use crate::{create, AGGREGATE_COLUMNS};

/// Same columns as the CSV table: `period` as `UInt64`, `date` as a
/// `YYYY-MM` string, everything else `Float64`.
pub fn aggregate_schema() -> Schema {
    let fields: Vec<Field> = AGGREGATE_COLUMNS
        .iter()
        .map(|&name| {
            let data_type = match name {
                "period" => DataType::UInt64,
                "date" => DataType::Utf8,
                _ => DataType::Float64,
            };
            Field::new(name, data_type, false)
        })
        .collect();
    Schema::new(fields)
}

/// Write the planning rows as a single record batch.
pub fn write_aggregate_parquet(path: &Path, results: &SimulationResults) -> Result<usize> {
    let schema = Arc::new(aggregate_schema());
    let points: Vec<&AggregatePoint> = results.planning_series().collect();
    let batch = record_batch(schema.clone(), &points)?;

    let file = create(path)?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut writer = ArrowWriter::try_new(file, schema, Some(props))
        .with_context(|| format!("failed to open parquet writer for {}", path.display()))?;
    writer
        .write(&batch)
        .with_context(|| format!("failed to write {}", path.display()))?;
    writer
        .close()
        .with_context(|| format!("failed to finalize {}", path.display()))?;
    tracing::debug!(path = %path.display(), rows = points.len(), "aggregate parquet written");
    Ok(points.len())
}

fn record_batch(schema: Arc<Schema>, points: &[&AggregatePoint]) -> Result<RecordBatch> {
    let rows = points.len();
    let mut period = UInt64Builder::with_capacity(rows);
    let mut date = StringBuilder::with_capacity(rows, rows * 7);
    let values: [fn(&AggregatePoint) -> f64; 11] = [
        |p| p.gdp_real,
        |p| p.capacity,
        |p| p.output_gap_pct,
        |p| p.capacity_utilization_pct,
        |p| p.consumption,
        |p| p.planned_consumption,
        |p| p.investment,
        |p| p.government,
        |p| p.aggregate_demand,
        |p| p.price_index,
        |p| p.debt,
    ];
    let mut floats: Vec<Float64Builder> = values
        .iter()
        .map(|_| Float64Builder::with_capacity(rows))
        .collect();

    for &p in points {
        period.append_value(p.period as u64);
        date.append_value(p.date.format("%Y-%m").to_string());
        for (builder, value) in floats.iter_mut().zip(&values) {
            builder.append_value(value(p));
        }
    }

    let mut columns: Vec<ArrayRef> = vec![Arc::new(period.finish()), Arc::new(date.finish())];
    for builder in floats.iter_mut() {
        columns.push(Arc::new(builder.finish()));
    }
    RecordBatch::try_new(schema, columns).context("aggregate columns do not match the schema")
}

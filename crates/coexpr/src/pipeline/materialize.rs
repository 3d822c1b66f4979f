//! Columnar batch to row record conversion.

use super::channel::{recv, send};
use crate::{
    Error, GeneticAlterationRecord, Result, SchemaPolicy,
    model::{GENE_ID_COLUMN, SAMPLE_ID_COLUMN, VALUE_COLUMN},
    source::ColumnarBatch,
};
use arrow::array::{Array, Float32Array, Float64Array, Int64Array, LargeStringArray, StringArray};
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Rows decoded from one batch, plus the rows the schema policy dropped.
#[derive(Debug, Default)]
pub(crate) struct Materialized {
    pub records: Vec<GeneticAlterationRecord>,
    pub skipped: usize,
}

/// Converts every batch into row records and forwards them as one unit.
///
/// Each batch is released right after conversion, before the records are
/// pushed downstream, so a stalled consumer never pins columnar buffers here.
/// Errors (from the source or from decoding under [`SchemaPolicy::Abort`]) are
/// forwarded in-band and end the stage.
pub(crate) async fn materialize_rows(
    mut batch_rx: mpsc::Receiver<Result<ColumnarBatch>>,
    row_tx: mpsc::Sender<Result<Vec<GeneticAlterationRecord>>>,
    policy: SchemaPolicy,
    cancel: CancellationToken,
) {
    let mut _rows_fetched = 0_usize;
    let mut _rows_skipped = 0_usize;

    loop {
        let batch = match recv(&mut batch_rx, &cancel).await {
            Ok(Some(Ok(batch))) => batch,
            Ok(Some(Err(e))) => {
                let _ = send(&row_tx, Err(e), &cancel, "materialize").await;
                return;
            }
            Ok(None) => break,
            Err(_cancelled) => return,
        };

        _rows_fetched += batch.num_rows();
        let materialized = materialize_batch(batch.record_batch(), policy);
        batch.release();

        let records = match materialized {
            Ok(Materialized { records, skipped }) => {
                _rows_skipped += skipped;
                records
            }
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::error!("Aborting request: {}", e);
                let _ = send(&row_tx, Err(e), &cancel, "materialize").await;
                return;
            }
        };

        if send(&row_tx, Ok(records), &cancel, "materialize").await.is_err() {
            return;
        }
    }

    #[cfg(feature = "tracing")]
    tracing::info!("Total number of rows: {_rows_fetched} ({_rows_skipped} skipped)");
}

/// Decodes one batch into records, applying `policy` to undecodable data.
///
/// # Errors
///
/// Under [`SchemaPolicy::Abort`], returns [`Error::Schema`] for a missing or
/// mistyped required column or a null cell.
pub(crate) fn materialize_batch(batch: &RecordBatch, policy: SchemaPolicy) -> Result<Materialized> {
    let columns = match BatchColumns::resolve(batch) {
        Ok(columns) => columns,
        Err(_e) if policy == SchemaPolicy::Skip => {
            #[cfg(feature = "tracing")]
            tracing::warn!("Skipping batch of {} rows: {_e}", batch.num_rows());
            return Ok(Materialized {
                records: Vec::new(),
                skipped: batch.num_rows(),
            });
        }
        Err(e) => return Err(e),
    };

    let mut out = Materialized {
        records: Vec::with_capacity(batch.num_rows()),
        skipped: 0,
    };
    for row in 0..batch.num_rows() {
        match columns.record(row) {
            Ok(record) => out.records.push(record),
            Err(_) if policy == SchemaPolicy::Skip => out.skipped += 1,
            Err(e) => return Err(e),
        }
    }

    #[cfg(feature = "tracing")]
    {
        if out.skipped > 0 {
            tracing::warn!("Skipped {} rows with null cells", out.skipped);
        }
    }

    Ok(out)
}

enum SampleColumn<'a> {
    Utf8(&'a StringArray),
    LargeUtf8(&'a LargeStringArray),
}

enum ValueColumn<'a> {
    Float32(&'a Float32Array),
    Float64(&'a Float64Array),
}

/// The three required columns, resolved by name.
struct BatchColumns<'a> {
    gene_ids: &'a Int64Array,
    sample_ids: SampleColumn<'a>,
    values: ValueColumn<'a>,
}

impl<'a> BatchColumns<'a> {
    fn resolve(batch: &'a RecordBatch) -> Result<Self> {
        let gene_ids = column(batch, GENE_ID_COLUMN)?;
        let gene_ids = match gene_ids.data_type() {
            DataType::Int64 => downcast::<Int64Array>(gene_ids, GENE_ID_COLUMN)?,
            other => return Err(wrong_type(GENE_ID_COLUMN, "Int64", other)),
        };

        let sample_ids = column(batch, SAMPLE_ID_COLUMN)?;
        let sample_ids = match sample_ids.data_type() {
            DataType::Utf8 => SampleColumn::Utf8(downcast(sample_ids, SAMPLE_ID_COLUMN)?),
            DataType::LargeUtf8 => {
                SampleColumn::LargeUtf8(downcast(sample_ids, SAMPLE_ID_COLUMN)?)
            }
            other => return Err(wrong_type(SAMPLE_ID_COLUMN, "Utf8", other)),
        };

        let values = column(batch, VALUE_COLUMN)?;
        let values = match values.data_type() {
            DataType::Float32 => ValueColumn::Float32(downcast(values, VALUE_COLUMN)?),
            DataType::Float64 => ValueColumn::Float64(downcast(values, VALUE_COLUMN)?),
            other => return Err(wrong_type(VALUE_COLUMN, "Float32", other)),
        };

        Ok(Self {
            gene_ids,
            sample_ids,
            values,
        })
    }

    fn record(&self, row: usize) -> Result<GeneticAlterationRecord> {
        let null = |name: &str| Error::Schema {
            reason: format!("null `{name}` at row {row}"),
        };

        if self.gene_ids.is_null(row) {
            return Err(null(GENE_ID_COLUMN));
        }
        let sample_id = match self.sample_ids {
            SampleColumn::Utf8(a) if !a.is_null(row) => a.value(row),
            SampleColumn::LargeUtf8(a) if !a.is_null(row) => a.value(row),
            _ => return Err(null(SAMPLE_ID_COLUMN)),
        };
        let value = match self.values {
            ValueColumn::Float32(a) if !a.is_null(row) => f64::from(a.value(row)),
            ValueColumn::Float64(a) if !a.is_null(row) => a.value(row),
            _ => return Err(null(VALUE_COLUMN)),
        };

        Ok(GeneticAlterationRecord {
            gene_id: self.gene_ids.value(row),
            sample_id: sample_id.to_string(),
            value,
        })
    }
}

fn column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a dyn Array> {
    batch
        .column_by_name(name)
        .map(|array| array.as_ref())
        .ok_or_else(|| Error::Schema {
            reason: format!("missing required column `{name}`"),
        })
}

fn downcast<'a, T: 'static>(array: &'a dyn Array, name: &str) -> Result<&'a T> {
    array
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| Error::Schema {
            reason: format!("column `{name}` could not be read as {:?}", array.data_type()),
        })
}

fn wrong_type(name: &str, expected: &str, actual: &DataType) -> Error {
    Error::Schema {
        reason: format!("column `{name}` has wrong type: expected {expected}, got {actual:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::profile_batch;
    use arrow::datatypes::{Field, Schema};
    use std::sync::Arc;

    #[test]
    fn resolves_columns_by_name_in_any_order() {
        let schema = Arc::new(Schema::new(vec![
            Field::new(VALUE_COLUMN, DataType::Float64, false),
            Field::new("Extra", DataType::Int64, false),
            Field::new(SAMPLE_ID_COLUMN, DataType::LargeUtf8, false),
            Field::new(GENE_ID_COLUMN, DataType::Int64, false),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Float64Array::from(vec![0.5, 1.5])),
                Arc::new(Int64Array::from(vec![7, 7])),
                Arc::new(LargeStringArray::from(vec!["a", "b"])),
                Arc::new(Int64Array::from(vec![10, 20])),
            ],
        )
        .unwrap();

        let out = materialize_batch(&batch, SchemaPolicy::Abort).unwrap();
        assert_eq!(
            out.records,
            vec![
                GeneticAlterationRecord {
                    gene_id: 10,
                    sample_id: "a".to_string(),
                    value: 0.5,
                },
                GeneticAlterationRecord {
                    gene_id: 20,
                    sample_id: "b".to_string(),
                    value: 1.5,
                },
            ]
        );
        assert_eq!(out.skipped, 0);
    }

    #[test]
    fn widens_float32_values() {
        let out = materialize_batch(&profile_batch(&[(1, "s", 0.25)]), SchemaPolicy::Abort).unwrap();
        assert_eq!(out.records[0].value, 0.25);
    }

    fn renamed_gene_column() -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("Hugo_Symbol", DataType::Int64, false),
            Field::new(SAMPLE_ID_COLUMN, DataType::Utf8, false),
            Field::new(VALUE_COLUMN, DataType::Float32, false),
        ]));
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(vec![1, 2])),
                Arc::new(StringArray::from(vec!["s1", "s2"])),
                Arc::new(Float32Array::from(vec![1.0, 2.0])),
            ],
        )
        .unwrap()
    }

    #[test]
    fn unrecognized_column_aborts_under_abort_policy() {
        let err = materialize_batch(&renamed_gene_column(), SchemaPolicy::Abort).unwrap_err();
        assert!(matches!(err, Error::Schema { ref reason } if reason.contains(GENE_ID_COLUMN)));
    }

    #[test]
    fn unrecognized_column_skips_batch_under_skip_policy() {
        let out = materialize_batch(&renamed_gene_column(), SchemaPolicy::Skip).unwrap();
        assert!(out.records.is_empty());
        assert_eq!(out.skipped, 2);
    }

    #[test]
    fn wrong_type_is_a_schema_error() {
        let schema = Arc::new(Schema::new(vec![
            Field::new(GENE_ID_COLUMN, DataType::Utf8, false),
            Field::new(SAMPLE_ID_COLUMN, DataType::Utf8, false),
            Field::new(VALUE_COLUMN, DataType::Float32, false),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(vec!["TP53"])),
                Arc::new(StringArray::from(vec!["s1"])),
                Arc::new(Float32Array::from(vec![1.0])),
            ],
        )
        .unwrap();

        let err = materialize_batch(&batch, SchemaPolicy::Abort).unwrap_err();
        assert!(matches!(err, Error::Schema { ref reason } if reason.contains("wrong type")));
    }

    #[test]
    fn null_cells_follow_policy() {
        let schema = Arc::new(Schema::new(vec![
            Field::new(GENE_ID_COLUMN, DataType::Int64, true),
            Field::new(SAMPLE_ID_COLUMN, DataType::Utf8, true),
            Field::new(VALUE_COLUMN, DataType::Float32, true),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(vec![Some(1), Some(2), Some(3)])),
                Arc::new(StringArray::from(vec![Some("s1"), Some("s1"), Some("s1")])),
                Arc::new(Float32Array::from(vec![Some(1.0), None, Some(3.0)])),
            ],
        )
        .unwrap();

        assert!(matches!(
            materialize_batch(&batch, SchemaPolicy::Abort),
            Err(Error::Schema { .. })
        ));

        let out = materialize_batch(&batch, SchemaPolicy::Skip).unwrap();
        assert_eq!(out.skipped, 1);
        let genes: Vec<_> = out.records.iter().map(|r| r.gene_id).collect();
        assert_eq!(genes, vec![1, 3]);
    }

    #[tokio::test]
    async fn stage_forwards_records_and_closes() {
        let (batch_tx, batch_rx) = mpsc::channel(2);
        let (row_tx, mut row_rx) = mpsc::channel(2);
        let cancel = CancellationToken::new();

        batch_tx
            .send(Ok(profile_batch(&[(1, "s1", 1.0), (2, "s1", 2.0)]).into()))
            .await
            .unwrap();
        drop(batch_tx);

        materialize_rows(batch_rx, row_tx, SchemaPolicy::Abort, cancel).await;

        let rows = row_rx.recv().await.unwrap().unwrap();
        assert_eq!(rows.len(), 2);
        assert!(row_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn stage_forwards_schema_error_in_band() {
        let (batch_tx, batch_rx) = mpsc::channel(2);
        let (row_tx, mut row_rx) = mpsc::channel(2);

        batch_tx.send(Ok(renamed_gene_column().into())).await.unwrap();
        drop(batch_tx);

        materialize_rows(batch_rx, row_tx, SchemaPolicy::Abort, CancellationToken::new()).await;

        assert!(matches!(row_rx.recv().await, Some(Err(Error::Schema { .. }))));
        assert!(row_rx.recv().await.is_none());
    }
}

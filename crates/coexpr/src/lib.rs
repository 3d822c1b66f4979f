#![doc = include_str!("../README.md")]

pub mod config;
mod encode;
mod error;
mod model;
pub mod pipeline;
pub mod pool;
pub mod source;
pub mod stats;

pub use config::{PipelineConfig, SchemaPolicy};
pub use encode::{JsonArrayEncoder, encode_json_array};
pub use error::*;
pub use model::*;
pub use pipeline::{CoExpressionStream, Pipeline};

#[cfg(test)]
pub(crate) mod test_util {
    use crate::model::{GENE_ID_COLUMN, SAMPLE_ID_COLUMN, VALUE_COLUMN};
    use arrow::array::{Float32Array, Int64Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use arrow::record_batch::RecordBatch;
    use std::sync::Arc;

    /// Builds a batch with the profile schema from `(gene, sample, value)` rows.
    pub(crate) fn profile_batch(rows: &[(i64, &str, f32)]) -> RecordBatch {
        let schema = Schema::new(vec![
            Field::new(GENE_ID_COLUMN, DataType::Int64, false),
            Field::new(SAMPLE_ID_COLUMN, DataType::Utf8, false),
            Field::new(VALUE_COLUMN, DataType::Float32, false),
        ]);
        RecordBatch::try_new(
            Arc::new(schema),
            vec![
                Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.0))),
                Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.1))),
                Arc::new(Float32Array::from_iter_values(rows.iter().map(|r| r.2))),
            ],
        )
        .unwrap()
    }
}

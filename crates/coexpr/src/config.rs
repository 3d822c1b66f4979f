use crate::{Error, Result};
use core::{fmt, str::FromStr};

/// Default capacity of the queue between the fetch and materialize stages.
pub const DEFAULT_BATCH_BUFFER_SIZE: usize = 16;
/// Default capacity of the queue between the materialize and aggregate stages.
pub const DEFAULT_ROW_BUFFER_SIZE: usize = 64;
/// Default capacity of the result queue drained by the encoder.
pub const DEFAULT_RESULT_BUFFER_SIZE: usize = 1024;
/// Default initial capacity of each gene vector (roughly one large cohort).
pub const DEFAULT_VECTOR_CAPACITY_HINT: usize = 2000;
/// Default number of correlation workers.
pub const DEFAULT_NUM_WORKERS: usize = 16;

/// What the row materializer does with a batch or row it cannot decode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SchemaPolicy {
    /// Fail the whole request with [`Error::Schema`].
    #[default]
    Abort,
    /// Drop the offending batch (missing or mistyped column) or row (null
    /// cell) and log a warning.
    Skip,
}

impl FromStr for SchemaPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "abort" => Ok(Self::Abort),
            "skip" => Ok(Self::Skip),
            other => Err(Error::InvalidRequest {
                reason: format!("unknown schema policy `{other}` (expected `abort` or `skip`)"),
            }),
        }
    }
}

impl fmt::Display for SchemaPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Abort => write!(f, "abort"),
            Self::Skip => write!(f, "skip"),
        }
    }
}

/// Queue capacities and policies for a single pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub batch_buffer_size: usize,
    pub row_buffer_size: usize,
    pub result_buffer_size: usize,
    pub vector_capacity_hint: usize,
    pub schema_policy: SchemaPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_buffer_size: DEFAULT_BATCH_BUFFER_SIZE,
            row_buffer_size: DEFAULT_ROW_BUFFER_SIZE,
            result_buffer_size: DEFAULT_RESULT_BUFFER_SIZE,
            vector_capacity_hint: DEFAULT_VECTOR_CAPACITY_HINT,
            schema_policy: SchemaPolicy::default(),
        }
    }
}

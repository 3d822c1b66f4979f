//! Domain records that flow between pipeline stages.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Column holding the Entrez gene identifier (`Int64`).
pub const GENE_ID_COLUMN: &str = "Entrez_Gene_Identifier";
/// Column holding the sample identifier (`Utf8`).
pub const SAMPLE_ID_COLUMN: &str = "Sample_Identifier";
/// Column holding the expression value (`Float32`).
pub const VALUE_COLUMN: &str = "Value";

/// One row of a molecular profile: a single gene measured in a single sample.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneticAlterationRecord {
    pub gene_id: i64,
    pub sample_id: String,
    pub value: f64,
}

/// Per-gene value vectors, in arrival order.
///
/// The aggregator is the only writer. Once the aggregation barrier fires the
/// table is wrapped in an `Arc` and never mutated again.
pub type GeneVectorTable = HashMap<i64, Vec<f64>>;

/// Parameters that drive one pipeline invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineRequest {
    pub profile_id: String,
    pub query_gene_id: i64,
}

impl PipelineRequest {
    pub fn new(profile_id: impl Into<String>, query_gene_id: i64) -> Self {
        Self {
            profile_id: profile_id.into(),
            query_gene_id,
        }
    }
}

/// Rank correlation between the query gene and one other gene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoExpression {
    #[serde(rename = "geneticEntityId")]
    pub gene_id: String,
    #[serde(rename = "spearmansCorrelation")]
    pub correlation: f64,
    #[serde(rename = "pValue")]
    pub p_value: f64,
}

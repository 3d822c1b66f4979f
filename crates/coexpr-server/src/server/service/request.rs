use coexpr::{Error, PipelineRequest, Result};
use serde::Deserialize;

/// Threshold used when the query string has none or it does not parse.
pub const DEFAULT_THRESHOLD: f64 = 2.0;

/// Query parameters of a fetch request. Everything arrives as text so a
/// malformed threshold falls back to the default instead of rejecting the
/// request.
#[derive(Debug, Default, Deserialize)]
pub struct FetchParams {
    #[serde(rename = "molecularProfileA")]
    pub molecular_profile_a: Option<String>,
    #[serde(rename = "molecularProfileB")]
    pub molecular_profile_b: Option<String>,
    pub threshold: Option<String>,
}

/// JSON body of a fetch request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchBody {
    pub entrez_gene_id: i64,
    #[serde(default)]
    pub sample_list_id: Option<String>,
}

/// A fetch request with body and query string combined.
///
/// Only `molecular_profile_a` and `entrez_gene_id` drive the computation; the
/// rest is accepted for compatibility with existing clients and logged.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceRequest {
    pub molecular_profile_a: String,
    pub molecular_profile_b: Option<String>,
    pub threshold: f64,
    pub entrez_gene_id: i64,
    pub sample_list_id: Option<String>,
}

impl ServiceRequest {
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] if the body is not valid JSON, lacks
    /// `entrezGeneId`, or `molecularProfileA` is missing or empty.
    pub fn parse(params: FetchParams, body: &[u8]) -> Result<Self> {
        let body: FetchBody = serde_json::from_slice(body).map_err(|e| Error::InvalidRequest {
            reason: format!("invalid request body: {e}"),
        })?;

        let molecular_profile_a = params
            .molecular_profile_a
            .filter(|p| !p.is_empty())
            .ok_or_else(|| Error::InvalidRequest {
                reason: "missing `molecularProfileA` query parameter".to_string(),
            })?;

        Ok(Self {
            molecular_profile_a,
            molecular_profile_b: params.molecular_profile_b,
            threshold: parse_threshold(params.threshold.as_deref()),
            entrez_gene_id: body.entrez_gene_id,
            sample_list_id: body.sample_list_id,
        })
    }

    pub fn pipeline_request(&self) -> PipelineRequest {
        PipelineRequest::new(self.molecular_profile_a.clone(), self.entrez_gene_id)
    }
}

fn parse_threshold(raw: Option<&str>) -> f64 {
    raw.and_then(|t| t.trim().parse::<f64>().ok())
        .filter(|t| t.is_finite())
        .unwrap_or(DEFAULT_THRESHOLD)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(profile: Option<&str>, threshold: Option<&str>) -> FetchParams {
        FetchParams {
            molecular_profile_a: profile.map(str::to_string),
            molecular_profile_b: None,
            threshold: threshold.map(str::to_string),
        }
    }

    #[test]
    fn threshold_defaults_when_absent_or_unparsable() {
        assert_eq!(parse_threshold(None), DEFAULT_THRESHOLD);
        assert_eq!(parse_threshold(Some("")), DEFAULT_THRESHOLD);
        assert_eq!(parse_threshold(Some("high")), DEFAULT_THRESHOLD);
        assert_eq!(parse_threshold(Some("NaN")), DEFAULT_THRESHOLD);
        assert_eq!(parse_threshold(Some("1.5")), 1.5);
    }

    #[test]
    fn combines_body_and_query() {
        let request = ServiceRequest::parse(
            params(Some("brca_tcga_mrna"), Some("0.3")),
            br#"{"entrezGeneId": 672, "sampleListId": "brca_tcga_all"}"#,
        )
        .unwrap();

        assert_eq!(request.molecular_profile_a, "brca_tcga_mrna");
        assert_eq!(request.threshold, 0.3);
        assert_eq!(request.sample_list_id.as_deref(), Some("brca_tcga_all"));
        assert_eq!(
            request.pipeline_request(),
            PipelineRequest::new("brca_tcga_mrna", 672)
        );
    }

    #[test]
    fn body_threshold_is_ignored() {
        let request = ServiceRequest::parse(
            params(Some("p"), None),
            br#"{"entrezGeneId": 1, "threshold": 0.1}"#,
        )
        .unwrap();
        assert_eq!(request.threshold, DEFAULT_THRESHOLD);
    }

    #[test]
    fn rejects_bad_body_or_missing_profile() {
        assert!(matches!(
            ServiceRequest::parse(params(Some("p"), None), b"{"),
            Err(Error::InvalidRequest { .. })
        ));
        assert!(matches!(
            ServiceRequest::parse(params(Some("p"), None), br#"{"sampleListId": "x"}"#),
            Err(Error::InvalidRequest { .. })
        ));
        assert!(matches!(
            ServiceRequest::parse(params(None, None), br#"{"entrezGeneId": 1}"#),
            Err(Error::InvalidRequest { .. })
        ));
        assert!(matches!(
            ServiceRequest::parse(params(Some(""), None), br#"{"entrezGeneId": 1}"#),
            Err(Error::InvalidRequest { .. })
        ));
    }
}

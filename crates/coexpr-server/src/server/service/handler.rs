//! Route handlers for the co-expression service.
//!
//! [`fetch_co_expressions`] runs the pipeline up to the correlation fan-out before
//! answering, so every failure known up front maps to a proper status code.
//! Once results flow the response is committed to `200`; a later failure
//! aborts the chunked body before the closing `]`.

use super::{
    CoExpressionService,
    request::{FetchParams, ServiceRequest},
};
use crate::server::telemetry::{
    decrement_streams_inflight, increment_requests, increment_results_emitted,
    increment_stream_errors, increment_streams_inflight, record_genes_per_request,
    record_stream_duration,
};
use axum::{
    Json,
    body::Body,
    extract::{Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use coexpr::{Error, encode_json_array, source::BatchSource};
use futures::{StreamExt, TryStreamExt};
use std::time::Instant;
use tokio_util::task::task_tracker::TaskTrackerToken;

/// Error response body: `{"error": "<message>"}`.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            Error::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            Error::QueryGeneNotFound { .. } => StatusCode::NOT_FOUND,
            Error::ServiceShutdown => StatusCode::SERVICE_UNAVAILABLE,
            // Client closed the request; nobody reads this.
            Error::Cancelled => {
                StatusCode::from_u16(499).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            Error::Source { .. }
            | Error::Schema { .. }
            | Error::Computation { .. }
            | Error::ChannelError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(serde_json::json!({ "error": self.0.to_string() }));
        (status, body).into_response()
    }
}

/// Keeps a response body registered as in flight until it is dropped.
struct StreamGuard {
    start: Instant,
    _token: TaskTrackerToken,
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        decrement_streams_inflight();
        record_stream_duration(elapsed.as_secs_f64() * 1000.0);

        #[cfg(feature = "tracing")]
        tracing::info!("Total pipeline time: {:?}", elapsed);
    }
}

/// `POST /molecular-profiles/co-expressions/fetch`
#[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
pub async fn fetch_co_expressions<S: BatchSource>(
    State(service): State<CoExpressionService<S>>,
    Query(params): Query<FetchParams>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let start = Instant::now();

    let result = start_stream(&service, params, &body, start).await;
    if let Err(_e) = &result {
        increment_stream_errors();
        #[cfg(feature = "tracing")]
        tracing::warn!("Request failed before streaming: {}", _e.0);
    }
    result
}

async fn start_stream<S: BatchSource>(
    service: &CoExpressionService<S>,
    params: FetchParams,
    body: &[u8],
    start: Instant,
) -> Result<Response, ApiError> {
    if !service.is_serving() {
        return Err(Error::ServiceShutdown.into());
    }

    let request = ServiceRequest::parse(params, body)?;
    increment_requests();

    #[cfg(feature = "tracing")]
    tracing::info!(
        "Fetching co-expressions for gene {} in `{}` (profile B: {:?}, sample list: {:?}, threshold: {})",
        request.entrez_gene_id,
        request.molecular_profile_a,
        request.molecular_profile_b,
        request.sample_list_id,
        request.threshold
    );

    let pipeline = service.pipeline();
    let results = pipeline
        .run(request.pipeline_request(), pipeline.request_token())
        .await?;
    record_genes_per_request(results.num_units() as f64);

    #[cfg(feature = "tracing")]
    tracing::info!(
        "Streaming {} results after {:?}",
        results.num_units(),
        start.elapsed()
    );

    increment_streams_inflight();
    let guard = StreamGuard {
        start,
        _token: service.streams().token(),
    };

    let results = results
        .inspect_ok(|_| increment_results_emitted(1))
        .inspect_err(|_e| {
            increment_stream_errors();
            #[cfg(feature = "tracing")]
            tracing::warn!("Stream aborted: {}", _e);
        });
    let chunks = encode_json_array(results).map(move |chunk| {
        let _in_flight = &guard;
        chunk
    });

    Ok((
        [(header::CONTENT_TYPE, "application/json")],
        Body::from_stream(chunks),
    )
        .into_response())
}

/// `GET /health`
pub async fn health<S: BatchSource>(
    State(service): State<CoExpressionService<S>>,
) -> (StatusCode, &'static str) {
    if service.is_serving() {
        (StatusCode::OK, "SERVING")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT_SERVING")
    }
}

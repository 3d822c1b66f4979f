//! HTTP surface of the co-expression service.
//!
//! ## Structure
//!
//! - [`handler`] - route handlers and error responses.
//! - [`request`] - request body and query parameter parsing.

pub mod handler;
pub mod request;

use axum::{
    Router,
    routing::{get, post},
};
use coexpr::{Pipeline, source::BatchSource};
use core::time::Duration;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio_util::task::TaskTracker;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};

/// Route serving co-expression requests.
pub const FETCH_PATH: &str = "/molecular-profiles/co-expressions/fetch";
/// Route reporting whether the service accepts requests.
pub const HEALTH_PATH: &str = "/health";

/// Shared state behind every route.
///
/// Cloning is cheap: the pipeline (and with it the worker pool) is shared by
/// all requests.
pub struct CoExpressionService<S> {
    pipeline: Arc<Pipeline<S>>,
    serving: Arc<AtomicBool>,
    streams: TaskTracker,
}

impl<S> Clone for CoExpressionService<S> {
    fn clone(&self) -> Self {
        Self {
            pipeline: Arc::clone(&self.pipeline),
            serving: Arc::clone(&self.serving),
            streams: self.streams.clone(),
        }
    }
}

impl<S: BatchSource> CoExpressionService<S> {
    pub fn new(pipeline: Pipeline<S>) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            serving: Arc::new(AtomicBool::new(true)),
            streams: TaskTracker::new(),
        }
    }

    pub fn pipeline(&self) -> &Pipeline<S> {
        &self.pipeline
    }

    pub fn is_serving(&self) -> bool {
        self.serving.load(Ordering::Acquire)
    }

    /// Tracks in-flight response bodies so shutdown can drain them.
    pub(crate) fn streams(&self) -> &TaskTracker {
        &self.streams
    }

    /// Builds the router for all routes.
    pub fn router(self) -> Router {
        Router::new()
            .route(FETCH_PATH, post(handler::fetch_co_expressions::<S>))
            .route(HEALTH_PATH, get(handler::health::<S>))
            .layer(
                ServiceBuilder::new().layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                ),
            )
            .with_state(self)
    }

    /// Stops accepting requests, waits up to `drain_timeout` for in-flight
    /// streams, then shuts the worker pool down. Streams still running at that
    /// point are cancelled through the pool's shutdown token.
    pub async fn shutdown(&self, drain_timeout: Duration) {
        self.serving.store(false, Ordering::Release);
        self.streams.close();

        #[cfg(feature = "tracing")]
        tracing::info!("Draining {} in-flight streams", self.streams.len());

        if tokio::time::timeout(drain_timeout, self.streams.wait())
            .await
            .is_err()
        {
            #[cfg(feature = "tracing")]
            tracing::warn!(
                "{} streams still running after {:?}; cancelling",
                self.streams.len(),
                drain_timeout
            );
        }

        self.pipeline.pool().shutdown().await;
    }
}

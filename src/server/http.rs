//! HTTP endpoint for the boundary RPC
//!
//! Exposes any `DataService` as `POST /api/financial-data`.

use std::future::Future;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use tokio::net::TcpListener;
use tracing::{debug, info};

use crate::boundary::{DataRequest, DataResponse, DataService, ResponseBody, ENDPOINT_PATH};

/// Builds the router serving the financial data endpoint
pub fn router(service: Arc<dyn DataService>) -> Router {
    Router::new()
        .route(ENDPOINT_PATH, post(financial_data))
        .with_state(service)
}

async fn financial_data(
    State(service): State<Arc<dyn DataService>>,
    payload: Result<Json<DataRequest>, JsonRejection>,
) -> (StatusCode, Json<ResponseBody>) {
    let response = match payload {
        Ok(Json(request)) => {
            debug!(operation = %request.operation_kind, "boundary request");
            service.call(request).await
        }
        Err(rejection) => DataResponse::failure(400, rejection.body_text()),
    };

    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(response.body))
}

/// Serves `service` on `listener` until `shutdown` resolves
pub async fn serve<F>(
    listener: TcpListener,
    service: Arc<dyn DataService>,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "serving {}", ENDPOINT_PATH);
    }
    axum::serve(listener, router(service))
        .with_graceful_shutdown(shutdown)
        .await
}

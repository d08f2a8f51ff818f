//! HTTP surface: two read-only JSON endpoints over the dataset service.
//!
//! Routes are served both at the root and under `/api`. Every failure is
//! reported in a JSON body with status 200, never as a transport error.

use std::{net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    extract::{Query, State, rejection::QueryRejection},
    response::{IntoResponse, Response},
    routing::get,
};
use log::{error, info, warn};
use serde::Deserialize;
use serde_json::json;
use tokio::{net::TcpListener, task};
use tower_http::cors::{Any, CorsLayer};

use crate::{
    filter::FilterSpec,
    query::{DEFAULT_PAGE, DEFAULT_PAGE_SIZE, DEFAULT_SORT_FIELD, QueryRequest, SortDirection},
    service::DatasetService,
};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionParams {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
    pub q: Option<String>,
    pub sort_field: Option<String>,
    pub sort_dir: Option<String>,
    pub filters: Option<String>,
}

impl TransactionParams {
    pub fn into_request(self) -> QueryRequest {
        QueryRequest {
            page: self.page.unwrap_or(DEFAULT_PAGE),
            page_size: self.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
            sort_field: Some(
                self.sort_field
                    .unwrap_or_else(|| DEFAULT_SORT_FIELD.to_string()),
            ),
            sort_dir: self
                .sort_dir
                .as_deref()
                .map(SortDirection::parse)
                .unwrap_or_default(),
            search: self.q.unwrap_or_default(),
            filters: FilterSpec::parse(self.filters.as_deref()),
        }
    }
}

pub fn router(service: Arc<DatasetService>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(transaction_routes(Arc::clone(&service)))
        .nest("/api", transaction_routes(service))
        .layer(cors)
}

fn transaction_routes(service: Arc<DatasetService>) -> Router {
    Router::new()
        .route("/transactions", get(list_transactions))
        .route("/transactions/filter-options", get(filter_options))
        .with_state(service)
}

async fn list_transactions(
    State(service): State<Arc<DatasetService>>,
    params: Result<Query<TransactionParams>, QueryRejection>,
) -> Response {
    let request = match params {
        Ok(Query(params)) => params.into_request(),
        Err(rejection) => {
            warn!("Rejected transactions query: {rejection}");
            return transactions_error(rejection.body_text());
        }
    };

    match task::spawn_blocking(move || service.query(&request)).await {
        Ok(Ok(page)) => Json(page).into_response(),
        Ok(Err(err)) => {
            error!("Error processing transactions: {err}");
            transactions_error(err.to_string())
        }
        Err(err) => {
            error!("Transactions worker failed: {err}");
            transactions_error(err.to_string())
        }
    }
}

async fn filter_options(State(service): State<Arc<DatasetService>>) -> Response {
    match task::spawn_blocking(move || service.filter_options()).await {
        Ok(Ok(options)) => Json(options).into_response(),
        Ok(Err(err)) => {
            error!("Error computing filter options: {err}");
            Json(json!({ "error": err.to_string() })).into_response()
        }
        Err(err) => {
            error!("Filter options worker failed: {err}");
            Json(json!({ "error": err.to_string() })).into_response()
        }
    }
}

fn transactions_error(message: String) -> Response {
    Json(json!({ "error": message, "data": [], "total": 0 })).into_response()
}

/// Warms the dataset, then serves until the process is stopped. A failed
/// warm-up is logged and left for the first request to retry.
pub async fn serve(service: Arc<DatasetService>, addr: &str) -> Result<()> {
    let addr: SocketAddr = addr
        .parse()
        .with_context(|| format!("Invalid listen address '{addr}'"))?;

    let warm = Arc::clone(&service);
    match task::spawn_blocking(move || warm.ensure_loaded()).await {
        Ok(Ok(snapshot)) => info!("Dataset ready with {} record(s)", snapshot.dataset.len()),
        Ok(Err(err)) => warn!("Dataset warm-up failed: {err}"),
        Err(err) => warn!("Dataset warm-up task failed: {err}"),
    }

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Binding {addr}"))?;
    info!("Listening on http://{addr}");
    axum::serve(listener, router(service))
        .await
        .context("HTTP server terminated")?;
    Ok(())
}

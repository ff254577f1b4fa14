// src/api.rs
//! Admin HTTP API over the same stores the relay reads.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::metrics::Metrics;
use crate::store::{normalize_source_name, QueryRegister, SourceRegistry};

#[derive(Clone)]
pub struct AdminState {
    pub sources: Arc<dyn SourceRegistry>,
    pub query: Arc<dyn QueryRegister>,
}

pub fn router(state: AdminState, metrics: Option<&Metrics>) -> Router {
    let mut app = Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/query", get(get_query).put(put_query))
        .route("/sources", get(list_sources).post(add_source))
        .route("/sources/{name}", delete(remove_source))
        .with_state(state);
    if let Some(m) = metrics {
        app = app.merge(m.router());
    }
    app.layer(TraceLayer::new_for_http())
}

/// JSON error body `{"error": "..."}` with a status code.
struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(json!({ "error": self.1 }))).into_response()
    }
}

fn internal(e: anyhow::Error) -> ApiError {
    warn!(error = %format!("{e:#}"), "admin API store error");
    ApiError(StatusCode::INTERNAL_SERVER_ERROR, "store unavailable".into())
}

#[derive(Serialize, Deserialize)]
struct QueryBody {
    query: String,
}

async fn get_query(State(st): State<AdminState>) -> Json<QueryBody> {
    Json(QueryBody {
        query: st.query.get(),
    })
}

async fn put_query(
    State(st): State<AdminState>,
    Json(body): Json<QueryBody>,
) -> Result<Json<QueryBody>, ApiError> {
    if body.query.trim().is_empty() {
        return Err(ApiError(StatusCode::BAD_REQUEST, "query is empty".into()));
    }
    st.query.set(&body.query).map_err(internal)?;
    info!(query = %body.query, "query updated via admin API");
    Ok(Json(body))
}

#[derive(Serialize)]
struct SourcesBody {
    channels: Vec<String>,
}

async fn list_sources(State(st): State<AdminState>) -> Result<Json<SourcesBody>, ApiError> {
    let channels = st.sources.list().map_err(internal)?;
    Ok(Json(SourcesBody { channels }))
}

#[derive(Deserialize)]
struct AddSource {
    name: String,
}

async fn add_source(
    State(st): State<AdminState>,
    Json(body): Json<AddSource>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let name = normalize_source_name(&body.name)
        .map_err(|e| ApiError(StatusCode::BAD_REQUEST, e.to_string()))?;
    let added = st.sources.add(&name).map_err(internal)?;
    if added {
        info!(channel = %name, "channel added via admin API");
    }
    let status = if added {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(json!({ "name": name, "added": added }))))
}

async fn remove_source(
    State(st): State<AdminState>,
    Path(name): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let name = normalize_source_name(&name)
        .map_err(|e| ApiError(StatusCode::BAD_REQUEST, e.to_string()))?;
    if !st.sources.remove(&name).map_err(internal)? {
        return Err(ApiError(
            StatusCode::NOT_FOUND,
            format!("'{name}' is not monitored"),
        ));
    }
    info!(channel = %name, "channel removed via admin API");
    Ok(Json(json!({ "name": name, "removed": true })))
}

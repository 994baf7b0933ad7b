//! HTTP surface of the registry.
//!
//! Handlers deserialize and validate requests, call the controllers in
//! [`crate::app`] and render their results. Every route lives under `/v2`,
//! except the versions document served at `/` and `/versions`.

mod access;
mod context;
mod data;
mod error;
mod images;
pub mod links;
mod schemas;
mod tags;
mod versions;

pub use context::{ROLES_HEADER, TENANT_HEADER, USER_HEADER};
pub use error::ApiError;

use crate::{registry::Registry, schema::SchemaProvider, storage::Storage};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, put},
};
use bytes::Bytes;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Shared handles passed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<dyn Registry>,
    pub schemas: Arc<SchemaProvider>,
    pub storage: Arc<Storage>,
    /// Absolute base URL used by the versions document.
    pub base_url: String,
    /// Largest image data upload accepted, in bytes.
    pub max_upload_size: usize,
}

pub fn router(state: AppState) -> Router {
    let upload_limit = state.max_upload_size;

    Router::new()
        .route("/", get(versions::index))
        .route("/versions", get(versions::index))
        .route("/v2/images", get(images::index).post(images::create))
        .route(
            "/v2/images/{id}",
            get(images::show)
                .put(images::update)
                .patch(images::update)
                .delete(images::delete),
        )
        .route(
            "/v2/images/{id}/access",
            get(access::index).post(access::create),
        )
        .route(
            "/v2/images/{id}/access/{tenant}",
            get(access::show).delete(access::delete),
        )
        .route("/v2/images/{id}/tags", get(tags::index))
        .route(
            "/v2/images/{id}/tags/{value}",
            put(tags::update).delete(tags::delete),
        )
        .route(
            "/v2/images/{id}/file",
            get(data::download)
                .put(data::upload)
                .layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/v2/schemas", get(schemas::index))
        .route("/v2/schemas/image", get(schemas::image))
        .route("/v2/schemas/image/access", get(schemas::access))
        .with_state(state)
}

/// Parses a request body that must be a JSON object.
fn parse_object(body: &Bytes) -> Result<Map<String, Value>, ApiError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| ApiError::BadRequest(format!("Malformed JSON in request body: {e}")))?;

    match value {
        Value::Object(map) => Ok(map),
        _ => Err(ApiError::BadRequest(
            "Request body must be a JSON object".to_string(),
        )),
    }
}

use super::{ApiError, AppState, links};
use crate::schema::{ACCESS_SCHEMA, IMAGE_SCHEMA};
use axum::{Json, extract::State};
use serde_json::{Value, json};

pub async fn index() -> Json<Value> {
    Json(json!({ "links": links::schema_links() }))
}

pub async fn image(State(app): State<AppState>) -> Result<Json<Value>, ApiError> {
    Ok(Json(app.schemas.get_schema(IMAGE_SCHEMA)?.clone()))
}

pub async fn access(State(app): State<AppState>) -> Result<Json<Value>, ApiError> {
    Ok(Json(app.schemas.get_schema(ACCESS_SCHEMA)?.clone()))
}

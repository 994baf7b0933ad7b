use super::{ApiError, AppState};
use crate::{app, context::RequestContext};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

/// Tags render as a bare array of values.
pub async fn index(
    State(app): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<String>,
) -> Result<Json<Vec<String>>, ApiError> {
    let tags = app::list_tags(app.registry.as_ref(), &ctx, &id).await?;

    Ok(Json(tags.into_iter().map(|t| t.value).collect()))
}

pub async fn update(
    State(app): State<AppState>,
    ctx: RequestContext,
    Path((id, value)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    app::add_tag(app.registry.as_ref(), &ctx, &id, &value).await?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete(
    State(app): State<AppState>,
    ctx: RequestContext,
    Path((id, value)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    app::delete_tag(app.registry.as_ref(), &ctx, &id, &value).await?;

    Ok(StatusCode::NO_CONTENT)
}

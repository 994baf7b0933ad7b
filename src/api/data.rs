use super::{ApiError, AppState};
use crate::{app, context::RequestContext};
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
};
use bytes::Bytes;

const OCTET_STREAM: &str = "application/octet-stream";

fn is_octet_stream(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .is_some_and(|v| v.trim().eq_ignore_ascii_case(OCTET_STREAM))
}

/// The announced body length, if the client sent a usable one.
fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

pub async fn upload(
    State(app): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    if !is_octet_stream(&headers) {
        return Err(ApiError::UnsupportedMediaType(format!(
            "Image data must be sent as {OCTET_STREAM}"
        )));
    }

    app::upload_image_data(
        app.registry.as_ref(),
        &app.storage,
        &ctx,
        &id,
        &body,
        content_length(&headers),
    )
    .await?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn download(
    State(app): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let data = app::download_image_data(app.registry.as_ref(), &app.storage, &ctx, &id).await?;

    Ok((
        [
            (header::CONTENT_TYPE, OCTET_STREAM.to_string()),
            (header::CONTENT_LENGTH, data.size.to_string()),
        ],
        data.bytes,
    ))
}

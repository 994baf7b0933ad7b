use super::{ApiError, AppState, links, parse_object};
use crate::{
    app,
    context::RequestContext,
    model::{AccessGrant, AccessRecord},
    schema::{ACCESS_SCHEMA, SchemaProvider},
};
use axum::{
    Json,
    extract::{Path, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use bytes::Bytes;
use serde_json::{Value, json};

/// Validates a grant body. The wire `tenant_id` becomes the record's `member`.
fn access_grant(schemas: &SchemaProvider, body: &Bytes) -> Result<AccessGrant, ApiError> {
    let mut body = parse_object(body)?;
    schemas.validate(ACCESS_SCHEMA, &Value::Object(body.clone()))?;

    let member = match body.remove("tenant_id") {
        Some(Value::String(tenant)) if !tenant.is_empty() => tenant,
        _ => {
            return Err(ApiError::BadRequest(
                "tenant_id must be a non-empty string".to_string(),
            ));
        }
    };
    let can_share = body
        .get("can_share")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    Ok(AccessGrant { member, can_share })
}

fn format_access(record: &AccessRecord) -> Value {
    json!({
        "tenant_id": record.member,
        "can_share": record.can_share,
        "links": links::access_links(&record.image_id, &record.member),
    })
}

pub async fn index(
    State(app): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let records = app::list_access(app.registry.as_ref(), &ctx, &id).await?;

    Ok(Json(json!({
        "access_records": records.iter().map(format_access).collect::<Vec<_>>(),
        "links": [],
    })))
}

pub async fn show(
    State(app): State<AppState>,
    ctx: RequestContext,
    Path((id, tenant)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let record = app::show_access(app.registry.as_ref(), &ctx, &id, &tenant).await?;

    Ok(Json(json!({ "access_record": format_access(&record) })))
}

pub async fn create(
    State(app): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let grant = access_grant(&app.schemas, &body)?;

    let record = app::create_access(app.registry.as_ref(), &ctx, &id, grant).await?;

    Ok((
        StatusCode::CREATED,
        [(
            header::LOCATION,
            links::access_href(&record.image_id, Some(&record.member)),
        )],
        Json(json!({ "access": format_access(&record) })),
    ))
}

pub async fn delete(
    State(app): State<AppState>,
    ctx: RequestContext,
    Path((id, tenant)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    app::delete_access(app.registry.as_ref(), &ctx, &id, &tenant).await?;

    Ok(StatusCode::NO_CONTENT)
}

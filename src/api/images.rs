use super::{ApiError, AppState, links, parse_object};
use crate::{
    app,
    context::RequestContext,
    model::{Image, ImageFields},
    parser::parse_query,
    query::ImageQuery,
    schema::{IMAGE_SCHEMA, SchemaProvider},
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use bytes::Bytes;
use serde::Deserialize;
use serde_json::{Value, json};

#[derive(Debug, Deserialize)]
pub struct ListParams {
    /// Filter expression, e.g. `ubuntu AND NOT beta`.
    tags: Option<String>,
    limit: Option<u32>,
    offset: Option<u32>,
}

impl ListParams {
    fn into_query(self) -> Result<ImageQuery, ApiError> {
        let mut query = ImageQuery::live();

        if let Some(tags) = self.tags.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            query = query.with_expr(parse_query(tags)?);
        }
        if let Some(limit) = self.limit {
            query = query.with_limit(limit);
        }
        if let Some(offset) = self.offset {
            query = query.with_offset(offset);
        }

        Ok(query)
    }
}

/// Validates a request body against the `image` schema and splits it.
fn image_fields(schemas: &SchemaProvider, body: &Bytes) -> Result<ImageFields, ApiError> {
    let body = parse_object(body)?;
    schemas.validate(IMAGE_SCHEMA, &Value::Object(body.clone()))?;

    Ok(ImageFields::from_json(body)?)
}

/// Renders an image: only schema-declared attributes, plus `id`, `name` and links.
fn format_image(schemas: &SchemaProvider, image: &Image) -> Result<Value, ApiError> {
    let mut attrs = schemas.filter_properties(IMAGE_SCHEMA, image.attributes())?;

    attrs.insert("id".to_string(), json!(image.id));
    attrs.insert("name".to_string(), json!(image.name));
    attrs.insert("links".to_string(), json!(links::image_links(&image.id)));

    Ok(Value::Object(attrs))
}

pub async fn index(
    State(app): State<AppState>,
    ctx: RequestContext,
    Query(params): Query<ListParams>,
) -> Result<Json<Value>, ApiError> {
    let query = params.into_query()?;

    let images = app::list_images(app.registry.as_ref(), &ctx, query).await?;
    let images = images
        .iter()
        .map(|image| format_image(&app.schemas, image))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(json!({ "images": images, "links": [] })))
}

pub async fn create(
    State(app): State<AppState>,
    ctx: RequestContext,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let fields = image_fields(&app.schemas, &body)?;

    let image = app::create_image(app.registry.as_ref(), &ctx, fields).await?;

    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, links::image_href(&image.id, None))],
        Json(json!({ "image": format_image(&app.schemas, &image)? })),
    ))
}

pub async fn show(
    State(app): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let image = app::show_image(app.registry.as_ref(), &ctx, &id).await?;

    Ok(Json(json!({ "image": format_image(&app.schemas, &image)? })))
}

pub async fn update(
    State(app): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let fields = image_fields(&app.schemas, &body)?;

    let image = app::update_image(app.registry.as_ref(), &ctx, &id, fields).await?;

    Ok(Json(json!({ "image": format_image(&app.schemas, &image)? })))
}

pub async fn delete(
    State(app): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    app::delete_image(app.registry.as_ref(), &ctx, &id).await?;

    Ok(StatusCode::NO_CONTENT)
}

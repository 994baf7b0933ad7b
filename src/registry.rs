//! The data store seam.
//!
//! Controllers in [`crate::app`] only talk to an `Arc<dyn Registry>`. The SQLite
//! adapter ([`crate::database::Database`]) backs the service; the in-memory
//! [`crate::memory::MemoryRegistry`] backs tests and throwaway deployments.
//!
//! Image lookups take the caller's context and enforce visibility: an image
//! that exists but is hidden from the caller yields [`StoreError::Forbidden`].
//! Member and tag operations are plain data operations; callers resolve the
//! image first.

use crate::{
    context::RequestContext,
    database::DatabaseError,
    model::{AccessRecord, Image, ImageUpdate, NewAccessRecord, NewImage, Tag},
    query::ImageQuery,
};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(#[from] DatabaseError),
}

impl StoreError {
    pub fn image_not_found(id: &str) -> Self {
        StoreError::NotFound {
            kind: "image",
            id: id.to_string(),
        }
    }

    pub fn member_not_found(image_id: &str, member: &str) -> Self {
        StoreError::NotFound {
            kind: "access record",
            id: format!("{image_id}/{member}"),
        }
    }

    pub fn tag_not_found(image_id: &str, value: &str) -> Self {
        StoreError::NotFound {
            kind: "tag",
            id: format!("{image_id}/{value}"),
        }
    }
}

/// CRUD over images, access records and tags.
#[async_trait]
pub trait Registry: Send + Sync {
    /// Stores a new image. A caller-chosen id that is already taken yields
    /// [`StoreError::Conflict`]; otherwise a UUID v4 is assigned.
    async fn image_create(&self, image: NewImage) -> Result<Image, StoreError>;

    /// Fetches a live image the caller may see.
    async fn image_get(&self, ctx: &RequestContext, id: &str) -> Result<Image, StoreError>;

    /// Lists images matching `query`, restricted to what the caller may see.
    async fn image_get_all(
        &self,
        ctx: &RequestContext,
        query: &ImageQuery,
    ) -> Result<Vec<Image>, StoreError>;

    /// Merge-updates an image the caller may change.
    async fn image_update(
        &self,
        ctx: &RequestContext,
        id: &str,
        update: ImageUpdate,
    ) -> Result<Image, StoreError>;

    /// Soft-deletes an image the caller may change.
    async fn image_destroy(&self, ctx: &RequestContext, id: &str) -> Result<(), StoreError>;

    /// Finds the live access record of `member` on an image.
    async fn image_member_find(
        &self,
        image_id: &str,
        member: &str,
    ) -> Result<AccessRecord, StoreError>;

    /// Every access record of an image, soft-deleted ones included.
    async fn image_member_get_all(&self, image_id: &str) -> Result<Vec<AccessRecord>, StoreError>;

    /// Stores a grant. A second live grant for the same pair yields
    /// [`StoreError::Conflict`].
    async fn image_member_create(&self, record: NewAccessRecord)
    -> Result<AccessRecord, StoreError>;

    /// Soft-deletes a grant.
    async fn image_member_delete(&self, record: &AccessRecord) -> Result<(), StoreError>;

    /// Tags of an image ordered by value.
    async fn image_tag_get_all(&self, image_id: &str) -> Result<Vec<Tag>, StoreError>;

    /// Attaches a tag. Attaching a tag that is already present is a no-op.
    async fn image_tag_create(&self, image_id: &str, value: &str) -> Result<Tag, StoreError>;

    /// Removes a tag, or fails with [`StoreError::NotFound`] if it is absent.
    async fn image_tag_delete(&self, image_id: &str, value: &str) -> Result<(), StoreError>;
}

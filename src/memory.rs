//! An in-memory [`Registry`] for tests and throwaway deployments.
//!
//! It follows the same visibility and uniqueness rules as the SQLite adapter;
//! listings come back in insertion order.

use crate::{
    context::RequestContext,
    model::{AccessRecord, Image, ImageUpdate, NewAccessRecord, NewImage, Tag, now},
    policy,
    query::ImageQuery,
    registry::{Registry, StoreError},
};
use async_trait::async_trait;
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Default)]
struct Inner {
    images: Vec<Image>,
    members: Vec<AccessRecord>,
    tags: BTreeMap<String, BTreeSet<String>>,
}

impl Inner {
    fn image(&self, id: &str) -> Option<&Image> {
        self.images.iter().find(|i| i.id == id)
    }

    fn image_mut(&mut self, id: &str) -> Option<&mut Image> {
        self.images.iter_mut().find(|i| i.id == id)
    }

    fn live_member(&self, image_id: &str, member: &str) -> Option<&AccessRecord> {
        self.members
            .iter()
            .find(|m| m.image_id == image_id && m.member == member && !m.deleted)
    }

    fn membership(&self, ctx: &RequestContext, image_id: &str) -> Option<&AccessRecord> {
        ctx.tenant
            .as_deref()
            .and_then(|tenant| self.live_member(image_id, tenant))
    }

    fn visible_image(&self, ctx: &RequestContext, id: &str) -> Result<&Image, StoreError> {
        let image = match self.image(id) {
            Some(image) if !image.deleted => image,
            _ => return Err(StoreError::image_not_found(id)),
        };

        if policy::is_image_visible(ctx, image, self.membership(ctx, id)) {
            Ok(image)
        } else {
            Err(StoreError::Forbidden(format!("image {id} is not visible")))
        }
    }

    fn check_mutable(&self, ctx: &RequestContext, id: &str) -> Result<(), StoreError> {
        let image = self.visible_image(ctx, id)?;

        if policy::is_image_mutable(ctx, image) {
            Ok(())
        } else {
            Err(StoreError::Forbidden(format!(
                "image {id} may only be changed by its owner"
            )))
        }
    }
}

/// A registry kept entirely in process memory. Clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct MemoryRegistry {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Registry for MemoryRegistry {
    async fn image_create(&self, new: NewImage) -> Result<Image, StoreError> {
        let mut inner = self.inner.write().await;

        let id = new.id.unwrap_or_else(|| Uuid::new_v4().to_string());
        if inner.image(&id).is_some() {
            return Err(StoreError::Conflict(format!("image {id} already exists")));
        }

        let created_at = now();
        let image = Image {
            id,
            name: new.name,
            owner: new.owner,
            status: new.status,
            visibility: new.visibility,
            size: None,
            checksum: None,
            created_at,
            updated_at: created_at,
            deleted: false,
            deleted_at: None,
            properties: new.properties,
        };
        inner.images.push(image.clone());

        Ok(image)
    }

    async fn image_get(&self, ctx: &RequestContext, id: &str) -> Result<Image, StoreError> {
        let inner = self.inner.read().await;

        inner.visible_image(ctx, id).cloned()
    }

    async fn image_get_all(
        &self,
        ctx: &RequestContext,
        query: &ImageQuery,
    ) -> Result<Vec<Image>, StoreError> {
        let inner = self.inner.read().await;
        let empty = BTreeSet::new();

        let images = inner
            .images
            .iter()
            .filter(|image| policy::is_image_visible(ctx, image, inner.membership(ctx, &image.id)))
            .filter(|image| {
                let tags = inner.tags.get(&image.id).unwrap_or(&empty);
                query.matches(image, tags)
            })
            .cloned()
            .collect();

        Ok(query.paginate(images))
    }

    async fn image_update(
        &self,
        ctx: &RequestContext,
        id: &str,
        update: ImageUpdate,
    ) -> Result<Image, StoreError> {
        let mut inner = self.inner.write().await;
        inner.check_mutable(ctx, id)?;

        let image = inner
            .image_mut(id)
            .ok_or_else(|| StoreError::image_not_found(id))?;
        update.apply(image, now());

        Ok(image.clone())
    }

    async fn image_destroy(&self, ctx: &RequestContext, id: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner.check_mutable(ctx, id)?;

        let image = inner
            .image_mut(id)
            .ok_or_else(|| StoreError::image_not_found(id))?;
        let deleted_at = now();
        image.deleted = true;
        image.status = crate::model::ImageStatus::Deleted;
        image.deleted_at = Some(deleted_at);
        image.updated_at = deleted_at;

        Ok(())
    }

    async fn image_member_find(
        &self,
        image_id: &str,
        member: &str,
    ) -> Result<AccessRecord, StoreError> {
        let inner = self.inner.read().await;

        inner
            .live_member(image_id, member)
            .cloned()
            .ok_or_else(|| StoreError::member_not_found(image_id, member))
    }

    async fn image_member_get_all(&self, image_id: &str) -> Result<Vec<AccessRecord>, StoreError> {
        let inner = self.inner.read().await;

        Ok(inner
            .members
            .iter()
            .filter(|m| m.image_id == image_id)
            .cloned()
            .collect())
    }

    async fn image_member_create(
        &self,
        record: NewAccessRecord,
    ) -> Result<AccessRecord, StoreError> {
        let mut inner = self.inner.write().await;

        if inner.live_member(&record.image_id, &record.member).is_some() {
            return Err(StoreError::Conflict(format!(
                "image {} is already shared with {}",
                record.image_id, record.member
            )));
        }

        let created_at = now();
        let record = AccessRecord {
            image_id: record.image_id,
            member: record.member,
            can_share: record.can_share,
            deleted: false,
            created_at,
            updated_at: created_at,
        };
        inner.members.push(record.clone());

        Ok(record)
    }

    async fn image_member_delete(&self, record: &AccessRecord) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;

        let stored = inner
            .members
            .iter_mut()
            .find(|m| m.image_id == record.image_id && m.member == record.member && !m.deleted)
            .ok_or_else(|| StoreError::member_not_found(&record.image_id, &record.member))?;
        stored.deleted = true;
        stored.updated_at = now();

        Ok(())
    }

    async fn image_tag_get_all(&self, image_id: &str) -> Result<Vec<Tag>, StoreError> {
        let inner = self.inner.read().await;

        Ok(inner
            .tags
            .get(image_id)
            .into_iter()
            .flatten()
            .map(|value| Tag {
                image_id: image_id.to_string(),
                value: value.clone(),
            })
            .collect())
    }

    async fn image_tag_create(&self, image_id: &str, value: &str) -> Result<Tag, StoreError> {
        let mut inner = self.inner.write().await;

        inner
            .tags
            .entry(image_id.to_string())
            .or_default()
            .insert(value.to_string());

        Ok(Tag {
            image_id: image_id.to_string(),
            value: value.to_string(),
        })
    }

    async fn image_tag_delete(&self, image_id: &str, value: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;

        let removed = inner
            .tags
            .get_mut(image_id)
            .is_some_and(|values| values.remove(value));

        if removed {
            Ok(())
        } else {
            Err(StoreError::tag_not_found(image_id, value))
        }
    }
}

//! # Registry Controllers
//!
//! This module holds the operations behind every HTTP resource: images, their
//! access records (sharing), their tags and their uploaded data. Each
//! operation takes the data store as an injected [`Registry`] and the caller's
//! [`RequestContext`], and returns domain records; turning them into wire
//! representations is the job of [`crate::api`].
//!
//! ## Provided Operations
//!
//! - **Images**: `create_image`, `list_images`, `show_image`, `update_image`,
//!   `delete_image`.
//! - **Access records**: `list_access`, `show_access`, `create_access`,
//!   `delete_access`. The image lookup behind them never reveals whether a
//!   private image exists: a hidden image is reported as missing.
//! - **Tags**: `list_tags`, `add_tag`, `delete_tag`.
//! - **Image data**: `upload_image_data`, `download_image_data`.
//!
//! ## Error Handling
//!
//! [`AppError`] flattens store, storage, schema and parse failures into the
//! handful of outcomes a client can act on.

use crate::{
    context::RequestContext,
    database::DatabaseError,
    model::{
        AccessGrant, AccessRecord, FieldError, Image, ImageFields, ImageStatus, ImageUpdate,
        NewAccessRecord, NewImage, Tag,
    },
    parser::ParseErrorDetail,
    policy,
    query::ImageQuery,
    registry::{Registry, StoreError},
    schema::SchemaError,
    storage::{Storage, StorageError},
};

/// Longest tag value accepted.
pub const MAX_TAG_LENGTH: usize = 255;

const SHARE_DENIED: &str = "No permission to share that image";

/// Registers a new image.
///
/// Without an explicit owner the image belongs to the caller's tenant; only
/// admins may name another owner. The image always starts out `queued`.
pub async fn create_image(
    registry: &dyn Registry,
    ctx: &RequestContext,
    fields: ImageFields,
) -> Result<Image, AppError> {
    let owner = match fields.owner {
        None => ctx.tenant.clone(),
        Some(owner) if ctx.is_admin => Some(owner),
        Some(_) => {
            return Err(AppError::Forbidden(
                "Only admins may set the owner of an image".to_string(),
            ));
        }
    };

    let image = registry
        .image_create(NewImage {
            id: fields.id,
            name: fields.name,
            owner,
            status: ImageStatus::Queued,
            visibility: fields.visibility.unwrap_or_default(),
            properties: fields.properties,
        })
        .await?;

    tracing::info!(image_id = %image.id, owner = ?image.owner, "image created");

    Ok(image)
}

/// Lists live images visible to the caller.
pub async fn list_images(
    registry: &dyn Registry,
    ctx: &RequestContext,
    query: ImageQuery,
) -> Result<Vec<Image>, AppError> {
    let query = ImageQuery {
        deleted: Some(false),
        ..query
    };

    let images = registry.image_get_all(ctx, &query).await?;

    Ok(images.into_iter().filter(|image| !image.deleted).collect())
}

pub async fn show_image(
    registry: &dyn Registry,
    ctx: &RequestContext,
    image_id: &str,
) -> Result<Image, AppError> {
    Ok(registry.image_get(ctx, image_id).await?)
}

/// Merge-updates an image.
///
/// `id` and `status` are owned by the registry and silently ignored. An owner
/// change by a non-admin is refused.
pub async fn update_image(
    registry: &dyn Registry,
    ctx: &RequestContext,
    image_id: &str,
    fields: ImageFields,
) -> Result<Image, AppError> {
    if let Some(owner) = &fields.owner {
        if !ctx.is_admin {
            let current = registry.image_get(ctx, image_id).await?;
            if current.owner.as_ref() != Some(owner) {
                return Err(AppError::Forbidden(
                    "Only admins may change the owner of an image".to_string(),
                ));
            }
        }
    }

    let update = ImageUpdate {
        name: fields.name,
        owner: fields.owner,
        visibility: fields.visibility,
        properties: fields.properties,
        ..Default::default()
    };

    Ok(registry.image_update(ctx, image_id, update).await?)
}

pub async fn delete_image(
    registry: &dyn Registry,
    ctx: &RequestContext,
    image_id: &str,
) -> Result<(), AppError> {
    registry.image_destroy(ctx, image_id).await?;

    tracing::info!(image_id, "image deleted");

    Ok(())
}

/// Looks up the image behind an access resource.
///
/// A hidden image is indistinguishable from a missing one.
async fn shared_image(
    registry: &dyn Registry,
    ctx: &RequestContext,
    image_id: &str,
) -> Result<Image, AppError> {
    match registry.image_get(ctx, image_id).await {
        Ok(image) => Ok(image),
        Err(StoreError::NotFound { .. } | StoreError::Forbidden(_)) => {
            Err(AppError::NotFound(format!("Image {image_id} not found")))
        }
        Err(e) => Err(e.into()),
    }
}

/// The caller's own live grant on the image, if any.
async fn own_membership(
    registry: &dyn Registry,
    ctx: &RequestContext,
    image_id: &str,
) -> Result<Option<AccessRecord>, AppError> {
    let Some(tenant) = &ctx.tenant else {
        return Ok(None);
    };

    match registry.image_member_find(image_id, tenant).await {
        Ok(record) => Ok(Some(record)),
        Err(StoreError::NotFound { .. }) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn ensure_sharable(
    registry: &dyn Registry,
    ctx: &RequestContext,
    image: &Image,
) -> Result<(), AppError> {
    let membership = own_membership(registry, ctx, &image.id).await?;

    if ctx.is_image_sharable(image, membership.as_ref()) {
        Ok(())
    } else {
        Err(AppError::Forbidden(SHARE_DENIED.to_string()))
    }
}

/// Every live grant on an image.
pub async fn list_access(
    registry: &dyn Registry,
    ctx: &RequestContext,
    image_id: &str,
) -> Result<Vec<AccessRecord>, AppError> {
    shared_image(registry, ctx, image_id).await?;

    let records = registry.image_member_get_all(image_id).await?;

    Ok(records.into_iter().filter(|r| !r.deleted).collect())
}

pub async fn show_access(
    registry: &dyn Registry,
    ctx: &RequestContext,
    image_id: &str,
    tenant: &str,
) -> Result<AccessRecord, AppError> {
    shared_image(registry, ctx, image_id).await?;

    Ok(registry.image_member_find(image_id, tenant).await?)
}

/// Grants `grant.member` access to an image.
///
/// The caller must be able to see the image and be allowed to share it.
pub async fn create_access(
    registry: &dyn Registry,
    ctx: &RequestContext,
    image_id: &str,
    grant: AccessGrant,
) -> Result<AccessRecord, AppError> {
    let image = shared_image(registry, ctx, image_id).await?;
    ensure_sharable(registry, ctx, &image).await?;

    let record = registry
        .image_member_create(NewAccessRecord {
            image_id: image.id,
            member: grant.member,
            can_share: grant.can_share,
        })
        .await?;

    tracing::info!(
        image_id = %record.image_id,
        member = %record.member,
        can_share = record.can_share,
        "image shared"
    );

    Ok(record)
}

/// Revokes the grant of `tenant`. Callers allowed to share may revoke any
/// grant; a member may always drop its own.
pub async fn delete_access(
    registry: &dyn Registry,
    ctx: &RequestContext,
    image_id: &str,
    tenant: &str,
) -> Result<(), AppError> {
    let image = shared_image(registry, ctx, image_id).await?;
    let record = registry.image_member_find(image_id, tenant).await?;
    if ctx.tenant.as_deref() != Some(tenant) {
        ensure_sharable(registry, ctx, &image).await?;
    }

    registry.image_member_delete(&record).await?;

    tracing::info!(image_id, member = tenant, "image access revoked");

    Ok(())
}

pub async fn list_tags(
    registry: &dyn Registry,
    ctx: &RequestContext,
    image_id: &str,
) -> Result<Vec<Tag>, AppError> {
    registry.image_get(ctx, image_id).await?;

    Ok(registry.image_tag_get_all(image_id).await?)
}

fn validate_tag(value: &str) -> Result<(), AppError> {
    if value.is_empty() {
        return Err(AppError::BadRequest("Tag must not be empty".to_string()));
    }
    if value.chars().count() > MAX_TAG_LENGTH {
        return Err(AppError::BadRequest(format!(
            "Tag must be at most {MAX_TAG_LENGTH} characters"
        )));
    }
    Ok(())
}

async fn mutable_image(
    registry: &dyn Registry,
    ctx: &RequestContext,
    image_id: &str,
) -> Result<Image, AppError> {
    let image = registry.image_get(ctx, image_id).await?;

    if !policy::is_image_mutable(ctx, &image) {
        return Err(AppError::Forbidden(format!(
            "Image {image_id} may only be changed by its owner"
        )));
    }

    Ok(image)
}

/// Attaches a tag. Anyone who can see the image may tag it, and adding a
/// tag twice is not an error.
pub async fn add_tag(
    registry: &dyn Registry,
    ctx: &RequestContext,
    image_id: &str,
    value: &str,
) -> Result<(), AppError> {
    validate_tag(value)?;
    registry.image_get(ctx, image_id).await?;

    registry.image_tag_create(image_id, value).await?;

    Ok(())
}

pub async fn delete_tag(
    registry: &dyn Registry,
    ctx: &RequestContext,
    image_id: &str,
    value: &str,
) -> Result<(), AppError> {
    registry.image_get(ctx, image_id).await?;

    Ok(registry.image_tag_delete(image_id, value).await?)
}

/// Stored image data and its length in bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageData {
    pub bytes: Vec<u8>,
    pub size: u64,
}

/// Stores the data of an image and activates it.
///
/// `size` is the length announced by the client; the actual body length is
/// used when it is absent. Data is write-once.
pub async fn upload_image_data(
    registry: &dyn Registry,
    storage: &Storage,
    ctx: &RequestContext,
    image_id: &str,
    bytes: &[u8],
    size: Option<u64>,
) -> Result<Image, AppError> {
    let image = mutable_image(registry, ctx, image_id).await?;

    if image.checksum.is_some() {
        return Err(AppError::Conflict(format!(
            "Image {image_id} already has data"
        )));
    }

    let stored = storage.create_file(&image.id, bytes).await?;

    let update = ImageUpdate {
        status: Some(ImageStatus::Active),
        size: Some(size.unwrap_or(stored.size)),
        checksum: Some(stored.checksum),
        ..Default::default()
    };

    match registry.image_update(ctx, image_id, update).await {
        Ok(image) => {
            tracing::info!(image_id, size = ?image.size, "image data uploaded");
            Ok(image)
        }
        Err(e) => {
            if let Err(cleanup) = storage.ensure_deleted(&image.id).await {
                tracing::warn!(
                    image_id,
                    error = %cleanup,
                    "failed to remove orphaned image data"
                );
            }
            Err(e.into())
        }
    }
}

pub async fn download_image_data(
    registry: &dyn Registry,
    storage: &Storage,
    ctx: &RequestContext,
    image_id: &str,
) -> Result<ImageData, AppError> {
    let image = registry.image_get(ctx, image_id).await?;

    let bytes = storage.read_file(&image.id).await?;
    let size = bytes.len() as u64;

    Ok(ImageData { bytes, size })
}

/// Error types within the application, encapsulating store, storage and request errors.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("storage error: {0}")]
    Storage(StorageError),

    #[error("schema error: {0}")]
    Schema(SchemaError),
}

impl From<StoreError> for AppError {
    fn from(value: StoreError) -> Self {
        match value {
            e @ StoreError::NotFound { .. } => AppError::NotFound(e.to_string()),
            StoreError::Forbidden(msg) => AppError::Forbidden(msg),
            StoreError::Conflict(msg) => AppError::Conflict(msg),
            StoreError::Database(e) => AppError::Database(e),
        }
    }
}

impl From<StorageError> for AppError {
    fn from(value: StorageError) -> Self {
        match value {
            e @ StorageError::DataExists { .. } => AppError::Conflict(e.to_string()),
            e @ StorageError::FileNotFound { .. } => AppError::NotFound(e.to_string()),
            e @ StorageError::InvalidId { .. } => AppError::BadRequest(e.to_string()),
            e => AppError::Storage(e),
        }
    }
}

impl From<SchemaError> for AppError {
    fn from(value: SchemaError) -> Self {
        match value {
            SchemaError::Invalid(errors) => AppError::Validation(errors),
            e => AppError::Schema(e),
        }
    }
}

impl From<FieldError> for AppError {
    fn from(value: FieldError) -> Self {
        AppError::Validation(vec![value.to_string()])
    }
}

impl From<ParseErrorDetail> for AppError {
    fn from(value: ParseErrorDetail) -> Self {
        AppError::BadRequest(format!("Invalid tags filter: {value}"))
    }
}

#[cfg(test)]
mod tests {
    use super::{
        AppError, add_tag, create_access, create_image, delete_access, delete_image, delete_tag,
        download_image_data, list_access, list_images, list_tags, show_access, show_image,
        update_image, upload_image_data,
    };
    use crate::{
        context::RequestContext,
        memory::MemoryRegistry,
        model::{
            AccessGrant, AccessRecord, Image, ImageFields, ImageStatus, ImageUpdate,
            NewAccessRecord, NewImage, Tag, Visibility, now,
        },
        query::{ImageQuery, ImageQueryExpr},
        registry::{Registry, StoreError},
        storage::Storage,
    };
    use async_trait::async_trait;
    use serde_json::json;
    use std::path::PathBuf;
    use tempfile::TempDir;

    /// Wraps a [`MemoryRegistry`] and misbehaves on demand.
    #[derive(Default)]
    struct FaultyRegistry {
        inner: MemoryRegistry,
        /// Return a soft-deleted image with every listing.
        leak_deleted: bool,
        /// Fail every update, after replacing this path with a directory.
        fail_update: Option<PathBuf>,
    }

    #[async_trait]
    impl Registry for FaultyRegistry {
        async fn image_create(&self, image: NewImage) -> Result<Image, StoreError> {
            self.inner.image_create(image).await
        }

        async fn image_get(&self, ctx: &RequestContext, id: &str) -> Result<Image, StoreError> {
            self.inner.image_get(ctx, id).await
        }

        async fn image_get_all(
            &self,
            ctx: &RequestContext,
            query: &ImageQuery,
        ) -> Result<Vec<Image>, StoreError> {
            let mut images = self.inner.image_get_all(ctx, query).await?;
            if self.leak_deleted {
                images.push(Image {
                    id: "deleted".to_string(),
                    name: Some("gone".to_string()),
                    owner: ctx.tenant.clone(),
                    status: ImageStatus::Deleted,
                    visibility: Visibility::Private,
                    size: None,
                    checksum: None,
                    created_at: now(),
                    updated_at: now(),
                    deleted: true,
                    deleted_at: Some(now()),
                    properties: Default::default(),
                });
            }
            Ok(images)
        }

        async fn image_update(
            &self,
            ctx: &RequestContext,
            id: &str,
            update: ImageUpdate,
        ) -> Result<Image, StoreError> {
            if let Some(path) = &self.fail_update {
                std::fs::remove_file(path).unwrap();
                std::fs::create_dir(path).unwrap();
                return Err(StoreError::Conflict(format!("image {id} changed meanwhile")));
            }
            self.inner.image_update(ctx, id, update).await
        }

        async fn image_destroy(&self, ctx: &RequestContext, id: &str) -> Result<(), StoreError> {
            self.inner.image_destroy(ctx, id).await
        }

        async fn image_member_find(
            &self,
            image_id: &str,
            member: &str,
        ) -> Result<AccessRecord, StoreError> {
            self.inner.image_member_find(image_id, member).await
        }

        async fn image_member_get_all(
            &self,
            image_id: &str,
        ) -> Result<Vec<AccessRecord>, StoreError> {
            self.inner.image_member_get_all(image_id).await
        }

        async fn image_member_create(
            &self,
            record: NewAccessRecord,
        ) -> Result<AccessRecord, StoreError> {
            self.inner.image_member_create(record).await
        }

        async fn image_member_delete(&self, record: &AccessRecord) -> Result<(), StoreError> {
            self.inner.image_member_delete(record).await
        }

        async fn image_tag_get_all(&self, image_id: &str) -> Result<Vec<Tag>, StoreError> {
            self.inner.image_tag_get_all(image_id).await
        }

        async fn image_tag_create(&self, image_id: &str, value: &str) -> Result<Tag, StoreError> {
            self.inner.image_tag_create(image_id, value).await
        }

        async fn image_tag_delete(&self, image_id: &str, value: &str) -> Result<(), StoreError> {
            self.inner.image_tag_delete(image_id, value).await
        }
    }

    fn owner() -> RequestContext {
        RequestContext::new("tenant1")
    }

    fn fields(value: serde_json::Value) -> ImageFields {
        ImageFields::from_json(value.as_object().cloned().unwrap()).unwrap()
    }

    async fn private_image(registry: &MemoryRegistry) -> String {
        create_image(registry, &owner(), fields(json!({"name": "cirros"})))
            .await
            .unwrap()
            .id
    }

    fn grant(member: &str, can_share: bool) -> AccessGrant {
        AccessGrant {
            member: member.to_string(),
            can_share,
        }
    }

    #[tokio::test]
    async fn test_create_image_defaults_owner_and_status() {
        let registry = MemoryRegistry::new();

        let image = create_image(
            &registry,
            &owner(),
            fields(json!({"name": "cirros", "status": "active"})),
        )
        .await
        .unwrap();

        assert_eq!(Some("tenant1".to_string()), image.owner);
        assert_eq!(ImageStatus::Queued, image.status);
        assert_eq!(Visibility::Private, image.visibility);
    }

    #[tokio::test]
    async fn test_create_image_with_foreign_owner() {
        let registry = MemoryRegistry::new();

        let result = create_image(&registry, &owner(), fields(json!({"owner": "tenant2"}))).await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));

        let image = create_image(
            &registry,
            &RequestContext::admin(),
            fields(json!({"owner": "tenant2"})),
        )
        .await
        .unwrap();
        assert_eq!(Some("tenant2".to_string()), image.owner);
    }

    #[tokio::test]
    async fn test_image_lifecycle() {
        let registry = MemoryRegistry::new();
        let id = private_image(&registry).await;

        let updated = update_image(
            &registry,
            &owner(),
            &id,
            fields(json!({"name": "fedora", "status": "active", "os_distro": "fedora"})),
        )
        .await
        .unwrap();
        assert_eq!(Some("fedora".to_string()), updated.name);
        assert_eq!(ImageStatus::Queued, updated.status);
        assert_eq!(json!("fedora"), updated.properties["os_distro"]);

        assert!(matches!(
            update_image(&registry, &owner(), &id, fields(json!({"owner": "tenant2"}))).await,
            Err(AppError::Forbidden(_))
        ));

        delete_image(&registry, &owner(), &id).await.unwrap();

        assert!(matches!(
            show_image(&registry, &owner(), &id).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            delete_image(&registry, &owner(), &id).await,
            Err(AppError::NotFound(_))
        ));
        assert!(
            list_images(&registry, &owner(), ImageQuery::default())
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_list_images_drops_deleted_rows() {
        let registry = FaultyRegistry {
            leak_deleted: true,
            ..Default::default()
        };
        let live = create_image(&registry, &owner(), fields(json!({"name": "cirros"})))
            .await
            .unwrap();

        let images = list_images(&registry, &owner(), ImageQuery::default())
            .await
            .unwrap();

        assert_eq!(vec![live.id], images.into_iter().map(|i| i.id).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_list_images_by_tag() {
        let registry = MemoryRegistry::new();
        let tagged = private_image(&registry).await;
        private_image(&registry).await;
        add_tag(&registry, &owner(), &tagged, "ping").await.unwrap();

        let images = list_images(
            &registry,
            &owner(),
            ImageQuery::default().with_expr(ImageQueryExpr::tag("ping")),
        )
        .await
        .unwrap();

        assert_eq!(vec![tagged], images.into_iter().map(|i| i.id).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_hidden_and_missing_images_look_the_same() {
        let registry = MemoryRegistry::new();
        let id = private_image(&registry).await;
        let stranger = RequestContext::new("tenant2");

        let hidden = create_access(&registry, &stranger, &id, grant("tenant3", false)).await;
        let missing =
            create_access(&registry, &stranger, "missing", grant("tenant3", false)).await;

        assert!(matches!(hidden, Err(AppError::NotFound(_))));
        assert!(matches!(missing, Err(AppError::NotFound(_))));
        assert!(matches!(
            list_access(&registry, &stranger, &id).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_share_requires_permission() {
        let registry = MemoryRegistry::new();
        let id = private_image(&registry).await;

        create_access(&registry, &owner(), &id, grant("tenant2", false))
            .await
            .unwrap();

        // tenant2 sees the image now but may not pass it on.
        let member = RequestContext::new("tenant2");
        let Err(AppError::Forbidden(msg)) =
            create_access(&registry, &member, &id, grant("tenant3", false)).await
        else {
            panic!("expected Forbidden");
        };
        assert_eq!("No permission to share that image", msg);

        create_access(&registry, &owner(), &id, grant("tenant4", true))
            .await
            .unwrap();
        let resharer = RequestContext::new("tenant4");
        let record = create_access(&registry, &resharer, &id, grant("tenant3", false))
            .await
            .unwrap();
        assert_eq!("tenant3", record.member);
        assert_eq!(id, record.image_id);
    }

    #[tokio::test]
    async fn test_access_lifecycle() {
        let registry = MemoryRegistry::new();
        let id = private_image(&registry).await;

        create_access(&registry, &owner(), &id, grant("tenant2", true))
            .await
            .unwrap();
        assert!(matches!(
            create_access(&registry, &owner(), &id, grant("tenant2", false)).await,
            Err(AppError::Conflict(_))
        ));

        let record = show_access(&registry, &owner(), &id, "tenant2")
            .await
            .unwrap();
        assert!(record.can_share);

        delete_access(&registry, &owner(), &id, "tenant2")
            .await
            .unwrap();

        assert!(
            list_access(&registry, &owner(), &id)
                .await
                .unwrap()
                .is_empty()
        );
        assert!(matches!(
            show_access(&registry, &owner(), &id, "tenant2").await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            delete_access(&registry, &owner(), &id, "tenant2").await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            show_image(&registry, &RequestContext::new("tenant2"), &id).await,
            Err(AppError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_member_may_leave_but_not_evict() {
        let registry = MemoryRegistry::new();
        let id = private_image(&registry).await;
        create_access(&registry, &owner(), &id, grant("tenant2", false))
            .await
            .unwrap();
        create_access(&registry, &owner(), &id, grant("tenant3", false))
            .await
            .unwrap();
        let member = RequestContext::new("tenant2");

        assert!(matches!(
            delete_access(&registry, &member, &id, "tenant3").await,
            Err(AppError::Forbidden(_))
        ));

        delete_access(&registry, &member, &id, "tenant2")
            .await
            .unwrap();

        let members: Vec<_> = list_access(&registry, &owner(), &id)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.member)
            .collect();
        assert_eq!(vec!["tenant3".to_string()], members);
    }

    #[tokio::test]
    async fn test_tags() {
        let registry = MemoryRegistry::new();
        let id = private_image(&registry).await;

        add_tag(&registry, &owner(), &id, "ping").await.unwrap();
        add_tag(&registry, &owner(), &id, "ping").await.unwrap();
        add_tag(&registry, &owner(), &id, "pong").await.unwrap();

        delete_tag(&registry, &owner(), &id, "ping").await.unwrap();
        assert!(matches!(
            delete_tag(&registry, &owner(), &id, "ping").await,
            Err(AppError::NotFound(_))
        ));

        let tags = list_tags(&registry, &owner(), &id).await.unwrap();
        assert_eq!(vec!["pong"], tags.iter().map(|t| t.value.as_str()).collect::<Vec<_>>());

        assert!(matches!(
            add_tag(&registry, &owner(), &id, "").await,
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            add_tag(&registry, &owner(), &id, &"x".repeat(256)).await,
            Err(AppError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_tags_follow_visibility() {
        let registry = MemoryRegistry::new();
        let id = private_image(&registry).await;
        let member = RequestContext::new("tenant2");

        assert!(matches!(
            add_tag(&registry, &member, &id, "ping").await,
            Err(AppError::Forbidden(_))
        ));

        create_access(&registry, &owner(), &id, grant("tenant2", false))
            .await
            .unwrap();

        add_tag(&registry, &member, &id, "ping").await.unwrap();
        add_tag(&registry, &member, &id, "pong").await.unwrap();
        delete_tag(&registry, &member, &id, "pong").await.unwrap();

        let tags = list_tags(&registry, &owner(), &id).await.unwrap();
        assert_eq!(vec!["ping"], tags.iter().map(|t| t.value.as_str()).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_upload_keeps_registry_error_when_cleanup_fails() {
        let tmp_dir = TempDir::new().unwrap();
        let storage = Storage::new(tmp_dir.path().to_path_buf());
        let mut registry = FaultyRegistry::default();
        let id = create_image(&registry, &owner(), fields(json!({"id": "abcdef"})))
            .await
            .unwrap()
            .id;
        let stored_path = tmp_dir.path().join("ab/cd").join(&id);
        registry.fail_update = Some(stored_path.clone());

        let result = upload_image_data(&registry, &storage, &owner(), &id, b"YYYY", None).await;

        assert!(matches!(result, Err(AppError::Conflict(_))));
        assert!(stored_path.is_dir());
    }

    #[tokio::test]
    async fn test_upload_download() {
        let tmp_dir = TempDir::new().unwrap();
        let storage = Storage::new(tmp_dir.path().to_path_buf());
        let registry = MemoryRegistry::new();
        let id = private_image(&registry).await;

        assert!(matches!(
            download_image_data(&registry, &storage, &owner(), &id).await,
            Err(AppError::NotFound(_))
        ));

        let image = upload_image_data(&registry, &storage, &owner(), &id, b"YYYY", None)
            .await
            .unwrap();
        assert_eq!(ImageStatus::Active, image.status);
        assert_eq!(Some(4), image.size);
        assert!(image.checksum.is_some());

        let data = download_image_data(&registry, &storage, &owner(), &id)
            .await
            .unwrap();
        assert_eq!(b"YYYY".to_vec(), data.bytes);
        assert_eq!(4, data.size);

        assert!(matches!(
            upload_image_data(&registry, &storage, &owner(), &id, b"ZZZ", Some(3)).await,
            Err(AppError::Conflict(_))
        ));
        assert!(matches!(
            upload_image_data(&registry, &storage, &owner(), "missing", b"ZZZ", Some(3)).await,
            Err(AppError::NotFound(_))
        ));
    }
}

use crate::{
    context::RequestContext,
    dialect::{CurrentDialect, CurrentRow, Db, Dialect},
    model::{
        AccessRecord, Image, ImageUpdate, NewAccessRecord, NewImage, Tag, Visibility, now,
        timestamp,
    },
    policy,
    query::{ImageQuery, Scope},
    registry::{Registry, StoreError},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
pub use sqlx::Pool;
use sqlx::{
    FromRow, Row,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

pub async fn run_migration(pool: &sqlx::Pool<Db>) -> Result<(), sqlx::Error> {
    CurrentDialect::migration(pool).await
}

fn decode_error<E>(e: E) -> sqlx::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    sqlx::Error::Decode(Box::new(e))
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, sqlx::Error> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(decode_error)
}

impl FromRow<'_, CurrentRow> for Image {
    fn from_row(row: &CurrentRow) -> Result<Self, sqlx::Error> {
        let status: String = row.try_get("status")?;
        let is_public: bool = row.try_get("is_public")?;
        let size: Option<i64> = row.try_get("size")?;
        let properties: String = row.try_get("properties")?;
        let created_at: String = row.try_get("created_at")?;
        let updated_at: String = row.try_get("updated_at")?;
        let deleted_at: Option<String> = row.try_get("deleted_at")?;

        Ok(Image {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            owner: row.try_get("owner")?,
            status: status.parse().map_err(decode_error)?,
            visibility: Visibility::from_public(is_public),
            size: size.map(|s| s as u64),
            checksum: row.try_get("checksum")?,
            created_at: parse_timestamp(&created_at)?,
            updated_at: parse_timestamp(&updated_at)?,
            deleted: row.try_get("deleted")?,
            deleted_at: deleted_at.as_deref().map(parse_timestamp).transpose()?,
            properties: serde_json::from_str(&properties).map_err(decode_error)?,
        })
    }
}

impl FromRow<'_, CurrentRow> for AccessRecord {
    fn from_row(row: &CurrentRow) -> Result<Self, sqlx::Error> {
        let created_at: String = row.try_get("created_at")?;
        let updated_at: String = row.try_get("updated_at")?;

        Ok(AccessRecord {
            image_id: row.try_get("image_id")?,
            member: row.try_get("member")?,
            can_share: row.try_get("can_share")?,
            deleted: row.try_get("deleted")?,
            created_at: parse_timestamp(&created_at)?,
            updated_at: parse_timestamp(&updated_at)?,
        })
    }
}

/// The SQLite-backed [`Registry`].
///
/// This struct wraps an SQLx connection pool. Statement text comes from the
/// `Dialect`; this type binds parameters, maps rows and translates failures
/// into [`StoreError`]s. Transient failures (I/O, protocol, pool timeouts) are
/// retried a bounded number of times.
#[derive(Debug, Clone)]
pub struct Database {
    pool: Pool<Db>,
}

impl Database {
    pub async fn with_migration(pool: sqlx::Pool<Db>) -> Result<Self, sqlx::Error> {
        run_migration(&pool).await?;

        Ok(Self { pool })
    }

    /// Opens (creating if missing) the database at `url` and migrates it.
    ///
    /// In-memory databases live as long as their connection, so they get a
    /// single connection that is never recycled.
    pub async fn connect(url: &str) -> Result<Self, sqlx::Error> {
        let opts = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = if url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(opts)
                .await?
        } else {
            SqlitePoolOptions::new().connect_with(opts).await?
        };

        Self::with_migration(pool).await
    }

    async fn retry<F, Fut, T>(&self, mut op: F) -> Result<T, DatabaseError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, DatabaseError>>,
    {
        let max_retries = 3;
        for attempt in 0..max_retries {
            let result = op().await;
            match result {
                Ok(v) => return Ok(v),
                Err(ref e) if e.is_retryable() && attempt + 1 < max_retries => {
                    tracing::warn!(attempt, error = %e, "retrying database operation");
                    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                    continue;
                }
                Err(e) => return Err(e),
            }
        }

        unreachable!("Retry loop should return before exceeding max_retries")
    }

    /// Loads an image row by id, deleted or not.
    async fn fetch_image(&self, id: &str) -> Result<Option<Image>, DatabaseError> {
        let stmt = CurrentDialect::query_image_by_id_statement();
        let stmt = stmt.as_str();
        let pool = &self.pool;

        self.retry(|| async move {
            sqlx::query_as::<_, Image>(stmt)
                .bind(id)
                .fetch_optional(pool)
                .await
                .map_err(|e| DatabaseError::QueryFailed {
                    operation: DbOperation::QueryImage { id: id.to_string() },
                    sql: stmt.to_string(),
                    source: e,
                })
        })
        .await
    }

    /// Loads the live access record of `member`, if any.
    async fn fetch_member(
        &self,
        image_id: &str,
        member: &str,
    ) -> Result<Option<AccessRecord>, DatabaseError> {
        let stmt = CurrentDialect::query_member_statement();
        let stmt = stmt.as_str();
        let pool = &self.pool;

        self.retry(|| async move {
            sqlx::query_as::<_, AccessRecord>(stmt)
                .bind(image_id)
                .bind(member)
                .fetch_optional(pool)
                .await
                .map_err(|e| DatabaseError::QueryFailed {
                    operation: DbOperation::QueryMember {
                        image_id: image_id.to_string(),
                        member: member.to_string(),
                    },
                    sql: stmt.to_string(),
                    source: e,
                })
        })
        .await
    }

    /// Loads a live image and checks that `ctx` may see it.
    async fn visible_image(&self, ctx: &RequestContext, id: &str) -> Result<Image, StoreError> {
        let image = match self.fetch_image(id).await? {
            Some(image) if !image.deleted => image,
            _ => return Err(StoreError::image_not_found(id)),
        };

        if policy::is_image_visible(ctx, &image, None) {
            return Ok(image);
        }

        let membership = match &ctx.tenant {
            Some(tenant) => self.fetch_member(id, tenant).await?,
            None => None,
        };

        if policy::is_image_visible(ctx, &image, membership.as_ref()) {
            Ok(image)
        } else {
            Err(StoreError::Forbidden(format!("image {id} is not visible")))
        }
    }

    /// Loads a visible image and checks that `ctx` may change it.
    async fn mutable_image(&self, ctx: &RequestContext, id: &str) -> Result<Image, StoreError> {
        let image = self.visible_image(ctx, id).await?;

        if !policy::is_image_mutable(ctx, &image) {
            return Err(StoreError::Forbidden(format!(
                "image {id} may only be changed by its owner"
            )));
        }

        Ok(image)
    }

    async fn write_image(&self, image: &Image) -> Result<(), DatabaseError> {
        let stmt = CurrentDialect::update_image_statement();
        let stmt = stmt.as_str();
        let properties = serde_json::to_string(&image.properties)?;
        let properties = properties.as_str();
        let updated_at = timestamp(&image.updated_at);
        let updated_at = updated_at.as_str();
        let pool = &self.pool;

        self.retry(|| async move {
            sqlx::query(stmt)
                .bind(image.name.as_deref())
                .bind(image.owner.as_deref())
                .bind(image.status.as_str())
                .bind(image.visibility.is_public())
                .bind(image.size.map(|s| s as i64))
                .bind(image.checksum.as_deref())
                .bind(properties)
                .bind(updated_at)
                .bind(image.id.as_str())
                .execute(pool)
                .await
                .map_err(|e| DatabaseError::QueryFailed {
                    operation: DbOperation::UpdateImage {
                        id: image.id.clone(),
                    },
                    sql: stmt.to_string(),
                    source: e,
                })
        })
        .await?;

        Ok(())
    }
}

#[async_trait]
impl Registry for Database {
    async fn image_create(&self, new: NewImage) -> Result<Image, StoreError> {
        let created_at = now();
        let image = Image {
            id: new.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
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

        let stmt = CurrentDialect::insert_image_statement();
        let stmt = stmt.as_str();
        let properties = serde_json::to_string(&image.properties).map_err(DatabaseError::from)?;
        let properties = properties.as_str();
        let created_at = timestamp(&image.created_at);
        let created_at = created_at.as_str();
        let image_ref = &image;
        let pool = &self.pool;

        self.retry(|| async move {
            sqlx::query(stmt)
                .bind(image_ref.id.as_str())
                .bind(image_ref.name.as_deref())
                .bind(image_ref.owner.as_deref())
                .bind(image_ref.status.as_str())
                .bind(image_ref.visibility.is_public())
                .bind(None::<i64>)
                .bind(None::<String>)
                .bind(properties)
                .bind(created_at)
                .bind(created_at)
                .execute(pool)
                .await
                .map_err(|e| DatabaseError::QueryFailed {
                    operation: DbOperation::InsertImage {
                        id: image_ref.id.clone(),
                    },
                    sql: stmt.to_string(),
                    source: e,
                })
        })
        .await
        .map_err(|e| {
            if e.is_unique_violation() {
                StoreError::Conflict(format!("image {} already exists", image.id))
            } else {
                e.into()
            }
        })?;

        Ok(image)
    }

    async fn image_get(&self, ctx: &RequestContext, id: &str) -> Result<Image, StoreError> {
        self.visible_image(ctx, id).await
    }

    async fn image_get_all(
        &self,
        ctx: &RequestContext,
        query: &ImageQuery,
    ) -> Result<Vec<Image>, StoreError> {
        let query = query.clone().with_scope(Scope::for_context(ctx));
        let (sql, params) = query.to_sql();
        let stmt = CurrentDialect::query_images_statement(sql);
        let stmt = stmt.as_str();
        let params = &params;
        let pool = &self.pool;

        let images = self
            .retry(|| async move {
                let mut q = sqlx::query_as::<_, Image>(stmt);

                for param in params {
                    q = q.bind(param.as_str());
                }

                q.fetch_all(pool)
                    .await
                    .map_err(|e| DatabaseError::QueryFailed {
                        operation: DbOperation::QueryImages,
                        sql: stmt.to_string(),
                        source: e,
                    })
            })
            .await?;

        Ok(images)
    }

    async fn image_update(
        &self,
        ctx: &RequestContext,
        id: &str,
        update: ImageUpdate,
    ) -> Result<Image, StoreError> {
        let mut image = self.mutable_image(ctx, id).await?;

        update.apply(&mut image, now());
        self.write_image(&image).await?;

        Ok(image)
    }

    async fn image_destroy(&self, ctx: &RequestContext, id: &str) -> Result<(), StoreError> {
        self.mutable_image(ctx, id).await?;

        let stmt = CurrentDialect::soft_delete_image_statement();
        let stmt = stmt.as_str();
        let deleted_at = timestamp(&now());
        let deleted_at = deleted_at.as_str();
        let pool = &self.pool;

        self.retry(|| async move {
            sqlx::query(stmt)
                .bind(deleted_at)
                .bind(deleted_at)
                .bind(id)
                .execute(pool)
                .await
                .map_err(|e| DatabaseError::QueryFailed {
                    operation: DbOperation::DeleteImage { id: id.to_string() },
                    sql: stmt.to_string(),
                    source: e,
                })
        })
        .await?;

        Ok(())
    }

    async fn image_member_find(
        &self,
        image_id: &str,
        member: &str,
    ) -> Result<AccessRecord, StoreError> {
        self.fetch_member(image_id, member)
            .await?
            .ok_or_else(|| StoreError::member_not_found(image_id, member))
    }

    async fn image_member_get_all(&self, image_id: &str) -> Result<Vec<AccessRecord>, StoreError> {
        let stmt = CurrentDialect::query_members_statement();
        let stmt = stmt.as_str();
        let pool = &self.pool;

        let records = self
            .retry(|| async move {
                sqlx::query_as::<_, AccessRecord>(stmt)
                    .bind(image_id)
                    .fetch_all(pool)
                    .await
                    .map_err(|e| DatabaseError::QueryFailed {
                        operation: DbOperation::QueryMembers {
                            image_id: image_id.to_string(),
                        },
                        sql: stmt.to_string(),
                        source: e,
                    })
            })
            .await?;

        Ok(records)
    }

    async fn image_member_create(
        &self,
        record: NewAccessRecord,
    ) -> Result<AccessRecord, StoreError> {
        let stmt = CurrentDialect::insert_member_statement();
        let stmt = stmt.as_str();
        let created_at = now();
        let stamp = timestamp(&created_at);
        let stamp = stamp.as_str();
        let record_ref = &record;
        let pool = &self.pool;

        self.retry(|| async move {
            sqlx::query(stmt)
                .bind(record_ref.image_id.as_str())
                .bind(record_ref.member.as_str())
                .bind(record_ref.can_share)
                .bind(stamp)
                .bind(stamp)
                .execute(pool)
                .await
                .map_err(|e| DatabaseError::QueryFailed {
                    operation: DbOperation::InsertMember {
                        image_id: record_ref.image_id.clone(),
                        member: record_ref.member.clone(),
                    },
                    sql: stmt.to_string(),
                    source: e,
                })
        })
        .await
        .map_err(|e| {
            if e.is_unique_violation() {
                StoreError::Conflict(format!(
                    "image {} is already shared with {}",
                    record.image_id, record.member
                ))
            } else {
                e.into()
            }
        })?;

        Ok(AccessRecord {
            image_id: record.image_id,
            member: record.member,
            can_share: record.can_share,
            deleted: false,
            created_at,
            updated_at: created_at,
        })
    }

    async fn image_member_delete(&self, record: &AccessRecord) -> Result<(), StoreError> {
        let stmt = CurrentDialect::soft_delete_member_statement();
        let stmt = stmt.as_str();
        let deleted_at = timestamp(&now());
        let deleted_at = deleted_at.as_str();
        let pool = &self.pool;

        let result = self
            .retry(|| async move {
                sqlx::query(stmt)
                    .bind(deleted_at)
                    .bind(deleted_at)
                    .bind(record.image_id.as_str())
                    .bind(record.member.as_str())
                    .execute(pool)
                    .await
                    .map_err(|e| DatabaseError::QueryFailed {
                        operation: DbOperation::DeleteMember {
                            image_id: record.image_id.clone(),
                            member: record.member.clone(),
                        },
                        sql: stmt.to_string(),
                        source: e,
                    })
            })
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::member_not_found(&record.image_id, &record.member));
        }

        Ok(())
    }

    async fn image_tag_get_all(&self, image_id: &str) -> Result<Vec<Tag>, StoreError> {
        let stmt = CurrentDialect::query_tags_by_image_statement();
        let stmt = stmt.as_str();
        let pool = &self.pool;

        let values: Vec<String> = self
            .retry(|| async move {
                sqlx::query_scalar::<_, String>(stmt)
                    .bind(image_id)
                    .fetch_all(pool)
                    .await
                    .map_err(|e| DatabaseError::QueryFailed {
                        operation: DbOperation::QueryTags {
                            image_id: image_id.to_string(),
                        },
                        sql: stmt.to_string(),
                        source: e,
                    })
            })
            .await?;

        Ok(values
            .into_iter()
            .map(|value| Tag {
                image_id: image_id.to_string(),
                value,
            })
            .collect())
    }

    async fn image_tag_create(&self, image_id: &str, value: &str) -> Result<Tag, StoreError> {
        let stmt = CurrentDialect::ensure_image_tag_statement();
        let stmt = stmt.as_str();
        let pool = &self.pool;

        self.retry(|| async move {
            sqlx::query(stmt)
                .bind(image_id)
                .bind(value)
                .execute(pool)
                .await
                .map_err(|e| DatabaseError::QueryFailed {
                    operation: DbOperation::InsertTag {
                        image_id: image_id.to_string(),
                        value: value.to_string(),
                    },
                    sql: stmt.to_string(),
                    source: e,
                })
        })
        .await?;

        Ok(Tag {
            image_id: image_id.to_string(),
            value: value.to_string(),
        })
    }

    async fn image_tag_delete(&self, image_id: &str, value: &str) -> Result<(), StoreError> {
        let stmt = CurrentDialect::delete_image_tag_statement();
        let stmt = stmt.as_str();
        let pool = &self.pool;

        let result = self
            .retry(|| async move {
                sqlx::query(stmt)
                    .bind(image_id)
                    .bind(value)
                    .execute(pool)
                    .await
                    .map_err(|e| DatabaseError::QueryFailed {
                        operation: DbOperation::DeleteTag {
                            image_id: image_id.to_string(),
                            value: value.to_string(),
                        },
                        sql: stmt.to_string(),
                        source: e,
                    })
            })
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::tag_not_found(image_id, value));
        }

        Ok(())
    }
}

/// Represents errors that can occur during database operations.
///
/// Each variant includes contextual information to assist with debugging and error handling.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// A general SQL query failure, with full context including operation and SQL.
    #[error("Query failed during {operation:?}: sql={sql}")]
    QueryFailed {
        operation: DbOperation,
        sql: String,
        #[source]
        source: sqlx::Error,
    },

    /// Image properties could not be serialized for storage.
    #[error("Failed to encode image properties")]
    Encode(#[from] serde_json::Error),
}

/// Enum representing the kind of database operation being performed,
/// used for attaching context to [`DatabaseError::QueryFailed`].
#[derive(Debug)]
pub enum DbOperation {
    /// INSERT INTO images
    InsertImage { id: String },
    /// SELECT … FROM images WHERE id = …
    QueryImage { id: String },
    /// Image listing using dynamic conditions
    QueryImages,
    /// UPDATE images SET …
    UpdateImage { id: String },
    /// UPDATE images SET deleted = 1 …
    DeleteImage { id: String },
    /// SELECT … FROM image_members WHERE image_id = … AND member = …
    QueryMember { image_id: String, member: String },
    /// SELECT … FROM image_members WHERE image_id = …
    QueryMembers { image_id: String },
    /// INSERT INTO image_members
    InsertMember { image_id: String, member: String },
    /// UPDATE image_members SET deleted = 1 …
    DeleteMember { image_id: String, member: String },
    /// SELECT value FROM image_tags WHERE image_id = …
    QueryTags { image_id: String },
    /// INSERT OR IGNORE INTO image_tags
    InsertTag { image_id: String, value: String },
    /// DELETE FROM image_tags WHERE …
    DeleteTag { image_id: String, value: String },
}

impl DatabaseError {
    fn is_retryable(&self) -> bool {
        let is_retryable_kind = |e: &sqlx::Error| {
            matches!(e, sqlx::Error::Io(_))
                || matches!(e, sqlx::Error::Protocol(_))
                || matches!(e, sqlx::Error::PoolTimedOut)
        };

        match self {
            DatabaseError::QueryFailed { source, .. } => is_retryable_kind(source),
            DatabaseError::Encode(_) => false,
        }
    }

    fn is_unique_violation(&self) -> bool {
        match self {
            DatabaseError::QueryFailed {
                source: sqlx::Error::Database(e),
                ..
            } => e.is_unique_violation(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        context::RequestContext,
        database::Database,
        model::{ImageStatus, ImageUpdate, NewAccessRecord, NewImage, Properties, Visibility},
        query::{ImageQuery, ImageQueryExpr},
        registry::{Registry, StoreError},
    };
    use serde_json::json;

    /// Returns a migrated, single-connection in-memory database.
    async fn get_db() -> Database {
        Database::connect("sqlite::memory:").await.unwrap()
    }

    fn new_image(owner: &str, visibility: Visibility) -> NewImage {
        NewImage {
            id: None,
            name: Some("cirros".to_string()),
            owner: Some(owner.to_string()),
            status: ImageStatus::Queued,
            visibility,
            properties: Properties::new(),
        }
    }

    /// Verifies that migrations can be applied repeatedly on the same pool.
    #[tokio::test]
    async fn test_migration_idempotency() {
        let db = get_db().await;

        Database::with_migration(db.pool.clone()).await.unwrap();
        Database::with_migration(db.pool.clone()).await.unwrap();

        let columns: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM pragma_table_info('image_members') WHERE name = 'deleted_at'",
        )
        .fetch_one(&db.pool)
        .await
        .unwrap();
        assert_eq!(1, columns);
    }

    #[tokio::test]
    async fn test_image_round_trip() {
        let db = get_db().await;
        let owner = RequestContext::new("tenant1");

        let mut new = new_image("tenant1", Visibility::Private);
        new.properties.insert("os_distro".to_string(), json!("cirros"));
        let created = db.image_create(new).await.unwrap();

        assert_eq!(created, db.image_get(&owner, &created.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_image_create_with_taken_id() {
        let db = get_db().await;

        let mut new = new_image("tenant1", Visibility::Private);
        new.id = Some("fixed".to_string());
        db.image_create(new.clone()).await.unwrap();

        assert!(matches!(
            db.image_create(new).await,
            Err(StoreError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_image_visibility() {
        let db = get_db().await;
        let image = db
            .image_create(new_image("tenant1", Visibility::Private))
            .await
            .unwrap();

        let stranger = RequestContext::new("tenant2");
        assert!(matches!(
            db.image_get(&stranger, &image.id).await,
            Err(StoreError::Forbidden(_))
        ));
        assert!(matches!(
            db.image_get(&stranger, "missing").await,
            Err(StoreError::NotFound { .. })
        ));

        db.image_member_create(NewAccessRecord {
            image_id: image.id.clone(),
            member: "tenant2".to_string(),
            can_share: false,
        })
        .await
        .unwrap();

        assert!(db.image_get(&stranger, &image.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_image_update_and_destroy() {
        let db = get_db().await;
        let owner = RequestContext::new("tenant1");
        let image = db
            .image_create(new_image("tenant1", Visibility::Public))
            .await
            .unwrap();

        let update = ImageUpdate {
            name: Some("fedora".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            db.image_update(&RequestContext::new("tenant2"), &image.id, update.clone())
                .await,
            Err(StoreError::Forbidden(_))
        ));

        let updated = db.image_update(&owner, &image.id, update).await.unwrap();
        assert_eq!(Some("fedora".to_string()), updated.name);

        db.image_destroy(&owner, &image.id).await.unwrap();
        assert!(matches!(
            db.image_get(&owner, &image.id).await,
            Err(StoreError::NotFound { .. })
        ));
        assert!(matches!(
            db.image_destroy(&owner, &image.id).await,
            Err(StoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_image_get_all_scopes_and_filters() {
        let db = get_db().await;
        let mine = db
            .image_create(new_image("tenant1", Visibility::Private))
            .await
            .unwrap();
        let public = db
            .image_create(new_image("tenant2", Visibility::Public))
            .await
            .unwrap();
        let hidden = db
            .image_create(new_image("tenant2", Visibility::Private))
            .await
            .unwrap();
        let gone = db
            .image_create(new_image("tenant1", Visibility::Private))
            .await
            .unwrap();

        let ctx = RequestContext::new("tenant1");
        db.image_destroy(&ctx, &gone.id).await.unwrap();
        db.image_tag_create(&public.id, "ping").await.unwrap();

        let ids = |images: Vec<crate::model::Image>| {
            images.into_iter().map(|i| i.id).collect::<Vec<_>>()
        };

        assert_eq!(
            vec![mine.id.clone(), public.id.clone()],
            ids(db.image_get_all(&ctx, &ImageQuery::live()).await.unwrap())
        );
        assert_eq!(
            vec![public.id.clone()],
            ids(db
                .image_get_all(
                    &ctx,
                    &ImageQuery::live().with_expr(ImageQueryExpr::tag("ping"))
                )
                .await
                .unwrap())
        );
        assert_eq!(
            vec![mine.id.clone(), public.id.clone(), hidden.id.clone()],
            ids(db
                .image_get_all(&RequestContext::admin(), &ImageQuery::live())
                .await
                .unwrap())
        );
        assert_eq!(
            vec![public.id.clone()],
            ids(db
                .image_get_all(&RequestContext::anonymous(), &ImageQuery::live())
                .await
                .unwrap())
        );
        assert_eq!(
            vec![public.id],
            ids(db
                .image_get_all(&ctx, &ImageQuery::live().with_offset(1).with_limit(5))
                .await
                .unwrap())
        );
    }

    #[tokio::test]
    async fn test_operate_members() {
        let db = get_db().await;
        let image = db
            .image_create(new_image("tenant1", Visibility::Private))
            .await
            .unwrap();
        let grant = NewAccessRecord {
            image_id: image.id.clone(),
            member: "tenant2".to_string(),
            can_share: true,
        };

        let record = db.image_member_create(grant.clone()).await.unwrap();
        assert!(record.can_share);
        assert!(matches!(
            db.image_member_create(grant.clone()).await,
            Err(StoreError::Conflict(_))
        ));
        assert_eq!(
            record,
            db.image_member_find(&image.id, "tenant2").await.unwrap()
        );

        db.image_member_delete(&record).await.unwrap();
        let deleted_at: Option<String> =
            sqlx::query_scalar("SELECT deleted_at FROM image_members WHERE deleted = 1")
                .fetch_one(&db.pool)
                .await
                .unwrap();
        assert!(deleted_at.is_some());
        assert!(matches!(
            db.image_member_find(&image.id, "tenant2").await,
            Err(StoreError::NotFound { .. })
        ));
        assert!(matches!(
            db.image_member_delete(&record).await,
            Err(StoreError::NotFound { .. })
        ));

        // A revoked grant stays on record and may be granted again.
        db.image_member_create(grant).await.unwrap();
        let all = db.image_member_get_all(&image.id).await.unwrap();
        assert_eq!(2, all.len());
        assert!(all[0].deleted);
        assert!(!all[1].deleted);
    }

    /// Full test of tag operations:
    /// - Add tags to an image, including duplicates
    /// - Remove a tag, then fail to remove it again
    /// - Verify final tag list is correct
    #[tokio::test]
    async fn test_operate_image_tag() {
        let db = get_db().await;
        let image = db
            .image_create(new_image("tenant1", Visibility::Private))
            .await
            .unwrap();

        db.image_tag_create(&image.id, "pong").await.unwrap();
        db.image_tag_create(&image.id, "ping").await.unwrap();
        db.image_tag_create(&image.id, "ping").await.unwrap();

        let values = |tags: Vec<crate::model::Tag>| {
            tags.into_iter().map(|t| t.value).collect::<Vec<_>>()
        };
        assert_eq!(
            vec!["ping".to_string(), "pong".to_string()],
            values(db.image_tag_get_all(&image.id).await.unwrap())
        );

        db.image_tag_delete(&image.id, "pong").await.unwrap();
        assert!(matches!(
            db.image_tag_delete(&image.id, "pong").await,
            Err(StoreError::NotFound { .. })
        ));
        assert_eq!(
            vec!["ping".to_string()],
            values(db.image_tag_get_all(&image.id).await.unwrap())
        );
    }
}

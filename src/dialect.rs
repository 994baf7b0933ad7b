//! # SQL Dialect Module
//!
//! This module defines the `Dialect` trait, which abstracts over the differences in
//! SQL syntax and behavior across database systems. The registry adapter in
//! [`crate::database`] only ever asks the dialect for statement text, so the
//! adapter itself stays agnostic to the engine behind the pool.
//!
//! The current dialect is chosen at compile time by feature flags. With the
//! `sqlite` feature (the default) `CurrentDialect` is `sqlite::SqliteDialect`.
//!
//! ## Tables
//! - `images`: one row per image, soft-deleted through the `deleted` flag.
//!   `seq` is the insertion order used for listings.
//! - `image_members`: access records, soft-deleted; a partial unique index keeps
//!   at most one live record per `(image_id, member)`.
//! - `image_tags`: `(image_id, value)` pairs, hard-deleted.

#[cfg(feature = "sqlite")]
mod sqlite;

/// The current SQL dialect used at compile time, determined by feature flags.
#[cfg(feature = "sqlite")]
pub type CurrentDialect = sqlite::SqliteDialect;

#[cfg(feature = "sqlite")]
pub type Db = sqlx::Sqlite;

#[cfg(feature = "sqlite")]
pub type CurrentRow = sqlx::sqlite::SqliteRow;

/// Columns selected for an image row, in the order `FromRow` expects them.
const IMAGE_COLUMNS: &str = "images.id, images.name, images.owner, images.status, images.is_public, \
     images.size, images.checksum, images.properties, images.created_at, images.updated_at, \
     images.deleted, images.deleted_at";

const MEMBER_COLUMNS: &str = "image_id, member, can_share, deleted, created_at, updated_at";

/// A trait for SQL dialects to support database-specific query generation.
///
/// This trait provides methods that return SQL strings compatible with the
/// target database. The goal is to abstract away differences in placeholder
/// syntax and conditional insert behavior so that higher-level logic can remain
/// dialect-agnostic.
pub trait Dialect {
    /// Returns the SQL placeholder syntax for the given parameter index.
    ///
    /// - SQLite: `?`
    /// - PostgreSQL: `$1`, `$2`, ...
    ///
    /// # Parameters
    /// - `idx`: The 1-based parameter index (used in dialects that number placeholders).
    fn placeholder(idx: usize) -> String;

    /// Returns a SQL `EXISTS` subquery to check if an image is tagged with a given tag.
    fn exists_tag_query(idx: usize) -> String {
        format!(
            "EXISTS (SELECT 1 FROM image_tags WHERE image_tags.image_id = images.id AND image_tags.value = {})",
            Self::placeholder(idx)
        )
    }

    /// Returns a condition matching images created at or before a timestamp.
    fn created_until_query(idx: usize) -> String {
        format!("images.created_at <= {}", Self::placeholder(idx))
    }

    /// Returns a condition matching images created at or after a timestamp.
    fn created_since_query(idx: usize) -> String {
        format!("images.created_at >= {}", Self::placeholder(idx))
    }

    /// Returns a condition on the soft-delete flag.
    fn deleted_query(deleted: bool) -> String {
        format!("images.deleted = {}", if deleted { 1 } else { 0 })
    }

    /// Returns the visibility condition for a tenant.
    ///
    /// Both placeholders take the tenant id.
    fn tenant_scope_query(owner_idx: usize, member_idx: usize) -> String {
        format!(
            "(images.owner IS NULL OR images.is_public = 1 OR images.owner = {} \
             OR EXISTS (SELECT 1 FROM image_members WHERE image_members.image_id = images.id \
             AND image_members.member = {} AND image_members.deleted = 0))",
            Self::placeholder(owner_idx),
            Self::placeholder(member_idx),
        )
    }

    /// Returns the visibility condition for anonymous callers.
    fn public_scope_query() -> String {
        "(images.owner IS NULL OR images.is_public = 1)".to_string()
    }

    /// Returns the SQL statement to insert a new image row.
    fn insert_image_statement() -> String {
        format!(
            r#"INSERT INTO images
            (id, name, owner, status, is_public, size, checksum, properties, created_at, updated_at, deleted)
            VALUES ({}, {}, {}, {}, {}, {}, {}, {}, {}, {}, 0)"#,
            Self::placeholder(1),
            Self::placeholder(2),
            Self::placeholder(3),
            Self::placeholder(4),
            Self::placeholder(5),
            Self::placeholder(6),
            Self::placeholder(7),
            Self::placeholder(8),
            Self::placeholder(9),
            Self::placeholder(10),
        )
    }

    /// Returns the SQL statement to fetch one image by id, deleted or not.
    fn query_image_by_id_statement() -> String {
        format!(
            "SELECT {} FROM images WHERE images.id = {}",
            IMAGE_COLUMNS,
            Self::placeholder(1)
        )
    }

    /// Returns a full SELECT statement for retrieving images that match
    /// the given condition clause.
    ///
    /// # Parameters
    /// - `condition`: The SQL fragment (e.g., WHERE clause) generated by the query module.
    fn query_images_statement(condition: String) -> String {
        format!("SELECT {} FROM images {}", IMAGE_COLUMNS, condition)
    }

    /// Returns the SQL statement that rewrites every mutable column of an image.
    fn update_image_statement() -> String {
        format!(
            r#"UPDATE images SET name = {}, owner = {}, status = {}, is_public = {}, size = {},
            checksum = {}, properties = {}, updated_at = {} WHERE id = {}"#,
            Self::placeholder(1),
            Self::placeholder(2),
            Self::placeholder(3),
            Self::placeholder(4),
            Self::placeholder(5),
            Self::placeholder(6),
            Self::placeholder(7),
            Self::placeholder(8),
            Self::placeholder(9),
        )
    }

    /// Returns the SQL statement to soft-delete an image.
    fn soft_delete_image_statement() -> String {
        format!(
            "UPDATE images SET deleted = 1, status = 'deleted', deleted_at = {}, updated_at = {} WHERE id = {}",
            Self::placeholder(1),
            Self::placeholder(2),
            Self::placeholder(3),
        )
    }

    /// Returns the SQL statement to find the live access record of a member.
    fn query_member_statement() -> String {
        format!(
            "SELECT {} FROM image_members WHERE image_id = {} AND member = {} AND deleted = 0",
            MEMBER_COLUMNS,
            Self::placeholder(1),
            Self::placeholder(2),
        )
    }

    /// Returns the SQL statement to list every access record of an image,
    /// including soft-deleted ones.
    fn query_members_statement() -> String {
        format!(
            "SELECT {} FROM image_members WHERE image_id = {} ORDER BY rowid",
            MEMBER_COLUMNS,
            Self::placeholder(1),
        )
    }

    /// Returns the SQL statement to insert an access record.
    fn insert_member_statement() -> String {
        format!(
            "INSERT INTO image_members ({}) VALUES ({}, {}, {}, 0, {}, {})",
            MEMBER_COLUMNS,
            Self::placeholder(1),
            Self::placeholder(2),
            Self::placeholder(3),
            Self::placeholder(4),
            Self::placeholder(5),
        )
    }

    /// Returns the SQL statement to soft-delete the live access record of a member.
    fn soft_delete_member_statement() -> String {
        format!(
            "UPDATE image_members SET deleted = 1, deleted_at = {}, updated_at = {} \
             WHERE image_id = {} AND member = {} AND deleted = 0",
            Self::placeholder(1),
            Self::placeholder(2),
            Self::placeholder(3),
            Self::placeholder(4),
        )
    }

    /// Returns the SQL statement to retrieve all tags for a given image.
    ///
    /// Should return a single-column result (`value`).
    fn query_tags_by_image_statement() -> String {
        format!(
            "SELECT value FROM image_tags WHERE image_id = {} ORDER BY value",
            Self::placeholder(1)
        )
    }

    /// Returns the SQL statement to ensure a tag is attached to an image.
    ///
    /// Should insert a `(image_id, value)` pair into the `image_tags` table
    /// without duplicating existing entries.
    fn ensure_image_tag_statement() -> String;

    /// Returns the SQL statement to remove a tag from an image.
    fn delete_image_tag_statement() -> String {
        format!(
            "DELETE FROM image_tags WHERE image_id = {} AND value = {}",
            Self::placeholder(1),
            Self::placeholder(2),
        )
    }

    /// Creates the tables and indexes if they do not exist yet.
    async fn migration(pool: &sqlx::Pool<Db>) -> Result<(), sqlx::Error>;
}

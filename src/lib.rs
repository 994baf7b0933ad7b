//! # Image Registry
//!
//! This crate implements a registry of virtual machine images: image metadata
//! records with free-form properties, sharing of private images with other
//! tenants (access records), tags, and write-once storage of the image data
//! itself, all served over a small versioned HTTP API.
//!
//! ## Features
//!
//! - **Image Records**: Create, list, show, merge-update and soft-delete images.
//!   Listings filter on visibility and on a boolean `tags` expression.
//! - **Sharing**: Grant other tenants access to a private image, optionally
//!   letting them share it further.
//! - **Schemas**: Requests are validated against named JSON schemas, which also
//!   decide which properties appear in responses.
//! - **Storage**: Image data is written once to a content directory and its
//!   SHA-256 checksum is recorded on the image.
//!
//! ## Usage
//!
//! Operations live in [`app`] and take any [`registry::Registry`], so the
//! SQLite-backed [`database::Database`] and the in-process
//! [`memory::MemoryRegistry`] are interchangeable.
//!
//! ```no_run
//! use imgreg::prelude::*;
//!
//! async fn share(db: &Database) -> Result<(), AppError> {
//!     let owner = RequestContext::new("tenant1");
//!     let image = create_image(db, &owner, ImageFields::default()).await?;
//!
//!     let grant = AccessGrant {
//!         member: "tenant2".to_string(),
//!         can_share: false,
//!     };
//!     create_access(db, &owner, &image.id, grant).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod app;
pub mod config;
pub mod context;
pub mod database;
mod dialect;
pub mod memory;
pub mod model;
pub mod parser;
pub mod policy;
pub mod query;
pub mod registry;
pub mod schema;
pub mod storage;

pub mod prelude {
    pub use crate::api::{ApiError, AppState, router};
    pub use crate::app::*;
    pub use crate::config::AppConfig;
    pub use crate::context::RequestContext;
    pub use crate::database::{Database, DatabaseError};
    pub use crate::memory::MemoryRegistry;
    pub use crate::model::{AccessGrant, AccessRecord, Image, ImageFields, Tag, Visibility};
    pub use crate::parser::parse_query;
    pub use crate::query::{ImageQuery, ImageQueryExpr};
    pub use crate::registry::{Registry, StoreError};
    pub use crate::schema::SchemaProvider;
    pub use crate::storage::Storage;
}

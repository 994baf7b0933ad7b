//! Records owned by the data store: images, access records and tags.
//!
//! These types carry no behaviour beyond conversions; every mutation goes
//! through a [`Registry`](crate::registry::Registry) implementation.

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{fmt::Display, str::FromStr};
use thiserror::Error;

/// Free-form image properties keyed by name.
pub type Properties = Map<String, Value>;

/// Attributes that are owned by the registry and never taken from a request body.
const READ_ONLY_ATTRIBUTES: &[&str] = &[
    "size",
    "checksum",
    "created_at",
    "updated_at",
    "deleted",
    "deleted_at",
    "links",
    "file",
    "self",
    "schema",
];

/// Lifecycle state of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageStatus {
    Queued,
    Saving,
    Active,
    Killed,
    Deleted,
    PendingDelete,
}

impl ImageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageStatus::Queued => "queued",
            ImageStatus::Saving => "saving",
            ImageStatus::Active => "active",
            ImageStatus::Killed => "killed",
            ImageStatus::Deleted => "deleted",
            ImageStatus::PendingDelete => "pending_delete",
        }
    }
}

impl Display for ImageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImageStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(ImageStatus::Queued),
            "saving" => Ok(ImageStatus::Saving),
            "active" => Ok(ImageStatus::Active),
            "killed" => Ok(ImageStatus::Killed),
            "deleted" => Ok(ImageStatus::Deleted),
            "pending_delete" => Ok(ImageStatus::PendingDelete),
            other => Err(UnknownVariant {
                kind: "status",
                value: other.to_string(),
            }),
        }
    }
}

/// Whether an image is listed for every tenant or only for its owner and members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    #[default]
    Private,
}

impl Visibility {
    pub fn from_public(is_public: bool) -> Self {
        if is_public {
            Visibility::Public
        } else {
            Visibility::Private
        }
    }

    pub fn is_public(&self) -> bool {
        matches!(self, Visibility::Public)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Private => "private",
        }
    }
}

impl FromStr for Visibility {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(Visibility::Public),
            "private" => Ok(Visibility::Private),
            other => Err(UnknownVariant {
                kind: "visibility",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Error, PartialEq)]
#[error("unknown {kind}: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

/// An image metadata record as stored by the registry.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    pub id: String,
    pub name: Option<String>,
    pub owner: Option<String>,
    pub status: ImageStatus,
    pub visibility: Visibility,
    /// Size in bytes of the uploaded image data.
    pub size: Option<u64>,
    /// SHA-256 hex digest of the uploaded image data.
    pub checksum: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub properties: Properties,
}

impl Image {
    /// Flattens the record into a single attribute map.
    ///
    /// Core columns win over free-form properties of the same name. The result
    /// is what the `image` schema allow-list is applied to before an image
    /// leaves the service.
    pub fn attributes(&self) -> Map<String, Value> {
        let mut attrs = self.properties.clone();

        attrs.insert("id".to_string(), Value::from(self.id.clone()));
        attrs.insert("name".to_string(), optional(self.name.clone()));
        attrs.insert("owner".to_string(), optional(self.owner.clone()));
        attrs.insert("status".to_string(), Value::from(self.status.as_str()));
        attrs.insert(
            "visibility".to_string(),
            Value::from(self.visibility.as_str()),
        );
        attrs.insert("size".to_string(), optional(self.size));
        attrs.insert("checksum".to_string(), optional(self.checksum.clone()));
        attrs.insert(
            "created_at".to_string(),
            Value::from(timestamp(&self.created_at)),
        );
        attrs.insert(
            "updated_at".to_string(),
            Value::from(timestamp(&self.updated_at)),
        );

        attrs
    }
}

fn optional<T: Into<Value>>(value: Option<T>) -> Value {
    value.map(Into::into).unwrap_or(Value::Null)
}

/// Canonical text form of a timestamp, shared by storage and representations.
///
/// Fixed precision keeps lexical and chronological order identical.
pub fn timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Current time at the precision records are stored with.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Input for [`Registry::image_create`](crate::registry::Registry::image_create).
#[derive(Debug, Clone, PartialEq)]
pub struct NewImage {
    pub id: Option<String>,
    pub name: Option<String>,
    pub owner: Option<String>,
    pub status: ImageStatus,
    pub visibility: Visibility,
    pub properties: Properties,
}

/// A merge update. `None` leaves the stored value untouched; properties are
/// merged key by key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageUpdate {
    pub name: Option<String>,
    pub owner: Option<String>,
    pub status: Option<ImageStatus>,
    pub visibility: Option<Visibility>,
    pub size: Option<u64>,
    pub checksum: Option<String>,
    pub properties: Properties,
}

impl ImageUpdate {
    /// Applies the update to `image` and bumps `updated_at`.
    pub fn apply(self, image: &mut Image, now: DateTime<Utc>) {
        if let Some(name) = self.name {
            image.name = Some(name);
        }
        if let Some(owner) = self.owner {
            image.owner = Some(owner);
        }
        if let Some(status) = self.status {
            image.status = status;
        }
        if let Some(visibility) = self.visibility {
            image.visibility = visibility;
        }
        if let Some(size) = self.size {
            image.size = Some(size);
        }
        if let Some(checksum) = self.checksum {
            image.checksum = Some(checksum);
        }
        for (key, value) in self.properties {
            image.properties.insert(key, value);
        }
        image.updated_at = now;
    }
}

/// Image fields taken from a validated request body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageFields {
    pub id: Option<String>,
    pub name: Option<String>,
    pub owner: Option<String>,
    pub status: Option<ImageStatus>,
    pub visibility: Option<Visibility>,
    pub properties: Properties,
}

#[derive(Debug, Error, PartialEq)]
pub enum FieldError {
    #[error("field `{0}` must be a string")]
    NotAString(String),

    #[error("property `{0}` must be a scalar value")]
    NotAScalar(String),

    #[error(transparent)]
    Unknown(#[from] UnknownVariant),
}

impl ImageFields {
    /// Splits a request body into the core columns and free-form properties.
    ///
    /// Registry-owned attributes (`size`, `checksum`, timestamps, `links`) are
    /// dropped. A `null` name or owner counts as absent.
    pub fn from_json(body: Map<String, Value>) -> Result<Self, FieldError> {
        let mut fields = ImageFields::default();

        for (key, value) in body {
            match key.as_str() {
                "id" => fields.id = string_field(&key, value)?,
                "name" => fields.name = string_field(&key, value)?,
                "owner" => fields.owner = string_field(&key, value)?,
                "status" => {
                    fields.status = string_field(&key, value)?
                        .map(|s| s.parse())
                        .transpose()?
                }
                "visibility" => {
                    fields.visibility = string_field(&key, value)?
                        .map(|s| s.parse())
                        .transpose()?
                }
                k if READ_ONLY_ATTRIBUTES.contains(&k) => {}
                _ => {
                    if value.is_array() || value.is_object() {
                        return Err(FieldError::NotAScalar(key));
                    }
                    fields.properties.insert(key, value);
                }
            }
        }

        Ok(fields)
    }
}

fn string_field(key: &str, value: Value) -> Result<Option<String>, FieldError> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        _ => Err(FieldError::NotAString(key.to_string())),
    }
}

/// A grant letting `member` see (and maybe re-share) an image.
#[derive(Debug, Clone, PartialEq)]
pub struct AccessRecord {
    pub image_id: String,
    pub member: String,
    pub can_share: bool,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Sharing request after the wire `tenant_id` has been renamed to `member`.
#[derive(Debug, Clone, PartialEq)]
pub struct AccessGrant {
    pub member: String,
    pub can_share: bool,
}

/// Input for [`Registry::image_member_create`](crate::registry::Registry::image_member_create).
#[derive(Debug, Clone, PartialEq)]
pub struct NewAccessRecord {
    pub image_id: String,
    pub member: String,
    pub can_share: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Tag {
    pub image_id: String,
    pub value: String,
}

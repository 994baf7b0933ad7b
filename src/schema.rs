//! Named JSON schemas for request validation and response allow-listing.
//!
//! Two schemas are built in: `image` and `access`. A directory of
//! `<name>.json` files may replace them (or add new ones) at startup.
//! Validators are compiled once when the provider is built.

use serde_json::{Map, Value, json};
use std::{collections::BTreeMap, fmt, fs, path::Path};
use thiserror::Error;

pub const IMAGE_SCHEMA: &str = "image";
pub const ACCESS_SCHEMA: &str = "access";

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("unknown schema: {0}")]
    Unknown(String),

    #[error("validation failed: {}", .0.join("; "))]
    Invalid(Vec<String>),

    #[error("schema {name} is not a valid JSON schema: {message}")]
    Compile { name: String, message: String },

    #[error("schema {name} could not be parsed")]
    Parse {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to read schema directory")]
    Io(#[from] std::io::Error),
}

struct NamedSchema {
    document: Value,
    validator: jsonschema::Validator,
}

impl NamedSchema {
    fn compile(name: &str, document: Value) -> Result<Self, SchemaError> {
        let validator =
            jsonschema::validator_for(&document).map_err(|e| SchemaError::Compile {
                name: name.to_string(),
                message: e.to_string(),
            })?;

        Ok(Self {
            document,
            validator,
        })
    }
}

/// Supplies the named schemas.
pub struct SchemaProvider {
    schemas: BTreeMap<String, NamedSchema>,
}

impl fmt::Debug for SchemaProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaProvider")
            .field("schemas", &self.schemas.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl SchemaProvider {
    /// A provider holding the built-in schemas.
    pub fn new() -> Result<Self, SchemaError> {
        let mut schemas = BTreeMap::new();
        schemas.insert(
            IMAGE_SCHEMA.to_string(),
            NamedSchema::compile(IMAGE_SCHEMA, default_image_schema())?,
        );
        schemas.insert(
            ACCESS_SCHEMA.to_string(),
            NamedSchema::compile(ACCESS_SCHEMA, default_access_schema())?,
        );

        Ok(Self { schemas })
    }

    /// The built-in schemas, with every `<name>.json` in `dir` replacing the
    /// schema of the same name.
    pub fn with_overrides(dir: &Path) -> Result<Self, SchemaError> {
        let mut provider = Self::new()?;

        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };

            let text = fs::read_to_string(&path)?;
            let document: Value =
                serde_json::from_str(&text).map_err(|source| SchemaError::Parse {
                    name: name.to_string(),
                    source,
                })?;

            tracing::info!(schema = name, path = %path.display(), "loaded schema override");
            provider
                .schemas
                .insert(name.to_string(), NamedSchema::compile(name, document)?);
        }

        Ok(provider)
    }

    pub fn get_schema(&self, name: &str) -> Result<&Value, SchemaError> {
        self.named(name).map(|s| &s.document)
    }

    /// Checks `instance` against the schema `name`, collecting every violation.
    pub fn validate(&self, name: &str, instance: &Value) -> Result<(), SchemaError> {
        let errors: Vec<String> = self
            .named(name)?
            .validator
            .iter_errors(instance)
            .map(|e| e.to_string())
            .collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(SchemaError::Invalid(errors))
        }
    }

    /// Keys declared under the schema's `properties`.
    pub fn allowed_properties(&self, name: &str) -> Result<Vec<&str>, SchemaError> {
        Ok(self
            .get_schema(name)?
            .get("properties")
            .and_then(Value::as_object)
            .map(|props| props.keys().map(String::as_str).collect())
            .unwrap_or_default())
    }

    /// Keeps only the entries of `attrs` declared by the schema.
    pub fn filter_properties(
        &self,
        name: &str,
        attrs: Map<String, Value>,
    ) -> Result<Map<String, Value>, SchemaError> {
        let allowed = self.allowed_properties(name)?;

        Ok(attrs
            .into_iter()
            .filter(|(key, _)| allowed.contains(&key.as_str()))
            .collect())
    }

    fn named(&self, name: &str) -> Result<&NamedSchema, SchemaError> {
        self.schemas
            .get(name)
            .ok_or_else(|| SchemaError::Unknown(name.to_string()))
    }
}

fn default_image_schema() -> Value {
    json!({
        "name": "image",
        "properties": {
            "id": {
                "type": "string",
                "description": "An identifier for the image",
                "pattern": "^[A-Za-z0-9_-]{1,64}$"
            },
            "name": {
                "type": "string",
                "description": "Descriptive name for the image",
                "maxLength": 255
            },
            "visibility": {
                "type": "string",
                "description": "Scope of image accessibility",
                "enum": ["public", "private"]
            },
            "status": {
                "type": "string",
                "description": "Status of the image",
                "enum": ["queued", "saving", "active", "killed", "deleted", "pending_delete"]
            },
            "owner": {
                "type": ["null", "string"],
                "description": "Tenant that owns the image",
                "maxLength": 255
            },
            "size": {
                "type": ["null", "integer"],
                "description": "Size of the image data in bytes"
            },
            "checksum": {
                "type": ["null", "string"],
                "description": "SHA-256 hex digest of the image data"
            },
            "created_at": {
                "type": "string",
                "description": "Date and time of image registration"
            },
            "updated_at": {
                "type": "string",
                "description": "Date and time of the last modification"
            },
            "container_format": {
                "type": "string",
                "enum": ["bare", "ovf", "ami", "aki", "ari"]
            },
            "disk_format": {
                "type": "string",
                "enum": ["raw", "vhd", "vmdk", "vdi", "iso", "qcow2", "aki", "ari", "ami"]
            },
            "min_disk": { "type": "integer", "minimum": 0 },
            "min_ram": { "type": "integer", "minimum": 0 },
            "protected": { "type": "boolean" },
            "architecture": { "type": "string" },
            "os_distro": { "type": "string" },
            "os_version": { "type": "string" },
            "kernel_id": { "type": "string" },
            "ramdisk_id": { "type": "string" }
        }
    })
}

fn default_access_schema() -> Value {
    json!({
        "name": "access",
        "properties": {
            "tenant_id": {
                "type": "string",
                "description": "The tenant identifier",
                "minLength": 1,
                "maxLength": 255,
                "pattern": "^[^\\x00-\\x20\\x7f/?#]+$"
            },
            "can_share": {
                "type": "boolean",
                "description": "Ability of tenant to share with others",
                "default": false
            }
        },
        "required": ["tenant_id"],
        "additionalProperties": false
    })
}

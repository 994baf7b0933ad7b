//! Storage module to manage uploaded image data.
//!
//! Files are stored under a directory tree derived from the image id, so a
//! single directory never holds more than a slice of the registry.
//! Data is write-once: uploading twice for the same image is rejected.

use sha2::{Digest, Sha256};
use std::{error::Error, fmt::Display, io::ErrorKind, path::PathBuf};
use tokio::{
    fs::{self, OpenOptions},
    io::AsyncWriteExt,
};

#[derive(Debug, Clone)]
pub struct Storage {
    root_path: PathBuf,
}

/// What the byte store learned while writing a file.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredFile {
    pub size: u64,
    /// SHA-256 hex digest of the data.
    pub checksum: String,
}

impl Storage {
    /// Creates a new `Storage` instance with the specified root path.
    ///
    /// # Arguments
    /// * `root` - Root directory path where all files will be stored.
    pub fn new(root: PathBuf) -> Storage {
        Storage { root_path: root }
    }

    /// Saves the data of image `id`.
    ///
    /// # Returns
    /// * `Ok(StoredFile)` - Size and checksum of what was written.
    /// * `Err(StorageError)` - If data already exists or writing failed.
    ///
    /// # Errors
    /// - `StorageError::InvalidId` if `id` cannot be used as a file name.
    /// - `StorageError::DataExists` if data was already stored for `id`.
    /// - `StorageError::Io` if directory creation or file writing fails.
    pub async fn create_file(&self, id: &str, bytes: &[u8]) -> Result<StoredFile, StorageError> {
        let path = self.derive_abs_path(id)?;

        // `ab/cd/abcd…` keeps directories small.
        fs::create_dir_all(self.derive_abs_dir(id)?).await?;

        let mut file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(StorageError::DataExists {
                    id: id.to_string(),
                    existing_path: path,
                });
            }
            Err(e) => return Err(e.into()),
        };

        if let Err(e) = write_all(&mut file, bytes).await {
            // A half-written file would block every later upload.
            drop(file);
            let _ = fs::remove_file(&path).await;
            return Err(e);
        }

        Ok(StoredFile {
            size: bytes.len() as u64,
            checksum: compute_checksum(bytes),
        })
    }

    /// Reads back the data of image `id`.
    ///
    /// # Errors
    /// - `StorageError::FileNotFound` if nothing was uploaded for `id`.
    pub async fn read_file(&self, id: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.derive_abs_path(id)?;

        match fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StorageError::FileNotFound {
                id: id.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Ensures that no data is stored for `id`.
    ///
    /// If the file does not exist, this function still succeeds.
    pub async fn ensure_deleted(&self, id: &str) -> Result<(), StorageError> {
        let path = self.derive_abs_path(id)?;

        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Derives a relative directory path from the id.
    /// Example: `01/23/`
    fn derive_dir(&self, id: &str) -> Result<PathBuf, StorageError> {
        validate_id(id)?;

        let prefix: Vec<char> = id.chars().chain(std::iter::repeat('_')).take(4).collect();

        Ok(PathBuf::from(format!(
            "{}{}/{}{}/",
            prefix[0], prefix[1], prefix[2], prefix[3]
        )))
    }

    fn derive_path(&self, id: &str) -> Result<PathBuf, StorageError> {
        Ok(self.derive_dir(id)?.join(id))
    }

    /// Derives the absolute directory path on the filesystem.
    fn derive_abs_dir(&self, id: &str) -> Result<PathBuf, StorageError> {
        Ok(self.root_path.join(self.derive_dir(id)?))
    }

    fn derive_abs_path(&self, id: &str) -> Result<PathBuf, StorageError> {
        Ok(self.root_path.join(self.derive_path(id)?))
    }
}

async fn write_all(file: &mut fs::File, bytes: &[u8]) -> Result<(), StorageError> {
    file.write_all(bytes).await?;
    file.flush().await?;
    Ok(())
}

fn validate_id(id: &str) -> Result<(), StorageError> {
    let valid = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidId { id: id.to_string() })
    }
}

/// Computes the SHA-256 hex digest of `bytes`.
pub fn compute_checksum(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Errors that can occur during storage operations.
#[derive(Debug)]
pub enum StorageError {
    /// Data was already uploaded for this image.
    DataExists { id: String, existing_path: PathBuf },
    /// No data was uploaded for this image.
    FileNotFound { id: String },
    /// The id contains characters that are not safe in a path.
    InvalidId { id: String },
    /// Filesystem IO error.
    Io(std::io::Error),
}

/// Allows automatic conversion from std::io::Error.
impl From<std::io::Error> for StorageError {
    fn from(value: std::io::Error) -> Self {
        StorageError::Io(value)
    }
}

/// Formats StorageError for display.
impl Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::DataExists { id, existing_path } => {
                write!(
                    f,
                    "Data for image {} already exists at: {}",
                    id,
                    existing_path.display()
                )
            }
            StorageError::FileNotFound { id } => write!(f, "No data stored for image: {}", id),
            StorageError::InvalidId { id } => write!(f, "Invalid image id: {}", id),
            StorageError::Io(inner) => {
                write!(f, "Filesystem error: {}", inner)
            }
        }
    }
}

/// Enables StorageError to be used as a standard error type.
impl Error for StorageError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            StorageError::Io(inner) => Some(inner),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::{Storage, StorageError, compute_checksum};
    use std::{fs, path::PathBuf};
    use tempfile::TempDir;

    const ID: &str = "5b1c6a3e-0f0d-4d5b-9a8e-1f2e3d4c5b6a";

    #[test]
    fn test_checksum() {
        assert_eq!(
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855",
            compute_checksum(b"")
        );
    }

    #[test]
    fn test_pathes() {
        let storage = Storage::new("/root".into());

        assert_eq!(PathBuf::from("5b/1c"), storage.derive_dir(ID).unwrap());
        assert_eq!(PathBuf::from("ab/__"), storage.derive_dir("ab").unwrap());
        assert_eq!(
            PathBuf::from("/root/5b/1c").join(ID),
            storage.derive_abs_path(ID).unwrap()
        );
        assert!(matches!(
            storage.derive_dir("../etc"),
            Err(StorageError::InvalidId { .. })
        ));
    }

    #[tokio::test]
    async fn test_create_file() {
        let tmp_dir = TempDir::new().unwrap();
        let storage = Storage::new(tmp_dir.path().to_path_buf());

        let stored = storage.create_file(ID, b"disk image").await.unwrap();

        assert_eq!(10, stored.size);
        assert_eq!(compute_checksum(b"disk image"), stored.checksum);
        assert!(fs::exists(tmp_dir.path().join("5b/1c").join(ID)).unwrap());
    }

    #[tokio::test]
    async fn test_create_file_on_duplicated() {
        let tmp_dir = TempDir::new().unwrap();
        let storage = Storage::new(tmp_dir.path().to_path_buf());

        storage.create_file(ID, b"first").await.unwrap();

        let result = storage.create_file(ID, b"second").await;
        let Err(StorageError::DataExists { existing_path, .. }) = result else {
            panic!("Expected DataExists error, but got {:?}", result);
        };

        assert_eq!(tmp_dir.path().join("5b/1c").join(ID), existing_path);
        assert_eq!(b"first".to_vec(), storage.read_file(ID).await.unwrap());
    }

    #[tokio::test]
    async fn test_read_file() {
        let tmp_dir = TempDir::new().unwrap();
        let storage = Storage::new(tmp_dir.path().to_path_buf());
        let stored_path = tmp_dir.path().join("5b/1c").join(ID);

        assert!(!stored_path.exists());
        assert!(matches!(
            storage.read_file(ID).await,
            Err(StorageError::FileNotFound { .. })
        ));

        storage.create_file(ID, b"bytes").await.unwrap();

        assert!(stored_path.exists());
        assert_eq!(b"bytes".to_vec(), storage.read_file(ID).await.unwrap());
    }

    #[tokio::test]
    async fn test_ensure_deleted() {
        let tmp_dir = TempDir::new().unwrap();
        let storage = Storage::new(tmp_dir.path().to_path_buf());

        storage.create_file(ID, b"bytes").await.unwrap();

        assert!(storage.ensure_deleted(ID).await.is_ok());
        assert!(storage.ensure_deleted(ID).await.is_ok());
        assert!(!tmp_dir.path().join("5b/1c").join(ID).exists());
    }
}

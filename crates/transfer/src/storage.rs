use std::path::{Path, PathBuf};

use filedrop_protocol::constants::UPLOADS_URL_PREFIX;

use crate::TransferError;
use crate::validation::{MAX_FILE_NAME_LEN, validate_file_name};

/// Suffix of in-progress writes; such files are never served.
const PARTIAL_SUFFIX: &str = ".part";

/// Longest storage name whose `.{name}.part` temp file still fits.
const MAX_STORAGE_NAME_LEN: usize = MAX_FILE_NAME_LEN - 1 - PARTIAL_SUFFIX.len();

/// Builds the collision-free storage name `{stamp}_{file_name}`.
pub fn storage_file_name(stamp_millis: i64, file_name: &str) -> String {
    format!("{stamp_millis}_{file_name}")
}

/// Checks that `storage_name` can be written by [`FileStore::persist`],
/// temp file included.
pub fn validate_storage_name(storage_name: &str) -> Result<(), TransferError> {
    validate_file_name(storage_name)?;
    if storage_name.len() > MAX_STORAGE_NAME_LEN {
        return Err(TransferError::InvalidFileName(format!(
            "name too long once stored ({} of {MAX_STORAGE_NAME_LEN} bytes)",
            storage_name.len()
        )));
    }
    Ok(())
}

/// Public URL path of a stored file.
pub fn public_path(storage_file_name: &str) -> String {
    format!("{UPLOADS_URL_PREFIX}/{storage_file_name}")
}

/// Durable namespace for assembled uploads: one flat directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Creates a store rooted at `root`. The directory is created lazily.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the uploads directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates the uploads directory if it does not exist.
    pub async fn ensure_root(&self) -> Result<(), TransferError> {
        tokio::fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    /// Writes `data` as `storage_name`.
    ///
    /// The bytes go to a hidden `.part` file first and are renamed into
    /// place, so readers never observe a half-written upload. A failed
    /// write removes its temp file; it is not retried.
    pub async fn persist(&self, storage_name: &str, data: &[u8]) -> Result<PathBuf, TransferError> {
        validate_storage_name(storage_name)?;
        self.ensure_root().await?;

        let final_path = self.root.join(storage_name);
        let tmp_path = self.root.join(format!(".{storage_name}{PARTIAL_SUFFIX}"));

        if let Err(e) = tokio::fs::write(&tmp_path, data).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }
        if let Err(e) = tokio::fs::rename(&tmp_path, &final_path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }

        tracing::debug!(path = %final_path.display(), bytes = data.len(), "upload persisted");
        Ok(final_path)
    }

    /// Returns the size of a stored file, or `None` if `name` is not a
    /// completed upload in this store.
    pub async fn lookup(&self, name: &str) -> Option<u64> {
        if validate_file_name(name).is_err() || name.starts_with('.') {
            return None;
        }
        let meta = tokio::fs::metadata(self.root.join(name)).await.ok()?;
        meta.is_file().then(|| meta.len())
    }
}

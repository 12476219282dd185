use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;

use crate::errors::StorageError;

/// The two parallel directory trees every profile writes into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageTree {
    Originals,
    Compressed,
}

impl StorageTree {
    pub fn dir_name(&self) -> &'static str {
        match self {
            Self::Originals => "originals",
            Self::Compressed => "compressed",
        }
    }
}

#[async_trait]
pub trait StorageBackend: Send + Sync + 'static {
    /// Persists `data` under the given profile and tree, returning the
    /// absolute path of the stored file.
    ///
    /// The write must be staged: the bytes land under a temporary name
    /// and are renamed into place, so a crash mid-write never leaves a
    /// half-written file at the final path.
    async fn store(
        &self,
        profile: &str,
        tree: StorageTree,
        file_name: &str,
        data: Bytes,
    ) -> Result<PathBuf, StorageError>;

    async fn fetch(
        &self,
        profile: &str,
        tree: StorageTree,
        file_name: &str,
    ) -> Result<Option<Bytes>, StorageError>;

    /// Removes a stored file. Deleting a file that does not exist is
    /// not an error.
    async fn delete(
        &self,
        profile: &str,
        tree: StorageTree,
        file_name: &str,
    ) -> Result<(), StorageError>;
}

use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use crate::errors::StorageError;
use crate::storage::{StorageBackend, StorageTree};

pub struct FileSystemBackend {
    directory: PathBuf,
}

impl FileSystemBackend {
    pub fn new(dir: PathBuf) -> Self {
        Self { directory: dir }
    }

    #[inline]
    fn tree_path(&self, profile: &str, tree: StorageTree) -> PathBuf {
        self.directory.join(profile).join(tree.dir_name())
    }
}

#[async_trait]
impl StorageBackend for FileSystemBackend {
    async fn store(
        &self,
        profile: &str,
        tree: StorageTree,
        file_name: &str,
        data: Bytes,
    ) -> Result<PathBuf, StorageError> {
        let store_in = self.tree_path(profile, tree);

        tokio::fs::create_dir_all(&store_in)
            .await
            .map_err(|source| StorageError::CreateDir {
                path: store_in.clone(),
                source,
            })?;

        let path = store_in.join(file_name);
        let staged = store_in.join(format!("{}.tmp", file_name));

        debug!("Storing file @ {:?}", &path);
        if let Err(source) = tokio::fs::write(&staged, &data).await {
            return Err(StorageError::Write {
                path: staged,
                source,
            });
        }

        if let Err(source) = tokio::fs::rename(&staged, &path).await {
            // The staged copy is useless once the rename fails.
            let _ = tokio::fs::remove_file(&staged).await;
            return Err(StorageError::Commit { path, source });
        }

        Ok(path)
    }

    async fn fetch(
        &self,
        profile: &str,
        tree: StorageTree,
        file_name: &str,
    ) -> Result<Option<Bytes>, StorageError> {
        let path = self.tree_path(profile, tree).join(file_name);

        debug!("Retrieving file @ {:?}", &path);
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(ref e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::Read { path, source }),
        }
    }

    async fn delete(
        &self,
        profile: &str,
        tree: StorageTree,
        file_name: &str,
    ) -> Result<(), StorageError> {
        let path = self.tree_path(profile, tree).join(file_name);

        debug!("Purging file @ {:?}", &path);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(ref e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::Remove { path, source }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> (tempfile::TempDir, FileSystemBackend) {
        let dir = tempfile::tempdir().expect("create temp dir");
        let backend = FileSystemBackend::new(dir.path().to_path_buf());
        (dir, backend)
    }

    #[tokio::test]
    async fn test_store_then_fetch_round_trip() {
        let (_guard, backend) = backend();

        let path = backend
            .store(
                "complaints",
                StorageTree::Originals,
                "123_abc.png",
                Bytes::from_static(b"fake image bytes"),
            )
            .await
            .expect("store should succeed");

        assert!(path.ends_with("complaints/originals/123_abc.png"));

        let data = backend
            .fetch("complaints", StorageTree::Originals, "123_abc.png")
            .await
            .expect("fetch should succeed")
            .expect("file should exist");
        assert_eq!(data.as_ref(), b"fake image bytes");
    }

    #[tokio::test]
    async fn test_store_leaves_no_staging_file() {
        let (guard, backend) = backend();

        backend
            .store(
                "messages",
                StorageTree::Compressed,
                "123_abc.jpg",
                Bytes::from_static(b"data"),
            )
            .await
            .expect("store should succeed");

        let tree = guard.path().join("messages").join("compressed");
        let entries: Vec<String> = std::fs::read_dir(tree)
            .expect("tree should exist")
            .map(|e| {
                e.expect("read entry")
                    .file_name()
                    .to_string_lossy()
                    .into_owned()
            })
            .collect();
        assert_eq!(entries, vec!["123_abc.jpg".to_string()]);
    }

    #[tokio::test]
    async fn test_fetch_missing_is_none() {
        let (_guard, backend) = backend();

        let res = backend
            .fetch("complaints", StorageTree::Originals, "nope.png")
            .await
            .expect("fetch should not error");
        assert!(res.is_none());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (_guard, backend) = backend();

        backend
            .store(
                "complaints",
                StorageTree::Originals,
                "123_abc.png",
                Bytes::from_static(b"data"),
            )
            .await
            .expect("store should succeed");

        backend
            .delete("complaints", StorageTree::Originals, "123_abc.png")
            .await
            .expect("first delete should succeed");
        backend
            .delete("complaints", StorageTree::Originals, "123_abc.png")
            .await
            .expect("second delete should also succeed");

        let res = backend
            .fetch("complaints", StorageTree::Originals, "123_abc.png")
            .await
            .expect("fetch should not error");
        assert!(res.is_none());
    }
}

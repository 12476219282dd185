use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use futures::stream::{self, StreamExt};
use hashbrown::HashMap;
use poem_openapi::Object;
use tokio::sync::Semaphore;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::ProfileConfig;
use crate::errors::{PipelineError, StorageError};
use crate::pipeline::compressor::{self, CompressError};
use crate::pipeline::{self, acceptor, AcceptedFile, ImageArtifact, RawFile};
use crate::storage::{StorageBackend, StorageTree};
use crate::utils;

/// The parent-record shape returned to the client, with the processed
/// artifacts embedded. Persisting this into the society database is
/// the caller's concern.
#[derive(Debug, Object)]
pub struct UploadReceipt {
    /// The entity the images were attached to, e.g. a complaint
    /// thread or an amenity.
    pub parent_id: String,

    /// The submitting actor.
    pub sender_id: String,

    pub caption: Option<String>,

    pub images: Vec<ImageArtifact>,

    pub uploaded_at_ms: u64,
}

impl UploadReceipt {
    pub fn new(
        parent_id: String,
        sender_id: String,
        caption: Option<String>,
        images: Vec<ImageArtifact>,
    ) -> Self {
        let uploaded_at_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;

        Self {
            parent_id,
            sender_id,
            caption,
            images,
            uploaded_at_ms,
        }
    }
}

/// Builds one controller per configured upload profile.
pub fn build_controllers(
    profiles: &HashMap<String, ProfileConfig>,
    global_limiter: Option<Arc<Semaphore>>,
    storage: Arc<dyn StorageBackend>,
) -> HashMap<String, UploadController> {
    profiles
        .iter()
        .map(|(name, cfg)| {
            let controller = UploadController::new(
                name.clone(),
                cfg.clone(),
                global_limiter.clone(),
                storage.clone(),
            );
            (name.clone(), controller)
        })
        .collect()
}

pub struct UploadController {
    profile: String,
    config: ProfileConfig,
    global_limiter: Option<Arc<Semaphore>>,
    storage: Arc<dyn StorageBackend>,
}

impl UploadController {
    pub fn new(
        profile: String,
        config: ProfileConfig,
        global_limiter: Option<Arc<Semaphore>>,
        storage: Arc<dyn StorageBackend>,
    ) -> Self {
        Self {
            profile,
            config,
            global_limiter,
            storage,
        }
    }

    #[inline]
    pub fn cfg(&self) -> &ProfileConfig {
        &self.config
    }

    /// Runs a whole upload batch through the pipeline.
    ///
    /// Validation happens up front, before anything touches storage.
    /// Accepted files are then processed with bounded concurrency;
    /// the first failure flips a shared abort flag so files that have
    /// not started yet are skipped, everything written so far is
    /// rolled back, and the root cause is surfaced. There is no
    /// partial success: the caller gets every artifact or none.
    pub async fn upload(
        &self,
        files: Vec<RawFile>,
    ) -> Result<Vec<ImageArtifact>, PipelineError> {
        let accepted = acceptor::accept(files, &self.config)?;

        let _permit = match &self.global_limiter {
            Some(limiter) => Some(
                limiter
                    .acquire()
                    .await
                    .map_err(|_| PipelineError::Aborted)?,
            ),
            None => None,
        };

        let batch_id = Uuid::new_v4();
        debug!(
            "Processing batch {} of {} file(s) for profile {:?}",
            batch_id,
            accepted.len(),
            self.profile,
        );

        let abort = AtomicBool::new(false);
        let concurrency = self.config.concurrency.max(1);

        let results: Vec<(usize, Result<ImageArtifact, PipelineError>)> =
            stream::iter(accepted.into_iter().enumerate().map(|(idx, file)| {
                let abort = &abort;
                async move {
                    if abort.load(Ordering::Acquire) {
                        return (idx, Err(PipelineError::Aborted));
                    }

                    let result = self.process_file(file).await;
                    if result.is_err() {
                        abort.store(true, Ordering::Release);
                    }

                    (idx, result)
                }
            }))
            .buffer_unordered(concurrency)
            .collect()
            .await;

        let mut artifacts = Vec::new();
        let mut failure: Option<PipelineError> = None;
        for (idx, result) in results {
            match result {
                Ok(artifact) => artifacts.push((idx, artifact)),
                // Skipped files are only a fallback cause; a real
                // failure always wins.
                Err(PipelineError::Aborted) => {
                    if failure.is_none() {
                        failure = Some(PipelineError::Aborted);
                    }
                }
                Err(err) => {
                    if matches!(failure, None | Some(PipelineError::Aborted)) {
                        failure = Some(err);
                    }
                }
            }
        }

        if let Some(err) = failure {
            warn!(
                "Batch {} failed, rolling back {} written artifact(s): {}",
                batch_id,
                artifacts.len(),
                err,
            );
            self.cleanup(artifacts.iter().map(|(_, artifact)| artifact))
                .await;
            return Err(err);
        }

        artifacts.sort_by_key(|(idx, _)| *idx);
        Ok(artifacts.into_iter().map(|(_, artifact)| artifact).collect())
    }

    /// Compresses and persists a single accepted file.
    ///
    /// Only the compression stage runs under the per-file timeout: a
    /// hung decode is the stall risk, and abandoning a storage write
    /// midway would leave staged files behind.
    async fn process_file(
        &self,
        file: AcceptedFile,
    ) -> Result<ImageArtifact, PipelineError> {
        debug!("Compressing {:?} ({})", file.name, file.kind);

        let seconds = self.config.processing_timeout_secs;
        let compressing = compressor::compress_in_background(
            file.data.clone(),
            self.config.bound,
            self.config.quality,
        );

        let compressed = match tokio::time::timeout(Duration::from_secs(seconds), compressing)
            .await
        {
            Ok(Ok(compressed)) => compressed,
            Ok(Err(CompressError::Decode(source))) => {
                return Err(PipelineError::Decode {
                    name: file.name,
                    source,
                })
            }
            Ok(Err(CompressError::WorkerGone)) => return Err(PipelineError::WorkerGone),
            Err(_) => {
                return Err(PipelineError::Timeout {
                    name: file.name,
                    seconds,
                })
            }
        };

        let stem = utils::generate_name_stem();
        let file_name = format!("{}.{}", stem, file.kind.as_file_extension());
        let compressed_name = utils::compressed_file_name(&file_name);

        let original_path = self
            .storage
            .store(
                &self.profile,
                StorageTree::Originals,
                &file_name,
                file.data.clone(),
            )
            .await
            .map_err(|source| PipelineError::Storage {
                name: file.name.clone(),
                source,
            })?;

        let compressed_path = match self
            .storage
            .store(
                &self.profile,
                StorageTree::Compressed,
                &compressed_name,
                compressed.data.clone(),
            )
            .await
        {
            Ok(path) => path,
            Err(source) => {
                // Without its compressed copy the original is an
                // orphan; drop it before failing the file.
                if let Err(e) = self
                    .storage
                    .delete(&self.profile, StorageTree::Originals, &file_name)
                    .await
                {
                    warn!("Could not remove orphaned original {:?}: {}", file_name, e);
                }

                return Err(PipelineError::Storage {
                    name: file.name,
                    source,
                });
            }
        };

        Ok(pipeline::assemble(
            &file,
            file_name,
            original_path.to_string_lossy().into_owned(),
            compressed_path.to_string_lossy().into_owned(),
            &compressed,
        ))
    }

    /// Rolls back every artifact written before the batch failed.
    ///
    /// The request is already failing when this runs, so unlink
    /// errors are logged and swallowed rather than escalated.
    async fn cleanup<'a>(&self, artifacts: impl Iterator<Item = &'a ImageArtifact>) {
        for artifact in artifacts {
            let compressed_name = utils::compressed_file_name(&artifact.file_name);
            let targets = [
                (StorageTree::Originals, artifact.file_name.as_str()),
                (StorageTree::Compressed, compressed_name.as_str()),
            ];

            for (tree, name) in targets {
                if let Err(e) = self.storage.delete(&self.profile, tree, name).await {
                    warn!(
                        "Cleanup could not unlink {:?} from the {} tree: {}",
                        name,
                        tree.dir_name(),
                        e,
                    );
                }
            }
        }
    }

    /// Reads a stored file back, `None` when it does not exist.
    pub async fn fetch(
        &self,
        file_name: &str,
        tree: StorageTree,
    ) -> Result<Option<Bytes>, StorageError> {
        let name = match tree {
            StorageTree::Originals => file_name.to_string(),
            StorageTree::Compressed => utils::compressed_file_name(file_name),
        };

        self.storage.fetch(&self.profile, tree, &name).await
    }

    /// Unlinks both stored copies of an artifact, best-effort.
    ///
    /// Invoked when the parent record is hard-deleted; by then the
    /// files are already unreferenced, so failures are logged rather
    /// than surfaced.
    pub async fn delete(&self, file_name: &str) {
        let compressed_name = utils::compressed_file_name(file_name);
        let targets = [
            (StorageTree::Originals, file_name),
            (StorageTree::Compressed, compressed_name.as_str()),
        ];

        for (tree, name) in targets {
            if let Err(e) = self.storage.delete(&self.profile, tree, name).await {
                warn!(
                    "Could not delete {:?} from the {} tree: {}",
                    name,
                    tree.dir_name(),
                    e,
                );
            }
        }
    }
}

use std::sync::Arc;

use bytes::Bytes;
use hashbrown::HashMap;
use poem_openapi::param::{Path, Query};
use poem_openapi::payload::{Binary, Json};
use poem_openapi::types::multipart::Upload;
use poem_openapi::{ApiResponse, Enum, Multipart, Object, OpenApi};
use tracing::error;

use crate::controller::{UploadController, UploadReceipt};
use crate::pipeline::RawFile;
use crate::storage::StorageTree;

#[derive(Debug, Object)]
pub struct UploadSuccess {
    pub success: bool,
    pub message: String,
    pub data: UploadReceipt,
}

#[derive(Debug, Object)]
pub struct SimpleResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Object)]
pub struct ErrorEnvelope {
    pub success: bool,
    pub message: String,

    /// Only populated on server faults, where the underlying cause is
    /// echoed for diagnostics.
    pub error: Option<String>,
}

impl ErrorEnvelope {
    fn rejection(message: String) -> Json<Self> {
        Json(Self {
            success: false,
            message,
            error: None,
        })
    }

    fn fault(message: &str, error: String) -> Json<Self> {
        Json(Self {
            success: false,
            message: message.to_string(),
            error: Some(error),
        })
    }
}

#[derive(Debug, Multipart)]
pub struct UploadPayload {
    /// The entity the uploaded images attach to, e.g. a complaint
    /// thread identifier.
    pub parent_id: String,

    /// The submitting actor's identifier.
    pub sender_id: String,

    /// An optional caption stored alongside the images.
    pub caption: Option<String>,

    /// The image files themselves.
    pub images: Vec<Upload>,
}

#[derive(Debug, Clone, Copy, Enum)]
#[oai(rename_all = "lowercase")]
pub enum StoredVariant {
    Original,
    Compressed,
}

#[derive(ApiResponse)]
pub enum UploadResult {
    /// Every file in the batch was compressed and persisted.
    #[oai(status = 201)]
    Created(Json<UploadSuccess>),

    /// The batch violated a validation constraint or a payload could
    /// not be decoded as an image. Nothing was written.
    #[oai(status = 400)]
    BadRequest(Json<ErrorEnvelope>),

    #[oai(status = 404)]
    NotFound(Json<ErrorEnvelope>),

    /// Processing or storage failed server-side; any partially
    /// written files for the batch were rolled back.
    #[oai(status = 500)]
    ServerError(Json<ErrorEnvelope>),
}

#[derive(ApiResponse)]
pub enum FetchResult {
    #[oai(status = 200)]
    Fetched(Binary<Vec<u8>>),

    #[oai(status = 404)]
    NotFound(Json<ErrorEnvelope>),

    #[oai(status = 500)]
    ServerError(Json<ErrorEnvelope>),
}

#[derive(ApiResponse)]
pub enum DeleteResult {
    #[oai(status = 200)]
    Deleted(Json<SimpleResponse>),

    #[oai(status = 404)]
    NotFound(Json<ErrorEnvelope>),
}

pub struct AtriumApi {
    controllers: Arc<HashMap<String, UploadController>>,
}

impl AtriumApi {
    pub fn new(controllers: HashMap<String, UploadController>) -> Self {
        Self {
            controllers: Arc::new(controllers),
        }
    }

    #[inline]
    fn controller(&self, profile: &str) -> Option<&UploadController> {
        self.controllers.get(profile)
    }
}

#[OpenApi]
impl AtriumApi {
    /// Upload a batch of images
    ///
    /// Accepts a multipart submission of 1..N images plus the parent
    /// entity and sender identifiers. The batch is all-or-nothing:
    /// either every file is validated, compressed and persisted, or
    /// the whole request fails and nothing remains on disk.
    #[oai(path = "/:profile", method = "post")]
    pub async fn upload(&self, profile: Path<String>, payload: UploadPayload) -> UploadResult {
        let controller = match self.controller(&profile.0) {
            Some(controller) => controller,
            None => {
                return UploadResult::NotFound(ErrorEnvelope::rejection(format!(
                    "unknown upload profile {:?}",
                    profile.0,
                )))
            }
        };

        let UploadPayload {
            parent_id,
            sender_id,
            caption,
            images,
        } = payload;

        let mut files = Vec::with_capacity(images.len());
        for upload in images {
            let name = upload
                .file_name()
                .map(str::to_string)
                .unwrap_or_else(|| "unnamed".to_string());
            let content_type = upload
                .content_type()
                .map(str::to_string)
                .unwrap_or_else(|| "application/octet-stream".to_string());

            let data = match upload.into_vec().await {
                Ok(data) => Bytes::from(data),
                Err(e) => {
                    return UploadResult::BadRequest(ErrorEnvelope::rejection(format!(
                        "failed to read uploaded file {:?}: {}",
                        name, e,
                    )))
                }
            };

            files.push(RawFile {
                name,
                content_type,
                data,
            });
        }

        match controller.upload(files).await {
            Ok(artifacts) => {
                let message = format!(
                    "Image message with {} image(s) sent successfully",
                    artifacts.len(),
                );
                let receipt = UploadReceipt::new(parent_id, sender_id, caption, artifacts);

                UploadResult::Created(Json(UploadSuccess {
                    success: true,
                    message,
                    data: receipt,
                }))
            }
            Err(err) if err.is_client_error() => {
                UploadResult::BadRequest(ErrorEnvelope::rejection(err.to_string()))
            }
            Err(err) => {
                error!("Upload batch failed for profile {:?}: {}", profile.0, err);
                UploadResult::ServerError(ErrorEnvelope::fault(
                    "Internal server error while processing images",
                    err.to_string(),
                ))
            }
        }
    }

    /// Fetch a stored image
    ///
    /// Serves the compressed copy by default; pass
    /// `?variant=original` for the original upload.
    #[oai(path = "/:profile/:file_name", method = "get")]
    pub async fn fetch(
        &self,
        profile: Path<String>,
        file_name: Path<String>,
        variant: Query<Option<StoredVariant>>,
    ) -> FetchResult {
        let controller = match self.controller(&profile.0) {
            Some(controller) => controller,
            None => {
                return FetchResult::NotFound(ErrorEnvelope::rejection(format!(
                    "unknown upload profile {:?}",
                    profile.0,
                )))
            }
        };

        // The path param is attacker-controlled; anything that is not
        // a plain generated name must never touch the filesystem.
        if !crate::utils::is_safe_file_name(&file_name.0) {
            return FetchResult::NotFound(ErrorEnvelope::rejection(format!(
                "image {:?} does not exist",
                file_name.0,
            )));
        }

        let tree = match variant.0.unwrap_or(StoredVariant::Compressed) {
            StoredVariant::Original => StorageTree::Originals,
            StoredVariant::Compressed => StorageTree::Compressed,
        };

        match controller.fetch(&file_name.0, tree).await {
            Ok(Some(data)) => FetchResult::Fetched(Binary(data.to_vec())),
            Ok(None) => FetchResult::NotFound(ErrorEnvelope::rejection(format!(
                "image {:?} does not exist",
                file_name.0,
            ))),
            Err(err) => {
                error!("Failed to read stored image {:?}: {}", file_name.0, err);
                FetchResult::ServerError(ErrorEnvelope::fault(
                    "Internal server error while reading image",
                    err.to_string(),
                ))
            }
        }
    }

    /// Delete a stored image
    ///
    /// Unlinks both the original and compressed copies, best-effort.
    /// Intended for when the parent record is hard-deleted.
    #[oai(path = "/:profile/:file_name", method = "delete")]
    pub async fn delete(
        &self,
        profile: Path<String>,
        file_name: Path<String>,
    ) -> DeleteResult {
        let controller = match self.controller(&profile.0) {
            Some(controller) => controller,
            None => {
                return DeleteResult::NotFound(ErrorEnvelope::rejection(format!(
                    "unknown upload profile {:?}",
                    profile.0,
                )))
            }
        };

        if !crate::utils::is_safe_file_name(&file_name.0) {
            return DeleteResult::NotFound(ErrorEnvelope::rejection(format!(
                "image {:?} does not exist",
                file_name.0,
            )));
        }

        controller.delete(&file_name.0).await;

        DeleteResult::Deleted(Json(SimpleResponse {
            success: true,
            message: "Image deleted successfully".to_string(),
        }))
    }
}

pub mod acceptor;
pub mod compressor;

use bytes::Bytes;
use poem_openapi::Object;

use crate::config::ImageKind;
use crate::pipeline::compressor::CompressedImage;

/// A raw uploaded file as it arrives off the wire, before any
/// validation has run.
#[derive(Debug)]
pub struct RawFile {
    /// The client's declared filename. Metadata only, never used to
    /// build a storage path.
    pub name: String,

    /// The client's declared content type.
    pub content_type: String,

    pub data: Bytes,
}

/// A file that has passed the acceptor and may be processed.
#[derive(Debug)]
pub struct AcceptedFile {
    pub name: String,
    pub kind: ImageKind,
    pub data: Bytes,
}

/// The per-file metadata handed back to the record layer once both
/// copies of an image have been persisted. Written once, immutable
/// thereafter.
#[derive(Debug, Clone, Object)]
pub struct ImageArtifact {
    /// The filename the client declared at upload time.
    pub original_name: String,

    /// The generated, collision-resistant stored name of the original.
    pub file_name: String,

    pub original_path: String,
    pub compressed_path: String,

    pub original_size_bytes: u64,

    /// The size of the re-encoded copy, measured from the encoder
    /// output rather than copied from the upload.
    pub compressed_size_bytes: u64,

    /// Fractional convention: compressed size divided by original
    /// size. A 5 MiB upload compressed to 1 MiB reports `0.2`.
    pub compression_ratio: f32,

    /// The pixel width of the compressed copy.
    pub width: u32,

    /// The pixel height of the compressed copy.
    pub height: u32,

    pub mime_type: String,
}

/// Builds the artifact for one processed file.
pub fn assemble(
    file: &AcceptedFile,
    file_name: String,
    original_path: String,
    compressed_path: String,
    compressed: &CompressedImage,
) -> ImageArtifact {
    let original_size = file.data.len() as u64;
    let compressed_size = compressed.data.len() as u64;

    let compression_ratio = if original_size == 0 {
        0.0
    } else {
        compressed_size as f32 / original_size as f32
    };

    ImageArtifact {
        original_name: file.name.clone(),
        file_name,
        original_path,
        compressed_path,
        original_size_bytes: original_size,
        compressed_size_bytes: compressed_size,
        compression_ratio,
        width: compressed.width,
        height: compressed.height,
        mime_type: file.kind.as_content_type().to_string(),
    }
}

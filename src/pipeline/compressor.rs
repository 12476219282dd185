use std::io::Cursor;

use bytes::Bytes;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageOutputFormat};
use thiserror::Error;

use crate::config::Bound;

#[derive(Debug, Error)]
pub enum CompressError {
    #[error(transparent)]
    Decode(#[from] image::ImageError),

    #[error("image processing worker exited before responding")]
    WorkerGone,
}

/// The output of one compression pass.
#[derive(Debug)]
pub struct CompressedImage {
    /// The re-encoded JPEG bytes.
    pub data: Bytes,

    /// Dimensions of the compressed output.
    pub width: u32,
    pub height: u32,

    /// Intrinsic dimensions of the uploaded payload, read before any
    /// resize was applied.
    pub original_width: u32,
    pub original_height: u32,
}

/// Decodes the payload, fits it inside the bound without enlargement
/// and re-encodes it as JPEG at the given quality.
///
/// The output codec is always JPEG regardless of the input, so a PNG
/// or GIF upload still produces a `.jpg` compressed copy.
pub fn compress(data: &[u8], bound: Bound, quality: u8) -> Result<CompressedImage, CompressError> {
    let img = image::load_from_memory(data)?;
    let (original_width, original_height) = img.dimensions();

    let resized = if original_width > bound.width || original_height > bound.height {
        let filter = select_filter(original_width, original_height, bound);
        img.resize(bound.width, bound.height, filter)
    } else {
        img
    };

    let (width, height) = resized.dimensions();

    // The JPEG encoder has no alpha channel, so PNG/GIF/WebP uploads
    // are flattened to RGB before encoding.
    let resized = DynamicImage::ImageRgb8(resized.to_rgb8());

    let mut buff = Cursor::new(Vec::new());
    resized.write_to(&mut buff, ImageOutputFormat::Jpeg(quality))?;

    Ok(CompressedImage {
        data: Bytes::from(buff.into_inner()),
        width,
        height,
        original_width,
        original_height,
    })
}

/// Runs [`compress`] on the rayon pool so the decode/resize/encode
/// work never blocks the async runtime, handing the result back over
/// a oneshot.
pub async fn compress_in_background(
    data: Bytes,
    bound: Bound,
    quality: u8,
) -> Result<CompressedImage, CompressError> {
    let (tx, rx) = tokio::sync::oneshot::channel();

    rayon::spawn(move || {
        let result = compress(data.as_ref(), bound, quality);
        let _ = tx.send(result);
    });

    match rx.await {
        Ok(result) => result,
        Err(_) => Err(CompressError::WorkerGone),
    }
}

/// Heavier downscales get away with cheaper filters.
fn select_filter(width: u32, height: u32, bound: Bound) -> FilterType {
    let width_ratio = width as f32 / bound.width as f32;
    let height_ratio = height as f32 / bound.height as f32;
    let max_ratio = width_ratio.max(height_ratio);

    if max_ratio > 2.0 {
        FilterType::Triangle
    } else if max_ratio > 1.5 {
        FilterType::CatmullRom
    } else {
        FilterType::Lanczos3
    }
}

#[cfg(test)]
mod tests {
    use image::{ImageFormat, Rgba, RgbaImage};

    use super::*;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_fn(width, height, |x, y| {
            Rgba([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8, 255])
        }));
        let mut buff = Cursor::new(Vec::new());
        img.write_to(&mut buff, ImageOutputFormat::Png)
            .expect("png encode should succeed");
        buff.into_inner()
    }

    fn bound(width: u32, height: u32) -> Bound {
        Bound { width, height }
    }

    #[test]
    fn test_fits_inside_bound_preserving_aspect() {
        let data = png_bytes(3000, 2000);
        let out = compress(&data, bound(1200, 1200), 80).expect("compress should succeed");

        assert_eq!(out.original_width, 3000);
        assert_eq!(out.original_height, 2000);
        assert_eq!(out.width, 1200);
        assert_eq!(out.height, 800);
    }

    #[test]
    fn test_never_upscales_small_images() {
        let data = png_bytes(640, 480);
        let out = compress(&data, bound(1200, 1200), 80).expect("compress should succeed");

        assert_eq!(out.width, 640);
        assert_eq!(out.height, 480);
    }

    #[test]
    fn test_output_is_always_jpeg() {
        let data = png_bytes(100, 100);
        let out = compress(&data, bound(1200, 1200), 80).expect("compress should succeed");

        let format =
            image::guess_format(out.data.as_ref()).expect("output should be a known format");
        assert_eq!(format, ImageFormat::Jpeg);

        let decoded =
            image::load_from_memory(out.data.as_ref()).expect("output should decode");
        assert_eq!(decoded.dimensions(), (out.width, out.height));
    }

    #[test]
    fn test_garbage_payload_is_a_decode_error() {
        let err = compress(b"definitely not an image", bound(1200, 1200), 80).unwrap_err();
        assert!(matches!(err, CompressError::Decode(_)));
    }

    #[tokio::test]
    async fn test_background_compression_round_trip() {
        let data = Bytes::from(png_bytes(1600, 1600));
        let out = compress_in_background(data, bound(800, 800), 80)
            .await
            .expect("compress should succeed");

        assert_eq!(out.width, 800);
        assert_eq!(out.height, 800);
    }
}

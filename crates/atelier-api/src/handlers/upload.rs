//! Product image upload to local disk, served back under `/uploads`.
//!
//! Every image is decoded, shrunk to fit inside 1200x1200 (never enlarged)
//! and re-encoded as JPEG at quality 85 before it is written.

use crate::auth::AdminUser;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use atelier_core::{ShopError, ShopResult};
use axum::{
    extract::{Multipart, State},
    Json,
};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info, instrument};
use uuid::Uuid;

pub const MIN_IMAGES: usize = 3;
pub const MAX_IMAGES: usize = 10;
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;
/// Whole request cap, enforced by the router
pub const MAX_UPLOAD_BODY: usize = MAX_IMAGES * MAX_IMAGE_BYTES + 1024 * 1024;

/// Longest edge of a stored image, in pixels
pub const MAX_DIMENSION: u32 = 1200;
pub const JPEG_QUALITY: u8 = 85;

const FIELD_NAME: &str = "images";
const SUBDIR: &str = "products";

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub success: bool,
    pub urls: Vec<String>,
    pub count: usize,
}

/// Content types accepted from the admin client
pub fn is_accepted_type(content_type: &str) -> bool {
    matches!(content_type, "image/jpeg" | "image/jpg" | "image/png" | "image/webp")
}

fn check_count(count: usize) -> ShopResult<()> {
    match count {
        0 => Err(ShopError::InvalidRequest("No images provided".to_string())),
        n if n < MIN_IMAGES => Err(ShopError::InvalidRequest(format!(
            "Minimum {MIN_IMAGES} images required"
        ))),
        n if n > MAX_IMAGES => Err(ShopError::InvalidRequest(format!(
            "Maximum {MAX_IMAGES} images allowed"
        ))),
        _ => Ok(()),
    }
}

/// Decode, fit inside `MAX_DIMENSION` and re-encode as JPEG
pub fn normalize_image(bytes: &[u8]) -> ShopResult<Vec<u8>> {
    let decoded = image::load_from_memory(bytes)
        .map_err(|e| ShopError::InvalidRequest(format!("Unreadable image: {e}")))?;

    let fitted = if decoded.width() > MAX_DIMENSION || decoded.height() > MAX_DIMENSION {
        decoded.resize(MAX_DIMENSION, MAX_DIMENSION, FilterType::Lanczos3)
    } else {
        decoded
    };

    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY)
        .encode_image(&fitted.to_rgb8())
        .map_err(|e| ShopError::Internal(format!("encoding jpeg: {e}")))?;
    debug!(width = fitted.width(), height = fitted.height(), bytes = out.len(), "Image normalized");
    Ok(out)
}

async fn read_images(multipart: &mut Multipart) -> ApiResult<Vec<Vec<u8>>> {
    let mut images = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::Body(e.body_text()))?
    {
        if field.name() != Some(FIELD_NAME) {
            continue;
        }
        if images.len() == MAX_IMAGES {
            return Err(ShopError::InvalidRequest(format!("Maximum {MAX_IMAGES} images allowed")).into());
        }

        let content_type = field.content_type().unwrap_or("application/octet-stream").to_string();
        if !is_accepted_type(&content_type) {
            return Err(ShopError::InvalidRequest(format!(
                "Invalid file type: {content_type}. Only JPEG, PNG, and WebP allowed."
            ))
            .into());
        }

        let bytes = field.bytes().await.map_err(|e| ApiError::Body(e.body_text()))?;
        if bytes.len() > MAX_IMAGE_BYTES {
            return Err(ShopError::InvalidRequest("Each image must be less than 5MB".to_string()).into());
        }
        images.push(bytes.to_vec());
    }
    Ok(images)
}

async fn store_image(root: &Path, original: Vec<u8>) -> ShopResult<String> {
    let jpeg = tokio::task::spawn_blocking(move || normalize_image(&original))
        .await
        .map_err(|e| ShopError::Internal(format!("image task failed: {e}")))??;

    let relative = format!("{SUBDIR}/{}.jpg", Uuid::new_v4());
    tokio::fs::write(root.join(&relative), &jpeg)
        .await
        .map_err(|e| ShopError::Storage(format!("writing {relative}: {e}")))?;
    Ok(relative)
}

/// `POST /api/upload`, multipart field `images` repeated 3 to 10 times
#[instrument(skip_all)]
pub async fn upload_images(
    State(state): State<AppState>,
    _admin: AdminUser,
    mut multipart: Multipart,
) -> ApiResult<Json<UploadResponse>> {
    let images = read_images(&mut multipart).await?;
    check_count(images.len())?;

    let root = &state.config.upload_dir;
    tokio::fs::create_dir_all(root.join(SUBDIR))
        .await
        .map_err(|e| ShopError::Storage(format!("creating upload directory: {e}")))?;

    let mut urls = Vec::with_capacity(images.len());
    for original in images {
        let relative = store_image(root, original).await?;
        urls.push(state.upload_url(&relative));
    }

    info!(count = urls.len(), "Product images uploaded");
    Ok(Json(UploadResponse {
        success: true,
        count: urls.len(),
        urls,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, RgbImage};
    use std::io::Cursor;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        RgbImage::from_pixel(width, height, image::Rgb([180, 140, 90]))
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn test_accepted_types() {
        assert!(is_accepted_type("image/jpeg"));
        assert!(is_accepted_type("image/jpg"));
        assert!(is_accepted_type("image/webp"));
        assert!(!is_accepted_type("image/gif"));
    }

    #[test]
    fn test_image_count_bounds() {
        assert!(check_count(0).is_err());
        assert!(check_count(2).is_err());
        assert!(check_count(3).is_ok());
        assert!(check_count(10).is_ok());
        assert!(check_count(11).is_err());
    }

    #[test]
    fn test_large_image_fits_inside_bounds() {
        let jpeg = normalize_image(&png(2000, 1000)).unwrap();

        assert_eq!(image::guess_format(&jpeg).unwrap(), ImageFormat::Jpeg);
        let stored = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((stored.width(), stored.height()), (1200, 600));
    }

    #[test]
    fn test_small_image_is_not_enlarged() {
        let stored = image::load_from_memory(&normalize_image(&png(300, 200)).unwrap()).unwrap();
        assert_eq!((stored.width(), stored.height()), (300, 200));
    }

    #[test]
    fn test_undecodable_bytes_rejected() {
        let err = normalize_image(b"not an image").unwrap_err();
        assert_eq!(err.status_code(), 400);
    }
}

use std::path::Path;

use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::{
    constants::{IMAGE_FORMATS, RECIPE_IMAGE_DIR},
    error::{Error, HtmlError, TypeError},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub extension: &'static str,
    pub bytes: Vec<u8>,
}

/// Decodes `data:image/<format>;base64,<payload>`.
pub fn decode_data_uri(value: &str) -> Result<DecodedImage, TypeError> {
    let rest = value
        .strip_prefix("data:image/")
        .ok_or_else(|| TypeError::new("Image must be a base64 encoded data URI"))?;
    let (format, payload) = rest
        .split_once(";base64,")
        .ok_or_else(|| TypeError::new("Image must be a base64 encoded data URI"))?;

    let extension = IMAGE_FORMATS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(format))
        .map(|(_, extension)| *extension)
        .ok_or_else(|| TypeError::new("Unsupported image format"))?;

    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|_| TypeError::new("Image is not valid base64"))?;
    if bytes.is_empty() {
        return Err(TypeError::new("Image is empty"));
    }

    Ok(DecodedImage { extension, bytes })
}

/// Writes the image below `media_root` and returns its path relative to it.
pub async fn store_image(media_root: &Path, image: &DecodedImage) -> Result<String, Error> {
    let relative = format!(
        "{RECIPE_IMAGE_DIR}/{}.{}",
        uuid::Uuid::new_v4().simple(),
        image.extension
    );
    let target = media_root.join(&relative);

    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(|e| {
            log::error!("Failed to create {}: {e}", parent.display());
            HtmlError::InternalServerError.default()
        })?;
    }
    tokio::fs::write(&target, &image.bytes).await.map_err(|e| {
        log::error!("Failed to write {}: {e}", target.display());
        HtmlError::InternalServerError.default()
    })?;

    Ok(relative)
}

/// Best effort; a missing file is not an error.
pub async fn remove_image(media_root: &Path, relative: &str) {
    if relative.is_empty() || relative.contains("..") {
        return;
    }
    let target = media_root.join(relative);
    if let Err(e) = tokio::fs::remove_file(&target).await {
        log::warn!("Could not remove {}: {e}", target.display());
    }
}

pub fn image_url(media_url: &str, relative: &str) -> String {
    format!("{media_url}{relative}")
}

#[cfg(test)]
mod tests {
    use super::*;

    // 1x1 transparent png
    const PIXEL: &str = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAQAAAC1HAwCAAAAC0lEQVR42mNkYAAAAAYAAjCB0C8AAAAASUVORK5CYII=";

    #[test]
    fn decodes_png_data_uri() {
        let image = decode_data_uri(&format!("data:image/png;base64,{PIXEL}")).unwrap();
        assert_eq!(image.extension, "png");
        assert_eq!(&image.bytes[1..4], b"PNG");
    }

    #[test]
    fn jpeg_maps_to_jpg() {
        let image = decode_data_uri(&format!("data:image/jpeg;base64,{PIXEL}")).unwrap();
        assert_eq!(image.extension, "jpg");
    }

    #[test]
    fn rejects_malformed_uris() {
        assert!(decode_data_uri(PIXEL).is_err());
        assert!(decode_data_uri("data:image/png,abc").is_err());
        assert!(decode_data_uri("data:image/tiff;base64,AAAA").is_err());
        assert!(decode_data_uri("data:image/png;base64,***").is_err());
        assert!(decode_data_uri("data:image/png;base64,").is_err());
    }

    #[tokio::test]
    async fn stores_and_removes_images() {
        let dir = tempfile::tempdir().unwrap();
        let image = decode_data_uri(&format!("data:image/png;base64,{PIXEL}")).unwrap();

        let relative = store_image(dir.path(), &image).await.unwrap();
        assert!(relative.starts_with("recipes/images/"));
        assert!(relative.ends_with(".png"));
        assert_eq!(std::fs::read(dir.path().join(&relative)).unwrap(), image.bytes);
        assert_eq!(image_url("/media/", &relative), format!("/media/{relative}"));

        remove_image(dir.path(), &relative).await;
        assert!(!dir.path().join(&relative).exists());
    }
}

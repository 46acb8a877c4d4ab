//! Profile updates with an optional photo upload
//!
//! Photos are decoded, cropped to a square, resized to 500x500 and stored
//! as JPEG under `<public>/img/users/`.

use std::future::Future;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use axum::extract::{FromRequest, Multipart, Request};
use axum::http::header::CONTENT_TYPE;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use tourbook_core::UserInput;
use uuid::Uuid;

use super::error::ApiError;
use super::extractors::JsonBody;

pub const PHOTO_SIZE: u32 = 500;
pub const JPEG_QUALITY: u8 = 90;

/// An uploaded file still in memory.
#[derive(Debug, Clone)]
pub struct Upload {
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Profile fields plus an optional photo, from multipart or JSON.
#[derive(Debug, Clone, Default)]
pub struct ProfileForm {
    pub input: UserInput,
    pub photo: Option<Upload>,
}

impl<S> FromRequest<S> for ProfileForm
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_multipart = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("multipart/form-data"));

        if !is_multipart {
            let JsonBody(input) = JsonBody::<UserInput>::from_request(req, state).await?;
            return Ok(Self { input, photo: None });
        }

        let mut multipart = Multipart::from_request(req, state)
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?;
        let mut form = Self::default();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?
        {
            let name = field.name().unwrap_or_default().to_owned();
            if name == "photo" {
                let content_type = field.content_type().map(str::to_owned);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(e.body_text()))?;
                if !bytes.is_empty() {
                    form.photo = Some(Upload {
                        content_type,
                        bytes: bytes.to_vec(),
                    });
                }
                continue;
            }

            let value = field
                .text()
                .await
                .map_err(|e| ApiError::bad_request(e.body_text()))?;
            match name.as_str() {
                "name" => form.input.name = Some(value),
                "email" => form.input.email = Some(value),
                "password" => form.input.password = Some(value),
                "passwordConfirm" => form.input.password_confirm = Some(value),
                _ => {}
            }
        }
        Ok(form)
    }
}

/// Name under which a user's new photo is stored.
pub fn photo_file_name(user_id: Uuid, unix_ms: i64) -> String {
    format!("user-{}-{}.jpeg", user_id, unix_ms)
}

/// Decode, crop and resize to the stored JPEG bytes.
pub fn process_photo(upload: &Upload) -> Result<Vec<u8>, ApiError> {
    let is_image = upload
        .content_type
        .as_deref()
        .is_some_and(|ct| ct.starts_with("image/"));
    if !is_image {
        return Err(ApiError::bad_request(
            "Not an image! Please upload only images.",
        ));
    }

    let image = image::load_from_memory(&upload.bytes)
        .map_err(|_| ApiError::bad_request("Not an image! Please upload only images."))?;
    let resized = image
        .resize_to_fill(PHOTO_SIZE, PHOTO_SIZE, FilterType::Lanczos3)
        .to_rgb8();

    let mut out = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY)
        .encode_image(&resized)
        .map_err(|e| ApiError::internal(format!("jpeg encoding failed: {}", e)))?;
    Ok(out.into_inner())
}

/// Process `upload` and write it under `<public_dir>/img/users/`, returning
/// the stored file name.
pub async fn store_user_photo(
    public_dir: &Path,
    user_id: Uuid,
    upload: Upload,
) -> Result<String, ApiError> {
    let jpeg = tokio::task::spawn_blocking(move || process_photo(&upload))
        .await
        .map_err(|e| ApiError::internal(format!("photo task failed: {}", e)))??;

    let dir: PathBuf = public_dir.join("img").join("users");
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| ApiError::internal(format!("creating {} failed: {}", dir.display(), e)))?;

    let file_name = photo_file_name(user_id, chrono::Utc::now().timestamp_millis());
    let path = dir.join(&file_name);
    tokio::fs::write(&path, jpeg)
        .await
        .map_err(|e| ApiError::internal(format!("writing {} failed: {}", path.display(), e)))?;

    tracing::debug!(user = %user_id, file = %file_name, "user photo stored");
    Ok(file_name)
}

/// Remove a stored photo. Failures are only logged.
pub async fn discard_user_photo(public_dir: &Path, file_name: &str) {
    let path = public_dir.join("img").join("users").join(file_name);
    if let Err(e) = tokio::fs::remove_file(&path).await {
        tracing::warn!(file = %path.display(), "removing photo failed: {}", e);
    }
}

/// Store `upload`, then hand its file name to `persist`. The file is removed
/// again when `persist` fails.
pub async fn with_stored_photo<T, F, Fut>(
    public_dir: &Path,
    user_id: Uuid,
    upload: Upload,
    persist: F,
) -> Result<T, ApiError>
where
    F: FnOnce(String) -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    let file_name = store_user_photo(public_dir, user_id, upload).await?;
    match persist(file_name.clone()).await {
        Ok(value) => Ok(value),
        Err(e) => {
            discard_user_photo(public_dir, &file_name).await;
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage};

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([200, 80, 40]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn file_name_format() {
        let id = Uuid::nil();
        assert_eq!(
            photo_file_name(id, 1_700_000_000_000),
            "user-00000000-0000-0000-0000-000000000000-1700000000000.jpeg"
        );
    }

    #[test]
    fn photo_is_squared_to_500() {
        let upload = Upload {
            content_type: Some("image/png".into()),
            bytes: png(800, 600),
        };
        let jpeg = process_photo(&upload).unwrap();
        let decoded = image::load_from_memory_with_format(&jpeg, ImageFormat::Jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (500, 500));
    }

    #[test]
    fn non_images_are_rejected() {
        let upload = Upload {
            content_type: Some("text/plain".into()),
            bytes: b"hello".to_vec(),
        };
        assert!(matches!(process_photo(&upload), Err(ApiError::BadRequest(_))));

        let upload = Upload {
            content_type: Some("image/png".into()),
            bytes: b"definitely not a png".to_vec(),
        };
        assert!(matches!(process_photo(&upload), Err(ApiError::BadRequest(_))));
    }

    #[tokio::test]
    async fn stores_under_img_users() {
        let dir = tempfile::tempdir().unwrap();
        let upload = Upload {
            content_type: Some("image/png".into()),
            bytes: png(64, 64),
        };
        let name = store_user_photo(dir.path(), Uuid::nil(), upload).await.unwrap();
        assert!(name.starts_with("user-00000000-0000-0000-0000-000000000000-"));
        assert!(dir.path().join("img/users").join(&name).exists());
    }

    #[tokio::test]
    async fn photo_is_kept_when_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let upload = Upload {
            content_type: Some("image/png".into()),
            bytes: png(32, 32),
        };
        let name = with_stored_photo(dir.path(), Uuid::nil(), upload, |name| async move {
            Ok::<_, ApiError>(name)
        })
        .await
        .unwrap();
        assert!(dir.path().join("img/users").join(&name).exists());
    }

    #[tokio::test]
    async fn photo_is_removed_when_persist_fails() {
        let dir = tempfile::tempdir().unwrap();
        let upload = Upload {
            content_type: Some("image/png".into()),
            bytes: png(32, 32),
        };
        let err = with_stored_photo(dir.path(), Uuid::nil(), upload, |_| async {
            Err::<(), _>(ApiError::Conflict("Duplicate email".into()))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));

        let left = std::fs::read_dir(dir.path().join("img/users")).unwrap().count();
        assert_eq!(left, 0);
    }
}

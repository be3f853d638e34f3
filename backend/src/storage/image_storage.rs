use shared::ImageReference;
use uuid::Uuid;

use super::s3_service::{S3Service, S3ServiceError};
use crate::analysis::upload::ImageUpload;

/// Decides how a report's image is referenced: embedded as a data URI, or
/// uploaded to the bucket with the report id as object name.
#[derive(Clone)]
pub enum ImageStorage {
    Inline,
    S3(S3Service),
}

impl ImageStorage {
    pub async fn store(
        &self,
        owner_id: Uuid,
        report_id: Uuid,
        image: &ImageUpload,
    ) -> Result<ImageReference, S3ServiceError> {
        match self {
            ImageStorage::Inline => Ok(ImageReference::Inline(image.data_uri())),
            ImageStorage::S3(s3) => {
                let key = S3Service::generate_s3_key(owner_id, report_id, image.kind().extension());
                s3.upload_image(image.bytes(), &key, image.kind().mime_type())
                    .await?;
                log::info!("Uploaded image for report {} to {}", report_id, key);
                Ok(ImageReference::Stored(s3.object_url(&key)))
            }
        }
    }

    /// Removes an uploaded image whose report was never saved.
    pub async fn discard(
        &self,
        owner_id: Uuid,
        report_id: Uuid,
        image: &ImageUpload,
    ) -> Result<(), S3ServiceError> {
        match self {
            ImageStorage::Inline => Ok(()),
            ImageStorage::S3(s3) => {
                let key = S3Service::generate_s3_key(owner_id, report_id, image.kind().extension());
                s3.delete_image(&key).await?;
                log::info!("Removed unsaved image {}", key);
                Ok(())
            }
        }
    }

    /// Removes every stored image of the owner. Returns the number removed.
    pub async fn purge_owner(&self, owner_id: Uuid) -> Result<usize, S3ServiceError> {
        match self {
            ImageStorage::Inline => Ok(0),
            ImageStorage::S3(s3) => {
                let keys = s3.list_keys(&S3Service::owner_prefix(owner_id)).await?;
                if !keys.is_empty() {
                    s3.delete_images(&keys).await?;
                }
                Ok(keys.len())
            }
        }
    }
}

use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;
use uuid::Uuid;

#[derive(Clone)]
pub struct S3Service {
    client: Client,
    bucket_name: String,
}

#[derive(Debug, thiserror::Error)]
pub enum S3ServiceError {
    #[error("S3 error: {0}")]
    S3(String),
}

impl S3Service {
    pub fn new(client: Client, bucket_name: String) -> Self {
        Self {
            client,
            bucket_name,
        }
    }

    pub fn owner_prefix(owner_id: Uuid) -> String {
        format!("reports/{}/", owner_id)
    }

    pub fn generate_s3_key(owner_id: Uuid, report_id: Uuid, file_extension: &str) -> String {
        format!("{}{}.{}", Self::owner_prefix(owner_id), report_id, file_extension)
    }

    pub fn object_url(&self, s3_key: &str) -> String {
        format!("s3://{}/{}", self.bucket_name, s3_key)
    }

    pub async fn upload_image(
        &self,
        image_data: &[u8],
        s3_key: &str,
        mime_type: &str,
    ) -> Result<(), S3ServiceError> {
        let body = ByteStream::from(image_data.to_vec());

        self.client
            .put_object()
            .bucket(&self.bucket_name)
            .key(s3_key)
            .body(body)
            .content_type(mime_type)
            .send()
            .await
            .map_err(|e| S3ServiceError::S3(e.to_string()))?;

        Ok(())
    }

    pub async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, S3ServiceError> {
        let mut keys = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let output = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket_name)
                .prefix(prefix)
                .set_continuation_token(continuation_token.take())
                .send()
                .await
                .map_err(|e| S3ServiceError::S3(e.to_string()))?;

            keys.extend(
                output
                    .contents()
                    .iter()
                    .filter_map(|object| object.key().map(str::to_string)),
            );

            match output.next_continuation_token() {
                Some(token) => continuation_token = Some(token.to_string()),
                None => break,
            }
        }

        Ok(keys)
    }

    pub async fn delete_image(&self, s3_key: &str) -> Result<(), S3ServiceError> {
        self.client
            .delete_object()
            .bucket(&self.bucket_name)
            .key(s3_key)
            .send()
            .await
            .map_err(|e| S3ServiceError::S3(e.to_string()))?;

        Ok(())
    }

    pub async fn delete_images(&self, s3_keys: &[String]) -> Result<(), S3ServiceError> {
        const BATCH_SIZE: usize = 15;

        for chunk in s3_keys.chunks(BATCH_SIZE) {
            futures::future::try_join_all(chunk.iter().map(|key| self.delete_image(key))).await?;
        }

        Ok(())
    }
}

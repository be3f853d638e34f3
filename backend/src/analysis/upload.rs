use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::ImageFormat;

pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum UploadError {
    #[error("No image data received")]
    Empty,
    #[error("Unsupported image type: {0}")]
    UnsupportedType(String),
    #[error("Image too large: {0} bytes")]
    TooLarge(usize),
    #[error("Image content does not match declared type {declared}")]
    ContentMismatch { declared: &'static str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Jpeg,
    Png,
    Webp,
}

impl ImageKind {
    pub fn from_mime(mime_type: &str) -> Result<Self, UploadError> {
        match mime_type.trim().to_ascii_lowercase().as_str() {
            "image/jpeg" | "image/jpg" => Ok(ImageKind::Jpeg),
            "image/png" => Ok(ImageKind::Png),
            "image/webp" => Ok(ImageKind::Webp),
            other => Err(UploadError::UnsupportedType(other.to_string())),
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageKind::Jpeg => "image/jpeg",
            ImageKind::Png => "image/png",
            ImageKind::Webp => "image/webp",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ImageKind::Jpeg => "jpg",
            ImageKind::Png => "png",
            ImageKind::Webp => "webp",
        }
    }

    fn format(&self) -> ImageFormat {
        match self {
            ImageKind::Jpeg => ImageFormat::Jpeg,
            ImageKind::Png => ImageFormat::Png,
            ImageKind::Webp => ImageFormat::WebP,
        }
    }
}

/// One validated user image: raw bytes plus the declared and sniffed type.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    bytes: Vec<u8>,
    kind: ImageKind,
    file_name: String,
}

impl ImageUpload {
    pub fn new(
        bytes: Vec<u8>,
        mime_type: &str,
        file_name: Option<String>,
    ) -> Result<Self, UploadError> {
        let kind = ImageKind::from_mime(mime_type)?;
        if bytes.is_empty() {
            return Err(UploadError::Empty);
        }
        if bytes.len() > MAX_IMAGE_BYTES {
            return Err(UploadError::TooLarge(bytes.len()));
        }
        match image::guess_format(&bytes) {
            Ok(format) if format == kind.format() => {}
            _ => {
                return Err(UploadError::ContentMismatch {
                    declared: kind.mime_type(),
                });
            }
        }

        let file_name = file_name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| format!("image.{}", kind.extension()));

        Ok(Self {
            bytes,
            kind,
            file_name,
        })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn kind(&self) -> ImageKind {
        self.kind
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn data_uri(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.kind.mime_type(),
            STANDARD.encode(&self.bytes)
        )
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_supported_types_with_matching_content() {
        let upload = ImageUpload::new(fixtures::PNG.to_vec(), "image/png", None).unwrap();
        assert_eq!(upload.kind(), ImageKind::Png);
        assert_eq!(upload.file_name(), "image.png");
        assert!(upload.data_uri().starts_with("data:image/png;base64,"));

        let jpeg = ImageUpload::new(fixtures::JPEG.to_vec(), "IMAGE/JPG", Some("leaf.jpg".into()));
        assert_eq!(jpeg.unwrap().file_name(), "leaf.jpg");
    }

    #[test]
    fn rejects_gif_and_other_types() {
        let err = ImageUpload::new(b"GIF89a".to_vec(), "image/gif", None).unwrap_err();
        assert_eq!(err, UploadError::UnsupportedType("image/gif".into()));
    }

    #[test]
    fn rejects_content_that_does_not_match_the_declared_type() {
        let err = ImageUpload::new(fixtures::JPEG.to_vec(), "image/png", None).unwrap_err();
        assert_eq!(
            err,
            UploadError::ContentMismatch {
                declared: "image/png"
            }
        );
    }

    #[test]
    fn rejects_empty_and_oversized_payloads() {
        assert_eq!(
            ImageUpload::new(Vec::new(), "image/webp", None).unwrap_err(),
            UploadError::Empty
        );
        let mut huge = fixtures::PNG.to_vec();
        huge.resize(MAX_IMAGE_BYTES + 1, 0);
        assert_eq!(
            ImageUpload::new(huge, "image/png", None).unwrap_err(),
            UploadError::TooLarge(MAX_IMAGE_BYTES + 1)
        );
    }
}

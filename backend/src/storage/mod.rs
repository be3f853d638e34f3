pub mod image_storage;
pub mod s3_service;

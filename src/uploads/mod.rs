//! Image upload validation and storage

mod store;

pub use store::{FsObjectStore, ObjectStore};

use rand::RngExt;
use thiserror::Error;

use crate::config::UploadConfig;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("File size may not exceed {0}MB")]
    TooLarge(usize),
    #[error("Only JPEG, PNG, GIF and WebP images can be uploaded")]
    UnsupportedType(String),
    #[error("No file was provided")]
    MissingFile,
}

/// Validate a candidate upload against the configured limits
pub fn validate_upload(
    content_type: &str,
    len: usize,
    config: &UploadConfig,
) -> Result<(), UploadError> {
    if len > config.max_bytes {
        return Err(UploadError::TooLarge(config.max_bytes / (1024 * 1024)));
    }

    let allowed = config
        .allowed_types
        .iter()
        .any(|t| t.eq_ignore_ascii_case(content_type));
    if !allowed {
        return Err(UploadError::UnsupportedType(content_type.to_string()));
    }

    Ok(())
}

/// Generate a stored object name: `image-{unix_millis}-{rand7}.{ext}`
///
/// The extension is taken from the original filename, `bin` when absent.
pub fn object_name(original_filename: &str, now_millis: i64) -> String {
    const ALPHANUMERIC: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

    let ext = original_filename
        .rsplit('.')
        .next()
        .filter(|ext| !ext.is_empty() && ext.len() <= 8 && *ext != original_filename)
        .unwrap_or("bin");

    let mut rng = rand::rng();
    let suffix: String = (0..7)
        .map(|_| ALPHANUMERIC[rng.random_range(0..ALPHANUMERIC.len())] as char)
        .collect();

    format!("image-{}-{}.{}", now_millis, suffix, ext)
}

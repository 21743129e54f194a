use chrono::{DateTime, Utc};
use wastelens_atoms::StoreError;

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

/// An image file as handed over by the caller.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub fn new(name: impl Into<String>, content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }

    /// A frame grabbed from the camera, named after its capture time.
    pub fn camera_capture(bytes: Vec<u8>, taken_at: DateTime<Utc>) -> Self {
        Self::new(
            format!("camera_capture_{}.jpg", taken_at.timestamp_millis()),
            "image/jpeg",
            bytes,
        )
    }

    /// File extension for object keys: from the name, else from the MIME subtype.
    pub fn extension(&self) -> String {
        let from_name = self
            .name
            .rsplit_once('.')
            .map(|(_, ext)| ext)
            .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()));

        match from_name {
            Some(ext) => ext.to_ascii_lowercase(),
            None => match self.content_type.strip_prefix("image/") {
                Some("jpeg") => "jpg".to_string(),
                Some(subtype) if !subtype.is_empty() => subtype.to_ascii_lowercase(),
                _ => "bin".to_string(),
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct UploadLimits {
    pub max_bytes: usize,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

/// Pre-upload checks. Run by callers before `ImageStoreClient::upload`,
/// which stores whatever it is given.
pub fn validate_upload(file: &UploadFile, limits: &UploadLimits) -> Result<(), StoreError> {
    if !file.content_type.starts_with("image/") {
        return Err(StoreError::InvalidUpload(format!(
            "Invalid file type: {}",
            file.content_type
        )));
    }

    if file.bytes.is_empty() {
        return Err(StoreError::InvalidUpload("File is empty".to_string()));
    }

    if file.bytes.len() > limits.max_bytes {
        return Err(StoreError::InvalidUpload(format!(
            "File too large: {} bytes (max {} bytes)",
            file.bytes.len(),
            limits.max_bytes
        )));
    }

    image::guess_format(&file.bytes).map_err(|_| {
        StoreError::InvalidUpload(format!("{} is not a recognised image", file.name))
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const PNG_HEADER: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";
    const JPEG_HEADER: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F'];

    #[test]
    fn accepts_small_images() {
        let png = UploadFile::new("bin.png", "image/png", PNG_HEADER.to_vec());
        let jpeg = UploadFile::new("bin.jpg", "image/jpeg", JPEG_HEADER.to_vec());
        assert!(validate_upload(&png, &UploadLimits::default()).is_ok());
        assert!(validate_upload(&jpeg, &UploadLimits::default()).is_ok());
    }

    #[test]
    fn rejects_non_image_type() {
        let file = UploadFile::new("notes.txt", "text/plain", b"hello".to_vec());
        assert_matches!(
            validate_upload(&file, &UploadLimits::default()),
            Err(StoreError::InvalidUpload(msg)) if msg.contains("text/plain")
        );
    }

    #[test]
    fn rejects_oversized_file() {
        let mut bytes = PNG_HEADER.to_vec();
        bytes.resize(DEFAULT_MAX_UPLOAD_BYTES + 1, 0);
        let file = UploadFile::new("huge.png", "image/png", bytes);
        assert_matches!(
            validate_upload(&file, &UploadLimits::default()),
            Err(StoreError::InvalidUpload(msg)) if msg.contains("too large")
        );
    }

    #[test]
    fn rejects_bytes_that_are_not_an_image() {
        let file = UploadFile::new("fake.png", "image/png", b"definitely not a png".to_vec());
        assert_matches!(
            validate_upload(&file, &UploadLimits::default()),
            Err(StoreError::InvalidUpload(_))
        );
    }

    #[test]
    fn rejects_empty_file() {
        let file = UploadFile::new("empty.png", "image/png", Vec::new());
        assert_matches!(
            validate_upload(&file, &UploadLimits::default()),
            Err(StoreError::InvalidUpload(_))
        );
    }

    #[test]
    fn extension_prefers_file_name() {
        assert_eq!(UploadFile::new("Photo.JPG", "image/png", vec![]).extension(), "jpg");
        assert_eq!(UploadFile::new("capture", "image/jpeg", vec![]).extension(), "jpg");
        assert_eq!(UploadFile::new("capture", "image/webp", vec![]).extension(), "webp");
        assert_eq!(UploadFile::new("capture", "application/octet-stream", vec![]).extension(), "bin");
    }

    #[test]
    fn camera_capture_is_named_by_timestamp() {
        let taken_at = DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let file = UploadFile::camera_capture(JPEG_HEADER.to_vec(), taken_at);
        assert_eq!(file.name, "camera_capture_1714557600000.jpg");
        assert_eq!(file.content_type, "image/jpeg");
    }
}

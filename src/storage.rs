//! Local storage for uploaded product images.

use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::error::{Result, StoreError};

const ALLOWED: [(&str, &str); 4] = [
    ("image/png", "png"),
    ("image/jpeg", "jpg"),
    ("image/webp", "webp"),
    ("image/gif", "gif"),
];

#[derive(Debug, Clone)]
pub struct ImageStore {
    root: PathBuf,
    public_base_url: String,
    max_bytes: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    pub path: PathBuf,
    pub url: String,
}

impl ImageStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: &str, max_bytes: usize) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
            max_bytes,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Validates and writes an image under `products/`. The file name is a
    /// fresh UUID. The leading bytes must match the type the client declared.
    pub async fn save_product_image(
        &self,
        content_type: Option<&str>,
        file_name: Option<&str>,
        bytes: &[u8],
    ) -> Result<StoredImage> {
        if bytes.is_empty() {
            return Err(StoreError::validation("uploaded file is empty"));
        }
        if bytes.len() > self.max_bytes {
            return Err(StoreError::PayloadTooLarge(self.max_bytes));
        }
        let declared = declared_extension(content_type, file_name).ok_or_else(|| {
            StoreError::validation("unsupported image type, expected png, jpeg, webp or gif")
        })?;
        let extension = sniff_extension(bytes)
            .filter(|sniffed| *sniffed == declared)
            .ok_or_else(|| StoreError::validation(format!("file content is not a valid {declared} image")))?;

        let dir = self.root.join("products");
        tokio::fs::create_dir_all(&dir).await?;
        let name = format!("{}.{extension}", Uuid::new_v4());
        let path = dir.join(&name);
        tokio::fs::write(&path, bytes).await?;
        tracing::info!(path = %path.display(), bytes = bytes.len(), "stored product image");

        Ok(StoredImage { url: format!("{}/uploads/products/{name}", self.public_base_url), path })
    }
}

fn allowed_extension(mime: &str) -> Option<&'static str> {
    ALLOWED.iter().find(|(allowed, _)| *allowed == mime).map(|(_, ext)| *ext)
}

/// Type claimed by the client: the content type, or the file name when the
/// content type is absent or generic.
fn declared_extension(content_type: Option<&str>, file_name: Option<&str>) -> Option<&'static str> {
    if let Some(content_type) = content_type {
        let essence = content_type.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
        if essence != "application/octet-stream" {
            return allowed_extension(&essence);
        }
    }
    let guessed = mime_guess::from_path(file_name?).first()?;
    allowed_extension(guessed.essence_str())
}

/// Type the leading bytes actually carry.
fn sniff_extension(bytes: &[u8]) -> Option<&'static str> {
    match bytes {
        [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, ..] => Some("png"),
        [0xFF, 0xD8, 0xFF, ..] => Some("jpg"),
        [b'G', b'I', b'F', b'8', b'7' | b'9', b'a', ..] => Some("gif"),
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => Some("webp"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG: &[u8] = b"\x89PNG\r\n\x1a\nIHDR";

    #[test]
    fn declared_type_comes_from_content_type_then_file_name() {
        assert_eq!(declared_extension(Some("image/jpeg"), None), Some("jpg"));
        assert_eq!(declared_extension(Some("image/PNG; charset=binary"), None), Some("png"));
        assert_eq!(declared_extension(None, Some("photo.WEBP")), Some("webp"));
        assert_eq!(declared_extension(Some("application/octet-stream"), Some("a.gif")), Some("gif"));
        assert_eq!(declared_extension(Some("text/html"), Some("a.png")), None);
        assert_eq!(declared_extension(None, Some("notes.txt")), None);
    }

    #[test]
    fn sniffing_reads_signatures() {
        assert_eq!(sniff_extension(PNG), Some("png"));
        assert_eq!(sniff_extension(b"\xff\xd8\xff\xe0JFIF"), Some("jpg"));
        assert_eq!(sniff_extension(b"GIF89a\x01\x00"), Some("gif"));
        assert_eq!(sniff_extension(b"RIFF\x10\x00\x00\x00WEBPVP8 "), Some("webp"));
        assert_eq!(sniff_extension(b"RIFF\x10\x00\x00\x00WAVEfmt "), None);
        assert_eq!(sniff_extension(b"<html><script>"), None);
    }

    #[tokio::test]
    async fn content_must_match_declared_type() {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(dir.path(), "http://localhost", 1024);

        let err = store.save_product_image(Some("image/png"), Some("x.png"), b"<html></html>").await.unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
        let err = store.save_product_image(Some("image/jpeg"), None, PNG).await.unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
        assert!(!dir.path().join("products").exists());
    }

    #[tokio::test]
    async fn saves_under_products_with_public_url() {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(dir.path(), "https://shop.example.com/", 1024);

        let stored = store.save_product_image(Some("image/png"), Some("x.png"), PNG).await.unwrap();

        assert!(stored.path.starts_with(dir.path().join("products")));
        assert!(stored.url.starts_with("https://shop.example.com/uploads/products/"));
        assert!(stored.url.ends_with(".png"));
        assert_eq!(tokio::fs::read(&stored.path).await.unwrap(), PNG);
    }

    #[tokio::test]
    async fn rejects_oversized_and_empty_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(dir.path(), "http://localhost", 4);

        let err = store.save_product_image(Some("image/png"), None, PNG).await.unwrap_err();
        assert!(matches!(err, StoreError::PayloadTooLarge(4)));
        let err = store.save_product_image(Some("image/png"), None, b"").await.unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }
}

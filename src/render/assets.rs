//! Asset resolution: locates and decodes background and layer images.
//!
//! `AssetResolver` handles all image fetching concerns so that the painting
//! backends stay pure functions of already-decoded pixels.
//!
//! References resolve as follows:
//!
//! | Reference | Source |
//! |-----------|--------|
//! | `http://…`, `https://…` | downloaded with the shared HTTP client |
//! | absolute path | read as-is |
//! | relative path | `<uploads>/<ref>` if it exists, else the path as given |

use image::DynamicImage;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::CertError;

/// Where an asset reference points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetLocation {
    Url(String),
    File(PathBuf),
}

/// Resolves template asset references against the uploads directory.
#[derive(Debug, Clone)]
pub struct AssetResolver {
    uploads_dir: PathBuf,
    http_client: reqwest::Client,
}

impl AssetResolver {
    pub fn new(uploads_dir: impl Into<PathBuf>) -> Result<Self, CertError> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("certpress/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| CertError::Image(format!("HTTP client error: {}", e)))?;
        Ok(Self {
            uploads_dir: uploads_dir.into(),
            http_client,
        })
    }

    pub fn uploads_dir(&self) -> &Path {
        &self.uploads_dir
    }

    /// Classify a reference without touching the network.
    pub fn locate(&self, reference: &str) -> AssetLocation {
        if reference.starts_with("http://") || reference.starts_with("https://") {
            return AssetLocation::Url(reference.to_string());
        }
        let path = Path::new(reference);
        if path.is_absolute() {
            return AssetLocation::File(path.to_path_buf());
        }
        let uploaded = self.uploads_dir.join(path);
        if uploaded.exists() {
            AssetLocation::File(uploaded)
        } else {
            AssetLocation::File(path.to_path_buf())
        }
    }

    /// Fetch the raw bytes behind a reference.
    pub async fn fetch_bytes(&self, reference: &str) -> Result<Vec<u8>, CertError> {
        match self.locate(reference) {
            AssetLocation::Url(url) => {
                let response = self
                    .http_client
                    .get(&url)
                    .send()
                    .await
                    .map_err(|e| CertError::Image(format!("Failed to download {}: {}", url, e)))?;
                if !response.status().is_success() {
                    return Err(CertError::Image(format!(
                        "Failed to download {}: HTTP {}",
                        url,
                        response.status()
                    )));
                }
                let bytes = response
                    .bytes()
                    .await
                    .map_err(|e| CertError::Image(format!("Failed to read image data: {}", e)))?;
                Ok(bytes.to_vec())
            }
            AssetLocation::File(path) => tokio::fs::read(&path).await.map_err(|e| {
                CertError::Image(format!("Failed to read {}: {}", path.display(), e))
            }),
        }
    }

    /// Fetch and decode an image.
    pub async fn load_image(&self, reference: &str) -> Result<DynamicImage, CertError> {
        let bytes = self.fetch_bytes(reference).await?;
        image::load_from_memory(&bytes)
            .map_err(|e| CertError::Image(format!("Failed to decode {}: {}", reference, e)))
    }

    /// Local path of a document reference (source PDFs must be on disk).
    pub fn local_path(&self, reference: &str) -> Result<PathBuf, CertError> {
        match self.locate(reference) {
            AssetLocation::File(path) if path.exists() => Ok(path),
            AssetLocation::File(path) => Err(CertError::Overlay(format!(
                "Source document not found: {}",
                path.display()
            ))),
            AssetLocation::Url(url) => Err(CertError::Overlay(format!(
                "Source document must be a local file, got {}",
                url
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn test_locate() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bg.png"), b"x").unwrap();
        let resolver = AssetResolver::new(dir.path()).unwrap();

        assert_eq!(
            resolver.locate("https://example.com/a.png"),
            AssetLocation::Url("https://example.com/a.png".to_string())
        );
        assert_eq!(
            resolver.locate("bg.png"),
            AssetLocation::File(dir.path().join("bg.png"))
        );
        assert_eq!(
            resolver.locate("elsewhere/x.png"),
            AssetLocation::File(PathBuf::from("elsewhere/x.png"))
        );
        assert_eq!(
            resolver.locate("/abs/x.png"),
            AssetLocation::File(PathBuf::from("/abs/x.png"))
        );
    }

    #[tokio::test]
    async fn test_load_uploaded_image() {
        let dir = tempfile::tempdir().unwrap();
        let img = RgbaImage::from_pixel(4, 3, Rgba([10, 20, 30, 255]));
        img.save(dir.path().join("logo.png")).unwrap();

        let resolver = AssetResolver::new(dir.path()).unwrap();
        let loaded = resolver.load_image("logo.png").await.unwrap();
        assert_eq!((loaded.width(), loaded.height()), (4, 3));
        assert!(resolver.load_image("missing.png").await.is_err());
    }

    #[test]
    fn test_local_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("form.pdf"), b"%PDF").unwrap();
        let resolver = AssetResolver::new(dir.path()).unwrap();
        assert_eq!(resolver.local_path("form.pdf").unwrap(), dir.path().join("form.pdf"));
        assert!(resolver.local_path("nope.pdf").is_err());
        assert!(resolver.local_path("http://x/y.pdf").is_err());
    }
}

use chrono::{DateTime, Duration, Utc};
use image::{DynamicImage, ImageFormat};
use sha2::{Digest, Sha256};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub const ALLOWED_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to encode image: {0}")]
    Encode(#[from] image::ImageError),
    #[error("Invalid file format")]
    InvalidFormat,
    #[error("File too large")]
    FileTooLarge,
}

/// The two flat directories images live in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageArea {
    Uploads,
    Results,
}

impl StorageArea {
    pub fn url_prefix(&self) -> &'static str {
        match self {
            StorageArea::Uploads => "/api/images/uploads",
            StorageArea::Results => "/api/images/results",
        }
    }
}

/// Derived artifacts share the upload's identifier behind a fixed prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    SuperResolved,
    Translated,
}

impl ArtifactKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            ArtifactKind::SuperResolved => "sr",
            ArtifactKind::Translated => "cg",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredImage {
    pub id: Uuid,
    pub area: StorageArea,
    pub file_name: String,
    pub path: PathBuf,
    pub sha256: String,
}

impl StoredImage {
    pub fn url(&self) -> String {
        format!("{}/{}", self.area.url_prefix(), self.file_name)
    }

    pub fn extension(&self) -> &str {
        self.file_name.rsplit('.').next().unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub struct ImageStore {
    uploads_dir: PathBuf,
    results_dir: PathBuf,
    max_upload_bytes: usize,
}

impl ImageStore {
    pub fn new(
        uploads_dir: impl Into<PathBuf>,
        results_dir: impl Into<PathBuf>,
        max_upload_bytes: usize,
    ) -> Result<Self, StorageError> {
        let store = Self {
            uploads_dir: uploads_dir.into(),
            results_dir: results_dir.into(),
            max_upload_bytes,
        };
        std::fs::create_dir_all(&store.uploads_dir)?;
        std::fs::create_dir_all(&store.results_dir)?;
        Ok(store)
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_bytes
    }

    pub fn dir(&self, area: StorageArea) -> &Path {
        match area {
            StorageArea::Uploads => &self.uploads_dir,
            StorageArea::Results => &self.results_dir,
        }
    }

    pub fn calculate_image_hash(image_data: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(image_data);
        hex::encode(hasher.finalize())
    }

    /// Returns the lowercased extension when the client filename carries an
    /// allow-listed one.
    pub fn allowed_extension(filename: &str) -> Option<String> {
        let (_, extension) = filename.rsplit_once('.')?;
        let extension = extension.to_ascii_lowercase();
        ALLOWED_EXTENSIONS
            .contains(&extension.as_str())
            .then_some(extension)
    }

    pub fn output_format(extension: &str) -> Result<ImageFormat, StorageError> {
        match extension {
            "png" => Ok(ImageFormat::Png),
            "jpg" | "jpeg" => Ok(ImageFormat::Jpeg),
            _ => Err(StorageError::InvalidFormat),
        }
    }

    pub fn validate_image_size(&self, image_data: &[u8]) -> Result<(), StorageError> {
        if image_data.len() > self.max_upload_bytes {
            return Err(StorageError::FileTooLarge);
        }
        Ok(())
    }

    /// Stores the raw upload under a fresh identifier.
    pub fn save_upload(&self, image_data: &[u8], extension: &str) -> Result<StoredImage, StorageError> {
        self.validate_image_size(image_data)?;
        if !ALLOWED_EXTENSIONS.contains(&extension) {
            return Err(StorageError::InvalidFormat);
        }

        let id = Uuid::new_v4();
        let file_name = format!("{}.{}", id, extension);
        let path = self.uploads_dir.join(&file_name);
        std::fs::write(&path, image_data)?;

        let stored = StoredImage {
            id,
            area: StorageArea::Uploads,
            file_name,
            path,
            sha256: Self::calculate_image_hash(image_data),
        };
        log::info!(
            "Stored upload {} ({} bytes, sha256 {})",
            stored.file_name,
            image_data.len(),
            stored.sha256
        );
        Ok(stored)
    }

    /// Encodes a derived image next to the results of the given upload.
    pub fn save_artifact(
        &self,
        source: &StoredImage,
        kind: ArtifactKind,
        image: &DynamicImage,
    ) -> Result<StoredImage, StorageError> {
        let extension = source.extension();
        let format = Self::output_format(extension)?;
        let image = match format {
            // JPEG has no alpha or 16-bit support.
            ImageFormat::Jpeg => DynamicImage::ImageRgb8(image.to_rgb8()),
            _ => image.clone(),
        };

        let mut buffer = Cursor::new(Vec::new());
        image.write_to(&mut buffer, format)?;
        let bytes = buffer.into_inner();

        let file_name = format!("{}_{}", kind.prefix(), source.file_name);
        let path = self.results_dir.join(&file_name);
        std::fs::write(&path, &bytes)?;

        log::debug!("Wrote {} ({} bytes)", path.display(), bytes.len());
        Ok(StoredImage {
            id: source.id,
            area: StorageArea::Results,
            file_name,
            path,
            sha256: Self::calculate_image_hash(&bytes),
        })
    }

    /// Maps a public file name to a path inside `area`. Anything that is not a
    /// plain file name is refused.
    pub fn resolve(&self, area: StorageArea, file_name: &str) -> Option<PathBuf> {
        let plain = !file_name.is_empty()
            && !file_name.starts_with('.')
            && !file_name.contains(['/', '\\', '\0']);
        if !plain {
            return None;
        }
        let path = self.dir(area).join(file_name);
        path.is_file().then_some(path)
    }

    pub fn remove(&self, image: &StoredImage) {
        if let Err(e) = std::fs::remove_file(&image.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::warn!("Failed to remove {}: {}", image.path.display(), e);
            }
        }
    }

    /// Deletes files in both areas last modified before `now - max_age`.
    /// A failure on one entry is logged and the sweep moves on.
    pub fn sweep_expired(&self, max_age: Duration) -> Result<usize, StorageError> {
        let Some(cutoff) = Utc::now().checked_sub_signed(max_age) else {
            return Ok(0);
        };
        let mut removed = 0;
        for area in [StorageArea::Uploads, StorageArea::Results] {
            removed += sweep_entries(std::fs::read_dir(self.dir(area))?, cutoff);
        }
        Ok(removed)
    }
}

fn sweep_entries<I>(entries: I, cutoff: DateTime<Utc>) -> usize
where
    I: IntoIterator<Item = std::io::Result<std::fs::DirEntry>>,
{
    let mut removed = 0;
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("Retention sweep could not read a directory entry: {}", e);
                continue;
            }
        };
        match expire_entry(&entry, cutoff) {
            Ok(true) => removed += 1,
            Ok(false) => {}
            // Removed by someone else since the listing.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => log::warn!("Retention sweep skipped {}: {}", entry.path().display(), e),
        }
    }
    removed
}

fn expire_entry(entry: &std::fs::DirEntry, cutoff: DateTime<Utc>) -> std::io::Result<bool> {
    let metadata = entry.metadata()?;
    if !metadata.is_file() {
        return Ok(false);
    }
    let modified: DateTime<Utc> = metadata.modified()?.into();
    if modified >= cutoff {
        return Ok(false);
    }
    std::fs::remove_file(entry.path())?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> ImageStore {
        ImageStore::new(dir.path().join("uploads"), dir.path().join("results"), 1024).unwrap()
    }

    #[test]
    fn test_allowed_extension() {
        assert_eq!(ImageStore::allowed_extension("scan.PNG"), Some("png".to_string()));
        assert_eq!(ImageStore::allowed_extension("a.b.jpeg"), Some("jpeg".to_string()));
        assert_eq!(ImageStore::allowed_extension("scan.gif"), None);
        assert_eq!(ImageStore::allowed_extension("png"), None);
        assert_eq!(ImageStore::allowed_extension(""), None);
    }

    #[test]
    fn test_identical_uploads_get_distinct_names() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let a = store.save_upload(b"same bytes", "png").unwrap();
        let b = store.save_upload(b"same bytes", "png").unwrap();
        assert_ne!(a.file_name, b.file_name);
        assert_eq!(a.sha256, b.sha256);
        assert!(a.path.is_file() && b.path.is_file());
        assert!(a.url().starts_with("/api/images/uploads/"));
    }

    #[test]
    fn test_rejects_oversized_upload() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let err = store.save_upload(&vec![0u8; 2048], "png").unwrap_err();
        assert!(matches!(err, StorageError::FileTooLarge));
        assert_eq!(std::fs::read_dir(dir.path().join("uploads")).unwrap().count(), 0);
    }

    #[test]
    fn test_artifact_naming_and_resolve() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let original = store.save_upload(b"x", "jpg").unwrap();
        let artifact = store
            .save_artifact(&original, ArtifactKind::Translated, &DynamicImage::new_luma8(8, 8))
            .unwrap();
        assert_eq!(artifact.file_name, format!("cg_{}", original.file_name));
        assert_eq!(artifact.url(), format!("/api/images/results/cg_{}", original.file_name));
        assert!(store.resolve(StorageArea::Results, &artifact.file_name).is_some());
        assert!(store.resolve(StorageArea::Uploads, &artifact.file_name).is_none());
    }

    #[test]
    fn test_resolve_refuses_traversal() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        assert!(store.resolve(StorageArea::Uploads, "../results").is_none());
        assert!(store.resolve(StorageArea::Uploads, "..").is_none());
        assert!(store.resolve(StorageArea::Uploads, "a/b.png").is_none());
        assert!(store.resolve(StorageArea::Uploads, "missing.png").is_none());
    }

    #[test]
    fn test_sweep_expired() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let original = store.save_upload(b"x", "png").unwrap();

        assert_eq!(store.sweep_expired(Duration::hours(1)).unwrap(), 0);
        assert!(original.path.is_file());

        assert_eq!(store.sweep_expired(Duration::seconds(-1)).unwrap(), 1);
        assert!(!original.path.exists());
    }

    #[test]
    fn test_sweep_with_unbounded_age_keeps_everything() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let original = store.save_upload(b"x", "png").unwrap();

        assert_eq!(store.sweep_expired(Duration::MAX).unwrap(), 0);
        assert_eq!(store.sweep_expired(Duration::seconds(crate::config::MAX_RETENTION_SECS as i64)).unwrap(), 0);
        assert!(original.path.is_file());
    }

    #[test]
    fn test_sweep_skips_vanished_entries() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let gone = store.save_upload(b"a", "png").unwrap();
        let kept = store.save_upload(b"b", "png").unwrap();
        std::fs::create_dir(dir.path().join("uploads").join("nested")).unwrap();

        let entries: Vec<_> = std::fs::read_dir(dir.path().join("uploads")).unwrap().collect();
        std::fs::remove_file(&gone.path).unwrap();

        let cutoff = Utc::now() + Duration::hours(1);
        assert_eq!(sweep_entries(entries, cutoff), 1);
        assert!(!kept.path.exists());
        assert!(dir.path().join("uploads").join("nested").is_dir());
    }

    #[test]
    fn test_remove_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let original = store.save_upload(b"x", "png").unwrap();
        store.remove(&original);
        store.remove(&original);
        assert!(!original.path.exists());
    }
}

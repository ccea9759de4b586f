pub mod image_store;
pub mod retention;

pub use image_store::{ArtifactKind, ImageStore, StorageArea, StorageError, StoredImage};
pub use retention::{RetentionPolicy, spawn_sweeper};

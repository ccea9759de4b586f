use image::DynamicImage;
use shared::{ImageType, OrganType, UploadResponse};
use std::sync::Arc;

use crate::inference::{InferenceError, Models, Prediction};
use crate::storage::{ArtifactKind, ImageStore, StorageError, StoredImage};
use crate::translation::ModalityTranslator;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Inference(#[from] InferenceError),
}

/// A validated upload, ready to be processed.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub data: Vec<u8>,
    pub extension: String,
    pub organ: OrganType,
    pub image_type: ImageType,
}

#[derive(Debug, Clone)]
pub struct ProcessedScan {
    pub organ: OrganType,
    pub image_type: ImageType,
    pub prediction: Prediction,
    pub original: StoredImage,
    pub super_resolved: StoredImage,
    pub translated: StoredImage,
}

impl ProcessedScan {
    pub fn files(&self) -> [&StoredImage; 3] {
        [&self.original, &self.super_resolved, &self.translated]
    }

    pub fn into_response(self, explanation: String) -> UploadResponse {
        UploadResponse {
            prediction: self.prediction.label.to_string(),
            confidence: self.prediction.confidence,
            organ_type: self.organ,
            image_type: self.image_type,
            original_image: self.original.url(),
            sr_image: self.super_resolved.url(),
            cg_image: self.translated.url(),
            llama_response: explanation,
        }
    }
}

/// Store, classify, super-resolve and translate one scan. Every step is
/// synchronous; callers run it on the blocking pool.
#[derive(Clone)]
pub struct ScanPipeline {
    store: ImageStore,
    models: Arc<Models>,
    translator: ModalityTranslator,
}

impl ScanPipeline {
    pub fn new(store: ImageStore, models: Arc<Models>, translator: ModalityTranslator) -> Self {
        Self {
            store,
            models,
            translator,
        }
    }

    pub fn store(&self) -> &ImageStore {
        &self.store
    }

    pub fn models(&self) -> &Models {
        &self.models
    }

    /// On failure nothing written for this request is left behind.
    pub fn process(&self, request: UploadRequest) -> Result<ProcessedScan, PipelineError> {
        let original = self.store.save_upload(&request.data, &request.extension)?;
        let mut written = vec![original.clone()];

        match self.run_stages(&request, original, &mut written) {
            Ok(scan) => Ok(scan),
            Err(e) => {
                log::error!("Processing failed, removing {} file(s): {}", written.len(), e);
                for image in &written {
                    self.store.remove(image);
                }
                Err(e)
            }
        }
    }

    fn run_stages(
        &self,
        request: &UploadRequest,
        original: StoredImage,
        written: &mut Vec<StoredImage>,
    ) -> Result<ProcessedScan, PipelineError> {
        let image = image::load_from_memory(&request.data).map_err(InferenceError::from)?;

        let prediction = self.models.classifier(request.organ).predict(&image)?;

        let upscaled = self.models.super_resolver().upscale(&image)?;
        let super_resolved = self.store.save_artifact(
            &original,
            ArtifactKind::SuperResolved,
            &DynamicImage::ImageRgb8(upscaled),
        )?;
        written.push(super_resolved.clone());

        let gray = self.translator.preprocess(&image);
        let converted = self.translator.translate_from(&gray, request.image_type);
        let translated = self.store.save_artifact(
            &original,
            ArtifactKind::Translated,
            &DynamicImage::ImageLuma8(converted),
        )?;
        written.push(translated.clone());

        log::info!(
            "Processed {} ({} {}): {} ({:.4})",
            original.file_name,
            request.organ,
            request.image_type,
            prediction.label,
            prediction.confidence
        );

        Ok(ProcessedScan {
            organ: request.organ,
            image_type: request.image_type,
            prediction,
            original,
            super_resolved,
            translated,
        })
    }

    /// Removes every file of an already processed scan.
    pub fn discard(&self, scan: &ProcessedScan) {
        for image in scan.files() {
            self.store.remove(image);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::{Classifier, InferenceError, SuperResolver, TensorModel};
    use image::{ImageFormat, Rgb, RgbImage};
    use ndarray::{ArrayD, ArrayViewD, IxDyn};
    use std::io::Cursor;
    use tempfile::TempDir;

    struct Scores(Vec<f32>);

    impl TensorModel for Scores {
        fn name(&self) -> &str {
            "scores"
        }

        fn forward(&self, _input: ArrayViewD<'_, f32>) -> Result<ArrayD<f32>, InferenceError> {
            Ok(ArrayD::from_shape_vec(IxDyn(&[1, self.0.len()]), self.0.clone()).unwrap())
        }
    }

    struct Identity;

    impl TensorModel for Identity {
        fn name(&self) -> &str {
            "identity"
        }

        fn forward(&self, input: ArrayViewD<'_, f32>) -> Result<ArrayD<f32>, InferenceError> {
            Ok(input.to_owned())
        }
    }

    fn pipeline(dir: &TempDir, lungs_scores: Vec<f32>) -> ScanPipeline {
        let store = ImageStore::new(dir.path().join("uploads"), dir.path().join("results"), 1 << 20).unwrap();
        let models = Models::new(
            Classifier::new(OrganType::Brain, Arc::new(Scores(vec![0.1, 0.2, 0.6, 0.1]))),
            Classifier::new(OrganType::Lungs, Arc::new(Scores(lungs_scores))),
            SuperResolver::new(Arc::new(Identity)),
        );
        ScanPipeline::new(store, Arc::new(models), ModalityTranslator::default())
    }

    fn png(width: u32, height: u32) -> Vec<u8> {
        let image = RgbImage::from_fn(width, height, |x, y| Rgb([(x * 3) as u8, (y * 5) as u8, 90]));
        let mut buffer = Cursor::new(Vec::new());
        image.write_to(&mut buffer, ImageFormat::Png).unwrap();
        buffer.into_inner()
    }

    fn count_files(dir: &std::path::Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    fn request(data: Vec<u8>, organ: OrganType) -> UploadRequest {
        UploadRequest {
            data,
            extension: "png".to_string(),
            organ,
            image_type: ImageType::Mri,
        }
    }

    #[test]
    fn test_process_writes_three_files() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline(&dir, vec![0.2, 0.3, 0.5]);
        let scan = pipeline.process(request(png(40, 30), OrganType::Brain)).unwrap();

        assert_eq!(scan.prediction.label, "notumor");
        assert!((scan.prediction.confidence - 0.6).abs() < 1e-6);
        assert_eq!(scan.super_resolved.file_name, format!("sr_{}", scan.original.file_name));
        assert_eq!(scan.translated.file_name, format!("cg_{}", scan.original.file_name));
        for image in scan.files() {
            assert!(image.path.is_file());
        }

        let translated = image::open(&scan.translated.path).unwrap();
        assert_eq!((translated.width(), translated.height()), (256, 256));

        let response = scan.into_response("text".to_string());
        assert!(response.original_image.starts_with("/api/images/uploads/"));
        assert!(response.sr_image.starts_with("/api/images/results/sr_"));
        assert_eq!(response.llama_response, "text");
    }

    #[test]
    fn test_identical_uploads_get_distinct_names() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline(&dir, vec![0.2, 0.3, 0.5]);
        let data = png(16, 16);
        let first = pipeline.process(request(data.clone(), OrganType::Lungs)).unwrap();
        let second = pipeline.process(request(data, OrganType::Lungs)).unwrap();
        assert_ne!(first.original.file_name, second.original.file_name);
        assert_eq!(first.original.sha256, second.original.sha256);
        assert_eq!(first.prediction.label, "normal");
    }

    #[test]
    fn test_failure_rolls_back_written_files() {
        let dir = TempDir::new().unwrap();
        // wrong class count for lungs
        let pipeline = pipeline(&dir, vec![0.5, 0.5]);
        let err = pipeline.process(request(png(16, 16), OrganType::Lungs)).unwrap_err();
        assert!(matches!(err, PipelineError::Inference(InferenceError::OutputError(_))));
        assert_eq!(count_files(&dir.path().join("uploads")), 0);
        assert_eq!(count_files(&dir.path().join("results")), 0);
    }

    #[test]
    fn test_undecodable_upload_is_rolled_back() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline(&dir, vec![0.2, 0.3, 0.5]);
        let err = pipeline
            .process(request(b"not an image".to_vec(), OrganType::Brain))
            .unwrap_err();
        assert!(matches!(err, PipelineError::Inference(InferenceError::DecodeError(_))));
        assert_eq!(count_files(&dir.path().join("uploads")), 0);
    }

    #[test]
    fn test_discard_removes_everything() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline(&dir, vec![0.2, 0.3, 0.5]);
        let scan = pipeline.process(request(png(16, 16), OrganType::Brain)).unwrap();
        pipeline.discard(&scan);
        assert_eq!(count_files(&dir.path().join("uploads")), 0);
        assert_eq!(count_files(&dir.path().join("results")), 0);
    }
}

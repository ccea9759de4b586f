#![allow(dead_code)]

use actix_web::web;
use async_trait::async_trait;
use backend::explanation::{
    ChatMessage, ConditionTable, ExplanationService, LanguageModel, SamplingParams,
};
use backend::explanation::ExplanationError;
use backend::inference::{Classifier, InferenceError, Models, SuperResolver, TensorModel};
use backend::pipeline::ScanPipeline;
use backend::storage::ImageStore;
use backend::translation::ModalityTranslator;
use image::{ImageFormat, Rgb, RgbImage};
use ndarray::{ArrayD, ArrayViewD, IxDyn};
use shared::OrganType;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tempfile::TempDir;

pub const BOUNDARY: &str = "----medai-test-boundary";

/// Returns the same raw scores for every input.
pub struct FixedScores(pub Vec<f32>);

impl TensorModel for FixedScores {
    fn name(&self) -> &str {
        "fixed-scores"
    }

    fn forward(&self, _input: ArrayViewD<'_, f32>) -> Result<ArrayD<f32>, InferenceError> {
        ArrayD::from_shape_vec(IxDyn(&[1, self.0.len()]), self.0.clone())
            .map_err(|e| InferenceError::OutputError(e.to_string()))
    }
}

/// Nearest-neighbour 4x upscaler in NCHW.
pub struct Upscale4x;

impl TensorModel for Upscale4x {
    fn name(&self) -> &str {
        "upscale-4x"
    }

    fn forward(&self, input: ArrayViewD<'_, f32>) -> Result<ArrayD<f32>, InferenceError> {
        let shape = input.shape().to_vec();
        Ok(ArrayD::from_shape_fn(
            IxDyn(&[1, shape[1], shape[2] * 4, shape[3] * 4]),
            |idx| input[[0, idx[1], idx[2] / 4, idx[3] / 4]],
        ))
    }
}

/// Canned language model that records prompts and can be switched to fail.
#[derive(Default)]
pub struct ScriptedLlm {
    pub fail: AtomicBool,
    pub prompts: Mutex<Vec<Vec<ChatMessage>>>,
}

#[async_trait]
impl LanguageModel for ScriptedLlm {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        _params: &SamplingParams,
    ) -> Result<String, ExplanationError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ExplanationError::Upstream("model offline".to_string()));
        }
        self.prompts.lock().unwrap().push(messages.to_vec());
        let user = messages.last().map(|m| m.content.clone()).unwrap_or_default();
        Ok(format!("reply to: {}", user))
    }
}

pub struct TestState {
    pub dir: TempDir,
    pub llm: Arc<ScriptedLlm>,
    pub pipeline: web::Data<ScanPipeline>,
    pub explainer: web::Data<ExplanationService>,
}

impl TestState {
    pub fn new() -> Self {
        Self::with_limit(1 << 20)
    }

    pub fn with_limit(max_upload_bytes: usize) -> Self {
        let dir = TempDir::new().unwrap();
        let store = ImageStore::new(dir.path().join("uploads"), dir.path().join("results"), max_upload_bytes)
            .unwrap();
        let models = Models::new(
            Classifier::new(OrganType::Brain, Arc::new(FixedScores(vec![2.0, 0.5, 0.1, -1.0]))),
            Classifier::new(OrganType::Lungs, Arc::new(FixedScores(vec![0.1, 0.7, 0.2]))),
            SuperResolver::new(Arc::new(Upscale4x)),
        );
        let pipeline = ScanPipeline::new(store, Arc::new(models), ModalityTranslator::default());

        let llm = Arc::new(ScriptedLlm::default());
        let explainer = ExplanationService::with_model(llm.clone(), ConditionTable::builtin());

        Self {
            dir,
            llm,
            pipeline: web::Data::new(pipeline),
            explainer: web::Data::new(explainer),
        }
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.dir.path().join("uploads")
    }

    pub fn results_dir(&self) -> PathBuf {
        self.dir.path().join("results")
    }

    pub fn stored_files(&self) -> usize {
        let count = |dir: PathBuf| std::fs::read_dir(dir).unwrap().count();
        count(self.uploads_dir()) + count(self.results_dir())
    }
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    encode(width, height, ImageFormat::Png)
}

pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    encode(width, height, ImageFormat::Jpeg)
}

fn encode(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let image = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x * 7 % 256) as u8, (y * 3 % 256) as u8, ((x + y) % 256) as u8])
    });
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, format).unwrap();
    buffer.into_inner()
}

pub enum Part<'a> {
    File {
        name: &'a str,
        filename: &'a str,
        data: &'a [u8],
    },
    Text {
        name: &'a str,
        value: &'a str,
    },
}

/// Builds a `multipart/form-data` body and its content type.
pub fn multipart(parts: &[Part<'_>]) -> (String, Vec<u8>) {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part {
            Part::File { name, filename, data } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                        name, filename
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(data);
            }
            Part::Text { name, value } => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n{}", name, value).as_bytes(),
                );
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    (format!("multipart/form-data; boundary={}", BOUNDARY), body)
}

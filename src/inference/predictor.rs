//! Inference Predictor Module
//!
//! Builds the process-wide inference state once and serves requests against
//! it. Initialization runs to completion or fails as a whole:
//!
//! 1. read the checkpoint
//! 2. normalize parameter names
//! 3. read the class count from the classifier output projection
//! 4. rebuild the head to that width and bind weights non-strictly
//! 5. build the label taxonomy and check it against the class count
//!
//! After that nothing is mutated. Share the predictor as `Arc<Predictor<B>>`.

use std::path::Path;

use burn::tensor::backend::Backend;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::decision::{validate_threshold, DecisionPolicy, DecisionRecord};
use super::engine::InferenceEngine;
use super::preprocess::Preprocessor;
use crate::checkpoint::{infer_classifier_head, Checkpoint, CheckpointNormalizer, ClassifierHead};
use crate::dataset::LabelTaxonomy;
use crate::model::{adapt_classifier, LoadReport, PredictorConfig, Vgg};
use crate::utils::error::{PlantHealthError, Result};

/// Number of alternatives reported alongside the decision
pub const TOP_K: usize = 5;

/// A labeled class probability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassProbability {
    pub class_index: usize,
    pub label: String,
    pub probability: f32,
}

/// Everything known about one prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionReport {
    pub decision: DecisionRecord,
    /// Full label of the predicted class
    pub label: String,
    pub class_index: usize,
    pub top_k: Vec<ClassProbability>,
    pub inference_time_ms: f64,
}

/// Request-boundary result: a prediction or a failure message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionResponse {
    Prediction(PredictionReport),
    Error(String),
}

impl PredictionResponse {
    pub fn is_ok(&self) -> bool {
        matches!(self, PredictionResponse::Prediction(_))
    }
}

impl From<Result<PredictionReport>> for PredictionResponse {
    fn from(result: Result<PredictionReport>) -> Self {
        match result {
            Ok(report) => PredictionResponse::Prediction(report),
            Err(err) => {
                if err.is_request_error() {
                    warn!("Prediction failed: {}", err);
                } else {
                    error!("Prediction failed outside the request: {}", err);
                }
                PredictionResponse::Error(err.to_string())
            }
        }
    }
}

/// Loaded model, labels and policy
pub struct Predictor<B: Backend> {
    engine: InferenceEngine<B>,
    taxonomy: LabelTaxonomy,
    policy: DecisionPolicy,
    preprocessor: Preprocessor,
    head: ClassifierHead,
    load_report: LoadReport,
}

impl<B: Backend> Predictor<B> {
    /// Build the inference state from a configuration.
    ///
    /// Any error aborts initialization; no partially built predictor exists.
    pub fn initialize(config: &PredictorConfig, device: B::Device) -> Result<Self> {
        config.validate()?;
        info!("Initializing predictor from {:?}", config.checkpoint_path);

        let checkpoint = Checkpoint::load(&config.checkpoint_path)?;
        Self::from_checkpoint(config, &checkpoint, device)
    }

    /// Build the inference state from an already loaded checkpoint.
    ///
    /// The checkpoint is only read; it stays available to the caller.
    pub fn from_checkpoint(
        config: &PredictorConfig,
        checkpoint: &Checkpoint,
        device: B::Device,
    ) -> Result<Self> {
        config.validate()?;

        let normalizer = CheckpointNormalizer::new(config.key_prefixes.iter().cloned());
        let normalized = normalizer.normalize(checkpoint);

        let head = infer_classifier_head(&normalized)?;

        let model = Vgg::new(&config.model, &device);
        let (model, load_report) = adapt_classifier(model, head.num_classes, &normalized, &device)?;
        drop(normalized);

        let taxonomy = LabelTaxonomy::build(config.labels_path.as_deref(), head.num_classes)?;
        taxonomy.ensure_matches(head.num_classes)?;

        let policy = DecisionPolicy::new(config.confidence_threshold)
            .map_err(|e| PlantHealthError::Config(e.to_string()))?;

        info!(
            "Predictor ready: {} classes, threshold {:.2}, device {:?}",
            head.num_classes,
            policy.threshold(),
            device
        );

        Ok(Self {
            engine: InferenceEngine::new(model, device),
            taxonomy,
            policy,
            preprocessor: Preprocessor::new(config.preprocess.clone()),
            head,
            load_report,
        })
    }

    /// Predict on a decoded image.
    ///
    /// `threshold` overrides the configured confidence threshold for this
    /// request only.
    pub fn predict_image(&self, image: &DynamicImage, threshold: Option<f32>) -> Result<PredictionReport> {
        let threshold = match threshold {
            Some(threshold) => {
                validate_threshold(threshold)?;
                threshold
            }
            None => self.policy.threshold(),
        };

        let input = self.preprocessor.preprocess(image);
        let prediction = self.engine.infer(&input)?;

        let label = self.label(prediction.class_index)?;
        let decision = self
            .policy
            .decide_with_threshold(label, prediction.confidence, threshold);

        debug!(
            "Predicted label: {}, confidence: {:.2}, entropy: {:.3} -> {}",
            label,
            prediction.confidence,
            prediction.entropy(),
            decision
        );

        let top_k = prediction
            .top_k(TOP_K)
            .into_iter()
            .map(|(class_index, probability)| {
                Ok(ClassProbability {
                    class_index,
                    label: self.label(class_index)?.to_string(),
                    probability,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(PredictionReport {
            decision,
            label: label.to_string(),
            class_index: prediction.class_index,
            top_k,
            inference_time_ms: prediction.inference_time_ms,
        })
    }

    /// Decode and predict on an encoded image
    pub fn predict_bytes(&self, bytes: &[u8], threshold: Option<f32>) -> Result<PredictionReport> {
        let image = Preprocessor::decode(bytes)?;
        self.predict_image(&image, threshold)
    }

    /// Open, decode and predict on an image file
    pub fn predict_file(&self, path: &Path, threshold: Option<f32>) -> Result<PredictionReport> {
        let image = Preprocessor::open(path)?;
        self.predict_image(&image, threshold)
    }

    /// Like [`predict_bytes`](Self::predict_bytes), with failures turned
    /// into an error response
    pub fn respond_bytes(&self, bytes: &[u8], threshold: Option<f32>) -> PredictionResponse {
        self.predict_bytes(bytes, threshold).into()
    }

    /// Like [`predict_file`](Self::predict_file), with failures turned
    /// into an error response
    pub fn respond_file(&self, path: &Path, threshold: Option<f32>) -> PredictionResponse {
        self.predict_file(path, threshold).into()
    }

    pub fn taxonomy(&self) -> &LabelTaxonomy {
        &self.taxonomy
    }

    pub fn classifier_head(&self) -> &ClassifierHead {
        &self.head
    }

    pub fn load_report(&self) -> &LoadReport {
        &self.load_report
    }

    pub fn num_classes(&self) -> usize {
        self.engine.num_classes()
    }

    pub fn confidence_threshold(&self) -> f32 {
        self.policy.threshold()
    }

    fn label(&self, class_index: usize) -> Result<&str> {
        self.taxonomy.get(class_index).ok_or_else(|| {
            PlantHealthError::Inference(format!("no label for class index {}", class_index))
        })
    }
}

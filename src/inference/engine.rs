//! Forward pass and probability readout
//!
//! The engine owns the adapted model for the lifetime of the process. The
//! model is never mutated after construction; a single lock serializes
//! forward passes so backends with shared internal buffers stay safe under
//! concurrent callers.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use burn::tensor::backend::Backend;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::preprocess::PreprocessedImage;
use crate::model::Vgg;
use crate::utils::error::{PlantHealthError, Result};

/// Result of a single forward pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Index of the most probable class
    pub class_index: usize,

    /// Probability of that class
    pub confidence: f32,

    /// Full probability distribution over all classes
    pub probabilities: Vec<f32>,

    /// Forward pass time in milliseconds
    pub inference_time_ms: f64,
}

impl Prediction {
    /// Build from a probability distribution.
    ///
    /// Ties resolve to the lowest index. Returns `None` for an empty
    /// distribution.
    pub fn from_probabilities(probabilities: Vec<f32>, inference_time: Duration) -> Option<Self> {
        let mut best: Option<(usize, f32)> = None;
        for (index, &p) in probabilities.iter().enumerate() {
            if best.map_or(true, |(_, top)| p > top) {
                best = Some((index, p));
            }
        }

        let (class_index, confidence) = best?;
        Some(Self {
            class_index,
            confidence,
            probabilities,
            inference_time_ms: inference_time.as_secs_f64() * 1000.0,
        })
    }

    /// The `k` most probable classes as (index, probability), best first
    pub fn top_k(&self, k: usize) -> Vec<(usize, f32)> {
        let mut indexed: Vec<(usize, f32)> = self.probabilities.iter().copied().enumerate().collect();
        indexed.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        indexed.truncate(k);
        indexed
    }

    /// Entropy of the distribution (measure of uncertainty)
    pub fn entropy(&self) -> f32 {
        self.probabilities
            .iter()
            .filter(|&&p| p > 0.0)
            .map(|&p| -p * p.ln())
            .sum()
    }
}

/// Runs the adapted model on preprocessed images
pub struct InferenceEngine<B: Backend> {
    model: Mutex<Vgg<B>>,
    device: B::Device,
    num_classes: usize,
}

impl<B: Backend> InferenceEngine<B> {
    /// Wrap a fully loaded model. No further changes to the model happen.
    pub fn new(model: Vgg<B>, device: B::Device) -> Self {
        let num_classes = model.num_classes();
        Self {
            model: Mutex::new(model),
            device,
            num_classes,
        }
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }

    /// Forward pass with softmax over the class dimension.
    ///
    /// Single image only; the input becomes a batch of one.
    pub fn infer(&self, image: &PreprocessedImage) -> Result<Prediction> {
        let input = image.to_tensor::<B>(&self.device);

        let start = Instant::now();
        let output = {
            let model = self
                .model
                .lock()
                .map_err(|_| PlantHealthError::Inference("model lock poisoned".to_string()))?;
            model.forward_softmax(input)
        };

        let probabilities = output
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| PlantHealthError::Inference(format!("Failed to read probabilities: {:?}", e)))?;
        let elapsed = start.elapsed();

        if probabilities.len() != self.num_classes {
            return Err(PlantHealthError::Inference(format!(
                "model produced {} probabilities, expected {}",
                probabilities.len(),
                self.num_classes
            )));
        }

        let prediction = Prediction::from_probabilities(probabilities, elapsed)
            .ok_or_else(|| PlantHealthError::Inference("empty probability distribution".to_string()))?;

        debug!(
            "Probabilities: {:?} (class {}, {:.4}, {:.2} ms)",
            prediction.probabilities,
            prediction.class_index,
            prediction.confidence,
            prediction.inference_time_ms
        );
        Ok(prediction)
    }
}

//! Predictor Configuration Module
//!
//! Startup inputs for the inference pipeline: where the checkpoint and the
//! label reference live, the runtime architecture, preprocessing, and the
//! uncertainty threshold.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::vgg::VggConfig;
use crate::checkpoint::DEFAULT_KEY_PREFIXES;
use crate::inference::preprocess::PreprocessConfig;
use crate::utils::error::{PlantHealthError, Result};
use crate::DEFAULT_CONFIDENCE_THRESHOLD;

/// Configuration for building a [`Predictor`](crate::inference::Predictor)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictorConfig {
    /// Path to the trained checkpoint
    pub checkpoint_path: PathBuf,

    /// Directory whose sorted entries are the class labels
    pub labels_path: Option<PathBuf>,

    /// Predictions below this probability are reported as uncertain
    pub confidence_threshold: f32,

    /// Namespace prefixes stripped from checkpoint keys
    pub key_prefixes: Vec<String>,

    /// Runtime model architecture
    pub model: VggConfig,

    /// Image preprocessing
    pub preprocess: PreprocessConfig,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            checkpoint_path: PathBuf::from("models/vgg_ft_model.pth"),
            labels_path: None,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            key_prefixes: DEFAULT_KEY_PREFIXES.iter().map(|p| p.to_string()).collect(),
            model: VggConfig::vgg16(),
            preprocess: PreprocessConfig::default(),
        }
    }
}

impl PredictorConfig {
    /// Default configuration for a checkpoint
    pub fn new(checkpoint_path: impl Into<PathBuf>) -> Self {
        Self {
            checkpoint_path: checkpoint_path.into(),
            ..Default::default()
        }
    }

    pub fn with_labels_path(mut self, labels_path: impl Into<PathBuf>) -> Self {
        self.labels_path = Some(labels_path.into());
        self
    }

    pub fn with_confidence_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    pub fn with_model(mut self, model: VggConfig) -> Self {
        self.model = model;
        self
    }

    pub fn with_preprocess(mut self, preprocess: PreprocessConfig) -> Self {
        self.preprocess = preprocess;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(PlantHealthError::Config(format!(
                "confidence_threshold must be in range [0.0, 1.0], got {}",
                self.confidence_threshold
            )));
        }

        self.model.validate()?;
        self.preprocess.validate()?;

        Ok(())
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

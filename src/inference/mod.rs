//! Inference module for plant health prediction
//!
//! This module provides:
//! - Image decoding and preprocessing
//! - The forward pass over the adapted classifier
//! - The crop/status decision policy
//! - The shared predictor serving requests

pub mod decision;
pub mod engine;
pub mod predictor;
pub mod preprocess;

// Re-export main types for convenience
pub use decision::{DecisionPolicy, DecisionRecord, HealthStatus};
pub use engine::{InferenceEngine, Prediction};
pub use predictor::{ClassProbability, PredictionReport, PredictionResponse, Predictor, TOP_K};
pub use preprocess::{PreprocessConfig, PreprocessedImage, Preprocessor, IMAGENET_MEAN, IMAGENET_STD};

//! Model module for the VGG classifier using the Burn framework
//!
//! This module provides:
//! - The runtime VGG architecture with torchvision parameter naming
//! - Head replacement and non-strict checkpoint loading
//! - Predictor configuration

pub mod adapter;
pub mod config;
pub mod vgg;

// Re-export main types for convenience
pub use adapter::{adapt_classifier, export_checkpoint, load_non_strict, LoadReport};
pub use config::PredictorConfig;
pub use vgg::{Vgg, VggConfig};

//! # Plant Health
//!
//! A Rust library for plant disease inference with a fine-tuned VGG classifier
//! using the Burn framework.
//!
//! ## Features
//!
//! - **Checkpoint loading** from PyTorch pickles or JSON weight exports
//! - **Classifier adaptation**: the class count is read from the checkpoint
//!   and the head is rebuilt to match before weights are bound
//! - **Decision policy** turning `<Crop>___<status>` labels into a
//!   crop/health verdict with an uncertainty threshold
//! - **Shared predictor** safe to use from concurrent request handlers
//!
//! ## Modules
//!
//! - `checkpoint`: Parameter mappings, name normalization, head inspection
//! - `model`: VGG architecture, head replacement, non-strict loading
//! - `dataset`: Label taxonomy from a reference directory
//! - `inference`: Preprocessing, forward pass, decision and predictor
//! - `utils`: Errors, logging and helper functions
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use plant_health::backend::{default_device, InferenceBackend};
//! use plant_health::{Predictor, PredictorConfig};
//!
//! let config = PredictorConfig::new("models/vgg_ft_model.pth")
//!     .with_labels_path("data/plantvillage/train");
//! let predictor = Predictor::<InferenceBackend>::initialize(&config, default_device())?;
//!
//! let report = predictor.predict_file("leaf.jpg".as_ref(), None)?;
//! println!("{}", report.decision);
//! ```

pub mod backend;
pub mod checkpoint;
pub mod dataset;
pub mod inference;
pub mod model;
pub mod utils;

// Re-export commonly used items for convenience
pub use checkpoint::{Checkpoint, ClassifierHead, ParamTensor};
pub use dataset::LabelTaxonomy;
pub use inference::decision::{DecisionPolicy, DecisionRecord, HealthStatus};
pub use inference::predictor::{PredictionReport, PredictionResponse, Predictor};
pub use model::config::PredictorConfig;
pub use model::vgg::{Vgg, VggConfig};
pub use utils::error::{PlantHealthError, Result};

/// Default input image size (square)
pub const IMAGE_SIZE: u32 = 224;

/// Default confidence threshold below which a prediction is uncertain
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.75;

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

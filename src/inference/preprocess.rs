//! Image preprocessing for model input
//!
//! Deterministic pipeline: convert to RGB, resize to a fixed square with a
//! bilinear filter, scale to [0, 1], then normalize per channel with the
//! ImageNet statistics the backbone was pretrained on.

use std::path::Path;

use burn::tensor::{backend::Backend, Tensor, TensorData};
use image::{imageops::FilterType, DynamicImage, ImageReader};
use serde::{Deserialize, Serialize};

use crate::utils::error::{PlantHealthError, Result};
use crate::IMAGE_SIZE;

/// ImageNet normalization mean values (RGB)
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// ImageNet normalization std values (RGB)
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Largest accepted input side
pub const MAX_IMAGE_SIZE: u32 = 4096;

/// Configuration for image preprocessing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreprocessConfig {
    /// Target width and height
    pub image_size: u32,
    /// Per-channel normalization means [R, G, B]
    pub mean: [f32; 3],
    /// Per-channel normalization standard deviations [R, G, B]
    pub std: [f32; 3],
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            image_size: IMAGE_SIZE,
            mean: IMAGENET_MEAN,
            std: IMAGENET_STD,
        }
    }
}

impl PreprocessConfig {
    pub fn validate(&self) -> Result<()> {
        if self.image_size == 0 {
            return Err(PlantHealthError::Config(
                "image_size must be greater than 0".to_string(),
            ));
        }
        if self.image_size > MAX_IMAGE_SIZE {
            return Err(PlantHealthError::Config(format!(
                "image_size must be at most {}, got {}",
                MAX_IMAGE_SIZE, self.image_size
            )));
        }
        if self.std.iter().any(|&s| s <= 0.0) {
            return Err(PlantHealthError::Config(
                "normalization std must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// A normalized image in CHW layout, shape [3, size, size]
#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessedImage {
    data: Vec<f32>,
    size: usize,
}

impl PreprocessedImage {
    /// Shape as [channels, height, width]
    pub fn shape(&self) -> [usize; 3] {
        [3, self.size, self.size]
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Batch-of-one tensor of shape [1, 3, size, size]
    pub fn to_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 4> {
        let data = TensorData::new(self.data.clone(), [1, 3, self.size, self.size]);
        Tensor::from_data(data, device)
    }
}

/// Maps decoded images to normalized model input
#[derive(Debug, Clone, Default)]
pub struct Preprocessor {
    config: PreprocessConfig,
}

impl Preprocessor {
    pub fn new(config: PreprocessConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PreprocessConfig {
        &self.config
    }

    /// Decode an encoded image (JPEG, PNG, ...) held in memory
    pub fn decode(bytes: &[u8]) -> Result<DynamicImage> {
        image::load_from_memory(bytes).map_err(|e| PlantHealthError::ImageDecode(e.to_string()))
    }

    /// Open and decode an image file
    pub fn open(path: &Path) -> Result<DynamicImage> {
        let reader = ImageReader::open(path)
            .map_err(|e| PlantHealthError::ImageDecode(format!("{}: {}", path.display(), e)))?
            .with_guessed_format()
            .map_err(|e| PlantHealthError::ImageDecode(format!("{}: {}", path.display(), e)))?;

        reader
            .decode()
            .map_err(|e| PlantHealthError::ImageDecode(format!("{}: {}", path.display(), e)))
    }

    /// Preprocess a decoded image of any size and color type
    pub fn preprocess(&self, image: &DynamicImage) -> PreprocessedImage {
        let size = self.config.image_size;
        let rgb = image.to_rgb8();
        let resized = image::imageops::resize(&rgb, size, size, FilterType::Triangle);

        let side = size as usize;
        let num_pixels = side * side;
        let mut data = vec![0.0f32; 3 * num_pixels];

        // CHW layout: all R values, then all G values, then all B values
        for (i, pixel) in resized.pixels().enumerate() {
            for channel in 0..3 {
                let scaled = pixel[channel] as f32 / 255.0;
                data[channel * num_pixels + i] =
                    (scaled - self.config.mean[channel]) / self.config.std[channel];
            }
        }

        PreprocessedImage { data, size: side }
    }
}

//! VGG Model Architecture for Plant Disease Classification
//!
//! Runtime counterpart of the torchvision VGG family used to train the
//! checkpoints. Parameter naming follows torchvision so checkpoint keys map
//! directly onto layers:
//!
//! - `features.{i}.weight|bias` for each 3x3 convolution, where `i` counts
//!   convolution, ReLU and max-pool layers in sequence
//! - `classifier.{0,3,6}.weight|bias` for the three linear layers

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        Dropout, DropoutConfig, Linear, LinearConfig, PaddingConfig2d, Relu,
    },
    tensor::{activation::softmax, backend::Backend, Tensor},
};

use crate::utils::error::{self, PlantHealthError};

/// Checkpoint indices of the linear layers inside `classifier`
pub const CLASSIFIER_FC1_INDEX: usize = 0;
pub const CLASSIFIER_FC2_INDEX: usize = 3;
pub const CLASSIFIER_HEAD_INDEX: usize = 6;

/// Configuration for the VGG model
#[derive(Config, Debug)]
pub struct VggConfig {
    /// Output channels of each convolutional stage
    pub stage_channels: Vec<usize>,

    /// Number of 3x3 convolutions in each stage
    pub stage_depths: Vec<usize>,

    /// Width of the default classifier head, replaced after checkpoint inspection
    #[config(default = "1000")]
    pub num_classes: usize,

    /// Width of the two hidden linear layers
    #[config(default = "4096")]
    pub hidden_size: usize,

    /// Spatial size after adaptive average pooling
    #[config(default = "7")]
    pub pooled_size: usize,

    /// Dropout rate in the classifier (inert on inference backends)
    #[config(default = "0.5")]
    pub dropout: f64,

    /// Number of input channels (3 for RGB)
    #[config(default = "3")]
    pub in_channels: usize,
}

impl VggConfig {
    /// The VGG-16 layout: 13 convolutions in five stages
    pub fn vgg16() -> Self {
        Self::new(vec![64, 128, 256, 512, 512], vec![2, 2, 3, 3, 3])
    }

    /// Check that the layout describes a buildable network
    pub fn validate(&self) -> error::Result<()> {
        if self.stage_channels.is_empty() {
            return Err(PlantHealthError::Config(
                "stage_channels must have at least one stage".to_string(),
            ));
        }
        if self.stage_channels.len() != self.stage_depths.len() {
            return Err(PlantHealthError::Config(format!(
                "stage_channels has {} stages but stage_depths has {}",
                self.stage_channels.len(),
                self.stage_depths.len()
            )));
        }
        if self.stage_depths.iter().any(|&depth| depth == 0) {
            return Err(PlantHealthError::Config(
                "every stage needs at least one convolution".to_string(),
            ));
        }
        if self.stage_channels.iter().any(|&channels| channels == 0)
            || self.hidden_size == 0
            || self.pooled_size == 0
            || self.in_channels == 0
            || self.num_classes == 0
        {
            return Err(PlantHealthError::Config(
                "layer widths must be greater than 0".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(PlantHealthError::Config(
                "dropout must be in range [0.0, 1.0)".to_string(),
            ));
        }
        Ok(())
    }

    /// Input width of the first linear layer
    pub fn flattened_features(&self) -> usize {
        let channels = self.stage_channels.last().copied().unwrap_or(0);
        channels * self.pooled_size * self.pooled_size
    }

    /// Build the model with its default head
    pub fn init<B: Backend>(&self, device: &B::Device) -> Vgg<B> {
        Vgg::new(self, device)
    }
}

/// A 3x3 convolution with ReLU, optionally closing a stage with max pooling
#[derive(Module, Debug)]
pub struct VggBlock<B: Backend> {
    pub conv: Conv2d<B>,
    pub relu: Relu,
    pub pool: Option<MaxPool2d>,
    /// Position of the convolution in the `features` sequence
    pub index: usize,
}

impl<B: Backend> VggBlock<B> {
    fn new(
        in_channels: usize,
        out_channels: usize,
        index: usize,
        with_pool: bool,
        device: &B::Device,
    ) -> Self {
        let conv = Conv2dConfig::new([in_channels, out_channels], [3, 3])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init(device);

        let pool = if with_pool {
            Some(MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init())
        } else {
            None
        };

        Self {
            conv,
            relu: Relu::new(),
            pool,
            index,
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(x);
        let x = self.relu.forward(x);

        match &self.pool {
            Some(pool) => pool.forward(x),
            None => x,
        }
    }

    /// Checkpoint prefix of this block's convolution
    pub fn key_prefix(&self) -> String {
        format!("features.{}", self.index)
    }
}

/// VGG classifier
///
/// Architecture:
/// - Stages of 3x3 convolutions with ReLU, each stage closed by 2x2 max pooling
/// - Adaptive average pooling to a fixed spatial size
/// - Three linear layers with ReLU and dropout between them
#[derive(Module, Debug)]
pub struct Vgg<B: Backend> {
    pub features: Vec<VggBlock<B>>,
    pub avgpool: AdaptiveAvgPool2d,

    // classifier.0, classifier.3, classifier.6
    pub fc1: Linear<B>,
    pub fc2: Linear<B>,
    pub head: Linear<B>,
    pub dropout: Dropout,

    hidden_size: usize,
    num_classes: usize,
}

impl<B: Backend> Vgg<B> {
    /// Create a VGG model with a head of `config.num_classes` outputs
    pub fn new(config: &VggConfig, device: &B::Device) -> Self {
        let mut features = Vec::new();
        let mut in_channels = config.in_channels;
        let mut index = 0;

        for (&channels, &depth) in config.stage_channels.iter().zip(&config.stage_depths) {
            for layer in 0..depth {
                let closes_stage = layer + 1 == depth;
                features.push(VggBlock::new(in_channels, channels, index, closes_stage, device));
                in_channels = channels;

                // conv + relu, plus the pool that closes the stage
                index += if closes_stage { 3 } else { 2 };
            }
        }

        let avgpool = AdaptiveAvgPool2dConfig::new([config.pooled_size, config.pooled_size]).init();

        let fc1 = LinearConfig::new(config.flattened_features(), config.hidden_size).init(device);
        let fc2 = LinearConfig::new(config.hidden_size, config.hidden_size).init(device);
        let head = LinearConfig::new(config.hidden_size, config.num_classes).init(device);
        let dropout = DropoutConfig::new(config.dropout).init();

        Self {
            features,
            avgpool,
            fc1,
            fc2,
            head,
            dropout,
            hidden_size: config.hidden_size,
            num_classes: config.num_classes,
        }
    }

    /// Forward pass through the network
    ///
    /// # Arguments
    /// * `x` - Input tensor of shape [batch_size, channels, height, width]
    ///
    /// # Returns
    /// * Logits tensor of shape [batch_size, num_classes]
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let mut x = x;
        for block in &self.features {
            x = block.forward(x);
        }

        let x = self.avgpool.forward(x);

        // Flatten in [C, H, W] order, matching torch.flatten
        let [batch_size, channels, height, width] = x.dims();
        let x = x.reshape([batch_size, channels * height * width]);

        let x = self.fc1.forward(x);
        let x = Relu::new().forward(x);
        let x = self.dropout.forward(x);
        let x = self.fc2.forward(x);
        let x = Relu::new().forward(x);
        let x = self.dropout.forward(x);
        self.head.forward(x)
    }

    /// Forward pass with softmax over the class dimension
    pub fn forward_softmax(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        softmax(self.forward(x), 1)
    }

    /// Replace the output projection with a freshly initialized one of
    /// `num_classes` outputs. The input width stays `hidden_size`.
    pub fn replace_head(mut self, num_classes: usize, device: &B::Device) -> Self {
        self.head = LinearConfig::new(self.hidden_size, num_classes).init(device);
        self.num_classes = num_classes;
        self
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn hidden_size(&self) -> usize {
        self.hidden_size
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    pub type TestBackend = NdArray<f32>;

    /// A tiny layout that keeps CPU forward passes fast
    pub fn tiny_config() -> VggConfig {
        VggConfig::new(vec![4, 8], vec![1, 2])
            .with_hidden_size(16)
            .with_pooled_size(2)
            .with_num_classes(5)
    }

    #[test]
    fn test_vgg16_layout() {
        let config = VggConfig::vgg16();
        assert!(config.validate().is_ok());
        assert_eq!(config.flattened_features(), 512 * 7 * 7);
        assert_eq!(config.hidden_size, 4096);
        assert_eq!(config.num_classes, 1000);
    }

    #[test]
    fn test_feature_indices_follow_torchvision() {
        let device = Default::default();
        let model = tiny_config().init::<TestBackend>(&device);

        // [conv0 relu1 pool2] [conv3 relu4 conv5 relu6 pool7]
        let indices: Vec<usize> = model.features.iter().map(|block| block.index).collect();
        assert_eq!(indices, vec![0, 3, 5]);
        assert!(model.features[0].pool.is_some());
        assert!(model.features[1].pool.is_none());
        assert_eq!(model.features[2].key_prefix(), "features.5");
    }

    #[test]
    fn test_vgg16_feature_indices() {
        let config = VggConfig::vgg16();
        let mut index = 0;
        let mut conv_indices = Vec::new();
        for &depth in &config.stage_depths {
            for layer in 0..depth {
                conv_indices.push(index);
                index += if layer + 1 == depth { 3 } else { 2 };
            }
        }
        assert_eq!(
            conv_indices,
            vec![0, 2, 5, 7, 10, 12, 14, 17, 19, 21, 24, 26, 28]
        );
    }

    #[test]
    fn test_output_shape() {
        let device = Default::default();
        let model = tiny_config().init::<TestBackend>(&device);

        let input = Tensor::<TestBackend, 4>::zeros([2, 3, 32, 32], &device);
        let output = model.forward(input);

        assert_eq!(output.dims(), [2, 5]);
    }

    #[test]
    fn test_replace_head_changes_output_width() {
        let device = Default::default();
        let model = tiny_config()
            .init::<TestBackend>(&device)
            .replace_head(11, &device);

        assert_eq!(model.num_classes(), 11);
        assert_eq!(model.head.weight.val().dims(), [16, 11]);

        let input = Tensor::<TestBackend, 4>::zeros([1, 3, 32, 32], &device);
        assert_eq!(model.forward(input).dims(), [1, 11]);
    }

    #[test]
    fn test_softmax_sums_to_one() {
        let device = Default::default();
        let model = tiny_config().init::<TestBackend>(&device);

        let input = Tensor::<TestBackend, 4>::ones([1, 3, 32, 32], &device);
        let probabilities: Vec<f32> = model
            .forward_softmax(input)
            .into_data()
            .to_vec()
            .unwrap();

        let total: f32 = probabilities.iter().sum();
        assert!((total - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_config_json_round_trip() {
        let config = tiny_config();
        let json = serde_json::to_string(&config).unwrap();
        let restored: VggConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.stage_channels, vec![4, 8]);
        assert_eq!(restored.hidden_size, 16);
        assert_eq!(restored.dropout, 0.5);
        assert_eq!(restored.num_classes, config.num_classes);
    }

    #[test]
    fn test_config_validation() {
        assert!(VggConfig::new(vec![], vec![]).validate().is_err());
        assert!(VggConfig::new(vec![8], vec![1, 2]).validate().is_err());
        assert!(VggConfig::new(vec![8], vec![0]).validate().is_err());
        assert!(tiny_config().with_dropout(1.0).validate().is_err());
        assert!(tiny_config().validate().is_ok());
    }
}

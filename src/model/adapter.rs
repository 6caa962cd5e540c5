//! Classifier adaptation and non-strict weight loading
//!
//! Construction happens in two phases: the model is first built with its
//! default head, the head is then rebuilt to the class count read from the
//! checkpoint, and only after that are the checkpoint tensors bound. Keys
//! missing from the checkpoint keep their initialization and keys unknown to
//! the model are ignored. A key present on both sides with a different shape
//! is an error.

use std::collections::HashSet;

use burn::{
    module::Param,
    nn::{conv::Conv2d, Linear},
    tensor::{backend::Backend, Tensor, TensorData},
};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::vgg::{Vgg, CLASSIFIER_FC1_INDEX, CLASSIFIER_FC2_INDEX, CLASSIFIER_HEAD_INDEX};
use crate::checkpoint::{Checkpoint, ParamTensor};
use crate::utils::error::{PlantHealthError, Result};

/// Outcome of a non-strict load
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    /// Model parameters copied from the checkpoint
    pub loaded: Vec<String>,
    /// Model parameters absent from the checkpoint (left at initialization)
    pub missing: Vec<String>,
    /// Checkpoint tensors the model has no parameter for
    pub unexpected: Vec<String>,
}

impl LoadReport {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty() && self.unexpected.is_empty()
    }
}

/// Resize the head to `num_classes`, then bind the checkpoint non-strictly.
///
/// Must run before the model is put into service.
pub fn adapt_classifier<B: Backend>(
    model: Vgg<B>,
    num_classes: usize,
    checkpoint: &Checkpoint,
    device: &B::Device,
) -> Result<(Vgg<B>, LoadReport)> {
    if model.num_classes() != num_classes {
        info!(
            "Replacing classifier head: {} -> {} classes (input width {})",
            model.num_classes(),
            num_classes,
            model.hidden_size()
        );
    }
    let model = model.replace_head(num_classes, device);
    load_non_strict(model, checkpoint, device)
}

/// Copy every checkpoint tensor the model has a parameter for.
pub fn load_non_strict<B: Backend>(
    mut model: Vgg<B>,
    checkpoint: &Checkpoint,
    device: &B::Device,
) -> Result<(Vgg<B>, LoadReport)> {
    let mut binder = Binder::new(checkpoint, device);

    let mut features = Vec::with_capacity(model.features.len());
    for mut block in model.features {
        block.conv = binder.bind_conv(&block.key_prefix(), block.conv)?;
        features.push(block);
    }
    model.features = features;

    model.fc1 = binder.bind_linear(&classifier_prefix(CLASSIFIER_FC1_INDEX), model.fc1)?;
    model.fc2 = binder.bind_linear(&classifier_prefix(CLASSIFIER_FC2_INDEX), model.fc2)?;
    model.head = binder.bind_linear(&classifier_prefix(CLASSIFIER_HEAD_INDEX), model.head)?;

    let report = binder.finish();

    info!(
        "Loaded {} parameters ({} missing, {} unexpected)",
        report.loaded.len(),
        report.missing.len(),
        report.unexpected.len()
    );
    if !report.missing.is_empty() {
        warn!("Parameters left at initialization: {:?}", report.missing);
    }
    if !report.unexpected.is_empty() {
        warn!("Ignored checkpoint tensors: {:?}", report.unexpected);
    }

    Ok((model, report))
}

/// Export a model using torchvision parameter names and layouts
pub fn export_checkpoint<B: Backend>(model: &Vgg<B>) -> Result<Checkpoint> {
    let mut checkpoint = Checkpoint::new();

    for block in &model.features {
        let prefix = block.key_prefix();
        checkpoint.insert(format!("{prefix}.weight"), to_param_tensor(block.conv.weight.val())?);
        if let Some(bias) = &block.conv.bias {
            checkpoint.insert(format!("{prefix}.bias"), to_param_tensor(bias.val())?);
        }
    }

    for (index, linear) in [
        (CLASSIFIER_FC1_INDEX, &model.fc1),
        (CLASSIFIER_FC2_INDEX, &model.fc2),
        (CLASSIFIER_HEAD_INDEX, &model.head),
    ] {
        let prefix = classifier_prefix(index);
        // burn stores [in, out], torch stores [out, in]
        checkpoint.insert(
            format!("{prefix}.weight"),
            to_param_tensor(linear.weight.val().transpose())?,
        );
        if let Some(bias) = &linear.bias {
            checkpoint.insert(format!("{prefix}.bias"), to_param_tensor(bias.val())?);
        }
    }

    Ok(checkpoint)
}

fn classifier_prefix(index: usize) -> String {
    format!("classifier.{}", index)
}

fn to_param_tensor<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Result<ParamTensor> {
    let shape = tensor.dims().to_vec();
    let data = tensor
        .into_data()
        .to_vec::<f32>()
        .map_err(|e| PlantHealthError::Inference(format!("Failed to read tensor: {:?}", e)))?;
    ParamTensor::new(shape, data)
}

/// Tracks which checkpoint tensors were consumed while binding parameters
struct Binder<'a, B: Backend> {
    checkpoint: &'a Checkpoint,
    device: &'a B::Device,
    consumed: HashSet<&'a str>,
    report: LoadReport,
}

impl<'a, B: Backend> Binder<'a, B> {
    fn new(checkpoint: &'a Checkpoint, device: &'a B::Device) -> Self {
        Self {
            checkpoint,
            device,
            consumed: HashSet::new(),
            report: LoadReport::default(),
        }
    }

    fn bind_conv(&mut self, prefix: &str, mut conv: Conv2d<B>) -> Result<Conv2d<B>> {
        conv.weight = self.bind(&format!("{prefix}.weight"), conv.weight, false)?;
        conv.bias = conv
            .bias
            .map(|bias| self.bind(&format!("{prefix}.bias"), bias, false))
            .transpose()?;
        Ok(conv)
    }

    fn bind_linear(&mut self, prefix: &str, mut linear: Linear<B>) -> Result<Linear<B>> {
        linear.weight = self.bind(&format!("{prefix}.weight"), linear.weight, true)?;
        linear.bias = linear
            .bias
            .map(|bias| self.bind(&format!("{prefix}.bias"), bias, false))
            .transpose()?;
        Ok(linear)
    }

    /// Replace `param` with the checkpoint tensor stored under `key`.
    ///
    /// `transposed` marks 2D parameters stored as [out, in] in the checkpoint.
    fn bind<const D: usize>(
        &mut self,
        key: &str,
        param: Param<Tensor<B, D>>,
        transposed: bool,
    ) -> Result<Param<Tensor<B, D>>> {
        let Some((stored_key, stored)) = self.checkpoint.iter().find(|(name, _)| *name == key) else {
            self.report.missing.push(key.to_string());
            return Ok(param);
        };
        self.consumed.insert(stored_key);

        let mut expected = param.val().dims().to_vec();
        if transposed {
            expected.reverse();
        }
        if stored.shape != expected {
            return Err(PlantHealthError::ParameterShape {
                key: key.to_string(),
                expected,
                found: stored.shape.clone(),
            });
        }

        let data = TensorData::new(stored.data.clone(), stored.shape.clone());
        let tensor = Tensor::<B, D>::from_data(data, self.device);
        let tensor = if transposed { tensor.transpose() } else { tensor };

        debug!("Bound '{}' {:?}", key, stored.shape);
        self.report.loaded.push(key.to_string());
        Ok(Param::from_tensor(tensor))
    }

    fn finish(mut self) -> LoadReport {
        self.report.unexpected = self
            .checkpoint
            .keys()
            .filter(|key| !self.consumed.contains(key))
            .map(str::to_string)
            .collect();
        self.report
    }
}

//! Checkpoint module for serialized model parameters
//!
//! This module provides:
//! - An ordered parameter-name -> tensor mapping read from disk
//! - Namespace prefix normalization of parameter names
//! - Classifier head inspection to recover the trained class count
//!
//! ## Formats
//!
//! - `.pth` / `.pt` / `.bin` / `.ckpt`: PyTorch pickle state dicts
//! - `.json`: `{"<name>": {"shape": [..], "data": [..]}, ..}`, the same layout
//!   produced by the weight export tooling
//!
//! Iteration order is the order tensors appear in the file. The classifier
//! inspection depends on it, so every reader here preserves it.

pub mod inspect;
pub mod normalize;

use std::fmt;
use std::fs;
use std::path::Path;

use candle_core::pickle::{read_pth_tensor_info, PthTensors, TensorInfo};
use candle_core::DType;
use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::{info, warn};

use crate::utils::error::{PlantHealthError, Result};

pub use inspect::{classifier_weight_keys, infer_classifier_head, infer_num_classes, ClassifierHead};
pub use normalize::{CheckpointNormalizer, DEFAULT_KEY_PREFIXES};

/// A dense f32 tensor in row-major order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamTensor {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl ParamTensor {
    /// Create a tensor, checking that the data fills the shape exactly
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Result<Self> {
        let tensor = Self { shape, data };
        tensor.validate()?;
        Ok(tensor)
    }

    /// A zero-filled tensor of the given shape
    pub fn zeros(shape: Vec<usize>) -> Self {
        let numel: usize = shape.iter().product();
        Self {
            shape,
            data: vec![0.0; numel],
        }
    }

    /// Number of elements described by the shape
    pub fn numel(&self) -> usize {
        self.shape.iter().product()
    }

    fn validate(&self) -> Result<()> {
        if self.numel() != self.data.len() {
            return Err(PlantHealthError::CheckpointFormat(format!(
                "tensor of shape {:?} needs {} values, found {}",
                self.shape,
                self.numel(),
                self.data.len()
            )));
        }
        Ok(())
    }
}

/// Ordered mapping from parameter name to tensor
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Checkpoint {
    entries: Vec<(String, ParamTensor)>,
}

impl Checkpoint {
    /// Create an empty checkpoint
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty checkpoint with room for `capacity` tensors
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Build a checkpoint from entries in iteration order.
    ///
    /// A repeated name keeps its first position and takes the later value.
    pub fn from_entries<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, ParamTensor)>,
        K: Into<String>,
    {
        let mut checkpoint = Self::new();
        for (key, tensor) in entries {
            checkpoint.insert(key, tensor);
        }
        checkpoint
    }

    /// Insert a tensor, returning the previous value stored under `key`
    pub fn insert(&mut self, key: impl Into<String>, tensor: ParamTensor) -> Option<ParamTensor> {
        let key = key.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, tensor)),
            None => {
                self.entries.push((key, tensor));
                None
            }
        }
    }

    /// Look up a tensor by name
    pub fn get(&self, key: &str) -> Option<&ParamTensor> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, tensor)| tensor)
    }

    /// Parameter names in iteration order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    /// Entries in iteration order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamTensor)> {
        self.entries.iter().map(|(key, tensor)| (key.as_str(), tensor))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of scalar parameters
    pub fn num_parameters(&self) -> usize {
        self.entries.iter().map(|(_, tensor)| tensor.numel()).sum()
    }

    /// Load a checkpoint, choosing the reader from the file extension
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(PlantHealthError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("checkpoint not found: {}", path.display()),
            )));
        }

        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase())
            .unwrap_or_default();

        let checkpoint = match extension.as_str() {
            "pth" | "pt" | "bin" | "ckpt" => Self::from_pickle(path)?,
            "json" => Self::from_json_slice(&fs::read(path)?)?,
            other => {
                return Err(PlantHealthError::CheckpointFormat(format!(
                    "unsupported checkpoint extension '{}' for {}",
                    other,
                    path.display()
                )))
            }
        };

        info!(
            "Loaded checkpoint {:?}: {} tensors, {} parameters",
            path,
            checkpoint.len(),
            checkpoint.num_parameters()
        );
        Ok(checkpoint)
    }

    /// Read a PyTorch pickle state dict, converting every tensor to f32.
    ///
    /// Entries come back in the order the state dict was written.
    pub fn from_pickle(path: &Path) -> Result<Self> {
        let mut infos = read_pth_tensor_info(path, false, None)?;
        restore_file_order(&mut infos);

        let tensors = PthTensors::new(path, None)?;
        let mut checkpoint = Self::with_capacity(infos.len());
        for info in &infos {
            let tensor = tensors.get(&info.name)?.ok_or_else(|| {
                PlantHealthError::CheckpointFormat(format!("tensor '{}' has no readable storage", info.name))
            })?;
            let shape = tensor.dims().to_vec();
            let data = tensor.to_dtype(DType::F32)?.flatten_all()?.to_vec1::<f32>()?;
            checkpoint.insert(info.name.clone(), ParamTensor::new(shape, data)?);
        }

        Ok(checkpoint)
    }

    /// Parse the JSON weight format
    pub fn from_json_str(json: &str) -> Result<Self> {
        Self::from_json_slice(json.as_bytes())
    }

    /// Parse the JSON weight format from raw file contents
    pub fn from_json_slice(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| PlantHealthError::CheckpointFormat(format!("invalid JSON checkpoint: {}", e)))
    }

    /// Save in the JSON weight format
    pub fn save_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string(self)?;
        fs::write(path, json)?;

        info!("Checkpoint saved to {:?}", path);
        Ok(())
    }
}

// The pickle reader does not keep dict order (SETITEMS batches come back
// reversed). torch numbers storage records `data/0`, `data/1`, ... as it writes
// the state dict, so that numbering is the file order.
fn storage_position(info: &TensorInfo) -> Option<(usize, usize)> {
    let record = info.path.rsplit('/').next()?;
    Some((record.parse().ok()?, info.layout.start_offset()))
}

fn restore_file_order(infos: &mut [TensorInfo]) {
    if infos.iter().all(|info| storage_position(info).is_some()) {
        infos.sort_by_key(storage_position);
    } else {
        warn!("Checkpoint storage records are not numbered; keeping pickle order");
    }
}

impl Serialize for Checkpoint {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, tensor) in &self.entries {
            map.serialize_entry(key, tensor)?;
        }
        map.end()
    }
}

struct CheckpointVisitor;

impl<'de> Visitor<'de> for CheckpointVisitor {
    type Value = Checkpoint;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a map from parameter name to tensor")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<Checkpoint, A::Error> {
        let mut checkpoint = Checkpoint::with_capacity(access.size_hint().unwrap_or(0));

        // Entries arrive in document order
        while let Some((key, tensor)) = access.next_entry::<String, ParamTensor>()? {
            tensor
                .validate()
                .map_err(|e| de::Error::custom(format!("'{}': {}", key, e)))?;
            checkpoint.insert(key, tensor);
        }

        Ok(checkpoint)
    }
}

impl<'de> Deserialize<'de> for Checkpoint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_map(CheckpointVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;
    use zip::{CompressionMethod, ZipWriter};

    fn tensor(shape: &[usize]) -> ParamTensor {
        ParamTensor::zeros(shape.to_vec())
    }

    fn pickle_global(pkl: &mut Vec<u8>, module: &str, name: &str) {
        pkl.push(b'c');
        pkl.extend_from_slice(format!("{module}\n{name}\n").as_bytes());
    }

    fn pickle_str(pkl: &mut Vec<u8>, value: &str) {
        pkl.push(b'X');
        pkl.extend_from_slice(&(value.len() as u32).to_le_bytes());
        pkl.extend_from_slice(value.as_bytes());
    }

    fn pickle_int(pkl: &mut Vec<u8>, value: usize) {
        pkl.push(b'J');
        pkl.extend_from_slice(&(value as i32).to_le_bytes());
    }

    fn pickle_int_tuple(pkl: &mut Vec<u8>, values: &[usize]) {
        pkl.push(b'(');
        for &value in values {
            pickle_int(pkl, value);
        }
        pkl.push(b't');
    }

    fn pickle_empty_ordered_dict(pkl: &mut Vec<u8>) {
        pickle_global(pkl, "collections", "OrderedDict");
        pkl.extend_from_slice(b")R");
    }

    /// Write a state dict laid out like `torch.save`: `archive/data.pkl` holds
    /// an OrderedDict filled with one SETITEMS batch, `archive/data/<n>` holds
    /// the raw little-endian f32 storage of the n-th tensor.
    fn write_pth(path: &Path, entries: &[(&str, ParamTensor)]) {
        let mut pkl = vec![0x80, 0x02];
        pickle_empty_ordered_dict(&mut pkl);
        pkl.push(b'(');
        for (index, (name, tensor)) in entries.iter().enumerate() {
            let mut strides = vec![1; tensor.shape.len()];
            for dim in (0..tensor.shape.len().saturating_sub(1)).rev() {
                strides[dim] = strides[dim + 1] * tensor.shape[dim + 1];
            }

            pickle_str(&mut pkl, name);
            pickle_global(&mut pkl, "torch._utils", "_rebuild_tensor_v2");
            pkl.push(b'(');
            pkl.push(b'(');
            pickle_str(&mut pkl, "storage");
            pickle_global(&mut pkl, "torch", "FloatStorage");
            pickle_str(&mut pkl, &index.to_string());
            pickle_str(&mut pkl, "cpu");
            pickle_int(&mut pkl, tensor.numel());
            pkl.extend_from_slice(b"tQ");
            pickle_int(&mut pkl, 0);
            pickle_int_tuple(&mut pkl, &tensor.shape);
            pickle_int_tuple(&mut pkl, &strides);
            pkl.push(0x89);
            pickle_empty_ordered_dict(&mut pkl);
            pkl.extend_from_slice(b"tR");
        }
        pkl.extend_from_slice(b"u.");

        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        let mut zip = ZipWriter::new(fs::File::create(path).unwrap());
        zip.start_file("archive/data.pkl", options).unwrap();
        zip.write_all(&pkl).unwrap();
        for (index, (_, tensor)) in entries.iter().enumerate() {
            zip.start_file(format!("archive/data/{index}"), options).unwrap();
            for value in &tensor.data {
                zip.write_all(&value.to_le_bytes()).unwrap();
            }
        }
        zip.finish().unwrap();
    }

    fn filled(shape: &[usize], start: f32) -> ParamTensor {
        let numel: usize = shape.iter().product();
        let data = (0..numel).map(|i| start + i as f32).collect();
        ParamTensor::new(shape.to_vec(), data).unwrap()
    }

    fn vgg_head_entries() -> Vec<(&'static str, ParamTensor)> {
        vec![
            ("network.features.0.weight", filled(&[2, 3, 1, 1], 0.0)),
            ("network.classifier.0.weight", filled(&[8, 12], 100.0)),
            ("network.classifier.0.bias", filled(&[8], 200.0)),
            ("network.classifier.3.weight", filled(&[8, 8], 300.0)),
            ("network.classifier.3.bias", filled(&[8], 400.0)),
            ("network.classifier.6.weight", filled(&[3, 8], 500.0)),
            ("network.classifier.6.bias", filled(&[3], 600.0)),
        ]
    }

    #[test]
    fn test_pickle_keeps_state_dict_order() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("vgg_ft_model.pth");
        let entries = vgg_head_entries();
        write_pth(&path, &entries);

        let checkpoint = Checkpoint::load(&path).unwrap();

        let expected: Vec<&str> = entries.iter().map(|(name, _)| *name).collect();
        assert_eq!(checkpoint.keys().collect::<Vec<_>>(), expected);
        for (name, tensor) in &entries {
            assert_eq!(checkpoint.get(name), Some(tensor));
        }
    }

    #[test]
    fn test_pickle_class_count_is_stable_across_loads() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("vgg_ft_model.pth");
        write_pth(&path, &vgg_head_entries());

        let normalizer = CheckpointNormalizer::default();
        for _ in 0..10 {
            let checkpoint = normalizer.normalize(&Checkpoint::load(&path).unwrap());
            let head = infer_classifier_head(&checkpoint).unwrap();
            assert_eq!(head.key, "classifier.6.weight");
            assert_eq!(head.num_classes, 3);
        }
    }

    #[test]
    fn test_non_utf8_json_is_format_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("model.json");
        fs::write(&path, b"{\"fc.weight\": \xff\xfe}").unwrap();

        assert!(matches!(
            Checkpoint::load(&path),
            Err(PlantHealthError::CheckpointFormat(_))
        ));
    }

    #[test]
    fn test_param_tensor_validation() {
        assert!(ParamTensor::new(vec![2, 3], vec![0.0; 6]).is_ok());
        assert!(matches!(
            ParamTensor::new(vec![2, 3], vec![0.0; 5]),
            Err(PlantHealthError::CheckpointFormat(_))
        ));
    }

    #[test]
    fn test_insert_keeps_first_position() {
        let mut checkpoint = Checkpoint::new();
        checkpoint.insert("a", tensor(&[1]));
        checkpoint.insert("b", tensor(&[2]));
        let previous = checkpoint.insert("a", tensor(&[3]));

        assert_eq!(previous, Some(tensor(&[1])));
        assert_eq!(checkpoint.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(checkpoint.get("a").map(|t| t.shape.clone()), Some(vec![3]));
    }

    #[test]
    fn test_json_preserves_document_order() {
        let json = r#"{
            "zeta.weight": {"shape": [1], "data": [1.0]},
            "alpha.weight": {"shape": [2], "data": [2.0, 3.0]},
            "mid.bias": {"shape": [], "data": [4.0]}
        }"#;

        let checkpoint = Checkpoint::from_json_str(json).unwrap();

        assert_eq!(
            checkpoint.keys().collect::<Vec<_>>(),
            vec!["zeta.weight", "alpha.weight", "mid.bias"]
        );
        assert_eq!(checkpoint.get("alpha.weight").unwrap().data, vec![2.0, 3.0]);
    }

    #[test]
    fn test_json_rejects_inconsistent_tensor() {
        let json = r#"{"fc.weight": {"shape": [2, 2], "data": [1.0]}}"#;
        assert!(matches!(
            Checkpoint::from_json_str(json),
            Err(PlantHealthError::CheckpointFormat(_))
        ));
    }

    #[test]
    fn test_json_rejects_non_mapping() {
        assert!(matches!(
            Checkpoint::from_json_str("[1, 2, 3]"),
            Err(PlantHealthError::CheckpointFormat(_))
        ));
    }

    #[test]
    fn test_save_and_load_json() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("weights").join("model.json");

        let checkpoint = Checkpoint::from_entries(vec![
            ("network.classifier.6.weight", ParamTensor::new(vec![2, 1], vec![0.5, -0.5]).unwrap()),
            ("network.classifier.6.bias", ParamTensor::new(vec![2], vec![0.1, 0.2]).unwrap()),
        ]);
        checkpoint.save_json(&path).unwrap();

        let loaded = Checkpoint::load(&path).unwrap();
        assert_eq!(loaded, checkpoint);
        assert_eq!(loaded.num_parameters(), 4);
    }

    #[test]
    fn test_load_missing_and_unsupported() {
        let temp_dir = TempDir::new().unwrap();

        let missing = temp_dir.path().join("missing.pth");
        assert!(matches!(Checkpoint::load(&missing), Err(PlantHealthError::Io(_))));

        let unsupported = temp_dir.path().join("model.onnx");
        fs::write(&unsupported, b"not a checkpoint").unwrap();
        assert!(matches!(
            Checkpoint::load(&unsupported),
            Err(PlantHealthError::CheckpointFormat(_))
        ));
    }

    #[test]
    fn test_corrupt_pickle_is_format_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("corrupt.pth");
        fs::write(&path, b"definitely not a zip archive").unwrap();

        assert!(matches!(
            Checkpoint::load(&path),
            Err(PlantHealthError::CheckpointFormat(_))
        ));
    }
}

//! Parameter name normalization
//!
//! Training wrappers prepend a namespace to every parameter name
//! (`network.features.0.weight`, `module.classifier.6.bias`). The runtime
//! model uses the bare torchvision names, so the namespace is stripped before
//! inspection and loading.

use tracing::{debug, warn};

use super::Checkpoint;

/// Wrapper namespaces stripped by default
pub const DEFAULT_KEY_PREFIXES: [&str; 2] = ["network.", "module."];

/// Strips known namespace prefixes from checkpoint keys
#[derive(Debug, Clone)]
pub struct CheckpointNormalizer {
    prefixes: Vec<String>,
}

impl Default for CheckpointNormalizer {
    fn default() -> Self {
        Self::new(DEFAULT_KEY_PREFIXES)
    }
}

impl CheckpointNormalizer {
    /// Create a normalizer for the given prefixes. Empty prefixes are ignored.
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            prefixes: prefixes
                .into_iter()
                .map(Into::into)
                .filter(|prefix: &String| !prefix.is_empty())
                .collect(),
        }
    }

    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }

    /// Strip leading prefixes until none applies.
    ///
    /// Repeated stripping makes the transform idempotent:
    /// `normalize_key(normalize_key(k)) == normalize_key(k)`.
    pub fn normalize_key<'a>(&self, key: &'a str) -> &'a str {
        let mut key = key;
        while let Some(rest) = self
            .prefixes
            .iter()
            .find_map(|prefix| key.strip_prefix(prefix.as_str()))
        {
            key = rest;
        }
        key
    }

    /// Produce a new checkpoint with normalized keys.
    ///
    /// The input is left untouched. Every key is visited once, values are
    /// carried over unchanged, and iteration order is preserved.
    pub fn normalize(&self, checkpoint: &Checkpoint) -> Checkpoint {
        let mut normalized = Checkpoint::with_capacity(checkpoint.len());
        let mut renamed = 0;

        for (key, tensor) in checkpoint.iter() {
            let new_key = self.normalize_key(key);
            if new_key != key {
                renamed += 1;
            }
            if normalized.insert(new_key, tensor.clone()).is_some() {
                warn!(
                    "Checkpoint key '{}' collides with an earlier key after normalization; keeping the later tensor",
                    key
                );
            }
        }

        debug!(
            "Normalized {} of {} checkpoint keys (prefixes: {:?})",
            renamed,
            checkpoint.len(),
            self.prefixes
        );
        normalized
    }
}

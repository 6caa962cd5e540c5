//! Label taxonomy: class index -> label
//!
//! The model outputs class indices in the order the training data loader
//! enumerated its class directories, which is a sorted listing. Rebuilding
//! the labels from the same directory, sorted the same way, keeps indices
//! and labels aligned.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::utils::error::{PlantHealthError, Result};

/// Where the labels came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaxonomySource {
    /// Sorted directory listing
    Directory,
    /// `Class1..ClassN` placeholders
    Synthetic,
}

/// Ordered class labels; position is the class index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelTaxonomy {
    labels: Vec<String>,
    source: TaxonomySource,
}

impl LabelTaxonomy {
    /// Build the taxonomy from a reference directory, or synthesize
    /// `num_classes` placeholders when the path is absent.
    ///
    /// Only subdirectories count as classes, matching the dataset layout
    /// `root/<Crop>___<status>/<images>`.
    pub fn build(reference: Option<&Path>, num_classes: usize) -> Result<Self> {
        let taxonomy = match reference {
            Some(path) if path.exists() => Self::from_directory(path)?,
            Some(path) => {
                info!(
                    "Label directory {:?} not found, using {} placeholder labels",
                    path, num_classes
                );
                Self::synthetic(num_classes)
            }
            None => Self::synthetic(num_classes),
        };

        info!(
            "Label taxonomy: {} classes ({:?})",
            taxonomy.len(),
            taxonomy.source
        );
        Ok(taxonomy)
    }

    /// Sorted subdirectory names of `root`
    pub fn from_directory(root: &Path) -> Result<Self> {
        let mut labels = Vec::new();
        for entry in fs::read_dir(root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                let name = entry.file_name();
                let label = name.to_string_lossy();
                if name.to_str().is_none() {
                    warn!("Class directory name is not valid UTF-8, using {:?}", label);
                }
                labels.push(label.into_owned());
            }
        }

        // Byte-wise ordering, independent of locale and filesystem order
        labels.sort();

        Ok(Self {
            labels,
            source: TaxonomySource::Directory,
        })
    }

    /// `Class1`, `Class2`, ... `Class{num_classes}`
    pub fn synthetic(num_classes: usize) -> Self {
        Self {
            labels: (0..num_classes).map(|i| format!("Class{}", i + 1)).collect(),
            source: TaxonomySource::Synthetic,
        }
    }

    /// Fail unless there is exactly one label per model output
    pub fn ensure_matches(&self, num_classes: usize) -> Result<()> {
        if self.labels.len() != num_classes {
            return Err(PlantHealthError::ShapeMismatch {
                labels: self.labels.len(),
                classes: num_classes,
            });
        }
        Ok(())
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn source(&self) -> TaxonomySource {
        self.source
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

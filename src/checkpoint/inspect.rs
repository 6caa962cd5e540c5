//! Classifier head inspection
//!
//! The class count is read from the checkpoint itself: checkpoints come from
//! training runs with different dataset sizes, so external metadata cannot be
//! trusted for the output width.

use serde::Serialize;
use tracing::{info, warn};

use super::Checkpoint;
use crate::utils::error::{PlantHealthError, Result};

/// Marker for keys belonging to the classification block
pub const CLASSIFIER_MARKER: &str = "classifier";

/// Marker for weight (as opposed to bias) tensors
pub const WEIGHT_MARKER: &str = "weight";

/// The output projection found in a checkpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassifierHead {
    /// Normalized key of the output projection weight
    pub key: String,
    /// Output width of the projection
    pub num_classes: usize,
    /// Input width of the projection, if the weight is a matrix
    pub in_features: Option<usize>,
}

/// Keys naming a classifier weight tensor, in iteration order
pub fn classifier_weight_keys(checkpoint: &Checkpoint) -> Vec<&str> {
    checkpoint
        .keys()
        .filter(|key| key.contains(CLASSIFIER_MARKER) && key.contains(WEIGHT_MARKER))
        .collect()
}

/// Find the classifier output projection.
///
/// The last matching key in iteration order is the output projection, and
/// its first dimension is the class count.
pub fn infer_classifier_head(checkpoint: &Checkpoint) -> Result<ClassifierHead> {
    let candidates = classifier_weight_keys(checkpoint);
    let key = *candidates
        .last()
        .ok_or(PlantHealthError::ClassifierNotFound)?;

    check_iteration_order(&candidates, key);

    let tensor = checkpoint
        .get(key)
        .ok_or(PlantHealthError::ClassifierNotFound)?;
    let num_classes = match tensor.shape.first() {
        Some(&n) if n > 0 => n,
        _ => {
            return Err(PlantHealthError::CheckpointFormat(format!(
                "classifier weight '{}' has unusable shape {:?}",
                key, tensor.shape
            )))
        }
    };

    info!(
        "Inferred {} classes from '{}' (shape {:?})",
        num_classes, key, tensor.shape
    );

    Ok(ClassifierHead {
        key: key.to_string(),
        num_classes,
        in_features: tensor.shape.get(1).copied(),
    })
}

/// Shortcut for [`infer_classifier_head`] returning only the class count
pub fn infer_num_classes(checkpoint: &Checkpoint) -> Result<usize> {
    infer_classifier_head(checkpoint).map(|head| head.num_classes)
}

/// Numeric layer index embedded in a key, e.g. 6 in `classifier.6.weight`
fn layer_index(key: &str) -> Option<usize> {
    key.split('.').filter_map(|part| part.parse().ok()).last()
}

// Iteration order decides; a later layer index appearing earlier means the
// file was written in an unexpected order, which is worth surfacing.
fn check_iteration_order(candidates: &[&str], chosen: &str) {
    let Some(chosen_index) = layer_index(chosen) else {
        return;
    };

    if let Some(deeper) = candidates
        .iter()
        .filter(|key| layer_index(key).is_some_and(|index| index > chosen_index))
        .last()
    {
        warn!(
            "Classifier key '{}' comes last in the checkpoint but '{}' has a higher layer index; using '{}'",
            chosen, deeper, chosen
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::ParamTensor;

    fn with_shapes(entries: &[(&str, &[usize])]) -> Checkpoint {
        Checkpoint::from_entries(
            entries
                .iter()
                .map(|(key, shape)| (key.to_string(), ParamTensor::zeros(shape.to_vec()))),
        )
    }

    #[test]
    fn test_last_classifier_weight_wins() {
        let checkpoint = with_shapes(&[
            ("features.0.weight", &[4, 3, 3, 3]),
            ("classifier.3.weight", &[10, 8]),
            ("classifier.3.bias", &[10]),
            ("classifier.6.weight", &[37, 10]),
            ("classifier.6.bias", &[37]),
        ]);

        let head = infer_classifier_head(&checkpoint).unwrap();
        assert_eq!(head.num_classes, 37);
        assert_eq!(head.key, "classifier.6.weight");
        assert_eq!(head.in_features, Some(10));
    }

    #[test]
    fn test_iteration_order_not_layer_index_decides() {
        let checkpoint = with_shapes(&[
            ("classifier.6.weight", &[37, 10]),
            ("classifier.3.weight", &[10, 8]),
        ]);

        assert_eq!(infer_num_classes(&checkpoint).unwrap(), 10);
    }

    #[test]
    fn test_bias_only_classifier_is_not_found() {
        let checkpoint = with_shapes(&[
            ("features.0.weight", &[4, 3, 3, 3]),
            ("classifier.6.bias", &[38]),
        ]);

        assert!(matches!(
            infer_num_classes(&checkpoint),
            Err(PlantHealthError::ClassifierNotFound)
        ));
    }

    #[test]
    fn test_empty_checkpoint_is_not_found() {
        assert!(matches!(
            infer_num_classes(&Checkpoint::new()),
            Err(PlantHealthError::ClassifierNotFound)
        ));
    }

    #[test]
    fn test_scalar_classifier_weight_is_rejected() {
        let checkpoint = with_shapes(&[("classifier.weight", &[])]);
        assert!(matches!(
            infer_num_classes(&checkpoint),
            Err(PlantHealthError::CheckpointFormat(_))
        ));
    }

    #[test]
    fn test_layer_index() {
        assert_eq!(layer_index("classifier.6.weight"), Some(6));
        assert_eq!(layer_index("classifier.fc.weight"), None);
        assert_eq!(layer_index("features.10.conv.2.weight"), Some(2));
    }
}

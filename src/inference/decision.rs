//! Decision policy: from predicted label and confidence to a crop/status verdict

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::dataset::LABEL_DELIMITER;
use crate::utils::error::{PlantHealthError, Result};
use crate::DEFAULT_CONFIDENCE_THRESHOLD;

/// Health status reported for a prediction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    Healthy,
    Diseased,
    /// Confidence fell below the threshold
    Uncertain,
    /// The label carries no status part
    Unknown,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "Healthy"),
            HealthStatus::Diseased => write!(f, "Diseased"),
            HealthStatus::Uncertain => write!(f, "Uncertain"),
            HealthStatus::Unknown => write!(f, "Unknown"),
        }
    }
}

/// The human-facing outcome of one request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub crop_name: String,
    pub status: HealthStatus,
    /// Probability of the predicted class, in [0, 1]
    pub confidence: f32,
}

impl fmt::Display for DecisionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {} (Confidence: {:.2})",
            self.crop_name, self.status, self.confidence
        )
    }
}

/// Turns a predicted label into a [`DecisionRecord`]
#[derive(Debug, Clone)]
pub struct DecisionPolicy {
    threshold: f32,
    delimiter: String,
}

impl Default for DecisionPolicy {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            delimiter: LABEL_DELIMITER.to_string(),
        }
    }
}

impl DecisionPolicy {
    /// Policy with the given uncertainty threshold
    pub fn new(threshold: f32) -> Result<Self> {
        validate_threshold(threshold)?;
        Ok(Self {
            threshold,
            ..Default::default()
        })
    }

    /// Use a different crop/status separator
    pub fn with_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = delimiter.into();
        self
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Decide with the configured threshold
    pub fn decide(&self, label: &str, confidence: f32) -> DecisionRecord {
        self.decide_with_threshold(label, confidence, self.threshold)
    }

    /// Decide with an explicit threshold.
    ///
    /// 1. split the label on the first delimiter into crop and raw status;
    ///    without a delimiter the status is `Unknown`
    /// 2. a raw status containing "healthy" (any case) is `Healthy`,
    ///    anything else, including an empty status, is `Diseased`
    /// 3. confidence below the threshold overrides the status with `Uncertain`
    pub fn decide_with_threshold(&self, label: &str, confidence: f32, threshold: f32) -> DecisionRecord {
        let (crop_name, status) = match label.split_once(self.delimiter.as_str()) {
            Some((crop, raw_status)) => (crop, classify_status(raw_status)),
            None => (label, HealthStatus::Unknown),
        };

        let status = if confidence < threshold {
            HealthStatus::Uncertain
        } else {
            status
        };

        DecisionRecord {
            crop_name: crop_name.to_string(),
            status,
            confidence,
        }
    }
}

// Substring match: a disease name containing "healthy" would be misread.
fn classify_status(raw_status: &str) -> HealthStatus {
    if raw_status.to_lowercase().contains("healthy") {
        HealthStatus::Healthy
    } else {
        HealthStatus::Diseased
    }
}

/// Thresholds are probabilities
pub fn validate_threshold(threshold: f32) -> Result<()> {
    if !(0.0..=1.0).contains(&threshold) {
        return Err(PlantHealthError::InvalidInput(format!(
            "confidence threshold must be in [0, 1], got {}",
            threshold
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> DecisionPolicy {
        DecisionPolicy::new(0.75).unwrap()
    }

    #[test]
    fn test_confident_healthy() {
        let record = policy().decide("Tomato___healthy", 0.92);
        assert_eq!(
            record,
            DecisionRecord {
                crop_name: "Tomato".to_string(),
                status: HealthStatus::Healthy,
                confidence: 0.92,
            }
        );
    }

    #[test]
    fn test_low_confidence_overrides_healthy() {
        let record = policy().decide("Tomato___healthy", 0.40);
        assert_eq!(record.crop_name, "Tomato");
        assert_eq!(record.status, HealthStatus::Uncertain);
        assert_eq!(record.confidence, 0.40);
    }

    #[test]
    fn test_no_delimiter_is_unknown() {
        let record = policy().decide("CornRust", 0.9);
        assert_eq!(record.crop_name, "CornRust");
        assert_eq!(record.status, HealthStatus::Unknown);
        assert_eq!(record.confidence, 0.9);
    }

    #[test]
    fn test_low_confidence_overrides_unknown() {
        let record = policy().decide("CornRust", 0.3);
        assert_eq!(record.status, HealthStatus::Uncertain);
    }

    #[test]
    fn test_disease_label_is_diseased() {
        let record = policy().decide("Potato___Late_blight", 0.99);
        assert_eq!(record.crop_name, "Potato");
        assert_eq!(record.status, HealthStatus::Diseased);
    }

    #[test]
    fn test_empty_status_is_diseased() {
        let record = policy().decide("Squash___", 0.8);
        assert_eq!(record.crop_name, "Squash");
        assert_eq!(record.status, HealthStatus::Diseased);
    }

    #[test]
    fn test_only_first_delimiter_splits() {
        let record = policy().decide("Pepper___bell___Healthy", 0.8);
        assert_eq!(record.crop_name, "Pepper");
        // "bell___Healthy" contains "healthy" case-insensitively
        assert_eq!(record.status, HealthStatus::Healthy);

        let record = policy().decide("Pepper___bell___spot", 0.8);
        assert_eq!(record.status, HealthStatus::Diseased);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        assert_eq!(policy().decide("Apple___healthy", 0.75).status, HealthStatus::Healthy);
    }

    #[test]
    fn test_explicit_threshold() {
        let record = policy().decide_with_threshold("Apple___healthy", 0.6, 0.5);
        assert_eq!(record.status, HealthStatus::Healthy);
    }

    #[test]
    fn test_custom_delimiter() {
        let policy = policy().with_delimiter("_");
        let record = policy.decide("Grape_Black_rot", 0.9);
        assert_eq!(record.crop_name, "Grape");
        assert_eq!(record.status, HealthStatus::Diseased);
    }

    #[test]
    fn test_invalid_threshold() {
        assert!(matches!(
            DecisionPolicy::new(1.2),
            Err(PlantHealthError::InvalidInput(_))
        ));
        assert!(DecisionPolicy::new(f32::NAN).is_err());
    }

    #[test]
    fn test_display() {
        let record = policy().decide("Tomato___healthy", 0.92);
        assert_eq!(record.to_string(), "Tomato - Healthy (Confidence: 0.92)");
    }
}

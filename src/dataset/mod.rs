//! Dataset conventions for plant disease labels
//!
//! Class directories are named `<Crop>___<status>`, e.g. `Tomato___Late_blight`
//! or `Apple___healthy`.

pub mod taxonomy;

pub use taxonomy::{LabelTaxonomy, TaxonomySource};

/// Separator between crop name and status in a class label
pub const LABEL_DELIMITER: &str = "___";

/// Split a label into crop and status on the first delimiter
pub fn split_label(label: &str) -> Option<(&str, &str)> {
    label.split_once(LABEL_DELIMITER)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_label() {
        assert_eq!(split_label("Tomato___Late_blight"), Some(("Tomato", "Late_blight")));
        assert_eq!(split_label("Corn_(maize)___healthy"), Some(("Corn_(maize)", "healthy")));
        assert_eq!(split_label("CornRust"), None);
    }
}

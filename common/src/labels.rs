//! Fixed label table of the currency classifier.
//!
use std::fmt;

use serde::{Deserialize, Serialize};

/// Currency note the classifier can recognize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum Label {
    #[serde(rename = "100 Rupee note")]
    Rupees100,
    #[serde(rename = "200 Rupee note")]
    Rupees200,
    #[serde(rename = "500 Rupee note")]
    Rupees500,
}

/// Labels in the order of the model output vector.
pub const LABELS: [Label; 3] = [Label::Rupees100, Label::Rupees200, Label::Rupees500];

impl Label {
    /// Label for an index of the model output, if the index is in the table.
    pub fn from_index(index: usize) -> Option<Label> {
        LABELS.get(index).copied()
    }

    /// Text shown and spoken for this label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Rupees100 => "100 Rupee note",
            Label::Rupees200 => "200 Rupee note",
            Label::Rupees500 => "500 Rupee note",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod test {

    use super::*;

    #[test]
    fn test_index_to_label() {
        assert_eq!(Label::from_index(0).map(|l| l.as_str()), Some("100 Rupee note"));
        assert_eq!(Label::from_index(1).map(|l| l.as_str()), Some("200 Rupee note"));
        assert_eq!(Label::from_index(2).map(|l| l.as_str()), Some("500 Rupee note"));
        assert_eq!(Label::from_index(3), None);
    }

    #[test]
    fn test_serialized_as_display_text() -> Result<(), serde_json::Error> {
        for label in LABELS {
            let serialized = serde_json::to_string(&label)?;
            assert_eq!(serialized, format!("\"{label}\""));
        }

        Ok(())
    }
}

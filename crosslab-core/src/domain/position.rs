use serde::{Deserialize, Serialize};

/// Exposure to the single traded asset. All-in or all-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionState {
    #[default]
    Flat,
    Long,
}

impl PositionState {
    pub fn is_long(self) -> bool {
        self == PositionState::Long
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PositionState::Flat => "flat",
            PositionState::Long => "long",
        }
    }
}

impl std::fmt::Display for PositionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_flat() {
        assert_eq!(PositionState::default(), PositionState::Flat);
        assert!(!PositionState::Flat.is_long());
        assert!(PositionState::Long.is_long());
    }

    #[test]
    fn serializes_lowercase() {
        assert_eq!(serde_json::to_string(&PositionState::Long).unwrap(), "\"long\"");
    }
}

//! Process vocabulary and stock state model

use std::fmt;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

/// A named manufacturing process step.
///
/// The vocabulary is open: the well-known shop-floor processes get their own
/// variants, anything else becomes [`ProcessName::Custom`]. Parsing therefore
/// never fails for a non-empty name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProcessName {
    Cutting,
    Bending,
    Welding,
    Zinc,
    Painting,
    Assembly,
    Machining,
    Polishing,
    Custom(String),
}

impl ProcessName {
    pub fn as_str(&self) -> &str {
        match self {
            ProcessName::Cutting => "cutting",
            ProcessName::Bending => "bending",
            ProcessName::Welding => "welding",
            ProcessName::Zinc => "zinc",
            ProcessName::Painting => "painting",
            ProcessName::Assembly => "assembly",
            ProcessName::Machining => "machining",
            ProcessName::Polishing => "polishing",
            ProcessName::Custom(name) => name,
        }
    }

    /// Parse a process name. Unknown names map to [`ProcessName::Custom`]
    /// in canonical lowercase form; only an empty name is rejected.
    pub fn parse(s: &str) -> Result<Self, &'static str> {
        let normalized = s.trim().to_lowercase();
        match normalized.as_str() {
            "" => Err("Process name cannot be empty"),
            "cutting" => Ok(ProcessName::Cutting),
            "bending" => Ok(ProcessName::Bending),
            "welding" => Ok(ProcessName::Welding),
            "zinc" => Ok(ProcessName::Zinc),
            "painting" => Ok(ProcessName::Painting),
            "assembly" => Ok(ProcessName::Assembly),
            "machining" => Ok(ProcessName::Machining),
            "polishing" => Ok(ProcessName::Polishing),
            _ => Ok(ProcessName::Custom(normalized)),
        }
    }
}

impl fmt::Display for ProcessName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for ProcessName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ProcessName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        ProcessName::parse(&s).map_err(de::Error::custom)
    }
}

/// A discrete state a quantity of material can reside in.
///
/// Each batch and item holds one quantity per state; work-in-process is
/// tracked per process name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StockState {
    Raw,
    Wip(ProcessName),
    Finished,
    Scrap,
    Inspection,
}

impl StockState {
    /// Canonical key form used for persistence and map serialization:
    /// `raw`, `wip:<process>`, `finished`, `scrap`, `inspection`.
    pub fn key(&self) -> String {
        match self {
            StockState::Raw => "raw".to_string(),
            StockState::Wip(process) => format!("wip:{}", process.as_str()),
            StockState::Finished => "finished".to_string(),
            StockState::Scrap => "scrap".to_string(),
            StockState::Inspection => "inspection".to_string(),
        }
    }

    pub fn parse_key(key: &str) -> Result<Self, &'static str> {
        match key {
            "raw" => Ok(StockState::Raw),
            "finished" => Ok(StockState::Finished),
            "scrap" => Ok(StockState::Scrap),
            "inspection" => Ok(StockState::Inspection),
            _ => match key.strip_prefix("wip:") {
                Some(process) => Ok(StockState::Wip(ProcessName::parse(process)?)),
                None => Err("Unrecognized stock state key"),
            },
        }
    }

    pub fn is_wip(&self) -> bool {
        matches!(self, StockState::Wip(_))
    }
}

impl fmt::Display for StockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

// States serialize as their canonical key so state maps come out as plain
// string-keyed JSON objects.
impl Serialize for StockState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.key())
    }
}

impl<'de> Deserialize<'de> for StockState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        StockState::parse_key(&s).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_process() {
        assert_eq!(ProcessName::parse("cutting").unwrap(), ProcessName::Cutting);
        assert_eq!(ProcessName::parse("  Welding ").unwrap(), ProcessName::Welding);
        assert_eq!(ProcessName::parse("ZINC").unwrap(), ProcessName::Zinc);
    }

    #[test]
    fn test_parse_custom_process() {
        assert_eq!(
            ProcessName::parse("laser etching").unwrap(),
            ProcessName::Custom("laser etching".to_string())
        );
    }

    #[test]
    fn test_parse_empty_process_rejected() {
        assert!(ProcessName::parse("").is_err());
        assert!(ProcessName::parse("   ").is_err());
    }

    #[test]
    fn test_state_key_round_trip() {
        let states = [
            StockState::Raw,
            StockState::Wip(ProcessName::Cutting),
            StockState::Wip(ProcessName::Custom("anodizing".to_string())),
            StockState::Finished,
            StockState::Scrap,
            StockState::Inspection,
        ];
        for state in states {
            assert_eq!(StockState::parse_key(&state.key()).unwrap(), state);
        }
    }

    #[test]
    fn test_bad_state_key_rejected() {
        assert!(StockState::parse_key("molten").is_err());
        assert!(StockState::parse_key("wip:").is_err());
    }
}

//! Resource types exposed by the open-data API

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

/// One of the fixed categories of external data.
///
/// Every resource type owns exactly one sync cursor row and its own
/// normalized record table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Members,
    Speeches,
    Documents,
    Votes,
}

impl ResourceType {
    /// All known resource types, in declaration order
    pub const ALL: [ResourceType; 4] = [
        ResourceType::Members,
        ResourceType::Speeches,
        ResourceType::Documents,
        ResourceType::Votes,
    ];

    /// Stable lowercase name used in storage, URLs and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Members => "members",
            ResourceType::Speeches => "speeches",
            ResourceType::Documents => "documents",
            ResourceType::Votes => "votes",
        }
    }

    /// Default position in the strategic plan (lower runs first).
    ///
    /// Members come first so speeches and votes can be related to them.
    pub fn default_priority(&self) -> u32 {
        match self {
            ResourceType::Members => 1,
            ResourceType::Documents => 2,
            ResourceType::Speeches => 3,
            ResourceType::Votes => 4,
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "members" => Ok(ResourceType::Members),
            "speeches" => Ok(ResourceType::Speeches),
            "documents" => Ok(ResourceType::Documents),
            "votes" => Ok(ResourceType::Votes),
            other => Err(DomainError::UnknownResourceType(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_types() {
        for resource in ResourceType::ALL {
            let parsed: ResourceType = resource.as_str().parse().unwrap();
            assert_eq!(parsed, resource);
        }
        assert_eq!(
            " Speeches ".parse::<ResourceType>().unwrap(),
            ResourceType::Speeches
        );
    }

    #[test]
    fn test_parse_unknown_type_fails() {
        let err = "committees".parse::<ResourceType>().unwrap_err();
        assert_eq!(err, DomainError::UnknownResourceType("committees".into()));
    }

    #[test]
    fn test_serde_uses_snake_case() {
        let json = serde_json::to_string(&ResourceType::Votes).unwrap();
        assert_eq!(json, "\"votes\"");
        let back: ResourceType = serde_json::from_str("\"documents\"").unwrap();
        assert_eq!(back, ResourceType::Documents);
    }

    #[test]
    fn test_default_priorities_are_distinct() {
        let mut priorities: Vec<u32> = ResourceType::ALL
            .iter()
            .map(|r| r.default_priority())
            .collect();
        priorities.sort_unstable();
        priorities.dedup();
        assert_eq!(priorities.len(), ResourceType::ALL.len());
    }
}

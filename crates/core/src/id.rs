//! Strongly-typed identifiers.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::AccessError;

/// Identifier the licensing backend assigned to this installation.
///
/// Assigned at registration and opaque to the client; the only rule is that
/// it is non-empty once surrounding whitespace is removed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SystemId(String);

impl SystemId {
    pub fn new(raw: impl Into<String>) -> Result<Self, AccessError> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(AccessError::invalid_id("SystemId: empty"));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for SystemId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SystemId {
    type Err = AccessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for SystemId {
    type Error = AccessError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SystemId> for String {
    fn from(value: SystemId) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_and_rejects_blank() {
        assert_eq!(SystemId::new("  PH-0042 ").unwrap().as_str(), "PH-0042");
        assert!(matches!(SystemId::new("   "), Err(AccessError::InvalidId(_))));
    }

    #[test]
    fn deserializes_through_validation() {
        let id: SystemId = serde_json::from_str("\"PH-7\"").unwrap();
        assert_eq!(id.to_string(), "PH-7");
        assert!(serde_json::from_str::<SystemId>("\"\"").is_err());
    }
}

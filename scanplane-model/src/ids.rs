use std::{fmt, str::FromStr};

use uuid::Uuid;

/// Identifier of a registered scanner adapter.
///
/// Freshly registered adapters receive a v7 UUID, but any non-empty string is
/// accepted so operators can pin readable ids such as `trivy-1`.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(transparent)
)]
pub struct AdapterId(pub String);

impl AdapterId {
    pub fn generate() -> Self {
        AdapterId(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl From<&str> for AdapterId {
    fn from(value: &str) -> Self {
        AdapterId(value.to_string())
    }
}

impl From<String> for AdapterId {
    fn from(value: String) -> Self {
        AdapterId(value)
    }
}

impl AsRef<str> for AdapterId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AdapterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Numeric id of a persisted scan result row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(transparent)
)]
pub struct ResultId(pub i64);

impl ResultId {
    pub fn get(self) -> i64 {
        self.0
    }

    /// Ids are assigned by the store starting at 1.
    pub fn is_valid(self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for ResultId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ResultId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<i64>().map(ResultId)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_adapter_ids_are_unique_and_non_empty() {
        let a = AdapterId::generate();
        let b = AdapterId::generate();
        assert!(!a.is_empty());
        assert_ne!(a, b);
    }

    #[test]
    fn result_id_parses_from_path_segment() {
        assert_eq!("42".parse::<ResultId>().unwrap(), ResultId(42));
        assert!("abc".parse::<ResultId>().is_err());
        assert!(!ResultId(0).is_valid());
    }
}

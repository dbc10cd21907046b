//! Report contract returned by an adapter's report endpoint.
//!
//! Severities travel either as their numeric code (`1..=5`) or as a
//! case-insensitive name. A code of `0`, `null` or an empty name means the
//! adapter has not graded the artifact yet.

use std::{fmt, str::FromStr};

use crate::error::ModelError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    None,
    Unknown,
    Low,
    Medium,
    High,
}

impl Severity {
    pub const ALL: [Severity; 5] = [
        Severity::None,
        Severity::Unknown,
        Severity::Low,
        Severity::Medium,
        Severity::High,
    ];

    pub fn code(self) -> i64 {
        match self {
            Severity::None => 1,
            Severity::Unknown => 2,
            Severity::Low => 3,
            Severity::Medium => 4,
            Severity::High => 5,
        }
    }

    pub fn from_code(code: i64) -> Option<Severity> {
        Severity::ALL.into_iter().find(|sev| sev.code() == code)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::None => "None",
            Severity::Unknown => "Unknown",
            Severity::Low => "Low",
            Severity::Medium => "Medium",
            Severity::High => "High",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        Severity::ALL
            .into_iter()
            .find(|sev| sev.as_str().eq_ignore_ascii_case(raw))
            .ok_or_else(|| ModelError::UnknownSeverity(s.to_string()))
    }
}

/// Explicit progress marker some adapters attach to their reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ReportStatus {
    #[cfg_attr(feature = "serde", serde(alias = "pending", alias = "PENDING"))]
    Pending,
    #[cfg_attr(feature = "serde", serde(alias = "running", alias = "RUNNING"))]
    Running,
    #[cfg_attr(feature = "serde", serde(alias = "success", alias = "SUCCESS"))]
    Success,
    #[cfg_attr(feature = "serde", serde(alias = "error", alias = "ERROR"))]
    Error,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScanReport {
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub status: Option<ReportStatus>,
    #[cfg_attr(
        feature = "serde",
        serde(
            default,
            skip_serializing_if = "Option::is_none",
            deserialize_with = "serde_impl::optional_severity"
        )
    )]
    pub severity: Option<Severity>,
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub overview: Option<ComponentsOverview>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub vulnerabilities: Vec<VulnerabilityItem>,
}

impl ScanReport {
    /// Whether the adapter has finished producing this report.
    ///
    /// An explicit `status` wins; without one the report is complete once
    /// it carries a severity. `Severity::None` counts as complete, so a clean
    /// image is not mistaken for an unfinished scan.
    pub fn is_ready(&self) -> bool {
        match self.status {
            Some(status) => status == ReportStatus::Success,
            None => self.severity.is_some(),
        }
    }

    pub fn has_failed(&self) -> bool {
        self.status == Some(ReportStatus::Error)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ComponentsOverview {
    pub total: u64,
    #[cfg_attr(feature = "serde", serde(default))]
    pub summary: Vec<SeverityCount>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SeverityCount {
    pub severity: Severity,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "camelCase")
)]
pub struct VulnerabilityItem {
    pub id: String,
    pub severity: Severity,
    pub package: String,
    pub version: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub description: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub link: String,
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub fixed_version: Option<String>,
}

#[cfg(feature = "serde")]
mod serde_impl {
    use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

    use super::Severity;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawSeverity {
        Code(i64),
        Name(String),
    }

    impl RawSeverity {
        fn resolve<E: de::Error>(self) -> Result<Option<Severity>, E> {
            match self {
                RawSeverity::Code(0) => Ok(None),
                RawSeverity::Code(code) => Severity::from_code(code)
                    .map(Some)
                    .ok_or_else(|| {
                        E::custom(format!("unknown severity code {code}"))
                    }),
                RawSeverity::Name(name) if name.trim().is_empty() => Ok(None),
                RawSeverity::Name(name) => {
                    name.parse().map(Some).map_err(E::custom)
                }
            }
        }
    }

    impl Serialize for Severity {
        fn serialize<S: Serializer>(
            &self,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            serializer.serialize_str(self.as_str())
        }
    }

    impl<'de> Deserialize<'de> for Severity {
        fn deserialize<D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Self, D::Error> {
            RawSeverity::deserialize(deserializer)?
                .resolve()?
                .ok_or_else(|| de::Error::custom("severity is not graded"))
        }
    }

    pub(super) fn optional_severity<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Severity>, D::Error> {
        match Option::<RawSeverity>::deserialize(deserializer)? {
            Some(raw) => raw.resolve(),
            None => Ok(None),
        }
    }
}

use std::{fmt, str::FromStr};

use crate::error::ModelError;

/// Lifecycle of a scan result row.
///
/// Statuses are totally ordered by [`ScanStatus::code`]:
/// `Pending(0) < Running(1) < {Success, Error, Stopped}(2)`. A stored row
/// never moves to a lower code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ScanStatus {
    Pending,
    Running,
    Success,
    Error,
    Stopped,
}

impl ScanStatus {
    pub const ALL: [ScanStatus; 5] = [
        ScanStatus::Pending,
        ScanStatus::Running,
        ScanStatus::Success,
        ScanStatus::Error,
        ScanStatus::Stopped,
    ];

    pub fn code(self) -> i32 {
        match self {
            ScanStatus::Pending => 0,
            ScanStatus::Running => 1,
            ScanStatus::Success | ScanStatus::Error | ScanStatus::Stopped => 2,
        }
    }

    pub fn is_terminal(self) -> bool {
        self.code() >= 2
    }

    /// True when writing `self` over a row currently at `current` moves the
    /// row forward.
    pub fn advances(self, current: ScanStatus) -> bool {
        self.code() > current.code()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ScanStatus::Pending => "Pending",
            ScanStatus::Running => "Running",
            ScanStatus::Success => "Success",
            ScanStatus::Error => "Error",
            ScanStatus::Stopped => "Stopped",
        }
    }
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScanStatus {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        ScanStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(raw))
            .ok_or_else(|| ModelError::UnknownStatus(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses_share_the_highest_code() {
        assert_eq!(ScanStatus::Pending.code(), 0);
        assert_eq!(ScanStatus::Running.code(), 1);
        for status in [ScanStatus::Success, ScanStatus::Error, ScanStatus::Stopped]
        {
            assert_eq!(status.code(), 2);
            assert!(status.is_terminal());
        }
        assert!(!ScanStatus::Running.is_terminal());
    }

    #[test]
    fn terminal_status_does_not_advance_over_another_terminal() {
        assert!(ScanStatus::Running.advances(ScanStatus::Pending));
        assert!(ScanStatus::Error.advances(ScanStatus::Running));
        assert!(!ScanStatus::Error.advances(ScanStatus::Success));
        assert!(!ScanStatus::Pending.advances(ScanStatus::Pending));
    }

    #[test]
    fn parses_case_insensitively_and_rejects_unknown() {
        assert_eq!("running".parse::<ScanStatus>(), Ok(ScanStatus::Running));
        assert_eq!(" Success ".parse::<ScanStatus>(), Ok(ScanStatus::Success));
        assert_eq!(
            "Queued".parse::<ScanStatus>(),
            Err(ModelError::UnknownStatus("Queued".into()))
        );
    }
}

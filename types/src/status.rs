//! Proposal status codes and the vetting state machine.
//!
//! The numeric codes and names are part of the storage format and must not
//! change:
//!
//! | code | name     |
//! |------|----------|
//! | 0    | invalid  |
//! | 1    | unvetted |
//! | 2    | vetted   |
//! | 3    | censored |
//!
//! The only legal transitions are `unvetted -> vetted` and
//! `unvetted -> censored`. Vetting is a one-way gate.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Status of a proposal storage record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum PsrStatus {
    /// Record construction failed. Never persisted, never returned.
    Invalid = 0,
    Unvetted = 1,
    Vetted = 2,
    Censored = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unknown proposal status code {0}")]
pub struct StatusCodeError(pub i64);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown proposal status {0:?}")]
pub struct ParseStatusError(pub String);

/// A requested status change that the state machine does not allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid proposal status transition: {from} -> {to}")]
pub struct InvalidTransition {
    pub from: PsrStatus,
    pub to: PsrStatus,
}

impl PsrStatus {
    pub const ALL: [Self; 4] = [
        Self::Invalid,
        Self::Unvetted,
        Self::Vetted,
        Self::Censored,
    ];

    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: i64) -> Result<Self, StatusCodeError> {
        match code {
            0 => Ok(Self::Invalid),
            1 => Ok(Self::Unvetted),
            2 => Ok(Self::Vetted),
            3 => Ok(Self::Censored),
            other => Err(StatusCodeError(other)),
        }
    }

    /// Human-readable name of the status code.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Invalid => "invalid",
            Self::Unvetted => "unvetted",
            Self::Vetted => "vetted",
            Self::Censored => "censored",
        }
    }

    /// Whether a record may rest in this status. `Invalid` is only a sentinel.
    #[must_use]
    pub const fn is_resting(self) -> bool {
        !matches!(self, Self::Invalid)
    }

    #[must_use]
    pub const fn can_transition_to(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Unvetted, Self::Vetted | Self::Censored)
        )
    }

    /// Apply the vetting state machine. Returns the new status on success.
    pub const fn transition(self, to: Self) -> Result<Self, InvalidTransition> {
        if self.can_transition_to(to) {
            Ok(to)
        } else {
            Err(InvalidTransition { from: self, to })
        }
    }
}

impl fmt::Display for PsrStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PsrStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseStatusError(s.to_string()))
    }
}

impl TryFrom<i64> for PsrStatus {
    type Error = StatusCodeError;

    fn try_from(code: i64) -> Result<Self, Self::Error> {
        Self::from_code(code)
    }
}

impl From<PsrStatus> for i64 {
    fn from(status: PsrStatus) -> Self {
        i64::from(status.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_and_names_are_stable() {
        let table: Vec<(u8, &str)> = PsrStatus::ALL
            .iter()
            .map(|s| (s.code(), s.name()))
            .collect();
        assert_eq!(
            table,
            vec![
                (0, "invalid"),
                (1, "unvetted"),
                (2, "vetted"),
                (3, "censored")
            ]
        );
    }

    #[test]
    fn from_code_rejects_unknown_codes() {
        for status in PsrStatus::ALL {
            assert_eq!(PsrStatus::from_code(i64::from(status)), Ok(status));
        }
        assert_eq!(PsrStatus::from_code(4), Err(StatusCodeError(4)));
        assert_eq!(PsrStatus::from_code(-1), Err(StatusCodeError(-1)));
    }

    #[test]
    fn only_unvetted_has_exits() {
        let legal: Vec<(PsrStatus, PsrStatus)> = PsrStatus::ALL
            .into_iter()
            .flat_map(|from| PsrStatus::ALL.into_iter().map(move |to| (from, to)))
            .filter(|(from, to)| from.can_transition_to(*to))
            .collect();
        assert_eq!(
            legal,
            vec![
                (PsrStatus::Unvetted, PsrStatus::Vetted),
                (PsrStatus::Unvetted, PsrStatus::Censored),
            ]
        );
    }

    #[test]
    fn transition_reports_both_ends() {
        let err = PsrStatus::Vetted
            .transition(PsrStatus::Censored)
            .unwrap_err();
        assert_eq!(err.from, PsrStatus::Vetted);
        assert_eq!(err.to, PsrStatus::Censored);
        assert_eq!(
            err.to_string(),
            "invalid proposal status transition: vetted -> censored"
        );
    }

    #[test]
    fn self_transition_is_illegal() {
        assert!(PsrStatus::Unvetted.transition(PsrStatus::Unvetted).is_err());
    }

    #[test]
    fn parse_accepts_names() {
        assert_eq!("Vetted".parse::<PsrStatus>(), Ok(PsrStatus::Vetted));
        assert!("published".parse::<PsrStatus>().is_err());
    }

    #[test]
    fn serializes_as_lowercase_name() {
        let json = serde_json::to_string(&PsrStatus::Censored).unwrap();
        assert_eq!(json, "\"censored\"");
    }
}

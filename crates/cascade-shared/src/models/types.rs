//! # Status Enums
//!
//! Small integer status codes persisted as `SMALLINT`. The numeric values
//! are part of the wire contract and must not change.

/// Task execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[repr(i16)]
pub enum TaskStatus {
    NotStarted = 0,
    InProgress = 1,
    Submitted = 2,
    Completed = 3,
    Rejected = 4,
}

impl TaskStatus {
    pub fn as_i16(self) -> i16 {
        self as i16
    }

    pub fn from_i16(value: i16) -> Option<Self> {
        match value {
            0 => Some(Self::NotStarted),
            1 => Some(Self::InProgress),
            2 => Some(Self::Submitted),
            3 => Some(Self::Completed),
            4 => Some(Self::Rejected),
            _ => None,
        }
    }

    /// Human-readable label used by the category projections
    pub fn label(self) -> &'static str {
        match self {
            Self::NotStarted => "not-started",
            Self::InProgress => "pending-submit",
            Self::Submitted => "in-approval",
            Self::Completed => "completed",
            Self::Rejected => "rejected",
        }
    }
}

/// Stage execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[repr(i16)]
pub enum StageStatus {
    NotStarted = 0,
    InProgress = 1,
    Completed = 2,
}

impl StageStatus {
    pub fn as_i16(self) -> i16 {
        self as i16
    }
}

/// Application status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[repr(i16)]
pub enum ApplyStatus {
    InApproval = 0,
    Completed = 1,
    Rejected = 2,
    Withdrawn = 3,
}

impl ApplyStatus {
    pub fn as_i16(self) -> i16 {
        self as i16
    }
}

/// Result recorded in an approval log row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[repr(i16)]
pub enum ApprovalResult {
    Submit = 0,
    Approve = 1,
    Reject = 2,
}

impl ApprovalResult {
    pub fn as_i16(self) -> i16 {
        self as i16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_status_round_trips_through_i16() {
        for status in [
            TaskStatus::NotStarted,
            TaskStatus::InProgress,
            TaskStatus::Submitted,
            TaskStatus::Completed,
            TaskStatus::Rejected,
        ] {
            assert_eq!(TaskStatus::from_i16(status.as_i16()), Some(status));
        }
        assert_eq!(TaskStatus::from_i16(9), None);
    }

    #[test]
    fn numeric_values_match_the_wire_contract() {
        assert_eq!(TaskStatus::Completed.as_i16(), 3);
        assert_eq!(StageStatus::Completed.as_i16(), 2);
        assert_eq!(ApplyStatus::Rejected.as_i16(), 2);
        assert_eq!(ApprovalResult::Submit.as_i16(), 0);
    }
}

//! Tenant application review workflow

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::{AppError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApplicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationStatus::Pending => "pending",
            ApplicationStatus::Approved => "approved",
            ApplicationStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApplicationStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(ApplicationStatus::Pending),
            "approved" => Ok(ApplicationStatus::Approved),
            "rejected" => Ok(ApplicationStatus::Rejected),
            other => Err(AppError::InvalidFormat {
                message: format!("unknown application status '{}'", other),
            }),
        }
    }
}

/// A reviewer's verdict
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Reject { reason: String },
}

impl Decision {
    pub fn target(&self) -> ApplicationStatus {
        match self {
            Decision::Approve => ApplicationStatus::Approved,
            Decision::Reject { .. } => ApplicationStatus::Rejected,
        }
    }
}

/// Only pending applications are reviewed, and rejections carry a reason
pub fn check_decision(current: ApplicationStatus, decision: &Decision) -> Result<()> {
    if current != ApplicationStatus::Pending {
        return Err(AppError::InvalidTransition {
            entity: "tenant application",
            from: current.to_string(),
            to: decision.target().to_string(),
        });
    }
    if let Decision::Reject { reason } = decision {
        if reason.trim().is_empty() {
            return Err(AppError::invalid_field("reason", "a rejection reason is required"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_can_be_decided() {
        assert!(check_decision(ApplicationStatus::Pending, &Decision::Approve).is_ok());
        assert!(check_decision(
            ApplicationStatus::Pending,
            &Decision::Reject {
                reason: "incomplete registration".into()
            }
        )
        .is_ok());
    }

    #[test]
    fn test_decided_is_final() {
        let err = check_decision(ApplicationStatus::Approved, &Decision::Approve).unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition { .. }));
        assert!(check_decision(
            ApplicationStatus::Rejected,
            &Decision::Reject { reason: "again".into() }
        )
        .is_err());
    }

    #[test]
    fn test_reject_needs_reason() {
        let err = check_decision(
            ApplicationStatus::Pending,
            &Decision::Reject { reason: "   ".into() },
        )
        .unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
    }
}

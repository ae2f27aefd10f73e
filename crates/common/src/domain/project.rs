//! Project lifecycle and visibility rules

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::money;
use crate::errors::{AppError, Result};

/// Project status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Draft,
    Active,
    Paused,
    Completed,
    Cancelled,
}

impl ProjectStatus {
    pub const ALL: [ProjectStatus; 5] = [
        ProjectStatus::Draft,
        ProjectStatus::Active,
        ProjectStatus::Paused,
        ProjectStatus::Completed,
        ProjectStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Draft => "draft",
            ProjectStatus::Active => "active",
            ProjectStatus::Paused => "paused",
            ProjectStatus::Completed => "completed",
            ProjectStatus::Cancelled => "cancelled",
        }
    }

    /// Statuses reachable from this one
    pub fn next_statuses(&self) -> &'static [ProjectStatus] {
        match self {
            ProjectStatus::Draft => &[ProjectStatus::Active, ProjectStatus::Cancelled],
            ProjectStatus::Active => &[
                ProjectStatus::Paused,
                ProjectStatus::Completed,
                ProjectStatus::Cancelled,
            ],
            ProjectStatus::Paused => &[ProjectStatus::Active, ProjectStatus::Cancelled],
            ProjectStatus::Completed | ProjectStatus::Cancelled => &[],
        }
    }

    pub fn can_transition_to(&self, next: ProjectStatus) -> bool {
        self.next_statuses().contains(&next)
    }

    /// No further transitions or edits are possible
    pub fn is_terminal(&self) -> bool {
        self.next_statuses().is_empty()
    }

    /// Total amount and products may only change while drafting
    pub fn allows_financial_edits(&self) -> bool {
        matches!(self, ProjectStatus::Draft)
    }

    /// Whether new pledges are accepted
    pub fn accepts_contributions(&self) -> bool {
        matches!(self, ProjectStatus::Active)
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProjectStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "draft" => Ok(ProjectStatus::Draft),
            "active" => Ok(ProjectStatus::Active),
            "paused" => Ok(ProjectStatus::Paused),
            "completed" => Ok(ProjectStatus::Completed),
            "cancelled" => Ok(ProjectStatus::Cancelled),
            other => Err(AppError::InvalidFormat {
                message: format!("unknown project status '{}'", other),
            }),
        }
    }
}

/// Who may see a project
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Public,
    Private,
    InviteOnly,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Private => "private",
            Visibility::InviteOnly => "invite_only",
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Visibility {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "public" => Ok(Visibility::Public),
            "private" => Ok(Visibility::Private),
            "invite_only" => Ok(Visibility::InviteOnly),
            other => Err(AppError::InvalidFormat {
                message: format!("unknown visibility '{}'", other),
            }),
        }
    }
}

/// Facts about a project needed to decide whether it may go live
#[derive(Debug, Clone)]
pub struct ActivationCheck<'a> {
    pub total_amount: Decimal,
    pub product_prices: &'a [Decimal],
    pub starts_on: Option<NaiveDate>,
    pub ends_on: Option<NaiveDate>,
}

impl ActivationCheck<'_> {
    /// Products must exist and add up to the project total
    pub fn verify(&self) -> Result<()> {
        if self.total_amount <= Decimal::ZERO {
            return Err(AppError::guard("project total amount must be greater than zero"));
        }
        if self.product_prices.is_empty() {
            return Err(AppError::guard("project needs at least one product"));
        }
        let sum = money::total(self.product_prices);
        if sum != self.total_amount {
            return Err(AppError::guard(format!(
                "product prices add up to {} but the project total is {}",
                sum, self.total_amount
            )));
        }
        ensure_date_range(self.starts_on, self.ends_on)
    }
}

/// The end date, when both are set, must be after the start date
pub fn ensure_date_range(starts_on: Option<NaiveDate>, ends_on: Option<NaiveDate>) -> Result<()> {
    match (starts_on, ends_on) {
        (Some(start), Some(end)) if end <= start => Err(AppError::invalid_field(
            "ends_on",
            "must be after starts_on",
        )),
        _ => Ok(()),
    }
}

/// Check a requested transition, running the activation guard when leaving draft
pub fn check_transition(
    from: ProjectStatus,
    to: ProjectStatus,
    activation: Option<&ActivationCheck<'_>>,
) -> Result<()> {
    if !from.can_transition_to(to) {
        return Err(AppError::InvalidTransition {
            entity: "project",
            from: from.to_string(),
            to: to.to_string(),
        });
    }

    if from == ProjectStatus::Draft && to == ProjectStatus::Active {
        match activation {
            Some(check) => check.verify()?,
            None => return Err(AppError::guard("activation facts are required")),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_transition_table() {
        use ProjectStatus::*;

        assert!(Draft.can_transition_to(Active));
        assert!(Draft.can_transition_to(Cancelled));
        assert!(!Draft.can_transition_to(Paused));
        assert!(!Draft.can_transition_to(Completed));

        assert!(Active.can_transition_to(Paused));
        assert!(Active.can_transition_to(Completed));
        assert!(!Active.can_transition_to(Draft));

        assert!(Paused.can_transition_to(Active));
        assert!(!Paused.can_transition_to(Completed));

        for target in ProjectStatus::ALL {
            assert!(!Completed.can_transition_to(target));
            assert!(!Cancelled.can_transition_to(target));
        }
        assert!(Completed.is_terminal());
        assert!(!Paused.is_terminal());
    }

    #[test]
    fn test_status_round_trip_strings() {
        for status in ProjectStatus::ALL {
            assert_eq!(status.as_str().parse::<ProjectStatus>().ok(), Some(status));
        }
        assert!("archived".parse::<ProjectStatus>().is_err());
    }

    #[test]
    fn test_activation_requires_matching_products() {
        let prices = [dec!(40.00), dec!(60.00)];
        let check = ActivationCheck {
            total_amount: dec!(100),
            product_prices: &prices,
            starts_on: Some(date(2026, 1, 1)),
            ends_on: Some(date(2026, 6, 30)),
        };
        assert!(check_transition(ProjectStatus::Draft, ProjectStatus::Active, Some(&check)).is_ok());

        let short = [dec!(40.00)];
        let check = ActivationCheck {
            product_prices: &short,
            ..check
        };
        let err = check_transition(ProjectStatus::Draft, ProjectStatus::Active, Some(&check))
            .unwrap_err();
        assert!(matches!(err, AppError::GuardFailed { .. }));
    }

    #[test]
    fn test_activation_rejects_empty_products() {
        let check = ActivationCheck {
            total_amount: dec!(100),
            product_prices: &[],
            starts_on: None,
            ends_on: None,
        };
        assert!(check.verify().is_err());
    }

    #[test]
    fn test_activation_rejects_inverted_dates() {
        let prices = [dec!(10)];
        let check = ActivationCheck {
            total_amount: dec!(10),
            product_prices: &prices,
            starts_on: Some(date(2026, 5, 1)),
            ends_on: Some(date(2026, 5, 1)),
        };
        assert!(check.verify().is_err());
    }

    #[test]
    fn test_invalid_transition_error() {
        let err = check_transition(ProjectStatus::Cancelled, ProjectStatus::Active, None)
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition { .. }));
    }

    #[test]
    fn test_pause_needs_no_activation_facts() {
        assert!(check_transition(ProjectStatus::Active, ProjectStatus::Paused, None).is_ok());
        assert!(check_transition(ProjectStatus::Paused, ProjectStatus::Active, None).is_ok());
    }

    #[test]
    fn test_edit_and_pledge_windows() {
        assert!(ProjectStatus::Draft.allows_financial_edits());
        assert!(!ProjectStatus::Active.allows_financial_edits());
        assert!(ProjectStatus::Active.accepts_contributions());
        assert!(!ProjectStatus::Paused.accepts_contributions());
    }

    #[test]
    fn test_visibility_parse() {
        assert_eq!("invite_only".parse::<Visibility>().ok(), Some(Visibility::InviteOnly));
        assert!("hidden".parse::<Visibility>().is_err());
    }
}

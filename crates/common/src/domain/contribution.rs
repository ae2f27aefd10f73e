//! Contribution payment plans, schedules and balances

use chrono::{Months, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::money;
use crate::errors::{AppError, Result};

/// How a pledge is paid
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "count", rename_all = "snake_case")]
pub enum PaymentPlan {
    Full,
    Installments(u32),
}

impl PaymentPlan {
    /// Rebuild a plan from its stored columns
    pub fn from_parts(kind: &str, installment_count: i32) -> Result<Self> {
        match kind {
            "full" => Ok(PaymentPlan::Full),
            "installments" => {
                let count = u32::try_from(installment_count).map_err(|_| AppError::InvalidFormat {
                    message: format!("invalid installment count {}", installment_count),
                })?;
                Ok(PaymentPlan::Installments(count))
            }
            other => Err(AppError::InvalidFormat {
                message: format!("unknown payment plan '{}'", other),
            }),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PaymentPlan::Full => "full",
            PaymentPlan::Installments(_) => "installments",
        }
    }

    pub fn installment_count(&self) -> u32 {
        match self {
            PaymentPlan::Full => 1,
            PaymentPlan::Installments(n) => *n,
        }
    }

    /// Check the plan against platform limits
    pub fn validate(&self, max_installments: u32) -> Result<()> {
        if let PaymentPlan::Installments(n) = self {
            if *n < 2 || *n > max_installments {
                return Err(AppError::invalid_field(
                    "installment_count",
                    format!("must be between 2 and {}", max_installments),
                ));
            }
        }
        Ok(())
    }
}

/// One scheduled payment
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Installment {
    pub number: u32,
    pub due_on: NaiveDate,
    pub amount: Decimal,
}

/// Build the monthly schedule for a pledge.
///
/// The final due date may not fall after `project_ends_on` when the project
/// has an end date.
pub fn schedule(
    amount: Decimal,
    plan: PaymentPlan,
    first_due_on: NaiveDate,
    project_ends_on: Option<NaiveDate>,
) -> Result<Vec<Installment>> {
    let count = plan.installment_count();
    let parts = money::split_installments(amount, count);

    let mut installments = Vec::with_capacity(parts.len());
    for (index, part) in parts.into_iter().enumerate() {
        let offset = index as u32;
        let due_on = first_due_on
            .checked_add_months(Months::new(offset))
            .ok_or_else(|| AppError::invalid_field("installment_count", "schedule is out of range"))?;
        installments.push(Installment {
            number: offset + 1,
            due_on,
            amount: part,
        });
    }

    if let (Some(ends_on), Some(last)) = (project_ends_on, installments.last()) {
        if last.due_on > ends_on {
            return Err(AppError::invalid_field(
                "installment_count",
                format!(
                    "last installment would be due {} after the project ends on {}",
                    last.due_on, ends_on
                ),
            ));
        }
    }

    Ok(installments)
}

/// Review state of a pledge
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
            ApprovalStatus::Cancelled => "cancelled",
        }
    }

    pub fn can_transition_to(&self, next: ApprovalStatus) -> bool {
        matches!(
            (self, next),
            (
                ApprovalStatus::Pending,
                ApprovalStatus::Approved | ApprovalStatus::Rejected | ApprovalStatus::Cancelled
            )
        )
    }

    /// Whether the pledge counts toward project totals
    pub fn is_live(&self) -> bool {
        matches!(self, ApprovalStatus::Pending | ApprovalStatus::Approved)
    }
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApprovalStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(ApprovalStatus::Pending),
            "approved" => Ok(ApprovalStatus::Approved),
            "rejected" => Ok(ApprovalStatus::Rejected),
            "cancelled" => Ok(ApprovalStatus::Cancelled),
            other => Err(AppError::InvalidFormat {
                message: format!("unknown approval status '{}'", other),
            }),
        }
    }
}

/// Check a review decision
pub fn check_review(from: ApprovalStatus, to: ApprovalStatus) -> Result<()> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(AppError::InvalidTransition {
            entity: "contribution",
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

/// Balance view over a pledge
#[derive(Clone, Debug)]
pub struct Ledger {
    pub amount: Decimal,
    pub amount_paid: Decimal,
    pub installments: Vec<Installment>,
}

impl Ledger {
    pub fn amount_owed(&self) -> Decimal {
        (self.amount - self.amount_paid).max(Decimal::ZERO)
    }

    pub fn is_settled(&self) -> bool {
        self.amount_owed() == Decimal::ZERO
    }

    /// Money scheduled on or before `as_of`
    pub fn amount_due(&self, as_of: NaiveDate) -> Decimal {
        self.installments
            .iter()
            .filter(|i| i.due_on <= as_of)
            .map(|i| i.amount)
            .sum()
    }

    /// Scheduled money that is due but unpaid
    pub fn arrears(&self, as_of: NaiveDate) -> Decimal {
        (self.amount_due(as_of) - self.amount_paid).max(Decimal::ZERO)
    }

    /// First installment not fully covered by what has been paid
    pub fn next_installment(&self) -> Option<&Installment> {
        let mut covered = self.amount_paid;
        for installment in &self.installments {
            if covered >= installment.amount {
                covered -= installment.amount;
            } else {
                return Some(installment);
            }
        }
        None
    }

    /// Apply a payment and return the new paid total
    pub fn apply_payment(&self, payment: Decimal) -> Result<Decimal> {
        let payment = money::ensure_positive_amount("amount", payment)?;
        if payment > self.amount_owed() {
            return Err(AppError::invalid_field(
                "amount",
                format!("payment {} exceeds the {} still owed", payment, self.amount_owed()),
            ));
        }
        Ok(self.amount_paid + payment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_plan_limits() {
        assert!(PaymentPlan::Full.validate(12).is_ok());
        assert!(PaymentPlan::Installments(2).validate(12).is_ok());
        assert!(PaymentPlan::Installments(12).validate(12).is_ok());
        assert!(PaymentPlan::Installments(1).validate(12).is_err());
        assert!(PaymentPlan::Installments(13).validate(12).is_err());
    }

    #[test]
    fn test_plan_from_columns() {
        assert_eq!(PaymentPlan::from_parts("full", 1).ok(), Some(PaymentPlan::Full));
        assert_eq!(
            PaymentPlan::from_parts("installments", 4).ok(),
            Some(PaymentPlan::Installments(4))
        );
        assert!(PaymentPlan::from_parts("installments", -1).is_err());
        assert!(PaymentPlan::from_parts("weekly", 4).is_err());
    }

    #[test]
    fn test_monthly_schedule_clamps_month_end() {
        let items = schedule(
            dec!(90),
            PaymentPlan::Installments(3),
            date(2026, 1, 31),
            None,
        )
        .unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].due_on, date(2026, 1, 31));
        assert_eq!(items[1].due_on, date(2026, 2, 28));
        assert_eq!(items[2].due_on, date(2026, 3, 31));
        assert_eq!(items[2].number, 3);
        assert!(items.iter().all(|i| i.amount == dec!(30)));
    }

    #[test]
    fn test_schedule_must_end_before_project() {
        let result = schedule(
            dec!(100),
            PaymentPlan::Installments(6),
            date(2026, 1, 1),
            Some(date(2026, 3, 1)),
        );
        assert!(result.is_err());

        let result = schedule(
            dec!(100),
            PaymentPlan::Installments(3),
            date(2026, 1, 1),
            Some(date(2026, 3, 1)),
        );
        assert!(result.is_ok());
    }

    #[test]
    fn test_full_plan_single_installment() {
        let items = schedule(dec!(25.50), PaymentPlan::Full, date(2026, 4, 2), None).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].amount, dec!(25.50));
    }

    #[test]
    fn test_arrears_and_owed() {
        let installments = schedule(
            dec!(300),
            PaymentPlan::Installments(3),
            date(2026, 1, 10),
            None,
        )
        .unwrap();
        let ledger = Ledger {
            amount: dec!(300),
            amount_paid: dec!(50),
            installments,
        };

        assert_eq!(ledger.amount_owed(), dec!(250));
        // before anything is due
        assert_eq!(ledger.arrears(date(2026, 1, 9)), dec!(0));
        // first installment due, partly paid
        assert_eq!(ledger.arrears(date(2026, 1, 10)), dec!(50));
        // two installments due
        assert_eq!(ledger.arrears(date(2026, 2, 15)), dec!(150));
        assert_eq!(ledger.next_installment().map(|i| i.number), Some(1));
    }

    #[test]
    fn test_overpaid_schedule_has_no_arrears() {
        let installments =
            schedule(dec!(100), PaymentPlan::Installments(2), date(2026, 1, 1), None).unwrap();
        let ledger = Ledger {
            amount: dec!(100),
            amount_paid: dec!(75),
            installments,
        };
        assert_eq!(ledger.arrears(date(2026, 1, 1)), dec!(0));
        assert_eq!(ledger.next_installment().map(|i| i.number), Some(2));
    }

    #[test]
    fn test_apply_payment_bounds() {
        let ledger = Ledger {
            amount: dec!(100),
            amount_paid: dec!(90),
            installments: Vec::new(),
        };
        assert_eq!(ledger.apply_payment(dec!(10)).ok(), Some(dec!(100)));
        assert!(ledger.apply_payment(dec!(10.01)).is_err());
        assert!(ledger.apply_payment(dec!(0)).is_err());
    }

    #[test]
    fn test_review_transitions() {
        assert!(check_review(ApprovalStatus::Pending, ApprovalStatus::Approved).is_ok());
        assert!(check_review(ApprovalStatus::Pending, ApprovalStatus::Cancelled).is_ok());
        assert!(check_review(ApprovalStatus::Approved, ApprovalStatus::Rejected).is_err());
        assert!(check_review(ApprovalStatus::Rejected, ApprovalStatus::Approved).is_err());
        assert!(ApprovalStatus::Approved.is_live());
        assert!(!ApprovalStatus::Cancelled.is_live());
    }
}

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::Money;
use crate::types::{InstallmentId, InstallmentStatus, LoanId};

/// one scheduled repayment obligation of a loan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Installment {
    pub id: InstallmentId,
    pub loan_id: LoanId,
    /// 1-based, unique per loan
    pub installment_number: u32,
    pub principal_amount: Money,
    pub interest_amount: Money,
    pub total_amount: Money,
    pub due_date: NaiveDate,
    pub amount_paid: Money,
    pub status: InstallmentStatus,
}

impl Installment {
    /// new unpaid installment
    pub fn new(
        loan_id: LoanId,
        installment_number: u32,
        principal_amount: Money,
        interest_amount: Money,
        total_amount: Money,
        due_date: NaiveDate,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            loan_id,
            installment_number,
            principal_amount,
            interest_amount,
            total_amount,
            due_date,
            amount_paid: Money::ZERO,
            status: InstallmentStatus::Pending,
        }
    }

    /// total due minus amount paid
    pub fn balance_remaining(&self) -> Money {
        self.total_amount - self.amount_paid
    }

    /// due strictly before `today` and not marked paid
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.due_date < today && self.status != InstallmentStatus::Paid
    }

    /// days until due, negative once past due
    pub fn days_until_due(&self, today: NaiveDate) -> i64 {
        (self.due_date - today).num_days()
    }

    /// status this installment should have right now
    pub fn derived_status(&self, today: NaiveDate, tolerance: Money) -> InstallmentStatus {
        compute_status(
            self.status,
            self.amount_paid,
            self.total_amount,
            self.due_date,
            today,
            tolerance,
        )
    }

    /// store a new cumulative amount paid and refresh the cached status.
    ///
    /// Returns the previous status when it changed.
    pub fn apply_amount_paid(
        &mut self,
        amount_paid: Money,
        today: NaiveDate,
        tolerance: Money,
    ) -> Option<InstallmentStatus> {
        self.amount_paid = amount_paid;
        self.refresh_status(today, tolerance)
    }

    /// recompute the cached status, returning the previous one when it changed
    pub fn refresh_status(
        &mut self,
        today: NaiveDate,
        tolerance: Money,
    ) -> Option<InstallmentStatus> {
        let new_status = self.derived_status(today, tolerance);
        if new_status == self.status {
            None
        } else {
            Some(std::mem::replace(&mut self.status, new_status))
        }
    }
}

/// pure status projection over (amount paid, total due, due date, today).
///
/// Precedence: paid, partial, overdue, pending. A current status of `Paid`
/// is kept even if the balance later reopens.
pub fn compute_status(
    current: InstallmentStatus,
    amount_paid: Money,
    total_amount: Money,
    due_date: NaiveDate,
    today: NaiveDate,
    tolerance: Money,
) -> InstallmentStatus {
    if current == InstallmentStatus::Paid || (total_amount - amount_paid).is_settled(tolerance) {
        InstallmentStatus::Paid
    } else if amount_paid.is_positive() {
        InstallmentStatus::Partial
    } else if due_date < today {
        InstallmentStatus::Overdue
    } else {
        InstallmentStatus::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn installment(total: Money, due: NaiveDate) -> Installment {
        Installment::new(Uuid::new_v4(), 1, total, Money::ZERO, total, due)
    }

    #[test]
    fn test_status_precedence() {
        let total = Money::from(1000);
        let due = date(2025, 2, 1);
        let before = date(2025, 1, 15);
        let after = date(2025, 3, 1);
        let tol = Money::TOLERANCE;
        let pending = InstallmentStatus::Pending;

        assert_eq!(compute_status(pending, Money::ZERO, total, due, before, tol), InstallmentStatus::Pending);
        assert_eq!(compute_status(pending, Money::ZERO, total, due, after, tol), InstallmentStatus::Overdue);
        assert_eq!(compute_status(pending, Money::from(10), total, due, after, tol), InstallmentStatus::Partial);
        assert_eq!(compute_status(pending, total, total, due, after, tol), InstallmentStatus::Paid);
    }

    #[test]
    fn test_due_today_is_not_overdue() {
        let due = date(2025, 2, 1);
        let status = compute_status(
            InstallmentStatus::Pending,
            Money::ZERO,
            Money::from(100),
            due,
            due,
            Money::TOLERANCE,
        );
        assert_eq!(status, InstallmentStatus::Pending);
    }

    #[test]
    fn test_paid_within_tolerance() {
        let total = Money::from_decimal(dec!(9333.34));
        let paid = Money::from_decimal(dec!(9333.33));
        let status = compute_status(
            InstallmentStatus::Partial,
            paid,
            total,
            date(2025, 2, 1),
            date(2025, 1, 1),
            Money::TOLERANCE,
        );
        assert_eq!(status, InstallmentStatus::Paid);
    }

    #[test]
    fn test_paid_is_sticky() {
        let status = compute_status(
            InstallmentStatus::Paid,
            Money::ZERO,
            Money::from(100),
            date(2025, 2, 1),
            date(2025, 6, 1),
            Money::TOLERANCE,
        );
        assert_eq!(status, InstallmentStatus::Paid);
    }

    #[test]
    fn test_refresh_is_idempotent() {
        let mut inst = installment(Money::from(500), date(2025, 2, 1));
        let today = date(2025, 2, 10);

        assert_eq!(
            inst.apply_amount_paid(Money::from(200), today, Money::TOLERANCE),
            Some(InstallmentStatus::Pending)
        );
        assert_eq!(inst.status, InstallmentStatus::Partial);

        assert_eq!(inst.refresh_status(today, Money::TOLERANCE), None);
        assert_eq!(inst.status, InstallmentStatus::Partial);
    }

    #[test]
    fn test_days_until_due() {
        let inst = installment(Money::from(500), date(2025, 2, 1));
        assert_eq!(inst.days_until_due(date(2025, 1, 22)), 10);
        assert_eq!(inst.days_until_due(date(2025, 2, 4)), -3);
        assert!(inst.is_overdue(date(2025, 2, 4)));
        assert!(!inst.is_overdue(date(2025, 2, 1)));

        let mut paid = inst.clone();
        paid.status = InstallmentStatus::Paid;
        assert!(!paid.is_overdue(date(2025, 2, 4)));
    }
}

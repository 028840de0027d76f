use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::decimal::Money;
use crate::errors::{Result, Validator};
use crate::installment::Installment;
use crate::types::{AllocationId, InstallmentId, InstallmentStatus, PaymentId};

/// allocation record: how much of one payment went to one installment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallmentPayment {
    pub id: AllocationId,
    pub installment_id: InstallmentId,
    pub payment_id: PaymentId,
    pub amount_applied: Money,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InstallmentPayment {
    pub fn new(
        installment_id: InstallmentId,
        payment_id: PaymentId,
        amount_applied: Money,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            installment_id,
            payment_id,
            amount_applied,
            created_at: now,
            updated_at: now,
        }
    }

    /// check an applied amount against the payment total and the installment
    /// balance available to it, both with `tolerance` slack
    pub fn validate_bounds(
        amount_applied: Money,
        payment_amount: Money,
        installment_balance: Money,
        tolerance: Money,
    ) -> Result<()> {
        let mut v = Validator::new();
        v.check(amount_applied.is_positive(), "amount_applied", "must be greater than 0");
        v.check(
            !amount_applied.exceeds(payment_amount, tolerance),
            "amount_applied",
            "cannot exceed payment amount",
        );
        v.check(
            !amount_applied.exceeds(installment_balance, tolerance),
            "amount_applied",
            "cannot exceed installment balance",
        );
        v.finish("installment_payment")
    }
}

/// one planned allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationLine {
    pub installment_id: InstallmentId,
    pub installment_number: u32,
    pub due_date: NaiveDate,
    pub amount: Money,
}

/// result of running the allocator, before anything is stored
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AllocationPlan {
    pub lines: Vec<AllocationLine>,
    /// amount left over after every open installment was filled
    pub unapplied: Money,
}

impl AllocationPlan {
    pub fn total_applied(&self) -> Money {
        self.lines.iter().map(|l| l.amount).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// greedy oldest-first allocator.
///
/// Open installments (status not paid) are filled in ascending due-date order,
/// so overdue ones come first. Each gets `min(remaining, balance)`; the pass
/// stops once the remainder is within tolerance.
#[derive(Debug, Clone, Copy)]
pub struct PaymentAllocator {
    tolerance: Money,
}

impl PaymentAllocator {
    pub fn new(tolerance: Money) -> Self {
        Self { tolerance }
    }

    /// installments eligible for allocation, in fill order
    pub fn open_installments<'a>(
        &self,
        installments: impl IntoIterator<Item = &'a Installment>,
    ) -> Vec<&'a Installment> {
        let mut open: Vec<_> = installments
            .into_iter()
            .filter(|i| i.status != InstallmentStatus::Paid)
            .collect();
        open.sort_by_key(|i| (i.due_date, i.installment_number));
        open
    }

    /// plan how `amount` spreads over `installments`; pure, no side effects
    pub fn allocate<'a>(
        &self,
        amount: Money,
        installments: impl IntoIterator<Item = &'a Installment>,
    ) -> AllocationPlan {
        // nothing meaningful to apply
        if amount.is_settled(self.tolerance) {
            return AllocationPlan {
                lines: Vec::new(),
                unapplied: amount,
            };
        }

        let mut remaining = amount;
        let mut lines = Vec::new();

        for installment in self.open_installments(installments) {
            if remaining.is_settled(self.tolerance) {
                break;
            }

            let apply = remaining.min(installment.balance_remaining());
            if !apply.is_positive() {
                continue;
            }

            debug!(
                installment_number = installment.installment_number,
                due_date = %installment.due_date,
                %apply,
                "allocating to installment"
            );

            lines.push(AllocationLine {
                installment_id: installment.id,
                installment_number: installment.installment_number,
                due_date: installment.due_date,
                amount: apply,
            });
            remaining -= apply;
        }

        AllocationPlan {
            lines,
            unapplied: remaining,
        }
    }
}

impl Default for PaymentAllocator {
    fn default() -> Self {
        Self::new(Money::TOLERANCE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn money(d: rust_decimal::Decimal) -> Money {
        Money::from_decimal(d)
    }

    fn schedule(totals: &[Money]) -> Vec<Installment> {
        let loan_id = Uuid::new_v4();
        totals
            .iter()
            .enumerate()
            .map(|(i, total)| {
                let n = i as u32 + 1;
                Installment::new(loan_id, n, *total, Money::ZERO, *total, date(2025, n + 1, 1))
            })
            .collect()
    }

    #[test]
    fn test_fills_oldest_first_and_spills() {
        let installments = schedule(&[money(dec!(9333.33)), money(dec!(9333.33)), money(dec!(9333.33))]);
        let plan = PaymentAllocator::default().allocate(money(dec!(9433.33)), &installments);

        let amounts: Vec<_> = plan.lines.iter().map(|l| (l.installment_number, l.amount)).collect();
        assert_eq!(amounts, vec![(1, money(dec!(9333.33))), (2, Money::from(100))]);
        assert_eq!(plan.unapplied, Money::ZERO);
    }

    #[test]
    fn test_order_by_due_date_not_input_order() {
        let mut installments = schedule(&[Money::from(100), Money::from(100), Money::from(100)]);
        // make #3 the oldest
        installments[2].due_date = date(2025, 1, 1);
        installments.reverse();

        let plan = PaymentAllocator::default().allocate(Money::from(150), &installments);
        let numbers: Vec<_> = plan.lines.iter().map(|l| l.installment_number).collect();
        assert_eq!(numbers, vec![3, 1]);
    }

    #[test]
    fn test_skips_paid_and_fills_partial_remainder() {
        let mut installments = schedule(&[Money::from(100), Money::from(100), Money::from(100)]);
        installments[0].amount_paid = Money::from(100);
        installments[0].status = InstallmentStatus::Paid;
        installments[1].amount_paid = Money::from(40);
        installments[1].status = InstallmentStatus::Partial;

        let plan = PaymentAllocator::default().allocate(Money::from(80), &installments);
        let amounts: Vec<_> = plan.lines.iter().map(|l| (l.installment_number, l.amount)).collect();
        assert_eq!(amounts, vec![(2, Money::from(60)), (3, Money::from(20))]);
    }

    #[test]
    fn test_overpayment_left_unapplied() {
        let installments = schedule(&[Money::from(100), Money::from(100)]);
        let plan = PaymentAllocator::default().allocate(Money::from(250), &installments);

        assert_eq!(plan.total_applied(), Money::from(200));
        assert_eq!(plan.unapplied, Money::from(50));
    }

    #[test]
    fn test_tiny_payment_skipped() {
        let installments = schedule(&[Money::from(100)]);
        let plan = PaymentAllocator::default().allocate(money(dec!(0.01)), &installments);
        assert!(plan.is_empty());
        assert_eq!(plan.unapplied, money(dec!(0.01)));
    }

    #[test]
    fn test_stops_when_remainder_within_tolerance() {
        let installments = schedule(&[Money::from(100), Money::from(100)]);
        let plan = PaymentAllocator::default().allocate(money(dec!(100.01)), &installments);
        assert_eq!(plan.lines.len(), 1);
        assert_eq!(plan.unapplied, money(dec!(0.01)));
    }

    #[test]
    fn test_conservation() {
        let totals = [money(dec!(333.33)), money(dec!(333.33)), money(dec!(333.34))];
        let outstanding: Money = totals.iter().sum();
        for cents in [1_00, 250_00, 333_33, 500_05, 999_99, 1_000_00, 5_000_00] {
            let amount = Money::from_minor(cents);
            let plan = PaymentAllocator::default().allocate(amount, &schedule(&totals));
            assert!(
                plan.total_applied().approx_eq(amount.min(outstanding), Money::TOLERANCE),
                "amount {}",
                amount
            );
        }
    }

    #[test]
    fn test_bounds() {
        let tol = Money::TOLERANCE;
        assert!(InstallmentPayment::validate_bounds(Money::from(100), Money::from(100), Money::from(100), tol).is_ok());
        assert!(InstallmentPayment::validate_bounds(money(dec!(100.01)), Money::from(100), Money::from(200), tol).is_ok());

        let err = InstallmentPayment::validate_bounds(money(dec!(100.02)), Money::from(100), Money::from(200), tol)
            .unwrap_err();
        assert_eq!(err.field_errors()[0].message, "cannot exceed payment amount");

        let err = InstallmentPayment::validate_bounds(Money::from(150), Money::from(500), Money::from(100), tol)
            .unwrap_err();
        assert_eq!(err.field_errors()[0].message, "cannot exceed installment balance");

        let err = InstallmentPayment::validate_bounds(Money::ZERO, Money::from(500), Money::from(100), tol)
            .unwrap_err();
        assert_eq!(err.field_errors()[0].message, "must be greater than 0");
    }
}

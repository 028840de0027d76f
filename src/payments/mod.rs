pub mod allocation;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::Money;
use crate::errors::{Result, Validator};
use crate::types::{LoanId, PaymentId};

pub use allocation::{
    AllocationLine, AllocationPlan, InstallmentPayment, PaymentAllocator,
};

/// payment entry request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub loan_id: LoanId,
    pub amount: Money,
    pub payment_date: NaiveDate,
    pub note: Option<String>,
}

impl PaymentRequest {
    pub fn new(loan_id: LoanId, amount: Money, payment_date: NaiveDate) -> Self {
        Self {
            loan_id,
            amount,
            payment_date,
            note: None,
        }
    }

    pub fn note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    /// the amount as it will be stored
    pub fn stored_amount(&self) -> Money {
        self.amount.round_currency()
    }

    pub fn validate(&self) -> Result<()> {
        let mut v = Validator::new();
        v.check(self.stored_amount().is_positive(), "amount", "must be greater than 0");
        v.finish("payment")
    }
}

/// editable payment fields; the amount is fixed once recorded
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaymentUpdate {
    pub payment_date: Option<NaiveDate>,
    pub note: Option<Option<String>>,
}

/// payment record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub loan_id: LoanId,
    pub amount: Money,
    pub payment_date: NaiveDate,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    pub fn new(
        loan_id: LoanId,
        amount: Money,
        payment_date: NaiveDate,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            loan_id,
            amount,
            payment_date,
            note,
            created_at: now,
            updated_at: now,
        }
    }

    pub(crate) fn apply_update(&mut self, update: PaymentUpdate, now: DateTime<Utc>) {
        if let Some(date) = update.payment_date {
            self.payment_date = date;
        }
        if let Some(note) = update.note {
            self.note = note;
        }
        self.updated_at = now;
    }
}

/// a recorded payment with its allocation records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentReceipt {
    pub payment: Payment,
    pub allocations: Vec<InstallmentPayment>,
}

impl PaymentReceipt {
    /// amount already applied to installments
    pub fn amount_applied(&self) -> Money {
        self.allocations.iter().map(|a| a.amount_applied).sum()
    }

    /// unapplied part of the payment
    pub fn amount_remaining(&self) -> Money {
        self.payment.amount - self.amount_applied()
    }

    pub fn is_fully_applied(&self, tolerance: Money) -> bool {
        self.amount_remaining().abs() < tolerance
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
    fn test_validate_amount() {
        let loan_id = Uuid::new_v4();
        assert!(PaymentRequest::new(loan_id, Money::from(100), date(2025, 2, 1)).validate().is_ok());

        let err = PaymentRequest::new(loan_id, Money::ZERO, date(2025, 2, 1))
            .validate()
            .unwrap_err();
        assert_eq!(err.field_errors()[0].field, "amount");

        // rounds to zero when stored
        let err = PaymentRequest::new(loan_id, Money::from_decimal(dec!(0.004)), date(2025, 2, 1))
            .validate()
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_update_keeps_amount() {
        let now = chrono::Utc::now();
        let mut payment = Payment::new(Uuid::new_v4(), Money::from(500), date(2025, 2, 1), None, now);
        payment.apply_update(
            PaymentUpdate {
                payment_date: Some(date(2025, 2, 3)),
                note: Some(Some("cash at branch".to_string())),
            },
            now,
        );
        assert_eq!(payment.amount, Money::from(500));
        assert_eq!(payment.payment_date, date(2025, 2, 3));
        assert_eq!(payment.note.as_deref(), Some("cash at branch"));
    }
}

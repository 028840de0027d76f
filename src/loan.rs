use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::{Money, Rate};
use crate::errors::{LedgerError, Result, Validator};
use crate::installment::Installment;
use crate::payments::Payment;
use crate::types::{InstallmentStatus, LoanId, LoanStatus};

/// the fields that shape the schedule; frozen once installments exist
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanTerms {
    pub amount: Money,
    pub interest_rate: Rate,
    pub term_months: u32,
    pub start_date: NaiveDate,
}

impl LoanTerms {
    /// flat simple interest over the whole term, rounded to cents
    pub fn total_interest(&self) -> Result<Money> {
        self.amount
            .checked_mul(self.interest_rate.fraction())
            .and_then(|m| m.checked_mul(Decimal::from(self.term_months)))
            .and_then(|m| m.checked_div(Decimal::from(12)))
            .map(|m| m.round_currency())
            .ok_or_else(amount_too_large)
    }

    /// principal plus total interest
    pub fn total_amount(&self) -> Result<Money> {
        self.amount
            .checked_add(self.total_interest()?)
            .ok_or_else(amount_too_large)
    }

    fn check(&self, v: &mut Validator) {
        v.check(self.amount.is_positive(), "amount", "must be greater than 0");
        v.check(
            !self.interest_rate.is_negative(),
            "interest_rate",
            "must be greater than or equal to 0",
        );
        v.check(self.term_months > 0, "term_months", "must be greater than 0");
        if self.amount.is_positive() && !self.interest_rate.is_negative() {
            v.check(self.total_amount().is_ok(), "amount", "is too large");
        }
    }
}

fn amount_too_large() -> LedgerError {
    LedgerError::invalid("loan", "amount", "is too large")
}

/// origination request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanRequest {
    pub borrower_id: String,
    pub referral_agent_id: Option<String>,
    pub amount: Money,
    pub interest_rate: Rate,
    pub term_months: u32,
    pub start_date: NaiveDate,
    /// one of "active", "paid", "defaulted"
    pub status: String,
}

impl LoanRequest {
    pub fn new(
        borrower_id: impl Into<String>,
        amount: Money,
        interest_rate: Rate,
        term_months: u32,
        start_date: NaiveDate,
    ) -> Self {
        Self {
            borrower_id: borrower_id.into(),
            referral_agent_id: None,
            amount,
            interest_rate,
            term_months,
            start_date,
            status: LoanStatus::Active.to_string(),
        }
    }

    pub fn referral_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.referral_agent_id = Some(agent_id.into());
        self
    }

    pub fn status(mut self, status: impl Into<String>) -> Self {
        self.status = status.into();
        self
    }

    pub fn terms(&self) -> LoanTerms {
        LoanTerms {
            amount: self.amount,
            interest_rate: self.interest_rate,
            term_months: self.term_months,
            start_date: self.start_date,
        }
    }

    /// check every field, reporting all failures at once
    pub fn validate(&self) -> Result<LoanStatus> {
        let mut v = Validator::new();
        v.check(!self.borrower_id.trim().is_empty(), "borrower_id", "must exist");
        self.terms().check(&mut v);
        let status = match self.status.parse::<LoanStatus>() {
            Ok(status) => Some(status),
            Err(e) => {
                v.add("status", e.to_string());
                None
            }
        };
        v.finish("loan")?;
        Ok(status.unwrap_or_default())
    }
}

/// partial update of a loan; `None` leaves a field untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoanUpdate {
    pub borrower_id: Option<String>,
    pub referral_agent_id: Option<Option<String>>,
    pub amount: Option<Money>,
    pub interest_rate: Option<Rate>,
    pub term_months: Option<u32>,
    pub start_date: Option<NaiveDate>,
    pub status: Option<String>,
}

/// loan record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loan {
    pub id: LoanId,
    pub borrower_id: String,
    pub referral_agent_id: Option<String>,
    pub terms: LoanTerms,
    /// flat interest for `terms`, fixed whenever the terms are accepted
    pub total_interest: Money,
    pub status: LoanStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loan {
    pub(crate) fn new(request: LoanRequest, status: LoanStatus, now: DateTime<Utc>) -> Result<Self> {
        let terms = request.terms();
        Ok(Self {
            id: Uuid::new_v4(),
            total_interest: terms.total_interest()?,
            terms,
            borrower_id: request.borrower_id,
            referral_agent_id: request.referral_agent_id,
            status,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn amount(&self) -> Money {
        self.terms.amount
    }

    pub fn total_interest(&self) -> Money {
        self.total_interest
    }

    pub fn total_amount(&self) -> Money {
        self.terms.amount + self.total_interest
    }

    /// even monthly share of the total, before the last-installment correction
    pub fn monthly_payment(&self) -> Money {
        self.total_amount()
            .checked_div(Decimal::from(self.terms.term_months))
            .map(|m| m.round_currency())
            .unwrap_or(Money::ZERO)
    }

    /// apply an update, rejecting schedule-shaping changes once installments exist.
    ///
    /// Nothing is modified when validation fails.
    pub(crate) fn apply_update(
        &mut self,
        update: LoanUpdate,
        has_installments: bool,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut terms = self.terms.clone();
        let mut v = Validator::new();

        let frozen = [
            ("amount", "loan amount", update.amount.is_some_and(|a| a != terms.amount)),
            (
                "interest_rate",
                "interest rate",
                update.interest_rate.is_some_and(|r| r != terms.interest_rate),
            ),
            (
                "term_months",
                "loan term",
                update.term_months.is_some_and(|t| t != terms.term_months),
            ),
            (
                "start_date",
                "start date",
                update.start_date.is_some_and(|d| d != terms.start_date),
            ),
        ];
        if has_installments {
            for (field, label, changed) in frozen {
                if changed {
                    v.add(
                        field,
                        format!(
                            "cannot be changed after installments are generated. \
                             Delete and recreate the loan if you need to change {}.",
                            label
                        ),
                    );
                }
            }
        }

        if let Some(amount) = update.amount {
            terms.amount = amount;
        }
        if let Some(rate) = update.interest_rate {
            terms.interest_rate = rate;
        }
        if let Some(term) = update.term_months {
            terms.term_months = term;
        }
        if let Some(start) = update.start_date {
            terms.start_date = start;
        }
        terms.check(&mut v);

        if let Some(borrower) = &update.borrower_id {
            v.check(!borrower.trim().is_empty(), "borrower_id", "must exist");
        }
        let status = match update.status.as_deref().map(str::parse::<LoanStatus>) {
            Some(Ok(status)) => status,
            Some(Err(e)) => {
                v.add("status", e.to_string());
                self.status
            }
            None => self.status,
        };
        v.finish("loan")?;
        let total_interest = terms.total_interest()?;

        self.terms = terms;
        self.total_interest = total_interest;
        self.status = status;
        if let Some(borrower) = update.borrower_id {
            self.borrower_id = borrower;
        }
        if let Some(agent) = update.referral_agent_id {
            self.referral_agent_id = agent;
        }
        self.updated_at = now;
        Ok(())
    }
}

/// derived loan figures, read live from payments and terms
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoanTotals {
    pub amount: Money,
    pub total_interest: Money,
    pub total_amount: Money,
    pub total_paid: Money,
    /// not clamped, negative on overpayment
    pub balance_remaining: Money,
    /// interest realized once principal is recovered
    pub profit: Money,
}

impl LoanTotals {
    pub fn compute<'a>(loan: &Loan, payments: impl IntoIterator<Item = &'a Payment>) -> Self {
        let total_paid: Money = payments.into_iter().map(|p| p.amount).sum();
        let amount = loan.amount();
        let total_amount = loan.total_amount();
        Self {
            amount,
            total_interest: loan.total_interest(),
            total_amount,
            total_paid,
            balance_remaining: total_amount - total_paid,
            profit: (total_paid - amount).max(Money::ZERO),
        }
    }

    /// share of the total amount paid so far, as a percentage to 2 places
    pub fn payment_progress(&self) -> Decimal {
        if self.total_amount.is_zero() {
            return Decimal::ZERO;
        }
        (self.total_paid.as_decimal() / self.total_amount.as_decimal() * Decimal::ONE_HUNDRED)
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
    }
}

/// earliest-due installment not yet marked paid
pub fn next_installment<'a>(
    installments: impl IntoIterator<Item = &'a Installment>,
) -> Option<&'a Installment> {
    installments
        .into_iter()
        .filter(|i| i.status != InstallmentStatus::Paid)
        .min_by_key(|i| (i.due_date, i.installment_number))
}

/// installments due strictly before `today` and not marked paid, by due date
pub fn overdue_installments<'a>(
    installments: impl IntoIterator<Item = &'a Installment>,
    today: NaiveDate,
) -> Vec<&'a Installment> {
    let mut overdue: Vec<_> = installments
        .into_iter()
        .filter(|i| i.is_overdue(today))
        .collect();
    overdue.sort_by_key(|i| (i.due_date, i.installment_number));
    overdue
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    }

    fn request() -> LoanRequest {
        LoanRequest::new(
            "BORR-1",
            Money::from_major(100_000),
            Rate::from_percentage(12),
            12,
            date(2025, 1, 1),
        )
    }

    fn payment(loan: &Loan, amount: Money) -> Payment {
        Payment::new(loan.id, amount, date(2025, 2, 1), None, now())
    }

    #[test]
    fn test_total_interest() {
        let terms = request().terms();
        assert_eq!(terms.total_interest().unwrap(), Money::from_major(12_000));
        assert_eq!(terms.total_amount().unwrap(), Money::from_major(112_000));

        let odd = LoanTerms {
            amount: Money::from_major(10_000),
            interest_rate: Rate::from_decimal(dec!(7.5)),
            term_months: 7,
            start_date: date(2025, 1, 1),
        };
        // 10000 * 7.5% * 7/12 = 437.5
        assert_eq!(odd.total_interest().unwrap(), Money::from_decimal(dec!(437.50)));
    }

    #[test]
    fn test_amount_beyond_decimal_range_is_invalid() {
        // interest alone is 1.2x the largest decimal
        let mut req = request();
        req.amount = Money::from_decimal(Decimal::MAX / dec!(2));
        req.term_months = 240;

        let err = req.terms().total_interest().unwrap_err();
        assert_eq!(err.field_errors()[0].field, "amount");

        let err = req.validate().unwrap_err();
        let fields: Vec<_> = err.field_errors().iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["amount"]);
        assert_eq!(err.field_errors()[0].message, "is too large");

        // same amount is fine without interest
        req.interest_rate = Rate::ZERO;
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_update_rejects_amount_beyond_decimal_range() {
        let mut loan = Loan::new(request(), LoanStatus::Active, now()).unwrap();
        let original = loan.clone();
        let update = LoanUpdate {
            amount: Some(Money::from_decimal(Decimal::MAX / dec!(2))),
            term_months: Some(240),
            ..Default::default()
        };
        let err = loan.apply_update(update, false, now()).unwrap_err();
        assert_eq!(err.field_errors()[0].message, "is too large");
        assert_eq!(loan, original);
    }

    #[test]
    fn test_validate_collects_all_fields() {
        let bad = LoanRequest::new("", Money::from_major(-5), Rate::from_decimal(dec!(-1)), 0, date(2025, 1, 1))
            .status("closed");
        let err = bad.validate().unwrap_err();
        let fields: Vec<_> = err.field_errors().iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["borrower_id", "amount", "interest_rate", "term_months", "status"]);
    }

    #[test]
    fn test_validate_accepts_zero_rate() {
        let mut req = request();
        req.interest_rate = Rate::ZERO;
        assert_eq!(req.validate().unwrap(), LoanStatus::Active);
    }

    #[test]
    fn test_frozen_terms_after_installments() {
        let mut loan = Loan::new(request(), LoanStatus::Active, now()).unwrap();
        let original = loan.clone();

        let update = LoanUpdate {
            amount: Some(Money::from_major(50_000)),
            start_date: Some(date(2025, 3, 1)),
            status: Some("defaulted".to_string()),
            ..Default::default()
        };
        let err = loan.apply_update(update, true, now()).unwrap_err();
        let fields: Vec<_> = err.field_errors().iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["amount", "start_date"]);
        assert_eq!(loan, original);
    }

    #[test]
    fn test_update_status_and_same_terms() {
        let mut loan = Loan::new(request(), LoanStatus::Active, now()).unwrap();
        let update = LoanUpdate {
            amount: Some(Money::from_major(100_000)),
            status: Some("paid".to_string()),
            referral_agent_id: Some(Some("AGENT-7".to_string())),
            ..Default::default()
        };
        loan.apply_update(update, true, now()).unwrap();
        assert_eq!(loan.status, LoanStatus::Paid);
        assert_eq!(loan.referral_agent_id.as_deref(), Some("AGENT-7"));
    }

    #[test]
    fn test_terms_editable_without_installments() {
        let mut loan = Loan::new(request(), LoanStatus::Active, now()).unwrap();
        let update = LoanUpdate {
            term_months: Some(24),
            ..Default::default()
        };
        loan.apply_update(update, false, now()).unwrap();
        assert_eq!(loan.terms.term_months, 24);
    }

    #[test]
    fn test_totals_and_profit() {
        let loan = Loan::new(request(), LoanStatus::Active, now()).unwrap();

        let totals = LoanTotals::compute(&loan, &Vec::<Payment>::new());
        assert_eq!(totals.balance_remaining, Money::from_major(112_000));
        assert_eq!(totals.profit, Money::ZERO);
        assert_eq!(totals.payment_progress(), Decimal::ZERO);
        assert_eq!(loan.monthly_payment(), Money::from_decimal(dec!(9333.33)));

        let payments = vec![
            payment(&loan, Money::from_major(60_000)),
            payment(&loan, Money::from_major(45_000)),
        ];
        let totals = LoanTotals::compute(&loan, &payments);
        assert_eq!(totals.total_paid, Money::from_major(105_000));
        assert_eq!(totals.balance_remaining, Money::from_major(7_000));
        assert_eq!(totals.profit, Money::from_major(5_000));
        assert_eq!(totals.payment_progress(), dec!(93.75));

        let over = vec![payment(&loan, Money::from_major(120_000))];
        let totals = LoanTotals::compute(&loan, &over);
        assert_eq!(totals.balance_remaining, Money::from_major(-8_000));
        assert_eq!(totals.profit, Money::from_major(20_000));
        assert_eq!(totals.payment_progress(), dec!(107.14));
    }

    #[test]
    fn test_next_and_overdue() {
        let loan_id = Uuid::new_v4();
        let mut a = Installment::new(loan_id, 1, Money::from(90), Money::from(10), Money::from(100), date(2025, 2, 1));
        let b = Installment::new(loan_id, 2, Money::from(90), Money::from(10), Money::from(100), date(2025, 3, 1));
        let c = Installment::new(loan_id, 3, Money::from(90), Money::from(10), Money::from(100), date(2025, 4, 1));
        a.status = InstallmentStatus::Paid;
        let all = vec![c.clone(), a.clone(), b.clone()];

        assert_eq!(next_installment(&all).map(|i| i.installment_number), Some(2));

        let overdue = overdue_installments(&all, date(2025, 4, 2));
        let numbers: Vec<_> = overdue.iter().map(|i| i.installment_number).collect();
        assert_eq!(numbers, vec![2, 3]);

        assert!(overdue_installments(&all, date(2025, 3, 1)).is_empty());
    }
}

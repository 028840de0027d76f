use chrono::{Months, NaiveDate};
use rust_decimal::Decimal;
use tracing::debug;

use crate::config::LedgerConfig;
use crate::decimal::Money;
use crate::errors::{LedgerError, Result};
use crate::installment::Installment;
use crate::loan::LoanTerms;
use crate::types::LoanId;

/// installment schedule produced at origination
#[derive(Debug, Clone)]
pub struct Schedule {
    pub loan_id: LoanId,
    pub installments: Vec<Installment>,
    pub total_interest: Money,
    pub total_amount: Money,
    /// amount folded into the last installment by the rounding correction
    pub adjustment: Option<Money>,
}

impl Schedule {
    /// get installment by its 1-based number
    pub fn get(&self, installment_number: u32) -> Option<&Installment> {
        installment_number
            .checked_sub(1)
            .and_then(|i| self.installments.get(i as usize))
    }

    /// sum of installment totals
    pub fn scheduled_total(&self) -> Money {
        self.installments.iter().map(|i| i.total_amount).sum()
    }
}

/// flat simple-interest schedule generator.
///
/// Interest is charged on the full principal for the whole term and spread
/// evenly; the last installment absorbs the rounding difference.
pub struct ScheduleGenerator<'a> {
    config: &'a LedgerConfig,
}

impl<'a> ScheduleGenerator<'a> {
    pub fn new(config: &'a LedgerConfig) -> Self {
        Self { config }
    }

    pub fn generate(&self, loan_id: LoanId, terms: &LoanTerms) -> Result<Schedule> {
        if terms.term_months == 0 {
            return Err(LedgerError::invalid("loan", "term_months", "must be greater than 0"));
        }

        // the whole schedule has to fit the calendar before any of it is built
        if add_months(terms.start_date, terms.term_months).is_none() {
            return Err(past_date_range());
        }

        let months = Decimal::from(terms.term_months);
        let total_interest = terms.total_interest()?;
        let total_amount = terms.total_amount()?;

        let monthly_principal = terms.amount / months;
        let monthly_interest = total_interest / months;
        let monthly_total = total_amount / months;

        let principal = self.config.round(monthly_principal);
        let interest = self.config.round(monthly_interest);
        let total = self.config.round(monthly_total);

        if !total.is_positive() {
            return Err(LedgerError::invalid(
                "loan",
                "amount",
                format!("is too small to spread over {} months", terms.term_months),
            ));
        }

        let mut installments = Vec::new();
        for number in 1..=terms.term_months {
            let due_date = add_months(terms.start_date, number).ok_or_else(past_date_range)?;
            installments.push(Installment::new(
                loan_id, number, principal, interest, total, due_date,
            ));
        }

        let scheduled = installments
            .iter()
            .try_fold(Money::ZERO, |acc, i| acc.checked_add(i.total_amount))
            .ok_or_else(|| LedgerError::invalid("loan", "amount", "is too large"))?;
        let difference = total_amount - scheduled;
        let mut adjustment = None;

        if difference.abs() > self.config.tolerance {
            if let Some(last) = installments.last_mut() {
                last.total_amount = self.config.round(last.total_amount + difference);
                last.principal_amount = self.config.round(last.principal_amount + difference);
                adjustment = Some(difference);
                debug!(
                    %loan_id,
                    installment_number = last.installment_number,
                    %difference,
                    "rounding difference folded into last installment"
                );
            }
        }

        Ok(Schedule {
            loan_id,
            installments,
            total_interest,
            total_amount,
            adjustment,
        })
    }
}

fn past_date_range() -> LedgerError {
    LedgerError::invalid("loan", "start_date", "schedule runs past the supported date range")
}

/// calendar month arithmetic, clamped to the end of shorter months
/// (Jan 31 + 1 month = Feb 28/29). Always offset from `date` itself so
/// clamping never accumulates across the schedule.
pub fn add_months(date: NaiveDate, months: u32) -> Option<NaiveDate> {
    date.checked_add_months(Months::new(months))
}

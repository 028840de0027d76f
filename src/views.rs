//! serializable read-only views for report generators and dashboards
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::decimal::{Money, Rate};
use crate::installment::Installment;
use crate::loan::{Loan, LoanTotals};
use crate::payments::Payment;
use crate::types::{InstallmentStatus, LoanId, LoanStatus, PaymentId};

/// everything a statement export needs for one loan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanStatement {
    pub loan_id: LoanId,
    pub borrower_id: String,
    pub referral_agent_id: Option<String>,
    pub status: LoanStatus,
    pub terms: TermsView,
    pub totals: LoanTotals,
    /// percent of the total amount paid so far
    pub payment_progress: Decimal,
    pub is_current: bool,
    pub next_due_date: Option<NaiveDate>,
    pub installments: Vec<InstallmentView>,
    pub payments: Vec<PaymentView>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermsView {
    pub amount: Money,
    pub interest_rate: Rate,
    pub term_months: u32,
    pub start_date: NaiveDate,
    pub monthly_payment: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallmentView {
    pub installment_number: u32,
    pub due_date: NaiveDate,
    pub principal_amount: Money,
    pub interest_amount: Money,
    pub total_amount: Money,
    pub amount_paid: Money,
    pub balance_remaining: Money,
    pub status: InstallmentStatus,
    pub days_until_due: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentView {
    pub payment_id: PaymentId,
    pub payment_date: NaiveDate,
    pub amount: Money,
    pub amount_applied: Money,
    pub amount_remaining: Money,
    /// loan total less this and every earlier payment
    pub running_balance: Money,
    pub note: Option<String>,
}

impl LoanStatement {
    /// `installments` in number order, `payments` in date order paired with
    /// their applied amount
    pub fn build(
        loan: &Loan,
        totals: LoanTotals,
        installments: &[&Installment],
        payments: &[(&Payment, Money)],
        today: NaiveDate,
        tolerance: Money,
    ) -> Self {
        let is_current = !installments.iter().any(|i| i.is_overdue(today));
        let next_due_date =
            crate::loan::next_installment(installments.iter().copied()).map(|i| i.due_date);

        LoanStatement {
            loan_id: loan.id,
            borrower_id: loan.borrower_id.clone(),
            referral_agent_id: loan.referral_agent_id.clone(),
            status: loan.status,
            terms: TermsView {
                amount: loan.terms.amount,
                interest_rate: loan.terms.interest_rate,
                term_months: loan.terms.term_months,
                start_date: loan.terms.start_date,
                monthly_payment: loan.monthly_payment(),
            },
            payment_progress: totals.payment_progress(),
            totals,
            is_current,
            next_due_date,
            installments: installments
                .iter()
                .map(|i| InstallmentView {
                    installment_number: i.installment_number,
                    due_date: i.due_date,
                    principal_amount: i.principal_amount,
                    interest_amount: i.interest_amount,
                    total_amount: i.total_amount,
                    amount_paid: i.amount_paid,
                    balance_remaining: i.balance_remaining(),
                    status: i.derived_status(today, tolerance),
                    days_until_due: i.days_until_due(today),
                })
                .collect(),
            payments: payments
                .iter()
                .scan(loan.total_amount(), |balance, (p, applied)| {
                    *balance -= p.amount;
                    Some(PaymentView {
                        payment_id: p.id,
                        payment_date: p.payment_date,
                        amount: p.amount,
                        amount_applied: *applied,
                        amount_remaining: p.amount - *applied,
                        running_balance: *balance,
                        note: p.note.clone(),
                    })
                })
                .collect(),
        }
    }

    /// convert to pretty-printed json string
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// dashboard aggregates across loans
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSummary {
    pub total_loans: usize,
    pub active_loans: usize,
    pub total_borrowed: Money,
    pub total_collected: Money,
    pub total_profit: Money,
    /// balance remaining summed over active loans only
    pub outstanding_balance: Money,
}

impl PortfolioSummary {
    pub fn add_loan(&mut self, active: bool, totals: &LoanTotals) {
        self.total_loans += 1;
        self.total_borrowed += totals.amount;
        self.total_collected += totals.total_paid;
        self.total_profit += totals.profit;
        if active {
            self.active_loans += 1;
            self.outstanding_balance += totals.balance_remaining;
        }
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

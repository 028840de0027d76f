use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::types::{
    AllocationId, InstallmentId, InstallmentStatus, LoanId, LoanStatus, PaymentId,
};

/// all events that can be emitted by the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    // loan events
    LoanOriginated {
        loan_id: LoanId,
        amount: Money,
        total_interest: Money,
        term_months: u32,
        start_date: NaiveDate,
        timestamp: DateTime<Utc>,
    },
    ScheduleGenerated {
        loan_id: LoanId,
        installment_count: u32,
        total_amount: Money,
        first_due_date: Option<NaiveDate>,
        timestamp: DateTime<Utc>,
    },
    ScheduleAdjusted {
        loan_id: LoanId,
        installment_number: u32,
        difference: Money,
    },
    LoanUpdated {
        loan_id: LoanId,
        old_status: LoanStatus,
        new_status: LoanStatus,
        timestamp: DateTime<Utc>,
    },
    LoanDestroyed {
        loan_id: LoanId,
        installments_removed: usize,
        timestamp: DateTime<Utc>,
    },

    // payment events
    PaymentRecorded {
        loan_id: LoanId,
        payment_id: PaymentId,
        amount: Money,
        payment_date: NaiveDate,
        timestamp: DateTime<Utc>,
    },
    PaymentUnapplied {
        loan_id: LoanId,
        payment_id: PaymentId,
        unapplied: Money,
    },
    PaymentDestroyed {
        loan_id: LoanId,
        payment_id: PaymentId,
        timestamp: DateTime<Utc>,
    },

    // allocation events
    AllocationCreated {
        allocation_id: AllocationId,
        installment_id: InstallmentId,
        payment_id: PaymentId,
        amount_applied: Money,
    },
    AllocationUpdated {
        allocation_id: AllocationId,
        old_amount: Money,
        new_amount: Money,
    },
    AllocationRemoved {
        allocation_id: AllocationId,
        installment_id: InstallmentId,
        payment_id: PaymentId,
        amount_applied: Money,
    },

    // installment events
    InstallmentStatusChanged {
        installment_id: InstallmentId,
        installment_number: u32,
        old_status: InstallmentStatus,
        new_status: InstallmentStatus,
        amount_paid: Money,
    },
}

/// event store for collecting events during operations
#[derive(Debug, Default)]
pub struct EventStore {
    events: Vec<Event>,
}

impl EventStore {
    pub fn emit(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }
}

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::NaiveDate;
use hourglass_rs::SafeTimeProvider;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::LedgerConfig;
use crate::decimal::Money;
use crate::errors::{LedgerError, Result};
use crate::events::{Event, EventStore};
use crate::installment::Installment;
use crate::loan::{self, Loan, LoanRequest, LoanTotals, LoanUpdate};
use crate::payments::{
    InstallmentPayment, Payment, PaymentAllocator, PaymentReceipt, PaymentRequest, PaymentUpdate,
};
use crate::schedule::ScheduleGenerator;
use crate::types::{AllocationId, InstallmentId, LoanId, LoanStatus, PaymentId};
use crate::views::{LoanStatement, PortfolioSummary};

/// a loan together with its generated schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanReceipt {
    pub loan: Loan,
    pub installments: Vec<Installment>,
}

/// in-memory record store for loans, installments, payments and allocations.
///
/// Allocation records reference both sides by id and belong to neither.
/// Every mutating operation validates its whole plan first, so a failed call
/// leaves the ledger untouched.
#[derive(Debug, Default)]
pub struct Ledger {
    config: LedgerConfig,
    loans: HashMap<LoanId, Loan>,
    installments: HashMap<InstallmentId, Installment>,
    payments: HashMap<PaymentId, Payment>,
    allocations: HashMap<AllocationId, InstallmentPayment>,
    events: EventStore,
}

impl Ledger {
    pub fn new(config: LedgerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            ..Default::default()
        })
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    // ---- loans ----

    /// create a loan and generate its schedule in one step
    pub fn create_loan(
        &mut self,
        request: LoanRequest,
        time: &SafeTimeProvider,
    ) -> Result<LoanReceipt> {
        let status = request.validate()?;
        let now = time.now();
        let loan = Loan::new(request, status, now)?;

        // build the schedule before storing anything
        let schedule = ScheduleGenerator::new(&self.config).generate(loan.id, &loan.terms)?;

        info!(
            loan_id = %loan.id,
            amount = %loan.amount(),
            term_months = loan.terms.term_months,
            "loan originated"
        );
        self.events.emit(Event::LoanOriginated {
            loan_id: loan.id,
            amount: loan.amount(),
            total_interest: schedule.total_interest,
            term_months: loan.terms.term_months,
            start_date: loan.terms.start_date,
            timestamp: now,
        });

        let loan_id = loan.id;
        self.loans.insert(loan_id, loan);
        self.store_schedule(loan_id, schedule, time);

        Ok(LoanReceipt {
            loan: self.require_loan(loan_id)?.clone(),
            installments: self.installments_for(loan_id).into_iter().cloned().collect(),
        })
    }

    /// generate the schedule for a loan that has none; returns how many
    /// installments were created (0 when a schedule already exists)
    pub fn generate_installments(
        &mut self,
        loan_id: LoanId,
        time: &SafeTimeProvider,
    ) -> Result<usize> {
        let loan = self.require_loan(loan_id)?;
        if self.has_installments(loan_id) {
            debug!(%loan_id, "schedule already exists, skipping generation");
            return Ok(0);
        }
        let schedule = ScheduleGenerator::new(&self.config).generate(loan_id, &loan.terms)?;
        Ok(self.store_schedule(loan_id, schedule, time))
    }

    fn store_schedule(
        &mut self,
        loan_id: LoanId,
        schedule: crate::schedule::Schedule,
        time: &SafeTimeProvider,
    ) -> usize {
        let count = schedule.installments.len();
        let first_due_date = schedule
            .installments
            .first()
            .map(|i| i.due_date);

        if let (Some(difference), Some(last)) = (schedule.adjustment, schedule.installments.last()) {
            self.events.emit(Event::ScheduleAdjusted {
                loan_id,
                installment_number: last.installment_number,
                difference,
            });
        }
        self.events.emit(Event::ScheduleGenerated {
            loan_id,
            installment_count: count as u32,
            total_amount: schedule.total_amount,
            first_due_date,
            timestamp: time.now(),
        });

        for installment in schedule.installments {
            self.installments.insert(installment.id, installment);
        }
        count
    }

    /// update loan fields; schedule-shaping fields are frozen once installments exist
    pub fn update_loan(
        &mut self,
        loan_id: LoanId,
        update: LoanUpdate,
        time: &SafeTimeProvider,
    ) -> Result<&Loan> {
        let has_installments = self.has_installments(loan_id);
        let loan = self
            .loans
            .get_mut(&loan_id)
            .ok_or(LedgerError::not_found("loan", loan_id))?;
        let old_status = loan.status;
        let now = time.now();

        loan.apply_update(update, has_installments, now)?;

        self.events.emit(Event::LoanUpdated {
            loan_id,
            old_status,
            new_status: loan.status,
            timestamp: now,
        });
        Ok(loan)
    }

    /// destroy a loan and its schedule; refused while payments exist
    pub fn destroy_loan(&mut self, loan_id: LoanId, time: &SafeTimeProvider) -> Result<()> {
        self.require_loan(loan_id)?;

        let payment_count = self.payments.values().filter(|p| p.loan_id == loan_id).count();
        if payment_count > 0 {
            warn!(%loan_id, payment_count, "refusing to delete loan with payments");
            return Err(LedgerError::Conflict {
                entity: "loan",
                id: loan_id,
                dependent: "payments",
                count: payment_count,
            });
        }

        let doomed: HashSet<InstallmentId> = self
            .installments
            .values()
            .filter(|i| i.loan_id == loan_id)
            .map(|i| i.id)
            .collect();

        // installments going away are not recomputed
        let orphaned: Vec<AllocationId> = self
            .allocations
            .values()
            .filter(|a| doomed.contains(&a.installment_id))
            .map(|a| a.id)
            .collect();
        for id in orphaned {
            if let Some(allocation) = self.allocations.remove(&id) {
                self.emit_removed(&allocation);
            }
        }

        self.installments.retain(|_, i| i.loan_id != loan_id);
        self.loans.remove(&loan_id);

        info!(%loan_id, installments_removed = doomed.len(), "loan destroyed");
        self.events.emit(Event::LoanDestroyed {
            loan_id,
            installments_removed: doomed.len(),
            timestamp: time.now(),
        });
        Ok(())
    }

    /// refresh cached installment statuses of a loan against today's date,
    /// e.g. to flip pending installments to overdue. Returns how many changed.
    pub fn refresh_statuses(&mut self, loan_id: LoanId, time: &SafeTimeProvider) -> Result<usize> {
        self.require_loan(loan_id)?;
        let ids: Vec<InstallmentId> = self.installments_for(loan_id).iter().map(|i| i.id).collect();
        let today = today(time);
        let changed = ids
            .into_iter()
            .filter(|id| self.refresh_installment(*id, today))
            .count();
        Ok(changed)
    }

    // ---- payments ----

    /// record a payment and allocate it to the loan's open installments
    pub fn create_payment(
        &mut self,
        request: PaymentRequest,
        time: &SafeTimeProvider,
    ) -> Result<PaymentReceipt> {
        self.require_loan(request.loan_id)?;
        request.validate()?;

        let now = time.now();
        let payment = Payment::new(
            request.loan_id,
            request.stored_amount(),
            request.payment_date,
            request.note,
            now,
        );

        // plan and validate before the payment is stored
        let allocations = if self.config.allocate_on_create {
            self.plan_allocations(&payment, &HashSet::new(), now)?
        } else {
            Vec::new()
        };

        let payment_id = payment.id;
        info!(
            %payment_id,
            loan_id = %payment.loan_id,
            amount = %payment.amount,
            "payment recorded"
        );
        self.events.emit(Event::PaymentRecorded {
            loan_id: payment.loan_id,
            payment_id,
            amount: payment.amount,
            payment_date: payment.payment_date,
            timestamp: now,
        });
        self.payments.insert(payment_id, payment);

        if self.config.allocate_on_create {
            self.commit_allocations(payment_id, allocations, today(time));
        }
        self.receipt(payment_id)
    }

    /// allocate whatever part of a payment is still unapplied, skipping
    /// installments this payment already touched
    pub fn apply_payment(
        &mut self,
        payment_id: PaymentId,
        time: &SafeTimeProvider,
    ) -> Result<PaymentReceipt> {
        let payment = self.require_payment(payment_id)?.clone();
        let touched: HashSet<InstallmentId> = self
            .allocations
            .values()
            .filter(|a| a.payment_id == payment_id)
            .map(|a| a.installment_id)
            .collect();

        let allocations = self.plan_allocations(&payment, &touched, time.now())?;
        self.commit_allocations(payment_id, allocations, today(time));
        self.receipt(payment_id)
    }

    fn plan_allocations(
        &self,
        payment: &Payment,
        skip: &HashSet<InstallmentId>,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<Vec<InstallmentPayment>> {
        let already_applied = self.amount_applied(payment.id);
        let unapplied = payment.amount - already_applied;
        let allocator = PaymentAllocator::new(self.config.tolerance);
        let plan = allocator.allocate(
            unapplied,
            self.installments
                .values()
                .filter(|i| i.loan_id == payment.loan_id && !skip.contains(&i.id)),
        );

        let mut remaining = unapplied;
        let mut allocations = Vec::with_capacity(plan.lines.len());
        for line in &plan.lines {
            let amount = self.config.round(line.amount);
            let installment = self.require_installment(line.installment_id)?;
            InstallmentPayment::validate_bounds(
                amount,
                remaining,
                installment.balance_remaining(),
                self.config.tolerance,
            )?;
            remaining -= amount;
            allocations.push(InstallmentPayment::new(installment.id, payment.id, amount, now));
        }

        if !plan.unapplied.is_settled(self.config.tolerance) {
            warn!(
                payment_id = %payment.id,
                unapplied = %plan.unapplied,
                "payment exceeds outstanding installments"
            );
        }
        Ok(allocations)
    }

    fn commit_allocations(
        &mut self,
        payment_id: PaymentId,
        allocations: Vec<InstallmentPayment>,
        today: NaiveDate,
    ) {
        for allocation in allocations {
            let installment_id = allocation.installment_id;
            self.events.emit(Event::AllocationCreated {
                allocation_id: allocation.id,
                installment_id,
                payment_id,
                amount_applied: allocation.amount_applied,
            });
            self.allocations.insert(allocation.id, allocation);
            self.recompute_installment(installment_id, today);
        }

        if let Some(payment) = self.payments.get(&payment_id) {
            let unapplied = payment.amount - self.amount_applied(payment_id);
            if !unapplied.is_settled(self.config.tolerance) {
                self.events.emit(Event::PaymentUnapplied {
                    loan_id: payment.loan_id,
                    payment_id,
                    unapplied,
                });
            }
        }
    }

    /// edit date or note; never re-runs allocation
    pub fn update_payment(
        &mut self,
        payment_id: PaymentId,
        update: PaymentUpdate,
        time: &SafeTimeProvider,
    ) -> Result<&Payment> {
        let payment = self
            .payments
            .get_mut(&payment_id)
            .ok_or(LedgerError::not_found("payment", payment_id))?;
        payment.apply_update(update, time.now());
        Ok(payment)
    }

    /// destroy a payment; refused while it has allocations
    pub fn destroy_payment(&mut self, payment_id: PaymentId, time: &SafeTimeProvider) -> Result<()> {
        let loan_id = self.require_payment(payment_id)?.loan_id;

        let allocation_count = self.allocations_for_payment(payment_id).len();
        if allocation_count > 0 {
            warn!(%payment_id, allocation_count, "refusing to delete allocated payment");
            return Err(LedgerError::Conflict {
                entity: "payment",
                id: payment_id,
                dependent: "allocations",
                count: allocation_count,
            });
        }

        self.payments.remove(&payment_id);
        info!(%payment_id, "payment destroyed");
        self.events.emit(Event::PaymentDestroyed {
            loan_id,
            payment_id,
            timestamp: time.now(),
        });
        Ok(())
    }

    // ---- allocations ----

    /// change an allocation's amount, re-checking both bounds
    pub fn update_allocation(
        &mut self,
        allocation_id: AllocationId,
        amount_applied: Money,
        time: &SafeTimeProvider,
    ) -> Result<&InstallmentPayment> {
        let allocation = self.require_allocation(allocation_id)?;
        let old_amount = allocation.amount_applied;
        let installment_id = allocation.installment_id;
        let payment_id = allocation.payment_id;
        let amount = self.config.round(amount_applied);

        let payment = self.require_payment(payment_id)?;
        let installment = self.require_installment(installment_id)?;
        let payment_available = payment.amount - self.amount_applied(payment_id) + old_amount;
        let installment_available = installment.balance_remaining() + old_amount;
        InstallmentPayment::validate_bounds(
            amount,
            payment_available,
            installment_available,
            self.config.tolerance,
        )?;

        if let Some(allocation) = self.allocations.get_mut(&allocation_id) {
            allocation.amount_applied = amount;
            allocation.updated_at = time.now();
        }
        self.events.emit(Event::AllocationUpdated {
            allocation_id,
            old_amount,
            new_amount: amount,
        });
        self.recompute_installment(installment_id, today(time));
        self.require_allocation(allocation_id)
    }

    /// remove an allocation and recompute its installment
    pub fn destroy_allocation(
        &mut self,
        allocation_id: AllocationId,
        time: &SafeTimeProvider,
    ) -> Result<()> {
        let allocation = self
            .allocations
            .remove(&allocation_id)
            .ok_or(LedgerError::not_found("installment_payment", allocation_id))?;
        self.emit_removed(&allocation);
        self.recompute_installment(allocation.installment_id, today(time));
        Ok(())
    }

    fn emit_removed(&mut self, allocation: &InstallmentPayment) {
        debug!(allocation_id = %allocation.id, "allocation removed");
        self.events.emit(Event::AllocationRemoved {
            allocation_id: allocation.id,
            installment_id: allocation.installment_id,
            payment_id: allocation.payment_id,
            amount_applied: allocation.amount_applied,
        });
    }

    /// sum the installment's allocations into `amount_paid` and refresh status
    fn recompute_installment(&mut self, installment_id: InstallmentId, today: NaiveDate) {
        let amount_paid = self.config.round(
            self.allocations
                .values()
                .filter(|a| a.installment_id == installment_id)
                .map(|a| a.amount_applied)
                .sum(),
        );
        let tolerance = self.config.tolerance;
        if let Some(installment) = self.installments.get_mut(&installment_id) {
            let previous = installment.apply_amount_paid(amount_paid, today, tolerance);
            if let Some(old_status) = previous {
                self.events.emit(status_changed(installment, old_status));
            }
        }
    }

    fn refresh_installment(&mut self, installment_id: InstallmentId, today: NaiveDate) -> bool {
        let tolerance = self.config.tolerance;
        match self.installments.get_mut(&installment_id) {
            Some(installment) => match installment.refresh_status(today, tolerance) {
                Some(old_status) => {
                    self.events.emit(status_changed(installment, old_status));
                    true
                }
                None => false,
            },
            None => false,
        }
    }

    // ---- reads ----

    pub fn loan(&self, loan_id: LoanId) -> Option<&Loan> {
        self.loans.get(&loan_id)
    }

    pub fn installment(&self, installment_id: InstallmentId) -> Option<&Installment> {
        self.installments.get(&installment_id)
    }

    pub fn payment(&self, payment_id: PaymentId) -> Option<&Payment> {
        self.payments.get(&payment_id)
    }

    pub fn allocation(&self, allocation_id: AllocationId) -> Option<&InstallmentPayment> {
        self.allocations.get(&allocation_id)
    }

    /// all loans, oldest first
    pub fn loans(&self) -> Vec<&Loan> {
        let mut loans: Vec<_> = self.loans.values().collect();
        loans.sort_by_key(|l| (l.created_at, l.id));
        loans
    }

    pub fn has_installments(&self, loan_id: LoanId) -> bool {
        self.installments.values().any(|i| i.loan_id == loan_id)
    }

    /// installments of a loan by number
    pub fn installments_for(&self, loan_id: LoanId) -> Vec<&Installment> {
        let mut installments: Vec<_> = self
            .installments
            .values()
            .filter(|i| i.loan_id == loan_id)
            .collect();
        installments.sort_by_key(|i| i.installment_number);
        installments
    }

    /// payments of a loan by payment date, then entry order
    pub fn payments_for(&self, loan_id: LoanId) -> Vec<&Payment> {
        let mut payments: Vec<_> = self.payments.values().filter(|p| p.loan_id == loan_id).collect();
        payments.sort_by_key(|p| (p.payment_date, p.created_at, p.id));
        payments
    }

    /// allocations of a payment in installment due order
    pub fn allocations_for_payment(&self, payment_id: PaymentId) -> Vec<&InstallmentPayment> {
        let mut allocations: Vec<_> = self
            .allocations
            .values()
            .filter(|a| a.payment_id == payment_id)
            .collect();
        allocations.sort_by_key(|a| {
            self.installments
                .get(&a.installment_id)
                .map(|i| (i.due_date, i.installment_number))
        });
        allocations
    }

    pub fn allocations_for_installment(&self, installment_id: InstallmentId) -> Vec<&InstallmentPayment> {
        let mut allocations: Vec<_> = self
            .allocations
            .values()
            .filter(|a| a.installment_id == installment_id)
            .collect();
        allocations.sort_by_key(|a| (a.created_at, a.id));
        allocations
    }

    pub fn amount_applied(&self, payment_id: PaymentId) -> Money {
        self.allocations
            .values()
            .filter(|a| a.payment_id == payment_id)
            .map(|a| a.amount_applied)
            .sum()
    }

    pub fn amount_remaining(&self, payment_id: PaymentId) -> Result<Money> {
        let payment = self.require_payment(payment_id)?;
        Ok(payment.amount - self.amount_applied(payment_id))
    }

    pub fn is_fully_applied(&self, payment_id: PaymentId) -> Result<bool> {
        Ok(self.amount_remaining(payment_id)?.abs() < self.config.tolerance)
    }

    pub fn receipt(&self, payment_id: PaymentId) -> Result<PaymentReceipt> {
        let payment = self.require_payment(payment_id)?.clone();
        Ok(PaymentReceipt {
            payment,
            allocations: self
                .allocations_for_payment(payment_id)
                .into_iter()
                .cloned()
                .collect(),
        })
    }

    pub fn loan_totals(&self, loan_id: LoanId) -> Result<LoanTotals> {
        let loan = self.require_loan(loan_id)?;
        Ok(LoanTotals::compute(
            loan,
            self.payments.values().filter(|p| p.loan_id == loan_id),
        ))
    }

    pub fn total_paid(&self, loan_id: LoanId) -> Result<Money> {
        Ok(self.loan_totals(loan_id)?.total_paid)
    }

    pub fn balance_remaining(&self, loan_id: LoanId) -> Result<Money> {
        Ok(self.loan_totals(loan_id)?.balance_remaining)
    }

    pub fn profit(&self, loan_id: LoanId) -> Result<Money> {
        Ok(self.loan_totals(loan_id)?.profit)
    }

    pub fn next_installment(&self, loan_id: LoanId) -> Result<Option<&Installment>> {
        self.require_loan(loan_id)?;
        Ok(loan::next_installment(self.installments_for(loan_id)))
    }

    pub fn overdue_installments(
        &self,
        loan_id: LoanId,
        time: &SafeTimeProvider,
    ) -> Result<Vec<&Installment>> {
        self.require_loan(loan_id)?;
        Ok(loan::overdue_installments(
            self.installments_for(loan_id),
            today(time),
        ))
    }

    /// no overdue installments
    pub fn is_current(&self, loan_id: LoanId, time: &SafeTimeProvider) -> Result<bool> {
        Ok(self.overdue_installments(loan_id, time)?.is_empty())
    }

    /// read-only statement for report generators
    pub fn statement(&self, loan_id: LoanId, time: &SafeTimeProvider) -> Result<LoanStatement> {
        let loan = self.require_loan(loan_id)?;
        let payments = self
            .payments_for(loan_id)
            .into_iter()
            .map(|p| (p, self.amount_applied(p.id)))
            .collect::<Vec<_>>();
        Ok(LoanStatement::build(
            loan,
            self.loan_totals(loan_id)?,
            &self.installments_for(loan_id),
            &payments,
            today(time),
            self.config.tolerance,
        ))
    }

    /// dashboard aggregates across all loans
    pub fn portfolio_summary(&self) -> PortfolioSummary {
        let mut summary = PortfolioSummary::default();
        for loan in self.loans.values() {
            let totals = LoanTotals::compute(
                loan,
                self.payments.values().filter(|p| p.loan_id == loan.id),
            );
            summary.add_loan(loan.status == LoanStatus::Active, &totals);
        }
        summary
    }

    pub fn events(&self) -> &[Event] {
        self.events.events()
    }

    pub fn take_events(&mut self) -> Vec<Event> {
        self.events.take_events()
    }

    fn require_loan(&self, loan_id: LoanId) -> Result<&Loan> {
        self.loans
            .get(&loan_id)
            .ok_or(LedgerError::not_found("loan", loan_id))
    }

    fn require_installment(&self, installment_id: InstallmentId) -> Result<&Installment> {
        self.installments
            .get(&installment_id)
            .ok_or(LedgerError::not_found("installment", installment_id))
    }

    fn require_payment(&self, payment_id: PaymentId) -> Result<&Payment> {
        self.payments
            .get(&payment_id)
            .ok_or(LedgerError::not_found("payment", payment_id))
    }

    fn require_allocation(&self, allocation_id: AllocationId) -> Result<&InstallmentPayment> {
        self.allocations
            .get(&allocation_id)
            .ok_or(LedgerError::not_found("installment_payment", allocation_id))
    }
}

fn today(time: &SafeTimeProvider) -> NaiveDate {
    time.now().date_naive()
}

fn status_changed(installment: &Installment, old_status: crate::types::InstallmentStatus) -> Event {
    Event::InstallmentStatusChanged {
        installment_id: installment.id,
        installment_number: installment.installment_number,
        old_status,
        new_status: installment.status,
        amount_paid: installment.amount_paid,
    }
}

/// ledger shared between threads.
///
/// Every call runs under one lock, so concurrent payments against the same
/// loan allocate one after the other and never see the same open balance.
#[derive(Debug, Clone, Default)]
pub struct SharedLedger {
    inner: Arc<Mutex<Ledger>>,
}

impl SharedLedger {
    pub fn new(ledger: Ledger) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ledger)),
        }
    }

    /// run `f` with exclusive access
    pub fn with<R>(&self, f: impl FnOnce(&mut Ledger) -> R) -> R {
        let mut guard = self.lock();
        f(&mut guard)
    }

    pub fn create_loan(&self, request: LoanRequest, time: &SafeTimeProvider) -> Result<LoanReceipt> {
        self.with(|ledger| ledger.create_loan(request, time))
    }

    pub fn create_payment(
        &self,
        request: PaymentRequest,
        time: &SafeTimeProvider,
    ) -> Result<PaymentReceipt> {
        self.with(|ledger| ledger.create_payment(request, time))
    }

    fn lock(&self) -> MutexGuard<'_, Ledger> {
        // operations validate before mutating, so a panicked holder left no partial write
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

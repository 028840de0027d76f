pub mod config;
pub mod decimal;
pub mod errors;
pub mod events;
pub mod installment;
pub mod ledger;
pub mod loan;
pub mod payments;
pub mod schedule;
pub mod types;
pub mod views;

// re-export key types
pub use config::LedgerConfig;
pub use decimal::{Money, Rate};
pub use errors::{FieldError, LedgerError, Result};
pub use events::{Event, EventStore};
pub use installment::{compute_status, Installment};
pub use ledger::{Ledger, LoanReceipt, SharedLedger};
pub use loan::{Loan, LoanRequest, LoanTerms, LoanTotals, LoanUpdate};
pub use payments::{
    AllocationLine, AllocationPlan, InstallmentPayment, Payment, PaymentAllocator, PaymentReceipt,
    PaymentRequest, PaymentUpdate,
};
pub use schedule::{Schedule, ScheduleGenerator};
pub use types::{
    AllocationId, InstallmentId, InstallmentStatus, LoanId, LoanStatus, PaymentId,
};
pub use views::{LoanStatement, PortfolioSummary};

// re-export external dependencies that users will need
pub use chrono;
pub use hourglass_rs::{SafeTimeProvider, TimeSource};
pub use rust_decimal::Decimal;
pub use uuid::Uuid;

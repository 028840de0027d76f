/// payment allocation - overdue installments first, overpayment left unapplied
use chrono::{Duration, NaiveDate, TimeZone, Utc};
use installment_ledger::{
    Ledger, LoanRequest, Money, PaymentRequest, Rate, SafeTimeProvider, TimeSource,
};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
        .init();

    let time = SafeTimeProvider::new(TimeSource::Test(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()));
    let control = time.test_control().unwrap();
    let mut ledger = Ledger::default();

    let start = NaiveDate::from_ymd_opt(2025, 1, 1).ok_or("bad date")?;
    let loan = ledger.create_loan(
        LoanRequest::new("BORR-002", Money::from_major(60_000), Rate::from_percentage(10), 6, start),
        &time,
    )?;
    let loan_id = loan.loan.id;

    // three months pass with no payment
    control.advance(Duration::days(100));
    let changed = ledger.refresh_statuses(loan_id, &time)?;
    println!("{} installments flipped to overdue", changed);
    println!("current? {}", ledger.is_current(loan_id, &time)?);

    let today = time.now().date_naive();
    let receipt = ledger.create_payment(PaymentRequest::new(loan_id, Money::from_major(25_000), today), &time)?;
    for allocation in &receipt.allocations {
        let installment = ledger.installment(allocation.installment_id).ok_or("missing installment")?;
        println!(
            "#{} ({}) <- {}  now {}",
            installment.installment_number, installment.due_date, allocation.amount_applied, installment.status
        );
    }

    // pay off everything and then some
    let big = ledger.create_payment(
        PaymentRequest::new(loan_id, Money::from_major(50_000), today).note("settlement"),
        &time,
    )?;
    println!("\nunapplied after settlement: {}", big.amount_remaining());
    println!("profit: {}", ledger.profit(loan_id)?);

    for event in ledger.take_events() {
        println!("{:?}", event);
    }
    Ok(())
}

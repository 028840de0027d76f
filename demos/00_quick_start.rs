/// quick start - originate a loan and take a payment
use chrono::NaiveDate;
use installment_ledger::{Ledger, LoanRequest, Money, PaymentRequest, Rate, SafeTimeProvider, TimeSource};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let time = SafeTimeProvider::new(TimeSource::System);
    let mut ledger = Ledger::default();

    // 100,000 over 12 months at 12% flat
    let start = NaiveDate::from_ymd_opt(2025, 1, 1).ok_or("bad date")?;
    let loan = ledger.create_loan(
        LoanRequest::new("BORR-001", Money::from_major(100_000), Rate::from_percentage(12), 12, start),
        &time,
    )?;

    for installment in &loan.installments {
        println!(
            "#{:>2} due {}  {:>10}",
            installment.installment_number, installment.due_date, installment.total_amount
        );
    }

    let receipt = ledger.create_payment(
        PaymentRequest::new(loan.loan.id, Money::from_major(10_000), start),
        &time,
    )?;
    println!("\napplied {} across {} installments", receipt.amount_applied(), receipt.allocations.len());
    println!("balance remaining: {}", ledger.balance_remaining(loan.loan.id)?);

    Ok(())
}

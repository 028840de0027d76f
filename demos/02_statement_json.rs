/// statement json - the read-only views report generators consume
use chrono::{NaiveDate, TimeZone, Utc};
use installment_ledger::{Ledger, LoanRequest, Money, PaymentRequest, Rate, SafeTimeProvider, TimeSource};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let time = SafeTimeProvider::new(TimeSource::Test(Utc.with_ymd_and_hms(2025, 3, 15, 0, 0, 0).unwrap()));
    let mut ledger = Ledger::default();

    let start = NaiveDate::from_ymd_opt(2025, 1, 1).ok_or("bad date")?;
    let loan = ledger.create_loan(
        LoanRequest::new("BORR-003", Money::from_major(30_000), Rate::from_percentage(10), 3, start)
            .referral_agent("AGENT-01"),
        &time,
    )?;

    ledger.create_payment(
        PaymentRequest::new(loan.loan.id, Money::from_major(12_000), start).note("first"),
        &time,
    )?;

    println!("{}", ledger.statement(loan.loan.id, &time)?.to_json_pretty()?);
    println!("{}", ledger.portfolio_summary().to_json_pretty()?);
    Ok(())
}

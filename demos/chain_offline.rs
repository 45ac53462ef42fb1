use chrono::{FixedOffset, NaiveDate, TimeZone};
use rust_decimal_macros::dec;
use verifactu::chain::*;
use verifactu::core::*;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let issuer = Issuer::new("B12345674", "Empresa Ejemplo SL");
    let tz = FixedOffset::east_opt(3600).unwrap();
    let day = NaiveDate::from_ymd_opt(2024, 11, 4).unwrap();

    // ── 1. Seed and chain three records ───────────────────────────────
    println!("=== Chaining ===");
    let chain = ChainManager::new();
    chain.seed(&issuer.tax_id, ChainSeed::Genesis).unwrap();

    let mut history = Vec::new();
    for (i, base) in [dec!(100), dec!(250.50), dec!(80)].into_iter().enumerate() {
        let record: Record = InvoiceRecord::new(
            issuer.clone(),
            format!("2024-{:03}", i + 1),
            day,
            "Servicios de consultoría",
            tz.with_ymd_and_hms(2024, 11, 4, 10 + i as u32, 0, 0).unwrap(),
        )
        .recipient("12345678Z", "Cliente SA")
        .add_line(TaxLine::general(dec!(21), base, (base * dec!(0.21)).round_dp(2)))
        .into();

        let errors = validate_record(&record);
        if !errors.is_empty() {
            for e in &errors {
                println!("  Validation: {e}");
            }
            return;
        }

        let pending = chain.tentative_advance(record).unwrap();
        let head = chain.commit(&pending).unwrap();
        println!("  #{} {}", head.sequence_index, head.fingerprint);
        history.push(pending.into_entry());
    }

    // ── 2. Verify, then tamper ────────────────────────────────────────
    println!("\n=== Verification ===");
    println!("  {:?}", chain.verify_chain(&issuer.tax_id, &history).unwrap());

    if let Record::Registration(inv) = &mut history[1].record {
        inv.total_amount += dec!(1);
    }
    println!("  {:?}", chain.verify_chain(&issuer.tax_id, &history).unwrap());

    // ── 3. Persist the head and resume in a "new process" ─────────────
    println!("\n=== Resume ===");
    let checkpoint = chain.checkpoint(&issuer.tax_id).unwrap();
    let json = serde_json::to_string_pretty(&checkpoint).unwrap();
    println!("{json}");

    let resumed = ChainManager::new();
    let restored: ChainCheckpoint = serde_json::from_str(&json).unwrap();
    resumed
        .seed(&issuer.tax_id, ChainSeed::Resume(restored))
        .unwrap();
    let cancel = CancellationRecord::new(
        issuer.clone(),
        "2024-001",
        day,
        tz.with_ymd_and_hms(2024, 11, 4, 18, 0, 0).unwrap(),
    );
    let link = resumed.compute_link(&cancel.into()).unwrap();
    println!(
        "  next link #{} chains off {}",
        link.sequence_index, link.previous_fingerprint
    );
}

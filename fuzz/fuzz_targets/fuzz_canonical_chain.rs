#![no_main]

use chrono::{FixedOffset, NaiveDate, TimeZone};
use libfuzzer_sys::fuzz_target;
use verifactu::chain::{ChainManager, ChainSeed};
use verifactu::core::*;

fuzz_target!(|data: &[u8]| {
    let Ok(number) = std::str::from_utf8(data) else {
        return;
    };
    let (Some(tz), Some(date)) = (
        FixedOffset::east_opt(3600),
        NaiveDate::from_ymd_opt(2024, 11, 4),
    ) else {
        return;
    };
    let Some(generated) = tz.with_ymd_and_hms(2024, 11, 4, 12, 0, 0).single() else {
        return;
    };

    let record: Record =
        InvoiceRecord::new(Issuer::new("B12345674", "Fuzz SL"), number, date, number, generated)
            .into();
    let _ = validate_record(&record);

    // Linking must be reproducible for arbitrary record content.
    let chain = ChainManager::new();
    if chain.seed("B12345674", ChainSeed::Genesis).is_ok() {
        let a = chain.compute_link(&record).ok();
        let b = chain.compute_link(&record).ok();
        assert_eq!(a, b);
    }
});

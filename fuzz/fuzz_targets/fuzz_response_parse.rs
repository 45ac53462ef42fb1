#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        // Must not panic — errors are fine, panics are bugs.
        if let Ok(response) = verifactu::soap::interpret_http(200, s.to_string()) {
            if let Ok(parsed) = verifactu::soap::parse_registration_response(&response.document) {
                let _ = parsed.verdict();
            }
            let _ = verifactu::soap::parse_query_response(&response.document);
        }
    }
});

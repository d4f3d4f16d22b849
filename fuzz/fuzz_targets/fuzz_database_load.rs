#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // This should never crash or panic, even on garbage input
    if let Ok(db) = geoip2::Database::from_bytes(data.to_vec()) {
        let _ = db.metadata_value();
        for ip in ["1.2.3.4", "::", "::ffff:81.2.69.142", "2001:db8::1"] {
            if let Ok(Some(result)) = db.lookup(ip) {
                let _ = result.to_h();
            }
        }
    }
});

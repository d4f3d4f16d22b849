#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Arbitrary query text must be rejected cleanly, never panic
    if let Ok(query) = std::str::from_utf8(data) {
        let mut file = vec![0u8; 6 + 16];
        file.extend_from_slice(b"\xAB\xCD\xEFMaxMind.com");
        // {"node_count": 1, "record_size": 24, "ip_version": 6, "binary_format_major_version": 2}
        file.push(0xE4);
        for (key, value) in [
            (&b"node_count"[..], 1u8),
            (&b"record_size"[..], 24),
            (&b"ip_version"[..], 6),
            (&b"binary_format_major_version"[..], 2),
        ] {
            file.push(0x40 | key.len() as u8);
            file.extend_from_slice(key);
            file.extend_from_slice(&[0xC1, value]);
        }
        if let Ok(db) = geoip2::Database::from_bytes(file) {
            let _ = db.lookup(query);
        }
    }
});

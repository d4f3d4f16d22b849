#![no_main]
use geoip2::data_section::DataDecoder;
use geoip2::PathElement;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }

    // First byte picks the start offset, the rest is the data section
    let offset = data[0] as usize;
    let decoder = DataDecoder::new(&data[1..]);

    let _ = decoder.decode(offset);
    let _ = decoder.lookup_path(offset, &[PathElement::Key("names"), PathElement::Index(-1)]);
});

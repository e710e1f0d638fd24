#![no_main]
use antifraud_core::Quorum;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(quorum) = s.parse::<Quorum>() {
            for nodes in 0..8 {
                let _ = quorum.required(nodes);
            }
        }
    }
});

#![no_main]
use antifraud_core::{run_local_ensemble, ValidationRequest};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(request) = serde_json::from_slice::<ValidationRequest>(data) else {
        return;
    };
    if let Ok(tx) = request.into_candidate("mainnet") {
        let outcome = run_local_ensemble(&tx, 0.7);
        assert!((0.0..=1.0).contains(&outcome.score));
    }
});

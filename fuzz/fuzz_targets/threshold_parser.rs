#![no_main]

use cronometro::threshold::ThresholdEvaluator;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        // Either a rule table or a configuration error, never a panic
        let _ = ThresholdEvaluator::parse(input);
    }
});

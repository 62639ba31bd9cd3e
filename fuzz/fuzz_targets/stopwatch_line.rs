#![no_main]

use cronometro::TimingEvent;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(line) = std::str::from_utf8(data) {
        if let Ok(event) = TimingEvent::parse_line(line) {
            // Whatever parsed must render to a line that parses the same way
            let reparsed = TimingEvent::parse_line(&event.to_string());
            assert_eq!(reparsed.ok().map(|e| e.start_ms), Some(event.start_ms));
        }
    }
});

#![no_main]
use libfuzzer_sys::fuzz_target;
use linesim_core::replay::DecisionLog;

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes must decode to a log or an error, never a panic.
    let _ = DecisionLog::from_bytes(data);
});

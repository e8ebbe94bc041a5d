#![no_main]
use libfuzzer_sys::fuzz_target;
use linesim_core::data_loader::load_schedule_json_bytes;
use linesim_core::scene::Scene;

fuzz_target!(|data: &[u8]| {
    let Ok(schedule) = load_schedule_json_bytes(data) else {
        return;
    };
    // A loaded schedule is always accepted by a source.
    let mut scene = Scene::new();
    assert!(scene.add_source("S", schedule).is_ok());
});

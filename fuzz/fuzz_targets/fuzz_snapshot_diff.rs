#![no_main]

use libfuzzer_sys::fuzz_target;
use secret_hitler_client::diff::diff;
use secret_hitler_client::presentation::PresentationTimings;
use secret_hitler_client::protocol::Snapshot;
use secret_hitler_client::PhaseEventMapper;

// Input: two snapshots as JSON, separated by a newline.
fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let Some((prev, next)) = text.split_once('\n') else {
        return;
    };
    let (Ok(prev), Ok(next)) = (
        serde_json::from_str::<Snapshot>(prev),
        serde_json::from_str::<Snapshot>(next),
    ) else {
        return;
    };
    if prev.validate().is_err() {
        return;
    }
    let mapper = PhaseEventMapper::new(PresentationTimings::instant());
    if let Ok(events) = diff(&prev, &next) {
        for viewer in next.player_order.iter().chain(prev.player_order.iter()) {
            let _ = mapper.map(&events, &next, viewer);
        }
    }
});

#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = serde_json::from_slice::<nexus_client::ServerFrame>(data);

    if let Ok(s) = std::str::from_utf8(data) {
        let _ = nexus_client::ServerFrame::from_text(s);
    }
});

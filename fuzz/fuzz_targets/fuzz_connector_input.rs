#![no_main]

use libfuzzer_sys::fuzz_target;
use nexus_client::{Connector, NexusConfig};

// Feeds newline-separated frames to connectors in every starting role.
fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let config = NexusConfig::default().with_suppress_missed_warnings(true);
    for setup in 0..3 {
        let mut connector = Connector::new(config.clone());
        let _ = match setup {
            0 => connector.host("fuzz").map(|_| ()),
            1 => connector.join_or_host("fuzz").map(|_| ()),
            _ => Ok(()),
        };
        connector.handle_open();
        for line in text.lines() {
            connector.handle_message(line);
            let _ = connector.drain_outbound();
        }
    }
});

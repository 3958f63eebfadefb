//! Fuzz target for InboundEvent::decode
//!
//! Arbitrary text from the push connection must decode or return an error.
//! It must never panic, and anything that decodes must report a type tag
//! matching the frame's `type` field.

#![no_main]

use libfuzzer_sys::fuzz_target;
use parley_proto::InboundEvent;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(event) = InboundEvent::decode(text) {
        let value: serde_json::Value = serde_json::from_str(text).expect("decoded frames are JSON");
        assert_eq!(Some(event.type_tag()), value.get("type").and_then(|t| t.as_str()));
    }
});

//! Fuzz target for the APDU and TLV codecs.
//!
//! Decoding arbitrary bytes must never panic, and every command that decodes
//! must encode back to the same bytes.

#![no_main]

use libfuzzer_sys::fuzz_target;
use melcard::apdu::{CommandApdu, ResponseApdu};
use melcard::tlv;

fuzz_target!(|data: &[u8]| {
    if let Ok(command) = CommandApdu::from_bytes(data) {
        let encoded = command.to_bytes().expect("decoded command must re-encode");
        assert_eq!(encoded, data);
    }

    if let Ok(response) = ResponseApdu::from_bytes(data) {
        assert_eq!(response.to_bytes(), data);
    }

    let _ = tlv::decode_all(data);
    let _ = tlv::find(data, tlv::TAG_AID);
});

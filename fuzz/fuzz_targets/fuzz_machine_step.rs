//! Fuzz target for applet execution.
//!
//! This target installs arbitrary code and static data on a card, selects it
//! and runs one arbitrary command, then checks the machine invariants that
//! must hold whatever the outcome.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use melcard::apdu::CommandApdu;
use melcard::card::{CardError, MultosCard, Slot};
use melcard::config::CardConfig;
use melcard::load_unit::LoadUnit;

/// Complete fuzz input
#[derive(Debug, Arbitrary)]
struct FuzzInput {
    code: Vec<u8>,
    static_data: Vec<u8>,
    header: [u8; 4],
    data: Vec<u8>,
    session_size: u8,
}

fuzz_target!(|input: FuzzInput| {
    if input.code.len() > 4096 || input.static_data.len() > 4096 || input.data.len() > 255 {
        return;
    }

    let config = CardConfig {
        step_budget: 2_000,
        session_size: input.session_size as u16,
        ..CardConfig::default()
    };
    let dynamic_size = config.dynamic_size;

    let mut card = MultosCard::new(config).unwrap();
    let unit = LoadUnit {
        code: input.code,
        static_data: input.static_data,
        ..LoadUnit::default()
    };
    card.install(&unit).unwrap();
    card.power_on().unwrap();
    card.execute_apdu(&CommandApdu::new(0x00, 0xA4, 0x04, 0x00))
        .unwrap();

    let [cla, ins, p1, p2] = input.header;
    if ins == 0xA4 {
        return;
    }
    let command = CommandApdu::new(cla, ins, p1, p2).with_data(input.data);
    let static_before = card
        .machine()
        .memory()
        .peek(card.machine().static_accessor().unwrap(), 0, unit.static_data.len())
        .unwrap()
        .to_vec();

    let result = card.execute_apdu(&command);

    let machine = card.machine();
    assert!(machine.dynamic_top() as usize <= dynamic_size);
    assert!(machine.frame_base() as usize <= dynamic_size);

    // Runs that do not exit leave static data untouched
    if matches!(
        result,
        Err(CardError::Execution(_)) | Err(CardError::StepBudgetExhausted { .. })
    ) {
        let static_after = machine
            .memory()
            .peek(machine.static_accessor().unwrap(), 0, unit.static_data.len())
            .unwrap();
        assert_eq!(static_before, static_after);
    }
});

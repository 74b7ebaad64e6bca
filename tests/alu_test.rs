//! Tests for byte and word arithmetic (SETB/W, CMPB/W, ADDB/W, SUBB/W).
//!
//! Tests cover:
//! - Top-of-stack and tagged operands
//! - Condition codes: Z on zero/equal, C on carry out or `a > literal`
//! - Compare leaves its operand in place

use melcard::apdu::CommandApdu;
use melcard::card::{MultosCard, Slot};
use melcard::config::CardConfig;
use melcard::load_unit::LoadUnit;
use melcard::{Ccr, Fault, StepOutcome};

const SESSION: u16 = 0x40;

/// Helper function to install an applet on a fresh card and select it
fn setup_card_with(code: &[u8], static_data: &[u8], config: CardConfig) -> MultosCard {
    let unit = LoadUnit {
        code: code.to_vec(),
        static_data: static_data.to_vec(),
        ..LoadUnit::default()
    };
    let mut card = MultosCard::new(config).unwrap();
    card.install(&unit).unwrap();
    card.power_on().unwrap();
    card.execute_apdu(&CommandApdu::new(0x00, 0xA4, 0x04, 0x00))
        .unwrap();
    card
}

fn setup_card(code: &[u8], static_data: &[u8]) -> MultosCard {
    setup_card_with(code, static_data, CardConfig::default())
}

fn step_n(card: &mut MultosCard, n: usize) {
    for _ in 0..n {
        assert_eq!(card.machine_mut().step(), StepOutcome::Continue);
    }
}

fn stack(card: &MultosCard) -> Vec<u8> {
    let machine = card.machine();
    let len = (machine.dynamic_top() - SESSION) as usize;
    machine.peek_dynamic(SESSION, len).unwrap()
}

fn static_bytes(card: &MultosCard) -> Vec<u8> {
    let machine = card.machine();
    let acc = machine.static_accessor().unwrap();
    machine.memory().peek(acc, 0, acc.len()).unwrap().to_vec()
}

// ========== SET Tests ==========

#[test]
fn test_setb_static() {
    // SETB SB[$0000], #$7F
    let mut card = setup_card(&[0x69, 0x00, 0x00, 0x7F], &[0x00, 0x00]);

    step_n(&mut card, 1);

    assert_eq!(static_bytes(&card), vec![0x7F, 0x00]);
    assert_eq!(card.machine().ccr(), Ccr::new(false, false));
    assert_eq!(card.machine().ip(), 4);
}

#[test]
fn test_setb_zero_sets_z() {
    let mut card = setup_card(
        &[
            0x21, 0x09, // PUSHB #$09
            0x68, 0x00, // SETB TOS, #$00
        ],
        &[],
    );

    step_n(&mut card, 2);

    assert_eq!(stack(&card), vec![0x00]);
    assert!(card.machine().ccr().z);
}

#[test]
fn test_setw_tos() {
    let mut card = setup_card(
        &[
            0x20, 0x02, // PUSHZ 2
            0x88, 0x12, 0x34, // SETW TOS, #$1234
        ],
        &[],
    );

    step_n(&mut card, 2);

    assert_eq!(stack(&card), vec![0x12, 0x34]);
}

// ========== ADD Tests ==========

#[test]
fn test_addb_carry_out() {
    let mut card = setup_card(
        &[
            0x21, 0xFF, // PUSHB #$FF
            0x78, 0x01, // ADDB TOS, #$01
        ],
        &[],
    );

    step_n(&mut card, 2);

    assert_eq!(stack(&card), vec![0x00]);
    assert_eq!(card.machine().ccr(), Ccr::new(true, true));
}

#[test]
fn test_addw_static_carries_between_bytes() {
    // ADDW SB[$0000], #$0001
    let mut card = setup_card(&[0x99, 0x00, 0x00, 0x00, 0x01], &[0x00, 0xFF]);

    step_n(&mut card, 1);

    assert_eq!(static_bytes(&card), vec![0x01, 0x00]);
    assert_eq!(card.machine().ccr(), Ccr::new(false, false));
}

// ========== SUB Tests ==========

#[test]
fn test_subb_wraps() {
    let mut card = setup_card(
        &[
            0x21, 0x00, // PUSHB #$00
            0x80, 0x01, // SUBB TOS, #$01
        ],
        &[],
    );

    step_n(&mut card, 2);

    assert_eq!(stack(&card), vec![0xFF]);
    assert_eq!(card.machine().ccr(), Ccr::new(false, false));
}

#[test]
fn test_subw_dynamic_top_relative() {
    let mut card = setup_card(
        &[
            0x22, 0x01, 0x00, // PUSHW #$0100
            0xA5, 0xFF, 0xFE, 0x00, 0x01, // SUBW DT[-$0002], #$0001
        ],
        &[],
    );

    step_n(&mut card, 2);

    assert_eq!(stack(&card), vec![0x00, 0xFF]);
    assert_eq!(card.machine().ccr(), Ccr::new(false, true));
}

// ========== CMP Tests ==========

#[test]
fn test_cmpb_equal_keeps_operand() {
    let mut card = setup_card(
        &[
            0x21, 0x05, // PUSHB #$05
            0x70, 0x05, // CMPB TOS, #$05
        ],
        &[],
    );

    step_n(&mut card, 2);

    assert_eq!(stack(&card), vec![0x05]);
    assert_eq!(card.machine().ccr(), Ccr::new(true, false));
}

#[test]
fn test_cmpw_greater_sets_carry() {
    let mut card = setup_card(
        &[
            0x22, 0x10, 0x00, // PUSHW #$1000
            0x90, 0x0F, 0xFF, // CMPW TOS, #$0FFF
        ],
        &[],
    );

    step_n(&mut card, 2);

    assert_eq!(card.machine().ccr(), Ccr::new(false, true));
}

#[test]
fn test_cmpb_static_less() {
    // CMPB SB[$0001], #$80
    let mut card = setup_card(&[0x71, 0x00, 0x01, 0x80], &[0xFF, 0x10]);

    step_n(&mut card, 1);

    assert_eq!(card.machine().ccr(), Ccr::new(false, false));
    assert_eq!(static_bytes(&card), vec![0xFF, 0x10]);
}

// ========== Fault Tests ==========

#[test]
fn test_addb_empty_stack_faults() {
    let config = CardConfig {
        session_size: 0,
        ..CardConfig::default()
    };
    let mut card = setup_card_with(&[0x78, 0x01], &[], config);

    assert_eq!(
        card.machine_mut().step(),
        StepOutcome::Fault(Fault::StackUnderflow { needed: 1, top: 0 })
    );
    assert_eq!(card.machine().ccr(), Ccr::default());
}

//! # ALU (Arithmetic Logic Unit) Instructions
//!
//! This module implements the fixed-width arithmetic families:
//! - SETB / SETW: store a literal
//! - CMPB / CMPW: compare with a literal
//! - ADDB / ADDW: add a literal
//! - SUBB / SUBW: subtract a literal
//!
//! The operand is a byte or big-endian word either on top of the stack (TOS
//! form) or in memory (tagged form). The literal is always the last parameter.
//!
//! ## Flags
//!
//! | Operation | Z              | C              |
//! |-----------|----------------|----------------|
//! | SET       | literal == 0   | cleared        |
//! | CMP       | a == literal   | a > literal    |
//! | ADD       | result == 0    | carry out      |
//! | SUB       | result == 0    | a > literal    |

use super::locate;
use crate::addressing::AddressSpace;
use crate::condition::Ccr;
use crate::machine::{DecodedInstruction, ExecutionState, Fault, Machine};
use crate::opcodes::InstructionClass;

#[derive(Clone, Copy)]
enum Operation {
    Set,
    Cmp,
    Add,
    Sub,
}

pub(crate) fn execute(
    machine: &mut Machine,
    instr: &DecodedInstruction,
    state: &mut ExecutionState,
) -> Result<(), Fault> {
    use InstructionClass::*;
    let (operation, width) = match instr.metadata.class {
        SetB => (Operation::Set, 1),
        CmpB => (Operation::Cmp, 1),
        AddB => (Operation::Add, 1),
        SubB => (Operation::Sub, 1),
        SetW => (Operation::Set, 2),
        CmpW => (Operation::Cmp, 2),
        AddW => (Operation::Add, 2),
        _ => (Operation::Sub, 2),
    };

    let space = instr.metadata.address_space();
    let offset = if space == AddressSpace::Tos { 0 } else { instr.word(0) };
    let literal = instr.word(1);

    let (acc, at) = locate(machine, state, space, offset, width)?;
    let current = match operation {
        Operation::Set => 0,
        _ => {
            let bytes = machine.memory.read_bytes(&acc, at, width)?;
            bytes.iter().fold(0u16, |v, &b| (v << 8) | b as u16)
        }
    };

    let (result, ccr) = apply(operation, current, literal, width);
    state.ccr = ccr;
    if let Some(result) = result {
        let bytes = result.to_be_bytes();
        machine.memory.write_bytes(&acc, at, &bytes[2 - width..])?;
    }
    Ok(())
}

/// Computes the result (if written back) and the new condition codes.
fn apply(operation: Operation, a: u16, b: u16, width: usize) -> (Option<u16>, Ccr) {
    let mask: u32 = if width == 1 { 0xFF } else { 0xFFFF };
    let (a, b) = (a as u32 & mask, b as u32 & mask);

    match operation {
        Operation::Set => (Some(b as u16), Ccr::new(b == 0, false)),
        Operation::Cmp => (None, Ccr::new(a == b, a > b)),
        Operation::Add => {
            let sum = a + b;
            let result = sum & mask;
            (Some(result as u16), Ccr::new(result == 0, sum > mask))
        }
        Operation::Sub => {
            let result = a.wrapping_sub(b) & mask;
            (Some(result as u16), Ccr::new(result == 0, a > b))
        }
    }
}

//! # Stack Operations
//!
//! This module implements the STACK family:
//! - PUSHZ n: push n zero bytes
//! - PUSHB b / PUSHW w: push a literal
//! - POPN n / POPB / POPW: drop bytes
//!
//! The stack lives in the dynamic area and grows upward from the session data.
//! The dynamic top register points one past the last pushed byte.

use crate::machine::{DecodedInstruction, ExecutionState, Fault, Machine};

pub(crate) fn execute(
    machine: &mut Machine,
    instr: &DecodedInstruction,
    state: &mut ExecutionState,
) -> Result<(), Fault> {
    match instr.metadata.tag {
        0 => machine.push_zeros(state, instr.byte(0) as usize),
        1 => machine.push(state, &[instr.byte(0)]),
        2 => machine.push_word(state, instr.word(0)),
        4 => machine.discard(state, instr.byte(0) as usize),
        5 => machine.discard(state, 1),
        _ => machine.discard(state, 2),
    }
}

//! # Control Flow Instructions
//!
//! This module implements the instructions that change the instruction pointer:
//! - Bcc: branch by a signed byte relative to the next instruction
//! - Jcc: jump to an absolute code address
//! - Ccc: call an absolute code address
//! - RET, RETI, RETO, RETIO: return from a call
//! - PRIM0..PRIM3: primitive calls
//!
//! ## Frames
//!
//! A call pushes the caller's frame base and the return address (both words)
//! and starts a new frame at the resulting dynamic top:
//!
//! ```text
//!   F-4-in   F-4        F-2          F
//!   | args   | old FB   | return IP  | locals ... | result | <- dynamic top
//! ```
//!
//! A return with `in` argument bytes and `out` result bytes copies the top `out`
//! bytes down to `F-4-in`, restores the frame base and instruction pointer from
//! the frame header, and leaves the dynamic top just above the copied result.

use crate::condition::Condition;
use crate::machine::{DecodedInstruction, ExecutionState, Fault, Machine};
use crate::opcodes::InstructionClass;
use tracing::debug;

/// Executes a BRANCH, JUMP or CALL instruction.
///
/// When the condition tag does not hold the instruction falls through.
pub(crate) fn execute_transfer(
    machine: &mut Machine,
    instr: &DecodedInstruction,
    state: &mut ExecutionState,
) -> Result<(), Fault> {
    let condition = Condition::from_tag(instr.metadata.tag);
    if !condition.holds(state.ccr) {
        return Ok(());
    }

    match instr.metadata.class {
        InstructionClass::Branch => {
            let displacement = instr.byte(0) as i8 as i16;
            state.ip = instr.next_ip.wrapping_add_signed(displacement);
        }
        InstructionClass::Jump => {
            state.ip = instr.word(0);
        }
        _ => call(machine, state, instr.word(0))?,
    }
    Ok(())
}

fn call(machine: &mut Machine, state: &mut ExecutionState, target: u16) -> Result<(), Fault> {
    let return_ip = state.ip;
    let caller_frame = state.frame_base;
    machine.push_word(state, caller_frame)?;
    machine.push_word(state, return_ip)?;
    state.frame_base = state.dynamic_top;
    state.ip = target;
    Ok(())
}

/// Executes a PRIMn or RET* instruction.
pub(crate) fn execute_primret(
    machine: &mut Machine,
    instr: &DecodedInstruction,
    state: &mut ExecutionState,
) -> Result<(), Fault> {
    match instr.metadata.tag {
        0..=3 => {
            let count = instr.metadata.params().len();
            debug!(
                primitive = ?&instr.operands[..count],
                ip = instr.ip,
                "primitive call ignored"
            );
            Ok(())
        }
        4 => ret(machine, state, 0, 0),
        5 => ret(machine, state, instr.byte(0) as usize, 0),
        6 => ret(machine, state, 0, instr.byte(0) as usize),
        _ => ret(machine, state, instr.byte(0) as usize, instr.byte(1) as usize),
    }
}

fn ret(
    machine: &mut Machine,
    state: &mut ExecutionState,
    args: usize,
    results: usize,
) -> Result<(), Fault> {
    let frame = state.frame_base as usize;
    if frame < 4 + args {
        return Err(Fault::StackUnderflow {
            needed: 4 + args,
            top: state.frame_base,
        });
    }
    if (state.dynamic_top as usize) < frame + results {
        return Err(Fault::StackUnderflow {
            needed: results,
            top: state.dynamic_top,
        });
    }

    let dynamic = machine.dynamic.clone();
    let saved_frame = machine.memory.read_word(&dynamic, (frame - 4) as u16)?;
    let return_ip = machine.memory.read_word(&dynamic, (frame - 2) as u16)?;

    let base = (frame - 4 - args) as u16;
    let result_at = state.dynamic_top - results as u16;
    if results > 0 {
        machine.memory.copy_bytes(&dynamic, result_at, base, results)?;
    }

    state.frame_base = saved_frame;
    state.ip = return_ip;
    state.dynamic_top = base + results as u16;
    Ok(())
}

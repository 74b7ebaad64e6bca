//! # System Instructions
//!
//! Tags of the SYSTEM family:
//!
//! | Tag | Mnemonic   | Effect                          |
//! |-----|------------|---------------------------------|
//! | 0   | `NOP`      | none                            |
//! | 1   | `SETSW`    | SW := w                         |
//! | 2   | `SETLA`    | La := w                         |
//! | 3   | `SETSWLA`  | SW := w1, La := w2              |
//! | 4   | `EXIT`     | halt                            |
//! | 5   | `EXITSW`   | SW := w, halt                   |
//! | 6   | `EXITLA`   | La := w, halt                   |
//! | 7   | `EXITSWLA` | SW := w1, La := w2, halt        |
//!
//! SW lives at `PT[-2]` and La at `PT[-4]`.

use crate::machine::{DecodedInstruction, ExecutionState, ExecutionStatus, Fault, Machine};
use crate::session::{LA_OFFSET, SW_OFFSET};

pub(crate) fn execute(
    machine: &mut Machine,
    instr: &DecodedInstruction,
    state: &mut ExecutionState,
) -> Result<(), Fault> {
    let tag = instr.metadata.tag;
    let sets_sw = tag & 0x01 != 0;
    let sets_la = tag & 0x02 != 0;

    let mut operand = 0;
    if sets_sw {
        write_public_word(machine, SW_OFFSET, instr.word(operand))?;
        operand += 1;
    }
    if sets_la {
        write_public_word(machine, LA_OFFSET, instr.word(operand))?;
    }
    if tag & 0x04 != 0 {
        state.status = ExecutionStatus::Halted;
    }
    Ok(())
}

fn write_public_word(machine: &mut Machine, back: u16, value: u16) -> Result<(), Fault> {
    let public = machine.public.clone();
    let offset = machine.public_top(back);
    machine.memory.write_word(&public, offset, value)?;
    Ok(())
}

//! # MEL Instruction Implementations
//!
//! This module contains the implementations of all MEL instructions, organized by family.
//! Each family exposes one `execute` function taking the machine, the decoded instruction
//! and the register copy being computed for this step.
//!
//! ## Categories
//!
//! - **system**: Status word and exit control (NOP, SETSW, SETLA, SETSWLA, EXIT*)
//! - **control**: Branches, jumps, calls, primitives and returns (Bcc, Jcc, Ccc, PRIMn, RET*)
//! - **stack**: Stack manipulation (PUSHZ, PUSHB, PUSHW, POPN, POPB, POPW)
//! - **load_store**: Data movement (LOAD, STORE, LOADI, STOREI, LOADA, INDEX)
//! - **alu**: Byte and word arithmetic (SETB/W, CMPB/W, ADDB/W, SUBB/W)
//! - **block**: N-byte operations (CLEARN, TESTN, INCN, DECN, NOTN, CMPN, ADDN, SUBN, ANDN, ORN, XORN)

pub mod alu;
pub mod block;
pub mod control;
pub mod load_store;
pub mod stack;
pub mod system;

use crate::addressing::AddressSpace;
use crate::machine::{DecodedInstruction, ExecutionState, Fault, Machine};
use crate::memory::Accessor;
use crate::opcodes::InstructionClass;

/// Dispatches a decoded instruction to its family.
///
/// `state` arrives with `ip` already pointing at the next instruction.
pub(crate) fn execute(
    machine: &mut Machine,
    instr: &DecodedInstruction,
    state: &mut ExecutionState,
) -> Result<(), Fault> {
    use InstructionClass::*;
    match instr.metadata.class {
        System => system::execute(machine, instr, state),
        Branch | Jump | Call => control::execute_transfer(machine, instr, state),
        PrimRet => control::execute_primret(machine, instr, state),
        Stack => stack::execute(machine, instr, state),
        Load | Store | LoadI | StoreI | LoadA | Index => load_store::execute(machine, instr, state),
        SetB | CmpB | AddB | SubB | SetW | CmpW | AddW | SubW => alu::execute(machine, instr, state),
        ClearN | TestN | IncN | DecN | NotN | CmpN | AddN | SubN | AndN | OrN | XorN => {
            block::execute(machine, instr, state)
        }
        Invalid => Err(Fault::UnknownInstruction {
            opcode: instr.metadata.opcode,
            ip: instr.ip,
        }),
    }
}

/// Location of an `len`-byte operand.
///
/// The TOS space means the top `len` bytes of the stack; every other space is
/// resolved against the current registers.
pub(crate) fn locate(
    machine: &Machine,
    state: &ExecutionState,
    space: AddressSpace,
    offset: u16,
    len: usize,
) -> Result<(Accessor, u16), Fault> {
    if space == AddressSpace::Tos {
        let at = machine.stack_top(state, len)?;
        Ok((machine.dynamic.clone(), at))
    } else {
        machine.resolve_operand(state, space, offset, len)
    }
}

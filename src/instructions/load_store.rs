//! # Load and Store Instructions
//!
//! This module implements data movement between the stack and the memory areas:
//! - LOAD n, addr: push n bytes from `addr`
//! - STORE n, addr: pop n bytes into `addr`
//! - LOADI n, addr: push n bytes from the linear pointer held at `addr`
//! - STOREI n, addr: pop n bytes into the linear pointer held at `addr`
//! - LOADA addr: push the linear address of `addr`
//! - INDEX size, addr: pop an index and push the linear address of element `index`
//!
//! ## Top-of-Stack Forms
//!
//! | Instruction | Effect                                                     |
//! |-------------|------------------------------------------------------------|
//! | `LOAD n`    | duplicate the top n bytes                                  |
//! | `STORE n`   | copy the top n bytes over the n bytes beneath, pop n       |
//! | `LOADI n`   | pop a pointer, push n bytes from it                        |
//! | `STOREI n`  | pop a pointer, pop n bytes into it                         |

use super::locate;
use crate::addressing::AddressSpace;
use crate::machine::{DecodedInstruction, ExecutionState, Fault, Machine};
use crate::opcodes::InstructionClass;

pub(crate) fn execute(
    machine: &mut Machine,
    instr: &DecodedInstruction,
    state: &mut ExecutionState,
) -> Result<(), Fault> {
    let space = instr.metadata.address_space();
    match instr.metadata.class {
        InstructionClass::Load => load(machine, instr, state, space),
        InstructionClass::Store => store(machine, instr, state, space),
        InstructionClass::LoadI => load_indirect(machine, instr, state, space),
        InstructionClass::StoreI => store_indirect(machine, instr, state, space),
        InstructionClass::LoadA => load_address(machine, instr, state, space),
        _ => index(machine, instr, state, space),
    }
}

/// Operand length and encoded offset of an `n` + offset instruction.
fn block_operands(instr: &DecodedInstruction, space: AddressSpace) -> (usize, u16) {
    if space == AddressSpace::Tos {
        (instr.byte(1) as usize, 0)
    } else {
        (instr.byte(0) as usize, instr.word(1))
    }
}

fn load(
    machine: &mut Machine,
    instr: &DecodedInstruction,
    state: &mut ExecutionState,
    space: AddressSpace,
) -> Result<(), Fault> {
    let (len, offset) = block_operands(instr, space);
    let (acc, at) = locate(machine, state, space, offset, len)?;
    let bytes = machine.memory.read_bytes(&acc, at, len)?;
    machine.push(state, &bytes)
}

fn store(
    machine: &mut Machine,
    instr: &DecodedInstruction,
    state: &mut ExecutionState,
    space: AddressSpace,
) -> Result<(), Fault> {
    let (len, offset) = block_operands(instr, space);

    if space == AddressSpace::Tos {
        let source = machine.stack_top(state, len)?;
        let target = machine.stack_top(state, 2 * len)?;
        let dynamic = machine.dynamic.clone();
        machine.memory.copy_bytes(&dynamic, source, target, len)?;
        state.dynamic_top = source;
        return Ok(());
    }

    let (acc, at) = machine.resolve_operand(state, space, offset, len)?;
    let bytes = machine.pop(state, len)?;
    machine.memory.write_bytes(&acc, at, &bytes)?;
    Ok(())
}

/// Reads the linear pointer an indirect instruction goes through.
fn pointer(
    machine: &mut Machine,
    state: &mut ExecutionState,
    space: AddressSpace,
    offset: u16,
) -> Result<u16, Fault> {
    if space == AddressSpace::Tos {
        machine.pop_word(state)
    } else {
        let (acc, at) = machine.resolve_operand(state, space, offset, 2)?;
        Ok(machine.memory.read_word(&acc, at)?)
    }
}

fn load_indirect(
    machine: &mut Machine,
    instr: &DecodedInstruction,
    state: &mut ExecutionState,
    space: AddressSpace,
) -> Result<(), Fault> {
    let (len, offset) = block_operands(instr, space);
    let addr = pointer(machine, state, space, offset)?;
    let (acc, at) = machine.resolve_linear(addr, len)?;
    let bytes = machine.memory.read_bytes(&acc, at, len)?;
    machine.push(state, &bytes)
}

fn store_indirect(
    machine: &mut Machine,
    instr: &DecodedInstruction,
    state: &mut ExecutionState,
    space: AddressSpace,
) -> Result<(), Fault> {
    let (len, offset) = block_operands(instr, space);
    let addr = pointer(machine, state, space, offset)?;
    let (acc, at) = machine.resolve_linear(addr, len)?;
    let bytes = machine.pop(state, len)?;
    machine.memory.write_bytes(&acc, at, &bytes)?;
    Ok(())
}

fn linear_address(
    machine: &Machine,
    state: &ExecutionState,
    space: AddressSpace,
    offset: u16,
) -> Result<u16, Fault> {
    machine
        .layout(state)
        .linear_address(space, offset)
        .ok_or(Fault::AddressResolution {
            space,
            offset,
            len: 0,
        })
}

fn load_address(
    machine: &mut Machine,
    instr: &DecodedInstruction,
    state: &mut ExecutionState,
    space: AddressSpace,
) -> Result<(), Fault> {
    let addr = linear_address(machine, state, space, instr.word(0))?;
    machine.push_word(state, addr)
}

fn index(
    machine: &mut Machine,
    instr: &DecodedInstruction,
    state: &mut ExecutionState,
    space: AddressSpace,
) -> Result<(), Fault> {
    let element_size = instr.byte(0) as u16;
    let base = instr.word(1);
    let i = machine.pop_word(state)?;
    let offset = base.wrapping_add(i.wrapping_mul(element_size));
    let addr = linear_address(machine, state, space, offset)?;
    machine.push_word(state, addr)
}

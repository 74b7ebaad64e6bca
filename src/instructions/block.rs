//! # N-Byte Instructions
//!
//! Arbitrary-length big-endian operations. `n` is the operand length in bytes.
//!
//! Unary operations (CLEARN, TESTN, INCN, DECN, NOTN) work on the top `n` stack
//! bytes (TOS form) or on `n` bytes in memory (tagged form).
//!
//! Binary operations (CMPN, ADDN, SUBN, ANDN, ORN, XORN) take `b` from the top
//! `n` stack bytes and `a` from the `n` bytes beneath it (TOS form) or from
//! memory (tagged form). The result replaces `a`, except for CMPN, and `b` is
//! popped.

use super::locate;
use crate::addressing::AddressSpace;
use crate::condition::Ccr;
use crate::machine::{DecodedInstruction, ExecutionState, Fault, Machine};
use crate::opcodes::InstructionClass;

pub(crate) fn execute(
    machine: &mut Machine,
    instr: &DecodedInstruction,
    state: &mut ExecutionState,
) -> Result<(), Fault> {
    use InstructionClass::*;

    let space = instr.metadata.address_space();
    let (len, offset) = if space == AddressSpace::Tos {
        (instr.byte(1) as usize, 0)
    } else {
        (instr.byte(0) as usize, instr.word(1))
    };

    match instr.metadata.class {
        ClearN | TestN | IncN | DecN | NotN => {
            unary(machine, instr.metadata.class, state, space, offset, len)
        }
        class => binary(machine, class, state, space, offset, len),
    }
}

fn unary(
    machine: &mut Machine,
    class: InstructionClass,
    state: &mut ExecutionState,
    space: AddressSpace,
    offset: u16,
    len: usize,
) -> Result<(), Fault> {
    let (acc, at) = locate(machine, state, space, offset, len)?;

    if class == InstructionClass::ClearN {
        machine.memory.zero_bytes(&acc, at, len)?;
        return Ok(());
    }

    let mut value = machine.memory.read_bytes(&acc, at, len)?;
    let carry = match class {
        InstructionClass::TestN => {
            state.ccr = Ccr::new(is_zero(&value), false);
            return Ok(());
        }
        InstructionClass::IncN => increment(&mut value),
        InstructionClass::DecN => decrement(&mut value),
        _ => {
            value.iter_mut().for_each(|b| *b = !*b);
            false
        }
    };
    machine.memory.write_bytes(&acc, at, &value)?;
    state.ccr = Ccr::new(is_zero(&value), carry);
    Ok(())
}

fn binary(
    machine: &mut Machine,
    class: InstructionClass,
    state: &mut ExecutionState,
    space: AddressSpace,
    offset: u16,
    len: usize,
) -> Result<(), Fault> {
    let (a_acc, a_at) = if space == AddressSpace::Tos {
        let at = machine.stack_top(state, 2 * len)?;
        (machine.dynamic.clone(), at)
    } else {
        machine.resolve_operand(state, space, offset, len)?
    };

    let b = machine.pop(state, len)?;
    let mut a = machine.memory.read_bytes(&a_acc, a_at, len)?;

    let (ccr, write_back) = match class {
        InstructionClass::CmpN => (compare(&a, &b), false),
        InstructionClass::AddN => {
            let carry = add(&mut a, &b);
            (Ccr::new(is_zero(&a), carry), true)
        }
        InstructionClass::SubN => {
            let flags = compare(&a, &b);
            subtract(&mut a, &b);
            (Ccr::new(is_zero(&a), flags.c), true)
        }
        InstructionClass::AndN => (bitwise(&mut a, &b, |x, y| x & y), true),
        InstructionClass::OrN => (bitwise(&mut a, &b, |x, y| x | y), true),
        _ => (bitwise(&mut a, &b, |x, y| x ^ y), true),
    };

    if write_back {
        machine.memory.write_bytes(&a_acc, a_at, &a)?;
    }
    state.ccr = ccr;
    Ok(())
}

fn is_zero(value: &[u8]) -> bool {
    value.iter().all(|&b| b == 0)
}

/// Z = equal, C = `a > b` as unsigned big-endian numbers.
fn compare(a: &[u8], b: &[u8]) -> Ccr {
    Ccr::new(a == b, a > b)
}

/// Adds one in place; returns the carry out.
fn increment(value: &mut [u8]) -> bool {
    for byte in value.iter_mut().rev() {
        let (sum, overflow) = byte.overflowing_add(1);
        *byte = sum;
        if !overflow {
            return false;
        }
    }
    true
}

/// Subtracts one in place; returns the borrow out.
fn decrement(value: &mut [u8]) -> bool {
    for byte in value.iter_mut().rev() {
        let (difference, underflow) = byte.overflowing_sub(1);
        *byte = difference;
        if !underflow {
            return false;
        }
    }
    true
}

/// `a += b`; returns the carry out.
fn add(a: &mut [u8], b: &[u8]) -> bool {
    let mut carry = 0u16;
    for (x, &y) in a.iter_mut().zip(b).rev() {
        let sum = *x as u16 + y as u16 + carry;
        *x = sum as u8;
        carry = sum >> 8;
    }
    carry != 0
}

/// `a -= b` modulo 2^(8n).
fn subtract(a: &mut [u8], b: &[u8]) {
    let mut borrow = 0i16;
    for (x, &y) in a.iter_mut().zip(b).rev() {
        let mut difference = *x as i16 - y as i16 - borrow;
        borrow = 0;
        if difference < 0 {
            difference += 0x100;
            borrow = 1;
        }
        *x = difference as u8;
    }
}

fn bitwise(a: &mut [u8], b: &[u8], op: impl Fn(u8, u8) -> u8) -> Ccr {
    for (x, &y) in a.iter_mut().zip(b) {
        *x = op(*x, y);
    }
    Ccr::new(is_zero(a), false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_increment_propagates_carry() {
        let mut value = [0x00, 0xFF, 0xFF];
        assert!(!increment(&mut value));
        assert_eq!(value, [0x01, 0x00, 0x00]);

        let mut value = [0xFF, 0xFF];
        assert!(increment(&mut value));
        assert_eq!(value, [0x00, 0x00]);
    }

    #[test]
    fn test_decrement_propagates_borrow() {
        let mut value = [0x01, 0x00];
        assert!(!decrement(&mut value));
        assert_eq!(value, [0x00, 0xFF]);

        let mut value = [0x00, 0x00];
        assert!(decrement(&mut value));
        assert_eq!(value, [0xFF, 0xFF]);
    }

    #[test]
    fn test_add_multi_byte() {
        let mut a = [0x12, 0xFF, 0xFF];
        assert!(!add(&mut a, &[0x00, 0x00, 0x01]));
        assert_eq!(a, [0x13, 0x00, 0x00]);

        let mut a = [0xFF, 0xFF, 0xFF];
        assert!(add(&mut a, &[0x00, 0x00, 0x02]));
        assert_eq!(a, [0x00, 0x00, 0x01]);
    }

    #[test]
    fn test_subtract_multi_byte() {
        let mut a = [0x01, 0x00, 0x00];
        subtract(&mut a, &[0x00, 0x00, 0x01]);
        assert_eq!(a, [0x00, 0xFF, 0xFF]);

        let mut a = [0x00, 0x00];
        subtract(&mut a, &[0x00, 0x01]);
        assert_eq!(a, [0xFF, 0xFF]);
    }

    #[test]
    fn test_compare_is_unsigned_big_endian() {
        assert_eq!(compare(&[0x01, 0x00], &[0x00, 0xFF]), Ccr::new(false, true));
        assert_eq!(compare(&[0x00, 0xFF], &[0x01, 0x00]), Ccr::new(false, false));
        assert_eq!(compare(&[0xAB, 0xCD], &[0xAB, 0xCD]), Ccr::new(true, false));
    }

    #[test]
    fn test_zero_length_operands() {
        assert!(is_zero(&[]));
        let mut empty: [u8; 0] = [];
        assert!(increment(&mut empty));
        assert_eq!(compare(&[], &[]), Ccr::new(true, false));
    }
}

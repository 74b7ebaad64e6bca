//! MEL Disassembler Module
//!
//! Converts MEL bytecode into human-readable assembly mnemonics.

pub mod decoder;
pub mod formatter;

use crate::opcodes::ParamKind;

/// A single disassembled instruction with full metadata
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    /// Code offset where this instruction starts
    pub address: u16,

    /// The opcode byte value (0x00-0xFF)
    pub opcode: u8,

    /// Instruction mnemonic (e.g., "LOAD", "CALL", "EXITSW")
    pub mnemonic: &'static str,

    /// Parameter kinds, in encoding order
    pub params: &'static [ParamKind],

    /// Parameter bytes following the opcode
    pub operand_bytes: Vec<u8>,

    /// Total size in bytes (opcode + parameters)
    pub size_bytes: u8,
}

/// Options controlling disassembly output
#[derive(Debug, Clone, Copy, Default)]
pub struct DisassemblyOptions {
    /// Code offset of the first byte (affects address display)
    pub start_address: u16,
}

/// Disassemble a byte slice into a vector of instructions
///
/// Unknown opcodes and instructions cut off by the end of the slice become
/// one-byte `.byte` entries.
///
/// # Examples
///
/// ```
/// use melcard::disassembler::{disassemble, formatter::format_instruction, DisassemblyOptions};
///
/// // PUSHB 5, ADDB TOS 1, EXIT
/// let code = [0x21, 0x05, 0x78, 0x01, 0x04];
/// let lines: Vec<String> = disassemble(&code, DisassemblyOptions::default())
///     .iter()
///     .map(format_instruction)
///     .collect();
///
/// assert_eq!(lines, vec!["PUSHB #$05", "ADDB TOS, #$01", "EXIT"]);
/// ```
pub fn disassemble(bytes: &[u8], options: DisassemblyOptions) -> Vec<Instruction> {
    let mut instructions = Vec::new();
    let mut pc = 0;
    let mut address = options.start_address;

    while pc < bytes.len() {
        let instr = decoder::decode_instruction(&bytes[pc..], address)
            .unwrap_or_else(|| decoder::raw_byte(bytes[pc], address));
        pc += instr.size_bytes as usize;
        address = address.wrapping_add(instr.size_bytes as u16);
        instructions.push(instr);
    }

    instructions
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disassemble_empty() {
        let bytes = &[];
        let instructions = disassemble(bytes, DisassemblyOptions::default());
        assert_eq!(instructions.len(), 0);
    }

    #[test]
    fn test_disassemble_addresses() {
        let bytes = &[0x22, 0x00, 0x01, 0x30, 0x04];
        let options = DisassemblyOptions {
            start_address: 0x0100,
        };
        let instructions = disassemble(bytes, options);
        let addresses: Vec<u16> = instructions.iter().map(|i| i.address).collect();
        assert_eq!(addresses, vec![0x0100, 0x0103, 0x0104]);
        assert_eq!(instructions[1].mnemonic, ".byte");
    }

    #[test]
    fn test_truncated_tail_becomes_bytes() {
        // CALL with a missing address byte
        let instructions = disassemble(&[0x1F, 0x00], DisassemblyOptions::default());
        assert_eq!(instructions.len(), 2);
        assert!(instructions.iter().all(|i| i.mnemonic == ".byte"));
    }
}

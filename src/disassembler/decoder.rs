//! Instruction decoder for the MEL disassembler

use crate::disassembler::Instruction;
use crate::opcodes::lookup;

/// Decode a single instruction from a byte slice
///
/// # Arguments
///
/// * `bytes` - The byte slice starting at the instruction to decode
/// * `address` - The code offset of this instruction
///
/// # Returns
///
/// Some(Instruction) if the opcode is populated and all its parameter bytes are
/// present, None otherwise
pub fn decode_instruction(bytes: &[u8], address: u16) -> Option<Instruction> {
    let &opcode = bytes.first()?;
    let metadata = lookup(opcode)?;

    if bytes.len() < metadata.size_bytes as usize {
        return None;
    }

    Some(Instruction {
        address,
        opcode,
        mnemonic: metadata.mnemonic,
        params: metadata.params(),
        operand_bytes: bytes[1..metadata.size_bytes as usize].to_vec(),
        size_bytes: metadata.size_bytes,
    })
}

/// A `.byte` pseudo-instruction for an undecodable byte
pub fn raw_byte(opcode: u8, address: u16) -> Instruction {
    Instruction {
        address,
        opcode,
        mnemonic: ".byte",
        params: &[],
        operand_bytes: Vec::new(),
        size_bytes: 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addressing::AddressSpace;
    use crate::opcodes::ParamKind;

    #[test]
    fn test_decode_load_static() {
        let bytes = &[0x39, 0x02, 0x00, 0x10];
        let instr = decode_instruction(bytes, 0x0020).unwrap();

        assert_eq!(instr.address, 0x0020);
        assert_eq!(instr.opcode, 0x39);
        assert_eq!(instr.mnemonic, "LOAD");
        assert_eq!(
            instr.params,
            &[ParamKind::ByteOperandLen, ParamKind::WordOffset(AddressSpace::Sb)]
        );
        assert_eq!(instr.operand_bytes, vec![0x02, 0x00, 0x10]);
        assert_eq!(instr.size_bytes, 4);
    }

    #[test]
    fn test_decode_exit() {
        let instr = decode_instruction(&[0x04, 0xFF], 0).unwrap();
        assert_eq!(instr.mnemonic, "EXIT");
        assert!(instr.operand_bytes.is_empty());
        assert_eq!(instr.size_bytes, 1);
    }

    #[test]
    fn test_decode_rejects_unknown_and_short() {
        assert!(decode_instruction(&[], 0).is_none());
        assert!(decode_instruction(&[0x30], 0).is_none());
        assert!(decode_instruction(&[0x22, 0x01], 0).is_none());
    }
}

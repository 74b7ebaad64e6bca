//! Formatting functions for disassembled instructions

use crate::addressing::AddressSpace;
use crate::disassembler::Instruction;
use crate::opcodes::ParamKind;

/// Format a single instruction as assembly text
///
/// # Arguments
///
/// * `instr` - The instruction to format
///
/// # Returns
///
/// A string containing the formatted assembly instruction
pub fn format_instruction(instr: &Instruction) -> String {
    if instr.mnemonic == ".byte" {
        return format!(".byte ${:02X}", instr.opcode);
    }

    let operands = format_operands(instr);
    if operands.is_empty() {
        instr.mnemonic.to_string()
    } else {
        format!("{} {}", instr.mnemonic, operands.join(", "))
    }
}

/// Format an instruction as a listing line: address, raw bytes, assembly text
pub fn format_line(instr: &Instruction) -> String {
    let mut bytes = vec![format!("{:02X}", instr.opcode)];
    bytes.extend(instr.operand_bytes.iter().map(|b| format!("{b:02X}")));
    format!(
        "{:04X}  {:<15} {}",
        instr.address,
        bytes.join(" "),
        format_instruction(instr)
    )
}

/// Format each parameter, consuming operand bytes in order
fn format_operands(instr: &Instruction) -> Vec<String> {
    let mut rest = instr.operand_bytes.as_slice();
    let mut out = Vec::with_capacity(instr.params.len());

    for &kind in instr.params {
        let size = kind.size() as usize;
        if rest.len() < size {
            out.push("??".to_string());
            break;
        }
        let (field, tail) = rest.split_at(size);
        rest = tail;
        let word = || u16::from_be_bytes([field[0], field[1]]);

        out.push(match kind {
            ParamKind::None => continue,
            ParamKind::TopOfStack => "TOS".to_string(),
            ParamKind::ByteImmediate => format!("#${:02X}", field[0]),
            ParamKind::ByteOperandLen => field[0].to_string(),
            ParamKind::ByteCodeRelative => {
                let next = instr.address.wrapping_add(instr.size_bytes as u16);
                let target = next.wrapping_add_signed(field[0] as i8 as i16);
                format!("${target:04X}")
            }
            ParamKind::WordImmediate => format!("#${:04X}", word()),
            ParamKind::WordCodeAddress => format!("${:04X}", word()),
            ParamKind::WordOffset(space) => format_address(space, word()),
        });
    }
    out
}

/// `SB[$0010]`; frame- and top-relative spaces show signed offsets (`PT[-$0002]`)
fn format_address(space: AddressSpace, offset: u16) -> String {
    let signed = matches!(
        space,
        AddressSpace::St | AddressSpace::Lb | AddressSpace::Dt | AddressSpace::Pt
    );
    let value = offset as i16;
    if signed && value < 0 {
        format!("{}[-${:04X}]", space.name(), value.unsigned_abs())
    } else {
        format!("{}[${:04X}]", space.name(), offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disassembler::decoder::{decode_instruction, raw_byte};

    fn text(bytes: &[u8]) -> String {
        format_instruction(&decode_instruction(bytes, 0x0010).unwrap())
    }

    #[test]
    fn test_format_block_tagged() {
        assert_eq!(text(&[0x39, 0x02, 0x00, 0x10]), "LOAD 2, SB[$0010]");
    }

    #[test]
    fn test_format_top_relative() {
        assert_eq!(text(&[0x47, 0x02, 0xFF, 0xFE]), "STORE 2, PT[-$0002]");
        assert_eq!(text(&[0x3C, 0x01, 0xFF, 0xFB]), "LOAD 1, LB[-$0005]");
    }

    #[test]
    fn test_format_tos_variant() {
        assert_eq!(text(&[0x68, 0x01, 0x10]), "SETB TOS, #$10");
        assert_eq!(text(&[0x38, 0x04]), "LOAD TOS, 4");
    }

    #[test]
    fn test_format_branch_target() {
        // BNE -4 at 0x0010: next = 0x0012, target = 0x000E
        assert_eq!(text(&[0x0E, 0xFC]), "BNE $000E");
    }

    #[test]
    fn test_format_system() {
        assert_eq!(text(&[0x07, 0x90, 0x00, 0x00, 0x02]), "EXITSWLA #$9000, #$0002");
        assert_eq!(text(&[0x00]), "NOP");
        assert_eq!(text(&[0x2F, 0x02, 0x01]), "RETIO 2, 1");
    }

    #[test]
    fn test_format_illegal_opcode() {
        assert_eq!(format_instruction(&raw_byte(0xFF, 0x2000)), ".byte $FF");
    }

    #[test]
    fn test_format_line() {
        let instr = decode_instruction(&[0x1F, 0x01, 0x00], 0x0003).unwrap();
        assert_eq!(format_line(&instr), "0003  1F 01 00        CALL $0100");
    }
}

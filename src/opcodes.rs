//! # Opcode Metadata Table
//!
//! This module contains the 256-entry MEL decode table, the single source of
//! truth for instruction mnemonics, parameter shapes and encoded lengths.
//!
//! An opcode byte is `(class << 3) | tag`: the five-bit [`InstructionClass`]
//! selects the instruction family and the three-bit tag selects an address
//! space, a branch condition or a sub-operation depending on the family.
//!
//! The table covers:
//! - **Explicit families** - SYSTEM, BRANCH, JUMP, CALL, STACK and PRIMRET,
//!   enumerated per tag
//! - **Templated families** - data movement and arithmetic, generated once per
//!   address space (SB, ST, DB, LB, DT, PB, PT) plus a TOS variant
//! - **Unpopulated bytes** - `None`, decoded as an unknown instruction
//!
//! The table is computed by a `const fn` at compile time and is immutable.

use crate::addressing::AddressSpace;

/// Instruction family (high five bits of an opcode).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum InstructionClass {
    System = 0,
    Branch = 1,
    Jump = 2,
    Call = 3,
    Stack = 4,
    PrimRet = 5,
    /// Reserved class, never populated.
    Invalid = 6,
    Load = 7,
    Store = 8,
    LoadI = 9,
    StoreI = 10,
    LoadA = 11,
    Index = 12,
    SetB = 13,
    CmpB = 14,
    AddB = 15,
    SubB = 16,
    SetW = 17,
    CmpW = 18,
    AddW = 19,
    SubW = 20,
    ClearN = 21,
    TestN = 22,
    IncN = 23,
    DecN = 24,
    NotN = 25,
    CmpN = 26,
    AddN = 27,
    SubN = 28,
    AndN = 29,
    OrN = 30,
    XorN = 31,
}

impl InstructionClass {
    /// Decodes the high five bits of an opcode.
    pub const fn from_opcode(opcode: u8) -> InstructionClass {
        use InstructionClass::*;
        match opcode >> 3 {
            0 => System,
            1 => Branch,
            2 => Jump,
            3 => Call,
            4 => Stack,
            5 => PrimRet,
            6 => Invalid,
            7 => Load,
            8 => Store,
            9 => LoadI,
            10 => StoreI,
            11 => LoadA,
            12 => Index,
            13 => SetB,
            14 => CmpB,
            15 => AddB,
            16 => SubB,
            17 => SetW,
            18 => CmpW,
            19 => AddW,
            20 => SubW,
            21 => ClearN,
            22 => TestN,
            23 => IncN,
            24 => DecN,
            25 => NotN,
            26 => CmpN,
            27 => AddN,
            28 => SubN,
            29 => AndN,
            30 => OrN,
            _ => XorN,
        }
    }

    /// Mnemonic shared by every tag of a templated family.
    ///
    /// Explicit families return their family name.
    pub const fn family_name(self) -> &'static str {
        use InstructionClass::*;
        match self {
            System => "SYSTEM",
            Branch => "BRANCH",
            Jump => "JUMP",
            Call => "CALL",
            Stack => "STACK",
            PrimRet => "PRIMRET",
            Invalid => "???",
            Load => "LOAD",
            Store => "STORE",
            LoadI => "LOADI",
            StoreI => "STOREI",
            LoadA => "LOADA",
            Index => "INDEX",
            SetB => "SETB",
            CmpB => "CMPB",
            AddB => "ADDB",
            SubB => "SUBB",
            SetW => "SETW",
            CmpW => "CMPW",
            AddW => "ADDW",
            SubW => "SUBW",
            ClearN => "CLEARN",
            TestN => "TESTN",
            IncN => "INCN",
            DecN => "DECN",
            NotN => "NOTN",
            CmpN => "CMPN",
            AddN => "ADDN",
            SubN => "SUBN",
            AndN => "ANDN",
            OrN => "ORN",
            XorN => "XORN",
        }
    }
}

/// Kind of one encoded instruction parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamKind {
    /// Unused slot.
    None,
    /// Operand is the top of the dynamic stack (not encoded).
    TopOfStack,
    /// One-byte literal.
    ByteImmediate,
    /// One-byte operand length (N of an N-byte operation).
    ByteOperandLen,
    /// One-byte signed offset from the next instruction.
    ByteCodeRelative,
    /// Two-byte literal.
    WordImmediate,
    /// Two-byte offset into an address space.
    WordOffset(AddressSpace),
    /// Two-byte absolute code address.
    WordCodeAddress,
}

impl ParamKind {
    /// Number of encoded bytes.
    pub const fn size(self) -> u8 {
        match self {
            ParamKind::None | ParamKind::TopOfStack => 0,
            ParamKind::ByteImmediate | ParamKind::ByteOperandLen | ParamKind::ByteCodeRelative => 1,
            ParamKind::WordImmediate | ParamKind::WordOffset(_) | ParamKind::WordCodeAddress => 2,
        }
    }
}

/// Metadata for a single MEL opcode.
///
/// # Examples
///
/// ```
/// use melcard::opcodes::{lookup, InstructionClass, ParamKind};
/// use melcard::AddressSpace;
///
/// // LOAD n, SB[offset]
/// let load_sb = lookup(0x39).unwrap();
/// assert_eq!(load_sb.class, InstructionClass::Load);
/// assert_eq!(load_sb.mnemonic, "LOAD");
/// assert_eq!(
///     load_sb.params(),
///     &[ParamKind::ByteOperandLen, ParamKind::WordOffset(AddressSpace::Sb)]
/// );
/// assert_eq!(load_sb.size_bytes, 4);
///
/// // Class 6 is never populated
/// assert!(lookup(0x30).is_none());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpcodeMetadata {
    /// Opcode byte.
    pub opcode: u8,

    /// Instruction family.
    pub class: InstructionClass,

    /// Low three bits of the opcode.
    pub tag: u8,

    /// Instruction mnemonic.
    pub mnemonic: &'static str,

    params: [ParamKind; 4],
    param_count: u8,

    /// Total encoded size: opcode plus parameters.
    pub size_bytes: u8,
}

impl OpcodeMetadata {
    /// Ordered parameter kinds.
    pub fn params(&self) -> &[ParamKind] {
        &self.params[..self.param_count as usize]
    }

    /// Address space selected by the tag (meaningful for templated families).
    pub const fn address_space(&self) -> AddressSpace {
        AddressSpace::from_tag(self.tag)
    }
}

const fn entry(
    class: InstructionClass,
    tag: u8,
    mnemonic: &'static str,
    params: &[ParamKind],
) -> OpcodeMetadata {
    let mut kinds = [ParamKind::None; 4];
    let mut size = 1u8;
    let mut i = 0;
    while i < params.len() {
        kinds[i] = params[i];
        size += params[i].size();
        i += 1;
    }
    OpcodeMetadata {
        opcode: ((class as u8) << 3) | tag,
        class,
        tag,
        mnemonic,
        params: kinds,
        param_count: params.len() as u8,
        size_bytes: size,
    }
}

const fn insert(
    mut table: [Option<OpcodeMetadata>; 256],
    metadata: OpcodeMetadata,
) -> [Option<OpcodeMetadata>; 256] {
    table[metadata.opcode as usize] = Some(metadata);
    table
}

/// Operand shape shared by the tags of a templated family.
#[derive(Clone, Copy)]
enum Shape {
    /// `n` + offset, TOS takes `n` only.
    Block,
    /// Offset only, no TOS variant.
    Address,
    /// Element size + offset, no TOS variant.
    Indexed,
    /// Offset + byte literal, TOS takes the literal only.
    Byte,
    /// Offset + word literal, TOS takes the literal only.
    Word,
}

const fn shape(class: InstructionClass) -> Shape {
    use InstructionClass::*;
    match class {
        LoadA => Shape::Address,
        Index => Shape::Indexed,
        SetB | CmpB | AddB | SubB => Shape::Byte,
        SetW | CmpW | AddW | SubW => Shape::Word,
        _ => Shape::Block,
    }
}

const fn templated(
    mut table: [Option<OpcodeMetadata>; 256],
    class: InstructionClass,
) -> [Option<OpcodeMetadata>; 256] {
    use ParamKind::*;
    let name = class.family_name();
    let shape = shape(class);

    match shape {
        Shape::Block => {
            table = insert(table, entry(class, 0, name, &[TopOfStack, ByteOperandLen]));
        }
        Shape::Byte => {
            table = insert(table, entry(class, 0, name, &[TopOfStack, ByteImmediate]));
        }
        Shape::Word => {
            table = insert(table, entry(class, 0, name, &[TopOfStack, WordImmediate]));
        }
        Shape::Address | Shape::Indexed => {}
    }

    let mut i = 0;
    while i < AddressSpace::TAGGED.len() {
        let space = AddressSpace::TAGGED[i];
        let tag = space.tag();
        let metadata = match shape {
            Shape::Block => entry(class, tag, name, &[ByteOperandLen, WordOffset(space)]),
            Shape::Address => entry(class, tag, name, &[WordOffset(space)]),
            Shape::Indexed => entry(class, tag, name, &[ByteImmediate, WordOffset(space)]),
            Shape::Byte => entry(class, tag, name, &[WordOffset(space), ByteImmediate]),
            Shape::Word => entry(class, tag, name, &[WordOffset(space), WordImmediate]),
        };
        table = insert(table, metadata);
        i += 1;
    }
    table
}

const fn build_opcode_table() -> [Option<OpcodeMetadata>; 256] {
    use InstructionClass::*;
    use ParamKind::*;

    let mut table: [Option<OpcodeMetadata>; 256] = [Option::None; 256];

    // SYSTEM
    table = insert(table, entry(System, 0, "NOP", &[]));
    table = insert(table, entry(System, 1, "SETSW", &[WordImmediate]));
    table = insert(table, entry(System, 2, "SETLA", &[WordImmediate]));
    table = insert(table, entry(System, 3, "SETSWLA", &[WordImmediate, WordImmediate]));
    table = insert(table, entry(System, 4, "EXIT", &[]));
    table = insert(table, entry(System, 5, "EXITSW", &[WordImmediate]));
    table = insert(table, entry(System, 6, "EXITLA", &[WordImmediate]));
    table = insert(table, entry(System, 7, "EXITSWLA", &[WordImmediate, WordImmediate]));

    // BRANCH / JUMP / CALL, condition tags 1-7
    let branches = ["BEQ", "BLT", "BLE", "BGT", "BGE", "BNE", "BA"];
    let jumps = ["JEQ", "JLT", "JLE", "JGT", "JGE", "JNE", "JMP"];
    let calls = ["CEQ", "CLT", "CLE", "CGT", "CGE", "CNE", "CALL"];
    let mut i = 0;
    while i < 7 {
        let tag = i as u8 + 1;
        table = insert(table, entry(Branch, tag, branches[i], &[ByteCodeRelative]));
        table = insert(table, entry(Jump, tag, jumps[i], &[WordCodeAddress]));
        table = insert(table, entry(Call, tag, calls[i], &[WordCodeAddress]));
        i += 1;
    }

    // STACK
    table = insert(table, entry(Stack, 0, "PUSHZ", &[ByteOperandLen]));
    table = insert(table, entry(Stack, 1, "PUSHB", &[ByteImmediate]));
    table = insert(table, entry(Stack, 2, "PUSHW", &[WordImmediate]));
    table = insert(table, entry(Stack, 4, "POPN", &[ByteOperandLen]));
    table = insert(table, entry(Stack, 5, "POPB", &[]));
    table = insert(table, entry(Stack, 6, "POPW", &[]));

    // PRIMRET
    table = insert(table, entry(PrimRet, 0, "PRIM0", &[ByteImmediate]));
    table = insert(table, entry(PrimRet, 1, "PRIM1", &[ByteImmediate, ByteImmediate]));
    table = insert(
        table,
        entry(PrimRet, 2, "PRIM2", &[ByteImmediate, ByteImmediate, ByteImmediate]),
    );
    table = insert(
        table,
        entry(
            PrimRet,
            3,
            "PRIM3",
            &[ByteImmediate, ByteImmediate, ByteImmediate, ByteImmediate],
        ),
    );
    table = insert(table, entry(PrimRet, 4, "RET", &[]));
    table = insert(table, entry(PrimRet, 5, "RETI", &[ByteOperandLen]));
    table = insert(table, entry(PrimRet, 6, "RETO", &[ByteOperandLen]));
    table = insert(table, entry(PrimRet, 7, "RETIO", &[ByteOperandLen, ByteOperandLen]));

    // Templated data movement and arithmetic families
    let mut class = Load as u8;
    while class <= XorN as u8 {
        table = templated(table, InstructionClass::from_opcode(class << 3));
        class += 1;
    }

    table
}

/// Complete 256-entry decode table indexed by opcode byte.
///
/// `None` marks an unpopulated opcode.
pub static OPCODE_TABLE: [Option<OpcodeMetadata>; 256] = build_opcode_table();

/// Looks up the metadata of an opcode byte.
pub fn lookup(opcode: u8) -> Option<&'static OpcodeMetadata> {
    OPCODE_TABLE[opcode as usize].as_ref()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_opcode_matches_index() {
        for (index, metadata) in OPCODE_TABLE.iter().enumerate() {
            if let Some(m) = metadata {
                assert_eq!(m.opcode as usize, index);
                assert_eq!(InstructionClass::from_opcode(m.opcode), m.class);
                assert_eq!(m.opcode & 0x07, m.tag);
            }
        }
    }

    #[test]
    fn test_population_count() {
        let populated = OPCODE_TABLE.iter().filter(|m| m.is_some()).count();
        assert_eq!(populated, 241);
    }

    #[test]
    fn test_explicit_entries() {
        let exit = lookup(0x04).unwrap();
        assert_eq!(exit.mnemonic, "EXIT");
        assert_eq!(exit.size_bytes, 1);

        let call = lookup(0x1F).unwrap();
        assert_eq!(call.mnemonic, "CALL");
        assert_eq!(call.size_bytes, 3);

        let retio = lookup(0x2F).unwrap();
        assert_eq!(retio.mnemonic, "RETIO");
        assert_eq!(retio.size_bytes, 3);

        assert!(lookup(0x08).is_none()); // BRANCH tag 0
        assert!(lookup(0x23).is_none()); // STACK tag 3
        assert!(lookup(0x58).is_none()); // LOADA has no TOS variant
    }

    #[test]
    fn test_tos_variants() {
        let setb_tos = lookup(InstructionClass::SetB as u8 * 8).unwrap();
        assert_eq!(setb_tos.params(), &[ParamKind::TopOfStack, ParamKind::ByteImmediate]);
        assert_eq!(setb_tos.size_bytes, 2);

        let addw_dt = lookup(InstructionClass::AddW as u8 * 8 + 5).unwrap();
        assert_eq!(
            addw_dt.params(),
            &[ParamKind::WordOffset(AddressSpace::Dt), ParamKind::WordImmediate]
        );
        assert_eq!(addw_dt.size_bytes, 5);
    }
}

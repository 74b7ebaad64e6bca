//! # Condition Codes
//!
//! The MEL condition code register holds two flags, Zero (Z) and Carry (C).
//! Comparisons and arithmetic set them; BRANCH, JUMP and CALL test them through
//! the three-bit condition tag of their opcode.

/// Condition code register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Ccr {
    /// Zero flag
    pub z: bool,
    /// Carry flag
    pub c: bool,
}

impl Ccr {
    /// Builds a register from explicit flag values.
    pub const fn new(z: bool, c: bool) -> Self {
        Self { z, c }
    }

    /// Packs the register as `0b0000_00ZC`.
    pub const fn bits(self) -> u8 {
        ((self.z as u8) << 1) | self.c as u8
    }
}

/// Branch condition (low three bits of a BRANCH/JUMP/CALL opcode).
///
/// Tag 0 is reserved and never populated in the decode table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Condition {
    /// Reserved.
    Special = 0,
    /// Z
    Eq = 1,
    /// !C
    Lt = 2,
    /// Z | !C
    Le = 3,
    /// C
    Gt = 4,
    /// Z | C
    Ge = 5,
    /// !Z
    Ne = 6,
    /// Always.
    All = 7,
}

impl Condition {
    /// Decodes the low three bits of an opcode.
    pub const fn from_tag(tag: u8) -> Condition {
        match tag & 0x07 {
            0 => Condition::Special,
            1 => Condition::Eq,
            2 => Condition::Lt,
            3 => Condition::Le,
            4 => Condition::Gt,
            5 => Condition::Ge,
            6 => Condition::Ne,
            _ => Condition::All,
        }
    }

    /// Evaluates the condition against a condition code register.
    ///
    /// # Examples
    ///
    /// ```
    /// use melcard::condition::{Ccr, Condition};
    ///
    /// let equal = Ccr::new(true, false);
    /// assert!(Condition::Eq.holds(equal));
    /// assert!(!Condition::Ne.holds(equal));
    /// assert!(Condition::All.holds(Ccr::default()));
    /// ```
    pub const fn holds(self, ccr: Ccr) -> bool {
        match self {
            Condition::Special => false,
            Condition::Eq => ccr.z,
            Condition::Lt => !ccr.c,
            Condition::Le => ccr.z || !ccr.c,
            Condition::Gt => ccr.c,
            Condition::Ge => ccr.z || ccr.c,
            Condition::Ne => !ccr.z,
            Condition::All => true,
        }
    }
}

//! # Execution Engine
//!
//! This module contains the [`Machine`], the MEL abstract machine, and the
//! fetch-decode-execute loop.
//!
//! ## Machine State
//!
//! The machine maintains:
//! - **Memory**: a [`MemoryManager`] and the four area accessors (code, static,
//!   dynamic, public)
//! - **Registers**: an [`ExecutionState`] value holding the instruction pointer,
//!   frame base, dynamic top, condition codes and run status
//!
//! ## Execution Model
//!
//! - [`Machine::step`]: execute one instruction
//! - [`Machine::run`]: execute until halt, fault or step budget exhaustion
//!
//! A step computes the next [`ExecutionState`] from the current one and commits
//! it only on success. A faulting step leaves every register, including the
//! instruction pointer, unchanged and reports a typed [`Fault`].

use crate::addressing::{from_linear, resolve, AddressSpace, Area, AreaLayout};
use crate::condition::Ccr;
use crate::disassembler::{decoder, formatter};
use crate::instructions;
use crate::memory::{Accessor, MemoryError, MemoryManager};
use crate::opcodes::{lookup, OpcodeMetadata};
use thiserror::Error;
use tracing::{debug, instrument, trace};

/// Run status of the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionStatus {
    /// No application has been set up.
    #[default]
    Idle,
    /// Instructions are being executed.
    Executing,
    /// An EXIT instruction ended the run.
    Halted,
}

/// Machine registers.
///
/// A plain value: snapshot it with [`Machine::state`], restore it with
/// [`Machine::set_state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExecutionState {
    /// Code offset of the next instruction.
    pub ip: u16,
    /// Dynamic-area offset of the current frame.
    pub frame_base: u16,
    /// Dynamic-area offset one past the top of the stack.
    pub dynamic_top: u16,
    /// Condition code register.
    pub ccr: Ccr,
    /// Run status.
    pub status: ExecutionStatus,
}

/// Why a step could not complete.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Fault {
    /// The opcode byte has no decode table entry.
    #[error("unknown instruction 0x{opcode:02X} at 0x{ip:04X}")]
    UnknownInstruction {
        /// Opcode fetched
        opcode: u8,
        /// Where it was fetched
        ip: u16,
    },

    /// A tagged address fell outside its area.
    #[error("cannot resolve {space:?}[0x{offset:04X}] for {len} bytes")]
    AddressResolution {
        /// Address space tag
        space: AddressSpace,
        /// Encoded offset
        offset: u16,
        /// Access length
        len: usize,
    },

    /// A linear pointer does not address `len` bytes of an area.
    #[error("invalid linear address 0x{addr:04X} for {len} bytes")]
    InvalidLinearAddress {
        /// Linear address
        addr: u16,
        /// Access length
        len: usize,
    },

    /// More bytes were popped than the stack holds.
    #[error("stack underflow: {needed} bytes needed, dynamic top is 0x{top:04X}")]
    StackUnderflow {
        /// Bytes requested
        needed: usize,
        /// Dynamic top at the time
        top: u16,
    },

    /// An accessor rejected the operation.
    #[error(transparent)]
    Memory(#[from] MemoryError),

    /// `step` was called with no application set up.
    #[error("no application is executing")]
    NotExecuting,
}

/// Result of one [`Machine::step`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// The instruction completed and the machine is still executing.
    Continue,
    /// The machine has halted with the given status word.
    Halted {
        /// Status word currently in the public area
        sw: u16,
    },
    /// The instruction could not complete; no register changed.
    Fault(Fault),
}

/// A fetched instruction with its operand values.
#[derive(Debug, Clone, Copy)]
pub struct DecodedInstruction {
    /// Where the instruction starts.
    pub ip: u16,
    /// Decode table entry.
    pub metadata: &'static OpcodeMetadata,
    /// Operand values in parameter order (bytes zero-extended).
    pub operands: [u16; 4],
    /// Offset of the following instruction.
    pub next_ip: u16,
}

impl DecodedInstruction {
    /// Operand `index` as a byte.
    pub fn byte(&self, index: usize) -> u8 {
        self.operands[index] as u8
    }

    /// Operand `index` as a word.
    pub fn word(&self, index: usize) -> u16 {
        self.operands[index]
    }
}

/// The MEL abstract machine.
///
/// # Examples
///
/// ```
/// use melcard::{Applet, Machine, StepOutcome};
/// use melcard::memory::{MemoryManager, SegmentKind};
///
/// let mut memory = MemoryManager::with_sizes(0x100, 0x200, 0x100);
/// // EXITSW 0x6A80
/// memory.segment_mut(SegmentKind::Rom).load(0, &[0x05, 0x6A, 0x80]).unwrap();
///
/// let code = memory.accessor("code", SegmentKind::Rom, 0, 3).unwrap();
/// let static_data = memory.accessor("S", SegmentKind::Nvram, 0, 0x10).unwrap();
/// let dynamic = memory.accessor("D", SegmentKind::Ram, 0, 0x100).unwrap();
/// let public = memory.accessor("P", SegmentKind::Ram, 0x100, 0x100).unwrap();
///
/// let mut machine = Machine::new(memory, dynamic, public);
/// machine
///     .setup_application(&Applet::new(code, static_data, 0))
///     .unwrap();
///
/// assert_eq!(machine.step(), StepOutcome::Halted { sw: 0x6A80 });
/// ```
#[derive(Debug, Clone)]
pub struct Machine {
    pub(crate) memory: MemoryManager,
    pub(crate) code: Option<Accessor>,
    pub(crate) static_area: Option<Accessor>,
    pub(crate) dynamic: Accessor,
    pub(crate) public: Accessor,
    pub(crate) session_size: u16,
    pub(crate) state: ExecutionState,
}

impl Machine {
    /// Creates an idle machine over the given memory.
    ///
    /// `dynamic` and `public` are the RAM windows shared by every application.
    pub fn new(memory: MemoryManager, dynamic: Accessor, public: Accessor) -> Self {
        Self {
            memory,
            code: None,
            static_area: None,
            dynamic,
            public,
            session_size: 0,
            state: ExecutionState::default(),
        }
    }

    /// Resets the registers for a fresh run of the bound application.
    ///
    /// IP = 0, frame base = dynamic top = session size, CCR cleared.
    pub fn init_execution(&mut self) {
        self.state = ExecutionState {
            ip: 0,
            frame_base: self.session_size,
            dynamic_top: self.session_size,
            ccr: Ccr::default(),
            status: if self.code.is_some() {
                ExecutionStatus::Executing
            } else {
                ExecutionStatus::Idle
            },
        };
    }

    /// Executes one instruction.
    ///
    /// Performs the fetch-decode-execute cycle:
    /// 1. Fetch the opcode at IP through the code accessor
    /// 2. Look it up in the decode table
    /// 3. Read its parameters (words are big-endian)
    /// 4. Execute it against a copy of the registers
    /// 5. Commit the new registers if nothing faulted
    ///
    /// Stepping a halted machine reports `Halted` again without executing.
    #[instrument(level = "trace", skip(self), fields(ip = self.state.ip))]
    pub fn step(&mut self) -> StepOutcome {
        match self.state.status {
            ExecutionStatus::Idle => return StepOutcome::Fault(Fault::NotExecuting),
            ExecutionStatus::Halted => return self.halted_outcome(),
            ExecutionStatus::Executing => {}
        }

        match self.execute(self.state) {
            Ok(next) => {
                self.state = next;
                if next.status == ExecutionStatus::Halted {
                    self.halted_outcome()
                } else {
                    StepOutcome::Continue
                }
            }
            Err(fault) => {
                debug!(ip = self.state.ip, %fault, "step faulted");
                StepOutcome::Fault(fault)
            }
        }
    }

    /// Steps until the machine halts, faults, or `step_budget` steps have run.
    ///
    /// Returns the last outcome; `Continue` means the budget ran out.
    pub fn run(&mut self, step_budget: u64) -> StepOutcome {
        let mut outcome = StepOutcome::Continue;
        for _ in 0..step_budget {
            outcome = self.step();
            if outcome != StepOutcome::Continue {
                break;
            }
        }
        outcome
    }

    fn halted_outcome(&self) -> StepOutcome {
        match self.status_word() {
            Ok(sw) => StepOutcome::Halted { sw },
            Err(fault) => StepOutcome::Fault(fault),
        }
    }

    /// Computes the registers after the instruction at `state.ip`.
    fn execute(&mut self, state: ExecutionState) -> Result<ExecutionState, Fault> {
        let instr = self.fetch(state.ip)?;
        trace!(
            ip = instr.ip,
            mnemonic = instr.metadata.mnemonic,
            operands = ?&instr.operands[..instr.metadata.params().len()],
            "execute"
        );

        let mut next = state;
        next.ip = instr.next_ip;
        instructions::execute(self, &instr, &mut next)?;
        Ok(next)
    }

    /// Fetches and decodes the instruction at `ip`.
    pub(crate) fn fetch(&mut self, ip: u16) -> Result<DecodedInstruction, Fault> {
        let code = self.code.clone().ok_or(Fault::NotExecuting)?;
        let opcode = self.memory.read_byte(&code, ip)?;
        let metadata = lookup(opcode).ok_or(Fault::UnknownInstruction { opcode, ip })?;

        let mut operands = [0u16; 4];
        let mut at = ip.wrapping_add(1);
        for (slot, kind) in operands.iter_mut().zip(metadata.params()) {
            *slot = match kind.size() {
                1 => self.memory.read_byte(&code, at)? as u16,
                2 => self.memory.read_word(&code, at)?,
                _ => 0,
            };
            at = at.wrapping_add(kind.size() as u16);
        }

        Ok(DecodedInstruction {
            ip,
            metadata,
            operands,
            next_ip: ip.wrapping_add(metadata.size_bytes as u16),
        })
    }

    // ========== Area Access ==========

    /// Register and window values for address resolution under `state`.
    pub fn layout(&self, state: &ExecutionState) -> AreaLayout {
        AreaLayout {
            frame_base: state.frame_base,
            dynamic_top: state.dynamic_top,
            static_len: self.static_area.as_ref().map_or(0, Accessor::len),
            dynamic_len: self.dynamic.len(),
            public_len: self.public.len(),
        }
    }

    pub(crate) fn area_accessor(&self, area: Area) -> Result<Accessor, Fault> {
        match area {
            Area::Static => self.static_area.clone().ok_or(Fault::NotExecuting),
            Area::Dynamic => Ok(self.dynamic.clone()),
            Area::Public => Ok(self.public.clone()),
        }
    }

    /// Resolves a tagged operand to an accessor and local offset.
    pub(crate) fn resolve_operand(
        &self,
        state: &ExecutionState,
        space: AddressSpace,
        offset: u16,
        len: usize,
    ) -> Result<(Accessor, u16), Fault> {
        let (area, area_offset) = resolve(space, offset, len, &self.layout(state))
            .ok_or(Fault::AddressResolution { space, offset, len })?;
        Ok((self.area_accessor(area)?, area_offset))
    }

    /// Resolves a linear pointer to an accessor and local offset.
    pub(crate) fn resolve_linear(&self, addr: u16, len: usize) -> Result<(Accessor, u16), Fault> {
        let (area, offset) = from_linear(addr);
        let acc = self.area_accessor(area)?;
        if offset as usize + len > acc.len() {
            return Err(Fault::InvalidLinearAddress { addr, len });
        }
        Ok((acc, offset))
    }

    // ========== Stack ==========

    /// Offset of the `len` bytes on top of the stack.
    pub(crate) fn stack_top(&self, state: &ExecutionState, len: usize) -> Result<u16, Fault> {
        let top = state.dynamic_top as usize;
        if len > top {
            return Err(Fault::StackUnderflow {
                needed: len,
                top: state.dynamic_top,
            });
        }
        Ok((top - len) as u16)
    }

    pub(crate) fn push(&mut self, state: &mut ExecutionState, bytes: &[u8]) -> Result<(), Fault> {
        let dynamic = self.dynamic.clone();
        let top = self.grown_top(state, bytes.len())?;
        self.memory.write_bytes(&dynamic, state.dynamic_top, bytes)?;
        state.dynamic_top = top;
        Ok(())
    }

    pub(crate) fn push_zeros(&mut self, state: &mut ExecutionState, len: usize) -> Result<(), Fault> {
        let dynamic = self.dynamic.clone();
        let top = self.grown_top(state, len)?;
        self.memory.zero_bytes(&dynamic, state.dynamic_top, len)?;
        state.dynamic_top = top;
        Ok(())
    }

    /// Dynamic top after pushing `len` bytes; the stack never passes 0xFFFF.
    fn grown_top(&self, state: &ExecutionState, len: usize) -> Result<u16, Fault> {
        u16::try_from(len)
            .ok()
            .and_then(|len| state.dynamic_top.checked_add(len))
            .ok_or_else(|| {
                Fault::Memory(MemoryError::AccessViolation {
                    id: self.dynamic.id(),
                    offset: state.dynamic_top,
                    len,
                    window: self.dynamic.len(),
                })
            })
    }

    pub(crate) fn push_word(&mut self, state: &mut ExecutionState, value: u16) -> Result<(), Fault> {
        self.push(state, &value.to_be_bytes())
    }

    pub(crate) fn pop(&mut self, state: &mut ExecutionState, len: usize) -> Result<Vec<u8>, Fault> {
        let at = self.stack_top(state, len)?;
        let dynamic = self.dynamic.clone();
        let bytes = self.memory.read_bytes(&dynamic, at, len)?;
        state.dynamic_top = at;
        Ok(bytes)
    }

    pub(crate) fn pop_word(&mut self, state: &mut ExecutionState) -> Result<u16, Fault> {
        let bytes = self.pop(state, 2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    /// Drops `len` bytes without reading them.
    pub(crate) fn discard(&mut self, state: &mut ExecutionState, len: usize) -> Result<(), Fault> {
        state.dynamic_top = self.stack_top(state, len)?;
        Ok(())
    }

    // ========== Public Area ABI ==========

    /// Local public-area offset `back` bytes below the top of the window.
    pub(crate) fn public_top(&self, back: u16) -> u16 {
        (self.public.len() as u16).wrapping_sub(back)
    }

    /// Status word currently in the public area (read without tracing).
    pub fn status_word(&self) -> Result<u16, Fault> {
        let bytes = self.memory.peek(&self.public, self.public_top(2), 2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    // ========== Debugging ==========

    /// Disassembles the instruction at `ip` of the bound code.
    ///
    /// Returns one line such as `0003  39 02 00 10   LOAD 2, SB[$0010]`.
    /// Unknown opcodes render as `.byte`.
    pub fn disassemble_at(&self, ip: u16) -> Result<String, Fault> {
        let code = self.code.as_ref().ok_or(Fault::NotExecuting)?;
        let available = code.len().saturating_sub(ip as usize).clamp(1, 5);
        let bytes = self.memory.peek(code, ip, available)?;
        let instr = decoder::decode_instruction(bytes, ip)
            .unwrap_or_else(|| decoder::raw_byte(bytes.first().copied().unwrap_or(0), ip));
        Ok(formatter::format_line(&instr))
    }

    // ========== Accessors ==========

    /// Snapshot of the registers.
    pub fn state(&self) -> ExecutionState {
        self.state
    }

    /// Replaces the registers.
    pub fn set_state(&mut self, state: ExecutionState) {
        self.state = state;
    }

    /// Instruction pointer.
    pub fn ip(&self) -> u16 {
        self.state.ip
    }

    /// Frame base.
    pub fn frame_base(&self) -> u16 {
        self.state.frame_base
    }

    /// Dynamic top.
    pub fn dynamic_top(&self) -> u16 {
        self.state.dynamic_top
    }

    /// Condition code register.
    pub fn ccr(&self) -> Ccr {
        self.state.ccr
    }

    /// Run status.
    pub fn status(&self) -> ExecutionStatus {
        self.state.status
    }

    /// Session size of the bound application.
    pub fn session_size(&self) -> u16 {
        self.session_size
    }

    /// The memory manager.
    pub fn memory(&self) -> &MemoryManager {
        &self.memory
    }

    /// The memory manager, mutably.
    pub fn memory_mut(&mut self) -> &mut MemoryManager {
        &mut self.memory
    }

    /// Code accessor of the bound application.
    pub fn code_accessor(&self) -> Option<&Accessor> {
        self.code.as_ref()
    }

    /// Static accessor of the bound application.
    pub fn static_accessor(&self) -> Option<&Accessor> {
        self.static_area.as_ref()
    }

    /// Dynamic (stack) accessor.
    pub fn dynamic_accessor(&self) -> &Accessor {
        &self.dynamic
    }

    /// Public accessor.
    pub fn public_accessor(&self) -> &Accessor {
        &self.public
    }

    /// Reads stack bytes without tracing (for inspection and tests).
    pub fn peek_dynamic(&self, offset: u16, len: usize) -> Result<Vec<u8>, Fault> {
        Ok(self.memory.peek(&self.dynamic, offset, len)?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::SegmentKind;
    use crate::Applet;

    fn machine_with_code(code: &[u8]) -> Machine {
        let mut memory = MemoryManager::with_sizes(0x100, 0x200, 0x100);
        memory.segment_mut(SegmentKind::Rom).load(0, code).unwrap();
        let code_acc = memory.accessor("code", SegmentKind::Rom, 0, code.len()).unwrap();
        let static_acc = memory.accessor("S", SegmentKind::Nvram, 0, 0x40).unwrap();
        let dynamic = memory.accessor("D", SegmentKind::Ram, 0, 0x100).unwrap();
        let public = memory.accessor("P", SegmentKind::Ram, 0x100, 0x100).unwrap();
        let mut machine = Machine::new(memory, dynamic, public);
        machine
            .setup_application(&Applet::new(code_acc, static_acc, 0x10))
            .unwrap();
        machine
    }

    #[test]
    fn test_init_execution() {
        let machine = machine_with_code(&[0x00]);
        let state = machine.state();
        assert_eq!(state.ip, 0);
        assert_eq!(state.frame_base, 0x10);
        assert_eq!(state.dynamic_top, 0x10);
        assert_eq!(state.ccr, Ccr::default());
        assert_eq!(state.status, ExecutionStatus::Executing);
    }

    #[test]
    fn test_step_idle_machine() {
        let memory = MemoryManager::with_sizes(0x10, 0x40, 0x10);
        let dynamic = memory.accessor("D", SegmentKind::Ram, 0, 0x20).unwrap();
        let public = memory.accessor("P", SegmentKind::Ram, 0x20, 0x20).unwrap();
        let mut machine = Machine::new(memory, dynamic, public);
        assert_eq!(machine.step(), StepOutcome::Fault(Fault::NotExecuting));
    }

    #[test]
    fn test_unknown_opcode_does_not_advance() {
        let mut machine = machine_with_code(&[0x30]);
        let before = machine.state();
        assert_eq!(
            machine.step(),
            StepOutcome::Fault(Fault::UnknownInstruction {
                opcode: 0x30,
                ip: 0
            })
        );
        assert_eq!(machine.state(), before);
    }

    #[test]
    fn test_truncated_operand_faults() {
        // PUSHW with one operand byte missing
        let mut machine = machine_with_code(&[0x22, 0x12]);
        assert!(matches!(
            machine.step(),
            StepOutcome::Fault(Fault::Memory(MemoryError::AccessViolation { .. }))
        ));
        assert_eq!(machine.ip(), 0);
    }

    #[test]
    fn test_push_past_u16_range_faults() {
        let mut machine = machine_with_code(&[0x00]);
        let mut state = machine.state();
        state.dynamic_top = 0xFFFF;

        assert!(matches!(
            machine.push(&mut state, &[0x01, 0x02]),
            Err(Fault::Memory(MemoryError::AccessViolation {
                offset: 0xFFFF,
                len: 2,
                ..
            }))
        ));
        assert_eq!(state.dynamic_top, 0xFFFF);
    }

    #[test]
    fn test_run_budget() {
        // BA -2: spin forever
        let mut machine = machine_with_code(&[0x0F, 0xFE]);
        assert_eq!(machine.run(10), StepOutcome::Continue);
        assert_eq!(machine.ip(), 0);
    }

    #[test]
    fn test_halted_machine_stays_halted() {
        let mut machine = machine_with_code(&[0x04, 0x00]);
        assert_eq!(machine.step(), StepOutcome::Halted { sw: 0 });
        assert_eq!(machine.step(), StepOutcome::Halted { sw: 0 });
        assert_eq!(machine.ip(), 1);
    }

    #[test]
    fn test_disassemble_at() {
        let machine = machine_with_code(&[0x22, 0x12, 0x34, 0x30]);
        assert_eq!(machine.disassemble_at(0).unwrap(), "0000  22 12 34        PUSHW #$1234");
        assert_eq!(machine.disassemble_at(3).unwrap(), "0003  30              .byte $30");
    }
}

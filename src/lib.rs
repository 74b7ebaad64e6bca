//! # MEL Smart Card Simulator
//!
//! A simulator for MULTOS-class smart cards: the MEL abstract machine, the
//! memory model it runs on, and the card layer that turns command APDUs into
//! applet runs.
//!
//! This crate provides the segmented memory model with bounds-checked accessors,
//! transactions and tracing, a table-driven MEL instruction decoder, the
//! execution engine, and application load unit (ALU) handling.
//!
//! ## Quick Start
//!
//! ```rust
//! use melcard::apdu::CommandApdu;
//! use melcard::card::{MultosCard, Slot};
//! use melcard::config::CardConfig;
//! use melcard::load_unit::LoadUnit;
//!
//! // PUSHB 0x2A; STORE 1, PB[0]; EXITLA 1
//! let unit = LoadUnit {
//!     code: vec![0x21, 0x2A, 0x46, 0x01, 0x00, 0x00, 0x06, 0x00, 0x01],
//!     ..LoadUnit::default()
//! };
//!
//! let mut card = MultosCard::new(CardConfig::default()).unwrap();
//! card.load_application(&unit.to_bytes()).unwrap();
//! card.power_on().unwrap();
//!
//! // SELECT answers with the (empty) FCI
//! let select = card.execute_apdu(&CommandApdu::new(0x00, 0xA4, 0x04, 0x00)).unwrap();
//! assert_eq!(select.data, vec![0x6F, 0x00]);
//!
//! // Any other command runs the applet
//! let response = card.execute_apdu(&CommandApdu::new(0x80, 0x10, 0x00, 0x00)).unwrap();
//! assert_eq!(response.data, vec![0x2A]);
//! assert_eq!(response.sw, 0x9000);
//! ```
//!
//! ## Architecture
//!
//! - **Memory**: three segments (ROM, RAM, NVRAM) reached only through named
//!   accessor windows; NVRAM writes can be rolled back
//! - **Addressing**: eight address-space tags resolved against the machine
//!   registers by a pure function
//! - **Table-Driven Decoding**: all opcode metadata in one `const`-built table
//! - **Explicit State**: each step computes the next registers from the current
//!   ones and commits them only when the instruction completes
//!
//! ## Modules
//!
//! - `memory` - Segments, accessors, transactions and the trace log
//! - `addressing` - Address-space tags and the resolver
//! - `condition` - Condition code register and branch conditions
//! - `opcodes` - Opcode metadata table
//! - `machine` - Execution engine
//! - `session` - Applet binding and the public-area APDU ABI
//! - `apdu`, `tlv`, `load_unit` - Wire formats
//! - `card` - Card slots
//! - `config` - Card configuration
//! - `disassembler` - MEL disassembler

pub mod addressing;
pub mod apdu;
pub mod card;
pub mod condition;
pub mod config;
pub mod disassembler;
pub mod load_unit;
pub mod machine;
pub mod memory;
pub mod opcodes;
pub mod session;
pub mod tlv;
pub mod wasm;

// Internal instruction implementations (not part of public API)
mod instructions;

// Re-export public API
pub use addressing::{AddressSpace, Area};
pub use apdu::{ApduError, CommandApdu, ResponseApdu};
pub use card::{Card, CardError, MultosCard, NativeApplet, NativeCard, Slot};
pub use condition::{Ccr, Condition};
pub use config::{CardConfig, ConfigError};
pub use disassembler::{disassemble, DisassemblyOptions, Instruction};
pub use load_unit::{LoadError, LoadUnit};
pub use machine::{ExecutionState, ExecutionStatus, Fault, Machine, StepOutcome};
pub use memory::{Accessor, MemoryError, MemoryManager, MemorySegment, SegmentFlags, SegmentKind};
pub use opcodes::{lookup, InstructionClass, OpcodeMetadata, ParamKind, OPCODE_TABLE};
pub use session::{Applet, SessionError};

//! # Card Configuration
//!
//! Memory layout and run limits of a simulated card, loadable from JSON.
//!
//! ```json
//! {
//!   "rom_size": 32768,
//!   "ram_size": 8192,
//!   "nvram_size": 32768,
//!   "dynamic_size": 4096,
//!   "public_size": 1024,
//!   "session_size": 64,
//!   "step_budget": 100000,
//!   "atr": [59, 2, 20, 80],
//!   "trace": false
//! }
//! ```
//!
//! Every field is optional; missing fields take their [`Default`] value.

use crate::addressing::Area;
use crate::machine::Machine;
use crate::memory::{
    MemoryError, MemoryManager, MemorySegment, SegmentFlags, SegmentKind, DYNAMIC_ID, PUBLIC_ID,
};
use crate::session::HEADER_OFFSET;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors raised while loading or validating a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("cannot read configuration: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration is not valid JSON for [`CardConfig`].
    #[error("cannot parse configuration: {0}")]
    Json(#[from] serde_json::Error),

    /// The layout is inconsistent.
    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// A window could not be created.
    #[error(transparent)]
    Memory(#[from] MemoryError),
}

/// Card memory layout and limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CardConfig {
    /// ROM size (applet code).
    pub rom_size: usize,
    /// RAM size (dynamic and public windows).
    pub ram_size: usize,
    /// NVRAM size (applet static data).
    pub nvram_size: usize,
    /// Dynamic window, placed at RAM offset 0.
    pub dynamic_size: usize,
    /// Public window, placed right after the dynamic window.
    pub public_size: usize,
    /// Session data reserved for each applet.
    pub session_size: u16,
    /// Instructions allowed per command.
    pub step_budget: u64,
    /// Answer-to-reset returned on power-on.
    pub atr: Vec<u8>,
    /// Record RAM and NVRAM accesses in the trace log.
    pub trace: bool,
}

impl Default for CardConfig {
    fn default() -> Self {
        Self {
            rom_size: 0x8000,
            ram_size: 0x2000,
            nvram_size: 0x8000,
            dynamic_size: 0x1000,
            public_size: 0x0400,
            session_size: 0x40,
            step_budget: 100_000,
            atr: vec![0x3B, 0x02, 0x14, 0x50],
            trace: false,
        }
    }
}

impl CardConfig {
    /// Parses and validates a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: CardConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON configuration file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Serializes to pretty-printed JSON.
    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Checks the layout against the linear address partition.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let limits = [
            ("nvram_size", self.nvram_size, Area::Static.linear_size()),
            ("dynamic_size", self.dynamic_size, Area::Dynamic.linear_size()),
            ("public_size", self.public_size, Area::Public.linear_size()),
        ];
        for (name, value, limit) in limits {
            if value > limit {
                return Err(ConfigError::Invalid(format!(
                    "{name} 0x{value:X} exceeds 0x{limit:X}"
                )));
            }
        }
        if self.dynamic_size + self.public_size > self.ram_size {
            return Err(ConfigError::Invalid(format!(
                "dynamic_size + public_size (0x{:X}) exceeds ram_size 0x{:X}",
                self.dynamic_size + self.public_size,
                self.ram_size
            )));
        }
        if self.public_size < HEADER_OFFSET as usize {
            return Err(ConfigError::Invalid(format!(
                "public_size must hold the {HEADER_OFFSET}-byte command header block"
            )));
        }
        if self.session_size as usize > self.dynamic_size {
            return Err(ConfigError::Invalid(format!(
                "session_size 0x{:X} exceeds dynamic_size 0x{:X}",
                self.session_size, self.dynamic_size
            )));
        }
        if self.step_budget == 0 {
            return Err(ConfigError::Invalid("step_budget must be positive".into()));
        }
        Ok(())
    }

    /// Allocates the three segments.
    ///
    /// ROM is read-only and NVRAM transactionable; RAM and NVRAM carry the
    /// trace flag when `trace` is set.
    pub fn build_memory(&self) -> MemoryManager {
        let trace = if self.trace {
            SegmentFlags::TRACE
        } else {
            SegmentFlags::empty()
        };
        MemoryManager::new(
            MemorySegment::new(SegmentKind::Rom, self.rom_size, SegmentFlags::READ_ONLY),
            MemorySegment::new(SegmentKind::Ram, self.ram_size, trace),
            MemorySegment::new(
                SegmentKind::Nvram,
                self.nvram_size,
                SegmentFlags::TRANSACTIONABLE | trace,
            ),
        )
    }

    /// Validates the layout and builds an idle machine over fresh memory.
    pub fn build_machine(&self) -> Result<Machine, ConfigError> {
        self.validate()?;
        let memory = self.build_memory();
        let dynamic = memory.accessor(DYNAMIC_ID, SegmentKind::Ram, 0, self.dynamic_size)?;
        let public = memory.accessor(
            PUBLIC_ID,
            SegmentKind::Ram,
            self.dynamic_size,
            self.public_size,
        )?;
        Ok(Machine::new(memory, dynamic, public))
    }
}

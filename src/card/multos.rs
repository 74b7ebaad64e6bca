//! A card running MEL applets.
//!
//! Applets arrive as application load units. Code is placed in ROM and static
//! data in NVRAM, one after the other. SELECT is answered by the card itself;
//! every other command runs the selected applet on the [`Machine`] until it
//! exits or the step budget runs out.
//!
//! Each command runs inside an NVRAM transaction: static data written by an
//! applet that exits is kept, writes made by a run that faults or exceeds its
//! budget are rolled back.

use super::{CardError, Slot};
use crate::apdu::{CommandApdu, ResponseApdu, INS_SELECT, SW_FILE_NOT_FOUND, SW_SUCCESS};
use crate::config::CardConfig;
use crate::load_unit::{LoadError, LoadUnit};
use crate::machine::{ExecutionState, Machine, StepOutcome};
use crate::memory::{SegmentKind, CODE_ID, STATIC_ID};
use crate::session::Applet;
use crate::tlv::{self, TAG_FCI};
use tracing::{debug, info, warn};

/// An applet installed on the card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Application {
    /// Accessors and session size.
    pub applet: Applet,
    /// AID from the directory record.
    pub aid: Option<Vec<u8>>,
    /// FCI returned on SELECT.
    pub fci: Vec<u8>,
}

impl Application {
    /// True if a SELECT with `aid` picks this application.
    ///
    /// An empty AID, or an application without one, matches anything;
    /// otherwise `aid` must be a prefix of the application's AID.
    pub fn matches(&self, aid: &[u8]) -> bool {
        match &self.aid {
            Some(own) if !aid.is_empty() => own.starts_with(aid),
            _ => true,
        }
    }
}

/// A MULTOS-style card.
///
/// # Examples
///
/// ```
/// use melcard::apdu::CommandApdu;
/// use melcard::card::{MultosCard, Slot};
/// use melcard::config::CardConfig;
/// use melcard::load_unit::LoadUnit;
///
/// let unit = LoadUnit {
///     // EXITSWLA 0x9000, 0
///     code: vec![0x07, 0x90, 0x00, 0x00, 0x00],
///     ..LoadUnit::default()
/// };
///
/// let mut card = MultosCard::new(CardConfig::default()).unwrap();
/// card.load_application(&unit.to_bytes()).unwrap();
/// card.power_on().unwrap();
///
/// let select = card.execute_apdu(&CommandApdu::new(0x00, 0xA4, 0x04, 0x00)).unwrap();
/// assert_eq!(select.data, vec![0x6F, 0x00]);
/// assert_eq!(select.sw, 0x9000);
/// ```
#[derive(Debug)]
pub struct MultosCard {
    config: CardConfig,
    machine: Machine,
    applications: Vec<Application>,
    selected: Option<usize>,
    powered: bool,
    rom_used: usize,
    nvram_used: usize,
}

impl MultosCard {
    /// Builds an unpowered card with no applications.
    pub fn new(config: CardConfig) -> Result<Self, CardError> {
        let machine = config.build_machine()?;
        Ok(Self {
            config,
            machine,
            applications: Vec::new(),
            selected: None,
            powered: false,
            rom_used: 0,
            nvram_used: 0,
        })
    }

    /// Parses an ALU image and installs it. Returns the application index.
    pub fn load_application(&mut self, image: &[u8]) -> Result<usize, CardError> {
        let unit = LoadUnit::parse(image)?;
        self.install(&unit)
    }

    /// Installs a parsed load unit. Returns the application index.
    pub fn install(&mut self, unit: &LoadUnit) -> Result<usize, CardError> {
        let code_room = self.config.rom_size - self.rom_used;
        let code_limit = code_room.min(u16::MAX as usize + 1);
        if unit.code.len() > code_limit {
            return Err(LoadError::TooLarge {
                what: "code",
                len: unit.code.len(),
                available: code_limit,
            }
            .into());
        }
        let static_room = self.config.nvram_size - self.nvram_used;
        if unit.static_data.len() > static_room {
            return Err(LoadError::TooLarge {
                what: "static data",
                len: unit.static_data.len(),
                available: static_room,
            }
            .into());
        }

        let memory = self.machine.memory_mut();
        let code_base = self.rom_used;
        let static_base = self.nvram_used;
        memory
            .segment_mut(SegmentKind::Rom)
            .load(code_base, &unit.code)?;
        memory
            .segment_mut(SegmentKind::Nvram)
            .load(static_base, &unit.static_data)?;
        let code = memory
            .accessor(CODE_ID, SegmentKind::Rom, code_base, unit.code.len())?;
        let static_data = memory
            .accessor(STATIC_ID, SegmentKind::Nvram, static_base, unit.static_data.len())?;

        self.rom_used += unit.code.len();
        self.nvram_used += unit.static_data.len();
        self.applications.push(Application {
            applet: Applet::new(code, static_data, self.config.session_size),
            aid: unit.aid().map(<[u8]>::to_vec),
            fci: unit.fci.clone(),
        });

        let index = self.applications.len() - 1;
        info!(
            index,
            code_len = unit.code.len(),
            static_len = unit.static_data.len(),
            "application loaded"
        );
        Ok(index)
    }

    /// Installed applications, in load order.
    pub fn applications(&self) -> &[Application] {
        &self.applications
    }

    /// The currently selected application.
    pub fn selected(&self) -> Option<&Application> {
        self.selected.map(|index| &self.applications[index])
    }

    /// The card configuration.
    pub fn config(&self) -> &CardConfig {
        &self.config
    }

    /// The abstract machine.
    pub fn machine(&self) -> &Machine {
        &self.machine
    }

    /// The abstract machine, mutably (for stepping and inspection).
    pub fn machine_mut(&mut self) -> &mut Machine {
        &mut self.machine
    }

    fn select(&mut self, command: &CommandApdu) -> Result<ResponseApdu, CardError> {
        let Some(index) = self
            .applications
            .iter()
            .rposition(|app| app.matches(&command.data))
        else {
            debug!(aid = ?command.data, "no application matches SELECT");
            return Ok(ResponseApdu::new(SW_FILE_NOT_FOUND));
        };

        let application = &self.applications[index];
        self.machine.setup_application(&application.applet)?;
        self.selected = Some(index);
        debug!(index, "application selected");

        Ok(ResponseApdu::new(SW_SUCCESS).with_data(tlv::encode(TAG_FCI, &application.fci)))
    }

    fn run_command(&mut self, command: &CommandApdu) -> Result<ResponseApdu, CardError> {
        if self.selected.is_none() {
            return Err(CardError::NoApplication);
        }
        // The trace log covers one run.
        self.machine.memory_mut().clear_trace();
        self.machine.set_command_apdu(command)?;

        let budget = self.config.step_budget;
        self.machine
            .memory_mut()
            .begin_transaction(SegmentKind::Nvram);
        let outcome = self.machine.run(budget);
        let commit = matches!(outcome, StepOutcome::Halted { .. });
        self.machine
            .memory_mut()
            .end_transaction(SegmentKind::Nvram, commit);

        match outcome {
            StepOutcome::Halted { sw } => {
                debug!(sw = format_args!("{sw:04X}"), "applet exited");
                Ok(self.machine.get_response_apdu()?)
            }
            StepOutcome::Fault(fault) => {
                warn!(%fault, ip = self.machine.ip(), "applet faulted");
                Err(CardError::Execution(fault))
            }
            StepOutcome::Continue => {
                warn!(budget, "applet exceeded its step budget");
                Err(CardError::StepBudgetExhausted { steps: budget })
            }
        }
    }
}

impl Slot for MultosCard {
    fn power_on(&mut self) -> Result<Vec<u8>, CardError> {
        let ram = self.machine.memory_mut().segment_mut(SegmentKind::Ram);
        let zeros = vec![0; ram.len()];
        ram.load(0, &zeros)?;
        self.machine.set_state(ExecutionState::default());
        self.selected = None;
        self.powered = true;
        debug!("card powered on");
        Ok(self.config.atr.clone())
    }

    fn power_off(&mut self) -> Result<(), CardError> {
        self.powered = false;
        self.selected = None;
        debug!("card powered off");
        Ok(())
    }

    fn execute_apdu(&mut self, command: &CommandApdu) -> Result<ResponseApdu, CardError> {
        if !self.powered {
            return Err(CardError::NotPowered);
        }
        if command.ins == INS_SELECT {
            self.select(command)
        } else {
            self.run_command(command)
        }
    }

    fn is_powered(&self) -> bool {
        self.powered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn application(aid: Option<Vec<u8>>) -> Application {
        let card = MultosCard::new(CardConfig::default()).unwrap();
        let memory = card.machine().memory();
        Application {
            applet: Applet::new(
                memory.accessor(CODE_ID, SegmentKind::Rom, 0, 0).unwrap(),
                memory.accessor(STATIC_ID, SegmentKind::Nvram, 0, 0).unwrap(),
                0,
            ),
            aid,
            fci: Vec::new(),
        }
    }

    #[test]
    fn test_aid_matching() {
        let app = application(Some(vec![0xA0, 0x00, 0x01]));
        assert!(app.matches(&[]));
        assert!(app.matches(&[0xA0, 0x00]));
        assert!(app.matches(&[0xA0, 0x00, 0x01]));
        assert!(!app.matches(&[0xA0, 0x01]));
        assert!(application(None).matches(&[0x12]));
    }

    #[test]
    fn test_rejects_oversized_code() {
        let config = CardConfig {
            rom_size: 4,
            ..CardConfig::default()
        };
        let mut card = MultosCard::new(config).unwrap();
        let unit = LoadUnit {
            code: vec![0; 5],
            ..LoadUnit::default()
        };
        assert!(matches!(
            card.install(&unit),
            Err(CardError::Load(LoadError::TooLarge { what: "code", .. }))
        ));
    }

    #[test]
    fn test_applications_are_placed_consecutively() {
        let mut card = MultosCard::new(CardConfig::default()).unwrap();
        let unit = LoadUnit {
            code: vec![0x04; 3],
            static_data: vec![1, 2],
            ..LoadUnit::default()
        };
        card.install(&unit).unwrap();
        card.install(&unit).unwrap();
        let second = &card.applications()[1].applet;
        assert_eq!(second.code.base(), 3);
        assert_eq!(second.static_data.base(), 2);
    }

    #[test]
    fn test_unpowered_card_rejects_commands() {
        let mut card = MultosCard::new(CardConfig::default()).unwrap();
        assert!(matches!(
            card.execute_apdu(&CommandApdu::new(0, INS_SELECT, 4, 0)),
            Err(CardError::NotPowered)
        ));
    }
}

//! A card hosting an applet written in Rust.

use super::{CardError, Slot};
use crate::apdu::{CommandApdu, ResponseApdu, INS_SELECT, SW_FILE_NOT_FOUND, SW_SUCCESS};
use std::fmt;
use tracing::debug;

/// Behaviour of a Rust applet.
///
/// # Examples
///
/// ```
/// use melcard::apdu::{CommandApdu, ResponseApdu};
/// use melcard::card::{NativeApplet, NativeCard, Slot};
///
/// struct Echo;
///
/// impl NativeApplet for Echo {
///     fn aid(&self) -> &[u8] {
///         &[0xA0, 0x00, 0x00, 0x00, 0x01]
///     }
///
///     fn process(&mut self, command: &CommandApdu) -> ResponseApdu {
///         ResponseApdu::new(0x9000).with_data(command.data.clone())
///     }
/// }
///
/// let mut card = NativeCard::new(Box::new(Echo), vec![0x3B, 0x00]);
/// card.power_on().unwrap();
/// card.execute_apdu(&CommandApdu::new(0x00, 0xA4, 0x04, 0x00)).unwrap();
///
/// let response = card
///     .execute_apdu(&CommandApdu::new(0x80, 0x01, 0, 0).with_data(vec![1, 2]))
///     .unwrap();
/// assert_eq!(response.data, vec![1, 2]);
/// ```
pub trait NativeApplet {
    /// Application identifier matched by SELECT.
    fn aid(&self) -> &[u8];

    /// Handles a SELECT that matched this applet.
    fn select(&mut self, _command: &CommandApdu) -> ResponseApdu {
        ResponseApdu::new(SW_SUCCESS)
    }

    /// Called when the applet loses the selection (power off).
    fn deselect(&mut self) {}

    /// Handles any other command.
    fn process(&mut self, command: &CommandApdu) -> ResponseApdu;
}

/// A card with a single Rust applet.
pub struct NativeCard {
    applet: Box<dyn NativeApplet>,
    atr: Vec<u8>,
    powered: bool,
    selected: bool,
}

impl NativeCard {
    /// Builds an unpowered card.
    pub fn new(applet: Box<dyn NativeApplet>, atr: Vec<u8>) -> Self {
        Self {
            applet,
            atr,
            powered: false,
            selected: false,
        }
    }

    /// True once a SELECT has matched the applet.
    pub fn is_selected(&self) -> bool {
        self.selected
    }

    fn select(&mut self, command: &CommandApdu) -> ResponseApdu {
        let aid = self.applet.aid();
        if !command.data.is_empty() && !aid.starts_with(&command.data) {
            return ResponseApdu::new(SW_FILE_NOT_FOUND);
        }
        let response = self.applet.select(command);
        self.selected = response.is_success();
        debug!(selected = self.selected, "native applet select");
        response
    }
}

impl fmt::Debug for NativeCard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeCard")
            .field("aid", &self.applet.aid())
            .field("powered", &self.powered)
            .field("selected", &self.selected)
            .finish()
    }
}

impl Slot for NativeCard {
    fn power_on(&mut self) -> Result<Vec<u8>, CardError> {
        self.powered = true;
        Ok(self.atr.clone())
    }

    fn power_off(&mut self) -> Result<(), CardError> {
        if self.selected {
            self.applet.deselect();
        }
        self.powered = false;
        self.selected = false;
        Ok(())
    }

    fn execute_apdu(&mut self, command: &CommandApdu) -> Result<ResponseApdu, CardError> {
        if !self.powered {
            return Err(CardError::NotPowered);
        }
        if command.ins == INS_SELECT {
            return Ok(self.select(command));
        }
        if !self.selected {
            return Err(CardError::NoApplication);
        }
        Ok(self.applet.process(command))
    }

    fn is_powered(&self) -> bool {
        self.powered
    }
}

//! # Card Slots
//!
//! A [`Slot`] is what a host talks to: it powers a card up and down and
//! exchanges APDUs with it. Two card kinds implement it:
//!
//! - [`MultosCard`]: runs MEL applets from application load units on a [`Machine`]
//! - [`NativeCard`]: hosts an applet written in Rust behind [`NativeApplet`]
//!
//! [`Card`] wraps either kind so hosts can hold one without generics.
//!
//! [`Machine`]: crate::Machine

pub mod multos;
pub mod native;

pub use multos::{Application, MultosCard};
pub use native::{NativeApplet, NativeCard};

use crate::apdu::{ApduError, CommandApdu, ResponseApdu};
use crate::config::ConfigError;
use crate::load_unit::LoadError;
use crate::machine::Fault;
use crate::memory::MemoryError;
use crate::session::SessionError;
use thiserror::Error;

/// Slot-level failures.
#[derive(Debug, Error)]
pub enum CardError {
    /// An APDU was sent to an unpowered card.
    #[error("card is not powered")]
    NotPowered,

    /// A command arrived before any application was selected.
    #[error("no application selected")]
    NoApplication,

    /// The applet faulted; the exchange produced no status word.
    #[error("execution fault: {0}")]
    Execution(Fault),

    /// The applet did not halt within the step budget.
    #[error("applet did not halt within {steps} steps")]
    StepBudgetExhausted {
        /// Budget that ran out
        steps: u64,
    },

    /// Malformed APDU bytes.
    #[error(transparent)]
    Apdu(#[from] ApduError),

    /// Malformed or oversized load unit.
    #[error(transparent)]
    Load(#[from] LoadError),

    /// Session setup or public-area exchange failed.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Installing an applet into card memory failed.
    #[error(transparent)]
    Memory(#[from] MemoryError),

    /// Invalid card configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// A card reader slot.
pub trait Slot {
    /// Powers the card and returns its answer-to-reset.
    fn power_on(&mut self) -> Result<Vec<u8>, CardError>;

    /// Removes power; the selection and RAM contents are lost.
    fn power_off(&mut self) -> Result<(), CardError>;

    /// Warm reset: power off then on.
    fn reset(&mut self) -> Result<Vec<u8>, CardError> {
        self.power_off()?;
        self.power_on()
    }

    /// Exchanges one command for one response.
    fn execute_apdu(&mut self, command: &CommandApdu) -> Result<ResponseApdu, CardError>;

    /// True between `power_on` and `power_off`.
    fn is_powered(&self) -> bool;

    /// Exchanges raw APDU bytes.
    fn transmit(&mut self, command: &[u8]) -> Result<Vec<u8>, CardError> {
        let command = CommandApdu::from_bytes(command)?;
        Ok(self.execute_apdu(&command)?.to_bytes())
    }
}

/// Either card kind.
#[derive(Debug)]
pub enum Card {
    /// MEL applets on the abstract machine.
    Multos(MultosCard),
    /// A Rust applet.
    Native(NativeCard),
}

impl Slot for Card {
    fn power_on(&mut self) -> Result<Vec<u8>, CardError> {
        match self {
            Card::Multos(card) => card.power_on(),
            Card::Native(card) => card.power_on(),
        }
    }

    fn power_off(&mut self) -> Result<(), CardError> {
        match self {
            Card::Multos(card) => card.power_off(),
            Card::Native(card) => card.power_off(),
        }
    }

    fn reset(&mut self) -> Result<Vec<u8>, CardError> {
        match self {
            Card::Multos(card) => card.reset(),
            Card::Native(card) => card.reset(),
        }
    }

    fn execute_apdu(&mut self, command: &CommandApdu) -> Result<ResponseApdu, CardError> {
        match self {
            Card::Multos(card) => card.execute_apdu(command),
            Card::Native(card) => card.execute_apdu(command),
        }
    }

    fn is_powered(&self) -> bool {
        match self {
            Card::Multos(card) => card.is_powered(),
            Card::Native(card) => card.is_powered(),
        }
    }
}

impl From<MultosCard> for Card {
    fn from(card: MultosCard) -> Self {
        Card::Multos(card)
    }
}

impl From<NativeCard> for Card {
    fn from(card: NativeCard) -> Self {
        Card::Native(card)
    }
}

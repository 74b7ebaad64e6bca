//! WASM API for the card simulator.
//!
//! Provides JavaScript-callable interfaces for card power control, APDU
//! exchange, machine state inspection and disassembly.

use crate::card::{MultosCard, Slot};
use crate::config::CardConfig;
use crate::disassembler::{disassemble, formatter, DisassemblyOptions};
use crate::StepOutcome;
use tracing::warn;
use wasm_bindgen::prelude::*;

/// JavaScript-compatible error wrapper
#[wasm_bindgen]
#[derive(Debug, Clone)]
pub struct JsError {
    message: String,
}

#[wasm_bindgen]
impl JsError {
    #[wasm_bindgen(constructor)]
    pub fn new(message: &str) -> JsError {
        JsError {
            message: message.to_string(),
        }
    }

    #[wasm_bindgen(getter)]
    pub fn message(&self) -> String {
        self.message.clone()
    }
}

impl<E: std::error::Error> From<E> for JsError {
    fn from(err: E) -> Self {
        JsError::new(&err.to_string())
    }
}

/// Result of disassembly operation
#[wasm_bindgen]
#[derive(Debug, Clone)]
pub struct DisassemblyLine {
    address: u16,
    bytes: Vec<u8>,
    text: String,
}

#[wasm_bindgen]
impl DisassemblyLine {
    #[wasm_bindgen(getter)]
    pub fn address(&self) -> u16 {
        self.address
    }

    #[wasm_bindgen(getter)]
    pub fn bytes(&self) -> Vec<u8> {
        self.bytes.clone()
    }

    #[wasm_bindgen(getter)]
    pub fn text(&self) -> String {
        self.text.clone()
    }
}

/// Main card interface for JavaScript
#[wasm_bindgen]
pub struct WasmCard {
    card: MultosCard,
    on_exchange: Option<js_sys::Function>,
}

#[wasm_bindgen]
impl WasmCard {
    /// Create a card from an optional JSON configuration
    ///
    /// `on_exchange`, if given, is called with `(command, response)` byte
    /// arrays after every APDU.
    #[wasm_bindgen(constructor)]
    pub fn new(
        config_json: Option<String>,
        on_exchange: Option<js_sys::Function>,
    ) -> Result<WasmCard, JsError> {
        let config = match config_json {
            Some(json) => CardConfig::from_json_str(&json)?,
            None => CardConfig::default(),
        };
        Ok(WasmCard {
            card: MultosCard::new(config)?,
            on_exchange,
        })
    }

    /// Install an application load unit, returning its index
    pub fn load_application(&mut self, image: &[u8]) -> Result<usize, JsError> {
        Ok(self.card.load_application(image)?)
    }

    /// Power the card, returning the ATR
    pub fn power_on(&mut self) -> Result<Vec<u8>, JsError> {
        Ok(self.card.power_on()?)
    }

    /// Remove power
    pub fn power_off(&mut self) -> Result<(), JsError> {
        Ok(self.card.power_off()?)
    }

    /// Warm reset, returning the ATR
    pub fn reset(&mut self) -> Result<Vec<u8>, JsError> {
        Ok(self.card.reset()?)
    }

    /// Exchange raw APDU bytes
    pub fn transmit(&mut self, command: &[u8]) -> Result<Vec<u8>, JsError> {
        let response = self.card.transmit(command)?;
        if let Some(callback) = &self.on_exchange {
            let result = callback.call2(
                &JsValue::NULL,
                &js_sys::Uint8Array::from(command).into(),
                &js_sys::Uint8Array::from(response.as_slice()).into(),
            );
            if let Err(err) = result {
                warn!(error = ?err, "exchange callback threw");
            }
        }
        Ok(response)
    }

    /// Execute a single instruction of the selected application
    ///
    /// Returns `"continue"`, `"halted XXXX"` or the fault message.
    pub fn step(&mut self) -> String {
        match self.card.machine_mut().step() {
            StepOutcome::Continue => "continue".to_string(),
            StepOutcome::Halted { sw } => format!("halted {sw:04X}"),
            StepOutcome::Fault(fault) => fault.to_string(),
        }
    }

    // Register getters
    #[wasm_bindgen(getter)]
    pub fn ip(&self) -> u16 {
        self.card.machine().ip()
    }

    #[wasm_bindgen(getter)]
    pub fn frame_base(&self) -> u16 {
        self.card.machine().frame_base()
    }

    #[wasm_bindgen(getter)]
    pub fn dynamic_top(&self) -> u16 {
        self.card.machine().dynamic_top()
    }

    // Flag getters
    #[wasm_bindgen(getter)]
    pub fn flag_z(&self) -> bool {
        self.card.machine().ccr().z
    }

    #[wasm_bindgen(getter)]
    pub fn flag_c(&self) -> bool {
        self.card.machine().ccr().c
    }

    #[wasm_bindgen(getter)]
    pub fn powered(&self) -> bool {
        self.card.is_powered()
    }

    // Memory access methods

    /// Read the whole public area (for display)
    pub fn public_area(&self) -> Vec<u8> {
        let machine = self.card.machine();
        let public = machine.public_accessor();
        machine
            .memory()
            .peek(public, 0, public.len())
            .map(<[u8]>::to_vec)
            .unwrap_or_default()
    }

    /// Read the stack from the bottom of the dynamic area to the dynamic top
    pub fn stack(&self) -> Vec<u8> {
        let machine = self.card.machine();
        machine
            .peek_dynamic(0, machine.dynamic_top() as usize)
            .unwrap_or_default()
    }

    /// Disassemble the selected application's code
    pub fn disassemble(&self, start_addr: u16, num_instructions: u32) -> Vec<JsValue> {
        let machine = self.card.machine();
        let Some(code) = machine.code_accessor() else {
            return Vec::new();
        };
        let Ok(bytes) = machine.memory().peek(code, 0, code.len()) else {
            return Vec::new();
        };
        let start = (start_addr as usize).min(bytes.len());
        let opts = DisassemblyOptions {
            start_address: start_addr,
        };

        disassemble(&bytes[start..], opts)
            .iter()
            .take(num_instructions as usize)
            .map(|instr| {
                let mut bytes = vec![instr.opcode];
                bytes.extend_from_slice(&instr.operand_bytes);
                JsValue::from(DisassemblyLine {
                    address: instr.address,
                    bytes,
                    text: formatter::format_instruction(instr),
                })
            })
            .collect()
    }
}

//! WebAssembly bindings for the card simulator.
//!
//! This module provides JavaScript-callable interfaces to a MEL card,
//! enabling browser-based APDU exchanges, stepping and disassembly.

#[cfg(feature = "wasm")]
pub mod api;

#[cfg(feature = "wasm")]
pub use api::WasmCard;

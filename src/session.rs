//! # Application Sessions
//!
//! Binding an applet to the machine and exchanging command and response units
//! through the public area.
//!
//! ## Public Area Layout
//!
//! Offsets are measured back from the top of the public window (`PT`):
//!
//! | Offset    | Size | Field                              |
//! |-----------|------|------------------------------------|
//! | `PT - 2`  | 2    | SW, status word (initially 0x9000) |
//! | `PT - 4`  | 2    | La, response data length           |
//! | `PT - 6`  | 2    | Le, expected response length       |
//! | `PT - 8`  | 2    | Lc, command data length            |
//! | `PT - 9`  | 1    | reserved                           |
//! | `PT - 13` | 4    | CLA INS P1 P2                      |
//!
//! Command data is written at offset 0; the applet writes response data at
//! offset 0 as well and reports its length in La.

use crate::addressing::Area;
use crate::apdu::{CommandApdu, ResponseApdu, SW_SUCCESS};
use crate::machine::{Fault, Machine};
use crate::memory::{Accessor, MemoryError};
use thiserror::Error;
use tracing::debug;

/// Distance of SW below the public top.
pub const SW_OFFSET: u16 = 2;
/// Distance of La below the public top.
pub const LA_OFFSET: u16 = 4;
/// Distance of Le below the public top.
pub const LE_OFFSET: u16 = 6;
/// Distance of Lc below the public top.
pub const LC_OFFSET: u16 = 8;
/// Distance of the command header below the public top.
pub const HEADER_OFFSET: u16 = 13;

/// An applet as the machine sees it: two accessors and a session size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applet {
    /// Code window (ROM).
    pub code: Accessor,
    /// Static data window (NVRAM).
    pub static_data: Accessor,
    /// Bytes reserved at the bottom of the dynamic area for session data.
    pub session_size: u16,
}

impl Applet {
    /// Describes an applet.
    pub fn new(code: Accessor, static_data: Accessor, session_size: u16) -> Self {
        Self {
            code,
            static_data,
            session_size,
        }
    }
}

/// Errors raised while setting up a session or exchanging APDUs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The session data does not fit the dynamic area.
    #[error("session size {session_size} exceeds the {dynamic_len}-byte dynamic area")]
    SessionTooLarge {
        /// Requested session size
        session_size: u16,
        /// Dynamic window length
        dynamic_len: usize,
    },

    /// A window is larger than its area's linear range.
    #[error("{area:?} window of {len} bytes exceeds the {limit}-byte linear range")]
    WindowTooLarge {
        /// Area the window backs
        area: Area,
        /// Window length
        len: usize,
        /// Linear range of the area
        limit: usize,
    },

    /// The command data would overlap the public ABI fields.
    #[error("command data of {len} bytes exceeds the {capacity}-byte public buffer")]
    CommandTooLong {
        /// Lc
        len: usize,
        /// Bytes available below the ABI fields
        capacity: usize,
    },

    /// La claims more data than the public buffer holds.
    #[error("response length {len} exceeds the {capacity}-byte public buffer")]
    ResponseTooLong {
        /// La
        len: usize,
        /// Bytes available below the ABI fields
        capacity: usize,
    },

    /// No application is bound.
    #[error("no application has been set up")]
    NoApplication,

    /// A memory access failed.
    #[error(transparent)]
    Fault(#[from] Fault),
}

impl From<MemoryError> for SessionError {
    fn from(err: MemoryError) -> Self {
        SessionError::Fault(Fault::Memory(err))
    }
}

impl Machine {
    /// Binds an applet and prepares a fresh run.
    pub fn setup_application(&mut self, applet: &Applet) -> Result<(), SessionError> {
        let windows = [
            (Area::Static, applet.static_data.len()),
            (Area::Dynamic, self.dynamic.len()),
            (Area::Public, self.public.len()),
        ];
        for (area, len) in windows {
            if len > area.linear_size() {
                return Err(SessionError::WindowTooLarge {
                    area,
                    len,
                    limit: area.linear_size(),
                });
            }
        }
        if applet.session_size as usize > self.dynamic.len() {
            return Err(SessionError::SessionTooLarge {
                session_size: applet.session_size,
                dynamic_len: self.dynamic.len(),
            });
        }
        debug!(
            code_len = applet.code.len(),
            static_len = applet.static_data.len(),
            session_size = applet.session_size,
            "setup application"
        );
        self.code = Some(applet.code.clone());
        self.static_area = Some(applet.static_data.clone());
        self.session_size = applet.session_size;
        self.init_execution();
        Ok(())
    }

    /// Bytes of the public area available for command and response data.
    pub fn public_capacity(&self) -> usize {
        self.public.len().saturating_sub(HEADER_OFFSET as usize)
    }

    /// Writes a command into the public area and resets the registers.
    ///
    /// SW is preset to 0x9000 and La to 0.
    pub fn set_command_apdu(&mut self, command: &CommandApdu) -> Result<(), SessionError> {
        if self.code.is_none() {
            return Err(SessionError::NoApplication);
        }
        let capacity = self.public_capacity();
        if command.data.len() > capacity {
            return Err(SessionError::CommandTooLong {
                len: command.data.len(),
                capacity,
            });
        }

        let public = self.public.clone();
        let fields = [
            (SW_OFFSET, SW_SUCCESS),
            (LA_OFFSET, 0),
            (LE_OFFSET, command.le.unwrap_or(0)),
            (LC_OFFSET, command.data.len() as u16),
        ];
        for (back, value) in fields {
            let offset = self.public_top(back);
            self.memory.write_word(&public, offset, value)?;
        }
        let header_at = self.public_top(HEADER_OFFSET);
        self.memory.write_bytes(&public, header_at, &command.header())?;
        self.memory.write_bytes(&public, 0, &command.data)?;

        self.init_execution();
        Ok(())
    }

    /// Reads the response left in the public area.
    pub fn get_response_apdu(&mut self) -> Result<ResponseApdu, SessionError> {
        let public = self.public.clone();
        let sw_at = self.public_top(SW_OFFSET);
        let la_at = self.public_top(LA_OFFSET);
        let sw = self.memory.read_word(&public, sw_at)?;
        let la = self.memory.read_word(&public, la_at)? as usize;

        let capacity = self.public_capacity();
        if la > capacity {
            return Err(SessionError::ResponseTooLong { len: la, capacity });
        }
        let data = self.memory.read_bytes(&public, 0, la)?;
        Ok(ResponseApdu::new(sw).with_data(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryManager, SegmentKind};

    fn machine() -> (Machine, Applet) {
        let mut memory = MemoryManager::with_sizes(0x40, 0x200, 0x40);
        memory.segment_mut(SegmentKind::Rom).load(0, &[0x04]).unwrap();
        let code = memory.accessor("code", SegmentKind::Rom, 0, 1).unwrap();
        let static_data = memory.accessor("S", SegmentKind::Nvram, 0, 0x40).unwrap();
        let dynamic = memory.accessor("D", SegmentKind::Ram, 0, 0x100).unwrap();
        let public = memory.accessor("P", SegmentKind::Ram, 0x100, 0x100).unwrap();
        (
            Machine::new(memory, dynamic, public),
            Applet::new(code, static_data, 8),
        )
    }

    #[test]
    fn test_session_too_large() {
        let (mut machine, mut applet) = machine();
        applet.session_size = 0x101;
        assert_eq!(
            machine.setup_application(&applet),
            Err(SessionError::SessionTooLarge {
                session_size: 0x101,
                dynamic_len: 0x100
            })
        );
    }

    #[test]
    fn test_command_requires_application() {
        let (mut machine, _) = machine();
        let command = CommandApdu::new(0x80, 0x10, 0, 0);
        assert_eq!(
            machine.set_command_apdu(&command),
            Err(SessionError::NoApplication)
        );
    }

    #[test]
    fn test_command_layout() {
        let (mut machine, applet) = machine();
        machine.setup_application(&applet).unwrap();
        let command = CommandApdu::new(0x80, 0x10, 0x01, 0x02)
            .with_data(vec![0xAA, 0xBB])
            .with_le(0x20);
        machine.set_command_apdu(&command).unwrap();

        let public = machine.public_accessor().clone();
        let memory = machine.memory();
        assert_eq!(memory.peek(&public, 0xFE, 2).unwrap(), &[0x90, 0x00]);
        assert_eq!(memory.peek(&public, 0xFC, 2).unwrap(), &[0x00, 0x00]);
        assert_eq!(memory.peek(&public, 0xFA, 2).unwrap(), &[0x00, 0x20]);
        assert_eq!(memory.peek(&public, 0xF8, 2).unwrap(), &[0x00, 0x02]);
        assert_eq!(
            memory.peek(&public, 0xF3, 4).unwrap(),
            &[0x80, 0x10, 0x01, 0x02]
        );
        assert_eq!(memory.peek(&public, 0, 2).unwrap(), &[0xAA, 0xBB]);
        assert_eq!(machine.frame_base(), 8);
        assert_eq!(machine.dynamic_top(), 8);
    }

    #[test]
    fn test_command_too_long() {
        let (mut machine, applet) = machine();
        machine.setup_application(&applet).unwrap();
        let command = CommandApdu::new(0, 0, 0, 0).with_data(vec![0; 0xF4]);
        assert_eq!(
            machine.set_command_apdu(&command),
            Err(SessionError::CommandTooLong {
                len: 0xF4,
                capacity: 0xF3
            })
        );
    }

    #[test]
    fn test_response_length_is_bounded() {
        let (mut machine, applet) = machine();
        machine.setup_application(&applet).unwrap();
        machine
            .set_command_apdu(&CommandApdu::new(0, 0, 0, 0))
            .unwrap();
        let public = machine.public_accessor().clone();
        machine.memory_mut().write_word(&public, 0xFC, 0xF4).unwrap();
        assert_eq!(
            machine.get_response_apdu(),
            Err(SessionError::ResponseTooLong {
                len: 0xF4,
                capacity: 0xF3
            })
        );
    }

    #[test]
    fn test_response_reads_la_bytes() {
        let (mut machine, applet) = machine();
        machine.setup_application(&applet).unwrap();
        machine
            .set_command_apdu(&CommandApdu::new(0, 0, 0, 0))
            .unwrap();

        let public = machine.public_accessor().clone();
        let memory = machine.memory_mut();
        memory.write_bytes(&public, 0, &[1, 2, 3]).unwrap();
        memory.write_word(&public, 0xFC, 3).unwrap();
        memory.write_word(&public, 0xFE, 0x6100).unwrap();

        let response = machine.get_response_apdu().unwrap();
        assert_eq!(response.sw, 0x6100);
        assert_eq!(response.data, vec![1, 2, 3]);
    }
}

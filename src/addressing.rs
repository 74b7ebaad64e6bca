//! # Address Spaces
//!
//! This module defines the eight MEL address-space tags and the pure functions
//! that map a tagged address onto the three memory areas an applet can see.
//!
//! ## Areas
//!
//! | Area    | Accessor | Linear range      |
//! |---------|----------|-------------------|
//! | Static  | `S`      | `0x0000 - 0x7FFF` |
//! | Dynamic | `D`      | `0x8000 - 0xEFFF` |
//! | Public  | `P`      | `0xF000 - 0xFFFF` |
//!
//! A tagged address `(tag, offset)` resolves to `(area, area_offset)` relative to
//! a base register (see [`resolve`]). The flat linear form is only used for one
//! level of pointer indirection (`LOADI`, `STOREI`, `LOADA`, `INDEX`).

/// MEL address-space tag (low three bits of a data-movement opcode).
///
/// # Operand Bases
///
/// - **TOS, LB**: dynamic area, relative to the current frame base
/// - **DB / DT**: dynamic area, relative to its start / the dynamic top
/// - **SB / ST**: static area, relative to its start / its end
/// - **PB / PT**: public area, relative to its start / its end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AddressSpace {
    /// Top of stack (implicit operand).
    Tos = 0,
    /// Static base.
    Sb = 1,
    /// Static top.
    St = 2,
    /// Dynamic base.
    Db = 3,
    /// Local (frame) base.
    Lb = 4,
    /// Dynamic top.
    Dt = 5,
    /// Public base.
    Pb = 6,
    /// Public top.
    Pt = 7,
}

impl AddressSpace {
    /// The seven explicitly addressed spaces, in tag order.
    pub const TAGGED: [AddressSpace; 7] = [
        AddressSpace::Sb,
        AddressSpace::St,
        AddressSpace::Db,
        AddressSpace::Lb,
        AddressSpace::Dt,
        AddressSpace::Pb,
        AddressSpace::Pt,
    ];

    /// Decodes the low three bits of an opcode.
    pub const fn from_tag(tag: u8) -> AddressSpace {
        match tag & 0x07 {
            0 => AddressSpace::Tos,
            1 => AddressSpace::Sb,
            2 => AddressSpace::St,
            3 => AddressSpace::Db,
            4 => AddressSpace::Lb,
            5 => AddressSpace::Dt,
            6 => AddressSpace::Pb,
            _ => AddressSpace::Pt,
        }
    }

    /// The three-bit tag value.
    pub const fn tag(self) -> u8 {
        self as u8
    }

    /// Assembly name of the space.
    pub const fn name(self) -> &'static str {
        match self {
            AddressSpace::Tos => "TOS",
            AddressSpace::Sb => "SB",
            AddressSpace::St => "ST",
            AddressSpace::Db => "DB",
            AddressSpace::Lb => "LB",
            AddressSpace::Dt => "DT",
            AddressSpace::Pb => "PB",
            AddressSpace::Pt => "PT",
        }
    }
}

/// One of the three memory areas visible to an applet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Area {
    /// Applet static data (NVRAM).
    Static,
    /// Session data and stack (RAM).
    Dynamic,
    /// Host/applet ABI window (RAM).
    Public,
}

impl Area {
    /// First linear address of the area.
    pub const fn linear_base(self) -> u16 {
        match self {
            Area::Static => 0x0000,
            Area::Dynamic => 0x8000,
            Area::Public => 0xF000,
        }
    }

    /// Number of linear addresses reserved for the area.
    pub const fn linear_size(self) -> usize {
        match self {
            Area::Static => 0x8000,
            Area::Dynamic => 0x7000,
            Area::Public => 0x1000,
        }
    }
}

/// Register and window values a resolution depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AreaLayout {
    /// Current frame base (LB, TOS).
    pub frame_base: u16,
    /// Current dynamic top (DT).
    pub dynamic_top: u16,
    /// Static window length.
    pub static_len: usize,
    /// Dynamic window length.
    pub dynamic_len: usize,
    /// Public window length.
    pub public_len: usize,
}

impl AreaLayout {
    /// Length of the given area's window.
    pub fn area_len(&self, area: Area) -> usize {
        match area {
            Area::Static => self.static_len,
            Area::Dynamic => self.dynamic_len,
            Area::Public => self.public_len,
        }
    }

    /// Resolves a tagged address to the linear address used by pointer operations.
    pub fn linear_address(&self, space: AddressSpace, offset: u16) -> Option<u16> {
        let (area, area_offset) = resolve(space, offset, 0, self)?;
        to_linear(area, area_offset)
    }
}

/// Maps `(space, offset)` to `(area, area_offset)` for an access of `len` bytes.
///
/// Offsets wrap at 16 bits, so top-relative spaces take negative offsets in
/// two's complement (e.g. `PT` with `0xFFFE` addresses the last word of the
/// public area).
///
/// Returns `None` unless the whole access lies inside the area. A zero-length
/// resolution may point one past the end.
///
/// # Examples
///
/// ```
/// use melcard::addressing::{resolve, AddressSpace, Area, AreaLayout};
///
/// let layout = AreaLayout {
///     frame_base: 0x10,
///     dynamic_top: 0x20,
///     static_len: 0x100,
///     dynamic_len: 0x400,
///     public_len: 0x200,
/// };
///
/// assert_eq!(resolve(AddressSpace::Lb, 2, 1, &layout), Some((Area::Dynamic, 0x12)));
/// assert_eq!(resolve(AddressSpace::Pt, 0xFFFE, 2, &layout), Some((Area::Public, 0x1FE)));
/// assert_eq!(resolve(AddressSpace::Sb, 0xFF, 2, &layout), None);
/// ```
pub fn resolve(
    space: AddressSpace,
    offset: u16,
    len: usize,
    layout: &AreaLayout,
) -> Option<(Area, u16)> {
    let (area, base) = match space {
        AddressSpace::Tos | AddressSpace::Lb => (Area::Dynamic, layout.frame_base),
        AddressSpace::Db => (Area::Dynamic, 0),
        AddressSpace::Dt => (Area::Dynamic, layout.dynamic_top),
        AddressSpace::Sb => (Area::Static, 0),
        AddressSpace::St => (Area::Static, layout.static_len as u16),
        AddressSpace::Pb => (Area::Public, 0),
        AddressSpace::Pt => (Area::Public, layout.public_len as u16),
    };
    let area_offset = offset.wrapping_add(base);
    let area_len = layout.area_len(area);
    let start = area_offset as usize;

    let valid = if len == 0 {
        start <= area_len
    } else {
        start < area_len && start + len <= area_len
    };
    valid.then_some((area, area_offset))
}

/// Converts an area offset to its linear address.
///
/// Returns `None` if the offset does not fit the area's linear range.
pub fn to_linear(area: Area, offset: u16) -> Option<u16> {
    if (offset as usize) < area.linear_size() {
        Some(area.linear_base() + offset)
    } else {
        None
    }
}

/// Splits a linear address into its area and area offset.
///
/// Exact inverse of [`to_linear`].
pub fn from_linear(addr: u16) -> (Area, u16) {
    if addr >= Area::Public.linear_base() {
        (Area::Public, addr - Area::Public.linear_base())
    } else if addr >= Area::Dynamic.linear_base() {
        (Area::Dynamic, addr - Area::Dynamic.linear_base())
    } else {
        (Area::Static, addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> AreaLayout {
        AreaLayout {
            frame_base: 0x40,
            dynamic_top: 0x48,
            static_len: 0x80,
            dynamic_len: 0x100,
            public_len: 0x100,
        }
    }

    #[test]
    fn test_tag_round_trip() {
        for tag in 0..8u8 {
            assert_eq!(AddressSpace::from_tag(tag).tag(), tag);
        }
        assert_eq!(AddressSpace::from_tag(0x0D), AddressSpace::Dt);
    }

    #[test]
    fn test_bases() {
        let l = layout();
        assert_eq!(resolve(AddressSpace::Tos, 0, 1, &l), Some((Area::Dynamic, 0x40)));
        assert_eq!(resolve(AddressSpace::Lb, 4, 1, &l), Some((Area::Dynamic, 0x44)));
        assert_eq!(resolve(AddressSpace::Db, 4, 1, &l), Some((Area::Dynamic, 0x04)));
        assert_eq!(resolve(AddressSpace::Dt, 0xFFFF, 1, &l), Some((Area::Dynamic, 0x47)));
        assert_eq!(resolve(AddressSpace::Sb, 0x10, 1, &l), Some((Area::Static, 0x10)));
        assert_eq!(resolve(AddressSpace::St, 0xFFF0, 1, &l), Some((Area::Static, 0x70)));
        assert_eq!(resolve(AddressSpace::Pb, 0, 1, &l), Some((Area::Public, 0)));
        assert_eq!(resolve(AddressSpace::Pt, 0xFFFE, 2, &l), Some((Area::Public, 0xFE)));
    }

    #[test]
    fn test_resolution_bounds() {
        let l = layout();
        // Last byte is reachable
        assert!(resolve(AddressSpace::Sb, 0x7F, 1, &l).is_some());
        // One past the end is not
        assert!(resolve(AddressSpace::Sb, 0x80, 1, &l).is_none());
        // Straddling the end is not
        assert!(resolve(AddressSpace::Sb, 0x7F, 2, &l).is_none());
        // Top-relative without a negative offset points past the end
        assert!(resolve(AddressSpace::Pt, 0, 1, &l).is_none());
        // Zero-length resolution may point at the end
        assert!(resolve(AddressSpace::Pt, 0, 0, &l).is_some());
    }

    #[test]
    fn test_linear_partition() {
        assert_eq!(to_linear(Area::Static, 0x7FFF), Some(0x7FFF));
        assert_eq!(to_linear(Area::Static, 0x8000), None);
        assert_eq!(to_linear(Area::Dynamic, 0), Some(0x8000));
        assert_eq!(to_linear(Area::Dynamic, 0x6FFF), Some(0xEFFF));
        assert_eq!(to_linear(Area::Dynamic, 0x7000), None);
        assert_eq!(to_linear(Area::Public, 0x0FFF), Some(0xFFFF));

        assert_eq!(from_linear(0x1234), (Area::Static, 0x1234));
        assert_eq!(from_linear(0x8010), (Area::Dynamic, 0x10));
        assert_eq!(from_linear(0xEFFF), (Area::Dynamic, 0x6FFF));
        assert_eq!(from_linear(0xF002), (Area::Public, 2));
    }

    #[test]
    fn test_linear_address_of_tagged() {
        let l = layout();
        assert_eq!(l.linear_address(AddressSpace::Lb, 2), Some(0x8042));
        assert_eq!(l.linear_address(AddressSpace::Pt, 0xFFFE), Some(0xF0FE));
        assert_eq!(l.linear_address(AddressSpace::Sb, 0x200), None);
    }
}

//! Segmented real-mode addresses and their translation into the caller's linear space.

use core::fmt;

/// A real-mode `segment:offset` pointer.
///
/// Firmware packs these as "far pointers": offset in the low word, segment in the
/// high word.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct RealPtr {
    pub segment: u16,
    pub offset: u16,
}

impl RealPtr {
    pub const fn new(segment: u16, offset: u16) -> Self {
        Self { segment, offset }
    }

    pub const fn from_far(far: u32) -> Self {
        Self {
            segment: (far >> 16) as u16,
            offset: far as u16,
        }
    }

    pub const fn to_far(self) -> u32 {
        ((self.segment as u32) << 16) | self.offset as u32
    }

    /// Physical address (`segment * 16 + offset`).
    ///
    /// No A20 wrap is applied, so `FFFF:FFFF` yields `0x10FFEF`.
    pub const fn phys(self) -> u32 {
        real_addr(self.segment, self.offset)
    }

    pub const fn is_null(self) -> bool {
        self.segment == 0 && self.offset == 0
    }

    pub const fn wrapping_add(self, bytes: u16) -> Self {
        Self {
            segment: self.segment,
            offset: self.offset.wrapping_add(bytes),
        }
    }
}

impl fmt::Debug for RealPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04X}:{:04X}", self.segment, self.offset)
    }
}

impl fmt::Display for RealPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

pub const fn real_addr(segment: u16, offset: u16) -> u32 {
    (segment as u32) * 16 + offset as u32
}

/// An address in the protected-mode caller's flat address space.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LinearAddr(pub usize);

impl LinearAddr {
    pub const fn get(self) -> usize {
        self.0
    }

    pub const fn offset(self, bytes: usize) -> Self {
        Self(self.0 + bytes)
    }

    pub fn as_ptr(self) -> *const u8 {
        self.0 as *const u8
    }

    pub fn as_mut_ptr(self) -> *mut u8 {
        self.0 as *mut u8
    }
}

impl fmt::Display for LinearAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Maps real-mode memory into the caller's linear address space.
pub trait AddressTranslator {
    /// Returns `None` when no mapping service is available for `ptr`.
    fn real_to_linear(&self, ptr: RealPtr) -> Option<LinearAddr>;

    /// Maps `len` bytes of physical memory above 1 MiB, such as a linear
    /// framebuffer.
    fn physical_to_linear(&self, phys: u32, len: u32) -> Option<LinearAddr>;
}

impl<T: AddressTranslator + ?Sized> AddressTranslator for &T {
    fn real_to_linear(&self, ptr: RealPtr) -> Option<LinearAddr> {
        (**self).real_to_linear(ptr)
    }

    fn physical_to_linear(&self, phys: u32, len: u32) -> Option<LinearAddr> {
        (**self).physical_to_linear(phys, len)
    }
}

impl<T: AddressTranslator + ?Sized> AddressTranslator for &mut T {
    fn real_to_linear(&self, ptr: RealPtr) -> Option<LinearAddr> {
        (**self).real_to_linear(ptr)
    }

    fn physical_to_linear(&self, phys: u32, len: u32) -> Option<LinearAddr> {
        (**self).physical_to_linear(phys, len)
    }
}

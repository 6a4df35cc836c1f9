//! Real-mode register snapshot passed to and from a simulated real-mode interrupt.
//!
//! The layout is the DPMI "real mode call structure" (INT 31h AX=0300h):
//!
//! | Offset | 32-bit | 16-bit      | 8-bit   |
//! |--------|--------|-------------|---------|
//! | 0x00   | EDI    | DI          |         |
//! | 0x04   | ESI    | SI          |         |
//! | 0x08   | EBP    | BP          |         |
//! | 0x0C   | (rsvd) |             |         |
//! | 0x10   | EBX    | BX          | BL, BH  |
//! | 0x14   | EDX    | DX          | DL, DH  |
//! | 0x18   | ECX    | CX          | CL, CH  |
//! | 0x1C   | EAX    | AX          | AL, AH  |
//! | 0x20   |        | FLAGS       |         |
//! | 0x22   |        | ES DS FS GS |         |
//! | 0x2A   |        | IP CS SP SS |         |
//!
//! All three views are accessors over the same little-endian byte buffer, so a
//! write through one view is observed by the others at the same byte position.

use core::fmt;

pub const FLAG_CF: u16 = 1 << 0;
pub const FLAG_ZF: u16 = 1 << 6;
pub const FLAG_IF: u16 = 1 << 9;

const CALL_STRUCT_LEN: usize = 0x32;

macro_rules! reg32 {
    ($($get:ident / $set:ident @ $off:expr),* $(,)?) => {
        $(
            pub fn $get(&self) -> u32 {
                self.read_u32($off)
            }

            pub fn $set(&mut self, value: u32) {
                self.write_u32($off, value);
            }
        )*
    };
}

macro_rules! reg16 {
    ($($get:ident / $set:ident @ $off:expr),* $(,)?) => {
        $(
            pub fn $get(&self) -> u16 {
                self.read_u16($off)
            }

            pub fn $set(&mut self, value: u16) {
                self.write_u16($off, value);
            }
        )*
    };
}

macro_rules! reg8 {
    ($($get:ident / $set:ident @ $off:expr),* $(,)?) => {
        $(
            pub fn $get(&self) -> u8 {
                self.bytes[$off]
            }

            pub fn $set(&mut self, value: u8) {
                self.bytes[$off] = value;
            }
        )*
    };
}

/// Register file for one real-mode interrupt call.
#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct RmRegs {
    bytes: [u8; CALL_STRUCT_LEN],
}

impl RmRegs {
    pub const SIZE: usize = CALL_STRUCT_LEN;

    pub const OFF_EDI: usize = 0x00;
    pub const OFF_ESI: usize = 0x04;
    pub const OFF_EBP: usize = 0x08;
    pub const OFF_RESERVED: usize = 0x0C;
    pub const OFF_EBX: usize = 0x10;
    pub const OFF_EDX: usize = 0x14;
    pub const OFF_ECX: usize = 0x18;
    pub const OFF_EAX: usize = 0x1C;
    pub const OFF_FLAGS: usize = 0x20;
    pub const OFF_ES: usize = 0x22;
    pub const OFF_DS: usize = 0x24;
    pub const OFF_FS: usize = 0x26;
    pub const OFF_GS: usize = 0x28;
    pub const OFF_IP: usize = 0x2A;
    pub const OFF_CS: usize = 0x2C;
    pub const OFF_SP: usize = 0x2E;
    pub const OFF_SS: usize = 0x30;

    pub const fn new() -> Self {
        Self {
            bytes: [0; Self::SIZE],
        }
    }

    pub fn from_bytes(bytes: [u8; Self::SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; Self::SIZE] {
        &self.bytes
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8; Self::SIZE] {
        &mut self.bytes
    }

    /// Zeroes every register, including segments and SS:SP.
    ///
    /// A zero SS:SP tells the DPMI host to supply its own real-mode stack.
    pub fn clear(&mut self) {
        self.bytes = [0; Self::SIZE];
    }

    fn read_u16(&self, off: usize) -> u16 {
        u16::from_le_bytes([self.bytes[off], self.bytes[off + 1]])
    }

    fn write_u16(&mut self, off: usize, value: u16) {
        self.bytes[off..off + 2].copy_from_slice(&value.to_le_bytes());
    }

    fn read_u32(&self, off: usize) -> u32 {
        u32::from_le_bytes([
            self.bytes[off],
            self.bytes[off + 1],
            self.bytes[off + 2],
            self.bytes[off + 3],
        ])
    }

    fn write_u32(&mut self, off: usize, value: u32) {
        self.bytes[off..off + 4].copy_from_slice(&value.to_le_bytes());
    }

    reg32! {
        edi / set_edi @ Self::OFF_EDI,
        esi / set_esi @ Self::OFF_ESI,
        ebp / set_ebp @ Self::OFF_EBP,
        ebx / set_ebx @ Self::OFF_EBX,
        edx / set_edx @ Self::OFF_EDX,
        ecx / set_ecx @ Self::OFF_ECX,
        eax / set_eax @ Self::OFF_EAX,
    }

    reg16! {
        di / set_di @ Self::OFF_EDI,
        si / set_si @ Self::OFF_ESI,
        bp / set_bp @ Self::OFF_EBP,
        bx / set_bx @ Self::OFF_EBX,
        dx / set_dx @ Self::OFF_EDX,
        cx / set_cx @ Self::OFF_ECX,
        ax / set_ax @ Self::OFF_EAX,
        flags / set_flags @ Self::OFF_FLAGS,
        es / set_es @ Self::OFF_ES,
        ds / set_ds @ Self::OFF_DS,
        fs / set_fs @ Self::OFF_FS,
        gs / set_gs @ Self::OFF_GS,
        ip / set_ip @ Self::OFF_IP,
        cs / set_cs @ Self::OFF_CS,
        sp / set_sp @ Self::OFF_SP,
        ss / set_ss @ Self::OFF_SS,
    }

    reg8! {
        bl / set_bl @ Self::OFF_EBX,
        bh / set_bh @ Self::OFF_EBX + 1,
        dl / set_dl @ Self::OFF_EDX,
        dh / set_dh @ Self::OFF_EDX + 1,
        cl / set_cl @ Self::OFF_ECX,
        ch / set_ch @ Self::OFF_ECX + 1,
        al / set_al @ Self::OFF_EAX,
        ah / set_ah @ Self::OFF_EAX + 1,
    }

    pub fn carry(&self) -> bool {
        self.flags() & FLAG_CF != 0
    }

    pub fn set_carry(&mut self, carry: bool) {
        let flags = self.flags();
        if carry {
            self.set_flags(flags | FLAG_CF);
        } else {
            self.set_flags(flags & !FLAG_CF);
        }
    }
}

impl Default for RmRegs {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RmRegs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RmRegs")
            .field("eax", &format_args!("{:#010x}", self.eax()))
            .field("ebx", &format_args!("{:#010x}", self.ebx()))
            .field("ecx", &format_args!("{:#010x}", self.ecx()))
            .field("edx", &format_args!("{:#010x}", self.edx()))
            .field("esi", &format_args!("{:#010x}", self.esi()))
            .field("edi", &format_args!("{:#010x}", self.edi()))
            .field("ebp", &format_args!("{:#010x}", self.ebp()))
            .field("flags", &format_args!("{:#06x}", self.flags()))
            .field("es", &format_args!("{:#06x}", self.es()))
            .field("ds", &format_args!("{:#06x}", self.ds()))
            .finish()
    }
}

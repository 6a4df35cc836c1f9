//! VESA BIOS Extensions device model.
//!
//! Supported VBE mode numbers:
//!
//! | Mode  | Resolution | BPP | Memory model |
//! |-------|------------|-----|--------------|
//! | 0x100 | 640x400    | 8   | packed pixel |
//! | 0x101 | 640x480    | 8   | packed pixel |
//! | 0x103 | 800x600    | 8   | packed pixel |
//! | 0x105 | 1024x768   | 8   | packed pixel |
//! | 0x107 | 1280x1024  | 8   | packed pixel |
//! | 0x112 | 640x480    | 32  | direct color |
//!
//! Video memory is exposed twice: as a linear framebuffer at [`VBE_LFB_BASE`]
//! and through a 64KiB bank window at segment `A000`.

use svga_realmode::{real_addr, RealPtr};

pub const VBE_LFB_BASE: u32 = 0xE000_0000;
pub const VBE_VRAM_SIZE: u32 = 4 * 1024 * 1024;

pub const VBE_BANK_WINDOW_SEGMENT: u16 = 0xA000;
pub const VBE_BANK_WINDOW_BASE: u32 = real_addr(VBE_BANK_WINDOW_SEGMENT, 0);
pub const VBE_BANK_WINDOW_SIZE: u32 = 64 * 1024;
/// Window granularity and size in KiB.
pub const VBE_BANK_GRANULARITY_KB: u16 = 64;

/// Legacy far entry point for the banked window-switch function.
pub const VBE_WIN_FUNC_PTR: RealPtr = RealPtr::new(0xC000, 0x0040);

pub const MODE_ATTR_SUPPORTED: u16 = 1 << 0;
pub const MODE_ATTR_OPTIONAL_INFO: u16 = 1 << 1;
pub const MODE_ATTR_COLOR: u16 = 1 << 3;
pub const MODE_ATTR_GRAPHICS: u16 = 1 << 4;
pub const MODE_ATTR_LFB: u16 = 1 << 7;

const MEMORY_MODEL_PACKED: u8 = 0x04;
const MEMORY_MODEL_DIRECT: u8 = 0x06;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VbeMode {
    pub id: u16,
    pub width: u16,
    pub height: u16,
    pub bpp: u8,
}

impl VbeMode {
    pub fn bytes_per_pixel(&self) -> u16 {
        u16::from(self.bpp).div_ceil(8)
    }

    pub fn bytes_per_scan_line(&self) -> u16 {
        self.width * self.bytes_per_pixel()
    }

    pub fn framebuffer_bytes(&self) -> u32 {
        u32::from(self.bytes_per_scan_line()) * u32::from(self.height)
    }
}

pub const VBE_MODES: &[VbeMode] = &[
    VbeMode {
        id: 0x100,
        width: 640,
        height: 400,
        bpp: 8,
    },
    VbeMode {
        id: 0x101,
        width: 640,
        height: 480,
        bpp: 8,
    },
    VbeMode {
        id: 0x103,
        width: 800,
        height: 600,
        bpp: 8,
    },
    VbeMode {
        id: 0x105,
        width: 1024,
        height: 768,
        bpp: 8,
    },
    VbeMode {
        id: 0x107,
        width: 1280,
        height: 1024,
        bpp: 8,
    },
    VbeMode {
        id: 0x112,
        width: 640,
        height: 480,
        bpp: 32,
    },
];

#[derive(Debug, Clone)]
pub struct VbeDevice {
    modes: Vec<VbeMode>,
    pub lfb_supported: bool,
    pub current_mode: Option<u16>,
    pub lfb_enabled: bool,
    pub bank: u16,
    vram: Vec<u8>,
}

impl Default for VbeDevice {
    fn default() -> Self {
        Self::new(VBE_MODES.to_vec())
    }
}

impl VbeDevice {
    pub fn new(modes: Vec<VbeMode>) -> Self {
        Self {
            modes,
            lfb_supported: true,
            current_mode: None,
            lfb_enabled: false,
            bank: 0,
            vram: vec![0; VBE_VRAM_SIZE as usize],
        }
    }

    pub fn modes(&self) -> &[VbeMode] {
        &self.modes
    }

    /// Looks up `raw`, ignoring the LFB (bit 14) and don't-clear (bit 15) flags.
    pub fn find_mode(&self, raw: u16) -> Option<VbeMode> {
        let id = raw & 0x3FFF;
        self.modes.iter().copied().find(|m| m.id == id)
    }

    pub fn vram(&self) -> &[u8] {
        &self.vram
    }

    pub fn vram_read(&self, offset: u32) -> u8 {
        self.vram.get(offset as usize).copied().unwrap_or(0xFF)
    }

    pub fn vram_write(&mut self, offset: u32, value: u8) {
        if let Some(slot) = self.vram.get_mut(offset as usize) {
            *slot = value;
        }
    }

    /// VRAM offset currently visible at `window_offset` of the bank window.
    pub fn bank_offset(&self, window_offset: u32) -> u32 {
        u32::from(self.bank) * u32::from(VBE_BANK_GRANULARITY_KB) * 1024 + window_offset
    }

    pub fn set_mode(&mut self, raw: u16) -> bool {
        let Some(mode) = self.find_mode(raw) else {
            return false;
        };
        let lfb = raw & 0x4000 != 0;
        if lfb && !self.lfb_supported {
            return false;
        }
        if mode.framebuffer_bytes() > VBE_VRAM_SIZE {
            return false;
        }
        if raw & 0x8000 == 0 {
            self.vram.fill(0);
        }
        self.current_mode = Some(mode.id);
        self.lfb_enabled = lfb;
        self.bank = 0;
        true
    }

    pub fn clear_mode(&mut self) {
        self.current_mode = None;
        self.lfb_enabled = false;
        self.bank = 0;
    }

    /// Number of banks a mode's framebuffer spans.
    pub fn max_bank(&self) -> Option<u16> {
        let mode = self.current_mode.and_then(|m| self.find_mode(m))?;
        let banks = mode.framebuffer_bytes().div_ceil(VBE_BANK_WINDOW_SIZE);
        Some(banks.saturating_sub(1) as u16)
    }

    /// Builds the 512-byte VbeInfoBlock for a buffer located at `dest`.
    ///
    /// Strings and the mode list are placed in the block's OEM area and
    /// referenced by far pointers back into the same segment.
    pub fn controller_info(&self, dest: RealPtr) -> [u8; 512] {
        let mut out = [0u8; 512];

        out[0..4].copy_from_slice(b"VESA");
        out[4..6].copy_from_slice(&0x0200u16.to_le_bytes());

        let mode_list_offset = 0x0100u16;
        let oem_string_offset = 0x01C0u16;
        let vendor_string_offset = 0x01D0u16;
        let product_string_offset = 0x01E0u16;
        let product_rev_offset = 0x01F0u16;

        out[6..10].copy_from_slice(&dest.wrapping_add(oem_string_offset).to_far().to_le_bytes());
        out[14..18].copy_from_slice(&dest.wrapping_add(mode_list_offset).to_far().to_le_bytes());
        out[18..20].copy_from_slice(&((VBE_VRAM_SIZE / 65536) as u16).to_le_bytes());
        out[20..22].copy_from_slice(&0x0001u16.to_le_bytes());
        out[22..26]
            .copy_from_slice(&dest.wrapping_add(vendor_string_offset).to_far().to_le_bytes());
        out[26..30]
            .copy_from_slice(&dest.wrapping_add(product_string_offset).to_far().to_le_bytes());
        out[30..34].copy_from_slice(&dest.wrapping_add(product_rev_offset).to_far().to_le_bytes());

        // u16 list terminated by 0xFFFF; 0x100..0x1C0 holds at most 31 modes.
        let mut cursor = mode_list_offset as usize;
        for mode in self.modes.iter().take(31) {
            out[cursor..cursor + 2].copy_from_slice(&mode.id.to_le_bytes());
            cursor += 2;
        }
        out[cursor..cursor + 2].copy_from_slice(&0xFFFFu16.to_le_bytes());

        write_c_string(&mut out, oem_string_offset, b"SVGA Sim VBE");
        write_c_string(&mut out, vendor_string_offset, b"SVGA Sim");
        write_c_string(&mut out, product_string_offset, b"Simulated VBE");
        write_c_string(&mut out, product_rev_offset, b"1.0");
        out
    }

    /// Builds the 256-byte ModeInfoBlock for `raw`, or `None` if unsupported.
    pub fn mode_info(&self, raw: u16) -> Option<[u8; 256]> {
        let mode = self.find_mode(raw)?;
        let mut out = [0u8; 256];

        let mut attrs = MODE_ATTR_SUPPORTED | MODE_ATTR_OPTIONAL_INFO | MODE_ATTR_COLOR;
        attrs |= MODE_ATTR_GRAPHICS;
        if self.lfb_supported {
            attrs |= MODE_ATTR_LFB;
        }
        out[0..2].copy_from_slice(&attrs.to_le_bytes());

        // Window A: exists, readable, writable. No window B.
        out[2] = 0x07;
        out[3] = 0x00;
        out[4..6].copy_from_slice(&VBE_BANK_GRANULARITY_KB.to_le_bytes());
        out[6..8].copy_from_slice(&VBE_BANK_GRANULARITY_KB.to_le_bytes());
        out[8..10].copy_from_slice(&VBE_BANK_WINDOW_SEGMENT.to_le_bytes());
        out[10..12].copy_from_slice(&0u16.to_le_bytes());
        out[12..16].copy_from_slice(&VBE_WIN_FUNC_PTR.to_far().to_le_bytes());

        out[16..18].copy_from_slice(&mode.bytes_per_scan_line().to_le_bytes());
        out[18..20].copy_from_slice(&mode.width.to_le_bytes());
        out[20..22].copy_from_slice(&mode.height.to_le_bytes());
        out[22] = 8; // XCharSize
        out[23] = 16; // YCharSize
        out[24] = 1; // NumberOfPlanes
        out[25] = mode.bpp;
        out[26] = 1; // NumberOfBanks
        out[27] = if mode.bpp == 8 {
            MEMORY_MODEL_PACKED
        } else {
            MEMORY_MODEL_DIRECT
        };
        out[28] = 0; // BankSize
        let pages = VBE_VRAM_SIZE / mode.framebuffer_bytes().max(1);
        out[29] = pages.saturating_sub(1).min(255) as u8;
        out[30] = 1; // ReservedPageFn

        if mode.bpp == 32 {
            // X8R8G8B8.
            out[31] = 8;
            out[32] = 16;
            out[33] = 8;
            out[34] = 8;
            out[35] = 8;
            out[36] = 0;
            out[37] = 8;
            out[38] = 24;
            out[39] = 0x02; // reserved field usable by the application
        }

        if self.lfb_supported {
            out[40..44].copy_from_slice(&VBE_LFB_BASE.to_le_bytes());
        }

        Some(out)
    }
}

fn write_c_string(out: &mut [u8; 512], offset: u16, s: &[u8]) {
    let start = offset as usize;
    let end = (start + s.len()).min(out.len() - 1);
    out[start..end].copy_from_slice(&s[..end - start]);
    out[end] = 0;
}

//! VBE ModeInfoBlock (INT 10h AX=4F01h response).
//!
//! The record is exactly 256 bytes, little-endian, in the VBE 1.2 layout.
//! Bytes 40..256 are reserved in VBE 1.2; VBE 2.0+ firmware
//! stores the linear framebuffer address (`PhysBasePtr`) in the first four of
//! them, exposed through [`ModeInfo::phys_base_ptr`].

use bitflags::bitflags;
use svga_realmode::RealPtr;

const RESERVED_LEN: usize = 216;

bitflags! {
    /// `ModeAttributes` (offset 0).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ModeAttributes: u16 {
        const SUPPORTED = 1 << 0;
        const OPTIONAL_INFO = 1 << 1;
        const TTY_OUTPUT = 1 << 2;
        const COLOR = 1 << 3;
        const GRAPHICS = 1 << 4;
        const NOT_VGA_COMPATIBLE = 1 << 5;
        const NO_WINDOWED_MEMORY = 1 << 6;
        const LINEAR_FRAMEBUFFER = 1 << 7;
    }
}

bitflags! {
    /// `WinAAttributes` / `WinBAttributes` (offsets 2 and 3).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct WindowAttributes: u8 {
        const EXISTS = 1 << 0;
        const READABLE = 1 << 1;
        const WRITABLE = 1 << 2;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryModel {
    Text,
    Cga,
    Hercules,
    Planar,
    PackedPixel,
    NonChain4,
    DirectColor,
    Yuv,
    Other(u8),
}

impl MemoryModel {
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            0x00 => Self::Text,
            0x01 => Self::Cga,
            0x02 => Self::Hercules,
            0x03 => Self::Planar,
            0x04 => Self::PackedPixel,
            0x05 => Self::NonChain4,
            0x06 => Self::DirectColor,
            0x07 => Self::Yuv,
            other => Self::Other(other),
        }
    }

    pub fn raw(self) -> u8 {
        match self {
            Self::Text => 0x00,
            Self::Cga => 0x01,
            Self::Hercules => 0x02,
            Self::Planar => 0x03,
            Self::PackedPixel => 0x04,
            Self::NonChain4 => 0x05,
            Self::DirectColor => 0x06,
            Self::Yuv => 0x07,
            Self::Other(raw) => raw,
        }
    }
}

/// Size and bit position of one direct-color channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ColorField {
    pub mask_size: u8,
    pub field_position: u8,
}

/// One display mode as reported by firmware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeInfo {
    pub mode_attributes: ModeAttributes,
    pub win_a_attributes: WindowAttributes,
    pub win_b_attributes: WindowAttributes,
    /// KiB.
    pub win_granularity: u16,
    /// KiB.
    pub win_size: u16,
    pub win_a_segment: u16,
    pub win_b_segment: u16,
    /// Far entry point of the banked window-switch routine.
    pub win_func_ptr: RealPtr,
    pub bytes_per_scan_line: u16,
    pub x_resolution: u16,
    pub y_resolution: u16,
    pub x_char_size: u8,
    pub y_char_size: u8,
    pub number_of_planes: u8,
    pub bits_per_pixel: u8,
    pub number_of_banks: u8,
    pub memory_model: MemoryModel,
    /// KiB.
    pub bank_size: u8,
    pub number_of_image_pages: u8,
    pub reserved_page_fn: u8,
    pub red: ColorField,
    pub green: ColorField,
    pub blue: ColorField,
    pub rsvd: ColorField,
    pub direct_color_mode_info: u8,
    pub reserved: [u8; RESERVED_LEN],
}

impl ModeInfo {
    pub const SIZE: usize = 256;
    pub const RESERVED_OFFSET: usize = 40;

    pub fn parse(raw: &[u8; Self::SIZE]) -> Self {
        let u16_at = |off: usize| u16::from_le_bytes([raw[off], raw[off + 1]]);
        let field = |off: usize| ColorField {
            mask_size: raw[off],
            field_position: raw[off + 1],
        };
        let mut reserved = [0u8; RESERVED_LEN];
        reserved.copy_from_slice(&raw[Self::RESERVED_OFFSET..]);

        Self {
            mode_attributes: ModeAttributes::from_bits_retain(u16_at(0)),
            win_a_attributes: WindowAttributes::from_bits_retain(raw[2]),
            win_b_attributes: WindowAttributes::from_bits_retain(raw[3]),
            win_granularity: u16_at(4),
            win_size: u16_at(6),
            win_a_segment: u16_at(8),
            win_b_segment: u16_at(10),
            win_func_ptr: RealPtr::from_far(u32::from_le_bytes([
                raw[12], raw[13], raw[14], raw[15],
            ])),
            bytes_per_scan_line: u16_at(16),
            x_resolution: u16_at(18),
            y_resolution: u16_at(20),
            x_char_size: raw[22],
            y_char_size: raw[23],
            number_of_planes: raw[24],
            bits_per_pixel: raw[25],
            number_of_banks: raw[26],
            memory_model: MemoryModel::from_raw(raw[27]),
            bank_size: raw[28],
            number_of_image_pages: raw[29],
            reserved_page_fn: raw[30],
            red: field(31),
            green: field(33),
            blue: field(35),
            rsvd: field(37),
            direct_color_mode_info: raw[39],
            reserved,
        }
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0..2].copy_from_slice(&self.mode_attributes.bits().to_le_bytes());
        out[2] = self.win_a_attributes.bits();
        out[3] = self.win_b_attributes.bits();
        out[4..6].copy_from_slice(&self.win_granularity.to_le_bytes());
        out[6..8].copy_from_slice(&self.win_size.to_le_bytes());
        out[8..10].copy_from_slice(&self.win_a_segment.to_le_bytes());
        out[10..12].copy_from_slice(&self.win_b_segment.to_le_bytes());
        out[12..16].copy_from_slice(&self.win_func_ptr.to_far().to_le_bytes());
        out[16..18].copy_from_slice(&self.bytes_per_scan_line.to_le_bytes());
        out[18..20].copy_from_slice(&self.x_resolution.to_le_bytes());
        out[20..22].copy_from_slice(&self.y_resolution.to_le_bytes());
        out[22] = self.x_char_size;
        out[23] = self.y_char_size;
        out[24] = self.number_of_planes;
        out[25] = self.bits_per_pixel;
        out[26] = self.number_of_banks;
        out[27] = self.memory_model.raw();
        out[28] = self.bank_size;
        out[29] = self.number_of_image_pages;
        out[30] = self.reserved_page_fn;
        for (off, field) in [(31, self.red), (33, self.green), (35, self.blue), (37, self.rsvd)] {
            out[off] = field.mask_size;
            out[off + 1] = field.field_position;
        }
        out[39] = self.direct_color_mode_info;
        out[Self::RESERVED_OFFSET..].copy_from_slice(&self.reserved);
        out
    }

    pub fn is_supported(&self) -> bool {
        self.mode_attributes.contains(ModeAttributes::SUPPORTED)
    }

    pub fn is_graphics(&self) -> bool {
        self.mode_attributes.contains(ModeAttributes::GRAPHICS)
    }

    pub fn has_linear_framebuffer(&self) -> bool {
        self.mode_attributes
            .contains(ModeAttributes::LINEAR_FRAMEBUFFER)
            && self.phys_base_ptr() != 0
    }

    /// VBE 2.0 `PhysBasePtr`; zero on VBE 1.2 firmware.
    pub fn phys_base_ptr(&self) -> u32 {
        u32::from_le_bytes([
            self.reserved[0],
            self.reserved[1],
            self.reserved[2],
            self.reserved[3],
        ])
    }

    pub fn window_bytes(&self) -> u32 {
        u32::from(self.win_size) * 1024
    }

    pub fn granularity_bytes(&self) -> u32 {
        u32::from(self.win_granularity) * 1024
    }

    pub fn framebuffer_bytes(&self) -> u32 {
        u32::from(self.bytes_per_scan_line) * u32::from(self.y_resolution)
    }
}

/// Builds a packed-pixel 8bpp descriptor with a 64KiB writable window at `A000`.
///
/// Used for legacy VGA modes, which have no firmware-reported descriptor.
pub(crate) fn packed_8bpp(width: u16, height: u16) -> ModeInfo {
    ModeInfo {
        mode_attributes: ModeAttributes::SUPPORTED
            | ModeAttributes::OPTIONAL_INFO
            | ModeAttributes::COLOR
            | ModeAttributes::GRAPHICS,
        win_a_attributes: WindowAttributes::all(),
        win_b_attributes: WindowAttributes::empty(),
        win_granularity: 64,
        win_size: 64,
        win_a_segment: 0xA000,
        win_b_segment: 0,
        win_func_ptr: RealPtr::default(),
        bytes_per_scan_line: width,
        x_resolution: width,
        y_resolution: height,
        x_char_size: 8,
        y_char_size: 8,
        number_of_planes: 1,
        bits_per_pixel: 8,
        number_of_banks: 1,
        memory_model: MemoryModel::PackedPixel,
        bank_size: 0,
        number_of_image_pages: 0,
        reserved_page_fn: 1,
        red: ColorField::default(),
        green: ColorField::default(),
        blue: ColorField::default(),
        rsvd: ColorField::default(),
        direct_color_mode_info: 0,
        reserved: [0; RESERVED_LEN],
    }
}

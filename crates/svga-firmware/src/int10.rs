use svga_realmode::{real_addr, RealPtr, RmRegs};
use tracing::trace;

use crate::{
    memory::{MemoryBus, VecMemory},
    vbe::{VbeDevice, VBE_BANK_WINDOW_BASE, VBE_BANK_WINDOW_SIZE, VBE_LFB_BASE, VBE_VRAM_SIZE},
};

const VBE_SUCCESS: u16 = 0x004F;
const VBE_FAIL: u16 = 0x014F;

/// Conventional memory plus the HMA.
pub const CONVENTIONAL_SIZE: usize = 0x0011_0000;

/// Legacy VGA modes accepted by INT 10h AH=00h.
const LEGACY_MODES: &[u8] = &[0x03, 0x13];

/// Physical memory and video BIOS state of the simulated machine.
///
/// The 64KiB window at `A0000` is routed to the selected VRAM bank while a VBE
/// mode is active, and the linear framebuffer is routed to VRAM at
/// [`VBE_LFB_BASE`].
#[derive(Debug, Clone)]
pub struct Firmware {
    ram: VecMemory,
    pub vbe: VbeDevice,
    video_mode: u8,
}

impl Default for Firmware {
    fn default() -> Self {
        Self::new(VbeDevice::default())
    }
}

impl MemoryBus for Firmware {
    fn read_u8(&self, addr: u32) -> u8 {
        if let Some(offset) = self.vram_offset(addr) {
            return self.vbe.vram_read(offset);
        }
        self.ram.read_u8(addr)
    }

    fn write_u8(&mut self, addr: u32, value: u8) {
        if let Some(offset) = self.vram_offset(addr) {
            self.vbe.vram_write(offset, value);
            return;
        }
        self.ram.write_u8(addr, value);
    }
}

impl Firmware {
    pub fn new(vbe: VbeDevice) -> Self {
        Self {
            ram: VecMemory::new(CONVENTIONAL_SIZE),
            vbe,
            video_mode: 0x03,
        }
    }

    pub fn video_mode(&self) -> u8 {
        self.video_mode
    }

    pub fn ram(&self) -> &VecMemory {
        &self.ram
    }

    /// VRAM offset backing physical `addr`, if any.
    pub fn vram_offset(&self, addr: u32) -> Option<u32> {
        if (VBE_LFB_BASE..VBE_LFB_BASE + VBE_VRAM_SIZE).contains(&addr) {
            return Some(addr - VBE_LFB_BASE);
        }
        let window = VBE_BANK_WINDOW_BASE..VBE_BANK_WINDOW_BASE + VBE_BANK_WINDOW_SIZE;
        if self.vbe.current_mode.is_some() && window.contains(&addr) {
            return Some(self.vbe.bank_offset(addr - VBE_BANK_WINDOW_BASE));
        }
        None
    }

    /// Whether `[addr, addr + len)` is backed by RAM or VRAM.
    pub fn is_mapped(&self, addr: u32, len: usize) -> bool {
        if self.ram.contains(addr, len) {
            return true;
        }
        let Some(end) = (addr as u64).checked_add(len as u64) else {
            return false;
        };
        addr >= VBE_LFB_BASE && end <= u64::from(VBE_LFB_BASE) + u64::from(VBE_VRAM_SIZE)
    }

    pub fn handle_int10(&mut self, regs: &mut RmRegs) {
        trace!(ax = regs.ax(), bx = regs.bx(), cx = regs.cx(), "INT 10h");
        if regs.ah() == 0x4F {
            self.handle_int10_vbe(regs);
            return;
        }
        match regs.ah() {
            0x00 => {
                let mode = regs.al() & 0x7F;
                if LEGACY_MODES.contains(&mode) {
                    self.vbe.clear_mode();
                    self.video_mode = mode;
                    regs.set_al(if mode == 0x13 { 0x20 } else { 0x30 });
                }
            }
            0x0F => {
                let columns = if self.video_mode == 0x13 { 40 } else { 80 };
                regs.set_al(self.video_mode);
                regs.set_ah(columns);
                regs.set_bh(0);
            }
            _ => {}
        }
    }

    fn handle_int10_vbe(&mut self, regs: &mut RmRegs) {
        match regs.ax() {
            0x4F00 => {
                let dest = RealPtr::new(regs.es(), regs.di());
                let info = self.vbe.controller_info(dest);
                self.write_bytes(dest.phys(), &info);
                vbe_success(regs);
            }
            0x4F01 => {
                let dest = real_addr(regs.es(), regs.di());
                match self.vbe.mode_info(regs.cx()) {
                    Some(info) => {
                        self.write_bytes(dest, &info);
                        vbe_success(regs);
                    }
                    None => vbe_failure(regs),
                }
            }
            0x4F02 => {
                if self.vbe.set_mode(regs.bx()) {
                    // Many BIOSes report "VESA mode active" through the BDA video
                    // mode byte.
                    self.video_mode = 0x6F;
                    vbe_success(regs);
                } else {
                    vbe_failure(regs);
                }
            }
            0x4F03 => {
                let mut mode = self.vbe.current_mode.unwrap_or(u16::from(self.video_mode));
                if self.vbe.lfb_enabled {
                    mode |= 0x4000;
                }
                regs.set_bx(mode);
                vbe_success(regs);
            }
            0x4F05 => {
                // BH: window (0 = A), BL: 0 = set, 1 = get.
                if regs.bh() != 0 {
                    vbe_failure(regs);
                    return;
                }
                match regs.bl() {
                    0x00 => match self.vbe.max_bank() {
                        Some(max) if regs.dx() <= max && !self.vbe.lfb_enabled => {
                            self.vbe.bank = regs.dx();
                            vbe_success(regs);
                        }
                        _ => vbe_failure(regs),
                    },
                    0x01 => {
                        regs.set_dx(self.vbe.bank);
                        vbe_success(regs);
                    }
                    _ => vbe_failure(regs),
                }
            }
            _ => vbe_failure(regs),
        }
    }
}

fn vbe_success(regs: &mut RmRegs) {
    regs.set_ax(VBE_SUCCESS);
    regs.set_carry(false);
}

fn vbe_failure(regs: &mut RmRegs) {
    regs.set_ax(VBE_FAIL);
    regs.set_carry(true);
}

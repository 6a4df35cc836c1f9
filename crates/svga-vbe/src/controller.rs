//! Controller information (VBE function 4F00h).

use svga_realmode::{ConventionalMemory, InterruptInvoker, RealPtr, RmRegs};
use tracing::debug;

use crate::{
    error::{Result, VideoError},
    query::{read_c_string, vbe_call},
};

const VBE_INFO_BLOCK_LEN: usize = 512;
const MODE_LIST_END: u16 = 0xFFFF;
const MAX_MODES: usize = 256;
const MAX_OEM_STRING: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerInfo {
    /// BCD, e.g. `0x0200` for VBE 2.0.
    pub version: u16,
    pub oem_string: String,
    pub capabilities: u32,
    pub total_memory_kb: u32,
    pub modes: Vec<u16>,
}

impl ControllerInfo {
    pub fn is_vbe2(&self) -> bool {
        self.version >= 0x0200
    }
}

/// Reads the adapter's VbeInfoBlock and its mode list.
///
/// The block is requested with a "VBE2" signature so VBE 2.0 firmware fills in
/// its extended fields. The mode list is copied out before returning because
/// firmware may place it inside the transfer buffer.
pub fn get_controller_info<S>(svc: &mut S) -> Result<ControllerInfo>
where
    S: InterruptInvoker + ConventionalMemory + ?Sized,
{
    let buffer = svc.transfer_buffer();
    let mut seed = [0u8; VBE_INFO_BLOCK_LEN];
    seed[0..4].copy_from_slice(b"VBE2");
    svc.write_real(buffer, &seed)?;

    let mut regs = RmRegs::new();
    regs.set_ax(0x4F00);
    regs.set_es(buffer.segment);
    regs.set_di(buffer.offset);
    vbe_call(svc, &mut regs)?;

    let mut raw = [0u8; VBE_INFO_BLOCK_LEN];
    svc.read_real(buffer, &mut raw)?;
    if &raw[0..4] != b"VESA" {
        return Err(VideoError::InvalidControllerInfo("missing VESA signature"));
    }

    let u16_at = |off: usize| u16::from_le_bytes([raw[off], raw[off + 1]]);
    let u32_at =
        |off: usize| u32::from_le_bytes([raw[off], raw[off + 1], raw[off + 2], raw[off + 3]]);

    let oem_ptr = RealPtr::from_far(u32_at(6));
    let oem_string = if oem_ptr.is_null() {
        String::new()
    } else {
        read_c_string(&*svc, oem_ptr, MAX_OEM_STRING)?
    };

    let list = RealPtr::from_far(u32_at(14));
    if list.is_null() {
        return Err(VideoError::InvalidControllerInfo("null mode list pointer"));
    }
    let modes = read_mode_list(&*svc, list)?;

    let info = ControllerInfo {
        version: u16_at(4),
        oem_string,
        capabilities: u32_at(10),
        total_memory_kb: u32::from(u16_at(18)) * 64,
        modes,
    };
    debug!(
        version = info.version,
        oem = %info.oem_string,
        modes = info.modes.len(),
        "read controller info"
    );
    Ok(info)
}

fn read_mode_list<M>(mem: &M, list: RealPtr) -> Result<Vec<u16>>
where
    M: ConventionalMemory + ?Sized,
{
    let mut modes = Vec::new();
    let mut raw = [0u8; 2];
    for i in 0..MAX_MODES {
        mem.read_real(list.wrapping_add((i * 2) as u16), &mut raw)?;
        let mode = u16::from_le_bytes(raw);
        if mode == MODE_LIST_END {
            break;
        }
        modes.push(mode);
    }
    Ok(modes)
}

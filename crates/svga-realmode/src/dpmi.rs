//! DPMI 0.9 host services (INT 31h) for 32-bit flat-model DOS extenders.
//!
//! Assumes a flat model where DS and ES share one base and limit, which every
//! mainstream extender (DOS/4GW, PMODE/W, DOS32A) provides.

use core::arch::asm;

use tracing::debug;

use crate::{
    AddressTranslator, ConventionalMemory, DispatchError, InterruptInvoker, LinearAddr, RealPtr,
    RmRegs, TRANSFER_BUFFER_LEN,
};

const DPMI_GET_SEGMENT_BASE: u32 = 0x0006;
const DPMI_ALLOC_DOS_MEMORY: u32 = 0x0100;
const DPMI_FREE_DOS_MEMORY: u32 = 0x0101;
const DPMI_SIMULATE_REAL_MODE_INT: u32 = 0x0300;
const DPMI_PHYSICAL_ADDRESS_MAPPING: u32 = 0x0800;

const CONVENTIONAL_LIMIT: u32 = 0x0011_0000;

/// DPMI-backed real-mode services.
///
/// Owns a DOS memory block used as the firmware transfer buffer; the block is
/// released on drop.
#[derive(Debug)]
pub struct DpmiHost {
    ds_base: u32,
    buffer_segment: u16,
    buffer_selector: u16,
}

impl DpmiHost {
    pub fn new() -> Result<Self, DispatchError> {
        let ds_base = segment_base(current_ds())?;
        let paragraphs = TRANSFER_BUFFER_LEN.div_ceil(16) as u16;
        let (buffer_segment, buffer_selector) = alloc_dos_memory(paragraphs)?;
        debug!(
            ds_base,
            buffer_segment, buffer_selector, "DPMI host initialized"
        );
        Ok(Self {
            ds_base,
            buffer_segment,
            buffer_selector,
        })
    }

    fn checked_linear(&self, ptr: RealPtr, len: usize) -> Result<LinearAddr, DispatchError> {
        let end = ptr.phys() as usize + len;
        if end > CONVENTIONAL_LIMIT as usize {
            return Err(DispatchError::OutOfBounds { ptr, len });
        }
        self.real_to_linear(ptr)
            .ok_or(DispatchError::OutOfBounds { ptr, len })
    }
}

impl Drop for DpmiHost {
    fn drop(&mut self) {
        let mut ax = DPMI_FREE_DOS_MEMORY;
        let carry: u8;
        // SAFETY: frees the block allocated in `new`; no borrowed views outlive `self`.
        unsafe {
            asm!(
                "int 0x31",
                "setc {cf}",
                cf = out(reg_byte) carry,
                inout("eax") ax,
                in("edx") self.buffer_selector as u32,
            );
        }
        if carry != 0 {
            let code = ax as u16;
            debug!(code, "DPMI free DOS memory failed");
        }
    }
}

impl InterruptInvoker for DpmiHost {
    fn rmint(&mut self, vector: u8, regs: &mut RmRegs) -> Result<(), DispatchError> {
        let mut ax = DPMI_SIMULATE_REAL_MODE_INT;
        let carry: u8;
        let regs_ptr = regs.as_bytes_mut().as_mut_ptr();
        // SAFETY: ES:EDI addresses `regs`, a live 0x32-byte call structure. BH=0 and
        // CX=0 request no stack copy; the host writes the structure back in place.
        unsafe {
            asm!(
                "push es",
                "push ds",
                "pop es",
                "int 0x31",
                "setc {cf}",
                "pop es",
                cf = out(reg_byte) carry,
                inout("eax") ax,
                in("ebx") vector as u32,
                in("ecx") 0u32,
                in("edi") regs_ptr,
            );
        }
        if carry != 0 {
            return Err(DispatchError::Rejected { code: ax as u16 });
        }
        Ok(())
    }
}

impl AddressTranslator for DpmiHost {
    fn real_to_linear(&self, ptr: RealPtr) -> Option<LinearAddr> {
        ptr.phys()
            .checked_sub(self.ds_base)
            .map(|linear| LinearAddr(linear as usize))
    }

    fn physical_to_linear(&self, phys: u32, len: u32) -> Option<LinearAddr> {
        let linear = map_physical(phys, len).ok()?;
        linear
            .checked_sub(self.ds_base)
            .map(|linear| LinearAddr(linear as usize))
    }
}

impl ConventionalMemory for DpmiHost {
    fn transfer_buffer(&self) -> RealPtr {
        RealPtr::new(self.buffer_segment, 0)
    }

    fn read_real(&self, ptr: RealPtr, buf: &mut [u8]) -> Result<(), DispatchError> {
        let src = self.checked_linear(ptr, buf.len())?;
        // SAFETY: the range lies below 1 MiB, which the extender maps through DS.
        unsafe {
            core::ptr::copy_nonoverlapping(src.as_ptr(), buf.as_mut_ptr(), buf.len());
        }
        Ok(())
    }

    fn write_real(&mut self, ptr: RealPtr, bytes: &[u8]) -> Result<(), DispatchError> {
        let dst = self.checked_linear(ptr, bytes.len())?;
        // SAFETY: see `read_real`.
        unsafe {
            core::ptr::copy_nonoverlapping(bytes.as_ptr(), dst.as_mut_ptr(), bytes.len());
        }
        Ok(())
    }
}

fn current_ds() -> u16 {
    let ds: u32;
    // SAFETY: reading a segment register has no side effects.
    unsafe {
        asm!("mov {0:e}, ds", out(reg) ds, options(nomem, nostack, preserves_flags));
    }
    ds as u16
}

fn segment_base(selector: u16) -> Result<u32, DispatchError> {
    let mut ax = DPMI_GET_SEGMENT_BASE;
    let hi: u32;
    let lo: u32;
    let carry: u8;
    // SAFETY: AX=0006h only reads the descriptor of `selector`.
    unsafe {
        asm!(
            "int 0x31",
            "setc {cf}",
            cf = out(reg_byte) carry,
            inout("eax") ax,
            in("ebx") selector as u32,
            out("ecx") hi,
            out("edx") lo,
        );
    }
    if carry != 0 {
        return Err(DispatchError::Rejected { code: ax as u16 });
    }
    Ok(((hi & 0xFFFF) << 16) | (lo & 0xFFFF))
}

fn alloc_dos_memory(paragraphs: u16) -> Result<(u16, u16), DispatchError> {
    let mut ax = DPMI_ALLOC_DOS_MEMORY;
    let dx: u32;
    let carry: u8;
    // SAFETY: AX=0100h allocates conventional memory and returns segment/selector.
    unsafe {
        asm!(
            "int 0x31",
            "setc {cf}",
            cf = out(reg_byte) carry,
            inout("eax") ax,
            inout("ebx") paragraphs as u32 => _,
            out("edx") dx,
        );
    }
    if carry != 0 {
        return Err(DispatchError::Rejected { code: ax as u16 });
    }
    Ok((ax as u16, dx as u16))
}

fn map_physical(phys: u32, len: u32) -> Result<u32, DispatchError> {
    let mut ax = DPMI_PHYSICAL_ADDRESS_MAPPING;
    let mut bx = phys >> 16;
    let mut cx = phys & 0xFFFF;
    let carry: u8;
    // SAFETY: AX=0800h creates a linear mapping for BX:CX of SI:DI bytes. ESI is
    // reserved for LLVM on x86, so it is saved and loaded inside the block.
    unsafe {
        asm!(
            "push esi",
            "mov esi, {size_hi:e}",
            "int 0x31",
            "setc {cf}",
            "pop esi",
            size_hi = in(reg) len >> 16,
            cf = out(reg_byte) carry,
            inout("eax") ax,
            inout("ebx") bx,
            inout("ecx") cx,
            in("edi") len & 0xFFFF,
        );
    }
    if carry != 0 {
        return Err(DispatchError::Rejected { code: ax as u16 });
    }
    Ok(((bx & 0xFFFF) << 16) | (cx & 0xFFFF))
}

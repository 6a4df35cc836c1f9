//! Simulated DPMI host backed by [`Firmware`].

use std::cell::Cell;

use svga_realmode::{
    AddressTranslator, ConventionalMemory, DispatchError, InterruptInvoker, LinearAddr, RealPtr,
    RmRegs,
};
use tracing::debug;

use crate::{
    int10::Firmware,
    memory::MemoryBus,
    vbe::{VbeDevice, VbeMode, VBE_MODES},
};

/// DPMI 1.0 error code 8001h, "unsupported function".
const DPMI_ERR_UNSUPPORTED: u16 = 0x8001;

/// Failure knobs for exercising caller error paths.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FaultPlan {
    /// Every `rmint` fails with [`DispatchError::Unavailable`].
    pub unavailable: bool,
    /// Every `rmint` fails with [`DispatchError::Rejected`].
    pub host_rejects: bool,
    /// INT 10h runs but every function reports failure.
    pub reject_all: bool,
    /// Mode-set requests (VBE 4F02h, legacy AH=00h) fail; queries still work.
    pub reject_set_mode: bool,
    /// `real_to_linear` has no mapping service.
    pub no_translation: bool,
    /// `physical_to_linear` cannot map memory above 1 MiB.
    pub no_physical_mapping: bool,
    /// 4F01h succeeds but clears the "supported" mode attribute.
    pub unsupported_modes: bool,
    /// 4F00h succeeds but the block lacks the "VESA" signature.
    pub bad_controller_signature: bool,
    /// 4F00h succeeds but the mode-list far pointer is null.
    pub null_mode_list: bool,
    /// The adapter has no linear framebuffer.
    pub no_linear_framebuffer: bool,
}

/// A real-mode host whose firmware is the in-process [`Firmware`] model.
///
/// Linear addresses follow the flat-model DPMI rule `linear = phys - ds_base`.
#[derive(Debug)]
pub struct SimDpmi {
    firmware: Firmware,
    faults: FaultPlan,
    ds_base: u32,
    transfer: RealPtr,
    int_calls: usize,
    translate_calls: Cell<usize>,
    call_log: Vec<(u8, u16)>,
}

impl Default for SimDpmi {
    fn default() -> Self {
        Self::new()
    }
}

impl SimDpmi {
    pub const DEFAULT_TRANSFER_BUFFER: RealPtr = RealPtr::new(0x2000, 0x0000);

    pub fn new() -> Self {
        Self::with_modes(VBE_MODES)
    }

    /// A host whose adapter only reports `modes`.
    pub fn with_modes(modes: &[VbeMode]) -> Self {
        Self {
            firmware: Firmware::new(VbeDevice::new(modes.to_vec())),
            faults: FaultPlan::default(),
            ds_base: 0,
            transfer: Self::DEFAULT_TRANSFER_BUFFER,
            int_calls: 0,
            translate_calls: Cell::new(0),
            call_log: Vec::new(),
        }
    }

    pub fn with_faults(mut self, faults: FaultPlan) -> Self {
        self.set_faults(faults);
        self
    }

    pub fn with_ds_base(mut self, ds_base: u32) -> Self {
        self.ds_base = ds_base;
        self
    }

    pub fn set_faults(&mut self, faults: FaultPlan) {
        self.faults = faults;
        self.firmware.vbe.lfb_supported = !faults.no_linear_framebuffer;
    }

    pub fn faults(&self) -> FaultPlan {
        self.faults
    }

    pub fn firmware(&self) -> &Firmware {
        &self.firmware
    }

    pub fn firmware_mut(&mut self) -> &mut Firmware {
        &mut self.firmware
    }

    pub fn int_calls(&self) -> usize {
        self.int_calls
    }

    pub fn translate_calls(&self) -> usize {
        self.translate_calls.get()
    }

    /// `(vector, AX on entry)` for every dispatched call.
    pub fn call_log(&self) -> &[(u8, u16)] {
        &self.call_log
    }

    /// Inverse of [`AddressTranslator::real_to_linear`]: the physical address a
    /// linear address refers to.
    pub fn linear_to_phys(&self, addr: LinearAddr) -> Option<u32> {
        u32::try_from(addr.get()).ok()?.checked_add(self.ds_base)
    }

    pub fn read_linear(&self, addr: LinearAddr) -> Option<u8> {
        let phys = self.linear_to_phys(addr)?;
        self.firmware
            .is_mapped(phys, 1)
            .then(|| self.firmware.read_u8(phys))
    }

    pub fn write_linear(&mut self, addr: LinearAddr, value: u8) -> bool {
        let Some(phys) = self.linear_to_phys(addr) else {
            return false;
        };
        if !self.firmware.is_mapped(phys, 1) {
            return false;
        }
        self.firmware.write_u8(phys, value);
        true
    }

    fn check_conventional(&self, ptr: RealPtr, len: usize) -> Result<(), DispatchError> {
        if self.firmware.ram().contains(ptr.phys(), len) {
            Ok(())
        } else {
            Err(DispatchError::OutOfBounds { ptr, len })
        }
    }

    /// Damages a successful 4F00h/4F01h response according to the fault plan.
    fn corrupt_response(&mut self, function: u16, dest: RealPtr) {
        let dest = dest.phys();
        match function {
            0x4F00 => {
                if self.faults.bad_controller_signature {
                    self.firmware.write_bytes(dest, b"VGA ");
                }
                if self.faults.null_mode_list {
                    self.firmware.write_bytes(dest + 14, &[0; 4]);
                }
            }
            0x4F01 if self.faults.unsupported_modes => {
                let attrs = self.firmware.read_u8(dest);
                self.firmware.write_u8(dest, attrs & !0x01);
            }
            _ => {}
        }
    }

    fn apply_faults(&self, regs: &mut RmRegs) -> bool {
        let is_set_mode = regs.ax() == 0x4F02 || regs.ah() == 0x00;
        if !(self.faults.reject_all || (self.faults.reject_set_mode && is_set_mode)) {
            return false;
        }
        if regs.ah() == 0x4F {
            regs.set_ax(0x014F);
            regs.set_carry(true);
        }
        true
    }
}

impl InterruptInvoker for SimDpmi {
    fn rmint(&mut self, vector: u8, regs: &mut RmRegs) -> Result<(), DispatchError> {
        if self.faults.unavailable {
            return Err(DispatchError::Unavailable);
        }
        if self.faults.host_rejects {
            return Err(DispatchError::Rejected {
                code: DPMI_ERR_UNSUPPORTED,
            });
        }
        self.int_calls += 1;
        self.call_log.push((vector, regs.ax()));

        if vector != 0x10 {
            debug!(vector, "no handler for real-mode vector; returning unchanged");
            return Ok(());
        }
        if self.apply_faults(regs) {
            debug!(ax = regs.ax(), "firmware call rejected by fault plan");
            return Ok(());
        }
        let function = regs.ax();
        self.firmware.handle_int10(regs);
        if regs.ax() == 0x004F {
            self.corrupt_response(function, RealPtr::new(regs.es(), regs.di()));
        }
        Ok(())
    }
}

impl AddressTranslator for SimDpmi {
    fn real_to_linear(&self, ptr: RealPtr) -> Option<LinearAddr> {
        self.translate_calls.set(self.translate_calls.get() + 1);
        if self.faults.no_translation {
            return None;
        }
        ptr.phys()
            .checked_sub(self.ds_base)
            .map(|linear| LinearAddr(linear as usize))
    }

    fn physical_to_linear(&self, phys: u32, len: u32) -> Option<LinearAddr> {
        self.translate_calls.set(self.translate_calls.get() + 1);
        if self.faults.no_translation
            || self.faults.no_physical_mapping
            || !self.firmware.is_mapped(phys, len as usize)
        {
            return None;
        }
        phys.checked_sub(self.ds_base)
            .map(|linear| LinearAddr(linear as usize))
    }
}

impl ConventionalMemory for SimDpmi {
    fn transfer_buffer(&self) -> RealPtr {
        self.transfer
    }

    fn read_real(&self, ptr: RealPtr, buf: &mut [u8]) -> Result<(), DispatchError> {
        self.check_conventional(ptr, buf.len())?;
        self.firmware.read_bytes(ptr.phys(), buf);
        Ok(())
    }

    fn write_real(&mut self, ptr: RealPtr, bytes: &[u8]) -> Result<(), DispatchError> {
        self.check_conventional(ptr, bytes.len())?;
        self.firmware.write_bytes(ptr.phys(), bytes);
        Ok(())
    }
}

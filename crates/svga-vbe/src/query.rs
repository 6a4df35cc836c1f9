//! Mode queries (VBE function 4F01h).

use svga_realmode::{
    AddressTranslator, ConventionalMemory, InterruptInvoker, LinearAddr, RealModeServices,
    RealPtr, RmRegs,
};
use tracing::{debug, trace};

use crate::{
    error::{Result, VideoError},
    mode_info::ModeInfo,
};

pub(crate) const VIDEO_VECTOR: u8 = 0x10;

/// AL=4Fh (function supported), AH=00h (call successful).
pub(crate) const VBE_STATUS_OK: u16 = 0x004F;

/// Issues a VBE function and checks the firmware status word.
pub(crate) fn vbe_call<S>(svc: &mut S, regs: &mut RmRegs) -> Result<()>
where
    S: InterruptInvoker + ?Sized,
{
    let function = regs.ax();
    trace!(function, bx = regs.bx(), cx = regs.cx(), dx = regs.dx(), "VBE call");
    svc.rmint(VIDEO_VECTOR, regs)?;
    let ax = regs.ax();
    if ax != VBE_STATUS_OK {
        debug!(function, ax, "VBE function failed");
        return Err(VideoError::FirmwareRejected { function, ax });
    }
    Ok(())
}

/// A queried mode with its bank windows mapped into the caller's address space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeDescription {
    pub mode: u16,
    pub info: ModeInfo,
    pub window_a: Option<LinearAddr>,
    pub window_b: Option<LinearAddr>,
}

/// Issues "describe mode" requests through an injected real-mode host.
pub struct ModeQuery<'a, S: ?Sized> {
    svc: &'a mut S,
}

impl<'a, S: RealModeServices + ?Sized> ModeQuery<'a, S> {
    pub fn new(svc: &'a mut S) -> Self {
        Self { svc }
    }

    /// Queries `mode` and resolves its window segments.
    ///
    /// The descriptor is only decoded once firmware reports success, so on any
    /// error nothing from the transfer buffer reaches the caller. A descriptor
    /// without the "supported" attribute is reported as
    /// [`VideoError::ModeNotSupported`].
    pub fn describe(&mut self, mode: u16) -> Result<ModeDescription> {
        let buffer = self.svc.transfer_buffer();
        self.svc.write_real(buffer, &[0u8; ModeInfo::SIZE])?;

        let mut regs = RmRegs::new();
        regs.set_ax(0x4F01);
        regs.set_cx(mode);
        regs.set_es(buffer.segment);
        regs.set_di(buffer.offset);
        vbe_call(&mut *self.svc, &mut regs)?;

        let mut raw = [0u8; ModeInfo::SIZE];
        self.svc.read_real(buffer, &mut raw)?;
        let info = ModeInfo::parse(&raw);
        if !info.is_supported() {
            return Err(VideoError::ModeNotSupported { mode });
        }

        let window_a = translate_window(&*self.svc, info.win_a_segment)?;
        let window_b = translate_window(&*self.svc, info.win_b_segment)?;
        debug!(
            mode,
            width = info.x_resolution,
            height = info.y_resolution,
            bpp = info.bits_per_pixel,
            "described mode"
        );
        Ok(ModeDescription {
            mode,
            info,
            window_a,
            window_b,
        })
    }
}

/// `vbe_GetModeInfo`: queries `mode` and resolves its window segments.
pub fn vbe_get_mode_info<S>(svc: &mut S, mode: u16) -> Result<ModeDescription>
where
    S: RealModeServices + ?Sized,
{
    ModeQuery::new(svc).describe(mode)
}

/// A zero segment means the window does not exist.
pub(crate) fn translate_window<T>(translator: &T, segment: u16) -> Result<Option<LinearAddr>>
where
    T: AddressTranslator + ?Sized,
{
    if segment == 0 {
        return Ok(None);
    }
    translator
        .real_to_linear(RealPtr::new(segment, 0))
        .map(Some)
        .ok_or(VideoError::Translation { segment })
}

/// Reads a NUL-terminated string of at most `max` bytes from conventional memory.
pub(crate) fn read_c_string<M>(mem: &M, ptr: RealPtr, max: usize) -> Result<String>
where
    M: ConventionalMemory + ?Sized,
{
    let mut out = Vec::new();
    let mut byte = [0u8; 1];
    for i in 0..max {
        mem.read_real(ptr.wrapping_add(i as u16), &mut byte)?;
        if byte[0] == 0 {
            break;
        }
        out.push(byte[0]);
    }
    Ok(String::from_utf8_lossy(&out).into_owned())
}

#[cfg(test)]
mod tests {
    use svga_firmware::{FaultPlan, SimDpmi};

    use super::*;

    #[test]
    fn describes_640x480x8_with_window_a() {
        let mut sim = SimDpmi::new().with_ds_base(0x1_0000);
        let desc = vbe_get_mode_info(&mut sim, 0x101).unwrap();
        assert_eq!(desc.info.x_resolution, 640);
        assert_eq!(desc.info.y_resolution, 480);
        assert_eq!(desc.info.bits_per_pixel, 8);
        assert_eq!(desc.window_a, Some(LinearAddr(0xA0000 - 0x1_0000)));
        assert_eq!(desc.window_b, None);
        // Window B has segment 0 and is never translated.
        assert_eq!(sim.translate_calls(), 1);
    }

    #[test]
    fn unknown_mode_is_firmware_rejected() {
        let mut sim = SimDpmi::new();
        let err = vbe_get_mode_info(&mut sim, 0x1FF).unwrap_err();
        assert_eq!(
            err,
            VideoError::FirmwareRejected {
                function: 0x4F01,
                ax: 0x014F
            }
        );
        assert_eq!(sim.translate_calls(), 0);
    }

    #[test]
    fn missing_translation_service_fails_query() {
        let mut sim = SimDpmi::new().with_faults(FaultPlan {
            no_translation: true,
            ..FaultPlan::default()
        });
        assert_eq!(
            vbe_get_mode_info(&mut sim, 0x101),
            Err(VideoError::Translation { segment: 0xA000 })
        );
    }

    #[test]
    fn unavailable_host_is_a_dispatch_failure() {
        let mut sim = SimDpmi::new().with_faults(FaultPlan {
            unavailable: true,
            ..FaultPlan::default()
        });
        assert!(matches!(
            vbe_get_mode_info(&mut sim, 0x101),
            Err(VideoError::Dispatch(_))
        ));
    }
}

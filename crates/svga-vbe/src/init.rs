//! Mode validation and activation with ordered fallback.

use core::fmt;

use svga_realmode::{InterruptInvoker, LinearAddr, RealModeServices, RmRegs};
use tracing::{debug, info, warn};

use crate::{
    error::{Result, VideoError},
    mode_info::{packed_8bpp, MemoryModel, ModeAttributes, ModeInfo, WindowAttributes},
    query::{translate_window, vbe_call, ModeDescription, ModeQuery, VIDEO_VECTOR},
};

/// Bit 14 of the 4F02h mode number: use the linear framebuffer.
const VBE_MODE_LINEAR: u16 = 1 << 14;

/// VGA 80x25 text, restored on shutdown.
pub const TEXT_MODE: u8 = 0x03;

/// VGA 320x200 with 256 colors.
pub const LEGACY_MODE_13H: u8 = 0x13;

pub const VBE_MODE_640X480X8: u16 = 0x101;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModeNumber {
    /// VESA BIOS Extensions mode, set with 4F02h.
    Vbe(u16),
    /// Standard VGA mode, set with INT 10h AH=00h.
    Legacy(u8),
}

impl ModeNumber {
    pub fn raw(self) -> u16 {
        match self {
            ModeNumber::Vbe(mode) => mode,
            ModeNumber::Legacy(mode) => u16::from(mode),
        }
    }
}

impl fmt::Display for ModeNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModeNumber::Vbe(mode) => write!(f, "VBE {mode:03X}h"),
            ModeNumber::Legacy(mode) => write!(f, "VGA {mode:02X}h"),
        }
    }
}

/// One entry of a fallback list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub mode: ModeNumber,
    pub width: u16,
    pub height: u16,
    pub bits_per_pixel: u8,
    /// Draw to a `width/2 x height/2` surface.
    pub half: bool,
    /// Ask for the linear framebuffer instead of the banked window.
    pub linear: bool,
}

impl Candidate {
    pub fn vesa(mode: u16, width: u16, height: u16, half: bool, linear: bool) -> Self {
        Self {
            mode: ModeNumber::Vbe(mode),
            width,
            height,
            bits_per_pixel: 8,
            half,
            linear,
        }
    }

    /// The linear and banked variants of one 8bpp VBE mode, preferred one first.
    pub fn vesa_pair(
        mode: u16,
        width: u16,
        height: u16,
        half: bool,
        prefer_linear: bool,
    ) -> [Self; 2] {
        let linear = Self::vesa(mode, width, height, half, true);
        let banked = Self::vesa(mode, width, height, half, false);
        if prefer_linear {
            [linear, banked]
        } else {
            [banked, linear]
        }
    }

    pub fn legacy_13h() -> Self {
        Self {
            mode: ModeNumber::Legacy(LEGACY_MODE_13H),
            width: 320,
            height: 200,
            bits_per_pixel: 8,
            half: false,
            linear: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InitState {
    Uninitialized,
    Querying,
    Validating,
    Activating,
    Active,
    Failed,
}

/// Screen rectangle in inclusive pixel coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Rect {
    pub ulx: i32,
    pub uly: i32,
    pub lrx: i32,
    pub lry: i32,
}

impl Rect {
    pub fn new(ulx: i32, uly: i32, lrx: i32, lry: i32) -> Self {
        Self { ulx, uly, lrx, lry }
    }

    pub fn width(&self) -> i32 {
        self.lrx - self.ulx + 1
    }

    pub fn height(&self) -> i32 {
        self.lry - self.uly + 1
    }
}

/// A display mode that has been set and whose memory is reachable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveMode {
    pub mode: ModeNumber,
    pub width: u16,
    pub height: u16,
    pub bits_per_pixel: u8,
    pub pitch: u16,
    pub linear: bool,
    pub half: bool,
    pub window_a: Option<LinearAddr>,
    pub window_b: Option<LinearAddr>,
    /// Mapped linear framebuffer; `None` for banked modes.
    pub framebuffer: Option<LinearAddr>,
    /// Bytes visible through one bank window.
    pub window_size: u32,
    /// Bytes between consecutive bank positions.
    pub granularity: u32,
    /// Drawing surface, halved when `half` is set.
    pub screen: Rect,
    pub info: ModeInfo,
}

impl ActiveMode {
    /// Address drawing code writes to: the framebuffer or window A.
    pub fn surface(&self) -> Option<LinearAddr> {
        self.framebuffer.or(self.window_a)
    }

    /// Splits a framebuffer byte offset into `(bank, offset within window)`.
    ///
    /// Offsets at or past the end of the framebuffer are rejected.
    pub fn bank_for(&self, offset: u32) -> Result<(u16, u32)> {
        let len = self.info.framebuffer_bytes();
        if offset >= len {
            return Err(VideoError::FramebufferOffset { offset, len });
        }
        if self.linear || self.granularity == 0 {
            return Ok((0, offset));
        }
        let bank = u16::try_from(offset / self.granularity)
            .map_err(|_| VideoError::FramebufferOffset { offset, len })?;
        Ok((bank, offset % self.granularity))
    }

    /// Positions bank window `window` (0 = A, 1 = B) at `bank` granularity units.
    ///
    /// Linear modes have no windows to move and return immediately.
    pub fn set_bank<S>(&self, svc: &mut S, window: u8, bank: u16) -> Result<()>
    where
        S: InterruptInvoker + ?Sized,
    {
        if self.linear {
            return Ok(());
        }
        if let ModeNumber::Legacy(mode) = self.mode {
            return if bank == 0 && window == 0 {
                Ok(())
            } else {
                Err(VideoError::Mismatch {
                    mode: u16::from(mode),
                    reason: "legacy mode has a single fixed window",
                })
            };
        }
        let mut regs = RmRegs::new();
        regs.set_ax(0x4F05);
        regs.set_bh(window);
        regs.set_bl(0x00);
        regs.set_dx(bank);
        vbe_call(svc, &mut regs)
    }
}

/// Drives candidates through query, validation and activation.
///
/// A failed candidate is logged and recorded, and the next one is tried. Only an
/// exhausted list ends in [`InitState::Failed`].
pub struct ModeInitializer<S> {
    svc: S,
    prefer_linear: bool,
    state: InitState,
    history: Vec<InitState>,
    rejections: Vec<(Candidate, VideoError)>,
}

impl<S: RealModeServices> ModeInitializer<S> {
    pub fn new(svc: S) -> Self {
        Self {
            svc,
            prefer_linear: true,
            state: InitState::Uninitialized,
            history: vec![InitState::Uninitialized],
            rejections: Vec::new(),
        }
    }

    pub fn with_prefer_linear(mut self, prefer_linear: bool) -> Self {
        self.prefer_linear = prefer_linear;
        self
    }

    pub fn state(&self) -> InitState {
        self.state
    }

    /// Every state entered during the last run, starting with `Uninitialized`.
    pub fn history(&self) -> &[InitState] {
        &self.history
    }

    /// Candidates that failed during the last run and why.
    pub fn rejections(&self) -> &[(Candidate, VideoError)] {
        &self.rejections
    }

    pub fn services(&mut self) -> &mut S {
        &mut self.svc
    }

    pub fn into_inner(self) -> S {
        self.svc
    }

    /// `init_vesa_mode`: tries `mode` at the given geometry, linear then banked.
    pub fn init_vesa_mode(
        &mut self,
        mode: u16,
        width: u16,
        height: u16,
        half: bool,
    ) -> Result<ActiveMode> {
        let candidates = Candidate::vesa_pair(mode, width, height, half, self.prefer_linear);
        self.run(&candidates)
    }

    /// `init_mode_640_480`: 640x480x8 at full size.
    pub fn init_mode_640_480(&mut self) -> Result<ActiveMode> {
        self.init_vesa_mode(VBE_MODE_640X480X8, 640, 480, false)
    }

    /// Runs `candidates` in order until one becomes active.
    pub fn run(&mut self, candidates: &[Candidate]) -> Result<ActiveMode> {
        self.state = InitState::Uninitialized;
        self.history.clear();
        self.history.push(InitState::Uninitialized);
        self.rejections.clear();

        for candidate in candidates {
            match self.try_candidate(candidate) {
                Ok(active) => {
                    self.transition(InitState::Active);
                    info!(
                        mode = %active.mode,
                        width = active.width,
                        height = active.height,
                        linear = active.linear,
                        "display mode active"
                    );
                    return Ok(active);
                }
                Err(err) if err.is_retryable_with_next_candidate() => {
                    warn!(
                        mode = %candidate.mode,
                        linear = candidate.linear,
                        error = %err,
                        "candidate rejected"
                    );
                    self.rejections.push((*candidate, err));
                }
                Err(err) => {
                    self.transition(InitState::Failed);
                    return Err(err);
                }
            }
        }

        self.transition(InitState::Failed);
        Err(VideoError::Exhausted {
            attempts: candidates.len(),
        })
    }

    fn transition(&mut self, next: InitState) {
        debug!(from = ?self.state, to = ?next, "mode initializer");
        self.state = next;
        self.history.push(next);
    }

    fn try_candidate(&mut self, candidate: &Candidate) -> Result<ActiveMode> {
        self.transition(InitState::Querying);
        let description = match candidate.mode {
            ModeNumber::Vbe(mode) => ModeQuery::new(&mut self.svc).describe(mode)?,
            ModeNumber::Legacy(mode) => legacy_description(mode)?,
        };

        self.transition(InitState::Validating);
        validate(candidate, &description.info)?;

        self.transition(InitState::Activating);
        match candidate.mode {
            ModeNumber::Vbe(mode) => self.activate_vbe(mode, candidate, description),
            ModeNumber::Legacy(mode) => self.activate_legacy(mode, candidate, description),
        }
    }

    fn activate_vbe(
        &mut self,
        mode: u16,
        candidate: &Candidate,
        description: ModeDescription,
    ) -> Result<ActiveMode> {
        // Map before switching so a failed mapping leaves the adapter untouched.
        let framebuffer = if candidate.linear {
            let phys = description.info.phys_base_ptr();
            let len = description.info.framebuffer_bytes();
            let mapped = self
                .svc
                .physical_to_linear(phys, len)
                .ok_or(VideoError::FramebufferMapping { phys })?;
            Some(mapped)
        } else {
            None
        };

        let mut regs = RmRegs::new();
        regs.set_ax(0x4F02);
        regs.set_bx(if candidate.linear {
            mode | VBE_MODE_LINEAR
        } else {
            mode
        });
        vbe_call(&mut self.svc, &mut regs).map_err(|err| match err {
            VideoError::FirmwareRejected { ax, .. } => VideoError::Activation { mode, ax },
            other => other,
        })?;

        Ok(active_mode(
            candidate,
            description.info,
            description.window_a,
            description.window_b,
            framebuffer,
        ))
    }

    fn activate_legacy(
        &mut self,
        mode: u8,
        candidate: &Candidate,
        description: ModeDescription,
    ) -> Result<ActiveMode> {
        set_legacy_mode(&mut self.svc, mode)?;
        let window_a = match translate_window(&self.svc, description.info.win_a_segment) {
            Ok(window) => window,
            Err(err) => {
                if let Err(reset_err) = reset_mode(&mut self.svc) {
                    warn!(mode, error = %reset_err, "could not restore text mode");
                }
                return Err(err);
            }
        };
        Ok(active_mode(candidate, description.info, window_a, None, None))
    }
}

/// Sets a VGA mode with AH=00h and confirms it with AH=0Fh.
///
/// AH=00h has no status of its own; the mode read back is the confirmation.
fn set_legacy_mode<S>(svc: &mut S, mode: u8) -> Result<()>
where
    S: InterruptInvoker + ?Sized,
{
    let mut regs = RmRegs::new();
    regs.set_ah(0x00);
    regs.set_al(mode);
    svc.rmint(VIDEO_VECTOR, &mut regs)?;

    regs.clear();
    regs.set_ah(0x0F);
    svc.rmint(VIDEO_VECTOR, &mut regs)?;
    if regs.al() & 0x7F != mode {
        return Err(VideoError::Activation {
            mode: u16::from(mode),
            ax: regs.ax(),
        });
    }
    Ok(())
}

/// Restores VGA text mode.
pub fn reset_mode<S>(svc: &mut S) -> Result<()>
where
    S: InterruptInvoker + ?Sized,
{
    debug!("restoring text mode");
    set_legacy_mode(svc, TEXT_MODE)
}

fn legacy_description(mode: u8) -> Result<ModeDescription> {
    match mode {
        LEGACY_MODE_13H => Ok(ModeDescription {
            mode: u16::from(mode),
            info: packed_8bpp(320, 200),
            window_a: None,
            window_b: None,
        }),
        _ => Err(VideoError::ModeNotSupported {
            mode: u16::from(mode),
        }),
    }
}

fn validate(candidate: &Candidate, info: &ModeInfo) -> Result<()> {
    let mode = candidate.mode.raw();
    let reject = |reason| Err(VideoError::Mismatch { mode, reason });

    if info.x_resolution != candidate.width || info.y_resolution != candidate.height {
        return reject("resolution differs from request");
    }
    if info.bits_per_pixel != candidate.bits_per_pixel {
        return reject("bits per pixel differ from request");
    }
    if !info.is_graphics() {
        return reject("not a graphics mode");
    }
    let expected_model = if candidate.bits_per_pixel <= 8 {
        MemoryModel::PackedPixel
    } else {
        MemoryModel::DirectColor
    };
    if info.memory_model != expected_model {
        return reject("unexpected memory model");
    }
    if candidate.half && (candidate.width % 2 != 0 || candidate.height % 2 != 0) {
        return reject("odd resolution cannot be halved");
    }

    if candidate.linear {
        if !info.has_linear_framebuffer() {
            return reject("no linear framebuffer");
        }
    } else {
        let window = WindowAttributes::EXISTS | WindowAttributes::WRITABLE;
        if info.mode_attributes.contains(ModeAttributes::NO_WINDOWED_MEMORY)
            || !info.win_a_attributes.contains(window)
            || info.win_a_segment == 0
        {
            return reject("no writable bank window");
        }
    }
    Ok(())
}

fn active_mode(
    candidate: &Candidate,
    info: ModeInfo,
    window_a: Option<LinearAddr>,
    window_b: Option<LinearAddr>,
    framebuffer: Option<LinearAddr>,
) -> ActiveMode {
    let (w, h) = if candidate.half {
        (i32::from(info.x_resolution) / 2, i32::from(info.y_resolution) / 2)
    } else {
        (i32::from(info.x_resolution), i32::from(info.y_resolution))
    };
    ActiveMode {
        mode: candidate.mode,
        width: info.x_resolution,
        height: info.y_resolution,
        bits_per_pixel: info.bits_per_pixel,
        pitch: info.bytes_per_scan_line,
        linear: candidate.linear,
        half: candidate.half,
        window_a,
        window_b,
        framebuffer,
        window_size: info.window_bytes(),
        granularity: info.granularity_bytes(),
        screen: Rect::new(0, 0, w - 1, h - 1),
        info,
    }
}

#[cfg(test)]
mod tests {
    use svga_realmode::{AddressTranslator, ConventionalMemory, DispatchError, RealPtr};

    use super::*;

    type HostResult = core::result::Result<(), DispatchError>;

    const LFB: u32 = 0xD000_0000;

    /// Firmware that accepts every call and describes every mode with one
    /// fixed geometry.
    struct AlwaysOk {
        width: u16,
        height: u16,
        buffer: [u8; 512],
        calls: Vec<u16>,
    }

    impl AlwaysOk {
        fn new(width: u16, height: u16) -> Self {
            Self {
                width,
                height,
                buffer: [0; 512],
                calls: Vec::new(),
            }
        }

        fn descriptor(&self) -> [u8; 256] {
            let mut info = packed_8bpp(self.width, self.height);
            info.mode_attributes |= ModeAttributes::LINEAR_FRAMEBUFFER;
            info.reserved[0..4].copy_from_slice(&LFB.to_le_bytes());
            info.to_bytes()
        }
    }

    impl InterruptInvoker for AlwaysOk {
        fn rmint(&mut self, _vector: u8, regs: &mut RmRegs) -> HostResult {
            self.calls.push(regs.ax());
            if regs.ax() == 0x4F01 {
                let info = self.descriptor();
                self.buffer[..256].copy_from_slice(&info);
            }
            regs.set_ax(0x004F);
            Ok(())
        }
    }

    impl AddressTranslator for AlwaysOk {
        fn real_to_linear(&self, ptr: RealPtr) -> Option<LinearAddr> {
            Some(LinearAddr(ptr.phys() as usize))
        }

        fn physical_to_linear(&self, phys: u32, _len: u32) -> Option<LinearAddr> {
            Some(LinearAddr(phys as usize))
        }
    }

    impl ConventionalMemory for AlwaysOk {
        fn transfer_buffer(&self) -> RealPtr {
            RealPtr::new(0x3000, 0)
        }

        fn read_real(&self, _ptr: RealPtr, buf: &mut [u8]) -> HostResult {
            buf.copy_from_slice(&self.buffer[..buf.len()]);
            Ok(())
        }

        fn write_real(&mut self, _ptr: RealPtr, bytes: &[u8]) -> HostResult {
            self.buffer[..bytes.len()].copy_from_slice(bytes);
            Ok(())
        }
    }

    /// Firmware that runs every call and rejects every function.
    #[derive(Default)]
    struct AlwaysRejects {
        translate_calls: std::cell::Cell<usize>,
    }

    impl InterruptInvoker for AlwaysRejects {
        fn rmint(&mut self, _vector: u8, regs: &mut RmRegs) -> HostResult {
            regs.set_ax(0x014F);
            regs.set_carry(true);
            Ok(())
        }
    }

    impl AddressTranslator for AlwaysRejects {
        fn real_to_linear(&self, ptr: RealPtr) -> Option<LinearAddr> {
            self.translate_calls.set(self.translate_calls.get() + 1);
            Some(LinearAddr(ptr.phys() as usize))
        }

        fn physical_to_linear(&self, phys: u32, _len: u32) -> Option<LinearAddr> {
            self.translate_calls.set(self.translate_calls.get() + 1);
            Some(LinearAddr(phys as usize))
        }
    }

    impl ConventionalMemory for AlwaysRejects {
        fn transfer_buffer(&self) -> RealPtr {
            RealPtr::new(0x3000, 0)
        }

        fn read_real(&self, _ptr: RealPtr, buf: &mut [u8]) -> HostResult {
            buf.fill(0);
            Ok(())
        }

        fn write_real(&mut self, _ptr: RealPtr, _bytes: &[u8]) -> HostResult {
            Ok(())
        }
    }

    #[test]
    fn always_ok_firmware_reaches_active() {
        let mut init = ModeInitializer::new(AlwaysOk::new(800, 600));
        let active = init.init_vesa_mode(0x105, 800, 600, false).unwrap();

        assert_eq!(
            init.history(),
            &[
                InitState::Uninitialized,
                InitState::Querying,
                InitState::Validating,
                InitState::Activating,
                InitState::Active,
            ]
        );
        assert_eq!(init.state(), InitState::Active);
        assert_eq!(active.mode, ModeNumber::Vbe(0x105));
        assert!(active.linear);
        assert_eq!(active.framebuffer, Some(LinearAddr(LFB as usize)));
        assert_eq!(active.window_a, Some(LinearAddr(0xA0000)));
        assert_eq!(active.screen, Rect::new(0, 0, 799, 599));
        assert_eq!(init.services().calls, vec![0x4F01, 0x4F02]);
    }

    #[test]
    fn always_rejecting_firmware_fails_without_translating() {
        let mut init = ModeInitializer::new(AlwaysRejects::default());
        let err = init.init_mode_640_480().unwrap_err();

        assert_eq!(err, VideoError::Exhausted { attempts: 2 });
        assert_eq!(init.state(), InitState::Failed);
        assert_eq!(init.rejections().len(), 2);
        assert!(init.rejections().iter().all(|(_, e)| matches!(
            e,
            VideoError::FirmwareRejected {
                function: 0x4F01,
                ..
            }
        )));
        assert_eq!(init.into_inner().translate_calls.get(), 0);
    }

    #[test]
    fn half_surface_is_halved() {
        let mut init = ModeInitializer::new(AlwaysOk::new(640, 480));
        let active = init.init_vesa_mode(0x101, 640, 480, true).unwrap();
        assert_eq!(active.screen, Rect::new(0, 0, 319, 239));
        assert_eq!(active.screen.width(), 320);
        assert_eq!(active.width, 640);
    }

    #[test]
    fn odd_resolution_cannot_be_halved() {
        let mut init = ModeInitializer::new(AlwaysOk::new(641, 480));
        let err = init.init_vesa_mode(0x101, 641, 480, true).unwrap_err();
        assert_eq!(err, VideoError::Exhausted { attempts: 2 });
        assert!(init.rejections().iter().all(|(_, e)| matches!(
            e,
            VideoError::Mismatch {
                reason: "odd resolution cannot be halved",
                ..
            }
        )));
    }

    #[test]
    fn geometry_mismatch_is_rejected_before_activation() {
        let mut init = ModeInitializer::new(AlwaysOk::new(800, 600));
        assert!(init.init_mode_640_480().is_err());
        assert!(!init.services().calls.contains(&0x4F02));
        assert!(!init.history().contains(&InitState::Activating));
    }

    #[test]
    fn empty_candidate_list_fails_immediately() {
        let mut init = ModeInitializer::new(AlwaysOk::new(640, 480));
        assert_eq!(init.run(&[]), Err(VideoError::Exhausted { attempts: 0 }));
        assert_eq!(
            init.history(),
            &[InitState::Uninitialized, InitState::Failed]
        );
    }

    #[test]
    fn bank_for_splits_by_granularity() {
        let mut init = ModeInitializer::new(AlwaysOk::new(640, 480)).with_prefer_linear(false);
        let active = init.init_mode_640_480().unwrap();
        assert!(!active.linear);
        assert_eq!(active.surface(), active.window_a);
        assert_eq!(active.bank_for(0x1_2345), Ok((1, 0x2345)));
        assert_eq!(active.bank_for(0xFFFF), Ok((0, 0xFFFF)));
    }

    #[test]
    fn bank_for_rejects_offsets_past_the_framebuffer() {
        let mut init = ModeInitializer::new(AlwaysOk::new(640, 480)).with_prefer_linear(false);
        let active = init.init_mode_640_480().unwrap();
        let len = active.info.framebuffer_bytes();
        assert!(active.bank_for(len - 1).is_ok());
        assert_eq!(
            active.bank_for(len),
            Err(VideoError::FramebufferOffset { offset: len, len })
        );
        assert!(active.bank_for(u32::MAX).is_err());
    }
}

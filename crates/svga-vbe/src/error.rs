use svga_realmode::DispatchError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, VideoError>;

/// Failures of the mode query/activation path.
///
/// The firmware boundary only reports status values; this type is how those
/// statuses reach Rust callers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VideoError {
    /// The real-mode call facility could not execute the interrupt.
    #[error("real-mode dispatch failed: {0}")]
    Dispatch(#[from] DispatchError),

    /// The interrupt ran but firmware did not report success.
    #[error("firmware rejected function {function:#06x} (AX={ax:#06x})")]
    FirmwareRejected { function: u16, ax: u16 },

    /// Firmware described the mode but did not mark it as supported.
    #[error("mode {mode:#05x} is not supported by the adapter")]
    ModeNotSupported { mode: u16 },

    #[error("controller info block is invalid: {0}")]
    InvalidControllerInfo(&'static str),

    /// No linear mapping exists for a reported window segment.
    #[error("no linear mapping for window segment {segment:#06x}")]
    Translation { segment: u16 },

    /// No linear mapping exists for the linear framebuffer.
    #[error("no linear mapping for framebuffer at physical {phys:#010x}")]
    FramebufferMapping { phys: u32 },

    /// A framebuffer offset lies outside the active mode's framebuffer.
    #[error("offset {offset:#x} is outside the {len:#x}-byte framebuffer")]
    FramebufferOffset { offset: u32, len: u32 },

    /// The mode-set call ran but firmware did not confirm activation.
    #[error("activation of mode {mode:#05x} failed (AX={ax:#06x})")]
    Activation { mode: u16, ax: u16 },

    /// The mode does not match the requested geometry or format.
    #[error("mode {mode:#05x} rejected: {reason}")]
    Mismatch { mode: u16, reason: &'static str },

    /// Every candidate failed.
    #[error("no usable display mode after {attempts} candidate(s)")]
    Exhausted { attempts: usize },

    #[error("invalid video configuration: {0}")]
    Config(String),
}

impl VideoError {
    /// Whether the initializer should move on to the next candidate.
    pub fn is_retryable_with_next_candidate(&self) -> bool {
        !matches!(self, VideoError::Exhausted { .. } | VideoError::Config(_))
    }
}

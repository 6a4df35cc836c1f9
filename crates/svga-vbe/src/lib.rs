//! VESA BIOS Extensions mode negotiation over a real-mode bridge.
//!
//! The caller supplies a host implementing [`svga_realmode::RealModeServices`]
//! (a DPMI host on DOS, the simulated firmware in tests). On top of it this
//! crate provides:
//!
//! - [`ModeInfo`]: the 256-byte VBE mode descriptor
//! - [`ModeQuery`] / [`vbe_get_mode_info`]: "describe mode N" with window
//!   translation
//! - [`ModeInitializer`]: validation and activation with ordered fallback
//! - [`StartModeSelector`]: picks the startup mode from [`SvgaConfig`] and
//!   publishes the outcome through [`VideoStatus`]

#![forbid(unsafe_code)]

pub mod config;
pub mod controller;
pub mod error;
pub mod init;
pub mod mode_info;
pub mod query;
pub mod start;

pub use config::{FixedMode, StartMode, SvgaConfig};
pub use controller::{get_controller_info, ControllerInfo};
pub use error::{Result, VideoError};
pub use init::{
    reset_mode, ActiveMode, Candidate, InitState, ModeInitializer, ModeNumber, Rect,
};
pub use mode_info::{ColorField, MemoryModel, ModeAttributes, ModeInfo, WindowAttributes};
pub use query::{vbe_get_mode_info, ModeDescription, ModeQuery};
pub use start::{StartModeSelector, StartOutcome, VideoStatus};

//! In-process stand-in for a DOS extender and a VBE video BIOS.
//!
//! [`SimDpmi`] implements the `svga-realmode` service traits on top of a
//! [`Firmware`] model (conventional RAM, INT 10h legacy/VBE functions, banked and
//! linear VRAM) so the mode-selection stack can run without real hardware.

#![forbid(unsafe_code)]

pub mod dpmi;
pub mod int10;
pub mod memory;
pub mod vbe;

pub use dpmi::{FaultPlan, SimDpmi};
pub use int10::Firmware;

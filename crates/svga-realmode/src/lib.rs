//! Real-mode bridge primitives for protected-mode callers.
//!
//! - [`RmRegs`]: the register file exchanged with a simulated real-mode interrupt
//! - [`RealPtr`] / [`LinearAddr`]: segmented and flat addresses
//! - [`InterruptInvoker`], [`AddressTranslator`], [`ConventionalMemory`]: the
//!   capabilities a real-mode host provides. Callers take them as injected
//!   services so tests can substitute a simulated host.
//!
//! The `dpmi-host` feature adds [`DpmiHost`], an implementation on top of DPMI
//! INT 31h for 32-bit DOS-extended builds.

#![cfg_attr(
    not(all(feature = "dpmi-host", target_arch = "x86")),
    forbid(unsafe_code)
)]

mod addr;
mod int;
mod regs;

#[cfg(all(feature = "dpmi-host", target_arch = "x86"))]
mod dpmi;

pub use addr::{real_addr, AddressTranslator, LinearAddr, RealPtr};
pub use int::{ConventionalMemory, DispatchError, InterruptInvoker, TRANSFER_BUFFER_LEN};
pub use regs::{RmRegs, FLAG_CF, FLAG_IF, FLAG_ZF};

#[cfg(all(feature = "dpmi-host", target_arch = "x86"))]
pub use dpmi::DpmiHost;

/// Everything a caller needs to talk to real-mode firmware.
pub trait RealModeServices: InterruptInvoker + AddressTranslator + ConventionalMemory {}

impl<T: InterruptInvoker + AddressTranslator + ConventionalMemory + ?Sized> RealModeServices
    for T
{
}

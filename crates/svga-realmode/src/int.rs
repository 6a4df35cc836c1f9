//! Real-mode interrupt dispatch and conventional-memory access.

use thiserror::Error;

use crate::{RealPtr, RmRegs};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// The real-mode call facility is not initialized or not present.
    #[error("real-mode call facility unavailable")]
    Unavailable,

    /// The host could not execute the call (DPMI error code in AX).
    #[error("real-mode dispatch rejected by host (code {code:#06x})")]
    Rejected { code: u16 },

    #[error("conventional memory access out of bounds: {ptr:?} len={len}")]
    OutOfBounds { ptr: RealPtr, len: usize },
}

/// Executes a real-mode software interrupt on behalf of a protected-mode caller.
///
/// `regs` supplies the register state on entry and receives the state on
/// return. `Ok(())` only means the interrupt ran; firmware-level success is
/// reported in the returned registers and is for the caller to interpret.
pub trait InterruptInvoker {
    fn rmint(&mut self, vector: u8, regs: &mut RmRegs) -> Result<(), DispatchError>;
}

impl<T: InterruptInvoker + ?Sized> InterruptInvoker for &mut T {
    fn rmint(&mut self, vector: u8, regs: &mut RmRegs) -> Result<(), DispatchError> {
        (**self).rmint(vector, regs)
    }
}

/// Memory below 1 MiB that firmware can read and write.
pub trait ConventionalMemory {
    /// Start of a caller-owned transfer buffer of at least
    /// [`TRANSFER_BUFFER_LEN`] bytes.
    fn transfer_buffer(&self) -> RealPtr;

    fn read_real(&self, ptr: RealPtr, buf: &mut [u8]) -> Result<(), DispatchError>;

    fn write_real(&mut self, ptr: RealPtr, bytes: &[u8]) -> Result<(), DispatchError>;
}

impl<T: ConventionalMemory + ?Sized> ConventionalMemory for &mut T {
    fn transfer_buffer(&self) -> RealPtr {
        (**self).transfer_buffer()
    }

    fn read_real(&self, ptr: RealPtr, buf: &mut [u8]) -> Result<(), DispatchError> {
        (**self).read_real(ptr, buf)
    }

    fn write_real(&mut self, ptr: RealPtr, bytes: &[u8]) -> Result<(), DispatchError> {
        (**self).write_real(ptr, bytes)
    }
}

pub const TRANSFER_BUFFER_LEN: usize = 512;

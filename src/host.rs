//! Host services consumed by the evaluator.

use crate::error::Status;

/// Address spaces an operation region can live in, as encoded by the
/// `OperationRegion` opcode's region-space byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressSpace {
    SystemMemory,
    SystemIo,
    PciConfig,
    EmbeddedController,
    SmBus,
    SystemCmos,
    PciBarTarget,
    Ipmi,
    GeneralPurposeIo,
    GenericSerialBus,
    Pcc,
    /// OEM-defined space (0x80..=0xFF).
    Oem(u8),
}

impl AddressSpace {
    pub fn from_raw(raw: u8) -> Result<Self, Status> {
        Ok(match raw {
            0x00 => Self::SystemMemory,
            0x01 => Self::SystemIo,
            0x02 => Self::PciConfig,
            0x03 => Self::EmbeddedController,
            0x04 => Self::SmBus,
            0x05 => Self::SystemCmos,
            0x06 => Self::PciBarTarget,
            0x07 => Self::Ipmi,
            0x08 => Self::GeneralPurposeIo,
            0x09 => Self::GenericSerialBus,
            0x0A => Self::Pcc,
            0x80..=0xFF => Self::Oem(raw),
            _ => return Err(Status::BadBytecode),
        })
    }
}

/// Opaque handle for a host-created mutex.
pub type MutexHandle = u64;

/// OS primitives the evaluator delegates to. The evaluator is synchronous:
/// every call here may block and must return before execution proceeds.
///
/// Allocation and logging are deliberately absent — allocation goes through
/// the global allocator, diagnostics through `tracing`.
pub trait Host {
    /// Monotonic counter in 100 ns units, read by the `Timer` opcode.
    fn ticks(&mut self) -> u64;

    /// Create a mutex object's backing handle.
    fn mutex_create(&mut self) -> MutexHandle;

    /// Destroy a handle previously returned by [`Host::mutex_create`].
    fn mutex_destroy(&mut self, handle: MutexHandle);

    /// Acquire with a millisecond timeout (0xFFFF means wait forever).
    /// Returns whether the mutex was acquired.
    fn mutex_acquire(&mut self, handle: MutexHandle, timeout_ms: u16) -> bool;

    fn mutex_release(&mut self, handle: MutexHandle);

    /// Read `byte_width` bytes at `offset` within the given address space.
    fn region_read(&mut self, space: AddressSpace, offset: u64, byte_width: u8) -> Result<u64, Status>;

    /// Write the low `byte_width` bytes of `value` at `offset`.
    fn region_write(
        &mut self,
        space: AddressSpace,
        offset: u64,
        byte_width: u8,
        value: u64,
    ) -> Result<(), Status>;

    /// Deliver a `Notify(…, value)` raised by the bytecode.
    fn notify(&mut self, value: u64);
}

/// Host implementation that satisfies every service with an inert default.
/// Mutexes always acquire, regions read as zero, ticks count calls. Useful
/// for tests and for evaluating pure-computation tables.
#[derive(Debug, Default)]
pub struct NullHost {
    ticks: u64,
    next_mutex: MutexHandle,
}

impl Host for NullHost {
    fn ticks(&mut self) -> u64 {
        self.ticks += 1;
        self.ticks
    }

    fn mutex_create(&mut self) -> MutexHandle {
        self.next_mutex += 1;
        self.next_mutex
    }

    fn mutex_destroy(&mut self, _handle: MutexHandle) {}

    fn mutex_acquire(&mut self, _handle: MutexHandle, _timeout_ms: u16) -> bool {
        true
    }

    fn mutex_release(&mut self, _handle: MutexHandle) {}

    fn region_read(&mut self, _space: AddressSpace, _offset: u64, _byte_width: u8) -> Result<u64, Status> {
        Ok(0)
    }

    fn region_write(
        &mut self,
        _space: AddressSpace,
        _offset: u64,
        _byte_width: u8,
        _value: u64,
    ) -> Result<(), Status> {
        Ok(())
    }

    fn notify(&mut self, _value: u64) {}
}

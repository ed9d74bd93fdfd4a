//! Register-level access to memory-mapped peripherals, and the configuration describing where each
//! peripheral lives.

use crate::{ept::EptRegisterMap, timer::TimerRegisterMap};

/// Word-sized access to a peripheral's register block.
///
/// Offsets are word offsets relative to the peripheral's base address. Implementations must treat
/// every access as volatile: reads and writes have side effects on the hardware and must be
/// neither elided, merged nor reordered.
pub trait Registers {
    /// Reads the register at the given word offset.
    fn read(&mut self, offset: usize) -> u32;
    /// Writes the register at the given word offset.
    fn write(&mut self, offset: usize, value: u32);
}

impl<R: Registers + ?Sized> Registers for &mut R {
    fn read(&mut self, offset: usize) -> u32 {
        (**self).read(offset)
    }

    fn write(&mut self, offset: usize, value: u32) {
        (**self).write(offset, value)
    }
}

/// A [Registers] implementation for a register block mapped into the address space at a fixed
/// base address, with one 32-bit register per word.
pub struct MmioRegisters {
    base: *mut u32,
}

impl MmioRegisters {
    /// Creates a handle to the register block at `base`.
    ///
    /// # Safety
    ///
    /// `base` must be the word-aligned address of a mapped peripheral register block that stays
    /// mapped for the lifetime of the returned value, and every offset later passed to
    /// [Registers::read] or [Registers::write] must fall inside that block. No other code may
    /// access the block while the returned value is in use.
    pub const unsafe fn new(base: usize) -> MmioRegisters {
        MmioRegisters {
            base: base as *mut u32,
        }
    }
}

impl Registers for MmioRegisters {
    #[inline(always)]
    fn read(&mut self, offset: usize) -> u32 {
        // SAFETY: the constructor's contract guarantees the address is a valid register.
        unsafe { core::ptr::read_volatile(self.base.add(offset)) }
    }

    #[inline(always)]
    fn write(&mut self, offset: usize, value: u32) {
        // SAFETY: the constructor's contract guarantees the address is a valid register.
        unsafe { core::ptr::write_volatile(self.base.add(offset), value) }
    }
}

/// Describes one deployment of the EPT: the system clock and the location and layout of each
/// peripheral the calibration and self-test routines use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformConfig {
    /// The frequency of the clock driving the EPT cycle counter, in Hz.
    pub clock_hz: u64,
    /// The EPT register layout.
    pub ept: EptRegisterMap,
    /// The system timer register layout.
    pub timer: TimerRegisterMap,
}

impl PlatformConfig {
    /// The reference deployment: a 50MHz soft-core system with the EPT and the interrupt timer
    /// on the system bus.
    pub const REFERENCE: PlatformConfig = PlatformConfig {
        clock_hz: 50_000_000,
        ept: EptRegisterMap::REFERENCE,
        timer: TimerRegisterMap::REFERENCE,
    };

    /// Creates a handle to the memory-mapped EPT registers of this deployment.
    ///
    /// # Safety
    ///
    /// See [MmioRegisters::new]: [EptRegisterMap::base] must be correct for the running system.
    pub unsafe fn ept_registers(&self) -> MmioRegisters {
        MmioRegisters::new(self.ept.base)
    }

    /// Creates a handle to the memory-mapped system timer registers of this deployment.
    ///
    /// # Safety
    ///
    /// See [MmioRegisters::new]: [TimerRegisterMap::base] must be correct for the running system.
    pub unsafe fn timer_registers(&self) -> MmioRegisters {
        MmioRegisters::new(self.timer.base)
    }
}

impl Default for PlatformConfig {
    fn default() -> PlatformConfig {
        PlatformConfig::REFERENCE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Volatile access through a plain word array stands in for a real register block.
    #[test]
    fn mmio_reads_and_writes_words_at_offsets() {
        let mut block = [0u32; 4];
        let mut regs = unsafe { MmioRegisters::new(block.as_mut_ptr() as usize) };
        regs.write(2, 0xDEAD_BEEF);
        assert_eq!(0xDEAD_BEEF, regs.read(2));
        assert_eq!(0, regs.read(1));
        drop(regs);
        assert_eq!([0, 0, 0xDEAD_BEEF, 0], block);
    }

    #[test]
    fn reference_platform_runs_at_50mhz() {
        assert_eq!(50_000_000, PlatformConfig::default().clock_hz);
        assert_eq!(124, PlatformConfig::default().ept.max_tasks());
    }
}

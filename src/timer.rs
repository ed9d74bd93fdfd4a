//! Driver for the system interrupt timer, a 32-bit counter that can raise an IRQ when it reaches a
//! match value.

use crate::regs::Registers;

/// The location of the system timer and the word offsets of its registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerRegisterMap {
    /// The base address of the register block on the system bus.
    pub base: usize,
    /// The capture control register, holding the [TimerMode].
    pub control: usize,
    pub match_value: usize,
    pub data: usize,
    pub irq: usize,
}

impl TimerRegisterMap {
    /// The register layout of the reference deployment.
    pub const REFERENCE: TimerRegisterMap = TimerRegisterMap {
        base: 0x0008_1400,
        control: 0,
        match_value: 1,
        data: 2,
        irq: 3,
    };
}

impl Default for TimerRegisterMap {
    fn default() -> TimerRegisterMap {
        TimerRegisterMap::REFERENCE
    }
}

/// The counting modes of the system timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerMode {
    /// The counter is stopped.
    Disable = 0,
    /// The counter runs and never raises an IRQ.
    FreeRun = 1,
    /// The counter raises an IRQ on reaching the match value and keeps counting.
    MatchNoReset = 2,
    /// The counter raises an IRQ on reaching the match value and restarts from zero.
    MatchReset = 3,
}

impl TimerMode {
    /// Decodes the two mode bits of a capture control register value.
    pub fn from_bits(bits: u32) -> TimerMode {
        match bits & 0b11 {
            0 => TimerMode::Disable,
            1 => TimerMode::FreeRun,
            2 => TimerMode::MatchNoReset,
            _ => TimerMode::MatchReset,
        }
    }

    pub fn bits(self) -> u32 {
        self as u32
    }
}

/// Provides typed access to a system timer register block.
pub struct SystemTimer<R> {
    regs: R,
    map: TimerRegisterMap,
}

impl<R: Registers> SystemTimer<R> {
    pub fn new(regs: R, map: TimerRegisterMap) -> SystemTimer<R> {
        SystemTimer { regs, map }
    }

    pub fn into_inner(self) -> R {
        self.regs
    }

    pub fn mode(&mut self) -> TimerMode {
        TimerMode::from_bits(self.regs.read(self.map.control))
    }

    pub fn set_mode(&mut self, mode: TimerMode) {
        self.regs.write(self.map.control, mode.bits());
    }

    pub fn match_value(&mut self) -> u32 {
        self.regs.read(self.map.match_value)
    }

    pub fn set_match_value(&mut self, value: u32) {
        self.regs.write(self.map.match_value, value);
    }

    /// Reads the current counter value.
    pub fn data(&mut self) -> u32 {
        self.regs.read(self.map.data)
    }

    /// Overwrites the counter value. Writing 0 resets the counter.
    pub fn set_data(&mut self, value: u32) {
        self.regs.write(self.map.data, value);
    }

    pub fn irq_pending(&mut self) -> bool {
        self.regs.read(self.map.irq) & 1 != 0
    }

    pub fn clear_irq(&mut self) {
        self.regs.write(self.map.irq, 0);
    }
}

//! Driver for the Execution Performance Tester (EPT) register block.
//!
//! | Register                | Offset      | Write       | Read            |
//! |-------------------------|-------------|-------------|-----------------|
//! | On-chip RAM             | 0x00..=0x7F | data        | data            |
//! | Counter low             | 0x80        | -           | low 32 bits     |
//! | Counter high            | 0x81        | -           | high 8 bits     |
//! | Ready status            | 0x82        | -           | 1 when idle     |
//! | Start                   | 0x83        | pulse       | -               |
//! | Stop                    | 0x84        | pulse       | -               |
//! | Task ID                 | 0x85        | task ID     | task ID         |
//! | I/O offset              | 0x86        | offset      | offset          |
//! | ISR trigger             | 0x87        | 0/1         | -               |
//! | Context save trigger    | 0x88        | 0/1         | -               |
//! | Context restore trigger | 0x89        | 0/1         | -               |
//! | Executed                | 0x8A        | -           | executed flag   |
//! | Module reset            | 0x8B        | pulse       | -               |
//!
//! The last four RAM cells (0x7C..=0x7F) are reserved for the [InterruptTiming] of the most
//! recently measured interrupt. The RAM can only be accessed by software while the EPT is stopped.

use crate::{counter::SplitCounter, regs::Registers};
use core::fmt;

/// The number of RAM cells reserved for [InterruptTiming] data.
pub const INTERRUPT_TIMING_CELLS: usize = 4;

/// The location of the EPT and the word offsets of its registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EptRegisterMap {
    /// The base address of the register block on the system bus. Only used to map the block into
    /// memory, see [crate::regs::PlatformConfig::ept_registers].
    pub base: usize,
    /// The offset of the first RAM cell.
    pub ram: usize,
    /// The highest RAM address. The RAM size must be a power of two, since this value also serves
    /// as the RAM address mask.
    pub ram_address_max: usize,
    /// The RAM address of the first [InterruptTiming] cell.
    pub interrupt_timing: usize,
    pub counter_low: usize,
    pub counter_high: usize,
    pub status: usize,
    pub start: usize,
    pub stop: usize,
    pub task_id: usize,
    pub io_offset: usize,
    pub isr_trigger: usize,
    pub context_save_trigger: usize,
    pub context_restore_trigger: usize,
    pub executed: usize,
    pub reset: usize,
}

impl EptRegisterMap {
    /// The register layout of the reference deployment.
    pub const REFERENCE: EptRegisterMap = EptRegisterMap {
        base: 0x0008_1000,
        ram: 0x00,
        ram_address_max: 0x7F,
        interrupt_timing: 0x7C,
        counter_low: 0x80,
        counter_high: 0x81,
        status: 0x82,
        start: 0x83,
        stop: 0x84,
        task_id: 0x85,
        io_offset: 0x86,
        isr_trigger: 0x87,
        context_save_trigger: 0x88,
        context_restore_trigger: 0x89,
        executed: 0x8A,
        reset: 0x8B,
    };

    /// The number of RAM cells.
    pub const fn ram_cells(&self) -> usize {
        self.ram_address_max + 1
    }

    /// The maximum number of task IDs that can be measured at once, i.e. the number of RAM cells
    /// not reserved for interrupt timing data.
    pub const fn max_tasks(&self) -> usize {
        self.ram_cells().saturating_sub(INTERRUPT_TIMING_CELLS)
    }
}

impl Default for EptRegisterMap {
    fn default() -> EptRegisterMap {
        EptRegisterMap::REFERENCE
    }
}

/// The cycle counts of the phases of the most recently measured interrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InterruptTiming {
    pub irq_latency_cycles: u32,
    pub context_save_cycles: u32,
    pub isr_handle_cycles: u32,
    pub context_restore_cycles: u32,
}

impl fmt::Display for InterruptTiming {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "IRQ latency: {:#x}, context save: {:#x}, ISR handle: {:#x}, context restore: {:#x}",
            self.irq_latency_cycles,
            self.context_save_cycles,
            self.isr_handle_cycles,
            self.context_restore_cycles
        )
    }
}

/// The interrupt phase markers an instrumented interrupt routine signals to the EPT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Isr,
    ContextSave,
    ContextRestore,
}

/// Provides typed access to an EPT register block.
pub struct Ept<R> {
    regs: R,
    map: EptRegisterMap,
}

impl<R: Registers> Ept<R> {
    pub fn new(regs: R, map: EptRegisterMap) -> Ept<R> {
        Ept { regs, map }
    }

    pub fn map(&self) -> &EptRegisterMap {
        &self.map
    }

    /// Releases the underlying register implementation.
    pub fn into_inner(self) -> R {
        self.regs
    }

    /// Reads a RAM cell. The address is masked to the RAM address range.
    pub fn ram_read(&mut self, address: usize) -> u32 {
        let offset = self.map.ram + (address & self.map.ram_address_max);
        self.regs.read(offset)
    }

    /// Writes a RAM cell. The address is masked to the RAM address range.
    pub fn ram_write(&mut self, address: usize, data: u32) {
        let offset = self.map.ram + (address & self.map.ram_address_max);
        self.regs.write(offset, data)
    }

    pub fn counter_low(&mut self) -> u32 {
        self.regs.read(self.map.counter_low)
    }

    pub fn counter_high(&mut self) -> u8 {
        (self.regs.read(self.map.counter_high) & 0xFF) as u8
    }

    /// Takes a consistent snapshot of the running cycle counter.
    ///
    /// The halves can't be read atomically, so the high half is read before and after the low
    /// half, and the read is retried if the low half wrapped in between.
    pub fn counter(&mut self) -> SplitCounter {
        loop {
            let high = self.counter_high();
            let low = self.counter_low();
            if self.counter_high() == high {
                return SplitCounter { low, high };
            }
        }
    }

    /// Whether the EPT is idle. It is only idle (and its RAM accessible) while not running.
    pub fn is_ready(&mut self) -> bool {
        self.regs.read(self.map.status) & 1 != 0
    }

    /// Resets the cycle counter and starts measuring.
    pub fn start(&mut self) {
        self.pulse(self.map.start);
    }

    /// Stops measuring, making the RAM accessible again.
    pub fn stop(&mut self) {
        self.pulse(self.map.stop);
    }

    /// Resets the whole module.
    pub fn reset(&mut self) {
        self.pulse(self.map.reset);
    }

    /// Signals a task ID change. Bit 7 set marks the task as active, cleared marks it inactive.
    pub fn set_task(&mut self, task_id: u8) {
        self.regs.write(self.map.task_id, task_id.into());
    }

    pub fn task(&mut self) -> u8 {
        (self.regs.read(self.map.task_id) & 0xFF) as u8
    }

    /// Sets the number of cycles the EPT subtracts from every task measurement.
    pub fn set_io_offset(&mut self, offset: u8) {
        self.regs.write(self.map.io_offset, offset.into());
    }

    pub fn io_offset(&mut self) -> u8 {
        (self.regs.read(self.map.io_offset) & 0xFF) as u8
    }

    /// Raises or lowers one of the interrupt phase markers.
    pub fn set_trigger(&mut self, trigger: Trigger, active: bool) {
        let offset = match trigger {
            Trigger::Isr => self.map.isr_trigger,
            Trigger::ContextSave => self.map.context_save_trigger,
            Trigger::ContextRestore => self.map.context_restore_trigger,
        };
        self.regs.write(offset, active.into());
    }

    /// Whether the EPT has completed a measurement since it was last started.
    pub fn executed(&mut self) -> bool {
        self.regs.read(self.map.executed) & 1 != 0
    }

    /// Reads the interrupt timing data from the reserved RAM cells.
    pub fn interrupt_timing(&mut self) -> InterruptTiming {
        let base = self.map.interrupt_timing;
        InterruptTiming {
            irq_latency_cycles: self.ram_read(base),
            context_save_cycles: self.ram_read(base + 1),
            isr_handle_cycles: self.ram_read(base + 2),
            context_restore_cycles: self.ram_read(base + 3),
        }
    }

    /// Drives a command line high and immediately low again. The line is always left low, so
    /// repeating a command is safe.
    fn pulse(&mut self, offset: usize) {
        self.regs.write(offset, 1);
        self.regs.write(offset, 0);
    }
}

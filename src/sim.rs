//! Deterministic software models of the EPT and the system timer, for use in tests or on a host
//! without the real hardware.
//!
//! Time in the models is driven by bus traffic: every register access advances a running counter
//! by a fixed number of cycles, so the same access sequence always produces the same register
//! values.

use crate::{
    counter::COUNTER_MAX,
    ept::{EptRegisterMap, InterruptTiming},
    regs::Registers,
    timer::{TimerMode, TimerRegisterMap},
};

/// The largest RAM the EPT model can hold, in words.
pub const RAM_CAPACITY: usize = 128;

/// Behavioral parameters of a [SimulatedEpt].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimConfig {
    /// The cycles that pass on every register access while the EPT runs.
    pub access_cycles: u32,
    /// The cycles the EPT attributes to every task on top of the measured bus traffic, modelling
    /// the fixed cost of the task ID instrumentation.
    pub task_overhead_cycles: u32,
    /// The value the cycle counter restarts from on every start command.
    pub counter_preload: u64,
    /// The interrupt timing data the reserved RAM cells hold after construction.
    pub interrupt_timing: InterruptTiming,
}

impl Default for SimConfig {
    fn default() -> SimConfig {
        SimConfig {
            access_cycles: 3,
            task_overhead_cycles: 9,
            counter_preload: 0,
            interrupt_timing: InterruptTiming {
                irq_latency_cycles: 0x1C,
                context_save_cycles: 0x2A,
                isr_handle_cycles: 0x40,
                context_restore_cycles: 0x26,
            },
        }
    }
}

/// RAM cell bits that ignore writes and always read as a fixed level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StuckBits {
    pub address: usize,
    pub mask: u32,
    /// Whether the bits are stuck at one rather than zero.
    pub high: bool,
}

impl StuckBits {
    fn apply(&self, value: u32) -> u32 {
        if self.high {
            value | self.mask
        } else {
            value & !self.mask
        }
    }
}

/// Faults a [SimulatedEpt] can be told to exhibit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SimFaults {
    pub stuck_ram_bits: Option<StuckBits>,
    /// The ready status never reads as set.
    pub never_ready: bool,
    /// The ready status never clears, even while running.
    pub always_ready: bool,
    /// The ready status stays clear after a stop command, until the next start or reset.
    pub busy_after_stop: bool,
    /// The I/O offset register reads back with its lowest bit flipped.
    pub io_offset_echo: bool,
}

/// Counts of the register traffic a [SimulatedEpt] has seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SimStats {
    pub start_pulses: u32,
    pub stop_pulses: u32,
    pub reset_pulses: u32,
    pub ram_reads: u32,
    pub ram_writes: u32,
    pub task_writes: u32,
}

/// The levels of the EPT's command and trigger lines, used to detect rising edges.
#[derive(Debug, Clone, Copy, Default)]
struct Lines {
    start: bool,
    stop: bool,
    reset: bool,
}

/// A software model of the EPT.
pub struct SimulatedEpt {
    map: EptRegisterMap,
    config: SimConfig,
    faults: SimFaults,
    stats: SimStats,
    ram: [u32; RAM_CAPACITY],
    counter: u64,
    running: bool,
    /// Whether a stop command was seen since the last start or reset.
    stopped: bool,
    executed: bool,
    task_id: u8,
    /// The counter value at which the currently active task was started.
    task_started_at: Option<u64>,
    io_offset: u8,
    lines: Lines,
    /// The counter values at which the ISR, context save and context restore triggers were raised.
    triggers_raised_at: [Option<u64>; 3],
}

impl SimulatedEpt {
    pub fn new(map: EptRegisterMap, config: SimConfig) -> SimulatedEpt {
        let mut sim = SimulatedEpt {
            map,
            config,
            faults: SimFaults::default(),
            stats: SimStats::default(),
            ram: [0; RAM_CAPACITY],
            counter: 0,
            running: false,
            stopped: false,
            executed: false,
            task_id: 0,
            task_started_at: None,
            io_offset: 0,
            lines: Lines::default(),
            triggers_raised_at: [None; 3],
        };
        let timing = config.interrupt_timing;
        let base = map.interrupt_timing;
        for (idx, value) in [
            timing.irq_latency_cycles,
            timing.context_save_cycles,
            timing.isr_handle_cycles,
            timing.context_restore_cycles,
        ]
        .into_iter()
        .enumerate()
        {
            sim.store_ram(base + idx, value);
        }
        sim
    }

    /// Replaces the set of faults the model exhibits.
    pub fn with_faults(mut self, faults: SimFaults) -> SimulatedEpt {
        self.faults = faults;
        self
    }

    pub fn stats(&self) -> SimStats {
        self.stats
    }

    /// The RAM contents, bypassing the bus (and hence without advancing time).
    pub fn ram(&self) -> &[u32] {
        &self.ram[..self.map.ram_cells().min(RAM_CAPACITY)]
    }

    /// Overwrites a RAM cell, bypassing the bus.
    pub fn poke_ram(&mut self, address: usize, value: u32) {
        self.store_ram(address, value);
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    fn store_ram(&mut self, address: usize, value: u32) {
        if let Some(cell) = self.ram.get_mut(address) {
            *cell = value;
        }
    }

    fn ram_address(&self, offset: usize) -> Option<usize> {
        let address = offset.checked_sub(self.map.ram)?;
        (address <= self.map.ram_address_max).then_some(address)
    }

    fn is_ready(&self) -> bool {
        if self.faults.never_ready || (self.faults.busy_after_stop && self.stopped) {
            false
        } else {
            self.faults.always_ready || !self.running
        }
    }

    /// Advances time by one bus access.
    fn tick(&mut self) {
        if self.running {
            self.counter = (self.counter + u64::from(self.config.access_cycles)) & COUNTER_MAX;
        }
    }

    fn elapsed_since(&self, start: u64) -> u64 {
        self.counter.wrapping_sub(start) & COUNTER_MAX
    }

    /// Returns whether `value` raises a command line that was low.
    fn rising_edge(line: &mut bool, value: u32) -> bool {
        let level = value & 1 != 0;
        let rising = level && !*line;
        *line = level;
        rising
    }

    fn on_task_write(&mut self, value: u32) {
        self.stats.task_writes += 1;
        self.task_id = (value & 0xFF) as u8;
        if !self.running {
            return;
        }
        if self.task_id & 0x80 != 0 {
            self.task_started_at = Some(self.counter);
        } else if let Some(start) = self.task_started_at.take() {
            let cycles = self.elapsed_since(start) + u64::from(self.config.task_overhead_cycles);
            let sample = cycles.saturating_sub(self.io_offset.into());
            // Task samples never overwrite the interrupt timing cells.
            let address = usize::from(self.task_id & 0x7F);
            if address < self.map.max_tasks() {
                self.store_ram(address, sample.min(u32::MAX.into()) as u32);
            }
            self.executed = true;
        }
    }

    fn on_trigger_write(&mut self, idx: usize, value: u32) {
        if !self.running {
            return;
        }
        if value & 1 != 0 {
            self.triggers_raised_at[idx].get_or_insert(self.counter);
        } else if let Some(start) = self.triggers_raised_at[idx].take() {
            // The ISR, context save and context restore cells follow the IRQ latency cell.
            let cycles = self.elapsed_since(start).min(u32::MAX.into()) as u32;
            self.store_ram(self.map.interrupt_timing + 1 + idx, cycles);
        }
    }
}

impl Registers for SimulatedEpt {
    fn read(&mut self, offset: usize) -> u32 {
        self.tick();
        let map = self.map;
        if let Some(address) = self.ram_address(offset) {
            self.stats.ram_reads += 1;
            // The RAM is owned by the measurement logic while running.
            if self.running {
                0
            } else {
                self.ram.get(address).copied().unwrap_or(0)
            }
        } else if offset == map.counter_low {
            self.counter as u32
        } else if offset == map.counter_high {
            (self.counter >> 32) as u32 & 0xFF
        } else if offset == map.status {
            self.is_ready().into()
        } else if offset == map.task_id {
            self.task_id.into()
        } else if offset == map.io_offset {
            if self.faults.io_offset_echo {
                u32::from(self.io_offset ^ 1)
            } else {
                self.io_offset.into()
            }
        } else if offset == map.executed {
            self.executed.into()
        } else {
            0
        }
    }

    fn write(&mut self, offset: usize, value: u32) {
        self.tick();
        let map = self.map;
        if let Some(address) = self.ram_address(offset) {
            self.stats.ram_writes += 1;
            if self.running {
                return;
            }
            let value = match self.faults.stuck_ram_bits {
                Some(stuck) if stuck.address == address => stuck.apply(value),
                _ => value,
            };
            self.store_ram(address, value);
        } else if offset == map.start {
            if Self::rising_edge(&mut self.lines.start, value) {
                self.stats.start_pulses += 1;
                self.stopped = false;
                self.counter = self.config.counter_preload & COUNTER_MAX;
                self.running = true;
                self.executed = false;
                self.task_started_at = None;
            }
        } else if offset == map.stop {
            if Self::rising_edge(&mut self.lines.stop, value) {
                self.stats.stop_pulses += 1;
                self.stopped = true;
                self.running = false;
            }
        } else if offset == map.reset {
            if Self::rising_edge(&mut self.lines.reset, value) {
                self.stats.reset_pulses += 1;
                self.stopped = false;
                self.running = false;
                self.counter = 0;
                self.executed = false;
                self.task_id = 0;
                self.task_started_at = None;
                self.io_offset = 0;
                self.triggers_raised_at = [None; 3];
            }
        } else if offset == map.task_id {
            self.on_task_write(value);
        } else if offset == map.io_offset {
            self.io_offset = (value & 0xFF) as u8;
        } else if offset == map.isr_trigger {
            self.on_trigger_write(1, value);
        } else if offset == map.context_save_trigger {
            self.on_trigger_write(0, value);
        } else if offset == map.context_restore_trigger {
            self.on_trigger_write(2, value);
        }
    }
}

/// The number of counts the system timer model advances per bus access by default.
pub const DEFAULT_TIMER_STEP: u32 = 8;

/// A software model of the system interrupt timer.
pub struct SimulatedTimer {
    map: TimerRegisterMap,
    step: u32,
    stalled: bool,
    swapped_match_modes: bool,
    mode: TimerMode,
    match_value: u32,
    data: u32,
    irq: bool,
}

impl SimulatedTimer {
    /// Creates a disabled timer that advances by `step` counts per bus access once enabled.
    pub fn new(map: TimerRegisterMap, step: u32) -> SimulatedTimer {
        SimulatedTimer {
            map,
            step,
            stalled: false,
            swapped_match_modes: false,
            mode: TimerMode::Disable,
            match_value: 0,
            data: 0,
            irq: false,
        }
    }

    /// Makes the counter stop advancing regardless of its mode, like a timer with a dead clock.
    pub fn stalled(mut self) -> SimulatedTimer {
        self.stalled = true;
        self
    }

    /// Makes the match modes behave like each other: the IRQ is still raised, but the counter
    /// restarts in match-without-reset mode and keeps counting in match-with-reset mode.
    pub fn with_swapped_match_modes(mut self) -> SimulatedTimer {
        self.swapped_match_modes = true;
        self
    }

    fn tick(&mut self) {
        if self.stalled || self.mode == TimerMode::Disable {
            return;
        }
        let previous = self.data;
        self.data = self.data.wrapping_add(self.step);
        let restart_on_match = match self.mode {
            TimerMode::MatchNoReset => self.swapped_match_modes,
            TimerMode::MatchReset => !self.swapped_match_modes,
            _ => return,
        };
        if restart_on_match {
            if self.data >= self.match_value {
                self.irq = true;
                self.data = 0;
            }
        } else if previous < self.match_value && self.data >= self.match_value {
            self.irq = true;
        }
    }
}

impl Registers for SimulatedTimer {
    fn read(&mut self, offset: usize) -> u32 {
        self.tick();
        let map = self.map;
        if offset == map.control {
            self.mode.bits()
        } else if offset == map.match_value {
            self.match_value
        } else if offset == map.data {
            self.data
        } else if offset == map.irq {
            self.irq.into()
        } else {
            0
        }
    }

    fn write(&mut self, offset: usize, value: u32) {
        self.tick();
        let map = self.map;
        if offset == map.control {
            self.mode = TimerMode::from_bits(value);
        } else if offset == map.match_value {
            self.match_value = value;
        } else if offset == map.data {
            self.data = value;
        } else if offset == map.irq {
            self.irq = value & 1 != 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ept::{Ept, Trigger};

    fn ept_sim() -> SimulatedEpt {
        SimulatedEpt::new(EptRegisterMap::REFERENCE, SimConfig::default())
    }

    // The counter only advances while running, and start restarts it from the preload value.
    #[test]
    fn counter_runs_between_start_and_stop() {
        let mut sim = ept_sim();
        let mut ept = Ept::new(&mut sim, EptRegisterMap::REFERENCE);
        assert!(ept.is_ready());
        assert_eq!(ept.counter_low(), ept.counter_low());

        ept.start();
        assert!(!ept.is_ready());
        let first = ept.counter_low();
        let second = ept.counter_low();
        assert_eq!(3, second - first);

        ept.stop();
        assert!(ept.is_ready());
        let stopped = ept.counter_low();
        assert_eq!(stopped, ept.counter_low());
    }

    // Each active/inactive task ID pair stores one sample, at the cell addressed by the task ID.
    #[test]
    fn task_pairs_store_samples() {
        let mut sim = ept_sim();
        let mut ept = Ept::new(&mut sim, EptRegisterMap::REFERENCE);
        ept.start();
        ept.set_task(0x80);
        ept.set_task(0x00);
        ept.set_task(0x81);
        ept.set_task(0x01);
        assert_eq!(0x01, ept.task());
        assert!(ept.executed());
        ept.stop();
        // One access between the writes, plus the modelled instrumentation overhead.
        assert_eq!(3 + 9, ept.ram_read(0));
        assert_eq!(3 + 9, ept.ram_read(1));
        assert_eq!(0, ept.ram_read(2));
    }

    #[test]
    fn io_offset_is_subtracted_from_samples() {
        let mut sim = ept_sim();
        let mut ept = Ept::new(&mut sim, EptRegisterMap::REFERENCE);
        ept.set_io_offset(10);
        ept.start();
        ept.set_task(0x80);
        ept.set_task(0x00);
        ept.stop();
        assert_eq!(2, ept.ram_read(0));
    }

    #[test]
    fn ram_is_inaccessible_while_running() {
        let mut sim = ept_sim();
        let mut ept = Ept::new(&mut sim, EptRegisterMap::REFERENCE);
        ept.ram_write(5, 0x55);
        ept.start();
        assert_eq!(0, ept.ram_read(5));
        ept.ram_write(5, 0x66);
        ept.stop();
        assert_eq!(0x55, ept.ram_read(5));
    }

    #[test]
    fn triggers_record_interrupt_phases() {
        let mut sim = ept_sim();
        let mut ept = Ept::new(&mut sim, EptRegisterMap::REFERENCE);
        ept.start();
        ept.set_trigger(Trigger::ContextSave, true);
        ept.set_trigger(Trigger::ContextSave, false);
        ept.set_trigger(Trigger::Isr, true);
        ept.counter_low();
        ept.set_trigger(Trigger::Isr, false);
        ept.stop();
        let timing = ept.interrupt_timing();
        assert_eq!(0x1C, timing.irq_latency_cycles);
        assert_eq!(3, timing.context_save_cycles);
        assert_eq!(6, timing.isr_handle_cycles);
        assert_eq!(0x26, timing.context_restore_cycles);
    }

    #[test]
    fn stuck_bits_corrupt_only_their_cell() {
        let mut sim = ept_sim().with_faults(SimFaults {
            stuck_ram_bits: Some(StuckBits {
                address: 3,
                mask: 0x0000_0100,
                high: false,
            }),
            ..Default::default()
        });
        let mut ept = Ept::new(&mut sim, EptRegisterMap::REFERENCE);
        ept.ram_write(2, 0xFFFF_FFFF);
        ept.ram_write(3, 0xFFFF_FFFF);
        assert_eq!(0xFFFF_FFFF, ept.ram_read(2));
        assert_eq!(0xFFFF_FEFF, ept.ram_read(3));
        ept.ram_write(3, 0x0000_0101);
        assert_eq!(0x0000_0001, ept.ram_read(3));
    }

    #[test]
    fn timer_match_with_reset_restarts_counter() {
        let mut sim = SimulatedTimer::new(TimerRegisterMap::REFERENCE, 4);
        sim.write(1, 16);
        sim.write(0, TimerMode::MatchReset.bits());
        // Four accesses reach the match value.
        for _ in 0..3 {
            assert_eq!(0, sim.read(3));
        }
        assert_eq!(1, sim.read(3));
        assert_eq!(4, sim.read(2));
    }

    #[test]
    fn swapped_match_modes_keep_counting_in_reset_mode() {
        let mut sim =
            SimulatedTimer::new(TimerRegisterMap::REFERENCE, 4).with_swapped_match_modes();
        sim.write(1, 16);
        sim.write(0, TimerMode::MatchReset.bits());
        for _ in 0..3 {
            assert_eq!(0, sim.read(3));
        }
        assert_eq!(1, sim.read(3));
        assert_eq!(20, sim.read(2));
    }

    #[test]
    fn busy_after_stop_lasts_until_reset() {
        let mut sim = ept_sim().with_faults(SimFaults {
            busy_after_stop: true,
            ..Default::default()
        });
        let mut ept = Ept::new(&mut sim, EptRegisterMap::REFERENCE);
        assert!(ept.is_ready());
        ept.start();
        ept.stop();
        assert!(!ept.is_ready());
        ept.reset();
        assert!(ept.is_ready());
    }
}

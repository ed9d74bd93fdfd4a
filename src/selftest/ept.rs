//! Verification of the EPT's RAM and cycle counter.

use crate::{
    counter::elapsed_millis,
    debug_util,
    ept::{Ept, InterruptTiming},
    ram::SAMPLE_CAPACITY,
    regs::Registers,
};
use log::{error, info, warn};

/// A low counter half below this value right after being above it means the low half wrapped.
pub const OVERFLOW_THRESHOLD: u32 = 0x400;

/// The outcome of [run_ram_pattern].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RamPatternReport {
    /// The number of RAM cells that didn't read back the pattern value written to them.
    pub mismatches: u32,
    /// The contents of the interrupt timing cells after the pattern was written.
    pub interrupt_timing: InterruptTiming,
}

impl RamPatternReport {
    pub fn is_pass(&self) -> bool {
        self.mismatches == 0
    }
}

/// Writes an incrementing pattern starting at `seed` over the whole RAM, reading every cell back
/// right after writing it. Mismatches are counted and logged, but don't end the test.
///
/// The EPT must be stopped. The pattern overwrites all previous RAM contents, including the
/// interrupt timing cells, whose contents are logged afterwards. With `dump` set, the whole RAM
/// is logged as well.
pub fn run_ram_pattern<R: Registers>(ept: &mut Ept<R>, seed: u32, dump: bool) -> RamPatternReport {
    let address_max = ept.map().ram_address_max;
    info!("On-chip RAM test (0 - 0x{address_max:x}) using 0x{seed:x} pattern");

    let mut mismatches = 0;
    let mut pattern = seed;
    for address in 0..=address_max {
        ept.ram_write(address, pattern);
        let read = ept.ram_read(address);
        if read != pattern {
            mismatches += 1;
            warn!("{address}. FAIL: wrote 0x{pattern:x}, read 0x{read:x}");
        }
        pattern = pattern.wrapping_add(1);
    }

    let interrupt_timing = ept.interrupt_timing();
    info!(
        "  - Interrupt latency: 0x{:x}\n  - Context save: 0x{:x}\n  - ISR handle: 0x{:x}\n  - Context restore: 0x{:x}",
        interrupt_timing.irq_latency_cycles,
        interrupt_timing.context_save_cycles,
        interrupt_timing.isr_handle_cycles,
        interrupt_timing.context_restore_cycles
    );

    if dump {
        info!("--- Reading memory contents ---");
        let cells = ept.map().ram_cells().min(SAMPLE_CAPACITY);
        let mut words = heapless::Vec::<u32, SAMPLE_CAPACITY>::new();
        for address in 0..cells {
            // Can't fail, the number of cells is capped to the capacity.
            let _ = words.push(ept.ram_read(address));
        }
        debug_util::log_words_hex(log::Level::Info, &words);
    }

    RamPatternReport {
        mismatches,
        interrupt_timing,
    }
}

/// The first step of [run_counter_states] that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterFailure {
    /// The EPT wasn't ready when the test began.
    NotReady,
    /// The counter advanced between two reads while the EPT was stopped.
    RunningWhileIdle { low_delta: u32, high_delta: u8 },
    /// The counter didn't advance, or wasn't restarted, after a start command.
    NotRunningAfterStart { low_delta: u32, high: u8 },
}

/// The outcome of [run_counter_states].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CounterReport {
    pub failure: Option<CounterFailure>,
    /// The reconstructed counter value at the last observed wrap of the low half, if the overflow
    /// step ran.
    pub overflow_cycles: Option<u64>,
    /// [CounterReport::overflow_cycles] converted to milliseconds.
    pub overflow_millis: Option<f64>,
}

impl CounterReport {
    pub fn is_pass(&self) -> bool {
        self.failure.is_none()
    }
}

/// Checks the cycle counter's behavior across the EPT's states:
/// 1. while ready, neither counter half advances,
/// 2. after a start command, the low half advances and the high half was cleared,
/// 3. if `overflows` is non-zero, waits for that many wraps of the low half, logging the
///    reconstructed counter value at each one.
///
/// The first failing step ends the test. The EPT is always stopped on return.
///
/// Note that on real hardware every wrap of the low half takes 2^32 cycles (roughly 86 seconds at
/// 50MHz), and that the overflow step waits indefinitely for each wrap.
pub fn run_counter_states<R: Registers>(
    ept: &mut Ept<R>,
    clock_hz: u64,
    overflows: u32,
) -> CounterReport {
    info!("EPT cycle counter test:");
    let report = check_counter_states(ept, clock_hz, overflows);
    ept.stop();
    report
}

fn check_counter_states<R: Registers>(
    ept: &mut Ept<R>,
    clock_hz: u64,
    overflows: u32,
) -> CounterReport {
    let failed = |failure| CounterReport {
        failure: Some(failure),
        ..Default::default()
    };

    if !ept.is_ready() {
        error!("FAIL: EPT status is not ready");
        return failed(CounterFailure::NotReady);
    }
    let low = ept.counter_low();
    let low_delta = ept.counter_low().wrapping_sub(low);
    let high = ept.counter_high();
    let high_delta = ept.counter_high().wrapping_sub(high);
    if low_delta != 0 || high_delta != 0 {
        error!("1. FAIL: EPT cycle counter is running in ready state: {high_delta} - {low_delta}");
        return failed(CounterFailure::RunningWhileIdle {
            low_delta,
            high_delta,
        });
    }
    info!("1. PASS: EPT cycle counter is disabled in ready state");

    ept.start();
    let low = ept.counter_low();
    let low_delta = ept.counter_low().wrapping_sub(low);
    let high = ept.counter_high();
    if low_delta == 0 || high != 0 {
        error!("2. FAIL: Cycle counter is not running at start: {high}(HI) - {low_delta}(LO)");
        return failed(CounterFailure::NotRunningAfterStart { low_delta, high });
    }
    info!("2. PASS: Cycle counter is reset and running at start: {high}(HI) - {low_delta}(LO)");

    if overflows == 0 {
        return CounterReport::default();
    }
    let estimate_secs = u64::from(overflows) * (u64::from(u32::MAX) / clock_hz.max(1));
    info!("3. Counter overflow test, estimated duration: {estimate_secs} sec");
    let mut overflow_cycles = 0;
    let mut previous = ept.counter_low();
    for overflow in 1..=overflows {
        loop {
            let low = ept.counter_low();
            let wrapped = previous >= OVERFLOW_THRESHOLD && low < OVERFLOW_THRESHOLD;
            previous = low;
            if wrapped {
                break;
            }
        }
        let counter = ept.counter();
        previous = counter.low;
        overflow_cycles = counter.cycles();
        info!("  - {overflow}. overflow: 0x{overflow_cycles:x}");
    }
    let overflow_millis = elapsed_millis(overflow_cycles, clock_hz);
    info!("  - Elapsed time: {overflow_millis:.3} msec");

    CounterReport {
        failure: None,
        overflow_cycles: Some(overflow_cycles),
        overflow_millis: Some(overflow_millis),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ept::EptRegisterMap,
        sim::{SimConfig, SimFaults, SimulatedEpt, StuckBits},
    };

    fn sim(config: SimConfig) -> SimulatedEpt {
        SimulatedEpt::new(EptRegisterMap::REFERENCE, config)
    }

    #[test]
    fn ram_pattern_passes_and_wraps() {
        let mut sim = sim(SimConfig::default());
        let mut ept = Ept::new(&mut sim, EptRegisterMap::REFERENCE);
        let report = run_ram_pattern(&mut ept, 0xFFFF_FF00, true);
        assert!(report.is_pass());
        // The pattern also covers the interrupt timing cells.
        assert_eq!(
            InterruptTiming {
                irq_latency_cycles: 0xFFFF_FF7C,
                context_save_cycles: 0xFFFF_FF7D,
                isr_handle_cycles: 0xFFFF_FF7E,
                context_restore_cycles: 0xFFFF_FF7F,
            },
            report.interrupt_timing
        );

        let report = run_ram_pattern(&mut ept, 0xFFFF_FFF0, false);
        assert!(report.is_pass());
        assert_eq!(&[0xFFFF_FFFE, 0xFFFF_FFFF, 0, 1], &sim.ram()[0x0E..0x12]);
    }

    // Unlike a RAM fill, the pattern test continues past mismatches.
    #[test]
    fn ram_pattern_counts_every_mismatch() {
        let mut sim = sim(SimConfig::default()).with_faults(SimFaults {
            stuck_ram_bits: Some(StuckBits {
                address: 0x20,
                mask: 0x8000_0000,
                high: true,
            }),
            ..Default::default()
        });
        let mut ept = Ept::new(&mut sim, EptRegisterMap::REFERENCE);
        let report = run_ram_pattern(&mut ept, 0, false);
        assert_eq!(1, report.mismatches);
        assert!(!report.is_pass());
        assert_eq!(0x80, sim.stats().ram_writes);
    }

    #[test]
    fn counter_states_pass_without_overflow() {
        let mut sim = sim(SimConfig::default());
        let mut ept = Ept::new(&mut sim, EptRegisterMap::REFERENCE);
        let report = run_counter_states(&mut ept, 50_000_000, 0);
        assert_eq!(CounterReport::default(), report);
        assert!(report.is_pass());
        assert!(!sim.is_running());
    }

    #[test]
    fn counter_states_require_ready_module() {
        let mut sim = sim(SimConfig::default()).with_faults(SimFaults {
            never_ready: true,
            ..Default::default()
        });
        let mut ept = Ept::new(&mut sim, EptRegisterMap::REFERENCE);
        let report = run_counter_states(&mut ept, 50_000_000, 0);
        assert_eq!(Some(CounterFailure::NotReady), report.failure);
        assert_eq!(0, sim.stats().start_pulses);
    }

    // A counter that keeps its pre-start high half wasn't restarted.
    #[test]
    fn counter_states_detect_missing_restart() {
        let mut sim = sim(SimConfig {
            counter_preload: 0x03_0000_0000,
            ..Default::default()
        });
        let mut ept = Ept::new(&mut sim, EptRegisterMap::REFERENCE);
        let report = run_counter_states(&mut ept, 50_000_000, 0);
        assert_eq!(
            Some(CounterFailure::NotRunningAfterStart {
                low_delta: 3,
                high: 3
            }),
            report.failure
        );
        assert!(!sim.is_running());
    }

    #[test]
    fn counter_overflows_are_reconstructed() {
        let mut sim = sim(SimConfig {
            access_cycles: 0x1000_0000,
            ..Default::default()
        });
        let mut ept = Ept::new(&mut sim, EptRegisterMap::REFERENCE);
        let report = run_counter_states(&mut ept, 50_000_000, 2);
        assert!(report.is_pass());
        let cycles = report.overflow_cycles.unwrap();
        // The high half counts the wraps of the low half.
        assert_eq!(2, cycles >> 32);
        assert_eq!(
            Some(elapsed_millis(cycles, 50_000_000)),
            report.overflow_millis
        );
    }
}

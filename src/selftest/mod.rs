//! Self-tests that check the system timer and the EPT against their expected behavior. Each test
//! logs one line per step and returns a report for programmatic use.

mod ept;
mod timer;

pub use self::ept::{
    run_counter_states, run_ram_pattern, CounterFailure, CounterReport, RamPatternReport,
    OVERFLOW_THRESHOLD,
};
pub use self::timer::{run_timer_modes, TimerReport, MATCH_VALUE};

use crate::{ept::Ept, regs::Registers, timer::SystemTimer};
use log::{info, warn};

/// Parameters of a [run_all] sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelfTestConfig {
    /// The first value of the RAM test pattern.
    pub ram_seed: u32,
    /// Whether to log the full RAM contents after the RAM test.
    pub dump_ram: bool,
    /// The number of low counter half wraps to wait for. Each one takes 2^32 cycles.
    pub overflows: u32,
}

impl Default for SelfTestConfig {
    fn default() -> SelfTestConfig {
        SelfTestConfig {
            ram_seed: 0xFFFF_FF00,
            dump_ram: false,
            overflows: 0,
        }
    }
}

/// The reports of all tests in a [run_all] sweep.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelfTestSummary {
    pub timer: TimerReport,
    pub ram: RamPatternReport,
    pub counter: CounterReport,
}

impl SelfTestSummary {
    pub fn is_pass(&self) -> bool {
        self.timer.is_pass() && self.ram.is_pass() && self.counter.is_pass()
    }
}

/// Runs the timer mode test, the RAM pattern test and the counter state test, in that order. The
/// EPT is stopped before the RAM test, so its RAM is accessible.
pub fn run_all<E: Registers, T: Registers>(
    ept: &mut Ept<E>,
    timer: &mut SystemTimer<T>,
    config: &SelfTestConfig,
    clock_hz: u64,
) -> SelfTestSummary {
    let timer_report = run_timer_modes(timer);
    if timer_report.is_pass() {
        info!("...PASS");
    } else {
        warn!("...{} item(s) FAIL.", timer_report.failed);
    }

    ept.stop();
    info!("---");
    let ram = run_ram_pattern(ept, config.ram_seed, config.dump_ram);
    if ram.is_pass() {
        info!("...PASS");
    } else {
        warn!("...{} item(s) FAIL.", ram.mismatches);
    }

    info!("---");
    let counter = run_counter_states(ept, clock_hz, config.overflows);
    if counter.is_pass() {
        info!("...PASS");
    } else {
        warn!("...FAIL.");
    }

    SelfTestSummary {
        timer: timer_report,
        ram,
        counter,
    }
}

//! Runs the EPT self-tests and I/O offset calibration against the simulated peripherals:
//! 1. Driver self-tests (system timer, EPT RAM, EPT cycle counter)
//! 2. I/O offset calibration over all task cells
//! 3. Re-initialization of the EPT RAM to 0

use clap::Parser;
use ept::{
    calibration::calibrate,
    ept::Ept,
    ram::fill_range,
    regs::PlatformConfig,
    selftest::{run_all, SelfTestConfig},
    sim::{SimConfig, SimulatedEpt, SimulatedTimer, DEFAULT_TIMER_STEP},
    timer::SystemTimer,
    Status,
};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "ept-selftest")]
#[command(about = "Self-tests and I/O offset calibration for the Execution Performance Tester")]
struct Cli {
    /// Number of tasks to calibrate with. Defaults to every task cell of the EPT RAM.
    #[arg(long)]
    tasks: Option<usize>,

    /// Number of low counter half wraps the counter test waits for (0 = skip).
    #[arg(long, default_value_t = 0)]
    overflow: u32,

    /// Log the full RAM contents after the RAM test.
    #[arg(long)]
    dump: bool,

    /// Simulated cycles that pass on every EPT register access.
    #[arg(long, default_value_t = 3)]
    access_cycles: u32,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let selftest = SelfTestConfig {
        dump_ram: cli.dump,
        overflows: cli.overflow,
        ..Default::default()
    };
    let sim = SimConfig {
        access_cycles: cli.access_cycles,
        ..Default::default()
    };

    let platform = PlatformConfig::default();
    let mut ept = Ept::new(SimulatedEpt::new(platform.ept, sim), platform.ept);
    let mut timer = SystemTimer::new(
        SimulatedTimer::new(platform.timer, DEFAULT_TIMER_STEP),
        platform.timer,
    );

    log::info!("=== EPT SYSTEM ===");
    log::info!("--- Driver Tests ---");
    let summary = run_all(&mut ept, &mut timer, &selftest, platform.clock_hz);

    log::info!("--- Initialization ---");
    let tasks = cli.tasks.unwrap_or(platform.ept.max_tasks());
    let calibration = calibrate(&mut ept, tasks);
    log::info!(
        " >> IO Offset Calibration: {} -> N: {}, Mean: {:.2}, StDev: {:.2}",
        calibration.status,
        calibration.statistics.sample_count,
        calibration.statistics.mean,
        calibration.statistics.stdev
    );

    let ram_max = platform.ept.ram_address_max;
    let ram_status = Status::from(fill_range(&mut ept, 0, ram_max, 0));
    log::info!(" >> EPT RAM initialization to 0: {ram_status}");

    if summary.is_pass() && calibration.status.is_success() && ram_status.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

//! Calibration of the EPT's I/O offset.
//!
//! Every task measurement the EPT takes includes the cycles spent writing the task ID register
//! itself. Calibration measures this fixed overhead by timing a series of empty tasks, and then
//! programs the mean as the I/O offset the EPT subtracts from all later measurements.

use crate::{
    debug_util,
    ept::Ept,
    ram::{fill_range, read_samples},
    regs::Registers,
    stats::{compute_statistics, Statistics},
    status::{Error, ErrorKind, Result, Status},
};
use log::{debug, warn};

/// The task ID bit marking a task as active.
pub const TASK_ACTIVE: u8 = 0x80;
/// The number of distinct task IDs the 7 remaining task ID bits can express.
pub const MAX_TASK_IDS: usize = 0x80;

/// The outcome of a [calibrate] run.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationResult {
    /// The statistics of the measured overhead. Only meaningful if they could be computed, i.e.
    /// when the status is either successful or reports a failure to program the I/O offset.
    pub statistics: Statistics,
    pub status: Status,
}

/// Measures the per-task instrumentation overhead with `number_of_tasks` empty tasks and programs
/// its mean as the EPT's I/O offset.
///
/// The run aborts at the first failed step:
/// - [ErrorKind::PeripheralNotReady] if the EPT isn't ready after a reset, keeps reporting ready
///   once started, or doesn't become ready again once stopped,
/// - [ErrorKind::MemoryAccessFault] if clearing the RAM fails,
/// - [ErrorKind::InvalidData] if `number_of_tasks` is below 2 or above the number of task cells
///   the RAM provides, or if the programmed I/O offset doesn't read back.
///
/// The task IDs are toggled inside a critical section, so that no interrupt handler can inflate
/// the measurements.
pub fn calibrate<R: Registers>(ept: &mut Ept<R>, number_of_tasks: usize) -> CalibrationResult {
    let statistics = match measure_overhead(ept, number_of_tasks) {
        Ok(statistics) => statistics,
        Err(error) => {
            warn!("Calibration failed: {error}");
            return CalibrationResult {
                statistics: Statistics::default(),
                status: error.into(),
            };
        }
    };
    let status = apply_io_offset(ept, &statistics).into();
    CalibrationResult { statistics, status }
}

fn measure_overhead<R: Registers>(ept: &mut Ept<R>, number_of_tasks: usize) -> Result<Statistics> {
    ept.reset();
    if !ept.is_ready() {
        return Err(Error::new(
            ErrorKind::PeripheralNotReady,
            "FAIL - EPT module is not ready",
        ));
    }
    debug!("EPT reset, module ready");

    let address_max = ept.map().ram_address_max;
    if let Err(error) = fill_range(ept, 0, address_max, 0) {
        debug!("RAM clear failed: {error}");
        return Err(Error::new(
            ErrorKind::MemoryAccessFault,
            "FAIL - RAM initialization failed",
        ));
    }
    debug!("RAM cleared");

    let max_tasks = ept.map().max_tasks().min(MAX_TASK_IDS);
    if !(2..=max_tasks).contains(&number_of_tasks) {
        return Err(Error::with_details(
            ErrorKind::InvalidData,
            format_args!("FAIL - Number of tasks is out of the limit ({number_of_tasks})"),
        ));
    }

    ept.start();
    if ept.is_ready() {
        // Leave the RAM accessible for whoever handles the failure.
        ept.stop();
        return Err(Error::new(
            ErrorKind::PeripheralNotReady,
            "FAIL - EPT module did not start",
        ));
    }
    critical_section::with(|_cs| {
        // The bounds check above guarantees every ID fits in the lower 7 bits.
        for task in 0..number_of_tasks as u8 {
            ept.set_task(TASK_ACTIVE | task);
            ept.set_task(task);
        }
    });
    ept.stop();
    if !ept.is_ready() {
        return Err(Error::new(
            ErrorKind::PeripheralNotReady,
            "FAIL - EPT module did not stop",
        ));
    }
    debug!("Measured {number_of_tasks} tasks");

    let samples = read_samples(ept, number_of_tasks)?;
    if log::log_enabled!(log::Level::Debug) {
        debug_util::log_samples(log::Level::Debug, &samples);
    }
    let statistics = compute_statistics(&samples)?;
    debug!(
        "Overhead mean {:.2}, stdev {:.2}",
        statistics.mean, statistics.stdev
    );
    Ok(statistics)
}

/// Programs the truncated mean overhead as the I/O offset and verifies it reads back.
fn apply_io_offset<R: Registers>(ept: &mut Ept<R>, statistics: &Statistics) -> Result<()> {
    // Float to integer casts saturate, so means outside 0..=255 clamp to the register's range.
    let offset = statistics.mean as u8;
    ept.set_io_offset(offset);
    let read = ept.io_offset();
    if read != offset {
        return Err(Error::with_details(
            ErrorKind::InvalidData,
            format_args!("Unable to set EPT I/O offset (wrote {offset}, read {read})"),
        ));
    }
    debug!("I/O offset set to {offset}");
    Ok(())
}

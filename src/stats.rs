//! Reduction of timing samples to their mean and sample standard deviation.

use crate::status::{Error, ErrorKind, Result};

/// Summary statistics of a set of timing samples.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Statistics {
    pub sample_count: usize,
    pub mean: f32,
    /// The sample (n - 1) standard deviation.
    pub stdev: f32,
}

/// Computes the mean and sample standard deviation of `samples`.
///
/// At least two samples are required, since the sample standard deviation is undefined
/// otherwise. Fewer samples result in an [ErrorKind::InvalidData] error.
pub fn compute_statistics(samples: &[i32]) -> Result<Statistics> {
    let count = samples.len();
    if count < 2 {
        return Err(Error::with_details(
            ErrorKind::InvalidData,
            format_args!("FAIL - At least 2 samples are required, got {count}"),
        ));
    }

    // A 64-bit sum cannot overflow for any number of samples a SampleSet can hold.
    let sum: i64 = samples.iter().map(|&sample| i64::from(sample)).sum();
    let mean = sum as f64 / count as f64;
    let squared_deviations: f64 = samples
        .iter()
        .map(|&sample| {
            let deviation = f64::from(sample) - mean;
            deviation * deviation
        })
        .sum();
    let stdev = libm::sqrt(squared_deviations / (count - 1) as f64);

    Ok(Statistics {
        sample_count: count,
        mean: mean as f32,
        stdev: stdev as f32,
    })
}

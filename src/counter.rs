//! Reconstruction of the EPT's split cycle counter.
//!
//! The EPT counts cycles in a 40-bit free-running counter, exposed as a 32-bit low register and an
//! 8-bit high register. At 50MHz the low half wraps roughly every 86 seconds, well within a long
//! measurement window, so both halves must be combined to obtain a meaningful cycle count.

/// The width of the EPT cycle counter, in bits.
pub const COUNTER_BITS: u32 = 40;
/// The largest value the EPT cycle counter can hold before wrapping.
pub const COUNTER_MAX: u64 = (1 << COUNTER_BITS) - 1;

/// The raw hardware representation of the EPT cycle counter.
///
/// The counter changes continuously while the EPT runs, so a value of this type is only a snapshot
/// and should be read afresh (see [crate::ept::Ept::counter]) rather than kept around.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SplitCounter {
    pub low: u32,
    pub high: u8,
}

impl SplitCounter {
    /// Combines both halves into a single cycle count. See [reconstruct].
    pub const fn cycles(self) -> u64 {
        reconstruct(self)
    }
}

/// Combines the counter halves into the 40-bit cycle count they represent.
///
/// The result is monotonically non-decreasing as long as the counter has not wrapped past 2^40
/// cycles since the last EPT start or reset.
pub const fn reconstruct(counter: SplitCounter) -> u64 {
    // The field types already limit each half to its register width (8 and 32 bits).
    ((counter.high as u64) << 32) | counter.low as u64
}

/// Converts a number of elapsed cycles into milliseconds, given the counter's clock frequency.
pub fn elapsed_millis(cycles: u64, clock_hz: u64) -> f64 {
    cycles as f64 / clock_hz as f64 * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reconstruct_combines_halves() {
        assert_eq!(
            0x1_FFFF_FFFF,
            reconstruct(SplitCounter {
                low: 0xFFFF_FFFF,
                high: 0x01
            })
        );
        assert_eq!(
            COUNTER_MAX,
            SplitCounter {
                low: u32::MAX,
                high: u8::MAX
            }
            .cycles()
        );
        assert_eq!(0, reconstruct(SplitCounter::default()));
    }

    // Crossing the low half's wrap point must not make the reconstructed value go backwards.
    #[test]
    fn reconstruct_is_monotonic_across_low_wrap() {
        let before = reconstruct(SplitCounter {
            low: 0xFFFF_FFF0,
            high: 0x02,
        });
        let after = reconstruct(SplitCounter {
            low: 0x0000_0010,
            high: 0x03,
        });
        assert!(after > before);
        assert_eq!(0x20, after - before);
    }

    #[test]
    fn elapsed_millis_at_reference_clock() {
        assert_eq!(1000.0, elapsed_millis(50_000_000, 50_000_000));
        assert_eq!(2000.0, elapsed_millis(100_000_000, 50_000_000));
        // A different deployment clock changes the result.
        assert_eq!(500.0, elapsed_millis(50_000_000, 100_000_000));
    }
}

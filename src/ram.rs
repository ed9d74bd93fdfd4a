//! Write-verified access to ranges of the EPT's on-chip RAM.

use crate::{
    ept::Ept,
    regs::Registers,
    status::{Error, ErrorKind, Result},
};
use log::{trace, warn};

/// The largest number of samples a [SampleSet] can hold. Equal to the largest RAM the EPT is
/// built with.
pub const SAMPLE_CAPACITY: usize = 128;

/// Per-task cycle counts read back from the EPT RAM, indexed by task ID.
pub type SampleSet = heapless::Vec<i32, SAMPLE_CAPACITY>;

/// Fills the inclusive RAM address range `[start, stop]` with `value`, reading every cell back
/// right after writing it.
///
/// The range is validated before anything is written: an [ErrorKind::InvalidAddress] error is
/// returned if `start > stop` or `stop` lies beyond the RAM. The fill stops at the first cell that
/// doesn't read back as written, returning an [ErrorKind::MemoryAccessFault] error describing
/// the cell. Cells outside the range are never touched.
///
/// The EPT must be stopped, since its RAM is not accessible while it runs.
pub fn fill_range<R: Registers>(
    ept: &mut Ept<R>,
    start: usize,
    stop: usize,
    value: u32,
) -> Result<()> {
    let address_max = ept.map().ram_address_max;
    if start > stop || stop > address_max {
        return Err(Error::with_details(
            ErrorKind::InvalidAddress,
            format_args!("FAIL - Invalid input address range 0x{start:x}-0x{stop:x}"),
        ));
    }

    trace!("Filling RAM 0x{start:02x}-0x{stop:02x} with 0x{value:08x}");
    for address in start..=stop {
        ept.ram_write(address, value);
        let read = ept.ram_read(address);
        if read != value {
            warn!("RAM mismatch at 0x{address:02x}: wrote 0x{value:08x}, read 0x{read:08x}");
            return Err(Error::with_details(
                ErrorKind::MemoryAccessFault,
                format_args!(
                    "FAIL - RAM data mismatch at 0x{address:02x}: wrote 0x{value:x}, read 0x{read:x}"
                ),
            ));
        }
    }
    Ok(())
}

/// Reads `count` consecutive cells from the start of the RAM, in address order.
///
/// Returns an [ErrorKind::InvalidAddress] error if the RAM has fewer than `count` cells, and an
/// [ErrorKind::InvalidData] error if `count` exceeds [SAMPLE_CAPACITY].
pub fn read_samples<R: Registers>(ept: &mut Ept<R>, count: usize) -> Result<SampleSet> {
    if count > ept.map().ram_cells() {
        return Err(Error::with_details(
            ErrorKind::InvalidAddress,
            format_args!("FAIL - Cannot read {count} samples from RAM"),
        ));
    }
    let mut samples = SampleSet::new();
    for address in 0..count {
        // The EPT stores cycle counts as words, which are reinterpreted as signed values.
        let sample = ept.ram_read(address) as i32;
        samples.push(sample).map_err(|_| {
            Error::with_details(
                ErrorKind::InvalidData,
                format_args!("FAIL - More than {SAMPLE_CAPACITY} samples requested"),
            )
        })?;
    }
    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ept::EptRegisterMap,
        sim::{SimConfig, SimFaults, SimulatedEpt, StuckBits},
    };

    fn sim() -> SimulatedEpt {
        SimulatedEpt::new(EptRegisterMap::REFERENCE, SimConfig::default())
    }

    #[test]
    fn fill_range_leaves_cells_below_start_untouched() {
        let mut sim = sim();
        for address in 0..0x80 {
            sim.poke_ram(address, 0xAAAA_0000 | address as u32);
        }
        let mut ept = Ept::new(&mut sim, EptRegisterMap::REFERENCE);
        assert_eq!(Ok(()), fill_range(&mut ept, 0x10, 0x20, 0x1234_5678));

        let ram = sim.ram();
        assert!(ram[0x10..=0x20].iter().all(|&word| word == 0x1234_5678));
        for address in (0..0x10).chain(0x21..0x80) {
            assert_eq!(0xAAAA_0000 | address as u32, ram[address]);
        }
    }

    #[test]
    fn fill_range_covers_the_whole_ram() {
        let mut sim = sim();
        let mut ept = Ept::new(&mut sim, EptRegisterMap::REFERENCE);
        assert_eq!(Ok(()), fill_range(&mut ept, 0, 0x7F, 0));
        assert!(sim.ram().iter().all(|&word| word == 0));
        assert_eq!(0x80, sim.stats().ram_writes);
    }

    // Invalid ranges are rejected before any RAM cell is written.
    #[test]
    fn fill_range_rejects_invalid_ranges_without_writing() {
        let mut sim = sim();
        let mut ept = Ept::new(&mut sim, EptRegisterMap::REFERENCE);
        for (start, stop) in [(5, 4), (0, 0x80), (0x80, 0x90)] {
            let error = fill_range(&mut ept, start, stop, 0xFFFF_FFFF).unwrap_err();
            assert_eq!(ErrorKind::InvalidAddress, error.kind);
        }
        assert_eq!(0, sim.stats().ram_writes);
    }

    // The fill stops at the first faulty cell and reports what was written and read.
    #[test]
    fn fill_range_fails_fast_on_mismatch() {
        let mut sim = sim().with_faults(SimFaults {
            stuck_ram_bits: Some(StuckBits {
                address: 0x05,
                mask: 0x0000_00F0,
                high: false,
            }),
            ..Default::default()
        });
        let mut ept = Ept::new(&mut sim, EptRegisterMap::REFERENCE);
        let error = fill_range(&mut ept, 0, 0x7F, 0xFFFF_FFFF).unwrap_err();
        assert_eq!(ErrorKind::MemoryAccessFault, error.kind);
        assert_eq!(
            "FAIL - RAM data mismatch at 0x05: wrote 0xffffffff, read 0xffffff0f",
            error.description.as_str()
        );
        assert_eq!(6, sim.stats().ram_writes);
        assert_eq!(0, sim.ram()[0x06]);
    }

    #[test]
    fn fill_range_is_idempotent() {
        let mut sim = sim();
        let mut ept = Ept::new(&mut sim, EptRegisterMap::REFERENCE);
        assert_eq!(Ok(()), fill_range(&mut ept, 3, 9, 0xC0FF_EE00));
        let first: Vec<u32> = ept.into_inner().ram().to_vec();
        let mut ept = Ept::new(&mut sim, EptRegisterMap::REFERENCE);
        assert_eq!(Ok(()), fill_range(&mut ept, 3, 9, 0xC0FF_EE00));
        assert_eq!(first, sim.ram());
    }

    #[test]
    fn read_samples_in_address_order() {
        let mut sim = sim();
        sim.poke_ram(0, 17);
        sim.poke_ram(1, 19);
        sim.poke_ram(2, 0xFFFF_FFFF);
        let mut ept = Ept::new(&mut sim, EptRegisterMap::REFERENCE);
        let samples = read_samples(&mut ept, 3).unwrap();
        assert_eq!(&[17, 19, -1], samples.as_slice());
        assert_eq!(
            ErrorKind::InvalidAddress,
            read_samples(&mut ept, 0x81).unwrap_err().kind
        );
    }
}

//! Contains debug utilities that may be useful for users of this crate.

use core::fmt;

/// The number of values printed per row.
const ROW_LEN: usize = 8;
/// The number of values per group within a row.
const GROUP_LEN: usize = 4;

/// A wrapper struct whose [core::fmt::Display] implementation prints the provided data in rows,
/// with each row containing 8 values in up to two groups of up to 4 values each, with each value
/// formatted by the provided formatting function. Every row starts with the index of its first
/// value, which for RAM contents is the RAM address.
struct FormatDataInRowsAndGroups<'a, T, F> {
    data: &'a [T],
    elem_formatter: F,
}

impl<'a, T, F, R> fmt::Display for FormatDataInRowsAndGroups<'a, T, F>
where
    F: Fn(&'a T) -> R,
    R: fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (row_idx, row_values) in self.data.chunks(ROW_LEN).enumerate() {
            if row_idx > 0 {
                writeln!(f)?;
            }
            let offset = row_idx * ROW_LEN;
            write!(f, "{offset:04x}: ")?;

            // Groups are separated by two spaces, and elements within a group by one.
            for (group_idx, group_values) in row_values.chunks(GROUP_LEN).enumerate() {
                if group_idx > 0 {
                    write!(f, "  ")?;
                }
                for (elem_idx, elem) in group_values.iter().enumerate() {
                    if elem_idx > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", (self.elem_formatter)(elem))?;
                }
            }
        }
        Ok(())
    }
}

/// A word formatter that prints the value in zero-padded hexadecimal format.
struct HexFormatter<'a>(&'a u32);
impl<'a> fmt::Display for HexFormatter<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

/// A sample formatter that prints the value in decimal, right-aligned.
struct DecimalFormatter<'a>(&'a i32);
impl<'a> fmt::Display for DecimalFormatter<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>6}", self.0)
    }
}

/// Logs the given RAM words in a human-readable format, 8 words per row, with each word printed
/// in its hexadecimal representation.
pub fn log_words_hex(log_level: log::Level, data: &[u32]) {
    log::log!(
        log_level,
        "Length: {} words\n{}",
        data.len(),
        FormatDataInRowsAndGroups {
            data,
            elem_formatter: HexFormatter
        }
    );
}

/// Logs the given timing samples in a human-readable format, 8 samples per row, each printed in
/// decimal.
pub fn log_samples(log_level: log::Level, data: &[i32]) {
    log::log!(
        log_level,
        "Samples: {}\n{}",
        data.len(),
        FormatDataInRowsAndGroups {
            data,
            elem_formatter: DecimalFormatter
        }
    );
}

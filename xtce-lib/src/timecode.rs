//! CCSDS time codes used as raw encodings of absolute time items.
//!
//! Reference: [CCSDS Time Code Formats](https://public.ccsds.org/Pubs/301x0b4e1.pdf)
use hifitime::{Duration, Epoch};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Number of seconds between the 1958 and 1900
const CCSDS_HIFIEPOCH_DELTA_SECS: u64 = 1830297600;
/// Default number of bytes for the CDS milliseconds field
const NUM_CDS_MILLIS_OF_DAY_BYTES: usize = 4;
/// Max number of u64 nanoseconds that can be cast to f64 w/o precision loss
const MAX_FINE_NANOS: f64 = 4_503_599_627_370_496.0;
const NANOS_PER_DAY: i128 = 86_400 * 1_000_000_000;

/// CCSDS timecode format configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Format {
    /// Day segmented timecode parameters.
    ///
    /// Valid combinations are:
    /// |`num_day`|`num_submillis`| |
    /// |---|---|---|
    /// |2|0|No sub-milliseconds|
    /// |2|2|Microsecond resolution|
    /// |2|4|Picosecond resolution|
    /// |3|0|No sub-milliseconds|
    /// |3|2|Microsecond resolution|
    /// |3|4|Picosecond resolution|
    Cds {
        num_day: usize,
        num_submillis: usize,
    },
    /// Unsegmented timecode parameters.
    ///
    /// Valid `num_coarse` is between 1 and 4.
    /// Valid `num_fine` is between 0 and 3.
    Cuc {
        num_coarse: usize,
        num_fine: usize,
        /// Factor by which to multiple `num_fine` to produce nanoseconds. When not set the
        /// fine field is a binary fraction of a second.
        #[serde(default)]
        fine_mult: Option<f32>,
    },
}

impl Format {
    /// Encoded size of a time code in this format.
    #[must_use]
    pub fn size_in_bits(&self) -> usize {
        8 * match self {
            Format::Cds {
                num_day,
                num_submillis,
            } => num_day + NUM_CDS_MILLIS_OF_DAY_BYTES + num_submillis,
            Format::Cuc {
                num_coarse,
                num_fine,
                ..
            } => num_coarse + num_fine,
        }
    }
}

/// Check that a format describes a supported time code.
///
/// # Errors
/// [Error::TimecodeConfig] describing the unsupported field.
pub fn validate(format: &Format) -> Result<()> {
    match format {
        Format::Cds {
            num_day,
            num_submillis,
        } => {
            if !(2..=3).contains(num_day) {
                return Err(Error::TimecodeConfig(format!(
                    "Number of CDS day bytes must be 2 or 3; got {num_day}"
                )));
            }
            if ![0, 2, 4].contains(num_submillis) {
                return Err(Error::TimecodeConfig(format!(
                    "Number of CDS sub-millisecond must be 0, 2, or 4; got {num_submillis}"
                )));
            }
        }
        Format::Cuc {
            num_coarse,
            num_fine,
            ..
        } => {
            if !(1..=4).contains(num_coarse) {
                return Err(Error::TimecodeConfig(
                    "Number of CUC coarse bytes must be 1 to 4".to_string(),
                ));
            }
            if !(0..=3).contains(num_fine) {
                return Err(Error::TimecodeConfig(
                    "Number of CUC fine bytes must be 0 to 3".to_string(),
                ));
            }
        }
    }
    Ok(())
}

/// Decode `buf` into [hifitime::Epoch].
///
/// # Errors
/// [Error::NotEnoughData] if there is not enough data for the provided format, or
/// [Error::TimecodeConfig] if a timecode cannot be constructected for the provided format. This
/// will usually be due to providing unsupported timecode values in a format field.
pub fn decode(format: &Format, buf: &[u8]) -> Result<Epoch> {
    validate(format)?;
    let want = format.size_in_bits() / 8;
    if buf.len() < want {
        return Err(Error::NotEnoughData {
            actual: buf.len(),
            minimum: want,
        });
    }
    match format {
        Format::Cds {
            num_day,
            num_submillis,
        } => Ok(decode_cds(*num_day, *num_submillis, buf)),
        Format::Cuc {
            num_coarse,
            num_fine,
            fine_mult,
        } => decode_cuc(*num_coarse, *num_fine, *fine_mult, buf),
    }
}

/// Encode `epoch` as a time code.
///
/// # Errors
/// [Error::TimecodeConfig] for an unsupported format, or [Error::Overflow] if `epoch` is
/// before the CCSDS epoch or too far after it to be represented.
pub fn encode(format: &Format, epoch: Epoch) -> Result<Vec<u8>> {
    validate(format)?;
    match format {
        Format::Cds {
            num_day,
            num_submillis,
        } => encode_cds(*num_day, *num_submillis, epoch),
        Format::Cuc {
            num_coarse,
            num_fine,
            fine_mult,
        } => encode_cuc(*num_coarse, *num_fine, *fine_mult, epoch),
    }
}

fn be_uint(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b))
}

/// Low `len` bytes of `value`, big-endian.
fn be_bytes(value: u64, len: usize) -> Result<Vec<u8>> {
    if len < 8 && value >> (len * 8) != 0 {
        return Err(Error::Overflow);
    }
    Ok(value.to_be_bytes()[8 - len..].to_vec())
}

fn ccsds_epoch_delta() -> Duration {
    Duration::compose(0, 0, 0, 0, CCSDS_HIFIEPOCH_DELTA_SECS, 0, 0, 0)
}

fn decode_cds(num_day: usize, num_submillis: usize, buf: &[u8]) -> Epoch {
    let (x, rest) = buf.split_at(num_day);
    let days = be_uint(x);
    let millis = be_uint(&rest[..NUM_CDS_MILLIS_OF_DAY_BYTES]);
    let submillis = be_uint(&rest[NUM_CDS_MILLIS_OF_DAY_BYTES..][..num_submillis]);
    let nanos = match num_submillis {
        // microseconds
        2 => submillis * 1_000,
        // picoseconds
        4 => submillis / 1_000,
        _ => 0,
    };

    let dur = Duration::compose(
        0,
        days,
        0,
        0,
        // Add in delta to get to hifi epoch
        CCSDS_HIFIEPOCH_DELTA_SECS,
        millis,
        0,
        nanos,
    );
    Epoch::from_utc_duration(dur)
}

fn encode_cds(num_day: usize, num_submillis: usize, epoch: Epoch) -> Result<Vec<u8>> {
    let nanos = (epoch.to_utc_duration() - ccsds_epoch_delta()).total_nanoseconds();
    if nanos < 0 {
        return Err(Error::Overflow);
    }
    let days = u64::try_from(nanos / NANOS_PER_DAY).map_err(|_| Error::Overflow)?;
    let rem = (nanos % NANOS_PER_DAY) as u64;
    let millis = rem / 1_000_000;
    let sub = rem % 1_000_000;

    let mut buf = be_bytes(days, num_day)?;
    buf.extend(be_bytes(millis, NUM_CDS_MILLIS_OF_DAY_BYTES)?);
    match num_submillis {
        2 => buf.extend(be_bytes(sub / 1_000, 2)?),
        4 => buf.extend(be_bytes(sub * 1_000, 4)?),
        _ => {}
    }
    Ok(buf)
}

fn decode_cuc(
    num_coarse: usize,
    num_fine: usize,
    fine_mult: Option<f32>,
    buf: &[u8],
) -> Result<Epoch> {
    let (x, rest) = buf.split_at(num_coarse);
    let coarse = be_uint(x);
    let fine = be_uint(&rest[..num_fine]);

    // Convert to hifi epoch
    let coarse = coarse + CCSDS_HIFIEPOCH_DELTA_SECS;

    let fine_nanos = match fine_mult {
        Some(mult) => (fine as f64 * f64::from(mult)).trunc(),
        None => (fine as f64 * 1e9 / (1u64 << (8 * num_fine)) as f64).trunc(),
    };
    if fine_nanos > MAX_FINE_NANOS {
        return Err(Error::Overflow);
    }
    let dur = Duration::compose(0, 0, 0, 0, coarse, 0, 0, fine_nanos as u64);
    Ok(Epoch::from_tai_duration(dur))
}

fn encode_cuc(
    num_coarse: usize,
    num_fine: usize,
    fine_mult: Option<f32>,
    epoch: Epoch,
) -> Result<Vec<u8>> {
    let nanos = (epoch.to_tai_duration() - ccsds_epoch_delta()).total_nanoseconds();
    if nanos < 0 {
        return Err(Error::Overflow);
    }
    let coarse = u64::try_from(nanos / 1_000_000_000).map_err(|_| Error::Overflow)?;
    let rem = (nanos % 1_000_000_000) as u64;
    let fine = match fine_mult {
        Some(mult) => (rem as f64 / f64::from(mult)).round() as u64,
        // rounded up so the fraction decodes back to at least `rem`
        None => ((u128::from(rem) << (8 * num_fine)).div_ceil(1_000_000_000)) as u64,
    };

    let mut buf = be_bytes(coarse, num_coarse)?;
    if num_fine > 0 {
        let max = (1u64 << (8 * num_fine)) - 1;
        buf.extend(be_bytes(fine.min(max), num_fine)?);
    }
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn cds() {
        let buf = vec![0x5f, 0x5b, 0x00, 0x00, 0x06, 0x94, 0x02, 0x07];
        let cds = decode_cds(2, 2, &buf);

        let expected = Epoch::from_str("2024-11-01T00:00:01.684519Z").unwrap();

        assert_eq!(cds, expected, "timecode={:?}", cds);
        assert_eq!(encode_cds(2, 2, cds).unwrap(), buf);
    }

    #[test]
    fn cds_picoseconds() {
        let format = Format::Cds {
            num_day: 2,
            num_submillis: 4,
        };
        let epoch = Epoch::from_str("2024-11-01T00:00:01.684519250Z").unwrap();
        let buf = encode(&format, epoch).unwrap();
        assert_eq!(buf.len(), 10);
        assert_eq!(decode(&format, &buf).unwrap(), epoch);
    }

    #[test]
    fn eos_cuc() {
        // NASA EOS Spacecraft (BGAD) data
        let buf = vec![0x7d, 0xb5, 0xbf, 0x2f, 0x80, 0x1f];
        let cuc = decode_cuc(4, 2, Some(15200.0), &buf).unwrap();

        let expected = Epoch::from_str("2024-10-31T10:49:19.498544800 TAI").unwrap();

        assert_eq!(cuc, expected);
    }

    #[test]
    fn cuc_binary_fraction_roundtrip() {
        let format = Format::Cuc {
            num_coarse: 4,
            num_fine: 2,
            fine_mult: None,
        };
        let buf = vec![0x7d, 0xb5, 0xbf, 0x2f, 0x80, 0x00];
        let epoch = decode(&format, &buf).unwrap();
        assert_eq!(
            epoch,
            Epoch::from_str("2024-10-31T10:49:19.5 TAI").unwrap()
        );
        assert_eq!(encode(&format, epoch).unwrap(), buf);
    }

    #[test]
    fn invalid_formats() {
        assert!(matches!(
            validate(&Format::Cds {
                num_day: 2,
                num_submillis: 3
            }),
            Err(Error::TimecodeConfig(_))
        ));
        assert!(matches!(
            decode(
                &Format::Cuc {
                    num_coarse: 4,
                    num_fine: 0,
                    fine_mult: None
                },
                &[0, 1]
            ),
            Err(Error::NotEnoughData {
                actual: 2,
                minimum: 4
            })
        ));
    }

    #[test]
    fn before_epoch_overflows() {
        let format = Format::Cuc {
            num_coarse: 4,
            num_fine: 0,
            fine_mult: None,
        };
        let epoch = Epoch::from_str("1950-01-01T00:00:00 TAI").unwrap();
        assert!(matches!(encode(&format, epoch), Err(Error::Overflow)));
    }
}

//! Bit level storage for raw container and item values.
//!
//! All bits are stored most significant bit first, the same order they appear on the wire.
use std::fmt::{self, Debug, Display};

/// A sequence of bits of arbitrary length.
///
/// Bits are packed MSB-first into bytes. Any unused bits at the end of the last byte are
/// always zero.
///
/// # Example
/// ```
/// use xtce::RawBits;
///
/// let bits = RawBits::from_uint(0x7ff, 11);
/// assert_eq!(bits.len(), 11);
/// assert_eq!(bits.to_u64(), 0x7ff);
/// assert_eq!(bits.to_hex(), "0x07ff");
/// ```
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct RawBits {
    data: Vec<u8>,
    len: usize,
}

impl RawBits {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All zero bits of length `len`.
    #[must_use]
    pub fn zeros(len: usize) -> Self {
        RawBits {
            data: vec![0u8; len.div_ceil(8)],
            len,
        }
    }

    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        RawBits {
            data: bytes.to_vec(),
            len: bytes.len() * 8,
        }
    }

    /// The low-order `len` bits of `value`. Lengths over 64 are zero extended.
    #[must_use]
    pub fn from_uint(value: u64, len: usize) -> Self {
        let mut bits = Self::zeros(len);
        for i in 0..len.min(64) {
            if (value >> i) & 1 == 1 {
                bits.set(len - 1 - i, true);
            }
        }
        bits
    }

    /// Parse a hex string, with or without a `0x` prefix. An odd number of digits is
    /// treated as if it had a leading zero.
    ///
    /// # Errors
    /// If `s` contains non-hex characters.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let s = s.trim();
        let s = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        let bytes = if s.len() % 2 == 1 {
            hex::decode(format!("0{s}"))?
        } else {
            hex::decode(s)?
        };
        Ok(Self::from_bytes(&bytes))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Get the bit at `idx`.
    ///
    /// # Panics
    /// If `idx` is out of range.
    #[must_use]
    pub fn get(&self, idx: usize) -> bool {
        assert!(idx < self.len, "bit index {idx} out of range {}", self.len);
        (self.data[idx / 8] >> (7 - idx % 8)) & 1 == 1
    }

    /// Set the bit at `idx`.
    ///
    /// # Panics
    /// If `idx` is out of range.
    pub fn set(&mut self, idx: usize, value: bool) {
        assert!(idx < self.len, "bit index {idx} out of range {}", self.len);
        let mask = 1u8 << (7 - idx % 8);
        if value {
            self.data[idx / 8] |= mask;
        } else {
            self.data[idx / 8] &= !mask;
        }
    }

    /// Copy `len` bits starting at `start`, or `None` if the range extends past the end.
    #[must_use]
    pub fn slice(&self, start: usize, len: usize) -> Option<RawBits> {
        if start.checked_add(len)? > self.len {
            return None;
        }
        if start % 8 == 0 {
            let mut data = self.data[start / 8..(start + len).div_ceil(8)].to_vec();
            mask_tail(&mut data, len);
            return Some(RawBits { data, len });
        }
        let mut bits = Self::zeros(len);
        for i in 0..len {
            if self.get(start + i) {
                bits.set(i, true);
            }
        }
        Some(bits)
    }

    /// The last (low-order) `len` bits. If `len` is larger than this sequence the result is
    /// zero extended on the high-order side.
    #[must_use]
    pub fn low_bits(&self, len: usize) -> RawBits {
        if len <= self.len {
            // range is checked above
            return self.slice(self.len - len, len).unwrap_or_default();
        }
        let mut bits = Self::zeros(len - self.len);
        bits.extend(self);
        bits
    }

    /// Interpret the low-order 64 bits as an unsigned integer.
    #[must_use]
    pub fn to_u64(&self) -> u64 {
        let start = self.len.saturating_sub(64);
        (start..self.len).fold(0u64, |acc, i| (acc << 1) | u64::from(self.get(i)))
    }

    /// Bytes holding the bits, MSB-first, with the final byte zero padded.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Bytes holding the value right aligned, i.e., zero padded on the high-order side to a
    /// whole number of bytes.
    #[must_use]
    pub fn to_aligned_bytes(&self) -> Vec<u8> {
        let padded = self.len.div_ceil(8) * 8;
        self.low_bits(padded).data
    }

    /// Append all bits from `other`.
    pub fn extend(&mut self, other: &RawBits) {
        if self.len % 8 == 0 {
            self.data.truncate(self.len / 8);
            self.data.extend_from_slice(&other.data);
            self.len += other.len;
            return;
        }
        let start = self.len;
        self.resize(self.len + other.len);
        for i in 0..other.len {
            if other.get(i) {
                self.set(start + i, true);
            }
        }
    }

    /// Append the low-order `len` bits of `value`.
    pub fn push_uint(&mut self, value: u64, len: usize) {
        self.extend(&Self::from_uint(value, len));
    }

    /// Overwrite the bits at `start` with `other`, growing as needed.
    pub fn write_at(&mut self, start: usize, other: &RawBits) {
        if start + other.len > self.len {
            self.resize(start + other.len);
        }
        for i in 0..other.len {
            self.set(start + i, other.get(i));
        }
    }

    /// Truncate or zero extend at the end.
    pub fn resize(&mut self, len: usize) {
        self.data.resize(len.div_ceil(8), 0);
        self.len = len;
        mask_tail(&mut self.data, len);
    }

    /// Hex representation of the right aligned value with a `0x` prefix.
    #[must_use]
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.to_aligned_bytes()))
    }

    /// Binary digit representation, one character per bit.
    #[must_use]
    pub fn to_binary_string(&self) -> String {
        (0..self.len)
            .map(|i| if self.get(i) { '1' } else { '0' })
            .collect()
    }
}

fn mask_tail(data: &mut [u8], len: usize) {
    let rem = len % 8;
    if rem != 0 {
        if let Some(last) = data.last_mut() {
            *last &= 0xffu8 << (8 - rem);
        }
    }
}

impl Display for RawBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Debug for RawBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawBits{{len={}, {}}}", self.len, self.to_hex())
    }
}

impl From<&[u8]> for RawBits {
    fn from(value: &[u8]) -> Self {
        Self::from_bytes(value)
    }
}

impl From<Vec<u8>> for RawBits {
    fn from(data: Vec<u8>) -> Self {
        let len = data.len() * 8;
        RawBits { data, len }
    }
}

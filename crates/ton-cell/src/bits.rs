//! Bit strings.
//!
//! [`Bits`] is an owned, MSB-first bit sequence. Bits past `len` in the last
//! byte are always zero, so equality and hashing can work on the raw bytes.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE};

use crate::{CellError, CellResult};

/// An ordered sequence of bits, MSB-first within each byte.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct Bits {
    data: Vec<u8>,
    len: usize,
}

impl Bits {
    /// Creates an empty bit string.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty bit string with room for `bits` bits.
    pub fn with_capacity(bits: usize) -> Self {
        Self {
            data: Vec::with_capacity(bits.div_ceil(8)),
            len: 0,
        }
    }

    /// Creates a bit string of `bytes.len() * 8` bits.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            data: bytes.to_vec(),
            len: bytes.len() * 8,
        }
    }

    /// Creates a bit string from the first `len` bits of `data`.
    pub fn from_raw(mut data: Vec<u8>, len: usize) -> CellResult<Self> {
        if len > data.len() * 8 {
            return Err(CellError::NotEnoughBits {
                need: len,
                have: data.len() * 8,
            });
        }
        data.truncate(len.div_ceil(8));
        let rem = len % 8;
        if rem != 0
            && let Some(last) = data.last_mut()
        {
            *last &= 0xFFu8 << (8 - rem);
        }
        Ok(Self { data, len })
    }

    /// `len` copies of `bit`.
    pub fn repeat(bit: bool, len: usize) -> Self {
        let mut bits = Self::with_capacity(len);
        for _ in 0..len {
            bits.push(bit);
        }
        bits
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the bit at `index`, or `None` if out of range.
    pub fn get(&self, index: usize) -> Option<bool> {
        (index < self.len).then(|| self.bit_at(index))
    }

    /// Unchecked bit access for callers that already validated `index`.
    pub(crate) fn bit_at(&self, index: usize) -> bool {
        (self.data[index / 8] >> (7 - index % 8)) & 1 == 1
    }

    /// The backing bytes; the final partial byte is zero-padded.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Appends one bit.
    pub fn push(&mut self, bit: bool) {
        if self.len % 8 == 0 {
            self.data.push(0);
        }
        if bit {
            let idx = self.len;
            self.data[idx / 8] |= 1 << (7 - idx % 8);
        }
        self.len += 1;
    }

    /// Appends all bits of `other`.
    pub fn extend(&mut self, other: &Bits) {
        if self.len % 8 == 0 {
            self.data.extend_from_slice(&other.data);
            self.len += other.len;
            return;
        }
        for bit in other.iter() {
            self.push(bit);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = bool> + '_ {
        (0..self.len).map(|i| self.bit_at(i))
    }

    /// Copies out bits `[start, end)`.
    pub fn slice(&self, start: usize, end: usize) -> CellResult<Bits> {
        if start > end || end > self.len {
            return Err(CellError::NotEnoughBits {
                need: end,
                have: self.len,
            });
        }
        let mut out = Bits::with_capacity(end - start);
        for i in start..end {
            out.push(self.bit_at(i));
        }
        Ok(out)
    }

    /// Length of the common prefix of `self` and `other`.
    pub fn common_prefix_len(&self, other: &Bits) -> usize {
        self.iter()
            .zip(other.iter())
            .take_while(|(a, b)| a == b)
            .count()
    }

    /// Pads to a multiple of `divider` (4 or 8) with a `1` followed by zeros.
    /// Already aligned strings are returned unchanged.
    pub fn augment(&self, divider: usize) -> CellResult<Bits> {
        check_divider(divider)?;
        let padded = self.len.div_ceil(divider) * divider;
        let mut out = self.clone();
        if padded == self.len {
            return Ok(out);
        }
        out.push(true);
        while out.len < padded {
            out.push(false);
        }
        Ok(out)
    }

    /// Removes augmentation: drops the last `1` within the final `divider`
    /// bits and everything after it.
    pub fn rollback(&self, divider: usize) -> CellResult<Bits> {
        check_divider(divider)?;
        if self.len < divider {
            return Err(CellError::InvalidBitString(format!(
                "{} bits cannot hold a {divider}-bit completion tag",
                self.len
            )));
        }
        let pos = (self.len - divider..self.len)
            .rev()
            .find(|&i| self.bit_at(i))
            .ok_or_else(|| CellError::InvalidBitString("incorrectly augmented bits".into()))?;
        self.slice(0, pos)
    }

    /// `"0101..."`
    pub fn to_bin_string(&self) -> String {
        self.iter().map(|b| if b { '1' } else { '0' }).collect()
    }

    /// Upper-case hex; non nibble-aligned strings are augmented to a nibble
    /// and marked with a trailing `_`.
    pub fn to_hex_string(&self) -> String {
        let aligned = self.len % 4 == 0;
        let source = if aligned {
            self.clone()
        } else {
            // divider 4 is always valid
            self.augment(4).unwrap_or_default()
        };
        let mut out = hex::encode_upper(&source.data);
        out.truncate(source.len / 4);
        if !aligned {
            out.push('_');
        }
        out
    }

    /// `b{0101}`
    pub fn to_fift_bin(&self) -> String {
        format!("b{{{}}}", self.to_bin_string())
    }

    /// `x{ABC_}`
    pub fn to_fift_hex(&self) -> String {
        format!("x{{{}}}", self.to_hex_string())
    }

    /// Standard base64 of the zero-padded bytes.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.data)
    }

    /// URL-safe base64 of the zero-padded bytes.
    pub fn to_base64_url(&self) -> String {
        URL_SAFE.encode(&self.data)
    }

    /// Parses `"0101..."`.
    pub fn from_bin_str(s: &str) -> CellResult<Bits> {
        let mut bits = Bits::with_capacity(s.len());
        for c in s.chars() {
            match c {
                '0' => bits.push(false),
                '1' => bits.push(true),
                _ => return Err(CellError::InvalidBitString(s.to_string())),
            }
        }
        Ok(bits)
    }

    /// Parses hex with an optional trailing `_` completion marker.
    pub fn from_hex_str(s: &str) -> CellResult<Bits> {
        let (digits, partial) = match s.strip_suffix('_') {
            Some(d) => (d, true),
            None => (s, false),
        };

        let mut bits = Bits::with_capacity(digits.len() * 4);
        for c in digits.chars() {
            let nibble = c
                .to_digit(16)
                .ok_or_else(|| CellError::InvalidBitString(s.to_string()))?;
            for shift in (0..4).rev() {
                bits.push((nibble >> shift) & 1 == 1);
            }
        }

        if !partial {
            return Ok(bits);
        }
        let pos = (0..bits.len)
            .rev()
            .find(|&i| bits.bit_at(i))
            .ok_or_else(|| CellError::InvalidBitString(s.to_string()))?;
        bits.slice(0, pos)
    }

    /// Parses standard or URL-safe base64 (padding optional) as whole bytes.
    pub fn from_base64(s: &str) -> CellResult<Bits> {
        let normalized: String = s
            .trim_end_matches('=')
            .chars()
            .map(|c| match c {
                '-' => '+',
                '_' => '/',
                c => c,
            })
            .collect();
        base64::engine::general_purpose::STANDARD_NO_PAD
            .decode(normalized)
            .map(|bytes| Bits::from_bytes(&bytes))
            .map_err(|e| CellError::InvalidBase64(e.to_string()))
    }
}

fn check_divider(divider: usize) -> CellResult<()> {
    if divider == 4 || divider == 8 {
        Ok(())
    } else {
        Err(CellError::InvalidBitLength(divider))
    }
}

impl Ord for Bits {
    fn cmp(&self, other: &Self) -> Ordering {
        let common = self.common_prefix_len(other);
        match (self.get(common), other.get(common)) {
            (Some(a), Some(b)) => a.cmp(&b),
            _ => self.len.cmp(&other.len),
        }
    }
}

impl PartialOrd for Bits {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl FromIterator<bool> for Bits {
    fn from_iter<I: IntoIterator<Item = bool>>(iter: I) -> Self {
        let mut bits = Bits::new();
        for bit in iter {
            bits.push(bit);
        }
        bits
    }
}

/// Accepts `b{...}`, `x{...}`, plain binary and plain hex. A string made of
/// only `0`/`1` is read as binary.
impl FromStr for Bits {
    type Err = CellError;

    fn from_str(s: &str) -> CellResult<Self> {
        if let Some(inner) = s.strip_prefix("b{").and_then(|r| r.strip_suffix('}')) {
            return Bits::from_bin_str(inner);
        }
        if let Some(inner) = s.strip_prefix("x{").and_then(|r| r.strip_suffix('}')) {
            return Bits::from_hex_str(inner);
        }
        if s.chars().all(|c| c == '0' || c == '1') {
            return Bits::from_bin_str(s);
        }
        Bits::from_hex_str(s)
    }
}

impl fmt::Display for Bits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_fift_hex())
    }
}

impl fmt::Debug for Bits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bits({}, {})", self.len, self.to_fift_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_get() {
        let bits: Bits = [true, false, true].into_iter().collect();
        assert_eq!(bits.len(), 3);
        assert_eq!(bits.as_bytes(), &[0b1010_0000]);
        assert_eq!(bits.get(2), Some(true));
        assert_eq!(bits.get(3), None);
    }

    #[test]
    fn test_from_raw_clears_tail() {
        let bits = Bits::from_raw(vec![0xFF, 0xFF], 10).unwrap();
        assert_eq!(bits.as_bytes(), &[0xFF, 0xC0]);
        assert_eq!(bits, Bits::from_raw(vec![0xFF, 0xC0, 0x12], 10).unwrap());
        assert!(Bits::from_raw(vec![0xFF], 9).is_err());
    }

    #[test]
    fn test_augment_and_rollback() {
        let bits = Bits::from_bin_str("101").unwrap();
        let augmented = bits.augment(8).unwrap();
        assert_eq!(augmented.to_bin_string(), "10110000");
        assert_eq!(augmented.rollback(8).unwrap(), bits);

        let nibble = bits.augment(4).unwrap();
        assert_eq!(nibble.to_bin_string(), "1011");
        assert_eq!(nibble.rollback(4).unwrap(), bits);

        // aligned strings are untouched
        let byte = Bits::from_bytes(&[0xAB]);
        assert_eq!(byte.augment(8).unwrap(), byte);
    }

    #[test]
    fn test_rollback_errors() {
        assert!(Bits::from_bytes(&[0]).rollback(8).is_err());
        assert!(Bits::from_bin_str("1").unwrap().rollback(4).is_err());
        assert!(Bits::new().augment(5).is_err());
    }

    #[test]
    fn test_hex_strings() {
        let bits = Bits::from_bin_str("1010101").unwrap();
        assert_eq!(bits.to_hex_string(), "AB_");
        assert_eq!(bits.to_fift_hex(), "x{AB_}");
        assert_eq!(Bits::from_hex_str("AB_").unwrap(), bits);
        assert_eq!("x{AB_}".parse::<Bits>().unwrap(), bits);

        let aligned = Bits::from_bytes(&[0xDE, 0xAD]);
        assert_eq!(aligned.to_hex_string(), "DEAD");
        assert_eq!("DEAD".parse::<Bits>().unwrap(), aligned);

        let nibble = Bits::from_hex_str("F").unwrap();
        assert_eq!(nibble.len(), 4);
        assert_eq!(nibble.to_hex_string(), "F");
    }

    #[test]
    fn test_bin_strings() {
        let bits: Bits = "b{0110}".parse().unwrap();
        assert_eq!(bits.to_fift_bin(), "b{0110}");
        assert_eq!("0110".parse::<Bits>().unwrap(), bits);
        assert!(Bits::from_bin_str("012").is_err());
    }

    #[test]
    fn test_base64() {
        let bits = Bits::from_bytes(&[0xFB, 0xFF, 0x01]);
        assert_eq!(bits.to_base64(), "+/8B");
        assert_eq!(bits.to_base64_url(), "-_8B");
        assert_eq!(Bits::from_base64("+/8B").unwrap(), bits);
        assert_eq!(Bits::from_base64("-_8B").unwrap(), bits);
    }

    #[test]
    fn test_ordering() {
        let a = Bits::from_bin_str("0011").unwrap();
        let b = Bits::from_bin_str("0100").unwrap();
        let prefix = Bits::from_bin_str("00").unwrap();
        assert!(a < b);
        assert!(prefix < a);
        assert_eq!(a.common_prefix_len(&b), 1);
    }

    #[test]
    fn test_extend_unaligned() {
        let mut bits = Bits::from_bin_str("1").unwrap();
        bits.extend(&Bits::from_bytes(&[0xFF]));
        assert_eq!(bits.to_bin_string(), "111111111");
        assert_eq!(bits.slice(1, 9).unwrap(), Bits::from_bytes(&[0xFF]));
    }
}

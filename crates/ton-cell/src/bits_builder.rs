//! Bit writers.
//!
//! [`BitWrite`] carries every `store_*` operation; [`BitsBuilder`] and
//! [`CellBuilder`](crate::CellBuilder) both implement it by exposing their
//! underlying bounded bit buffer.

use num_bigint::{BigInt, BigUint, Sign};
use num_traits::{One, Zero};

use crate::{Bits, CellError, CellResult, MsgAddress, MAX_CELL_BITS};

/// Width of the length prefix of a `VarUInteger max_len`: `ceil(log2(max_len))`.
pub(crate) fn var_len_bits(max_len: usize) -> usize {
    if max_len <= 1 {
        0
    } else {
        (usize::BITS - (max_len - 1).leading_zeros()) as usize
    }
}

fn out_of_range(value: impl ToString, bits: usize) -> CellError {
    CellError::ValueOutOfRange {
        value: value.to_string(),
        bits,
    }
}

/// A capacity-bounded bit buffer.
///
/// The default capacity is one cell (1023 bits); [`BitsBuilder::unbounded`]
/// lifts the limit for standalone buffers.
///
/// ```
/// use ton_cell::{BitsBuilder, BitWrite};
///
/// let mut builder = BitsBuilder::new();
/// builder.store_uint(5, 3).unwrap();
/// builder.store_bit(true).unwrap();
/// assert_eq!(builder.build().to_bin_string(), "1011");
/// ```
#[derive(Debug, Clone)]
pub struct BitsBuilder {
    bits: Bits,
    capacity: usize,
}

impl BitsBuilder {
    pub fn new() -> Self {
        Self::with_capacity(MAX_CELL_BITS)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bits: Bits::with_capacity(capacity.min(MAX_CELL_BITS)),
            capacity,
        }
    }

    pub fn unbounded() -> Self {
        Self {
            bits: Bits::new(),
            capacity: usize::MAX,
        }
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bits that can still be stored.
    pub fn remaining(&self) -> usize {
        self.capacity - self.bits.len()
    }

    pub fn as_bits(&self) -> &Bits {
        &self.bits
    }

    pub fn build(self) -> Bits {
        self.bits
    }

    fn ensure(&self, n: usize) -> CellResult<()> {
        if n > self.remaining() {
            return Err(CellError::DataTooLong(self.bits.len() + n));
        }
        Ok(())
    }

    fn push_bit(&mut self, bit: bool) {
        self.bits.push(bit);
    }

    /// Writes the low `bits` bits of `value`, most significant first.
    fn push_uint(&mut self, value: u64, bits: usize) {
        for i in (0..bits).rev() {
            self.bits.push((value >> i) & 1 == 1);
        }
    }

    fn push_big_uint(&mut self, value: &BigUint, bits: usize) {
        for i in (0..bits).rev() {
            self.bits.push(value.bit(i as u64));
        }
    }
}

impl Default for BitsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Bit-level store operations, MSB-first and big-endian unless noted.
///
/// Every store either appends all of its bits or fails without writing.
pub trait BitWrite: Sized {
    /// The buffer all stores write into.
    #[doc(hidden)]
    fn bits_builder(&mut self) -> &mut BitsBuilder;

    /// Store a single bit.
    fn store_bit(&mut self, bit: bool) -> CellResult<&mut Self> {
        let b = self.bits_builder();
        b.ensure(1)?;
        b.push_bit(bit);
        Ok(self)
    }

    /// Store a bit string.
    fn store_bits(&mut self, bits: &Bits) -> CellResult<&mut Self> {
        let b = self.bits_builder();
        b.ensure(bits.len())?;
        b.bits.extend(bits);
        Ok(self)
    }

    /// Store raw bytes.
    fn store_bytes(&mut self, bytes: &[u8]) -> CellResult<&mut Self> {
        self.store_bits(&Bits::from_bytes(bytes))
    }

    /// Store an unsigned integer of exactly `bits` bits (`bits <= 64`).
    ///
    /// Values outside `[0, 2^bits)` fail with [`CellError::ValueOutOfRange`].
    fn store_uint(&mut self, value: u64, bits: usize) -> CellResult<&mut Self> {
        if bits > 64 {
            return Err(CellError::InvalidBitLength(bits));
        }
        if bits < 64 && value >> bits != 0 {
            return Err(out_of_range(value, bits));
        }
        let b = self.bits_builder();
        b.ensure(bits)?;
        b.push_uint(value, bits);
        Ok(self)
    }

    /// Store a two's-complement signed integer of exactly `bits` bits
    /// (`bits <= 64`). The valid range is `[-2^(bits-1), 2^(bits-1))`; with
    /// `bits == 0` only zero is accepted.
    fn store_int(&mut self, value: i64, bits: usize) -> CellResult<&mut Self> {
        if bits > 64 {
            return Err(CellError::InvalidBitLength(bits));
        }
        let fits = match bits {
            0 => value == 0,
            64 => true,
            n => {
                let half = 1i64 << (n - 1);
                (-half..half).contains(&value)
            }
        };
        if !fits {
            return Err(out_of_range(value, bits));
        }
        let b = self.bits_builder();
        b.ensure(bits)?;
        b.push_uint(value as u64, bits);
        Ok(self)
    }

    /// Store an arbitrary-width unsigned integer.
    fn store_big_uint(&mut self, value: &BigUint, bits: usize) -> CellResult<&mut Self> {
        if value.bits() > bits as u64 {
            return Err(out_of_range(value, bits));
        }
        let b = self.bits_builder();
        b.ensure(bits)?;
        b.push_big_uint(value, bits);
        Ok(self)
    }

    /// Store an arbitrary-width two's-complement signed integer.
    fn store_big_int(&mut self, value: &BigInt, bits: usize) -> CellResult<&mut Self> {
        let fits = if bits == 0 {
            value.is_zero()
        } else {
            let half = BigInt::one() << (bits - 1);
            *value >= -&half && *value < half
        };
        if !fits {
            return Err(out_of_range(value, bits));
        }

        let raw = if value.sign() == Sign::Minus {
            (BigInt::one() << bits) + value
        } else {
            value.clone()
        };
        let (_, magnitude) = raw.into_parts();

        let b = self.bits_builder();
        b.ensure(bits)?;
        b.push_big_uint(&magnitude, bits);
        Ok(self)
    }

    /// Store a TL-B `VarUInteger max_len`: a `ceil(log2(max_len))`-bit byte
    /// count followed by that many big-endian bytes. Zero is a zero count.
    fn store_var_uint(&mut self, value: &BigUint, max_len: usize) -> CellResult<&mut Self> {
        let byte_len = (value.bits() as usize).div_ceil(8);
        if byte_len >= max_len {
            return Err(out_of_range(value, (max_len.max(1) - 1) * 8));
        }
        let prefix = var_len_bits(max_len);
        let b = self.bits_builder();
        b.ensure(prefix + byte_len * 8)?;
        b.push_uint(byte_len as u64, prefix);
        b.push_big_uint(value, byte_len * 8);
        Ok(self)
    }

    /// Store a TL-B `VarInteger max_len`.
    fn store_var_int(&mut self, value: &BigInt, max_len: usize) -> CellResult<&mut Self> {
        let signed_bits = match value.sign() {
            Sign::NoSign => 0,
            Sign::Plus => value.bits() as usize + 1,
            Sign::Minus => (-value - BigInt::one()).bits() as usize + 1,
        };
        let byte_len = signed_bits.div_ceil(8);
        if byte_len >= max_len {
            return Err(out_of_range(value, (max_len.max(1) - 1) * 8));
        }
        let prefix = var_len_bits(max_len);
        self.bits_builder().ensure(prefix + byte_len * 8)?;
        self.store_uint(byte_len as u64, prefix)?;
        self.store_big_int(value, byte_len * 8)
    }

    /// Store a coin amount (`VarUInteger 16`).
    fn store_coins(&mut self, nanotons: u128) -> CellResult<&mut Self> {
        self.store_var_uint(&BigUint::from(nanotons), 16)
    }

    /// Store a `MsgAddress`.
    ///
    /// - `addr_none$00`
    /// - `addr_extern$01 len:(## 9) external_address:(bits len)`
    /// - `addr_std$10 anycast:(Maybe Anycast) workchain_id:int8 address:bits256`
    ///   (always without anycast)
    fn store_address(&mut self, addr: &MsgAddress) -> CellResult<&mut Self> {
        match addr {
            MsgAddress::None => self.store_uint(0b00, 2),
            MsgAddress::External(bits) => {
                if bits.len() >= 1 << 9 {
                    return Err(CellError::InvalidAddress(format!(
                        "external address of {} bits",
                        bits.len()
                    )));
                }
                self.bits_builder().ensure(2 + 9 + bits.len())?;
                self.store_uint(0b01, 2)?;
                self.store_uint(bits.len() as u64, 9)?;
                self.store_bits(bits)
            }
            MsgAddress::Std(address) => {
                self.bits_builder().ensure(267)?;
                self.store_uint(0b100, 3)?;
                self.store_int(address.workchain() as i64, 8)?;
                self.store_bytes(address.hash())
            }
        }
    }

    /// Store a little-endian u32 (non TL-B contexts).
    fn store_u32_le(&mut self, value: u32) -> CellResult<&mut Self> {
        self.store_bytes(&value.to_le_bytes())
    }

    /// Store a little-endian u64 (non TL-B contexts).
    fn store_u64_le(&mut self, value: u64) -> CellResult<&mut Self> {
        self.store_bytes(&value.to_le_bytes())
    }

    fn store_u8(&mut self, value: u8) -> CellResult<&mut Self> {
        self.store_uint(value as u64, 8)
    }

    fn store_u16(&mut self, value: u16) -> CellResult<&mut Self> {
        self.store_uint(value as u64, 16)
    }

    fn store_u32(&mut self, value: u32) -> CellResult<&mut Self> {
        self.store_uint(value as u64, 32)
    }

    fn store_u64(&mut self, value: u64) -> CellResult<&mut Self> {
        self.store_uint(value, 64)
    }

    fn store_i8(&mut self, value: i8) -> CellResult<&mut Self> {
        self.store_int(value as i64, 8)
    }

    fn store_i16(&mut self, value: i16) -> CellResult<&mut Self> {
        self.store_int(value as i64, 16)
    }

    fn store_i32(&mut self, value: i32) -> CellResult<&mut Self> {
        self.store_int(value as i64, 32)
    }

    fn store_i64(&mut self, value: i64) -> CellResult<&mut Self> {
        self.store_int(value, 64)
    }
}

impl BitWrite for BitsBuilder {
    fn bits_builder(&mut self) -> &mut BitsBuilder {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_var_len_bits() {
        assert_eq!(var_len_bits(16), 4);
        assert_eq!(var_len_bits(32), 5);
        assert_eq!(var_len_bits(2), 1);
        assert_eq!(var_len_bits(1), 0);
        assert_eq!(var_len_bits(17), 5);
    }

    #[test]
    fn test_store_uint_bits() {
        let mut builder = BitsBuilder::new();
        builder.store_uint(0b10101, 5).unwrap();
        assert_eq!(builder.as_bits().as_bytes(), &[0b10101000]);
    }

    #[test]
    fn test_uint_range() {
        let mut builder = BitsBuilder::new();
        assert!(builder.store_uint(8, 3).is_err());
        assert!(builder.store_uint(1, 0).is_err());
        assert!(builder.store_uint(0, 0).is_ok());
        assert!(builder.store_uint(u64::MAX, 64).is_ok());
        assert!(matches!(builder.store_uint(0, 65), Err(CellError::InvalidBitLength(65))));
        // failed stores write nothing
        assert_eq!(builder.len(), 64);
    }

    #[test]
    fn test_int_range() {
        let mut builder = BitsBuilder::unbounded();
        assert!(builder.store_int(-4, 3).is_ok());
        assert!(builder.store_int(3, 3).is_ok());
        assert!(builder.store_int(4, 3).is_err());
        assert!(builder.store_int(-5, 3).is_err());
        assert!(builder.store_int(-1, 0).is_err());
        assert!(builder.store_int(i64::MIN, 64).is_ok());
        assert_eq!(builder.len(), 70);
    }

    #[test]
    fn test_big_int_range() {
        let mut builder = BitsBuilder::unbounded();
        let half: BigInt = BigInt::one() << 255;
        assert!(builder.store_big_int(&(half.clone() - 1), 256).is_ok());
        assert!(builder.store_big_int(&-half.clone(), 256).is_ok());
        assert!(builder.store_big_int(&half, 256).is_err());
        assert!(builder.store_big_uint(&(BigUint::one() << 256), 256).is_err());
    }

    #[test]
    fn test_negative_two_complement() {
        let mut builder = BitsBuilder::new();
        builder.store_int(-1, 4).unwrap();
        builder.store_big_int(&BigInt::from(-2), 4).unwrap();
        assert_eq!(builder.build().to_bin_string(), "11111110");
    }

    #[test]
    fn test_coins_layout() {
        let mut builder = BitsBuilder::new();
        builder.store_coins(0).unwrap();
        assert_eq!(builder.as_bits().to_bin_string(), "0000");

        let mut builder = BitsBuilder::new();
        builder.store_coins(0x0102).unwrap();
        assert_eq!(builder.build().to_hex_string(), "20102");
    }

    #[test]
    fn test_var_int_lengths() {
        let mut builder = BitsBuilder::new();
        builder.store_var_int(&BigInt::from(127), 16).unwrap();
        assert_eq!(builder.len(), 4 + 8);

        let mut builder = BitsBuilder::new();
        builder.store_var_int(&BigInt::from(128), 16).unwrap();
        assert_eq!(builder.len(), 4 + 16);

        let mut builder = BitsBuilder::new();
        builder.store_var_int(&BigInt::from(-128), 16).unwrap();
        assert_eq!(builder.len(), 4 + 8);
    }

    #[test]
    fn test_capacity() {
        let mut builder = BitsBuilder::with_capacity(8);
        builder.store_u8(1).unwrap();
        assert!(matches!(builder.store_bit(true), Err(CellError::DataTooLong(9))));
    }

    #[test]
    fn test_little_endian_helpers() {
        let mut builder = BitsBuilder::new();
        builder.store_u32_le(0x12345678).unwrap();
        assert_eq!(builder.build().as_bytes(), &[0x78, 0x56, 0x34, 0x12]);
    }
}

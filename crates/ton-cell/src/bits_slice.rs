//! Bit readers.

use num_bigint::{BigInt, BigUint};
use num_traits::{One, ToPrimitive};

use crate::bits_builder::var_len_bits;
use crate::{Address, Bits, CellError, CellResult, MsgAddress};

/// Bit-level load operations, the mirror of [`BitWrite`](crate::BitWrite).
///
/// `load_*` consumes bits, `read_*` peeks without moving the cursor. A
/// failed load leaves the cursor where it was.
pub trait BitRead: Clone {
    /// Number of unread bits.
    fn remaining_bits(&self) -> usize;

    /// The bit `offset` positions past the cursor. Callers check bounds.
    #[doc(hidden)]
    fn bit_at(&self, offset: usize) -> bool;

    /// Move the cursor forward. Callers check bounds.
    #[doc(hidden)]
    fn advance_bits(&mut self, n: usize);

    /// Fails with [`CellError::NotEnoughBits`] unless `n` bits remain.
    fn ensure_bits(&self, n: usize) -> CellResult<()> {
        let have = self.remaining_bits();
        if n > have {
            return Err(CellError::NotEnoughBits { need: n, have });
        }
        Ok(())
    }

    fn skip_bits(&mut self, n: usize) -> CellResult<()> {
        self.ensure_bits(n)?;
        self.advance_bits(n);
        Ok(())
    }

    fn load_bit(&mut self) -> CellResult<bool> {
        self.ensure_bits(1)?;
        let bit = self.bit_at(0);
        self.advance_bits(1);
        Ok(bit)
    }

    fn load_bits(&mut self, n: usize) -> CellResult<Bits> {
        self.ensure_bits(n)?;
        let bits: Bits = (0..n).map(|i| self.bit_at(i)).collect();
        self.advance_bits(n);
        Ok(bits)
    }

    fn load_bytes(&mut self, n: usize) -> CellResult<Vec<u8>> {
        Ok(self.load_bits(n * 8)?.into_bytes())
    }

    /// Load an unsigned integer of `bits` bits (`bits <= 64`).
    fn load_uint(&mut self, bits: usize) -> CellResult<u64> {
        if bits > 64 {
            return Err(CellError::InvalidBitLength(bits));
        }
        self.ensure_bits(bits)?;
        let value = (0..bits).fold(0u64, |acc, i| (acc << 1) | self.bit_at(i) as u64);
        self.advance_bits(bits);
        Ok(value)
    }

    /// Load a two's-complement signed integer of `bits` bits (`bits <= 64`).
    fn load_int(&mut self, bits: usize) -> CellResult<i64> {
        let raw = self.load_uint(bits)?;
        if bits == 0 || bits == 64 {
            return Ok(raw as i64);
        }
        if (raw >> (bits - 1)) & 1 == 1 {
            Ok((raw | (u64::MAX << bits)) as i64)
        } else {
            Ok(raw as i64)
        }
    }

    fn load_big_uint(&mut self, bits: usize) -> CellResult<BigUint> {
        let raw = self.load_bits(bits)?;
        let bytes = raw.as_bytes();
        let pad = bytes.len() * 8 - bits;
        Ok(BigUint::from_bytes_be(bytes) >> pad)
    }

    fn load_big_int(&mut self, bits: usize) -> CellResult<BigInt> {
        let raw = self.load_big_uint(bits)?;
        if bits > 0 && raw.bit(bits as u64 - 1) {
            Ok(BigInt::from(raw) - (BigInt::one() << bits))
        } else {
            Ok(BigInt::from(raw))
        }
    }

    /// Load a TL-B `VarUInteger max_len`.
    fn load_var_uint(&mut self, max_len: usize) -> CellResult<BigUint> {
        let mut cursor = self.clone();
        let byte_len = cursor.load_uint(var_len_bits(max_len))? as usize;
        if byte_len >= max_len {
            return Err(CellError::ValueOutOfRange {
                value: format!("length {byte_len}"),
                bits: (max_len.max(1) - 1) * 8,
            });
        }
        let value = cursor.load_big_uint(byte_len * 8)?;
        *self = cursor;
        Ok(value)
    }

    /// Load a TL-B `VarInteger max_len`.
    fn load_var_int(&mut self, max_len: usize) -> CellResult<BigInt> {
        let mut cursor = self.clone();
        let byte_len = cursor.load_uint(var_len_bits(max_len))? as usize;
        if byte_len >= max_len {
            return Err(CellError::ValueOutOfRange {
                value: format!("length {byte_len}"),
                bits: (max_len.max(1) - 1) * 8,
            });
        }
        let value = cursor.load_big_int(byte_len * 8)?;
        *self = cursor;
        Ok(value)
    }

    /// Load a coin amount (`VarUInteger 16`).
    fn load_coins(&mut self) -> CellResult<u128> {
        let value = self.load_var_uint(16)?;
        // at most 15 bytes, always fits
        value.to_u128().ok_or_else(|| CellError::ValueOutOfRange {
            value: value.to_string(),
            bits: 128,
        })
    }

    /// Load a `MsgAddress`.
    ///
    /// Anycast and `addr_var` addresses fail with
    /// [`CellError::UnsupportedAddress`].
    fn load_address(&mut self) -> CellResult<MsgAddress> {
        let mut cursor = self.clone();
        let address = match cursor.load_uint(2)? {
            0b00 => MsgAddress::None,
            0b01 => {
                let len = cursor.load_uint(9)? as usize;
                MsgAddress::External(cursor.load_bits(len)?)
            }
            0b10 => {
                if cursor.load_bit()? {
                    return Err(CellError::UnsupportedAddress("anycast".into()));
                }
                let workchain = cursor.load_i8()?;
                let mut hash = [0u8; 32];
                hash.copy_from_slice(&cursor.load_bytes(32)?);
                MsgAddress::Std(Address::new(workchain, hash))
            }
            _ => return Err(CellError::UnsupportedAddress("addr_var".into())),
        };
        *self = cursor;
        Ok(address)
    }

    fn load_u32_le(&mut self) -> CellResult<u32> {
        let bytes = self.load_bytes(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn load_u64_le(&mut self) -> CellResult<u64> {
        let bytes = self.load_bytes(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&bytes);
        Ok(u64::from_le_bytes(buf))
    }

    fn load_u8(&mut self) -> CellResult<u8> {
        Ok(self.load_uint(8)? as u8)
    }

    fn load_u16(&mut self) -> CellResult<u16> {
        Ok(self.load_uint(16)? as u16)
    }

    fn load_u32(&mut self) -> CellResult<u32> {
        Ok(self.load_uint(32)? as u32)
    }

    fn load_u64(&mut self) -> CellResult<u64> {
        self.load_uint(64)
    }

    fn load_i8(&mut self) -> CellResult<i8> {
        Ok(self.load_int(8)? as i8)
    }

    fn load_i16(&mut self) -> CellResult<i16> {
        Ok(self.load_int(16)? as i16)
    }

    fn load_i32(&mut self) -> CellResult<i32> {
        Ok(self.load_int(32)? as i32)
    }

    fn load_i64(&mut self) -> CellResult<i64> {
        self.load_int(64)
    }

    fn read_bit(&self) -> CellResult<bool> {
        self.clone().load_bit()
    }

    fn read_bits(&self, n: usize) -> CellResult<Bits> {
        self.clone().load_bits(n)
    }

    fn read_uint(&self, bits: usize) -> CellResult<u64> {
        self.clone().load_uint(bits)
    }

    fn read_int(&self, bits: usize) -> CellResult<i64> {
        self.clone().load_int(bits)
    }

    fn read_big_uint(&self, bits: usize) -> CellResult<BigUint> {
        self.clone().load_big_uint(bits)
    }
}

/// A read cursor over a [`Bits`] value.
#[derive(Debug, Clone, Copy)]
pub struct BitsSlice<'a> {
    bits: &'a Bits,
    start: usize,
    end: usize,
}

impl<'a> BitsSlice<'a> {
    pub fn new(bits: &'a Bits) -> Self {
        Self {
            bits,
            start: 0,
            end: bits.len(),
        }
    }

    /// Bits consumed so far.
    pub fn position(&self) -> usize {
        self.start
    }

    /// Copy of the unread bits.
    pub fn to_bits(&self) -> Bits {
        (self.start..self.end).map(|i| self.bits.bit_at(i)).collect()
    }
}

impl BitRead for BitsSlice<'_> {
    fn remaining_bits(&self) -> usize {
        self.end - self.start
    }

    fn bit_at(&self, offset: usize) -> bool {
        self.bits.bit_at(self.start + offset)
    }

    fn advance_bits(&mut self, n: usize) {
        self.start += n;
    }
}

impl<'a> From<&'a Bits> for BitsSlice<'a> {
    fn from(bits: &'a Bits) -> Self {
        Self::new(bits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BitWrite, BitsBuilder};
    use proptest::prelude::*;

    #[test]
    fn test_load_uint_and_peek() {
        let bits = Bits::from_bin_str("1011001").unwrap();
        let mut slice = BitsSlice::new(&bits);
        assert_eq!(slice.read_uint(3).unwrap(), 0b101);
        assert_eq!(slice.position(), 0);
        assert_eq!(slice.load_uint(3).unwrap(), 0b101);
        assert_eq!(slice.to_bits().to_bin_string(), "1001");
        assert!(matches!(
            slice.load_uint(5),
            Err(CellError::NotEnoughBits { need: 5, have: 4 })
        ));
        assert_eq!(slice.remaining_bits(), 4);
    }

    #[test]
    fn test_sign_extension() {
        let bits = Bits::from_bin_str("1110").unwrap();
        let mut slice = BitsSlice::new(&bits);
        assert_eq!(slice.load_int(3).unwrap(), -1);
        assert_eq!(slice.load_int(1).unwrap(), 0);
        assert_eq!(slice.load_int(0).unwrap(), 0);
    }

    #[test]
    fn test_big_int_negative() {
        let mut builder = BitsBuilder::new();
        builder.store_big_int(&BigInt::from(-5), 257).unwrap();
        let bits = builder.build();
        let mut slice = BitsSlice::new(&bits);
        assert_eq!(slice.load_big_int(257).unwrap(), BigInt::from(-5));
    }

    #[test]
    fn test_failed_address_load_keeps_cursor() {
        let bits = Bits::from_bin_str("101").unwrap();
        let mut slice = BitsSlice::new(&bits);
        assert!(matches!(
            slice.load_address(),
            Err(CellError::UnsupportedAddress(_))
        ));
        assert_eq!(slice.remaining_bits(), 3);

        let bits = Bits::from_bin_str("11").unwrap();
        assert!(matches!(
            BitsSlice::new(&bits).load_address(),
            Err(CellError::UnsupportedAddress(_))
        ));
    }

    #[test]
    fn test_external_address() {
        let external = Bits::from_bin_str("10110").unwrap();
        let mut builder = BitsBuilder::new();
        builder
            .store_address(&MsgAddress::External(external.clone()))
            .unwrap();
        let bits = builder.build();
        assert_eq!(bits.len(), 2 + 9 + 5);
        assert_eq!(
            BitsSlice::new(&bits).load_address().unwrap(),
            MsgAddress::External(external)
        );
    }

    #[test]
    fn test_var_uint_rejects_long_prefix() {
        // VarUInteger 3 has a 2-bit prefix; length 3 is not allowed
        let bits = Bits::from_bin_str("11").unwrap();
        assert!(BitsSlice::new(&bits).load_var_uint(3).is_err());
    }

    #[test]
    fn test_little_endian() {
        let bits = Bits::from_bytes(&[1, 0, 0, 0, 2, 0, 0, 0, 0, 0, 0, 0]);
        let mut slice = BitsSlice::new(&bits);
        assert_eq!(slice.load_u32_le().unwrap(), 1);
        assert_eq!(slice.load_u64_le().unwrap(), 2);
    }

    fn uint_bound(bits: usize) -> BigUint {
        BigUint::one() << bits
    }

    proptest! {
        #[test]
        fn prop_uint_roundtrip(bits in 0usize..=256, seed in any::<[u8; 32]>()) {
            let value = BigUint::from_bytes_be(&seed) % uint_bound(bits);
            let mut builder = BitsBuilder::new();
            builder.store_big_uint(&value, bits).unwrap();
            let stored = builder.build();
            prop_assert_eq!(stored.len(), bits);
            prop_assert_eq!(BitsSlice::new(&stored).load_big_uint(bits).unwrap(), value);
        }

        #[test]
        fn prop_int_roundtrip(bits in 1usize..=256, seed in any::<[u8; 32]>()) {
            let modulus = BigInt::from(uint_bound(bits));
            let half = BigInt::from(uint_bound(bits - 1));
            let value = BigInt::from(BigUint::from_bytes_be(&seed)) % &modulus - &half;
            let mut builder = BitsBuilder::new();
            builder.store_big_int(&value, bits).unwrap();
            let stored = builder.build();
            prop_assert_eq!(BitsSlice::new(&stored).load_big_int(bits).unwrap(), value);
        }

        #[test]
        fn prop_small_int_roundtrip(bits in 1usize..=64, raw in any::<i64>()) {
            let value = if bits == 64 { raw } else { raw >> (64 - bits) };
            let mut builder = BitsBuilder::new();
            builder.store_int(value, bits).unwrap();
            let stored = builder.build();
            prop_assert_eq!(BitsSlice::new(&stored).load_int(bits).unwrap(), value);
        }

        #[test]
        fn prop_out_of_range_rejected(bits in 0usize..64, extra in 0u32..8) {
            let value = 1u64 << (bits as u32 + extra).min(63);
            let mut builder = BitsBuilder::new();
            let result = builder.store_uint(value, bits);
            prop_assert!(matches!(result, Err(CellError::ValueOutOfRange { .. })), "expected ValueOutOfRange, got {:?}", result);
            prop_assert_eq!(builder.len(), 0);
        }

        #[test]
        fn prop_var_uint_roundtrip(seed in any::<[u8; 15]>(), max_len in 16usize..=32) {
            let value = BigUint::from_bytes_be(&seed);
            let mut builder = BitsBuilder::new();
            builder.store_var_uint(&value, max_len).unwrap();
            let stored = builder.build();
            let mut slice = BitsSlice::new(&stored);
            prop_assert_eq!(slice.load_var_uint(max_len).unwrap(), value);
            prop_assert_eq!(slice.remaining_bits(), 0);
        }
    }
}

//! CellSlice for reading data from TON cells.
//!
//! A slice is a cursor over a cell's bits and references. Bit loads come
//! from [`BitRead`]; reference loads are defined here.

use std::sync::Arc;

use crate::{BitRead, Cell, CellError, CellResult, Hashmap};

/// A read cursor over a cell.
///
/// # Example
///
/// ```
/// use ton_cell::{BitRead, BitWrite, CellBuilder};
///
/// let mut builder = CellBuilder::new();
/// builder.store_u32(0x12345678).unwrap();
/// let cell = builder.build().unwrap();
///
/// let mut slice = cell.to_slice();
/// assert_eq!(slice.load_u32().unwrap(), 0x12345678);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct CellSlice<'a> {
    cell: &'a Cell,
    bit_start: usize,
    bit_end: usize,
    ref_start: usize,
    ref_end: usize,
}

impl<'a> CellSlice<'a> {
    /// Create a slice over all bits and references of a cell.
    pub fn new(cell: &'a Cell) -> Self {
        CellSlice {
            cell,
            bit_start: 0,
            bit_end: cell.bit_len(),
            ref_start: 0,
            ref_end: cell.reference_count(),
        }
    }

    /// The underlying cell.
    pub fn cell(&self) -> &'a Cell {
        self.cell
    }

    /// Bits consumed so far.
    pub fn bit_position(&self) -> usize {
        self.bit_start
    }

    pub fn remaining_refs(&self) -> usize {
        self.ref_end - self.ref_start
    }

    /// True when no bits and no references are left.
    pub fn is_empty(&self) -> bool {
        self.remaining_bits() == 0 && self.remaining_refs() == 0
    }

    fn ensure_refs(&self, n: usize) -> CellResult<()> {
        let have = self.remaining_refs();
        if n > have {
            return Err(CellError::NotEnoughRefs { need: n, have });
        }
        Ok(())
    }

    /// Load the next reference.
    pub fn load_ref(&mut self) -> CellResult<&'a Arc<Cell>> {
        self.ensure_refs(1)?;
        let cell = &self.cell.references()[self.ref_start];
        self.ref_start += 1;
        Ok(cell)
    }

    /// Peek at the next reference.
    pub fn read_ref(&self) -> CellResult<&'a Arc<Cell>> {
        let mut cursor = *self;
        cursor.load_ref()
    }

    /// Load `Maybe ^Cell`.
    pub fn load_maybe_ref(&mut self) -> CellResult<Option<&'a Arc<Cell>>> {
        let mut cursor = *self;
        let value = if cursor.load_bit()? {
            Some(cursor.load_ref()?)
        } else {
            None
        };
        *self = cursor;
        Ok(value)
    }

    pub fn skip_refs(&mut self, n: usize) -> CellResult<()> {
        self.ensure_refs(n)?;
        self.ref_start += n;
        Ok(())
    }

    /// Copy the unread bits and references into a new ordinary cell.
    pub fn to_cell(&self) -> CellResult<Cell> {
        let bits = self.read_bits(self.remaining_bits())?;
        let refs = self.cell.references()[self.ref_start..self.ref_end].to_vec();
        Cell::new(bits, refs)
    }

    /// Load a `HashmapE` with `key_size`-bit keys.
    pub fn load_dict(&mut self, key_size: usize) -> CellResult<Hashmap> {
        let mut cursor = *self;
        let map = match cursor.load_maybe_ref()? {
            Some(root) => Hashmap::deserialize(Some(root.as_ref()), key_size)?,
            None => Hashmap::new(key_size)?,
        };
        *self = cursor;
        Ok(map)
    }
}

impl BitRead for CellSlice<'_> {
    fn remaining_bits(&self) -> usize {
        self.bit_end - self.bit_start
    }

    fn bit_at(&self, offset: usize) -> bool {
        self.cell.bits().bit_at(self.bit_start + offset)
    }

    fn advance_bits(&mut self, n: usize) {
        self.bit_start += n;
    }
}

impl<'a> From<&'a Cell> for CellSlice<'a> {
    fn from(cell: &'a Cell) -> Self {
        Self::new(cell)
    }
}

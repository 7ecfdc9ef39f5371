//! CellBuilder for constructing TON cells.
//!
//! The builder stores bits through [`BitWrite`] and references through its
//! own methods, then builds the final Cell.

use std::sync::Arc;

use crate::{
    BitRead, BitWrite, BitsBuilder, Cell, CellError, CellResult, CellSlice, CellType, Hashmap,
    MAX_CELL_REFS,
};

/// Builder for constructing TON cells.
///
/// # Example
///
/// ```
/// use ton_cell::{BitWrite, CellBuilder};
///
/// let mut builder = CellBuilder::new();
/// builder.store_u32(0x12345678).unwrap();
/// builder.store_bytes(&[1, 2, 3, 4]).unwrap();
/// let cell = builder.build().unwrap();
/// assert_eq!(cell.bit_len(), 64);
/// ```
#[derive(Debug, Clone)]
pub struct CellBuilder {
    bits: BitsBuilder,
    references: Vec<Arc<Cell>>,
    cell_type: CellType,
}

impl CellBuilder {
    /// Create a new empty CellBuilder.
    pub fn new() -> Self {
        Self::with_type(CellType::Ordinary)
    }

    /// Create a builder with a specific cell type.
    pub fn with_type(cell_type: CellType) -> Self {
        CellBuilder {
            bits: BitsBuilder::new(),
            references: Vec::new(),
            cell_type,
        }
    }

    /// Bits stored so far.
    pub fn bit_len(&self) -> usize {
        self.bits.len()
    }

    pub fn remaining_bits(&self) -> usize {
        self.bits.remaining()
    }

    pub fn reference_count(&self) -> usize {
        self.references.len()
    }

    pub fn remaining_refs(&self) -> usize {
        MAX_CELL_REFS - self.references.len()
    }

    fn ensure_refs(&self, n: usize) -> CellResult<()> {
        if self.references.len() + n > MAX_CELL_REFS {
            return Err(CellError::TooManyRefs(self.references.len() + n));
        }
        Ok(())
    }

    fn ensure_bits(&self, n: usize) -> CellResult<()> {
        if n > self.bits.remaining() {
            return Err(CellError::DataTooLong(self.bits.len() + n));
        }
        Ok(())
    }

    /// Store a reference to another cell.
    pub fn store_ref(&mut self, cell: Arc<Cell>) -> CellResult<&mut Self> {
        self.ensure_refs(1)?;
        self.references.push(cell);
        Ok(self)
    }

    /// Store `Maybe ^Cell`: a presence bit, plus the reference when present.
    pub fn store_maybe_ref(&mut self, cell: Option<Arc<Cell>>) -> CellResult<&mut Self> {
        match cell {
            Some(cell) => {
                self.ensure_bits(1)?;
                self.ensure_refs(1)?;
                self.store_bit(true)?;
                self.store_ref(cell)
            }
            None => self.store_bit(false),
        }
    }

    /// Append the unread bits and references of a slice.
    pub fn store_slice(&mut self, slice: &CellSlice<'_>) -> CellResult<&mut Self> {
        self.ensure_bits(slice.remaining_bits())?;
        self.ensure_refs(slice.remaining_refs())?;
        let mut slice = *slice;
        let bits = slice.load_bits(slice.remaining_bits())?;
        self.store_bits(&bits)?;
        while slice.remaining_refs() > 0 {
            let cell = slice.load_ref()?.clone();
            self.references.push(cell);
        }
        Ok(self)
    }

    /// Append a cell's bits and references inline.
    pub fn store_cell(&mut self, cell: &Cell) -> CellResult<&mut Self> {
        self.store_slice(&cell.to_slice())
    }

    /// Store a `HashmapE`: `0` for an empty map, else `1` and a reference
    /// to the serialized root.
    pub fn store_dict(&mut self, map: &Hashmap) -> CellResult<&mut Self> {
        let root = map.serialize()?;
        self.store_maybe_ref(root.map(Arc::new))
    }

    /// Finalize into a cell.
    pub fn build(self) -> CellResult<Cell> {
        Cell::with_type(self.bits.build(), self.references, self.cell_type)
    }
}

impl Default for CellBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BitWrite for CellBuilder {
    fn bits_builder(&mut self) -> &mut BitsBuilder {
        &mut self.bits
    }
}

//! Cell implementation for TON.
//!
//! A Cell is the fundamental data unit in TON, containing up to 1023 bits
//! of data and up to 4 references to other cells. Hash and depth are
//! computed once, on construction.
//!
//! Reference: ton-blockchain/ton/crypto/vm/cells/DataCell.cpp

use std::fmt;
use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::{Bits, CellError, CellResult, CellSlice, CellType, MAX_CELL_BITS, MAX_CELL_DEPTH, MAX_CELL_REFS};

/// Hash size in bytes (SHA256).
pub const HASH_BYTES: usize = 32;

/// A TON Cell - the basic unit of data storage.
///
/// Cells form a DAG (Directed Acyclic Graph) where each cell can reference
/// up to 4 other cells. The cell hash uniquely identifies the cell and its
/// entire subtree.
///
/// # Limitations
///
/// Cell levels are not modelled. Exotic cells keep their type tag but are
/// hashed like level-0 cells, so pruned branches and Merkle proofs do not
/// get their higher-level hashes. A level mask read from a BoC is dropped:
/// re-serializing such a cell writes a zero mask in its `d1` descriptor.
#[derive(Clone)]
pub struct Cell {
    bits: Bits,
    references: Vec<Arc<Cell>>,
    cell_type: CellType,
    hash: [u8; HASH_BYTES],
    depth: u16,
}

impl Cell {
    /// Create an ordinary cell.
    pub fn new(bits: Bits, references: Vec<Arc<Cell>>) -> CellResult<Self> {
        Self::with_type(bits, references, CellType::Ordinary)
    }

    /// Create a cell of the given type.
    ///
    /// Exotic cells must carry at least the 8-bit type tag.
    pub fn with_type(
        bits: Bits,
        references: Vec<Arc<Cell>>,
        cell_type: CellType,
    ) -> CellResult<Self> {
        if bits.len() > MAX_CELL_BITS {
            return Err(CellError::DataTooLong(bits.len()));
        }
        if references.len() > MAX_CELL_REFS {
            return Err(CellError::TooManyRefs(references.len()));
        }
        if cell_type.is_exotic() && bits.len() < 8 {
            return Err(CellError::InvalidCellType(cell_type as u8));
        }

        let depth = references
            .iter()
            .map(|r| r.depth as usize + 1)
            .max()
            .unwrap_or(0);
        if depth > MAX_CELL_DEPTH {
            return Err(CellError::DepthOverflow(depth));
        }

        let mut cell = Cell {
            bits,
            references,
            cell_type,
            hash: [0u8; HASH_BYTES],
            depth: depth as u16,
        };
        cell.hash = Sha256::digest(cell.representation()).into();
        Ok(cell)
    }

    /// Create an empty cell.
    pub fn empty() -> Self {
        let mut cell = Cell {
            bits: Bits::new(),
            references: Vec::new(),
            cell_type: CellType::Ordinary,
            hash: [0u8; HASH_BYTES],
            depth: 0,
        };
        cell.hash = Sha256::digest(cell.representation()).into();
        cell
    }

    /// The bytes hashed to produce [`Cell::hash`]:
    /// descriptors, augmented data, child depths, child hashes.
    pub fn representation(&self) -> Vec<u8> {
        let mut repr = Vec::with_capacity(
            2 + self.bits.len().div_ceil(8) + self.references.len() * (2 + HASH_BYTES),
        );

        let (d1, d2) = self.descriptors();
        repr.push(d1);
        repr.push(d2);
        repr.extend_from_slice(&self.augmented_data());

        for reference in &self.references {
            repr.extend_from_slice(&reference.depth.to_be_bytes());
        }
        for reference in &self.references {
            repr.extend_from_slice(&reference.hash);
        }

        repr
    }

    /// Get the descriptor bytes (d1, d2).
    ///
    /// d1 = refs_count + 8*is_exotic
    /// d2 = ceil(bit_len / 8) + floor(bit_len / 8)
    pub fn descriptors(&self) -> (u8, u8) {
        let refs_count = self.references.len() as u8;
        let is_exotic = if self.cell_type.is_exotic() { 8 } else { 0 };
        let bit_len = self.bits.len();
        let d2 = (bit_len.div_ceil(8) + bit_len / 8) as u8;
        (refs_count + is_exotic, d2)
    }

    /// Data padded to whole bytes with the completion tag (a `1` then zeros).
    pub fn augmented_data(&self) -> Vec<u8> {
        let mut data = self.bits.as_bytes().to_vec();
        let remainder = self.bits.len() % 8;
        if remainder != 0
            && let Some(last) = data.last_mut()
        {
            *last |= 1 << (7 - remainder);
        }
        data
    }

    /// SHA256 representation hash.
    pub fn hash(&self) -> [u8; HASH_BYTES] {
        self.hash
    }

    /// Lowercase hex of [`Cell::hash`].
    pub fn hash_hex(&self) -> String {
        hex::encode(self.hash)
    }

    /// 0 for cells with no references, otherwise 1 + max child depth.
    pub fn depth(&self) -> u16 {
        self.depth
    }

    pub fn bits(&self) -> &Bits {
        &self.bits
    }

    /// Raw data bytes; a trailing partial byte is zero-padded.
    pub fn data(&self) -> &[u8] {
        self.bits.as_bytes()
    }

    pub fn bit_len(&self) -> usize {
        self.bits.len()
    }

    pub fn references(&self) -> &[Arc<Cell>] {
        &self.references
    }

    pub fn reference(&self, index: usize) -> Option<&Arc<Cell>> {
        self.references.get(index)
    }

    pub fn reference_count(&self) -> usize {
        self.references.len()
    }

    pub fn cell_type(&self) -> CellType {
        self.cell_type
    }

    pub fn is_exotic(&self) -> bool {
        self.cell_type.is_exotic()
    }

    /// Get a specific bit from the cell data.
    pub fn get_bit(&self, index: usize) -> Option<bool> {
        self.bits.get(index)
    }

    /// A read cursor over all bits and references.
    pub fn to_slice(&self) -> CellSlice<'_> {
        CellSlice::new(self)
    }

    fn fmt_tree(&self, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
        writeln!(f, "{:indent$}{}", "", self.bits.to_fift_hex())?;
        for reference in &self.references {
            reference.fmt_tree(f, indent + 1)?;
        }
        Ok(())
    }
}

impl Default for Cell {
    fn default() -> Self {
        Self::empty()
    }
}

impl PartialEq for Cell {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
    }
}

impl Eq for Cell {}

impl std::hash::Hash for Cell {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.hash.hash(state);
    }
}

/// Fift-style tree dump, one cell per line, children indented by one space.
impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_tree(f, 0)
    }
}

impl fmt::Debug for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cell")
            .field("type", &self.cell_type)
            .field("bits", &self.bits)
            .field("refs", &self.references.len())
            .field("hash", &self.hash_hex())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bits(hex: &str) -> Bits {
        Bits::from_hex_str(hex).unwrap()
    }

    #[test]
    fn test_empty_cell() {
        let cell = Cell::empty();
        assert_eq!(cell.bit_len(), 0);
        assert_eq!(cell.reference_count(), 0);
        assert_eq!(cell.depth(), 0);
        assert!(!cell.is_exotic());
        assert_eq!(cell, Cell::new(Bits::new(), vec![]).unwrap());
        assert_eq!(cell.representation(), vec![0, 0]);
    }

    #[test]
    fn test_cell_descriptors() {
        let cell = Cell::new(bits("FF"), vec![]).unwrap();
        assert_eq!(cell.descriptors(), (0, 2));

        // 5 bits: ceil(5/8) + floor(5/8) = 1
        let cell = Cell::new(Bits::from_bin_str("11111").unwrap(), vec![]).unwrap();
        assert_eq!(cell.descriptors(), (0, 1));

        let child = Arc::new(Cell::empty());
        let cell = Cell::new(Bits::new(), vec![child.clone(), child]).unwrap();
        assert_eq!(cell.descriptors(), (2, 0));
    }

    #[test]
    fn test_augmented_data() {
        let cell = Cell::new(bits("FF"), vec![]).unwrap();
        assert_eq!(cell.augmented_data(), vec![0xFF]);

        // 11111 + 1 + 00
        let cell = Cell::new(Bits::from_bin_str("11111").unwrap(), vec![]).unwrap();
        assert_eq!(cell.augmented_data(), vec![0b11111100]);
    }

    #[test]
    fn test_hash_with_reference() {
        let child = Arc::new(Cell::empty());
        let parent = Cell::new(Bits::new(), vec![child.clone()]).unwrap();

        let mut repr = vec![1u8, 0, 0, 0];
        repr.extend_from_slice(&child.hash());
        assert_eq!(parent.representation(), repr);
        let expected: [u8; 32] = Sha256::digest(&repr).into();
        assert_eq!(parent.hash(), expected);
    }

    #[test]
    fn test_depth_calculation() {
        let cell0 = Arc::new(Cell::empty());
        let cell1 = Arc::new(Cell::new(Bits::new(), vec![cell0.clone()]).unwrap());
        assert_eq!(cell1.depth(), 1);
        let cell2 = Cell::new(Bits::new(), vec![cell1, cell0]).unwrap();
        assert_eq!(cell2.depth(), 2);
    }

    #[test]
    fn test_depth_overflow() {
        let mut cell = Arc::new(Cell::empty());
        for _ in 0..MAX_CELL_DEPTH {
            cell = Arc::new(Cell::new(Bits::new(), vec![cell]).unwrap());
        }
        assert_eq!(cell.depth() as usize, MAX_CELL_DEPTH);
        assert!(matches!(
            Cell::new(Bits::new(), vec![cell]),
            Err(CellError::DepthOverflow(1025))
        ));
    }

    #[test]
    fn test_limits() {
        assert!(matches!(
            Cell::new(Bits::repeat(true, 1024), vec![]),
            Err(CellError::DataTooLong(1024))
        ));
        let refs = vec![Arc::new(Cell::empty()); 5];
        assert!(matches!(
            Cell::new(Bits::new(), refs),
            Err(CellError::TooManyRefs(5))
        ));
    }

    #[test]
    fn test_exotic_cell() {
        let exotic = Cell::with_type(bits("0100"), vec![], CellType::PrunedBranch).unwrap();
        assert!(exotic.is_exotic());
        assert_eq!(exotic.descriptors().0, 8);
        assert_ne!(exotic.hash(), Cell::new(bits("0100"), vec![]).unwrap().hash());
        assert!(Cell::with_type(Bits::new(), vec![], CellType::Library).is_err());
    }

    #[test]
    fn test_display_tree() {
        let leaf = Arc::new(Cell::new(Bits::from_bin_str("1").unwrap(), vec![]).unwrap());
        let root = Cell::new(bits("AB"), vec![leaf]).unwrap();
        assert_eq!(root.to_string(), "x{AB}\n x{C_}\n");
    }
}

//! TON Cell and Bag of Cells (BoC) Library
//!
//! This crate provides the bit-level data model used by every on-chain TON
//! structure:
//!
//! - **Bits**: MSB-first bit strings with Fift-style text forms
//! - **BitsBuilder / BitsSlice**: standalone bit writers and read cursors
//! - **Cell**: up to 1023 bits and 4 references, hashed on construction
//! - **CellBuilder / CellSlice**: cell writers and bit+ref read cursors
//! - **Hashmap**: the canonical binary-trie dictionary (`Hashmap` / `HashmapE`)
//! - **BagOfCells**: the `serialized_boc` wire format with optional CRC32-C
//! - **Address**: workchain + account hash in raw, base64 and in-cell forms
//!
//! Bit reads and writes are shared through the [`BitRead`] and [`BitWrite`]
//! traits, so the same `load_*` / `store_*` calls work on a standalone
//! [`BitsSlice`] and on a [`CellSlice`].
//!
//! # Example
//!
//! ```
//! use ton_cell::{BagOfCells, BitRead, BitWrite, CellBuilder};
//!
//! // Build a cell
//! let mut builder = CellBuilder::new();
//! builder.store_u32(0x12345678).unwrap();
//! builder.store_bytes(&[1, 2, 3, 4]).unwrap();
//! let cell = builder.build().unwrap();
//!
//! // Serialize to BoC and back
//! let bytes = BagOfCells::from_root(cell.clone()).serialize().unwrap();
//! let boc = BagOfCells::deserialize(&bytes).unwrap();
//! let root = boc.single_root().unwrap();
//! assert_eq!(root.hash(), cell.hash());
//!
//! let mut slice = root.to_slice();
//! assert_eq!(slice.load_u32().unwrap(), 0x12345678);
//! ```

use thiserror::Error;

mod address;
mod bits;
mod bits_builder;
mod bits_slice;
mod boc;
mod builder;
mod cell;
mod hashmap;
mod slice;

pub use address::{crc16, Address, AddressFlags, MsgAddress};
pub use bits::Bits;
pub use bits_builder::{BitWrite, BitsBuilder};
pub use bits_slice::{BitRead, BitsSlice};
pub use boc::BagOfCells;
pub use builder::CellBuilder;
pub use cell::Cell;
pub use hashmap::Hashmap;
pub use slice::CellSlice;

/// Errors that can occur during bit, cell, hashmap and BoC operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CellError {
    /// The cell data exceeds the maximum of 1023 bits.
    #[error("cell data too long: {0} bits (max 1023)")]
    DataTooLong(usize),

    /// The cell has too many references (max 4).
    #[error("too many cell references: {0} (max 4)")]
    TooManyRefs(usize),

    /// Not enough bits available.
    #[error("not enough bits: need {need}, have {have}")]
    NotEnoughBits { need: usize, have: usize },

    /// Not enough references available.
    #[error("not enough refs: need {need}, have {have}")]
    NotEnoughRefs { need: usize, have: usize },

    /// Integer does not fit into the requested bit width.
    #[error("value {value} does not fit into {bits} bits")]
    ValueOutOfRange { value: String, bits: usize },

    /// Bit width not supported by the called method.
    #[error("invalid bit length: {0}")]
    InvalidBitLength(usize),

    /// Invalid BoC format.
    #[error("invalid BoC format: {0}")]
    InvalidBoc(String),

    /// CRC32-C checksum mismatch.
    #[error("CRC32 mismatch: expected 0x{expected:08x}, got 0x{actual:08x}")]
    CrcMismatch { expected: u32, actual: u32 },

    /// A cell references an index that is not strictly greater than its own.
    #[error("topological order broken: cell {cell} references {reference}")]
    TopologyBroken { cell: usize, reference: usize },

    /// Unexpected end of data.
    #[error("unexpected end of data")]
    UnexpectedEof,

    /// Invalid address format.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Address kind that this crate does not handle.
    #[error("unsupported address: {0}")]
    UnsupportedAddress(String),

    /// Invalid base64 encoding.
    #[error("invalid base64: {0}")]
    InvalidBase64(String),

    /// String is not a recognized bit-string form.
    #[error("invalid bit string: {0}")]
    InvalidBitString(String),

    /// Malformed or inconsistent hashmap.
    #[error("hashmap error: {0}")]
    Hashmap(String),

    /// Expected single root but found multiple or none.
    #[error("expected single root, found {0}")]
    NotSingleRoot(usize),

    /// Invalid cell type.
    #[error("invalid cell type: {0}")]
    InvalidCellType(u8),

    /// Cell tree deeper than [`MAX_CELL_DEPTH`].
    #[error("cell depth {0} exceeds maximum")]
    DepthOverflow(usize),
}

/// Result type for Cell/BoC operations.
pub type CellResult<T> = Result<T, CellError>;

/// Maximum number of bits in a cell's data.
pub const MAX_CELL_BITS: usize = 1023;

/// Maximum number of references a cell can have.
pub const MAX_CELL_REFS: usize = 4;

/// Maximum depth of a cell tree.
/// Reference: ton-blockchain/ton/crypto/vm/cells/CellTraits.h max_depth = 1024
pub const MAX_CELL_DEPTH: usize = 1024;

/// BoC magic number for generic BoC.
pub const BOC_GENERIC_MAGIC: u32 = 0xb5ee9c72;

/// BoC magic number for indexed BoC.
pub const BOC_INDEXED_MAGIC: u32 = 0x68ff65f3;

/// BoC magic number for indexed CRC32 BoC.
pub const BOC_INDEXED_CRC32_MAGIC: u32 = 0xacc3a728;

/// Cell type indicator.
///
/// Only ordinary cells are interpreted; exotic cells are carried through
/// BoC round-trips with their type tag and hashed as level-0 cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CellType {
    Ordinary = 0,
    PrunedBranch = 1,
    Library = 2,
    MerkleProof = 3,
    MerkleUpdate = 4,
}

impl CellType {
    /// Check if this is an exotic (non-ordinary) cell type.
    pub fn is_exotic(&self) -> bool {
        *self != CellType::Ordinary
    }

    /// Convert from the exotic type byte (first data byte of an exotic cell).
    pub fn from_u8(value: u8) -> CellResult<Self> {
        match value {
            0 => Ok(CellType::Ordinary),
            1 => Ok(CellType::PrunedBranch),
            2 => Ok(CellType::Library),
            3 => Ok(CellType::MerkleProof),
            4 => Ok(CellType::MerkleUpdate),
            _ => Err(CellError::InvalidCellType(value)),
        }
    }
}

/// Compute CRC32-C checksum (Castagnoli polynomial).
fn crc32c(data: &[u8]) -> u32 {
    const CRC32C: crc::Crc<u32> = crc::Crc::<u32>::new(&crc::CRC_32_ISCSI);
    CRC32C.checksum(data)
}

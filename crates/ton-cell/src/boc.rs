//! Bag of Cells (BoC) serialization format.
//!
//! BoC is the standard serialization format for TON cells. It encodes a DAG
//! of cells with deduplication and an optional CRC32-C checksum.
//!
//! ```text
//! serialized_boc#b5ee9c72 has_idx:(## 1) has_crc32c:(## 1)
//!   has_cache_bits:(## 1) flags:(## 2) { flags = 0 }
//!   size:(## 3) { size <= 4 }
//!   off_bytes:(## 8) { off_bytes <= 8 }
//!   cells:(##(size * 8))
//!   roots:(##(size * 8)) { roots >= 1 }
//!   absent:(##(size * 8)) { roots + absent <= cells }
//!   tot_cells_size:(##(off_bytes * 8))
//!   root_list:(roots * ##(size * 8))
//!   index:has_idx?(cells * ##(off_bytes * 8))
//!   cell_data:(tot_cells_size * [ uint8 ])
//!   crc32c:has_crc32c?uint32
//! ```
//!
//! Cells are numbered root-first: every reference points to a strictly
//! greater index.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::{
    crc32c, Bits, Cell, CellError, CellResult, CellType, BOC_GENERIC_MAGIC,
    BOC_INDEXED_CRC32_MAGIC, BOC_INDEXED_MAGIC, MAX_CELL_REFS,
};

const HASH_AND_DEPTH_BYTES: usize = 32 + 2;

/// Bag of Cells - a serialized collection of cells.
///
/// # Example
///
/// ```
/// use ton_cell::{BagOfCells, Cell};
///
/// let bytes = BagOfCells::from_root(Cell::empty()).serialize().unwrap();
/// assert_eq!(&bytes[..4], &[0xb5, 0xee, 0x9c, 0x72]);
///
/// let boc = BagOfCells::deserialize(&bytes).unwrap();
/// assert_eq!(boc.single_root().unwrap().bit_len(), 0);
/// ```
#[derive(Debug, Clone)]
pub struct BagOfCells {
    roots: Vec<Arc<Cell>>,
}

/// A cell as read from the wire, before its references are resolved.
struct RawCell {
    bits: Bits,
    cell_type: CellType,
    refs: Vec<usize>,
}

impl BagOfCells {
    /// Create a new BoC with the given root cells.
    pub fn new(roots: Vec<Arc<Cell>>) -> Self {
        BagOfCells { roots }
    }

    /// Create a BoC with a single root cell.
    pub fn from_root(root: Cell) -> Self {
        BagOfCells {
            roots: vec![Arc::new(root)],
        }
    }

    pub fn roots(&self) -> &[Arc<Cell>] {
        &self.roots
    }

    pub fn into_roots(self) -> Vec<Arc<Cell>> {
        self.roots
    }

    /// Get the only root cell (errors if not exactly one root).
    pub fn single_root(&self) -> CellResult<&Arc<Cell>> {
        if self.roots.len() != 1 {
            return Err(CellError::NotSingleRoot(self.roots.len()));
        }
        Ok(&self.roots[0])
    }

    pub fn root_count(&self) -> usize {
        self.roots.len()
    }

    /// Serialize with a CRC32-C and without an index.
    pub fn serialize(&self) -> CellResult<Vec<u8>> {
        self.serialize_with_options(false, true)
    }

    /// Serialize with explicit options.
    ///
    /// # Arguments
    /// * `with_index` - Include the offset index table
    /// * `with_crc` - Append a CRC32-C checksum
    pub fn serialize_with_options(&self, with_index: bool, with_crc: bool) -> CellResult<Vec<u8>> {
        if self.roots.is_empty() {
            return Err(CellError::InvalidBoc("no root cells".to_string()));
        }

        let cells = self.collect_cells_topological();
        let cell_count = cells.len();
        let hash_to_index: HashMap<[u8; 32], usize> = cells
            .iter()
            .enumerate()
            .map(|(i, c)| (c.hash(), i))
            .collect();

        let size_bytes = bytes_needed(cell_count as u64);

        let mut cell_data: Vec<Vec<u8>> = Vec::with_capacity(cell_count);
        for cell in &cells {
            cell_data.push(serialize_cell(cell, &hash_to_index, size_bytes)?);
        }
        let total_cells_size: usize = cell_data.iter().map(Vec::len).sum();
        let off_bytes = bytes_needed(total_cells_size as u64);

        let mut result = Vec::with_capacity(32 + total_cells_size);
        result.extend_from_slice(&BOC_GENERIC_MAGIC.to_be_bytes());

        // has_idx | has_crc32c | has_cache_bits | flags | size
        let flags: u8 = (if with_index { 1 << 7 } else { 0 })
            | (if with_crc { 1 << 6 } else { 0 })
            | (size_bytes as u8);
        result.push(flags);
        result.push(off_bytes as u8);

        write_uint(&mut result, cell_count as u64, size_bytes);
        write_uint(&mut result, self.roots.len() as u64, size_bytes);
        write_uint(&mut result, 0, size_bytes);
        write_uint(&mut result, total_cells_size as u64, off_bytes);

        for root in &self.roots {
            let idx = hash_to_index
                .get(&root.hash())
                .ok_or_else(|| CellError::InvalidBoc("root not collected".to_string()))?;
            write_uint(&mut result, *idx as u64, size_bytes);
        }

        if with_index {
            let mut end = 0usize;
            for data in &cell_data {
                end += data.len();
                write_uint(&mut result, end as u64, off_bytes);
            }
        }

        for data in cell_data {
            result.extend_from_slice(&data);
        }

        if with_crc {
            let crc = crc32c(&result);
            result.extend_from_slice(&crc.to_le_bytes());
        }

        Ok(result)
    }

    /// Serialize to a standard base64 string.
    pub fn to_base64(&self) -> CellResult<String> {
        Ok(STANDARD.encode(self.serialize()?))
    }

    /// Serialize to a lowercase hex string.
    pub fn to_hex(&self) -> CellResult<String> {
        Ok(hex::encode(self.serialize()?))
    }

    /// Deserialize from bytes.
    ///
    /// Supports all three BoC formats:
    /// - `0xb5ee9c72` - Generic BoC (serialized_boc)
    /// - `0x68ff65f3` - Indexed BoC (serialized_boc_idx)
    /// - `0xacc3a728` - Indexed BoC with CRC32C (serialized_boc_idx_crc32c)
    pub fn deserialize(data: &[u8]) -> CellResult<Self> {
        if data.len() < 6 {
            return Err(CellError::UnexpectedEof);
        }

        let magic = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
        let flags = data[4];
        let (has_idx, has_crc, size_bytes) = match magic {
            BOC_GENERIC_MAGIC => {
                if flags & 0x18 != 0 {
                    return Err(CellError::InvalidBoc(format!(
                        "reserved flags set: 0x{:x}",
                        (flags >> 3) & 0x03
                    )));
                }
                (flags & 0x80 != 0, flags & 0x40 != 0, (flags & 0x07) as usize)
            }
            BOC_INDEXED_MAGIC => (true, false, flags as usize),
            BOC_INDEXED_CRC32_MAGIC => (true, true, flags as usize),
            _ => {
                return Err(CellError::InvalidBoc(format!(
                    "invalid magic: {magic:08x}, expected one of {BOC_GENERIC_MAGIC:08x}, \
                     {BOC_INDEXED_MAGIC:08x}, {BOC_INDEXED_CRC32_MAGIC:08x}"
                )));
            }
        };

        let body = if has_crc {
            if data.len() < 10 {
                return Err(CellError::UnexpectedEof);
            }
            let (body, tail) = data.split_at(data.len() - 4);
            let expected = u32::from_le_bytes([tail[0], tail[1], tail[2], tail[3]]);
            let actual = crc32c(body);
            if expected != actual {
                return Err(CellError::CrcMismatch { expected, actual });
            }
            body
        } else {
            data
        };

        if !(1..=4).contains(&size_bytes) {
            return Err(CellError::InvalidBoc(format!("invalid size_bytes: {size_bytes}")));
        }

        let mut offset = 5;
        let off_bytes = read_uint(body, &mut offset, 1)? as usize;
        if !(1..=8).contains(&off_bytes) {
            return Err(CellError::InvalidBoc(format!("invalid off_bytes: {off_bytes}")));
        }

        let cells_count = read_uint(body, &mut offset, size_bytes)? as usize;
        let roots_count = read_uint(body, &mut offset, size_bytes)? as usize;
        let absent_count = read_uint(body, &mut offset, size_bytes)? as usize;
        let total_cells_size = read_uint(body, &mut offset, off_bytes)? as usize;

        if roots_count == 0 {
            return Err(CellError::InvalidBoc("no root cells".to_string()));
        }
        if roots_count + absent_count > cells_count {
            return Err(CellError::InvalidBoc(format!(
                "roots ({roots_count}) + absent ({absent_count}) exceed cells ({cells_count})"
            )));
        }

        let mut root_indices = Vec::with_capacity(roots_count);
        for _ in 0..roots_count {
            let idx = read_uint(body, &mut offset, size_bytes)? as usize;
            if idx >= cells_count {
                return Err(CellError::InvalidBoc(format!(
                    "root index {idx} out of range ({cells_count} cells)"
                )));
            }
            root_indices.push(idx);
        }

        if has_idx {
            offset = cells_count
                .checked_mul(off_bytes)
                .and_then(|len| offset.checked_add(len))
                .ok_or(CellError::UnexpectedEof)?;
        }

        let remaining = body.len().saturating_sub(offset);
        if offset > body.len() || remaining != total_cells_size {
            return Err(CellError::InvalidBoc(format!(
                "cell data size mismatch: declared {total_cells_size}, available {remaining}"
            )));
        }

        let cells = parse_cells(&body[offset..], cells_count, size_bytes)?;
        let roots = root_indices.into_iter().map(|i| cells[i].clone()).collect();
        Ok(BagOfCells { roots })
    }

    /// Deserialize from a base64 string (standard or URL-safe alphabet).
    pub fn from_base64(s: &str) -> CellResult<Self> {
        let bits = Bits::from_base64(s.trim())?;
        Self::deserialize(bits.as_bytes())
    }

    /// Deserialize from a hex string.
    pub fn from_hex(s: &str) -> CellResult<Self> {
        let bytes = hex::decode(s.trim()).map_err(|e| CellError::InvalidBoc(format!("invalid hex: {e}")))?;
        Self::deserialize(&bytes)
    }

    /// Root-first topological order: roots in reverse, children before the
    /// cell in post-order, then the whole list reversed.
    fn collect_cells_topological(&self) -> Vec<Arc<Cell>> {
        let mut cells: Vec<Arc<Cell>> = Vec::new();
        let mut visited: HashSet<[u8; 32]> = HashSet::new();

        for root in self.roots.iter().rev() {
            collect_cell_recursive(root, &mut cells, &mut visited);
        }

        cells.reverse();
        cells
    }
}

fn collect_cell_recursive(
    cell: &Arc<Cell>,
    cells: &mut Vec<Arc<Cell>>,
    visited: &mut HashSet<[u8; 32]>,
) {
    if !visited.insert(cell.hash()) {
        return;
    }
    for reference in cell.references() {
        collect_cell_recursive(reference, cells, visited);
    }
    cells.push(cell.clone());
}

fn serialize_cell(
    cell: &Cell,
    hash_to_index: &HashMap<[u8; 32], usize>,
    ref_size: usize,
) -> CellResult<Vec<u8>> {
    let mut result = Vec::with_capacity(2 + 128 + cell.reference_count() * ref_size);

    let (d1, d2) = cell.descriptors();
    result.push(d1);
    result.push(d2);
    result.extend_from_slice(&cell.augmented_data());

    for reference in cell.references() {
        let idx = hash_to_index
            .get(&reference.hash())
            .ok_or_else(|| CellError::InvalidBoc("reference not collected".to_string()))?;
        write_uint(&mut result, *idx as u64, ref_size);
    }

    Ok(result)
}

fn parse_cell(data: &[u8], offset: &mut usize, index: usize, cells_count: usize, size_bytes: usize) -> CellResult<RawCell> {
    let d1 = read_uint(data, offset, 1)? as u8;
    let d2 = read_uint(data, offset, 1)? as u8;

    let refs_count = (d1 & 0x07) as usize;
    let is_exotic = d1 & 0x08 != 0;
    let with_hashes = d1 & 0x10 != 0;
    let level_mask = d1 >> 5;

    if refs_count > MAX_CELL_REFS {
        return Err(CellError::InvalidBoc(format!(
            "cell {index} declares {refs_count} references"
        )));
    }

    if with_hashes {
        *offset += (level_mask.count_ones() as usize + 1) * HASH_AND_DEPTH_BYTES;
    }

    let data_len = (d2 as usize).div_ceil(2);
    if *offset + data_len > data.len() {
        return Err(CellError::UnexpectedEof);
    }
    let raw = Bits::from_bytes(&data[*offset..*offset + data_len]);
    *offset += data_len;

    let bits = if d2 % 2 == 1 {
        raw.rollback(8)
            .map_err(|_| CellError::InvalidBoc(format!("cell {index} has no completion tag")))?
    } else {
        raw
    };

    let cell_type = if is_exotic {
        let tag = bits.as_bytes().first().copied().unwrap_or_default();
        let cell_type = CellType::from_u8(tag)?;
        if !cell_type.is_exotic() {
            return Err(CellError::InvalidCellType(tag));
        }
        cell_type
    } else {
        CellType::Ordinary
    };

    let mut refs = Vec::with_capacity(refs_count);
    for _ in 0..refs_count {
        let reference = read_uint(data, offset, size_bytes)? as usize;
        if reference >= cells_count {
            return Err(CellError::InvalidBoc(format!(
                "cell {index} references {reference}, only {cells_count} cells"
            )));
        }
        if reference <= index {
            return Err(CellError::TopologyBroken { cell: index, reference });
        }
        refs.push(reference);
    }

    Ok(RawCell { bits, cell_type, refs })
}

/// Parse the cell section and resolve references, children before parents.
fn parse_cells(data: &[u8], cells_count: usize, size_bytes: usize) -> CellResult<Vec<Arc<Cell>>> {
    let mut offset = 0;
    let mut raw_cells = Vec::with_capacity(cells_count.min(data.len() / 2));
    for index in 0..cells_count {
        raw_cells.push(parse_cell(data, &mut offset, index, cells_count, size_bytes)?);
    }
    if offset != data.len() {
        return Err(CellError::InvalidBoc(format!(
            "{} unread bytes after cell data",
            data.len().saturating_sub(offset)
        )));
    }

    let mut cells: Vec<Option<Arc<Cell>>> = vec![None; cells_count];
    for (index, raw) in raw_cells.into_iter().enumerate().rev() {
        let references = raw
            .refs
            .iter()
            .map(|&r| {
                cells[r]
                    .clone()
                    .ok_or(CellError::TopologyBroken { cell: index, reference: r })
            })
            .collect::<CellResult<Vec<_>>>()?;
        cells[index] = Some(Arc::new(Cell::with_type(raw.bits, references, raw.cell_type)?));
    }

    cells
        .into_iter()
        .enumerate()
        .map(|(i, c)| c.ok_or_else(|| CellError::InvalidBoc(format!("cell {i} unresolved"))))
        .collect()
}

/// Minimal number of bytes to hold `n` (at least 1).
fn bytes_needed(n: u64) -> usize {
    (((64 - n.leading_zeros()) as usize).div_ceil(8)).max(1)
}

fn write_uint(buf: &mut Vec<u8>, value: u64, bytes: usize) {
    for i in (0..bytes).rev() {
        buf.push((value >> (i * 8)) as u8);
    }
}

fn read_uint(data: &[u8], offset: &mut usize, bytes: usize) -> CellResult<u64> {
    if *offset + bytes > data.len() {
        return Err(CellError::UnexpectedEof);
    }
    let value = data[*offset..*offset + bytes]
        .iter()
        .fold(0u64, |acc, &b| (acc << 8) | b as u64);
    *offset += bytes;
    Ok(value)
}

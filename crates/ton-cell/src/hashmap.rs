//! Fixed key-width dictionaries (`Hashmap n X` / `HashmapE n X`).
//!
//! A map is serialized as a binary Patricia trie of cells. Every edge
//! carries a label in whichever of the three TL-B encodings is shortest:
//!
//! ```text
//! hml_short$0 {m:#} {n:#} len:(Unary ~n) s:(n * Bit) = HmLabel ~n m;
//! hml_long$10 {m:#} n:(#<= m) s:(n * Bit) = HmLabel ~n m;
//! hml_same$11 {m:#} v:Bit n:(#<= m) = HmLabel ~n m;
//! ```
//!
//! Leaves store the value's bits and references inline after the label;
//! forks store the left (`0`) and right (`1`) subtrees as references.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::{BitRead, BitWrite, Bits, BitsBuilder, Cell, CellBuilder, CellError, CellResult, CellSlice};

/// Bit width of `n` in `#<= m`: `ceil(log2(m + 1))`.
fn label_len_bits(m: usize) -> usize {
    (usize::BITS - m.leading_zeros()) as usize
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LabelKind {
    Short,
    Long,
    Same(bool),
}

fn choose_label(label: &Bits, m: usize) -> LabelKind {
    let n = label.len();
    let k = label_len_bits(m);

    let mut best = (2 * n + 2, LabelKind::Short);
    if 2 + k + n < best.0 {
        best = (2 + k + n, LabelKind::Long);
    }
    let first = label.get(0).unwrap_or(false);
    if label.iter().all(|b| b == first) && 3 + k < best.0 {
        best = (3 + k, LabelKind::Same(first));
    }
    best.1
}

fn store_label(builder: &mut CellBuilder, label: &Bits, m: usize) -> CellResult<()> {
    let n = label.len();
    let k = label_len_bits(m);
    match choose_label(label, m) {
        LabelKind::Short => {
            builder.store_bit(false)?;
            builder.store_bits(&Bits::repeat(true, n))?;
            builder.store_bit(false)?;
            builder.store_bits(label)?;
        }
        LabelKind::Long => {
            builder.store_uint(0b10, 2)?;
            builder.store_uint(n as u64, k)?;
            builder.store_bits(label)?;
        }
        LabelKind::Same(bit) => {
            builder.store_uint(0b11, 2)?;
            builder.store_bit(bit)?;
            builder.store_uint(n as u64, k)?;
        }
    }
    Ok(())
}

fn load_label(slice: &mut CellSlice<'_>, m: usize) -> CellResult<Bits> {
    let too_long = |n: usize| CellError::Hashmap(format!("label length {n} exceeds {m}"));

    if !slice.load_bit()? {
        let mut n = 0;
        while slice.load_bit()? {
            n += 1;
            if n > m {
                return Err(too_long(n));
            }
        }
        return slice.load_bits(n);
    }

    let k = label_len_bits(m);
    if !slice.load_bit()? {
        let n = slice.load_uint(k)? as usize;
        if n > m {
            return Err(too_long(n));
        }
        slice.load_bits(n)
    } else {
        let bit = slice.load_bit()?;
        let n = slice.load_uint(k)? as usize;
        if n > m {
            return Err(too_long(n));
        }
        Ok(Bits::repeat(bit, n))
    }
}

/// A dictionary with `key_size`-bit keys and cell values.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use ton_cell::{BitWrite, CellBuilder, Hashmap};
///
/// let mut map = Hashmap::new(16).unwrap();
/// let mut value = CellBuilder::new();
/// value.store_u8(42).unwrap();
/// map.insert_uint(7, Arc::new(value.build().unwrap())).unwrap();
///
/// let root = map.serialize().unwrap().unwrap();
/// let restored = Hashmap::deserialize(Some(&root), 16).unwrap();
/// assert_eq!(restored.len(), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hashmap {
    key_size: usize,
    entries: BTreeMap<Bits, Arc<Cell>>,
}

impl Hashmap {
    pub fn new(key_size: usize) -> CellResult<Self> {
        if key_size == 0 {
            return Err(CellError::Hashmap("key size cannot be 0".into()));
        }
        Ok(Self {
            key_size,
            entries: BTreeMap::new(),
        })
    }

    pub fn key_size(&self) -> usize {
        self.key_size
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn check_key(&self, key: &Bits) -> CellResult<()> {
        if key.len() != self.key_size {
            return Err(CellError::Hashmap(format!(
                "wrong key size: {} (expected {})",
                key.len(),
                self.key_size
            )));
        }
        Ok(())
    }

    /// Big-endian key bits of an unsigned integer, zero-extended to the key width.
    pub fn uint_key(&self, key: u64) -> CellResult<Bits> {
        let mut builder = BitsBuilder::unbounded();
        if self.key_size > 64 {
            builder.store_bits(&Bits::repeat(false, self.key_size - 64))?;
            builder.store_u64(key)?;
        } else {
            builder.store_uint(key, self.key_size)?;
        }
        Ok(builder.build())
    }

    /// Insert a value, returning the previous one for this key.
    pub fn insert(&mut self, key: Bits, value: Arc<Cell>) -> CellResult<Option<Arc<Cell>>> {
        self.check_key(&key)?;
        Ok(self.entries.insert(key, value))
    }

    pub fn insert_uint(&mut self, key: u64, value: Arc<Cell>) -> CellResult<Option<Arc<Cell>>> {
        let key = self.uint_key(key)?;
        self.insert(key, value)
    }

    pub fn get(&self, key: &Bits) -> Option<&Arc<Cell>> {
        self.entries.get(key)
    }

    pub fn get_uint(&self, key: u64) -> CellResult<Option<&Arc<Cell>>> {
        Ok(self.entries.get(&self.uint_key(key)?))
    }

    pub fn remove(&mut self, key: &Bits) -> Option<Arc<Cell>> {
        self.entries.remove(key)
    }

    /// Entries in ascending key order.
    pub fn iter(&self) -> impl Iterator<Item = (&Bits, &Arc<Cell>)> {
        self.entries.iter()
    }

    /// Serialize to the root cell of a `Hashmap`, or `None` when empty.
    pub fn serialize(&self) -> CellResult<Option<Cell>> {
        if self.entries.is_empty() {
            return Ok(None);
        }
        let nodes: Vec<(Bits, &Arc<Cell>)> =
            self.entries.iter().map(|(k, v)| (k.clone(), v)).collect();
        serialize_edge(&nodes, self.key_size).map(Some)
    }

    /// Serialize as a `HashmapE` cell: `0`, or `1` plus a reference to the root.
    pub fn serialize_e(&self) -> CellResult<Cell> {
        let mut builder = CellBuilder::new();
        builder.store_dict(self)?;
        builder.build()
    }

    /// Parse a `Hashmap` root. `None` yields an empty map.
    pub fn deserialize(root: Option<&Cell>, key_size: usize) -> CellResult<Self> {
        let mut map = Self::new(key_size)?;
        let Some(root) = root else {
            return Ok(map);
        };
        if root.bit_len() < 2 {
            return Err(CellError::Hashmap(format!(
                "root edge of {} bits is too short",
                root.bit_len()
            )));
        }
        deserialize_edge(root, Bits::new(), key_size, &mut map.entries)?;
        Ok(map)
    }

    /// Parse a `HashmapE` cell.
    pub fn deserialize_e(cell: &Cell, key_size: usize) -> CellResult<Self> {
        cell.to_slice().load_dict(key_size)
    }
}

/// `nodes` are sorted, distinct, and all `m` bits long.
fn serialize_edge(nodes: &[(Bits, &Arc<Cell>)], m: usize) -> CellResult<Cell> {
    let mut builder = CellBuilder::new();

    if let [(key, value)] = nodes {
        store_label(&mut builder, key, m)?;
        builder.store_cell(value)?;
        return builder.build();
    }

    let (first, last) = match nodes {
        [first, .., last] => (&first.0, &last.0),
        _ => return Err(CellError::Hashmap("empty subtree".into())),
    };
    let lcp = first.common_prefix_len(last);
    store_label(&mut builder, &first.slice(0, lcp)?, m)?;

    let split = nodes.partition_point(|(key, _)| !key.bit_at(lcp));
    let rest = m - lcp - 1;
    for side in [&nodes[..split], &nodes[split..]] {
        let children = side
            .iter()
            .map(|(key, value)| Ok((key.slice(lcp + 1, m)?, *value)))
            .collect::<CellResult<Vec<_>>>()?;
        builder.store_ref(Arc::new(serialize_edge(&children, rest)?))?;
    }

    builder.build()
}

fn deserialize_edge(
    cell: &Cell,
    mut key: Bits,
    m: usize,
    out: &mut BTreeMap<Bits, Arc<Cell>>,
) -> CellResult<()> {
    let mut slice = cell.to_slice();
    let label = load_label(&mut slice, m)?;
    key.extend(&label);
    let rest = m - label.len();

    if rest == 0 {
        out.insert(key, Arc::new(slice.to_cell()?));
        return Ok(());
    }

    let refs = slice.remaining_refs();
    if !(1..=2).contains(&refs) {
        return Err(CellError::Hashmap(format!(
            "fork with {refs} references"
        )));
    }
    for bit in [false, true].into_iter().take(refs) {
        let child = slice.load_ref()?;
        let mut child_key = key.clone();
        child_key.push(bit);
        deserialize_edge(child, child_key, rest - 1, out)?;
    }
    Ok(())
}

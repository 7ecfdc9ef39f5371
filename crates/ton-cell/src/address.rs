//! TON account addresses.
//!
//! [`Address`] is a workchain plus a 256-bit account hash, with the raw
//! (`wc:hex`) and user-friendly (base64) text forms. [`MsgAddress`] is the
//! in-cell `MsgAddress` sum type.

use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::{STANDARD, URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;

use crate::{Bits, CellError, CellResult};

const TAG_BOUNCEABLE: u8 = 0x11;
const TAG_NON_BOUNCEABLE: u8 = 0x51;
const TAG_TEST_ONLY: u8 = 0x80;

/// CRC16-XMODEM, the user-friendly address checksum.
pub fn crc16(data: &[u8]) -> u16 {
    const CRC16: crc::Crc<u16> = crc::Crc::<u16>::new(&crc::CRC_16_XMODEM);
    CRC16.checksum(data)
}

/// Flags carried by the user-friendly address tag byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AddressFlags {
    pub bounceable: bool,
    pub test_only: bool,
}

impl AddressFlags {
    fn tag(self) -> u8 {
        let tag = if self.bounceable {
            TAG_BOUNCEABLE
        } else {
            TAG_NON_BOUNCEABLE
        };
        if self.test_only {
            tag | TAG_TEST_ONLY
        } else {
            tag
        }
    }

    fn from_tag(tag: u8) -> CellResult<Self> {
        let test_only = tag & TAG_TEST_ONLY != 0;
        let bounceable = match tag & !TAG_TEST_ONLY {
            TAG_BOUNCEABLE => true,
            TAG_NON_BOUNCEABLE => false,
            other => {
                return Err(CellError::InvalidAddress(format!(
                    "unknown address tag 0x{other:02x}"
                )));
            }
        };
        Ok(Self {
            bounceable,
            test_only,
        })
    }
}

/// A standard internal address.
///
/// # Example
///
/// ```
/// use ton_cell::{Address, AddressFlags};
///
/// let addr: Address = "-1:3333333333333333333333333333333333333333333333333333333333333333"
///     .parse()
///     .unwrap();
/// let friendly = addr.to_base64(AddressFlags { bounceable: true, test_only: false });
/// assert_eq!(Address::parse(&friendly).unwrap(), addr);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address {
    workchain: i8,
    hash: [u8; 32],
}

impl Address {
    pub fn new(workchain: i8, hash: [u8; 32]) -> Self {
        Self { workchain, hash }
    }

    /// -1 for masterchain, 0 for basechain.
    pub fn workchain(&self) -> i8 {
        self.workchain
    }

    pub fn hash(&self) -> &[u8; 32] {
        &self.hash
    }

    pub fn is_masterchain(&self) -> bool {
        self.workchain == -1
    }

    /// Parse either text form, returning the base64 flags when present.
    pub fn parse_with_flags(s: &str) -> CellResult<(Self, Option<AddressFlags>)> {
        let s = s.trim();
        if s.contains(':') {
            return Ok((Self::from_raw(s)?, None));
        }
        let (addr, flags) = Self::from_base64(s)?;
        Ok((addr, Some(flags)))
    }

    /// Parse either the raw or the user-friendly form.
    pub fn parse(s: &str) -> CellResult<Self> {
        Ok(Self::parse_with_flags(s)?.0)
    }

    /// Parse `"<workchain>:<64 hex chars>"`.
    pub fn from_raw(s: &str) -> CellResult<Self> {
        let (wc, hash_hex) = s
            .split_once(':')
            .ok_or_else(|| CellError::InvalidAddress(format!("missing ':' in {s}")))?;

        let workchain: i8 = wc
            .parse()
            .map_err(|_| CellError::InvalidAddress(format!("invalid workchain: {wc}")))?;

        if hash_hex.len() != 64 {
            return Err(CellError::InvalidAddress(format!(
                "address hex must be 64 characters, got {}",
                hash_hex.len()
            )));
        }
        let mut hash = [0u8; 32];
        hex::decode_to_slice(hash_hex, &mut hash)
            .map_err(|e| CellError::InvalidAddress(format!("invalid hex: {e}")))?;

        Ok(Self { workchain, hash })
    }

    /// Parse a 48-character user-friendly address (standard or URL-safe
    /// alphabet) and verify its checksum.
    pub fn from_base64(s: &str) -> CellResult<(Self, AddressFlags)> {
        let engine = if s.contains('-') || s.contains('_') {
            &URL_SAFE
        } else {
            &STANDARD
        };
        let bytes = engine
            .decode(s)
            .map_err(|e| CellError::InvalidBase64(e.to_string()))?;

        if bytes.len() != 36 {
            return Err(CellError::InvalidAddress(format!(
                "user-friendly address must be 36 bytes, got {}",
                bytes.len()
            )));
        }

        let expected = u16::from_be_bytes([bytes[34], bytes[35]]);
        let actual = crc16(&bytes[..34]);
        if expected != actual {
            return Err(CellError::InvalidAddress(format!(
                "CRC16 mismatch: expected {expected:04x}, got {actual:04x}"
            )));
        }

        let flags = AddressFlags::from_tag(bytes[0])?;
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&bytes[2..34]);
        Ok((
            Self {
                workchain: bytes[1] as i8,
                hash,
            },
            flags,
        ))
    }

    /// `"<workchain>:<lowercase hex>"`.
    pub fn to_raw(&self) -> String {
        format!("{}:{}", self.workchain, hex::encode(self.hash))
    }

    fn friendly_bytes(&self, flags: AddressFlags) -> [u8; 36] {
        let mut data = [0u8; 36];
        data[0] = flags.tag();
        data[1] = self.workchain as u8;
        data[2..34].copy_from_slice(&self.hash);
        let crc = crc16(&data[..34]);
        data[34..].copy_from_slice(&crc.to_be_bytes());
        data
    }

    /// User-friendly form in the URL-safe alphabet.
    pub fn to_base64(&self, flags: AddressFlags) -> String {
        URL_SAFE_NO_PAD.encode(self.friendly_bytes(flags))
    }

    /// User-friendly form in the standard alphabet.
    pub fn to_base64_std(&self, flags: AddressFlags) -> String {
        STANDARD.encode(self.friendly_bytes(flags))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_raw())
    }
}

impl FromStr for Address {
    type Err = CellError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// In-cell message address.
///
/// - `addr_none$00`
/// - `addr_extern$01`
/// - `addr_std$10` without anycast
///
/// `addr_var$11` and anycast addresses are not supported.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum MsgAddress {
    #[default]
    None,
    External(Bits),
    Std(Address),
}

impl MsgAddress {
    pub fn is_none(&self) -> bool {
        matches!(self, MsgAddress::None)
    }

    /// The standard address, if any.
    pub fn as_std(&self) -> Option<&Address> {
        match self {
            MsgAddress::Std(addr) => Some(addr),
            _ => None,
        }
    }
}

impl From<Address> for MsgAddress {
    fn from(addr: Address) -> Self {
        MsgAddress::Std(addr)
    }
}

impl From<Option<Address>> for MsgAddress {
    fn from(addr: Option<Address>) -> Self {
        addr.map_or(MsgAddress::None, MsgAddress::Std)
    }
}

impl fmt::Display for MsgAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MsgAddress::None => f.write_str("addr_none"),
            MsgAddress::External(bits) => write!(f, "addr_extern:{bits}"),
            MsgAddress::Std(addr) => write!(f, "{addr}"),
        }
    }
}

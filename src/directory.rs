//! The 128-byte directory entry record and the format-mandated name ordering.

use std::cmp::Ordering;

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, U16, U32, U64, LE};

use crate::consts::{
    DE_BLACK, DE_RED, DIRENTRY_SIZE, FORBIDDEN_NAME_CHARS, MAX_NAME_LENGTH_UTF16, NOSTREAM,
    STGTY_INVALID, STGTY_ROOT, STGTY_STORAGE, STGTY_STREAM,
};
use crate::error::{CfbError, Result};

/// What kind of thing a directory entry denotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryType {
    Invalid,
    Storage,
    Stream,
    Root,
}

impl EntryType {
    fn from_byte(b: u8) -> Result<EntryType> {
        match b {
            STGTY_INVALID => Ok(EntryType::Invalid),
            STGTY_STORAGE => Ok(EntryType::Storage),
            STGTY_STREAM => Ok(EntryType::Stream),
            STGTY_ROOT => Ok(EntryType::Root),
            other => Err(CfbError::Corrupted(format!("unsupported entry type byte {other}"))),
        }
    }

    fn to_byte(self) -> u8 {
        match self {
            EntryType::Invalid => STGTY_INVALID,
            EntryType::Storage => STGTY_STORAGE,
            EntryType::Stream => STGTY_STREAM,
            EntryType::Root => STGTY_ROOT,
        }
    }
}

/// Red-black colour of a directory entry, as stored in its colour byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Colour {
    Red,
    Black,
}

impl Colour {
    fn from_byte(b: u8) -> Colour {
        if b == DE_RED { Colour::Red } else { Colour::Black }
    }

    fn to_byte(self) -> u8 {
        match self {
            Colour::Red => DE_RED,
            Colour::Black => DE_BLACK,
        }
    }
}

#[derive(FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
struct RawDirectoryEntry {
    name: [u8; 64],
    name_len: U16<LE>,
    entry_type: u8,
    colour: u8,
    sid_left: U32<LE>,
    sid_right: U32<LE>,
    sid_child: U32<LE>,
    clsid: [u8; 16],
    state_bits: U32<LE>,
    ctime: U64<LE>,
    mtime: U64<LE>,
    start_sector: U32<LE>,
    size: U64<LE>,
}

/// One 128-byte directory record, addressed by its position (SID) in the flat directory vector.
#[derive(Debug, Clone)]
pub struct DirectoryEntry {
    pub name: String,
    pub entry_type: EntryType,
    pub colour: Colour,
    pub sid_left: u32,
    pub sid_right: u32,
    pub sid_child: u32,
    pub clsid: [u8; 16],
    pub state_bits: u32,
    pub ctime: u64,
    pub mtime: u64,
    pub start_sector: u32,
    pub size: u64,
}

impl DirectoryEntry {
    /// A tombstone left behind when a directory entry is deleted.
    pub fn invalid(sid: u32) -> DirectoryEntry {
        DirectoryEntry {
            name: format!("_DELETED_NAME_{sid}"),
            entry_type: EntryType::Invalid,
            colour: Colour::Black,
            sid_left: NOSTREAM,
            sid_right: NOSTREAM,
            sid_child: NOSTREAM,
            clsid: [0u8; 16],
            state_bits: 0,
            ctime: 0,
            mtime: 0,
            start_sector: crate::consts::ENDOFCHAIN,
            size: 0,
        }
    }

    /// A freshly minted storage or stream entry, red by default (colour settles at insert time).
    pub fn new(name: &str, entry_type: EntryType) -> Result<DirectoryEntry> {
        validate_name(name)?;
        Ok(DirectoryEntry {
            name: name.to_string(),
            entry_type,
            colour: Colour::Red,
            sid_left: NOSTREAM,
            sid_right: NOSTREAM,
            sid_child: NOSTREAM,
            clsid: [0u8; 16],
            state_bits: 0,
            ctime: 0,
            mtime: 0,
            start_sector: crate::consts::ENDOFCHAIN,
            size: 0,
        })
    }

    /// The empty root entry, always SID 0.
    pub fn root() -> DirectoryEntry {
        DirectoryEntry {
            name: "Root Entry".to_string(),
            entry_type: EntryType::Root,
            colour: Colour::Black,
            sid_left: NOSTREAM,
            sid_right: NOSTREAM,
            sid_child: NOSTREAM,
            clsid: [0u8; 16],
            state_bits: 0,
            ctime: 0,
            mtime: 0,
            start_sector: crate::consts::ENDOFCHAIN,
            size: 0,
        }
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self.entry_type, EntryType::Invalid)
    }

    pub fn is_storage_like(&self) -> bool {
        matches!(self.entry_type, EntryType::Storage | EntryType::Root)
    }

    pub fn from_bytes(buf: &[u8]) -> Result<DirectoryEntry> {
        let raw = RawDirectoryEntry::ref_from_bytes(buf)
            .map_err(|_| CfbError::Corrupted("truncated directory entry".into()))?;

        let name_len = raw.name_len.get() as usize;
        let name = if name_len == 0 {
            String::new()
        } else {
            decode_utf16le_name(&raw.name, name_len)?
        };

        Ok(DirectoryEntry {
            name,
            entry_type: EntryType::from_byte(raw.entry_type)?,
            colour: Colour::from_byte(raw.colour),
            sid_left: raw.sid_left.get(),
            sid_right: raw.sid_right.get(),
            sid_child: raw.sid_child.get(),
            clsid: raw.clsid,
            state_bits: raw.state_bits.get(),
            ctime: raw.ctime.get(),
            mtime: raw.mtime.get(),
            start_sector: raw.start_sector.get(),
            size: raw.size.get(),
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut name_buf = [0u8; 64];
        let encoded = encode_utf16le_name(&self.name);
        let copy_len = encoded.len().min(64);
        name_buf[..copy_len].copy_from_slice(&encoded[..copy_len]);

        let name_len = if self.name.is_empty() { 0 } else { (encoded.len() + 2) as u16 };

        let raw = RawDirectoryEntry {
            name: name_buf,
            name_len: U16::new(name_len),
            entry_type: self.entry_type.to_byte(),
            colour: self.colour.to_byte(),
            sid_left: U32::new(self.sid_left),
            sid_right: U32::new(self.sid_right),
            sid_child: U32::new(self.sid_child),
            clsid: self.clsid,
            state_bits: U32::new(self.state_bits),
            ctime: U64::new(self.ctime),
            mtime: U64::new(self.mtime),
            start_sector: U32::new(self.start_sector),
            size: U64::new(self.size),
        };
        let mut out = raw.as_bytes().to_vec();
        debug_assert_eq!(out.len(), DIRENTRY_SIZE);
        out.resize(DIRENTRY_SIZE, 0);
        out
    }
}

fn decode_utf16le_name(buf: &[u8; 64], name_len_bytes: usize) -> Result<String> {
    if name_len_bytes < 2 || name_len_bytes > 64 {
        return Err(CfbError::Corrupted("invalid directory entry name length".into()));
    }
    // name_len includes the NUL terminator; strip it before decoding.
    let code_unit_count = (name_len_bytes - 2) / 2;
    let units: Vec<u16> = buf[..code_unit_count * 2]
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();
    String::from_utf16(&units).map_err(|_| CfbError::Corrupted("invalid UTF-16 name".into()))
}

fn encode_utf16le_name(name: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(name.len() * 2 + 2);
    for unit in name.encode_utf16() {
        out.extend_from_slice(&unit.to_le_bytes());
    }
    out.extend_from_slice(&[0u8, 0u8]); // NUL terminator
    out
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(CfbError::Generic("entry name must not be empty".into()));
    }
    let code_units = name.encode_utf16().count() + 1; // + NUL terminator
    if code_units > MAX_NAME_LENGTH_UTF16 {
        return Err(CfbError::Generic(format!(
            "entry name exceeds {} UTF-16 code units",
            MAX_NAME_LENGTH_UTF16 - 1
        )));
    }
    if name.chars().any(|c| FORBIDDEN_NAME_CHARS.contains(&c)) {
        return Err(CfbError::Generic("entry name contains a forbidden character".into()));
    }
    Ok(())
}

/// Format-mandated ordering key: compare by encoded byte length first, then upper-cased
/// UTF-16 code units. Used for every red-black tree insert, lookup, and delete.
pub fn compare_names(a: &str, b: &str) -> Ordering {
    let a_units: Vec<u16> = a.encode_utf16().collect();
    let b_units: Vec<u16> = b.encode_utf16().collect();

    let a_len_bytes = a_units.len() * 2;
    let b_len_bytes = b_units.len() * 2;
    match a_len_bytes.cmp(&b_len_bytes) {
        Ordering::Equal => {}
        other => return other,
    }

    uppercase_units(&a_units).cmp(&uppercase_units(&b_units))
}

/// Upper-cases each UTF-16 code unit of a name independently, taking only the primary
/// mapping of a character's uppercase expansion rather than Unicode's full, string-aware
/// case folding. The format's tie-break is a literal word-by-word comparison of the
/// original units; full folding (e.g. 'ß' -> "SS") would change the unit count and produce
/// an ordering inconsistent with a per-unit uppercase.
fn uppercase_units(units: &[u16]) -> Vec<u16> {
    std::char::decode_utf16(units.iter().copied())
        .map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER))
        .flat_map(|c| {
            let upper = c.to_uppercase().next().unwrap_or(c);
            let mut buf = [0u16; 2];
            upper.encode_utf16(&mut buf).to_vec()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shorter_name_sorts_before_longer_name() {
        assert_eq!(compare_names("AB", "ABC"), Ordering::Less);
    }

    #[test]
    fn same_length_compares_case_insensitively() {
        assert_eq!(compare_names("abc", "ABC"), Ordering::Equal);
        assert_eq!(compare_names("ABC", "ABD"), Ordering::Less);
    }

    #[test]
    fn sharp_s_does_not_shift_later_units_during_tie_break_comparison() {
        // Full Unicode case folding turns "ß" into two units ("SS"), shifting every unit
        // after it by one and comparing against the wrong unit of the other name. Per-unit
        // uppercase keeps both names' units aligned by original position.
        assert_eq!(compare_names("Sßa", "SSb"), Ordering::Less);
    }

    #[test]
    fn round_trips_through_bytes() {
        let mut entry = DirectoryEntry::new("Hello World", EntryType::Stream).unwrap();
        entry.size = 1234;
        entry.start_sector = 7;
        let bytes = entry.to_bytes();
        assert_eq!(bytes.len(), DIRENTRY_SIZE);

        let decoded = DirectoryEntry::from_bytes(&bytes).unwrap();
        assert_eq!(decoded.name, "Hello World");
        assert_eq!(decoded.size, 1234);
        assert_eq!(decoded.start_sector, 7);
        assert_eq!(decoded.entry_type, EntryType::Stream);
    }

    #[test]
    fn name_with_forbidden_character_is_rejected() {
        assert!(DirectoryEntry::new("bad/name", EntryType::Stream).is_err());
    }

    #[test]
    fn name_longer_than_31_code_units_is_rejected() {
        let name: String = std::iter::repeat('x').take(32).collect();
        assert!(DirectoryEntry::new(&name, EntryType::Stream).is_err());
    }

    #[test]
    fn root_entry_is_black_and_storage_like() {
        let root = DirectoryEntry::root();
        assert_eq!(root.colour, Colour::Black);
        assert!(root.is_storage_like());
    }
}

//! Format constants for the Compound File Binary (CFB) structure.

/// Magic bytes that must open every CFB file.
pub const MAGIC: &[u8; 8] = b"\xD0\xCF\x11\xE0\xA1\xB1\x1A\xE1";

/// Minimal size of an empty CFB file with 512-byte sectors.
pub const MINIMAL_CFB_SIZE: usize = 1536;

/// Size of a directory entry record, in bytes.
pub const DIRENTRY_SIZE: usize = 128;

/// Sector size for format version 3.
pub const SECTOR_SIZE_V3: usize = 512;

/// Sector size for format version 4.
pub const SECTOR_SIZE_V4: usize = 4096;

/// Mini sector size, fixed regardless of version.
pub const MINI_SECTOR_SIZE: usize = 64;

/// Default cutoff, in bytes, below which a stream is mini-sector resident.
pub const DEFAULT_MINI_STREAM_CUTOFF: u32 = 4096;

/// Byte width of a FAT/DIFAT/MiniFAT entry.
pub const SECTOR_ID_SIZE: usize = 4;

/// Number of DIFAT entries embedded directly in the header.
pub const HEADER_DIFAT_ENTRIES: usize = 109;

/// v4 range-lock threshold: sector count at which a `RangeLock` sector is appended.
pub const RANGE_LOCK_SECTOR_THRESHOLD: u64 = 0x7FFFFF;

// Sector sentinels (FAT/DIFAT entries).
/// Maximum regular sector id.
pub const MAXREGSECT: u32 = 0xFFFFFFFA;
/// Sector belongs to a DIFAT chain.
pub const DIFSECT: u32 = 0xFFFFFFFC;
/// Sector belongs to a FAT chain.
pub const FATSECT: u32 = 0xFFFFFFFD;
/// Last sector of a chain.
pub const ENDOFCHAIN: u32 = 0xFFFFFFFE;
/// Unallocated sector.
pub const FREESECT: u32 = 0xFFFFFFFF;

// Directory entry (SID) sentinels.
/// Maximum regular directory entry id.
pub const MAXREGSID: u32 = 0xFFFFFFFA;
/// "No sibling/child" sentinel for directory-entry SID fields.
pub const NOSTREAM: u32 = 0xFFFFFFFF;

// Directory entry object types.
/// Unused directory slot.
pub const STGTY_INVALID: u8 = 0;
/// Storage (directory) entry.
pub const STGTY_STORAGE: u8 = 1;
/// Stream (file) entry.
pub const STGTY_STREAM: u8 = 2;
/// ILockBytes entry (unused by this engine, recognised for round-trip only).
pub const STGTY_LOCKBYTES: u8 = 3;
/// IPropertyStorage entry (unused by this engine, recognised for round-trip only).
pub const STGTY_PROPERTY: u8 = 4;
/// Root storage entry, always SID 0.
pub const STGTY_ROOT: u8 = 5;

// Red-black tree node colours, as stored in the directory entry's colour byte.
/// Red node colour.
pub const DE_RED: u8 = 0;
/// Black node colour.
pub const DE_BLACK: u8 = 1;

/// Maximum directory entry name length, in UTF-16 code units, including the NUL terminator.
pub const MAX_NAME_LENGTH_UTF16: usize = 32;

/// Characters forbidden in a directory entry name.
pub const FORBIDDEN_NAME_CHARS: [char; 4] = ['\\', '/', ':', '!'];

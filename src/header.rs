//! The 512-byte CFB header: signature, version, and locations of the principal chains.

use std::io::{Read, Seek, SeekFrom, Write};

use zerocopy::{FromBytes, Immutable, KnownLayout, U16, U32, LE};

use crate::config::Version;
use crate::consts::{FREESECT, HEADER_DIFAT_ENTRIES, MAGIC};
use crate::error::{CfbError, Result};

const RAW_HEADER_SIZE: usize = 512;

#[derive(FromBytes, KnownLayout, Immutable)]
#[repr(C)]
struct RawHeader {
    signature: [u8; 8],
    clsid: [u8; 16],
    minor_version: U16<LE>,
    major_version: U16<LE>,
    byte_order: U16<LE>,
    sector_shift: U16<LE>,
    mini_sector_shift: U16<LE>,
    reserved: [u8; 6],
    num_dir_sectors: U32<LE>,
    num_fat_sectors: U32<LE>,
    first_dir_sector: U32<LE>,
    transaction_signature: U32<LE>,
    mini_stream_cutoff: U32<LE>,
    first_minifat_sector: U32<LE>,
    num_minifat_sectors: U32<LE>,
    first_difat_sector: U32<LE>,
    num_difat_sectors: U32<LE>,
    difat: [U32<LE>; HEADER_DIFAT_ENTRIES],
}

/// Parsed CFB header, also the in-memory staging area for values that only settle at commit time.
#[derive(Debug, Clone)]
pub struct Header {
    pub version: Version,
    pub minor_version: u16,
    pub num_dir_sectors: u32,
    pub num_fat_sectors: u32,
    pub first_dir_sector: u32,
    pub transaction_signature: u32,
    pub mini_stream_cutoff: u32,
    pub first_minifat_sector: u32,
    pub num_minifat_sectors: u32,
    pub first_difat_sector: u32,
    pub num_difat_sectors: u32,
    /// The 109 DIFAT entries embedded directly in the header.
    pub difat: [u32; HEADER_DIFAT_ENTRIES],
}

impl Header {
    /// A fresh header for a newly created, empty compound file.
    pub fn new(version: Version) -> Header {
        Header {
            version,
            minor_version: 0x003E,
            num_dir_sectors: 0,
            num_fat_sectors: 0,
            first_dir_sector: crate::consts::ENDOFCHAIN,
            transaction_signature: 0,
            mini_stream_cutoff: crate::consts::DEFAULT_MINI_STREAM_CUTOFF,
            first_minifat_sector: crate::consts::ENDOFCHAIN,
            num_minifat_sectors: 0,
            first_difat_sector: crate::consts::ENDOFCHAIN,
            num_difat_sectors: 0,
            difat: [FREESECT; HEADER_DIFAT_ENTRIES],
        }
    }

    /// Reads and validates the 512-byte header at the start of the stream.
    pub fn read<R: Read + Seek>(reader: &mut R) -> Result<Header> {
        reader.seek(SeekFrom::Start(0))?;
        let mut buf = [0u8; RAW_HEADER_SIZE];
        reader.read_exact(&mut buf)?;

        let raw = RawHeader::ref_from_bytes(&buf)
            .map_err(|_| CfbError::FileFormat("truncated header".into()))?;

        if raw.signature != *MAGIC {
            return Err(CfbError::FileFormat("bad magic signature".into()));
        }
        if raw.byte_order.get() != 0xFFFE {
            return Err(CfbError::FileFormat("unsupported byte order".into()));
        }

        let major = raw.major_version.get();
        let version = Version::from_major(major)
            .ok_or_else(|| CfbError::FileFormat(format!("unsupported major version {major}")))?;

        let expected_shift = version.sector_shift();
        if raw.sector_shift.get() != expected_shift {
            return Err(CfbError::FileFormat(format!(
                "sector shift {} does not match version {}",
                raw.sector_shift.get(),
                major
            )));
        }
        if raw.mini_sector_shift.get() != 6 {
            return Err(CfbError::FileFormat("mini sector shift must be 6".into()));
        }

        let mut difat = [FREESECT; HEADER_DIFAT_ENTRIES];
        for (slot, entry) in difat.iter_mut().zip(raw.difat.iter()) {
            *slot = entry.get();
        }

        Ok(Header {
            version,
            minor_version: raw.minor_version.get(),
            num_dir_sectors: raw.num_dir_sectors.get(),
            num_fat_sectors: raw.num_fat_sectors.get(),
            first_dir_sector: raw.first_dir_sector.get(),
            transaction_signature: raw.transaction_signature.get(),
            mini_stream_cutoff: raw.mini_stream_cutoff.get(),
            first_minifat_sector: raw.first_minifat_sector.get(),
            num_minifat_sectors: raw.num_minifat_sectors.get(),
            first_difat_sector: raw.first_difat_sector.get(),
            num_difat_sectors: raw.num_difat_sectors.get(),
            difat,
        })
    }

    /// Serialises the header to its on-disk byte layout, padded to the version's sector size.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.version.sector_size());
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&[0u8; 16]); // reserved CLSID, always zero
        out.extend_from_slice(&self.minor_version.to_le_bytes());
        out.extend_from_slice(&self.version.major().to_le_bytes());
        out.extend_from_slice(&0xFFFEu16.to_le_bytes());
        out.extend_from_slice(&self.version.sector_shift().to_le_bytes());
        out.extend_from_slice(&6u16.to_le_bytes());
        out.extend_from_slice(&[0u8; 6]);

        let num_dir_sectors = if matches!(self.version, Version::V3) {
            0
        } else {
            self.num_dir_sectors
        };
        out.extend_from_slice(&num_dir_sectors.to_le_bytes());
        out.extend_from_slice(&self.num_fat_sectors.to_le_bytes());
        out.extend_from_slice(&self.first_dir_sector.to_le_bytes());
        out.extend_from_slice(&self.transaction_signature.to_le_bytes());
        out.extend_from_slice(&self.mini_stream_cutoff.to_le_bytes());
        out.extend_from_slice(&self.first_minifat_sector.to_le_bytes());
        out.extend_from_slice(&self.num_minifat_sectors.to_le_bytes());
        out.extend_from_slice(&self.first_difat_sector.to_le_bytes());
        out.extend_from_slice(&self.num_difat_sectors.to_le_bytes());
        for entry in &self.difat {
            out.extend_from_slice(&entry.to_le_bytes());
        }

        debug_assert_eq!(out.len(), RAW_HEADER_SIZE);
        if matches!(self.version, Version::V4) {
            out.resize(self.version.sector_size(), 0);
        }
        out
    }

    /// Writes the header at offset 0, zero-padded to this version's sector size.
    pub fn write<W: Write + Seek>(&self, writer: &mut W) -> Result<()> {
        writer.seek(SeekFrom::Start(0))?;
        writer.write_all(&self.to_bytes())?;
        Ok(())
    }

    /// Sector size implied by this header's version.
    pub fn sector_size(&self) -> usize {
        self.version.sector_size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn fresh_header_round_trips_v3() {
        let header = Header::new(Version::V3);
        let mut buf = Cursor::new(vec![0u8; RAW_HEADER_SIZE]);
        header.write(&mut buf).unwrap();
        let read_back = Header::read(&mut buf).unwrap();
        assert_eq!(read_back.version, Version::V3);
        assert_eq!(read_back.first_dir_sector, crate::consts::ENDOFCHAIN);
        assert_eq!(read_back.mini_stream_cutoff, crate::consts::DEFAULT_MINI_STREAM_CUTOFF);
    }

    #[test]
    fn fresh_header_round_trips_v4_padded_to_sector_size() {
        let header = Header::new(Version::V4);
        let bytes = header.to_bytes();
        assert_eq!(bytes.len(), Version::V4.sector_size());

        let mut buf = Cursor::new(bytes);
        let read_back = Header::read(&mut buf).unwrap();
        assert_eq!(read_back.version, Version::V4);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut bytes = Header::new(Version::V3).to_bytes();
        bytes[0] = 0;
        let mut buf = Cursor::new(bytes);
        assert!(Header::read(&mut buf).is_err());
    }

    #[test]
    fn v3_header_always_serialises_zero_dir_sector_count() {
        let mut header = Header::new(Version::V3);
        header.num_dir_sectors = 5;
        let bytes = header.to_bytes();
        let num_dir_sectors = u32::from_le_bytes(bytes[40..44].try_into().unwrap());
        assert_eq!(num_dir_sectors, 0);
    }
}

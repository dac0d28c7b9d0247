//! DIFAT walk and construction: the list of FAT sector ids, partly embedded in the header and
//! partly stored in a chain of DIFAT sectors.

use std::io::{Read, Seek, SeekFrom};

use crate::consts::{ENDOFCHAIN, FREESECT, HEADER_DIFAT_ENTRIES};
use crate::error::{CfbError, Result};
use crate::header::Header;

/// Number of FAT-sector-id slots held by one DIFAT sector (the last 4 bytes are the chain
/// pointer to the next DIFAT sector).
pub fn entries_per_sector(sector_size: usize) -> usize {
    sector_size / 4 - 1
}

/// Collects the full list of FAT sector ids: the header's 109 embedded entries, followed by
/// however many are reachable by walking the DIFAT chain.
pub fn walk_difat<R: Read + Seek>(reader: &mut R, header: &Header) -> Result<Vec<u32>> {
    let mut fat_sector_ids: Vec<u32> = header
        .difat
        .iter()
        .copied()
        .filter(|&id| id != FREESECT)
        .collect();

    if header.first_difat_sector == ENDOFCHAIN || header.num_difat_sectors == 0 {
        return Ok(fat_sector_ids);
    }

    let sector_size = header.sector_size();
    let per_sector = entries_per_sector(sector_size);
    let mut current = header.first_difat_sector;
    let mut visited = std::collections::HashSet::new();

    while current != ENDOFCHAIN && current != FREESECT {
        if !visited.insert(current) {
            return Err(CfbError::Corrupted("cyclic DIFAT chain".into()));
        }
        let offset = sector_size as u64 + current as u64 * sector_size as u64;
        reader.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; sector_size];
        reader.read_exact(&mut buf)?;

        for chunk in buf[..per_sector * 4].chunks_exact(4) {
            let id = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            if id != FREESECT {
                fat_sector_ids.push(id);
            }
        }
        let tail = &buf[per_sector * 4..per_sector * 4 + 4];
        current = u32::from_le_bytes([tail[0], tail[1], tail[2], tail[3]]);
    }

    Ok(fat_sector_ids)
}

/// Builds the byte content of the DIFAT sectors needed to hold `fat_sector_ids` beyond the
/// header's first 109. Each produced buffer is exactly `sector_size` bytes.
pub fn build_difat_sectors(fat_sector_ids: &[u32], sector_size: usize) -> Vec<Vec<u8>> {
    if fat_sector_ids.len() <= HEADER_DIFAT_ENTRIES {
        return Vec::new();
    }
    let overflow = &fat_sector_ids[HEADER_DIFAT_ENTRIES..];
    let per_sector = entries_per_sector(sector_size);
    let num_sectors = overflow.len().div_ceil(per_sector);

    let mut sectors = Vec::with_capacity(num_sectors);
    for chunk_index in 0..num_sectors {
        let start = chunk_index * per_sector;
        let end = (start + per_sector).min(overflow.len());
        let mut buf = vec![0xFFu8; sector_size]; // FREESECT-pad (0xFFFFFFFF repeated)
        for (slot, &id) in overflow[start..end].iter().enumerate() {
            buf[slot * 4..slot * 4 + 4].copy_from_slice(&id.to_le_bytes());
        }
        let next = if chunk_index + 1 < num_sectors { ENDOFCHAIN } else { ENDOFCHAIN };
        let _ = next; // chain-next pointer is patched in by the caller once sector ids are known
        sectors.push(buf);
    }
    sectors
}

/// Patches the chain-next pointer (last 4 bytes) of a generated DIFAT sector buffer.
pub fn set_next_pointer(sector: &mut [u8], next: u32) {
    let len = sector.len();
    sector[len - 4..].copy_from_slice(&next.to_le_bytes());
}

/// Required count of DIFAT sectors for a given number of FAT sectors.
pub fn required_difat_sectors(fat_sector_count: usize, sector_size: usize) -> usize {
    if fat_sector_count <= HEADER_DIFAT_ENTRIES {
        0
    } else {
        (fat_sector_count - HEADER_DIFAT_ENTRIES).div_ceil(entries_per_sector(sector_size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_overflow_sectors_needed_under_threshold() {
        let ids: Vec<u32> = (0..HEADER_DIFAT_ENTRIES as u32).collect();
        assert!(build_difat_sectors(&ids, 512).is_empty());
        assert_eq!(required_difat_sectors(ids.len(), 512), 0);
    }

    #[test]
    fn overflow_builds_expected_sector_count() {
        let ids: Vec<u32> = (0..HEADER_DIFAT_ENTRIES as u32 + 300).collect();
        let sectors = build_difat_sectors(&ids, 512);
        let expected = required_difat_sectors(ids.len(), 512);
        assert_eq!(sectors.len(), expected);
        assert!(sectors.iter().all(|s| s.len() == 512));
    }

    #[test]
    fn set_next_pointer_patches_trailing_four_bytes() {
        let mut sector = vec![0u8; 512];
        set_next_pointer(&mut sector, ENDOFCHAIN);
        assert_eq!(&sector[508..], &ENDOFCHAIN.to_le_bytes());
    }

    #[test]
    fn entries_per_sector_reserves_the_chain_pointer_slot() {
        assert_eq!(entries_per_sector(512), 127);
        assert_eq!(entries_per_sector(4096), 1023);
    }
}

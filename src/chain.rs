//! A sector-id chain table: the shared mechanics behind both the FAT and the Mini-FAT.
//!
//! Both allocators are "an array indexed by sector id, holding either the next id in a chain
//! or a sentinel"; this type implements that once and `fat`/`minifat` instantiate it for their
//! respective addressing spaces.

use std::collections::VecDeque;

use fixedbitset::FixedBitSet;

use crate::consts::{ENDOFCHAIN, FREESECT};
use crate::error::{CfbError, Result};

/// A chain-of-sector-ids table (used for both the FAT and the Mini-FAT).
#[derive(Debug, Clone, Default)]
pub struct SectorChainTable {
    entries: Vec<u32>,
}

impl SectorChainTable {
    pub fn new() -> SectorChainTable {
        SectorChainTable { entries: Vec::new() }
    }

    pub fn from_entries(entries: Vec<u32>) -> SectorChainTable {
        SectorChainTable { entries }
    }

    pub fn entries(&self) -> &[u32] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: u32) -> Option<u32> {
        self.entries.get(id as usize).copied()
    }

    pub fn set(&mut self, id: u32, value: u32) {
        let index = id as usize;
        if index >= self.entries.len() {
            self.entries.resize(index + 1, FREESECT);
        }
        self.entries[index] = value;
    }

    /// Follows a chain from `start` to `ENDOFCHAIN`, returning the visited ids in order.
    /// Detects cycles and out-of-range ids as `Corrupted`.
    pub fn walk_chain(&self, start: u32) -> Result<Vec<u32>> {
        if start == ENDOFCHAIN {
            return Ok(Vec::new());
        }
        let mut visited = FixedBitSet::with_capacity(self.entries.len().max(1));
        let mut out = Vec::new();
        let mut current = start;
        loop {
            let index = current as usize;
            if index >= self.entries.len() {
                return Err(CfbError::Corrupted(format!(
                    "chain references out-of-range sector id {current}"
                )));
            }
            if visited.contains(index) {
                return Err(CfbError::Corrupted(format!(
                    "cyclic chain detected at sector id {current}"
                )));
            }
            visited.insert(index);
            out.push(current);

            let next = self.entries[index];
            if next == ENDOFCHAIN {
                break;
            }
            if next == current {
                return Err(CfbError::Corrupted(format!(
                    "self-referential chain at sector id {current}"
                )));
            }
            current = next;
        }
        Ok(out)
    }

    /// Allocates `count` fresh ids at the tail of the table, linking them forward and
    /// terminating with `ENDOFCHAIN`. Returns the allocated ids in chain order.
    fn append_chain(&mut self, count: usize) -> Vec<u32> {
        if count == 0 {
            return Vec::new();
        }
        let mut ids = Vec::with_capacity(count);
        for _ in 0..count {
            let id = self.entries.len() as u32;
            self.entries.push(ENDOFCHAIN);
            ids.push(id);
        }
        for window in ids.windows(2) {
            self.entries[window[0] as usize] = window[1];
        }
        ids
    }

    /// Allocates a chain of `count` sectors, preferring ids from `recycle` (when
    /// `SectorRecycle` is enabled) before appending brand-new ids. Returns the chain in order.
    pub fn allocate_chain(&mut self, count: usize, recycle: &mut VecDeque<u32>) -> Vec<u32> {
        if count == 0 {
            return Vec::new();
        }
        let mut ids = Vec::with_capacity(count);
        while ids.len() < count {
            match recycle.pop_front() {
                Some(id) => ids.push(id),
                None => break,
            }
        }
        let remaining = count - ids.len();
        if remaining > 0 {
            ids.extend(self.append_chain(remaining));
        } else {
            // Ensure entries vector covers recycled ids and link them forward.
            for &id in &ids {
                if (id as usize) >= self.entries.len() {
                    self.entries.resize(id as usize + 1, FREESECT);
                }
            }
        }
        for window in ids.windows(2) {
            self.entries[window[0] as usize] = window[1];
        }
        if let Some(&last) = ids.last() {
            self.entries[last as usize] = ENDOFCHAIN;
        }
        ids
    }

    /// Reserves `count` contiguous fresh ids, all marked with `marker` (used to reserve FAT
    /// and DIFAT sector ranges ahead of directory/stream data). Returns the first id.
    pub fn allocate_special(&mut self, count: usize, marker: u32) -> u32 {
        let first = self.entries.len() as u32;
        for _ in 0..count {
            self.entries.push(marker);
        }
        first
    }

    /// Frees every id in the chain starting at `start`, marking each `FREESECT`.
    /// Returns the freed ids (for zeroing or recycle-queue insertion by the caller).
    pub fn free_chain(&mut self, start: u32) -> Result<Vec<u32>> {
        let ids = self.walk_chain(start)?;
        for &id in &ids {
            self.entries[id as usize] = FREESECT;
        }
        Ok(ids)
    }

    /// Total sector count this table currently accounts for.
    pub fn total_sectors(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_then_walk_round_trips() {
        let mut table = SectorChainTable::new();
        let ids = table.allocate_chain(4, &mut VecDeque::new());
        assert_eq!(ids.len(), 4);
        assert_eq!(table.walk_chain(ids[0]).unwrap(), ids);
    }

    #[test]
    fn walk_empty_chain_is_empty() {
        let table = SectorChainTable::new();
        assert!(table.walk_chain(ENDOFCHAIN).unwrap().is_empty());
    }

    #[test]
    fn free_chain_marks_freesect() {
        let mut table = SectorChainTable::new();
        let ids = table.allocate_chain(3, &mut VecDeque::new());
        let freed = table.free_chain(ids[0]).unwrap();
        assert_eq!(freed, ids);
        for id in ids {
            assert_eq!(table.get(id), Some(FREESECT));
        }
    }

    #[test]
    fn allocate_recycles_before_appending() {
        let mut table = SectorChainTable::new();
        let first = table.allocate_chain(2, &mut VecDeque::new());
        table.free_chain(first[0]).unwrap();
        let mut recycle: VecDeque<u32> = first.clone().into();

        let reused = table.allocate_chain(2, &mut recycle);
        assert_eq!(reused, first);
        assert!(recycle.is_empty());
    }

    #[test]
    fn cyclic_chain_is_rejected() {
        let mut table = SectorChainTable::new();
        table.set(0, 1);
        table.set(1, 0);
        assert!(table.walk_chain(0).is_err());
    }

    #[test]
    fn out_of_range_id_is_corrupted_error() {
        let table = SectorChainTable::from_entries(vec![5]);
        assert!(table.walk_chain(0).is_err());
    }

    #[test]
    fn allocate_special_reserves_contiguous_marked_range() {
        let mut table = SectorChainTable::new();
        let first = table.allocate_special(3, crate::consts::FATSECT);
        for offset in 0..3 {
            assert_eq!(table.get(first + offset), Some(crate::consts::FATSECT));
        }
    }
}

//! The `CompoundFile` engine: load, navigate, mutate, commit, save, and shrink a CFB file.

use std::collections::VecDeque;
use std::io::{Read, Seek, SeekFrom, Write};

use crate::chain::SectorChainTable;
use crate::config::{CfbConfiguration, UpdateMode, Version};
use crate::consts::{
    DIRENTRY_SIZE, ENDOFCHAIN, FREESECT, MINI_SECTOR_SIZE, NOSTREAM,
};
use crate::difat;
use crate::directory::{DirectoryEntry, EntryType};
use crate::error::{CfbError, Result};
use crate::header::Header;
use crate::rbtree;
use crate::sector::{PushOutcome, Sector, SectorCollection, SectorKind};
use crate::stream::StreamView;

/// The compound file engine. `F` is the backing stream; it must support `Read + Write + Seek`
/// even for engines opened `ReadOnly` -- §5 expresses the read/write contract through the
/// `UpdateMode` value, not through the type parameter, matching the single-process model this
/// crate targets (no concurrent multi-writer access, see spec Non-goals).
pub struct CompoundFile<F> {
    inner: Option<F>,
    version: Version,
    update_mode: UpdateMode,
    config: CfbConfiguration,
    header: Header,
    sectors: SectorCollection,
    fat: SectorChainTable,
    minifat: SectorChainTable,
    directories: Vec<DirectoryEntry>,
    /// Cached bytes of the root entry's regular chain, which backs the mini-stream.
    ministream: Vec<u8>,
    recycle_queue: VecDeque<u32>,
    transaction_lock_added: bool,
    transaction_lock_allocated: bool,
    /// Sector id of the appended `RangeLock` sector, once one has been pushed.
    range_lock_sid: Option<u32>,
    disposed: bool,
}

const ROOT_SID: u32 = 0;

impl<F: Read + Write + Seek> CompoundFile<F> {
    /// Creates a new, empty compound file with no backing stream yet. Use [`save`](Self::save)
    /// to materialise it the first time.
    pub fn new(version: Version, config: CfbConfiguration) -> CompoundFile<F> {
        CompoundFile {
            inner: None,
            version,
            update_mode: UpdateMode::Update,
            config,
            header: Header::new(version),
            sectors: SectorCollection::new(),
            fat: SectorChainTable::new(),
            minifat: SectorChainTable::new(),
            directories: vec![DirectoryEntry::root()],
            ministream: Vec::new(),
            recycle_queue: VecDeque::new(),
            transaction_lock_added: false,
            transaction_lock_allocated: false,
            range_lock_sid: None,
            disposed: false,
        }
    }

    /// Opens an existing compound file for reading, and optionally mutation.
    pub fn open(mut inner: F, update_mode: UpdateMode, config: CfbConfiguration) -> Result<CompoundFile<F>> {
        let header = Header::read(&mut inner)?;
        let version = header.version;

        let mut cf = CompoundFile {
            inner: Some(inner),
            version,
            update_mode,
            config,
            header,
            sectors: SectorCollection::new(),
            fat: SectorChainTable::new(),
            minifat: SectorChainTable::new(),
            directories: Vec::new(),
            ministream: Vec::new(),
            recycle_queue: VecDeque::new(),
            transaction_lock_added: false,
            transaction_lock_allocated: false,
            range_lock_sid: None,
            disposed: false,
        };

        cf.load_fat()?;
        cf.load_minifat()?;
        cf.load_directory()?;
        Ok(cf)
    }

    fn sector_size(&self) -> usize {
        self.header.sector_size()
    }

    fn ensure_not_disposed(&self) -> Result<()> {
        if self.disposed {
            Err(CfbError::Disposed)
        } else {
            Ok(())
        }
    }

    // ---- loading -----------------------------------------------------------------------

    fn load_fat(&mut self) -> Result<()> {
        let fat_sector_ids = {
            let inner = self.inner.as_mut().expect("open() always sets inner");
            difat::walk_difat(inner, &self.header)?
        };
        if fat_sector_ids.len() != self.header.num_fat_sectors as usize
            && !self.config.contains(CfbConfiguration::NO_VALIDATION_EXCEPTION)
        {
            return Err(CfbError::Corrupted(format!(
                "DIFAT walk produced {} FAT sectors, header declares {}",
                fat_sector_ids.len(),
                self.header.num_fat_sectors
            )));
        }

        let sector_size = self.sector_size();
        let entries_per_sector = sector_size / 4;
        let mut entries = Vec::with_capacity(fat_sector_ids.len() * entries_per_sector);
        for &sector_id in &fat_sector_ids {
            let bytes = self.read_raw_sector(sector_id)?;
            for chunk in bytes.chunks_exact(4) {
                entries.push(u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
            }
        }
        self.fat = SectorChainTable::from_entries(entries);
        for id in 0..self.fat.total_sectors() as u32 {
            self.sectors.set(id, Sector::new(id, SectorKind::Normal));
        }
        Ok(())
    }

    fn load_minifat(&mut self) -> Result<()> {
        if self.header.first_minifat_sector == ENDOFCHAIN || self.header.num_minifat_sectors == 0 {
            self.minifat = SectorChainTable::new();
            return Ok(());
        }
        let chain = self.fat.walk_chain(self.header.first_minifat_sector)?;
        let mut entries = Vec::new();
        for &sector_id in &chain {
            let bytes = self.read_raw_sector(sector_id)?;
            for chunk in bytes.chunks_exact(4) {
                entries.push(u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
            }
        }
        self.minifat = SectorChainTable::from_entries(entries);
        Ok(())
    }

    fn load_directory(&mut self) -> Result<()> {
        let chain = self.fat.walk_chain(self.header.first_dir_sector)?;
        let sector_size = self.sector_size();
        let per_sector = sector_size / DIRENTRY_SIZE;
        let mut entries = Vec::with_capacity(chain.len() * per_sector);
        for &sector_id in &chain {
            let bytes = self.read_raw_sector(sector_id)?.to_vec();
            for record in bytes.chunks_exact(DIRENTRY_SIZE) {
                match DirectoryEntry::from_bytes(record) {
                    Ok(entry) => entries.push(entry),
                    Err(e) if self.config.contains(CfbConfiguration::NO_VALIDATION_EXCEPTION) => {
                        entries.push(DirectoryEntry::invalid(entries.len() as u32));
                        let _ = e;
                    }
                    Err(e) => return Err(e),
                }
            }
        }
        if entries.is_empty() {
            entries.push(DirectoryEntry::root());
        }
        self.directories = entries;

        let root = &self.directories[ROOT_SID as usize];
        if root.start_sector != ENDOFCHAIN && root.size > 0 {
            self.ministream = self.read_normal_chain(root.start_sector, root.size)?;
        }
        Ok(())
    }

    fn read_raw_sector(&mut self, id: u32) -> Result<Vec<u8>> {
        if let Some(sector) = self.sectors.get(id) {
            if let Some(data) = &sector.data {
                return Ok(data.clone());
            }
        }
        let sector_size = self.sector_size();
        let mut buf = vec![0u8; sector_size];
        if let Some(inner) = self.inner.as_mut() {
            let offset = sector_size as u64 + id as u64 * sector_size as u64;
            inner.seek(SeekFrom::Start(offset))?;
            inner.read_exact(&mut buf)?;
        }
        self.sectors.set(id, Sector::with_data(id, SectorKind::Normal, buf.clone(), false));
        Ok(buf)
    }

    fn read_normal_chain(&mut self, start: u32, len: u64) -> Result<Vec<u8>> {
        let chain = self.fat.walk_chain(start)?;
        let sector_size = self.sector_size();
        let mut out = Vec::with_capacity(len as usize);
        for &sector_id in &chain {
            if out.len() as u64 >= len {
                break;
            }
            let bytes = self.read_raw_sector(sector_id)?;
            let take = ((len - out.len() as u64) as usize).min(sector_size);
            out.extend_from_slice(&bytes[..take]);
        }
        out.truncate(len as usize);
        Ok(out)
    }

    // ---- navigation ---------------------------------------------------------------------

    pub fn root_sid(&self) -> u32 {
        ROOT_SID
    }

    pub fn entry(&self, sid: u32) -> Result<&DirectoryEntry> {
        self.directories
            .get(sid as usize)
            .filter(|e| !e.is_invalid())
            .ok_or_else(|| CfbError::ItemNotFound(format!("sid {sid}")))
    }

    /// In-order SIDs of `parent_sid`'s direct children.
    pub fn children(&self, parent_sid: u32) -> Result<Vec<u32>> {
        let parent = self.entry(parent_sid)?;
        if !parent.is_storage_like() {
            return Err(CfbError::InvalidOperation(format!("sid {parent_sid} is not a storage")));
        }
        Ok(rbtree::iter_inorder(&self.directories, parent.sid_child))
    }

    pub fn find_child(&self, parent_sid: u32, name: &str) -> Result<Option<u32>> {
        let parent = self.entry(parent_sid)?;
        Ok(rbtree::find(&self.directories, parent.sid_child, name))
    }

    /// Resolves a `/`-free path of storage names ending in a final entry name.
    pub fn find_path(&self, path: &[&str]) -> Result<u32> {
        let mut current = ROOT_SID;
        for segment in path {
            current = self
                .find_child(current, segment)?
                .ok_or_else(|| CfbError::ItemNotFound(segment.to_string()))?;
        }
        Ok(current)
    }

    /// All SIDs (anywhere in the flat directory list) whose name equals `name`.
    pub fn find_all_named(&self, name: &str) -> Vec<u32> {
        self.directories
            .iter()
            .enumerate()
            .filter(|(_, e)| !e.is_invalid() && e.name == name)
            .map(|(sid, _)| sid as u32)
            .collect()
    }

    pub fn num_directories(&self) -> usize {
        self.directories.iter().filter(|e| !e.is_invalid()).count()
    }

    pub fn clsid_by_sid(&self, sid: u32) -> Result<[u8; 16]> {
        Ok(self.entry(sid)?.clsid)
    }

    // ---- mutation -------------------------------------------------------------------------

    fn allocate_dir_slot(&mut self, entry: DirectoryEntry) -> u32 {
        if let Some(pos) = self.directories.iter().position(|e| e.is_invalid()) {
            self.directories[pos] = entry;
            pos as u32
        } else {
            self.directories.push(entry);
            (self.directories.len() - 1) as u32
        }
    }

    pub fn add_storage(&mut self, parent_sid: u32, name: &str) -> Result<u32> {
        self.ensure_not_disposed()?;
        let entry = DirectoryEntry::new(name, EntryType::Storage)?;
        let new_sid = self.allocate_dir_slot(entry);
        self.link_into_parent(parent_sid, new_sid)?;
        Ok(new_sid)
    }

    pub fn add_stream(&mut self, parent_sid: u32, name: &str, data: &[u8]) -> Result<u32> {
        self.ensure_not_disposed()?;
        let entry = DirectoryEntry::new(name, EntryType::Stream)?;
        let new_sid = self.allocate_dir_slot(entry);
        if let Err(e) = self.link_into_parent(parent_sid, new_sid) {
            self.directories[new_sid as usize] = DirectoryEntry::invalid(new_sid);
            return Err(e);
        }
        self.set_stream_length(new_sid, data.len() as u64)?;
        self.write_stream(new_sid, 0, data)?;
        Ok(new_sid)
    }

    fn link_into_parent(&mut self, parent_sid: u32, new_sid: u32) -> Result<()> {
        let parent = self.entry(parent_sid)?;
        if !parent.is_storage_like() {
            return Err(CfbError::InvalidOperation(format!("sid {parent_sid} is not a storage")));
        }
        let old_root = parent.sid_child;
        let new_root = rbtree::insert(&mut self.directories, old_root, new_sid)?;
        self.directories[parent_sid as usize].sid_child = new_root;
        Ok(())
    }

    /// Deletes the named child of `parent_sid`. Storages are deleted recursively.
    pub fn delete(&mut self, parent_sid: u32, name: &str) -> Result<()> {
        self.ensure_not_disposed()?;
        let target = self
            .find_child(parent_sid, name)?
            .ok_or_else(|| CfbError::ItemNotFound(name.to_string()))?;
        self.delete_subtree(target)?;

        let parent = self.entry(parent_sid)?;
        let outcome = rbtree::delete(&mut self.directories, parent.sid_child, target)?;
        self.directories[parent_sid as usize].sid_child = outcome.new_root;
        self.directories[outcome.unlinked_sid as usize] = DirectoryEntry::invalid(outcome.unlinked_sid);
        Ok(())
    }

    /// Frees the stream data (or recursively deletes children) owned by `sid`, but leaves its
    /// tree-structural fields untouched -- callers remove it from the tree separately.
    fn delete_subtree(&mut self, sid: u32) -> Result<()> {
        let entry = self.entry(sid)?.clone();
        match entry.entry_type {
            EntryType::Stream => {
                self.free_stream_chain(sid)?;
            }
            EntryType::Storage => {
                let children = rbtree::iter_inorder(&self.directories, entry.sid_child);
                for child in children {
                    self.delete_subtree(child)?;
                    self.directories[child as usize] = DirectoryEntry::invalid(child);
                }
            }
            EntryType::Root | EntryType::Invalid => {}
        }
        Ok(())
    }

    pub fn set_clsid(&mut self, sid: u32, clsid: [u8; 16]) -> Result<()> {
        self.ensure_not_disposed()?;
        let entry = self
            .directories
            .get_mut(sid as usize)
            .filter(|e| !e.is_invalid())
            .ok_or_else(|| CfbError::ItemNotFound(format!("sid {sid}")))?;
        entry.clsid = clsid;
        Ok(())
    }

    fn stream_is_mini(&self, size: u64) -> bool {
        size < self.header.mini_stream_cutoff as u64
    }

    pub fn read_stream(&mut self, sid: u32, offset: u64, buf: &mut [u8]) -> Result<usize> {
        self.ensure_not_disposed()?;
        let entry = self.entry(sid)?.clone();
        if sid != ROOT_SID && entry.entry_type != EntryType::Stream {
            return Err(CfbError::InvalidOperation("not a stream".into()));
        }
        if offset >= entry.size {
            return Ok(0);
        }
        let to_read = (buf.len() as u64).min(entry.size - offset) as usize;
        if to_read == 0 {
            return Ok(0);
        }

        if sid != ROOT_SID && self.stream_is_mini(entry.size) {
            let chain = self.minifat.walk_chain(entry.start_sector)?;
            let view = StreamView::new(MINI_SECTOR_SIZE);
            let mut written = 0usize;
            for run in view.ranges(offset, to_read) {
                let mini_id = *chain.get(run.chain_index).ok_or_else(|| {
                    CfbError::Corrupted("mini chain shorter than stream size".into())
                })? as usize;
                let byte_off = mini_id * MINI_SECTOR_SIZE + run.sector_offset;
                let src = &self.ministream[byte_off..byte_off + run.len];
                buf[written..written + run.len].copy_from_slice(src);
                written += run.len;
            }
            Ok(written)
        } else {
            let chain = self.fat.walk_chain(entry.start_sector)?;
            let sector_size = self.sector_size();
            let view = StreamView::new(sector_size);
            let mut written = 0usize;
            for run in view.ranges(offset, to_read) {
                let sector_id = *chain
                    .get(run.chain_index)
                    .ok_or_else(|| CfbError::Corrupted("chain shorter than stream size".into()))?;
                let bytes = self.read_raw_sector(sector_id)?;
                buf[written..written + run.len]
                    .copy_from_slice(&bytes[run.sector_offset..run.sector_offset + run.len]);
                written += run.len;
            }
            Ok(written)
        }
    }

    pub fn write_stream(&mut self, sid: u32, offset: u64, data: &[u8]) -> Result<()> {
        self.ensure_not_disposed()?;
        if self.update_mode == UpdateMode::ReadOnly {
            return Err(CfbError::InvalidOperation("write on a ReadOnly compound file".into()));
        }
        let required = offset + data.len() as u64;
        let entry = self.entry(sid)?.clone();
        if sid != ROOT_SID && entry.entry_type != EntryType::Stream {
            return Err(CfbError::InvalidOperation("not a stream".into()));
        }
        if required > entry.size {
            self.set_stream_length(sid, required)?;
        }
        let entry = self.entry(sid)?.clone();

        if sid != ROOT_SID && self.stream_is_mini(entry.size) {
            let chain = self.minifat.walk_chain(entry.start_sector)?;
            let view = StreamView::new(MINI_SECTOR_SIZE);
            let mut consumed = 0usize;
            for run in view.ranges(offset, data.len()) {
                let mini_id = chain[run.chain_index] as usize;
                let byte_off = mini_id * MINI_SECTOR_SIZE + run.sector_offset;
                self.ministream[byte_off..byte_off + run.len]
                    .copy_from_slice(&data[consumed..consumed + run.len]);
                consumed += run.len;
            }
            self.persist_mini_stream_to_stream()?;
        } else {
            let chain = self.fat.walk_chain(entry.start_sector)?;
            let sector_size = self.sector_size();
            let view = StreamView::new(sector_size);
            let mut consumed = 0usize;
            for run in view.ranges(offset, data.len()) {
                let sector_id = chain[run.chain_index];
                let mut bytes = self.read_raw_sector(sector_id)?;
                bytes[run.sector_offset..run.sector_offset + run.len]
                    .copy_from_slice(&data[consumed..consumed + run.len]);
                self.sectors.set(sector_id, Sector::with_data(sector_id, SectorKind::Normal, bytes, true));
                consumed += run.len;
            }
        }
        Ok(())
    }

    /// Resizes the stream owned by `sid`, performing a mini<->normal transition copy when the
    /// new length crosses the mini-stream cutoff.
    pub fn set_stream_length(&mut self, sid: u32, new_len: u64) -> Result<()> {
        self.ensure_not_disposed()?;
        let entry = self.entry(sid)?.clone();
        let old_is_mini = sid != ROOT_SID && self.stream_is_mini(entry.size);
        let new_is_mini = sid != ROOT_SID && self.stream_is_mini(new_len);

        if old_is_mini != new_is_mini {
            self.transition_stream(sid, new_len, new_is_mini)?;
            return Ok(());
        }

        if new_is_mini {
            self.resize_mini_chain(sid, new_len)?;
        } else {
            self.resize_normal_chain(sid, new_len)?;
        }
        Ok(())
    }

    fn transition_stream(&mut self, sid: u32, new_len: u64, to_mini: bool) -> Result<()> {
        let entry = self.entry(sid)?.clone();
        let old_len = entry.size;
        let copy_len = old_len.min(new_len);

        const MINI_TO_NORMAL_STAGE: usize = 256;
        const NORMAL_TO_MINI_STAGE: usize = 4096;
        let stage_size = if to_mini { NORMAL_TO_MINI_STAGE } else { MINI_TO_NORMAL_STAGE };

        let mut staged = Vec::with_capacity(copy_len as usize);
        let mut pos = 0u64;
        let mut buf = vec![0u8; stage_size];
        while pos < copy_len {
            let want = (stage_size as u64).min(copy_len - pos) as usize;
            let n = self.read_stream(sid, pos, &mut buf[..want])?;
            staged.extend_from_slice(&buf[..n]);
            pos += n as u64;
            if n == 0 {
                break;
            }
        }

        self.free_stream_chain(sid)?;
        {
            let e = &mut self.directories[sid as usize];
            e.start_sector = ENDOFCHAIN;
            e.size = 0;
        }

        if to_mini {
            self.resize_mini_chain(sid, new_len)?;
        } else {
            self.resize_normal_chain(sid, new_len)?;
        }
        if !staged.is_empty() {
            self.write_stream(sid, 0, &staged)?;
        }
        Ok(())
    }

    fn free_stream_chain(&mut self, sid: u32) -> Result<()> {
        let entry = self.entry(sid)?.clone();
        if entry.start_sector == ENDOFCHAIN || entry.size == 0 {
            return Ok(());
        }
        if sid != ROOT_SID && self.stream_is_mini(entry.size) {
            let freed = self.minifat.free_chain(entry.start_sector)?;
            if self.config.contains(CfbConfiguration::ERASE_FREE_SECTORS) {
                for id in freed {
                    let off = id as usize * MINI_SECTOR_SIZE;
                    self.ministream[off..off + MINI_SECTOR_SIZE].fill(0);
                }
                self.persist_mini_stream_to_stream()?;
            }
        } else {
            let freed = self.fat.free_chain(entry.start_sector)?;
            let erase = self.config.contains(CfbConfiguration::ERASE_FREE_SECTORS);
            let recycle = self.config.contains(CfbConfiguration::SECTOR_RECYCLE);
            let sector_size = self.sector_size();
            for id in freed {
                if erase {
                    self.sectors.set(id, Sector::with_data(id, SectorKind::Normal, vec![0u8; sector_size], true));
                }
                if recycle {
                    self.recycle_queue.push_back(id);
                }
            }
        }
        Ok(())
    }

    fn resize_normal_chain(&mut self, sid: u32, new_len: u64) -> Result<()> {
        let sector_size = self.sector_size();
        let entry = self.entry(sid)?.clone();
        let old_count = self.fat.walk_chain(entry.start_sector).map(|c| c.len()).unwrap_or(0);
        let new_count = new_len.div_ceil(sector_size as u64) as usize;

        let new_start = if new_count == 0 {
            self.free_stream_chain(sid)?;
            ENDOFCHAIN
        } else if old_count == 0 {
            let recycle_enabled = self.config.contains(CfbConfiguration::SECTOR_RECYCLE);
            let ids = if recycle_enabled {
                let mut q = std::mem::take(&mut self.recycle_queue);
                let ids = self.fat.allocate_chain(new_count, &mut q);
                self.recycle_queue = q;
                ids
            } else {
                self.fat.allocate_chain(new_count, &mut VecDeque::new())
            };
            for &id in &ids {
                let outcome = self.sectors.set(id, Sector::with_data(id, SectorKind::Normal, vec![0u8; sector_size], true));
                self.handle_sector_push_outcome(outcome);
            }
            ids[0]
        } else if new_count > old_count {
            let extra = new_count - old_count;
            let recycle_enabled = self.config.contains(CfbConfiguration::SECTOR_RECYCLE);
            let new_ids = if recycle_enabled {
                let mut q = std::mem::take(&mut self.recycle_queue);
                let ids = self.fat.allocate_chain(extra, &mut q);
                self.recycle_queue = q;
                ids
            } else {
                self.fat.allocate_chain(extra, &mut VecDeque::new())
            };
            for &id in &new_ids {
                let outcome = self.sectors.set(id, Sector::with_data(id, SectorKind::Normal, vec![0u8; sector_size], true));
                self.handle_sector_push_outcome(outcome);
            }
            let chain = self.fat.walk_chain(entry.start_sector)?;
            let last = *chain.last().unwrap();
            self.fat_link(last, new_ids[0]);
            entry.start_sector
        } else if new_count < old_count {
            let chain = self.fat.walk_chain(entry.start_sector)?;
            let keep = if new_count == 0 { ENDOFCHAIN } else { chain[new_count - 1] };
            let tail_start = chain[new_count];
            if new_count > 0 {
                self.fat_link(keep, ENDOFCHAIN);
            }
            let freed = self.fat.free_chain(tail_start)?;
            let erase = self.config.contains(CfbConfiguration::ERASE_FREE_SECTORS);
            let recycle = self.config.contains(CfbConfiguration::SECTOR_RECYCLE);
            for id in freed {
                if erase {
                    self.sectors.set(id, Sector::with_data(id, SectorKind::Normal, vec![0u8; sector_size], true));
                }
                if recycle {
                    self.recycle_queue.push_back(id);
                }
            }
            entry.start_sector
        } else {
            entry.start_sector
        };

        let e = &mut self.directories[sid as usize];
        e.start_sector = new_start;
        e.size = new_len;
        Ok(())
    }

    fn fat_link(&mut self, from: u32, to: u32) {
        self.fat.set(from, to);
    }

    fn resize_mini_chain(&mut self, sid: u32, new_len: u64) -> Result<()> {
        let entry = self.entry(sid)?.clone();
        let old_count = self.minifat.walk_chain(entry.start_sector).map(|c| c.len()).unwrap_or(0);
        let new_count = new_len.div_ceil(MINI_SECTOR_SIZE as u64) as usize;

        let new_start = if new_count == 0 {
            if entry.start_sector != ENDOFCHAIN {
                self.minifat.free_chain(entry.start_sector)?;
            }
            ENDOFCHAIN
        } else if old_count == 0 {
            let ids = self.minifat.allocate_chain(new_count, &mut VecDeque::new());
            self.grow_ministream_for(&ids);
            ids[0]
        } else if new_count > old_count {
            let extra = new_count - old_count;
            let new_ids = self.minifat.allocate_chain(extra, &mut VecDeque::new());
            self.grow_ministream_for(&new_ids);
            let chain = self.minifat.walk_chain(entry.start_sector)?;
            let last = *chain.last().unwrap();
            self.minifat.set(last, new_ids[0]);
            entry.start_sector
        } else if new_count < old_count {
            let chain = self.minifat.walk_chain(entry.start_sector)?;
            if new_count > 0 {
                self.minifat.set(chain[new_count - 1], ENDOFCHAIN);
            }
            let tail_start = chain[new_count];
            let freed = self.minifat.free_chain(tail_start)?;
            if self.config.contains(CfbConfiguration::ERASE_FREE_SECTORS) {
                for id in freed {
                    let off = id as usize * MINI_SECTOR_SIZE;
                    if off + MINI_SECTOR_SIZE <= self.ministream.len() {
                        self.ministream[off..off + MINI_SECTOR_SIZE].fill(0);
                    }
                }
            }
            if new_count == 0 { ENDOFCHAIN } else { entry.start_sector }
        } else {
            entry.start_sector
        };

        let e = &mut self.directories[sid as usize];
        e.start_sector = new_start;
        e.size = new_len;
        self.persist_mini_stream_to_stream()
    }

    fn grow_ministream_for(&mut self, mini_ids: &[u32]) {
        if let Some(&max_id) = mini_ids.iter().max() {
            let needed = (max_id as usize + 1) * MINI_SECTOR_SIZE;
            if self.ministream.len() < needed {
                self.ministream.resize(needed, 0);
            }
        }
    }

    /// Copies the in-memory mini-stream buffer into the root entry's regular sector chain.
    fn persist_mini_stream_to_stream(&mut self) -> Result<()> {
        let needed_len = self.ministream.len() as u64;
        self.resize_normal_chain(ROOT_SID, needed_len)?;
        let root = self.directories[ROOT_SID as usize].clone();
        let ministream = self.ministream.clone();
        if !ministream.is_empty() {
            let chain = self.fat.walk_chain(root.start_sector)?;
            let sector_size = self.sector_size();
            let view = StreamView::new(sector_size);
            let mut consumed = 0usize;
            for run in view.ranges(0, ministream.len()) {
                let sector_id = chain[run.chain_index];
                let mut bytes = self.read_raw_sector(sector_id)?;
                bytes[run.sector_offset..run.sector_offset + run.len]
                    .copy_from_slice(&ministream[consumed..consumed + run.len]);
                self.sectors.set(sector_id, Sector::with_data(sector_id, SectorKind::Normal, bytes, true));
                consumed += run.len;
            }
        }
        Ok(())
    }

    /// Reacts to a sector push crossing the v4 range-lock threshold by appending an actual
    /// `RangeLock` sector, so `commit`/`save` have a real sector to serialize and mark
    /// `ENDOFCHAIN` in the FAT.
    fn handle_sector_push_outcome(&mut self, outcome: PushOutcome) {
        if outcome != PushOutcome::CrossedRangeLockThreshold {
            return;
        }
        if !matches!(self.version, Version::V4) || self.range_lock_sid.is_some() {
            return;
        }
        let lock_id = self.sectors.len() as u32;
        self.sectors.push(Some(Sector::new(lock_id, SectorKind::RangeLock)));
        self.range_lock_sid = Some(lock_id);
        self.transaction_lock_added = true;
    }

    /// Best-effort raw bytes of a stream, without regard to logical offsets (used by
    /// diagnostics/property tests rather than normal stream I/O).
    pub fn raw_data(&mut self, sid: u32) -> Result<Vec<u8>> {
        let entry = self.entry(sid)?.clone();
        let mut buf = vec![0u8; entry.size as usize];
        self.read_stream(sid, 0, &mut buf)?;
        Ok(buf)
    }

    // ---- commit / save / shrink ------------------------------------------------------------

    /// Rebuilds the directory sector chain and the FAT/DIFAT/MiniFAT bookkeeping in memory,
    /// ready to be flushed by `commit` or written wholesale by `save`.
    fn rebuild_allocation_tables(&mut self) -> Result<()> {
        // Mini-FAT and directory sectors are always rewritten wholesale on every commit;
        // existing FAT chains for stream data are left untouched (commit only flushes dirty
        // sectors). `commit_minifat`/`commit_directory` recompute the header fields that
        // describe those two chains from scratch.
        self.persist_mini_stream_to_stream()
    }

    fn commit_directory(&mut self) -> Result<()> {
        let sector_size = self.sector_size();
        let per_sector = sector_size / DIRENTRY_SIZE;
        let total_records = self.directories.len().div_ceil(per_sector) * per_sector;

        let mut payload = Vec::with_capacity(total_records * DIRENTRY_SIZE);
        for entry in &self.directories {
            payload.extend_from_slice(&entry.to_bytes());
        }
        while payload.len() < total_records * DIRENTRY_SIZE {
            payload.extend_from_slice(&DirectoryEntry::invalid(0).to_bytes());
        }

        let old_start = self.header.first_dir_sector;
        if old_start != ENDOFCHAIN {
            self.fat.free_chain(old_start)?;
        }
        let num_sectors = payload.len() / sector_size;
        let ids = self.fat.allocate_chain(num_sectors, &mut VecDeque::new());
        for (chunk_index, &id) in ids.iter().enumerate() {
            let bytes = payload[chunk_index * sector_size..(chunk_index + 1) * sector_size].to_vec();
            self.sectors.set(id, Sector::with_data(id, SectorKind::Directory, bytes, true));
        }
        self.header.first_dir_sector = ids.first().copied().unwrap_or(ENDOFCHAIN);
        self.header.num_dir_sectors = ids.len() as u32;
        Ok(())
    }

    fn commit_minifat(&mut self) -> Result<()> {
        if self.minifat.is_empty() {
            self.header.first_minifat_sector = ENDOFCHAIN;
            self.header.num_minifat_sectors = 0;
            return Ok(());
        }
        let sector_size = self.sector_size();
        let mut payload = Vec::with_capacity(self.minifat.total_sectors() * 4);
        for &entry in self.minifat.entries() {
            payload.extend_from_slice(&entry.to_le_bytes());
        }
        while payload.len() % sector_size != 0 {
            payload.extend_from_slice(&FREESECT.to_le_bytes());
        }
        let num_sectors = payload.len() / sector_size;

        if self.header.first_minifat_sector != ENDOFCHAIN {
            self.fat.free_chain(self.header.first_minifat_sector)?;
        }
        let ids = self.fat.allocate_chain(num_sectors, &mut VecDeque::new());
        for (i, &id) in ids.iter().enumerate() {
            let bytes = payload[i * sector_size..(i + 1) * sector_size].to_vec();
            self.sectors.set(id, Sector::with_data(id, SectorKind::MiniFat, bytes, true));
        }
        self.header.first_minifat_sector = ids.first().copied().unwrap_or(ENDOFCHAIN);
        self.header.num_minifat_sectors = ids.len() as u32;
        Ok(())
    }

    /// Iterates to a fixed point: growing the FAT to cover every sector (including the FAT's
    /// own sectors and the DIFAT sectors it may require) per spec §4.7.
    fn commit_fat_and_difat(&mut self) -> Result<()> {
        let sector_size = self.sector_size();
        loop {
            let total_sectors = self.fat.total_sectors();
            let entries_per_fat_sector = sector_size / 4;
            let needed_fat_sectors = total_sectors.div_ceil(entries_per_fat_sector).max(1);
            if needed_fat_sectors as u32 <= self.header.num_fat_sectors
                && self.fat.total_sectors() <= self.header.num_fat_sectors as usize * entries_per_fat_sector
            {
                break;
            }
            let grow_by = needed_fat_sectors.saturating_sub(self.header.num_fat_sectors as usize);
            if grow_by == 0 {
                break;
            }
            self.fat.allocate_special(grow_by, crate::consts::FATSECT);
            self.header.num_fat_sectors += grow_by as u32;
        }

        let total_fat_sectors = self.header.num_fat_sectors as usize;
        let num_difat_sectors = difat::required_difat_sectors(total_fat_sectors, sector_size);
        self.header.num_difat_sectors = num_difat_sectors as u32;

        // Collect FAT sector ids: they are exactly the ids marked FATSECT, in ascending order.
        let fat_sector_ids: Vec<u32> = self
            .fat
            .entries()
            .iter()
            .enumerate()
            .filter(|(_, &v)| v == crate::consts::FATSECT)
            .map(|(id, _)| id as u32)
            .collect();

        let mut difat_header = [FREESECT; crate::consts::HEADER_DIFAT_ENTRIES];
        for (slot, &id) in fat_sector_ids.iter().take(crate::consts::HEADER_DIFAT_ENTRIES).enumerate() {
            difat_header[slot] = id;
        }
        self.header.difat = difat_header;

        if num_difat_sectors > 0 {
            let mut sectors = difat::build_difat_sectors(&fat_sector_ids, sector_size);
            let difat_ids = self.fat.allocate_special(num_difat_sectors, crate::consts::DIFSECT);
            for (i, sector) in sectors.iter_mut().enumerate() {
                let next = if i + 1 < sectors.len() { difat_ids + i as u32 + 1 } else { ENDOFCHAIN };
                difat::set_next_pointer(sector, next);
            }
            for (i, bytes) in sectors.into_iter().enumerate() {
                let id = difat_ids + i as u32;
                self.sectors.set(id, Sector::with_data(id, SectorKind::Difat, bytes, true));
            }
            self.header.first_difat_sector = difat_ids;
        } else {
            self.header.first_difat_sector = ENDOFCHAIN;
        }

        // Now write out the FAT sectors themselves (content reflects all prior allocations).
        let entries_per_fat_sector = sector_size / 4;
        let mut fat_payload = Vec::with_capacity(self.fat.total_sectors() * 4);
        for &entry in self.fat.entries() {
            fat_payload.extend_from_slice(&entry.to_le_bytes());
        }
        while fat_payload.len() < self.header.num_fat_sectors as usize * entries_per_fat_sector * 4 {
            fat_payload.extend_from_slice(&FREESECT.to_le_bytes());
        }
        for (i, &id) in fat_sector_ids.iter().enumerate() {
            let bytes = fat_payload[i * sector_size..(i + 1) * sector_size].to_vec();
            self.sectors.set(id, Sector::with_data(id, SectorKind::Fat, bytes, true));
        }
        Ok(())
    }

    /// Flushes dirty sectors in place, rewrites the directory and header, and truncates the
    /// file to its new length. Only valid in `Update` mode on an already-open file.
    pub fn commit(&mut self, release_memory: bool) -> Result<()> {
        self.ensure_not_disposed()?;
        if self.update_mode == UpdateMode::ReadOnly {
            return Err(CfbError::InvalidOperation("commit on a ReadOnly compound file".into()));
        }
        if self.inner.is_none() {
            return Err(CfbError::InvalidOperation("commit requires a previously opened backing stream; use save() first".into()));
        }

        self.rebuild_allocation_tables()?;
        self.commit_directory()?;
        self.commit_minifat()?;
        self.commit_fat_and_difat()?;

        if self.transaction_lock_added && !self.transaction_lock_allocated {
            let lock_id = self.range_lock_sid.unwrap_or(crate::consts::RANGE_LOCK_SECTOR_THRESHOLD as u32);
            self.fat.set(lock_id, ENDOFCHAIN);
            self.transaction_lock_allocated = true;
        }

        let sector_size = self.sector_size();
        let total_sectors = self.fat.total_sectors();
        let mut pending_run: Option<(u64, Vec<u8>)> = None;
        for id in 0..total_sectors as u32 {
            let Some(sector) = self.sectors.get(id) else { continue };
            if !sector.dirty {
                if let Some((start, buf)) = pending_run.take() {
                    flush_run(self.inner.as_mut().unwrap(), sector_size, start, &buf)?;
                }
                continue;
            }
            let Some(data) = sector.data.clone() else { continue };
            let offset = sector_size as u64 + id as u64 * sector_size as u64;
            match &mut pending_run {
                Some((start, buf)) if *start + buf.len() as u64 == offset => {
                    buf.extend_from_slice(&data);
                }
                Some((start, buf)) => {
                    let start = *start;
                    let buf = std::mem::take(buf);
                    flush_run(self.inner.as_mut().unwrap(), sector_size, start, &buf)?;
                    pending_run = Some((offset, data));
                }
                None => {
                    pending_run = Some((offset, data));
                }
            }
        }
        if let Some((start, buf)) = pending_run {
            flush_run(self.inner.as_mut().unwrap(), sector_size, start, &buf)?;
        }

        if release_memory {
            for id in 0..total_sectors as u32 {
                if let Some(sector) = self.sectors.get_mut(id) {
                    sector.dirty = false;
                    sector.data = None;
                }
            }
        } else {
            for id in 0..total_sectors as u32 {
                if let Some(sector) = self.sectors.get_mut(id) {
                    sector.dirty = false;
                }
            }
        }

        self.header.write(self.inner.as_mut().unwrap())?;
        truncate_to(self.inner.as_mut().unwrap())?;
        Ok(())
    }

    /// Writes the complete file (every sector, dirty or not) to `writer`. Usable regardless of
    /// update mode; does not mutate the engine's backing stream.
    pub fn save<W: Write + Seek>(&mut self, writer: &mut W) -> Result<()> {
        self.ensure_not_disposed()?;
        self.rebuild_allocation_tables()?;
        self.commit_directory()?;
        self.commit_minifat()?;
        self.commit_fat_and_difat()?;

        let sector_size = self.sector_size();
        writer.seek(SeekFrom::Start(0))?;
        writer.write_all(&vec![0u8; sector_size])?;

        let total_sectors = self.fat.total_sectors();
        for id in 0..total_sectors as u32 {
            let bytes = match self.sectors.get(id).and_then(|s| s.data.clone()) {
                Some(b) => b,
                None => self.read_raw_sector(id)?,
            };
            writer.write_all(&bytes)?;
        }

        self.header.write(writer)?;
        Ok(())
    }

    /// Closes the engine. Consumes `self`; derived handles become unusable by construction.
    pub fn close(mut self) -> Result<()> {
        self.disposed = true;
        if self.config.contains(CfbConfiguration::LEAVE_OPEN) {
            self.inner = None;
        }
        Ok(())
    }

    /// Version-3-only: rebuilds the file from scratch without its deleted entries' dead space.
    /// Requires the backing stream to be both readable and writable through the same handle,
    /// since the rebuilt image is written back over the original after it is fully staged.
    pub fn shrink(&mut self) -> Result<()> {
        self.ensure_not_disposed()?;
        if matches!(self.version, Version::V4) {
            return Err(CfbError::InvalidOperation("shrink is version-3-only".into()));
        }

        let mut staging = CompoundFile::<std::io::Cursor<Vec<u8>>>::new(self.version, self.config);
        let staging_root = staging.root_sid();
        self.copy_storage_into(ROOT_SID, &mut staging, staging_root)?;

        let mut buffer = std::io::Cursor::new(Vec::new());
        staging.save(&mut buffer)?;
        let bytes = buffer.into_inner();

        if let Some(inner) = self.inner.as_mut() {
            inner.seek(SeekFrom::Start(0))?;
            inner.write_all(&bytes)?;
            truncate_to(inner)?;
        }

        // Adopt the compacted in-memory state so the engine keeps working after shrink without
        // requiring a fresh `open`.
        self.header = staging.header;
        self.sectors = staging.sectors;
        self.fat = staging.fat;
        self.minifat = staging.minifat;
        self.directories = staging.directories;
        self.ministream = staging.ministream;
        self.recycle_queue = VecDeque::new();
        self.transaction_lock_added = false;
        self.transaction_lock_allocated = false;
        self.range_lock_sid = None;
        Ok(())
    }

    fn copy_storage_into<W: Write + Seek>(
        &mut self,
        src_parent: u32,
        dest: &mut CompoundFile<W>,
        dest_parent: u32,
    ) -> Result<()> {
        let clsid = self.entry(src_parent)?.clsid;
        dest.set_clsid(dest_parent, clsid)?;
        let children = self.children(src_parent)?;
        for child in children {
            let child_entry = self.entry(child)?.clone();
            match child_entry.entry_type {
                EntryType::Stream => {
                    let data = self.raw_data(child)?;
                    let new_sid = dest.add_stream(dest_parent, &child_entry.name, &data)?;
                    dest.set_clsid(new_sid, child_entry.clsid)?;
                }
                EntryType::Storage => {
                    let new_sid = dest.add_storage(dest_parent, &child_entry.name)?;
                    self.copy_storage_into(child, dest, new_sid)?;
                }
                EntryType::Root | EntryType::Invalid => {}
            }
        }
        Ok(())
    }

    /// Verifies the red-black invariants of every storage's child tree. Exposed for property
    /// tests (spec property 3).
    pub fn verify_all_rb_invariants(&self) -> Result<()> {
        for (sid, entry) in self.directories.iter().enumerate() {
            if entry.is_storage_like() {
                rbtree::verify_invariants(&self.directories, entry.sid_child)
                    .map_err(|e| CfbError::Corrupted(format!("storage sid {sid}: {e}")))?;
            }
        }
        Ok(())
    }
}

fn flush_run<F: Write + Seek>(inner: &mut F, _sector_size: usize, start: u64, buf: &[u8]) -> Result<()> {
    inner.seek(SeekFrom::Start(start))?;
    inner.write_all(buf)?;
    Ok(())
}

/// Generic `Seek` has no truncate operation. Callers backing the engine with a concrete
/// `std::fs::File` should call `set_len` themselves after `commit` if sectors were freed;
/// this just leaves the stream position well-defined afterwards.
fn truncate_to<F: Seek>(inner: &mut F) -> Result<()> {
    inner.seek(SeekFrom::End(0))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn new_cf(version: Version) -> CompoundFile<Cursor<Vec<u8>>> {
        CompoundFile::new(version, CfbConfiguration::default())
    }

    #[test]
    fn add_and_read_small_stream() {
        let mut cf = new_cf(Version::V3);
        let root = cf.root_sid();
        let sid = cf.add_stream(root, "Contents", b"hello world").unwrap();
        let mut buf = [0u8; 11];
        cf.read_stream(sid, 0, &mut buf).unwrap();
        assert_eq!(&buf, b"hello world");
        assert_eq!(cf.entry(sid).unwrap().size, 11);
    }

    #[test]
    fn add_storage_and_nested_stream() {
        let mut cf = new_cf(Version::V3);
        let root = cf.root_sid();
        let storage = cf.add_storage(root, "SubStorage").unwrap();
        cf.add_stream(storage, "Nested", b"abc").unwrap();
        let found = cf.find_path(&["SubStorage", "Nested"]).unwrap();
        assert_eq!(cf.raw_data(found).unwrap(), b"abc");
    }

    #[test]
    fn duplicate_name_under_same_parent_fails() {
        let mut cf = new_cf(Version::V3);
        let root = cf.root_sid();
        cf.add_stream(root, "Dup", b"1").unwrap();
        assert!(cf.add_stream(root, "Dup", b"2").is_err());
    }

    #[test]
    fn delete_removes_entry_and_frees_its_chain() {
        let mut cf = new_cf(Version::V3);
        let root = cf.root_sid();
        cf.add_stream(root, "Gone", &vec![1u8; 10_000]).unwrap();
        cf.delete(root, "Gone").unwrap();
        assert!(cf.find_child(root, "Gone").unwrap().is_none());
    }

    #[test]
    fn stream_transitions_from_mini_to_normal_and_back() {
        let mut cf = new_cf(Version::V3);
        let root = cf.root_sid();
        let sid = cf.add_stream(root, "Transitioning", &vec![0xABu8; 100]).unwrap();

        cf.set_stream_length(sid, 8 * 1024 * 1024 + 1).unwrap();
        let mut last_original_byte = [0u8; 1];
        cf.read_stream(sid, 99, &mut last_original_byte).unwrap();
        assert_eq!(last_original_byte[0], 0xAB);
        let mut newly_grown_byte = [0u8; 1];
        cf.read_stream(sid, 100, &mut newly_grown_byte).unwrap();
        assert_eq!(newly_grown_byte[0], 0);

        cf.set_stream_length(sid, 50).unwrap();
        let mut head = [0u8; 50];
        cf.read_stream(sid, 0, &mut head).unwrap();
        assert!(head.iter().all(|&b| b == 0xAB));
    }

    #[test]
    fn save_then_open_round_trips_directory_tree() {
        let mut cf = new_cf(Version::V3);
        let root = cf.root_sid();
        cf.add_stream(root, "One", b"first").unwrap();
        let storage = cf.add_storage(root, "Folder").unwrap();
        cf.add_stream(storage, "Two", b"second").unwrap();

        let mut buffer = Cursor::new(Vec::new());
        cf.save(&mut buffer).unwrap();

        let mut reopened = CompoundFile::open(buffer, UpdateMode::ReadOnly, CfbConfiguration::default()).unwrap();
        let root = reopened.root_sid();
        let one = reopened.find_child(root, "One").unwrap().unwrap();
        assert_eq!(reopened.raw_data(one).unwrap(), b"first");
        let folder = reopened.find_child(root, "Folder").unwrap().unwrap();
        let two = reopened.find_child(folder, "Two").unwrap().unwrap();
        assert_eq!(reopened.raw_data(two).unwrap(), b"second");
    }

    #[test]
    fn commit_is_idempotent() {
        let mut cf = new_cf(Version::V3);
        let root = cf.root_sid();
        cf.add_stream(root, "Data", b"payload").unwrap();

        let mut buffer = Cursor::new(Vec::new());
        cf.save(&mut buffer).unwrap();
        let mut cf = CompoundFile::open(buffer, UpdateMode::Update, CfbConfiguration::default()).unwrap();

        cf.commit(false).unwrap();
        let first_len = cf.inner.as_ref().unwrap().get_ref().len();
        cf.commit(false).unwrap();
        let second_len = cf.inner.as_ref().unwrap().get_ref().len();
        assert_eq!(first_len, second_len);
    }

    #[test]
    fn rb_invariants_hold_after_many_inserts_and_deletes() {
        let mut cf = new_cf(Version::V3);
        let root = cf.root_sid();
        for i in 0..500 {
            cf.add_stream(root, &format!("Item{i:04}"), b"x").unwrap();
        }
        for i in (0..500).step_by(3) {
            cf.delete(root, &format!("Item{i:04}")).unwrap();
        }
        cf.verify_all_rb_invariants().unwrap();
    }

    #[test]
    fn readonly_mode_rejects_writes() {
        let mut cf = new_cf(Version::V3);
        let root = cf.root_sid();
        cf.add_stream(root, "X", b"y").unwrap();

        let mut buffer = Cursor::new(Vec::new());
        cf.save(&mut buffer).unwrap();
        let mut reopened = CompoundFile::open(buffer, UpdateMode::ReadOnly, CfbConfiguration::default()).unwrap();
        let sid = reopened.find_child(reopened.root_sid(), "X").unwrap().unwrap();
        assert!(reopened.write_stream(sid, 0, b"z").is_err());
    }

    #[test]
    fn write_stream_rejects_a_storage_entry() {
        let mut cf = new_cf(Version::V3);
        let root = cf.root_sid();
        let storage = cf.add_storage(root, "SubStorage").unwrap();
        assert!(cf.write_stream(storage, 0, b"payload").is_err());
        assert!(cf.read_stream(storage, 0, &mut [0u8; 4]).is_err());
        assert_eq!(cf.entry(storage).unwrap().start_sector, ENDOFCHAIN);
    }

    #[test]
    fn read_stream_and_write_stream_accept_the_root_entry() {
        let mut cf = new_cf(Version::V3);
        let root = cf.root_sid();
        cf.write_stream(root, 0, &vec![9u8; 100]).unwrap();
        let mut buf = [0u8; 100];
        cf.read_stream(root, 0, &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 9));
    }

    #[test]
    #[ignore = "materialises ~8M sector slots to reach the real range-lock threshold"]
    fn sector_push_crossing_range_lock_threshold_appends_a_range_lock_sector() {
        let mut cf = new_cf(Version::V4);
        let root = cf.root_sid();
        let sid = cf.add_stream(root, "Probe", b"").unwrap();

        // Seed the collection right up to the threshold without walking every intermediate
        // sector through the full allocator, mirroring the boundary test in sector.rs.
        while cf.sectors.len() < crate::consts::RANGE_LOCK_SECTOR_THRESHOLD as usize - 1 {
            cf.sectors.push(Some(Sector::new(cf.sectors.len() as u32, SectorKind::Normal)));
        }

        let before = cf.sectors.len();
        cf.write_stream(sid, 0, &vec![1u8; cf.sector_size()]).unwrap();

        assert!(cf.sectors.len() > before, "resize should have pushed new sectors");
        assert!(cf.range_lock_sid.is_some());
        assert!(cf.transaction_lock_added);
        let lock_id = cf.range_lock_sid.unwrap();
        assert_eq!(cf.sectors.get(lock_id).unwrap().kind, SectorKind::RangeLock);
    }
}

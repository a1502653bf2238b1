//! # OASIS disk
//!
//! The `Disk` holds the boot sector, header, allocation map, and directory of a volume.
//! It is loaded from a sector stream and afterwards lives in memory only.
//! Directory operations like `put_file` or `erase` write file data to the stream but
//! change the system areas only in memory; `write_system_sectors` makes them permanent.

use std::collections::BTreeSet;
use log::{trace,debug,info,warn,error};
use super::types::*;
use super::header::FilesystemHeader;
use super::alloc::AllocationMap;
use super::deb::DirEntry;
use super::file;
use super::pack;
use crate::img::{self,SectorIO};
use crate::{Error,STDRESULT,SECTOR_SIZE,SECTORS_PER_BLOCK,OASIS_MAX_FS_BLOCKS,DIR_ENTRIES_PER_SECTOR};

/// Parameters for building a fresh file system
#[derive(Debug,Clone)]
pub struct FormatOptions {
    pub label: String,
    pub heads: usize,
    pub cylinders: usize,
    /// logical (256 byte) sectors per track
    pub sectors_per_track: usize,
    /// directory capacity, rounded up to whole sectors of 8 entries
    pub dir_entries: usize,
    pub write_protect: bool,
    /// creation time, None means now
    pub time: Option<chrono::NaiveDateTime>
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            label: "OASIS".to_string(),
            heads: 2,
            cylinders: 77,
            sectors_per_track: 26,
            dir_entries: 64,
            write_protect: false,
            time: None
        }
    }
}

/// Findings of a consistency check, nothing is repaired
#[derive(Debug,Clone,Default,PartialEq,Eq)]
pub struct CheckReport {
    /// blocks used by some file but free in the map
    pub referenced_but_free: Vec<usize>,
    /// blocks allocated in the map that no file or system area owns
    pub unowned: Vec<usize>,
    /// (block, first entry, second entry)
    pub cross_linked: Vec<(usize,usize,usize)>,
    /// blocks files claim that are past the end of the map
    pub out_of_range: Vec<usize>,
    /// entries whose sequential chain could not be followed
    pub bad_chains: Vec<usize>,
    pub header_free_blocks: usize,
    pub map_free_blocks: usize
}

impl CheckReport {
    pub fn is_clean(&self) -> bool {
        self.referenced_but_free.len()==0 && self.unowned.len()==0 && self.cross_linked.len()==0
            && self.out_of_range.len()==0 && self.bad_chains.len()==0
            && self.header_free_blocks==self.map_free_blocks
    }
}

pub struct Disk {
    boot: Vec<u8>,
    header: FilesystemHeader,
    alloc_map: AllocationMap,
    directory: Vec<DirEntry>
}

impl Disk {
    /// Load the system areas.  Any failure leaves nothing behind.
    pub fn load(stream: &mut dyn SectorIO) -> Result<Self,Error> {
        let boot = img::read_exact(stream,0,1)?;
        let sector1 = img::read_exact(stream,1,1)?;
        let header = FilesystemHeader::from_bytes(&sector1[0..HEADER_SIZE])?;
        debug!("volume {}, {} heads, {} cylinders, {} sectors",header.label_string(),header.heads(),header.num_cyl,header.num_sectors);
        let am_size = header.am_size_bytes();
        if am_size > OASIS_MAX_FS_BLOCKS/8 {
            error!("allocation map of {} bytes exceeds the limit of {}",am_size,OASIS_MAX_FS_BLOCKS/8);
            return Err(Error::CapacityExceeded(format!("allocation map of {} bytes",am_size)));
        }
        let mut map_bytes = sector1[HEADER_SIZE..SECTOR_SIZE].to_vec();
        let extra = header.additional_am_sectors();
        if extra > 0 {
            map_bytes.append(&mut img::read_exact(stream,2,extra)?);
        }
        let alloc_map = AllocationMap::from_bytes(&map_bytes)?;
        if header.total_blocks() > alloc_map.capacity() {
            warn!("disk has {} blocks but the map covers {}",header.total_blocks(),alloc_map.capacity());
        }
        let mut directory = Vec::new();
        if header.dir_sectors() > 0 {
            let dir_bytes = img::read_exact(stream,header.dir_start_sector(),header.dir_sectors())?;
            for chunk in dir_bytes.chunks(DEB_SIZE) {
                directory.push(DirEntry::from_bytes(chunk)?);
            }
        }
        if header.free_blocks as usize != alloc_map.count_free_blocks() {
            warn!("header claims {} free blocks, map has {}",header.free_blocks,alloc_map.count_free_blocks());
        }
        info!("loaded directory with {} entries",directory.len());
        Ok(Self {
            boot,
            header,
            alloc_map,
            directory
        })
    }
    /// Release the allocation map and directory.  Calling twice is harmless.
    pub fn cleanup(&mut self) {
        if self.alloc_map.capacity() > 0 || self.directory.len() > 0 {
            trace!("releasing map and directory");
        }
        self.alloc_map.clear();
        self.directory = Vec::new();
    }
    pub fn boot_sector(&self) -> &[u8] {
        &self.boot
    }
    pub fn header(&self) -> &FilesystemHeader {
        &self.header
    }
    pub fn header_mut(&mut self) -> &mut FilesystemHeader {
        &mut self.header
    }
    pub fn alloc_map(&self) -> &AllocationMap {
        &self.alloc_map
    }
    pub fn alloc_map_mut(&mut self) -> &mut AllocationMap {
        &mut self.alloc_map
    }
    pub fn directory(&self) -> &[DirEntry] {
        &self.directory
    }
    pub fn directory_mut(&mut self) -> &mut Vec<DirEntry> {
        &mut self.directory
    }
    pub fn total_sectors(&self) -> usize {
        self.header.total_sectors()
    }
    pub fn total_blocks(&self) -> usize {
        self.header.total_blocks()
    }
    /// Set the header's free block count from the map
    pub fn update_free_blocks(&mut self) {
        self.header.free_blocks = usize::min(self.alloc_map.count_free_blocks(),u16::MAX as usize) as u16;
    }
    /// Write the header, allocation map, and directory to the stream
    pub fn write_system_sectors(&self,stream: &mut dyn SectorIO) -> STDRESULT {
        let map = self.alloc_map.to_bytes();
        let mut sector1 = vec![0;SECTOR_SIZE];
        sector1[0..HEADER_SIZE].copy_from_slice(&self.header.to_bytes());
        let in_sector1 = usize::min(map.len(),AM_BYTES_IN_SECTOR1);
        sector1[HEADER_SIZE..HEADER_SIZE+in_sector1].copy_from_slice(&map[0..in_sector1]);
        img::write_exact(stream,1,&sector1)?;
        let extra = self.header.additional_am_sectors();
        if extra > 0 {
            let mut rest = map[in_sector1..].to_vec();
            rest.resize(extra*SECTOR_SIZE,0);
            img::write_exact(stream,2,&rest)?;
        }
        let dir_sectors = self.header.dir_sectors();
        if dir_sectors > 0 {
            if self.directory.len() > dir_sectors*DIR_ENTRIES_PER_SECTOR {
                error!("{} entries do not fit in {} directory sectors",self.directory.len(),dir_sectors);
                return Err(Error::CapacityExceeded(format!("directory of {} entries",self.directory.len())));
            }
            let mut dir_bytes: Vec<u8> = Vec::new();
            for deb in &self.directory {
                dir_bytes.extend_from_slice(&deb.to_bytes());
            }
            dir_bytes.resize(dir_sectors*SECTOR_SIZE,0);
            img::write_exact(stream,self.header.dir_start_sector(),&dir_bytes)?;
        }
        debug!("wrote header, {} map sectors, {} directory sectors",1+extra,dir_sectors);
        Ok(())
    }
    fn check_writeable(&self) -> STDRESULT {
        if self.header.is_write_protected() {
            error!("volume {} is write protected",self.header.label_string());
            return Err(Error::WriteProtected);
        }
        Ok(())
    }
    fn check_index(&self,idx: usize) -> STDRESULT {
        if idx >= self.directory.len() {
            return Err(Error::OutOfRange { addr: idx, limit: self.directory.len() });
        }
        if !self.directory[idx].is_valid() {
            return Err(Error::NotFound(format!("live entry at {}",idx)));
        }
        Ok(())
    }
    /// Index of the live entry named `NAME.TYPE`, case insensitive.
    /// The owner selector `None` matches any owner.
    pub fn find(&self,name_type: &str,owner: Option<u8>) -> Option<usize> {
        self.directory.iter().position(|deb| deb.is_named(name_type) && deb.is_owned_by(owner))
    }
    /// First slot that is empty or deleted
    pub fn free_slot(&self) -> Option<usize> {
        self.directory.iter().position(|deb| deb.is_empty() || deb.is_deleted())
    }
    /// Store a new file for `owner` whose name and format come from a host file name.
    /// The same name may exist under other owners.  Returns the directory index.
    pub fn put_file(&mut self,stream: &mut dyn SectorIO,host_name: &str,owner: u8,dat: &[u8],time: Option<chrono::NaiveDateTime>) -> Result<usize,Error> {
        self.check_writeable()?;
        let mut deb = DirEntry::from_host_filename(host_name)?;
        deb.owner_id = owner;
        if self.find(&deb.name_and_type(),Some(owner)).is_some() {
            error!("{} already exists for owner {}",deb.name_and_type(),owner);
            return Err(Error::InvalidArgument(format!("{} already exists",deb.name_and_type())));
        }
        let slot = match self.free_slot() {
            Some(i) => i,
            None => {
                error!("directory is full");
                return Err(Error::CapacityExceeded("directory is full".to_string()));
            }
        };
        file::write_file(stream,&mut self.alloc_map,&mut deb,dat)?;
        deb.set_time(time);
        debug!("{} goes in slot {}",deb.name_and_type(),slot);
        self.directory[slot] = deb;
        self.update_free_blocks();
        Ok(slot)
    }
    pub fn get_file(&self,stream: &mut dyn SectorIO,name_type: &str,owner: Option<u8>) -> Result<Vec<u8>,Error> {
        match self.find(name_type,owner) {
            Some(idx) => file::read_file(stream,&self.directory[idx]),
            None => Err(Error::NotFound(name_type.to_string()))
        }
    }
    /// Distinct blocks a file occupies
    pub fn file_blocks(&self,stream: &mut dyn SectorIO,deb: &DirEntry) -> Result<BTreeSet<usize>,Error> {
        let mut ans = BTreeSet::new();
        if deb.block_count==0 || deb.start_sector==0 {
            return Ok(ans);
        }
        match deb.file_type() {
            Some(FileFormat::Sequential) => {
                for lba in file::walk_sequential_chain(stream,deb.start_sector)? {
                    ans.insert(lba as usize / SECTORS_PER_BLOCK);
                }
            },
            _ => {
                let first = deb.start_sector as usize / SECTORS_PER_BLOCK;
                ans.extend(first..first+deb.block_count as usize);
            }
        }
        Ok(ans)
    }
    /// Free the blocks of the entry at `idx` and mark it deleted.
    /// The entry is deleted even if some blocks could not be freed, in which case the
    /// first such error is returned.
    pub fn erase(&mut self,stream: &mut dyn SectorIO,idx: usize) -> STDRESULT {
        self.check_writeable()?;
        self.check_index(idx)?;
        let deb = self.directory[idx].clone();
        if deb.attributes() & ATTR_DELETE_PROTECTED > 0 {
            error!("{} is delete protected",deb.name_and_type());
            return Err(Error::InvalidArgument(format!("{} is delete protected",deb.name_and_type())));
        }
        let mut first_err: Option<Error> = None;
        if deb.block_count > 0 && deb.start_sector==0 {
            warn!("{} has blocks but no start sector, nothing to free",deb.name_and_type());
        }
        match deb.file_type() {
            Some(FileFormat::Sequential) => {
                // a broken chain still gives up the blocks reached before the break
                let (sectors,walk_err) = file::trace_sequential_chain(stream,deb.start_sector);
                if let Some(e) = walk_err {
                    warn!("chain of {} is damaged, freeing {} sectors reached",deb.name_and_type(),sectors.len());
                    first_err = Some(e);
                }
                let blocks: BTreeSet<usize> = sectors.iter().map(|lba| *lba as usize / SECTORS_PER_BLOCK).collect();
                for b in blocks {
                    if let Err(e) = self.alloc_map.deallocate(b,1) {
                        warn!("could not free block {} of {}",b,deb.name_and_type());
                        first_err.get_or_insert(e);
                    }
                }
            },
            _ => if deb.block_count > 0 && deb.start_sector > 0 {
                let first = deb.start_sector as usize / SECTORS_PER_BLOCK;
                if let Err(e) = self.alloc_map.deallocate(first,deb.block_count as usize) {
                    first_err = Some(e);
                }
            }
        }
        debug!("erasing {} at slot {}",deb.name_and_type(),idx);
        self.directory[idx].mark_deleted();
        self.update_free_blocks();
        match first_err {
            Some(e) => Err(e),
            None => Ok(())
        }
    }
    pub fn erase_file(&mut self,stream: &mut dyn SectorIO,name_type: &str,owner: Option<u8>) -> STDRESULT {
        match self.find(name_type,owner) {
            Some(idx) => self.erase(stream,idx),
            None => Err(Error::NotFound(name_type.to_string()))
        }
    }
    /// Give the entry at `idx` a new `NAME.TYPE`, keeping its time stamp.
    /// The new name must not be taken by another file of the same owner.
    pub fn rename(&mut self,idx: usize,new_name_type: &str) -> STDRESULT {
        self.check_writeable()?;
        self.check_index(idx)?;
        let owner = self.directory[idx].owner_id;
        if let Some(other) = self.find(new_name_type,Some(owner)) {
            if other != idx {
                error!("{} already exists for owner {}",new_name_type,owner);
                return Err(Error::InvalidArgument(format!("{} already exists",new_name_type)));
            }
        }
        self.directory[idx].rename(new_name_type)
    }
    pub fn rename_file(&mut self,name_type: &str,owner: Option<u8>,new_name_type: &str) -> STDRESULT {
        match self.find(name_type,owner) {
            Some(idx) => self.rename(idx,new_name_type),
            None => Err(Error::NotFound(name_type.to_string()))
        }
    }
    /// Build a fresh file system on the stream, writing every system sector
    pub fn format(stream: &mut dyn SectorIO,opt: &FormatOptions) -> Result<Self,Error> {
        if opt.heads < 1 || opt.heads > 15 || opt.cylinders < 1 || opt.cylinders > 255 || opt.sectors_per_track < 1 || opt.sectors_per_track > 255 {
            error!("bad geometry {}x{}x{}",opt.heads,opt.cylinders,opt.sectors_per_track);
            return Err(Error::InvalidArgument("disk geometry".to_string()));
        }
        if opt.dir_entries < 1 {
            return Err(Error::InvalidArgument("directory must have at least one entry".to_string()));
        }
        let mut header = FilesystemHeader::new();
        header.set_label(&opt.label);
        header.timestamp = pack::pack_naive(opt.time);
        header.num_heads = (opt.heads << 4) as u8;
        header.num_cyl = opt.cylinders as u8;
        header.num_sectors = opt.sectors_per_track as u8;
        let mut dir_sectors = (opt.dir_entries + DIR_ENTRIES_PER_SECTOR - 1) / DIR_ENTRIES_PER_SECTOR;
        if dir_sectors > 255 {
            warn!("directory of {} entries clamped to 255 sectors",opt.dir_entries);
            dir_sectors = 255;
        }
        header.dir_sectors_max = dir_sectors as u8;
        let total_blocks = header.total_blocks();
        if total_blocks==0 {
            return Err(Error::InvalidArgument("geometry gives no blocks".to_string()));
        }
        if total_blocks > OASIS_MAX_FS_BLOCKS {
            error!("{} blocks exceeds the limit of {}",total_blocks,OASIS_MAX_FS_BLOCKS);
            return Err(Error::CapacityExceeded(format!("{} blocks",total_blocks)));
        }
        let map_bytes_needed = (total_blocks + 7) / 8;
        let extra = match map_bytes_needed <= AM_BYTES_IN_SECTOR1 {
            true => 0,
            false => (map_bytes_needed - AM_BYTES_IN_SECTOR1 + SECTOR_SIZE - 1) / SECTOR_SIZE
        };
        if extra > MAX_ADDITIONAL_AM_SECTORS {
            return Err(Error::CapacityExceeded(format!("{} additional map sectors",extra)));
        }
        header.fs_flags = extra as u8;
        let system_sectors = 2 + extra + dir_sectors;
        if system_sectors > header.total_sectors() {
            error!("system area of {} sectors does not fit",system_sectors);
            return Err(Error::CapacityExceeded(format!("system area of {} sectors",system_sectors)));
        }
        let mut alloc_map = AllocationMap::new(header.am_size_bytes())?;
        // boot, header, map, and directory
        for b in 0..(system_sectors + SECTORS_PER_BLOCK - 1) / SECTORS_PER_BLOCK {
            alloc_map.set_state(b,true)?;
        }
        // map bits past the end of the disk must never be handed out
        for b in total_blocks..alloc_map.capacity() {
            alloc_map.set_state(b,true)?;
        }
        let mut ans = Self {
            boot: vec![0;SECTOR_SIZE],
            header,
            alloc_map,
            directory: vec![DirEntry::empty();dir_sectors*DIR_ENTRIES_PER_SECTOR]
        };
        ans.update_free_blocks();
        img::write_exact(stream,0,&ans.boot)?;
        ans.write_system_sectors(stream)?;
        // write protect last so the system sectors could go out
        ans.header.set_write_protect(opt.write_protect);
        if opt.write_protect {
            ans.write_system_sectors(stream)?;
        }
        info!("formatted {} with {} blocks, {} free",ans.header.label_string(),total_blocks,ans.header.free_blocks);
        Ok(ans)
    }
    /// Cross check the directory against the allocation map
    pub fn check(&self,stream: &mut dyn SectorIO) -> Result<CheckReport,Error> {
        let capacity = self.alloc_map.capacity();
        let mut owner: Vec<Option<usize>> = vec![None;capacity];
        let mut report = CheckReport::default();
        let system_sectors = self.header.dir_start_sector() + self.header.dir_sectors();
        let system_blocks = (system_sectors + SECTORS_PER_BLOCK - 1) / SECTORS_PER_BLOCK;
        for (idx,deb) in self.directory.iter().enumerate() {
            if !deb.is_valid() {
                continue;
            }
            let blocks = match self.file_blocks(stream,deb) {
                Ok(b) => b,
                Err(e) => {
                    warn!("{}: {}",deb.name_and_type(),e);
                    report.bad_chains.push(idx);
                    continue;
                }
            };
            for b in blocks {
                if b >= capacity {
                    report.out_of_range.push(b);
                    continue;
                }
                if !self.alloc_map.get_state(b)? {
                    report.referenced_but_free.push(b);
                }
                match owner[b] {
                    Some(first) => report.cross_linked.push((b,first,idx)),
                    None => owner[b] = Some(idx)
                }
            }
        }
        for b in system_blocks..usize::min(capacity,self.total_blocks()) {
            if self.alloc_map.get_state(b)? && owner[b].is_none() {
                report.unowned.push(b);
            }
        }
        report.header_free_blocks = self.header.free_blocks as usize;
        report.map_free_blocks = self.alloc_map.count_free_blocks();
        Ok(report)
    }
}

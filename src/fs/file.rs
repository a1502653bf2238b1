//! # File data
//!
//! Reading and writing the data of one file, given its directory entry.
//!
//! Sequential files are chains of sectors, each with 254 bytes of data and a little endian
//! link to the next sector (0 ends the chain).  Blocks are taken one at a time, and every
//! block is used up before another is taken.  For these files `record_count` counts
//! sectors, `block_count` counts distinct blocks, and `ffd2` is the last sector.
//!
//! All other formats occupy one run of blocks starting at `start_sector`.
//!
//! Writers take blocks through a `PendingAllocation`, so a failed write gives back every
//! block it took.  Sectors already written stay written.  The header's free block count
//! is not touched here.

use std::collections::HashSet;
use log::{trace,debug,warn,error};
use super::types::*;
use super::deb::DirEntry;
use super::alloc::{AllocationMap,PendingAllocation};
use crate::img::{self,SectorIO};
use crate::{Error,STDRESULT,SECTOR_SIZE,SECTORS_PER_BLOCK,BLOCK_SIZE,SEQ_DATA_PER_SECTOR,OASIS_MAX_FS_BLOCKS};

fn link_of(sector: &[u8]) -> u16 {
    u16::from_le_bytes([sector[SEQ_DATA_PER_SECTOR],sector[SEQ_DATA_PER_SECTOR+1]])
}

/// Block 0 holds the boot sector, and a start sector of 0 means "no data"
fn not_boot_block(block: usize) -> Result<usize,Error> {
    if block==0 {
        error!("block 0 is free in the map");
        return Err(Error::Inconsistent("boot block is marked free".to_string()));
    }
    Ok(block)
}

fn read_one(stream: &mut dyn SectorIO,lba: usize) -> Result<Vec<u8>,Error> {
    img::read_exact(stream,lba,1)
}

/// Read a sequential file into `buf`, stopping at the end of the chain or when `buf` is full.
/// Returns the number of bytes copied.
pub fn read_sequential(stream: &mut dyn SectorIO,deb: &DirEntry,buf: &mut [u8]) -> Result<usize,Error> {
    if deb.file_type()!=Some(FileFormat::Sequential) {
        return Err(Error::InvalidArgument(format!("{} is not sequential",deb.name_and_type())));
    }
    if deb.start_sector==0 {
        if deb.ffd2!=0 {
            warn!("empty file {} has last sector {}",deb.name_and_type(),deb.ffd2);
        }
        if deb.record_count!=0 {
            warn!("empty file {} has {} records",deb.name_and_type(),deb.record_count);
        }
        return Ok(0);
    }
    let max_sectors = deb.block_count as usize * SECTORS_PER_BLOCK;
    let mut curr = deb.start_sector;
    let mut last = 0;
    let mut visited = 0;
    let mut copied = 0;
    while curr != 0 {
        visited += 1;
        if visited > max_sectors {
            error!("{}: chain passes {} sectors, but only {} blocks are allocated",deb.name_and_type(),visited,deb.block_count);
            return Err(Error::Inconsistent(format!("sector chain of {} is too long",deb.name_and_type())));
        }
        last = curr;
        let sector = read_one(stream,curr as usize)?;
        curr = link_of(&sector);
        trace!("sector {} links to {}",last,curr);
        let remaining = buf.len() - copied;
        let n = usize::min(remaining,SEQ_DATA_PER_SECTOR);
        buf[copied..copied+n].copy_from_slice(&sector[0..n]);
        copied += n;
        if remaining <= SEQ_DATA_PER_SECTOR {
            if curr != 0 {
                debug!("buffer full before end of chain");
            }
            break;
        }
    }
    if curr==0 && last!=deb.ffd2 {
        error!("{}: chain ends at {}, entry says {}",deb.name_and_type(),last,deb.ffd2);
        return Err(Error::Inconsistent(format!("last sector of {} does not match",deb.name_and_type())));
    }
    Ok(copied)
}

/// Follow a sequential chain and return every sector in it, stopping after `MAX_CHAIN_SECTORS`.
pub fn walk_sequential_chain(stream: &mut dyn SectorIO,start_sector: u16) -> Result<Vec<u16>,Error> {
    let mut ans = Vec::new();
    let mut curr = start_sector;
    while curr != 0 {
        if ans.len() >= MAX_CHAIN_SECTORS {
            error!("chain starting at {} is too long or cyclic",start_sector);
            return Err(Error::Inconsistent(format!("chain at sector {} does not end",start_sector)));
        }
        ans.push(curr);
        curr = link_of(&read_one(stream,curr as usize)?);
    }
    Ok(ans)
}

/// Follow a sequential chain as far as it goes.  Returns the distinct sectors that could be
/// read, along with the error that stopped the walk, if any.  A sector seen twice ends the
/// walk with `Inconsistent`.  Used where a damaged chain should still give up what it holds.
pub fn trace_sequential_chain(stream: &mut dyn SectorIO,start_sector: u16) -> (Vec<u16>,Option<Error>) {
    let mut ans = Vec::new();
    let mut seen = HashSet::new();
    let mut curr = start_sector;
    while curr != 0 {
        if !seen.insert(curr) {
            error!("chain starting at {} comes back to sector {}",start_sector,curr);
            return (ans,Some(Error::Inconsistent(format!("chain at sector {} is cyclic",start_sector))));
        }
        match read_one(stream,curr as usize) {
            Ok(sector) => {
                ans.push(curr);
                curr = link_of(&sector);
            },
            Err(e) => {
                error!("chain starting at {} breaks at sector {}",start_sector,curr);
                return (ans,Some(e));
            }
        }
    }
    (ans,None)
}

/// Logical byte length of a contiguous file, never more than its allocation
pub fn contiguous_length(deb: &DirEntry) -> usize {
    let allocated = deb.block_count as usize * BLOCK_SIZE;
    let rc = deb.record_count as usize;
    let logical = match deb.file_type() {
        Some(FileFormat::Direct) => rc * deb.ffd1 as usize,
        Some(FileFormat::Indexed) | Some(FileFormat::Keyed) => rc * (deb.ffd1 & INDEXED_RECLEN_MASK) as usize,
        Some(FileFormat::Relocatable) => deb.ffd2 as usize,
        Some(FileFormat::Absolute) if rc > 0 && deb.ffd1 > 0 => rc * deb.ffd1 as usize,
        _ => allocated
    };
    if logical > allocated {
        warn!("{}: length {} exceeds allocation {}",deb.name_and_type(),logical,allocated);
        return allocated;
    }
    if logical==0 {
        return allocated;
    }
    logical
}

/// Read a contiguous file.  An invalid entry or one with no blocks reads as nothing.
pub fn read_contiguous(stream: &mut dyn SectorIO,deb: &DirEntry) -> Result<Vec<u8>,Error> {
    if !deb.is_valid() || deb.block_count==0 {
        return Ok(Vec::new());
    }
    let sectors = deb.block_count as usize * SECTORS_PER_BLOCK;
    let mut ans = img::read_exact(stream,deb.start_sector as usize,sectors)?;
    ans.truncate(contiguous_length(deb));
    Ok(ans)
}

/// Read any file.  Sequential files come back as whole sectors of data.
pub fn read_file(stream: &mut dyn SectorIO,deb: &DirEntry) -> Result<Vec<u8>,Error> {
    match deb.file_type() {
        Some(FileFormat::Sequential) if deb.is_valid() => {
            if deb.block_count==0 {
                if deb.start_sector!=0 {
                    warn!("{} has a start sector but no blocks",deb.name_and_type());
                }
                return Ok(Vec::new());
            }
            let mut buf = vec![0;deb.block_count as usize * BLOCK_SIZE];
            let n = read_sequential(stream,deb,&mut buf)?;
            buf.truncate(n);
            Ok(buf)
        },
        _ => read_contiguous(stream,deb)
    }
}

/// Write `dat` as a sequential file, updating the entry's start, counts, and last sector.
pub fn write_sequential(stream: &mut dyn SectorIO,map: &mut AllocationMap,deb: &mut DirEntry,dat: &[u8]) -> STDRESULT {
    if dat.len()==0 {
        deb.start_sector = 0;
        deb.block_count = 0;
        deb.record_count = 0;
        deb.ffd2 = 0;
        return Ok(());
    }
    let sectors_needed = (dat.len() + SEQ_DATA_PER_SECTOR - 1) / SEQ_DATA_PER_SECTOR;
    let blocks_needed = (sectors_needed + SECTORS_PER_BLOCK - 1) / SECTORS_PER_BLOCK;
    if sectors_needed > u16::MAX as usize || blocks_needed > OASIS_MAX_FS_BLOCKS {
        error!("{} bytes needs {} sectors in {} blocks",dat.len(),sectors_needed,blocks_needed);
        return Err(Error::CapacityExceeded(format!("sequential file of {} bytes",dat.len())));
    }
    let mut pending = PendingAllocation::new(map);
    let mut block = 0;
    let mut used_in_block = SECTORS_PER_BLOCK;
    let mut prev: Option<usize> = None;
    let mut first = 0;
    for chunk in dat.chunks(SEQ_DATA_PER_SECTOR) {
        if used_in_block==SECTORS_PER_BLOCK {
            block = not_boot_block(pending.allocate(1)?)?;
            used_in_block = 0;
            trace!("sequential write takes block {}",block);
        }
        let lba = block * SECTORS_PER_BLOCK + used_in_block;
        used_in_block += 1;
        let mut sector = vec![0;SECTOR_SIZE];
        sector[0..chunk.len()].copy_from_slice(chunk);
        img::write_exact(stream,lba,&sector)?;
        match prev {
            Some(prev_lba) => {
                let mut prev_sector = read_one(stream,prev_lba)?;
                prev_sector[SEQ_DATA_PER_SECTOR..SECTOR_SIZE].copy_from_slice(&u16::to_le_bytes(lba as u16));
                img::write_exact(stream,prev_lba,&prev_sector)?;
            },
            None => first = lba
        }
        prev = Some(lba);
    }
    let blocks = pending.block_count();
    pending.commit();
    deb.start_sector = first as u16;
    deb.block_count = blocks as u16;
    deb.record_count = sectors_needed as u16;
    deb.ffd2 = prev.unwrap_or(0) as u16;
    debug!("wrote {} sectors in {} blocks starting at {}",sectors_needed,blocks,first);
    Ok(())
}

/// Set the size related fields a contiguous file derives from its data length
fn set_contiguous_sizes(deb: &mut DirEntry,len: usize) {
    let reclen = deb.record_len() as usize;
    match deb.file_type() {
        Some(FileFormat::Direct) | Some(FileFormat::Indexed) | Some(FileFormat::Keyed) | Some(FileFormat::Absolute) if reclen > 0 => {
            deb.record_count = ((len + reclen - 1) / reclen).min(u16::MAX as usize) as u16;
        },
        _ => deb.record_count = 0
    }
    match deb.file_type() {
        Some(FileFormat::Relocatable) => {
            if len > u16::MAX as usize {
                warn!("program length {} does not fit, reads will use the allocation",len);
                deb.ffd2 = 0;
            } else {
                deb.ffd2 = len as u16;
            }
        },
        Some(FileFormat::Indexed) | Some(FileFormat::Keyed) => deb.ffd2 = deb.block_count,
        Some(FileFormat::Direct) => deb.ffd2 = 0,
        _ => {}
    }
}

/// Write `dat` as a contiguous file in one best fit run of blocks, padding with zeros.
pub fn write_contiguous(stream: &mut dyn SectorIO,map: &mut AllocationMap,deb: &mut DirEntry,dat: &[u8]) -> STDRESULT {
    if dat.len()==0 {
        deb.start_sector = 0;
        deb.block_count = 0;
        deb.record_count = 0;
        return Ok(());
    }
    let blocks_needed = (dat.len() + BLOCK_SIZE - 1) / BLOCK_SIZE;
    if blocks_needed > MAX_FILE_BLOCKS {
        error!("{} bytes needs {} blocks",dat.len(),blocks_needed);
        return Err(Error::CapacityExceeded(format!("contiguous file of {} blocks",blocks_needed)));
    }
    let mut pending = PendingAllocation::new(map);
    let block = not_boot_block(pending.allocate(blocks_needed)?)?;
    let lba = block * SECTORS_PER_BLOCK;
    let mut padded = dat.to_vec();
    padded.resize(blocks_needed * BLOCK_SIZE,0);
    img::write_exact(stream,lba,&padded)?;
    pending.commit();
    deb.start_sector = lba as u16;
    deb.block_count = blocks_needed as u16;
    set_contiguous_sizes(deb,dat.len());
    debug!("wrote {} blocks at sector {}",blocks_needed,lba);
    Ok(())
}

/// Write a file of any format, choosing the layout from the entry
pub fn write_file(stream: &mut dyn SectorIO,map: &mut AllocationMap,deb: &mut DirEntry,dat: &[u8]) -> STDRESULT {
    match deb.file_type() {
        Some(FileFormat::Sequential) => write_sequential(stream,map,deb,dat),
        Some(_) => write_contiguous(stream,map,deb,dat),
        None => Err(Error::InvalidArgument(format!("unknown file format {:#04x}",deb.file_format)))
    }
}

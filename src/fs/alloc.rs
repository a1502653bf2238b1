//! # Allocation map
//!
//! The map is a bitmap over 1K blocks, block `i` being bit `7 - i%8` of byte `i/8`,
//! so the most significant bit of each byte is the lowest block.  A set bit means the
//! block is in use.  The storage is a `BitVec`, whose byte conversions use the same order.
//!
//! Allocation is a best fit search over one linear scan.  Deallocation validates the
//! whole range before it clears anything.
//!
//! The map never touches the file system header.  Whoever mutates the map is responsible
//! for updating `free_blocks` and writing both back.

use std::fmt;
use bit_vec::BitVec;
use log::{trace,debug,error};
use crate::{Error,STDRESULT,OASIS_MAX_FS_BLOCKS};

pub struct AllocationMap {
    bits: BitVec
}

impl AllocationMap {
    /// Create a map of `size_bytes` with every block free
    pub fn new(size_bytes: usize) -> Result<Self,Error> {
        Self::from_bytes(&vec![0;size_bytes])
    }
    pub fn from_bytes(dat: &[u8]) -> Result<Self,Error> {
        if dat.len()*8 > OASIS_MAX_FS_BLOCKS {
            error!("allocation map of {} bytes exceeds {} blocks",dat.len(),OASIS_MAX_FS_BLOCKS);
            return Err(Error::CapacityExceeded(format!("allocation map of {} bytes",dat.len())));
        }
        Ok(Self {
            bits: BitVec::from_bytes(dat)
        })
    }
    pub fn to_bytes(&self) -> Vec<u8> {
        self.bits.to_bytes()
    }
    pub fn size_bytes(&self) -> usize {
        self.bits.len() / 8
    }
    /// Number of blocks the map can describe
    pub fn capacity(&self) -> usize {
        self.bits.len()
    }
    /// Forget the whole map, leaving zero capacity
    pub fn clear(&mut self) {
        self.bits = BitVec::new();
    }
    fn check_block(&self,block: usize) -> STDRESULT {
        if block >= self.capacity() {
            debug!("block {} is beyond map capacity {}",block,self.capacity());
            return Err(Error::OutOfRange { addr: block, limit: self.capacity() });
        }
        Ok(())
    }
    /// True if the block is allocated
    pub fn get_state(&self,block: usize) -> Result<bool,Error> {
        self.check_block(block)?;
        Ok(self.bits[block])
    }
    pub fn set_state(&mut self,block: usize,allocated: bool) -> STDRESULT {
        self.check_block(block)?;
        self.bits.set(block,allocated);
        Ok(())
    }
    pub fn count_free_blocks(&self) -> usize {
        self.bits.iter().filter(|b| !b).count()
    }
    /// Length of the longest run of free blocks
    pub fn largest_free_run(&self) -> usize {
        let mut best = 0;
        let mut run = 0;
        for b in self.bits.iter() {
            match b {
                true => run = 0,
                false => {
                    run += 1;
                    best = usize::max(best,run);
                }
            }
        }
        best
    }
    /// Allocate `n` contiguous blocks, returning the first.
    /// The smallest free run that fits wins; among equal runs the lowest address wins.
    pub fn allocate(&mut self,n: usize) -> Result<usize,Error> {
        if n==0 {
            return Err(Error::InvalidArgument("cannot allocate 0 blocks".to_string()));
        }
        if n > self.capacity() {
            error!("request for {} blocks exceeds map capacity {}",n,self.capacity());
            return Err(Error::NotFound(format!("{} contiguous free blocks",n)));
        }
        let mut best: Option<(usize,usize)> = None;
        let mut run_start = 0;
        let mut run_len = 0;
        // one extra step acts as an allocated sentinel closing the final run
        for i in 0..=self.capacity() {
            let used = i==self.capacity() || self.bits[i];
            if !used {
                if run_len==0 {
                    run_start = i;
                }
                run_len += 1;
                continue;
            }
            if run_len >= n {
                best = match best {
                    Some((_,len)) if len <= run_len => best,
                    _ => Some((run_start,run_len))
                };
            }
            run_len = 0;
        }
        match best {
            Some((start,len)) => {
                trace!("allocating {} blocks at {} from run of {}",n,start,len);
                for b in start..start+n {
                    self.bits.set(b,true);
                }
                Ok(start)
            },
            None => {
                debug!("no free run of {} blocks",n);
                Err(Error::NotFound(format!("{} contiguous free blocks",n)))
            }
        }
    }
    /// Free `n` blocks starting at `start`.  Every block must currently be allocated,
    /// otherwise nothing changes and the result is `Inconsistent`.
    pub fn deallocate(&mut self,start: usize,n: usize) -> STDRESULT {
        if n==0 {
            return Err(Error::InvalidArgument("cannot deallocate 0 blocks".to_string()));
        }
        if start+n > self.capacity() {
            error!("deallocation {}..{} is beyond map capacity {}",start,start+n,self.capacity());
            return Err(Error::OutOfRange { addr: start+n-1, limit: self.capacity() });
        }
        for b in start..start+n {
            if !self.bits[b] {
                error!("attempt to deallocate free block {}",b);
                return Err(Error::Inconsistent(format!("block {} is already free",b)));
            }
        }
        // not transactional, a failure here leaves the range partly cleared
        for b in start..start+n {
            self.set_state(b,false)?;
        }
        trace!("freed {} blocks at {}",n,start);
        Ok(())
    }
}

impl fmt::Display for AllocationMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i,b) in self.bits.iter().enumerate() {
            if i%64==0 {
                if i>0 {
                    writeln!(f)?;
                }
                write!(f,"{:5}: ",i)?;
            }
            write!(f,"{}",match b { true => 'X', false => '.' })?;
        }
        writeln!(f)
    }
}

/// Provisional allocations made on behalf of one operation.
/// Unless `commit` is called, every run is given back when the guard goes out of scope.
pub struct PendingAllocation<'a> {
    map: &'a mut AllocationMap,
    runs: Vec<(usize,usize)>,
    committed: bool
}

impl<'a> PendingAllocation<'a> {
    pub fn new(map: &'a mut AllocationMap) -> Self {
        Self {
            map,
            runs: Vec::new(),
            committed: false
        }
    }
    pub fn allocate(&mut self,n: usize) -> Result<usize,Error> {
        let start = self.map.allocate(n)?;
        self.runs.push((start,n));
        Ok(start)
    }
    /// Runs allocated so far as `(start,count)`
    pub fn runs(&self) -> &[(usize,usize)] {
        &self.runs
    }
    pub fn block_count(&self) -> usize {
        self.runs.iter().map(|(_,n)| n).sum()
    }
    pub fn map(&self) -> &AllocationMap {
        self.map
    }
    /// Keep the allocations, returning the runs
    pub fn commit(mut self) -> Vec<(usize,usize)> {
        self.committed = true;
        std::mem::take(&mut self.runs)
    }
}

impl<'a> Drop for PendingAllocation<'a> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        while let Some((start,n)) = self.runs.pop() {
            debug!("rolling back {} blocks at {}",n,start);
            if let Err(e) = self.map.deallocate(start,n) {
                error!("rollback of blocks {}..{} failed: {}",start,start+n,e);
            }
        }
    }
}

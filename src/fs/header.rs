//! File system header, the first 32 bytes of sector 1.

use log::error;
use super::types::*;
use super::pack::{self,Timestamp};
use crate::{Error,SECTORS_PER_BLOCK};

#[derive(Debug,Clone,PartialEq,Eq)]
pub struct FilesystemHeader {
    pub label: [u8;8],
    pub timestamp: [u8;3],
    pub backup_vol: [u8;8],
    pub backup_timestamp: [u8;3],
    pub flags: u8,
    /// heads in the high nibble, drive type in the low nibble
    pub num_heads: u8,
    pub num_cyl: u8,
    pub num_sectors: u8,
    pub dir_sectors_max: u8,
    pub reserved: u16,
    pub free_blocks: u16,
    pub fs_flags: u8
}

impl FilesystemHeader {
    pub fn new() -> Self {
        Self {
            label: [0x20;8],
            timestamp: [0;3],
            backup_vol: [0x20;8],
            backup_timestamp: [0;3],
            flags: 0,
            num_heads: 0,
            num_cyl: 0,
            num_sectors: 0,
            dir_sectors_max: 0,
            reserved: 0,
            free_blocks: 0,
            fs_flags: 0
        }
    }
    pub fn from_bytes(dat: &[u8]) -> Result<Self,Error> {
        if dat.len() < HEADER_SIZE {
            error!("header needs {} bytes, got {}",HEADER_SIZE,dat.len());
            return Err(Error::InvalidArgument("header too short".to_string()));
        }
        let mut ans = Self::new();
        ans.label.copy_from_slice(&dat[0..8]);
        ans.timestamp.copy_from_slice(&dat[8..11]);
        ans.backup_vol.copy_from_slice(&dat[11..19]);
        ans.backup_timestamp.copy_from_slice(&dat[19..22]);
        ans.flags = dat[22];
        ans.num_heads = dat[23];
        ans.num_cyl = dat[24];
        ans.num_sectors = dat[25];
        ans.dir_sectors_max = dat[26];
        ans.reserved = u16::from_le_bytes([dat[27],dat[28]]);
        ans.free_blocks = u16::from_le_bytes([dat[29],dat[30]]);
        ans.fs_flags = dat[31];
        Ok(ans)
    }
    pub fn to_bytes(&self) -> [u8;HEADER_SIZE] {
        let mut ans = [0;HEADER_SIZE];
        ans[0..8].copy_from_slice(&self.label);
        ans[8..11].copy_from_slice(&self.timestamp);
        ans[11..19].copy_from_slice(&self.backup_vol);
        ans[19..22].copy_from_slice(&self.backup_timestamp);
        ans[22] = self.flags;
        ans[23] = self.num_heads;
        ans[24] = self.num_cyl;
        ans[25] = self.num_sectors;
        ans[26] = self.dir_sectors_max;
        ans[27..29].copy_from_slice(&u16::to_le_bytes(self.reserved));
        ans[29..31].copy_from_slice(&u16::to_le_bytes(self.free_blocks));
        ans[31] = self.fs_flags;
        ans
    }
    pub fn label_string(&self) -> String {
        String::from_utf8_lossy(&self.label).trim_end().to_string()
    }
    /// Set the label, which is uppercased and space padded; longer labels are cut at 8
    pub fn set_label(&mut self,label: &str) {
        self.label = [0x20;8];
        for (i,c) in label.to_uppercase().bytes().take(8).enumerate() {
            self.label[i] = c;
        }
    }
    pub fn time(&self) -> Timestamp {
        pack::unpack_time(self.timestamp)
    }
    pub fn heads(&self) -> usize {
        (self.num_heads >> 4) as usize
    }
    pub fn drive_type(&self) -> u8 {
        self.num_heads & 0x0f
    }
    pub fn total_sectors(&self) -> usize {
        self.heads() * self.num_cyl as usize * self.num_sectors as usize
    }
    pub fn total_blocks(&self) -> usize {
        self.total_sectors() / SECTORS_PER_BLOCK
    }
    pub fn additional_am_sectors(&self) -> usize {
        (self.fs_flags & FS_FLAGS_AM_MASK) as usize
    }
    /// Allocation map size implied by the flags, the rest of sector 1 plus the additional sectors
    pub fn am_size_bytes(&self) -> usize {
        AM_BYTES_IN_SECTOR1 + self.additional_am_sectors() * crate::SECTOR_SIZE
    }
    pub fn dir_start_sector(&self) -> usize {
        2 + self.additional_am_sectors()
    }
    pub fn dir_sectors(&self) -> usize {
        self.dir_sectors_max as usize
    }
    pub fn is_write_protected(&self) -> bool {
        self.fs_flags & FS_FLAGS_WP > 0
    }
    pub fn set_write_protect(&mut self,write_protect: bool) {
        match write_protect {
            true => self.fs_flags |= FS_FLAGS_WP,
            false => self.fs_flags &= !FS_FLAGS_WP
        }
    }
}

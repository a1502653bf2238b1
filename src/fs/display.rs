//! ### Display Module
//!
//! Human readable views of a loaded disk: volume information and the directory catalog.
//! These are `Display` wrappers, obtained with `Disk::info` and `Disk::catalog`.

use std::fmt;
use super::disk::Disk;
use super::pack::Timestamp;
use super::types::*;

fn fmt_time(ts: &Timestamp) -> String {
    format!("{:02}/{:02}/{:02} {:02}:{:02}",ts.month,ts.day,ts.full_year()%100,ts.hour,ts.minute)
}

/// Volume information
pub struct DiskInfo<'a> {
    disk: &'a Disk
}

/// Directory listing, one line per live entry
pub struct Catalog<'a> {
    disk: &'a Disk
}

impl Disk {
    pub fn info(&self) -> DiskInfo<'_> {
        DiskInfo { disk: self }
    }
    pub fn catalog(&self) -> Catalog<'_> {
        Catalog { disk: self }
    }
}

impl<'a> fmt::Display for DiskInfo<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let h = self.disk.header();
        let boot = self.disk.boot_sector();
        writeln!(f,"Label:          {}",h.label_string())?;
        writeln!(f,"Created:        {}",fmt_time(&h.time()))?;
        writeln!(f,"Geometry:       {} heads, {} cylinders, {} sectors/track (drive type {})",h.heads(),h.num_cyl,h.num_sectors,h.drive_type())?;
        writeln!(f,"Total blocks:   {}",h.total_blocks())?;
        writeln!(f,"Free blocks:    {} (map says {}, largest run {})",h.free_blocks,self.disk.alloc_map().count_free_blocks(),self.disk.alloc_map().largest_free_run())?;
        writeln!(f,"Map:            {} bytes, {} additional sectors",h.am_size_bytes(),h.additional_am_sectors())?;
        writeln!(f,"Directory:      {} sectors at {}, {} entries",h.dir_sectors(),h.dir_start_sector(),self.disk.directory().len())?;
        writeln!(f,"Write protect:  {}",h.is_write_protected())?;
        let n = usize::min(16,boot.len());
        writeln!(f,"Boot sector:    {}",hex::encode_upper(&boot[0..n]))
    }
}

impl<'a> fmt::Display for Catalog<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f,"{:8} {:8} {:7} {:>6} {:>6} {:>6} {:>5} {:>5} {:14} {:3} {}","NAME","TYPE","FORMAT","RECS","BLOCKS","START","FFD1","FFD2","DATE","OWN","HOST NAME")?;
        let mut count = 0;
        for deb in self.disk.directory() {
            if !deb.is_valid() {
                continue;
            }
            count += 1;
            let (name,typ) = match deb.name_and_type().split_once('.') {
                Some((n,t)) => (n.to_string(),t.to_string()),
                None => (deb.name_and_type(),String::new())
            };
            let fmt_str = match deb.file_type() {
                Some(t) => format!("{}{}",t,attribute_string(deb.attributes())),
                None => format!("{:#04x}",deb.file_format)
            };
            let host_name = deb.to_host_filename().unwrap_or_default();
            writeln!(f,"{:8} {:8} {:7} {:>6} {:>6} {:>6} {:>5} {:>5} {:14} {:3} {}",
                name,typ,fmt_str,deb.record_count,deb.block_count,deb.start_sector,deb.ffd1,deb.ffd2,
                fmt_time(&deb.time()),deb.owner_id,host_name)?;
        }
        writeln!(f)?;
        writeln!(f,"{} files, {} blocks free",count,self.disk.header().free_blocks)
    }
}

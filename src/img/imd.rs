//! ## Support for IMD disk images
//!
//! OASIS disks were mostly 8 inch or 5.25 inch soft sectored media, and the
//! ImageDisk (IMD) container is how most of them survive.
//!
//! An IMD track has a fixed physical sector size, a map of logical sector IDs
//! (in the order they pass the head), optional cylinder and head maps, and one data
//! record per sector.  Each record carries a status byte telling whether the data is
//! present, compressed (uniform fill), deleted, or read with an error.
//!
//! OASIS only needs 256 byte logical sectors.  Tracks of 256 byte sectors map one to
//! one.  Tracks of 128 byte sectors are paired by logical ID: OASIS sector `k` of the
//! track is the sectors with IDs `2k+1` and `2k+2`, wherever they physically sit.
//!
//! Records are expanded when the image is parsed and compressed again when it is
//! serialized, so while we are working with the image it is always expanded.

use std::path::PathBuf;
use chrono;
use num_traits::FromPrimitive;
use num_derive::FromPrimitive;
use log::{warn,info,trace,debug,error};
use super::{SectorIO,ImageType,OpenMode,check_buffer};
use crate::{Error,STDRESULT,SECTOR_SIZE};

pub enum Mode {
    Fm500Kbps = 0,
    Fm300Kbps = 1,
    Fm250Kbps = 2,
    Mfm500Kbps = 3,
    Mfm300Kbps = 4,
    Mfm250Kbps = 5
}

pub const SECTOR_SIZE_BASE: usize = 128;
pub const CYL_MAP_FLAG: u8 = 0x80;
pub const HEAD_MAP_FLAG: u8 = 0x40;
pub const HEAD_MASK: u8 = 0b1111;
/// Size code announcing a per-sector size table, which we do not handle
pub const SIZE_TABLE_CODE: u8 = 0xff;
const MAX_SECTOR_SHIFT: u8 = 6;
const HEADER_LEN: usize = 29;
const TERMINATOR: u8 = 0x1a;

pub fn file_extensions() -> Vec<String> {
    vec!["imd".to_string()]
}

#[derive(FromPrimitive,PartialEq,Eq,Clone,Copy,Debug)]
pub enum SectorData {
    None = 0,
    Normal = 1,
    NormalCompressed = 2,
    NormalDeleted = 3,
    NormalCompressedDeleted = 4,
    Error = 5,
    ErrorCompressed = 6,
    ErrorDeleted = 7,
    ErrorCompressedDeleted = 8
}

impl SectorData {
    fn is_compressed(&self) -> bool {
        match self {
            Self::NormalCompressed | Self::NormalCompressedDeleted | Self::ErrorCompressed | Self::ErrorCompressedDeleted => true,
            _ => false
        }
    }
    /// Data that is missing or was read with an error is not trusted
    fn is_healthy(&self) -> bool {
        match self {
            Self::Normal | Self::NormalCompressed | Self::NormalDeleted | Self::NormalCompressedDeleted => true,
            _ => false
        }
    }
}

pub fn is_slice_uniform(slice: &[u8]) -> bool {
    match slice.first() {
        Some(test) => slice.iter().all(|x| x==test),
        None => true
    }
}

fn truncated(ptr: usize) -> Error {
    error!("unexpected end of IMD data at {}",ptr);
    Error::Inconsistent(format!("IMD data ends early at offset {}",ptr))
}

pub struct Track {
    mode: u8,
    cylinder: u8,
    head: u8,
    sectors: u8,
    sector_shift: u8,
    /// order is geometrical, value is the logical sector ID
    sector_map: Vec<u8>,
    cylinder_map: Vec<u8>,
    head_map: Vec<u8>,
    track_buf: Vec<u8>
}

impl Track {
    fn create(mode: u8,cylinder: u8,head: u8,sectors: u8,sector_shift: u8) -> Self {
        let sec_size = SECTOR_SIZE_BASE << sector_shift;
        let mut track_buf: Vec<u8> = Vec::new();
        for _i in 0..sectors {
            track_buf.push(SectorData::Normal as u8);
            track_buf.append(&mut vec![0;sec_size]);
        }
        Self {
            mode,
            cylinder,
            head,
            sectors,
            sector_shift,
            sector_map: (1..=sectors).collect(),
            cylinder_map: Vec::new(),
            head_map: Vec::new(),
            track_buf
        }
    }
    pub fn cylinder(&self) -> usize {
        self.cylinder as usize
    }
    pub fn head(&self) -> usize {
        (self.head & HEAD_MASK) as usize
    }
    pub fn sector_size(&self) -> usize {
        SECTOR_SIZE_BASE << self.sector_shift
    }
    pub fn sector_map(&self) -> &[u8] {
        &self.sector_map
    }
    /// Number of 256 byte logical sectors this track contributes
    pub fn logical_sectors(&self) -> usize {
        match self.sector_shift {
            0 => self.sectors as usize / 2,
            _ => self.sectors as usize
        }
    }
    /// get the byte count of the sector record given the status code
    fn get_sec_buf_size(&self,sector_code: u8) -> Result<usize,Error> {
        match SectorData::from_u8(sector_code) {
            Some(SectorData::None) => Ok(1),
            Some(x) if x.is_compressed() => Ok(2),
            Some(_) => Ok(1 + self.sector_size()),
            None => {
                error!("cyl {} head {}: unexpected sector data type {}",self.cylinder,self.head(),sector_code);
                Err(Error::Inconsistent(format!("unknown IMD sector record type {}",sector_code)))
            }
        }
    }
    /// offset into the track buffer of the record at position `idx` in the sector map
    fn record_offset(&self,idx: usize) -> Result<usize,Error> {
        let mut ptr = 0;
        for _i in 0..idx {
            ptr += self.get_sec_buf_size(self.track_buf[ptr])?;
        }
        Ok(ptr)
    }
    fn record_status(&self,idx: usize) -> Result<SectorData,Error> {
        let ptr = self.record_offset(idx)?;
        SectorData::from_u8(self.track_buf[ptr]).ok_or(Error::Inconsistent("bad IMD record".to_string()))
    }
    /// position in the sector map of the given logical ID, first match wins
    fn find_id(&self,id: u8) -> Option<usize> {
        self.sector_map.iter().position(|x| *x==id)
    }
    /// compress sectors with uniform data
    fn compress(&self) -> Result<Vec<u8>,Error> {
        let mut ans: Vec<u8> = Vec::new();
        let mut ptr = 0;
        for isec in 0..self.sectors as usize {
            let sec_size = self.get_sec_buf_size(self.track_buf[ptr])?;
            let slice = &self.track_buf[ptr..ptr+sec_size];
            if sec_size > 2 && is_slice_uniform(&slice[1..]) {
                trace!("compressing cyl {} head {} sec {}",self.cylinder,self.head(),self.sector_map[isec]);
                ans.push(slice[0]+1); // adding 1 gives the id of the compressed data
                ans.push(slice[1]); // first element is all we need
            } else {
                ans.extend_from_slice(slice);
            }
            ptr += sec_size;
        }
        Ok(ans)
    }
    /// expand sectors with uniform data
    fn expand(&mut self) -> STDRESULT {
        let mut ans: Vec<u8> = Vec::new();
        let mut ptr = 0;
        for isec in 0..self.sectors as usize {
            let sec_size = self.get_sec_buf_size(self.track_buf[ptr])?;
            let slice = &self.track_buf[ptr..ptr+sec_size];
            if sec_size == 2 {
                trace!("expanding cyl {} head {} sec {}",self.cylinder,self.head(),self.sector_map[isec]);
                ans.push(slice[0]-1); // subtracting 1 gives the id of the expanded data
                ans.append(&mut vec![slice[1];self.sector_size()]);
            } else {
                ans.extend_from_slice(slice);
            }
            ptr += sec_size;
        }
        self.track_buf = ans;
        Ok(())
    }
    fn to_bytes(&self) -> Result<Vec<u8>,Error> {
        Ok([
            vec![self.mode,self.cylinder,self.head,self.sectors,self.sector_shift],
            self.sector_map.clone(),
            self.cylinder_map.clone(),
            self.head_map.clone(),
            self.compress()?
        ].concat())
    }
    /// Parse one track from the start of `bytes`, returning the still compressed
    /// track and the number of bytes consumed.
    fn parse(bytes: &[u8],offset: usize) -> Result<(Self,usize),Error> {
        let check = |min_len: usize| -> STDRESULT {
            match bytes.len() < min_len {
                true => Err(truncated(offset+bytes.len())),
                false => Ok(())
            }
        };
        check(5)?;
        let mut ans = Self {
            mode: bytes[0],
            cylinder: bytes[1],
            head: bytes[2],
            sectors: bytes[3],
            sector_shift: bytes[4],
            sector_map: Vec::new(),
            cylinder_map: Vec::new(),
            head_map: Vec::new(),
            track_buf: Vec::new()
        };
        if ans.sector_shift==SIZE_TABLE_CODE {
            error!("cyl {} head {} uses a sector size table",ans.cylinder,ans.head());
            return Err(Error::Unsupported("IMD sector size tables".to_string()));
        }
        if ans.sector_shift > MAX_SECTOR_SHIFT {
            error!("cyl {} head {} has size code {}",ans.cylinder,ans.head(),ans.sector_shift);
            return Err(Error::Inconsistent(format!("IMD size code {}",ans.sector_shift)));
        }
        debug!("Cylinder {}, Head {}: {} sectors x {} bytes",ans.cylinder,ans.head(),ans.sectors,ans.sector_size());
        let n = ans.sectors as usize;
        let mut ptr: usize = 5;
        check(ptr+n)?;
        ans.sector_map = bytes[ptr..ptr+n].to_vec();
        trace!("sector map {:?}",ans.sector_map);
        ptr += n;
        if ans.head & CYL_MAP_FLAG > 0 {
            check(ptr+n)?;
            ans.cylinder_map = bytes[ptr..ptr+n].to_vec();
            debug!("found cylinder map {:?}",ans.cylinder_map);
            ptr += n;
        }
        if ans.head & HEAD_MAP_FLAG > 0 {
            check(ptr+n)?;
            ans.head_map = bytes[ptr..ptr+n].to_vec();
            debug!("found head map {:?}",ans.head_map);
            ptr += n;
        }
        let start = ptr;
        for _isec in 0..n {
            check(ptr+1)?;
            let sec_size = ans.get_sec_buf_size(bytes[ptr])?;
            check(ptr+sec_size)?;
            ptr += sec_size;
        }
        ans.track_buf = bytes[start..ptr].to_vec();
        Ok((ans,ptr))
    }
    /// Get the data of the sector at map position `idx`, or None if it is missing or bad.
    fn read_record(&self,idx: usize) -> Result<Option<&[u8]>,Error> {
        let ptr = self.record_offset(idx)?;
        let status = self.record_status(idx)?;
        if !status.is_healthy() {
            return Ok(None);
        }
        Ok(Some(&self.track_buf[ptr+1..ptr+1+self.sector_size()]))
    }
    /// Replace the data of the sector at map position `idx`, the record becomes normal.
    fn write_record(&mut self,idx: usize,dat: &[u8]) -> STDRESULT {
        let ptr = self.record_offset(idx)?;
        let old_len = self.get_sec_buf_size(self.track_buf[ptr])?;
        let mut record = vec![SectorData::Normal as u8];
        record.extend_from_slice(&dat[0..self.sector_size()]);
        if old_len != record.len() {
            debug!("cyl {} head {} sec {} was not present, now it is",self.cylinder,self.head(),self.sector_map[idx]);
        }
        self.track_buf.splice(ptr..ptr+old_len,record);
        Ok(())
    }
}

/// An IMD image, which is also a sector stream if it has the OASIS layout.
/// If the image came from a file, writes are persisted to that file upon `flush`,
/// `close`, or when the object is dropped.
pub struct Imd {
    header: Vec<u8>,
    comment: Vec<u8>,
    tracks: Vec<Track>,
    total_sectors: usize,
    write_protect: bool,
    backing: Option<PathBuf>,
    read_only: bool,
    dirty: bool
}

impl Imd {
    /// Create a blank image, every sector is present and zeroed, IDs run from 1.
    /// Sector size must be 128 or 256, for 128 the sector count must be even.
    pub fn create(cylinders: usize,heads: usize,sectors: usize,sector_size: usize) -> Result<Self,Error> {
        let sector_shift = match sector_size {
            128 => 0,
            256 => 1,
            _ => return Err(Error::Unsupported(format!("sector size {}",sector_size)))
        };
        if heads < 1 || heads > 2 || cylinders > 255 || sectors < 1 || sectors > 255 {
            return Err(Error::InvalidArgument(format!("geometry {}x{}x{}",cylinders,heads,sectors)));
        }
        let mode = match sector_shift {
            0 => Mode::Fm500Kbps as u8,
            _ => Mode::Mfm500Kbps as u8
        };
        let now = chrono::Local::now().naive_local();
        let header = "IMD 1.18: ".to_string() + &now.format("%d/%m/%Y %H:%M:%S").to_string();
        let creator_str = "\r\noasis_kit v".to_string() + env!("CARGO_PKG_VERSION");
        debug!("header {}",header);
        let mut tracks: Vec<Track> = Vec::new();
        for cyl in 0..cylinders {
            for head in 0..heads {
                tracks.push(Track::create(mode,cyl as u8,head as u8,sectors as u8,sector_shift));
            }
        }
        let mut ans = Self {
            header: header.as_bytes().to_vec(),
            comment: creator_str.as_bytes().to_vec(),
            tracks,
            total_sectors: 0,
            write_protect: false,
            backing: None,
            read_only: false,
            dirty: false
        };
        ans.total_sectors = ans.validate_layout()?;
        Ok(ans)
    }
    /// Parse an IMD image and verify every track can carry OASIS logical sectors.
    pub fn from_bytes(data: &[u8]) -> Result<Self,Error> {
        if data.len() < HEADER_LEN {
            return Err(Error::Unsupported("not an IMD image".to_string()));
        }
        match data[0..6] {
            [73,77,68,32,48,46] => info!("identified IMD v0.x header"),
            [73,77,68,32,49,46] => info!("identified IMD v1.x header"),
            [73,77,68,32,x,y] => {
                warn!("IMD header found but with unknown major version {}.{}...",x.wrapping_sub(48),y.wrapping_sub(48));
                return Err(Error::Unsupported("IMD version".to_string()));
            }
            _ => return Err(Error::Unsupported("not an IMD image".to_string()))
        }
        let end_of_comment = match data[HEADER_LEN..].iter().position(|x| *x==TERMINATOR) {
            Some(pos) => HEADER_LEN + pos,
            None => return Err(truncated(data.len()))
        };
        let mut ans = Self {
            header: data[0..HEADER_LEN].to_vec(),
            comment: data[HEADER_LEN..end_of_comment].to_vec(),
            tracks: Vec::new(),
            total_sectors: 0,
            write_protect: false,
            backing: None,
            read_only: false,
            dirty: false
        };
        let mut ptr = end_of_comment + 1;
        while ptr < data.len() {
            let (mut trk,len) = Track::parse(&data[ptr..],ptr)?;
            trk.expand()?;
            ans.tracks.push(trk);
            ptr += len;
        }
        ans.total_sectors = ans.validate_layout()?;
        info!("IMD image with {} tracks, {} logical sectors",ans.tracks.len(),ans.total_sectors);
        Ok(ans)
    }
    /// Check each track holds only 128 or 256 byte sectors, and an even number of the former.
    /// Returns the count of logical sectors.
    fn validate_layout(&self) -> Result<usize,Error> {
        let mut total = 0;
        for (i,trk) in self.tracks.iter().enumerate() {
            match trk.sector_size() {
                128 => {
                    if trk.sectors % 2 != 0 {
                        error!("track {} (C:{} H:{}) has an odd count of 128 byte sectors ({})",i,trk.cylinder,trk.head(),trk.sectors);
                        return Err(Error::Unsupported(format!("odd count of 128 byte sectors on track {}",i)));
                    }
                },
                256 => {},
                x => {
                    error!("track {} (C:{} H:{}) has {} byte sectors",i,trk.cylinder,trk.head(),x);
                    return Err(Error::Unsupported(format!("{} byte sectors on track {}",x,i)));
                }
            }
            total += trk.logical_sectors();
        }
        Ok(total)
    }
    pub fn to_bytes(&self) -> Result<Vec<u8>,Error> {
        let mut ans: Vec<u8> = Vec::new();
        ans.extend_from_slice(&self.header);
        ans.extend_from_slice(&self.comment);
        ans.push(TERMINATOR);
        for trk in &self.tracks {
            ans.append(&mut trk.to_bytes()?);
        }
        Ok(ans)
    }
    /// Open an IMD file as a sector stream.  A read only stream is write protected.
    pub fn open(img_path: &str,mode: OpenMode) -> Result<Self,Error> {
        let data = std::fs::read(img_path)?;
        let mut ans = Self::from_bytes(&data)?;
        ans.backing = Some(PathBuf::from(img_path));
        ans.read_only = mode==OpenMode::ReadOnly;
        ans.write_protect = ans.read_only;
        Ok(ans)
    }
    /// Write the image to a file, which becomes the backing file for later writes.
    pub fn save_as(&mut self,img_path: &str) -> STDRESULT {
        std::fs::write(img_path,self.to_bytes()?)?;
        self.backing = Some(PathBuf::from(img_path));
        self.read_only = false;
        self.dirty = false;
        Ok(())
    }
    pub fn comment(&self) -> String {
        String::from_utf8_lossy(&self.comment).trim().to_string()
    }
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }
    pub fn num_heads(&self) -> usize {
        self.tracks.iter().map(|t| t.head()+1).max().unwrap_or(0)
    }
    /// Find the track and intra-track logical offset of a logical sector
    fn locate(&self,lba: usize) -> Option<(usize,usize)> {
        let mut cumulative = 0;
        for (i,trk) in self.tracks.iter().enumerate() {
            let n = trk.logical_sectors();
            if lba < cumulative + n {
                return Some((i,lba-cumulative));
            }
            cumulative += n;
        }
        None
    }
    /// Map positions of the physical sectors holding logical offset `k` of track `itrk`,
    /// one position for 256 byte tracks, two for 128 byte tracks.
    fn physical_positions(&self,itrk: usize,k: usize) -> Result<Vec<usize>,Error> {
        let trk = &self.tracks[itrk];
        let ids = match trk.sector_size() {
            SECTOR_SIZE => vec![trk.sector_map[k]],
            _ => vec![(2*k+1) as u8,(2*k+2) as u8]
        };
        let mut ans = Vec::new();
        for id in ids {
            match trk.find_id(id) {
                Some(idx) => ans.push(idx),
                None => {
                    error!("could not find sector ID {} on track C:{} H:{}",id,trk.cylinder,trk.head());
                    debug!("sector map {:?}",trk.sector_map);
                    return Err(Error::NotFound(format!("sector ID {} on cylinder {} head {}",id,trk.cylinder,trk.head())));
                }
            }
        }
        Ok(ans)
    }
    fn read_logical(&self,lba: usize,buf: &mut [u8]) -> STDRESULT {
        let (itrk,k) = match self.locate(lba) {
            Some(loc) => loc,
            None => return Err(Error::OutOfRange { addr: lba, limit: self.total_sectors })
        };
        let positions = self.physical_positions(itrk,k)?;
        let trk = &self.tracks[itrk];
        let psec_size = trk.sector_size();
        trace!("OASIS sector {} -> C:{} H:{} positions {:?}",lba,trk.cylinder,trk.head(),positions);
        let mut halves = Vec::new();
        for idx in &positions {
            match trk.read_record(*idx)? {
                Some(dat) => halves.push(dat),
                None => {
                    warn!("C:{} H:{} ID:{} is unavailable or bad, OASIS sector {} reads as zeros",trk.cylinder,trk.head(),trk.sector_map[*idx],lba);
                    buf[0..SECTOR_SIZE].fill(0);
                    return Ok(());
                }
            }
        }
        for (i,dat) in halves.iter().enumerate() {
            buf[i*psec_size..(i+1)*psec_size].copy_from_slice(dat);
        }
        Ok(())
    }
    fn write_logical(&mut self,lba: usize,buf: &[u8]) -> STDRESULT {
        let (itrk,k) = match self.locate(lba) {
            Some(loc) => loc,
            None => return Err(Error::OutOfRange { addr: lba, limit: self.total_sectors })
        };
        let positions = self.physical_positions(itrk,k)?;
        let trk = &mut self.tracks[itrk];
        let psec_size = trk.sector_size();
        trace!("OASIS sector {} -> C:{} H:{} positions {:?} (W)",lba,trk.cylinder,trk.head(),positions);
        for (i,idx) in positions.iter().enumerate() {
            trk.write_record(*idx,&buf[i*psec_size..(i+1)*psec_size])?;
        }
        self.dirty = true;
        Ok(())
    }
}

impl SectorIO for Imd {
    fn image_type(&self) -> ImageType {
        ImageType::Imd
    }
    fn total_sectors(&self) -> usize {
        self.total_sectors
    }
    fn read_sectors(&mut self,lba: usize,count: usize,buf: &mut [u8]) -> Result<usize,Error> {
        check_buffer(count,buf.len())?;
        for i in 0..count {
            if lba+i >= self.total_sectors {
                trace!("read stops at end of image, sector {}",lba+i);
                return Ok(i);
            }
            self.read_logical(lba+i,&mut buf[i*SECTOR_SIZE..(i+1)*SECTOR_SIZE])?;
        }
        Ok(count)
    }
    fn write_sectors(&mut self,lba: usize,count: usize,buf: &[u8]) -> Result<usize,Error> {
        check_buffer(count,buf.len())?;
        if self.write_protect {
            error!("attempt to write protected image");
            return Err(Error::WriteProtected);
        }
        if lba+count > self.total_sectors {
            error!("write of {} sectors at {} goes past end of image",count,lba);
            return Err(Error::OutOfRange { addr: lba+count-1, limit: self.total_sectors });
        }
        for i in 0..count {
            self.write_logical(lba+i,&buf[i*SECTOR_SIZE..(i+1)*SECTOR_SIZE])?;
        }
        Ok(count)
    }
    fn is_write_protected(&self) -> bool {
        self.write_protect
    }
    fn set_write_protect(&mut self,write_protect: bool) {
        self.write_protect = write_protect;
    }
    fn flush(&mut self) -> STDRESULT {
        if !self.dirty {
            return Ok(());
        }
        match (&self.backing,self.read_only) {
            (Some(path),false) => {
                debug!("saving IMD to {}",path.display());
                std::fs::write(path,self.to_bytes()?)?;
                self.dirty = false;
            },
            (Some(_),true) => warn!("IMD was opened read only, changes are not saved"),
            (None,_) => trace!("IMD has no backing file")
        }
        Ok(())
    }
}

impl Drop for Imd {
    fn drop(&mut self) {
        if self.dirty && self.backing.is_some() && !self.read_only {
            if let Err(e) = self.flush() {
                error!("could not save IMD: {}",e);
            }
        }
    }
}

//! # Disk Image Module
//!
//! Disk images are represented by objects implementing the `SectorIO` trait.
//! The object type is named for the disk image type that it handles, e.g., `Imd`.
//!
//! ## Logical Sectors
//!
//! Whatever the physical layout, the trait presents a single sequence of 256 byte
//! logical sectors numbered from 0, which is the only addressing the `fs` module uses.
//! The backend is chosen once, when the image is opened.
//!
//! * `raw::Raw` is a flat sector dump, logical sector `n` is at byte offset `n*256`
//! * `imd::Imd` is an ImageDisk container, whose tracks may hold 128 or 256 byte
//!   physical sectors, possibly skewed; two 128 byte sectors make one logical sector
//!
//! ## Transfers
//!
//! Both `read_sectors` and `write_sectors` report how many sectors were actually
//! transferred, which can fall short at the end of the image.  Most callers want all
//! or nothing, and should use `read_exact` and `write_exact`.

pub mod raw;
pub mod imd;

use std::fmt;
use std::io::Read;
use log::{info,error};
use crate::{Error,STDRESULT,SECTOR_SIZE};

/// Access requested when opening an image
#[derive(Debug,Clone,Copy,PartialEq,Eq)]
pub enum OpenMode {
    ReadOnly,
    ReadWrite
}

#[derive(Debug,Clone,Copy,PartialEq,Eq)]
pub enum ImageType {
    Raw,
    Imd
}

impl fmt::Display for ImageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Raw => write!(f,"RAW"),
            Self::Imd => write!(f,"IMD")
        }
    }
}

/// Uniform access to the logical sectors of a disk image.
/// A stream has exactly one owner, there is no internal locking.
pub trait SectorIO {
    fn image_type(&self) -> ImageType;
    /// Number of 256 byte logical sectors in the image
    fn total_sectors(&self) -> usize;
    /// Read `count` sectors starting at `lba` into `buf`, which must hold at least `count*256` bytes.
    /// Returns the number of sectors read, which is short if the image ends first.
    fn read_sectors(&mut self,lba: usize,count: usize,buf: &mut [u8]) -> Result<usize,Error>;
    /// Write `count` sectors starting at `lba` from `buf`, which must hold at least `count*256` bytes.
    /// Returns the number of sectors written.
    fn write_sectors(&mut self,lba: usize,count: usize,buf: &[u8]) -> Result<usize,Error>;
    fn is_write_protected(&self) -> bool;
    fn set_write_protect(&mut self,write_protect: bool);
    /// Make all writes so far permanent in the backing file
    fn flush(&mut self) -> STDRESULT;
    /// Flush and release the stream
    fn close(self: Box<Self>) -> STDRESULT {
        let mut stream = self;
        stream.flush()
    }
}

fn check_buffer(count: usize,len: usize) -> STDRESULT {
    if len < count*SECTOR_SIZE {
        error!("buffer of {} bytes cannot hold {} sectors",len,count);
        return Err(Error::InvalidArgument(format!("buffer too small for {} sectors",count)));
    }
    Ok(())
}

/// Read exactly `count` sectors, a short read is an error
pub fn read_exact(stream: &mut dyn SectorIO,lba: usize,count: usize) -> Result<Vec<u8>,Error> {
    let mut ans = vec![0;count*SECTOR_SIZE];
    let actual = stream.read_sectors(lba,count,&mut ans)?;
    if actual < count {
        error!("read of {} sectors at {} stopped after {}",count,lba,actual);
        return Err(Error::OutOfRange { addr: lba+actual, limit: stream.total_sectors() });
    }
    Ok(ans)
}

/// Write all of `dat`, which must be a whole number of sectors, a short write is an error
pub fn write_exact(stream: &mut dyn SectorIO,lba: usize,dat: &[u8]) -> STDRESULT {
    if dat.len() % SECTOR_SIZE != 0 {
        return Err(Error::InvalidArgument(format!("{} bytes is not a whole number of sectors",dat.len())));
    }
    let count = dat.len() / SECTOR_SIZE;
    let actual = stream.write_sectors(lba,count,dat)?;
    if actual < count {
        error!("write of {} sectors at {} stopped after {}",count,lba,actual);
        return Err(Error::OutOfRange { addr: lba+actual, limit: stream.total_sectors() });
    }
    Ok(())
}

/// Decide the image type from the signature, or failing that the file extension.
pub fn detect_type(img_path: &str) -> Result<ImageType,Error> {
    let mut sig = [0;4];
    let mut f = std::fs::File::open(img_path)?;
    let n = f.read(&mut sig)?;
    if n==4 && &sig==b"IMD " {
        info!("identified IMD signature");
        return Ok(ImageType::Imd);
    }
    if let Some(ext) = std::path::Path::new(img_path).extension() {
        if imd::file_extensions().contains(&ext.to_string_lossy().to_lowercase()) {
            info!("IMD extension but no signature, will try IMD");
            return Ok(ImageType::Imd);
        }
    }
    Ok(ImageType::Raw)
}

/// Open an image file as a sector stream, selecting the backend once and for all.
pub fn open(img_path: &str,mode: OpenMode) -> Result<Box<dyn SectorIO>,Error> {
    match detect_type(img_path)? {
        ImageType::Imd => Ok(Box::new(imd::Imd::open(img_path,mode)?)),
        ImageType::Raw => Ok(Box::new(raw::Raw::open(img_path,mode)?))
    }
}

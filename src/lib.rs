//! # `oasis_kit` library
//!
//! This library manipulates disk images holding the OASIS file system.
//! Manipulations can be done at a level as low as IMD sector records, or as high as
//! whole files moved to and from the host.
//!
//! ## Architecture
//!
//! Disk image operations are built around two layers:
//! * `img::SectorIO` trait objects expose a flat space of 256 byte logical sectors,
//!   whatever the backing store (raw sector dump or IMD container)
//! * `fs::Disk` imposes the OASIS file system on a sector stream
//!
//! The `Disk` is loaded from the stream, and is then a purely in-memory object.
//! Changes to the allocation map, directory, or header are not permanent until
//! they are written back with `Disk::write_system_sectors` (or `save_disk`).
//! File data, on the other hand, goes to the stream as soon as it is written.
//!
//! ## Disk Layout
//!
//! * sector 0 is the boot sector
//! * sector 1 holds the 32 byte file system header followed by the start of the allocation map
//! * zero to seven additional allocation map sectors follow
//! * then the directory, 8 entries per sector
//! * everything else is file data, allocated in 1K blocks

pub mod fs;
pub mod img;

use log::info;

/// Logical sector size in bytes, regardless of the physical sector size
pub const SECTOR_SIZE: usize = 256;
/// Number of logical sectors in an allocation block
pub const SECTORS_PER_BLOCK: usize = 4;
/// Allocation block size in bytes
pub const BLOCK_SIZE: usize = 1024;
/// Largest number of blocks the allocation map can describe
pub const OASIS_MAX_FS_BLOCKS: usize = 16384;
/// Payload bytes in each sector of a sequential file, the rest is the link
pub const SEQ_DATA_PER_SECTOR: usize = 254;
/// Number of directory entries in each directory sector
pub const DIR_ENTRIES_PER_SECTOR: usize = 8;

/// Enumerates errors of the storage engine.  The `Display` trait will print the long message.
#[derive(thiserror::Error,Debug)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("address {addr} out of range, limit is {limit}")]
    OutOfRange { addr: usize, limit: usize },
    #[error("not found: {0}")]
    NotFound(String),
    #[error("inconsistent file system: {0}")]
    Inconsistent(String),
    #[error("i/o error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error("capacity exceeded: {0}")]
    CapacityExceeded(String),
    #[error("image is write protected")]
    WriteProtected
}

pub type STDRESULT = Result<(),Error>;

/// Open a disk image file and load the file system.
/// The stream is returned along with the disk, since both are needed for any file operation.
pub fn open_disk(img_path: &str,mode: img::OpenMode) -> Result<(Box<dyn img::SectorIO>,fs::Disk),Error> {
    let mut stream = img::open(img_path,mode)?;
    let disk = fs::Disk::load(stream.as_mut())?;
    info!("loaded OASIS volume {}",disk.header().label_string());
    Ok((stream,disk))
}

/// Save the system sectors and flush the stream (make changes permanent)
pub fn save_disk(stream: &mut dyn img::SectorIO,disk: &fs::Disk) -> STDRESULT {
    disk.write_system_sectors(stream)?;
    stream.flush()
}

//! # File System Module
//!
//! The OASIS file system imposed on a `SectorIO` stream.
//!
//! * `types`, `pack` - constants, file formats, time stamps
//! * `header`, `deb` - the on-disk records, decoded into host order structs
//! * `alloc` - the block allocation map
//! * `file` - reading and writing the data of one file
//! * `disk` - the loaded volume, with directory level operations and formatting
//! * `display` - listings for humans
//!
//! Addresses are logical sector numbers (LBA) of 256 bytes, and block numbers of 1K.
//! Block `b` begins at sector `4*b`.

pub mod types;
pub mod pack;
pub mod alloc;
pub mod header;
pub mod deb;
pub mod file;
pub mod disk;
pub mod display;

pub use disk::{Disk,FormatOptions,CheckReport};

//! ## Support for raw sector images
//!
//! The image is nothing but the logical sectors in order.  Every write goes straight
//! to the file, so another handle opened afterward sees the committed bytes.

use std::io::{Read,Write,Seek,SeekFrom};
use std::path::PathBuf;
use log::{warn,info,trace,debug,error};
use super::{SectorIO,ImageType,OpenMode,check_buffer};
use crate::{Error,STDRESULT,SECTOR_SIZE};

pub fn file_extensions() -> Vec<String> {
    vec!["img".to_string(),"dsk".to_string(),"raw".to_string()]
}

pub struct Raw {
    path: PathBuf,
    file: std::fs::File,
    total_sectors: usize,
    write_protect: bool
}

impl Raw {
    pub fn open(img_path: &str,mode: OpenMode) -> Result<Self,Error> {
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(mode==OpenMode::ReadWrite)
            .open(img_path)?;
        let byte_count = file.metadata()?.len() as usize;
        if byte_count % SECTOR_SIZE != 0 {
            warn!("image size {} is not a multiple of {}, trailing bytes ignored",byte_count,SECTOR_SIZE);
        }
        info!("raw image with {} sectors",byte_count / SECTOR_SIZE);
        Ok(Self {
            path: PathBuf::from(img_path),
            file,
            total_sectors: byte_count / SECTOR_SIZE,
            write_protect: mode==OpenMode::ReadOnly
        })
    }
    /// Create a zeroed image with the given number of sectors, replacing any existing file
    pub fn create(img_path: &str,sectors: usize) -> Result<Self,Error> {
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(img_path)?;
        file.set_len((sectors*SECTOR_SIZE) as u64)?;
        debug!("created raw image {} with {} sectors",img_path,sectors);
        Ok(Self {
            path: PathBuf::from(img_path),
            file,
            total_sectors: sectors,
            write_protect: false
        })
    }
    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

impl SectorIO for Raw {
    fn image_type(&self) -> ImageType {
        ImageType::Raw
    }
    fn total_sectors(&self) -> usize {
        self.total_sectors
    }
    fn read_sectors(&mut self,lba: usize,count: usize,buf: &mut [u8]) -> Result<usize,Error> {
        check_buffer(count,buf.len())?;
        if count==0 || lba >= self.total_sectors {
            trace!("read at {} is past the end of the image",lba);
            return Ok(0);
        }
        let actual = usize::min(count,self.total_sectors-lba);
        if actual < count {
            debug!("read of {} sectors at {} clamped to {}",count,lba,actual);
        }
        self.file.seek(SeekFrom::Start((lba*SECTOR_SIZE) as u64))?;
        self.file.read_exact(&mut buf[0..actual*SECTOR_SIZE])?;
        trace!("read {} sectors at {}",actual,lba);
        Ok(actual)
    }
    fn write_sectors(&mut self,lba: usize,count: usize,buf: &[u8]) -> Result<usize,Error> {
        check_buffer(count,buf.len())?;
        if self.write_protect {
            error!("attempt to write protected image");
            return Err(Error::WriteProtected);
        }
        if count==0 {
            return Ok(0);
        }
        self.file.seek(SeekFrom::Start((lba*SECTOR_SIZE) as u64))?;
        self.file.write_all(&buf[0..count*SECTOR_SIZE])?;
        self.file.flush()?;
        if lba+count > self.total_sectors {
            debug!("image grows to {} sectors",lba+count);
            self.total_sectors = lba+count;
        }
        trace!("wrote {} sectors at {}",count,lba);
        Ok(count)
    }
    fn is_write_protected(&self) -> bool {
        self.write_protect
    }
    fn set_write_protect(&mut self,write_protect: bool) {
        self.write_protect = write_protect;
    }
    fn flush(&mut self) -> STDRESULT {
        self.file.flush()?;
        if !self.write_protect {
            self.file.sync_data()?;
        }
        Ok(())
    }
}

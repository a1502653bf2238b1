//! # Directory entry blocks
//!
//! A DEB is the 32 byte directory record of one file.  The in-memory `DirEntry` holds
//! host order values; conversion to the little endian disk form happens only in
//! `from_bytes` and `to_bytes`.
//!
//! ## Host file names
//!
//! Files moved to the host carry their OASIS metadata in the name:
//! `NAME.TYPE_<T><ATTRS>_<fields>`, where `T` is the format character and `ATTRS`
//! is any of `R`, `W`, `D`.  The fields depend on the format:
//! * `S` - optional longest record, `NAME.TYPE_S` if it is 0 and there are no attributes
//! * `D`, `R` - record length
//! * `A` - record length and 4 hex digit load address
//! * `I`, `K` - record length (at most 511) and key length (at most 127)
//!
//! A name with no suffix is taken to be sequential.

use regex::Regex;
use log::{trace,error};
use num_traits::FromPrimitive;
use super::types::*;
use super::pack::{self,Timestamp};
use crate::Error;

#[derive(Debug,Clone,PartialEq,Eq)]
pub struct DirEntry {
    pub file_format: u8,
    pub file_name: [u8;8],
    pub file_type: [u8;8],
    pub record_count: u16,
    pub block_count: u16,
    pub start_sector: u16,
    /// format dependent: record length, longest record, or key and record length
    pub ffd1: u16,
    pub timestamp: [u8;3],
    pub owner_id: u8,
    pub shared_from_owner_id: u8,
    /// format dependent: last sector, program length, load address, or allocated size
    pub ffd2: u16
}

fn invalid_name(host_name: &str,why: &str) -> Error {
    error!("{} in host file name `{}`",why,host_name);
    Error::InvalidArgument(format!("{} in `{}`",why,host_name))
}

/// Check and space pad one part of a name, which is uppercased
fn pad_part(part: &str,max_len: usize,host_name: &str) -> Result<[u8;8],Error> {
    if part.len() > max_len {
        return Err(invalid_name(host_name,"name part too long"));
    }
    if !part.is_ascii() {
        return Err(invalid_name(host_name,"non-ASCII character"));
    }
    let mut ans = [0x20;8];
    for (i,c) in part.to_uppercase().bytes().enumerate() {
        ans[i] = c;
    }
    Ok(ans)
}

/// Parse `NAME.TYPE` into padded name and type fields.
/// The type may be empty, the name may not.
pub fn parse_name_type(s: &str) -> Result<([u8;8],[u8;8]),Error> {
    let (name,typ) = match s.split_once('.') {
        Some((n,t)) => (n,t),
        None => (s,"")
    };
    if name.len()==0 {
        return Err(invalid_name(s,"empty name"));
    }
    if typ.contains('.') {
        return Err(invalid_name(s,"more than one `.`"));
    }
    Ok((pad_part(name,FNAME_LEN,s)?,pad_part(typ,FTYPE_LEN,s)?))
}

fn parse_number(s: &str,radix: u32,host_name: &str) -> Result<u16,Error> {
    match u32::from_str_radix(s,radix) {
        Ok(val) if val <= u16::MAX as u32 => Ok(val as u16),
        _ => Err(invalid_name(host_name,"bad numeric field"))
    }
}

impl DirEntry {
    /// An unused directory slot
    pub fn empty() -> Self {
        Self {
            file_format: FILE_FORMAT_EMPTY,
            file_name: [0;8],
            file_type: [0;8],
            record_count: 0,
            block_count: 0,
            start_sector: 0,
            ffd1: 0,
            timestamp: [0;3],
            owner_id: 0,
            shared_from_owner_id: 0,
            ffd2: 0
        }
    }
    pub fn from_bytes(dat: &[u8]) -> Result<Self,Error> {
        if dat.len() < DEB_SIZE {
            error!("directory entry needs {} bytes, got {}",DEB_SIZE,dat.len());
            return Err(Error::InvalidArgument("directory entry too short".to_string()));
        }
        let le16 = |i: usize| u16::from_le_bytes([dat[i],dat[i+1]]);
        let mut ans = Self::empty();
        ans.file_format = dat[0];
        ans.file_name.copy_from_slice(&dat[1..9]);
        ans.file_type.copy_from_slice(&dat[9..17]);
        ans.record_count = le16(17);
        ans.block_count = le16(19);
        ans.start_sector = le16(21);
        ans.ffd1 = le16(23);
        ans.timestamp.copy_from_slice(&dat[25..28]);
        ans.owner_id = dat[28];
        ans.shared_from_owner_id = dat[29];
        ans.ffd2 = le16(30);
        Ok(ans)
    }
    pub fn to_bytes(&self) -> [u8;DEB_SIZE] {
        let mut ans = [0;DEB_SIZE];
        ans[0] = self.file_format;
        ans[1..9].copy_from_slice(&self.file_name);
        ans[9..17].copy_from_slice(&self.file_type);
        ans[17..19].copy_from_slice(&u16::to_le_bytes(self.record_count));
        ans[19..21].copy_from_slice(&u16::to_le_bytes(self.block_count));
        ans[21..23].copy_from_slice(&u16::to_le_bytes(self.start_sector));
        ans[23..25].copy_from_slice(&u16::to_le_bytes(self.ffd1));
        ans[25..28].copy_from_slice(&self.timestamp);
        ans[28] = self.owner_id;
        ans[29] = self.shared_from_owner_id;
        ans[30..32].copy_from_slice(&u16::to_le_bytes(self.ffd2));
        ans
    }
    pub fn is_empty(&self) -> bool {
        self.file_format==FILE_FORMAT_EMPTY
    }
    pub fn is_deleted(&self) -> bool {
        self.file_format==FILE_FORMAT_DELETED
    }
    /// Live entry of a known format
    pub fn is_valid(&self) -> bool {
        !self.is_empty() && !self.is_deleted() && self.file_type().is_some()
    }
    pub fn file_type(&self) -> Option<FileFormat> {
        FileFormat::from_u8(self.file_format & FILE_FORMAT_MASK)
    }
    pub fn attributes(&self) -> u8 {
        self.file_format & FILE_ATTRIBUTE_MASK
    }
    pub fn time(&self) -> Timestamp {
        pack::unpack_time(self.timestamp)
    }
    pub fn set_time(&mut self,time: Option<chrono::NaiveDateTime>) {
        self.timestamp = pack::pack_naive(time);
    }
    /// `NAME.TYPE` with padding removed
    pub fn name_and_type(&self) -> String {
        let name = String::from_utf8_lossy(&self.file_name);
        let typ = String::from_utf8_lossy(&self.file_type);
        format!("{}.{}",name.trim(),typ.trim())
    }
    /// Does this live entry have the given `NAME.TYPE`, case insensitive
    pub fn is_named(&self,name_type: &str) -> bool {
        match parse_name_type(name_type) {
            Ok((name,typ)) => self.is_valid() && self.file_name==name && self.file_type==typ,
            Err(_) => false
        }
    }
    /// Owner selector match, `None` matches every owner
    pub fn is_owned_by(&self,owner: Option<u8>) -> bool {
        match owner {
            Some(id) => self.owner_id==id,
            None => true
        }
    }
    pub fn rename(&mut self,name_type: &str) -> Result<(),Error> {
        let (name,typ) = parse_name_type(name_type)?;
        self.file_name = name;
        self.file_type = typ;
        Ok(())
    }
    /// Turn this into a deleted slot; time stamp and owner are kept
    pub fn mark_deleted(&mut self) {
        self.file_format = FILE_FORMAT_DELETED;
        self.file_name = [0x20;8];
        self.file_type = [0x20;8];
        self.record_count = 0;
        self.block_count = 0;
        self.start_sector = 0;
        self.ffd1 = 0;
        self.ffd2 = 0;
    }
    /// Key length of an indexed or keyed file
    pub fn key_len(&self) -> u16 {
        self.ffd1 >> INDEXED_KEY_SHIFT
    }
    /// Record length, as stored for every format except sequential
    pub fn record_len(&self) -> u16 {
        match self.file_type() {
            Some(FileFormat::Indexed) | Some(FileFormat::Keyed) => self.ffd1 & INDEXED_RECLEN_MASK,
            _ => self.ffd1
        }
    }
    /// Project this entry onto a host file name that carries its metadata
    pub fn to_host_filename(&self) -> Result<String,Error> {
        let typ = match (self.is_valid(),self.file_type()) {
            (true,Some(t)) => t,
            _ => return Err(Error::InvalidArgument(format!("entry with format {:#04x} has no host name",self.file_format)))
        };
        let attr = attribute_string(self.attributes());
        let c = typ.type_char();
        let suffix = match typ {
            FileFormat::Sequential => match self.ffd1==0 && attr.len()==0 {
                true => format!("_{}",c),
                false => format!("_{}{}_{}",c,attr,self.ffd1)
            },
            FileFormat::Direct | FileFormat::Relocatable => format!("_{}{}_{}",c,attr,self.ffd1),
            FileFormat::Absolute => format!("_{}{}_{}_{:04X}",c,attr,self.ffd1,self.ffd2),
            FileFormat::Indexed | FileFormat::Keyed => format!("_{}{}_{}_{}",c,attr,self.record_len(),self.key_len())
        };
        Ok(self.name_and_type() + &suffix)
    }
    /// Parse a host file name into a new entry.  Only the name, type, format, and
    /// `ffd1` are set, plus `ffd2` for absolute files; the rest depends on the data.
    pub fn from_host_filename(host_name: &str) -> Result<Self,Error> {
        if host_name=="." {
            return Err(invalid_name(host_name,"no name"));
        }
        let (name_type,meta) = match host_name.split_once('_') {
            Some((nt,m)) => (nt,m),
            None => (host_name,"")
        };
        let (name,typ) = parse_name_type(name_type)?;
        let mut ans = Self::empty();
        ans.file_name = name;
        ans.file_type = typ;
        if meta.len()==0 {
            ans.file_format = FileFormat::Sequential as u8;
            return Ok(ans);
        }
        let patt = Regex::new(r"^([A-Za-z])([^_]*)(?:_(.*))?$").expect("regex parsing error");
        let caps = match patt.captures(meta) {
            Some(c) => c,
            None => return Err(invalid_name(host_name,"bad metadata suffix"))
        };
        let type_char = caps[1].chars().next().unwrap_or('?');
        let mut attrib = 0;
        for c in caps[2].chars() {
            attrib |= match c.to_ascii_uppercase() {
                'R' => ATTR_READ_PROTECTED,
                'W' => ATTR_WRITE_PROTECTED,
                'D' => ATTR_DELETE_PROTECTED,
                _ => return Err(invalid_name(host_name,"bad attribute character"))
            };
        }
        let fields = caps.get(3).map_or("",|m| m.as_str());
        let typ = match FileFormat::from_type_char(type_char) {
            Some(t) => t,
            None => return Err(invalid_name(host_name,"unknown format character"))
        };
        trace!("host name {} has format {}, attributes {:#04x}, fields `{}`",host_name,typ,attrib,fields);
        let one_field = Regex::new(r"^(\d+)$").expect("regex parsing error");
        let two_fields = Regex::new(r"^(\d+)_([0-9A-Fa-f]+)$").expect("regex parsing error");
        match typ {
            FileFormat::Sequential => {
                if fields.len() > 0 {
                    match one_field.captures(fields) {
                        Some(c) => ans.ffd1 = parse_number(&c[1],10,host_name)?,
                        None => return Err(invalid_name(host_name,"bad record length"))
                    }
                }
            },
            FileFormat::Direct | FileFormat::Relocatable => {
                match one_field.captures(fields) {
                    Some(c) => ans.ffd1 = parse_number(&c[1],10,host_name)?,
                    None => return Err(invalid_name(host_name,"missing or bad record length"))
                }
                if typ==FileFormat::Direct && ans.ffd1==0 {
                    return Err(invalid_name(host_name,"direct file with record length 0"));
                }
            },
            FileFormat::Absolute => {
                match two_fields.captures(fields) {
                    Some(c) => {
                        ans.ffd1 = parse_number(&c[1],10,host_name)?;
                        ans.ffd2 = parse_number(&c[2],16,host_name)?;
                    },
                    None => return Err(invalid_name(host_name,"missing or bad record length or load address"))
                }
            },
            FileFormat::Indexed | FileFormat::Keyed => {
                match two_fields.captures(fields) {
                    Some(c) if c[2].chars().all(|x| x.is_ascii_digit()) => {
                        let rec = parse_number(&c[1],10,host_name)?;
                        let key = parse_number(&c[2],10,host_name)?;
                        if rec > INDEXED_RECLEN_MASK || key > MAX_INDEXED_KEY_LEN {
                            return Err(invalid_name(host_name,"record or key length out of range"));
                        }
                        ans.ffd1 = (key << INDEXED_KEY_SHIFT) | rec;
                    },
                    _ => return Err(invalid_name(host_name,"missing or bad record or key length"))
                }
            }
        }
        ans.file_format = typ as u8 | attrib;
        Ok(ans)
    }
}

use std::fmt;
use num_derive::FromPrimitive;

/// Size of a directory entry block in bytes
pub const DEB_SIZE: usize = 32;
/// Size of the file system header at the start of sector 1
pub const HEADER_SIZE: usize = 32;
/// Allocation map bytes that fit in sector 1 after the header
pub const AM_BYTES_IN_SECTOR1: usize = crate::SECTOR_SIZE - HEADER_SIZE;
/// Most additional allocation map sectors `fs_flags` can announce
pub const MAX_ADDITIONAL_AM_SECTORS: usize = 7;
pub const FNAME_LEN: usize = 8;
pub const FTYPE_LEN: usize = 8;
/// Largest block count a directory entry can record
pub const MAX_FILE_BLOCKS: usize = 65535;
/// Longest sequential chain we will follow before calling it cyclic
pub const MAX_CHAIN_SECTORS: usize = 65535;

/// Status byte of a directory slot never used
pub const FILE_FORMAT_EMPTY: u8 = 0x00;
/// Status byte of a directory slot whose file was erased
pub const FILE_FORMAT_DELETED: u8 = 0xff;
/// Bits of the format byte selecting the file type
pub const FILE_FORMAT_MASK: u8 = 0x1f;
/// Bits of the format byte holding protection attributes
pub const FILE_ATTRIBUTE_MASK: u8 = 0xe0;
pub const ATTR_READ_PROTECTED: u8 = 0x20;
pub const ATTR_WRITE_PROTECTED: u8 = 0x40;
pub const ATTR_DELETE_PROTECTED: u8 = 0x80;

/// Low bits of `fs_flags` count the allocation map sectors after sector 1
pub const FS_FLAGS_AM_MASK: u8 = 0x07;
/// Software write protect bit of `fs_flags`
pub const FS_FLAGS_WP: u8 = 0x80;

/// For indexed and keyed files `ffd1` holds the key length above the record length
pub const INDEXED_RECLEN_MASK: u16 = 0x1ff;
pub const INDEXED_KEY_SHIFT: u16 = 9;
pub const MAX_INDEXED_KEY_LEN: u16 = 0x7f;

#[derive(FromPrimitive,PartialEq,Eq,Clone,Copy,Debug)]
pub enum FileFormat {
    Relocatable = 0x01,
    Absolute = 0x02,
    Sequential = 0x04,
    Direct = 0x08,
    Indexed = 0x10,
    Keyed = 0x18
}

impl FileFormat {
    /// Character used in host file names and listings
    pub fn type_char(&self) -> char {
        match self {
            Self::Relocatable => 'R',
            Self::Absolute => 'A',
            Self::Sequential => 'S',
            Self::Direct => 'D',
            Self::Indexed => 'I',
            Self::Keyed => 'K'
        }
    }
    pub fn from_type_char(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'R' => Some(Self::Relocatable),
            'A' => Some(Self::Absolute),
            'S' => Some(Self::Sequential),
            'D' => Some(Self::Direct),
            'I' => Some(Self::Indexed),
            'K' => Some(Self::Keyed),
            _ => None
        }
    }
    /// Everything except sequential files occupies a single run of blocks
    pub fn is_contiguous(&self) -> bool {
        *self != Self::Sequential
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Relocatable => write!(f,"RELOC"),
            Self::Absolute => write!(f,"ABS"),
            Self::Sequential => write!(f,"SEQ"),
            Self::Direct => write!(f,"DIR"),
            Self::Indexed => write!(f,"INDEXED"),
            Self::Keyed => write!(f,"KEYED")
        }
    }
}

/// Render attribute bits as the letters `R`, `W`, `D` in that order
pub fn attribute_string(attrib: u8) -> String {
    let mut ans = String::new();
    if attrib & ATTR_READ_PROTECTED > 0 {
        ans.push('R');
    }
    if attrib & ATTR_WRITE_PROTECTED > 0 {
        ans.push('W');
    }
    if attrib & ATTR_DELETE_PROTECTED > 0 {
        ans.push('D');
    }
    ans
}

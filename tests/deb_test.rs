// test of directory entry blocks and host file names
use oasis_kit::fs::deb::{DirEntry,parse_name_type};
use oasis_kit::fs::types::*;
use oasis_kit::fs::pack;
use oasis_kit::Error;

fn check_law(host_name: &str) {
    let deb = DirEntry::from_host_filename(host_name).expect("parse failed");
    let projected = deb.to_host_filename().expect("projection failed");
    let back = DirEntry::from_host_filename(&projected).expect("reparse failed");
    assert_eq!(back.file_name,deb.file_name);
    assert_eq!(back.file_type,deb.file_type);
    assert_eq!(back.file_format,deb.file_format);
    assert_eq!(back.ffd1,deb.ffd1);
}

fn expect_invalid(host_name: &str) {
    match DirEntry::from_host_filename(host_name) {
        Err(Error::InvalidArgument(_)) => {},
        Ok(deb) => panic!("{} gave {:?}",host_name,deb),
        Err(e) => panic!("{} gave {}",host_name,e)
    }
}

#[test]
fn host_names_for_every_format() {
    check_law("NOTES.TXT");
    check_law("NOTES.TXT_S");
    check_law("LOG.DAT_SW_132");
    check_law("MASTER.DAT_D_80");
    check_law("PROG.REL_RDR_512");
    check_law("BOOT.SYS_A_256_E000");
    check_law("INDEX.IDX_I_200_12");
    check_law("KEYS.KEY_KRWD_511_127");
}

#[test]
fn host_name_fields() {
    let deb = DirEntry::from_host_filename("keys.key_KD_100_20").expect("parse failed");
    assert_eq!(&deb.file_name,b"KEYS    ");
    assert_eq!(&deb.file_type,b"KEY     ");
    assert_eq!(deb.file_type(),Some(FileFormat::Keyed));
    assert_eq!(deb.attributes(),ATTR_DELETE_PROTECTED);
    assert_eq!(deb.ffd1,(20<<9) | 100);
    assert_eq!(deb.record_len(),100);
    assert_eq!(deb.key_len(),20);
    assert_eq!(deb.to_host_filename().expect("projection failed"),"KEYS.KEY_KD_100_20");

    let deb = DirEntry::from_host_filename("BOOT.SYS_A_256_e000").expect("parse failed");
    assert_eq!(deb.ffd2,0xe000);
    assert_eq!(deb.to_host_filename().expect("projection failed"),"BOOT.SYS_A_256_E000");

    let deb = DirEntry::from_host_filename("README").expect("parse failed");
    assert_eq!(deb.file_type(),Some(FileFormat::Sequential));
    assert_eq!(deb.ffd1,0);
    assert_eq!(deb.name_and_type(),"README.");
    assert_eq!(deb.to_host_filename().expect("projection failed"),"README._S");
}

#[test]
fn bad_host_names() {
    expect_invalid(".");
    expect_invalid(".TXT");
    expect_invalid("TOOLONGNAME.TXT");
    expect_invalid("A.TOOLONGTYPE");
    expect_invalid("A.B.C");
    expect_invalid("A.B_X_80");
    expect_invalid("A.B_DQ_80");
    expect_invalid("A.B_D");
    expect_invalid("A.B_D_0");
    expect_invalid("A.B_D_abc");
    expect_invalid("A.B_R_70000");
    expect_invalid("A.B_A_80");
    expect_invalid("A.B_A_80_10000");
    expect_invalid("A.B_I_512_10");
    expect_invalid("A.B_K_100_128");
    expect_invalid("A.B_K_100");
}

#[test]
fn disk_form() {
    let mut deb = DirEntry::from_host_filename("MASTER.DAT_D_80").expect("parse failed");
    deb.record_count = 0x0102;
    deb.block_count = 3;
    deb.start_sector = 0x1234;
    deb.timestamp = [0xcc,0xbb,0x6d];
    deb.owner_id = 7;
    deb.ffd2 = 0xbeef;
    let bytes = deb.to_bytes();
    assert_eq!(bytes[0],0x08);
    assert_eq!(&bytes[1..9],b"MASTER  ");
    assert_eq!(&bytes[17..19],&[0x02,0x01]);
    assert_eq!(&bytes[21..23],&[0x34,0x12]);
    assert_eq!(&bytes[23..25],&[80,0]);
    assert_eq!(&bytes[30..32],&[0xef,0xbe]);
    assert_eq!(DirEntry::from_bytes(&bytes).expect("decode failed"),deb);
    let ts = deb.time();
    assert_eq!((ts.month,ts.day,ts.full_year(),ts.hour,ts.minute),(12,25,1984,13,45));
}

#[test]
fn validity() {
    let mut deb = DirEntry::empty();
    assert!(deb.is_empty());
    assert!(!deb.is_valid());
    deb.file_format = 0x03;
    assert!(!deb.is_valid());
    deb.file_format = FileFormat::Direct as u8 | ATTR_WRITE_PROTECTED;
    assert!(deb.is_valid());
    deb.mark_deleted();
    assert!(deb.is_deleted());
    assert!(!deb.is_valid());
    assert!(deb.to_host_filename().is_err());
}

#[test]
fn rename_keeps_time() {
    let mut deb = DirEntry::from_host_filename("OLD.TXT").expect("parse failed");
    deb.timestamp = pack::pack_time(&pack::Timestamp { month: 3, day: 4, year: 5, hour: 6, minute: 7 });
    let before = deb.timestamp;
    deb.rename("new.doc").expect("rename failed");
    assert_eq!(deb.name_and_type(),"NEW.DOC");
    assert!(deb.is_named("New.Doc"));
    assert_eq!(deb.timestamp,before);
    assert!(deb.rename("").is_err());
    let (name,typ) = parse_name_type("X").expect("parse failed");
    assert_eq!(&name,b"X       ");
    assert_eq!(&typ,b"        ");
}

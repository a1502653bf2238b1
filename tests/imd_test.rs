// test of the IMD sector stream
use oasis_kit::img::{self,SectorIO,OpenMode,ImageType};
use oasis_kit::img::imd::Imd;
use oasis_kit::Error;

const HEADER: &[u8] = b"IMD 1.18: 01/01/2020 00:00:00";

fn image_start() -> Vec<u8> {
    let mut ans = HEADER.to_vec();
    ans.extend_from_slice(b"\r\ntest image");
    ans.push(0x1a);
    ans
}

/// Append a track of 128 byte sectors with the given IDs, sector `id` is filled with `id`,
/// except IDs in `missing`, which are recorded as unavailable.
fn push_track_128(img: &mut Vec<u8>,cyl: u8,head: u8,ids: &[u8],missing: &[u8]) {
    img.extend_from_slice(&[3,cyl,head,ids.len() as u8,0]);
    img.extend_from_slice(ids);
    for id in ids {
        if missing.contains(id) {
            img.push(0);
        } else {
            img.push(1);
            img.extend_from_slice(&[*id;128]);
        }
    }
}

/// Append a track of 256 byte sectors, every record compressed, sector `id` filled with `0x10+id`
fn push_track_256(img: &mut Vec<u8>,cyl: u8,head: u8,ids: &[u8]) {
    img.extend_from_slice(&[3,cyl,head,ids.len() as u8,1]);
    img.extend_from_slice(ids);
    for id in ids {
        img.push(2);
        img.push(0x10+id);
    }
}

fn skewed_image() -> Vec<u8> {
    let mut ans = image_start();
    push_track_128(&mut ans,0,0,&[1,5,2,6,3,7,4,8],&[3]);
    push_track_256(&mut ans,0,1,&[2,1,3]);
    ans
}

#[test]
fn sectors_paired_by_id() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut imd = Imd::from_bytes(&skewed_image()).expect("parse failed");
    assert_eq!(imd.total_sectors(),7);
    assert_eq!(imd.comment(),"test image");
    let buf = img::read_exact(&mut imd,0,1).expect("read failed");
    assert_eq!(buf[0..128],[1;128]);
    assert_eq!(buf[128..256],[2;128]);
    let buf = img::read_exact(&mut imd,3,1).expect("read failed");
    assert_eq!(buf[0..128],[7;128]);
    assert_eq!(buf[128..256],[8;128]);
}

#[test]
fn unavailable_sector_reads_zeros() {
    let mut imd = Imd::from_bytes(&skewed_image()).expect("parse failed");
    let buf = img::read_exact(&mut imd,0,4).expect("read failed");
    assert_eq!(buf[256..512],[0;256]);
    assert_eq!(buf[512..640],[5;128]);
    assert_eq!(buf[640..768],[6;128]);
}

#[test]
fn error_sectors_read_zeros() {
    let mut dat = image_start();
    dat.extend_from_slice(&[3,0,0,6,1]);
    dat.extend_from_slice(&[1,2,3,4,5,6]);
    // normal, deleted, then the four error types
    dat.push(1);
    dat.extend_from_slice(&[0x21;256]);
    dat.extend_from_slice(&[4,0x22]);
    dat.push(5);
    dat.extend_from_slice(&[0x23;256]);
    dat.extend_from_slice(&[6,0x24]);
    dat.push(7);
    dat.extend_from_slice(&[0x25;256]);
    dat.extend_from_slice(&[8,0x26]);
    let mut imd = Imd::from_bytes(&dat).expect("parse failed");
    assert_eq!(imd.total_sectors(),6);
    let buf = img::read_exact(&mut imd,0,6).expect("read failed");
    assert_eq!(buf[0..256],[0x21;256]);
    assert_eq!(buf[256..512],[0x22;256]);
    for i in 2..6 {
        assert_eq!(buf[i*256..(i+1)*256],[0;256],"sector {}",i);
    }
    // a write makes the record good
    img::write_exact(&mut imd,2,&[0x33;256]).expect("write failed");
    assert_eq!(img::read_exact(&mut imd,2,1).expect("read failed"),vec![0x33;256]);
}

#[test]
fn large_sectors_in_physical_order() {
    let mut imd = Imd::from_bytes(&skewed_image()).expect("parse failed");
    let buf = img::read_exact(&mut imd,4,3).expect("read failed");
    assert_eq!(buf[0..256],[0x12;256]);
    assert_eq!(buf[256..512],[0x11;256]);
    assert_eq!(buf[512..768],[0x13;256]);
}

#[test]
fn short_read_at_end() {
    let mut imd = Imd::from_bytes(&skewed_image()).expect("parse failed");
    let mut buf = vec![0;4*256];
    assert_eq!(imd.read_sectors(5,4,&mut buf).expect("read failed"),2);
    match img::read_exact(&mut imd,5,4) {
        Err(Error::OutOfRange { .. }) => {},
        _ => panic!("expected out of range")
    }
}

#[test]
fn write_then_reopen() {
    let dir = tempfile::tempdir().expect("could not create temp dir");
    let path = dir.path().join("skewed.imd");
    let path_str = path.to_str().expect("bad path");
    std::fs::write(&path,skewed_image()).expect("could not write image");
    let mut dat = vec![0xaa;128];
    dat.append(&mut vec![0xbb;128]);
    {
        let mut stream = img::open(path_str,OpenMode::ReadWrite).expect("open failed");
        assert_eq!(stream.image_type(),ImageType::Imd);
        // logical sector 1 holds the unavailable ID 3
        img::write_exact(stream.as_mut(),1,&dat).expect("write failed");
        img::write_exact(stream.as_mut(),6,&vec![0x55;256]).expect("write failed");
        stream.close().expect("close failed");
    }
    let mut stream = img::open(path_str,OpenMode::ReadOnly).expect("reopen failed");
    assert_eq!(img::read_exact(stream.as_mut(),1,1).expect("read failed"),dat);
    assert_eq!(img::read_exact(stream.as_mut(),6,1).expect("read failed"),vec![0x55;256]);
    assert_eq!(img::read_exact(stream.as_mut(),0,1).expect("read failed")[0..128],[1;128]);
    let mut check = Imd::from_bytes(&std::fs::read(&path).expect("read failed")).expect("parse failed");
    assert_eq!(check.tracks()[0].sector_map(),&[1,5,2,6,3,7,4,8]);
    assert_eq!(img::read_exact(&mut check,2,1).expect("read failed")[0..128],[5;128]);
}

#[test]
fn write_protect() {
    let mut imd = Imd::from_bytes(&skewed_image()).expect("parse failed");
    imd.set_write_protect(true);
    match img::write_exact(&mut imd,0,&vec![0;256]) {
        Err(Error::WriteProtected) => {},
        _ => panic!("expected write protect error")
    }
    imd.set_write_protect(false);
    img::write_exact(&mut imd,0,&vec![0;256]).expect("write failed");
    match img::write_exact(&mut imd,6,&vec![0;512]) {
        Err(Error::OutOfRange { .. }) => {},
        _ => panic!("expected out of range")
    }
}

#[test]
fn read_only_open_is_protected() {
    let dir = tempfile::tempdir().expect("could not create temp dir");
    let path = dir.path().join("ro.imd");
    std::fs::write(&path,skewed_image()).expect("could not write image");
    let mut stream = img::open(path.to_str().expect("bad path"),OpenMode::ReadOnly).expect("open failed");
    assert!(stream.is_write_protected());
    match img::write_exact(stream.as_mut(),0,&vec![0;256]) {
        Err(Error::WriteProtected) => {},
        _ => panic!("expected write protect error")
    }
}

#[test]
fn created_image_round_trip() {
    let mut imd = Imd::create(2,2,26,128).expect("create failed");
    assert_eq!(imd.total_sectors(),2*2*13);
    assert_eq!(imd.num_heads(),2);
    img::write_exact(&mut imd,30,&vec![0x42;256]).expect("write failed");
    let bytes = imd.to_bytes().expect("serialize failed");
    let mut back = Imd::from_bytes(&bytes).expect("parse failed");
    assert_eq!(img::read_exact(&mut back,30,1).expect("read failed"),vec![0x42;256]);
    assert_eq!(img::read_exact(&mut back,31,1).expect("read failed"),vec![0;256]);
}

#[test]
fn truncated_image_rejected() {
    let mut bytes = skewed_image();
    bytes.truncate(bytes.len()-10);
    match Imd::from_bytes(&bytes) {
        Err(Error::Inconsistent(_)) => {},
        _ => panic!("expected inconsistent")
    }
}

// test of file data layouts
use oasis_kit::fs::alloc::AllocationMap;
use oasis_kit::fs::deb::DirEntry;
use oasis_kit::fs::file;
use oasis_kit::img::{self,imd::Imd,raw::Raw};
use oasis_kit::{Error,SECTORS_PER_BLOCK};

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i*7 + i/254) as u8).collect()
}

/// Map over the stream with the first `reserved` blocks in use
fn map_for(blocks: usize,reserved: usize) -> AllocationMap {
    let mut map = AllocationMap::new((blocks+7)/8).expect("map creation failed");
    for b in reserved..map.capacity() {
        if b >= blocks {
            map.set_state(b,true).expect("set failed");
        }
    }
    for b in 0..reserved {
        map.set_state(b,true).expect("set failed");
    }
    map
}

#[test]
fn sequential_sizes() {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = tempfile::tempdir().expect("could not create temp dir");
    let path = dir.path().join("seq.img");
    let mut stream = Raw::create(path.to_str().expect("bad path"),2048).expect("create failed");
    let mut map = map_for(512,1);
    for len in [0,1,254,255,1024,100000] {
        let free_before = map.count_free_blocks();
        let dat = pattern(len);
        let mut deb = DirEntry::from_host_filename("SEQ.DAT").expect("bad name");
        file::write_sequential(&mut stream,&mut map,&mut deb,&dat).expect("write failed");
        let sectors = (len + 253) / 254;
        let blocks = (sectors + 3) / 4;
        assert_eq!(deb.record_count as usize,sectors);
        assert_eq!(deb.block_count as usize,blocks);
        assert_eq!(map.count_free_blocks(),free_before-blocks);
        let mut buf = vec![0;len];
        assert_eq!(file::read_sequential(&mut stream,&deb,&mut buf).expect("read failed"),len);
        assert_eq!(buf,dat);
        let chain = file::walk_sequential_chain(&mut stream,deb.start_sector).expect("walk failed");
        assert_eq!(chain.len(),sectors);
        if sectors > 0 {
            assert_eq!(*chain.last().unwrap(),deb.ffd2);
        }
    }
}

#[test]
fn sequential_blocks_fill_up() {
    let mut stream = Imd::create(4,2,26,256).expect("create failed");
    let mut map = map_for(stream_blocks(&stream),2);
    let mut deb = DirEntry::from_host_filename("SEQ.DAT").expect("bad name");
    let dat = pattern(254*6);
    file::write_sequential(&mut stream,&mut map,&mut deb,&dat).expect("write failed");
    assert_eq!(deb.record_count,6);
    assert_eq!(deb.block_count,2);
    let chain = file::walk_sequential_chain(&mut stream,deb.start_sector).expect("walk failed");
    let first_block = chain[0] as usize / SECTORS_PER_BLOCK;
    for (i,lba) in chain.iter().enumerate().take(4) {
        assert_eq!(*lba as usize,first_block*SECTORS_PER_BLOCK + i);
    }
    let all = file::read_file(&mut stream,&deb).expect("read failed");
    assert_eq!(all,dat);
}

fn stream_blocks(stream: &Imd) -> usize {
    use oasis_kit::img::SectorIO;
    stream.total_sectors() / SECTORS_PER_BLOCK
}

#[test]
fn sequential_short_buffer() {
    let mut stream = Imd::create(4,2,26,256).expect("create failed");
    let mut map = map_for(stream_blocks(&stream),2);
    let mut deb = DirEntry::from_host_filename("SEQ.DAT").expect("bad name");
    let dat = pattern(1000);
    file::write_sequential(&mut stream,&mut map,&mut deb,&dat).expect("write failed");
    let mut buf = vec![0;300];
    assert_eq!(file::read_sequential(&mut stream,&deb,&mut buf).expect("read failed"),300);
    assert_eq!(buf,dat[0..300]);
}

#[test]
fn sequential_inconsistencies() {
    let mut stream = Imd::create(4,2,26,256).expect("create failed");
    let mut map = map_for(stream_blocks(&stream),2);
    let mut deb = DirEntry::from_host_filename("SEQ.DAT").expect("bad name");
    let dat = pattern(2000);
    file::write_sequential(&mut stream,&mut map,&mut deb,&dat).expect("write failed");
    let mut buf = vec![0;4096];
    let mut wrong_last = deb.clone();
    wrong_last.ffd2 += 1;
    match file::read_sequential(&mut stream,&wrong_last,&mut buf) {
        Err(Error::Inconsistent(_)) => {},
        _ => panic!("expected inconsistent")
    }
    let mut too_few = deb.clone();
    too_few.block_count = 1;
    match file::read_sequential(&mut stream,&too_few,&mut buf) {
        Err(Error::Inconsistent(_)) => {},
        _ => panic!("expected inconsistent")
    }
    // make the chain cyclic
    let mut sector = img::read_exact(&mut stream,deb.ffd2 as usize,1).expect("read failed");
    sector[254..256].copy_from_slice(&u16::to_le_bytes(deb.start_sector));
    img::write_exact(&mut stream,deb.ffd2 as usize,&sector).expect("write failed");
    match file::read_sequential(&mut stream,&deb,&mut buf) {
        Err(Error::Inconsistent(_)) => {},
        _ => panic!("expected inconsistent")
    }
    match file::walk_sequential_chain(&mut stream,deb.start_sector) {
        Err(Error::Inconsistent(_)) => {},
        _ => panic!("expected inconsistent")
    }
}

#[test]
fn direct_records() {
    let mut stream = Imd::create(4,2,26,256).expect("create failed");
    let mut map = map_for(stream_blocks(&stream),2);
    let mut deb = DirEntry::from_host_filename("MASTER.DAT_D_80").expect("bad name");
    let dat = pattern(240);
    file::write_file(&mut stream,&mut map,&mut deb,&dat).expect("write failed");
    assert_eq!(deb.record_count,3);
    assert_eq!(deb.block_count,1);
    assert_eq!(deb.start_sector as usize % SECTORS_PER_BLOCK,0);
    assert_eq!(file::contiguous_length(&deb),240);
    assert_eq!(file::read_file(&mut stream,&deb).expect("read failed"),dat);
    // padding is zero
    let raw = img::read_exact(&mut stream,deb.start_sector as usize,4).expect("read failed");
    assert!(raw[240..].iter().all(|x| *x==0));
}

#[test]
fn contiguous_lengths() {
    let mut deb = DirEntry::from_host_filename("PROG.REL_R_256").expect("bad name");
    deb.block_count = 2;
    deb.ffd2 = 1500;
    assert_eq!(file::contiguous_length(&deb),1500);
    deb.ffd2 = 5000;
    assert_eq!(file::contiguous_length(&deb),2048);
    deb.ffd2 = 0;
    assert_eq!(file::contiguous_length(&deb),2048);

    let mut deb = DirEntry::from_host_filename("IDX.IDX_I_100_10").expect("bad name");
    deb.block_count = 1;
    deb.record_count = 7;
    assert_eq!(file::contiguous_length(&deb),700);

    let mut deb = DirEntry::from_host_filename("BOOT.SYS_A_256_E000").expect("bad name");
    deb.block_count = 3;
    assert_eq!(file::contiguous_length(&deb),3072);
    deb.record_count = 5;
    assert_eq!(file::contiguous_length(&deb),1280);
}

#[test]
fn relocatable_keeps_length() {
    let mut stream = Imd::create(4,2,26,256).expect("create failed");
    let mut map = map_for(stream_blocks(&stream),2);
    let mut deb = DirEntry::from_host_filename("PROG.REL_R_256").expect("bad name");
    let dat = pattern(1500);
    file::write_file(&mut stream,&mut map,&mut deb,&dat).expect("write failed");
    assert_eq!(deb.ffd2,1500);
    assert_eq!(deb.block_count,2);
    assert_eq!(file::read_file(&mut stream,&deb).expect("read failed"),dat);
}

#[test]
fn failed_writes_give_back_blocks() {
    // 26 sectors gives 6 whole blocks, map claims 8
    let mut stream = Imd::create(1,1,26,256).expect("create failed");
    let mut map = map_for(8,1);
    let free_before = map.count_free_blocks();
    let mut deb = DirEntry::from_host_filename("BIG.DAT_D_128").expect("bad name");
    match file::write_file(&mut stream,&mut map,&mut deb,&pattern(7*1024)) {
        Err(Error::OutOfRange { .. }) => {},
        _ => panic!("expected out of range")
    }
    assert_eq!(map.count_free_blocks(),free_before);
    assert_eq!(deb.block_count,0);

    let mut deb = DirEntry::from_host_filename("BIG.SEQ").expect("bad name");
    match file::write_file(&mut stream,&mut map,&mut deb,&pattern(254*4*7)) {
        Err(Error::OutOfRange { .. }) => {},
        _ => panic!("expected out of range")
    }
    assert_eq!(map.count_free_blocks(),free_before);
    assert_eq!(deb.start_sector,0);
}

#[test]
fn disk_full_gives_back_blocks() {
    let mut stream = Imd::create(2,1,26,256).expect("create failed");
    let mut map = map_for(8,1);
    let mut deb = DirEntry::from_host_filename("BIG.SEQ").expect("bad name");
    match file::write_file(&mut stream,&mut map,&mut deb,&pattern(254*4*8)) {
        Err(Error::NotFound(_)) => {},
        _ => panic!("expected not found")
    }
    assert_eq!(map.count_free_blocks(),7);
    assert_eq!(deb.block_count,0);
    // the same data fits once it is one block smaller
    file::write_file(&mut stream,&mut map,&mut deb,&pattern(254*4*7)).expect("write failed");
    assert_eq!(map.count_free_blocks(),0);
    assert_eq!(deb.block_count,7);
}

#[test]
fn boot_block_is_never_used() {
    let mut stream = Imd::create(4,2,26,256).expect("create failed");
    let mut map = map_for(stream_blocks(&stream),0);
    let free_before = map.count_free_blocks();
    let boot = img::read_exact(&mut stream,0,SECTORS_PER_BLOCK).expect("read failed");
    let mut deb = DirEntry::from_host_filename("SEQ.DAT").expect("bad name");
    match file::write_file(&mut stream,&mut map,&mut deb,&pattern(300)) {
        Err(Error::Inconsistent(_)) => {},
        _ => panic!("expected inconsistent")
    }
    assert_eq!(deb.start_sector,0);
    let mut deb = DirEntry::from_host_filename("MASTER.DAT_D_80").expect("bad name");
    match file::write_file(&mut stream,&mut map,&mut deb,&pattern(240)) {
        Err(Error::Inconsistent(_)) => {},
        _ => panic!("expected inconsistent")
    }
    assert_eq!(deb.block_count,0);
    assert_eq!(map.count_free_blocks(),free_before);
    assert_eq!(img::read_exact(&mut stream,0,SECTORS_PER_BLOCK).expect("read failed"),boot);
}

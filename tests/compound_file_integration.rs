use std::fs::File;
use std::io::Cursor;

use cfb::{CfbConfiguration, CompoundFile, UpdateMode, Version};
use proptest::prelude::*;

#[test]
fn file_backed_round_trip_preserves_tree_and_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sample.cfb");

    {
        let mut cf = CompoundFile::<File>::new(Version::V3, CfbConfiguration::default());
        let root = cf.root_sid();
        cf.add_stream(root, "WordDocument", &vec![0x42u8; 20_000_000]).unwrap();
        let storage = cf.add_storage(root, "ObjectPool").unwrap();
        cf.add_stream(storage, "Embedded1", b"embedded payload").unwrap();

        let mut file = File::create(&path).unwrap();
        cf.save(&mut file).unwrap();
    }

    let file = File::open(&path).unwrap();
    let mut cf = CompoundFile::open(file, UpdateMode::ReadOnly, CfbConfiguration::default()).unwrap();
    let root = cf.root_sid();

    let word_sid = cf.find_child(root, "WordDocument").unwrap().unwrap();
    assert_eq!(cf.entry(word_sid).unwrap().size, 20_000_000);
    let mut sample = [0u8; 64];
    cf.read_stream(word_sid, 0, &mut sample).unwrap();
    assert!(sample.iter().all(|&b| b == 0x42));

    let embedded = cf.find_path(&["ObjectPool", "Embedded1"]).unwrap();
    assert_eq!(cf.raw_data(embedded).unwrap(), b"embedded payload");

    cf.verify_all_rb_invariants().unwrap();
}

#[test]
fn eight_streams_of_varied_sizes_survive_commit_and_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("varied.cfb");

    let sizes = [0usize, 1, 63, 64, 100, 4095, 4096, 500_000];
    {
        let mut cf = CompoundFile::<File>::new(Version::V3, CfbConfiguration::default());
        let root = cf.root_sid();
        for (i, &size) in sizes.iter().enumerate() {
            let data = vec![(i as u8).wrapping_add(1); size];
            cf.add_stream(root, &format!("Stream{i}"), &data).unwrap();
        }
        let mut out = File::create(&path).unwrap();
        cf.save(&mut out).unwrap();
    }

    let file = File::open(&path).unwrap();
    let mut cf = CompoundFile::open(file, UpdateMode::ReadOnly, CfbConfiguration::default()).unwrap();
    let root = cf.root_sid();
    for (i, &size) in sizes.iter().enumerate() {
        let sid = cf.find_child(root, &format!("Stream{i}")).unwrap().unwrap();
        let data = cf.raw_data(sid).unwrap();
        assert_eq!(data.len(), size);
        assert!(data.iter().all(|&b| b == (i as u8).wrapping_add(1)));
    }
}

#[test]
fn deleting_every_third_of_5000_streams_then_shrinking_preserves_the_rest() {
    let mut cf = CompoundFile::<Cursor<Vec<u8>>>::new(Version::V3, CfbConfiguration::default());
    let root = cf.root_sid();
    for i in 0..5000 {
        cf.add_stream(root, &format!("S{i:05}"), &[i as u8]).unwrap();
    }
    for i in (0..5000).step_by(3) {
        cf.delete(root, &format!("S{i:05}")).unwrap();
    }
    cf.verify_all_rb_invariants().unwrap();
    cf.shrink().unwrap();
    cf.verify_all_rb_invariants().unwrap();

    for i in 0..5000 {
        let found = cf.find_child(root, &format!("S{i:05}")).unwrap();
        if i % 3 == 0 {
            assert!(found.is_none());
        } else {
            let sid = found.unwrap();
            assert_eq!(cf.raw_data(sid).unwrap(), vec![i as u8]);
        }
    }
}

#[test]
fn five_thousand_stream_lookup_resolves_every_entry() {
    let mut cf = CompoundFile::<Cursor<Vec<u8>>>::new(Version::V3, CfbConfiguration::default());
    let root = cf.root_sid();
    for i in 0..5000 {
        cf.add_stream(root, &format!("Entry{i:05}"), &[]).unwrap();
    }
    for i in 0..5000 {
        assert!(cf.find_child(root, &format!("Entry{i:05}")).unwrap().is_some());
    }
    assert_eq!(cf.num_directories(), 5001); // + root
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn arbitrary_stream_contents_round_trip_through_save_and_open(
        data in proptest::collection::vec(any::<u8>(), 0..20_000)
    ) {
        let mut cf = CompoundFile::<Cursor<Vec<u8>>>::new(Version::V3, CfbConfiguration::default());
        let root = cf.root_sid();
        cf.add_stream(root, "Blob", &data).unwrap();

        let mut buffer = Cursor::new(Vec::new());
        cf.save(&mut buffer).unwrap();

        let mut reopened = CompoundFile::open(buffer, UpdateMode::ReadOnly, CfbConfiguration::default()).unwrap();
        let sid = reopened.find_child(reopened.root_sid(), "Blob").unwrap().unwrap();
        prop_assert_eq!(reopened.raw_data(sid).unwrap(), data);
    }
}

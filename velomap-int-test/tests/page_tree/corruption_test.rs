use std::fs::{self, OpenOptions};
use std::io::{Seek, SeekFrom, Write};

use velomap_index::{
    IndexBuilder, IndexReader, PageTreeError, Point, Rect, TreeConfig, Way, PAGE_SIZE,
};
use velomap_int_test::test_util::{cleanup, create_test_context, run_test, TestContext};

fn write_grid(ctx: &TestContext, name: &str) -> std::path::PathBuf {
    let path = ctx.index_path(name);
    let mut builder =
        IndexBuilder::new(TreeConfig::new().with_degree(4).with_point_capacity(4)).unwrap();
    for i in 0..64 {
        builder.insert(Point::new(i % 8, i / 8)).unwrap();
    }
    builder.write_to_path(&path).unwrap();
    path
}

fn overwrite(path: &std::path::Path, offset: u64, bytes: &[u8]) {
    let mut file = OpenOptions::new().write(true).open(path).unwrap();
    file.seek(SeekFrom::Start(offset)).unwrap();
    file.write_all(bytes).unwrap();
    file.sync_all().unwrap();
}

#[test]
fn test_corrupt_root_fails_search() {
    run_test(
        || create_test_context(),
        |ctx| {
            let path = write_grid(&ctx, "corrupt_root");
            let root = IndexReader::open_path(&path)?.header().root_page;

            // An internal page claiming a negative entry count.
            overwrite(&path, root.offset(), &(-1i32).to_be_bytes());

            let reader = IndexReader::open_path(&path)?;
            let results: Vec<_> = reader.search(Rect::new(0, 0, 8, 8)).collect();
            assert_eq!(results.len(), 1);
            assert!(matches!(results[0], Err(PageTreeError::CorruptPage(_))));

            let report = reader.check_integrity()?;
            assert!(!report.is_valid);
            assert_eq!(report.corrupted_nodes.len(), 1);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_corrupt_header_is_rejected() {
    run_test(
        || create_test_context(),
        |ctx| {
            let path = write_grid(&ctx, "bad_magic");
            overwrite(&path, 0, b"JUNK");
            assert!(matches!(
                IndexReader::open_path(&path),
                Err(PageTreeError::InvalidHeader(_))
            ));

            let path = write_grid(&ctx, "bad_checksum");
            // Last byte of the stored page count.
            overwrite(&path, 35, &[0x7F]);
            assert!(matches!(
                IndexReader::open_path(&path),
                Err(PageTreeError::InvalidHeader(_))
            ));
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_truncated_file_is_rejected() {
    run_test(
        || create_test_context(),
        |ctx| {
            let path = write_grid(&ctx, "truncated");
            let len = fs::metadata(&path)?.len();
            let file = OpenOptions::new().write(true).open(&path)?;
            file.set_len(len - PAGE_SIZE as u64)?;
            drop(file);

            assert!(matches!(
                IndexReader::open_path(&path),
                Err(PageTreeError::InvalidHeader(_))
            ));
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_oversized_way_is_rejected() {
    let mut builder = IndexBuilder::new(TreeConfig::default()).unwrap();
    let long_way = Way::new(vec![Point::new(3, 4); 63], "abcde", 0);
    match builder.insert(long_way) {
        Err(PageTreeError::FeatureTooLarge { needed, available }) => {
            assert_eq!(needed, 509);
            assert_eq!(available, 508);
        }
        other => panic!("Expected FeatureTooLarge, got {:?}", other),
    }

    let fits = Way::new(vec![Point::new(3, 4); 63], "abcd", 0);
    builder.insert(fits).unwrap();
    assert_eq!(builder.len(), 1);
}

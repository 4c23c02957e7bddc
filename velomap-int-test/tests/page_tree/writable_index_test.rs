use velomap_index::{
    FileDevice, IndexReader, NodeKind, PageStore, Point, RTree, Rect, TreeConfig, Way,
};
use velomap_int_test::test_util::{cleanup, create_test_context, random_point, run_test, test_rng};

#[test]
fn test_create_insert_commit_reopen() {
    run_test(
        || create_test_context(),
        |ctx| {
            let path = ctx.index_path("writable");
            let config = TreeConfig::new().with_degree(6).with_point_capacity(10);

            let mut tree = RTree::create(FileDevice::create(&path)?, config)?;
            assert_eq!(tree.root_kind(), NodeKind::Points);
            let mut rng = test_rng(3);
            for _ in 0..500 {
                tree.insert(random_point(&mut rng, 10_000))?;
            }
            let header = tree.commit()?;
            assert_eq!(header.feature_count, 500);
            drop(tree);

            let mut tree = RTree::open_writable(FileDevice::open(&path)?, 32)?;
            assert_eq!(tree.len(), 500);
            tree.insert(Way::new(
                vec![Point::new(-20_000, 0), Point::new(20_000, 0)],
                "Ring Road",
                0x04,
            ))?;
            tree.commit()?;
            drop(tree);

            let reader = IndexReader::open_path(&path)?;
            assert_eq!(reader.len(), 501);
            assert!(reader.check_integrity()?.is_valid);
            let ring = reader.search_all(Rect::new(15_000, -1, 15_000, 1))?;
            assert_eq!(ring.len(), 1);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_uncommitted_store_has_no_root() {
    run_test(
        || create_test_context(),
        |ctx| {
            let path = ctx.index_path("uncommitted");
            let store = PageStore::create(FileDevice::create(&path)?, &TreeConfig::default())?;
            drop(store);
            assert!(IndexReader::open_path(&path).is_err());
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

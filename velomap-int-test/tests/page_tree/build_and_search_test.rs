use std::collections::BTreeSet;

use velomap_index::{
    Feature, IndexBuilder, IndexReader, MemoryDevice, PageDevice, Point, Rect, TreeConfig, Way,
};
use velomap_int_test::test_util::{
    cleanup, create_test_context, random_point, random_way, run_test, test_rng,
};

fn key(feature: &Feature) -> String {
    format!("{:?}", feature)
}

fn brute_force(features: &[Feature], query: Rect) -> BTreeSet<String> {
    features
        .iter()
        .filter(|f| f.bounds().is_some_and(|b| b.intersects(&query)))
        .map(key)
        .collect()
}

fn found<D: PageDevice>(reader: &IndexReader<D>, query: Rect) -> BTreeSet<String> {
    reader
        .search_all(query)
        .unwrap()
        .iter()
        .map(key)
        .collect()
}

#[test]
fn test_small_capacity_splits_root() {
    run_test(
        || create_test_context(),
        |ctx| {
            let path = ctx.index_path("three_points");
            let mut builder =
                IndexBuilder::new(TreeConfig::new().with_degree(2).with_point_capacity(2))?;
            builder.insert(Point::new(0, 0))?;
            builder.insert(Point::new(10, 10))?;
            builder.insert(Point::new(5, 5))?;
            builder.write_to_path(&path)?;

            let reader = IndexReader::open_path(&path)?;
            assert_eq!(reader.height(), 2);
            let rects = reader.collect_rects()?;
            assert_eq!(rects[0], (1, Rect::new(0, 0, 10, 10)));
            assert_eq!(rects.iter().filter(|(level, _)| *level == 0).count(), 2);

            let all = reader.search_all(Rect::new(0, 0, 10, 10))?;
            assert_eq!(all.len(), 3);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_way_round_trip() {
    run_test(
        || create_test_context(),
        |ctx| {
            let path = ctx.index_path("elm");
            let elm = Way::new(
                vec![Point::new(0, 0), Point::new(10, 5), Point::new(20, 0)],
                "Elm St",
                0x01,
            );
            let mut builder = IndexBuilder::new(TreeConfig::default())?;
            builder.insert(elm.clone())?;
            builder.write_to_path(&path)?;

            let reader = IndexReader::open_path(&path)?;
            let hits = reader.search_all(Rect::new(-5, -5, 25, 25))?;
            assert_eq!(hits, vec![Feature::Way(elm)]);
            match &hits[0] {
                Feature::Way(way) => {
                    assert_eq!(way.name, "Elm St");
                    assert_eq!(way.flags, 0x01);
                    assert_eq!(way.points.len(), 3);
                }
                other => panic!("Expected a way, got {:?}", other),
            }

            assert!(reader.search_all(Rect::new(30, 30, 40, 40))?.is_empty());
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_search_matches_brute_force() {
    run_test(
        || create_test_context(),
        |ctx| {
            let mut rng = test_rng(42);
            let mut features: Vec<Feature> = Vec::new();
            for i in 0..3000 {
                if i % 10 == 0 {
                    features.push(random_way(&mut rng, 100_000).into());
                } else {
                    features.push(random_point(&mut rng, 100_000).into());
                }
            }

            let mut builder = IndexBuilder::new(TreeConfig::default())?;
            builder.extend(features.iter().cloned())?;
            let path = ctx.index_path("random");
            builder.write_to_path(&path)?;
            let reader = IndexReader::open_path(&path)?;
            assert_eq!(reader.len(), 3000);

            for _ in 0..25 {
                let corner = random_point(&mut rng, 100_000);
                let query = Rect::new(corner.x, corner.y, corner.x + 20_000, corner.y + 15_000);
                assert_eq!(found(&reader, query), brute_force(&features, query));
            }

            let everything = Rect::new(i32::MIN, i32::MIN, i32::MAX, i32::MAX);
            assert_eq!(reader.search(everything).count(), 3000);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_large_build_keeps_invariants() {
    let mut rng = test_rng(7);
    let mut builder =
        IndexBuilder::new(TreeConfig::new().with_degree(5).with_point_capacity(6)).unwrap();
    for i in 0..5000 {
        if i % 7 == 0 {
            builder.insert(random_way(&mut rng, 1_000_000)).unwrap();
        } else {
            builder.insert(random_point(&mut rng, 1_000_000)).unwrap();
        }
    }

    let report = builder.tree().check_integrity().unwrap();
    assert!(report.is_valid, "{:?}", report.errors);

    let reader = builder.finish(MemoryDevice::new()).unwrap();
    let report = reader.check_integrity().unwrap();
    assert!(report.is_valid, "{:?}", report.errors);
    assert_eq!(report.features, 5000);
    assert_eq!(report.nodes_checked, reader.header().page_count as u64 - 1);
}

#[test]
fn test_degree_coordinates() {
    let cafe = Point::from_degrees(5.9, 52.1);
    let bakery = Point::from_degrees(5.95, 52.12);
    let far_away = Point::from_degrees(-0.12, 51.5);

    let mut builder = IndexBuilder::new(TreeConfig::default()).unwrap();
    builder.extend([cafe, bakery, far_away]).unwrap();
    let reader = builder.finish(MemoryDevice::new()).unwrap();

    let around = Rect::new(
        Point::from_degrees(5.8, 52.0).x,
        Point::from_degrees(5.8, 52.0).y,
        Point::from_degrees(6.0, 52.2).x,
        Point::from_degrees(6.0, 52.2).y,
    );
    let hits = reader.search_all(around).unwrap();
    assert_eq!(hits, vec![Feature::Point(cafe), Feature::Point(bakery)]);
}

#[test]
fn test_empty_index() {
    let reader = IndexBuilder::new(TreeConfig::default())
        .unwrap()
        .finish(MemoryDevice::new())
        .unwrap();
    assert!(reader.is_empty());
    assert_eq!(reader.bounds(), None);
    assert!(reader
        .search_all(Rect::new(i32::MIN, i32::MIN, i32::MAX, i32::MAX))
        .unwrap()
        .is_empty());
}

#[test]
fn test_concurrent_mmap_readers() {
    run_test(
        || create_test_context(),
        |ctx| {
            let path = ctx.index_path("grid");
            let mut builder = IndexBuilder::new(TreeConfig::default())?;
            for x in 0..50 {
                for y in 0..50 {
                    builder.insert(Point::new(x * 100, y * 100))?;
                }
            }
            builder.write_to_path(&path)?;

            let reader = IndexReader::open_mmap(&path)?;
            std::thread::scope(|s| {
                for column in 0..8 {
                    let reader = &reader;
                    s.spawn(move || {
                        let query = Rect::new(column * 100, 0, column * 100, 4900);
                        let hits = reader.search_all(query).unwrap();
                        assert_eq!(hits.len(), 50);
                    });
                }
            });
            log::info!("Page stats after concurrent reads: {:?}", reader.page_stats());
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

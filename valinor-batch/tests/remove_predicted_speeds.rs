mod common;

use common::{
    build_tile, config_json, local_tile, miscount_sections, misplace_predicted_speeds, tile_path,
    write_tile,
};
use std::fs;
use valinor_batch::ops::RemovePredictedSpeeds;
use valinor_batch::{BatchConfig, BatchDriver, BatchReport, TileErrorKind, TileQueue};
use valinor_graphtile::GraphId;
use valinor_graphtile::graph_tile::{GraphTile, OwnedGraphTile};
use valinor_graphtile::tile_provider::GraphTileProvider;

fn run(config: &BatchConfig, graph_ids: Vec<GraphId>, workers: usize) -> BatchReport<()> {
    BatchDriver::new(config.workers(Some(workers)))
        .run(
            TileQueue::new(graph_ids),
            || config.tile_provider(),
            &RemovePredictedSpeeds,
        )
        .unwrap()
}

#[test]
fn test_remove_over_dataset() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let ids: Vec<_> = [762_485, 762_486, 762_487, 762_488, 762_489, 762_490]
        .into_iter()
        .map(local_tile)
        .collect();

    let with_traffic = build_tile(ids[0], true);
    write_tile(root, ids[0], &with_traffic);
    write_tile(root, ids[1], &build_tile(ids[1], false));
    write_tile(root, ids[2], &build_tile(ids[2], true));
    let misplaced = misplace_predicted_speeds(build_tile(ids[3], true));
    write_tile(root, ids[3], &misplaced);
    write_tile(root, ids[4], b"definitely not a tile");
    // ids[5] is never written

    let config = BatchConfig::from_json_str(&config_json(root)).unwrap();
    let report = run(&config, ids.clone(), 3);

    assert_eq!(report.attempted, 6);
    assert_eq!(report.succeeded, 3);
    let mut failures: Vec<_> = report
        .failures
        .iter()
        .map(|failure| (failure.graph_id, failure.kind))
        .collect();
    failures.sort_unstable_by_key(|(graph_id, _)| *graph_id);
    assert_eq!(
        failures,
        vec![
            (ids[3], TileErrorKind::LayoutMismatch),
            (ids[4], TileErrorKind::LayoutMismatch),
            (ids[5], TileErrorKind::NotFound),
        ]
    );

    // Stripping a tile gives the same bytes as never adding traffic in the first place
    for &graph_id in &ids[..3] {
        assert_eq!(
            fs::read(tile_path(root, graph_id)).unwrap(),
            build_tile(graph_id, false),
            "{graph_id}"
        );
    }

    let input = OwnedGraphTile::try_from(with_traffic).unwrap();
    let output = OwnedGraphTile::try_from(fs::read(tile_path(root, ids[0])).unwrap()).unwrap();
    assert_eq!(
        output.header().directed_edge_count(),
        input.header().directed_edge_count()
    );
    assert_eq!(output.header().predicted_speeds_count(), 0);
    assert_eq!(output.header().predicted_speeds_offset(), 0);
    // 3 index entries and a single profile
    assert_eq!(
        output.header().end_offset(),
        input.header().end_offset() - (3 * 4 + 400)
    );
    assert!(output.directed_edges().iter().all(|edge| {
        !edge.has_predicted_speed()
            && edge.free_flow_speed() == 0
            && edge.constrained_flow_speed() == 0
    }));

    // Failed tiles are left alone
    assert_eq!(fs::read(tile_path(root, ids[3])).unwrap(), misplaced);
    assert_eq!(
        fs::read(tile_path(root, ids[4])).unwrap(),
        b"definitely not a tile"
    );
    assert!(!tile_path(root, ids[5]).exists());
}

#[test]
fn test_counts_disagreeing_with_offsets_are_left_alone() {
    let dir = tempfile::tempdir().unwrap();
    let ids = [local_tile(500), local_tile(501)];
    let miscounted = [
        miscount_sections(build_tile(ids[0], true)),
        miscount_sections(build_tile(ids[1], false)),
    ];
    for (&graph_id, bytes) in ids.iter().zip(&miscounted) {
        write_tile(dir.path(), graph_id, bytes);
    }

    let config = BatchConfig::from_json_str(&config_json(dir.path())).unwrap();
    let report = run(&config, ids.to_vec(), 2);

    assert_eq!(report.attempted, 2);
    assert_eq!(report.succeeded, 0);
    assert!(report.failures.iter().all(|failure| {
        failure.kind == TileErrorKind::LayoutMismatch
            && failure.message.contains("forward complex restrictions")
    }));
    for (&graph_id, bytes) in ids.iter().zip(&miscounted) {
        assert_eq!(&fs::read(tile_path(dir.path(), graph_id)).unwrap(), bytes);
    }
}

#[test]
fn test_second_pass_is_a_no_op() {
    let dir = tempfile::tempdir().unwrap();
    let ids: Vec<_> = (100..110).map(local_tile).collect();
    for (n, &graph_id) in ids.iter().enumerate() {
        write_tile(dir.path(), graph_id, &build_tile(graph_id, n % 2 == 0));
    }
    let config = BatchConfig::from_json_str(&config_json(dir.path())).unwrap();

    let first = run(&config, ids.clone(), 4);
    assert_eq!(first.succeeded, 10);
    let after_first: Vec<_> = ids
        .iter()
        .map(|&graph_id| fs::read(tile_path(dir.path(), graph_id)).unwrap())
        .collect();

    let second = run(&config, ids.clone(), 4);
    assert_eq!(second.succeeded, 10);
    for (&graph_id, before) in ids.iter().zip(&after_first) {
        assert_eq!(&fs::read(tile_path(dir.path(), graph_id)).unwrap(), before);
    }
}

#[test]
fn test_enumerated_dataset() {
    let dir = tempfile::tempdir().unwrap();
    let ids: Vec<_> = (0..5).map(|n| local_tile(n * 1000)).collect();
    for &graph_id in &ids {
        write_tile(dir.path(), graph_id, &build_tile(graph_id, true));
    }
    fs::write(dir.path().join("README.txt"), "not a tile").unwrap();

    let config = BatchConfig::from_json_str(&config_json(dir.path())).unwrap();
    let provider = config.tile_provider();
    let enumerated = provider.enumerate_tiles().unwrap();
    assert_eq!(enumerated, ids);

    let report = run(&config, enumerated, 16);
    assert_eq!(report.attempted, 5);
    assert!(report.failures.is_empty());
}

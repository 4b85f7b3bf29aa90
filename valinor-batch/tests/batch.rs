mod common;

use common::{build_tile, config_json, local_tile, write_tile};
use proptest::prelude::*;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use valinor_batch::ops::{
    AttributeFilter, CollectTileStats, ExportTileAttributes, ExportTotals, FeatureTypes, TileStats,
};
use valinor_batch::{
    BatchConfig, BatchDriver, ConfigError, TileErrorKind, TileOperation, TileOperationError,
    TileQueue, WorkerCount,
};
use valinor_graphtile::GraphId;

/// Remembers every tile it is handed, without touching storage.
#[derive(Default)]
struct Tally {
    seen: Mutex<Vec<GraphId>>,
}

impl TileOperation<usize> for Tally {
    type Output = ();

    fn name(&self) -> &'static str {
        "tally"
    }

    fn process(&self, _worker: &usize, graph_id: GraphId) -> Result<(), TileOperationError> {
        self.seen.lock().unwrap().push(graph_id);
        Ok(())
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn every_tile_is_processed_exactly_once(
        tile_count in 0u64..64,
        workers in 1usize..12,
        seed in any::<u64>(),
    ) {
        let ids: Vec<_> = (0..tile_count).map(local_tile).collect();
        let operation = Tally::default();
        let providers = AtomicUsize::new(0);

        let report = BatchDriver::new(WorkerCount::new(workers).unwrap())
            .run(
                TileQueue::shuffled(ids.clone(), seed),
                || providers.fetch_add(1, Ordering::SeqCst),
                &operation,
            )
            .unwrap();

        let mut seen = operation.seen.into_inner().unwrap();
        seen.sort_unstable();
        prop_assert_eq!(seen, ids);
        prop_assert_eq!(report.attempted, usize::try_from(tile_count).unwrap());
        prop_assert_eq!(report.succeeded, report.attempted);
        prop_assert_eq!(providers.load(Ordering::SeqCst), workers);
    }
}

#[test]
fn test_stats_are_summed_once() {
    let dir = tempfile::tempdir().unwrap();
    let ids: Vec<_> = (10..13).map(local_tile).collect();
    write_tile(dir.path(), ids[0], &build_tile(ids[0], true));
    write_tile(dir.path(), ids[1], &build_tile(ids[1], false));
    write_tile(dir.path(), ids[2], &build_tile(ids[2], true));
    let config = BatchConfig::from_json_str(&config_json(dir.path())).unwrap();

    // More workers than tiles, so some workers contribute nothing
    let mut ids_with_missing = ids.clone();
    ids_with_missing.push(local_tile(99));
    let report = BatchDriver::new(config.workers(Some(6)))
        .run(
            TileQueue::new(ids_with_missing),
            || config.tile_provider(),
            &CollectTileStats,
        )
        .unwrap();

    assert_eq!(report.failed(), 1);
    assert_eq!(report.failures[0].kind, TileErrorKind::NotFound);
    assert_eq!(
        report.output,
        TileStats {
            tiles: 3,
            nodes: 6,
            directed_edges: 9,
            shortcuts: 3,
            access_restrictions: 3,
            complex_restriction_forward_bytes: 12,
            complex_restriction_reverse_bytes: 6,
            edges_with_predicted_speeds: 2,
            predicted_speed_profiles: 2,
        }
    );
    insta::assert_snapshot!(report.output, @r"
    Tiles: 3
    Nodes: 6
    Directed edges: 9 (3 shortcuts)
    Access restrictions: 3
    Complex restriction bytes: 12 forward, 6 reverse
    Edges with predicted speeds: 2
    Predicted speed profiles: 2
    ");
}

#[test]
fn test_ids_of_the_same_tile_are_processed_once() {
    let dir = tempfile::tempdir().unwrap();
    let graph_id = local_tile(762_485);
    write_tile(dir.path(), graph_id, &build_tile(graph_id, false));
    let config = BatchConfig::from_json_str(&config_json(dir.path())).unwrap();

    let report = BatchDriver::new(config.workers(Some(2)))
        .run(
            TileQueue::new([graph_id, graph_id.with_index(1).unwrap(), graph_id]),
            || config.tile_provider(),
            &CollectTileStats,
        )
        .unwrap();

    assert_eq!(report.attempted, 1);
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.output.tiles, 1);
    assert_eq!(report.output.directed_edges, 3);
}

#[test]
fn test_export() {
    let tiles = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let graph_id = local_tile(762_485);
    write_tile(tiles.path(), graph_id, &build_tile(graph_id, true));
    let config = BatchConfig::from_json_str(&config_json(tiles.path())).unwrap();

    let filter = AttributeFilter::new(
        &["edge.speed", "edge.traversability", "edge.predicted_speeds"],
        &["edge.use"],
    )
    .unwrap()
    .with_predicted_speed_buckets(vec![0, 100])
    .unwrap();
    let operation = ExportTileAttributes::new(
        output.path().to_path_buf(),
        FeatureTypes {
            edges: true,
            nodes: true,
        },
        filter,
    );

    let report = BatchDriver::new(config.workers(None))
        .run(TileQueue::new([graph_id]), || config.tile_provider(), &operation)
        .unwrap();
    assert_eq!(
        report.output,
        ExportTotals {
            tiles: 1,
            edges: 2,
            nodes: 2,
        }
    );

    let path = output.path().join("2/000/762/485.json");
    assert_eq!(operation.output_path(graph_id).unwrap(), path);
    let json = std::fs::read_to_string(path).unwrap();
    insta::assert_snapshot!(json, @r#"
    {
      "graph_id": "2/762485/0",
      "edges": [
        {
          "edgeid": 0,
          "road_class": "residential",
          "speed": 50,
          "forward_access": "apbtexuhwmcg",
          "reverse_access": "pb",
          "predspeed_0": 40,
          "predspeed_100": 40
        },
        {
          "edgeid": 2,
          "road_class": "residential",
          "speed": 50,
          "forward_access": "apbtexuhwmcg",
          "reverse_access": "pb",
          "predspeed_0": 0,
          "predspeed_100": 0
        }
      ],
      "nodes": [
        {
          "nodeid": 0,
          "lon": 1.5,
          "lat": 42.5
        },
        {
          "nodeid": 1,
          "lon": 1.75,
          "lat": 42.25
        }
      ]
    }
    "#);
}

#[test]
fn test_config_errors_are_fatal_up_front() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("tiles");

    let config_path = dir.path().join("valhalla.json");
    std::fs::write(&config_path, config_json(&missing)).unwrap();
    assert!(matches!(
        BatchConfig::from_file(&config_path),
        Err(ConfigError::TileDirNotFound(path)) if path == missing
    ));

    std::fs::write(&config_path, r#"{ "mjolnir": { "tile_extract": "/data/tiles.tar" } }"#)
        .unwrap();
    assert!(matches!(
        BatchConfig::from_file(&config_path),
        Err(ConfigError::MissingTileDir)
    ));
}

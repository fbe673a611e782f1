//! Integration tests for the deferred execution engine against an
//! in-memory tile store.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};

use compute_engine::{
    ArrayOps, ComputeConfig, ComputeError, ExecuteOptions, Executor, IntoLazy, ReduceDims,
    Reducer, TaskGraph,
};
use raster_common::{AssetDescriptor, BoundingBox, Tile, TimeInterval};
use test_utils::{asset, create_constant_grid, create_test_grid, MemoryTileStore};
use virtual_array::{BuildParams, CompositePolicy, VirtualArray, VirtualArrayBuilder};

fn t(hour: u32) -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, hour, 0, 0).unwrap()
}

fn fast_config(workers: usize) -> ComputeConfig {
    ComputeConfig {
        workers,
        max_retries: 3,
        initial_retry_delay: Duration::from_millis(1),
        max_retry_delay: Duration::from_millis(2),
        cache_bytes: 16 * 1024 * 1024,
    }
}

/// One 8x8 tile with col*1000+row values over bbox (0,0)-(8,8).
fn single_tile_scene() -> (Arc<MemoryTileStore>, Vec<AssetDescriptor>) {
    let store = Arc::new(MemoryTileStore::new());
    store.insert_tile(
        "tiles/t0/B04.rtl",
        Tile::new(8, 8, create_test_grid(8, 8)),
    );

    let descriptors = vec![asset(
        "tiles/t0/B04.rtl",
        "c",
        "B04",
        t(10),
        BoundingBox::new(0.0, 0.0, 8.0, 8.0),
        8,
        8,
    )];

    (store, descriptors)
}

/// `count` timestamps of constant-valued 8x8 tiles: value (i+1)*10.
fn time_series_scene(count: usize) -> (Arc<MemoryTileStore>, Vec<AssetDescriptor>) {
    let store = Arc::new(MemoryTileStore::new());
    let mut descriptors = Vec::new();

    for i in 0..count {
        let uri = format!("tiles/t{}/B04.rtl", i);
        store.insert_tile(&uri, Tile::new(8, 8, create_constant_grid(8, 8, (i + 1) as f32 * 10.0)));
        descriptors.push(asset(
            &uri,
            "c",
            "B04",
            t(10 + i as u32),
            BoundingBox::new(0.0, 0.0, 8.0, 8.0),
            8,
            8,
        ));
    }

    (store, descriptors)
}

fn build(descriptors: &[AssetDescriptor], params: BuildParams) -> VirtualArray {
    VirtualArrayBuilder::new(params).build(descriptors).unwrap()
}

fn graph_of(array: VirtualArray) -> TaskGraph {
    array.lazy().into_graph()
}

#[tokio::test]
async fn test_build_reads_no_pixels_execute_does() {
    let (store, descriptors) = single_tile_scene();
    let array = build(&descriptors, BuildParams::new(1.0));
    let graph = graph_of(array);

    assert_eq!(store.total_reads(), 0, "graph construction must not read");

    let executor = Executor::with_config(store.clone(), fast_config(4));
    executor
        .execute(&graph, &ExecuteOptions::compute())
        .await
        .unwrap();

    assert!(store.total_reads() > 0);
}

#[tokio::test]
async fn test_materialize_single_tile_identity() {
    let (store, descriptors) = single_tile_scene();
    let array = build(&descriptors, BuildParams::new(1.0));

    let executor = Executor::with_config(store, fast_config(4));
    let result = executor
        .execute(&graph_of(array), &ExecuteOptions::compute())
        .await
        .unwrap();

    assert_eq!(result.shape(), (1, 1, 8, 8));
    for row in 0..8 {
        for col in 0..8 {
            assert_eq!(
                result.value(0, 0, row, col),
                Some((col * 1000 + row) as f32),
                "mismatch at ({}, {})",
                col,
                row
            );
        }
    }
}

#[tokio::test]
async fn test_uncovered_region_is_nodata() {
    let (store, descriptors) = single_tile_scene();
    // Grid extends east of the only tile
    let params = BuildParams::new(1.0).with_bounds(BoundingBox::new(0.0, 0.0, 16.0, 8.0));
    let array = build(&descriptors, params);

    let executor = Executor::with_config(store, fast_config(4));
    let result = executor
        .execute(&graph_of(array), &ExecuteOptions::compute())
        .await
        .unwrap();

    assert_eq!(result.shape(), (1, 1, 8, 16));
    assert!(result.value(0, 0, 3, 3).unwrap() >= 0.0);
    assert!(result.value(0, 0, 3, 12).unwrap().is_nan());
}

#[tokio::test]
async fn test_composite_latest_wins_then_earliest_wins() {
    let bbox = BoundingBox::new(0.0, 0.0, 8.0, 8.0);
    let store = Arc::new(MemoryTileStore::new());
    store.insert_tile("tiles/a.rtl", Tile::new(8, 8, create_constant_grid(8, 8, 1.0)));
    store.insert_tile("tiles/b.rtl", Tile::new(8, 8, create_constant_grid(8, 8, 2.0)));

    // Same acquisition time; the uri breaks the tie deterministically
    let descriptors = vec![
        asset("tiles/a.rtl", "c", "B04", t(10), bbox, 8, 8),
        asset("tiles/b.rtl", "c", "B04", t(10), bbox, 8, 8),
    ];

    let latest = build(&descriptors, BuildParams::new(1.0));
    let earliest = build(
        &descriptors,
        BuildParams::new(1.0).with_policy(CompositePolicy::EarliestWins),
    );

    let executor = Executor::with_config(store, fast_config(4));

    let result = executor
        .execute(&graph_of(latest), &ExecuteOptions::compute())
        .await
        .unwrap();
    assert_eq!(result.value(0, 0, 4, 4), Some(2.0));

    let result = executor
        .execute(&graph_of(earliest), &ExecuteOptions::compute())
        .await
        .unwrap();
    assert_eq!(result.value(0, 0, 4, 4), Some(1.0));
}

#[tokio::test]
async fn test_repeat_execution_is_bit_identical() {
    let (store, descriptors) = time_series_scene(3);
    let array = build(&descriptors, BuildParams::new(1.0));
    let graph = graph_of(array);

    let executor = Executor::with_config(store, fast_config(4));
    let first = executor
        .execute(&graph, &ExecuteOptions::compute())
        .await
        .unwrap();
    let second = executor
        .execute(&graph, &ExecuteOptions::compute())
        .await
        .unwrap();

    let bits_a: Vec<u32> = first.data.iter().map(|v| v.to_bits()).collect();
    let bits_b: Vec<u32> = second.data.iter().map(|v| v.to_bits()).collect();
    assert_eq!(bits_a, bits_b);
}

#[tokio::test]
async fn test_reduction_is_independent_of_worker_count() {
    let (store, descriptors) = time_series_scene(4);
    let array = build(&descriptors, BuildParams::new(1.0));
    let graph = array
        .lazy()
        .reduce(ReduceDims::Space, Reducer::Mean)
        .into_graph();

    let serial = Executor::with_config(store.clone(), fast_config(1));
    let parallel = Executor::with_config(store, fast_config(8));

    let a = serial
        .execute(&graph, &ExecuteOptions::compute())
        .await
        .unwrap();
    let b = parallel
        .execute(&graph, &ExecuteOptions::compute())
        .await
        .unwrap();

    let bits_a: Vec<u32> = a.data.iter().map(|v| v.to_bits()).collect();
    let bits_b: Vec<u32> = b.data.iter().map(|v| v.to_bits()).collect();
    assert_eq!(bits_a, bits_b);
}

#[tokio::test]
async fn test_mean_over_space_yields_one_scalar_per_timestamp() {
    let (store, descriptors) = time_series_scene(3);
    let array = build(&descriptors, BuildParams::new(1.0));
    let graph = array
        .lazy()
        .reduce(ReduceDims::Space, Reducer::Mean)
        .into_graph();

    let executor = Executor::with_config(store, fast_config(4));
    let result = executor
        .execute(&graph, &ExecuteOptions::compute())
        .await
        .unwrap();

    assert_eq!(result.shape(), (3, 1, 1, 1));

    let series = result.time_series("B04").unwrap();
    assert_eq!(series.len(), 3);
    assert!(series.windows(2).all(|w| w[0].0 < w[1].0));

    let values: Vec<f32> = series.iter().map(|(_, v)| *v).collect();
    assert_eq!(values, vec![10.0, 20.0, 30.0]);
}

#[tokio::test]
async fn test_reduce_over_time_builds_composite() {
    let (store, descriptors) = time_series_scene(3);
    let array = build(&descriptors, BuildParams::new(1.0));

    let mean_graph = array
        .clone()
        .lazy()
        .reduce(ReduceDims::Time, Reducer::Mean)
        .into_graph();
    let max_graph = array
        .lazy()
        .reduce(ReduceDims::Time, Reducer::Max)
        .into_graph();

    let executor = Executor::with_config(store, fast_config(4));

    let mean = executor
        .execute(&mean_graph, &ExecuteOptions::compute())
        .await
        .unwrap();
    assert_eq!(mean.shape(), (1, 1, 8, 8));
    assert_eq!(mean.value(0, 0, 2, 5), Some(20.0));

    let max = executor
        .execute(&max_graph, &ExecuteOptions::compute())
        .await
        .unwrap();
    assert_eq!(max.value(0, 0, 2, 5), Some(30.0));
}

#[tokio::test]
async fn test_select_in_graph_narrows_output() {
    let (store, descriptors) = time_series_scene(3);
    let array = build(&descriptors, BuildParams::new(1.0));

    let graph = array
        .lazy()
        .select(Some(TimeInterval::new(t(11), t(13))), None, None)
        .into_graph();

    let executor = Executor::with_config(store, fast_config(4));
    let result = executor
        .execute(&graph, &ExecuteOptions::compute())
        .await
        .unwrap();

    assert_eq!(result.shape(), (2, 1, 8, 8));
    assert_eq!(result.value(0, 0, 0, 0), Some(20.0));
}

#[tokio::test]
async fn test_retry_exhaustion_fails_naming_the_chunk() {
    let (store, descriptors) = single_tile_scene();
    store.inject_transient_failures("tiles/t0/B04.rtl", 100);

    let array = build(&descriptors, BuildParams::new(1.0));
    let executor = Executor::with_config(store.clone(), fast_config(2));

    let err = executor
        .execute(&graph_of(array), &ExecuteOptions::compute())
        .await
        .unwrap_err();

    match &err {
        ComputeError::ChunkFailed { attempts, uri, .. } => {
            // One initial attempt plus a retry budget of three
            assert_eq!(*attempts, 4);
            assert_eq!(uri, "tiles/t0/B04.rtl");
        }
        other => panic!("expected ChunkFailed, got {:?}", other),
    }
    assert_eq!(store.attempts_for("tiles/t0/B04.rtl"), 4);

    // The failed chunk's coordinates are in the message
    let message = err.to_string();
    assert!(message.contains("t=0"), "message was: {}", message);
    assert!(message.contains("b=0"), "message was: {}", message);
}

#[tokio::test]
async fn test_transient_failures_within_budget_recover() {
    let (store, descriptors) = single_tile_scene();
    store.inject_transient_failures("tiles/t0/B04.rtl", 2);

    let array = build(&descriptors, BuildParams::new(1.0));
    let executor = Executor::with_config(store.clone(), fast_config(2));

    let result = executor
        .execute(&graph_of(array), &ExecuteOptions::compute())
        .await
        .unwrap();

    assert_eq!(result.value(0, 0, 0, 1), Some(1000.0));
    assert_eq!(store.attempts_for("tiles/t0/B04.rtl"), 3);
}

#[tokio::test]
async fn test_partial_tolerance_fills_failed_region_with_nodata() {
    let store = Arc::new(MemoryTileStore::new());
    store.insert_tile("tiles/west.rtl", Tile::new(8, 8, create_constant_grid(8, 8, 5.0)));
    store.insert_tile("tiles/east.rtl", Tile::new(8, 8, create_constant_grid(8, 8, 7.0)));
    store.inject_transient_failures("tiles/east.rtl", 100);

    let descriptors = vec![
        asset(
            "tiles/west.rtl",
            "c",
            "B04",
            t(10),
            BoundingBox::new(0.0, 0.0, 8.0, 8.0),
            8,
            8,
        ),
        asset(
            "tiles/east.rtl",
            "c",
            "B04",
            t(10),
            BoundingBox::new(8.0, 0.0, 16.0, 8.0),
            8,
            8,
        ),
    ];

    let array = build(&descriptors, BuildParams::new(1.0));
    let executor = Executor::with_config(store, fast_config(2));

    // Default: the whole execution fails, no partial result
    let err = executor
        .execute(&graph_of(array.clone()), &ExecuteOptions::compute())
        .await
        .unwrap_err();
    assert!(matches!(err, ComputeError::ChunkFailed { .. }));

    // Opt-in tolerance: failed region becomes no-data plus a warning
    let result = executor
        .execute(
            &graph_of(array),
            &ExecuteOptions::compute().with_partial_tolerance(),
        )
        .await
        .unwrap();

    assert_eq!(result.warnings.len(), 1);
    assert!(result.warnings[0].contains("tiles/east.rtl"));
    assert_eq!(result.value(0, 0, 4, 2), Some(5.0));
    assert!(result.value(0, 0, 4, 12).unwrap().is_nan());
}

#[tokio::test]
async fn test_cancellation_stops_tasks_without_leaks() {
    let (store, descriptors) = time_series_scene(6);
    store.set_read_delay(Duration::from_millis(500));

    let array = build(&descriptors, BuildParams::new(1.0));
    let graph = graph_of(array);

    let executor = Arc::new(Executor::with_config(store.clone(), fast_config(2)));
    let cancel = executor.cancel_handle();

    let task = {
        let executor = Arc::clone(&executor);
        tokio::spawn(async move { executor.execute(&graph, &ExecuteOptions::compute()).await })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    cancel.cancel();

    let outcome = task.await.unwrap();
    assert!(matches!(outcome, Err(ComputeError::Cancelled)));

    // Outstanding reads were dropped, not leaked
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(store.active_reads(), 0);
    // Not every chunk got to run
    assert!(store.total_reads() < 6);
}

#[tokio::test]
async fn test_tile_reads_are_deduplicated_within_an_execution() {
    let store = Arc::new(MemoryTileStore::new());
    // One coarse tile (2 units per pixel) backing a 16-cell-wide grid
    store.insert_tile("tiles/coarse.rtl", Tile::new(8, 8, create_constant_grid(8, 8, 3.0)));

    let descriptors = vec![asset(
        "tiles/coarse.rtl",
        "c",
        "B04",
        t(10),
        BoundingBox::new(0.0, 0.0, 16.0, 16.0),
        8,
        8,
    )];

    let array = build(&descriptors, BuildParams::new(1.0));
    // 16x16 grid with 8x8 chunks: four chunks all read the same tile
    let executor = Executor::with_config(store.clone(), fast_config(1));
    executor
        .execute(&graph_of(array), &ExecuteOptions::compute())
        .await
        .unwrap();

    assert_eq!(store.attempts_for("tiles/coarse.rtl"), 1);
}

#[tokio::test]
async fn test_persist_mode_writes_every_chunk() {
    use async_trait::async_trait;
    use compute_engine::{ChunkSink, SinkError};
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemorySink {
        written: Mutex<HashMap<String, Tile>>,
    }

    #[async_trait]
    impl ChunkSink for MemorySink {
        async fn write_chunk(&self, path: &str, tile: &Tile) -> Result<(), SinkError> {
            self.written
                .lock()
                .unwrap()
                .insert(path.to_string(), tile.clone());
            Ok(())
        }
    }

    let (store, descriptors) = time_series_scene(2);
    let array = build(&descriptors, BuildParams::new(1.0));

    let sink = Arc::new(MemorySink::default());
    let executor =
        Executor::with_config(store, fast_config(4)).with_sink(Arc::clone(&sink) as Arc<dyn ChunkSink>);

    let result = executor
        .execute(&graph_of(array), &ExecuteOptions::persist())
        .await
        .unwrap();

    assert_eq!(result.shape(), (2, 1, 8, 8));

    let written = sink.written.lock().unwrap();
    assert_eq!(written.len(), 2);
    assert!(written.keys().all(|k| k.starts_with("results/")));
    for tile in written.values() {
        assert_eq!(tile.width, 8);
        assert_eq!(tile.height, 8);
    }
}

#[tokio::test]
async fn test_persist_without_sink_is_invalid() {
    let (store, descriptors) = single_tile_scene();
    let array = build(&descriptors, BuildParams::new(1.0));

    let executor = Executor::with_config(store, fast_config(2));
    let err = executor
        .execute(&graph_of(array), &ExecuteOptions::persist())
        .await
        .unwrap_err();

    assert!(matches!(err, ComputeError::InvalidPlan(_)));
}

#[tokio::test]
async fn test_nested_reductions_are_rejected() {
    let (store, descriptors) = single_tile_scene();
    let array = build(&descriptors, BuildParams::new(1.0));

    let graph = array
        .lazy()
        .reduce(ReduceDims::Space, Reducer::Mean)
        .reduce(ReduceDims::Time, Reducer::Max)
        .into_graph();

    let executor = Executor::with_config(store, fast_config(2));
    let err = executor
        .execute(&graph, &ExecuteOptions::compute())
        .await
        .unwrap_err();

    assert!(matches!(err, ComputeError::InvalidPlan(_)));
}

#[tokio::test]
async fn test_zero_workers_is_pool_unavailable() {
    let (store, descriptors) = single_tile_scene();
    let array = build(&descriptors, BuildParams::new(1.0));

    let executor = Executor::with_config(store, fast_config(0));
    let err = executor
        .execute(&graph_of(array), &ExecuteOptions::compute())
        .await
        .unwrap_err();

    assert!(matches!(err, ComputeError::PoolUnavailable(_)));
}

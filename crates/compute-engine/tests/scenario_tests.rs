//! End-to-end scenario: catalog search with an attribute filter, virtual
//! array build, spatial-mean execution.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};

use catalog_client::{CatalogClient, CatalogTransport, CompareOp, SearchRequest};
use compute_engine::{
    ArrayOps, ComputeConfig, ExecuteOptions, Executor, IntoLazy, ReduceDims, Reducer,
};
use raster_common::{AssetDescriptor, BoundingBox, Tile};
use test_utils::{asset_with_properties, create_constant_grid, MemoryCatalog, MemoryTileStore};
use virtual_array::{BuildParams, VirtualArrayBuilder};

const BANDS: [&str; 4] = ["B02", "B03", "B04", "B08"];

fn t(day: u32, hour: u32) -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, day, hour, 0, 0).unwrap()
}

/// Collection "A": three clear acquisitions of four bands inside the
/// region, plus a cloudy scene, an out-of-region scene, and an
/// out-of-window scene that the query must exclude.
fn populate() -> (Arc<MemoryTileStore>, Vec<AssetDescriptor>) {
    let store = Arc::new(MemoryTileStore::new());
    let region_tile = BoundingBox::new(0.0, 0.0, 8.0, 8.0);
    let mut assets = Vec::new();

    for (i, stamp) in [t(5, 10), t(12, 10), t(19, 10)].iter().enumerate() {
        for band in BANDS {
            let uri = format!("tiles/clear/{}/{}.rtl", i, band);
            store.insert_tile(
                &uri,
                Tile::new(8, 8, create_constant_grid(8, 8, (i + 1) as f32 * 10.0)),
            );
            assets.push(asset_with_properties(
                &uri,
                "A",
                band,
                *stamp,
                region_tile,
                8,
                8,
                &[("cloud_cover", 2.5)],
            ));
        }
    }

    // Filtered out: cloud cover above threshold
    for band in BANDS {
        assets.push(asset_with_properties(
            &format!("tiles/cloudy/{}.rtl", band),
            "A",
            band,
            t(12, 11),
            region_tile,
            8,
            8,
            &[("cloud_cover", 74.0)],
        ));
    }

    // Filtered out: far outside the region
    assets.push(asset_with_properties(
        "tiles/far.rtl",
        "A",
        "B04",
        t(12, 10),
        BoundingBox::new(120.0, 40.0, 121.0, 41.0),
        8,
        8,
        &[("cloud_cover", 1.0)],
    ));

    // Filtered out: outside the time window
    assets.push(asset_with_properties(
        "tiles/stale.rtl",
        "A",
        "B04",
        Utc.with_ymd_and_hms(2023, 3, 1, 0, 0, 0).unwrap(),
        region_tile,
        8,
        8,
        &[("cloud_cover", 1.0)],
    ));

    (store, assets)
}

#[tokio::test]
async fn test_search_build_reduce_scenario() {
    let (store, assets) = populate();
    let catalog = Arc::new(MemoryCatalog::new(assets));
    let client = CatalogClient::with_transport(Arc::clone(&catalog) as Arc<dyn CatalogTransport>);

    // Query collection "A" for the region and window, cloud cover < 10
    let request = SearchRequest::collections(["A"])
        .within(BoundingBox::new(0.0, 0.0, 10.0, 10.0))
        .between(t(1, 0), t(31, 0))
        .filter("cloud_cover", CompareOp::Lt, 10.0)
        .page_size(5);

    let descriptors = client.search_collected(request).await.unwrap();

    // Three acquisitions x four bands survive the filters
    assert_eq!(descriptors.len(), 12);

    // Build the virtual array: axes (time: 3, band: 4, y: 8, x: 8)
    let array = VirtualArrayBuilder::new(BuildParams::new(1.0))
        .build(&descriptors)
        .unwrap();
    assert_eq!(array.shape(), (3, 4, 8, 8));
    assert_eq!(array.times, vec![t(5, 10), t(12, 10), t(19, 10)]);
    assert_eq!(array.coverage(), 1.0);

    // Mean over the spatial axes: one scalar per timestamp per band
    let graph = array
        .lazy()
        .reduce(ReduceDims::Space, Reducer::Mean)
        .into_graph();

    let config = ComputeConfig {
        workers: 4,
        max_retries: 3,
        initial_retry_delay: Duration::from_millis(1),
        max_retry_delay: Duration::from_millis(2),
        cache_bytes: 16 * 1024 * 1024,
    };
    let executor = Executor::with_config(store, config);
    let result = executor
        .execute(&graph, &ExecuteOptions::compute())
        .await
        .unwrap();

    assert_eq!(result.shape(), (3, 4, 1, 1));

    for band in BANDS {
        let series = result.time_series(band).unwrap();
        assert_eq!(series.len(), 3);
        // Monotonically time-ordered
        assert!(series.windows(2).all(|w| w[0].0 < w[1].0));
        let values: Vec<f32> = series.iter().map(|(_, v)| *v).collect();
        assert_eq!(values, vec![10.0, 20.0, 30.0]);
    }
}

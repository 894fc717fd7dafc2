//! End-to-end coverage over the in-memory container: both backends, the
//! coordinator, the parameter-limit fetch paths, and the single-flight
//! session cache.

use geopod_core::{MemoryFeatureTable, Predicate, Row, Value};
use geopod_spatial::{
    BackendKind, CancelToken, Envelope, FeatureIndexSession, GridIndex, IndexConfig,
    IndexOutcome, IndexStore, MemoryIndexStore, QueryOptions, SpatialError, WktCodec,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

fn wkt_row(id: i64, wkt: &str) -> Row {
    Row::new(id).with("geom", wkt.as_bytes().to_vec())
}

fn session_over(table: &MemoryFeatureTable) -> FeatureIndexSession {
    FeatureIndexSession::new(
        Arc::new(table.clone()),
        Arc::new(MemoryIndexStore::new("container-1")),
        Arc::new(WktCodec),
        IndexConfig::default(),
    )
    .with_native_range(Arc::new(table.clone()))
}

#[test]
fn end_to_end_index_query_stale_repair() {
    let table = MemoryFeatureTable::new("piers", 4326);
    table.put(wkt_row(1, "POINT(5.89 9.13)"));
    table.put(wkt_row(2, "LINESTRING(5.89 6.83, 8.38 9.13)"));

    let session = session_over(&table);
    let grid = session.grid();

    let outcome = grid.index(false, &CancelToken::new()).unwrap();
    assert_eq!(outcome.indexed(), 2);
    assert!(grid.is_indexed().unwrap());

    // Window covering both features.
    let window = Envelope::new(5.8, 6.8, 8.4, 9.2);
    let result = session
        .query(&QueryOptions::new().with_region(window))
        .unwrap();
    assert_eq!(result.count, 2);
    let rows = result.cursor.collect_rows().unwrap();
    assert_eq!(rows.iter().map(Row::id).collect::<Vec<_>>(), vec![1, 2]);

    // Move the point and advance the stamp without reindexing.
    let moved = wkt_row(1, "POINT(0.5 0.5)");
    table.put(moved.clone());
    assert!(!grid.is_indexed().unwrap());

    // Single-row repair restores freshness and reflects the new position.
    assert!(grid.index_row(&moved).unwrap());
    assert!(grid.is_indexed().unwrap());

    let old_spot = session
        .query(&QueryOptions::new().with_region(window))
        .unwrap();
    let ids: Vec<i64> = old_spot
        .cursor
        .collect_rows()
        .unwrap()
        .iter()
        .map(Row::id)
        .collect();
    assert_eq!(ids, vec![2]);

    let new_spot = session
        .query(&QueryOptions::new().with_region(Envelope::new(0.0, 0.0, 1.0, 1.0)))
        .unwrap();
    let ids: Vec<i64> = new_spot
        .cursor
        .collect_rows()
        .unwrap()
        .iter()
        .map(Row::id)
        .collect();
    assert_eq!(ids, vec![1]);
}

#[test]
fn unindexed_table_fails_fast_instead_of_returning_empty() {
    let table = MemoryFeatureTable::new("piers", 4326);
    table.put(wkt_row(1, "POINT(1 1)"));

    let session = session_over(&table);
    let err = session.query(&QueryOptions::new()).unwrap_err();
    assert!(matches!(err, SpatialError::NotIndexed(_)));
    let err = session.count(&QueryOptions::new()).unwrap_err();
    assert!(matches!(err, SpatialError::NotIndexed(_)));
}

#[test]
fn prioritize_switches_delegation_between_backends() {
    let table = MemoryFeatureTable::new("piers", 4326);
    table.put(wkt_row(1, "POINT(2 2)"));

    let mut session = session_over(&table);
    session.grid().index(false, &CancelToken::new()).unwrap();
    session.native_range().unwrap().create().unwrap();

    // Both backends exist and agree.
    let window = Envelope::new(1.0, 1.0, 3.0, 3.0);
    for kind in [BackendKind::Grid, BackendKind::NativeRange] {
        session.prioritize(kind);
        assert_eq!(session.backends()[0].kind(), kind);
        assert_eq!(
            session
                .count(&QueryOptions::new().with_region(window))
                .unwrap(),
            1
        );
    }

    // Writes flow into the trigger-maintained shadow without reindexing;
    // the grid only catches up through an index pass.
    table.put(wkt_row(9, "POINT(2.5 2.5)"));
    session.prioritize(BackendKind::NativeRange);
    assert_eq!(
        session
            .count(&QueryOptions::new().with_region(window))
            .unwrap(),
        2
    );
    session.prioritize(BackendKind::Grid);
    assert_eq!(
        session
            .count(&QueryOptions::new().with_region(window))
            .unwrap(),
        1
    );
}

#[test]
fn grid_only_session_falls_back_when_shadow_missing() {
    let table = MemoryFeatureTable::new("piers", 4326);
    table.put(wkt_row(1, "POINT(2 2)"));

    let mut session = session_over(&table);
    session.grid().index(false, &CancelToken::new()).unwrap();

    // Native range prioritized but never created: delegation falls
    // through to the backend that exists.
    session.prioritize(BackendKind::NativeRange);
    assert_eq!(session.count(&QueryOptions::new()).unwrap(), 1);
}

#[test]
fn parameter_limit_paths_return_identical_id_sets() {
    // Ceiling of 4 with 6 spatial hits forces the post-filter path.
    let tight = MemoryFeatureTable::new("piers", 4326).with_max_bind_parameters(4);
    let roomy = MemoryFeatureTable::new("piers", 4326);
    for table in [&tight, &roomy] {
        for id in 1..=6 {
            table.put(
                wkt_row(id, &format!("POINT({} {})", id, id))
                    .with("height", id * 10),
            );
        }
    }

    let window = Envelope::new(0.0, 0.0, 10.0, 10.0);
    let predicate = Predicate::new("height >= ?", vec![Value::Integer(30)]);
    let mut outputs = Vec::new();
    for table in [&tight, &roomy] {
        let session = session_over(table);
        session.grid().index(false, &CancelToken::new()).unwrap();
        let result = session
            .query(
                &QueryOptions::new()
                    .with_region(window)
                    .with_predicate(predicate.clone()),
            )
            .unwrap();
        let ids: Vec<i64> = result
            .cursor
            .collect_rows()
            .unwrap()
            .iter()
            .map(Row::id)
            .collect();
        outputs.push((ids, result.count));
    }

    // Same rows either way.
    assert_eq!(outputs[0].0, outputs[1].0);
    assert_eq!(outputs[0].0, vec![3, 4, 5, 6]);
    // Post-filter path tallies; IN path reports the id-set size.
    assert_eq!(outputs[0].1, 4);
    assert_eq!(outputs[1].1, 6);
}

#[test]
fn query_region_reprojects_through_transform_service() {
    use geopod_spatial::{EnvelopeTransform, TransformService};

    // A "web mercator" that is just a 2x scale of the table's CRS.
    struct HalfScale;
    impl TransformService for HalfScale {
        fn envelope_transform(
            &self,
            from: i64,
            to: i64,
        ) -> geopod_spatial::Result<EnvelopeTransform> {
            assert_eq!((from, to), (3857, 4326));
            Ok(Box::new(|e: &Envelope| {
                Envelope::new(e.min_x / 2.0, e.min_y / 2.0, e.max_x / 2.0, e.max_y / 2.0)
            }))
        }
    }

    let table = MemoryFeatureTable::new("piers", 4326);
    table.put(wkt_row(1, "POINT(2 2)"));

    let session = FeatureIndexSession::new(
        Arc::new(table.clone()),
        Arc::new(MemoryIndexStore::new("container-1")),
        Arc::new(WktCodec),
        IndexConfig::default(),
    )
    .with_transforms(Arc::new(HalfScale));
    session.grid().index(false, &CancelToken::new()).unwrap();

    // [3,3]x[5,5] in the foreign CRS lands on [1.5,1.5]x[2.5,2.5] here.
    let options = QueryOptions::new()
        .with_region(Envelope::new(3.0, 3.0, 5.0, 5.0))
        .with_region_srs(3857);
    assert_eq!(session.count(&options).unwrap(), 1);

    // Same window without the declared CRS misses.
    let options = QueryOptions::new().with_region(Envelope::new(3.0, 3.0, 5.0, 5.0));
    assert_eq!(session.count(&options).unwrap(), 0);
}

#[test]
fn cancelled_reindex_leaves_table_stale() {
    let table = MemoryFeatureTable::new("piers", 4326);
    for id in 0..10 {
        table.put(wkt_row(id, &format!("POINT({} {})", id, id)));
    }

    let grid = GridIndex::new(
        Arc::new(table.clone()),
        Arc::new(MemoryIndexStore::new("container-1")),
        Arc::new(WktCodec),
    )
    .with_config(IndexConfig::default().with_chunk_size(3));

    let cancel = CancelToken::new();
    cancel.cancel();
    assert_eq!(
        grid.index(false, &cancel).unwrap(),
        IndexOutcome::Cancelled { indexed: 0 }
    );
    assert!(!grid.is_indexed().unwrap());

    // A later uncancelled pass completes and claims freshness.
    let outcome = grid.index(false, &CancelToken::new()).unwrap();
    assert_eq!(outcome.indexed(), 10);
    assert!(grid.is_indexed().unwrap());
}

#[test]
fn session_fetch_row_is_single_flight() {
    let table = MemoryFeatureTable::new("piers", 4326);
    table.put(wkt_row(42, "POINT(1 1)"));

    let session = Arc::new(session_over(&table));
    session.grid().index(false, &CancelToken::new()).unwrap();

    let hits = Arc::new(AtomicUsize::new(0));
    let mut handles = Vec::new();
    for _ in 0..8 {
        let session = Arc::clone(&session);
        let hits = Arc::clone(&hits);
        handles.push(thread::spawn(move || {
            let row = session.fetch_row(42).unwrap().expect("row exists");
            hits.fetch_add(1, Ordering::SeqCst);
            row.id()
        }));
    }
    for handle in handles {
        assert_eq!(handle.join().unwrap(), 42);
    }
    assert_eq!(hits.load(Ordering::SeqCst), 8);

    // The published row is shared: repeated fetches return the same Arc.
    let first = session.fetch_row(42).unwrap().unwrap();
    let second = session.fetch_row(42).unwrap().unwrap();
    assert!(Arc::ptr_eq(&first, &second));
}

#[test]
fn query_results_prime_the_session_cache() {
    let table = MemoryFeatureTable::new("piers", 4326);
    table.put(wkt_row(7, "POINT(1 1)"));

    let session = session_over(&table);
    session.grid().index(false, &CancelToken::new()).unwrap();

    let result = session.query(&QueryOptions::new()).unwrap();
    let rows = result.cursor.collect_rows().unwrap();
    assert_eq!(rows.len(), 1);

    // The streamed row is already cached for fetch-by-id.
    assert!(session.row_cache().peek(7).is_some());
    assert_eq!(session.fetch_row(7).unwrap().unwrap().id(), 7);
}

#[test]
fn native_range_creation_unsupported_without_scalar_functions() {
    let table = MemoryFeatureTable::new("piers", 4326).with_scalar_functions(false);
    let session = session_over(&table);
    let err = session.native_range().unwrap().create().unwrap_err();
    assert!(matches!(err, SpatialError::Unsupported(_)));
}

#[test]
fn distinct_projection_flows_through_the_container() {
    let table = MemoryFeatureTable::new("piers", 4326);
    table.put(wkt_row(1, "POINT(1 1)").with("kind", "wharf"));
    table.put(wkt_row(2, "POINT(2 2)").with("kind", "wharf"));
    table.put(wkt_row(3, "POINT(3 3)").with("kind", "jetty"));

    let session = session_over(&table);
    session.grid().index(false, &CancelToken::new()).unwrap();

    let result = session
        .query(
            &QueryOptions::new()
                .with_columns(vec!["kind".to_string()])
                .with_distinct(true),
        )
        .unwrap();
    let kinds: Vec<String> = result
        .cursor
        .collect_rows()
        .unwrap()
        .iter()
        .map(|r| r.get("kind").and_then(Value::as_str).unwrap().to_string())
        .collect();
    assert_eq!(kinds, vec!["wharf", "jetty"]);
}

#[test]
fn indexing_different_tables_is_independent() {
    let store = Arc::new(MemoryIndexStore::new("container-1"));
    let docks = MemoryFeatureTable::new("docks", 4326);
    let buoys = MemoryFeatureTable::new("buoys", 4326);
    docks.put(wkt_row(1, "POINT(1 1)"));
    buoys.put(wkt_row(1, "POINT(9 9)"));

    let dock_grid = GridIndex::new(
        Arc::new(docks.clone()),
        Arc::clone(&store) as Arc<dyn geopod_spatial::IndexStore>,
        Arc::new(WktCodec),
    );
    let buoy_grid = GridIndex::new(
        Arc::new(buoys.clone()),
        Arc::clone(&store) as Arc<dyn geopod_spatial::IndexStore>,
        Arc::new(WktCodec),
    );

    let threads = [
        thread::spawn({
            let grid = dock_grid;
            move || grid.index(false, &CancelToken::new()).unwrap().indexed()
        }),
        thread::spawn({
            let grid = buoy_grid;
            move || grid.index(false, &CancelToken::new()).unwrap().indexed()
        }),
    ];
    for handle in threads {
        assert_eq!(handle.join().unwrap(), 1);
    }

    // Entries stayed scoped per table.
    assert_eq!(store.entry_count("docks").unwrap(), 1);
    assert_eq!(store.entry_count("buoys").unwrap(), 1);
}

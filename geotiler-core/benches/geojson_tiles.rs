use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};
use geojson::{Feature, FeatureCollection, GeoJson, Geometry, Value};
use geotiler_core::tiles::geojson::{ClusterIndex, GeoJsonDocument, GeoJsonOptions, TileIndex};
use geotiler_tile_utils::TileCoord;

/// A grid of points and a wavy line crossing it.
fn document() -> GeoJsonDocument {
    let mut features = Vec::new();
    for i in 0..100 {
        for j in 0..100 {
            let lng = -60.0 + f64::from(i) * 1.2;
            let lat = -50.0 + f64::from(j);
            features.push(Feature::from(Geometry::new(Value::Point(vec![lng, lat]))));
        }
    }
    let line = (0..2000)
        .map(|i| {
            let lng = -170.0 + f64::from(i) * 0.17;
            vec![lng, (lng / 10.0).sin() * 30.0]
        })
        .collect();
    features.push(Feature::from(Geometry::new(Value::LineString(line))));
    let collection = FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    };
    GeoJsonDocument::from_geojson(GeoJson::FeatureCollection(collection)).unwrap()
}

fn bench_build(c: &mut Criterion) {
    let document = document();
    c.bench_function("build_tile_index", |b| {
        b.iter(|| TileIndex::build(black_box(&document), &GeoJsonOptions::default()).unwrap());
    });
    c.bench_function("build_cluster_index", |b| {
        b.iter(|| {
            ClusterIndex::build(black_box(&document), &GeoJsonOptions::clustered(50, 14)).unwrap()
        });
    });
}

fn bench_tiles(c: &mut Criterion) {
    let document = document();
    let tiles = TileIndex::build(&document, &GeoJsonOptions::default()).unwrap();
    let clusters = ClusterIndex::build(&document, &GeoJsonOptions::clustered(50, 14)).unwrap();
    let xyz = TileCoord::new_unchecked(3, 4, 3);
    c.bench_function("get_tile", |b| b.iter(|| tiles.get_tile(black_box(xyz))));
    c.bench_function("get_cluster_tile", |b| {
        b.iter(|| clusters.get_tile(black_box(xyz)));
    });
}

criterion_group!(benches, bench_build, bench_tiles);
criterion_main!(benches);

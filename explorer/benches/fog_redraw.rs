use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use explorer::config::FogStyle;
use explorer::fog::render;
use explorer::geo::ScreenPoint;
use explorer::viewport::{HeadlessMap, MapEngine};
use shared::{Camera, GeoPoint};

const HAMPI: GeoPoint = GeoPoint::new(15.3350, 76.4600);

/// A loose spiral walk around the town center.
fn walk(points: usize) -> Vec<GeoPoint> {
    (0..points)
        .map(|i| {
            let t = i as f64 * 0.05;
            let r = 0.00002 * i as f64;
            GeoPoint::new(HAMPI.lat + r * t.sin(), HAMPI.lng + r * t.cos())
        })
        .collect()
}

fn map(zoom: f64) -> HeadlessMap {
    HeadlessMap::new(
        Camera {
            center: HAMPI,
            zoom,
            pitch: 0.0,
            bearing: 0.0,
        },
        1280,
        800,
    )
}

fn benchmark_redraw_by_history(c: &mut Criterion) {
    let style = FogStyle::default();
    let engine = map(15.0);
    let mut group = c.benchmark_group("fog_redraw_history");
    group.sample_size(20);

    for points in [10, 100, 1_000, 5_000] {
        let path = walk(points);
        group.bench_with_input(BenchmarkId::from_parameter(points), &path, |b, path| {
            b.iter(|| {
                render(black_box(path), &style, 1280, 800, |p: GeoPoint| -> ScreenPoint {
                    engine.project(p)
                })
            });
        });
    }

    group.finish();
}

fn benchmark_redraw_by_zoom(c: &mut Criterion) {
    let style = FogStyle::default();
    let path = walk(2_000);
    let mut group = c.benchmark_group("fog_redraw_zoom");
    group.sample_size(20);

    // Zoomed in, most of the history is culled off-screen.
    for zoom in [13.0, 15.0, 17.0] {
        let engine = map(zoom);
        group.bench_with_input(BenchmarkId::from_parameter(zoom), &path, |b, path| {
            b.iter(|| render(black_box(path), &style, 1280, 800, |p| engine.project(p)));
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_redraw_by_history, benchmark_redraw_by_zoom);
criterion_main!(benches);

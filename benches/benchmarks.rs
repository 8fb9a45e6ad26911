use criterion::{criterion_group, criterion_main, Criterion};
use serde_json::json;
use url::Url;

use stacrio::{
    components::{
        fetch::FileFetcher,
        source::{MemoryRaster, MemorySource},
        transforms::{GeoTransform, GridSpec},
    },
    Bbox, CatalogEntry, CatalogReader, Crs, Materializer,
};

const SIZE: usize = 1024;

fn grid(resolution: f64, size: usize) -> GridSpec {
    GridSpec::new(
        GeoTransform::new(resolution, 0., 0., 0., -resolution, 10.),
        (size, size),
        Crs::WGS84,
        "bench",
    )
    .unwrap()
}

fn asset(href: &str, grid: &GridSpec) -> serde_json::Value {
    let (width, height) = grid.shape();
    let transform = grid.transform();
    json!({
        "href": href,
        "proj:shape": [height, width],
        "proj:transform": [transform.a(), 0.0, transform.xoff(), 0.0, transform.e(), transform.yoff()],
    })
}

fn setup() -> (MemorySource, CatalogEntry) {
    let fine = grid(10. / SIZE as f64, SIZE);
    let coarse = grid(20. / SIZE as f64, SIZE / 2);
    let source = MemorySource::new()
        .with_raster("mem://red", MemoryRaster::from_fn(fine, |column, row| (row ^ column) as f64))
        .with_raster("mem://green", MemoryRaster::from_fn(fine, |column, _| column as f64))
        .with_raster("mem://swir", MemoryRaster::from_fn(coarse, |_, row| row as f64));
    let document = json!({
        "type": "Feature",
        "id": "bench",
        "bbox": [0.0, 0.0, 10.0, 10.0],
        "properties": {"datetime": "2021-07-20T18:30:00Z", "proj:epsg": 4326},
        "assets": {
            "red": asset("mem://red", &fine),
            "green": asset("mem://green", &fine),
            "swir": asset("mem://swir", &coarse),
        }
    });
    let entry = CatalogReader::new(FileFetcher)
        .entry_from_value(document, &Url::parse("https://example.com/bench.json").unwrap())
        .unwrap();
    (source, entry)
}

fn bench_realize_bands(c: &mut Criterion) {
    let (source, entry) = setup();
    let array = Materializer::new(&source)
        .stack_bands::<f32>(&entry, &["red", "green", "swir"], None)
        .unwrap();
    c.bench_function("realize_bands", |b| b.iter(|| array.realize(&source).unwrap()));
}

fn bench_realize_clipped(c: &mut Criterion) {
    let (source, entry) = setup();
    let clip = Bbox::new(2.5, 2.5, 7.5, 7.5).unwrap();
    let array = Materializer::new(&source)
        .stack_bands::<u16>(&entry, &["red", "swir"], Some(&clip))
        .unwrap();
    c.bench_function("realize_clipped", |b| b.iter(|| array.realize(&source).unwrap()));
}

criterion_group!(benches, bench_realize_bands, bench_realize_clipped);
criterion_main!(benches);

use criterion::{criterion_group, criterion_main, Criterion};
use geodata::{
    backends::{
        memory::{MemoryDataset, MemoryRaster},
        SampleType,
    },
    Dataset, Interpolation,
};
use std::hint::black_box;

const SIZE: (usize, usize) = (2000, 2000);

fn elevation_dataset() -> Dataset {
    let data = (0..SIZE.1)
        .flat_map(|row| (0..SIZE.0).map(move |col| 200.0 + col as f64 * 0.5 - row as f64 * 0.25))
        .collect();
    let raster = MemoryRaster::new(
        SIZE,
        [1540000.0, 5.0, 0.0, 5925000.0, 0.0, -5.0],
        SampleType::Float,
        vec![data],
    )
    .unwrap();
    Dataset::from_native(
        "dem.mem",
        false,
        Box::new(MemoryDataset::new().with_raster("dem", raster)),
    )
}

fn bench_get_image(c: &mut Criterion) {
    let layer = elevation_dataset().get_raster_layer("dem");
    c.bench_function("get_image_nearest", |b| {
        b.iter(|| {
            layer.get_image(
                black_box(1542000.0),
                black_box(5923000.0),
                5000.0,
                256,
                Interpolation::Nearest,
            )
        })
    });
    c.bench_function("get_image_bilinear", |b| {
        b.iter(|| {
            layer.get_image(
                black_box(1542000.0),
                black_box(5923000.0),
                5000.0,
                256,
                Interpolation::Bilinear,
            )
        })
    });
}

fn bench_point_sampling(c: &mut Criterion) {
    let layer = elevation_dataset().get_raster_layer("dem");
    c.bench_function("get_value_at_position", |b| {
        b.iter(|| layer.get_value_at_position(black_box(1545000.0), black_box(5920000.0)))
    });
}

criterion_group!(benches, bench_get_image, bench_point_sampling);
criterion_main!(benches);

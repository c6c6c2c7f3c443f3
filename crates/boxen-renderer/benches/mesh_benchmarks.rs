//! Mesh Benchmarks
//!
//! Bounds recomputation, in-place transforms, and GPU mirror re-uploads on
//! large meshes using the headless backend

use std::hint::black_box;
use std::sync::Arc;

use boxen_renderer::{HeadlessBackend, Mesh, SharedBackend, Vertex};
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use glam::{Mat4, Quat, Vec2, Vec3};

fn grid(count: usize) -> (Vec<Vertex>, Vec<u32>) {
    let side = (count as f32).sqrt().ceil() as usize;
    let vertices: Vec<Vertex> = (0..count)
        .map(|i| {
            let (x, z) = ((i % side) as f32, (i / side) as f32);
            Vertex::new(Vec3::new(x, (x * 0.1).sin(), z), Vec3::Y, Vec2::new(x, z))
        })
        .collect();
    let indices = (0..count as u32 - 2).flat_map(|i| [i, i + 1, i + 2]).collect();
    (vertices, indices)
}

fn backend() -> SharedBackend {
    Arc::new(HeadlessBackend::new())
}

fn bench_calculate_bounds(c: &mut Criterion) {
    let mut group = c.benchmark_group("mesh_calculate_bounds");

    for count in [1_000, 10_000, 100_000].iter() {
        let (vertices, indices) = grid(*count);
        let mut mesh = Mesh::new(backend(), vertices, indices).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, _| {
            b.iter(|| {
                mesh.calculate_bounds();
                black_box(mesh.bounds().radius)
            });
        });
    }

    group.finish();
}

fn bench_transform(c: &mut Criterion) {
    let mut group = c.benchmark_group("mesh_transform");
    let matrix = Mat4::from_scale_rotation_translation(
        Vec3::new(1.0, 2.0, 1.0),
        Quat::from_rotation_y(0.01),
        Vec3::new(0.0, 0.1, 0.0),
    );

    for count in [1_000, 10_000, 100_000].iter() {
        let (vertices, indices) = grid(*count);
        let mut mesh = Mesh::new(backend(), vertices, indices).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, _| {
            b.iter(|| mesh.transform(black_box(matrix)));
        });
    }

    group.finish();
}

fn bench_set_vertices(c: &mut Criterion) {
    let mut group = c.benchmark_group("mesh_set_vertices");

    for count in [1_000, 10_000, 100_000].iter() {
        let (vertices, indices) = grid(*count);
        let mut mesh = Mesh::new(backend(), vertices.clone(), indices).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, _| {
            b.iter(|| mesh.set_vertices(vertices.as_slice()).unwrap());
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_calculate_bounds,
    bench_transform,
    bench_set_vertices
);
criterion_main!(benches);

use std::hint::black_box;
use std::time::Instant;

use glam::{Mat4, Vec3};
use lumen_common::{Aabb, Frustum};
use lumen_cull::SpatialGrid;

fn make_bounds(object_count: usize, spacing: f32) -> Vec<Aabb> {
    let side = (object_count as f32).sqrt().ceil() as usize;
    (0..object_count)
        .map(|i| {
            let x = (i % side) as f32 * spacing;
            let z = (i / side) as f32 * -spacing;
            Aabb::from_half_width(Vec3::new(x, 0.0, z), Vec3::splat(0.5))
        })
        .collect()
}

fn frustum() -> Frustum {
    let proj = Mat4::perspective_rh(60f32.to_radians(), 16.0 / 9.0, 0.1, 200.0);
    let view = Mat4::look_to_rh(Vec3::new(0.0, 2.0, 5.0), Vec3::NEG_Z, Vec3::Y);
    Frustum::from_view_projection(&(proj * view))
}

fn bench_rebuild(object_count: usize, iterations: usize) {
    let bounds = make_bounds(object_count, 4.0);
    let mut grid = SpatialGrid::new(32.0, 64).unwrap();

    let start = Instant::now();
    for _ in 0..iterations {
        grid.rebuild(black_box(&bounds));
    }
    let elapsed = start.elapsed();
    let per_iter = elapsed / iterations as u32;
    println!(
        "  rebuild ({object_count} objects, {iterations} iters): {per_iter:?}/iter, total {elapsed:?}"
    );
}

fn bench_refit(object_count: usize, moving_every: usize, iterations: usize) {
    let mut bounds = make_bounds(object_count, 4.0);
    let mut grid = SpatialGrid::new(32.0, 64).unwrap();
    grid.rebuild(&bounds);

    let start = Instant::now();
    for i in 0..iterations {
        // Shuffle a subset of objects back and forth across cell borders.
        let offset = if i % 2 == 0 { 40.0 } else { -40.0 };
        for aabb in bounds.iter_mut().step_by(moving_every) {
            *aabb = Aabb::new(aabb.min + Vec3::X * offset, aabb.max + Vec3::X * offset);
        }
        let _ = black_box(grid.refit(black_box(&bounds)));
    }
    let elapsed = start.elapsed();
    let per_iter = elapsed / iterations as u32;
    println!(
        "  refit ({object_count} objects, 1/{moving_every} moving, {iterations} iters): {per_iter:?}/iter, total {elapsed:?}"
    );
}

fn bench_query(object_count: usize, iterations: usize) {
    let bounds = make_bounds(object_count, 4.0);
    let mut grid = SpatialGrid::new(32.0, 64).unwrap();
    grid.rebuild(&bounds);
    let frustum = frustum();
    let mut out = Vec::new();

    let start = Instant::now();
    for _ in 0..iterations {
        grid.query(black_box(&frustum), black_box(&bounds), &mut out);
        black_box(out.len());
    }
    let elapsed = start.elapsed();
    let per_iter = elapsed / iterations as u32;
    println!(
        "  grid query ({object_count} objects, {} visible, {iterations} iters): {per_iter:?}/iter, total {elapsed:?}",
        out.len()
    );
}

fn bench_brute_force(object_count: usize, iterations: usize) {
    let bounds = make_bounds(object_count, 4.0);
    let frustum = frustum();

    let start = Instant::now();
    for _ in 0..iterations {
        let visible = bounds
            .iter()
            .filter(|aabb| frustum.check_box_fast(black_box(aabb)))
            .count();
        black_box(visible);
    }
    let elapsed = start.elapsed();
    let per_iter = elapsed / iterations as u32;
    println!(
        "  brute force ({object_count} objects, {iterations} iters): {per_iter:?}/iter, total {elapsed:?}"
    );
}

fn main() {
    println!("=== Culling Benchmarks ===\n");

    println!("Grid rebuild:");
    bench_rebuild(1000, 100);
    bench_rebuild(10000, 10);
    bench_rebuild(100000, 2);

    println!("\nGrid refit:");
    bench_refit(10000, 100, 100);
    bench_refit(10000, 10, 100);
    bench_refit(100000, 100, 10);

    println!("\nFrustum query:");
    bench_query(1000, 1000);
    bench_query(10000, 100);
    bench_query(100000, 10);

    println!("\nBrute force:");
    bench_brute_force(1000, 1000);
    bench_brute_force(10000, 100);
    bench_brute_force(100000, 10);

    println!("\n=== Done ===");
}

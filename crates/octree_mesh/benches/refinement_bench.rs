//! Refinement driver benchmarks.
//!
//! Runs the whole stage sequence around a sphere:
//! - **background**: uniform tree and classification only
//! - **full_run**: every stage up to the final balance
//! - **partitioned**: the full run on two in-process partitions

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use glam::DVec3;
use octree_mesh::parallel::{run_partitioned, MortonDecomposer, SerialCommunicator};
use octree_mesh::surface::ShellSet;
use octree_mesh::{MeshGeometry, RefineDriver, RefinementParameters, TriSurface};

fn sphere(min_level: u32, max_level: u32) -> TriSurface {
  let mut surface = TriSurface::new();
  surface
    .add_surface(
      "sphere",
      TriSurface::sphere(DVec3::splat(0.5), 0.3, 3),
      min_level,
      max_level,
    )
    .expect("sphere has triangles");
  surface
}

fn geometry<'g>(surface: &'g TriSurface, shells: &'g ShellSet) -> MeshGeometry<'g, TriSurface> {
  MeshGeometry {
    surface,
    features: &[],
    shells,
    keep_point: DVec3::splat(0.5),
    cell_zones: Vec::new(),
  }
}

fn params() -> RefinementParameters {
  RefinementParameters {
    max_cell_size: 0.125,
    ..Default::default()
  }
}

fn bench_background(c: &mut Criterion) {
  let mut group = c.benchmark_group("background");
  let shells = ShellSet::new();
  for cell_size in [0.125, 0.0625] {
    let surface = sphere(3, 3);
    group.bench_with_input(BenchmarkId::from_parameter(cell_size), &cell_size, |b, &cell_size| {
      b.iter(|| {
        let params = RefinementParameters {
          max_cell_size: cell_size,
          ..Default::default()
        };
        let driver = RefineDriver::background(SerialCommunicator, MortonDecomposer, geometry(&surface, &shells), params)
          .expect("background");
        black_box(driver.octree().number_of_leaves())
      })
    });
  }
  group.finish();
}

fn bench_full_run(c: &mut Criterion) {
  let mut group = c.benchmark_group("full_run");
  group.sample_size(10);
  let shells = ShellSet::new();
  for level in [4u32, 5] {
    let surface = sphere(level, level);
    group.bench_with_input(BenchmarkId::new("surface_level", level), &level, |b, _| {
      b.iter(|| {
        let mut driver =
          RefineDriver::background(SerialCommunicator, MortonDecomposer, geometry(&surface, &shells), params())
            .expect("background");
        black_box(driver.run().expect("run").n_cells)
      })
    });
  }
  group.finish();
}

fn bench_partitioned(c: &mut Criterion) {
  let mut group = c.benchmark_group("partitioned");
  group.sample_size(10);
  group.bench_function("two_partitions", |b| {
    b.iter(|| {
      let results = run_partitioned(2, |comm| {
        let surface = sphere(4, 4);
        let shells = ShellSet::new();
        let mut driver = RefineDriver::background(comm, MortonDecomposer, geometry(&surface, &shells), params())?;
        driver.run().map(|summary| summary.n_cells)
      })
      .expect("pool starts");
      black_box(results)
    })
  });
  group.finish();
}

criterion_group!(benches, bench_background, bench_full_run, bench_partitioned);
criterion_main!(benches);

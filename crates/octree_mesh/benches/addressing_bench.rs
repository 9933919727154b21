//! Addressing and extraction benchmarks on balanced trees.
//!
//! - **nodes / faces / edges**: cold computation of each table family
//! - **extract**: polyhedral mesh with and without split-hex decomposition

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use glam::DVec3;
use octree_mesh::{AddressingSettings, BoundBox, MeshExtractor, Octree, OctreeAddressing};

/// Uniform tree at `level` with the leaves in the lower corner octant
/// refined once more.
fn graded_tree(level: u32) -> Octree {
  let mut tree = Octree::new(BoundBox::new(DVec3::ZERO, DVec3::ONE));
  tree.refine_uniformly(level).expect("uniform refinement");
  let corner: Vec<usize> = (0..tree.number_of_leaves())
    .filter(|&leaf| tree.leaf_centre(leaf).max_element() < 0.5)
    .collect();
  let closure = tree.consistent_refinement(&corner, true);
  tree.refine_selected(&closure).expect("corner refinement");
  tree
}

fn settings() -> AddressingSettings {
  AddressingSettings {
    use_data_boxes: false,
    rank: 0,
  }
}

fn bench_tables(c: &mut Criterion) {
  let mut group = c.benchmark_group("addressing");
  for level in [3u32, 4] {
    let tree = graded_tree(level);
    group.bench_with_input(BenchmarkId::new("nodes", level), &tree, |b, tree| {
      b.iter(|| {
        let addr = OctreeAddressing::new(tree, settings());
        black_box(addr.number_of_nodes())
      })
    });
    group.bench_with_input(BenchmarkId::new("faces", level), &tree, |b, tree| {
      b.iter(|| {
        let addr = OctreeAddressing::new(tree, settings());
        black_box(addr.octree_face_loops().len())
      })
    });
    group.bench_with_input(BenchmarkId::new("edges", level), &tree, |b, tree| {
      b.iter(|| {
        let addr = OctreeAddressing::new(tree, settings());
        black_box(addr.edge_leaves().len())
      })
    });
  }
  group.finish();
}

fn bench_extract(c: &mut Criterion) {
  let mut group = c.benchmark_group("extract");
  let tree = graded_tree(4);
  for decompose in [false, true] {
    group.bench_with_input(BenchmarkId::new("decompose", decompose), &decompose, |b, &decompose| {
      b.iter(|| {
        let addr = OctreeAddressing::new(&tree, settings());
        let mesh = MeshExtractor::new(&addr)
          .decompose_split_hexes(decompose)
          .create_mesh()
          .expect("extraction");
        black_box(mesh.n_cells())
      })
    });
  }
  group.finish();
}

criterion_group!(benches, bench_tables, bench_extract);
criterion_main!(benches);

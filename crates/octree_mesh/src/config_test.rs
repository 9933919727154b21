use super::*;

const MINIMAL: &str = r#"
max_cell_size = 0.25
keep_point = [0.1, 0.1, 0.1]
"#;

const FULL: &str = r#"
max_cell_size = 0.5
keep_point = [0.0, 0.0, 2.0]

[refinement]
max_global_cells = 5000
max_local_cells = 2500
n_buffer_layers = 2
curvature_angle = 45.0
merge_patch_faces = true

[[surfaces]]
file = "body.stl"
min_level = 2
max_level = 4
cell_zone = "solid"

[[features]]
file = "edges.obj"
level = 3

[[shells]]
kind = "box"
min = [0.0, 0.0, 0.0]
max = [1.0, 1.0, 1.0]
level = 2

[[shells]]
kind = "sphere"
centre = [0.5, 0.5, 0.5]
radius = 0.25
mode = "outside"
level = 1
"#;

// =========================================================================
// Parsing
// =========================================================================

/// Omitted sections fall back to their defaults.
#[test]
fn test_minimal_dictionary_uses_defaults() {
  let dict = MeshDict::from_toml_str(MINIMAL).expect("minimal dictionary is valid");
  assert_eq!(dict.max_cell_size, 0.25);
  assert_eq!(dict.keep_point(), DVec3::splat(0.1));
  assert_eq!(dict.refinement.max_global_cells, 2_000_000);
  assert_eq!(dict.refinement.n_buffer_layers, 1);
  assert!(dict.refinement.allow_split_hex);
  assert!(dict.refinement.decompose_split_hexes);
  assert!(!dict.refinement.merge_patch_faces);
  assert!(dict.surfaces.is_empty());
  assert!(dict.build_shells().is_empty());
}

#[test]
fn test_full_dictionary() {
  let dict = MeshDict::from_toml_str(FULL).expect("full dictionary is valid");
  assert_eq!(dict.refinement.max_local_cells, 2500);
  assert_eq!(dict.refinement.n_buffer_layers, 2);
  assert!(dict.refinement.merge_patch_faces);
  assert!((dict.curvature_cosine() - 45f64.to_radians().cos()).abs() < 1e-12);

  assert_eq!(dict.surfaces[0].max_level, Some(4));
  assert_eq!(dict.cell_zones(), vec![Some("solid".to_string())]);
  assert_eq!(dict.features[0].level, 3);

  assert_eq!(dict.shells.len(), 2);
  assert_eq!(dict.shells[1].mode, ShellModeEntry::Outside);
  let shells = dict.build_shells();
  assert_eq!(shells.find_higher_level(DVec3::splat(0.5), 0), Some(2));
  // Outside the unit box and outside the sphere only the sphere shell applies.
  assert_eq!(shells.find_higher_level(DVec3::splat(3.0), 0), Some(1));
}

#[test]
fn test_curvature_switched_off_above_half_turn() {
  let dict = MeshDict::from_toml_str(&format!("{MINIMAL}\n[refinement]\ncurvature_angle = 190.0\n"))
    .expect("valid dictionary");
  assert!(dict.curvature_cosine() < -1.0);
}

// =========================================================================
// Validation
// =========================================================================

#[test]
fn test_rejects_non_positive_cell_size() {
  let result = MeshDict::from_toml_str("max_cell_size = 0.0\nkeep_point = [0.0, 0.0, 0.0]\n");
  assert!(matches!(result, Err(MeshError::Config(_))));
}

#[test]
fn test_rejects_inverted_levels() {
  let toml = format!("{MINIMAL}\n[[surfaces]]\nfile = \"a.stl\"\nmin_level = 3\nmax_level = 2\n");
  assert!(matches!(MeshDict::from_toml_str(&toml), Err(MeshError::Config(_))));
}

#[test]
fn test_rejects_level_beyond_limit() {
  let toml = format!("{MINIMAL}\n[[features]]\nfile = \"e.obj\"\nlevel = 31\n");
  assert!(matches!(MeshDict::from_toml_str(&toml), Err(MeshError::Config(_))));
}

#[test]
fn test_rejects_bad_unbalance() {
  let toml = format!("{MINIMAL}\n[refinement]\nmax_load_unbalance = 1.5\n");
  assert!(matches!(MeshDict::from_toml_str(&toml), Err(MeshError::Config(_))));
}

#[test]
fn test_rejects_unknown_keys() {
  let toml = format!("{MINIMAL}\nmax_cells = 10\n");
  assert!(matches!(MeshDict::from_toml_str(&toml), Err(MeshError::Toml(_))));
}

/// Relative paths in a dictionary file are resolved next to it.
#[test]
fn test_load_resolves_relative_paths() {
  let dir = std::env::temp_dir().join(format!("octree_mesh_cfg_{}", std::process::id()));
  std::fs::create_dir_all(&dir).expect("temp dir");
  let path = dir.join("meshDict.toml");
  std::fs::write(&path, FULL).expect("writable");

  let dict = MeshDict::load(&path).expect("loads");
  assert_eq!(dict.surfaces[0].file, dir.join("body.stl"));
  assert_eq!(dict.features[0].file, dir.join("edges.obj"));
  std::fs::remove_dir_all(&dir).ok();
}

use crate::extract::ZoneMap;
use crate::octree::LeafId;
use crate::parallel::{Communicator, Decomposer};
use crate::surface::SurfaceQuery;

use super::RefineDriver;

impl<C, D, S> RefineDriver<'_, C, D, S>
where
  C: Communicator,
  D: Decomposer,
  S: SurfaceQuery + ?Sized,
{
  /// Give every owned mesh leaf the zone of the first zoned surface
  /// containing its centre. Returns the number of zoned leaves.
  pub(super) fn assign_zones(&mut self) -> usize {
    let mut names: Vec<String> = Vec::new();
    let mut zone_of_surface: Vec<Option<usize>> = Vec::with_capacity(self.geometry.cell_zones.len());
    for zone in &self.geometry.cell_zones {
      zone_of_surface.push(zone.as_ref().map(|name| match names.iter().position(|n| n == name) {
        Some(z) => z,
        None => {
          names.push(name.clone());
          names.len() - 1
        }
      }));
    }

    let octree = &self.octree;
    let surface = self.geometry.surface;
    let rank = self.comm.rank();
    let use_data_boxes = self.params.use_data_boxes;
    let zone_at = |leaf: LeafId| {
      if octree.owner(leaf) != rank || !octree.cube_type(leaf).is_mesh(use_data_boxes) {
        return None;
      }
      let centre = octree.leaf_centre(leaf);
      zone_of_surface
        .iter()
        .enumerate()
        .find_map(|(s, zone)| zone.filter(|_| surface.contains(s, centre)))
    };
    let zone_of: Vec<Option<usize>> = (0..octree.number_of_leaves()).map(zone_at).collect();

    let n_zoned = zone_of.iter().filter(|z| z.is_some()).count();
    self.zones = ZoneMap { names, zone_of };
    n_zoned
  }
}

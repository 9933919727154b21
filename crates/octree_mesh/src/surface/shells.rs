//! Refinement shells: volumes with a target level.

use glam::DVec3;

use crate::geometry::BoundBox;

/// Which side of the shell boundary is refined.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ShellMode {
  #[default]
  Inside,
  Outside,
}

impl ShellMode {
  fn selects(self, inside: bool) -> bool {
    match self {
      ShellMode::Inside => inside,
      ShellMode::Outside => !inside,
    }
  }
}

/// Point-in-volume test with an associated refinement level.
pub trait RefinementShell: Send + Sync {
  /// Level required at `p`, if the shell covers it.
  fn level_at(&self, p: DVec3) -> Option<u32>;
}

#[derive(Clone, Debug)]
pub struct BoxShell {
  pub bounds: BoundBox,
  pub mode: ShellMode,
  pub level: u32,
}

impl RefinementShell for BoxShell {
  fn level_at(&self, p: DVec3) -> Option<u32> {
    self.mode.selects(self.bounds.contains_point(p)).then_some(self.level)
  }
}

#[derive(Clone, Debug)]
pub struct SphereShell {
  pub centre: DVec3,
  pub radius: f64,
  pub mode: ShellMode,
  pub level: u32,
}

impl RefinementShell for SphereShell {
  fn level_at(&self, p: DVec3) -> Option<u32> {
    let inside = p.distance_squared(self.centre) <= self.radius * self.radius;
    self.mode.selects(inside).then_some(self.level)
  }
}

impl<S: RefinementShell + ?Sized> RefinementShell for Box<S> {
  fn level_at(&self, p: DVec3) -> Option<u32> {
    (**self).level_at(p)
  }
}

/// All configured shells; the finest level wins.
#[derive(Default)]
pub struct ShellSet {
  shells: Vec<Box<dyn RefinementShell>>,
}

impl ShellSet {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn push(&mut self, shell: impl RefinementShell + 'static) {
    self.shells.push(Box::new(shell));
  }

  pub fn is_empty(&self) -> bool {
    self.shells.is_empty()
  }

  pub fn len(&self) -> usize {
    self.shells.len()
  }

  /// Finest shell level at `p` if it exceeds `current_level`.
  pub fn find_higher_level(&self, p: DVec3, current_level: u32) -> Option<u32> {
    self
      .shells
      .iter()
      .filter_map(|shell| shell.level_at(p))
      .max()
      .filter(|&level| level > current_level)
  }
}

impl std::fmt::Debug for ShellSet {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ShellSet").field("shells", &self.shells.len()).finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_box_shell_modes() {
    let bounds = BoundBox::new(DVec3::ZERO, DVec3::ONE);
    let inside = BoxShell { bounds, mode: ShellMode::Inside, level: 3 };
    let outside = BoxShell { bounds, mode: ShellMode::Outside, level: 2 };
    assert_eq!(inside.level_at(DVec3::splat(0.5)), Some(3));
    assert_eq!(inside.level_at(DVec3::splat(1.5)), None);
    assert_eq!(outside.level_at(DVec3::splat(0.5)), None);
    assert_eq!(outside.level_at(DVec3::splat(1.5)), Some(2));
  }

  #[test]
  fn test_finest_shell_wins() {
    let mut shells = ShellSet::new();
    shells.push(BoxShell {
      bounds: BoundBox::new(DVec3::ZERO, DVec3::ONE),
      mode: ShellMode::Inside,
      level: 2,
    });
    shells.push(SphereShell {
      centre: DVec3::splat(0.5),
      radius: 0.2,
      mode: ShellMode::Inside,
      level: 4,
    });

    assert_eq!(shells.len(), 2);
    assert_eq!(shells.find_higher_level(DVec3::splat(0.5), 0), Some(4));
    assert_eq!(shells.find_higher_level(DVec3::splat(0.1), 0), Some(2));
    assert_eq!(shells.find_higher_level(DVec3::splat(0.1), 2), None);
    assert_eq!(shells.find_higher_level(DVec3::splat(2.0), 0), None);
  }
}

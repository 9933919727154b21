//! Leaf and node classification flags.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Combinable classification flags of a leaf or a node.
///
/// A leaf can carry several flags at once, e.g. `MESHCELL | SPLITHEX`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BoxType(u8);

impl BoxType {
  pub const NONE: Self = Self(0);
  /// Leaf becomes a mesh cell on this rank.
  pub const MESHCELL: Self = Self(1);
  /// Leaf is cut by the surface.
  pub const BOUNDARY: Self = Self(2);
  /// Mesh cell with a finer leaf across a face or an edge.
  pub const SPLITHEX: Self = Self(4);
  pub const INNERNODE: Self = Self(8);
  pub const OUTERNODE: Self = Self(16);
  pub const BOUNDARYNODE: Self = Self(32);

  pub const fn bits(self) -> u8 {
    self.0
  }

  /// True when every flag of `other` is set.
  #[inline]
  pub const fn contains(self, other: Self) -> bool {
    self.0 & other.0 == other.0
  }

  #[inline]
  pub const fn is_empty(self) -> bool {
    self.0 == 0
  }
}

impl BitOr for BoxType {
  type Output = Self;
  fn bitor(self, rhs: Self) -> Self {
    Self(self.0 | rhs.0)
  }
}

impl BitOrAssign for BoxType {
  fn bitor_assign(&mut self, rhs: Self) {
    self.0 |= rhs.0;
  }
}

impl fmt::Debug for BoxType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    const NAMES: [&str; 6] = ["MESHCELL", "BOUNDARY", "SPLITHEX", "INNERNODE", "OUTERNODE", "BOUNDARYNODE"];
    if self.is_empty() {
      return f.write_str("NONE");
    }
    let set: Vec<&str> = NAMES
      .iter()
      .enumerate()
      .filter(|(bit, _)| self.0 & (1 << bit) != 0)
      .map(|(_, name)| *name)
      .collect();
    f.write_str(&set.join(" | "))
  }
}

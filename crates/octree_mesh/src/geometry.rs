//! Double precision bounding boxes and the intersection predicates used by
//! the surface queries.

use glam::DVec3;

/// Double-precision axis-aligned bounding box.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundBox {
	/// Minimum corner (inclusive).
	pub min: DVec3,
	/// Maximum corner (inclusive).
	pub max: DVec3,
}

impl BoundBox {
	/// Create a new box from min and max corners.
	///
	/// # Panics
	/// Debug-asserts that min <= max on all axes.
	pub fn new(min: DVec3, max: DVec3) -> Self {
		debug_assert!(
			min.x <= max.x && min.y <= max.y && min.z <= max.z,
			"BoundBox min must be <= max on all axes"
		);
		Self { min, max }
	}

	pub fn from_center_half_extents(center: DVec3, half_extents: DVec3) -> Self {
		Self {
			min: center - half_extents,
			max: center + half_extents,
		}
	}

	/// Smallest box holding every point, or `None` for an empty iterator.
	pub fn from_points(points: impl IntoIterator<Item = DVec3>) -> Option<Self> {
		let mut points = points.into_iter();
		let first = points.next()?;
		let (min, max) = points.fold((first, first), |(min, max), p| (min.min(p), max.max(p)));
		Some(Self { min, max })
	}

	/// Two boxes overlap if they share any interior or boundary points.
	#[inline]
	pub fn overlaps(&self, other: &BoundBox) -> bool {
		self.min.x <= other.max.x
			&& self.max.x >= other.min.x
			&& self.min.y <= other.max.y
			&& self.max.y >= other.min.y
			&& self.min.z <= other.max.z
			&& self.max.z >= other.min.z
	}

	#[inline]
	pub fn contains_point(&self, point: DVec3) -> bool {
		point.x >= self.min.x
			&& point.x <= self.max.x
			&& point.y >= self.min.y
			&& point.y <= self.max.y
			&& point.z >= self.min.z
			&& point.z <= self.max.z
	}

	#[inline]
	pub fn size(&self) -> DVec3 {
		self.max - self.min
	}

	#[inline]
	pub fn center(&self) -> DVec3 {
		(self.min + self.max) * 0.5
	}

	/// Box grown by `margin` on every side.
	pub fn enlarged(&self, margin: f64) -> Self {
		Self {
			min: self.min - DVec3::splat(margin),
			max: self.max + DVec3::splat(margin),
		}
	}

	pub fn union(&self, other: &BoundBox) -> Self {
		Self {
			min: self.min.min(other.min),
			max: self.max.max(other.max),
		}
	}

	/// Slab test for the closed segment `start..=end`.
	pub fn intersects_segment(&self, start: DVec3, end: DVec3) -> bool {
		let dir = end - start;
		let mut t_enter = 0.0_f64;
		let mut t_exit = 1.0_f64;

		for axis in 0..3 {
			let s = start[axis];
			let d = dir[axis];
			let (lo, hi) = (self.min[axis], self.max[axis]);

			if d.abs() < f64::MIN_POSITIVE {
				if s < lo || s > hi {
					return false;
				}
				continue;
			}

			let inv = 1.0 / d;
			let (mut ta, mut tb) = ((lo - s) * inv, (hi - s) * inv);
			if ta > tb {
				std::mem::swap(&mut ta, &mut tb);
			}
			t_enter = t_enter.max(ta);
			t_exit = t_exit.min(tb);
			if t_enter > t_exit {
				return false;
			}
		}
		true
	}

	/// Separating axis test between this box and a triangle.
	pub fn intersects_triangle(&self, tri: &[DVec3; 3]) -> bool {
		let c = self.center();
		let h = self.size() * 0.5;
		let v = [tri[0] - c, tri[1] - c, tri[2] - c];

		let t_min = v[0].min(v[1]).min(v[2]);
		let t_max = v[0].max(v[1]).max(v[2]);
		if t_min.cmpgt(h).any() || t_max.cmplt(-h).any() {
			return false;
		}

		let edges = [v[1] - v[0], v[2] - v[1], v[0] - v[2]];
		let normal = edges[0].cross(edges[1]);
		if normal.dot(v[0]).abs() > h.dot(normal.abs()) {
			return false;
		}

		for edge in edges {
			for axis in [DVec3::X, DVec3::Y, DVec3::Z] {
				let a = axis.cross(edge);
				if a.length_squared() < f64::MIN_POSITIVE {
					continue;
				}
				let p = [v[0].dot(a), v[1].dot(a), v[2].dot(a)];
				let p_min = p[0].min(p[1]).min(p[2]);
				let p_max = p[0].max(p[1]).max(p[2]);
				let radius = h.dot(a.abs());
				if p_min > radius || p_max < -radius {
					return false;
				}
			}
		}
		true
	}
}

/// Parameter `t` in `[0, 1]` where the segment crosses the triangle.
pub fn segment_triangle_intersection(start: DVec3, end: DVec3, tri: &[DVec3; 3]) -> Option<f64> {
	let dir = end - start;
	let e1 = tri[1] - tri[0];
	let e2 = tri[2] - tri[0];
	let p = dir.cross(e2);
	let det = e1.dot(p);

	let scale = e1.length() * e2.length() * dir.length();
	if det.abs() <= f64::EPSILON * scale {
		return None;
	}

	let inv = 1.0 / det;
	let s = start - tri[0];
	let u = s.dot(p) * inv;
	if !(0.0..=1.0).contains(&u) {
		return None;
	}
	let q = s.cross(e1);
	let v = dir.dot(q) * inv;
	if v < 0.0 || u + v > 1.0 {
		return None;
	}
	let t = e2.dot(q) * inv;
	(0.0..=1.0).contains(&t).then_some(t)
}

/// Unit normal of a triangle, zero for degenerate ones.
pub fn triangle_normal(tri: &[DVec3; 3]) -> DVec3 {
	(tri[1] - tri[0]).cross(tri[2] - tri[0]).normalize_or_zero()
}

/// Closest point to `p` on a triangle.
pub fn closest_point_on_triangle(p: DVec3, tri: &[DVec3; 3]) -> DVec3 {
	let [a, b, c] = *tri;
	let ab = b - a;
	let ac = c - a;
	let ap = p - a;
	let d1 = ab.dot(ap);
	let d2 = ac.dot(ap);
	if d1 <= 0.0 && d2 <= 0.0 {
		return a;
	}

	let bp = p - b;
	let d3 = ab.dot(bp);
	let d4 = ac.dot(bp);
	if d3 >= 0.0 && d4 <= d3 {
		return b;
	}

	let vc = d1 * d4 - d3 * d2;
	if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
		return a + ab * (d1 / (d1 - d3));
	}

	let cp = p - c;
	let d5 = ab.dot(cp);
	let d6 = ac.dot(cp);
	if d6 >= 0.0 && d5 <= d6 {
		return c;
	}

	let vb = d5 * d2 - d1 * d6;
	if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
		return a + ac * (d2 / (d2 - d6));
	}

	let va = d3 * d6 - d5 * d4;
	if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
		return b + (c - b) * ((d4 - d3) / ((d4 - d3) + (d5 - d6)));
	}

	let denom = 1.0 / (va + vb + vc);
	a + ab * (vb * denom) + ac * (vc * denom)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn unit_box() -> BoundBox {
		BoundBox::new(DVec3::ZERO, DVec3::ONE)
	}

	#[test]
	fn test_from_points() {
		let bb = BoundBox::from_points([DVec3::new(1.0, -2.0, 0.5), DVec3::new(-1.0, 3.0, 0.0)])
			.expect("non-empty");
		assert_eq!(bb.min, DVec3::new(-1.0, -2.0, 0.0));
		assert_eq!(bb.max, DVec3::new(1.0, 3.0, 0.5));
		assert!(BoundBox::from_points(std::iter::empty()).is_none());
	}

	#[test]
	fn test_overlaps_touching() {
		// Touching at boundary should count as overlapping
		let a = BoundBox::new(DVec3::ZERO, DVec3::splat(10.0));
		let b = BoundBox::new(DVec3::splat(10.0), DVec3::splat(20.0));
		assert!(a.overlaps(&b));
		assert!(b.overlaps(&a));
	}

	#[test]
	fn test_contains_point() {
		let bb = BoundBox::new(DVec3::ZERO, DVec3::splat(10.0));
		assert!(bb.contains_point(DVec3::splat(5.0)));
		assert!(bb.contains_point(DVec3::splat(10.0)));
		assert!(!bb.contains_point(DVec3::splat(11.0)));
	}

	#[test]
	fn test_segment_crossing_box() {
		let bb = unit_box();
		assert!(bb.intersects_segment(DVec3::new(-1.0, 0.5, 0.5), DVec3::new(2.0, 0.5, 0.5)));
		assert!(!bb.intersects_segment(DVec3::new(-1.0, 2.0, 0.5), DVec3::new(2.0, 2.0, 0.5)));
		// Segment stopping short of the box
		assert!(!bb.intersects_segment(DVec3::new(-2.0, 0.5, 0.5), DVec3::new(-0.5, 0.5, 0.5)));
	}

	#[test]
	fn test_triangle_box_overlap() {
		let bb = unit_box();
		let cutting = [
			DVec3::new(-1.0, -1.0, 0.5),
			DVec3::new(3.0, -1.0, 0.5),
			DVec3::new(-1.0, 3.0, 0.5),
		];
		let above = [
			DVec3::new(-1.0, -1.0, 1.5),
			DVec3::new(3.0, -1.0, 1.5),
			DVec3::new(-1.0, 3.0, 1.5),
		];
		// Box-aligned bounds overlap but the plane misses the corner
		let diagonal = [
			DVec3::new(2.5, 0.0, 0.0),
			DVec3::new(0.0, 2.5, 0.0),
			DVec3::new(0.0, 0.0, 2.5),
		];
		assert!(bb.intersects_triangle(&cutting));
		assert!(!bb.intersects_triangle(&above));
		assert!(bb.intersects_triangle(&diagonal));
		let far_diagonal = [
			DVec3::new(3.5, 0.0, 0.0),
			DVec3::new(0.0, 3.5, 0.0),
			DVec3::new(0.0, 0.0, 3.5),
		];
		assert!(!bb.intersects_triangle(&far_diagonal));
	}

	#[test]
	fn test_segment_triangle_intersection() {
		let tri = [DVec3::ZERO, DVec3::X, DVec3::Y];
		let t = segment_triangle_intersection(DVec3::new(0.2, 0.2, -1.0), DVec3::new(0.2, 0.2, 1.0), &tri)
			.expect("segment crosses triangle");
		assert!((t - 0.5).abs() < 1e-12);
		assert!(segment_triangle_intersection(DVec3::new(0.8, 0.8, -1.0), DVec3::new(0.8, 0.8, 1.0), &tri).is_none());
		assert!(segment_triangle_intersection(DVec3::new(0.2, 0.2, 0.5), DVec3::new(0.2, 0.2, 1.0), &tri).is_none());
	}

	#[test]
	fn test_closest_point_on_triangle() {
		let tri = [DVec3::ZERO, DVec3::X, DVec3::Y];
		assert_eq!(closest_point_on_triangle(DVec3::new(0.2, 0.2, 3.0), &tri), DVec3::new(0.2, 0.2, 0.0));
		assert_eq!(closest_point_on_triangle(DVec3::new(-1.0, -1.0, 0.0), &tri), DVec3::ZERO);
		assert_eq!(triangle_normal(&tri), DVec3::Z);
	}
}

//! Geometry kernel for integer cuboids.
//!
//! Free space inside a container is kept as the set of *maximal empty
//! cuboids*: every empty box that cannot be grown in any direction without
//! hitting a wall or a placed item. A candidate box fits without overlap
//! exactly when some maximal empty cuboid contains it.
//!
//! The set is uniquely determined by the placed boxes, which makes the
//! representation canonical once it is sorted.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::types::{Axis, Cuboid, Dims};

/// One of the six axis-aligned rotations of a cuboid.
///
/// The variant name lists which native extent ends up along x, y and z.
/// `WidthDepthHeight` is the identity.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    #[default]
    WidthDepthHeight,
    WidthHeightDepth,
    DepthWidthHeight,
    DepthHeightWidth,
    HeightWidthDepth,
    HeightDepthWidth,
}

impl Orientation {
    /// All rotations in canonical order, identity first.
    pub const ALL: [Orientation; 6] = [
        Orientation::WidthDepthHeight,
        Orientation::WidthHeightDepth,
        Orientation::DepthWidthHeight,
        Orientation::DepthHeightWidth,
        Orientation::HeightWidthDepth,
        Orientation::HeightDepthWidth,
    ];

    /// Extents of a box with native `dims` in this orientation.
    pub fn apply(self, dims: Dims) -> Dims {
        let Dims {
            width: w,
            depth: d,
            height: h,
        } = dims;
        match self {
            Orientation::WidthDepthHeight => Dims::new(w, d, h),
            Orientation::WidthHeightDepth => Dims::new(w, h, d),
            Orientation::DepthWidthHeight => Dims::new(d, w, h),
            Orientation::DepthHeightWidth => Dims::new(d, h, w),
            Orientation::HeightWidthDepth => Dims::new(h, w, d),
            Orientation::HeightDepthWidth => Dims::new(h, d, w),
        }
    }

    /// Rotations that produce distinct extents, in canonical order.
    ///
    /// Repeated extents collapse: a cube has one orientation, a square
    /// prism three.
    pub fn distinct_for(dims: Dims) -> Vec<Orientation> {
        let mut seen: Vec<Dims> = Vec::with_capacity(6);
        let mut result = Vec::with_capacity(6);
        for orientation in Self::ALL {
            let extents = orientation.apply(dims);
            if !seen.contains(&extents) {
                seen.push(extents);
                result.push(orientation);
            }
        }
        result
    }
}

/// Two boxes share interior volume.
#[inline]
pub fn intersects(a: &Cuboid, b: &Cuboid) -> bool {
    a.intersects(b)
}

/// `candidate` lies inside one of the free regions.
pub fn fits(free_space: &[Cuboid], candidate: &Cuboid) -> bool {
    free_space.iter().any(|region| region.contains(candidate))
}

/// Length of the overlap of two half-open intervals.
#[inline]
pub fn overlap_1d(a: (u32, u32), b: (u32, u32)) -> u32 {
    a.1.min(b.1).saturating_sub(a.0.max(b.0))
}

/// Overlap area of the projections of two boxes onto the plane
/// perpendicular to `axis`.
pub fn projected_overlap(a: &Cuboid, b: &Cuboid, axis: Axis) -> u64 {
    let (u, v) = axis.others();
    let du = overlap_1d(a.span(u), b.span(u));
    let dv = overlap_1d(a.span(v), b.span(v));
    u64::from(du) * u64::from(dv)
}

/// Splits `region` around `cut`.
///
/// Returns `region` unchanged when they do not intersect, otherwise up to six
/// slabs (one per side of `cut`), each spanning the full region on the other
/// two axes. The slabs overlap each other but never `cut`, and their union is
/// exactly `region \ cut`.
pub fn subtract(region: &Cuboid, cut: &Cuboid) -> Vec<Cuboid> {
    if !region.intersects(cut) {
        return vec![*region];
    }

    let r_min = region.origin;
    let r_max = region.max();
    let c_min = cut.origin;
    let c_max = cut.max();
    let mut pieces = Vec::with_capacity(6);

    if c_min.x > r_min.x {
        let mut piece = *region;
        piece.dims.width = c_min.x - r_min.x;
        pieces.push(piece);
    }
    if c_max.x < r_max.x {
        let mut piece = *region;
        piece.origin.x = c_max.x;
        piece.dims.width = r_max.x - c_max.x;
        pieces.push(piece);
    }
    if c_min.y > r_min.y {
        let mut piece = *region;
        piece.dims.depth = c_min.y - r_min.y;
        pieces.push(piece);
    }
    if c_max.y < r_max.y {
        let mut piece = *region;
        piece.origin.y = c_max.y;
        piece.dims.depth = r_max.y - c_max.y;
        pieces.push(piece);
    }
    if c_min.z > r_min.z {
        let mut piece = *region;
        piece.dims.height = c_min.z - r_min.z;
        pieces.push(piece);
    }
    if c_max.z < r_max.z {
        let mut piece = *region;
        piece.origin.z = c_max.z;
        piece.dims.height = r_max.z - c_max.z;
        pieces.push(piece);
    }

    pieces
}

/// Removes duplicates and every region contained in another one.
pub fn prune_contained(regions: &mut Vec<Cuboid>) {
    regions.sort_unstable();
    regions.dedup();
    let snapshot = regions.clone();
    regions.retain(|region| {
        !snapshot
            .iter()
            .any(|other| other != region && other.contains(region))
    });
}

/// Removes `cut` from a maximal free-region list in place.
pub fn carve(regions: &mut Vec<Cuboid>, cut: &Cuboid) {
    let mut next = Vec::with_capacity(regions.len() + 6);
    for region in regions.drain(..) {
        if region.intersects(cut) {
            next.extend(subtract(&region, cut));
        } else {
            next.push(region);
        }
    }
    prune_contained(&mut next);
    *regions = next;
}

/// Maximal empty cuboids of `bounds` after removing every obstacle.
pub fn maximal_free_regions<'a>(
    bounds: Cuboid,
    obstacles: impl IntoIterator<Item = &'a Cuboid>,
) -> Vec<Cuboid> {
    let mut regions = vec![bounds];
    for obstacle in obstacles {
        carve(&mut regions, obstacle);
    }
    regions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Point3;

    fn cuboid(x: u32, y: u32, z: u32, w: u32, d: u32, h: u32) -> Cuboid {
        Cuboid::new(Point3::new(x, y, z), Dims::new(w, d, h))
    }

    #[test]
    fn cube_has_single_orientation() {
        assert_eq!(
            Orientation::distinct_for(Dims::new(5, 5, 5)),
            vec![Orientation::WidthDepthHeight]
        );
    }

    #[test]
    fn square_prism_has_three_orientations() {
        let orientations = Orientation::distinct_for(Dims::new(2, 2, 5));
        assert_eq!(orientations.len(), 3);
        assert_eq!(orientations[0], Orientation::WidthDepthHeight);
    }

    #[test]
    fn scalene_box_has_six_orientations() {
        let dims = Dims::new(1, 2, 3);
        let orientations = Orientation::distinct_for(dims);
        assert_eq!(orientations.len(), 6);
        for orientation in orientations {
            assert_eq!(orientation.apply(dims).volume(), dims.volume());
        }
        assert_eq!(
            Orientation::HeightDepthWidth.apply(dims),
            Dims::new(3, 2, 1)
        );
    }

    #[test]
    fn subtract_disjoint_returns_region() {
        let region = cuboid(0, 0, 0, 10, 10, 10);
        let cut = cuboid(20, 0, 0, 5, 5, 5);
        assert_eq!(subtract(&region, &cut), vec![region]);
    }

    #[test]
    fn subtract_corner_box_yields_three_slabs() {
        let region = cuboid(0, 0, 0, 100, 100, 100);
        let cut = cuboid(0, 0, 0, 50, 50, 50);
        let mut pieces = subtract(&region, &cut);
        pieces.sort();
        assert_eq!(
            pieces,
            vec![
                cuboid(0, 0, 50, 100, 100, 50),
                cuboid(0, 50, 0, 100, 50, 100),
                cuboid(50, 0, 0, 50, 100, 100),
            ]
        );
        for piece in &pieces {
            assert!(!piece.intersects(&cut));
            assert!(region.contains(piece));
        }
    }

    #[test]
    fn subtract_centre_box_yields_six_slabs() {
        let region = cuboid(0, 0, 0, 30, 30, 30);
        let cut = cuboid(10, 10, 10, 10, 10, 10);
        assert_eq!(subtract(&region, &cut).len(), 6);
    }

    #[test]
    fn subtract_whole_region_leaves_nothing() {
        let region = cuboid(5, 5, 5, 10, 10, 10);
        assert!(subtract(&region, &region).is_empty());
    }

    #[test]
    fn prune_drops_contained_and_duplicates() {
        let big = cuboid(0, 0, 0, 10, 10, 10);
        let small = cuboid(1, 1, 1, 2, 2, 2);
        let other = cuboid(20, 0, 0, 1, 1, 1);
        let mut regions = vec![small, big, other, big];
        prune_contained(&mut regions);
        assert_eq!(regions, vec![big, other]);
    }

    #[test]
    fn fits_requires_containment_in_one_region() {
        let mut regions = vec![cuboid(0, 0, 0, 100, 100, 100)];
        carve(&mut regions, &cuboid(0, 0, 0, 50, 50, 50));

        assert!(fits(&regions, &cuboid(50, 0, 0, 50, 50, 50)));
        assert!(fits(&regions, &cuboid(0, 0, 50, 100, 100, 50)));
        assert!(!fits(&regions, &cuboid(25, 0, 0, 50, 50, 50)));
        assert!(!fits(&regions, &cuboid(60, 0, 0, 50, 50, 50)));
    }

    #[test]
    fn maximal_regions_are_order_independent() {
        let bounds = cuboid(0, 0, 0, 60, 40, 30);
        let a = cuboid(0, 0, 0, 20, 20, 30);
        let b = cuboid(30, 10, 0, 10, 10, 10);
        let c = cuboid(20, 0, 10, 40, 40, 5);

        let mut forward = maximal_free_regions(bounds, [&a, &b, &c]);
        let mut backward = maximal_free_regions(bounds, [&c, &b, &a]);
        forward.sort();
        backward.sort();
        assert_eq!(forward, backward);
    }

    #[test]
    fn free_regions_never_touch_obstacles() {
        let bounds = cuboid(0, 0, 0, 50, 50, 50);
        let obstacles = [
            cuboid(0, 0, 0, 10, 50, 10),
            cuboid(20, 20, 20, 5, 5, 5),
            cuboid(40, 0, 0, 10, 10, 50),
        ];
        let regions = maximal_free_regions(bounds, obstacles.iter());
        for region in &regions {
            assert!(bounds.contains(region));
            for obstacle in &obstacles {
                assert!(!intersects(region, obstacle));
            }
        }
    }

    #[test]
    fn projected_overlap_ignores_the_axis() {
        let a = cuboid(0, 0, 0, 10, 10, 10);
        let b = cuboid(5, 50, 5, 10, 10, 10);
        assert_eq!(projected_overlap(&a, &b, Axis::Depth), 25);
        assert_eq!(projected_overlap(&a, &b, Axis::Width), 0);
        assert_eq!(overlap_1d((0, 5), (3, 8)), 2);
        assert_eq!(overlap_1d((0, 5), (5, 8)), 0);
    }
}

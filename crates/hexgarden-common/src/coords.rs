//! Coordinate types for main hexes, stacked hexes and the nested sub-hex lattice.
//!
//! Layout is pointy-top axial. World positions use `glam` with `y` pointing
//! up, so the hex plane is `(x, z)`.
//!
//! The sub-hex lattice shares the orientation of the main grid and is scaled
//! down by [`HexMetrics::subdivision`]. A sub-hex is stored as a local offset
//! plus the parent it claims to belong to; arithmetic on the local part can
//! walk outside that parent, so every offset goes through
//! [`HexMetrics::normalize_sub_hex`] before it is used as a key.

use std::fmt;

use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

const SQRT_3: f32 = 1.732_050_8;

/// Axial offsets of the six lateral neighbors, counter-clockwise from east.
pub const AXIAL_DIRECTIONS: [(i32, i32); 6] = [(1, 0), (1, -1), (0, -1), (-1, 0), (-1, 1), (0, 1)];

/// Axial coordinate on the main grid.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize, Pod, Zeroable,
)]
#[repr(C)]
pub struct HexCoord {
    /// Axial column
    pub q: i32,
    /// Axial row
    pub r: i32,
}

impl HexCoord {
    /// Creates a new hex coordinate.
    #[must_use]
    pub const fn new(q: i32, r: i32) -> Self {
        Self { q, r }
    }

    /// Implicit third cube coordinate.
    #[must_use]
    pub const fn s(self) -> i32 {
        -self.q - self.r
    }

    /// The six lateral neighbors.
    #[must_use]
    pub fn neighbors(self) -> [Self; 6] {
        AXIAL_DIRECTIONS.map(|(dq, dr)| Self::new(self.q + dq, self.r + dr))
    }

    /// Hex distance in steps.
    #[must_use]
    pub fn distance(self, other: Self) -> u32 {
        let dq = (self.q - other.q).unsigned_abs();
        let dr = (self.r - other.r).unsigned_abs();
        let ds = (self.s() - other.s()).unsigned_abs();
        dq.max(dr).max(ds)
    }

    /// Lifts this column to a given vertical level.
    #[must_use]
    pub const fn at_level(self, y: i32) -> HexCoord3D {
        HexCoord3D::new(self.q, self.r, y)
    }
}

/// A main hex at a discrete vertical level.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize, Pod, Zeroable,
)]
#[repr(C)]
pub struct HexCoord3D {
    /// Axial column
    pub q: i32,
    /// Axial row
    pub r: i32,
    /// Vertical level (0 = ground layer)
    pub y: i32,
}

impl HexCoord3D {
    /// Creates a new stacked hex coordinate.
    #[must_use]
    pub const fn new(q: i32, r: i32, y: i32) -> Self {
        Self { q, r, y }
    }

    /// The column this hex belongs to.
    #[must_use]
    pub const fn hex(self) -> HexCoord {
        HexCoord::new(self.q, self.r)
    }

    /// The hex directly above.
    #[must_use]
    pub const fn above(self) -> Self {
        Self::new(self.q, self.r, self.y + 1)
    }

    /// The hex directly below.
    #[must_use]
    pub const fn below(self) -> Self {
        Self::new(self.q, self.r, self.y - 1)
    }

    /// The six neighbors on the same level.
    #[must_use]
    pub fn lateral_neighbors(self) -> [Self; 6] {
        self.hex().neighbors().map(|h| h.at_level(self.y))
    }

    /// Lateral neighbors, optionally followed by the hexes above and below.
    #[must_use]
    pub fn neighbors(self, include_vertical: bool) -> Vec<Self> {
        let mut out = self.lateral_neighbors().to_vec();
        if include_vertical {
            out.push(self.above());
            out.push(self.below());
        }
        out
    }

    /// Whether `other` is one of the eight flow neighbors.
    #[must_use]
    pub fn is_adjacent(self, other: Self) -> bool {
        if self.hex() == other.hex() {
            return (self.y - other.y).abs() == 1;
        }
        self.y == other.y && self.hex().distance(other.hex()) == 1
    }
}

impl fmt::Display for HexCoord3D {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{}", self.q, self.r, self.y)
    }
}

/// Direction-independent key for the edge between two hexes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeKey(HexCoord3D, HexCoord3D);

impl EdgeKey {
    /// Builds the canonical key; argument order does not matter.
    #[must_use]
    pub fn new(a: HexCoord3D, b: HexCoord3D) -> Self {
        if a <= b {
            Self(a, b)
        } else {
            Self(b, a)
        }
    }

    /// Lower endpoint.
    #[must_use]
    pub const fn low(&self) -> HexCoord3D {
        self.0
    }

    /// Upper endpoint.
    #[must_use]
    pub const fn high(&self) -> HexCoord3D {
        self.1
    }

    /// Whether the edge touches `coord`.
    #[must_use]
    pub fn touches(&self, coord: HexCoord3D) -> bool {
        self.0 == coord || self.1 == coord
    }
}

/// Position on the sub-hex lattice nested inside a parent hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct SubHexCoord {
    /// Local axial column, relative to the parent center
    pub q: i32,
    /// Local axial row, relative to the parent center
    pub r: i32,
    /// Parent column
    pub parent_q: i32,
    /// Parent row
    pub parent_r: i32,
}

impl SubHexCoord {
    /// Creates a sub-hex coordinate. The result is not normalized.
    #[must_use]
    pub const fn new(q: i32, r: i32, parent: HexCoord) -> Self {
        Self {
            q,
            r,
            parent_q: parent.q,
            parent_r: parent.r,
        }
    }

    /// The sub-hex at the center of `parent`.
    #[must_use]
    pub const fn center_of(parent: HexCoord) -> Self {
        Self::new(0, 0, parent)
    }

    /// The parent hex as stored (only trustworthy after normalization).
    #[must_use]
    pub const fn parent(self) -> HexCoord {
        HexCoord::new(self.parent_q, self.parent_r)
    }

    /// Places this sub-hex on a sub-layer.
    #[must_use]
    pub const fn at_layer(self, h: i32) -> SubHexCoord3D {
        SubHexCoord3D { sub: self, h }
    }
}

/// A sub-hex on a global sub-layer.
///
/// Sub-layers are counted from world height zero, so layer `h` spans
/// `[h, h + 1) * sub_layer_height`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct SubHexCoord3D {
    /// Planar sub-hex
    pub sub: SubHexCoord,
    /// Sub-layer index
    pub h: i32,
}

impl SubHexCoord3D {
    /// Creates a sub-hex-3D coordinate.
    #[must_use]
    pub const fn new(sub: SubHexCoord, h: i32) -> Self {
        Self { sub, h }
    }

    /// Same planar position, `dh` layers up (negative = down).
    #[must_use]
    pub const fn shifted(self, dh: i32) -> Self {
        Self {
            sub: self.sub,
            h: self.h + dh,
        }
    }
}

impl fmt::Display for SubHexCoord3D {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{}@{},{}^{}",
            self.sub.q, self.sub.r, self.sub.parent_q, self.sub.parent_r, self.h
        )
    }
}

/// Rounds fractional axial coordinates to the nearest hex (cube rounding).
#[must_use]
pub fn cube_round(qf: f32, rf: f32) -> (i32, i32) {
    let sf = -qf - rf;
    let mut q = qf.round();
    let mut r = rf.round();
    let s = sf.round();

    let dq = (q - qf).abs();
    let dr = (r - rf).abs();
    let ds = (s - sf).abs();

    if dq > dr && dq > ds {
        q = -r - s;
    } else if dr > ds {
        r = -q - s;
    }
    (q as i32, r as i32)
}

fn axial_to_planar(q: i32, r: i32, size: f32) -> Vec2 {
    let (q, r) = (q as f32, r as f32);
    Vec2::new(size * SQRT_3 * (q + r * 0.5), size * 1.5 * r)
}

fn planar_to_axial(p: Vec2, size: f32) -> (i32, i32) {
    let qf = (SQRT_3 / 3.0 * p.x - p.y / 3.0) / size;
    let rf = (2.0 / 3.0 * p.y) / size;
    cube_round(qf, rf)
}

/// Grid geometry shared by every subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HexMetrics {
    /// Main hex circumradius in meters
    pub hex_size: f32,
    /// Height of one vertical level in meters
    pub level_height: f32,
    /// Sub-hexes per main hex edge
    pub subdivision: u32,
    /// Sub-layers per vertical level
    pub sub_levels: u32,
}

impl Default for HexMetrics {
    fn default() -> Self {
        Self {
            hex_size: 0.5,
            level_height: 0.8,
            subdivision: 10,
            sub_levels: 8,
        }
    }
}

impl HexMetrics {
    /// Sub-hex circumradius.
    #[must_use]
    pub fn sub_size(&self) -> f32 {
        self.hex_size / self.subdivision as f32
    }

    /// Height of one sub-layer.
    #[must_use]
    pub fn sub_layer_height(&self) -> f32 {
        self.level_height / self.sub_levels as f32
    }

    /// Top-face area of a main hex in m².
    #[must_use]
    pub fn hex_area(&self) -> f32 {
        1.5 * SQRT_3 * self.hex_size * self.hex_size
    }

    /// Volume of one main hex in m³.
    #[must_use]
    pub fn hex_volume(&self) -> f32 {
        self.hex_area() * self.level_height
    }

    /// Planar world position of a hex center.
    #[must_use]
    pub fn hex_to_world(&self, hex: HexCoord) -> Vec2 {
        axial_to_planar(hex.q, hex.r, self.hex_size)
    }

    /// Hex containing a planar world position.
    #[must_use]
    pub fn world_to_hex(&self, pos: Vec2) -> HexCoord {
        let (q, r) = planar_to_axial(pos, self.hex_size);
        HexCoord::new(q, r)
    }

    /// Center of a stacked hex.
    #[must_use]
    pub fn hex3d_center(&self, coord: HexCoord3D) -> Vec3 {
        let p = self.hex_to_world(coord.hex());
        Vec3::new(p.x, (coord.y as f32 + 0.5) * self.level_height, p.y)
    }

    /// Stacked hex containing a world position.
    #[must_use]
    pub fn world_to_hex3d(&self, pos: Vec3) -> HexCoord3D {
        let hex = self.world_to_hex(Vec2::new(pos.x, pos.z));
        hex.at_level((pos.y / self.level_height).floor() as i32)
    }

    /// Global sub-lattice coordinate of a sub-hex.
    #[must_use]
    pub fn global_sub(&self, sub: SubHexCoord) -> (i32, i32) {
        let n = self.subdivision as i32;
        (sub.q + n * sub.parent_q, sub.r + n * sub.parent_r)
    }

    fn sub_from_global(&self, gq: i32, gr: i32) -> SubHexCoord {
        let center = axial_to_planar(gq, gr, self.sub_size());
        let parent = self.world_to_hex(center);
        let n = self.subdivision as i32;
        SubHexCoord::new(gq - n * parent.q, gr - n * parent.r, parent)
    }

    /// Planar world position of a sub-hex center.
    #[must_use]
    pub fn sub_hex_to_world(&self, sub: SubHexCoord) -> Vec2 {
        let (gq, gr) = self.global_sub(sub);
        axial_to_planar(gq, gr, self.sub_size())
    }

    /// Sub-hex containing a planar world position, with its true parent.
    #[must_use]
    pub fn world_to_sub_hex(&self, pos: Vec2) -> SubHexCoord {
        let (gq, gr) = planar_to_axial(pos, self.sub_size());
        self.sub_from_global(gq, gr)
    }

    /// Re-resolves a sub-hex to the parent its center actually lies in.
    ///
    /// Every key derived from sub-hex arithmetic must pass through here.
    #[must_use]
    pub fn normalize_sub_hex(&self, sub: SubHexCoord) -> SubHexCoord {
        let (gq, gr) = self.global_sub(sub);
        self.sub_from_global(gq, gr)
    }

    /// Applies a local offset and normalizes the result.
    #[must_use]
    pub fn offset_sub_hex(&self, sub: SubHexCoord, dq: i32, dr: i32) -> SubHexCoord {
        let (gq, gr) = self.global_sub(sub);
        self.sub_from_global(gq + dq, gr + dr)
    }

    /// Normalized lateral neighbors of a sub-hex.
    #[must_use]
    pub fn sub_hex_neighbors(&self, sub: SubHexCoord) -> [SubHexCoord; 6] {
        AXIAL_DIRECTIONS.map(|(dq, dr)| self.offset_sub_hex(sub, dq, dr))
    }

    /// Normalizes the planar part of a sub-hex-3D coordinate.
    #[must_use]
    pub fn normalize_sub_hex3d(&self, coord: SubHexCoord3D) -> SubHexCoord3D {
        SubHexCoord3D::new(self.normalize_sub_hex(coord.sub), coord.h)
    }

    /// Applies a planar offset and a layer shift, then normalizes.
    #[must_use]
    pub fn offset_sub_hex3d(&self, coord: SubHexCoord3D, dq: i32, dr: i32, dh: i32) -> SubHexCoord3D {
        SubHexCoord3D::new(self.offset_sub_hex(coord.sub, dq, dr), coord.h + dh)
    }

    /// World position of a sub-hex-3D center.
    #[must_use]
    pub fn sub_hex3d_to_world(&self, coord: SubHexCoord3D) -> Vec3 {
        let p = self.sub_hex_to_world(coord.sub);
        Vec3::new(p.x, (coord.h as f32 + 0.5) * self.sub_layer_height(), p.y)
    }

    /// Sub-hex-3D containing a world position.
    #[must_use]
    pub fn world_to_sub_hex3d(&self, pos: Vec3) -> SubHexCoord3D {
        let sub = self.world_to_sub_hex(Vec2::new(pos.x, pos.z));
        sub.at_layer((pos.y / self.sub_layer_height()).floor() as i32)
    }

    /// Main level that contains a sub-layer.
    #[must_use]
    pub fn level_of_layer(&self, h: i32) -> i32 {
        h.div_euclid(self.sub_levels as i32)
    }

    /// Lowest sub-layer inside a main level.
    #[must_use]
    pub fn first_layer_of_level(&self, y: i32) -> i32 {
        y * self.sub_levels as i32
    }

    /// Main hex that contains a sub-hex-3D coordinate.
    #[must_use]
    pub fn parent_hex3d(&self, coord: SubHexCoord3D) -> HexCoord3D {
        let sub = self.normalize_sub_hex(coord.sub);
        sub.parent().at_level(self.level_of_layer(coord.h))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_hex_world_roundtrip() {
        let m = HexMetrics::default();
        for q in -5..=5 {
            for r in -5..=5 {
                let hex = HexCoord::new(q, r);
                assert_eq!(m.world_to_hex(m.hex_to_world(hex)), hex);
            }
        }
    }

    #[test]
    fn test_cube_round_prefers_valid_cube() {
        assert_eq!(cube_round(0.4, 0.4), (0, 1));
        assert_eq!(cube_round(0.9, 0.05), (1, 0));
        assert_eq!(cube_round(-0.1, -0.95), (0, -1));
    }

    #[test]
    fn test_default_hex_volume() {
        let m = HexMetrics::default();
        assert!((m.hex_volume() - 0.52).abs() < 0.005);
    }

    #[test]
    fn test_world_to_hex3d_levels() {
        let m = HexMetrics::default();
        let c = HexCoord3D::new(2, -1, 3);
        assert_eq!(m.world_to_hex3d(m.hex3d_center(c)), c);
        let below_ground = Vec3::new(0.0, -0.1, 0.0);
        assert_eq!(m.world_to_hex3d(below_ground).y, -1);
    }

    #[test]
    fn test_neighbors() {
        let c = HexCoord3D::new(0, 0, 0);
        assert_eq!(c.neighbors(false).len(), 6);
        let all = c.neighbors(true);
        assert_eq!(all.len(), 8);
        assert!(all.contains(&c.above()));
        assert!(all.contains(&c.below()));
        for n in all {
            assert!(c.is_adjacent(n));
            assert_eq!(HexCoord::new(0, 0).distance(n.hex()) + (n.y - c.y).unsigned_abs(), 1);
        }
    }

    #[test]
    fn test_edge_key_is_symmetric() {
        let a = HexCoord3D::new(0, 0, 0);
        let b = HexCoord3D::new(1, 0, 0);
        assert_eq!(EdgeKey::new(a, b), EdgeKey::new(b, a));
        assert!(EdgeKey::new(b, a).touches(a));
        assert_eq!(EdgeKey::new(b, a).low(), a);
    }

    #[test]
    fn test_sub_hex_offset_crosses_parent() {
        let m = HexMetrics::default();
        let start = SubHexCoord::center_of(HexCoord::new(0, 0));
        let moved = m.offset_sub_hex(start, 11, 0);
        assert_eq!(moved.parent(), HexCoord::new(1, 0));
        assert_eq!((moved.q, moved.r), (1, 0));

        let raw = SubHexCoord::new(11, 0, HexCoord::new(0, 0));
        assert_eq!(m.normalize_sub_hex(raw), moved);
    }

    #[test]
    fn test_sub_hex_stays_inside_parent() {
        let m = HexMetrics::default();
        let parent = HexCoord::new(3, -2);
        let sub = m.offset_sub_hex(SubHexCoord::center_of(parent), 2, -1);
        assert_eq!(sub.parent(), parent);
        let world = m.sub_hex_to_world(sub);
        assert_eq!(m.world_to_hex(world), parent);
        assert_eq!(m.world_to_sub_hex(world), sub);
    }

    #[test]
    fn test_parent_hex3d() {
        let m = HexMetrics::default();
        let sub = SubHexCoord::center_of(HexCoord::new(0, 0));
        assert_eq!(m.parent_hex3d(sub.at_layer(0)).y, 0);
        assert_eq!(m.parent_hex3d(sub.at_layer(7)).y, 0);
        assert_eq!(m.parent_hex3d(sub.at_layer(8)).y, 1);
        assert_eq!(m.parent_hex3d(sub.at_layer(-1)).y, -1);
    }

    #[test]
    fn test_display_keys() {
        assert_eq!(HexCoord3D::new(1, -2, 3).to_string(), "1,-2,3");
        let s = SubHexCoord::new(4, 5, HexCoord::new(1, 2)).at_layer(-3);
        assert_eq!(s.to_string(), "4,5@1,2^-3");
    }

    proptest! {
        #[test]
        fn prop_normalize_is_idempotent(q in -40i32..40, r in -40i32..40, pq in -5i32..5, pr in -5i32..5) {
            let m = HexMetrics::default();
            let once = m.normalize_sub_hex(SubHexCoord::new(q, r, HexCoord::new(pq, pr)));
            prop_assert_eq!(m.normalize_sub_hex(once), once);
            prop_assert_eq!(m.world_to_hex(m.sub_hex_to_world(once)), once.parent());
        }

        #[test]
        fn prop_offset_then_back_returns_home(q in -8i32..8, r in -8i32..8, dq in -15i32..15, dr in -15i32..15) {
            let m = HexMetrics::default();
            let start = m.normalize_sub_hex(SubHexCoord::new(q, r, HexCoord::new(0, 0)));
            let there = m.offset_sub_hex(start, dq, dr);
            prop_assert_eq!(m.offset_sub_hex(there, -dq, -dr), start);
        }
    }
}

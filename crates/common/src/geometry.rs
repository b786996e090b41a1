use glam::{Mat4, Vec3, Vec4, Vec4Swizzles};
use serde::{Deserialize, Serialize};

/// Result of a containment test between two volumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intersection {
    Outside,
    Intersects,
    Inside,
}

/// Axis-aligned bounding box. The default box is empty (min > max).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Default for Aabb {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl Aabb {
    pub const EMPTY: Aabb = Aabb {
        min: Vec3::splat(f32::MAX),
        max: Vec3::splat(-f32::MAX),
    };

    /// Box covering all of space. Used for directional lights.
    pub const INFINITE: Aabb = Aabb {
        min: Vec3::splat(-f32::MAX),
        max: Vec3::splat(f32::MAX),
    };

    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    pub fn from_half_width(center: Vec3, half_width: Vec3) -> Self {
        Self {
            min: center - half_width,
            max: center + half_width,
        }
    }

    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Self {
        points.into_iter().fold(Self::EMPTY, |mut acc, p| {
            acc.min = acc.min.min(p);
            acc.max = acc.max.max(p);
            acc
        })
    }

    /// False for the empty box.
    pub fn is_valid(&self) -> bool {
        self.min.cmple(self.max).all()
    }

    pub fn is_infinite(&self) -> bool {
        self.min.cmple(Vec3::splat(-f32::MAX)).any() || self.max.cmpge(Vec3::splat(f32::MAX)).any()
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn half_width(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    pub fn radius(&self) -> f32 {
        self.half_width().length()
    }

    pub fn corners(&self) -> [Vec3; 8] {
        let (a, b) = (self.min, self.max);
        [
            a,
            Vec3::new(a.x, b.y, a.z),
            Vec3::new(a.x, b.y, b.z),
            Vec3::new(a.x, a.y, b.z),
            Vec3::new(b.x, a.y, a.z),
            Vec3::new(b.x, b.y, a.z),
            b,
            Vec3::new(b.x, a.y, b.z),
        ]
    }

    /// Bounding box of this box after transformation by `m`.
    pub fn transform(&self, m: &Mat4) -> Aabb {
        if !self.is_valid() || self.is_infinite() {
            return *self;
        }
        Self::from_points(self.corners().into_iter().map(|c| m.transform_point3(c)))
    }

    pub fn contains_point(&self, p: Vec3) -> bool {
        self.min.cmple(p).all() && p.cmple(self.max).all()
    }

    /// `Inside` means `other` lies entirely within `self`.
    pub fn intersects(&self, other: &Aabb) -> Intersection {
        if !self.is_valid() || !other.is_valid() {
            return Intersection::Outside;
        }
        if self.max.cmplt(other.min).any() || other.max.cmplt(self.min).any() {
            return Intersection::Outside;
        }
        if self.min.cmple(other.min).all() && self.max.cmpge(other.max).all() {
            Intersection::Inside
        } else {
            Intersection::Intersects
        }
    }

    pub fn merge(a: &Aabb, b: &Aabb) -> Aabb {
        Aabb {
            min: a.min.min(b.min),
            max: a.max.max(b.max),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
    direction_inverse: Vec3,
}

impl Ray {
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction,
            direction_inverse: direction.recip(),
        }
    }

    /// Distance along the ray to the first hit, if any (slab test).
    pub fn hit_distance(&self, b: &Aabb) -> Option<f32> {
        if !b.is_valid() {
            return None;
        }
        let t1 = (b.min - self.origin) * self.direction_inverse;
        let t2 = (b.max - self.origin) * self.direction_inverse;
        let tmin = t1.min(t2).max_element();
        let tmax = t1.max(t2).min_element();
        (tmax >= tmin.max(0.0)).then_some(tmin.max(0.0))
    }

    pub fn intersects(&self, b: &Aabb) -> bool {
        self.hit_distance(b).is_some()
    }
}

/// Six inward-facing planes extracted from a view-projection matrix.
///
/// Plane order: near, far, left, right, top, bottom. A point `p` is inside a
/// plane when `dot(plane.xyz, p) + plane.w >= 0`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Frustum {
    planes: [Vec4; 6],
}

impl Frustum {
    /// Clip space depth is expected in [0, 1], which is what `glam`'s
    /// `perspective_*` constructors produce.
    pub fn from_view_projection(vp: &Mat4) -> Self {
        let r0 = vp.row(0);
        let r1 = vp.row(1);
        let r2 = vp.row(2);
        let r3 = vp.row(3);
        let planes = [r2, r3 - r2, r3 + r0, r3 - r0, r3 - r1, r3 + r1].map(|p| {
            let len = p.xyz().length();
            if len > 0.0 { p / len } else { p }
        });
        Self { planes }
    }

    pub fn planes(&self) -> &[Vec4; 6] {
        &self.planes
    }

    pub fn near_plane(&self) -> Vec4 {
        self.planes[0]
    }

    pub fn far_plane(&self) -> Vec4 {
        self.planes[1]
    }

    pub fn check_point(&self, p: Vec3) -> bool {
        self.planes.iter().all(|pl| pl.xyz().dot(p) + pl.w >= 0.0)
    }

    pub fn check_sphere(&self, center: Vec3, radius: f32) -> bool {
        self.planes
            .iter()
            .all(|pl| pl.xyz().dot(center) + pl.w >= -radius)
    }

    pub fn check_box(&self, b: &Aabb) -> Intersection {
        if !b.is_valid() {
            return Intersection::Outside;
        }
        if b.is_infinite() {
            return Intersection::Intersects;
        }
        let mut result = Intersection::Inside;
        for pl in &self.planes {
            let n = pl.xyz();
            let positive = n.cmpge(Vec3::ZERO);
            let p_vertex = Vec3::select(positive, b.max, b.min);
            let n_vertex = Vec3::select(positive, b.min, b.max);
            if n.dot(p_vertex) + pl.w < 0.0 {
                return Intersection::Outside;
            }
            if n.dot(n_vertex) + pl.w < 0.0 {
                result = Intersection::Intersects;
            }
        }
        result
    }

    /// True unless the box is entirely outside.
    pub fn check_box_fast(&self, b: &Aabb) -> bool {
        self.check_box(b) != Intersection::Outside
    }
}

// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! View frustum input.
//!
//! The renderer hands us its camera frustum in world space.  Plane normals point into the
//! frustum; a point `p` is on the inner side of a plane if `normal · p >= distance`.

use glam::{DVec3, Vec3};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    pub normal: Vec3,
    pub distance: f64,
}

impl Plane {
    pub const fn new(normal: Vec3, distance: f64) -> Self {
        Plane { normal, distance }
    }

    pub fn contains(&self, point: DVec3) -> bool {
        self.normal.as_dvec3().dot(point) >= self.distance
    }

    /**
    Moves the plane into a space whose origin sits at `origin` and pushes it back by `push_back`.

    Cascade space is a pure translation of world space so the normal is kept.
    */
    pub fn translated(&self, origin: DVec3, push_back: f32) -> Plane {
        Plane {
            normal: self.normal,
            distance: self.distance - self.normal.as_dvec3().dot(origin) - push_back as f64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frustum {
    pub left: Plane,
    pub top: Plane,
    pub right: Plane,
    pub bottom: Plane,
    pub near: Plane,
    pub far: Plane,
}

impl Frustum {
    pub const fn new(left: Plane, top: Plane, right: Plane, bottom: Plane, near: Plane, far: Plane) -> Self {
        Frustum {
            left,
            top,
            right,
            bottom,
            near,
            far,
        }
    }

    /// Planes that bound the view sideways and from the front.
    ///
    /// Probe classification only uses these; the far plane is not tested.
    pub fn bounding_planes(&self) -> [Plane; 5] {
        [self.near, self.left, self.right, self.top, self.bottom]
    }
}

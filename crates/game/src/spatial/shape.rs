use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Axis-aligned box used for quadtree node bounds and broad-phase rejection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Vec2,
    pub max: Vec2,
}

impl Aabb {
    pub fn new(min: Vec2, max: Vec2) -> Self {
        Self { min, max }
    }

    pub fn from_center(center: Vec2, half_extents: Vec2) -> Self {
        Self {
            min: center - half_extents,
            max: center + half_extents,
        }
    }

    #[inline]
    pub fn center(&self) -> Vec2 {
        (self.min + self.max) * 0.5
    }

    #[inline]
    pub fn half_extents(&self) -> Vec2 {
        (self.max - self.min) * 0.5
    }

    /// Touching edges count as intersecting.
    #[inline]
    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
    }

    #[inline]
    pub fn contains(&self, other: &Aabb) -> bool {
        self.min.x <= other.min.x
            && self.min.y <= other.min.y
            && self.max.x >= other.max.x
            && self.max.y >= other.max.y
    }

    #[inline]
    pub fn contains_point(&self, point: Vec2) -> bool {
        point.x >= self.min.x && point.x <= self.max.x && point.y >= self.min.y && point.y <= self.max.y
    }

    pub fn expanded(&self, amount: Vec2) -> Aabb {
        Aabb {
            min: self.min - amount,
            max: self.max + amount,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Circle {
    pub center: Vec2,
    pub radius: f32,
}

/// Rectangle rotated by `angle` radians around its center.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrientedRect {
    pub center: Vec2,
    pub half_extents: Vec2,
    pub angle: f32,
}

impl OrientedRect {
    #[inline]
    fn axes(&self) -> (Vec2, Vec2) {
        let (sin, cos) = self.angle.sin_cos();
        (Vec2::new(cos, sin), Vec2::new(-sin, cos))
    }

    /// Expresses `point` in the rectangle's own frame.
    #[inline]
    pub fn to_local(&self, point: Vec2) -> Vec2 {
        let (ux, uy) = self.axes();
        let d = point - self.center;
        Vec2::new(d.dot(ux), d.dot(uy))
    }

    pub fn corners(&self) -> [Vec2; 4] {
        let (ux, uy) = self.axes();
        let ex = ux * self.half_extents.x;
        let ey = uy * self.half_extents.y;
        [
            self.center - ex - ey,
            self.center + ex - ey,
            self.center + ex + ey,
            self.center - ex + ey,
        ]
    }

    fn projected_radius(&self, axis: Vec2) -> f32 {
        let (ux, uy) = self.axes();
        self.half_extents.x * axis.dot(ux).abs() + self.half_extents.y * axis.dot(uy).abs()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Shape {
    Circle(Circle),
    Rect(OrientedRect),
}

impl Shape {
    pub fn circle(center: Vec2, radius: f32) -> Self {
        Shape::Circle(Circle { center, radius })
    }

    pub fn rect(center: Vec2, half_extents: Vec2, angle: f32) -> Self {
        Shape::Rect(OrientedRect {
            center,
            half_extents,
            angle,
        })
    }

    pub fn aabb(bounds: Aabb) -> Self {
        Shape::rect(bounds.center(), bounds.half_extents(), 0.0)
    }

    pub fn center(&self) -> Vec2 {
        match self {
            Shape::Circle(c) => c.center,
            Shape::Rect(r) => r.center,
        }
    }

    pub fn with_center(&self, center: Vec2) -> Shape {
        match *self {
            Shape::Circle(c) => Shape::Circle(Circle { center, ..c }),
            Shape::Rect(r) => Shape::Rect(OrientedRect { center, ..r }),
        }
    }

    pub fn bounds(&self) -> Aabb {
        match self {
            Shape::Circle(c) => Aabb::from_center(c.center, Vec2::splat(c.radius)),
            Shape::Rect(r) => {
                let (sin, cos) = r.angle.sin_cos();
                let (sin, cos) = (sin.abs(), cos.abs());
                let half = Vec2::new(
                    cos * r.half_extents.x + sin * r.half_extents.y,
                    sin * r.half_extents.x + cos * r.half_extents.y,
                );
                Aabb::from_center(r.center, half)
            }
        }
    }

    /// Edge contact counts as an intersection.
    pub fn intersects(&self, other: &Shape) -> bool {
        match (self, other) {
            (Shape::Circle(a), Shape::Circle(b)) => {
                let reach = a.radius + b.radius;
                a.center.distance_squared(b.center) <= reach * reach
            }
            (Shape::Circle(c), Shape::Rect(r)) | (Shape::Rect(r), Shape::Circle(c)) => {
                circle_intersects_rect(c, r)
            }
            (Shape::Rect(a), Shape::Rect(b)) => rects_intersect(a, b),
        }
    }

    /// True when `other` lies strictly inside `self`; edge contact is not containment.
    pub fn contains(&self, other: &Shape) -> bool {
        match (self, other) {
            (Shape::Circle(a), Shape::Circle(b)) => {
                a.center.distance(b.center) + b.radius < a.radius
            }
            (Shape::Circle(a), Shape::Rect(b)) => {
                let r2 = a.radius * a.radius;
                b.corners()
                    .iter()
                    .all(|corner| corner.distance_squared(a.center) < r2)
            }
            (Shape::Rect(a), Shape::Circle(b)) => {
                let local = a.to_local(b.center);
                local.x.abs() + b.radius < a.half_extents.x
                    && local.y.abs() + b.radius < a.half_extents.y
            }
            (Shape::Rect(a), Shape::Rect(b)) => b.corners().iter().all(|&corner| {
                let local = a.to_local(corner);
                local.x.abs() < a.half_extents.x && local.y.abs() < a.half_extents.y
            }),
        }
    }
}

fn circle_intersects_rect(circle: &Circle, rect: &OrientedRect) -> bool {
    let local = rect.to_local(circle.center);
    let closest = local.clamp(-rect.half_extents, rect.half_extents);
    local.distance_squared(closest) <= circle.radius * circle.radius
}

fn rects_intersect(a: &OrientedRect, b: &OrientedRect) -> bool {
    let (ax, ay) = a.axes();
    let (bx, by) = b.axes();
    let offset = b.center - a.center;

    [ax, ay, bx, by].into_iter().all(|axis| {
        let distance = offset.dot(axis).abs();
        distance <= a.projected_radius(axis) + b.projected_radius(axis)
    })
}

#[cfg(test)]
mod tests {
    use std::f32::consts::FRAC_PI_4;

    use super::*;

    #[test]
    fn touching_circles_intersect_but_do_not_contain() {
        let a = Shape::circle(Vec2::ZERO, 2.0);
        let b = Shape::circle(Vec2::new(3.0, 0.0), 1.0);
        assert!(a.intersects(&b));
        assert!(!a.contains(&b));

        let inner = Shape::circle(Vec2::new(0.5, 0.0), 1.0);
        assert!(a.contains(&inner));
    }

    #[test]
    fn circle_against_rotated_rect() {
        let rect = Shape::rect(Vec2::ZERO, Vec2::new(2.0, 0.5), FRAC_PI_4);
        // Along the rect's long diagonal axis the circle reaches it.
        let along = Shape::circle(Vec2::new(2.0, 2.0), 1.0);
        assert!(rect.intersects(&along));
        // Perpendicular to it at the same distance it does not.
        let across = Shape::circle(Vec2::new(-2.0, 2.0), 1.0);
        assert!(!rect.intersects(&across));
    }

    #[test]
    fn rotated_rects_separating_axis() {
        let a = Shape::rect(Vec2::ZERO, Vec2::new(1.0, 1.0), 0.0);
        let diamond = Shape::rect(Vec2::new(2.3, 2.3), Vec2::new(1.0, 1.0), FRAC_PI_4);
        assert!(!a.intersects(&diamond));

        let closer = Shape::rect(Vec2::new(1.6, 1.6), Vec2::new(1.0, 1.0), FRAC_PI_4);
        assert!(a.intersects(&closer));
    }

    #[test]
    fn edge_touching_rects_intersect() {
        let a = Shape::rect(Vec2::ZERO, Vec2::new(1.0, 1.0), 0.0);
        let b = Shape::rect(Vec2::new(2.0, 0.0), Vec2::new(1.0, 1.0), 0.0);
        assert!(a.intersects(&b));
        assert!(!a.contains(&b));
    }

    #[test]
    fn rect_containment() {
        let outer = Shape::rect(Vec2::ZERO, Vec2::new(5.0, 5.0), 0.0);
        let inner = Shape::rect(Vec2::ZERO, Vec2::new(1.0, 1.0), FRAC_PI_4);
        assert!(outer.contains(&inner));
        assert!(!inner.contains(&outer));
        assert!(outer.contains(&Shape::circle(Vec2::new(3.0, 0.0), 1.5)));
        assert!(!outer.contains(&Shape::circle(Vec2::new(4.0, 0.0), 1.0)));
    }

    #[test]
    fn rotated_bounds_cover_corners() {
        let shape = Shape::rect(Vec2::new(3.0, -1.0), Vec2::new(2.0, 1.0), 0.7);
        let bounds = shape.bounds();
        if let Shape::Rect(r) = shape {
            for corner in r.corners() {
                assert!(bounds.expanded(Vec2::splat(1e-4)).contains_point(corner));
            }
        }
    }
}

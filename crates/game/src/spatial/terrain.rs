use glam::Vec2;

use super::shape::{Aabb, Shape};

/// Static level geometry as seen by movement code.
pub trait Terrain {
    fn is_colliding(&self, shape: &Shape) -> bool;
}

/// Terrain with nothing in it.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenField;

impl Terrain for OpenField {
    fn is_colliding(&self, _shape: &Shape) -> bool {
        false
    }
}

/// Rectangular arena enclosed by walls; anything reaching past the floor area collides.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArenaBounds {
    pub floor: Aabb,
}

impl ArenaBounds {
    pub fn new(size: Vec2) -> Self {
        Self {
            floor: Aabb::new(Vec2::ZERO, size),
        }
    }
}

impl Terrain for ArenaBounds {
    fn is_colliding(&self, shape: &Shape) -> bool {
        !self.floor.contains(&shape.bounds())
    }
}

impl<T: Terrain + ?Sized> Terrain for &T {
    fn is_colliding(&self, shape: &Shape) -> bool {
        (**self).is_colliding(shape)
    }
}

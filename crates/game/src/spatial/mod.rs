mod collision;
mod quadtree;
mod shape;
mod terrain;

pub use collision::{CollisionManager, SpatialRecord};
pub use quadtree::{LooseQuadtree, Query, QueryKind, QuadtreeConfig};
pub use shape::{Aabb, Circle, OrientedRect, Shape};
pub use terrain::{ArenaBounds, OpenField, Terrain};

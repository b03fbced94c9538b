mod bounding_box;
mod coordinate;
mod feature;
mod geometry;

pub use bounding_box::BoundingBox2D;
pub use coordinate::Coordinate2D;
pub use feature::{Feature, JsonObject};
pub use geometry::{Geometry, GeometryType};

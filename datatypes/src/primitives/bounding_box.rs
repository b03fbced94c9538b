use super::Coordinate2D;
use crate::error;
use crate::util::Result;
use serde::{Deserialize, Serialize};
use snafu::ensure;

#[derive(Copy, Clone, Serialize, Deserialize, PartialEq, Debug)]
#[serde(into = "BoundingBoxBounds", try_from = "BoundingBoxBounds")]
#[repr(C)]
/// The bounding box of a geometry.
/// Note: may degenerate to a point!
pub struct BoundingBox2D {
    lower_left_coordinate: Coordinate2D,
    upper_right_coordinate: Coordinate2D,
}

impl BoundingBox2D {
    /// Creates a new bounding box
    ///
    /// # Examples
    ///
    /// ```
    /// use geoingest_datatypes::primitives::{Coordinate2D, BoundingBox2D};
    ///
    /// let ll = Coordinate2D::new(1.0, 1.0);
    /// let ur = Coordinate2D::new(2.0, 2.0);
    /// let bbox = BoundingBox2D::new(ll, ur).unwrap();
    /// ```
    ///
    /// # Errors
    ///
    /// This constructor fails if the coordinate's values are not in order
    ///
    pub fn new(
        lower_left_coordinate: Coordinate2D,
        upper_right_coordinate: Coordinate2D,
    ) -> Result<Self> {
        ensure!(
            lower_left_coordinate.x <= upper_right_coordinate.x
                && lower_left_coordinate.y <= upper_right_coordinate.y,
            error::InvalidBoundingBoxSnafu {
                lower_left_coordinate,
                upper_right_coordinate
            }
        );
        Ok(Self {
            lower_left_coordinate,
            upper_right_coordinate,
        })
    }

    pub fn new_unchecked(
        lower_left_coordinate: Coordinate2D,
        upper_right_coordinate: Coordinate2D,
    ) -> Self {
        Self {
            lower_left_coordinate,
            upper_right_coordinate,
        }
    }

    pub fn min_x(&self) -> f64 {
        self.lower_left_coordinate.x
    }

    pub fn min_y(&self) -> f64 {
        self.lower_left_coordinate.y
    }

    pub fn max_x(&self) -> f64 {
        self.upper_right_coordinate.x
    }

    pub fn max_y(&self) -> f64 {
        self.upper_right_coordinate.y
    }

    pub fn extend_with_coord(&mut self, coord: Coordinate2D) {
        self.lower_left_coordinate = self.lower_left_coordinate.min_elements(coord);
        self.upper_right_coordinate = self.upper_right_coordinate.max_elements(coord);
    }

    pub fn extend_with_bbox(&mut self, other: &Self) {
        self.extend_with_coord(other.lower_left_coordinate);
        self.extend_with_coord(other.upper_right_coordinate);
    }

    pub fn from_coord_iter<I: IntoIterator<Item = Coordinate2D>>(iter: I) -> Option<Self> {
        let mut iterator = iter.into_iter();

        let first = iterator.next().map(|c| BoundingBox2D::new_unchecked(c, c));

        first.map(|mut f| {
            for c in iterator {
                f.extend_with_coord(c);
            }
            f
        })
    }

    pub fn from_coord_ref_iter<'l, I: IntoIterator<Item = &'l Coordinate2D>>(
        iter: I,
    ) -> Option<Self> {
        Self::from_coord_iter(iter.into_iter().copied())
    }
}

/// Serialized form of a [`BoundingBox2D`]
#[derive(Copy, Clone, Serialize, Deserialize, PartialEq, Debug)]
struct BoundingBoxBounds {
    minx: f64,
    miny: f64,
    maxx: f64,
    maxy: f64,
}

impl From<BoundingBox2D> for BoundingBoxBounds {
    fn from(bbox: BoundingBox2D) -> Self {
        Self {
            minx: bbox.min_x(),
            miny: bbox.min_y(),
            maxx: bbox.max_x(),
            maxy: bbox.max_y(),
        }
    }
}

impl TryFrom<BoundingBoxBounds> for BoundingBox2D {
    type Error = crate::error::Error;

    fn try_from(bounds: BoundingBoxBounds) -> Result<Self> {
        BoundingBox2D::new(
            (bounds.minx, bounds.miny).into(),
            (bounds.maxx, bounds.maxy).into(),
        )
    }
}

use super::{BoundingBox2D, Coordinate2D};
use crate::error::{self, Error};
use crate::util::Result;
use serde::{Deserialize, Serialize};
use snafu::ensure;
use strum::{Display, EnumString, IntoStaticStr};

/// The geometry kinds a feature may carry
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize, Display, EnumString, IntoStaticStr)]
pub enum GeometryType {
    Point,
    LineString,
    Polygon,
    MultiPoint,
    MultiLineString,
    MultiPolygon,
}

/// A feature geometry with its nested coordinate structure.
///
/// Single and multi variants are distinct kinds: a `MultiPoint` with one
/// member is not a `Point`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum Geometry {
    Point(Coordinate2D),
    LineString(Vec<Coordinate2D>),
    Polygon(Vec<Vec<Coordinate2D>>),
    MultiPoint(Vec<Coordinate2D>),
    MultiLineString(Vec<Vec<Coordinate2D>>),
    MultiPolygon(Vec<Vec<Vec<Coordinate2D>>>),
}

impl Geometry {
    pub fn geometry_type(&self) -> GeometryType {
        match self {
            Geometry::Point(_) => GeometryType::Point,
            Geometry::LineString(_) => GeometryType::LineString,
            Geometry::Polygon(_) => GeometryType::Polygon,
            Geometry::MultiPoint(_) => GeometryType::MultiPoint,
            Geometry::MultiLineString(_) => GeometryType::MultiLineString,
            Geometry::MultiPolygon(_) => GeometryType::MultiPolygon,
        }
    }

    /// Iterates all coordinates in document order
    pub fn coords_iter(&self) -> Box<dyn Iterator<Item = &Coordinate2D> + '_> {
        match self {
            Geometry::Point(c) => Box::new(std::iter::once(c)),
            Geometry::LineString(cs) | Geometry::MultiPoint(cs) => Box::new(cs.iter()),
            Geometry::Polygon(rings) | Geometry::MultiLineString(rings) => {
                Box::new(rings.iter().flatten())
            }
            Geometry::MultiPolygon(polygons) => Box::new(polygons.iter().flatten().flatten()),
        }
    }

    /// The extent of the geometry, `None` if it has no coordinates
    pub fn bbox(&self) -> Option<BoundingBox2D> {
        BoundingBox2D::from_coord_ref_iter(self.coords_iter())
    }

    /// Applies `f` to every coordinate and keeps the nesting and point order.
    pub fn try_map_coordinates<F, E>(&self, mut f: F) -> Result<Geometry, E>
    where
        F: FnMut(Coordinate2D) -> Result<Coordinate2D, E>,
    {
        fn line<F, E>(coordinates: &[Coordinate2D], f: &mut F) -> Result<Vec<Coordinate2D>, E>
        where
            F: FnMut(Coordinate2D) -> Result<Coordinate2D, E>,
        {
            coordinates.iter().map(|&c| f(c)).collect()
        }

        fn lines<F, E>(
            lines: &[Vec<Coordinate2D>],
            f: &mut F,
        ) -> Result<Vec<Vec<Coordinate2D>>, E>
        where
            F: FnMut(Coordinate2D) -> Result<Coordinate2D, E>,
        {
            lines.iter().map(|l| line(l, f)).collect()
        }

        Ok(match self {
            Geometry::Point(c) => Geometry::Point(f(*c)?),
            Geometry::LineString(cs) => Geometry::LineString(line(cs, &mut f)?),
            Geometry::MultiPoint(cs) => Geometry::MultiPoint(line(cs, &mut f)?),
            Geometry::Polygon(rings) => Geometry::Polygon(lines(rings, &mut f)?),
            Geometry::MultiLineString(ls) => Geometry::MultiLineString(lines(ls, &mut f)?),
            Geometry::MultiPolygon(polygons) => Geometry::MultiPolygon(
                polygons
                    .iter()
                    .map(|p| lines(p, &mut f))
                    .collect::<Result<_, E>>()?,
            ),
        })
    }

    pub fn approx_eq(&self, other: &Self, epsilon: f64) -> bool {
        self.geometry_type() == other.geometry_type()
            && self.coords_iter().count() == other.coords_iter().count()
            && self
                .coords_iter()
                .zip(other.coords_iter())
                .all(|(a, b)| (a.x - b.x).abs() <= epsilon && (a.y - b.y).abs() <= epsilon)
    }
}

fn position(position: &[f64]) -> Result<Coordinate2D> {
    ensure!(
        position.len() >= 2,
        error::InvalidGeometrySnafu {
            details: format!(
                "a position needs at least two ordinates, found {}",
                position.len()
            ),
        }
    );

    Ok(Coordinate2D::new(position[0], position[1]))
}

fn positions(positions: &[Vec<f64>]) -> Result<Vec<Coordinate2D>> {
    positions.iter().map(|p| position(p)).collect()
}

fn rings(rings: &[Vec<Vec<f64>>]) -> Result<Vec<Vec<Coordinate2D>>> {
    rings.iter().map(|r| positions(r)).collect()
}

impl TryFrom<&geojson::Value> for Geometry {
    type Error = Error;

    fn try_from(value: &geojson::Value) -> Result<Self> {
        Ok(match value {
            geojson::Value::Point(p) => Geometry::Point(position(p)?),
            geojson::Value::MultiPoint(ps) => Geometry::MultiPoint(positions(ps)?),
            geojson::Value::LineString(ps) => Geometry::LineString(positions(ps)?),
            geojson::Value::MultiLineString(ls) => Geometry::MultiLineString(rings(ls)?),
            geojson::Value::Polygon(rs) => Geometry::Polygon(rings(rs)?),
            geojson::Value::MultiPolygon(polygons) => Geometry::MultiPolygon(
                polygons.iter().map(|p| rings(p)).collect::<Result<_>>()?,
            ),
            geojson::Value::GeometryCollection(_) => {
                return Err(Error::InvalidGeometry {
                    details: "GeometryCollection is not supported".to_string(),
                });
            }
        })
    }
}

impl From<&Geometry> for geojson::Value {
    fn from(geometry: &Geometry) -> Self {
        fn line(coordinates: &[Coordinate2D]) -> Vec<Vec<f64>> {
            coordinates.iter().map(|&c| c.into()).collect()
        }

        fn lines(lines: &[Vec<Coordinate2D>]) -> Vec<Vec<Vec<f64>>> {
            lines.iter().map(|l| line(l)).collect()
        }

        match geometry {
            Geometry::Point(c) => geojson::Value::Point((*c).into()),
            Geometry::LineString(cs) => geojson::Value::LineString(line(cs)),
            Geometry::MultiPoint(cs) => geojson::Value::MultiPoint(line(cs)),
            Geometry::Polygon(rs) => geojson::Value::Polygon(lines(rs)),
            Geometry::MultiLineString(ls) => geojson::Value::MultiLineString(lines(ls)),
            Geometry::MultiPolygon(ps) => {
                geojson::Value::MultiPolygon(ps.iter().map(|p| lines(p)).collect())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn polygon() -> Geometry {
        Geometry::Polygon(vec![
            vec![
                (100.0, 0.0).into(),
                (101.0, 0.0).into(),
                (101.0, 1.0).into(),
                (100.0, 1.0).into(),
                (100.0, 0.0).into(),
            ],
            vec![
                (100.2, 0.2).into(),
                (100.8, 0.2).into(),
                (100.8, 0.8).into(),
                (100.2, 0.8).into(),
                (100.2, 0.2).into(),
            ],
        ])
    }

    #[test]
    fn bbox() {
        assert_eq!(
            polygon().bbox(),
            Some(BoundingBox2D::new((100.0, 0.0).into(), (101.0, 1.0).into()).unwrap())
        );
        assert_eq!(Geometry::MultiPoint(vec![]).bbox(), None);
    }

    #[test]
    fn map_keeps_shape() {
        let shifted = polygon()
            .try_map_coordinates::<_, ()>(|c| Ok(Coordinate2D::new(c.x - 100., c.y)))
            .unwrap();

        let Geometry::Polygon(rings) = shifted else {
            panic!("expected a polygon");
        };

        assert_eq!(rings.len(), 2);
        assert_eq!(rings[0].len(), 5);
        assert_eq!(rings[1][1], Coordinate2D::new(100.8 - 100., 0.2));
    }

    #[test]
    fn map_stops_on_error() {
        let mut calls = 0;
        let result = polygon().try_map_coordinates(|c| {
            calls += 1;
            if calls == 3 { Err("boom") } else { Ok(c) }
        });

        assert_eq!(result, Err("boom"));
        assert_eq!(calls, 3);
    }

    #[test]
    fn geojson_conversion() {
        let value = geojson::Value::MultiLineString(vec![
            vec![vec![101.0, 0.0], vec![102.0, 1.0]],
            vec![vec![102.0, 2.0, 15.0], vec![103.0, 3.0]],
        ]);

        let geometry = Geometry::try_from(&value).unwrap();
        assert_eq!(geometry.geometry_type(), GeometryType::MultiLineString);

        // altitude is dropped
        assert_eq!(
            geojson::Value::from(&geometry),
            geojson::Value::MultiLineString(vec![
                vec![vec![101.0, 0.0], vec![102.0, 1.0]],
                vec![vec![102.0, 2.0], vec![103.0, 3.0]],
            ])
        );
        assert_eq!(
            geojson::Geometry::from(&geometry).value,
            geojson::Value::from(&geometry)
        );
    }

    #[test]
    fn short_position_is_invalid() {
        assert!(Geometry::try_from(&geojson::Value::Point(vec![1.0])).is_err());
        assert!(
            Geometry::try_from(&geojson::Value::GeometryCollection(vec![])).is_err()
        );
    }
}

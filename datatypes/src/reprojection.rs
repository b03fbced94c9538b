//! Reprojection of feature geometries into the canonical WGS 84 longitude/latitude system.

use std::collections::HashMap;

use proj::Proj;
use snafu::ResultExt;

use crate::error::{self, Error};
use crate::primitives::{Coordinate2D, Geometry};
use crate::spatial_reference::SpatialReference;
use crate::util::Result;

/// A transformation between two coordinate reference systems.
///
/// Axis order is normalized, geographic systems are longitude first.
pub struct Transformer {
    source_crs: SpatialReference,
    proj: Proj,
}

impl std::fmt::Debug for Transformer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transformer")
            .field("source_crs", &self.source_crs)
            .finish_non_exhaustive()
    }
}

impl Transformer {
    pub fn from_spatial_references(
        source: SpatialReference,
        target: SpatialReference,
    ) -> Result<Self> {
        let start_time = std::time::Instant::now();

        let proj = Proj::new_known_crs(&source.to_string(), &target.to_string(), None).map_err(
            |error| {
                tracing::debug!("Cannot create transformation from {source} to {target}: {error}");
                Error::UnsupportedCrs {
                    crs: source.to_string(),
                }
            },
        )?;

        tracing::trace!(
            "Transformer::from_spatial_references({source}, {target}) took {}",
            start_time.elapsed().as_nanos()
        );

        Ok(Transformer {
            source_crs: source,
            proj,
        })
    }

    pub fn transform_coord(&self, coord: Coordinate2D) -> Result<Coordinate2D> {
        let (x, y) = self
            .proj
            .convert((coord.x, coord.y))
            .context(error::ReprojectionSnafu {
                crs: self.source_crs.to_string(),
            })?;

        self.finite(Coordinate2D::new(x, y))
    }

    pub fn transform_coords(&self, coords: &[Coordinate2D]) -> Result<Vec<Coordinate2D>> {
        let mut tuples: Vec<(f64, f64)> = coords.iter().map(|c| (c.x, c.y)).collect();

        self.proj
            .convert_array(&mut tuples)
            .context(error::ReprojectionSnafu {
                crs: self.source_crs.to_string(),
            })?;

        tuples
            .into_iter()
            .map(|(x, y)| self.finite(Coordinate2D::new(x, y)))
            .collect()
    }

    /// proj reports some out-of-domain inputs as infinity instead of failing
    fn finite(&self, coordinate: Coordinate2D) -> Result<Coordinate2D> {
        if coordinate.is_finite() {
            Ok(coordinate)
        } else {
            Err(Error::InvalidGeometry {
                details: format!("coordinate is outside the domain of {}", self.source_crs),
            })
        }
    }
}

/// Resolves the CRS of each geometry and expresses it in the canonical CRS.
///
/// Transformers are built once per distinct source CRS.
#[derive(Debug)]
pub struct Reprojector {
    target: SpatialReference,
    transformers: HashMap<SpatialReference, Transformer>,
}

impl Default for Reprojector {
    fn default() -> Self {
        Self::new()
    }
}

impl Reprojector {
    pub fn new() -> Self {
        Self {
            target: SpatialReference::epsg_4326(),
            transformers: HashMap::new(),
        }
    }

    /// Reprojects a geometry declared in `crs`; `None` is the canonical CRS.
    pub fn reproject_geometry(&mut self, geometry: &Geometry, crs: Option<&str>) -> Result<Geometry> {
        let Some(source) = self.resolve(crs)? else {
            return Ok(geometry.clone());
        };

        let coordinates: Vec<Coordinate2D> = geometry.coords_iter().copied().collect();
        let mut transformed = self
            .transformer(source)?
            .transform_coords(&coordinates)?
            .into_iter();

        geometry.try_map_coordinates(|_| {
            transformed.next().ok_or(Error::InvalidGeometry {
                details: "transformation lost a coordinate".to_string(),
            })
        })
    }

    pub fn reproject_coordinate(
        &mut self,
        coordinate: Coordinate2D,
        crs: Option<&str>,
    ) -> Result<Coordinate2D> {
        match self.resolve(crs)? {
            Some(source) => self.transformer(source)?.transform_coord(coordinate),
            None => Ok(coordinate),
        }
    }

    /// `None` if no transformation is needed
    fn resolve(&self, crs: Option<&str>) -> Result<Option<SpatialReference>> {
        let Some(name) = crs else {
            return Ok(None);
        };

        let source = SpatialReference::from_crs_name(name)?;

        Ok((source != self.target).then_some(source))
    }

    fn transformer(&mut self, source: SpatialReference) -> Result<&Transformer> {
        if !self.transformers.contains_key(&source) {
            tracing::debug!("Creating transformer from {} to {}", source, self.target);
            let transformer = Transformer::from_spatial_references(source, self.target)?;
            self.transformers.insert(source, transformer);
        }

        self.transformers
            .get(&source)
            .ok_or(Error::UnsupportedCrs {
                crs: source.to_string(),
            })
    }
}

/// Expresses a single coordinate declared in `crs` in WGS 84 longitude/latitude.
pub fn reproject(coordinate: Coordinate2D, crs: &str) -> Result<Coordinate2D> {
    Reprojector::new().reproject_coordinate(coordinate, Some(crs))
}

#[cfg(test)]
mod tests {
    use float_cmp::approx_eq;

    use super::*;
    use crate::spatial_reference::SpatialReferenceAuthority;

    const MERCATOR_X: f64 = 1_200_024.110_751_489;
    const MERCATOR_Y: f64 = 5_626_245.609_297_535;

    #[test]
    fn transform_coordinate_3857_4326() {
        let from = SpatialReference::new(SpatialReferenceAuthority::Epsg, 3857);
        let transformer =
            Transformer::from_spatial_references(from, SpatialReference::epsg_4326()).unwrap();

        let c = transformer
            .transform_coord(Coordinate2D::new(MERCATOR_X, MERCATOR_Y))
            .unwrap();

        assert!(approx_eq!(f64, c.x, 10.78, epsilon = 0.01), "{}", c.x);
        assert!(approx_eq!(f64, c.y, 45.03, epsilon = 0.01), "{}", c.y);
    }

    #[test]
    fn transform_coordinate_4326_3857() {
        let to = SpatialReference::new(SpatialReferenceAuthority::Epsg, 3857);
        let transformer =
            Transformer::from_spatial_references(SpatialReference::epsg_4326(), to).unwrap();

        let c = transformer
            .transform_coord(Coordinate2D::new(10.78, 45.03))
            .unwrap();

        assert!(approx_eq!(f64, c.x, MERCATOR_X, epsilon = 0.01));
        assert!(approx_eq!(f64, c.y, MERCATOR_Y, epsilon = 0.01));
    }

    #[test]
    fn transform_coordinate_2056_4326() {
        let transformer = Transformer::from_spatial_references(
            SpatialReference::new(SpatialReferenceAuthority::Epsg, 2056),
            SpatialReference::epsg_4326(),
        )
        .unwrap();

        let c = transformer
            .transform_coord(Coordinate2D::new(2_600_000., 1_200_000.))
            .unwrap();

        assert!(approx_eq!(f64, c.x, 7.4386, epsilon = 0.01), "{}", c.x);
        assert!(approx_eq!(f64, c.y, 46.9511, epsilon = 0.01), "{}", c.y);
    }

    #[test]
    fn transform_many_coordinates() {
        let transformer = Transformer::from_spatial_references(
            SpatialReference::new(SpatialReferenceAuthority::Epsg, 3857),
            SpatialReference::epsg_4326(),
        )
        .unwrap();

        let coordinates = transformer
            .transform_coords(&[
                Coordinate2D::new(11_131_949.079_327_356, 0.),
                Coordinate2D::new(11_243_268.570_120_63, 111_325.142_866_384_86),
                Coordinate2D::new(11_354_588.060_913_904, 55_660.451_865_420_52),
            ])
            .unwrap();

        let expected = [(100., 0.), (101., 1.), (102., 0.5)];
        assert_eq!(coordinates.len(), expected.len());
        for (c, (x, y)) in coordinates.iter().zip(expected) {
            assert!(approx_eq!(f64, c.x, x, epsilon = 0.01), "{} != {x}", c.x);
            assert!(approx_eq!(f64, c.y, y, epsilon = 0.01), "{} != {y}", c.y);
        }
    }

    #[test]
    fn canonical_is_identity() {
        let mut reprojector = Reprojector::new();
        let c = Coordinate2D::new(102.0, 0.5);

        for crs in [None, Some("EPSG:4326"), Some("urn:ogc:def:crs:OGC:1.3:CRS84")] {
            let reprojected = reprojector.reproject_coordinate(c, crs).unwrap();
            assert!(approx_eq!(f64, reprojected.x, c.x));
            assert!(approx_eq!(f64, reprojected.y, c.y));
        }
    }

    #[test]
    fn reproject_nested_geometry() {
        let geometry = Geometry::MultiLineString(vec![
            vec![(MERCATOR_X, MERCATOR_Y).into(), (-10_851_423.962_528_309, 0.0).into()],
            vec![(0.0, 0.0).into()],
        ]);

        let reprojected = Reprojector::new()
            .reproject_geometry(&geometry, Some("urn:ogc:def:crs:EPSG::3857"))
            .unwrap();

        let Geometry::MultiLineString(lines) = reprojected else {
            panic!("expected a multi line string");
        };

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].len(), 2);
        assert_eq!(lines[1].len(), 1);
        assert!(approx_eq!(f64, lines[0][0].x, 10.78, epsilon = 0.01));
        assert!(approx_eq!(f64, lines[0][0].y, 45.03, epsilon = 0.01));
        assert!(approx_eq!(f64, lines[0][1].x, -97.48, epsilon = 0.01));
        assert!(approx_eq!(f64, lines[0][1].y, 0.0, epsilon = 0.01));
        assert!(approx_eq!(f64, lines[1][0].x, 0.0, epsilon = 0.01));
    }

    #[test]
    fn unsupported_crs() {
        assert!(matches!(
            reproject(Coordinate2D::new(1., 1.), "EPSG:999999"),
            Err(Error::UnsupportedCrs { .. })
        ));
        assert!(matches!(
            reproject(Coordinate2D::new(1., 1.), "SR-ORG:81"),
            Err(Error::UnsupportedCrs { .. })
        ));
        assert!(matches!(
            reproject(Coordinate2D::new(1., 1.), "not a crs"),
            Err(Error::UnsupportedCrs { .. })
        ));
    }
}

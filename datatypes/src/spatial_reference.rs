use crate::error;
use snafu::ResultExt;
use std::str::FromStr;

/// A spatial reference authority that is part of a spatial reference definition
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum SpatialReferenceAuthority {
    Epsg,
    SrOrg,
    Iau2000,
    Esri,
}

impl std::fmt::Display for SpatialReferenceAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                SpatialReferenceAuthority::Epsg => "EPSG",
                SpatialReferenceAuthority::SrOrg => "SR-ORG",
                SpatialReferenceAuthority::Iau2000 => "IAU2000",
                SpatialReferenceAuthority::Esri => "ESRI",
            }
        )
    }
}

/// A spatial reference consists of an authority and a code
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct SpatialReference {
    authority: SpatialReferenceAuthority,
    code: u32,
}

impl SpatialReference {
    pub fn new(authority: SpatialReferenceAuthority, code: u32) -> Self {
        Self { authority, code }
    }

    /// the WGS 84 spatial reference system
    pub fn epsg_4326() -> Self {
        Self::new(SpatialReferenceAuthority::Epsg, 4326)
    }

    /// Resolves a CRS name as it appears in input files.
    ///
    /// Understands `AUTH:code`, OGC URNs (`urn:ogc:def:crs:EPSG::3857`,
    /// `urn:ogc:def:crs:EPSG:6.6:3857`), OGC URLs
    /// (`http://www.opengis.net/def/crs/EPSG/0/3857`) and the `CRS84` aliases
    /// for WGS 84.
    ///
    /// # Examples
    ///
    /// ```
    /// use geoingest_datatypes::spatial_reference::SpatialReference;
    ///
    /// let srs = SpatialReference::from_crs_name("urn:ogc:def:crs:EPSG::3857").unwrap();
    /// assert_eq!(srs.to_string(), "EPSG:3857");
    /// ```
    pub fn from_crs_name(name: &str) -> Result<Self, error::Error> {
        let name = name.trim();
        let unsupported = || error::Error::UnsupportedCrs {
            crs: name.to_string(),
        };

        let upper = name.to_ascii_uppercase();
        if matches!(
            upper.as_str(),
            "CRS84" | "OGC:CRS84" | "URN:OGC:DEF:CRS:OGC:1.3:CRS84" | "URN:OGC:DEF:CRS:OGC::CRS84"
        ) || upper.ends_with("/OGC/1.3/CRS84")
        {
            return Ok(Self::epsg_4326());
        }

        if let Some(rest) = upper.strip_prefix("URN:OGC:DEF:CRS:") {
            // authority, optional version, code
            let parts: Vec<&str> = rest.split(':').collect();
            return match parts.as_slice() {
                [authority, _, code] | [authority, code] => Ok(Self::new(
                    authority.parse().map_err(|_| unsupported())?,
                    code.parse::<u32>().map_err(|_| unsupported())?,
                )),
                _ => Err(unsupported()),
            };
        }

        if let Some(index) = upper.find("/DEF/CRS/") {
            let parts: Vec<&str> = upper[index + "/DEF/CRS/".len()..].split('/').collect();
            return match parts.as_slice() {
                [authority, _version, code] => Ok(Self::new(
                    authority.parse().map_err(|_| unsupported())?,
                    code.parse::<u32>().map_err(|_| unsupported())?,
                )),
                _ => Err(unsupported()),
            };
        }

        upper.parse().map_err(|_| unsupported())
    }
}

impl std::fmt::Display for SpatialReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.authority, self.code)
    }
}

impl FromStr for SpatialReferenceAuthority {
    type Err = error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "EPSG" => SpatialReferenceAuthority::Epsg,
            "SR-ORG" => SpatialReferenceAuthority::SrOrg,
            "IAU2000" => SpatialReferenceAuthority::Iau2000,
            "ESRI" => SpatialReferenceAuthority::Esri,
            _ => {
                return Err(error::Error::InvalidSpatialReferenceString {
                    spatial_reference_string: s.into(),
                });
            }
        })
    }
}

impl FromStr for SpatialReference {
    type Err = error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut split = s.split(':');

        match (split.next(), split.next(), split.next()) {
            (Some(authority), Some(code), None) => Ok(Self::new(
                authority.parse()?,
                code.parse::<u32>().context(error::ParseU32Snafu)?,
            )),
            _ => Err(error::Error::InvalidSpatialReferenceString {
                spatial_reference_string: s.into(),
            }),
        }
    }
}

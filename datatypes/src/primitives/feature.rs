use super::Geometry;
use serde::{Deserialize, Serialize};

pub type JsonObject = serde_json::Map<String, serde_json::Value>;

/// A single decoded record: an optional geometry and its attributes.
///
/// `crs` is the coordinate reference system the geometry was declared in, as
/// written in the input. `None` means the canonical WGS84 longitude/latitude.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub geometry: Option<Geometry>,
    pub crs: Option<String>,
    pub properties: JsonObject,
}

impl Feature {
    pub fn new(geometry: Option<Geometry>, properties: JsonObject) -> Self {
        Self {
            geometry,
            crs: None,
            properties,
        }
    }

    #[must_use]
    pub fn with_crs(mut self, crs: impl Into<String>) -> Self {
        self.crs = Some(crs.into());
        self
    }
}

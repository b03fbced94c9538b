use std::io::Read;

use geoingest_datatypes::primitives::{Feature, Geometry, JsonObject};
use serde_json::Value;

use crate::error::Error;
use crate::util::Result;

/// Decodes a GeoJSON `FeatureCollection` or a single `Feature`.
///
/// The document is parsed up front, features are converted one at a time when
/// they are pulled.
pub struct GeoJsonDecoder {
    features: std::iter::Enumerate<std::vec::IntoIter<Value>>,
    collection_crs: Option<String>,
    is_collection: bool,
    finished: bool,
}

impl GeoJsonDecoder {
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let value: Value = serde_json::from_reader(reader).map_err(json_syntax_error)?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(mut object) = value else {
            return Err(Error::parse(
                "expected a GeoJSON object at the top level",
                None,
            ));
        };

        let collection_crs = crs_name(object.get("crs"))?;

        match object.get("type").and_then(Value::as_str) {
            Some("FeatureCollection") => {
                let features = match object.remove("features") {
                    Some(Value::Array(features)) => features,
                    _ => {
                        return Err(Error::parse(
                            "a FeatureCollection needs a `features` array",
                            Some("features".to_string()),
                        ));
                    }
                };

                tracing::debug!("Decoding GeoJSON collection of {} features", features.len());

                Ok(Self {
                    features: features.into_iter().enumerate(),
                    collection_crs,
                    is_collection: true,
                    finished: false,
                })
            }
            Some("Feature") => Ok(Self {
                features: vec![Value::Object(object)].into_iter().enumerate(),
                collection_crs: None,
                is_collection: false,
                finished: false,
            }),
            other => Err(Error::parse(
                format!(
                    "expected a FeatureCollection or a Feature, found {}",
                    other.unwrap_or("no type")
                ),
                Some("type".to_string()),
            )),
        }
    }

    fn location(&self, index: usize) -> Option<String> {
        if self.is_collection {
            Some(format!("features[{index}]"))
        } else {
            None
        }
    }

    fn convert(&self, index: usize, value: Value) -> Result<Feature> {
        let location = || self.location(index);

        let feature_crs = crs_name(value.get("crs")).map_err(|e| locate(e, location()))?;

        let feature = geojson::Feature::from_json_value(value)
            .map_err(|e| Error::parse(e.to_string(), location()))?;

        let geometry_crs = crs_name(
            feature
                .geometry
                .as_ref()
                .and_then(|g| g.foreign_members.as_ref())
                .and_then(|members| members.get("crs")),
        )
        .map_err(|e| locate(e, location()))?;

        let geometry = feature
            .geometry
            .as_ref()
            .map(|g| Geometry::try_from(&g.value))
            .transpose()
            .map_err(|e| Error::parse(e.to_string(), location()))?;

        let mut decoded = Feature::new(geometry, feature.properties.unwrap_or_default());

        // the innermost declaration wins
        if let Some(crs) = geometry_crs
            .or(feature_crs)
            .or_else(|| self.collection_crs.clone())
        {
            decoded = decoded.with_crs(crs);
        }

        Ok(decoded)
    }
}

impl Iterator for GeoJsonDecoder {
    type Item = Result<Feature>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let Some((index, value)) = self.features.next() else {
            self.finished = true;
            return None;
        };

        let feature = self.convert(index, value);
        self.finished = feature.is_err();

        Some(feature)
    }
}

fn json_syntax_error(error: serde_json::Error) -> Error {
    let position = format!(" at line {} column {}", error.line(), error.column());
    let message = error.to_string();

    Error::Parse {
        message: message
            .strip_suffix(&position)
            .unwrap_or(&message)
            .to_string(),
        location: Some(format!("{}:{}", error.line(), error.column())),
    }
}

fn locate(error: Error, location: Option<String>) -> Error {
    match error {
        Error::Parse { message, .. } => Error::Parse { message, location },
        other => other,
    }
}

/// Reads a named (`{"type": "name", ...}`) or legacy EPSG (`{"type": "EPSG", ...}`) CRS member.
fn crs_name(crs: Option<&Value>) -> Result<Option<String>> {
    let Some(crs) = crs else {
        return Ok(None);
    };

    if crs.is_null() {
        return Ok(None);
    }

    let properties = crs.get("properties").and_then(Value::as_object);
    let member = |key: &str| properties.and_then(|p: &JsonObject| p.get(key));

    match crs.get("type").and_then(Value::as_str) {
        Some("name") => match member("name").and_then(Value::as_str) {
            Some(name) => Ok(Some(name.to_string())),
            None => Err(Error::parse("a named crs needs a `name` property", None)),
        },
        Some("EPSG") => match member("code") {
            Some(Value::Number(code)) => Ok(Some(format!("EPSG:{code}"))),
            Some(Value::String(code)) => Ok(Some(format!("EPSG:{code}"))),
            _ => Err(Error::parse("an EPSG crs needs a `code` property", None)),
        },
        _ => Err(Error::UnsupportedCrs {
            crs: crs.to_string(),
        }),
    }
}

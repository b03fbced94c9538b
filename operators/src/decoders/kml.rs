use std::io::{BufReader, Read};

use geoingest_datatypes::primitives::{Coordinate2D, Feature, Geometry, GeometryType, JsonObject};
use serde_json::Value;
use xml::attribute::OwnedAttribute;
use xml::reader::{ErrorKind, EventReader, ParserConfig, XmlEvent};

use crate::error::Error;
use crate::util::Result;

/// Decodes the `Placemark`s of a KML document one at a time.
///
/// Geometries become features, `ExtendedData` becomes their properties.
pub struct KmlDecoder<R: Read> {
    events: EventReader<BufReader<R>>,
    finished: bool,
}

impl<R: Read> KmlDecoder<R> {
    pub fn new(reader: R) -> Self {
        let events = ParserConfig::new()
            .whitespace_to_characters(true)
            .cdata_to_characters(true)
            .ignore_comments(true)
            .create_reader(BufReader::new(reader));

        Self {
            events,
            finished: false,
        }
    }

    /// Failures of the underlying reader stay IO errors, everything else is malformed input.
    fn next_event(&mut self) -> Result<XmlEvent> {
        self.events.next().map_err(|error| match error.kind() {
            ErrorKind::Io(io_error) => Error::Io {
                source: std::io::Error::new(io_error.kind(), io_error.to_string()),
            },
            _ => Error::parse(error.to_string(), None),
        })
    }

    fn next_placemark(&mut self) -> Result<Option<Feature>> {
        loop {
            match self.next_event()? {
                XmlEvent::StartElement { name, .. } if name.local_name == "Placemark" => {
                    return self.placemark().map(Some);
                }
                XmlEvent::EndDocument => return Ok(None),
                _ => {}
            }
        }
    }

    fn placemark(&mut self) -> Result<Feature> {
        let mut geometry = None;
        let mut properties = JsonObject::new();

        loop {
            match self.next_event()? {
                XmlEvent::StartElement {
                    name, attributes, ..
                } => match name.local_name.as_str() {
                    kind @ ("Point" | "LineString" | "Polygon" | "MultiGeometry") => {
                        geometry = Some(self.geometry(kind)?);
                    }
                    "Data" => {
                        let key = name_attribute(&attributes)?;
                        let value = self.data_value()?;
                        properties.insert(key, value.map_or(Value::Null, typed_value));
                    }
                    "SimpleData" => {
                        let key = name_attribute(&attributes)?;
                        let value = self.text("SimpleData")?;
                        properties.insert(key, typed_value(value));
                    }
                    _ => {}
                },
                XmlEvent::EndElement { name } if name.local_name == "Placemark" => break,
                XmlEvent::EndDocument => return Err(unexpected_end("Placemark")),
                _ => {}
            }
        }

        Ok(Feature::new(geometry, properties))
    }

    fn geometry(&mut self, kind: &str) -> Result<Geometry> {
        match kind {
            "Point" => {
                let coordinates = self.coordinates_within("Point")?;
                match coordinates.first() {
                    Some(c) => Ok(Geometry::Point(*c)),
                    None => Err(Error::parse("a Point needs a coordinate", None)),
                }
            }
            "LineString" => Ok(Geometry::LineString(
                self.coordinates_within("LineString")?,
            )),
            "Polygon" => self.polygon(),
            _ => self.multi_geometry(),
        }
    }

    /// The last `coordinates` element before the end of `element`
    fn coordinates_within(&mut self, element: &str) -> Result<Vec<Coordinate2D>> {
        let mut coordinates = Vec::new();

        loop {
            match self.next_event()? {
                XmlEvent::StartElement { name, .. } if name.local_name == "coordinates" => {
                    coordinates = parse_coordinates(&self.text("coordinates")?)?;
                }
                XmlEvent::EndElement { name } if name.local_name == element => {
                    return Ok(coordinates);
                }
                XmlEvent::EndDocument => return Err(unexpected_end(element)),
                _ => {}
            }
        }
    }

    fn polygon(&mut self) -> Result<Geometry> {
        let mut outer = None;
        let mut inner = Vec::new();

        loop {
            match self.next_event()? {
                XmlEvent::StartElement { name, .. } => match name.local_name.as_str() {
                    "outerBoundaryIs" => {
                        outer = Some(self.coordinates_within("outerBoundaryIs")?);
                    }
                    "innerBoundaryIs" => inner.push(self.coordinates_within("innerBoundaryIs")?),
                    _ => {}
                },
                XmlEvent::EndElement { name } if name.local_name == "Polygon" => break,
                XmlEvent::EndDocument => return Err(unexpected_end("Polygon")),
                _ => {}
            }
        }

        let Some(outer) = outer else {
            return Err(Error::parse("a Polygon needs an outerBoundaryIs", None));
        };

        let mut rings = Vec::with_capacity(inner.len() + 1);
        rings.push(outer);
        rings.extend(inner);

        Ok(Geometry::Polygon(rings))
    }

    fn multi_geometry(&mut self) -> Result<Geometry> {
        let mut members = Vec::new();

        loop {
            match self.next_event()? {
                XmlEvent::StartElement { name, .. } => match name.local_name.as_str() {
                    kind @ ("Point" | "LineString" | "Polygon" | "MultiGeometry") => {
                        members.push(self.geometry(kind)?);
                    }
                    _ => {}
                },
                XmlEvent::EndElement { name } if name.local_name == "MultiGeometry" => break,
                XmlEvent::EndDocument => return Err(unexpected_end("MultiGeometry")),
                _ => {}
            }
        }

        combine(members)
    }

    /// The text of the `value` child of a `Data` element
    fn data_value(&mut self) -> Result<Option<String>> {
        let mut value = None;

        loop {
            match self.next_event()? {
                XmlEvent::StartElement { name, .. } if name.local_name == "value" => {
                    value = Some(self.text("value")?);
                }
                XmlEvent::EndElement { name } if name.local_name == "Data" => return Ok(value),
                XmlEvent::EndDocument => return Err(unexpected_end("Data")),
                _ => {}
            }
        }
    }

    /// All character data up to the end of `element`
    fn text(&mut self, element: &str) -> Result<String> {
        let mut text = String::new();
        let mut depth = 0_usize;

        loop {
            match self.next_event()? {
                XmlEvent::Characters(characters) => text.push_str(&characters),
                XmlEvent::StartElement { .. } => depth += 1,
                XmlEvent::EndElement { name } => {
                    if depth == 0 && name.local_name == element {
                        return Ok(text);
                    }
                    depth = depth.saturating_sub(1);
                }
                XmlEvent::EndDocument => return Err(unexpected_end(element)),
                _ => {}
            }
        }
    }
}

impl<R: Read> Iterator for KmlDecoder<R> {
    type Item = Result<Feature>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        match self.next_placemark() {
            Ok(Some(feature)) => Some(Ok(feature)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(error) => {
                self.finished = true;
                Some(Err(error))
            }
        }
    }
}

fn unexpected_end(element: &str) -> Error {
    Error::parse(format!("document ended inside {element}"), None)
}

fn name_attribute(attributes: &[OwnedAttribute]) -> Result<String> {
    attributes
        .iter()
        .find(|a| a.name.local_name == "name")
        .map(|a| a.value.clone())
        .ok_or_else(|| Error::parse("extended data without a `name` attribute", None))
}

/// Parses whitespace separated `lon,lat[,alt]` tuples, altitudes are dropped.
fn parse_coordinates(text: &str) -> Result<Vec<Coordinate2D>> {
    text.split_whitespace()
        .map(|tuple| {
            let mut ordinates = tuple.split(',').map(str::parse::<f64>);

            match (ordinates.next(), ordinates.next()) {
                (Some(Ok(x)), Some(Ok(y))) => Ok(Coordinate2D::new(x, y)),
                _ => Err(Error::parse(
                    format!("invalid coordinate tuple `{tuple}`"),
                    None,
                )),
            }
        })
        .collect()
}

/// Infers the type of an attribute from its text.
fn typed_value(text: String) -> Value {
    let trimmed = text.trim();

    match trimmed {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }

    trimmed
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
        .and_then(serde_json::Number::from_f64)
        .map_or(Value::String(text), Value::Number)
}

/// Turns the members of a `MultiGeometry` into the matching multi geometry.
fn combine(members: Vec<Geometry>) -> Result<Geometry> {
    let Some(first) = members.first() else {
        return Err(Error::parse("a MultiGeometry needs members", None));
    };

    let kind = single_kind(first.geometry_type());

    if let Some(other) = members
        .iter()
        .map(|m| single_kind(m.geometry_type()))
        .find(|k| *k != kind)
    {
        return Err(Error::parse(
            format!("a MultiGeometry cannot mix {kind} and {other}"),
            None,
        ));
    }

    let mut points = Vec::new();
    let mut lines = Vec::new();
    let mut polygons = Vec::new();

    for member in members {
        match member {
            Geometry::Point(c) => points.push(c),
            Geometry::MultiPoint(cs) => points.extend(cs),
            Geometry::LineString(l) => lines.push(l),
            Geometry::MultiLineString(ls) => lines.extend(ls),
            Geometry::Polygon(p) => polygons.push(p),
            Geometry::MultiPolygon(ps) => polygons.extend(ps),
        }
    }

    Ok(match kind {
        GeometryType::Point => Geometry::MultiPoint(points),
        GeometryType::LineString => Geometry::MultiLineString(lines),
        _ => Geometry::MultiPolygon(polygons),
    })
}

fn single_kind(geometry_type: GeometryType) -> GeometryType {
    match geometry_type {
        GeometryType::Point | GeometryType::MultiPoint => GeometryType::Point,
        GeometryType::LineString | GeometryType::MultiLineString => GeometryType::LineString,
        GeometryType::Polygon | GeometryType::MultiPolygon => GeometryType::Polygon,
    }
}

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumString, IntoStaticStr};

use crate::primitives::{Coordinate2D, Geometry, GeometryType, JsonObject};

/// The type tag of a layer column
#[derive(
    Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize, Display, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ColumnType {
    Point,
    LineString,
    Polygon,
    MultiPoint,
    MultiLineString,
    MultiPolygon,
    #[serde(rename = "string")]
    #[strum(serialize = "string")]
    Text,
    Number,
    Boolean,
    Array,
    Object,
}

impl ColumnType {
    pub fn is_geometry(self) -> bool {
        matches!(
            self,
            ColumnType::Point
                | ColumnType::LineString
                | ColumnType::Polygon
                | ColumnType::MultiPoint
                | ColumnType::MultiLineString
                | ColumnType::MultiPolygon
        )
    }

    /// Types only merge with themselves, there is no widening between kinds.
    pub fn merge_type_with(self, other: ColumnType) -> Result<ColumnType, TypeConflict> {
        if self == other {
            Ok(self)
        } else {
            Err(TypeConflict {
                expected: self,
                found: other,
            })
        }
    }
}

impl From<GeometryType> for ColumnType {
    fn from(geometry_type: GeometryType) -> Self {
        match geometry_type {
            GeometryType::Point => ColumnType::Point,
            GeometryType::LineString => ColumnType::LineString,
            GeometryType::Polygon => ColumnType::Polygon,
            GeometryType::MultiPoint => ColumnType::MultiPoint,
            GeometryType::MultiLineString => ColumnType::MultiLineString,
            GeometryType::MultiPolygon => ColumnType::MultiPolygon,
        }
    }
}

/// Two column types that cannot share a layer column
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TypeConflict {
    pub expected: ColumnType,
    pub found: ColumnType,
}

impl fmt::Display for TypeConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cannot merge {} with {}", self.expected, self.found)
    }
}

/// A single cell value of a layer row.
///
/// Object members compare regardless of their order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum TypedValue {
    Point(Coordinate2D),
    Line(Vec<Coordinate2D>),
    Polygon(Vec<Vec<Coordinate2D>>),
    MultiPoint(Vec<Coordinate2D>),
    MultiLine(Vec<Vec<Coordinate2D>>),
    MultiPolygon(Vec<Vec<Vec<Coordinate2D>>>),
    Text(String),
    Number(f64),
    Boolean(bool),
    Array(Vec<Value>),
    Object(JsonObject),
    Null,
}

impl TypedValue {
    /// `None` for `Null`, which has no type of its own
    pub fn column_type(&self) -> Option<ColumnType> {
        Some(match self {
            TypedValue::Point(_) => ColumnType::Point,
            TypedValue::Line(_) => ColumnType::LineString,
            TypedValue::Polygon(_) => ColumnType::Polygon,
            TypedValue::MultiPoint(_) => ColumnType::MultiPoint,
            TypedValue::MultiLine(_) => ColumnType::MultiLineString,
            TypedValue::MultiPolygon(_) => ColumnType::MultiPolygon,
            TypedValue::Text(_) => ColumnType::Text,
            TypedValue::Number(_) => ColumnType::Number,
            TypedValue::Boolean(_) => ColumnType::Boolean,
            TypedValue::Array(_) => ColumnType::Array,
            TypedValue::Object(_) => ColumnType::Object,
            TypedValue::Null => return None,
        })
    }

    pub fn is_null(&self) -> bool {
        matches!(self, TypedValue::Null)
    }

    /// Checks whether this value fits into a column of type `other`.
    ///
    /// `Null` fits everywhere and adopts the column type.
    pub fn merge_type_with(&self, other: ColumnType) -> Result<ColumnType, TypeConflict> {
        match self.column_type() {
            Some(ctype) => other.merge_type_with(ctype),
            None => Ok(other),
        }
    }

    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Null => TypedValue::Null,
            Value::Bool(b) => TypedValue::Boolean(b),
            Value::Number(n) => match n.as_f64() {
                Some(f) => TypedValue::Number(f),
                None => TypedValue::Text(n.to_string()),
            },
            Value::String(s) => TypedValue::Text(s),
            Value::Array(a) => TypedValue::Array(a),
            Value::Object(o) => TypedValue::Object(o),
        }
    }

    pub fn as_geometry(&self) -> Option<Geometry> {
        Some(match self {
            TypedValue::Point(c) => Geometry::Point(*c),
            TypedValue::Line(cs) => Geometry::LineString(cs.clone()),
            TypedValue::Polygon(rings) => Geometry::Polygon(rings.clone()),
            TypedValue::MultiPoint(cs) => Geometry::MultiPoint(cs.clone()),
            TypedValue::MultiLine(lines) => Geometry::MultiLineString(lines.clone()),
            TypedValue::MultiPolygon(polygons) => Geometry::MultiPolygon(polygons.clone()),
            _ => return None,
        })
    }

    /// The attribute value as JSON, geometries become GeoJSON geometry objects
    pub fn to_json(&self) -> Value {
        match self {
            TypedValue::Text(s) => Value::String(s.clone()),
            TypedValue::Number(n) => serde_json::Number::from_f64(*n).map_or(Value::Null, Value::Number),
            TypedValue::Boolean(b) => Value::Bool(*b),
            TypedValue::Array(a) => Value::Array(a.clone()),
            TypedValue::Object(o) => Value::Object(o.clone()),
            TypedValue::Null => Value::Null,
            geometry => match geometry.as_geometry() {
                Some(g) => serde_json::to_value(geojson::Geometry::from(&g)).unwrap_or(Value::Null),
                None => Value::Null,
            },
        }
    }
}

impl From<Geometry> for TypedValue {
    fn from(geometry: Geometry) -> Self {
        match geometry {
            Geometry::Point(c) => TypedValue::Point(c),
            Geometry::LineString(cs) => TypedValue::Line(cs),
            Geometry::Polygon(rings) => TypedValue::Polygon(rings),
            Geometry::MultiPoint(cs) => TypedValue::MultiPoint(cs),
            Geometry::MultiLineString(lines) => TypedValue::MultiLine(lines),
            Geometry::MultiPolygon(polygons) => TypedValue::MultiPolygon(polygons),
        }
    }
}

/// A named, typed cell of a row
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DomainColumn {
    pub name: String,
    pub ctype: ColumnType,
    pub value: TypedValue,
}

impl DomainColumn {
    /// A column whose type is derived from its value; `Null` becomes a text column.
    pub fn new(name: impl Into<String>, value: TypedValue) -> Self {
        Self {
            name: name.into(),
            ctype: value.column_type().unwrap_or(ColumnType::Text),
            value,
        }
    }

    pub fn merge_type_with(&self, ctype: ColumnType) -> Result<ColumnType, TypeConflict> {
        self.value.merge_type_with(ctype)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn scalars_merge_only_with_themselves() {
        assert_eq!(
            TypedValue::Text("a".into()).merge_type_with(ColumnType::Text),
            Ok(ColumnType::Text)
        );
        assert_eq!(
            TypedValue::Number(1.).merge_type_with(ColumnType::Text),
            Err(TypeConflict {
                expected: ColumnType::Text,
                found: ColumnType::Number
            })
        );
        assert!(TypedValue::Boolean(true).merge_type_with(ColumnType::Number).is_err());
        assert!(
            TypedValue::Array(vec![json!(1)])
                .merge_type_with(ColumnType::Object)
                .is_err()
        );
    }

    #[test]
    fn single_and_multi_geometries_conflict() {
        let point = TypedValue::from(Geometry::Point((1., 2.).into()));
        let multi_point = TypedValue::from(Geometry::MultiPoint(vec![(1., 2.).into()]));

        assert_eq!(point.merge_type_with(ColumnType::Point), Ok(ColumnType::Point));
        assert!(point.merge_type_with(ColumnType::MultiPoint).is_err());
        assert!(multi_point.merge_type_with(ColumnType::Point).is_err());

        let line = TypedValue::Line(vec![(0., 0.).into(), (1., 1.).into()]);
        assert!(line.merge_type_with(ColumnType::MultiLineString).is_err());
        assert!(
            TypedValue::Polygon(vec![])
                .merge_type_with(ColumnType::MultiPolygon)
                .is_err()
        );
    }

    #[test]
    fn null_adopts_column_type() {
        assert_eq!(
            TypedValue::Null.merge_type_with(ColumnType::Number),
            Ok(ColumnType::Number)
        );
        assert_eq!(DomainColumn::new("a", TypedValue::Null).ctype, ColumnType::Text);
    }

    #[test]
    fn object_equality_ignores_member_order() {
        let a = TypedValue::from_json(json!({"a": 1, "b": {"c": true, "d": null}}));
        let b = TypedValue::from_json(json!({"b": {"d": null, "c": true}, "a": 1}));

        assert_eq!(a, b);
        assert_ne!(a, TypedValue::from_json(json!({"a": 2, "b": {}})));
    }

    #[test]
    fn json_conversion() {
        assert_eq!(TypedValue::from_json(json!(4)), TypedValue::Number(4.));
        assert_eq!(TypedValue::from_json(json!("x")), TypedValue::Text("x".into()));
        assert_eq!(TypedValue::from_json(json!(null)), TypedValue::Null);

        assert_eq!(TypedValue::Number(2.5).to_json(), json!(2.5));
        assert_eq!(
            TypedValue::Point((1., 2.).into()).to_json(),
            json!({"type": "Point", "coordinates": [1.0, 2.0]})
        );
    }

    #[test]
    fn column_type_tags() {
        assert_eq!(ColumnType::Text.to_string(), "string");
        assert_eq!(ColumnType::MultiLineString.to_string(), "multilinestring");
        assert_eq!(
            serde_json::to_string(&ColumnType::LineString).unwrap(),
            "\"linestring\""
        );
        assert_eq!("string".parse::<ColumnType>().unwrap(), ColumnType::Text);
    }

    #[test]
    fn rows_serialize() {
        let row = vec![
            TypedValue::Polygon(vec![vec![(0., 0.).into(), (1., 0.).into(), (0., 0.).into()]]),
            TypedValue::Text("a".into()),
            TypedValue::Null,
        ];

        let json = serde_json::to_string(&row).unwrap();
        let parsed: Vec<TypedValue> = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed, row);
    }
}
